pub use debug_utils::DebugMessenger;
pub use logical_device::*;
pub use physical_device::PhysicalDevice;
pub use queue::*;
pub use traits::Device;

pub mod debug_utils;
pub mod logical_device;
pub mod physical_device;
pub mod queue;
pub mod traits;
