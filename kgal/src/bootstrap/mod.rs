//! Builders which take care of the boilerplate of standing up Vulkan
pub use instance::InstanceBuilder;
pub use logical_device::LogicalDeviceBuilder;
pub use physical_device::{PhysicalDeviceSelector, RequiredFeatures, SelectedPhysicalDevice};
pub use swapchain::SwapchainBuilder;

pub mod instance;
pub mod logical_device;
pub mod physical_device;
pub mod swapchain;
