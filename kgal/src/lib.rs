pub mod allocators;
#[cfg(feature = "bootstrap")]
pub mod bootstrap;
pub mod command;
pub mod core;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod pipelines;
pub mod resource;
pub mod shader;
pub mod sync;
#[cfg(any(test, feature = "test-device"))]
pub mod testing;
pub mod traits;
pub mod util;
pub mod wsi;

pub use error::KgalError;

// Re-exports
pub use gpu_allocator;
#[cfg(feature = "winit")]
pub use winit;
pub use {ash, ash_window, raw_window_handle};
