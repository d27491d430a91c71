/// Utilities relating to wsi and swapchain
pub mod surface;
pub mod swapchain;
pub mod traits;

pub use traits::*;

pub use surface::Surface;
pub use swapchain::{Swapchain, SwapchainImage};
