pub use buffer::{Buffer, BufferCreateInfo};
pub use image::{blit_image, record_transition, Image, ImageCreateInfo};
pub use traits::*;

pub mod buffer;
pub mod image;
pub mod traits;
