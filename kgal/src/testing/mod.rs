//! A host-memory stand-in for a Vulkan driver.
//!
//! [`TestDevice`] implements [`Device`](crate::device::Device) by recording every call, handing
//! out unique handles, completing submitted work instantly and replaying recorded buffer copies
//! against host memory. Pair it with [`TestAllocator`](crate::allocators::TestAllocator) to run
//! upload and frame code without a GPU.
pub use test_device::{DeviceCall, TestDevice};

pub mod test_device;

/// The smallest blob `Shader::from_bytes` accepts: the SPIR-V magic number followed by the 1.0
/// version word, both little endian
pub const MINIMAL_SPIRV: [u8; 8] = [0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00];
