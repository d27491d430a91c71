use anyhow::Result;
use ash::vk;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;

use crate::device::{Device, LogicalDevice};
use crate::error::{GpuResultExt, KgalError};
use crate::traits::Destructible;

/// A [`vk::ShaderModule`] built from precompiled SPIR-V
#[derive(Debug)]
pub struct Shader<D: Device = LogicalDevice> {
    handle: vk::ShaderModule,
    device: D,
}

impl<D: Device> Shader<D> {
    /// Creates a shader module from a SPIR-V blob. The blob length must be a multiple of 4.
    pub fn from_bytes(device: D, bytes: &[u8]) -> Result<Self> {
        let code = ash::util::read_spv(&mut std::io::Cursor::new(bytes))
            .map_err(|_| KgalError::InvalidShaderCode)?;
        let handle = device
            .create_shader_module(&code)
            .gpu_op("vkCreateShaderModule")?;

        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkShaderModule {:?}", handle);

        Ok(Self { handle, device })
    }

    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }
}

impl<D: Device> Destructible for Shader<D> {
    fn destroy(&mut self) {
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkShaderModule {:?}", self.handle);

        self.device.destroy_shader_module(self.handle);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{TestDevice, MINIMAL_SPIRV};

    #[test]
    fn rejects_unaligned_code() {
        let device = TestDevice::new();
        let err = Shader::from_bytes(device.clone(), &[0x03, 0x02, 0x23]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<KgalError>(),
            Some(&KgalError::InvalidShaderCode)
        );
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn rejects_code_without_magic_number() {
        let device = TestDevice::new();
        let err = Shader::from_bytes(device.clone(), &[0u8; 8]).unwrap_err();
        assert_eq!(
            err.downcast_ref::<KgalError>(),
            Some(&KgalError::InvalidShaderCode)
        );
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn creates_and_destroys_module() {
        let device = TestDevice::new();
        let mut shader = Shader::from_bytes(device.clone(), &MINIMAL_SPIRV).unwrap();
        assert_eq!(device.live_object_count(), 1);
        shader.destroy();
        assert_eq!(device.live_object_count(), 0);
    }
}
