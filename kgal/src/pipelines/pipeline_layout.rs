use anyhow::Result;
use ash::vk;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;

use crate::device::{Device, LogicalDevice};
use crate::error::GpuResultExt;
use crate::traits::Destructible;

#[derive(Clone, Debug)]
pub struct PipelineLayout<D: Device = LogicalDevice> {
    handle: vk::PipelineLayout,
    device: D,
}

impl<D: Device> PipelineLayout<D> {
    pub fn new(device: D, layout_ci: &vk::PipelineLayoutCreateInfo) -> Result<Self> {
        let handle = device
            .create_pipeline_layout(layout_ci)
            .gpu_op("vkCreatePipelineLayout")?;
        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkPipelineLayout {:?}", handle);
        Ok(Self { handle, device })
    }

    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }
}

impl<D: Device> Destructible for PipelineLayout<D> {
    fn destroy(&mut self) {
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkPipelineLayout {:?}", self.handle);

        self.device.destroy_pipeline_layout(self.handle);
    }
}
