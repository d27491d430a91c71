use anyhow::Result;
use ash::vk;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;

use crate::device::{Device, LogicalDevice};
use crate::error::GpuResultExt;
use crate::traits::Destructible;

#[derive(Clone, Debug)]
pub struct BinarySemaphore<D: Device = LogicalDevice> {
    handle: vk::Semaphore,
    device: D,
}

impl<D: Device> BinarySemaphore<D> {
    pub fn new(device: D) -> Result<Self> {
        let handle = device.create_semaphore().gpu_op("vkCreateSemaphore")?;

        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkSemaphore {:?}", handle);

        Ok(Self { handle, device })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }

    /// Describes the semaphore for a submission at `stage_mask`
    pub fn submit_info(
        &self,
        stage_mask: vk::PipelineStageFlags2,
    ) -> vk::SemaphoreSubmitInfo<'static> {
        vk::SemaphoreSubmitInfo::default()
            .semaphore(self.handle)
            .stage_mask(stage_mask)
            .value(1)
    }
}

impl<D: Device> Destructible for BinarySemaphore<D> {
    fn destroy(&mut self) {
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkSemaphore {:?}", self.handle);

        self.device.destroy_semaphore(self.handle);
    }
}
