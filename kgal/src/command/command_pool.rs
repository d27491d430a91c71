use anyhow::Result;
use ash::vk;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;

use crate::device::{Device, LogicalDevice};
use crate::error::GpuResultExt;
use crate::traits::Destructible;

#[derive(Debug, Clone)]
pub struct CommandPool<D: Device = LogicalDevice> {
    handle: vk::CommandPool,
    device: D,
}

impl<D: Device> CommandPool<D> {
    pub fn new(
        device: D,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let handle = device
            .create_command_pool(queue_family_index, flags)
            .gpu_op("vkCreateCommandPool")?;

        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkCommandPool {:?}", handle);

        Ok(Self { handle, device })
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    /// Allocate primary command buffers from the pool
    pub fn allocate(&self, count: u32) -> Result<Vec<crate::command::CommandBuffer<D>>> {
        Ok(self
            .device
            .allocate_command_buffers(self.handle, count)
            .gpu_op("vkAllocateCommandBuffers")?
            .into_iter()
            .map(|handle| crate::command::CommandBuffer::new(handle, self.device.clone()))
            .collect())
    }
}

impl<D: Device> Destructible for CommandPool<D> {
    fn destroy(&mut self) {
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkCommandPool {:?}", self.handle);

        self.device.destroy_command_pool(self.handle);
    }
}
