use anyhow::Result;
use ash::vk;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;

use crate::device::{Device, LogicalDevice};
use crate::error::GpuResultExt;
use crate::traits::Destructible;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fence<D: Device = LogicalDevice> {
    handle: vk::Fence,
    device: D,
}

impl<D: Device> Fence<D> {
    pub fn new(device: D, flags: vk::FenceCreateFlags) -> Result<Self> {
        let handle = device.create_fence(flags).gpu_op("vkCreateFence")?;

        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkFence {:?}", handle);

        Ok(Self { handle, device })
    }

    pub fn handle(&self) -> vk::Fence {
        self.handle
    }

    /// Blocks until the fence is signalled or `timeout` nanoseconds pass
    pub fn wait(&self, timeout: u64) -> Result<()> {
        self.device
            .wait_for_fences(&[self.handle], timeout)
            .gpu_op("vkWaitForFences")?;
        Ok(())
    }

    /// Resets the fence
    pub fn reset(&self) -> Result<()> {
        self.device
            .reset_fences(&[self.handle])
            .gpu_op("vkResetFences")?;
        Ok(())
    }
}

impl<D: Device> Destructible for Fence<D> {
    fn destroy(&mut self) {
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkFence {:?}", self.handle);

        self.device.destroy_fence(self.handle);
    }
}
