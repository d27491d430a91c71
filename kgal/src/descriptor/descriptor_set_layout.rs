use anyhow::Result;
use ash::vk;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;

use crate::device::{Device, LogicalDevice};
use crate::resource::traits::Resource;
use crate::traits::Destructible;

#[derive(Debug, Clone)]
pub struct DescriptorSetLayout<D: Device = LogicalDevice> {
    handle: vk::DescriptorSetLayout,
    device: D,
}

pub enum DescriptorSetLayoutCreateInfo<D: Device> {
    /// Wrap an already created layout
    FromVk {
        handle: vk::DescriptorSetLayout,
        device: D,
    },
}

impl<D: Device> Resource for DescriptorSetLayout<D> {
    type CreateInfo<'a> = DescriptorSetLayoutCreateInfo<D>;
    type HandleType = vk::DescriptorSetLayout;

    fn new(create_info: Self::CreateInfo<'_>) -> Result<Self> {
        match create_info {
            DescriptorSetLayoutCreateInfo::FromVk { handle, device } => {
                #[cfg(feature = "log-lifetimes")]
                trace!("Creating VkDescriptorSetLayout {:?}", handle);
                Ok(Self { handle, device })
            }
        }
    }

    fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }
}

impl<D: Device> Destructible for DescriptorSetLayout<D> {
    fn destroy(&mut self) {
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkDescriptorSetLayout {:?}", self.handle);
        self.device.destroy_descriptor_set_layout(self.handle);
    }
}
