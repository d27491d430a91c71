use std::ffi::c_char;

use anyhow::Result;
use ash::vk;
use tracing::info;

use crate::bootstrap::SelectedPhysicalDevice;
use crate::device::{LogicalDevice, LogicalDeviceCreateInfo, Queue};

/// Builds a [`LogicalDevice`] with a single queue on the selected graphics family, enabling the
/// extensions and features the device was selected for
#[derive(Debug)]
pub struct LogicalDeviceBuilder {
    physical_device: SelectedPhysicalDevice,
}

impl From<SelectedPhysicalDevice> for LogicalDeviceBuilder {
    fn from(value: SelectedPhysicalDevice) -> Self {
        Self {
            physical_device: value,
        }
    }
}

impl LogicalDeviceBuilder {
    pub fn new(physical_device: SelectedPhysicalDevice) -> Self {
        Self::from(physical_device)
    }

    /// Creates the device and fetches its graphics queue
    pub fn build(self, instance: &ash::Instance) -> Result<(LogicalDevice, Queue)> {
        let features = self.physical_device.features;
        let family = self.physical_device.graphics_family;
        let priorities = [1.0f32];
        let queue_cis = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(family)
            .queue_priorities(&priorities)];
        let ext_cptrs: Vec<*const c_char> = self
            .physical_device
            .extensions
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();

        let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default()
            .buffer_device_address(features.buffer_device_address)
            .descriptor_indexing(features.descriptor_indexing);
        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(features.dynamic_rendering)
            .synchronization2(features.synchronization2);
        let mut features_2 = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut features_1_2)
            .push_next(&mut features_1_3);
        let device_ci = vk::DeviceCreateInfo::default()
            .push_next(&mut features_2)
            .queue_create_infos(&queue_cis)
            .enabled_extension_names(&ext_cptrs);

        let device = LogicalDevice::new(LogicalDeviceCreateInfo {
            instance,
            physical_device: self.physical_device.handle.handle(),
            device_ci,
            queue_families: vec![family],
        })?;
        let queue_flags = self
            .physical_device
            .handle
            .get_total_queue_families()
            .get(family as usize)
            .map(|properties| properties.queue_flags)
            .unwrap_or(vk::QueueFlags::GRAPHICS);
        let queue = device.get_queue(family, 0, queue_flags);
        info!(
            "Created logical device on {} with {} extensions",
            self.physical_device.handle.name(),
            ext_cptrs.len()
        );
        Ok((device, queue))
    }
}
