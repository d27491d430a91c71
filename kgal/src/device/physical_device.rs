use std::ops::Deref;

use ash::vk;

#[derive(Clone, Debug)]
pub struct PhysicalDevice {
    /// Handle to underlying physical device
    handle: vk::PhysicalDevice,

    /// Properties of the [`vk::PhysicalDevice`]
    properties: vk::PhysicalDeviceProperties,

    /// Queue families of the [`vk::PhysicalDevice`]
    available_queue_families: Vec<vk::QueueFamilyProperties>,
}

impl PhysicalDevice {
    /// Creates a new physical device
    pub fn new(instance: &ash::Instance, handle: vk::PhysicalDevice) -> Self {
        let mut properties_2 = vk::PhysicalDeviceProperties2::default();
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(handle) };
        unsafe {
            instance.get_physical_device_properties2(handle, &mut properties_2);
        }
        Self {
            handle,
            properties: properties_2.properties,
            available_queue_families: queue_families,
        }
    }

    /// Copies the underlying [`VkPhysicalDevice`](vk::PhysicalDevice)
    pub fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    /// Get the properties of the physical device
    pub fn get_properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    /// Get the queue families
    pub fn get_total_queue_families(&self) -> &[vk::QueueFamilyProperties] {
        self.available_queue_families.as_slice()
    }

    /// Name reported by the driver
    pub fn name(&self) -> String {
        self.properties
            .device_name_as_c_str()
            .unwrap_or(c"unknown")
            .to_string_lossy()
            .into_owned()
    }

    /// Api version in the form of (major, minor, patch)
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }
}

impl Deref for PhysicalDevice {
    type Target = vk::PhysicalDevice;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}
