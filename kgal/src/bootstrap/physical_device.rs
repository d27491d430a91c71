use std::ffi::{CStr, CString};

use anyhow::Result;
use ash::vk;
use tracing::{debug, info};

use crate::error::GpuResultExt;
use crate::KgalError;

/// Features a device must expose to be picked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequiredFeatures {
    pub dynamic_rendering: bool,
    pub synchronization2: bool,
    pub buffer_device_address: bool,
    pub descriptor_indexing: bool,
}

impl RequiredFeatures {
    /// Whether `available` covers every feature set in `self`
    pub fn satisfied_by(&self, available: &RequiredFeatures) -> bool {
        (!self.dynamic_rendering || available.dynamic_rendering)
            && (!self.synchronization2 || available.synchronization2)
            && (!self.buffer_device_address || available.buffer_device_address)
            && (!self.descriptor_indexing || available.descriptor_indexing)
    }
}

/// A physical device which passed selection, together with its chosen graphics family
#[derive(Debug, Clone)]
pub struct SelectedPhysicalDevice {
    pub handle: crate::device::PhysicalDevice,
    /// Queue family used for graphics, compute, transfer and present
    pub graphics_family: u32,
    /// Extensions the logical device must enable
    pub extensions: Vec<CString>,
    pub features: RequiredFeatures,
}

/// Effectively a builder, but to select a suitable physical device
#[derive(Debug, Clone)]
pub struct PhysicalDeviceSelector {
    /// Minimum supported Vulkan version
    min_vulkan_version: (u32, u32, u32),
    /// Required extensions
    required_extensions: Vec<CString>,
    required_features: RequiredFeatures,
    /// Prefer discrete GPUs over everything else
    prefer_dedicated: bool,
}

impl Default for PhysicalDeviceSelector {
    fn default() -> Self {
        Self {
            min_vulkan_version: (1, 0, 0),
            required_extensions: Vec::new(),
            required_features: RequiredFeatures::default(),
            prefer_dedicated: true,
        }
    }
}

/// Whether `version` is at least `minimum`, both as (major, minor, patch)
pub(crate) fn meets_version(version: (u32, u32, u32), minimum: (u32, u32, u32)) -> bool {
    version >= minimum
}

/// First queue family with graphics support accepted by `can_present`
pub(crate) fn pick_graphics_family(
    families: &[vk::QueueFamilyProperties],
    mut can_present: impl FnMut(u32) -> Result<bool>,
) -> Result<Option<u32>> {
    for (index, family) in families.iter().enumerate() {
        if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && can_present(index as u32)? {
            return Ok(Some(index as u32));
        }
    }
    Ok(None)
}

impl PhysicalDeviceSelector {
    /// Set the minimum supported Vulkan version that is deemed suitable
    pub fn set_minimum_vulkan_version(mut self, version: (u32, u32, u32)) -> Self {
        self.min_vulkan_version = version;
        self
    }

    /// Adds a required extension
    pub fn add_required_extension(mut self, extension: &CStr) -> Self {
        let extension = extension.to_owned();
        if !self.required_extensions.contains(&extension) {
            self.required_extensions.push(extension);
        }
        self
    }

    pub fn set_required_features(mut self, features: RequiredFeatures) -> Self {
        self.required_features = features;
        self
    }

    pub fn set_prefer_dedicated(mut self, dedicated: bool) -> Self {
        self.prefer_dedicated = dedicated;
        self
    }

    fn query_features(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
    ) -> RequiredFeatures {
        let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default();
        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default();
        let mut features_2 = vk::PhysicalDeviceFeatures2::default()
            .push_next(&mut features_1_2)
            .push_next(&mut features_1_3);
        unsafe { instance.get_physical_device_features2(physical_device, &mut features_2) };
        RequiredFeatures {
            dynamic_rendering: features_1_3.dynamic_rendering == vk::TRUE,
            synchronization2: features_1_3.synchronization2 == vk::TRUE,
            buffer_device_address: features_1_2.buffer_device_address == vk::TRUE,
            descriptor_indexing: features_1_2.descriptor_indexing == vk::TRUE,
        }
    }

    /// Selects the most suitable physical device able to present to `surface`
    pub fn select(
        self,
        instance: &ash::Instance,
        surface: &crate::wsi::Surface,
    ) -> Result<SelectedPhysicalDevice> {
        let physical_devices = unsafe { instance.enumerate_physical_devices() }
            .gpu_op("vkEnumeratePhysicalDevices")?;
        let mut candidates: Vec<SelectedPhysicalDevice> = Vec::new();
        for physical_device in physical_devices {
            let handle = crate::device::PhysicalDevice::new(instance, physical_device);
            if !meets_version(handle.api_version(), self.min_vulkan_version) {
                debug!("Rejecting {}: Vulkan {:?} too old", handle.name(), handle.api_version());
                continue;
            }
            let available: Vec<CString> =
                unsafe { instance.enumerate_device_extension_properties(physical_device) }
                    .gpu_op("vkEnumerateDeviceExtensionProperties")?
                    .iter()
                    .filter_map(|ext| ext.extension_name_as_c_str().ok().map(CStr::to_owned))
                    .collect();
            if !self.required_extensions.iter().all(|ext| available.contains(ext)) {
                debug!("Rejecting {}: missing required extensions", handle.name());
                continue;
            }
            if !self
                .required_features
                .satisfied_by(&Self::query_features(instance, physical_device))
            {
                debug!("Rejecting {}: missing required features", handle.name());
                continue;
            }
            let Some(graphics_family) =
                pick_graphics_family(handle.get_total_queue_families(), |family| {
                    surface.supports_present(physical_device, family)
                })?
            else {
                debug!("Rejecting {}: no graphics queue able to present", handle.name());
                continue;
            };
            candidates.push(SelectedPhysicalDevice {
                handle,
                graphics_family,
                extensions: self.required_extensions.clone(),
                features: self.required_features,
            });
        }
        if self.prefer_dedicated {
            // stable sort keeps enumeration order among equals
            candidates.sort_by_key(|candidate| {
                candidate.handle.get_properties().device_type
                    != vk::PhysicalDeviceType::DISCRETE_GPU
            });
        }
        if candidates.is_empty() {
            return Err(KgalError::NoSuitablePhysicalDevice.into());
        }
        let selected = candidates.remove(0);
        info!(
            "Selected physical device {} (graphics family {})",
            selected.handle.name(),
            selected.graphics_family
        );
        Ok(selected)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn version_comparison_is_lexicographic() {
        assert!(meets_version((1, 3, 0), (1, 3, 0)));
        assert!(meets_version((1, 3, 250), (1, 3, 0)));
        assert!(meets_version((2, 0, 0), (1, 3, 0)));
        assert!(!meets_version((1, 2, 999), (1, 3, 0)));
    }

    #[test]
    fn graphics_family_must_present() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];
        assert_eq!(pick_graphics_family(&families, |_| Ok(true)).unwrap(), Some(1));
        assert_eq!(pick_graphics_family(&families, |index| Ok(index == 2)).unwrap(), Some(2));
        assert_eq!(pick_graphics_family(&families, |_| Ok(false)).unwrap(), None);
    }

    #[test]
    fn features_must_cover_requirements() {
        let required = RequiredFeatures {
            dynamic_rendering: true,
            synchronization2: true,
            buffer_device_address: true,
            descriptor_indexing: true,
        };
        let mut available = required;
        assert!(required.satisfied_by(&available));
        available.descriptor_indexing = false;
        assert!(!required.satisfied_by(&available));
        assert!(RequiredFeatures::default().satisfied_by(&available));
    }
}
