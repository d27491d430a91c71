use std::ffi::{c_char, CStr, CString};

use anyhow::Result;
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use tracing::info;

use crate::error::GpuResultExt;
use crate::KgalError;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Quickly builds an [`Instance`](crate::core::Instance)
#[derive(Debug, Clone)]
pub struct InstanceBuilder {
    /// All instance level extensions used
    extensions: Vec<CString>,
    /// All layers used
    layers: Vec<CString>,
    /// Whether to enable validation
    validate: bool,
    application_name: CString,
    engine_name: CString,

    /// Vulkan version used
    ///
    /// In the form of (major, minor, patch)
    vulkan_version: (u32, u32, u32),
}

impl Default for InstanceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InstanceBuilder {
    pub fn new() -> Self {
        Self {
            extensions: Vec::new(),
            layers: Vec::new(),
            validate: false,
            application_name: CString::default(),
            engine_name: CString::default(),
            vulkan_version: (1, 0, 0),
        }
    }

    /// Enables the Khronos validation layer and debug utils extension
    pub fn set_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    /// Set vulkan version in the form of (major, minor, patch)
    pub fn set_vulkan_version(mut self, version: (u32, u32, u32)) -> Self {
        self.vulkan_version = version;
        self
    }

    pub fn set_application_name(mut self, name: &str) -> Result<Self> {
        self.application_name = CString::new(name).map_err(|_| KgalError::StringContainsNull)?;
        Ok(self)
    }

    pub fn set_engine_name(mut self, name: &str) -> Result<Self> {
        self.engine_name = CString::new(name).map_err(|_| KgalError::StringContainsNull)?;
        Ok(self)
    }

    /// Adds an extension
    pub fn add_extension(mut self, name: &CStr) -> Self {
        let name = name.to_owned();
        if !self.extensions.contains(&name) {
            self.extensions.push(name);
        }
        self
    }

    /// Adds a layer
    pub fn add_layer(mut self, name: &CStr) -> Self {
        let name = name.to_owned();
        if !self.layers.contains(&name) {
            self.layers.push(name);
        }
        self
    }

    /// Adds every instance extension needed to present to surfaces of `display`
    pub fn add_window_extensions(mut self, display: RawDisplayHandle) -> Result<Self> {
        let extensions = ash_window::enumerate_required_extensions(display)
            .gpu_op("vkEnumerateInstanceExtensionProperties")?;
        for extension in extensions {
            self = self.add_extension(unsafe { CStr::from_ptr(*extension) });
        }
        Ok(self)
    }

    pub fn is_validating(&self) -> bool {
        self.validate
    }

    pub fn build(mut self, entry: ash::Entry) -> Result<crate::core::Instance> {
        if self.validate {
            self = self
                .add_layer(VALIDATION_LAYER)
                .add_extension(ash::ext::debug_utils::NAME);
        }
        let app_information = vk::ApplicationInfo::default()
            .application_name(&self.application_name)
            .engine_name(&self.engine_name)
            .api_version(vk::make_api_version(
                0,
                self.vulkan_version.0,
                self.vulkan_version.1,
                self.vulkan_version.2,
            ));
        let ext_cptrs: Vec<*const c_char> =
            self.extensions.iter().map(|name| name.as_ptr()).collect();
        let layer_cptrs: Vec<*const c_char> =
            self.layers.iter().map(|name| name.as_ptr()).collect();
        let instance_ci = vk::InstanceCreateInfo::default()
            .application_info(&app_information)
            .enabled_extension_names(&ext_cptrs)
            .enabled_layer_names(&layer_cptrs);

        let instance = crate::core::Instance::new(entry, &instance_ci)?;
        info!(
            "Created Vulkan {}.{}.{} instance with {} extensions (validation: {})",
            self.vulkan_version.0,
            self.vulkan_version.1,
            self.vulkan_version.2,
            self.extensions.len(),
            self.validate
        );
        Ok(instance)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn extensions_are_deduplicated() {
        let builder = InstanceBuilder::new()
            .add_extension(ash::khr::surface::NAME)
            .add_extension(ash::khr::surface::NAME)
            .add_layer(VALIDATION_LAYER)
            .add_layer(VALIDATION_LAYER);
        assert_eq!(builder.extensions.len(), 1);
        assert_eq!(builder.layers.len(), 1);
    }

    #[test]
    fn names_reject_interior_nul() {
        assert!(InstanceBuilder::new().set_application_name("K\0Engine").is_err());
        assert!(InstanceBuilder::new().set_engine_name("KEngine").is_ok());
    }
}
