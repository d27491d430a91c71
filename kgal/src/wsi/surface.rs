use anyhow::Result;
use ash::vk;
use derivative::Derivative;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
#[cfg(feature = "log-lifetimes")]
use tracing::trace;

use crate::error::GpuResultExt;
use crate::traits::Destructible;

#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct Surface {
    handle: vk::SurfaceKHR,
    capabilities: Option<vk::SurfaceCapabilitiesKHR>,
    formats: Vec<vk::SurfaceFormatKHR>,
    present_modes: Vec<vk::PresentModeKHR>,
    #[derivative(Debug = "ignore")]
    ext: ash::khr::surface::Instance,
}

impl Surface {
    /// Construct a new [`Surface`] **without** any present modes, capabilities, and formats.
    /// See [`Surface::query_details`] to determine such.
    pub fn new<T>(entry: &ash::Entry, instance: &ash::Instance, window: &T) -> Result<Self>
    where
        T: HasWindowHandle + HasDisplayHandle,
    {
        let ext = ash::khr::surface::Instance::new(entry, instance);
        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                window.display_handle()?.as_raw(),
                window.window_handle()?.as_raw(),
                None,
            )
        }
        .gpu_op("vkCreateSurfaceKHR")?;

        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkSurfaceKHR {:?}", handle);

        Ok(Self {
            handle,
            capabilities: None,
            formats: Vec::new(),
            present_modes: Vec::new(),
            ext,
        })
    }

    /// Determine the [`vk::SurfaceCapabilitiesKHR`], [`vk::SurfaceFormatKHR`]s and
    /// [`vk::PresentModeKHR`]s for `physical_device`
    pub fn query_details(&mut self, physical_device: vk::PhysicalDevice) -> Result<()> {
        unsafe {
            self.capabilities = Some(
                self.ext
                    .get_physical_device_surface_capabilities(physical_device, self.handle)
                    .gpu_op("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?,
            );
            self.present_modes = self
                .ext
                .get_physical_device_surface_present_modes(physical_device, self.handle)
                .gpu_op("vkGetPhysicalDeviceSurfacePresentModesKHR")?;
            self.formats = self
                .ext
                .get_physical_device_surface_formats(physical_device, self.handle)
                .gpu_op("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
        }
        Ok(())
    }

    /// Whether `queue_family` of `physical_device` can present to this surface
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<bool> {
        Ok(unsafe {
            self.ext
                .get_physical_device_surface_support(physical_device, queue_family, self.handle)
                .gpu_op("vkGetPhysicalDeviceSurfaceSupportKHR")?
        })
    }

    pub fn get_capabilities(&self) -> Option<vk::SurfaceCapabilitiesKHR> {
        self.capabilities
    }

    pub fn get_formats(&self) -> &[vk::SurfaceFormatKHR] {
        &self.formats
    }

    pub fn get_present_modes(&self) -> &[vk::PresentModeKHR] {
        &self.present_modes
    }

    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }
}

impl Destructible for Surface {
    fn destroy(&mut self) {
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkSurfaceKHR {:?}", self.handle);

        unsafe {
            self.ext.destroy_surface(self.handle, None);
        }
    }
}
