use std::fmt::Debug;

use anyhow::Result;
use ash::vk;
use tracing::info;

use crate::device::Device;
use crate::KgalError;

/// A builder pattern struct to make creating a [`Swapchain`](crate::wsi::Swapchain) easier.
///
/// # Image format / Color space / Present mode picking
/// Preferences inserted first have the highest priority. The first available preference wins;
/// if none are available the first format/mode the surface reports is used.
#[derive(Debug, Clone)]
pub struct SwapchainBuilder {
    surface: vk::SurfaceKHR,
    capabilities: vk::SurfaceCapabilitiesKHR,
    available_formats: Vec<vk::SurfaceFormatKHR>,
    available_present_modes: Vec<vk::PresentModeKHR>,

    preferred_image_formats: Vec<vk::Format>,
    preferred_present_modes: Vec<vk::PresentModeKHR>,
    preferred_color_spaces: Vec<vk::ColorSpaceKHR>,

    image_usage: vk::ImageUsageFlags,
    image_extent: vk::Extent2D,
}

/// Finds the first element of `preferences` contained in `available`
fn find_first_occurrence<T: Copy + PartialEq + Debug>(
    preferences: &[T],
    available: &[T],
) -> Option<T> {
    preferences.iter().copied().find(|preference| available.contains(preference))
}

impl SwapchainBuilder {
    /// `surface` must have had [`query_details`](crate::wsi::Surface::query_details) called
    pub fn new(surface: &crate::wsi::Surface) -> Result<Self> {
        let capabilities = surface
            .get_capabilities()
            .ok_or(KgalError::UnsupportedSurfaceFormat)?;
        Ok(Self::from_details(
            surface.handle(),
            capabilities,
            surface.get_formats().to_vec(),
            surface.get_present_modes().to_vec(),
        ))
    }

    pub fn from_details(
        surface: vk::SurfaceKHR,
        capabilities: vk::SurfaceCapabilitiesKHR,
        available_formats: Vec<vk::SurfaceFormatKHR>,
        available_present_modes: Vec<vk::PresentModeKHR>,
    ) -> Self {
        Self {
            surface,
            capabilities,
            available_formats,
            available_present_modes,
            preferred_image_formats: Vec::new(),
            preferred_present_modes: Vec::new(),
            preferred_color_spaces: Vec::new(),
            image_usage: vk::ImageUsageFlags::empty(),
            image_extent: vk::Extent2D::default(),
        }
    }

    /// Adds an image format to search for in the swapchain.
    pub fn request_image_format(mut self, format: vk::Format) -> Self {
        self.preferred_image_formats.push(format);
        self
    }

    /// Adds a present mode to search in the swapchain to use.
    pub fn request_present_mode(mut self, present: vk::PresentModeKHR) -> Self {
        self.preferred_present_modes.push(present);
        self
    }

    /// Adds a color space for the swapchain to use.
    pub fn request_color_space(mut self, color: vk::ColorSpaceKHR) -> Self {
        self.preferred_color_spaces.push(color);
        self
    }

    /// Set image usage
    pub fn image_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.image_usage |= usage;
        self
    }

    /// Set swapchain image extents, clamped to the surface capabilities
    pub fn set_extent(mut self, extent: vk::Extent2D) -> Self {
        self.image_extent = self.clamp_extent(extent);
        self
    }

    /// Clamps extent to the surface capabilities
    pub fn clamp_extent(&self, extent: vk::Extent2D) -> vk::Extent2D {
        vk::Extent2D {
            width: extent.width.clamp(
                self.capabilities.min_image_extent.width,
                self.capabilities.max_image_extent.width,
            ),
            height: extent.height.clamp(
                self.capabilities.min_image_extent.height,
                self.capabilities.max_image_extent.height,
            ),
        }
    }

    fn surface_format(&self) -> Result<vk::SurfaceFormatKHR> {
        let formats: Vec<vk::Format> = self.available_formats.iter().map(|f| f.format).collect();
        let spaces: Vec<vk::ColorSpaceKHR> = self
            .available_formats
            .iter()
            .map(|f| f.color_space)
            .collect();
        match (
            find_first_occurrence(&self.preferred_image_formats, &formats),
            find_first_occurrence(&self.preferred_color_spaces, &spaces),
        ) {
            (Some(format), Some(color_space)) => Ok(vk::SurfaceFormatKHR { format, color_space }),
            _ => self
                .available_formats
                .first()
                .copied()
                .ok_or_else(|| KgalError::UnsupportedSurfaceFormat.into()),
        }
    }

    /// Assembles the create info without creating anything
    pub fn create_info(&self) -> Result<vk::SwapchainCreateInfoKHR<'static>> {
        let surface_format = self.surface_format()?;
        let present_mode = find_first_occurrence(
            &self.preferred_present_modes,
            &self.available_present_modes,
        )
        .unwrap_or(vk::PresentModeKHR::FIFO);
        let mut min_image_count = self.capabilities.min_image_count + 1;
        if self.capabilities.max_image_count > 0 {
            min_image_count = min_image_count.min(self.capabilities.max_image_count);
        }
        Ok(vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(min_image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(self.image_extent)
            .image_array_layers(1)
            .image_usage(self.image_usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(self.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true))
    }

    /// Builds the swapchain
    pub fn build<D: Device>(self, device: D) -> Result<crate::wsi::Swapchain<D>> {
        let swapchain_ci = self.create_info()?;
        let swapchain = crate::wsi::Swapchain::new(device, &swapchain_ci)?;
        info!(
            "Created {}x{} swapchain ({:?}, {:?}) with {} images",
            swapchain_ci.image_extent.width,
            swapchain_ci.image_extent.height,
            swapchain_ci.image_format,
            swapchain_ci.present_mode,
            swapchain.image_count()
        );
        Ok(swapchain)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn builder(formats: Vec<vk::SurfaceFormatKHR>) -> SwapchainBuilder {
        SwapchainBuilder::from_details(
            vk::SurfaceKHR::null(),
            vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 3,
                min_image_extent: vk::Extent2D { width: 1, height: 1 },
                max_image_extent: vk::Extent2D {
                    width: 1920,
                    height: 1080,
                },
                ..Default::default()
            },
            formats,
            vec![vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO],
        )
    }

    #[test]
    fn preferences_are_honoured_in_order() {
        let create_info = builder(vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ])
        .request_image_format(vk::Format::B8G8R8A8_UNORM)
        .request_color_space(vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .request_present_mode(vk::PresentModeKHR::FIFO)
        .image_usage(vk::ImageUsageFlags::TRANSFER_DST)
        .set_extent(vk::Extent2D {
            width: 4000,
            height: 720,
        })
        .create_info()
        .unwrap();

        assert_eq!(create_info.image_format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(create_info.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(create_info.min_image_count, 3);
        assert_eq!(
            create_info.image_extent,
            vk::Extent2D {
                width: 1920,
                height: 720
            }
        );
    }

    #[test]
    fn falls_back_to_first_reported_format() {
        let create_info = builder(vec![vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }])
        .request_image_format(vk::Format::B8G8R8A8_UNORM)
        .create_info()
        .unwrap();
        assert_eq!(create_info.image_format, vk::Format::R8G8B8A8_UNORM);

        assert!(builder(Vec::new()).create_info().is_err());
    }
}
