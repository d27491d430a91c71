use anyhow::Result;
use ash::vk;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;

use crate::device::{Device, LogicalDevice};
use crate::error::GpuResultExt;
use crate::resource::traits::LayoutTracked;
use crate::traits::Destructible;

/// A presentable image owned by its [`Swapchain`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainImage {
    handle: vk::Image,
    view: vk::ImageView,
    layout: vk::ImageLayout,
}

impl SwapchainImage {
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }
}

impl LayoutTracked for SwapchainImage {
    fn image(&self) -> vk::Image {
        self.handle
    }

    fn aspect(&self) -> vk::ImageAspectFlags {
        vk::ImageAspectFlags::COLOR
    }

    fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    fn set_layout(&mut self, layout: vk::ImageLayout) {
        self.layout = layout;
    }
}

/// A [`vk::SwapchainKHR`] together with its images and views.
///
/// It is never patched in place. Handling a new surface size means destroying it and building a
/// new one through [`SwapchainBuilder`](crate::bootstrap::SwapchainBuilder).
#[derive(Debug)]
pub struct Swapchain<D: Device = LogicalDevice> {
    handle: vk::SwapchainKHR,
    device: D,
    images: Vec<SwapchainImage>,
    format: vk::Format,
    extent: vk::Extent2D,
    usage_flags: vk::ImageUsageFlags,
}

impl<D: Device> Swapchain<D> {
    /// Construct a basic swapchain. For an easier build of a swapchain, see
    /// [`bootstrap::SwapchainBuilder`](crate::bootstrap::SwapchainBuilder).
    pub fn new(device: D, swapchain_ci: &vk::SwapchainCreateInfoKHR) -> Result<Self> {
        let handle = device
            .create_swapchain(swapchain_ci)
            .gpu_op("vkCreateSwapchainKHR")?;

        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkSwapchainKHR {:?}", handle);

        let mut swapchain = Self {
            handle,
            device,
            images: Vec::new(),
            format: swapchain_ci.image_format,
            extent: swapchain_ci.image_extent,
            usage_flags: swapchain_ci.image_usage,
        };
        if let Err(e) = swapchain.create_images() {
            swapchain.destroy();
            return Err(e);
        }
        Ok(swapchain)
    }

    fn create_images(&mut self) -> Result<()> {
        let images = self
            .device
            .get_swapchain_images(self.handle)
            .gpu_op("vkGetSwapchainImagesKHR")?;
        for image in images {
            let view = self
                .device
                .create_image_view(
                    &vk::ImageViewCreateInfo::default()
                        .image(image)
                        .view_type(vk::ImageViewType::TYPE_2D)
                        .format(self.format)
                        .subresource_range(vk::ImageSubresourceRange {
                            aspect_mask: vk::ImageAspectFlags::COLOR,
                            base_mip_level: 0,
                            level_count: 1,
                            base_array_layer: 0,
                            layer_count: 1,
                        }),
                )
                .gpu_op("vkCreateImageView")?;
            self.images.push(SwapchainImage {
                handle: image,
                view,
                layout: vk::ImageLayout::UNDEFINED,
            });
        }
        Ok(())
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn images(&self) -> &[SwapchainImage] {
        &self.images
    }

    pub fn image_mut(&mut self, index: u32) -> Option<&mut SwapchainImage> {
        self.images.get_mut(index as usize)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn usage_flags(&self) -> vk::ImageUsageFlags {
        self.usage_flags
    }

    /// Acquires the next presentable image, signalling `semaphore` once it may be written.
    /// Returns the image index and whether the swapchain is suboptimal.
    pub fn next_image_index(&self, timeout: u64, semaphore: vk::Semaphore) -> Result<(u32, bool)> {
        Ok(self
            .device
            .acquire_next_image(self.handle, timeout, semaphore)
            .gpu_op("vkAcquireNextImageKHR")?)
    }

    /// Queues `image_index` for presentation once `wait_semaphore` signals. Returns whether the
    /// swapchain is suboptimal.
    pub fn present(
        &self,
        queue: vk::Queue,
        wait_semaphore: vk::Semaphore,
        image_index: u32,
    ) -> Result<bool> {
        let swapchains = [self.handle];
        let wait_semaphores = [wait_semaphore];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .swapchains(&swapchains)
            .wait_semaphores(&wait_semaphores)
            .image_indices(&image_indices);
        Ok(self
            .device
            .queue_present(queue, &present_info)
            .gpu_op("vkQueuePresentKHR")?)
    }
}

impl<D: Device> Destructible for Swapchain<D> {
    fn destroy(&mut self) {
        for image in self.images.drain(..) {
            self.device.destroy_image_view(image.view);
        }

        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkSwapchainKHR {:?}", self.handle);

        self.device.destroy_swapchain(self.handle);
    }
}

#[cfg(test)]
mod test {
    use ash::vk::Handle;

    use super::*;
    use crate::testing::{DeviceCall, TestDevice};

    fn swapchain(device: &TestDevice) -> Swapchain<TestDevice> {
        Swapchain::new(
            device.clone(),
            &vk::SwapchainCreateInfoKHR::default()
                .image_format(vk::Format::B8G8R8A8_UNORM)
                .image_extent(vk::Extent2D {
                    width: 1280,
                    height: 720,
                })
                .image_usage(
                    vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
                ),
        )
        .unwrap()
    }

    #[test]
    fn owns_one_view_per_image() {
        let device = TestDevice::new();
        device.set_swapchain_image_count(4);
        let mut swapchain = swapchain(&device);
        assert_eq!(swapchain.image_count(), 4);
        assert!(swapchain
            .images()
            .iter()
            .all(|image| image.layout() == vk::ImageLayout::UNDEFINED));

        swapchain.destroy();
        assert_eq!(
            device.count_calls(|call| matches!(call, DeviceCall::DestroyImageView(_))),
            4
        );
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn present_waits_on_given_semaphore() {
        let device = TestDevice::new();
        let mut swapchain = swapchain(&device);
        let semaphore = vk::Semaphore::from_raw(77);
        let (index, suboptimal) = swapchain.next_image_index(u64::MAX, semaphore).unwrap();
        assert!(!suboptimal);
        swapchain.present(vk::Queue::null(), semaphore, index).unwrap();

        assert!(device.calls().contains(&DeviceCall::QueuePresent {
            image_indices: vec![index],
            wait: vec![semaphore],
        }));
        swapchain.destroy();
    }
}
