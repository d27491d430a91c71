use anyhow::Result;
use ash::vk;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;

use crate::allocators::{Allocator, GpuAllocator, MemoryAllocation, MemoryLocation};
use crate::command::CommandBufferRecording;
use crate::device::{Device, LogicalDevice};
use crate::error::GpuResultExt;
use crate::resource::traits::{LayoutTracked, Resource};
use crate::traits::Destructible;

/// A [`vk::Image`] with its full view, backing memory and tracked layout
#[derive(Debug, Clone)]
pub struct Image<D: Device = LogicalDevice, A: Allocator = GpuAllocator> {
    handle: vk::Image,
    view: vk::ImageView,
    device: D,
    allocation: Option<MemoryAllocation<A>>,
    format: vk::Format,
    extent: vk::Extent3D,
    aspect: vk::ImageAspectFlags,
    usage_flags: vk::ImageUsageFlags,
    layout: vk::ImageLayout,
    name: String,
}

pub enum ImageCreateInfo<'a, D: Device, A: Allocator> {
    /// Allocates a new 2D image with a single mip level and a view over all of it
    NewAllocated {
        device: D,
        allocator: &'a mut A,
        format: vk::Format,
        extent: vk::Extent3D,
        usage_flags: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
        location: MemoryLocation,
        name: &'a str,
    },
}

impl<D: Device, A: Allocator> Image<D, A> {
    /// Acquire image usage flags
    pub fn usage_flags(&self) -> vk::ImageUsageFlags {
        self.usage_flags
    }

    /// Acquire image format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Acquire image extent
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }
}

impl<D: Device, A: Allocator> LayoutTracked for Image<D, A> {
    fn image(&self) -> vk::Image {
        self.handle
    }

    fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    fn set_layout(&mut self, layout: vk::ImageLayout) {
        self.layout = layout;
    }
}

impl<D: Device, A: Allocator> Resource for Image<D, A> {
    type CreateInfo<'a> = ImageCreateInfo<'a, D, A>;
    type HandleType = vk::Image;

    fn new(create_info: Self::CreateInfo<'_>) -> Result<Self> {
        match create_info {
            ImageCreateInfo::NewAllocated {
                device,
                allocator,
                format,
                extent,
                usage_flags,
                aspect,
                location,
                name,
            } => {
                let handle = device
                    .create_image(
                        &vk::ImageCreateInfo::default()
                            .image_type(vk::ImageType::TYPE_2D)
                            .format(format)
                            .extent(extent)
                            .mip_levels(1)
                            .array_layers(1)
                            .samples(vk::SampleCountFlags::TYPE_1)
                            .tiling(vk::ImageTiling::OPTIMAL)
                            .usage(usage_flags)
                            .initial_layout(vk::ImageLayout::UNDEFINED),
                    )
                    .gpu_op("vkCreateImage")?;

                #[cfg(feature = "log-lifetimes")]
                trace!("Creating VkImage {:?} ({})", handle, name);

                let requirements = device.image_memory_requirements(handle);
                let allocation = match MemoryAllocation::new(
                    allocator,
                    name,
                    &requirements,
                    location,
                    false,
                ) {
                    Ok(allocation) => allocation,
                    Err(e) => {
                        device.destroy_image(handle);
                        return Err(e);
                    }
                };
                let mut image = Self {
                    handle,
                    view: vk::ImageView::null(),
                    device,
                    allocation: Some(allocation.clone()),
                    format,
                    extent,
                    aspect,
                    usage_flags,
                    layout: vk::ImageLayout::UNDEFINED,
                    name: name.to_string(),
                };
                let bound = image
                    .device
                    .bind_image_memory(handle, allocation.memory()?, allocation.offset()?)
                    .gpu_op("vkBindImageMemory")
                    .and_then(|_| {
                        image
                            .device
                            .create_image_view(
                                &vk::ImageViewCreateInfo::default()
                                    .image(handle)
                                    .view_type(vk::ImageViewType::TYPE_2D)
                                    .format(format)
                                    .subresource_range(full_range(aspect)),
                            )
                            .gpu_op("vkCreateImageView")
                    });
                match bound {
                    Ok(view) => {
                        image.view = view;
                        Ok(image)
                    }
                    Err(e) => {
                        image.destroy();
                        Err(e.into())
                    }
                }
            }
        }
    }

    fn handle(&self) -> vk::Image {
        self.handle
    }
}

impl<D: Device, A: Allocator> Destructible for Image<D, A> {
    fn destroy(&mut self) {
        let Some(mut allocation) = self.allocation.take() else {
            return;
        };
        if allocation.is_freed() {
            return;
        }

        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkImage {:?} ({})", self.handle, self.name);

        if self.view != vk::ImageView::null() {
            self.device.destroy_image_view(self.view);
        }
        self.device.destroy_image(self.handle);
        allocation.destroy();
    }
}

fn full_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: vk::REMAINING_MIP_LEVELS,
        base_array_layer: 0,
        layer_count: vk::REMAINING_ARRAY_LAYERS,
    }
}

/// Records a full-image layout transition. Uses [`vk::PipelineStageFlags2::ALL_COMMANDS`] on
/// both sides, which is coarse but correct for every transition the renderer issues.
pub fn record_transition<D: Device>(
    cmd: &CommandBufferRecording<D>,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    current_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let image_barrier = vk::ImageMemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
        .old_layout(current_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(full_range(aspect));
    let dependency_info =
        vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&image_barrier));
    cmd.get_device()
        .cmd_pipeline_barrier(cmd.handle(), &dependency_info);
}

/// Blits the whole color contents of `src` onto `dst`, scaling between the two extents.
/// `src` must be in TRANSFER_SRC_OPTIMAL and `dst` in TRANSFER_DST_OPTIMAL.
pub fn blit_image<D: Device>(
    cmd: &CommandBufferRecording<D>,
    src: vk::Image,
    dst: vk::Image,
    src_extent: vk::Extent2D,
    dst_extent: vk::Extent2D,
) {
    let subresource = vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    };
    let blit_region = vk::ImageBlit2::default()
        .src_subresource(subresource)
        .src_offsets([
            vk::Offset3D { x: 0, y: 0, z: 0 },
            vk::Offset3D {
                x: src_extent.width as i32,
                y: src_extent.height as i32,
                z: 1,
            },
        ])
        .dst_subresource(subresource)
        .dst_offsets([
            vk::Offset3D { x: 0, y: 0, z: 0 },
            vk::Offset3D {
                x: dst_extent.width as i32,
                y: dst_extent.height as i32,
                z: 1,
            },
        ]);
    let blit_info = vk::BlitImageInfo2::default()
        .src_image(src)
        .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        .dst_image(dst)
        .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .regions(std::slice::from_ref(&blit_region))
        .filter(vk::Filter::LINEAR);
    cmd.get_device().cmd_blit_image(cmd.handle(), &blit_info);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::allocators::TestAllocator;
    use crate::testing::{DeviceCall, TestDevice};

    fn draw_image(
        device: &TestDevice,
        allocator: &mut TestAllocator,
    ) -> Image<TestDevice, TestAllocator> {
        Image::new(ImageCreateInfo::NewAllocated {
            device: device.clone(),
            allocator,
            format: vk::Format::R16G16B16A16_SFLOAT,
            extent: vk::Extent3D {
                width: 64,
                height: 32,
                depth: 1,
            },
            usage_flags: vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_SRC,
            aspect: vk::ImageAspectFlags::COLOR,
            location: MemoryLocation::GpuOnly,
            name: "draw image",
        })
        .unwrap()
    }

    #[test]
    fn transition_tracks_layout() {
        let device = TestDevice::new();
        let mut allocator = TestAllocator::new(device.clone());
        let mut image = draw_image(&device, &mut allocator);
        let cmd = crate::command::CommandBuffer::new(vk::CommandBuffer::null(), device.clone())
            .begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            .unwrap();

        image.transition(&cmd, vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL);
        image.transition(&cmd, vk::ImageLayout::GENERAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);

        assert_eq!(image.layout(), vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        let barriers: Vec<_> = device
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                DeviceCall::PipelineBarrier { images } => Some(images),
                _ => None,
            })
            .flatten()
            .map(|(_, old, new)| (old, new))
            .collect();
        assert_eq!(
            barriers,
            vec![
                (vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL),
                (vk::ImageLayout::GENERAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
            ]
        );
        image.destroy();
    }

    #[test]
    fn destroy_releases_view_image_and_memory() {
        let device = TestDevice::new();
        let mut allocator = TestAllocator::new(device.clone());
        let mut image = draw_image(&device, &mut allocator);
        let mut shared = image.clone();
        image.destroy();
        shared.destroy();

        assert_eq!(device.live_object_count(), 0);
        assert_eq!(device.live_memory_count(), 0);
    }
}
