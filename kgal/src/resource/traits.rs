use std::fmt::Debug;

use anyhow::Result;
use ash::vk;

use crate::device::Device;
use crate::traits::Destructible;

/// Every resource in Vulkan is expected to have a lifetime + debuggable
pub trait Resource: Destructible + Debug + Sized {
    type CreateInfo<'a>;
    type HandleType;

    /// Attempt to create a new resource given the [`Self::CreateInfo`] struct
    fn new(create_info: Self::CreateInfo<'_>) -> Result<Self>;

    /// Copy of the underlying handle
    fn handle(&self) -> Self::HandleType;
}

/// An image whose current [`vk::ImageLayout`] travels with it
pub trait LayoutTracked {
    fn image(&self) -> vk::Image;

    fn aspect(&self) -> vk::ImageAspectFlags;

    /// Layout the image is in once all recorded work executes
    fn layout(&self) -> vk::ImageLayout;

    fn set_layout(&mut self, layout: vk::ImageLayout);

    /// Records a barrier moving the image from `current` to `desired`.
    ///
    /// `current` must match the tracked layout unless it is [`vk::ImageLayout::UNDEFINED`],
    /// which discards the contents.
    fn transition<D: Device>(
        &mut self,
        cmd: &crate::command::CommandBufferRecording<D>,
        current: vk::ImageLayout,
        desired: vk::ImageLayout,
    ) {
        debug_assert!(
            current == vk::ImageLayout::UNDEFINED || current == self.layout(),
            "Image {:?} is in {:?}, not {:?}",
            self.image(),
            self.layout(),
            current
        );
        crate::resource::record_transition(cmd, self.image(), self.aspect(), current, desired);
        self.set_layout(desired);
    }
}
