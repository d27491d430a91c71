use anyhow::Result;
use ash::vk;

use crate::device::Device;
use crate::pipelines::PipelineLayout;

#[derive(Default, Debug)]
pub struct PipelineLayoutBuilder {
    push_constant_ranges: Vec<vk::PushConstantRange>,
    descriptor_sets: Vec<vk::DescriptorSetLayout>,
}

impl PipelineLayoutBuilder {
    /// Add a push constant range to be added to the pipeline layout
    pub fn push_push_constant_ranges(mut self, push_constants: &[vk::PushConstantRange]) -> Self {
        self.push_constant_ranges.extend_from_slice(push_constants);
        self
    }

    /// Adds a push constant range covering `T` from offset 0.
    ///
    /// **It is recommended you only use types which have `#[repr(C)]`**.
    pub fn push_push_constant_struct<T: Sized>(self, stage_flags: vk::ShaderStageFlags) -> Self {
        self.push_push_constant_ranges(&[vk::PushConstantRange {
            stage_flags,
            offset: 0,
            size: std::mem::size_of::<T>() as u32,
        }])
    }

    /// Add descriptor sets to the pipeline layout
    pub fn push_descriptor_sets(mut self, descriptor_sets: &[vk::DescriptorSetLayout]) -> Self {
        self.descriptor_sets.extend_from_slice(descriptor_sets);
        self
    }

    pub fn build<D: Device>(
        self,
        device: D,
        flags: vk::PipelineLayoutCreateFlags,
    ) -> Result<PipelineLayout<D>> {
        PipelineLayout::new(
            device,
            &vk::PipelineLayoutCreateInfo::default()
                .flags(flags)
                .set_layouts(&self.descriptor_sets)
                .push_constant_ranges(&self.push_constant_ranges),
        )
    }
}
