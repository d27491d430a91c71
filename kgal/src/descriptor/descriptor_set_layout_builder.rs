use anyhow::Result;
use ash::vk;

use crate::descriptor::{DescriptorSetLayout, DescriptorSetLayoutCreateInfo};
use crate::device::Device;
use crate::error::GpuResultExt;
use crate::resource::traits::Resource;

#[derive(Clone, Debug, Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorSetLayoutBuilder {
    /// Adds a single-descriptor binding. Stages are supplied at [`Self::build`].
    pub fn add_binding(mut self, binding: u32, ty: vk::DescriptorType) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(1),
        );
        self
    }

    /// Clear of all bindings
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'static>] {
        &self.bindings
    }

    /// Builds the descriptor layout, making every binding visible to `stages`
    pub fn build<D: Device>(
        &self,
        device: D,
        stages: vk::ShaderStageFlags,
        create_flags: vk::DescriptorSetLayoutCreateFlags,
    ) -> Result<DescriptorSetLayout<D>> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = self
            .bindings
            .iter()
            .map(|binding| {
                let mut binding = *binding;
                binding.stage_flags |= stages;
                binding
            })
            .collect();
        let handle = device
            .create_descriptor_set_layout(
                &vk::DescriptorSetLayoutCreateInfo::default()
                    .flags(create_flags)
                    .bindings(&bindings),
            )
            .gpu_op("vkCreateDescriptorSetLayout")?;
        DescriptorSetLayout::new(DescriptorSetLayoutCreateInfo::FromVk { handle, device })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{DeviceCall, TestDevice};
    use crate::traits::Destructible;

    #[test]
    fn build_applies_stage_to_every_binding() {
        let device = TestDevice::new();
        let mut layout = DescriptorSetLayoutBuilder::default()
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE)
            .add_binding(1, vk::DescriptorType::UNIFORM_BUFFER)
            .build(
                device.clone(),
                vk::ShaderStageFlags::COMPUTE,
                vk::DescriptorSetLayoutCreateFlags::empty(),
            )
            .unwrap();

        let bindings = device
            .calls()
            .into_iter()
            .find_map(|call| match call {
                DeviceCall::CreateDescriptorSetLayout { bindings, .. } => Some(bindings),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            bindings,
            vec![
                (0, vk::DescriptorType::STORAGE_IMAGE, vk::ShaderStageFlags::COMPUTE),
                (1, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::COMPUTE),
            ]
        );
        layout.destroy();
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn clear_drops_bindings() {
        let mut builder = DescriptorSetLayoutBuilder::default()
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE);
        builder.clear();
        assert!(builder.bindings().is_empty());
    }
}
