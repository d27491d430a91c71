use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use kgal::ash::vk;
use kgal::command::CommandBufferRecording;
use kgal::descriptor::{
    write_storage_image, DescriptorAllocator, DescriptorSetLayout, DescriptorSetLayoutBuilder,
};
use kgal::device::{Device, LogicalDevice};
use kgal::pipelines::{
    ComputePipeline, ComputePipelineBuilder, Pipeline, PipelineLayout, PipelineLayoutBuilder,
};
use kgal::resource::Resource;
use kgal::shader::Shader;
use kgal::traits::Destructible;

use crate::config::BackgroundColors;

/// Local workgroup size of the gradient shader in both dimensions
pub const WORKGROUP_SIZE: u32 = 16;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GradientPushConstants {
    pub top_color: glam::Vec4,
    pub bottom_color: glam::Vec4,
}

/// Workgroups needed to cover `extent`
pub fn workgroup_count(extent: vk::Extent2D) -> (u32, u32) {
    (
        extent.width.div_ceil(WORKGROUP_SIZE),
        extent.height.div_ceil(WORKGROUP_SIZE),
    )
}

/// Compute pass filling the draw image with a vertical gradient
#[derive(Debug, Clone)]
pub struct BackgroundPass<D: Device = LogicalDevice> {
    descriptor_set_layout: DescriptorSetLayout<D>,
    descriptor_set: vk::DescriptorSet,
    layout: PipelineLayout<D>,
    pipeline: ComputePipeline<D>,
    colors: BackgroundColors,
}

impl<D: Device> BackgroundPass<D> {
    /// Builds the pipeline and points its storage image binding at `draw_image_view`
    pub fn new(
        device: D,
        descriptors: &mut DescriptorAllocator<D>,
        draw_image_view: vk::ImageView,
        shader_code: &[u8],
        colors: BackgroundColors,
    ) -> Result<Self> {
        let descriptor_set_layout = DescriptorSetLayoutBuilder::default()
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE)
            .build(
                device.clone(),
                vk::ShaderStageFlags::COMPUTE,
                vk::DescriptorSetLayoutCreateFlags::empty(),
            )?;
        let descriptor_set = descriptors.allocate(descriptor_set_layout.handle())?;
        write_storage_image(&device, descriptor_set, 0, draw_image_view);

        let layout = PipelineLayoutBuilder::default()
            .push_descriptor_sets(&[descriptor_set_layout.handle()])
            .push_push_constant_struct::<GradientPushConstants>(vk::ShaderStageFlags::COMPUTE)
            .build(device.clone(), vk::PipelineLayoutCreateFlags::empty())?;
        let pipeline = match Shader::from_bytes(device.clone(), shader_code).and_then(|shader| {
            ComputePipelineBuilder::default()
                .replace_layout(layout.handle())
                .replace_shader(shader)
                .build(device)
        }) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                let (mut layout, mut descriptor_set_layout) = (layout, descriptor_set_layout);
                layout.destroy();
                descriptor_set_layout.destroy();
                return Err(e);
            }
        };
        Ok(Self {
            descriptor_set_layout,
            descriptor_set,
            layout,
            pipeline,
            colors,
        })
    }

    /// Gradient for `frame_number`. The bottom colour's blue channel pulses over time.
    pub fn push_constants(&self, frame_number: u64) -> GradientPushConstants {
        let flash = (frame_number as f64 / 120.0).sin().abs() as f32;
        let mut bottom_color = self.colors.bottom;
        bottom_color.z *= flash;
        GradientPushConstants {
            top_color: self.colors.top,
            bottom_color,
        }
    }

    /// Records the dispatch. The draw image must be in [`vk::ImageLayout::GENERAL`].
    pub fn record(&self, cmd: &CommandBufferRecording<D>, extent: vk::Extent2D, frame_number: u64) {
        cmd.bind_pipeline(vk::PipelineBindPoint::COMPUTE, self.pipeline.handle());
        cmd.bind_descriptor_sets(
            vk::PipelineBindPoint::COMPUTE,
            self.layout.handle(),
            &[self.descriptor_set],
        );
        let push_constants = self.push_constants(frame_number);
        cmd.push_constants(
            self.layout.handle(),
            vk::ShaderStageFlags::COMPUTE,
            bytemuck::bytes_of(&push_constants),
        );
        let (x, y) = workgroup_count(extent);
        cmd.dispatch(x, y, 1);
    }
}

impl<D: Device> Destructible for BackgroundPass<D> {
    fn destroy(&mut self) {
        self.pipeline.destroy();
        self.layout.destroy();
        self.descriptor_set_layout.destroy();
    }
}

#[cfg(test)]
mod test {
    use kgal::descriptor::PoolSizeRatio;
    use kgal::testing::{DeviceCall, TestDevice, MINIMAL_SPIRV};

    use super::*;

    #[test]
    fn dispatch_covers_partial_tiles() {
        assert_eq!(
            workgroup_count(vk::Extent2D {
                width: 1280,
                height: 720
            }),
            (80, 45)
        );
        assert_eq!(
            workgroup_count(vk::Extent2D {
                width: 1281,
                height: 1
            }),
            (81, 1)
        );
    }

    #[test]
    fn records_gradient_dispatch() {
        let device = TestDevice::new();
        let mut descriptors = DescriptorAllocator::new(
            device.clone(),
            10,
            &[PoolSizeRatio::default()
                .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
                .ratio(1.0)],
        )
        .unwrap();
        let mut pass = BackgroundPass::new(
            device.clone(),
            &mut descriptors,
            vk::ImageView::null(),
            &MINIMAL_SPIRV,
            BackgroundColors::default(),
        )
        .unwrap();
        let mut pool =
            kgal::command::CommandPool::new(device.clone(), 0, vk::CommandPoolCreateFlags::empty())
                .unwrap();
        let cmd = pool.allocate(1).unwrap().pop().unwrap();
        let cmd = cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT).unwrap();
        device.clear_calls();

        pass.record(
            &cmd,
            vk::Extent2D {
                width: 1280,
                height: 720,
            },
            0,
        );

        let calls = device.calls();
        assert!(matches!(
            calls[0],
            DeviceCall::BindPipeline(vk::PipelineBindPoint::COMPUTE, _)
        ));
        assert!(calls.contains(&DeviceCall::PushConstants {
            stages: vk::ShaderStageFlags::COMPUTE,
            size: std::mem::size_of::<GradientPushConstants>(),
        }));
        assert_eq!(calls.last(), Some(&DeviceCall::Dispatch(80, 45, 1)));

        pass.destroy();
        descriptors.destroy();
        pool.destroy();
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn bottom_colour_flashes() {
        let device = TestDevice::new();
        let mut descriptors = DescriptorAllocator::new(
            device.clone(),
            1,
            &[PoolSizeRatio::default()
                .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
                .ratio(1.0)],
        )
        .unwrap();
        let mut pass = BackgroundPass::new(
            device.clone(),
            &mut descriptors,
            vk::ImageView::null(),
            &MINIMAL_SPIRV,
            BackgroundColors::default(),
        )
        .unwrap();

        assert_eq!(pass.push_constants(0).bottom_color.z, 0.0);
        let peak = pass.push_constants(188).bottom_color.z;
        assert!(peak > 0.99 && peak <= 1.0);
        assert_eq!(pass.push_constants(5).top_color, glam::Vec4::new(1.0, 0.0, 0.0, 1.0));
        pass.destroy();
        descriptors.destroy();
    }
}
