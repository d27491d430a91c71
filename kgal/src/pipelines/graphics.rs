use anyhow::Result;
use ash::vk;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;

use crate::device::{Device, LogicalDevice};
use crate::error::GpuResultExt;
use crate::pipelines::traits::{Pipeline, SHADER_ENTRY};
use crate::shader::Shader;
use crate::traits::Destructible;

#[derive(Debug, Clone)]
pub struct GraphicsPipeline<D: Device = LogicalDevice> {
    handle: vk::Pipeline,
    device: D,
}

impl<D: Device> Destructible for GraphicsPipeline<D> {
    fn destroy(&mut self) {
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkPipeline {:?}", self.handle);

        self.device.destroy_pipeline(self.handle);
    }
}

impl<D: Device> Pipeline for GraphicsPipeline<D> {
    const BIND_POINT: vk::PipelineBindPoint = vk::PipelineBindPoint::GRAPHICS;

    fn handle(&self) -> vk::Pipeline {
        self.handle
    }
}

/// Builds a graphics pipeline for dynamic rendering. Viewport and scissor are always dynamic.
#[derive(Debug)]
pub struct GraphicsPipelineBuilder<D: Device = LogicalDevice> {
    shaders: Vec<(vk::ShaderStageFlags, Shader<D>)>,
    topology: vk::PrimitiveTopology,
    polygon_mode: vk::PolygonMode,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,
    color_blend_attachment: vk::PipelineColorBlendAttachmentState,
    depth_stencil: vk::PipelineDepthStencilStateCreateInfo<'static>,
    layout: vk::PipelineLayout,
    color_attachment_format: Option<vk::Format>,
    depth_attachment_format: vk::Format,
}

impl<D: Device> Default for GraphicsPipelineBuilder<D> {
    fn default() -> Self {
        Self {
            shaders: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            color_blend_attachment: vk::PipelineColorBlendAttachmentState::default(),
            depth_stencil: vk::PipelineDepthStencilStateCreateInfo::default(),
            layout: vk::PipelineLayout::null(),
            color_attachment_format: None,
            depth_attachment_format: vk::Format::UNDEFINED,
        }
    }
}

impl<D: Device> GraphicsPipelineBuilder<D> {
    pub fn replace_layout(mut self, layout: vk::PipelineLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Replaces the shader of `stage`. The builder owns the module and destroys it once the
    /// pipeline is built.
    pub fn replace_shader(mut self, shader: Shader<D>, stage: vk::ShaderStageFlags) -> Self {
        if let Some(index) = self.shaders.iter().position(|(s, _)| *s == stage) {
            let (_, mut old) = self.shaders.remove(index);
            old.destroy();
        }
        self.shaders.push((stage, shader));
        self
    }

    pub fn set_input_topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn set_polygon_mode(mut self, poly_mode: vk::PolygonMode) -> Self {
        self.polygon_mode = poly_mode;
        self
    }

    pub fn set_cull_mode(
        mut self,
        cull_mode: vk::CullModeFlags,
        front_face: vk::FrontFace,
    ) -> Self {
        self.cull_mode = cull_mode;
        self.front_face = front_face;
        self
    }

    pub fn disable_blending(mut self) -> Self {
        self.color_blend_attachment.color_write_mask = vk::ColorComponentFlags::RGBA;
        self.color_blend_attachment.blend_enable = vk::FALSE;
        self
    }

    pub fn set_color_attachment(mut self, format: vk::Format) -> Self {
        self.color_attachment_format = Some(format);
        self
    }

    pub fn set_depth_format(mut self, format: vk::Format) -> Self {
        self.depth_attachment_format = format;
        self
    }

    pub fn disable_depth_test(mut self) -> Self {
        self.depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(false)
            .depth_write_enable(false)
            .depth_compare_op(vk::CompareOp::NEVER)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);
        self
    }

    pub fn enable_depth_test(
        mut self,
        depth_write_enable: bool,
        compare_op: vk::CompareOp,
    ) -> Self {
        self.depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(depth_write_enable)
            .depth_compare_op(compare_op)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);
        self
    }

    pub fn build(mut self, device: D) -> Result<GraphicsPipeline<D>> {
        let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = self
            .shaders
            .iter()
            .map(|(stage, shader)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(*stage)
                    .module(shader.handle())
                    .name(SHADER_ENTRY)
            })
            .collect();
        let color_formats: Vec<vk::Format> = self.color_attachment_format.into_iter().collect();
        let mut render_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(self.depth_attachment_format);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let blend_attachments = [self.color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&blend_attachments);
        // Vertices are pulled through buffer device addresses
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::default();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology)
            .primitive_restart_enable(false);
        let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(self.polygon_mode)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face);
        let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0)
            .alpha_to_coverage_enable(false)
            .alpha_to_one_enable(false);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_info =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .push_next(&mut render_info)
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&self.depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_info)
            .layout(self.layout);

        let handle = device
            .create_graphics_pipeline(&pipeline_info)
            .gpu_op("vkCreateGraphicsPipelines");
        for (_, mut shader) in self.shaders.drain(..) {
            shader.destroy();
        }
        let handle = handle?;

        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkPipeline {:?}", handle);

        Ok(GraphicsPipeline { handle, device })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pipelines::{ComputePipelineBuilder, PipelineLayoutBuilder};
    use crate::testing::{TestDevice, MINIMAL_SPIRV};

    #[test]
    fn builders_release_shader_modules() {
        let device = TestDevice::new();
        let mut layout = PipelineLayoutBuilder::default()
            .push_push_constant_struct::<[f32; 8]>(vk::ShaderStageFlags::COMPUTE)
            .build(device.clone(), vk::PipelineLayoutCreateFlags::empty())
            .unwrap();

        let mut compute = ComputePipelineBuilder::default()
            .replace_layout(layout.handle())
            .replace_shader(Shader::from_bytes(device.clone(), &MINIMAL_SPIRV).unwrap())
            .build(device.clone())
            .unwrap();
        let mut graphics = GraphicsPipelineBuilder::default()
            .replace_layout(layout.handle())
            .replace_shader(
                Shader::from_bytes(device.clone(), &MINIMAL_SPIRV).unwrap(),
                vk::ShaderStageFlags::VERTEX,
            )
            .replace_shader(
                Shader::from_bytes(device.clone(), &MINIMAL_SPIRV).unwrap(),
                vk::ShaderStageFlags::FRAGMENT,
            )
            .set_color_attachment(vk::Format::R16G16B16A16_SFLOAT)
            .set_depth_format(vk::Format::D32_SFLOAT)
            .enable_depth_test(true, vk::CompareOp::GREATER_OR_EQUAL)
            .disable_blending()
            .build(device.clone())
            .unwrap();

        // layout + two pipelines
        assert_eq!(device.live_object_count(), 3);
        compute.destroy();
        graphics.destroy();
        layout.destroy();
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn failed_build_still_releases_shaders() {
        let device = TestDevice::new();
        device.fail_next("create_graphics_pipeline", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        let result = GraphicsPipelineBuilder::default()
            .replace_shader(
                Shader::from_bytes(device.clone(), &MINIMAL_SPIRV).unwrap(),
                vk::ShaderStageFlags::VERTEX,
            )
            .build(device.clone());
        assert!(result.is_err());
        assert_eq!(device.live_object_count(), 0);
    }
}
