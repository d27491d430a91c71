use anyhow::Result;
use bytemuck::{Pod, Zeroable};
use kgal::allocators::Allocator;
use kgal::ash::vk;
use kgal::command::CommandBufferRecording;
use kgal::device::{Device, LogicalDevice};
use kgal::pipelines::{
    GraphicsPipeline, GraphicsPipelineBuilder, Pipeline, PipelineLayout, PipelineLayoutBuilder,
};
use kgal::resource::Resource;
use kgal::shader::Shader;
use kgal::traits::Destructible;

use crate::mesh::MeshAsset;

/// Per-draw constants read by the vertex shader. Vertices are pulled from `vertex_buffer`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DrawPushConstants {
    pub world_matrix: glam::Mat4,
    pub vertex_buffer: vk::DeviceAddress,
    _pad: u64,
}

impl DrawPushConstants {
    pub fn new(world_matrix: glam::Mat4, vertex_buffer: vk::DeviceAddress) -> Self {
        Self {
            world_matrix,
            vertex_buffer,
            _pad: 0,
        }
    }
}

/// View-projection of the fixed camera five units in front of the origin
pub fn camera_matrix(extent: vk::Extent2D) -> glam::Mat4 {
    let view = glam::Mat4::from_translation(glam::Vec3::new(0.0, 0.0, -5.0));
    let aspect = extent.width as f32 / extent.height.max(1) as f32;
    let mut projection = glam::Mat4::perspective_rh(70f32.to_radians(), aspect, 0.1, 10000.0);
    // Vulkan clip space has +Y pointing down
    projection.y_axis.y *= -1.0;
    projection * view
}

/// Graphics pass drawing every uploaded mesh surface into the draw and depth images
#[derive(Debug, Clone)]
pub struct GeometryPass<D: Device = LogicalDevice> {
    layout: PipelineLayout<D>,
    pipeline: GraphicsPipeline<D>,
}

impl<D: Device> GeometryPass<D> {
    pub fn new(
        device: D,
        vertex_code: &[u8],
        fragment_code: &[u8],
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<Self> {
        let layout = PipelineLayoutBuilder::default()
            .push_push_constant_struct::<DrawPushConstants>(vk::ShaderStageFlags::VERTEX)
            .build(device.clone(), vk::PipelineLayoutCreateFlags::empty())?;
        let pipeline = match Self::build_pipeline(
            device,
            layout.handle(),
            vertex_code,
            fragment_code,
            color_format,
            depth_format,
        ) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                let mut layout = layout;
                layout.destroy();
                return Err(e);
            }
        };
        Ok(Self { layout, pipeline })
    }

    fn build_pipeline(
        device: D,
        layout: vk::PipelineLayout,
        vertex_code: &[u8],
        fragment_code: &[u8],
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Result<GraphicsPipeline<D>> {
        let mut vertex = Shader::from_bytes(device.clone(), vertex_code)?;
        let fragment = match Shader::from_bytes(device.clone(), fragment_code) {
            Ok(fragment) => fragment,
            Err(e) => {
                vertex.destroy();
                return Err(e);
            }
        };
        GraphicsPipelineBuilder::default()
            .replace_layout(layout)
            .replace_shader(vertex, vk::ShaderStageFlags::VERTEX)
            .replace_shader(fragment, vk::ShaderStageFlags::FRAGMENT)
            .set_input_topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .set_polygon_mode(vk::PolygonMode::FILL)
            .set_cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::CLOCKWISE)
            .disable_blending()
            .enable_depth_test(true, vk::CompareOp::LESS_OR_EQUAL)
            .set_color_attachment(color_format)
            .set_depth_format(depth_format)
            .build(device)
    }

    /// Records one indexed draw per surface of `meshes`.
    ///
    /// The colour target is loaded as is and the depth target cleared to 1.0.
    pub fn record<'a, A: Allocator>(
        &self,
        cmd: &CommandBufferRecording<D>,
        color_view: vk::ImageView,
        depth_view: vk::ImageView,
        extent: vk::Extent2D,
        meshes: impl Iterator<Item = &'a MeshAsset<D, A>>,
    ) {
        let render = cmd
            .dynamic_rendering()
            .push_image_as_color_attachment(
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                color_view,
                None,
            )
            .depth_attachment(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL, depth_view, 1.0)
            .begin_rendering(extent);
        cmd.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, self.pipeline.handle());
        cmd.set_viewport_scissor(extent);

        let view_projection = camera_matrix(extent);
        for mesh in meshes {
            let buffers = mesh.buffers();
            let push_constants =
                DrawPushConstants::new(view_projection, buffers.vertex_buffer_address);
            cmd.push_constants(
                self.layout.handle(),
                vk::ShaderStageFlags::VERTEX,
                bytemuck::bytes_of(&push_constants),
            );
            cmd.bind_index_buffer(buffers.index_buffer.handle(), vk::IndexType::UINT32);
            for surface in mesh.surfaces() {
                cmd.draw_indexed(surface.count, surface.start_index);
            }
        }
        render.end_rendering();
    }
}

impl<D: Device> Destructible for GeometryPass<D> {
    fn destroy(&mut self) {
        self.pipeline.destroy();
        self.layout.destroy();
    }
}

#[cfg(test)]
mod test {
    use kgal::testing::{DeviceCall, TestDevice, MINIMAL_SPIRV};

    use super::*;

    #[test]
    fn push_constants_hold_a_matrix_and_an_address() {
        assert_eq!(std::mem::size_of::<DrawPushConstants>(), 80);
        let constants = DrawPushConstants::new(glam::Mat4::IDENTITY, 0xdead_beef);
        let bytes = bytemuck::bytes_of(&constants);
        assert_eq!(&bytes[64..72], &0xdead_beef_u64.to_le_bytes());
    }

    #[test]
    fn camera_keeps_the_origin_in_view() {
        let matrix = camera_matrix(vk::Extent2D {
            width: 1280,
            height: 720,
        });
        let clip = matrix * glam::Vec4::new(0.0, 0.0, 0.0, 1.0);
        let ndc = clip / clip.w;
        assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);

        // a point above the origin lands in the upper half, which is -Y in Vulkan
        let above = matrix * glam::Vec4::new(0.0, 1.0, 0.0, 1.0);
        assert!(above.y / above.w < 0.0);
    }

    #[test]
    fn shaders_are_released_after_build() {
        let device = TestDevice::new();
        let mut pass = GeometryPass::new(
            device.clone(),
            &MINIMAL_SPIRV,
            &MINIMAL_SPIRV,
            vk::Format::R16G16B16A16_SFLOAT,
            vk::Format::D32_SFLOAT,
        )
        .unwrap();
        assert_eq!(
            device.count_calls(|call| matches!(call, DeviceCall::DestroyShaderModule(_))),
            2
        );
        // layout + pipeline
        assert_eq!(device.live_object_count(), 2);
        pass.destroy();
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn invalid_fragment_code_releases_everything() {
        let device = TestDevice::new();
        let result = GeometryPass::new(
            device.clone(),
            &MINIMAL_SPIRV,
            &[0; 3],
            vk::Format::R16G16B16A16_SFLOAT,
            vk::Format::D32_SFLOAT,
        );
        assert!(result.is_err());
        assert_eq!(device.live_object_count(), 0);
    }
}
