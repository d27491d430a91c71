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
pub struct ComputePipeline<D: Device = LogicalDevice> {
    device: D,
    handle: vk::Pipeline,
}

impl<D: Device> Destructible for ComputePipeline<D> {
    fn destroy(&mut self) {
        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkPipeline {:?}", self.handle);

        self.device.destroy_pipeline(self.handle);
    }
}

impl<D: Device> Pipeline for ComputePipeline<D> {
    const BIND_POINT: vk::PipelineBindPoint = vk::PipelineBindPoint::COMPUTE;

    fn handle(&self) -> vk::Pipeline {
        self.handle
    }
}

/// Builds the compute pipeline. The layout stays owned by the caller.
#[derive(Debug)]
pub struct ComputePipelineBuilder<D: Device = LogicalDevice> {
    compute_shader: Option<Shader<D>>,
    layout: vk::PipelineLayout,
}

impl<D: Device> Default for ComputePipelineBuilder<D> {
    fn default() -> Self {
        Self {
            compute_shader: None,
            layout: vk::PipelineLayout::null(),
        }
    }
}

impl<D: Device> ComputePipelineBuilder<D> {
    pub fn replace_layout(mut self, layout: vk::PipelineLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Replaces the compute shader. The builder takes ownership of the module and destroys it
    /// once the pipeline is built.
    pub fn replace_shader(mut self, compute_shader: Shader<D>) -> Self {
        if let Some(mut shader) = self.compute_shader.replace(compute_shader) {
            shader.destroy();
        }
        self
    }

    pub fn build(mut self, device: D) -> Result<ComputePipeline<D>> {
        let Some(mut shader) = self.compute_shader.take() else {
            return Err(anyhow::anyhow!("Compute pipeline has no shader"));
        };
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader.handle())
            .name(SHADER_ENTRY);
        let handle = device
            .create_compute_pipeline(
                &vk::ComputePipelineCreateInfo::default()
                    .stage(stage)
                    .layout(self.layout),
            )
            .gpu_op("vkCreateComputePipelines");
        shader.destroy();
        let handle = handle?;

        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkPipeline {:?}", handle);

        Ok(ComputePipeline { device, handle })
    }
}
