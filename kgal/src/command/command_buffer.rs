//! Command buffers are divided into [`CommandBuffer`], [`CommandBufferRecording`] and
//! [`CommandBufferExecutable`].
//!
//! This type state ensures commands are only recorded between begin and end, and only ended
//! buffers are ever submitted.
use anyhow::Result;
use ash::vk;

use crate::device::{Device, LogicalDevice};
use crate::error::GpuResultExt;

#[derive(Debug, Clone)]
pub struct CommandBuffer<D: Device = LogicalDevice> {
    handle: vk::CommandBuffer,
    device: D,
}

impl<D: Device> CommandBuffer<D> {
    pub fn new(handle: vk::CommandBuffer, device: D) -> Self {
        Self { handle, device }
    }

    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    /// Returns the buffer to the initial state. The owning pool must allow individual resets.
    pub fn reset(&self) -> Result<()> {
        self.device
            .reset_command_buffer(self.handle)
            .gpu_op("vkResetCommandBuffer")?;
        Ok(())
    }

    pub fn begin(self, flags: vk::CommandBufferUsageFlags) -> Result<CommandBufferRecording<D>> {
        self.device
            .begin_command_buffer(self.handle, flags)
            .gpu_op("vkBeginCommandBuffer")?;
        Ok(CommandBufferRecording {
            handle: self.handle,
            device: self.device,
        })
    }
}

/// A command buffer which is currently recording
#[derive(Debug)]
pub struct CommandBufferRecording<D: Device = LogicalDevice> {
    handle: vk::CommandBuffer,
    device: D,
}

impl<D: Device> CommandBufferRecording<D> {
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    pub fn get_device(&self) -> &D {
        &self.device
    }

    pub fn end(self) -> Result<CommandBufferExecutable<D>> {
        self.device
            .end_command_buffer(self.handle)
            .gpu_op("vkEndCommandBuffer")?;
        Ok(CommandBufferExecutable {
            handle: self.handle,
            device: self.device,
        })
    }

    /// Begin describing a dynamic rendering pass
    pub fn dynamic_rendering(&self) -> crate::command::DynamicRenderContext<'_, D> {
        crate::command::DynamicRenderContext::from_recording(self)
    }

    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        self.device.cmd_copy_buffer(self.handle, src, dst, regions);
    }

    pub fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.device.cmd_bind_pipeline(self.handle, bind_point, pipeline);
    }

    pub fn bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
    ) {
        self.device
            .cmd_bind_descriptor_sets(self.handle, bind_point, layout, 0, sets);
    }

    pub fn push_constants(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        data: &[u8],
    ) {
        self.device
            .cmd_push_constants(self.handle, layout, stages, 0, data);
    }

    pub fn dispatch(&self, x: u32, y: u32, z: u32) {
        self.device.cmd_dispatch(self.handle, x, y, z);
    }

    /// Sets a viewport and scissor covering `extent`
    pub fn set_viewport_scissor(&self, extent: vk::Extent2D) {
        self.device.cmd_set_viewport(
            self.handle,
            vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            },
        );
        self.device.cmd_set_scissor(
            self.handle,
            vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
        );
    }

    pub fn bind_index_buffer(&self, buffer: vk::Buffer, index_type: vk::IndexType) {
        self.device
            .cmd_bind_index_buffer(self.handle, buffer, 0, index_type);
    }

    pub fn draw_indexed(&self, index_count: u32, first_index: u32) {
        self.device
            .cmd_draw_indexed(self.handle, index_count, 1, first_index, 0, 0);
    }
}

/// A command buffer which has finished recording
#[derive(Debug)]
pub struct CommandBufferExecutable<D: Device = LogicalDevice> {
    handle: vk::CommandBuffer,
    device: D,
}

impl<D: Device> CommandBufferExecutable<D> {
    pub fn handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    pub fn submit_info(&self) -> vk::CommandBufferSubmitInfo<'static> {
        vk::CommandBufferSubmitInfo::default().command_buffer(self.handle)
    }

    /// Submits the buffer and hands it back in the initial type state. `fence` is signalled once
    /// the GPU finishes executing it.
    pub fn submit(
        self,
        queue: vk::Queue,
        wait_semaphores: &[vk::SemaphoreSubmitInfo],
        signal_semaphores: &[vk::SemaphoreSubmitInfo],
        fence: vk::Fence,
    ) -> Result<CommandBuffer<D>> {
        let cmd_infos = [self.submit_info()];
        let submit_info = vk::SubmitInfo2::default()
            .command_buffer_infos(&cmd_infos)
            .wait_semaphore_infos(wait_semaphores)
            .signal_semaphore_infos(signal_semaphores);
        self.device
            .queue_submit(queue, std::slice::from_ref(&submit_info), fence)
            .gpu_op("vkQueueSubmit2")?;
        Ok(CommandBuffer {
            handle: self.handle,
            device: self.device,
        })
    }
}
