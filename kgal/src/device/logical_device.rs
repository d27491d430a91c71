use std::sync::Arc;

use anyhow::Result;
use ash::prelude::VkResult;
use ash::vk;
use derivative::Derivative;

use crate::traits::Destructible;

#[derive(Derivative)]
#[derivative(Debug)]
struct LogicalDeviceInner {
    #[derivative(Debug = "ignore")]
    handle: ash::Device,
    #[derivative(Debug = "ignore")]
    swapchain: ash::khr::swapchain::Device,
    /// Contains queue families used
    queue_families: Vec<u32>,
}

impl PartialEq for LogicalDeviceInner {
    fn eq(&self, other: &Self) -> bool {
        self.handle.handle() == other.handle.handle()
    }
}

impl Eq for LogicalDeviceInner {}

/// Effectively the same as [`ash::Device`], reference counted so every wrapper can hold onto it.
///
/// The device is never destroyed implicitly: call [`Destructible::destroy`] once every object
/// created from it has been released.
#[derive(Derivative, Clone, PartialEq, Eq)]
#[derivative(Debug)]
pub struct LogicalDevice {
    inner: Arc<LogicalDeviceInner>,
}

pub struct LogicalDeviceCreateInfo<'a> {
    pub instance: &'a ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device_ci: vk::DeviceCreateInfo<'a>,
    pub queue_families: Vec<u32>,
}

impl LogicalDevice {
    pub fn new(device_ci: LogicalDeviceCreateInfo) -> Result<Self> {
        let device = unsafe {
            device_ci.instance.create_device(
                device_ci.physical_device,
                &device_ci.device_ci,
                None,
            )?
        };

        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Creating VkDevice {:?}", device.handle());

        let swapchain = ash::khr::swapchain::Device::new(device_ci.instance, &device);
        Ok(Self {
            inner: Arc::new(LogicalDeviceInner {
                handle: device,
                swapchain,
                queue_families: device_ci.queue_families,
            }),
        })
    }

    /// Get a reference to the underlying [`ash::Device`]
    pub fn get_handle(&self) -> &ash::Device {
        &self.inner.handle
    }

    /// Get the swapchain extension loader
    pub fn get_swapchain_ext(&self) -> &ash::khr::swapchain::Device {
        &self.inner.swapchain
    }

    /// Get all queue families the device was created with
    pub fn get_used_queue_families(&self) -> &[u32] {
        self.inner.queue_families.as_slice()
    }

    /// Fetch a queue the device was created with
    pub fn get_queue(
        &self,
        family_index: u32,
        index: u32,
        flags: vk::QueueFlags,
    ) -> crate::device::Queue {
        let handle = unsafe { self.inner.handle.get_device_queue(family_index, index) };
        crate::device::Queue::new(handle, family_index, index, flags)
    }
}

impl Destructible for LogicalDevice {
    fn destroy(&mut self) {
        #[cfg(feature = "log-lifetimes")]
        tracing::trace!("Destroying VkDevice {:?}", self.inner.handle.handle());

        unsafe {
            self.inner.handle.destroy_device(None);
        }
    }
}

impl crate::device::Device for LogicalDevice {
    fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.inner.handle.device_wait_idle() }
    }

    fn create_fence(&self, flags: vk::FenceCreateFlags) -> VkResult<vk::Fence> {
        unsafe {
            self.inner
                .handle
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)
        }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.inner.handle.destroy_fence(fence, None) }
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], timeout: u64) -> VkResult<()> {
        unsafe { self.inner.handle.wait_for_fences(fences, true, timeout) }
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        unsafe { self.inner.handle.reset_fences(fences) }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        unsafe {
            self.inner
                .handle
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
        }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.inner.handle.destroy_semaphore(semaphore, None) }
    }

    fn create_command_pool(
        &self,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> VkResult<vk::CommandPool> {
        unsafe {
            self.inner.handle.create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .queue_family_index(queue_family_index)
                    .flags(flags),
                None,
            )
        }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.inner.handle.destroy_command_pool(pool, None) }
    }

    fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        unsafe {
            self.inner.handle.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(pool)
                    .level(vk::CommandBufferLevel::PRIMARY)
                    .command_buffer_count(count),
            )
        }
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe {
            self.inner
                .handle
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        }
    }

    fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> VkResult<()> {
        unsafe {
            self.inner
                .handle
                .begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::default().flags(flags))
        }
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.inner.handle.end_command_buffer(cmd) }
    }

    fn queue_submit(
        &self,
        queue: vk::Queue,
        submits: &[vk::SubmitInfo2<'_>],
        fence: vk::Fence,
    ) -> VkResult<()> {
        unsafe { self.inner.handle.queue_submit2(queue, submits, fence) }
    }

    fn cmd_pipeline_barrier(&self, cmd: vk::CommandBuffer, dependency: &vk::DependencyInfo<'_>) {
        unsafe { self.inner.handle.cmd_pipeline_barrier2(cmd, dependency) }
    }

    fn cmd_blit_image(&self, cmd: vk::CommandBuffer, blit: &vk::BlitImageInfo2<'_>) {
        unsafe { self.inner.handle.cmd_blit_image2(cmd, blit) }
    }

    fn cmd_copy_buffer(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        unsafe { self.inner.handle.cmd_copy_buffer(cmd, src, dst, regions) }
    }

    fn cmd_bind_pipeline(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        unsafe { self.inner.handle.cmd_bind_pipeline(cmd, bind_point, pipeline) }
    }

    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.inner
                .handle
                .cmd_bind_descriptor_sets(cmd, bind_point, layout, first_set, sets, &[])
        }
    }

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.inner
                .handle
                .cmd_push_constants(cmd, layout, stages, offset, data)
        }
    }

    fn cmd_dispatch(&self, cmd: vk::CommandBuffer, x: u32, y: u32, z: u32) {
        unsafe { self.inner.handle.cmd_dispatch(cmd, x, y, z) }
    }

    fn cmd_begin_rendering(&self, cmd: vk::CommandBuffer, info: &vk::RenderingInfo<'_>) {
        unsafe { self.inner.handle.cmd_begin_rendering(cmd, info) }
    }

    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer) {
        unsafe { self.inner.handle.cmd_end_rendering(cmd) }
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        unsafe { self.inner.handle.cmd_set_viewport(cmd, 0, &[viewport]) }
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        unsafe { self.inner.handle.cmd_set_scissor(cmd, 0, &[scissor]) }
    }

    fn cmd_bind_index_buffer(
        &self,
        cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        unsafe {
            self.inner
                .handle
                .cmd_bind_index_buffer(cmd, buffer, offset, index_type)
        }
    }

    fn cmd_draw_indexed(
        &self,
        cmd: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.inner.handle.cmd_draw_indexed(
                cmd,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        }
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer> {
        unsafe { self.inner.handle.create_buffer(info, None) }
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.inner.handle.destroy_buffer(buffer, None) }
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        unsafe { self.inner.handle.get_buffer_memory_requirements(buffer) }
    }

    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        unsafe { self.inner.handle.bind_buffer_memory(buffer, memory, offset) }
    }

    fn buffer_device_address(&self, buffer: vk::Buffer) -> vk::DeviceAddress {
        unsafe {
            self.inner
                .handle
                .get_buffer_device_address(&vk::BufferDeviceAddressInfo::default().buffer(buffer))
        }
    }

    fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        unsafe { self.inner.handle.create_image(info, None) }
    }

    fn destroy_image(&self, image: vk::Image) {
        unsafe { self.inner.handle.destroy_image(image, None) }
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        unsafe { self.inner.handle.get_image_memory_requirements(image) }
    }

    fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        unsafe { self.inner.handle.bind_image_memory(image, memory, offset) }
    }

    fn create_image_view(&self, info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView> {
        unsafe { self.inner.handle.create_image_view(info, None) }
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.inner.handle.destroy_image_view(view, None) }
    }

    fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorSetLayout> {
        unsafe { self.inner.handle.create_descriptor_set_layout(info, None) }
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.inner.handle.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorPool> {
        unsafe { self.inner.handle.create_descriptor_pool(info, None) }
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VkResult<()> {
        unsafe {
            self.inner
                .handle
                .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty())
        }
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.inner.handle.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        unsafe { self.inner.handle.allocate_descriptor_sets(info) }
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]) {
        unsafe { self.inner.handle.update_descriptor_sets(writes, &[]) }
    }

    fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule> {
        unsafe {
            self.inner
                .handle
                .create_shader_module(&vk::ShaderModuleCreateInfo::default().code(code), None)
        }
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.inner.handle.destroy_shader_module(module, None) }
    }

    fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout> {
        unsafe { self.inner.handle.create_pipeline_layout(info, None) }
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.inner.handle.destroy_pipeline_layout(layout, None) }
    }

    fn create_compute_pipeline(
        &self,
        info: &vk::ComputePipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline> {
        unsafe {
            self.inner
                .handle
                .create_compute_pipelines(
                    vk::PipelineCache::null(),
                    std::slice::from_ref(info),
                    None,
                )
                .map(|pipelines| pipelines[0])
                .map_err(|(_, result)| result)
        }
    }

    fn create_graphics_pipeline(
        &self,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline> {
        unsafe {
            self.inner
                .handle
                .create_graphics_pipelines(
                    vk::PipelineCache::null(),
                    std::slice::from_ref(info),
                    None,
                )
                .map(|pipelines| pipelines[0])
                .map_err(|(_, result)| result)
        }
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.inner.handle.destroy_pipeline(pipeline, None) }
    }

    fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR> {
        unsafe { self.inner.swapchain.create_swapchain(info, None) }
    }

    fn get_swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.inner.swapchain.get_swapchain_images(swapchain) }
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.inner.swapchain.destroy_swapchain(swapchain, None) }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.inner
                .swapchain
                .acquire_next_image(swapchain, timeout, semaphore, vk::Fence::null())
        }
    }

    fn queue_present(&self, queue: vk::Queue, info: &vk::PresentInfoKHR<'_>) -> VkResult<bool> {
        unsafe { self.inner.swapchain.queue_present(queue, info) }
    }
}
