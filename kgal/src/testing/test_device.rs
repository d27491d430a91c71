use std::alloc::Layout;
use std::collections::{HashMap, HashSet};
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::prelude::VkResult;
use ash::vk;
use ash::vk::Handle;
use derivative::Derivative;

/// Alignment every fake allocation is handed out with
const MEMORY_ALIGNMENT: vk::DeviceSize = 16;

/// Recorded form of each [`Device`](crate::device::Device) call
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    WaitIdle,
    CreateFence { fence: vk::Fence, signaled: bool },
    DestroyFence(vk::Fence),
    WaitForFences(Vec<vk::Fence>),
    ResetFences(Vec<vk::Fence>),
    CreateSemaphore(vk::Semaphore),
    DestroySemaphore(vk::Semaphore),
    CreateCommandPool {
        pool: vk::CommandPool,
        flags: vk::CommandPoolCreateFlags,
    },
    DestroyCommandPool(vk::CommandPool),
    AllocateCommandBuffers(Vec<vk::CommandBuffer>),
    ResetCommandBuffer(vk::CommandBuffer),
    BeginCommandBuffer {
        cmd: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    },
    EndCommandBuffer(vk::CommandBuffer),
    QueueSubmit {
        command_buffers: Vec<vk::CommandBuffer>,
        wait: Vec<(vk::Semaphore, vk::PipelineStageFlags2)>,
        signal: Vec<vk::Semaphore>,
        fence: vk::Fence,
    },
    PipelineBarrier {
        images: Vec<(vk::Image, vk::ImageLayout, vk::ImageLayout)>,
    },
    BlitImage {
        src: vk::Image,
        dst: vk::Image,
    },
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: Vec<(vk::DeviceSize, vk::DeviceSize, vk::DeviceSize)>,
    },
    BindPipeline(vk::PipelineBindPoint, vk::Pipeline),
    BindDescriptorSets(Vec<vk::DescriptorSet>),
    PushConstants {
        stages: vk::ShaderStageFlags,
        size: usize,
    },
    Dispatch(u32, u32, u32),
    BeginRendering {
        color_attachments: u32,
        depth_attachment: bool,
        extent: vk::Extent2D,
    },
    EndRendering,
    SetViewport,
    SetScissor,
    BindIndexBuffer(vk::Buffer),
    DrawIndexed {
        index_count: u32,
        first_index: u32,
    },
    CreateBuffer {
        buffer: vk::Buffer,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    },
    DestroyBuffer(vk::Buffer),
    BindBufferMemory(vk::Buffer, vk::DeviceMemory),
    CreateImage {
        image: vk::Image,
        format: vk::Format,
        extent: vk::Extent3D,
    },
    DestroyImage(vk::Image),
    BindImageMemory(vk::Image, vk::DeviceMemory),
    CreateImageView(vk::ImageView),
    DestroyImageView(vk::ImageView),
    CreateDescriptorSetLayout {
        layout: vk::DescriptorSetLayout,
        bindings: Vec<(u32, vk::DescriptorType, vk::ShaderStageFlags)>,
    },
    DestroyDescriptorSetLayout(vk::DescriptorSetLayout),
    CreateDescriptorPool {
        pool: vk::DescriptorPool,
        max_sets: u32,
        pool_sizes: Vec<(vk::DescriptorType, u32)>,
    },
    ResetDescriptorPool(vk::DescriptorPool),
    DestroyDescriptorPool(vk::DescriptorPool),
    AllocateDescriptorSets {
        pool: vk::DescriptorPool,
        result: vk::Result,
    },
    UpdateDescriptorSets(usize),
    CreateShaderModule(vk::ShaderModule),
    DestroyShaderModule(vk::ShaderModule),
    CreatePipelineLayout(vk::PipelineLayout),
    DestroyPipelineLayout(vk::PipelineLayout),
    CreateComputePipeline(vk::Pipeline),
    CreateGraphicsPipeline(vk::Pipeline),
    DestroyPipeline(vk::Pipeline),
    CreateSwapchain {
        swapchain: vk::SwapchainKHR,
        format: vk::Format,
        extent: vk::Extent2D,
    },
    DestroySwapchain(vk::SwapchainKHR),
    AcquireNextImage {
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        image_index: u32,
    },
    QueuePresent {
        image_indices: Vec<u32>,
        wait: Vec<vk::Semaphore>,
    },
}

/// Zeroed host memory standing in for a `VkDeviceMemory`. Only ever touched through raw pointers.
struct HostMemory {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl HostMemory {
    fn new(size: vk::DeviceSize) -> Self {
        let layout = Layout::from_size_align(size.max(1) as usize, MEMORY_ALIGNMENT as usize)
            .expect("fake allocation layout");
        let ptr = NonNull::new(unsafe { std::alloc::alloc_zeroed(layout) })
            .expect("fake allocation out of host memory");
        Self { ptr, layout }
    }
}

impl Drop for HostMemory {
    fn drop(&mut self) {
        unsafe { std::alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

#[derive(Debug, Clone, Copy)]
struct BufferState {
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    binding: Option<(vk::DeviceMemory, vk::DeviceSize)>,
}

#[derive(Debug, Clone, Copy, Default)]
struct PoolState {
    max_sets: u32,
    allocated: u32,
}

#[derive(Debug, Clone, Copy)]
struct RecordedCopy {
    src: vk::Buffer,
    dst: vk::Buffer,
    region: vk::BufferCopy,
}

#[derive(Derivative, Default)]
#[derivative(Debug)]
struct State {
    next_handle: u64,
    calls: Vec<DeviceCall>,
    /// Every created object that has not been destroyed yet
    live: HashSet<u64>,
    fences: HashMap<vk::Fence, bool>,
    #[derivative(Debug = "ignore")]
    memory: HashMap<vk::DeviceMemory, HostMemory>,
    buffers: HashMap<vk::Buffer, BufferState>,
    recorded: HashMap<vk::CommandBuffer, Vec<RecordedCopy>>,
    descriptor_pools: HashMap<vk::DescriptorPool, PoolState>,
    failures: HashMap<&'static str, vk::Result>,
    swapchain_image_count: u32,
    next_image: u32,
}

impl State {
    fn handle<T: Handle>(&mut self) -> T {
        self.next_handle += 1;
        self.live.insert(self.next_handle);
        T::from_raw(self.next_handle)
    }

    fn release<T: Handle>(&mut self, handle: T) {
        self.live.remove(&handle.as_raw());
    }

    fn check(&mut self, operation: &'static str) -> VkResult<()> {
        match self.failures.remove(operation) {
            Some(result) => Err(result),
            None => Ok(()),
        }
    }

    /// Executes recorded buffer copies against host memory
    fn replay(&mut self, cmd: vk::CommandBuffer) {
        let copies = self.recorded.get(&cmd).cloned().unwrap_or_default();
        for copy in copies {
            let (Some(src), Some(dst)) = (
                self.buffers.get(&copy.src).and_then(|buffer| buffer.binding),
                self.buffers.get(&copy.dst).and_then(|buffer| buffer.binding),
            ) else {
                continue;
            };
            let (Some(src_memory), Some(dst_memory)) =
                (self.memory.get(&src.0), self.memory.get(&dst.0))
            else {
                continue;
            };
            let src_start = (src.1 + copy.region.src_offset) as usize;
            let dst_start = (dst.1 + copy.region.dst_offset) as usize;
            let size = copy.region.size as usize;
            assert!(src_start + size <= src_memory.layout.size(), "copy reads past source memory");
            assert!(
                dst_start + size <= dst_memory.layout.size(),
                "copy writes past destination memory"
            );
            unsafe {
                std::ptr::copy(
                    src_memory.ptr.as_ptr().add(src_start),
                    dst_memory.ptr.as_ptr().add(dst_start),
                    size,
                );
            }
        }
    }
}

unsafe fn raw_slice<'a, T>(ptr: *const T, count: u32) -> &'a [T] {
    if ptr.is_null() || count == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(ptr, count as usize) }
    }
}

/// Fake [`Device`](crate::device::Device). Clones share state.
#[derive(Debug, Clone)]
pub struct TestDevice {
    state: Arc<Mutex<State>>,
}

impl Default for TestDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl TestDevice {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                swapchain_image_count: 3,
                ..Default::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: DeviceCall) {
        self.lock().calls.push(call);
    }

    /// Snapshot of every call made so far
    pub fn calls(&self) -> Vec<DeviceCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Number of recorded calls matching `predicate`
    pub fn count_calls(&self, predicate: impl Fn(&DeviceCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    /// Makes the next call of `operation` fail with `result`
    pub fn fail_next(&self, operation: &'static str, result: vk::Result) {
        self.lock().failures.insert(operation, result);
    }

    pub fn set_swapchain_image_count(&self, count: u32) {
        self.lock().swapchain_image_count = count.max(1);
    }

    pub fn is_fence_signaled(&self, fence: vk::Fence) -> bool {
        self.lock().fences.get(&fence).copied().unwrap_or(false)
    }

    /// Objects created through the device and not destroyed yet
    pub fn live_object_count(&self) -> usize {
        self.lock().live.len()
    }

    /// Memory blocks handed out and not freed yet
    pub fn live_memory_count(&self) -> usize {
        self.lock().memory.len()
    }

    /// Sets aside zeroed host memory and returns its handle and base pointer
    pub fn allocate_memory(&self, size: vk::DeviceSize) -> (vk::DeviceMemory, NonNull<u8>) {
        let mut state = self.lock();
        state.next_handle += 1;
        let handle = vk::DeviceMemory::from_raw(state.next_handle);
        let memory = HostMemory::new(size);
        let ptr = memory.ptr;
        state.memory.insert(handle, memory);
        (handle, ptr)
    }

    pub fn free_memory(&self, memory: vk::DeviceMemory) {
        self.lock().memory.remove(&memory);
    }
}

impl crate::device::Device for TestDevice {
    fn wait_idle(&self) -> VkResult<()> {
        let mut state = self.lock();
        state.check("wait_idle")?;
        state.calls.push(DeviceCall::WaitIdle);
        Ok(())
    }

    fn create_fence(&self, flags: vk::FenceCreateFlags) -> VkResult<vk::Fence> {
        let mut state = self.lock();
        state.check("create_fence")?;
        let fence: vk::Fence = state.handle();
        let signaled = flags.contains(vk::FenceCreateFlags::SIGNALED);
        state.fences.insert(fence, signaled);
        state.calls.push(DeviceCall::CreateFence { fence, signaled });
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.lock();
        state.fences.remove(&fence);
        state.release(fence);
        state.calls.push(DeviceCall::DestroyFence(fence));
    }

    fn wait_for_fences(&self, fences: &[vk::Fence], _timeout: u64) -> VkResult<()> {
        let mut state = self.lock();
        state.check("wait_for_fences")?;
        state.calls.push(DeviceCall::WaitForFences(fences.to_vec()));
        // Nothing would ever signal an unsubmitted fence, report it instead of hanging
        if fences
            .iter()
            .all(|fence| state.fences.get(fence).copied().unwrap_or(false))
        {
            Ok(())
        } else {
            Err(vk::Result::TIMEOUT)
        }
    }

    fn reset_fences(&self, fences: &[vk::Fence]) -> VkResult<()> {
        let mut state = self.lock();
        state.check("reset_fences")?;
        for fence in fences {
            state.fences.insert(*fence, false);
        }
        state.calls.push(DeviceCall::ResetFences(fences.to_vec()));
        Ok(())
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let mut state = self.lock();
        state.check("create_semaphore")?;
        let semaphore: vk::Semaphore = state.handle();
        state.calls.push(DeviceCall::CreateSemaphore(semaphore));
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut state = self.lock();
        state.release(semaphore);
        state.calls.push(DeviceCall::DestroySemaphore(semaphore));
    }

    fn create_command_pool(
        &self,
        _queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> VkResult<vk::CommandPool> {
        let mut state = self.lock();
        state.check("create_command_pool")?;
        let pool: vk::CommandPool = state.handle();
        state.calls.push(DeviceCall::CreateCommandPool { pool, flags });
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut state = self.lock();
        state.release(pool);
        state.calls.push(DeviceCall::DestroyCommandPool(pool));
    }

    fn allocate_command_buffers(
        &self,
        _pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut state = self.lock();
        state.check("allocate_command_buffers")?;
        let buffers: Vec<vk::CommandBuffer> = (0..count)
            .map(|_| {
                state.next_handle += 1;
                vk::CommandBuffer::from_raw(state.next_handle)
            })
            .collect();
        state
            .calls
            .push(DeviceCall::AllocateCommandBuffers(buffers.clone()));
        Ok(buffers)
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut state = self.lock();
        state.check("reset_command_buffer")?;
        state.recorded.remove(&cmd);
        state.calls.push(DeviceCall::ResetCommandBuffer(cmd));
        Ok(())
    }

    fn begin_command_buffer(
        &self,
        cmd: vk::CommandBuffer,
        flags: vk::CommandBufferUsageFlags,
    ) -> VkResult<()> {
        let mut state = self.lock();
        state.check("begin_command_buffer")?;
        state.recorded.insert(cmd, Vec::new());
        state
            .calls
            .push(DeviceCall::BeginCommandBuffer { cmd, flags });
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut state = self.lock();
        state.check("end_command_buffer")?;
        state.calls.push(DeviceCall::EndCommandBuffer(cmd));
        Ok(())
    }

    fn queue_submit(
        &self,
        _queue: vk::Queue,
        submits: &[vk::SubmitInfo2<'_>],
        fence: vk::Fence,
    ) -> VkResult<()> {
        let mut state = self.lock();
        state.check("queue_submit")?;
        let mut command_buffers = Vec::new();
        let mut wait = Vec::new();
        let mut signal = Vec::new();
        for submit in submits {
            let (cmds, waits, signals) = unsafe {
                (
                    raw_slice(submit.p_command_buffer_infos, submit.command_buffer_info_count),
                    raw_slice(submit.p_wait_semaphore_infos, submit.wait_semaphore_info_count),
                    raw_slice(
                        submit.p_signal_semaphore_infos,
                        submit.signal_semaphore_info_count,
                    ),
                )
            };
            command_buffers.extend(cmds.iter().map(|info| info.command_buffer));
            wait.extend(waits.iter().map(|info| (info.semaphore, info.stage_mask)));
            signal.extend(signals.iter().map(|info| info.semaphore));
        }
        // Work completes the moment it is submitted
        for cmd in command_buffers.iter() {
            state.replay(*cmd);
        }
        if fence != vk::Fence::null() {
            state.fences.insert(fence, true);
        }
        state.calls.push(DeviceCall::QueueSubmit {
            command_buffers,
            wait,
            signal,
            fence,
        });
        Ok(())
    }

    fn cmd_pipeline_barrier(&self, _cmd: vk::CommandBuffer, dependency: &vk::DependencyInfo<'_>) {
        let barriers = unsafe {
            raw_slice(
                dependency.p_image_memory_barriers,
                dependency.image_memory_barrier_count,
            )
        };
        self.record(DeviceCall::PipelineBarrier {
            images: barriers
                .iter()
                .map(|barrier| (barrier.image, barrier.old_layout, barrier.new_layout))
                .collect(),
        });
    }

    fn cmd_blit_image(&self, _cmd: vk::CommandBuffer, blit: &vk::BlitImageInfo2<'_>) {
        self.record(DeviceCall::BlitImage {
            src: blit.src_image,
            dst: blit.dst_image,
        });
    }

    fn cmd_copy_buffer(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        let mut state = self.lock();
        let recorded = state.recorded.entry(cmd).or_default();
        recorded.extend(regions.iter().map(|region| RecordedCopy {
            src,
            dst,
            region: *region,
        }));
        state.calls.push(DeviceCall::CopyBuffer {
            src,
            dst,
            regions: regions
                .iter()
                .map(|region| (region.src_offset, region.dst_offset, region.size))
                .collect(),
        });
    }

    fn cmd_bind_pipeline(
        &self,
        _cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        self.record(DeviceCall::BindPipeline(bind_point, pipeline));
    }

    fn cmd_bind_descriptor_sets(
        &self,
        _cmd: vk::CommandBuffer,
        _bind_point: vk::PipelineBindPoint,
        _layout: vk::PipelineLayout,
        _first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.record(DeviceCall::BindDescriptorSets(sets.to_vec()));
    }

    fn cmd_push_constants(
        &self,
        _cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        _offset: u32,
        data: &[u8],
    ) {
        self.record(DeviceCall::PushConstants {
            stages,
            size: data.len(),
        });
    }

    fn cmd_dispatch(&self, _cmd: vk::CommandBuffer, x: u32, y: u32, z: u32) {
        self.record(DeviceCall::Dispatch(x, y, z));
    }

    fn cmd_begin_rendering(&self, _cmd: vk::CommandBuffer, info: &vk::RenderingInfo<'_>) {
        self.record(DeviceCall::BeginRendering {
            color_attachments: info.color_attachment_count,
            depth_attachment: !info.p_depth_attachment.is_null(),
            extent: info.render_area.extent,
        });
    }

    fn cmd_end_rendering(&self, _cmd: vk::CommandBuffer) {
        self.record(DeviceCall::EndRendering);
    }

    fn cmd_set_viewport(&self, _cmd: vk::CommandBuffer, _viewport: vk::Viewport) {
        self.record(DeviceCall::SetViewport);
    }

    fn cmd_set_scissor(&self, _cmd: vk::CommandBuffer, _scissor: vk::Rect2D) {
        self.record(DeviceCall::SetScissor);
    }

    fn cmd_bind_index_buffer(
        &self,
        _cmd: vk::CommandBuffer,
        buffer: vk::Buffer,
        _offset: vk::DeviceSize,
        _index_type: vk::IndexType,
    ) {
        self.record(DeviceCall::BindIndexBuffer(buffer));
    }

    fn cmd_draw_indexed(
        &self,
        _cmd: vk::CommandBuffer,
        index_count: u32,
        _instance_count: u32,
        first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.record(DeviceCall::DrawIndexed {
            index_count,
            first_index,
        });
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> VkResult<vk::Buffer> {
        let mut state = self.lock();
        state.check("create_buffer")?;
        let buffer: vk::Buffer = state.handle();
        state.buffers.insert(
            buffer,
            BufferState {
                size: info.size,
                usage: info.usage,
                binding: None,
            },
        );
        state.calls.push(DeviceCall::CreateBuffer {
            buffer,
            size: info.size,
            usage: info.usage,
        });
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let mut state = self.lock();
        state.buffers.remove(&buffer);
        state.release(buffer);
        state.calls.push(DeviceCall::DestroyBuffer(buffer));
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        let size = self
            .lock()
            .buffers
            .get(&buffer)
            .map(|buffer| buffer.size)
            .unwrap_or(0);
        vk::MemoryRequirements {
            size,
            alignment: MEMORY_ALIGNMENT,
            memory_type_bits: u32::MAX,
        }
    }

    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> VkResult<()> {
        let mut state = self.lock();
        state.check("bind_buffer_memory")?;
        if let Some(buffer) = state.buffers.get_mut(&buffer) {
            buffer.binding = Some((memory, offset));
        }
        state.calls.push(DeviceCall::BindBufferMemory(buffer, memory));
        Ok(())
    }

    fn buffer_device_address(&self, buffer: vk::Buffer) -> vk::DeviceAddress {
        let state = self.lock();
        match state.buffers.get(&buffer) {
            Some(info) if info.usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS) => {
                0x1_0000_0000 + buffer.as_raw() * 0x1000
            }
            _ => 0,
        }
    }

    fn create_image(&self, info: &vk::ImageCreateInfo<'_>) -> VkResult<vk::Image> {
        let mut state = self.lock();
        state.check("create_image")?;
        let image: vk::Image = state.handle();
        state.calls.push(DeviceCall::CreateImage {
            image,
            format: info.format,
            extent: info.extent,
        });
        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        let mut state = self.lock();
        state.release(image);
        state.calls.push(DeviceCall::DestroyImage(image));
    }

    fn image_memory_requirements(&self, _image: vk::Image) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size: 256,
            alignment: MEMORY_ALIGNMENT,
            memory_type_bits: u32::MAX,
        }
    }

    fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
        _offset: vk::DeviceSize,
    ) -> VkResult<()> {
        let mut state = self.lock();
        state.check("bind_image_memory")?;
        state.calls.push(DeviceCall::BindImageMemory(image, memory));
        Ok(())
    }

    fn create_image_view(&self, _info: &vk::ImageViewCreateInfo<'_>) -> VkResult<vk::ImageView> {
        let mut state = self.lock();
        state.check("create_image_view")?;
        let view: vk::ImageView = state.handle();
        state.calls.push(DeviceCall::CreateImageView(view));
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        let mut state = self.lock();
        state.release(view);
        state.calls.push(DeviceCall::DestroyImageView(view));
    }

    fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorSetLayout> {
        let mut state = self.lock();
        state.check("create_descriptor_set_layout")?;
        let layout: vk::DescriptorSetLayout = state.handle();
        let bindings = unsafe { raw_slice(info.p_bindings, info.binding_count) }
            .iter()
            .map(|binding| (binding.binding, binding.descriptor_type, binding.stage_flags))
            .collect();
        state
            .calls
            .push(DeviceCall::CreateDescriptorSetLayout { layout, bindings });
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        let mut state = self.lock();
        state.release(layout);
        state
            .calls
            .push(DeviceCall::DestroyDescriptorSetLayout(layout));
    }

    fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> VkResult<vk::DescriptorPool> {
        let mut state = self.lock();
        state.check("create_descriptor_pool")?;
        let pool: vk::DescriptorPool = state.handle();
        let pool_sizes = unsafe { raw_slice(info.p_pool_sizes, info.pool_size_count) }
            .iter()
            .map(|size| (size.ty, size.descriptor_count))
            .collect();
        state.descriptor_pools.insert(
            pool,
            PoolState {
                max_sets: info.max_sets,
                allocated: 0,
            },
        );
        state.calls.push(DeviceCall::CreateDescriptorPool {
            pool,
            max_sets: info.max_sets,
            pool_sizes,
        });
        Ok(pool)
    }

    fn reset_descriptor_pool(&self, pool: vk::DescriptorPool) -> VkResult<()> {
        let mut state = self.lock();
        state.check("reset_descriptor_pool")?;
        if let Some(pool) = state.descriptor_pools.get_mut(&pool) {
            pool.allocated = 0;
        }
        state.calls.push(DeviceCall::ResetDescriptorPool(pool));
        Ok(())
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.lock();
        state.descriptor_pools.remove(&pool);
        state.release(pool);
        state.calls.push(DeviceCall::DestroyDescriptorPool(pool));
    }

    fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo<'_>,
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        let mut state = self.lock();
        state.check("allocate_descriptor_sets")?;
        let pool = info.descriptor_pool;
        let count = info.descriptor_set_count;
        let pool_state = state.descriptor_pools.get(&pool).copied().unwrap_or_default();
        if pool_state.allocated + count > pool_state.max_sets {
            state.calls.push(DeviceCall::AllocateDescriptorSets {
                pool,
                result: vk::Result::ERROR_OUT_OF_POOL_MEMORY,
            });
            return Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY);
        }
        if let Some(pool_state) = state.descriptor_pools.get_mut(&pool) {
            pool_state.allocated += count;
        }
        let sets = (0..count)
            .map(|_| {
                state.next_handle += 1;
                vk::DescriptorSet::from_raw(state.next_handle)
            })
            .collect();
        state.calls.push(DeviceCall::AllocateDescriptorSets {
            pool,
            result: vk::Result::SUCCESS,
        });
        Ok(sets)
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]) {
        self.record(DeviceCall::UpdateDescriptorSets(writes.len()));
    }

    fn create_shader_module(&self, _code: &[u32]) -> VkResult<vk::ShaderModule> {
        let mut state = self.lock();
        state.check("create_shader_module")?;
        let module: vk::ShaderModule = state.handle();
        state.calls.push(DeviceCall::CreateShaderModule(module));
        Ok(module)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        let mut state = self.lock();
        state.release(module);
        state.calls.push(DeviceCall::DestroyShaderModule(module));
    }

    fn create_pipeline_layout(
        &self,
        _info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> VkResult<vk::PipelineLayout> {
        let mut state = self.lock();
        state.check("create_pipeline_layout")?;
        let layout: vk::PipelineLayout = state.handle();
        state.calls.push(DeviceCall::CreatePipelineLayout(layout));
        Ok(layout)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        let mut state = self.lock();
        state.release(layout);
        state.calls.push(DeviceCall::DestroyPipelineLayout(layout));
    }

    fn create_compute_pipeline(
        &self,
        _info: &vk::ComputePipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline> {
        let mut state = self.lock();
        state.check("create_compute_pipeline")?;
        let pipeline: vk::Pipeline = state.handle();
        state.calls.push(DeviceCall::CreateComputePipeline(pipeline));
        Ok(pipeline)
    }

    fn create_graphics_pipeline(
        &self,
        _info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> VkResult<vk::Pipeline> {
        let mut state = self.lock();
        state.check("create_graphics_pipeline")?;
        let pipeline: vk::Pipeline = state.handle();
        state
            .calls
            .push(DeviceCall::CreateGraphicsPipeline(pipeline));
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        let mut state = self.lock();
        state.release(pipeline);
        state.calls.push(DeviceCall::DestroyPipeline(pipeline));
    }

    fn create_swapchain(
        &self,
        info: &vk::SwapchainCreateInfoKHR<'_>,
    ) -> VkResult<vk::SwapchainKHR> {
        let mut state = self.lock();
        state.check("create_swapchain")?;
        let swapchain: vk::SwapchainKHR = state.handle();
        state.calls.push(DeviceCall::CreateSwapchain {
            swapchain,
            format: info.image_format,
            extent: info.image_extent,
        });
        Ok(swapchain)
    }

    /// Presentable images belong to the swapchain and are not tracked as live objects
    fn get_swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        let mut state = self.lock();
        state.check("get_swapchain_images")?;
        let base = (1u64 << 48) | (swapchain.as_raw() << 8);
        Ok((0..state.swapchain_image_count as u64)
            .map(|i| vk::Image::from_raw(base + i))
            .collect())
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.lock();
        state.release(swapchain);
        state.calls.push(DeviceCall::DestroySwapchain(swapchain));
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout: u64,
        semaphore: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut state = self.lock();
        state.check("acquire_next_image")?;
        let image_index = state.next_image % state.swapchain_image_count;
        state.next_image = state.next_image.wrapping_add(1);
        state.calls.push(DeviceCall::AcquireNextImage {
            swapchain,
            semaphore,
            image_index,
        });
        Ok((image_index, false))
    }

    fn queue_present(&self, _queue: vk::Queue, info: &vk::PresentInfoKHR<'_>) -> VkResult<bool> {
        let mut state = self.lock();
        state.check("queue_present")?;
        let (image_indices, wait) = unsafe {
            (
                raw_slice(info.p_image_indices, info.swapchain_count).to_vec(),
                raw_slice(info.p_wait_semaphores, info.wait_semaphore_count).to_vec(),
            )
        };
        state
            .calls
            .push(DeviceCall::QueuePresent { image_indices, wait });
        Ok(false)
    }
}
