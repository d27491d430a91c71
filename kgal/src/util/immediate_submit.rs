use anyhow::Result;
use ash::vk;
use tracing::debug;

use crate::command::{CommandBuffer, CommandBufferRecording, CommandPool};
use crate::device::{Device, LogicalDevice, Queue};
use crate::sync::Fence;
use crate::traits::Destructible;

/// A dedicated command buffer + fence for blocking one-off submissions, such as uploads at
/// load time. Not meant for per-frame work.
#[derive(Debug)]
pub struct ImmediateSubmit<D: Device = LogicalDevice> {
    fence: Fence<D>,
    command_buffer: CommandBuffer<D>,
    command_pool: CommandPool<D>,
    queue: Queue,
}

impl<D: Device> Destructible for ImmediateSubmit<D> {
    fn destroy(&mut self) {
        self.fence.destroy();
        self.command_pool.destroy();
    }
}

impl<D: Device> ImmediateSubmit<D> {
    pub fn new(device: D, queue: Queue) -> Result<Self> {
        let fence = Fence::new(device.clone(), vk::FenceCreateFlags::SIGNALED)?;
        let command_pool = CommandPool::new(
            device,
            queue.get_family_index(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let command_buffer = match command_pool.allocate(1).map(|mut buffers| buffers.pop()) {
            Ok(Some(command_buffer)) => command_buffer,
            Ok(None) => {
                return Err(crate::KgalError::GpuOperationFailed {
                    operation: "vkAllocateCommandBuffers",
                    result: vk::Result::ERROR_UNKNOWN,
                }
                .into())
            }
            Err(e) => return Err(e),
        };
        Ok(Self {
            fence,
            command_buffer,
            command_pool,
            queue,
        })
    }

    /// Records `function` into the command buffer, submits it and blocks until the GPU is done
    pub fn submit<F>(&self, function: F) -> Result<()>
    where
        F: FnOnce(&CommandBufferRecording<D>),
    {
        self.fence.reset()?;
        self.command_buffer.reset()?;
        let cmd = self
            .command_buffer
            .clone()
            .begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        function(&cmd);
        cmd.end()?
            .submit(self.queue.handle(), &[], &[], self.fence.handle())?;
        self.fence.wait(u64::MAX)?;
        debug!("Immediate submission on queue {:?} completed", self.queue.handle());
        Ok(())
    }

    pub fn get_queue(&self) -> &Queue {
        &self.queue
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::allocators::{MemoryLocation, TestAllocator};
    use crate::resource::{Buffer, BufferCreateInfo, Resource};
    use crate::testing::{DeviceCall, TestDevice};

    fn host_buffer(
        device: &TestDevice,
        allocator: &mut TestAllocator,
        usage_flags: vk::BufferUsageFlags,
    ) -> Buffer<TestDevice, TestAllocator> {
        Buffer::new(BufferCreateInfo::NewEmptyBuffer {
            device: device.clone(),
            allocator,
            size: 16,
            location: MemoryLocation::GpuToCpu,
            usage_flags,
            name: "host buffer",
        })
        .unwrap()
    }

    #[test]
    fn work_is_visible_on_return() {
        let device = TestDevice::new();
        let mut allocator = TestAllocator::new(device.clone());
        let queue = Queue::new(vk::Queue::null(), 0, 0, vk::QueueFlags::GRAPHICS);
        let mut immediate = ImmediateSubmit::new(device.clone(), queue).unwrap();
        let mut src = host_buffer(&device, &mut allocator, vk::BufferUsageFlags::TRANSFER_SRC);
        let mut dst = host_buffer(&device, &mut allocator, vk::BufferUsageFlags::TRANSFER_DST);
        let payload: Vec<u8> = (0..16).collect();
        src.write(0, &payload).unwrap();

        immediate
            .submit(|cmd| {
                cmd.copy_buffer(
                    src.handle(),
                    dst.handle(),
                    &[vk::BufferCopy {
                        src_offset: 0,
                        dst_offset: 0,
                        size: 16,
                    }],
                );
            })
            .unwrap();

        assert_eq!(dst.read(0, 16).unwrap(), payload);
        assert_eq!(
            device.count_calls(|call| matches!(call, DeviceCall::WaitForFences(_))),
            1
        );

        src.destroy();
        dst.destroy();
        immediate.destroy();
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn submit_failure_is_reported() {
        let device = TestDevice::new();
        let queue = Queue::new(vk::Queue::null(), 0, 0, vk::QueueFlags::GRAPHICS);
        let mut immediate = ImmediateSubmit::new(device.clone(), queue).unwrap();
        device.fail_next("queue_submit", vk::Result::ERROR_DEVICE_LOST);

        let err = immediate.submit(|_| {}).unwrap_err();
        assert_eq!(
            err.downcast_ref::<crate::KgalError>(),
            Some(&crate::KgalError::GpuOperationFailed {
                operation: "vkQueueSubmit2",
                result: vk::Result::ERROR_DEVICE_LOST,
            })
        );
        immediate.destroy();
    }
}
