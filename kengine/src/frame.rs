use anyhow::Result;
use kgal::ash::vk;
use kgal::command::{CommandBuffer, CommandPool};
use kgal::device::{Device, LogicalDevice};
use kgal::sync::{BinarySemaphore, Fence};
use kgal::traits::Destructible;
use kgal::util::DeletionQueue;

/// Number of frames the CPU may record ahead of the GPU
pub const FRAME_OVERLAP: usize = 2;

/// Slot used by frame `frame_number`
pub fn slot_for(frame_number: u64) -> usize {
    (frame_number % FRAME_OVERLAP as u64) as usize
}

/// Per-slot command recording and synchronization objects.
///
/// A slot is only touched by the CPU after [`FrameContext::wait_for_slot`] returned, which proves
/// the GPU finished the last submission recorded into it.
#[derive(Debug)]
pub struct FrameContext<D: Device = LogicalDevice> {
    command_pool: CommandPool<D>,
    command_buffer: CommandBuffer<D>,
    render_fence: Fence<D>,
    swapchain_semaphore: BinarySemaphore<D>,
    /// Frees queued while this slot's current submission may still be executing
    pending: DeletionQueue<'static>,
    /// Frees whose last use is proven complete by the fence
    retired: DeletionQueue<'static>,
}

impl<D: Device> FrameContext<D> {
    pub fn new(device: D, queue_family_index: u32) -> Result<Self> {
        let command_pool = CommandPool::new(
            device.clone(),
            queue_family_index,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let command_buffer = match command_pool.allocate(1)?.pop() {
            Some(command_buffer) => command_buffer,
            None => {
                return Err(kgal::KgalError::GpuOperationFailed {
                    operation: "vkAllocateCommandBuffers",
                    result: vk::Result::ERROR_UNKNOWN,
                }
                .into())
            }
        };
        // signalled so the very first wait returns immediately
        let render_fence = Fence::new(device.clone(), vk::FenceCreateFlags::SIGNALED)?;
        let swapchain_semaphore = BinarySemaphore::new(device)?;
        Ok(Self {
            command_pool,
            command_buffer,
            render_fence,
            swapchain_semaphore,
            pending: DeletionQueue::new(),
            retired: DeletionQueue::new(),
        })
    }

    /// Blocks until the slot's previous submission has finished, then resets its fence. Frees
    /// queued during that submission become safe and are retired.
    pub fn wait_for_slot(&mut self) -> Result<()> {
        self.render_fence.wait(u64::MAX)?;
        self.render_fence.reset()?;
        let pending = self.pending.take();
        self.retired.append(pending);
        Ok(())
    }

    pub fn command_buffer(&self) -> &CommandBuffer<D> {
        &self.command_buffer
    }

    pub fn render_fence(&self) -> &Fence<D> {
        &self.render_fence
    }

    pub fn swapchain_semaphore(&self) -> &BinarySemaphore<D> {
        &self.swapchain_semaphore
    }

    /// Queues `func` to run once the GPU is done with the submission currently being recorded
    pub fn defer<T>(&mut self, func: T)
    where
        T: FnOnce() + 'static,
    {
        self.pending.push(func);
    }

    /// Runs every retired free, last queued first
    pub fn flush_retired(&mut self) {
        self.retired.flush();
    }

    pub fn deferred_count(&self) -> usize {
        self.pending.len() + self.retired.len()
    }
}

impl<D: Device> Destructible for FrameContext<D> {
    fn destroy(&mut self) {
        self.retired.flush();
        self.pending.flush();
        self.swapchain_semaphore.destroy();
        self.render_fence.destroy();
        self.command_pool.destroy();
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::rc::Rc;

    use kgal::testing::{DeviceCall, TestDevice};

    use super::*;

    #[test]
    fn slots_alternate() {
        let slots: Vec<usize> = (0..6).map(slot_for).collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0, 1]);
        for frame in 0..100u64 {
            assert_ne!(slot_for(frame), slot_for(frame + 1));
            assert_eq!(slot_for(frame), (frame % FRAME_OVERLAP as u64) as usize);
        }
    }

    #[test]
    fn wait_blocks_on_the_fence_then_resets_it() {
        let device = TestDevice::new();
        let mut frame = FrameContext::new(device.clone(), 0).unwrap();
        let fence = frame.render_fence().handle();
        assert!(device.is_fence_signaled(fence));
        device.clear_calls();

        frame.wait_for_slot().unwrap();

        assert_eq!(
            device.calls(),
            vec![
                DeviceCall::WaitForFences(vec![fence]),
                DeviceCall::ResetFences(vec![fence]),
            ]
        );
        assert!(!device.is_fence_signaled(fence));
        // nothing was submitted, so a second wait can never succeed
        assert!(frame.wait_for_slot().is_err());
        frame.destroy();
    }

    #[test]
    fn deferred_frees_wait_for_the_next_use_of_the_slot() {
        let device = TestDevice::new();
        let mut frame = FrameContext::new(device.clone(), 0).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        frame.wait_for_slot().unwrap();
        for i in 0..3 {
            let log = log.clone();
            frame.defer(move || log.borrow_mut().push(i));
        }
        frame.flush_retired();
        assert!(log.borrow().is_empty());

        // pretend the GPU finished the submission
        let cmd = frame
            .command_buffer()
            .clone()
            .begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
            .unwrap()
            .end()
            .unwrap();
        cmd.submit(vk::Queue::null(), &[], &[], frame.render_fence().handle())
            .unwrap();
        frame.wait_for_slot().unwrap();
        assert_eq!(frame.deferred_count(), 3);
        frame.flush_retired();

        assert_eq!(*log.borrow(), vec![2, 1, 0]);
        assert_eq!(frame.deferred_count(), 0);
        frame.destroy();
    }

    #[test]
    fn destroy_releases_everything() {
        let device = TestDevice::new();
        let mut frame = FrameContext::new(device.clone(), 0).unwrap();
        frame.destroy();
        assert_eq!(device.live_object_count(), 0);
    }
}
