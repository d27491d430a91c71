use std::ffi::c_void;
use std::ptr::NonNull;

use anyhow::Result;
use ash::vk::{DeviceMemory, DeviceSize, MemoryRequirements};

use crate::allocators::{Allocation, Allocator, MemoryLocation};
use crate::testing::TestDevice;

/// Hands out host memory owned by a [`TestDevice`]. Host visible locations come back mapped,
/// [`MemoryLocation::GpuOnly`] memory is only reachable through recorded copies.
#[derive(Clone, Debug)]
pub struct TestAllocator {
    device: TestDevice,
    allocations: std::rc::Rc<std::cell::Cell<usize>>,
}

impl TestAllocator {
    pub fn new(device: TestDevice) -> Self {
        Self {
            device,
            allocations: Default::default(),
        }
    }

    /// Allocations handed out and not yet freed
    pub fn live_allocations(&self) -> usize {
        self.allocations.get()
    }
}

impl Allocator for TestAllocator {
    type Allocation = TestAllocation;

    fn allocate(
        &mut self,
        name: &str,
        requirements: &MemoryRequirements,
        location: MemoryLocation,
        _linear: bool,
    ) -> Result<Self::Allocation> {
        let (memory, ptr) = self.device.allocate_memory(requirements.size);
        self.allocations.set(self.allocations.get() + 1);
        Ok(TestAllocation {
            memory,
            size: requirements.size,
            mapped: location.is_host_visible().then(|| ptr.cast()),
            name: name.to_string(),
        })
    }

    fn free(&mut self, allocation: Self::Allocation) -> Result<()> {
        self.device.free_memory(allocation.memory);
        self.allocations.set(self.allocations.get() - 1);
        Ok(())
    }
}

#[derive(Debug)]
pub struct TestAllocation {
    memory: DeviceMemory,
    size: DeviceSize,
    mapped: Option<NonNull<c_void>>,
    name: String,
}

impl Allocation for TestAllocation {
    fn memory(&self) -> DeviceMemory {
        self.memory
    }

    fn offset(&self) -> DeviceSize {
        0
    }

    fn size(&self) -> DeviceSize {
        self.size
    }

    fn mapped_ptr(&self) -> Option<NonNull<c_void>> {
        self.mapped
    }

    fn name(&self) -> &str {
        &self.name
    }
}
