/// Provides traits for implementing allocators
use std::ffi::c_void;
use std::fmt::Debug;
use std::ptr::NonNull;

use anyhow::Result;
use ash::vk;

pub use gpu_allocator_impl::*;
pub use memory_allocation::MemoryAllocation;
pub use memory_type::*;
#[cfg(any(test, feature = "test-device"))]
pub use test_allocator::TestAllocator;

pub mod gpu_allocator_impl;
pub mod memory_allocation;
pub mod memory_type;
#[cfg(any(test, feature = "test-device"))]
pub mod test_allocator;

/// Expectation of an allocator
pub trait Allocator: Clone + Debug + 'static {
    type Allocation: Allocation;

    /// Create a new allocation
    fn allocate(
        &mut self,
        name: &str,
        requirements: &vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Self::Allocation>;

    /// Free an allocation
    fn free(&mut self, allocation: Self::Allocation) -> Result<()>;
}

pub trait Allocation: Debug {
    /// Get the underlying [`vk::DeviceMemory`]
    fn memory(&self) -> vk::DeviceMemory;

    /// Get the offset of the memory
    fn offset(&self) -> vk::DeviceSize;

    /// Size of the allocation in bytes
    fn size(&self) -> vk::DeviceSize;

    /// Get the raw ptr that underlies the allocation
    fn mapped_ptr(&self) -> Option<NonNull<c_void>>;

    /// Get name of the allocation
    fn name(&self) -> &str;
}
