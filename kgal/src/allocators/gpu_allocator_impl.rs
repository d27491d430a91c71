/// Implements [`Allocator`](super::Allocator) on top of [`gpu_allocator`]
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk;
use derivative::Derivative;

use crate::traits::Destructible;

#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct GpuAllocator {
    #[derivative(Debug = "ignore")]
    handle: Arc<Mutex<Option<gpu_allocator::vulkan::Allocator>>>,
}

#[derive(Debug)]
pub struct GpuAllocation {
    handle: gpu_allocator::vulkan::Allocation,
    name: String,
}

impl GpuAllocator {
    pub fn new(
        instance: &ash::Instance,
        device: &crate::device::LogicalDevice,
        physical_device: vk::PhysicalDevice,
        buffer_device_address: bool,
    ) -> Result<Self> {
        let allocator =
            gpu_allocator::vulkan::Allocator::new(&gpu_allocator::vulkan::AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.get_handle().clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address,
                allocation_sizes: Default::default(),
            })?;
        Ok(Self {
            handle: Arc::new(Mutex::new(Some(allocator))),
        })
    }
}

impl super::Allocator for GpuAllocator {
    type Allocation = GpuAllocation;

    fn allocate(
        &mut self,
        name: &str,
        requirements: &vk::MemoryRequirements,
        location: super::MemoryLocation,
        linear: bool,
    ) -> Result<GpuAllocation> {
        let mut guard = self.handle.lock().map_err(crate::KgalError::from)?;
        let allocator = guard.as_mut().ok_or(crate::KgalError::AllocatorDestroyed)?;
        let handle = allocator.allocate(&gpu_allocator::vulkan::AllocationCreateDesc {
            name,
            requirements: *requirements,
            location: location.into(),
            linear,
            allocation_scheme: gpu_allocator::vulkan::AllocationScheme::GpuAllocatorManaged,
        })?;

        #[cfg(feature = "log-memory-allocations")]
        tracing::trace!("Allocated {} bytes for {}", handle.size(), name);

        Ok(GpuAllocation {
            handle,
            name: name.to_string(),
        })
    }

    fn free(&mut self, allocation: Self::Allocation) -> Result<()> {
        #[cfg(feature = "log-memory-allocations")]
        tracing::trace!("Freeing allocation {}", allocation.name);

        let mut guard = self.handle.lock().map_err(crate::KgalError::from)?;
        let allocator = guard.as_mut().ok_or(crate::KgalError::AllocatorDestroyed)?;
        allocator.free(allocation.handle)?;
        Ok(())
    }
}

impl Destructible for GpuAllocator {
    /// Drops the underlying allocator. Must happen before the device is destroyed.
    fn destroy(&mut self) {
        match self.handle.lock() {
            Ok(mut guard) => {
                guard.take();
            }
            Err(_) => tracing::error!("Allocator mutex poisoned during teardown"),
        }
    }
}

impl super::Allocation for GpuAllocation {
    fn memory(&self) -> vk::DeviceMemory {
        unsafe { self.handle.memory() }
    }

    fn offset(&self) -> vk::DeviceSize {
        self.handle.offset()
    }

    fn size(&self) -> vk::DeviceSize {
        self.handle.size()
    }

    fn mapped_ptr(&self) -> Option<NonNull<c_void>> {
        self.handle.mapped_ptr()
    }

    fn name(&self) -> &str {
        &self.name
    }
}
