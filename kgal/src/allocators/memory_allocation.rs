use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk;

use crate::allocators::{Allocation, Allocator};
use crate::traits::Destructible;

/// Holds an arc reference to an allocation as well as the allocator it came from.
///
/// Clones share the allocation; whichever clone is destroyed first frees it and every later
/// destroy is a no-op, so the memory is released exactly once.
#[derive(Debug)]
pub struct MemoryAllocation<A: Allocator> {
    allocator: A,
    allocation: Arc<Mutex<Option<A::Allocation>>>,
}

impl<A: Allocator> Clone for MemoryAllocation<A> {
    fn clone(&self) -> Self {
        Self {
            allocator: self.allocator.clone(),
            allocation: self.allocation.clone(),
        }
    }
}

impl<A: Allocator> MemoryAllocation<A> {
    pub fn new(
        allocator: &mut A,
        name: &str,
        requirements: &vk::MemoryRequirements,
        location: super::MemoryLocation,
        linear: bool,
    ) -> Result<Self> {
        let allocation = allocator.allocate(name, requirements, location, linear)?;
        Ok(Self {
            allocator: allocator.clone(),
            allocation: Arc::new(Mutex::new(Some(allocation))),
        })
    }

    fn with<T>(&self, f: impl FnOnce(&A::Allocation) -> Result<T>) -> Result<T> {
        let guard = self.allocation.lock().map_err(crate::KgalError::from)?;
        let allocation = guard
            .as_ref()
            .ok_or_else(|| crate::KgalError::Allocation("allocation already freed".to_string()))?;
        f(allocation)
    }

    pub fn memory(&self) -> Result<vk::DeviceMemory> {
        self.with(|allocation| Ok(allocation.memory()))
    }

    pub fn offset(&self) -> Result<vk::DeviceSize> {
        self.with(|allocation| Ok(allocation.offset()))
    }

    pub fn is_mapped(&self) -> bool {
        self.with(|allocation| Ok(allocation.mapped_ptr().is_some()))
            .unwrap_or(false)
    }

    /// Whether the memory has been released
    pub fn is_freed(&self) -> bool {
        self.allocation
            .lock()
            .map(|allocation| allocation.is_none())
            .unwrap_or(true)
    }

    /// Copies `data` into mapped memory at `offset`
    pub fn write(&self, offset: vk::DeviceSize, data: &[u8]) -> Result<()> {
        self.with(|allocation| {
            let ptr = allocation
                .mapped_ptr()
                .ok_or(crate::KgalError::NoMappedPointer)?;
            let required = offset + data.len() as vk::DeviceSize;
            if required > allocation.size() {
                return Err(crate::KgalError::InsufficientSpace {
                    required,
                    available: allocation.size(),
                }
                .into());
            }
            unsafe {
                std::ptr::copy_nonoverlapping(
                    data.as_ptr(),
                    ptr.as_ptr().cast::<u8>().add(offset as usize),
                    data.len(),
                );
            }
            Ok(())
        })
    }

    /// Reads `len` bytes of mapped memory starting at `offset`
    pub fn read(&self, offset: vk::DeviceSize, len: usize) -> Result<Vec<u8>> {
        self.with(|allocation| {
            let ptr = allocation
                .mapped_ptr()
                .ok_or(crate::KgalError::NoMappedPointer)?;
            let required = offset + len as vk::DeviceSize;
            if required > allocation.size() {
                return Err(crate::KgalError::InsufficientSpace {
                    required,
                    available: allocation.size(),
                }
                .into());
            }
            let mut out = vec![0u8; len];
            unsafe {
                std::ptr::copy_nonoverlapping(
                    ptr.as_ptr().cast::<u8>().add(offset as usize),
                    out.as_mut_ptr(),
                    len,
                );
            }
            Ok(out)
        })
    }
}

impl<A: Allocator> Destructible for MemoryAllocation<A> {
    fn destroy(&mut self) {
        let allocation = match self.allocation.lock() {
            Ok(mut allocation) => allocation.take(),
            Err(_) => {
                tracing::error!("Allocation mutex poisoned during teardown");
                None
            }
        };
        if let Some(allocation) = allocation {
            if let Err(e) = self.allocator.free(allocation) {
                tracing::error!("Failed to free allocation: {e}");
            }
        }
    }
}
