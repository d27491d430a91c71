use anyhow::Result;
use ash::vk;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;

use crate::allocators::{Allocator, GpuAllocator, MemoryAllocation, MemoryLocation};
use crate::device::{Device, LogicalDevice};
use crate::error::GpuResultExt;
use crate::resource::traits::Resource;
use crate::traits::Destructible;

/// A [`vk::Buffer`] bound together with the memory backing it.
///
/// Clones share the allocation. The first clone destroyed releases both the handle and the
/// memory, later destroys do nothing.
#[derive(Debug, Clone)]
pub struct Buffer<D: Device = LogicalDevice, A: Allocator = GpuAllocator> {
    handle: vk::Buffer,
    device: D,
    allocation: Option<MemoryAllocation<A>>,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    address: Option<vk::DeviceAddress>,
    name: String,
}

pub enum BufferCreateInfo<'a, D: Device, A: Allocator> {
    /// Create a buffer with a new empty buffer with the requested size
    NewEmptyBuffer {
        device: D,
        allocator: &'a mut A,
        size: vk::DeviceSize,
        location: MemoryLocation,
        usage_flags: vk::BufferUsageFlags,
        name: &'a str,
    },
}

impl<D: Device, A: Allocator> Buffer<D, A> {
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The [`vk::DeviceAddress`] queried when the buffer was created
    pub fn address(&self) -> Result<vk::DeviceAddress> {
        self.address
            .ok_or_else(|| crate::KgalError::NoShaderDeviceAddress.into())
    }

    fn allocation(&self) -> Result<&MemoryAllocation<A>> {
        self.allocation
            .as_ref()
            .ok_or_else(|| {
                crate::KgalError::Allocation(format!("{} was destroyed", self.name)).into()
            })
    }

    /// Writes bytes into a host visible buffer
    pub fn write(&self, offset: vk::DeviceSize, data: &[u8]) -> Result<()> {
        self.allocation()?.write(offset, data)
    }

    /// Reads bytes back out of a host visible buffer
    pub fn read(&self, offset: vk::DeviceSize, len: usize) -> Result<Vec<u8>> {
        self.allocation()?.read(offset, len)
    }
}

impl<D: Device, A: Allocator> Resource for Buffer<D, A> {
    type CreateInfo<'a> = BufferCreateInfo<'a, D, A>;
    type HandleType = vk::Buffer;

    fn new(create_info: Self::CreateInfo<'_>) -> Result<Self> {
        match create_info {
            BufferCreateInfo::NewEmptyBuffer {
                device,
                allocator,
                size,
                location,
                usage_flags,
                name,
            } => {
                let handle = device
                    .create_buffer(
                        &vk::BufferCreateInfo::default()
                            .size(size)
                            .usage(usage_flags)
                            .sharing_mode(vk::SharingMode::EXCLUSIVE),
                    )
                    .gpu_op("vkCreateBuffer")?;

                #[cfg(feature = "log-lifetimes")]
                trace!("Creating VkBuffer {:?} ({})", handle, name);

                let requirements = device.buffer_memory_requirements(handle);
                let allocation = match MemoryAllocation::new(
                    allocator,
                    name,
                    &requirements,
                    location,
                    true,
                ) {
                    Ok(allocation) => allocation,
                    Err(e) => {
                        device.destroy_buffer(handle);
                        return Err(e);
                    }
                };
                let mut buffer = Self {
                    handle,
                    device,
                    allocation: Some(allocation),
                    size,
                    usage: usage_flags,
                    address: None,
                    name: name.to_string(),
                };
                let memory = buffer.allocation()?.memory()?;
                let offset = buffer.allocation()?.offset()?;
                if let Err(e) = buffer
                    .device
                    .bind_buffer_memory(handle, memory, offset)
                    .gpu_op("vkBindBufferMemory")
                {
                    buffer.destroy();
                    return Err(e.into());
                }
                if usage_flags.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS) {
                    buffer.address = Some(buffer.device.buffer_device_address(handle));
                }
                Ok(buffer)
            }
        }
    }

    fn handle(&self) -> vk::Buffer {
        self.handle
    }
}

impl<D: Device, A: Allocator> Destructible for Buffer<D, A> {
    fn destroy(&mut self) {
        let Some(mut allocation) = self.allocation.take() else {
            return;
        };
        if allocation.is_freed() {
            return;
        }

        #[cfg(feature = "log-lifetimes")]
        trace!("Destroying VkBuffer {:?} ({})", self.handle, self.name);

        self.device.destroy_buffer(self.handle);
        allocation.destroy();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::allocators::TestAllocator;
    use crate::testing::TestDevice;

    fn staging(
        device: &TestDevice,
        allocator: &mut TestAllocator,
        size: vk::DeviceSize,
    ) -> Buffer<TestDevice, TestAllocator> {
        Buffer::new(BufferCreateInfo::NewEmptyBuffer {
            device: device.clone(),
            allocator,
            size,
            location: MemoryLocation::CpuToGpu,
            usage_flags: vk::BufferUsageFlags::TRANSFER_SRC,
            name: "staging",
        })
        .unwrap()
    }

    #[test]
    fn clones_release_memory_once() {
        let device = TestDevice::new();
        let mut allocator = TestAllocator::new(device.clone());
        let mut buffer = staging(&device, &mut allocator, 64);
        let mut clone = buffer.clone();
        assert_eq!(allocator.live_allocations(), 1);

        clone.destroy();
        buffer.destroy();
        buffer.destroy();

        assert_eq!(allocator.live_allocations(), 0);
        assert_eq!(
            device.count_calls(|call| matches!(call, crate::testing::DeviceCall::DestroyBuffer(_))),
            1
        );
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn mapped_writes_are_bounds_checked() {
        let device = TestDevice::new();
        let mut allocator = TestAllocator::new(device.clone());
        let mut buffer = staging(&device, &mut allocator, 8);

        buffer.write(4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(buffer.read(4, 4).unwrap(), vec![1, 2, 3, 4]);
        assert!(buffer.write(6, &[0; 4]).is_err());
        buffer.destroy();
    }

    #[test]
    fn device_address_requires_usage_flag() {
        let device = TestDevice::new();
        let mut allocator = TestAllocator::new(device.clone());
        let mut plain = staging(&device, &mut allocator, 16);
        let mut addressed: Buffer<TestDevice, TestAllocator> =
            Buffer::new(BufferCreateInfo::NewEmptyBuffer {
                device: device.clone(),
                allocator: &mut allocator,
                size: 16,
                location: MemoryLocation::GpuOnly,
                usage_flags: vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
                name: "vertices",
            })
            .unwrap();

        assert!(plain.address().is_err());
        assert_ne!(addressed.address().unwrap(), 0);
        assert!(addressed.write(0, &[1]).is_err());
        plain.destroy();
        addressed.destroy();
    }
}
