use anyhow::Result;
use ash::vk;
use tracing::debug;
#[cfg(feature = "log-lifetimes")]
use tracing::trace;

use crate::device::{Device, LogicalDevice};
use crate::error::GpuResultExt;
use crate::traits::Destructible;

/// Pool sizes are expressed as a multiple of the pool's set count
#[derive(Copy, Clone, PartialOrd, PartialEq, Debug, Default)]
pub struct PoolSizeRatio {
    pub descriptor_type: vk::DescriptorType,
    pub ratio: f32,
}

impl PoolSizeRatio {
    pub fn descriptor_type(mut self, descriptor_type: vk::DescriptorType) -> Self {
        self.descriptor_type = descriptor_type;
        self
    }

    pub fn ratio(mut self, ratio: f32) -> Self {
        self.ratio = ratio;
        self
    }
}

/// Growable descriptor set allocator.
///
/// Pools live in one of two lists. `free` pools may still have room, `full` pools returned
/// out of memory and are only reused after [`DescriptorAllocator::reset_pools`]. Every pool
/// created grows the set capacity of the next one by 1.5x.
#[derive(Debug)]
pub struct DescriptorAllocator<D: Device = LogicalDevice> {
    device: D,
    ratios: Vec<PoolSizeRatio>,
    free_pools: Vec<vk::DescriptorPool>,
    full_pools: Vec<vk::DescriptorPool>,
    sets_per_pool: u32,
    pools_created: usize,
}

impl<D: Device> DescriptorAllocator<D> {
    /// Creates the first pool with `initial_sets` sets
    pub fn new(device: D, initial_sets: u32, ratios: &[PoolSizeRatio]) -> Result<Self> {
        let mut allocator = Self {
            device,
            ratios: ratios.to_vec(),
            free_pools: Vec::new(),
            full_pools: Vec::new(),
            sets_per_pool: initial_sets,
            pools_created: 0,
        };
        let pool = allocator.create_pool(initial_sets)?;
        allocator.free_pools.push(pool);
        allocator.grow();
        Ok(allocator)
    }

    /// Set count the next newly created pool will have
    pub fn sets_per_pool(&self) -> u32 {
        self.sets_per_pool
    }

    pub fn free_pool_count(&self) -> usize {
        self.free_pools.len()
    }

    pub fn full_pool_count(&self) -> usize {
        self.full_pools.len()
    }

    /// Number of pools created over the allocator's lifetime
    pub fn pools_created(&self) -> usize {
        self.pools_created
    }

    fn grow(&mut self) {
        self.sets_per_pool = (self.sets_per_pool as f32 * 1.5) as u32;
    }

    fn create_pool(&mut self, set_count: u32) -> Result<vk::DescriptorPool> {
        let sizes: Vec<vk::DescriptorPoolSize> = self
            .ratios
            .iter()
            .map(|ratio| vk::DescriptorPoolSize {
                ty: ratio.descriptor_type,
                descriptor_count: (ratio.ratio * set_count as f32) as u32,
            })
            .collect();
        let handle = self
            .device
            .create_descriptor_pool(
                &vk::DescriptorPoolCreateInfo::default()
                    .max_sets(set_count)
                    .pool_sizes(&sizes),
            )
            .gpu_op("vkCreateDescriptorPool")?;
        self.pools_created += 1;
        #[cfg(feature = "log-lifetimes")]
        trace!("Creating VkDescriptorPool {:?}", handle);
        debug!(
            "Created descriptor pool {:?} with {} sets (pool #{})",
            handle, set_count, self.pools_created
        );
        Ok(handle)
    }

    /// Pops a free pool, creating a larger one if none are left
    fn get_pool(&mut self) -> Result<vk::DescriptorPool> {
        if let Some(pool) = self.free_pools.pop() {
            return Ok(pool);
        }
        let pool = self.create_pool(self.sets_per_pool)?;
        self.grow();
        Ok(pool)
    }

    /// Allocates one set of `layout`. An exhausted pool is retired to the full list and the
    /// allocation is retried once against another pool.
    pub fn allocate(&mut self, layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet> {
        let mut pool = self.get_pool()?;
        let layouts = [layout];
        let result = self.device.allocate_descriptor_sets(
            &vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(pool)
                .set_layouts(&layouts),
        );
        let sets = match result {
            Ok(sets) => sets,
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {
                self.full_pools.push(pool);
                pool = self.get_pool()?;
                match self
                    .device
                    .allocate_descriptor_sets(
                        &vk::DescriptorSetAllocateInfo::default()
                            .descriptor_pool(pool)
                            .set_layouts(&layouts),
                    )
                    .gpu_op("vkAllocateDescriptorSets")
                {
                    Ok(sets) => sets,
                    Err(e) => {
                        self.free_pools.push(pool);
                        return Err(e.into());
                    }
                }
            }
            Err(result) => {
                self.free_pools.push(pool);
                return Err(crate::KgalError::GpuOperationFailed {
                    operation: "vkAllocateDescriptorSets",
                    result,
                }
                .into());
            }
        };
        self.free_pools.push(pool);
        Ok(sets[0])
    }

    /// Resets every pool and moves all full pools back to the free list. No pool is destroyed.
    pub fn reset_pools(&mut self) -> Result<()> {
        for pool in self.free_pools.iter().chain(self.full_pools.iter()) {
            self.device
                .reset_descriptor_pool(*pool)
                .gpu_op("vkResetDescriptorPool")?;
        }
        self.free_pools.append(&mut self.full_pools);
        Ok(())
    }

    /// Destroys every pool the allocator owns
    pub fn destroy_pools(&mut self) {
        for pool in self.free_pools.drain(..).chain(self.full_pools.drain(..)) {
            #[cfg(feature = "log-lifetimes")]
            trace!("Destroying VkDescriptorPool {:?}", pool);
            self.device.destroy_descriptor_pool(pool);
        }
    }
}

impl<D: Device> Destructible for DescriptorAllocator<D> {
    fn destroy(&mut self) {
        self.destroy_pools();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{DeviceCall, TestDevice};

    fn storage_ratios() -> Vec<PoolSizeRatio> {
        vec![PoolSizeRatio::default()
            .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
            .ratio(1.0)]
    }

    fn created_pool_sizes(device: &TestDevice) -> Vec<u32> {
        device
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                DeviceCall::CreateDescriptorPool { max_sets, .. } => Some(max_sets),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn init_grows_baseline() {
        let device = TestDevice::new();
        let mut allocator =
            DescriptorAllocator::new(device.clone(), 10, &storage_ratios()).unwrap();
        assert_eq!(allocator.sets_per_pool(), 15);
        assert_eq!(allocator.pools_created(), 1);
        assert_eq!(allocator.free_pool_count(), 1);
        assert_eq!(created_pool_sizes(&device), vec![10]);
        allocator.destroy();
    }

    #[test]
    fn exhaustion_creates_geometrically_larger_pools() {
        let device = TestDevice::new();
        let mut allocator =
            DescriptorAllocator::new(device.clone(), 10, &storage_ratios()).unwrap();
        let layout = vk::DescriptorSetLayout::null();
        for _ in 0..10 {
            allocator.allocate(layout).unwrap();
        }
        assert_eq!(allocator.pools_created(), 1);

        // 11th set no longer fits in the first pool
        allocator.allocate(layout).unwrap();
        assert_eq!(allocator.pools_created(), 2);
        assert_eq!(allocator.sets_per_pool(), 22);
        assert_eq!(allocator.full_pool_count(), 1);
        assert_eq!(allocator.free_pool_count(), 1);

        for _ in 0..15 {
            allocator.allocate(layout).unwrap();
        }
        assert_eq!(allocator.pools_created(), 3);
        assert_eq!(allocator.sets_per_pool(), 33);
        assert_eq!(created_pool_sizes(&device), vec![10, 15, 22]);

        let pool_sizes = device
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                DeviceCall::CreateDescriptorPool { pool_sizes, .. } => Some(pool_sizes),
                _ => None,
            })
            .last()
            .unwrap();
        assert_eq!(pool_sizes, vec![(vk::DescriptorType::STORAGE_IMAGE, 22)]);
        allocator.destroy();
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn growth_is_unbounded() {
        let device = TestDevice::new();
        let mut allocator =
            DescriptorAllocator::new(device.clone(), 3000, &storage_ratios()).unwrap();
        let layout = vk::DescriptorSetLayout::null();
        for _ in 0..3001 {
            allocator.allocate(layout).unwrap();
        }
        assert_eq!(allocator.pools_created(), 2);
        assert_eq!(created_pool_sizes(&device), vec![3000, 4500]);
        assert_eq!(allocator.sets_per_pool(), 6750);
        allocator.destroy();
        assert_eq!(device.live_object_count(), 0);
    }

    #[test]
    fn reset_returns_every_pool_to_free() {
        let device = TestDevice::new();
        let mut allocator = DescriptorAllocator::new(device.clone(), 2, &storage_ratios()).unwrap();
        let layout = vk::DescriptorSetLayout::null();
        for _ in 0..8 {
            allocator.allocate(layout).unwrap();
        }
        let total = allocator.free_pool_count() + allocator.full_pool_count();
        assert!(allocator.full_pool_count() > 0);

        allocator.reset_pools().unwrap();
        assert_eq!(allocator.full_pool_count(), 0);
        assert_eq!(allocator.free_pool_count(), total);

        allocator.reset_pools().unwrap();
        assert_eq!(allocator.full_pool_count(), 0);
        assert_eq!(allocator.free_pool_count(), total);

        // Reset pools hand out sets again without creating new ones
        let created = allocator.pools_created();
        allocator.allocate(layout).unwrap();
        assert_eq!(allocator.pools_created(), created);
        allocator.destroy();
    }

    #[test]
    fn unrelated_failures_are_fatal() {
        let device = TestDevice::new();
        let mut allocator = DescriptorAllocator::new(device.clone(), 4, &storage_ratios()).unwrap();
        device.fail_next("allocate_descriptor_sets", vk::Result::ERROR_DEVICE_LOST);
        let err = allocator.allocate(vk::DescriptorSetLayout::null()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<crate::KgalError>(),
            Some(&crate::KgalError::GpuOperationFailed {
                operation: "vkAllocateDescriptorSets",
                result: vk::Result::ERROR_DEVICE_LOST,
            })
        );
        assert_eq!(allocator.free_pool_count(), 1);
        assert_eq!(allocator.pools_created(), 1);
        allocator.destroy();
    }
}
