pub use descriptor_allocator::{DescriptorAllocator, PoolSizeRatio};
pub use descriptor_set::write_storage_image;
pub use descriptor_set_layout::{DescriptorSetLayout, DescriptorSetLayoutCreateInfo};
pub use descriptor_set_layout_builder::DescriptorSetLayoutBuilder;

pub mod descriptor_allocator;
mod descriptor_set;
pub mod descriptor_set_layout;
pub mod descriptor_set_layout_builder;
