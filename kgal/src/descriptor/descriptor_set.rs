use ash::vk;

use crate::device::Device;

/// Points `binding` of `set` at a storage image expected to be in [`vk::ImageLayout::GENERAL`]
pub fn write_storage_image<D: Device>(
    device: &D,
    set: vk::DescriptorSet,
    binding: u32,
    view: vk::ImageView,
) {
    let image_info = vk::DescriptorImageInfo::default()
        .image_layout(vk::ImageLayout::GENERAL)
        .image_view(view);
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
        .image_info(std::slice::from_ref(&image_info));
    device.update_descriptor_sets(std::slice::from_ref(&write));
}
