// Descriptor layouts, pools and sets
//
// Binding N of a layout is slot N of the set. A variable-length binding is
// always the last one and is sized when the set is allocated.

use ash::vk;

use crate::backend::{DescriptorPayload, DescriptorWrite};
use crate::error::Result;
use crate::types::{DescriptorBindingDesc, DescriptorType, NUM_DESCRIPTOR_TYPES};

pub fn create_set_layout(
    device: &ash::Device,
    bindings: &[DescriptorBindingDesc],
) -> Result<vk::DescriptorSetLayout> {
    let layout_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
        .iter()
        .enumerate()
        .map(|(index, binding)| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(index as u32)
                .descriptor_type(binding.ty.to_vk())
                .descriptor_count(binding.count)
                .stage_flags(vk::ShaderStageFlags::ALL)
        })
        .collect();

    let binding_flags: Vec<vk::DescriptorBindingFlags> = bindings
        .iter()
        .map(|binding| {
            if binding.is_variable_length {
                vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT
                    | vk::DescriptorBindingFlags::PARTIALLY_BOUND
            } else {
                vk::DescriptorBindingFlags::empty()
            }
        })
        .collect();
    let mut flags_info =
        vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);

    let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
        .bindings(&layout_bindings)
        .push_next(&mut flags_info);

    let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }?;
    Ok(layout)
}

pub fn create_pool(
    device: &ash::Device,
    sizes: &[u32; NUM_DESCRIPTOR_TYPES],
    max_sets: u32,
) -> Result<vk::DescriptorPool> {
    // Zero-sized entries are not allowed
    let pool_sizes: Vec<vk::DescriptorPoolSize> = DescriptorType::ALL
        .iter()
        .filter(|ty| sizes[ty.index()] > 0)
        .map(|ty| vk::DescriptorPoolSize {
            ty: ty.to_vk(),
            descriptor_count: sizes[ty.index()],
        })
        .collect();

    let pool_info = vk::DescriptorPoolCreateInfo::default()
        .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        .max_sets(max_sets)
        .pool_sizes(&pool_sizes);

    let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }?;
    Ok(pool)
}

pub fn allocate_set(
    device: &ash::Device,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
    variable_length: Option<u32>,
) -> Result<vk::DescriptorSet> {
    let layouts = [layout];
    let counts = [variable_length.unwrap_or(0)];
    let mut variable_info =
        vk::DescriptorSetVariableDescriptorCountAllocateInfo::default().descriptor_counts(&counts);

    let mut alloc_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(&layouts);
    if variable_length.is_some() {
        alloc_info = alloc_info.push_next(&mut variable_info);
    }

    let sets = unsafe { device.allocate_descriptor_sets(&alloc_info) }?;
    Ok(sets[0])
}

pub fn free_set(device: &ash::Device, pool: vk::DescriptorPool, set: vk::DescriptorSet) {
    if let Err(err) = unsafe { device.free_descriptor_sets(pool, &[set]) } {
        log::warn!("Failed to free descriptor set: {:?}", err);
    }
}

pub fn write_set(device: &ash::Device, write: &DescriptorWrite<'_>) {
    let base = vk::WriteDescriptorSet::default()
        .dst_set(write.set)
        .dst_binding(write.binding)
        .dst_array_element(write.element)
        .descriptor_type(write.ty);

    let native = match write.payload {
        DescriptorPayload::Buffers(infos) => base.buffer_info(infos),
        DescriptorPayload::TexelBuffers(views) => base.texel_buffer_view(views),
        DescriptorPayload::Images(infos) => base.image_info(infos),
    };

    unsafe { device.update_descriptor_sets(&[native], &[]) };
}
