// Buffer views, image views and samplers

use ash::vk;

use crate::error::Result;
use crate::types::{BufferViewDesc, ImageViewDesc, SamplerDesc};

pub fn create_buffer_view(
    device: &ash::Device,
    buffer: vk::Buffer,
    desc: &BufferViewDesc,
) -> Result<vk::BufferView> {
    let view_info = vk::BufferViewCreateInfo::default()
        .buffer(buffer)
        .format(desc.format)
        .offset(desc.offset)
        .range(desc.size);

    let view = unsafe { device.create_buffer_view(&view_info, None) }?;
    Ok(view)
}

pub fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    desc: &ImageViewDesc,
) -> Result<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(desc.view_type)
        .format(desc.format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: desc.aspects,
            base_mip_level: desc.first_mip_level,
            level_count: desc.num_mip_levels,
            base_array_layer: desc.first_array_layer,
            layer_count: desc.num_array_layers,
        });

    let view = unsafe { device.create_image_view(&view_info, None) }?;
    Ok(view)
}

pub fn create_sampler(device: &ash::Device, desc: &SamplerDesc) -> Result<vk::Sampler> {
    let sampler_info = vk::SamplerCreateInfo::default()
        .mag_filter(desc.mag_filter)
        .min_filter(desc.min_filter)
        .mipmap_mode(desc.mipmap_mode)
        .address_mode_u(desc.address_mode_u)
        .address_mode_v(desc.address_mode_v)
        .address_mode_w(desc.address_mode_w)
        .mip_lod_bias(desc.mip_lod_bias)
        .anisotropy_enable(desc.max_anisotropy.is_some())
        .max_anisotropy(desc.max_anisotropy.unwrap_or(1.0))
        .compare_enable(desc.compare_op.is_some())
        .compare_op(desc.compare_op.unwrap_or(vk::CompareOp::ALWAYS))
        .min_lod(desc.min_lod)
        .max_lod(desc.max_lod)
        .border_color(desc.border_color)
        .unnormalized_coordinates(desc.unnormalized_coordinates);

    let sampler = unsafe { device.create_sampler(&sampler_info, None) }?;
    Ok(sampler)
}
