// Descriptor heap growth and set lifetime through the device facade

mod common;

use ash::vk;
use vk_encoder::{
    BufferBinding, DescriptorBindingDesc, DescriptorSetUpdate, DescriptorType, DeviceSettings,
    NativeCall, Status,
};

use common::*;

#[test]
fn oversized_layout_gets_its_own_pool() {
    let mut device = stub_device_with(DeviceSettings {
        descriptor_pool_size: 1024,
        ..Default::default()
    });
    let small = set_layout(
        &mut device,
        &[DescriptorBindingDesc::new(DescriptorType::UniformBuffer, 4)],
    );
    let textures = set_layout(
        &mut device,
        &[DescriptorBindingDesc::variable(DescriptorType::SampledImage, 2048)],
    );

    device.create_descriptor_set(small, &[]).unwrap();
    assert_eq!(device.heap_stats().num_pools(), 1);

    device.create_descriptor_set(textures, &[1200]).unwrap();
    let stats = device.heap_stats();
    assert_eq!(stats.num_pools(), 2);
    let grown = &stats.pools[1];
    assert_eq!(grown.avail[DescriptorType::SampledImage.index()], 0);
    assert_eq!(grown.avail[DescriptorType::UniformBuffer.index()], 1024);

    let sizes = device
        .backend()
        .calls()
        .iter()
        .filter_map(|call| match call {
            NativeCall::CreateDescriptorPool { sizes, .. } => Some(*sizes),
            _ => None,
        })
        .last()
        .unwrap();
    assert_eq!(sizes[DescriptorType::SampledImage.index()], 1200);
}

#[test]
fn small_sets_share_the_first_pool() {
    let mut device = stub_device_with(DeviceSettings {
        descriptor_pool_size: 64,
        ..Default::default()
    });
    let layout = set_layout(
        &mut device,
        &[
            DescriptorBindingDesc::new(DescriptorType::UniformBuffer, 1),
            DescriptorBindingDesc::new(DescriptorType::StorageBuffer, 2),
        ],
    );

    let sets: Vec<_> = (0..10)
        .map(|_| device.create_descriptor_set(layout, &[]).unwrap())
        .collect();
    let stats = device.heap_stats();
    assert_eq!(stats.num_pools(), 1);
    assert_eq!(stats.pools[0].avail_sets, 54);
    assert_eq!(stats.pools[0].avail[DescriptorType::StorageBuffer.index()], 44);

    for set in sets {
        device.destroy_descriptor_set(set);
    }
    let stats = device.heap_stats();
    assert_eq!(stats.pools[0].avail_sets, 64);
    assert!(stats.pools[0].avail.iter().all(|&avail| avail == 64));
}

#[test]
fn failed_set_allocation_reports_status() {
    let mut device = stub_device();
    let layout = set_layout(
        &mut device,
        &[DescriptorBindingDesc::new(DescriptorType::UniformBuffer, 1)],
    );
    device.backend_mut().fail_next_create(Status::OutOfDeviceMemory);

    let result = device.create_descriptor_set(layout, &[]);
    assert_eq!(result.unwrap_err(), Status::OutOfDeviceMemory);
}

#[test]
fn update_writes_native_descriptors() {
    let mut device = stub_device();
    let first = buffer(&mut device, "a", 64, vk::BufferUsageFlags::STORAGE_BUFFER);
    let second = buffer(&mut device, "b", 64, vk::BufferUsageFlags::STORAGE_BUFFER);
    let layout = set_layout(
        &mut device,
        &[DescriptorBindingDesc::new(DescriptorType::StorageBuffer, 4)],
    );
    let set = device.create_descriptor_set(layout, &[]).unwrap();
    device.backend_mut().clear_calls();

    device.update_descriptor_set(&DescriptorSetUpdate {
        set,
        binding: 0,
        element: 1,
        buffers: &[BufferBinding::whole(first), BufferBinding::whole(second)],
        texel_buffers: &[],
        images: &[],
    });

    match device.backend().calls() {
        [NativeCall::WriteDescriptorSet {
            binding,
            element,
            count,
            ..
        }] => assert_eq!((*binding, *element, *count), (0, 1, 2)),
        calls => panic!("unexpected calls {:?}", calls),
    }
}

#[test]
#[should_panic(expected = "lacks")]
fn update_rejects_buffer_without_matching_usage() {
    let mut device = stub_device();
    let uniform_only = buffer(&mut device, "u", 64, vk::BufferUsageFlags::UNIFORM_BUFFER);
    let layout = set_layout(
        &mut device,
        &[DescriptorBindingDesc::new(DescriptorType::StorageBuffer, 1)],
    );
    let set = device.create_descriptor_set(layout, &[]).unwrap();

    device.update_descriptor_set(&DescriptorSetUpdate {
        set,
        binding: 0,
        element: 0,
        buffers: &[BufferBinding::whole(uniform_only)],
        texel_buffers: &[],
        images: &[],
    });
}

#[test]
#[should_panic(expected = "stale or invalid descriptor set")]
fn destroyed_set_handle_is_stale() {
    let mut device = stub_device();
    let layout = set_layout(
        &mut device,
        &[DescriptorBindingDesc::new(DescriptorType::UniformBuffer, 1)],
    );
    let set = device.create_descriptor_set(layout, &[]).unwrap();
    device.destroy_descriptor_set(set);
    device.destroy_descriptor_set(set);
}
