// Barrier derivation through the encoder, observed at the native call level

mod common;

use ash::vk;
use glam::Vec4;
use vk_encoder::{
    BufferBinding, DescriptorBindingDesc, DescriptorSetUpdate, DescriptorType, ImageBinding,
    RenderPassBeginInfo, Viewport,
};

use common::*;

#[test]
fn compute_read_write_read_emits_two_barriers() {
    let mut device = stub_device();
    let data = buffer(
        &mut device,
        "particles",
        256,
        vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::STORAGE_BUFFER,
    );

    let read_layout = set_layout(
        &mut device,
        &[DescriptorBindingDesc::new(DescriptorType::UniformBuffer, 1)],
    );
    let write_layout = set_layout(
        &mut device,
        &[DescriptorBindingDesc::new(DescriptorType::StorageBuffer, 1)],
    );
    let read_set = device.create_descriptor_set(read_layout, &[]).unwrap();
    let write_set = device.create_descriptor_set(write_layout, &[]).unwrap();
    for set in [read_set, write_set] {
        device.update_descriptor_set(&DescriptorSetUpdate {
            set,
            binding: 0,
            element: 0,
            buffers: &[BufferBinding::whole(data)],
            texel_buffers: &[],
            images: &[],
        });
    }
    let reader = compute_pipeline(&mut device, &[read_layout]);
    let writer = compute_pipeline(&mut device, &[write_layout]);

    device.begin_frame(None).unwrap();
    device.backend_mut().clear_calls();
    {
        let mut encoder = device.encoder();
        encoder.begin_compute_pass();
        for (pipeline, set) in [(reader, read_set), (writer, write_set), (reader, read_set)] {
            encoder.bind_compute_pipeline(pipeline);
            encoder.bind_descriptor_sets(&[set], &[]);
            encoder.dispatch(8, 1, 1);
        }
        encoder.end_compute_pass();
        assert!(encoder.status().is_ok());
    }

    let calls = device.backend().calls().to_vec();
    let barriers = barriers(&calls);
    assert_eq!(barriers.len(), 2, "first read needs no barrier");

    // Write after read waits on the uniform reader
    assert_eq!(barriers[0].src_stages, vk::PipelineStageFlags::COMPUTE_SHADER);
    assert_eq!(barriers[0].buffers.len(), 1);
    assert_eq!(barriers[0].buffers[0].src_access, vk::AccessFlags::UNIFORM_READ);
    assert_eq!(
        barriers[0].buffers[0].dst_access,
        vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE
    );

    // Read after write waits on the storage writer
    assert_eq!(barriers[1].src_stages, vk::PipelineStageFlags::COMPUTE_SHADER);
    assert_eq!(barriers[1].dst_stages, vk::PipelineStageFlags::COMPUTE_SHADER);
    assert_eq!(
        barriers[1].buffers[0].src_access,
        vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE
    );
    assert_eq!(barriers[1].buffers[0].dst_access, vk::AccessFlags::UNIFORM_READ);

    let names = command_names(&calls);
    assert_eq!(names.iter().filter(|&&name| name == "Dispatch").count(), 3);
    // Each barrier lands right before the dispatch it guards
    let dispatches: Vec<usize> = names
        .iter()
        .enumerate()
        .filter(|(_, name)| **name == "Dispatch")
        .map(|(index, _)| index)
        .collect();
    assert_eq!(names[dispatches[1] - 1], "PipelineBarrier");
    assert_eq!(names[dispatches[2] - 1], "PipelineBarrier");
}

#[test]
fn repeated_compatible_reads_after_write_are_coalesced() {
    let mut device = stub_device();
    let data = buffer(
        &mut device,
        "lights",
        64,
        vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
    );
    let layout = set_layout(
        &mut device,
        &[DescriptorBindingDesc::new(DescriptorType::UniformBuffer, 1)],
    );
    let set = device.create_descriptor_set(layout, &[]).unwrap();
    device.update_descriptor_set(&DescriptorSetUpdate {
        set,
        binding: 0,
        element: 0,
        buffers: &[BufferBinding::whole(data)],
        texel_buffers: &[],
        images: &[],
    });
    let reader = compute_pipeline(&mut device, &[layout]);

    device.begin_frame(None).unwrap();
    device.backend_mut().clear_calls();
    {
        let mut encoder = device.encoder();
        encoder.update_buffer(data, 0, &[0u8; 16]);
        encoder.begin_compute_pass();
        encoder.bind_compute_pipeline(reader);
        encoder.bind_descriptor_sets(&[set], &[]);
        encoder.dispatch(1, 1, 1);
        encoder.dispatch(1, 1, 1);
        encoder.end_compute_pass();
    }

    let barriers = barriers(device.backend().calls());
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].src_stages, vk::PipelineStageFlags::TRANSFER);
    assert_eq!(barriers[0].buffers[0].src_access, vk::AccessFlags::TRANSFER_WRITE);
    assert_eq!(barriers[0].buffers[0].dst_access, vk::AccessFlags::UNIFORM_READ);
}

#[test]
fn upload_then_dispatch_waits_on_the_copy() {
    let mut device = stub_device();
    let staging = buffer(&mut device, "staging", 128, vk::BufferUsageFlags::TRANSFER_SRC);
    let storage = buffer(
        &mut device,
        "storage",
        128,
        vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::STORAGE_BUFFER,
    );
    let layout = set_layout(
        &mut device,
        &[DescriptorBindingDesc::new(DescriptorType::StorageBuffer, 1)],
    );
    let set = device.create_descriptor_set(layout, &[]).unwrap();
    device.update_descriptor_set(&DescriptorSetUpdate {
        set,
        binding: 0,
        element: 0,
        buffers: &[BufferBinding::whole(storage)],
        texel_buffers: &[],
        images: &[],
    });
    let pipeline = compute_pipeline(&mut device, &[layout]);

    device.begin_frame(None).unwrap();
    device.backend_mut().clear_calls();
    {
        let mut encoder = device.encoder();
        encoder.copy_buffer(
            staging,
            storage,
            &[vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: 128,
            }],
        );
        encoder.begin_compute_pass();
        encoder.bind_compute_pipeline(pipeline);
        encoder.bind_descriptor_sets(&[set], &[]);
        encoder.push_constants(&[0u8; 16]);
        encoder.dispatch(4, 4, 1);
        encoder.end_compute_pass();
    }

    let calls = device.backend().calls().to_vec();
    assert_eq!(
        command_names(&calls),
        [
            "CopyBuffer",
            "BindPipeline",
            "BindDescriptorSets",
            "PushConstants",
            "PipelineBarrier",
            "Dispatch"
        ]
    );
    let barriers = barriers(&calls);
    assert_eq!(barriers[0].src_stages, vk::PipelineStageFlags::TRANSFER);
    assert_eq!(barriers[0].dst_stages, vk::PipelineStageFlags::COMPUTE_SHADER);
    assert_eq!(barriers[0].buffers[0].src_access, vk::AccessFlags::TRANSFER_WRITE);
}

#[test]
fn clearing_render_pass_transitions_from_undefined() {
    let mut device = stub_device();
    let (_, view) = color_image(
        &mut device,
        "target",
        vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
    );
    let (render_pass, framebuffer) = color_target(&mut device, view, vk::AttachmentLoadOp::CLEAR);

    device.begin_frame(None).unwrap();
    device.backend_mut().clear_calls();
    {
        let mut encoder = device.encoder();
        encoder.begin_render_pass(&RenderPassBeginInfo {
            framebuffer,
            render_pass,
            render_area: full_area(),
            color_clear_values: &[Vec4::new(0.1, 0.2, 0.3, 1.0)],
            depth_stencil_clear_value: Default::default(),
        });
        encoder.end_render_pass();
    }

    let calls = device.backend().calls().to_vec();
    assert_eq!(
        command_names(&calls),
        ["PipelineBarrier", "BeginRenderPass", "EndRenderPass"]
    );
    let barriers = barriers(&calls);
    let barrier = &barriers[0];
    assert_eq!(barrier.src_stages, vk::PipelineStageFlags::TOP_OF_PIPE);
    assert_eq!(barrier.dst_stages, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
    assert_eq!(barrier.images.len(), 1);
    let image = &barrier.images[0];
    assert_eq!(image.src_access, vk::AccessFlags::NONE);
    assert_eq!(image.dst_access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
    assert_eq!(image.old_layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(image.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    match calls
        .iter()
        .find(|call| matches!(call, vk_encoder::NativeCall::BeginRenderPass { .. }))
    {
        Some(vk_encoder::NativeCall::BeginRenderPass {
            clear_value_count, ..
        }) => assert_eq!(*clear_value_count, 1),
        _ => unreachable!(),
    }
}

#[test]
fn render_pass_commands_are_deferred_until_end() {
    let mut device = stub_device();
    let (_, target_view) = color_image(
        &mut device,
        "target",
        vk::ImageUsageFlags::COLOR_ATTACHMENT,
    );
    let (texture, texture_view) = color_image(&mut device, "texture", vk::ImageUsageFlags::SAMPLED);
    let (render_pass, framebuffer) =
        color_target(&mut device, target_view, vk::AttachmentLoadOp::CLEAR);

    let layout = set_layout(
        &mut device,
        &[DescriptorBindingDesc::new(DescriptorType::SampledImage, 1)],
    );
    let set = device.create_descriptor_set(layout, &[]).unwrap();
    device.update_descriptor_set(&DescriptorSetUpdate {
        set,
        binding: 0,
        element: 0,
        buffers: &[],
        texel_buffers: &[],
        images: &[ImageBinding {
            sampler: None,
            image_view: Some(texture_view),
        }],
    });
    let pipeline = graphics_pipeline(&mut device, render_pass, &[layout]);

    device.begin_frame(None).unwrap();
    device.backend_mut().clear_calls();
    {
        let mut encoder = device.encoder();
        encoder.begin_render_pass(&RenderPassBeginInfo {
            framebuffer,
            render_pass,
            render_area: full_area(),
            color_clear_values: &[Vec4::ZERO],
            depth_stencil_clear_value: Default::default(),
        });
        encoder.set_viewport(Viewport::from_extent(full_area().extent));
        encoder.bind_graphics_pipeline(pipeline);
        encoder.bind_descriptor_sets(&[set], &[]);
        encoder.draw(4, 1, 0, 0);
    }
    // Nothing reaches the command buffer while the pass is open
    assert!(device.backend().commands().is_empty());

    device.encoder().end_render_pass();

    let calls = device.backend().calls().to_vec();
    assert_eq!(
        command_names(&calls),
        [
            "PipelineBarrier",
            "BeginRenderPass",
            "SetViewport",
            "BindPipeline",
            "BindDescriptorSets",
            "Draw",
            "EndRenderPass"
        ]
    );

    let barriers = barriers(&calls);
    assert_eq!(barriers.len(), 1, "the whole pass shares one barrier");
    let barrier = &barriers[0];
    assert_eq!(
        barrier.dst_stages,
        vk::PipelineStageFlags::VERTEX_SHADER
            | vk::PipelineStageFlags::FRAGMENT_SHADER
            | vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
    );
    assert_eq!(barrier.images.len(), 2);

    let texture_vk = device.resources().image(texture).vk;
    let sampled = barrier
        .images
        .iter()
        .find(|image| image.image == texture_vk)
        .unwrap();
    assert_eq!(sampled.old_layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(sampled.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(sampled.dst_access, vk::AccessFlags::SHADER_READ);

    let attachment = barrier
        .images
        .iter()
        .find(|image| image.image != texture_vk)
        .unwrap();
    assert_eq!(attachment.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    match calls
        .iter()
        .find(|call| matches!(call, vk_encoder::NativeCall::Draw { .. }))
    {
        Some(vk_encoder::NativeCall::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        }) => assert_eq!(
            (*vertex_count, *instance_count, *first_vertex, *first_instance),
            (4, 1, 0, 0)
        ),
        _ => unreachable!(),
    }
}

#[test]
fn vertex_buffer_written_by_compute_is_synced_before_the_pass() {
    let mut device = stub_device();
    let vertices = buffer(
        &mut device,
        "vertices",
        1024,
        vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::STORAGE_BUFFER,
    );
    let layout = set_layout(
        &mut device,
        &[DescriptorBindingDesc::new(DescriptorType::StorageBuffer, 1)],
    );
    let set = device.create_descriptor_set(layout, &[]).unwrap();
    device.update_descriptor_set(&DescriptorSetUpdate {
        set,
        binding: 0,
        element: 0,
        buffers: &[BufferBinding::whole(vertices)],
        texel_buffers: &[],
        images: &[],
    });
    let compute = compute_pipeline(&mut device, &[layout]);
    let (_, view) = color_image(&mut device, "target", vk::ImageUsageFlags::COLOR_ATTACHMENT);
    let (render_pass, framebuffer) = color_target(&mut device, view, vk::AttachmentLoadOp::CLEAR);
    let graphics = graphics_pipeline(&mut device, render_pass, &[]);

    device.begin_frame(None).unwrap();
    device.backend_mut().clear_calls();
    {
        let mut encoder = device.encoder();
        encoder.begin_compute_pass();
        encoder.bind_compute_pipeline(compute);
        encoder.bind_descriptor_sets(&[set], &[]);
        encoder.dispatch(16, 1, 1);
        encoder.end_compute_pass();

        encoder.begin_render_pass(&RenderPassBeginInfo {
            framebuffer,
            render_pass,
            render_area: full_area(),
            color_clear_values: &[Vec4::ZERO],
            depth_stencil_clear_value: Default::default(),
        });
        encoder.bind_graphics_pipeline(graphics);
        encoder.bind_vertex_buffers(&[vertices], &[0]);
        encoder.draw(3, 1, 0, 0);
        encoder.end_render_pass();
    }

    let barriers = barriers(device.backend().calls());
    assert_eq!(barriers.len(), 1);
    let barrier = &barriers[0];
    assert!(barrier.src_stages.contains(vk::PipelineStageFlags::COMPUTE_SHADER));
    assert!(barrier.dst_stages.contains(vk::PipelineStageFlags::VERTEX_INPUT));
    assert_eq!(barrier.buffers.len(), 1);
    assert_eq!(
        barrier.buffers[0].src_access,
        vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE
    );
    assert_eq!(barrier.buffers[0].dst_access, vk::AccessFlags::VERTEX_ATTRIBUTE_READ);
}

#[test]
fn rebinding_a_set_inside_a_pass_syncs_it_once() {
    let mut device = stub_device();
    let particles = buffer(
        &mut device,
        "particles",
        512,
        vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
    );
    let layout = set_layout(
        &mut device,
        &[DescriptorBindingDesc::new(DescriptorType::StorageBuffer, 1)],
    );
    let set = device.create_descriptor_set(layout, &[]).unwrap();
    device.update_descriptor_set(&DescriptorSetUpdate {
        set,
        binding: 0,
        element: 0,
        buffers: &[BufferBinding::whole(particles)],
        texel_buffers: &[],
        images: &[],
    });
    let (_, view) = color_image(&mut device, "target", vk::ImageUsageFlags::COLOR_ATTACHMENT);
    let (render_pass, framebuffer) = color_target(&mut device, view, vk::AttachmentLoadOp::CLEAR);
    let pipeline = graphics_pipeline(&mut device, render_pass, &[layout]);

    device.begin_frame(None).unwrap();
    device.backend_mut().clear_calls();
    {
        let mut encoder = device.encoder();
        encoder.fill_buffer(particles, 0, vk::WHOLE_SIZE, 0);
        encoder.begin_render_pass(&RenderPassBeginInfo {
            framebuffer,
            render_pass,
            render_area: full_area(),
            color_clear_values: &[Vec4::ZERO],
            depth_stencil_clear_value: Default::default(),
        });
        encoder.bind_graphics_pipeline(pipeline);
        for _ in 0..3 {
            encoder.bind_descriptor_sets(&[set], &[]);
            encoder.draw(4, 1, 0, 0);
        }
        encoder.end_render_pass();
    }

    let barriers = barriers(device.backend().calls());
    assert_eq!(barriers.len(), 1);
    let barrier = &barriers[0];
    assert_eq!(barrier.buffers.len(), 1);
    assert_eq!(barrier.buffers[0].src_access, vk::AccessFlags::TRANSFER_WRITE);
    assert_eq!(
        barrier.buffers[0].dst_access,
        vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE
    );
    assert_eq!(barrier.images.len(), 1);
}
