// Frame ring lifecycle: deferred destruction, swapchain recovery and presentation

mod common;

use ash::vk;
use glam::Vec4;
use vk_encoder::{
    BufferDesc, DeviceSettings, EncoderState, NativeCall, RenderPassBeginInfo, Status,
    SwapchainDesc,
};

use common::*;

fn count(calls: &[NativeCall], pred: impl Fn(&NativeCall) -> bool) -> usize {
    calls.iter().filter(|call| pred(call)).count()
}

#[test]
fn released_buffer_outlives_frames_in_flight() {
    let mut device = stub_device_with(DeviceSettings {
        buffering: 2,
        ..Default::default()
    });
    let scratch = buffer(&mut device, "scratch", 64, vk::BufferUsageFlags::TRANSFER_DST);
    let native = device.resources().buffer(scratch).vk;
    let destroyed = |device: &vk_encoder::Device<vk_encoder::StubBackend>| {
        device
            .backend()
            .calls()
            .iter()
            .any(|call| matches!(call, NativeCall::DestroyBuffer(buffer) if *buffer == native))
    };

    // Frame 0 uses the buffer, then lets go of it
    device.begin_frame(None).unwrap();
    device.encoder().fill_buffer(scratch, 0, vk::WHOLE_SIZE, 0);
    device.release_buffer(scratch);
    device.submit_frame(None).unwrap();

    // Frames 1 and 2 may still overlap frame 0 on the GPU
    for _ in 0..2 {
        device.begin_frame(None).unwrap();
        assert!(!destroyed(&device));
        device.submit_frame(None).unwrap();
    }

    device.begin_frame(None).unwrap();
    assert!(destroyed(&device));
    assert_eq!(device.get_frame_context().tail, 1);
    device.submit_frame(None).unwrap();
}

#[test]
fn idle_purge_destroys_everything_released() {
    let mut device = stub_device();
    let (image, view) = color_image(&mut device, "transient", vk::ImageUsageFlags::SAMPLED);
    device.release_image_view(view);
    device.release_image(image);

    device.idle_purge().unwrap();
    let calls = device.backend().calls();
    assert_eq!(count(calls, |call| matches!(call, NativeCall::WaitIdle)), 1);
    assert_eq!(count(calls, |call| matches!(call, NativeCall::DestroyImageView(_))), 1);
    assert_eq!(count(calls, |call| matches!(call, NativeCall::DestroyImage(_))), 1);
}

#[test]
fn frame_context_advances_through_the_ring() {
    let mut device = stub_device_with(DeviceSettings {
        buffering: 3,
        ..Default::default()
    });
    let mut fences = Vec::new();
    for frame in 0..6u64 {
        let info = device.get_frame_context();
        assert_eq!(info.current, frame);
        assert_eq!(info.ring_index, (frame % 3) as usize);
        assert_eq!(info.tail, frame.saturating_sub(3));

        device.backend_mut().clear_calls();
        device.begin_frame(None).unwrap();
        match device.backend().calls().first() {
            Some(NativeCall::WaitForFence(fence)) => fences.push(*fence),
            other => panic!("expected a fence wait first, got {:?}", other),
        }
        device.submit_frame(None).unwrap();
    }
    // Slot fences are reused in ring order
    assert_eq!(fences[0..3], fences[3..6]);
    assert_ne!(fences[0], fences[1]);
}

#[test]
fn out_of_date_acquire_recreates_and_presents() {
    let mut device = stub_device();
    let swapchain = device.create_swapchain(&SwapchainDesc::default()).unwrap();
    let old = match device.backend().calls().last() {
        Some(NativeCall::CreateSwapchain { swapchain, .. }) => *swapchain,
        other => panic!("expected swapchain creation, got {:?}", other),
    };
    assert_eq!(device.get_swapchain_state(swapchain).images.len(), 3);

    device.backend_mut().clear_calls();
    device.backend_mut().script_acquire(Err(Status::OutOfDate));
    device.begin_frame(Some(swapchain)).unwrap();

    let calls = device.backend().calls().to_vec();
    let new = match calls
        .iter()
        .find(|call| matches!(call, NativeCall::CreateSwapchain { .. }))
    {
        Some(NativeCall::CreateSwapchain { swapchain, old: retired }) => {
            assert_eq!(*retired, old);
            *swapchain
        }
        _ => panic!("swapchain was not recreated: {:?}", calls),
    };
    let acquire_order: Vec<vk::SwapchainKHR> = calls
        .iter()
        .filter_map(|call| match call {
            NativeCall::AcquireNextImage(handle) => Some(*handle),
            _ => None,
        })
        .collect();
    assert_eq!(acquire_order, [old, new]);
    assert!(calls.iter().any(|call| matches!(call, NativeCall::WaitIdle)));
    assert!(calls
        .iter()
        .any(|call| matches!(call, NativeCall::DestroySwapchain(handle) if *handle == old)));

    let state = device.get_swapchain_state(swapchain);
    assert_eq!(state.current_image, Some(0));
    assert!(!state.is_out_of_date);

    device.backend_mut().clear_calls();
    device.submit_frame(Some(swapchain)).unwrap();
    let calls = device.backend().calls().to_vec();

    let barriers = barriers(&calls);
    assert_eq!(barriers.len(), 1);
    assert_eq!(barriers[0].dst_stages, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
    assert_eq!(barriers[0].images[0].new_layout, vk::ImageLayout::PRESENT_SRC_KHR);

    assert!(calls.iter().any(|call| matches!(
        call,
        NativeCall::Submit {
            wait: Some(_),
            signal: Some(_),
            ..
        }
    )));
    assert!(matches!(
        calls.last(),
        Some(NativeCall::Present { swapchain, image_index: 0 }) if *swapchain == new
    ));
}

#[test]
fn cleared_swapchain_image_transitions_to_present() {
    let mut device = stub_device();
    let swapchain = device.create_swapchain(&SwapchainDesc::default()).unwrap();
    let state = device.get_swapchain_state(swapchain);

    device.begin_frame(Some(swapchain)).unwrap();
    let index = device.get_swapchain_state(swapchain).current_image.unwrap();
    let image = state.images[index as usize];
    device.backend_mut().clear_calls();
    device
        .encoder()
        .clear_color_image(image, Vec4::new(1.0, 0.0, 0.0, 1.0));
    device.submit_frame(Some(swapchain)).unwrap();

    let barriers = barriers(device.backend().calls());
    assert_eq!(barriers.len(), 2);
    assert_eq!(barriers[0].images[0].new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    let present = &barriers[1];
    assert_eq!(present.src_stages, vk::PipelineStageFlags::TRANSFER);
    assert_eq!(present.images[0].src_access, vk::AccessFlags::TRANSFER_WRITE);
    assert_eq!(present.images[0].old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    assert_eq!(present.images[0].new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
}

#[test]
fn out_of_date_present_recreates_on_next_frame() {
    let mut device = stub_device();
    let swapchain = device.create_swapchain(&SwapchainDesc::default()).unwrap();

    device.backend_mut().script_present(Err(Status::OutOfDate));
    device.begin_frame(Some(swapchain)).unwrap();
    device.submit_frame(Some(swapchain)).unwrap();
    assert!(device.get_swapchain_state(swapchain).is_out_of_date);

    device.backend_mut().clear_calls();
    device.begin_frame(Some(swapchain)).unwrap();
    let calls = device.backend().calls();
    assert_eq!(
        count(calls, |call| matches!(call, NativeCall::CreateSwapchain { .. })),
        1
    );
    assert!(!device.get_swapchain_state(swapchain).is_out_of_date);
    device.submit_frame(Some(swapchain)).unwrap();
}

#[test]
fn zero_sized_surface_skips_acquire_and_present() {
    let mut device = stub_device();
    let swapchain = device.create_swapchain(&SwapchainDesc::default()).unwrap();

    // Minimized window
    device.backend_mut().set_surface_extent(vk::Extent2D {
        width: 0,
        height: 0,
    });
    device.invalidate_swapchain(swapchain, &SwapchainDesc::default());
    device.backend_mut().clear_calls();
    device.begin_frame(Some(swapchain)).unwrap();
    device.submit_frame(Some(swapchain)).unwrap();

    let state = device.get_swapchain_state(swapchain);
    assert!(state.is_zero_sized);
    assert!(state.images.is_empty());
    let calls = device.backend().calls();
    assert_eq!(count(calls, |call| matches!(call, NativeCall::AcquireNextImage(_))), 0);
    assert_eq!(count(calls, |call| matches!(call, NativeCall::Present { .. })), 0);
    assert!(calls
        .iter()
        .any(|call| matches!(call, NativeCall::Submit { wait: None, signal: None, .. })));

    // Still minimized: retried each frame, still nothing to present
    device.backend_mut().clear_calls();
    device.begin_frame(Some(swapchain)).unwrap();
    device.submit_frame(Some(swapchain)).unwrap();
    assert!(device.get_swapchain_state(swapchain).is_zero_sized);
    assert_eq!(
        count(device.backend().calls(), |call| matches!(call, NativeCall::Present { .. })),
        0
    );

    // Restored, picked up without another invalidate_swapchain
    device.backend_mut().set_surface_extent(vk::Extent2D {
        width: 800,
        height: 600,
    });
    device.begin_frame(Some(swapchain)).unwrap();
    let state = device.get_swapchain_state(swapchain);
    assert!(!state.is_zero_sized);
    assert_eq!(state.extent.width, 800);
    assert_eq!(state.current_image, Some(0));
    device.submit_frame(Some(swapchain)).unwrap();
}

#[test]
#[should_panic(expected = "swapchain recreation failed twice")]
fn repeated_recreation_failure_is_fatal() {
    let mut device = stub_device();
    let swapchain = device.create_swapchain(&SwapchainDesc::default()).unwrap();
    device.invalidate_swapchain(swapchain, &SwapchainDesc::default());
    device
        .backend_mut()
        .script_swapchain_create(Err(Status::SurfaceLost));
    device
        .backend_mut()
        .script_swapchain_create(Err(Status::SurfaceLost));

    let _ = device.begin_frame(Some(swapchain));
}

#[test]
fn failed_command_buffer_close_abandons_the_frame() {
    let mut device = stub_device();
    let swapchain = device.create_swapchain(&SwapchainDesc::default()).unwrap();

    device.begin_frame(Some(swapchain)).unwrap();
    device
        .backend_mut()
        .script_end_command_buffer(Err(Status::OutOfDeviceMemory));
    device.backend_mut().clear_calls();
    assert_eq!(
        device.submit_frame(Some(swapchain)).unwrap_err(),
        Status::OutOfDeviceMemory
    );

    // Nothing went to the queue and the fence was left signalled
    let calls = device.backend().calls();
    assert_eq!(count(calls, |call| matches!(call, NativeCall::ResetFence(_))), 0);
    assert_eq!(count(calls, |call| matches!(call, NativeCall::Submit { .. })), 0);
    assert_eq!(count(calls, |call| matches!(call, NativeCall::Present { .. })), 0);
    assert_eq!(device.get_frame_context().current, 0);
    assert!(device.get_swapchain_state(swapchain).is_out_of_date);

    // The same slot opens again, with a fresh swapchain
    device.backend_mut().clear_calls();
    device.begin_frame(Some(swapchain)).unwrap();
    device.submit_frame(Some(swapchain)).unwrap();
    let calls = device.backend().calls();
    assert_eq!(
        count(calls, |call| matches!(call, NativeCall::CreateSwapchain { .. })),
        1
    );
    assert_eq!(count(calls, |call| matches!(call, NativeCall::Submit { .. })), 1);
    assert_eq!(count(calls, |call| matches!(call, NativeCall::Present { .. })), 1);
    assert_eq!(device.get_frame_context().current, 1);
}

#[test]
fn failed_acquire_leaves_the_slot_reusable() {
    let mut device = stub_device_with(DeviceSettings {
        buffering: 1,
        ..Default::default()
    });
    let swapchain = device.create_swapchain(&SwapchainDesc::default()).unwrap();

    device.backend_mut().script_acquire(Err(Status::SurfaceLost));
    assert_eq!(
        device.begin_frame(Some(swapchain)).unwrap_err(),
        Status::SurfaceLost
    );

    device.begin_frame(Some(swapchain)).unwrap();
    device.submit_frame(Some(swapchain)).unwrap();
    assert_eq!(device.get_frame_context().current, 1);
}

#[test]
#[should_panic(expected = "queue submission failed")]
fn failed_submission_is_fatal() {
    let mut device = stub_device();
    device.begin_frame(None).unwrap();
    device.backend_mut().script_submit(Err(Status::DeviceLost));
    let _ = device.submit_frame(None);
}

#[test]
fn encoder_failure_is_sticky_until_next_frame() {
    // Too small for even one descriptor set id; one slot so the next frame reuses this encoder
    let mut device = stub_device_with(DeviceSettings {
        buffering: 1,
        arg_pool_capacity: 4,
        ..Default::default()
    });
    let (_, view) = color_image(&mut device, "target", vk::ImageUsageFlags::COLOR_ATTACHMENT);
    let (render_pass, framebuffer) = color_target(&mut device, view, vk::AttachmentLoadOp::CLEAR);
    let layout = set_layout(
        &mut device,
        &[vk_encoder::DescriptorBindingDesc::new(
            vk_encoder::DescriptorType::UniformBuffer,
            1,
        )],
    );
    let set = device.create_descriptor_set(layout, &[]).unwrap();
    let pipeline = graphics_pipeline(&mut device, render_pass, &[layout]);
    let begin = RenderPassBeginInfo {
        framebuffer,
        render_pass,
        render_area: full_area(),
        color_clear_values: &[Vec4::ZERO],
        depth_stencil_clear_value: Default::default(),
    };

    device.begin_frame(None).unwrap();
    device.backend_mut().clear_calls();
    {
        let mut encoder = device.encoder();
        encoder.begin_render_pass(&begin);
        encoder.bind_graphics_pipeline(pipeline);
        encoder.bind_descriptor_sets(&[set], &[]);
        assert_eq!(encoder.status(), Err(Status::OutOfHostMemory));

        // Later calls are dropped without touching the command buffer
        encoder.draw(3, 1, 0, 0);
        encoder.end_render_pass();
        assert_eq!(encoder.state(), EncoderState::Recording);
        assert_eq!(encoder.status(), Err(Status::OutOfHostMemory));
    }
    assert!(device.backend().commands().is_empty());
    // The frame still submits so the ring keeps moving
    device.submit_frame(None).unwrap();
    assert_eq!(
        count(device.backend().calls(), |call| matches!(call, NativeCall::Submit { .. })),
        1
    );

    device.begin_frame(None).unwrap();
    assert!(device.encoder().status().is_ok());
    device.submit_frame(None).unwrap();
}

#[test]
#[should_panic(expected = "stale or invalid buffer handle")]
fn destroyed_buffer_handle_is_rejected() {
    let mut device = stub_device();
    let id = device
        .create_buffer(&BufferDesc {
            label: "short-lived".to_string(),
            size: 16,
            usage: vk::BufferUsageFlags::TRANSFER_DST,
            host_mapped: true,
        })
        .unwrap();
    device.destroy_buffer(id);

    device.begin_frame(None).unwrap();
    device.encoder().fill_buffer(id, 0, 16, 0);
}

#[test]
#[should_panic(expected = "requires an open frame")]
fn encoder_outside_a_frame_panics() {
    let mut device = stub_device();
    let _ = device.encoder();
}
