// Shared fixtures for the integration tests
//
// Everything runs against the stub backend, which records each native call
// so tests can assert on the exact barriers and commands a frame produces.

#![allow(dead_code)]

use ash::vk;
use glam::Vec4;
use vk_encoder::sync::BarrierBatch;
use vk_encoder::{
    BufferDesc, BufferId, ColorBlendAttachment, ComputePipelineDesc, ComputePipelineId,
    DescriptorBindingDesc, DescriptorSetLayoutDesc, DescriptorSetLayoutId, DepthStencilState,
    Device, DeviceSettings, FramebufferDesc, FramebufferId, GraphicsPipelineDesc,
    GraphicsPipelineId, ImageDesc, ImageId, ImageViewDesc, ImageViewId, NativeCall,
    RasterizationState, RenderPassAttachment, RenderPassDesc, RenderPassId, ShaderDesc,
    ShaderStageDesc, StubBackend,
};

/// Any non-empty word list passes as SPIR-V for the stub
pub const DUMMY_SPIRV: &[u32] = &[0x0723_0203, 0x0001_0000, 0, 1, 0];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn stub_device() -> Device<StubBackend> {
    stub_device_with(DeviceSettings::default())
}

pub fn stub_device_with(settings: DeviceSettings) -> Device<StubBackend> {
    init_logging();
    Device::new(StubBackend::new(), &settings).unwrap()
}

/// Every pipeline barrier recorded so far, in order
pub fn barriers(calls: &[NativeCall]) -> Vec<BarrierBatch> {
    calls
        .iter()
        .filter_map(|call| match call {
            NativeCall::PipelineBarrier(batch) => Some(batch.clone()),
            _ => None,
        })
        .collect()
}

/// Short names of the recorded command-buffer calls, for order assertions
pub fn command_names(calls: &[NativeCall]) -> Vec<&'static str> {
    calls
        .iter()
        .filter(|call| call.is_command())
        .map(|call| match call {
            NativeCall::PipelineBarrier(_) => "PipelineBarrier",
            NativeCall::BeginRenderPass { .. } => "BeginRenderPass",
            NativeCall::EndRenderPass => "EndRenderPass",
            NativeCall::BindPipeline { .. } => "BindPipeline",
            NativeCall::BindDescriptorSets { .. } => "BindDescriptorSets",
            NativeCall::PushConstants { .. } => "PushConstants",
            NativeCall::SetViewport { .. } => "SetViewport",
            NativeCall::SetScissor { .. } => "SetScissor",
            NativeCall::BindVertexBuffers { .. } => "BindVertexBuffers",
            NativeCall::BindIndexBuffer { .. } => "BindIndexBuffer",
            NativeCall::Draw { .. } => "Draw",
            NativeCall::DrawIndexed { .. } => "DrawIndexed",
            NativeCall::Dispatch { .. } => "Dispatch",
            NativeCall::CopyBuffer { .. } => "CopyBuffer",
            NativeCall::UpdateBuffer { .. } => "UpdateBuffer",
            NativeCall::FillBuffer { .. } => "FillBuffer",
            NativeCall::ClearColorImage { .. } => "ClearColorImage",
            NativeCall::BlitImage { .. } => "BlitImage",
            _ => "Other",
        })
        .collect()
}

pub fn buffer(
    device: &mut Device<StubBackend>,
    label: &str,
    size: u64,
    usage: vk::BufferUsageFlags,
) -> BufferId {
    device
        .create_buffer(&BufferDesc {
            label: label.to_string(),
            size,
            usage,
            host_mapped: false,
        })
        .unwrap()
}

pub fn color_image(
    device: &mut Device<StubBackend>,
    label: &str,
    usage: vk::ImageUsageFlags,
) -> (ImageId, ImageViewId) {
    let image = device
        .create_image(&ImageDesc {
            label: label.to_string(),
            usage,
            extent: vk::Extent3D {
                width: 64,
                height: 64,
                depth: 1,
            },
            ..Default::default()
        })
        .unwrap();
    let view = device
        .create_image_view(&ImageViewDesc::whole(
            image,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageAspectFlags::COLOR,
        ))
        .unwrap();
    (image, view)
}

pub fn set_layout(
    device: &mut Device<StubBackend>,
    bindings: &[DescriptorBindingDesc],
) -> DescriptorSetLayoutId {
    device
        .create_descriptor_set_layout(&DescriptorSetLayoutDesc {
            label: "test layout",
            bindings,
        })
        .unwrap()
}

pub fn compute_pipeline(
    device: &mut Device<StubBackend>,
    layouts: &[DescriptorSetLayoutId],
) -> ComputePipelineId {
    let shader = device
        .create_shader(&ShaderDesc {
            label: "test compute",
            spirv_code: DUMMY_SPIRV,
        })
        .unwrap();
    device
        .create_compute_pipeline(&ComputePipelineDesc {
            label: "test compute",
            compute_shader: ShaderStageDesc {
                shader,
                entry_point: "main",
            },
            push_constants_size: 16,
            descriptor_set_layouts: layouts,
        })
        .unwrap()
}

/// Single-color-attachment pass with its framebuffer over `view`
pub fn color_target(
    device: &mut Device<StubBackend>,
    view: ImageViewId,
    load_op: vk::AttachmentLoadOp,
) -> (RenderPassId, FramebufferId) {
    let render_pass = device
        .create_render_pass(&RenderPassDesc {
            label: "test pass",
            color_attachments: &[RenderPassAttachment::color(
                vk::Format::R8G8B8A8_UNORM,
                load_op,
            )],
            depth_stencil_attachment: None,
        })
        .unwrap();
    let framebuffer = device
        .create_framebuffer(&FramebufferDesc {
            label: "test framebuffer",
            render_pass,
            extent: vk::Extent2D {
                width: 64,
                height: 64,
            },
            layers: 1,
            color_attachments: &[view],
            depth_stencil_attachment: None,
        })
        .unwrap();
    (render_pass, framebuffer)
}

pub fn graphics_pipeline(
    device: &mut Device<StubBackend>,
    render_pass: RenderPassId,
    layouts: &[DescriptorSetLayoutId],
) -> GraphicsPipelineId {
    let vertex = device
        .create_shader(&ShaderDesc {
            label: "test vertex",
            spirv_code: DUMMY_SPIRV,
        })
        .unwrap();
    let fragment = device
        .create_shader(&ShaderDesc {
            label: "test fragment",
            spirv_code: DUMMY_SPIRV,
        })
        .unwrap();
    device
        .create_graphics_pipeline(&GraphicsPipelineDesc {
            label: "test graphics",
            vertex_shader: ShaderStageDesc {
                shader: vertex,
                entry_point: "main",
            },
            fragment_shader: ShaderStageDesc {
                shader: fragment,
                entry_point: "main",
            },
            render_pass,
            vertex_input_bindings: &[],
            vertex_attributes: &[],
            push_constants_size: 0,
            descriptor_set_layouts: layouts,
            primitive_topology: vk::PrimitiveTopology::TRIANGLE_STRIP,
            rasterization: RasterizationState::default(),
            depth_stencil: DepthStencilState::default(),
            color_blend: &[ColorBlendAttachment::default()],
            blend_constant: Vec4::ZERO,
        })
        .unwrap()
}

pub fn full_area() -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: vk::Extent2D {
            width: 64,
            height: 64,
        },
    }
}
