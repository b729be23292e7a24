// Render passes, framebuffers and pipelines
//
// Attachments enter and leave a render pass in the layout the access tracker
// moved them to beforehand, so render passes carry no subpass dependencies
// and no implicit layout transitions. Viewport, scissor, blend constants and
// stencil masks are always dynamic state.

use ash::vk;
use std::ffi::CString;

use crate::backend::NativeShaderStage;
use crate::error::Result;
use crate::sync::classify::depth_stencil_layout;
use crate::types::{GraphicsPipelineDesc, RenderPassAttachment, RenderPassDesc};

const DYNAMIC_STATES: [vk::DynamicState; 6] = [
    vk::DynamicState::VIEWPORT,
    vk::DynamicState::SCISSOR,
    vk::DynamicState::BLEND_CONSTANTS,
    vk::DynamicState::STENCIL_COMPARE_MASK,
    vk::DynamicState::STENCIL_WRITE_MASK,
    vk::DynamicState::STENCIL_REFERENCE,
];

pub fn create_shader_module(device: &ash::Device, spirv: &[u32]) -> Result<vk::ShaderModule> {
    let create_info = vk::ShaderModuleCreateInfo::default().code(spirv);
    let module = unsafe { device.create_shader_module(&create_info, None) }?;
    Ok(module)
}

fn attachment_description(
    attachment: &RenderPassAttachment,
    layout: vk::ImageLayout,
) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(attachment.format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(attachment.load_op)
        .store_op(attachment.store_op)
        .stencil_load_op(attachment.stencil_load_op)
        .stencil_store_op(attachment.stencil_store_op)
        .initial_layout(layout)
        .final_layout(layout)
}

pub fn create_render_pass(device: &ash::Device, desc: &RenderPassDesc<'_>) -> Result<vk::RenderPass> {
    let mut attachments: Vec<vk::AttachmentDescription> = desc
        .color_attachments
        .iter()
        .map(|attachment| {
            attachment_description(attachment, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        })
        .collect();

    let color_refs: Vec<vk::AttachmentReference> = (0..desc.color_attachments.len() as u32)
        .map(|index| vk::AttachmentReference {
            attachment: index,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        })
        .collect();

    let depth_ref = desc.depth_stencil_attachment.as_ref().map(|attachment| {
        let layout = depth_stencil_layout(attachment);
        attachments.push(attachment_description(attachment, layout));
        vk::AttachmentReference {
            attachment: desc.color_attachments.len() as u32,
            layout,
        }
    });

    let mut subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs);
    if let Some(depth_ref) = depth_ref.as_ref() {
        subpass = subpass.depth_stencil_attachment(depth_ref);
    }

    let subpasses = [subpass];
    let render_pass_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses);

    let render_pass = unsafe { device.create_render_pass(&render_pass_info, None) }?;
    Ok(render_pass)
}

pub fn create_framebuffer(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    attachments: &[vk::ImageView],
    extent: vk::Extent2D,
    layers: u32,
) -> Result<vk::Framebuffer> {
    let framebuffer_info = vk::FramebufferCreateInfo::default()
        .render_pass(render_pass)
        .attachments(attachments)
        .width(extent.width)
        .height(extent.height)
        .layers(layers);

    let framebuffer = unsafe { device.create_framebuffer(&framebuffer_info, None) }?;
    Ok(framebuffer)
}

pub fn create_pipeline_layout(
    device: &ash::Device,
    set_layouts: &[vk::DescriptorSetLayout],
    push_constants_size: u32,
) -> Result<vk::PipelineLayout> {
    // Push constants are visible to every stage
    let push_constant_ranges: Vec<vk::PushConstantRange> = if push_constants_size > 0 {
        vec![vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::ALL,
            offset: 0,
            size: push_constants_size,
        }]
    } else {
        Vec::new()
    };

    let layout_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(set_layouts)
        .push_constant_ranges(&push_constant_ranges);

    let layout = unsafe { device.create_pipeline_layout(&layout_info, None) }?;
    Ok(layout)
}

fn entry_point_name(entry_point: &str) -> CString {
    match CString::new(entry_point) {
        Ok(name) => name,
        Err(_) => panic!("shader entry point {:?} contains a NUL byte", entry_point),
    }
}

pub fn create_compute_pipeline(
    device: &ash::Device,
    layout: vk::PipelineLayout,
    stage: NativeShaderStage<'_>,
) -> Result<vk::Pipeline> {
    let entry_point = entry_point_name(stage.entry_point);
    let stage_info = vk::PipelineShaderStageCreateInfo::default()
        .stage(vk::ShaderStageFlags::COMPUTE)
        .module(stage.module)
        .name(&entry_point);

    let pipeline_info = vk::ComputePipelineCreateInfo::default()
        .stage(stage_info)
        .layout(layout);

    let pipelines = unsafe {
        device.create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, err)| err)?;

    Ok(pipelines[0])
}

pub fn create_graphics_pipeline(
    device: &ash::Device,
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    vertex: NativeShaderStage<'_>,
    fragment: NativeShaderStage<'_>,
    desc: &GraphicsPipelineDesc<'_>,
) -> Result<vk::Pipeline> {
    // Step 1: Shader stages
    let vertex_entry = entry_point_name(vertex.entry_point);
    let fragment_entry = entry_point_name(fragment.entry_point);
    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex.module)
            .name(&vertex_entry),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment.module)
            .name(&fragment_entry),
    ];

    // Step 2: Vertex input
    let bindings: Vec<vk::VertexInputBindingDescription> = desc
        .vertex_input_bindings
        .iter()
        .map(|binding| vk::VertexInputBindingDescription {
            binding: binding.binding,
            stride: binding.stride,
            input_rate: binding.input_rate,
        })
        .collect();
    let attributes: Vec<vk::VertexInputAttributeDescription> = desc
        .vertex_attributes
        .iter()
        .map(|attribute| vk::VertexInputAttributeDescription {
            location: attribute.location,
            binding: attribute.binding,
            format: attribute.format,
            offset: attribute.offset,
        })
        .collect();
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    // Step 3: Input assembly
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(desc.primitive_topology)
        .primitive_restart_enable(false);

    // Step 4: Viewport and scissor are set while recording
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    // Step 5: Rasterization
    let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(desc.rasterization.polygon_mode)
        .line_width(desc.rasterization.line_width)
        .cull_mode(desc.rasterization.cull_mode)
        .front_face(desc.rasterization.front_face)
        .depth_bias_enable(false);

    // Step 6: Multisampling (disabled)
    let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    // Step 7: Depth and stencil
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(desc.depth_stencil.depth_test_enable)
        .depth_write_enable(desc.depth_stencil.depth_write_enable)
        .depth_compare_op(desc.depth_stencil.depth_compare_op)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(desc.depth_stencil.stencil_test_enable)
        .front(desc.depth_stencil.front)
        .back(desc.depth_stencil.back);

    // Step 8: Color blending, one state per color attachment
    let color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = desc
        .color_blend
        .iter()
        .map(|blend| {
            vk::PipelineColorBlendAttachmentState::default()
                .blend_enable(blend.blend_enable)
                .src_color_blend_factor(blend.src_color_blend_factor)
                .dst_color_blend_factor(blend.dst_color_blend_factor)
                .color_blend_op(blend.color_blend_op)
                .src_alpha_blend_factor(blend.src_alpha_blend_factor)
                .dst_alpha_blend_factor(blend.dst_alpha_blend_factor)
                .alpha_blend_op(blend.alpha_blend_op)
                .color_write_mask(blend.color_write_mask)
        })
        .collect();
    let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments)
        .blend_constants(desc.blend_constant.to_array());

    // Step 9: Dynamic state
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&DYNAMIC_STATES);

    // Step 10: Create pipeline
    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0);

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, err)| err)?;

    Ok(pipelines[0])
}
