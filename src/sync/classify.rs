// Access classification
//
// Maps descriptor bindings, vertex/index/indirect buffers, transfer operands
// and render pass attachments to the access requests the tracker consumes.

use ash::vk;

use super::access::AccessRequest;
use crate::types::{DescriptorType, RenderPassAttachment};

/// Which kind of pass a descriptor binding is consumed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Compute,
    Graphics,
}

impl PassKind {
    fn shader_stages(self) -> vk::PipelineStageFlags {
        match self {
            PassKind::Compute => vk::PipelineStageFlags::COMPUTE_SHADER,
            PassKind::Graphics => {
                vk::PipelineStageFlags::VERTEX_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER
            }
        }
    }
}

/// Access made by a shader through a descriptor of type `ty`.
///
/// Returns `None` for descriptors that touch no tracked resource (samplers)
/// and for input attachments outside a render pass.
pub fn descriptor_access(ty: DescriptorType, pass: PassKind) -> Option<AccessRequest> {
    let stages = pass.shader_stages();
    let request = match ty {
        DescriptorType::Sampler => return None,
        DescriptorType::CombinedImageSampler | DescriptorType::SampledImage => {
            AccessRequest::image(
                stages,
                vk::AccessFlags::SHADER_READ,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        }
        DescriptorType::StorageImage => AccessRequest::image(
            stages,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
            vk::ImageLayout::GENERAL,
        ),
        DescriptorType::InputAttachment => {
            if pass != PassKind::Graphics {
                return None;
            }
            AccessRequest::image(
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::AccessFlags::INPUT_ATTACHMENT_READ,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        }
        DescriptorType::UniformTexelBuffer => {
            AccessRequest::buffer(stages, vk::AccessFlags::SHADER_READ)
        }
        DescriptorType::StorageTexelBuffer
        | DescriptorType::StorageBuffer
        | DescriptorType::DynamicStorageBuffer => AccessRequest::buffer(
            stages,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
        ),
        DescriptorType::UniformBuffer | DescriptorType::DynamicUniformBuffer => {
            AccessRequest::buffer(stages, vk::AccessFlags::UNIFORM_READ)
        }
    };
    Some(request)
}

pub const VERTEX_BUFFER_ACCESS: AccessRequest = AccessRequest::buffer(
    vk::PipelineStageFlags::VERTEX_INPUT,
    vk::AccessFlags::VERTEX_ATTRIBUTE_READ,
);

pub const INDEX_BUFFER_ACCESS: AccessRequest = AccessRequest::buffer(
    vk::PipelineStageFlags::VERTEX_INPUT,
    vk::AccessFlags::INDEX_READ,
);

pub const INDIRECT_BUFFER_ACCESS: AccessRequest = AccessRequest::buffer(
    vk::PipelineStageFlags::DRAW_INDIRECT,
    vk::AccessFlags::INDIRECT_COMMAND_READ,
);

pub const TRANSFER_SRC_BUFFER: AccessRequest = AccessRequest::buffer(
    vk::PipelineStageFlags::TRANSFER,
    vk::AccessFlags::TRANSFER_READ,
);

pub const TRANSFER_DST_BUFFER: AccessRequest = AccessRequest::buffer(
    vk::PipelineStageFlags::TRANSFER,
    vk::AccessFlags::TRANSFER_WRITE,
);

pub const TRANSFER_SRC_IMAGE: AccessRequest = AccessRequest::image(
    vk::PipelineStageFlags::TRANSFER,
    vk::AccessFlags::TRANSFER_READ,
    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
);

pub const TRANSFER_DST_IMAGE: AccessRequest = AccessRequest::image(
    vk::PipelineStageFlags::TRANSFER,
    vk::AccessFlags::TRANSFER_WRITE,
    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
);

pub const PRESENT_ACCESS: AccessRequest = AccessRequest::image(
    vk::PipelineStageFlags::BOTTOM_OF_PIPE,
    vk::AccessFlags::NONE,
    vk::ImageLayout::PRESENT_SRC_KHR,
);

fn clears_or_discards(op: vk::AttachmentLoadOp) -> bool {
    op == vk::AttachmentLoadOp::CLEAR || op == vk::AttachmentLoadOp::DONT_CARE
}

pub fn color_attachment_access(attachment: &RenderPassAttachment) -> AccessRequest {
    let mut access = vk::AccessFlags::NONE;
    if clears_or_discards(attachment.load_op) || attachment.store_op == vk::AttachmentStoreOp::STORE
    {
        access |= vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    }
    if attachment.load_op == vk::AttachmentLoadOp::LOAD {
        access |= vk::AccessFlags::COLOR_ATTACHMENT_READ;
    }
    AccessRequest::image(
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        access,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    )
}

fn depth_stencil_writes(attachment: &RenderPassAttachment) -> bool {
    let stores = |op: vk::AttachmentStoreOp| {
        op == vk::AttachmentStoreOp::STORE || op == vk::AttachmentStoreOp::DONT_CARE
    };
    clears_or_discards(attachment.load_op)
        || clears_or_discards(attachment.stencil_load_op)
        || stores(attachment.store_op)
        || stores(attachment.stencil_store_op)
}

/// Layout a depth/stencil attachment lives in for the duration of the pass
pub fn depth_stencil_layout(attachment: &RenderPassAttachment) -> vk::ImageLayout {
    if depth_stencil_writes(attachment) {
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    } else {
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
    }
}

pub fn depth_stencil_attachment_access(attachment: &RenderPassAttachment) -> AccessRequest {
    let mut access = vk::AccessFlags::NONE;
    if depth_stencil_writes(attachment) {
        access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }
    if attachment.load_op == vk::AttachmentLoadOp::LOAD
        || attachment.stencil_load_op == vk::AttachmentLoadOp::LOAD
    {
        access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ;
    }
    AccessRequest::image(
        vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
        access,
        depth_stencil_layout(attachment),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleared_color_attachment_is_write_only() {
        let request = color_attachment_access(&RenderPassAttachment::color(
            vk::Format::R8G8B8A8_UNORM,
            vk::AttachmentLoadOp::CLEAR,
        ));
        assert_eq!(request.access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(request.layout, Some(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL));
    }

    #[test]
    fn loaded_color_attachment_reads_and_writes() {
        let request = color_attachment_access(&RenderPassAttachment::color(
            vk::Format::R8G8B8A8_UNORM,
            vk::AttachmentLoadOp::LOAD,
        ));
        assert_eq!(
            request.access,
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        );
    }

    #[test]
    fn read_only_depth_uses_read_only_layout() {
        let attachment = RenderPassAttachment {
            format: vk::Format::D32_SFLOAT,
            load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::NONE,
            stencil_load_op: vk::AttachmentLoadOp::LOAD,
            stencil_store_op: vk::AttachmentStoreOp::NONE,
        };
        let request = depth_stencil_attachment_access(&attachment);
        assert_eq!(request.access, vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ);
        assert_eq!(
            request.layout,
            Some(vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL)
        );
    }

    #[test]
    fn storage_bindings_read_and_write() {
        let request = descriptor_access(DescriptorType::StorageBuffer, PassKind::Compute)
            .expect("tracked");
        assert_eq!(request.stages, vk::PipelineStageFlags::COMPUTE_SHADER);
        assert!(request.access.contains(vk::AccessFlags::SHADER_WRITE));

        assert!(descriptor_access(DescriptorType::Sampler, PassKind::Graphics).is_none());
        assert!(descriptor_access(DescriptorType::InputAttachment, PassKind::Compute).is_none());
    }
}
