// GPU object records and their generational handles
//
// Every object the device hands out lives in a slotmap arena. Keys are
// generational, so a handle kept past its object's destruction resolves to
// nothing instead of to whatever reused the slot.

use ash::vk;
use slotmap::{new_key_type, SlotMap};

use crate::sync::{BufferState, ImageState};
use crate::types::{
    BufferDesc, BufferViewDesc, DescriptorBindingDesc, DescriptorType, ImageDesc,
    ImageViewDesc, RenderPassAttachment, SwapchainDesc,
};

new_key_type! {
    pub struct BufferId;
    pub struct BufferViewId;
    pub struct ImageId;
    pub struct ImageViewId;
    pub struct SamplerId;
    pub struct ShaderId;
    pub struct DescriptorSetLayoutId;
    pub struct DescriptorSetId;
    pub struct RenderPassId;
    pub struct FramebufferId;
    pub struct ComputePipelineId;
    pub struct GraphicsPipelineId;
    pub struct SwapchainId;
}

pub struct Buffer {
    pub desc: BufferDesc,
    pub vk: vk::Buffer,
    pub state: BufferState,
}

pub struct BufferView {
    pub desc: BufferViewDesc,
    pub vk: vk::BufferView,
}

pub struct Image {
    pub desc: ImageDesc,
    pub vk: vk::Image,
    pub state: ImageState,
    /// Owned by a swapchain; never destroyed through the device
    pub is_swapchain_image: bool,
}

pub struct ImageView {
    pub desc: ImageViewDesc,
    pub vk: vk::ImageView,
}

pub struct Sampler {
    pub vk: vk::Sampler,
}

pub struct Shader {
    pub vk: vk::ShaderModule,
}

pub struct DescriptorSetLayout {
    pub vk: vk::DescriptorSetLayout,
    pub bindings: Vec<DescriptorBindingDesc>,
    pub num_variable_length: u32,
}

/// Resources last written into a binding, kept for barrier derivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingResources {
    Samplers,
    Buffers(Vec<Option<BufferId>>),
    TexelBuffers(Vec<Option<BufferViewId>>),
    Images(Vec<Option<ImageViewId>>),
}

impl BindingResources {
    pub fn empty(ty: DescriptorType, count: u32) -> Self {
        let count = count as usize;
        if ty.is_buffer() {
            BindingResources::Buffers(vec![None; count])
        } else if ty.is_texel_buffer() {
            BindingResources::TexelBuffers(vec![None; count])
        } else if ty.needs_image_view() {
            BindingResources::Images(vec![None; count])
        } else {
            BindingResources::Samplers
        }
    }
}

#[derive(Debug, Clone)]
pub struct DescriptorBinding {
    pub ty: DescriptorType,
    /// Actual element count (the requested length for variable-length bindings)
    pub count: u32,
    pub is_variable_length: bool,
    pub resources: BindingResources,
}

pub struct DescriptorSet {
    pub vk: vk::DescriptorSet,
    pub pool: usize,
    pub layout: DescriptorSetLayoutId,
    pub bindings: Vec<DescriptorBinding>,
}

pub struct RenderPass {
    pub vk: vk::RenderPass,
    pub color_attachments: Vec<RenderPassAttachment>,
    pub depth_stencil_attachment: Option<RenderPassAttachment>,
}

impl RenderPass {
    /// Attachment formats match one for one
    pub fn is_compatible(&self, other: &RenderPass) -> bool {
        self.color_attachments.len() == other.color_attachments.len()
            && self
                .color_attachments
                .iter()
                .zip(&other.color_attachments)
                .all(|(a, b)| a.format == b.format)
            && self.depth_stencil_attachment.map(|a| a.format)
                == other.depth_stencil_attachment.map(|a| a.format)
    }
}

pub struct Framebuffer {
    pub vk: vk::Framebuffer,
    pub render_pass: RenderPassId,
    pub extent: vk::Extent2D,
    pub layers: u32,
    pub color_attachments: Vec<ImageViewId>,
    pub depth_stencil_attachment: Option<ImageViewId>,
}

pub struct ComputePipeline {
    pub vk: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub push_constants_size: u32,
    pub num_sets: u32,
}

pub struct GraphicsPipeline {
    pub vk: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub render_pass: RenderPassId,
    pub push_constants_size: u32,
    pub num_sets: u32,
}

pub struct Swapchain {
    pub desc: SwapchainDesc,
    pub vk: vk::SwapchainKHR,
    pub images: Vec<ImageId>,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub current_image: Option<u32>,
    pub is_out_of_date: bool,
    pub is_optimal: bool,
    pub is_zero_sized: bool,
}

impl Swapchain {
    /// A null handle (never created, or zero-sized last time) is retried every frame
    pub fn needs_recreate(&self) -> bool {
        self.is_out_of_date || !self.is_optimal || self.vk == vk::SwapchainKHR::null()
    }

    pub fn can_present(&self) -> bool {
        !self.is_out_of_date && !self.is_zero_sized && self.vk != vk::SwapchainKHR::null()
    }
}

/// All object arenas owned by a device
#[derive(Default)]
pub struct Resources {
    pub buffers: SlotMap<BufferId, Buffer>,
    pub buffer_views: SlotMap<BufferViewId, BufferView>,
    pub images: SlotMap<ImageId, Image>,
    pub image_views: SlotMap<ImageViewId, ImageView>,
    pub samplers: SlotMap<SamplerId, Sampler>,
    pub shaders: SlotMap<ShaderId, Shader>,
    pub descriptor_set_layouts: SlotMap<DescriptorSetLayoutId, DescriptorSetLayout>,
    pub descriptor_sets: SlotMap<DescriptorSetId, DescriptorSet>,
    pub render_passes: SlotMap<RenderPassId, RenderPass>,
    pub framebuffers: SlotMap<FramebufferId, Framebuffer>,
    pub compute_pipelines: SlotMap<ComputePipelineId, ComputePipeline>,
    pub graphics_pipelines: SlotMap<GraphicsPipelineId, GraphicsPipeline>,
    pub swapchains: SlotMap<SwapchainId, Swapchain>,
}

/// Look up a key or panic naming the stale handle
pub fn resolve<'a, K: slotmap::Key, V>(map: &'a SlotMap<K, V>, key: K, what: &str) -> &'a V {
    match map.get(key) {
        Some(value) => value,
        None => panic!("stale or invalid {} handle {:?}", what, key),
    }
}

pub fn resolve_mut<'a, K: slotmap::Key, V>(
    map: &'a mut SlotMap<K, V>,
    key: K,
    what: &str,
) -> &'a mut V {
    match map.get_mut(key) {
        Some(value) => value,
        None => panic!("stale or invalid {} handle {:?}", what, key),
    }
}

macro_rules! accessors {
    ($($field:ident, $get:ident, $get_mut:ident: $id:ty => $ty:ty, $what:literal;)*) => {
        impl Resources {
            $(
                pub fn $get(&self, id: $id) -> &$ty {
                    resolve(&self.$field, id, $what)
                }

                pub fn $get_mut(&mut self, id: $id) -> &mut $ty {
                    resolve_mut(&mut self.$field, id, $what)
                }
            )*
        }
    };
}

accessors! {
    buffers, buffer, buffer_mut: BufferId => Buffer, "buffer";
    buffer_views, buffer_view, buffer_view_mut: BufferViewId => BufferView, "buffer view";
    images, image, image_mut: ImageId => Image, "image";
    image_views, image_view, image_view_mut: ImageViewId => ImageView, "image view";
    samplers, sampler, sampler_mut: SamplerId => Sampler, "sampler";
    shaders, shader, shader_mut: ShaderId => Shader, "shader";
    descriptor_set_layouts, descriptor_set_layout, descriptor_set_layout_mut: DescriptorSetLayoutId => DescriptorSetLayout, "descriptor set layout";
    descriptor_sets, descriptor_set, descriptor_set_mut: DescriptorSetId => DescriptorSet, "descriptor set";
    render_passes, render_pass, render_pass_mut: RenderPassId => RenderPass, "render pass";
    framebuffers, framebuffer, framebuffer_mut: FramebufferId => Framebuffer, "framebuffer";
    compute_pipelines, compute_pipeline, compute_pipeline_mut: ComputePipelineId => ComputePipeline, "compute pipeline";
    graphics_pipelines, graphics_pipeline, graphics_pipeline_mut: GraphicsPipelineId => GraphicsPipeline, "graphics pipeline";
    swapchains, swapchain, swapchain_mut: SwapchainId => Swapchain, "swapchain";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "stale or invalid buffer handle")]
    fn stale_handle_panics() {
        let mut resources = Resources::default();
        let id = resources.buffers.insert(Buffer {
            desc: BufferDesc::default(),
            vk: vk::Buffer::null(),
            state: BufferState::default(),
        });
        resources.buffers.remove(id);
        resources.buffer(id);
    }

    #[test]
    fn binding_resources_match_descriptor_kind() {
        assert_eq!(
            BindingResources::empty(DescriptorType::StorageBuffer, 2),
            BindingResources::Buffers(vec![None, None])
        );
        assert_eq!(
            BindingResources::empty(DescriptorType::Sampler, 4),
            BindingResources::Samplers
        );
        assert_eq!(
            BindingResources::empty(DescriptorType::CombinedImageSampler, 1),
            BindingResources::Images(vec![None])
        );
    }
}
