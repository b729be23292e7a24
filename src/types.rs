// Descriptor structs and small enums shared by the device facade and the backends
//
// Native enums and flag types (formats, usages, load/store ops) are taken
// straight from ash; only concepts the native API lacks get their own types.

use ash::vk;
use glam::{Vec2, Vec4};

use crate::resources::{
    BufferId, BufferViewId, DescriptorSetId, DescriptorSetLayoutId, ImageId, ImageViewId,
    RenderPassId, SamplerId, ShaderId,
};

/// Number of distinct descriptor types tracked by pools and layouts
pub const NUM_DESCRIPTOR_TYPES: usize = 11;

/// Largest payload `update_buffer` may carry inline in the command stream
pub const MAX_UPDATE_BUFFER_SIZE: usize = 65536;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DescriptorType {
    Sampler = 0,
    CombinedImageSampler = 1,
    SampledImage = 2,
    StorageImage = 3,
    UniformTexelBuffer = 4,
    StorageTexelBuffer = 5,
    UniformBuffer = 6,
    StorageBuffer = 7,
    DynamicUniformBuffer = 8,
    DynamicStorageBuffer = 9,
    InputAttachment = 10,
}

impl DescriptorType {
    pub const ALL: [DescriptorType; NUM_DESCRIPTOR_TYPES] = [
        DescriptorType::Sampler,
        DescriptorType::CombinedImageSampler,
        DescriptorType::SampledImage,
        DescriptorType::StorageImage,
        DescriptorType::UniformTexelBuffer,
        DescriptorType::StorageTexelBuffer,
        DescriptorType::UniformBuffer,
        DescriptorType::StorageBuffer,
        DescriptorType::DynamicUniformBuffer,
        DescriptorType::DynamicStorageBuffer,
        DescriptorType::InputAttachment,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn to_vk(self) -> vk::DescriptorType {
        match self {
            DescriptorType::Sampler => vk::DescriptorType::SAMPLER,
            DescriptorType::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            DescriptorType::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
            DescriptorType::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
            DescriptorType::UniformTexelBuffer => vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
            DescriptorType::StorageTexelBuffer => vk::DescriptorType::STORAGE_TEXEL_BUFFER,
            DescriptorType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            DescriptorType::DynamicUniformBuffer => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            DescriptorType::DynamicStorageBuffer => vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
            DescriptorType::InputAttachment => vk::DescriptorType::INPUT_ATTACHMENT,
        }
    }

    /// Uniform/storage buffers, plain or dynamic
    pub fn is_buffer(self) -> bool {
        matches!(
            self,
            DescriptorType::UniformBuffer
                | DescriptorType::StorageBuffer
                | DescriptorType::DynamicUniformBuffer
                | DescriptorType::DynamicStorageBuffer
        )
    }

    pub fn is_texel_buffer(self) -> bool {
        matches!(
            self,
            DescriptorType::UniformTexelBuffer | DescriptorType::StorageTexelBuffer
        )
    }

    /// Any type whose payload is a sampler and/or image view
    pub fn is_image(self) -> bool {
        matches!(
            self,
            DescriptorType::Sampler
                | DescriptorType::CombinedImageSampler
                | DescriptorType::SampledImage
                | DescriptorType::StorageImage
                | DescriptorType::InputAttachment
        )
    }

    pub fn needs_sampler(self) -> bool {
        matches!(
            self,
            DescriptorType::Sampler | DescriptorType::CombinedImageSampler
        )
    }

    pub fn needs_image_view(self) -> bool {
        self.is_image() && self != DescriptorType::Sampler
    }

    /// Buffer usage a resource needs to be bound to this descriptor type
    pub fn required_buffer_usage(self) -> vk::BufferUsageFlags {
        match self {
            DescriptorType::UniformBuffer | DescriptorType::DynamicUniformBuffer => {
                vk::BufferUsageFlags::UNIFORM_BUFFER
            }
            DescriptorType::StorageBuffer | DescriptorType::DynamicStorageBuffer => {
                vk::BufferUsageFlags::STORAGE_BUFFER
            }
            DescriptorType::UniformTexelBuffer => vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER,
            DescriptorType::StorageTexelBuffer => vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER,
            _ => vk::BufferUsageFlags::empty(),
        }
    }

    /// Image usage a view's image needs to be bound to this descriptor type
    pub fn required_image_usage(self) -> vk::ImageUsageFlags {
        match self {
            DescriptorType::CombinedImageSampler | DescriptorType::SampledImage => {
                vk::ImageUsageFlags::SAMPLED
            }
            DescriptorType::StorageImage => vk::ImageUsageFlags::STORAGE,
            DescriptorType::InputAttachment => vk::ImageUsageFlags::INPUT_ATTACHMENT,
            _ => vk::ImageUsageFlags::empty(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RESOURCE DESCRIPTIONS
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    /// Allocate in host-visible memory so `write_buffer` can reach it
    pub host_mapped: bool,
}

impl Default for BufferDesc {
    fn default() -> Self {
        Self {
            label: String::new(),
            size: 0,
            usage: vk::BufferUsageFlags::empty(),
            host_mapped: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BufferViewDesc {
    pub label: String,
    pub buffer: BufferId,
    pub format: vk::Format,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct ImageDesc {
    pub label: String,
    pub image_type: vk::ImageType,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspects: vk::ImageAspectFlags,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub sample_count: vk::SampleCountFlags,
}

impl Default for ImageDesc {
    fn default() -> Self {
        Self {
            label: String::new(),
            image_type: vk::ImageType::TYPE_2D,
            format: vk::Format::R8G8B8A8_UNORM,
            usage: vk::ImageUsageFlags::empty(),
            aspects: vk::ImageAspectFlags::COLOR,
            extent: vk::Extent3D {
                width: 1,
                height: 1,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            sample_count: vk::SampleCountFlags::TYPE_1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageViewDesc {
    pub label: String,
    pub image: ImageId,
    pub view_type: vk::ImageViewType,
    pub format: vk::Format,
    pub aspects: vk::ImageAspectFlags,
    pub first_mip_level: u32,
    pub num_mip_levels: u32,
    pub first_array_layer: u32,
    pub num_array_layers: u32,
}

impl ImageViewDesc {
    /// View covering every mip and layer of `image`
    pub fn whole(image: ImageId, format: vk::Format, aspects: vk::ImageAspectFlags) -> Self {
        Self {
            label: String::new(),
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            aspects,
            first_mip_level: 0,
            num_mip_levels: vk::REMAINING_MIP_LEVELS,
            first_array_layer: 0,
            num_array_layers: vk::REMAINING_ARRAY_LAYERS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_mode_u: vk::SamplerAddressMode,
    pub address_mode_v: vk::SamplerAddressMode,
    pub address_mode_w: vk::SamplerAddressMode,
    pub mip_lod_bias: f32,
    pub max_anisotropy: Option<f32>,
    pub compare_op: Option<vk::CompareOp>,
    pub min_lod: f32,
    pub max_lod: f32,
    pub border_color: vk::BorderColor,
    pub unnormalized_coordinates: bool,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
            address_mode_w: vk::SamplerAddressMode::REPEAT,
            mip_lod_bias: 0.0,
            max_anisotropy: None,
            compare_op: None,
            min_lod: 0.0,
            max_lod: vk::LOD_CLAMP_NONE,
            border_color: vk::BorderColor::FLOAT_TRANSPARENT_BLACK,
            unnormalized_coordinates: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ShaderDesc<'a> {
    pub label: &'a str,
    pub spirv_code: &'a [u32],
}

// ─────────────────────────────────────────────────────────────────────────────
// DESCRIPTORS
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorBindingDesc {
    pub ty: DescriptorType,
    /// Element count, or the maximum count when variable-length
    pub count: u32,
    pub is_variable_length: bool,
}

impl DescriptorBindingDesc {
    pub const fn new(ty: DescriptorType, count: u32) -> Self {
        Self {
            ty,
            count,
            is_variable_length: false,
        }
    }

    pub const fn variable(ty: DescriptorType, max_count: u32) -> Self {
        Self {
            ty,
            count: max_count,
            is_variable_length: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DescriptorSetLayoutDesc<'a> {
    pub label: &'a str,
    pub bindings: &'a [DescriptorBindingDesc],
}

#[derive(Debug, Clone, Copy)]
pub struct BufferBinding {
    pub buffer: BufferId,
    pub offset: u64,
    /// `vk::WHOLE_SIZE` binds to the end of the buffer
    pub size: u64,
}

impl BufferBinding {
    pub fn whole(buffer: BufferId) -> Self {
        Self {
            buffer,
            offset: 0,
            size: vk::WHOLE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageBinding {
    pub sampler: Option<SamplerId>,
    pub image_view: Option<ImageViewId>,
}

/// One contiguous write into a descriptor set binding.
///
/// Exactly one of the payload slices is used, chosen by the binding's type.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorSetUpdate<'a> {
    pub set: DescriptorSetId,
    pub binding: u32,
    pub element: u32,
    pub buffers: &'a [BufferBinding],
    pub texel_buffers: &'a [BufferViewId],
    pub images: &'a [ImageBinding],
}

// ─────────────────────────────────────────────────────────────────────────────
// RENDER PASSES & PIPELINES
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderPassAttachment {
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub stencil_load_op: vk::AttachmentLoadOp,
    pub stencil_store_op: vk::AttachmentStoreOp,
}

impl RenderPassAttachment {
    pub fn color(format: vk::Format, load_op: vk::AttachmentLoadOp) -> Self {
        Self {
            format,
            load_op,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderPassDesc<'a> {
    pub label: &'a str,
    pub color_attachments: &'a [RenderPassAttachment],
    pub depth_stencil_attachment: Option<RenderPassAttachment>,
}

#[derive(Debug, Clone, Copy)]
pub struct FramebufferDesc<'a> {
    pub label: &'a str,
    pub render_pass: RenderPassId,
    pub extent: vk::Extent2D,
    pub layers: u32,
    pub color_attachments: &'a [ImageViewId],
    pub depth_stencil_attachment: Option<ImageViewId>,
}

#[derive(Debug, Clone, Copy)]
pub struct ShaderStageDesc<'a> {
    pub shader: ShaderId,
    pub entry_point: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct ComputePipelineDesc<'a> {
    pub label: &'a str,
    pub compute_shader: ShaderStageDesc<'a>,
    pub push_constants_size: u32,
    pub descriptor_set_layouts: &'a [DescriptorSetLayoutId],
}

#[derive(Debug, Clone, Copy)]
pub struct VertexInputBinding {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: vk::VertexInputRate,
}

#[derive(Debug, Clone, Copy)]
pub struct VertexAttribute {
    pub binding: u32,
    pub location: u32,
    pub format: vk::Format,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RasterizationState {
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub line_width: f32,
}

impl Default for RasterizationState {
    fn default() -> Self {
        Self {
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            line_width: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DepthStencilState {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: vk::CompareOp,
    pub stencil_test_enable: bool,
    pub front: vk::StencilOpState,
    pub back: vk::StencilOpState,
}

#[derive(Debug, Clone, Copy)]
pub struct ColorBlendAttachment {
    pub blend_enable: bool,
    pub src_color_blend_factor: vk::BlendFactor,
    pub dst_color_blend_factor: vk::BlendFactor,
    pub color_blend_op: vk::BlendOp,
    pub src_alpha_blend_factor: vk::BlendFactor,
    pub dst_alpha_blend_factor: vk::BlendFactor,
    pub alpha_blend_op: vk::BlendOp,
    pub color_write_mask: vk::ColorComponentFlags,
}

impl Default for ColorBlendAttachment {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color_blend_factor: vk::BlendFactor::ONE,
            dst_color_blend_factor: vk::BlendFactor::ZERO,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipelineDesc<'a> {
    pub label: &'a str,
    pub vertex_shader: ShaderStageDesc<'a>,
    pub fragment_shader: ShaderStageDesc<'a>,
    pub render_pass: RenderPassId,
    pub vertex_input_bindings: &'a [VertexInputBinding],
    pub vertex_attributes: &'a [VertexAttribute],
    pub push_constants_size: u32,
    pub descriptor_set_layouts: &'a [DescriptorSetLayoutId],
    pub primitive_topology: vk::PrimitiveTopology,
    pub rasterization: RasterizationState,
    pub depth_stencil: DepthStencilState,
    /// One entry per color attachment of `render_pass`
    pub color_blend: &'a [ColorBlendAttachment],
    pub blend_constant: Vec4,
}

// ─────────────────────────────────────────────────────────────────────────────
// RECORDING ARGUMENTS
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub offset: Vec2,
    pub extent: Vec2,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Viewport {
    pub fn from_extent(extent: vk::Extent2D) -> Self {
        Self {
            offset: Vec2::ZERO,
            extent: Vec2::new(extent.width as f32, extent.height as f32),
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    pub fn to_vk(&self) -> vk::Viewport {
        vk::Viewport {
            x: self.offset.x,
            y: self.offset.y,
            width: self.extent.x,
            height: self.extent.y,
            min_depth: self.min_depth,
            max_depth: self.max_depth,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthStencilClear {
    pub depth: f32,
    pub stencil: u32,
}

impl Default for DepthStencilClear {
    fn default() -> Self {
        Self {
            depth: 1.0,
            stencil: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RenderPassBeginInfo<'a> {
    pub framebuffer: crate::resources::FramebufferId,
    pub render_pass: RenderPassId,
    pub render_area: vk::Rect2D,
    /// One value per color attachment, in attachment order
    pub color_clear_values: &'a [Vec4],
    pub depth_stencil_clear_value: DepthStencilClear,
}

// ─────────────────────────────────────────────────────────────────────────────
// FRAMES & SWAPCHAINS
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    pub label: &'static str,
    pub surface: vk::SurfaceKHR,
    pub format: vk::SurfaceFormatKHR,
    pub usage: vk::ImageUsageFlags,
    pub preferred_buffering: u32,
    pub present_mode: vk::PresentModeKHR,
    pub preferred_extent: vk::Extent2D,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

impl Default for SwapchainDesc {
    fn default() -> Self {
        Self {
            label: "swapchain",
            surface: vk::SurfaceKHR::null(),
            format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
            preferred_buffering: 3,
            present_mode: vk::PresentModeKHR::FIFO,
            preferred_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
        }
    }
}

/// Snapshot of a swapchain handed to callers building per-image resources
#[derive(Debug, Clone)]
pub struct SwapchainState {
    pub extent: vk::Extent2D,
    pub format: vk::SurfaceFormatKHR,
    pub images: Vec<ImageId>,
    pub current_image: Option<u32>,
    pub is_out_of_date: bool,
    pub is_optimal: bool,
    pub is_zero_sized: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub current: u64,
    pub tail: u64,
    pub ring_index: usize,
    pub buffering: u32,
}
