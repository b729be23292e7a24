// Backend module - native API seam
//
// The device facade and the command encoder talk to the GPU only through the
// two traits below. `vulkan` drives a real device through ash; `stub` records
// every call so the tracker and encoder can be exercised without a GPU.

pub mod stub;
pub mod vulkan;

use ash::vk;

use crate::error::Result;
use crate::sync::BarrierBatch;
use crate::types::{
    BufferDesc, BufferViewDesc, DescriptorBindingDesc, GraphicsPipelineDesc, ImageDesc,
    ImageViewDesc, RenderPassDesc, SamplerDesc, SwapchainDesc, NUM_DESCRIPTOR_TYPES,
};

pub use stub::{NativeCall, StubBackend};
pub use vulkan::VulkanBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Vulkan,
    Stub,
}

/// A shader module plus the entry point to run
#[derive(Debug, Clone, Copy)]
pub struct NativeShaderStage<'a> {
    pub module: vk::ShaderModule,
    pub entry_point: &'a str,
}

/// Native swapchain as returned by (re)creation
#[derive(Debug, Clone)]
pub struct NativeSwapchain {
    /// Null when the surface currently has a zero-sized extent
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
}

/// Payload of a native descriptor write
#[derive(Debug, Clone, Copy)]
pub enum DescriptorPayload<'a> {
    Buffers(&'a [vk::DescriptorBufferInfo]),
    TexelBuffers(&'a [vk::BufferView]),
    Images(&'a [vk::DescriptorImageInfo]),
}

impl DescriptorPayload<'_> {
    pub fn len(&self) -> usize {
        match self {
            DescriptorPayload::Buffers(infos) => infos.len(),
            DescriptorPayload::TexelBuffers(views) => views.len(),
            DescriptorPayload::Images(infos) => infos.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DescriptorWrite<'a> {
    pub set: vk::DescriptorSet,
    pub binding: u32,
    pub element: u32,
    pub ty: vk::DescriptorType,
    pub payload: DescriptorPayload<'a>,
}

#[derive(Debug, Clone, Copy)]
pub struct Submission {
    pub command_buffer: vk::CommandBuffer,
    /// Waited on at `ALL_COMMANDS`
    pub wait_semaphore: Option<vk::Semaphore>,
    pub signal_semaphore: Option<vk::Semaphore>,
    pub fence: vk::Fence,
}

#[derive(Clone, Copy)]
pub struct NativeRenderPassBegin<'a> {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub render_area: vk::Rect2D,
    pub clear_values: &'a [vk::ClearValue],
}

/// Object lifetime, queue and presentation
pub trait NativeDevice {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<vk::Buffer>;
    fn destroy_buffer(&mut self, buffer: vk::Buffer);
    /// Copy `data` into a host-mapped buffer at `offset`
    fn write_buffer(&mut self, buffer: vk::Buffer, offset: u64, data: &[u8]) -> Result<()>;

    fn create_buffer_view(&mut self, buffer: vk::Buffer, desc: &BufferViewDesc)
        -> Result<vk::BufferView>;
    fn destroy_buffer_view(&mut self, view: vk::BufferView);

    fn create_image(&mut self, desc: &ImageDesc) -> Result<vk::Image>;
    fn destroy_image(&mut self, image: vk::Image);
    fn create_image_view(&mut self, image: vk::Image, desc: &ImageViewDesc)
        -> Result<vk::ImageView>;
    fn destroy_image_view(&mut self, view: vk::ImageView);

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<vk::Sampler>;
    fn destroy_sampler(&mut self, sampler: vk::Sampler);

    fn create_shader(&mut self, spirv: &[u32]) -> Result<vk::ShaderModule>;
    fn destroy_shader(&mut self, shader: vk::ShaderModule);

    fn create_descriptor_set_layout(
        &mut self,
        bindings: &[DescriptorBindingDesc],
    ) -> Result<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&mut self, layout: vk::DescriptorSetLayout);
    fn create_descriptor_pool(
        &mut self,
        sizes: &[u32; NUM_DESCRIPTOR_TYPES],
        max_sets: u32,
    ) -> Result<vk::DescriptorPool>;
    fn destroy_descriptor_pool(&mut self, pool: vk::DescriptorPool);
    fn allocate_descriptor_set(
        &mut self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        variable_length: Option<u32>,
    ) -> Result<vk::DescriptorSet>;
    fn free_descriptor_set(&mut self, pool: vk::DescriptorPool, set: vk::DescriptorSet);
    fn write_descriptor_set(&mut self, write: &DescriptorWrite<'_>);

    fn create_render_pass(&mut self, desc: &RenderPassDesc<'_>) -> Result<vk::RenderPass>;
    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass);
    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
        layers: u32,
    ) -> Result<vk::Framebuffer>;
    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer);

    fn create_pipeline_layout(
        &mut self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants_size: u32,
    ) -> Result<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout);
    fn create_compute_pipeline(
        &mut self,
        layout: vk::PipelineLayout,
        stage: NativeShaderStage<'_>,
    ) -> Result<vk::Pipeline>;
    fn create_graphics_pipeline(
        &mut self,
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
        vertex: NativeShaderStage<'_>,
        fragment: NativeShaderStage<'_>,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> Result<vk::Pipeline>;
    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline);

    fn create_command_buffer(&mut self) -> Result<(vk::CommandPool, vk::CommandBuffer)>;
    fn destroy_command_buffer(&mut self, pool: vk::CommandPool, command_buffer: vk::CommandBuffer);
    fn reset_command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> Result<()>;
    fn begin_command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> Result<()>;
    fn end_command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> Result<()>;

    fn create_fence(&mut self, signaled: bool) -> Result<vk::Fence>;
    fn destroy_fence(&mut self, fence: vk::Fence);
    fn wait_for_fence(&mut self, fence: vk::Fence) -> Result<()>;
    fn reset_fence(&mut self, fence: vk::Fence) -> Result<()>;
    fn create_semaphore(&mut self) -> Result<vk::Semaphore>;
    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore);

    fn submit(&mut self, submission: &Submission) -> Result<()>;
    fn wait_idle(&mut self) -> Result<()>;
    fn wait_queue_idle(&mut self) -> Result<()>;

    fn create_swapchain(
        &mut self,
        desc: &SwapchainDesc,
        old: vk::SwapchainKHR,
    ) -> Result<NativeSwapchain>;
    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR);
    /// Returns the image index and whether the swapchain is suboptimal
    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
    ) -> Result<(u32, bool)>;
    /// Returns whether the swapchain is suboptimal
    fn present(
        &mut self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool>;
}

/// Command recording into a native command buffer
pub trait NativeCommands {
    fn cmd_pipeline_barrier(&mut self, cb: vk::CommandBuffer, barriers: &BarrierBatch);
    fn cmd_begin_render_pass(&mut self, cb: vk::CommandBuffer, begin: &NativeRenderPassBegin<'_>);
    fn cmd_end_render_pass(&mut self, cb: vk::CommandBuffer);
    fn cmd_bind_pipeline(
        &mut self,
        cb: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    );
    fn cmd_bind_descriptor_sets(
        &mut self,
        cb: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    );
    fn cmd_push_constants(&mut self, cb: vk::CommandBuffer, layout: vk::PipelineLayout, data: &[u8]);
    fn cmd_set_viewport(&mut self, cb: vk::CommandBuffer, viewport: vk::Viewport);
    fn cmd_set_scissor(&mut self, cb: vk::CommandBuffer, scissor: vk::Rect2D);
    fn cmd_set_blend_constants(&mut self, cb: vk::CommandBuffer, constants: [f32; 4]);
    fn cmd_set_stencil_compare_mask(
        &mut self,
        cb: vk::CommandBuffer,
        faces: vk::StencilFaceFlags,
        mask: u32,
    );
    fn cmd_set_stencil_reference(
        &mut self,
        cb: vk::CommandBuffer,
        faces: vk::StencilFaceFlags,
        reference: u32,
    );
    fn cmd_set_stencil_write_mask(
        &mut self,
        cb: vk::CommandBuffer,
        faces: vk::StencilFaceFlags,
        mask: u32,
    );
    fn cmd_bind_vertex_buffers(
        &mut self,
        cb: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[u64],
    );
    fn cmd_bind_index_buffer(
        &mut self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: u64,
        index_type: vk::IndexType,
    );
    fn cmd_draw(
        &mut self,
        cb: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );
    fn cmd_draw_indexed(
        &mut self,
        cb: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );
    fn cmd_draw_indirect(
        &mut self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    );
    fn cmd_draw_indexed_indirect(
        &mut self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    );
    fn cmd_dispatch(&mut self, cb: vk::CommandBuffer, x: u32, y: u32, z: u32);
    fn cmd_dispatch_indirect(&mut self, cb: vk::CommandBuffer, buffer: vk::Buffer, offset: u64);

    fn cmd_fill_buffer(
        &mut self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: u64,
        size: u64,
        data: u32,
    );
    fn cmd_copy_buffer(
        &mut self,
        cb: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    );
    fn cmd_update_buffer(&mut self, cb: vk::CommandBuffer, dst: vk::Buffer, offset: u64, data: &[u8]);
    fn cmd_clear_color_image(
        &mut self,
        cb: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: [f32; 4],
        aspects: vk::ImageAspectFlags,
    );
    fn cmd_copy_buffer_to_image(
        &mut self,
        cb: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    );
    #[allow(clippy::too_many_arguments)]
    fn cmd_blit_image(
        &mut self,
        cb: vk::CommandBuffer,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    );

    // Debug markers are optional; backends without them keep the no-ops.
    fn cmd_begin_debug_marker(&mut self, _cb: vk::CommandBuffer, _name: &str, _color: [f32; 4]) {}
    fn cmd_end_debug_marker(&mut self, _cb: vk::CommandBuffer) {}
}

pub trait Backend: NativeDevice + NativeCommands {
    fn kind(&self) -> BackendKind;
}
