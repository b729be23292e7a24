// Stub backend - records native calls instead of executing them
//
// Hands out synthetic handles, keeps host-visible buffer contents in memory
// and can be scripted to fail allocations or return swapchain errors. Used by
// the test suite and by the headless demo when no GPU is configured.

use std::collections::{HashMap, VecDeque};

use ash::vk::{self, Handle};

use super::{
    Backend, BackendKind, DescriptorWrite, NativeCommands, NativeDevice, NativeRenderPassBegin,
    NativeShaderStage, NativeSwapchain, Submission,
};
use crate::error::{Result, Status};
use crate::sync::BarrierBatch;
use crate::types::{
    BufferDesc, BufferViewDesc, DescriptorBindingDesc, GraphicsPipelineDesc, ImageDesc,
    ImageViewDesc, RenderPassDesc, SamplerDesc, SwapchainDesc, NUM_DESCRIPTOR_TYPES,
};

/// One recorded native call
#[derive(Debug, Clone)]
pub enum NativeCall {
    CreateBuffer(vk::Buffer),
    DestroyBuffer(vk::Buffer),
    WriteBuffer { buffer: vk::Buffer, offset: u64, len: usize },
    CreateImage(vk::Image),
    DestroyImage(vk::Image),
    DestroyImageView(vk::ImageView),
    DestroyFramebuffer(vk::Framebuffer),
    CreateDescriptorPool { pool: vk::DescriptorPool, sizes: [u32; NUM_DESCRIPTOR_TYPES], max_sets: u32 },
    DestroyDescriptorPool(vk::DescriptorPool),
    AllocateDescriptorSet { pool: vk::DescriptorPool, set: vk::DescriptorSet, variable_length: Option<u32> },
    FreeDescriptorSet { pool: vk::DescriptorPool, set: vk::DescriptorSet },
    WriteDescriptorSet { set: vk::DescriptorSet, binding: u32, element: u32, count: usize },
    CreateSwapchain { swapchain: vk::SwapchainKHR, old: vk::SwapchainKHR },
    DestroySwapchain(vk::SwapchainKHR),
    AcquireNextImage(vk::SwapchainKHR),
    Present { swapchain: vk::SwapchainKHR, image_index: u32 },
    WaitForFence(vk::Fence),
    ResetFence(vk::Fence),
    ResetCommandBuffer(vk::CommandBuffer),
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    Submit { command_buffer: vk::CommandBuffer, wait: Option<vk::Semaphore>, signal: Option<vk::Semaphore>, fence: vk::Fence },
    WaitIdle,
    WaitQueueIdle,

    PipelineBarrier(BarrierBatch),
    BeginRenderPass { render_pass: vk::RenderPass, framebuffer: vk::Framebuffer, clear_value_count: usize },
    EndRenderPass,
    BindPipeline { bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline },
    BindDescriptorSets { bind_point: vk::PipelineBindPoint, layout: vk::PipelineLayout, sets: Vec<vk::DescriptorSet>, dynamic_offsets: Vec<u32> },
    PushConstants { layout: vk::PipelineLayout, data: Vec<u8> },
    SetViewport { x: f32, y: f32, width: f32, height: f32 },
    SetScissor { x: i32, y: i32, width: u32, height: u32 },
    SetBlendConstants([f32; 4]),
    SetStencilCompareMask { faces: vk::StencilFaceFlags, mask: u32 },
    SetStencilReference { faces: vk::StencilFaceFlags, reference: u32 },
    SetStencilWriteMask { faces: vk::StencilFaceFlags, mask: u32 },
    BindVertexBuffers { first_binding: u32, buffers: Vec<vk::Buffer>, offsets: Vec<u64> },
    BindIndexBuffer { buffer: vk::Buffer, offset: u64, index_type: vk::IndexType },
    Draw { vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32 },
    DrawIndexed { index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32 },
    DrawIndirect { buffer: vk::Buffer, offset: u64, draw_count: u32, stride: u32 },
    DrawIndexedIndirect { buffer: vk::Buffer, offset: u64, draw_count: u32, stride: u32 },
    Dispatch { x: u32, y: u32, z: u32 },
    DispatchIndirect { buffer: vk::Buffer, offset: u64 },
    FillBuffer { buffer: vk::Buffer, offset: u64, size: u64, data: u32 },
    CopyBuffer { src: vk::Buffer, dst: vk::Buffer, regions: usize },
    UpdateBuffer { dst: vk::Buffer, offset: u64, data: Vec<u8> },
    ClearColorImage { image: vk::Image, layout: vk::ImageLayout, color: [f32; 4] },
    CopyBufferToImage { src: vk::Buffer, dst: vk::Image, dst_layout: vk::ImageLayout, regions: usize },
    BlitImage { src: vk::Image, src_layout: vk::ImageLayout, dst: vk::Image, dst_layout: vk::ImageLayout, filter: vk::Filter },
    BeginDebugMarker(String),
    EndDebugMarker,
}

impl NativeCall {
    /// Calls recorded into a command buffer, as opposed to device-level calls
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            NativeCall::PipelineBarrier(_)
                | NativeCall::BeginRenderPass { .. }
                | NativeCall::EndRenderPass
                | NativeCall::BindPipeline { .. }
                | NativeCall::BindDescriptorSets { .. }
                | NativeCall::PushConstants { .. }
                | NativeCall::SetViewport { .. }
                | NativeCall::SetScissor { .. }
                | NativeCall::SetBlendConstants(_)
                | NativeCall::SetStencilCompareMask { .. }
                | NativeCall::SetStencilReference { .. }
                | NativeCall::SetStencilWriteMask { .. }
                | NativeCall::BindVertexBuffers { .. }
                | NativeCall::BindIndexBuffer { .. }
                | NativeCall::Draw { .. }
                | NativeCall::DrawIndexed { .. }
                | NativeCall::DrawIndirect { .. }
                | NativeCall::DrawIndexedIndirect { .. }
                | NativeCall::Dispatch { .. }
                | NativeCall::DispatchIndirect { .. }
                | NativeCall::FillBuffer { .. }
                | NativeCall::CopyBuffer { .. }
                | NativeCall::UpdateBuffer { .. }
                | NativeCall::ClearColorImage { .. }
                | NativeCall::CopyBufferToImage { .. }
                | NativeCall::BlitImage { .. }
                | NativeCall::BeginDebugMarker(_)
                | NativeCall::EndDebugMarker
        )
    }
}

pub struct StubBackend {
    next_handle: u64,
    calls: Vec<NativeCall>,
    /// Contents of host-mapped buffers
    memory: HashMap<vk::Buffer, Vec<u8>>,
    swapchain_images: HashMap<vk::SwapchainKHR, (u32, u32)>,
    /// Creates to let through before failing, and the failure
    fail_create: Option<(u32, Status)>,
    acquire_script: VecDeque<Result<(u32, bool)>>,
    present_script: VecDeque<Result<bool>>,
    swapchain_create_script: VecDeque<Result<()>>,
    end_script: VecDeque<Result<()>>,
    submit_script: VecDeque<Result<()>>,
    surface_extent: vk::Extent2D,
    swapchain_image_count: u32,
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            next_handle: 1,
            calls: Vec::new(),
            memory: HashMap::new(),
            swapchain_images: HashMap::new(),
            fail_create: None,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            swapchain_create_script: VecDeque::new(),
            end_script: VecDeque::new(),
            submit_script: VecDeque::new(),
            surface_extent: vk::Extent2D {
                width: 1280,
                height: 720,
            },
            swapchain_image_count: 3,
        }
    }

    pub fn calls(&self) -> &[NativeCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<NativeCall> {
        std::mem::take(&mut self.calls)
    }

    /// Recorded calls that went into command buffers
    pub fn commands(&self) -> Vec<NativeCall> {
        self.calls.iter().filter(|c| c.is_command()).cloned().collect()
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Fail the next `create_*`/`allocate_*` call with `status`
    pub fn fail_next_create(&mut self, status: Status) {
        self.fail_nth_create(0, status);
    }

    /// Let `skip` handle-producing calls succeed, then fail one with `status`
    pub fn fail_nth_create(&mut self, skip: u32, status: Status) {
        self.fail_create = Some((skip, status));
    }

    pub fn script_acquire(&mut self, result: Result<(u32, bool)>) {
        self.acquire_script.push_back(result);
    }

    pub fn script_present(&mut self, result: Result<bool>) {
        self.present_script.push_back(result);
    }

    pub fn script_swapchain_create(&mut self, result: Result<()>) {
        self.swapchain_create_script.push_back(result);
    }

    pub fn script_end_command_buffer(&mut self, result: Result<()>) {
        self.end_script.push_back(result);
    }

    pub fn script_submit(&mut self, result: Result<()>) {
        self.submit_script.push_back(result);
    }

    pub fn set_surface_extent(&mut self, extent: vk::Extent2D) {
        self.surface_extent = extent;
    }

    pub fn buffer_contents(&self, buffer: vk::Buffer) -> Option<&[u8]> {
        self.memory.get(&buffer).map(Vec::as_slice)
    }

    fn handle<H: Handle>(&mut self) -> Result<H> {
        match self.fail_create {
            Some((0, status)) => {
                self.fail_create = None;
                return Err(status);
            }
            Some((skip, status)) => self.fail_create = Some((skip - 1, status)),
            None => {}
        }
        let raw = self.next_handle;
        self.next_handle += 1;
        Ok(H::from_raw(raw))
    }

    fn record(&mut self, call: NativeCall) {
        log::trace!("[stub] {:?}", call);
        self.calls.push(call);
    }
}

impl NativeDevice for StubBackend {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<vk::Buffer> {
        let buffer: vk::Buffer = self.handle()?;
        if desc.host_mapped {
            self.memory.insert(buffer, vec![0; desc.size as usize]);
        }
        self.record(NativeCall::CreateBuffer(buffer));
        Ok(buffer)
    }

    fn destroy_buffer(&mut self, buffer: vk::Buffer) {
        self.memory.remove(&buffer);
        self.record(NativeCall::DestroyBuffer(buffer));
    }

    fn write_buffer(&mut self, buffer: vk::Buffer, offset: u64, data: &[u8]) -> Result<()> {
        let memory = self.memory.get_mut(&buffer).ok_or(Status::MemoryMapFailed)?;
        let start = offset as usize;
        memory[start..start + data.len()].copy_from_slice(data);
        self.record(NativeCall::WriteBuffer {
            buffer,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn create_buffer_view(&mut self, _: vk::Buffer, _: &BufferViewDesc) -> Result<vk::BufferView> {
        self.handle()
    }

    fn destroy_buffer_view(&mut self, _: vk::BufferView) {}

    fn create_image(&mut self, _: &ImageDesc) -> Result<vk::Image> {
        let image: vk::Image = self.handle()?;
        self.record(NativeCall::CreateImage(image));
        Ok(image)
    }

    fn destroy_image(&mut self, image: vk::Image) {
        self.record(NativeCall::DestroyImage(image));
    }

    fn create_image_view(&mut self, _: vk::Image, _: &ImageViewDesc) -> Result<vk::ImageView> {
        self.handle()
    }

    fn destroy_image_view(&mut self, view: vk::ImageView) {
        self.record(NativeCall::DestroyImageView(view));
    }

    fn create_sampler(&mut self, _: &SamplerDesc) -> Result<vk::Sampler> {
        self.handle()
    }

    fn destroy_sampler(&mut self, _: vk::Sampler) {}

    fn create_shader(&mut self, _: &[u32]) -> Result<vk::ShaderModule> {
        self.handle()
    }

    fn destroy_shader(&mut self, _: vk::ShaderModule) {}

    fn create_descriptor_set_layout(
        &mut self,
        _: &[DescriptorBindingDesc],
    ) -> Result<vk::DescriptorSetLayout> {
        self.handle()
    }

    fn destroy_descriptor_set_layout(&mut self, _: vk::DescriptorSetLayout) {}

    fn create_descriptor_pool(
        &mut self,
        sizes: &[u32; NUM_DESCRIPTOR_TYPES],
        max_sets: u32,
    ) -> Result<vk::DescriptorPool> {
        let pool: vk::DescriptorPool = self.handle()?;
        self.record(NativeCall::CreateDescriptorPool {
            pool,
            sizes: *sizes,
            max_sets,
        });
        Ok(pool)
    }

    fn destroy_descriptor_pool(&mut self, pool: vk::DescriptorPool) {
        self.record(NativeCall::DestroyDescriptorPool(pool));
    }

    fn allocate_descriptor_set(
        &mut self,
        pool: vk::DescriptorPool,
        _: vk::DescriptorSetLayout,
        variable_length: Option<u32>,
    ) -> Result<vk::DescriptorSet> {
        let set: vk::DescriptorSet = self.handle()?;
        self.record(NativeCall::AllocateDescriptorSet {
            pool,
            set,
            variable_length,
        });
        Ok(set)
    }

    fn free_descriptor_set(&mut self, pool: vk::DescriptorPool, set: vk::DescriptorSet) {
        self.record(NativeCall::FreeDescriptorSet { pool, set });
    }

    fn write_descriptor_set(&mut self, write: &DescriptorWrite<'_>) {
        self.record(NativeCall::WriteDescriptorSet {
            set: write.set,
            binding: write.binding,
            element: write.element,
            count: write.payload.len(),
        });
    }

    fn create_render_pass(&mut self, _: &RenderPassDesc<'_>) -> Result<vk::RenderPass> {
        self.handle()
    }

    fn destroy_render_pass(&mut self, _: vk::RenderPass) {}

    fn create_framebuffer(
        &mut self,
        _: vk::RenderPass,
        _: &[vk::ImageView],
        _: vk::Extent2D,
        _: u32,
    ) -> Result<vk::Framebuffer> {
        self.handle()
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        self.record(NativeCall::DestroyFramebuffer(framebuffer));
    }

    fn create_pipeline_layout(
        &mut self,
        _: &[vk::DescriptorSetLayout],
        _: u32,
    ) -> Result<vk::PipelineLayout> {
        self.handle()
    }

    fn destroy_pipeline_layout(&mut self, _: vk::PipelineLayout) {}

    fn create_compute_pipeline(
        &mut self,
        _: vk::PipelineLayout,
        _: NativeShaderStage<'_>,
    ) -> Result<vk::Pipeline> {
        self.handle()
    }

    fn create_graphics_pipeline(
        &mut self,
        _: vk::PipelineLayout,
        _: vk::RenderPass,
        _: NativeShaderStage<'_>,
        _: NativeShaderStage<'_>,
        _: &GraphicsPipelineDesc<'_>,
    ) -> Result<vk::Pipeline> {
        self.handle()
    }

    fn destroy_pipeline(&mut self, _: vk::Pipeline) {}

    fn create_command_buffer(&mut self) -> Result<(vk::CommandPool, vk::CommandBuffer)> {
        let pool = self.handle()?;
        let command_buffer = self.handle()?;
        Ok((pool, command_buffer))
    }

    fn destroy_command_buffer(&mut self, _: vk::CommandPool, _: vk::CommandBuffer) {}

    fn reset_command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> Result<()> {
        self.record(NativeCall::ResetCommandBuffer(command_buffer));
        Ok(())
    }

    fn begin_command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> Result<()> {
        self.record(NativeCall::BeginCommandBuffer(command_buffer));
        Ok(())
    }

    fn end_command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> Result<()> {
        self.record(NativeCall::EndCommandBuffer(command_buffer));
        self.end_script.pop_front().unwrap_or(Ok(()))
    }

    fn create_fence(&mut self, _: bool) -> Result<vk::Fence> {
        self.handle()
    }

    fn destroy_fence(&mut self, _: vk::Fence) {}

    fn wait_for_fence(&mut self, fence: vk::Fence) -> Result<()> {
        self.record(NativeCall::WaitForFence(fence));
        Ok(())
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> Result<()> {
        self.record(NativeCall::ResetFence(fence));
        Ok(())
    }

    fn create_semaphore(&mut self) -> Result<vk::Semaphore> {
        self.handle()
    }

    fn destroy_semaphore(&mut self, _: vk::Semaphore) {}

    fn submit(&mut self, submission: &Submission) -> Result<()> {
        if let Some(result) = self.submit_script.pop_front() {
            result?;
        }
        self.record(NativeCall::Submit {
            command_buffer: submission.command_buffer,
            wait: submission.wait_semaphore,
            signal: submission.signal_semaphore,
            fence: submission.fence,
        });
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<()> {
        self.record(NativeCall::WaitIdle);
        Ok(())
    }

    fn wait_queue_idle(&mut self) -> Result<()> {
        self.record(NativeCall::WaitQueueIdle);
        Ok(())
    }

    fn create_swapchain(
        &mut self,
        desc: &SwapchainDesc,
        old: vk::SwapchainKHR,
    ) -> Result<NativeSwapchain> {
        if let Some(result) = self.swapchain_create_script.pop_front() {
            result?;
        }

        let extent = self.surface_extent;
        if extent.width == 0 || extent.height == 0 {
            return Ok(NativeSwapchain {
                handle: vk::SwapchainKHR::null(),
                images: Vec::new(),
                format: desc.format,
                extent,
            });
        }

        let handle: vk::SwapchainKHR = self.handle()?;
        let mut images = Vec::with_capacity(self.swapchain_image_count as usize);
        for _ in 0..self.swapchain_image_count {
            images.push(self.handle()?);
        }
        self.swapchain_images
            .insert(handle, (self.swapchain_image_count, 0));
        self.record(NativeCall::CreateSwapchain {
            swapchain: handle,
            old,
        });

        Ok(NativeSwapchain {
            handle,
            images,
            format: desc.format,
            extent,
        })
    }

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        self.swapchain_images.remove(&swapchain);
        self.record(NativeCall::DestroySwapchain(swapchain));
    }

    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        _: vk::Semaphore,
    ) -> Result<(u32, bool)> {
        self.record(NativeCall::AcquireNextImage(swapchain));
        if let Some(result) = self.acquire_script.pop_front() {
            return result;
        }
        let (count, next) = self
            .swapchain_images
            .get_mut(&swapchain)
            .ok_or(Status::SurfaceLost)?;
        let index = *next;
        *next = (*next + 1) % *count;
        Ok((index, false))
    }

    fn present(
        &mut self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        _: vk::Semaphore,
    ) -> Result<bool> {
        self.record(NativeCall::Present {
            swapchain,
            image_index,
        });
        self.present_script.pop_front().unwrap_or(Ok(false))
    }
}

impl NativeCommands for StubBackend {
    fn cmd_pipeline_barrier(&mut self, _: vk::CommandBuffer, barriers: &BarrierBatch) {
        self.record(NativeCall::PipelineBarrier(barriers.clone()));
    }

    fn cmd_begin_render_pass(&mut self, _: vk::CommandBuffer, begin: &NativeRenderPassBegin<'_>) {
        self.record(NativeCall::BeginRenderPass {
            render_pass: begin.render_pass,
            framebuffer: begin.framebuffer,
            clear_value_count: begin.clear_values.len(),
        });
    }

    fn cmd_end_render_pass(&mut self, _: vk::CommandBuffer) {
        self.record(NativeCall::EndRenderPass);
    }

    fn cmd_bind_pipeline(
        &mut self,
        _: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        self.record(NativeCall::BindPipeline {
            bind_point,
            pipeline,
        });
    }

    fn cmd_bind_descriptor_sets(
        &mut self,
        _: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        self.record(NativeCall::BindDescriptorSets {
            bind_point,
            layout,
            sets: sets.to_vec(),
            dynamic_offsets: dynamic_offsets.to_vec(),
        });
    }

    fn cmd_push_constants(&mut self, _: vk::CommandBuffer, layout: vk::PipelineLayout, data: &[u8]) {
        self.record(NativeCall::PushConstants {
            layout,
            data: data.to_vec(),
        });
    }

    fn cmd_set_viewport(&mut self, _: vk::CommandBuffer, viewport: vk::Viewport) {
        self.record(NativeCall::SetViewport {
            x: viewport.x,
            y: viewport.y,
            width: viewport.width,
            height: viewport.height,
        });
    }

    fn cmd_set_scissor(&mut self, _: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.record(NativeCall::SetScissor {
            x: scissor.offset.x,
            y: scissor.offset.y,
            width: scissor.extent.width,
            height: scissor.extent.height,
        });
    }

    fn cmd_set_blend_constants(&mut self, _: vk::CommandBuffer, constants: [f32; 4]) {
        self.record(NativeCall::SetBlendConstants(constants));
    }

    fn cmd_set_stencil_compare_mask(
        &mut self,
        _: vk::CommandBuffer,
        faces: vk::StencilFaceFlags,
        mask: u32,
    ) {
        self.record(NativeCall::SetStencilCompareMask { faces, mask });
    }

    fn cmd_set_stencil_reference(
        &mut self,
        _: vk::CommandBuffer,
        faces: vk::StencilFaceFlags,
        reference: u32,
    ) {
        self.record(NativeCall::SetStencilReference { faces, reference });
    }

    fn cmd_set_stencil_write_mask(
        &mut self,
        _: vk::CommandBuffer,
        faces: vk::StencilFaceFlags,
        mask: u32,
    ) {
        self.record(NativeCall::SetStencilWriteMask { faces, mask });
    }

    fn cmd_bind_vertex_buffers(
        &mut self,
        _: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[u64],
    ) {
        self.record(NativeCall::BindVertexBuffers {
            first_binding,
            buffers: buffers.to_vec(),
            offsets: offsets.to_vec(),
        });
    }

    fn cmd_bind_index_buffer(
        &mut self,
        _: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: u64,
        index_type: vk::IndexType,
    ) {
        self.record(NativeCall::BindIndexBuffer {
            buffer,
            offset,
            index_type,
        });
    }

    fn cmd_draw(
        &mut self,
        _: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        self.record(NativeCall::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    fn cmd_draw_indexed(
        &mut self,
        _: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.record(NativeCall::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }

    fn cmd_draw_indirect(
        &mut self,
        _: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        self.record(NativeCall::DrawIndirect {
            buffer,
            offset,
            draw_count,
            stride,
        });
    }

    fn cmd_draw_indexed_indirect(
        &mut self,
        _: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        self.record(NativeCall::DrawIndexedIndirect {
            buffer,
            offset,
            draw_count,
            stride,
        });
    }

    fn cmd_dispatch(&mut self, _: vk::CommandBuffer, x: u32, y: u32, z: u32) {
        self.record(NativeCall::Dispatch { x, y, z });
    }

    fn cmd_dispatch_indirect(&mut self, _: vk::CommandBuffer, buffer: vk::Buffer, offset: u64) {
        self.record(NativeCall::DispatchIndirect { buffer, offset });
    }

    fn cmd_fill_buffer(
        &mut self,
        _: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: u64,
        size: u64,
        data: u32,
    ) {
        self.record(NativeCall::FillBuffer {
            buffer,
            offset,
            size,
            data,
        });
    }

    fn cmd_copy_buffer(
        &mut self,
        _: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        self.record(NativeCall::CopyBuffer {
            src,
            dst,
            regions: regions.len(),
        });
    }

    fn cmd_update_buffer(&mut self, _: vk::CommandBuffer, dst: vk::Buffer, offset: u64, data: &[u8]) {
        self.record(NativeCall::UpdateBuffer {
            dst,
            offset,
            data: data.to_vec(),
        });
    }

    fn cmd_clear_color_image(
        &mut self,
        _: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: [f32; 4],
        _: vk::ImageAspectFlags,
    ) {
        self.record(NativeCall::ClearColorImage {
            image,
            layout,
            color,
        });
    }

    fn cmd_copy_buffer_to_image(
        &mut self,
        _: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        self.record(NativeCall::CopyBufferToImage {
            src,
            dst,
            dst_layout,
            regions: regions.len(),
        });
    }

    fn cmd_blit_image(
        &mut self,
        _: vk::CommandBuffer,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        _: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        self.record(NativeCall::BlitImage {
            src,
            src_layout,
            dst,
            dst_layout,
            filter,
        });
    }

    fn cmd_begin_debug_marker(&mut self, _: vk::CommandBuffer, name: &str, _: [f32; 4]) {
        self.record(NativeCall::BeginDebugMarker(name.to_string()));
    }

    fn cmd_end_debug_marker(&mut self, _: vk::CommandBuffer) {
        self.record(NativeCall::EndDebugMarker);
    }
}

impl Backend for StubBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Stub
    }
}
