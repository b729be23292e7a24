// Command recording
//
// Thin forwarding onto ash. Barrier batches arrive already merged by the
// access tracker and become exactly one vkCmdPipelineBarrier.

use ash::vk;
use std::ffi::CString;

use super::VulkanBackend;
use crate::backend::{NativeCommands, NativeRenderPassBegin};
use crate::sync::BarrierBatch;

fn whole_range(aspects: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspects,
        base_mip_level: 0,
        level_count: vk::REMAINING_MIP_LEVELS,
        base_array_layer: 0,
        layer_count: vk::REMAINING_ARRAY_LAYERS,
    }
}

impl NativeCommands for VulkanBackend {
    fn cmd_pipeline_barrier(&mut self, cb: vk::CommandBuffer, barriers: &BarrierBatch) {
        let buffer_barriers: Vec<vk::BufferMemoryBarrier> = barriers
            .buffers
            .iter()
            .map(|barrier| {
                vk::BufferMemoryBarrier::default()
                    .src_access_mask(barrier.src_access)
                    .dst_access_mask(barrier.dst_access)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .buffer(barrier.buffer)
                    .offset(barrier.offset)
                    .size(barrier.size)
            })
            .collect();

        let image_barriers: Vec<vk::ImageMemoryBarrier> = barriers
            .images
            .iter()
            .map(|barrier| {
                vk::ImageMemoryBarrier::default()
                    .src_access_mask(barrier.src_access)
                    .dst_access_mask(barrier.dst_access)
                    .old_layout(barrier.old_layout)
                    .new_layout(barrier.new_layout)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(barrier.image)
                    .subresource_range(whole_range(barrier.aspects))
            })
            .collect();

        unsafe {
            self.context.device.cmd_pipeline_barrier(
                cb,
                barriers.src_stages,
                barriers.dst_stages,
                vk::DependencyFlags::empty(),
                &[],
                &buffer_barriers,
                &image_barriers,
            )
        };
    }

    fn cmd_begin_render_pass(&mut self, cb: vk::CommandBuffer, begin: &NativeRenderPassBegin<'_>) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(begin.render_pass)
            .framebuffer(begin.framebuffer)
            .render_area(begin.render_area)
            .clear_values(begin.clear_values);

        unsafe {
            self.context
                .device
                .cmd_begin_render_pass(cb, &begin_info, vk::SubpassContents::INLINE)
        };
    }

    fn cmd_end_render_pass(&mut self, cb: vk::CommandBuffer) {
        unsafe { self.context.device.cmd_end_render_pass(cb) };
    }

    fn cmd_bind_pipeline(
        &mut self,
        cb: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        unsafe { self.context.device.cmd_bind_pipeline(cb, bind_point, pipeline) };
    }

    fn cmd_bind_descriptor_sets(
        &mut self,
        cb: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.context
                .device
                .cmd_bind_descriptor_sets(cb, bind_point, layout, 0, sets, dynamic_offsets)
        };
    }

    fn cmd_push_constants(&mut self, cb: vk::CommandBuffer, layout: vk::PipelineLayout, data: &[u8]) {
        unsafe {
            self.context
                .device
                .cmd_push_constants(cb, layout, vk::ShaderStageFlags::ALL, 0, data)
        };
    }

    fn cmd_set_viewport(&mut self, cb: vk::CommandBuffer, viewport: vk::Viewport) {
        unsafe { self.context.device.cmd_set_viewport(cb, 0, &[viewport]) };
    }

    fn cmd_set_scissor(&mut self, cb: vk::CommandBuffer, scissor: vk::Rect2D) {
        unsafe { self.context.device.cmd_set_scissor(cb, 0, &[scissor]) };
    }

    fn cmd_set_blend_constants(&mut self, cb: vk::CommandBuffer, constants: [f32; 4]) {
        unsafe { self.context.device.cmd_set_blend_constants(cb, &constants) };
    }

    fn cmd_set_stencil_compare_mask(
        &mut self,
        cb: vk::CommandBuffer,
        faces: vk::StencilFaceFlags,
        mask: u32,
    ) {
        unsafe { self.context.device.cmd_set_stencil_compare_mask(cb, faces, mask) };
    }

    fn cmd_set_stencil_reference(
        &mut self,
        cb: vk::CommandBuffer,
        faces: vk::StencilFaceFlags,
        reference: u32,
    ) {
        unsafe { self.context.device.cmd_set_stencil_reference(cb, faces, reference) };
    }

    fn cmd_set_stencil_write_mask(
        &mut self,
        cb: vk::CommandBuffer,
        faces: vk::StencilFaceFlags,
        mask: u32,
    ) {
        unsafe { self.context.device.cmd_set_stencil_write_mask(cb, faces, mask) };
    }

    fn cmd_bind_vertex_buffers(
        &mut self,
        cb: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[u64],
    ) {
        unsafe {
            self.context
                .device
                .cmd_bind_vertex_buffers(cb, first_binding, buffers, offsets)
        };
    }

    fn cmd_bind_index_buffer(
        &mut self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: u64,
        index_type: vk::IndexType,
    ) {
        unsafe {
            self.context
                .device
                .cmd_bind_index_buffer(cb, buffer, offset, index_type)
        };
    }

    fn cmd_draw(
        &mut self,
        cb: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.context
                .device
                .cmd_draw(cb, vertex_count, instance_count, first_vertex, first_instance)
        };
    }

    fn cmd_draw_indexed(
        &mut self,
        cb: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.context.device.cmd_draw_indexed(
                cb,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        };
    }

    fn cmd_draw_indirect(
        &mut self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        unsafe {
            self.context
                .device
                .cmd_draw_indirect(cb, buffer, offset, draw_count, stride)
        };
    }

    fn cmd_draw_indexed_indirect(
        &mut self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        unsafe {
            self.context
                .device
                .cmd_draw_indexed_indirect(cb, buffer, offset, draw_count, stride)
        };
    }

    fn cmd_dispatch(&mut self, cb: vk::CommandBuffer, x: u32, y: u32, z: u32) {
        unsafe { self.context.device.cmd_dispatch(cb, x, y, z) };
    }

    fn cmd_dispatch_indirect(&mut self, cb: vk::CommandBuffer, buffer: vk::Buffer, offset: u64) {
        unsafe { self.context.device.cmd_dispatch_indirect(cb, buffer, offset) };
    }

    fn cmd_fill_buffer(
        &mut self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        offset: u64,
        size: u64,
        data: u32,
    ) {
        unsafe { self.context.device.cmd_fill_buffer(cb, buffer, offset, size, data) };
    }

    fn cmd_copy_buffer(
        &mut self,
        cb: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: &[vk::BufferCopy],
    ) {
        unsafe { self.context.device.cmd_copy_buffer(cb, src, dst, regions) };
    }

    fn cmd_update_buffer(&mut self, cb: vk::CommandBuffer, dst: vk::Buffer, offset: u64, data: &[u8]) {
        unsafe { self.context.device.cmd_update_buffer(cb, dst, offset, data) };
    }

    fn cmd_clear_color_image(
        &mut self,
        cb: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: [f32; 4],
        aspects: vk::ImageAspectFlags,
    ) {
        let clear = vk::ClearColorValue { float32: color };
        unsafe {
            self.context
                .device
                .cmd_clear_color_image(cb, image, layout, &clear, &[whole_range(aspects)])
        };
    }

    fn cmd_copy_buffer_to_image(
        &mut self,
        cb: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe {
            self.context
                .device
                .cmd_copy_buffer_to_image(cb, src, dst, dst_layout, regions)
        };
    }

    fn cmd_blit_image(
        &mut self,
        cb: vk::CommandBuffer,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        unsafe {
            self.context
                .device
                .cmd_blit_image(cb, src, src_layout, dst, dst_layout, regions, filter)
        };
    }

    fn cmd_begin_debug_marker(&mut self, cb: vk::CommandBuffer, name: &str, color: [f32; 4]) {
        let Some(labels) = self.context.debug_labels.as_ref() else {
            return;
        };
        // Always open the label so the matching end stays balanced
        let name = CString::new(name.replace('\0', " ")).unwrap_or_default();
        let label = vk::DebugUtilsLabelEXT::default().label_name(&name).color(color);
        unsafe { labels.cmd_begin_debug_utils_label(cb, &label) };
    }

    fn cmd_end_debug_marker(&mut self, cb: vk::CommandBuffer) {
        if let Some(labels) = self.context.debug_labels.as_ref() {
            unsafe { labels.cmd_end_debug_utils_label(cb) };
        }
    }
}
