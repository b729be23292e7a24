// Deferred render pass recording
//
// Barriers cannot be issued inside a native render pass, so everything
// between `begin_render_pass` and `end_render_pass` is recorded as `Command`
// values. Ending the pass walks the list twice: once to sync every resource
// the pass touches (one merged barrier before the native begin), once to
// replay the commands in order.

use ash::vk;
use glam::Vec4;

use super::command::{Arg, ArgPool, ArgSlice, Command};
use super::{
    check_push_constants, dynamic_offset_count, encode_prelude, sync_descriptor_set,
    CommandEncoder, Encoder, EncoderState,
};
use crate::backend::{Backend, NativeRenderPassBegin};
use crate::resources::{
    resolve, resolve_mut, BufferId, DescriptorSetId, FramebufferId, GraphicsPipelineId,
    RenderPassId, Resources,
};
use crate::sync::classify::{self, PassKind};
use crate::sync::BarrierBatch;
use crate::types::{DepthStencilClear, RenderPassBeginInfo, Viewport};

#[derive(Debug, Clone, Copy)]
struct PassTarget {
    framebuffer: FramebufferId,
    render_pass: RenderPassId,
    render_area: vk::Rect2D,
    depth_stencil_clear: DepthStencilClear,
}

/// Everything recorded for the currently open render pass
pub struct RenderPassContext {
    target: Option<PassTarget>,
    color_clear_values: Vec<Vec4>,
    pub(crate) commands: Vec<Command>,
    pub(crate) arg_pool: ArgPool,
    pub(crate) pipeline: Option<GraphicsPipelineId>,
    pub(crate) index_buffer: Option<BufferId>,
    native_clear_values: Vec<vk::ClearValue>,
    native_sets: Vec<vk::DescriptorSet>,
    native_buffers: Vec<vk::Buffer>,
    /// Sets already classified by the current barrier pass
    synced_sets: Vec<DescriptorSetId>,
}

impl RenderPassContext {
    pub(crate) fn new(arg_pool_capacity: usize) -> Self {
        Self {
            target: None,
            color_clear_values: Vec::new(),
            commands: Vec::new(),
            arg_pool: ArgPool::new(arg_pool_capacity),
            pipeline: None,
            index_buffer: None,
            native_clear_values: Vec::new(),
            native_sets: Vec::new(),
            native_buffers: Vec::new(),
            synced_sets: Vec::new(),
        }
    }

    pub fn num_commands(&self) -> usize {
        self.commands.len()
    }

    /// Drop the recorded commands and reclaim the argument arena
    pub(crate) fn reset(&mut self) {
        self.target = None;
        self.color_clear_values.clear();
        self.commands.clear();
        self.arg_pool.reset();
        self.pipeline = None;
        self.index_buffer = None;
    }
}

/// Check `begin_render_pass` arguments against the framebuffer and render pass
fn validate_begin(resources: &Resources, info: &RenderPassBeginInfo<'_>) {
    let framebuffer = resources.framebuffer(info.framebuffer);
    let render_pass = resources.render_pass(info.render_pass);
    let framebuffer_pass = resources.render_pass(framebuffer.render_pass);

    assert!(
        render_pass.is_compatible(framebuffer_pass),
        "framebuffer was created for a render pass with different attachments"
    );
    assert_eq!(
        info.color_clear_values.len(),
        render_pass.color_attachments.len(),
        "one color clear value is required per color attachment"
    );

    let area = info.render_area;
    assert!(
        area.offset.x >= 0 && area.offset.y >= 0,
        "render area offset must be non-negative"
    );
    assert!(
        area.offset.x as u64 + area.extent.width as u64 <= framebuffer.extent.width as u64
            && area.offset.y as u64 + area.extent.height as u64
                <= framebuffer.extent.height as u64,
        "render area {:?} exceeds framebuffer extent {:?}",
        area,
        framebuffer.extent
    );
}

/// Sync the framebuffer's attachments per the render pass load/store ops
fn sync_attachments(resources: &mut Resources, barriers: &mut BarrierBatch, target: &PassTarget) {
    let Resources {
        images,
        image_views,
        render_passes,
        framebuffers,
        ..
    } = resources;
    let framebuffer = resolve(framebuffers, target.framebuffer, "framebuffer");
    let render_pass = resolve(render_passes, target.render_pass, "render pass");

    for (&view, attachment) in framebuffer
        .color_attachments
        .iter()
        .zip(&render_pass.color_attachments)
    {
        let image = resolve(image_views, view, "image view").desc.image;
        barriers.access_image(
            resolve_mut(images, image, "image"),
            &classify::color_attachment_access(attachment),
        );
    }

    if let (Some(view), Some(attachment)) = (
        framebuffer.depth_stencil_attachment,
        render_pass.depth_stencil_attachment.as_ref(),
    ) {
        let image = resolve(image_views, view, "image view").desc.image;
        barriers.access_image(
            resolve_mut(images, image, "image"),
            &classify::depth_stencil_attachment_access(attachment),
        );
    }
}

impl<'a, B: Backend> Encoder<'a, B> {
    fn push_command(&mut self, command: Command) {
        let commands = &mut self.encoder.render.commands;
        match commands.try_reserve(1) {
            Ok(()) => commands.push(command),
            Err(_) => self.encoder.latch(crate::error::Status::OutOfHostMemory),
        }
    }

    fn push_args<T: Arg>(&mut self, data: &[T]) -> Option<ArgSlice<T>> {
        match self.encoder.render.arg_pool.push(data) {
            Ok(slice) => Some(slice),
            Err(status) => {
                self.encoder.latch(status);
                None
            }
        }
    }

    pub fn begin_render_pass(&mut self, info: &RenderPassBeginInfo<'_>) {
        assert!(
            self.encoder.state == EncoderState::Recording,
            "begin_render_pass requires encoder state Recording, found {:?}",
            self.encoder.state
        );
        validate_begin(self.resources, info);
        self.encoder.state = EncoderState::RenderPass;
        self.encoder.render.reset();
        if self.encoder.status.is_some() {
            return;
        }

        let render = &mut self.encoder.render;
        if render
            .color_clear_values
            .try_reserve(info.color_clear_values.len())
            .is_err()
        {
            self.encoder.latch(crate::error::Status::OutOfHostMemory);
            return;
        }
        render
            .color_clear_values
            .extend_from_slice(info.color_clear_values);
        render.target = Some(PassTarget {
            framebuffer: info.framebuffer,
            render_pass: info.render_pass,
            render_area: info.render_area,
            depth_stencil_clear: info.depth_stencil_clear_value,
        });
    }

    pub fn bind_graphics_pipeline(&mut self, pipeline: GraphicsPipelineId) {
        encode_prelude!(self, EncoderState::RenderPass, "bind_graphics_pipeline");
        let pipeline_pass = self.resources.graphics_pipeline(pipeline).render_pass;
        if let Some(target) = self.encoder.render.target {
            let current = self.resources.render_pass(target.render_pass);
            assert!(
                current.is_compatible(self.resources.render_pass(pipeline_pass)),
                "graphics pipeline was created for an incompatible render pass"
            );
        }
        self.encoder.render.pipeline = Some(pipeline);
        self.push_command(Command::BindPipeline(pipeline));
    }

    pub(super) fn record_descriptor_sets(
        &mut self,
        sets: &[DescriptorSetId],
        dynamic_offsets: &[u32],
    ) {
        encode_prelude!(self, EncoderState::RenderPass, "bind_descriptor_sets");
        let Some(pipeline) = self.encoder.render.pipeline else {
            panic!("bind_descriptor_sets called with no graphics pipeline bound");
        };
        let num_sets = self.resources.graphics_pipeline(pipeline).num_sets;
        assert!(
            sets.len() as u32 <= num_sets,
            "bound {} descriptor sets but the pipeline layout declares {}",
            sets.len(),
            num_sets
        );
        assert_eq!(
            dynamic_offset_count(self.resources, sets),
            dynamic_offsets.len(),
            "dynamic offset count does not match the bound sets"
        );

        let Some(sets) = self.push_args(sets) else {
            return;
        };
        let Some(dynamic_offsets) = self.push_args(dynamic_offsets) else {
            return;
        };
        self.push_command(Command::BindDescriptorSets {
            sets,
            dynamic_offsets,
        });
    }

    pub(super) fn record_push_constants(&mut self, data: &[u8]) {
        encode_prelude!(self, EncoderState::RenderPass, "push_constants");
        let Some(pipeline) = self.encoder.render.pipeline else {
            panic!("push_constants called with no graphics pipeline bound");
        };
        check_push_constants(data, self.resources.graphics_pipeline(pipeline).push_constants_size);

        if let Some(bytes) = self.push_args(data) {
            self.push_command(Command::PushConstants(bytes));
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        encode_prelude!(self, EncoderState::RenderPass, "set_viewport");
        self.push_command(Command::SetViewport(viewport));
    }

    pub fn set_scissor(&mut self, scissor: vk::Rect2D) {
        encode_prelude!(self, EncoderState::RenderPass, "set_scissor");
        self.push_command(Command::SetScissor(scissor));
    }

    pub fn set_blend_constant(&mut self, constant: Vec4) {
        encode_prelude!(self, EncoderState::RenderPass, "set_blend_constant");
        self.push_command(Command::SetBlendConstant(constant));
    }

    pub fn set_stencil_compare_mask(&mut self, faces: vk::StencilFaceFlags, mask: u32) {
        encode_prelude!(self, EncoderState::RenderPass, "set_stencil_compare_mask");
        self.push_command(Command::SetStencilCompareMask { faces, mask });
    }

    pub fn set_stencil_reference(&mut self, faces: vk::StencilFaceFlags, reference: u32) {
        encode_prelude!(self, EncoderState::RenderPass, "set_stencil_reference");
        self.push_command(Command::SetStencilReference { faces, reference });
    }

    pub fn set_stencil_write_mask(&mut self, faces: vk::StencilFaceFlags, mask: u32) {
        encode_prelude!(self, EncoderState::RenderPass, "set_stencil_write_mask");
        self.push_command(Command::SetStencilWriteMask { faces, mask });
    }

    /// Bind vertex buffers starting at binding 0
    pub fn bind_vertex_buffers(&mut self, buffers: &[BufferId], offsets: &[u64]) {
        encode_prelude!(self, EncoderState::RenderPass, "bind_vertex_buffers");
        assert!(!buffers.is_empty(), "bind_vertex_buffers needs at least one buffer");
        assert_eq!(
            buffers.len(),
            offsets.len(),
            "one offset is required per vertex buffer"
        );
        for &id in buffers {
            let buffer = self.resources.buffer(id);
            assert!(
                buffer.desc.usage.contains(vk::BufferUsageFlags::VERTEX_BUFFER),
                "vertex buffer '{}' lacks VERTEX_BUFFER usage",
                buffer.desc.label
            );
        }

        let Some(buffers) = self.push_args(buffers) else {
            return;
        };
        let Some(offsets) = self.push_args(offsets) else {
            return;
        };
        self.push_command(Command::BindVertexBuffers { buffers, offsets });
    }

    pub fn bind_index_buffer(&mut self, buffer: BufferId, offset: u64, index_type: vk::IndexType) {
        encode_prelude!(self, EncoderState::RenderPass, "bind_index_buffer");
        let index = self.resources.buffer(buffer);
        assert!(
            index.desc.usage.contains(vk::BufferUsageFlags::INDEX_BUFFER),
            "index buffer '{}' lacks INDEX_BUFFER usage",
            index.desc.label
        );
        self.encoder.render.index_buffer = Some(buffer);
        self.push_command(Command::BindIndexBuffer {
            buffer,
            offset,
            index_type,
        });
    }

    fn assert_pipeline_bound(&self, call: &str) {
        assert!(
            self.encoder.render.pipeline.is_some(),
            "{} called with no graphics pipeline bound",
            call
        );
    }

    fn assert_indirect_buffer(&self, buffer: BufferId) {
        let indirect = self.resources.buffer(buffer);
        assert!(
            indirect.desc.usage.contains(vk::BufferUsageFlags::INDIRECT_BUFFER),
            "indirect buffer '{}' lacks INDIRECT_BUFFER usage",
            indirect.desc.label
        );
    }

    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        encode_prelude!(self, EncoderState::RenderPass, "draw");
        self.assert_pipeline_bound("draw");
        self.push_command(Command::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        encode_prelude!(self, EncoderState::RenderPass, "draw_indexed");
        self.assert_pipeline_bound("draw_indexed");
        assert!(
            self.encoder.render.index_buffer.is_some(),
            "draw_indexed called with no index buffer bound"
        );
        self.push_command(Command::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }

    pub fn draw_indirect(&mut self, buffer: BufferId, offset: u64, draw_count: u32, stride: u32) {
        encode_prelude!(self, EncoderState::RenderPass, "draw_indirect");
        self.assert_pipeline_bound("draw_indirect");
        self.assert_indirect_buffer(buffer);
        self.push_command(Command::DrawIndirect {
            buffer,
            offset,
            draw_count,
            stride,
        });
    }

    pub fn draw_indexed_indirect(
        &mut self,
        buffer: BufferId,
        offset: u64,
        draw_count: u32,
        stride: u32,
    ) {
        encode_prelude!(self, EncoderState::RenderPass, "draw_indexed_indirect");
        self.assert_pipeline_bound("draw_indexed_indirect");
        assert!(
            self.encoder.render.index_buffer.is_some(),
            "draw_indexed_indirect called with no index buffer bound"
        );
        self.assert_indirect_buffer(buffer);
        self.push_command(Command::DrawIndexedIndirect {
            buffer,
            offset,
            draw_count,
            stride,
        });
    }

    /// Sync the pass's resources, then replay the recorded commands natively
    pub fn end_render_pass(&mut self) {
        assert!(
            self.encoder.state == EncoderState::RenderPass,
            "end_render_pass called outside a render pass"
        );
        self.encoder.state = EncoderState::Recording;

        let backend = &mut *self.backend;
        let resources = &mut *self.resources;
        let CommandEncoder {
            command_buffer,
            status,
            render,
            barriers,
            ..
        } = &mut *self.encoder;
        let cb = *command_buffer;

        let target = match (status.is_some(), render.target) {
            (false, Some(target)) => target,
            _ => {
                render.reset();
                return;
            }
        };
        let RenderPassContext {
            color_clear_values,
            commands,
            arg_pool,
            native_clear_values,
            native_sets,
            native_buffers,
            synced_sets,
            ..
        } = &mut *render;

        // Barrier pass: everything the pass reads or writes, merged into one barrier
        barriers.clear();
        synced_sets.clear();
        for command in commands.iter() {
            match *command {
                Command::BindDescriptorSets { sets, .. } => {
                    // Rebinding a set inside the pass needs no second dependency
                    for &set in arg_pool.get(sets) {
                        if synced_sets.contains(&set) {
                            continue;
                        }
                        synced_sets.push(set);
                        sync_descriptor_set(resources, barriers, set, PassKind::Graphics);
                    }
                }
                Command::BindVertexBuffers { buffers, .. } => {
                    for &buffer in arg_pool.get(buffers) {
                        barriers.access_buffer(
                            resources.buffer_mut(buffer),
                            &classify::VERTEX_BUFFER_ACCESS,
                        );
                    }
                }
                Command::BindIndexBuffer { buffer, .. } => {
                    barriers.access_buffer(
                        resources.buffer_mut(buffer),
                        &classify::INDEX_BUFFER_ACCESS,
                    );
                }
                Command::DrawIndirect { buffer, .. }
                | Command::DrawIndexedIndirect { buffer, .. } => {
                    barriers.access_buffer(
                        resources.buffer_mut(buffer),
                        &classify::INDIRECT_BUFFER_ACCESS,
                    );
                }
                _ => {}
            }
        }
        sync_attachments(resources, barriers, &target);

        if !barriers.is_empty() {
            log::trace!(
                "Render pass barrier {:?} -> {:?} ({} buffers, {} images)",
                barriers.src_stages,
                barriers.dst_stages,
                barriers.buffers.len(),
                barriers.images.len()
            );
            backend.cmd_pipeline_barrier(cb, barriers);
            barriers.clear();
        }

        let framebuffer = resources.framebuffer(target.framebuffer);
        let render_pass = resources.render_pass(target.render_pass);
        native_clear_values.clear();
        native_clear_values.extend(color_clear_values.iter().map(|color| vk::ClearValue {
            color: vk::ClearColorValue {
                float32: color.to_array(),
            },
        }));
        if framebuffer.depth_stencil_attachment.is_some()
            && render_pass.depth_stencil_attachment.is_some()
        {
            native_clear_values.push(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: target.depth_stencil_clear.depth,
                    stencil: target.depth_stencil_clear.stencil,
                },
            });
        }
        backend.cmd_begin_render_pass(
            cb,
            &NativeRenderPassBegin {
                render_pass: render_pass.vk,
                framebuffer: framebuffer.vk,
                render_area: target.render_area,
                clear_values: native_clear_values,
            },
        );

        // Replay pass, in recording order
        let mut layout = vk::PipelineLayout::null();
        for command in commands.iter() {
            match *command {
                Command::BindPipeline(id) => {
                    let pipeline = resources.graphics_pipeline(id);
                    layout = pipeline.layout;
                    backend.cmd_bind_pipeline(cb, vk::PipelineBindPoint::GRAPHICS, pipeline.vk);
                }
                Command::BindDescriptorSets {
                    sets,
                    dynamic_offsets,
                } => {
                    native_sets.clear();
                    native_sets.extend(
                        arg_pool
                            .get(sets)
                            .iter()
                            .map(|&set| resources.descriptor_set(set).vk),
                    );
                    backend.cmd_bind_descriptor_sets(
                        cb,
                        vk::PipelineBindPoint::GRAPHICS,
                        layout,
                        native_sets,
                        arg_pool.get(dynamic_offsets),
                    );
                }
                Command::PushConstants(bytes) => {
                    backend.cmd_push_constants(cb, layout, arg_pool.get(bytes));
                }
                Command::SetViewport(viewport) => backend.cmd_set_viewport(cb, viewport.to_vk()),
                Command::SetScissor(scissor) => backend.cmd_set_scissor(cb, scissor),
                Command::SetBlendConstant(constant) => {
                    backend.cmd_set_blend_constants(cb, constant.to_array())
                }
                Command::SetStencilCompareMask { faces, mask } => {
                    backend.cmd_set_stencil_compare_mask(cb, faces, mask)
                }
                Command::SetStencilReference { faces, reference } => {
                    backend.cmd_set_stencil_reference(cb, faces, reference)
                }
                Command::SetStencilWriteMask { faces, mask } => {
                    backend.cmd_set_stencil_write_mask(cb, faces, mask)
                }
                Command::BindVertexBuffers { buffers, offsets } => {
                    native_buffers.clear();
                    native_buffers.extend(
                        arg_pool
                            .get(buffers)
                            .iter()
                            .map(|&buffer| resources.buffer(buffer).vk),
                    );
                    backend.cmd_bind_vertex_buffers(cb, 0, native_buffers, arg_pool.get(offsets));
                }
                Command::BindIndexBuffer {
                    buffer,
                    offset,
                    index_type,
                } => {
                    backend.cmd_bind_index_buffer(cb, resources.buffer(buffer).vk, offset, index_type)
                }
                Command::Draw {
                    vertex_count,
                    instance_count,
                    first_vertex,
                    first_instance,
                } => backend.cmd_draw(cb, vertex_count, instance_count, first_vertex, first_instance),
                Command::DrawIndexed {
                    index_count,
                    instance_count,
                    first_index,
                    vertex_offset,
                    first_instance,
                } => backend.cmd_draw_indexed(
                    cb,
                    index_count,
                    instance_count,
                    first_index,
                    vertex_offset,
                    first_instance,
                ),
                Command::DrawIndirect {
                    buffer,
                    offset,
                    draw_count,
                    stride,
                } => backend.cmd_draw_indirect(
                    cb,
                    resources.buffer(buffer).vk,
                    offset,
                    draw_count,
                    stride,
                ),
                Command::DrawIndexedIndirect {
                    buffer,
                    offset,
                    draw_count,
                    stride,
                } => backend.cmd_draw_indexed_indirect(
                    cb,
                    resources.buffer(buffer).vk,
                    offset,
                    draw_count,
                    stride,
                ),
            }
        }
        backend.cmd_end_render_pass(cb);

        render.reset();
    }
}
