// Command encoder
//
// One `CommandEncoder` per buffered frame owns a native command buffer plus
// the bookkeeping needed to record into it. Recording goes through the
// short-lived `Encoder` view returned by `Device::encoder`, which borrows the
// device's backend and resource arenas for the duration of the recording.
//
// Transfer commands and compute dispatches synchronize immediately: the
// operands are run through the access tracker, the merged barrier is emitted,
// then the command. Render pass commands are deferred (see `render_pass`).

pub mod command;
mod render_pass;

use ash::vk;
use glam::Vec4;

use crate::backend::Backend;
use crate::error::{Result, Status};
use crate::resources::{
    resolve, resolve_mut, BindingResources, BufferId, ComputePipelineId, DescriptorSetId,
    ImageId, Resources,
};
use crate::sync::classify::{self, PassKind};
use crate::sync::{AccessRequest, BarrierBatch};
use crate::types::{DescriptorType, MAX_UPDATE_BUFFER_SIZE};

pub use command::{ArgPool, ArgSlice, Command};
pub use render_pass::RenderPassContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Reset,
    Recording,
    RenderPass,
    ComputePass,
    End,
}

/// Bail out of a recording call: panics on a sequencing violation, returns
/// quietly once the encoder has latched an error.
macro_rules! encode_prelude {
    ($self:ident, $state:expr, $call:literal) => {
        assert!(
            $self.encoder.state == $state,
            concat!($call, " requires encoder state {:?}, found {:?}"),
            $state,
            $self.encoder.state
        );
        if $self.encoder.status.is_some() {
            return;
        }
    };
}

pub(crate) use encode_prelude;

#[derive(Default)]
pub struct ComputePassContext {
    pub pipeline: Option<ComputePipelineId>,
    pub descriptor_sets: Vec<DescriptorSetId>,
}

impl ComputePassContext {
    fn reset(&mut self) {
        self.pipeline = None;
        self.descriptor_sets.clear();
    }
}

pub struct CommandEncoder {
    pub(crate) command_pool: vk::CommandPool,
    pub(crate) command_buffer: vk::CommandBuffer,
    pub(crate) status: Option<Status>,
    pub(crate) state: EncoderState,
    pub(crate) render: RenderPassContext,
    pub(crate) compute: ComputePassContext,
    pub(crate) barriers: BarrierBatch,
    native_sets: Vec<vk::DescriptorSet>,
}

impl CommandEncoder {
    pub(crate) fn new(
        command_pool: vk::CommandPool,
        command_buffer: vk::CommandBuffer,
        arg_pool_capacity: usize,
    ) -> Self {
        Self {
            command_pool,
            command_buffer,
            status: None,
            state: EncoderState::Reset,
            render: RenderPassContext::new(arg_pool_capacity),
            compute: ComputePassContext::default(),
            barriers: BarrierBatch::default(),
            native_sets: Vec::new(),
        }
    }

    pub fn state(&self) -> EncoderState {
        self.state
    }

    pub fn status(&self) -> Result<()> {
        match self.status {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(
            self.state,
            EncoderState::Recording | EncoderState::RenderPass | EncoderState::ComputePass
        )
    }

    /// Clear every per-frame context ahead of a new recording
    pub(crate) fn reset(&mut self) {
        self.status = None;
        self.state = EncoderState::Reset;
        self.render.reset();
        self.compute.reset();
        self.barriers.clear();
        self.native_sets.clear();
    }

    /// Record the first failure; later recording calls become no-ops
    pub(crate) fn latch(&mut self, status: Status) {
        if self.status.is_none() {
            log::warn!(
                "Command encoder failed with '{}', dropping the rest of this frame's commands",
                status
            );
            self.status = Some(status);
        }
    }
}

/// Run every resource bound in `set` through the tracker
pub(crate) fn sync_descriptor_set(
    resources: &mut Resources,
    barriers: &mut BarrierBatch,
    set: DescriptorSetId,
    pass: PassKind,
) {
    let Resources {
        buffers,
        buffer_views,
        images,
        image_views,
        descriptor_sets,
        ..
    } = resources;
    let set = resolve(descriptor_sets, set, "descriptor set");

    for binding in &set.bindings {
        let Some(request) = classify::descriptor_access(binding.ty, pass) else {
            continue;
        };
        match &binding.resources {
            BindingResources::Samplers => {}
            BindingResources::Buffers(ids) => {
                for &id in ids.iter().flatten() {
                    barriers.access_buffer(resolve_mut(buffers, id, "buffer"), &request);
                }
            }
            BindingResources::TexelBuffers(ids) => {
                for &id in ids.iter().flatten() {
                    let buffer = resolve(buffer_views, id, "buffer view").desc.buffer;
                    barriers.access_buffer(resolve_mut(buffers, buffer, "buffer"), &request);
                }
            }
            BindingResources::Images(ids) => {
                for &id in ids.iter().flatten() {
                    let image = resolve(image_views, id, "image view").desc.image;
                    barriers.access_image(resolve_mut(images, image, "image"), &request);
                }
            }
        }
    }
}

/// Number of dynamic offsets a list of sets consumes
pub(crate) fn dynamic_offset_count(resources: &Resources, sets: &[DescriptorSetId]) -> usize {
    sets.iter()
        .flat_map(|&set| &resources.descriptor_set(set).bindings)
        .filter(|binding| {
            matches!(
                binding.ty,
                DescriptorType::DynamicUniformBuffer | DescriptorType::DynamicStorageBuffer
            )
        })
        .map(|binding| binding.count as usize)
        .sum()
}

/// Recording view over one frame's command encoder
pub struct Encoder<'a, B: Backend> {
    pub(crate) backend: &'a mut B,
    pub(crate) resources: &'a mut Resources,
    pub(crate) encoder: &'a mut CommandEncoder,
}

impl<'a, B: Backend> Encoder<'a, B> {
    pub fn state(&self) -> EncoderState {
        self.encoder.state
    }

    /// Sticky status of this frame's recording
    pub fn status(&self) -> Result<()> {
        self.encoder.status()
    }

    fn flush_barriers(&mut self) {
        let barriers = &mut self.encoder.barriers;
        if barriers.is_empty() {
            return;
        }
        log::trace!(
            "Barrier {:?} -> {:?} ({} buffers, {} images)",
            barriers.src_stages,
            barriers.dst_stages,
            barriers.buffers.len(),
            barriers.images.len()
        );
        self.backend
            .cmd_pipeline_barrier(self.encoder.command_buffer, barriers);
        barriers.clear();
    }

    fn sync_buffer(&mut self, buffer: BufferId, request: &AccessRequest) {
        let buffer = self.resources.buffer_mut(buffer);
        self.encoder.barriers.access_buffer(buffer, request);
    }

    fn sync_image(&mut self, image: ImageId, request: &AccessRequest) {
        let image = self.resources.image_mut(image);
        self.encoder.barriers.access_image(image, request);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // DEBUG MARKERS
    // ─────────────────────────────────────────────────────────────────────────

    pub fn begin_debug_marker(&mut self, name: &str, color: Vec4) {
        encode_prelude!(self, EncoderState::Recording, "begin_debug_marker");
        self.backend
            .cmd_begin_debug_marker(self.encoder.command_buffer, name, color.to_array());
    }

    pub fn end_debug_marker(&mut self) {
        encode_prelude!(self, EncoderState::Recording, "end_debug_marker");
        self.backend.cmd_end_debug_marker(self.encoder.command_buffer);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // TRANSFER
    // ─────────────────────────────────────────────────────────────────────────

    pub fn fill_buffer(&mut self, dst: BufferId, offset: u64, size: u64, data: u32) {
        encode_prelude!(self, EncoderState::Recording, "fill_buffer");
        let buffer = self.resources.buffer(dst);
        assert!(
            buffer.desc.usage.contains(vk::BufferUsageFlags::TRANSFER_DST),
            "fill_buffer target '{}' lacks TRANSFER_DST usage",
            buffer.desc.label
        );
        assert!(offset % 4 == 0, "fill_buffer offset must be a multiple of 4");
        assert!(
            size == vk::WHOLE_SIZE || (size % 4 == 0 && offset + size <= buffer.desc.size),
            "fill_buffer range out of bounds"
        );
        let native = buffer.vk;

        self.sync_buffer(dst, &classify::TRANSFER_DST_BUFFER);
        self.flush_barriers();
        self.backend
            .cmd_fill_buffer(self.encoder.command_buffer, native, offset, size, data);
    }

    pub fn copy_buffer(&mut self, src: BufferId, dst: BufferId, regions: &[vk::BufferCopy]) {
        encode_prelude!(self, EncoderState::Recording, "copy_buffer");
        assert!(!regions.is_empty(), "copy_buffer needs at least one region");
        let src_buffer = self.resources.buffer(src);
        let dst_buffer = self.resources.buffer(dst);
        assert!(
            src_buffer.desc.usage.contains(vk::BufferUsageFlags::TRANSFER_SRC),
            "copy_buffer source '{}' lacks TRANSFER_SRC usage",
            src_buffer.desc.label
        );
        assert!(
            dst_buffer.desc.usage.contains(vk::BufferUsageFlags::TRANSFER_DST),
            "copy_buffer destination '{}' lacks TRANSFER_DST usage",
            dst_buffer.desc.label
        );
        for region in regions {
            assert!(
                region.src_offset + region.size <= src_buffer.desc.size
                    && region.dst_offset + region.size <= dst_buffer.desc.size,
                "copy_buffer region out of bounds"
            );
        }
        let (src_native, dst_native) = (src_buffer.vk, dst_buffer.vk);

        self.sync_buffer(src, &classify::TRANSFER_SRC_BUFFER);
        self.sync_buffer(dst, &classify::TRANSFER_DST_BUFFER);
        self.flush_barriers();
        self.backend
            .cmd_copy_buffer(self.encoder.command_buffer, src_native, dst_native, regions);
    }

    pub fn update_buffer(&mut self, dst: BufferId, offset: u64, data: &[u8]) {
        encode_prelude!(self, EncoderState::Recording, "update_buffer");
        let buffer = self.resources.buffer(dst);
        assert!(
            buffer.desc.usage.contains(vk::BufferUsageFlags::TRANSFER_DST),
            "update_buffer target '{}' lacks TRANSFER_DST usage",
            buffer.desc.label
        );
        assert!(
            data.len() <= MAX_UPDATE_BUFFER_SIZE && data.len() % 4 == 0 && offset % 4 == 0,
            "update_buffer payload must be at most {} bytes and 4-byte aligned",
            MAX_UPDATE_BUFFER_SIZE
        );
        assert!(
            offset + data.len() as u64 <= buffer.desc.size,
            "update_buffer range out of bounds"
        );
        let native = buffer.vk;

        self.sync_buffer(dst, &classify::TRANSFER_DST_BUFFER);
        self.flush_barriers();
        self.backend
            .cmd_update_buffer(self.encoder.command_buffer, native, offset, data);
    }

    /// Clear every mip and layer of a color image
    pub fn clear_color_image(&mut self, dst: ImageId, color: Vec4) {
        encode_prelude!(self, EncoderState::Recording, "clear_color_image");
        let image = self.resources.image(dst);
        assert!(
            image.desc.usage.contains(vk::ImageUsageFlags::TRANSFER_DST),
            "clear_color_image target '{}' lacks TRANSFER_DST usage",
            image.desc.label
        );
        assert!(
            image.desc.aspects == vk::ImageAspectFlags::COLOR,
            "clear_color_image target must be a color image"
        );
        let (native, aspects) = (image.vk, image.desc.aspects);

        self.sync_image(dst, &classify::TRANSFER_DST_IMAGE);
        self.flush_barriers();
        self.backend.cmd_clear_color_image(
            self.encoder.command_buffer,
            native,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            color.to_array(),
            aspects,
        );
    }

    pub fn copy_buffer_to_image(
        &mut self,
        src: BufferId,
        dst: ImageId,
        regions: &[vk::BufferImageCopy],
    ) {
        encode_prelude!(self, EncoderState::Recording, "copy_buffer_to_image");
        assert!(!regions.is_empty(), "copy_buffer_to_image needs at least one region");
        let src_buffer = self.resources.buffer(src);
        let dst_image = self.resources.image(dst);
        assert!(
            src_buffer.desc.usage.contains(vk::BufferUsageFlags::TRANSFER_SRC),
            "copy_buffer_to_image source '{}' lacks TRANSFER_SRC usage",
            src_buffer.desc.label
        );
        assert!(
            dst_image.desc.usage.contains(vk::ImageUsageFlags::TRANSFER_DST),
            "copy_buffer_to_image destination '{}' lacks TRANSFER_DST usage",
            dst_image.desc.label
        );
        let (src_native, dst_native) = (src_buffer.vk, dst_image.vk);

        self.sync_buffer(src, &classify::TRANSFER_SRC_BUFFER);
        self.sync_image(dst, &classify::TRANSFER_DST_IMAGE);
        self.flush_barriers();
        self.backend.cmd_copy_buffer_to_image(
            self.encoder.command_buffer,
            src_native,
            dst_native,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            regions,
        );
    }

    pub fn blit_image(
        &mut self,
        src: ImageId,
        dst: ImageId,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        encode_prelude!(self, EncoderState::Recording, "blit_image");
        assert!(src != dst, "blit_image source and destination must differ");
        assert!(!regions.is_empty(), "blit_image needs at least one region");
        let src_image = self.resources.image(src);
        let dst_image = self.resources.image(dst);
        assert!(
            src_image.desc.usage.contains(vk::ImageUsageFlags::TRANSFER_SRC),
            "blit_image source '{}' lacks TRANSFER_SRC usage",
            src_image.desc.label
        );
        assert!(
            dst_image.desc.usage.contains(vk::ImageUsageFlags::TRANSFER_DST),
            "blit_image destination '{}' lacks TRANSFER_DST usage",
            dst_image.desc.label
        );
        let (src_native, dst_native) = (src_image.vk, dst_image.vk);

        self.sync_image(src, &classify::TRANSFER_SRC_IMAGE);
        self.sync_image(dst, &classify::TRANSFER_DST_IMAGE);
        self.flush_barriers();
        self.backend.cmd_blit_image(
            self.encoder.command_buffer,
            src_native,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            dst_native,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            regions,
            filter,
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // COMPUTE PASS
    // ─────────────────────────────────────────────────────────────────────────

    pub fn begin_compute_pass(&mut self) {
        assert!(
            self.encoder.state == EncoderState::Recording,
            "begin_compute_pass requires encoder state Recording, found {:?}",
            self.encoder.state
        );
        self.encoder.state = EncoderState::ComputePass;
        self.encoder.compute.reset();
    }

    pub fn end_compute_pass(&mut self) {
        assert!(
            self.encoder.state == EncoderState::ComputePass,
            "end_compute_pass called outside a compute pass"
        );
        self.encoder.state = EncoderState::Recording;
        self.encoder.compute.reset();
    }

    pub fn bind_compute_pipeline(&mut self, pipeline: ComputePipelineId) {
        encode_prelude!(self, EncoderState::ComputePass, "bind_compute_pipeline");
        let native = self.resources.compute_pipeline(pipeline).vk;
        self.encoder.compute.pipeline = Some(pipeline);
        self.encoder.compute.descriptor_sets.clear();
        self.backend.cmd_bind_pipeline(
            self.encoder.command_buffer,
            vk::PipelineBindPoint::COMPUTE,
            native,
        );
    }

    /// Bind descriptor sets starting at set 0 of the bound pipeline's layout
    pub fn bind_descriptor_sets(&mut self, sets: &[DescriptorSetId], dynamic_offsets: &[u32]) {
        match self.encoder.state {
            EncoderState::ComputePass => self.bind_compute_descriptor_sets(sets, dynamic_offsets),
            EncoderState::RenderPass => self.record_descriptor_sets(sets, dynamic_offsets),
            state => panic!("bind_descriptor_sets called outside a pass (state {:?})", state),
        }
    }

    fn bind_compute_descriptor_sets(&mut self, sets: &[DescriptorSetId], dynamic_offsets: &[u32]) {
        encode_prelude!(self, EncoderState::ComputePass, "bind_descriptor_sets");
        let Some(pipeline) = self.encoder.compute.pipeline else {
            panic!("bind_descriptor_sets called with no compute pipeline bound");
        };
        let pipeline = self.resources.compute_pipeline(pipeline);
        assert!(
            sets.len() as u32 <= pipeline.num_sets,
            "bound {} descriptor sets but the pipeline layout declares {}",
            sets.len(),
            pipeline.num_sets
        );
        assert_eq!(
            dynamic_offset_count(self.resources, sets),
            dynamic_offsets.len(),
            "dynamic offset count does not match the bound sets"
        );
        let layout = pipeline.layout;

        let native_sets = &mut self.encoder.native_sets;
        native_sets.clear();
        native_sets.extend(sets.iter().map(|&set| self.resources.descriptor_set(set).vk));
        self.encoder.compute.descriptor_sets.clear();
        self.encoder.compute.descriptor_sets.extend_from_slice(sets);

        self.backend.cmd_bind_descriptor_sets(
            self.encoder.command_buffer,
            vk::PipelineBindPoint::COMPUTE,
            layout,
            &self.encoder.native_sets,
            dynamic_offsets,
        );
    }

    pub fn push_constants(&mut self, data: &[u8]) {
        match self.encoder.state {
            EncoderState::ComputePass => self.push_compute_constants(data),
            EncoderState::RenderPass => self.record_push_constants(data),
            state => panic!("push_constants called outside a pass (state {:?})", state),
        }
    }

    fn push_compute_constants(&mut self, data: &[u8]) {
        encode_prelude!(self, EncoderState::ComputePass, "push_constants");
        let Some(pipeline) = self.encoder.compute.pipeline else {
            panic!("push_constants called with no compute pipeline bound");
        };
        let pipeline = self.resources.compute_pipeline(pipeline);
        check_push_constants(data, pipeline.push_constants_size);
        self.backend
            .cmd_push_constants(self.encoder.command_buffer, pipeline.layout, data);
    }

    /// Sync everything the bound sets touch, then emit the merged barrier
    fn sync_compute_bindings(&mut self) {
        let CommandEncoder {
            compute, barriers, ..
        } = &mut *self.encoder;
        for &set in &compute.descriptor_sets {
            sync_descriptor_set(self.resources, barriers, set, PassKind::Compute);
        }
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        encode_prelude!(self, EncoderState::ComputePass, "dispatch");
        assert!(
            self.encoder.compute.pipeline.is_some(),
            "dispatch called with no compute pipeline bound"
        );
        self.sync_compute_bindings();
        self.flush_barriers();
        self.backend
            .cmd_dispatch(self.encoder.command_buffer, x, y, z);
    }

    pub fn dispatch_indirect(&mut self, buffer: BufferId, offset: u64) {
        encode_prelude!(self, EncoderState::ComputePass, "dispatch_indirect");
        assert!(
            self.encoder.compute.pipeline.is_some(),
            "dispatch_indirect called with no compute pipeline bound"
        );
        let indirect = self.resources.buffer(buffer);
        assert!(
            indirect.desc.usage.contains(vk::BufferUsageFlags::INDIRECT_BUFFER),
            "dispatch_indirect buffer '{}' lacks INDIRECT_BUFFER usage",
            indirect.desc.label
        );
        let native = indirect.vk;

        self.sync_compute_bindings();
        self.sync_buffer(buffer, &classify::INDIRECT_BUFFER_ACCESS);
        self.flush_barriers();
        self.backend
            .cmd_dispatch_indirect(self.encoder.command_buffer, native, offset);
    }
}

pub(crate) fn check_push_constants(data: &[u8], range: u32) {
    assert!(
        data.len() as u32 <= range,
        "push constant data ({} bytes) exceeds the pipeline's range ({} bytes)",
        data.len(),
        range
    );
    assert!(data.len() % 4 == 0, "push constant data must be a multiple of 4 bytes");
}
