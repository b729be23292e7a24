// Device - facade over a backend, its objects and the frame ring
//
// Responsibilities:
// - Creation and destruction of every GPU object, returned as generational ids
// - Deferred destruction of released objects once no frame in flight can use them
// - Frame begin/submit, including swapchain acquire, recreation and present
// - Handing out the `Encoder` for the open frame

use ash::vk;

use crate::backend::{Backend, NativeShaderStage, NativeSwapchain, Submission};
use crate::descriptor::{DescriptorHeap, HeapStats};
use crate::encoder::{Encoder, EncoderState};
use crate::error::{Result, Status};
use crate::frame::{FrameContext, ReleaseQueue, Released};
use crate::resources::{
    Buffer, BufferId, BufferView, BufferViewId, ComputePipeline, ComputePipelineId,
    DescriptorSetId, DescriptorSetLayoutId, Framebuffer, FramebufferId, GraphicsPipeline,
    GraphicsPipelineId, Image, ImageId, ImageView, ImageViewId, RenderPass, RenderPassId,
    Resources, Sampler, SamplerId, Shader, ShaderId, Swapchain, SwapchainId,
};
use crate::sync::{classify, BufferState, ImageState};
use crate::types::{
    BufferDesc, BufferViewDesc, ComputePipelineDesc, DescriptorSetLayoutDesc,
    DescriptorSetUpdate, FrameInfo, FramebufferDesc, GraphicsPipelineDesc, ImageDesc,
    ImageViewDesc, RenderPassDesc, SamplerDesc, ShaderDesc, SwapchainDesc, SwapchainState,
};

/// Sizing knobs fixed at device creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSettings {
    /// Frames that may be in flight at once (ring depth)
    pub buffering: u32,
    /// Descriptors per type, and sets, in each new descriptor pool
    pub descriptor_pool_size: u32,
    /// Byte budget of each encoder's render pass argument arena
    pub arg_pool_capacity: usize,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            buffering: 2,
            descriptor_pool_size: 1024,
            arg_pool_capacity: 64 * 1024,
        }
    }
}

pub struct Device<B: Backend> {
    backend: B,
    resources: Resources,
    heap: DescriptorHeap,
    frames: FrameContext,
    releases: ReleaseQueue,
}

impl<B: Backend> Device<B> {
    pub fn new(mut backend: B, settings: &DeviceSettings) -> Result<Self> {
        log::info!(
            "Creating {:?} device (buffering {}, descriptor pool size {})",
            backend.kind(),
            settings.buffering,
            settings.descriptor_pool_size
        );
        let frames = FrameContext::new(
            &mut backend,
            settings.buffering,
            settings.arg_pool_capacity,
        )?;

        Ok(Self {
            backend,
            resources: Resources::default(),
            heap: DescriptorHeap::new(settings.descriptor_pool_size),
            frames,
            releases: ReleaseQueue::default(),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Read access to object records and their tracker state
    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    // ─────────────────────────────────────────────────────────────────────────
    // BUFFERS & IMAGES
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_buffer(&mut self, desc: &BufferDesc) -> Result<BufferId> {
        assert!(desc.size > 0, "buffer '{}' has zero size", desc.label);
        assert!(!desc.usage.is_empty(), "buffer '{}' has no usage flags", desc.label);

        let vk = self.backend.create_buffer(desc)?;
        Ok(self.resources.buffers.insert(Buffer {
            desc: desc.clone(),
            vk,
            state: BufferState::default(),
        }))
    }

    /// Destroy now; the caller guarantees no frame in flight uses it
    pub fn destroy_buffer(&mut self, id: BufferId) {
        let Some(buffer) = self.resources.buffers.remove(id) else {
            panic!("stale or invalid buffer handle {:?}", id);
        };
        self.backend.destroy_buffer(buffer.vk);
    }

    /// Copy `data` into a host-mapped buffer
    pub fn write_buffer(&mut self, id: BufferId, offset: u64, data: &[u8]) -> Result<()> {
        let buffer = self.resources.buffer(id);
        assert!(
            buffer.desc.host_mapped,
            "write_buffer target '{}' is not host-mapped",
            buffer.desc.label
        );
        assert!(
            offset + data.len() as u64 <= buffer.desc.size,
            "write_buffer range {}..{} exceeds buffer '{}' ({} bytes)",
            offset,
            offset + data.len() as u64,
            buffer.desc.label,
            buffer.desc.size
        );
        self.backend.write_buffer(buffer.vk, offset, data)
    }

    pub fn create_buffer_view(&mut self, desc: &BufferViewDesc) -> Result<BufferViewId> {
        let buffer = self.resources.buffer(desc.buffer);
        assert!(
            buffer.desc.usage.intersects(
                vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER
                    | vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER
            ),
            "buffer '{}' has no texel buffer usage",
            buffer.desc.label
        );
        assert!(
            desc.offset + desc.size <= buffer.desc.size,
            "buffer view '{}' exceeds buffer '{}'",
            desc.label,
            buffer.desc.label
        );

        let vk = self.backend.create_buffer_view(buffer.vk, desc)?;
        Ok(self.resources.buffer_views.insert(BufferView {
            desc: desc.clone(),
            vk,
        }))
    }

    pub fn destroy_buffer_view(&mut self, id: BufferViewId) {
        let Some(view) = self.resources.buffer_views.remove(id) else {
            panic!("stale or invalid buffer view handle {:?}", id);
        };
        self.backend.destroy_buffer_view(view.vk);
    }

    pub fn create_image(&mut self, desc: &ImageDesc) -> Result<ImageId> {
        assert!(
            desc.extent.width > 0 && desc.extent.height > 0 && desc.extent.depth > 0,
            "image '{}' has a zero extent",
            desc.label
        );
        assert!(
            desc.mip_levels > 0 && desc.array_layers > 0,
            "image '{}' needs at least one mip level and layer",
            desc.label
        );
        assert!(!desc.usage.is_empty(), "image '{}' has no usage flags", desc.label);

        let vk = self.backend.create_image(desc)?;
        Ok(self.resources.images.insert(Image {
            desc: desc.clone(),
            vk,
            state: ImageState::default(),
            is_swapchain_image: false,
        }))
    }

    pub fn destroy_image(&mut self, id: ImageId) {
        assert!(
            !self.resources.image(id).is_swapchain_image,
            "swapchain images are owned by their swapchain"
        );
        let Some(image) = self.resources.images.remove(id) else {
            panic!("stale or invalid image handle {:?}", id);
        };
        self.backend.destroy_image(image.vk);
    }

    pub fn create_image_view(&mut self, desc: &ImageViewDesc) -> Result<ImageViewId> {
        let image = self.resources.image(desc.image);
        assert!(
            image.desc.aspects.contains(desc.aspects),
            "image view '{}' requests aspects {:?} missing from image '{}'",
            desc.label,
            desc.aspects,
            image.desc.label
        );

        let vk = self.backend.create_image_view(image.vk, desc)?;
        Ok(self.resources.image_views.insert(ImageView {
            desc: desc.clone(),
            vk,
        }))
    }

    pub fn destroy_image_view(&mut self, id: ImageViewId) {
        let Some(view) = self.resources.image_views.remove(id) else {
            panic!("stale or invalid image view handle {:?}", id);
        };
        self.backend.destroy_image_view(view.vk);
    }

    pub fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerId> {
        let vk = self.backend.create_sampler(desc)?;
        Ok(self.resources.samplers.insert(Sampler { vk }))
    }

    pub fn destroy_sampler(&mut self, id: SamplerId) {
        let Some(sampler) = self.resources.samplers.remove(id) else {
            panic!("stale or invalid sampler handle {:?}", id);
        };
        self.backend.destroy_sampler(sampler.vk);
    }

    pub fn create_shader(&mut self, desc: &ShaderDesc<'_>) -> Result<ShaderId> {
        assert!(
            !desc.spirv_code.is_empty(),
            "shader '{}' has no SPIR-V code",
            desc.label
        );
        let vk = self.backend.create_shader(desc.spirv_code)?;
        Ok(self.resources.shaders.insert(Shader { vk }))
    }

    pub fn destroy_shader(&mut self, id: ShaderId) {
        let Some(shader) = self.resources.shaders.remove(id) else {
            panic!("stale or invalid shader handle {:?}", id);
        };
        self.backend.destroy_shader(shader.vk);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // DESCRIPTORS
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_descriptor_set_layout(
        &mut self,
        desc: &DescriptorSetLayoutDesc<'_>,
    ) -> Result<DescriptorSetLayoutId> {
        self.heap
            .create_layout(&mut self.backend, &mut self.resources, desc)
    }

    pub fn destroy_descriptor_set_layout(&mut self, id: DescriptorSetLayoutId) {
        self.heap
            .destroy_layout(&mut self.backend, &mut self.resources, id);
    }

    /// `variable_lengths` holds one count per variable-length binding of `layout`
    pub fn create_descriptor_set(
        &mut self,
        layout: DescriptorSetLayoutId,
        variable_lengths: &[u32],
    ) -> Result<DescriptorSetId> {
        self.heap.allocate(
            &mut self.backend,
            &mut self.resources,
            layout,
            variable_lengths,
        )
    }

    pub fn destroy_descriptor_set(&mut self, id: DescriptorSetId) {
        self.heap
            .release(&mut self.backend, &mut self.resources, id);
    }

    pub fn update_descriptor_set(&mut self, update: &DescriptorSetUpdate<'_>) {
        self.heap
            .update(&mut self.backend, &mut self.resources, update);
    }

    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // RENDER PASSES & PIPELINES
    // ─────────────────────────────────────────────────────────────────────────

    pub fn create_render_pass(&mut self, desc: &RenderPassDesc<'_>) -> Result<RenderPassId> {
        assert!(
            !desc.color_attachments.is_empty() || desc.depth_stencil_attachment.is_some(),
            "render pass '{}' has no attachments",
            desc.label
        );
        let vk = self.backend.create_render_pass(desc)?;
        Ok(self.resources.render_passes.insert(RenderPass {
            vk,
            color_attachments: desc.color_attachments.to_vec(),
            depth_stencil_attachment: desc.depth_stencil_attachment,
        }))
    }

    pub fn destroy_render_pass(&mut self, id: RenderPassId) {
        let Some(render_pass) = self.resources.render_passes.remove(id) else {
            panic!("stale or invalid render pass handle {:?}", id);
        };
        self.backend.destroy_render_pass(render_pass.vk);
    }

    pub fn create_framebuffer(&mut self, desc: &FramebufferDesc<'_>) -> Result<FramebufferId> {
        let render_pass = self.resources.render_pass(desc.render_pass);
        assert_eq!(
            desc.color_attachments.len(),
            render_pass.color_attachments.len(),
            "framebuffer '{}' color attachment count does not match its render pass",
            desc.label
        );
        assert_eq!(
            desc.depth_stencil_attachment.is_some(),
            render_pass.depth_stencil_attachment.is_some(),
            "framebuffer '{}' depth attachment does not match its render pass",
            desc.label
        );
        assert!(
            desc.extent.width > 0 && desc.extent.height > 0 && desc.layers > 0,
            "framebuffer '{}' has a zero extent",
            desc.label
        );

        let attachments = desc
            .color_attachments
            .iter()
            .zip(&render_pass.color_attachments)
            .chain(
                desc.depth_stencil_attachment
                    .iter()
                    .zip(&render_pass.depth_stencil_attachment),
            );
        let mut views = Vec::with_capacity(desc.color_attachments.len() + 1);
        for (&view_id, attachment) in attachments {
            let view = self.resources.image_view(view_id);
            let image = self.resources.image(view.desc.image);
            assert_eq!(
                view.desc.format, attachment.format,
                "framebuffer '{}' attachment format does not match its render pass",
                desc.label
            );
            assert!(
                image.desc.extent.width >= desc.extent.width
                    && image.desc.extent.height >= desc.extent.height,
                "framebuffer '{}' is larger than attachment image '{}'",
                desc.label,
                image.desc.label
            );
            views.push(view.vk);
        }

        let vk = self
            .backend
            .create_framebuffer(render_pass.vk, &views, desc.extent, desc.layers)?;
        Ok(self.resources.framebuffers.insert(Framebuffer {
            vk,
            render_pass: desc.render_pass,
            extent: desc.extent,
            layers: desc.layers,
            color_attachments: desc.color_attachments.to_vec(),
            depth_stencil_attachment: desc.depth_stencil_attachment,
        }))
    }

    pub fn destroy_framebuffer(&mut self, id: FramebufferId) {
        let Some(framebuffer) = self.resources.framebuffers.remove(id) else {
            panic!("stale or invalid framebuffer handle {:?}", id);
        };
        self.backend.destroy_framebuffer(framebuffer.vk);
    }

    fn native_set_layouts(&self, layouts: &[DescriptorSetLayoutId]) -> Vec<vk::DescriptorSetLayout> {
        layouts
            .iter()
            .map(|&layout| self.resources.descriptor_set_layout(layout).vk)
            .collect()
    }

    pub fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDesc<'_>,
    ) -> Result<ComputePipelineId> {
        let module = self.resources.shader(desc.compute_shader.shader).vk;
        let set_layouts = self.native_set_layouts(desc.descriptor_set_layouts);

        let layout = self
            .backend
            .create_pipeline_layout(&set_layouts, desc.push_constants_size)?;
        let stage = NativeShaderStage {
            module,
            entry_point: desc.compute_shader.entry_point,
        };
        let vk = match self.backend.create_compute_pipeline(layout, stage) {
            Ok(pipeline) => pipeline,
            Err(err) => {
                self.backend.destroy_pipeline_layout(layout);
                return Err(err);
            }
        };

        log::debug!("Created compute pipeline '{}'", desc.label);
        Ok(self.resources.compute_pipelines.insert(ComputePipeline {
            vk,
            layout,
            push_constants_size: desc.push_constants_size,
            num_sets: set_layouts.len() as u32,
        }))
    }

    pub fn destroy_compute_pipeline(&mut self, id: ComputePipelineId) {
        let Some(pipeline) = self.resources.compute_pipelines.remove(id) else {
            panic!("stale or invalid compute pipeline handle {:?}", id);
        };
        self.backend.destroy_pipeline(pipeline.vk);
        self.backend.destroy_pipeline_layout(pipeline.layout);
    }

    pub fn create_graphics_pipeline(
        &mut self,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> Result<GraphicsPipelineId> {
        let render_pass = self.resources.render_pass(desc.render_pass);
        assert_eq!(
            desc.color_blend.len(),
            render_pass.color_attachments.len(),
            "graphics pipeline '{}' needs one blend state per color attachment",
            desc.label
        );
        let native_pass = render_pass.vk;
        let vertex = NativeShaderStage {
            module: self.resources.shader(desc.vertex_shader.shader).vk,
            entry_point: desc.vertex_shader.entry_point,
        };
        let fragment = NativeShaderStage {
            module: self.resources.shader(desc.fragment_shader.shader).vk,
            entry_point: desc.fragment_shader.entry_point,
        };
        let set_layouts = self.native_set_layouts(desc.descriptor_set_layouts);

        let layout = self
            .backend
            .create_pipeline_layout(&set_layouts, desc.push_constants_size)?;
        let vk = match self
            .backend
            .create_graphics_pipeline(layout, native_pass, vertex, fragment, desc)
        {
            Ok(pipeline) => pipeline,
            Err(err) => {
                self.backend.destroy_pipeline_layout(layout);
                return Err(err);
            }
        };

        log::debug!("Created graphics pipeline '{}'", desc.label);
        Ok(self.resources.graphics_pipelines.insert(GraphicsPipeline {
            vk,
            layout,
            render_pass: desc.render_pass,
            push_constants_size: desc.push_constants_size,
            num_sets: set_layouts.len() as u32,
        }))
    }

    pub fn destroy_graphics_pipeline(&mut self, id: GraphicsPipelineId) {
        let Some(pipeline) = self.resources.graphics_pipelines.remove(id) else {
            panic!("stale or invalid graphics pipeline handle {:?}", id);
        };
        self.backend.destroy_pipeline(pipeline.vk);
        self.backend.destroy_pipeline_layout(pipeline.layout);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // SWAPCHAINS
    // ─────────────────────────────────────────────────────────────────────────

    fn register_swapchain_images(&mut self, desc: &SwapchainDesc, native: &NativeSwapchain) -> Vec<ImageId> {
        native
            .images
            .iter()
            .enumerate()
            .map(|(index, &vk)| {
                self.resources.images.insert(Image {
                    desc: ImageDesc {
                        label: format!("{} image {}", desc.label, index),
                        format: native.format.format,
                        usage: desc.usage,
                        extent: vk::Extent3D {
                            width: native.extent.width,
                            height: native.extent.height,
                            depth: 1,
                        },
                        ..Default::default()
                    },
                    vk,
                    state: ImageState::default(),
                    is_swapchain_image: true,
                })
            })
            .collect()
    }

    pub fn create_swapchain(&mut self, desc: &SwapchainDesc) -> Result<SwapchainId> {
        let native = self
            .backend
            .create_swapchain(desc, vk::SwapchainKHR::null())?;
        let images = self.register_swapchain_images(desc, &native);

        log::info!(
            "Created swapchain '{}': {}x{}, {} images",
            desc.label,
            native.extent.width,
            native.extent.height,
            images.len()
        );
        Ok(self.resources.swapchains.insert(Swapchain {
            desc: *desc,
            vk: native.handle,
            images,
            format: native.format,
            extent: native.extent,
            current_image: None,
            is_out_of_date: false,
            is_optimal: true,
            is_zero_sized: is_zero_sized(&native),
        }))
    }

    pub fn destroy_swapchain(&mut self, id: SwapchainId) {
        assert!(
            self.frames.swapchain != Some(id),
            "cannot destroy a swapchain used by the open frame"
        );
        let Some(swapchain) = self.resources.swapchains.remove(id) else {
            panic!("stale or invalid swapchain handle {:?}", id);
        };
        if let Err(err) = self.backend.wait_idle() {
            log::warn!("wait_idle failed before destroying a swapchain: {}", err);
        }
        for image in swapchain.images {
            self.resources.images.remove(image);
        }
        if swapchain.vk != vk::SwapchainKHR::null() {
            self.backend.destroy_swapchain(swapchain.vk);
        }
    }

    /// Store new preferences; the swapchain is recreated at the next `begin_frame`.
    ///
    /// Not needed when a zero-sized (minimized) surface comes back: a swapchain
    /// without a native handle is recreated at every `begin_frame` until the
    /// surface has an extent again.
    pub fn invalidate_swapchain(&mut self, id: SwapchainId, desc: &SwapchainDesc) {
        let swapchain = self.resources.swapchain_mut(id);
        swapchain.desc = *desc;
        swapchain.is_optimal = false;
    }

    pub fn get_swapchain_state(&self, id: SwapchainId) -> SwapchainState {
        let swapchain = self.resources.swapchain(id);
        SwapchainState {
            extent: swapchain.extent,
            format: swapchain.format,
            images: swapchain.images.clone(),
            current_image: swapchain.current_image,
            is_out_of_date: swapchain.is_out_of_date,
            is_optimal: swapchain.is_optimal,
            is_zero_sized: swapchain.is_zero_sized,
        }
    }

    /// Rebuild a swapchain from its stored description, after waiting for idle
    fn recreate_swapchain(&mut self, id: SwapchainId) -> Result<()> {
        self.backend.wait_idle()?;

        let swapchain = self.resources.swapchain(id);
        let desc = swapchain.desc;
        let old = swapchain.vk;
        let native = self.backend.create_swapchain(&desc, old)?;

        let images = self.register_swapchain_images(&desc, &native);
        let swapchain = self.resources.swapchain_mut(id);
        let old_images = std::mem::replace(&mut swapchain.images, images);
        swapchain.vk = native.handle;
        swapchain.format = native.format;
        swapchain.extent = native.extent;
        swapchain.current_image = None;
        swapchain.is_out_of_date = false;
        swapchain.is_optimal = true;
        swapchain.is_zero_sized = is_zero_sized(&native);

        for image in old_images {
            self.resources.images.remove(image);
        }
        if old != vk::SwapchainKHR::null() {
            self.backend.destroy_swapchain(old);
        }

        log::debug!(
            "Recreated swapchain '{}': {}x{}",
            desc.label,
            native.extent.width,
            native.extent.height
        );
        Ok(())
    }

    /// Recreate, retrying once; a second consecutive failure is fatal
    fn recreate_swapchain_or_die(&mut self, id: SwapchainId) {
        if let Err(err) = self.recreate_swapchain(id) {
            log::warn!("Swapchain recreation failed ({}), retrying", err);
            if let Err(err) = self.recreate_swapchain(id) {
                panic!("swapchain recreation failed twice: {}", err);
            }
        }
    }

    /// Acquire the next image, recovering once from an out-of-date swapchain.
    ///
    /// Returns whether an image was acquired (zero-sized swapchains skip it).
    fn acquire_image(&mut self, id: SwapchainId, semaphore: vk::Semaphore) -> Result<bool> {
        if self.resources.swapchain(id).needs_recreate() {
            self.recreate_swapchain_or_die(id);
        }

        for attempt in 0..2 {
            let swapchain = self.resources.swapchain(id);
            if swapchain.is_zero_sized || swapchain.vk == vk::SwapchainKHR::null() {
                return Ok(false);
            }

            match self.backend.acquire_next_image(swapchain.vk, semaphore) {
                Ok((index, suboptimal)) => {
                    let swapchain = self.resources.swapchain_mut(id);
                    swapchain.current_image = Some(index);
                    if suboptimal {
                        log::warn!("Swapchain '{}' is suboptimal", swapchain.desc.label);
                        swapchain.is_optimal = false;
                    }
                    return Ok(true);
                }
                Err(Status::OutOfDate) if attempt == 0 => {
                    log::debug!("Swapchain out of date on acquire, recreating");
                    self.resources.swapchain_mut(id).is_out_of_date = true;
                    self.recreate_swapchain_or_die(id);
                }
                Err(Status::OutOfDate) => {
                    panic!("swapchain still out of date after recreation");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(false)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // FRAMES
    // ─────────────────────────────────────────────────────────────────────────

    pub fn get_frame_context(&self) -> FrameInfo {
        self.frames.info()
    }

    /// Open the next frame and, when given a swapchain, acquire its next image.
    ///
    /// The slot's fence stays signalled until `submit_frame`, so an error here
    /// leaves the slot ready for another `begin_frame`.
    pub fn begin_frame(&mut self, swapchain: Option<SwapchainId>) -> Result<()> {
        let slot = self.frames.slot();
        assert!(
            matches!(slot.encoder.state, EncoderState::Reset | EncoderState::End),
            "begin_frame called while frame {} is still open",
            self.frames.current_frame()
        );
        let fence = slot.submit_fence;
        let acquire_semaphore = slot.acquire_semaphore;
        self.backend.wait_for_fence(fence)?;

        let encoder = &mut self.frames.slot_mut().encoder;
        encoder.reset();
        let command_buffer = encoder.command_buffer;
        self.backend.reset_command_buffer(command_buffer)?;
        self.backend.begin_command_buffer(command_buffer)?;

        // Last, so nothing after a successful acquire can fail
        let acquired = match swapchain {
            Some(id) => self.acquire_image(id, acquire_semaphore)?,
            None => false,
        };

        self.frames.slot_mut().encoder.state = EncoderState::Recording;
        self.frames.swapchain = swapchain;
        self.frames.acquired = acquired;

        self.purge();
        Ok(())
    }

    /// Recording view over the open frame's encoder
    pub fn encoder(&mut self) -> Encoder<'_, B> {
        let encoder = &mut self.frames.slot_mut().encoder;
        assert!(
            encoder.is_recording(),
            "encoder() requires an open frame, call begin_frame first"
        );
        Encoder {
            backend: &mut self.backend,
            resources: &mut self.resources,
            encoder,
        }
    }

    /// Close, submit and (when an image was acquired) present the open frame.
    ///
    /// If the command buffer fails to close, the frame is abandoned: nothing is
    /// submitted, the ring does not advance and an acquired swapchain is marked
    /// for recreation. A failed queue submission is fatal, since the slot's
    /// fence would never signal again.
    pub fn submit_frame(&mut self, swapchain: Option<SwapchainId>) -> Result<()> {
        assert_eq!(
            swapchain, self.frames.swapchain,
            "submit_frame must be given the swapchain passed to begin_frame"
        );
        let acquired = self.frames.acquired;
        let frame = self.frames.current_frame();
        let ring_index = self.frames.ring_index();
        let slot = &mut self.frames.slots[ring_index];
        assert!(
            slot.encoder.state == EncoderState::Recording,
            "submit_frame requires an open frame with no pass open, found {:?}",
            slot.encoder.state
        );
        let command_buffer = slot.encoder.command_buffer;

        // Hand the acquired image to the presentation engine
        let mut present = None;
        if let (true, Some(id)) = (acquired, swapchain) {
            let swapchain = self.resources.swapchain(id);
            if let Some(index) = swapchain.current_image {
                let image = swapchain.images[index as usize];
                present = swapchain.can_present().then_some((swapchain.vk, index));

                let barriers = &mut slot.encoder.barriers;
                barriers.clear();
                barriers.access_image(self.resources.image_mut(image), &classify::PRESENT_ACCESS);
                if !barriers.is_empty() {
                    self.backend.cmd_pipeline_barrier(command_buffer, barriers);
                    barriers.clear();
                }
            }
        }

        let fence = slot.submit_fence;
        let closed = self
            .backend
            .end_command_buffer(command_buffer)
            .and_then(|()| self.backend.reset_fence(fence));
        if let Err(err) = closed {
            log::warn!("Abandoning frame {}: {}", frame, err);
            slot.encoder.state = EncoderState::End;
            self.frames.swapchain = None;
            self.frames.acquired = false;
            if let (true, Some(id)) = (acquired, swapchain) {
                let swapchain = self.resources.swapchain_mut(id);
                swapchain.current_image = None;
                swapchain.is_out_of_date = true;
            }
            return Err(err);
        }
        if let Some(status) = slot.encoder.status {
            log::warn!(
                "Submitting frame {} with commands dropped after '{}'",
                frame,
                status
            );
        }

        let submitted = self.backend.submit(&Submission {
            command_buffer,
            wait_semaphore: acquired.then_some(slot.acquire_semaphore),
            signal_semaphore: present.map(|_| slot.submit_semaphore),
            fence,
        });
        if let Err(err) = submitted {
            panic!("queue submission failed for frame {}: {}", frame, err);
        }
        slot.encoder.state = EncoderState::End;
        let submit_semaphore = slot.submit_semaphore;

        self.frames.advance();
        self.frames.swapchain = None;
        self.frames.acquired = false;

        if let (Some(id), Some((native, index))) = (swapchain, present) {
            let result = self.backend.present(native, index, submit_semaphore);
            let swapchain = self.resources.swapchain_mut(id);
            swapchain.current_image = None;
            match result {
                Ok(false) => {}
                Ok(true) => {
                    log::warn!("Swapchain '{}' is suboptimal", swapchain.desc.label);
                    swapchain.is_optimal = false;
                }
                Err(Status::OutOfDate) => swapchain.is_out_of_date = true,
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // DEFERRED DESTRUCTION
    // ─────────────────────────────────────────────────────────────────────────

    pub fn release_buffer(&mut self, id: BufferId) {
        self.resources.buffer(id);
        self.releases
            .push(self.frames.current_frame(), Released::Buffer(id));
    }

    pub fn release_image(&mut self, id: ImageId) {
        assert!(
            !self.resources.image(id).is_swapchain_image,
            "swapchain images are owned by their swapchain"
        );
        self.releases
            .push(self.frames.current_frame(), Released::Image(id));
    }

    pub fn release_image_view(&mut self, id: ImageViewId) {
        self.resources.image_view(id);
        self.releases
            .push(self.frames.current_frame(), Released::ImageView(id));
    }

    pub fn release_framebuffer(&mut self, id: FramebufferId) {
        self.resources.framebuffer(id);
        self.releases
            .push(self.frames.current_frame(), Released::Framebuffer(id));
    }

    fn destroy_released(&mut self, object: Released) {
        match object {
            Released::Buffer(id) => self.destroy_buffer(id),
            Released::Image(id) => self.destroy_image(id),
            Released::ImageView(id) => self.destroy_image_view(id),
            Released::Framebuffer(id) => self.destroy_framebuffer(id),
        }
    }

    /// Destroy released objects no frame in flight can still reference
    pub fn purge(&mut self) {
        let retired = self.releases.drain_retired(self.frames.tail_frame());
        if !retired.is_empty() {
            log::debug!("Purging {} released objects", retired.len());
        }
        for object in retired {
            self.destroy_released(object);
        }
    }

    /// Wait for the device to go idle, then destroy everything released
    pub fn idle_purge(&mut self) -> Result<()> {
        self.backend.wait_idle()?;
        for object in self.releases.drain_all() {
            self.destroy_released(object);
        }
        Ok(())
    }

    pub fn wait_idle(&mut self) -> Result<()> {
        self.backend.wait_idle()
    }

    pub fn wait_queue_idle(&mut self) -> Result<()> {
        self.backend.wait_queue_idle()
    }
}

fn is_zero_sized(native: &NativeSwapchain) -> bool {
    native.extent.width == 0 || native.extent.height == 0
}

impl<B: Backend> Drop for Device<B> {
    fn drop(&mut self) {
        log::info!("Destroying device...");

        // Wait for device to finish
        if let Err(err) = self.backend.wait_idle() {
            log::warn!("wait_idle failed during device teardown: {}", err);
        }
        for object in self.releases.drain_all() {
            self.destroy_released(object);
        }

        // Cleanup in dependency order
        let resources = std::mem::take(&mut self.resources);
        let backend = &mut self.backend;
        for (_, pipeline) in resources.graphics_pipelines {
            backend.destroy_pipeline(pipeline.vk);
            backend.destroy_pipeline_layout(pipeline.layout);
        }
        for (_, pipeline) in resources.compute_pipelines {
            backend.destroy_pipeline(pipeline.vk);
            backend.destroy_pipeline_layout(pipeline.layout);
        }
        for (_, framebuffer) in resources.framebuffers {
            backend.destroy_framebuffer(framebuffer.vk);
        }
        for (_, render_pass) in resources.render_passes {
            backend.destroy_render_pass(render_pass.vk);
        }
        // Sets go away with their pools
        self.heap.destroy(backend);
        for (_, layout) in resources.descriptor_set_layouts {
            backend.destroy_descriptor_set_layout(layout.vk);
        }
        for (_, shader) in resources.shaders {
            backend.destroy_shader(shader.vk);
        }
        for (_, sampler) in resources.samplers {
            backend.destroy_sampler(sampler.vk);
        }
        for (_, view) in resources.image_views {
            backend.destroy_image_view(view.vk);
        }
        for (_, view) in resources.buffer_views {
            backend.destroy_buffer_view(view.vk);
        }
        for (_, image) in resources.images {
            if !image.is_swapchain_image {
                backend.destroy_image(image.vk);
            }
        }
        for (_, buffer) in resources.buffers {
            backend.destroy_buffer(buffer.vk);
        }
        for (_, swapchain) in resources.swapchains {
            if swapchain.vk != vk::SwapchainKHR::null() {
                backend.destroy_swapchain(swapchain.vk);
            }
        }
        self.frames.destroy(backend);
    }
}
