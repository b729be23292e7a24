// =============================================================================
// VK-ENCODER DEMO - Headless frame loop over the encoder
// =============================================================================
//
// Records a few frames through the device facade:
//   - host-mapped staging upload and buffer-to-buffer copies
//   - a compute pass reading a uniform buffer and writing a storage buffer
//   - a deferred render pass into an offscreen target
//   - a blit of that target into the swapchain image, then present
//
// With `backend = "stub"` (the default) every native call is recorded and
// summarised per frame. With `backend = "vulkan"` the same transfers run on
// a real device without a window.
//
// =============================================================================

use anyhow::{Context, Result};
use ash::vk;
use glam::Vec4;
use std::fs::OpenOptions;
use std::io::Write;

use vk_encoder::{
    Backend, BackendKind, BufferDesc, BufferId, ComputePipelineDesc, ComputePipelineId, Config,
    DescriptorBindingDesc, DescriptorSetId, DescriptorSetLayoutDesc, DescriptorSetLayoutId,
    DescriptorSetUpdate, DescriptorType, Device, FramebufferDesc, FramebufferId,
    GraphicsPipelineDesc, GraphicsPipelineId, ImageDesc, ImageId, ImageViewDesc, ImageViewId,
    NativeCall, RenderPassAttachment, RenderPassBeginInfo, RenderPassDesc, RenderPassId,
    ShaderDesc, ShaderId, ShaderStageDesc, StubBackend, SwapchainId, Viewport, VulkanBackend,
};
use vk_encoder::types::{BufferBinding, ColorBlendAttachment};

/// SPIR-V header only; the stub backend never inspects shader code
const PLACEHOLDER_SPIRV: [u32; 5] = [0x0723_0203, 0x0001_0000, 0, 1, 0];

const TARGET_EXTENT: vk::Extent2D = vk::Extent2D {
    width: 320,
    height: 180,
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting vk-encoder demo");
    log::info!(
        "Buffering: {}, descriptor pool size: {}, frames: {}",
        config.frame.buffering,
        config.descriptors.pool_size,
        config.debug.frames
    );

    match config.backend_kind()? {
        BackendKind::Stub => {
            let mut device = Device::new(StubBackend::new(), &config.device_settings())?;
            let swapchain = device.create_swapchain(&config.swapchain_desc(vk::SurfaceKHR::null()))?;
            let scene = Scene::new(&mut device, true)?;

            for frame in 0..config.debug.frames {
                scene.record_frame(&mut device, Some(swapchain), frame)?;
                report_stub_frame(device.backend_mut(), frame);
            }

            scene.destroy(&mut device);
            device.destroy_swapchain(swapchain);
        }
        BackendKind::Vulkan => {
            let backend = VulkanBackend::new(&config.vulkan_settings())
                .context("Failed to bring up the Vulkan backend")?;
            let mut device = Device::new(backend, &config.device_settings())?;
            // No shaders ship with the demo, so only transfers run on hardware
            let scene = Scene::new(&mut device, false)?;

            for frame in 0..config.debug.frames {
                scene.record_frame(&mut device, None, frame)?;
            }

            device.wait_idle()?;
            scene.destroy(&mut device);
        }
    }

    log::info!("Demo finished");
    Ok(())
}

/// Initialize logging with optional file output
fn init_logging(config: &Config) {
    use env_logger::{Builder, Target};

    let mut builder = Builder::from_default_env();
    builder.filter_level(config.get_log_level());

    // Create/clear log file if enabled
    if config.debug.log_to_file {
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "=== vk-encoder log ===");
                let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
                let _ = writeln!(file);
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Cannot open log file {}: {}", config.debug.log_file, e),
        }
    }

    builder.init();
}

fn report_stub_frame(backend: &mut StubBackend, frame: u32) {
    let calls = backend.take_calls();
    let commands = calls.iter().filter(|call| call.is_command()).count();
    let barriers = calls
        .iter()
        .filter(|call| matches!(call, NativeCall::PipelineBarrier { .. }))
        .count();
    log::info!(
        "Frame {}: {} native calls, {} commands, {} barriers",
        frame,
        calls.len(),
        commands,
        barriers
    );
}

// =============================================================================
// SCENE
// =============================================================================

struct ComputeStage {
    shader: ShaderId,
    pipeline: ComputePipelineId,
}

struct RasterStage {
    vertex_shader: ShaderId,
    fragment_shader: ShaderId,
    render_pass: RenderPassId,
    framebuffer: FramebufferId,
    pipeline: GraphicsPipelineId,
}

/// Everything the demo frames touch
struct Scene {
    staging: BufferId,
    uniforms: BufferId,
    particles: BufferId,
    vertices: BufferId,
    target: ImageId,
    target_view: ImageViewId,
    layout: DescriptorSetLayoutId,
    set: DescriptorSetId,
    compute: Option<ComputeStage>,
    raster: Option<RasterStage>,
}

impl Scene {
    fn new<B: Backend>(device: &mut Device<B>, with_pipelines: bool) -> Result<Self> {
        // ─────────────────────────────────────────────────────────────────────
        // BUFFERS
        // ─────────────────────────────────────────────────────────────────────
        let staging = device.create_buffer(&BufferDesc {
            label: "staging".to_string(),
            size: 4096,
            usage: vk::BufferUsageFlags::TRANSFER_SRC,
            host_mapped: true,
        })?;
        let uniforms = device.create_buffer(&BufferDesc {
            label: "uniforms".to_string(),
            size: 256,
            usage: vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            host_mapped: false,
        })?;
        let particles = device.create_buffer(&BufferDesc {
            label: "particles".to_string(),
            size: 4096,
            usage: vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            host_mapped: false,
        })?;
        let vertices = device.create_buffer(&BufferDesc {
            label: "vertices".to_string(),
            size: 4096,
            usage: vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            host_mapped: false,
        })?;

        let seed: Vec<f32> = (0..1024).map(|i| i as f32 * 0.25).collect();
        device.write_buffer(staging, 0, bytemuck::cast_slice(&seed))?;

        // ─────────────────────────────────────────────────────────────────────
        // OFFSCREEN TARGET
        // ─────────────────────────────────────────────────────────────────────
        let target = device.create_image(&ImageDesc {
            label: "offscreen target".to_string(),
            format: vk::Format::R8G8B8A8_UNORM,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST,
            extent: vk::Extent3D {
                width: TARGET_EXTENT.width,
                height: TARGET_EXTENT.height,
                depth: 1,
            },
            ..Default::default()
        })?;
        let target_view = device.create_image_view(&ImageViewDesc::whole(
            target,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageAspectFlags::COLOR,
        ))?;

        // ─────────────────────────────────────────────────────────────────────
        // DESCRIPTORS
        // ─────────────────────────────────────────────────────────────────────
        let layout = device.create_descriptor_set_layout(&DescriptorSetLayoutDesc {
            label: "simulation",
            bindings: &[
                DescriptorBindingDesc::new(DescriptorType::UniformBuffer, 1),
                DescriptorBindingDesc::new(DescriptorType::StorageBuffer, 1),
            ],
        })?;
        let set = device.create_descriptor_set(layout, &[])?;
        device.update_descriptor_set(&DescriptorSetUpdate {
            set,
            binding: 0,
            element: 0,
            buffers: &[BufferBinding::whole(uniforms)],
            texel_buffers: &[],
            images: &[],
        });
        device.update_descriptor_set(&DescriptorSetUpdate {
            set,
            binding: 1,
            element: 0,
            buffers: &[BufferBinding::whole(particles)],
            texel_buffers: &[],
            images: &[],
        });

        let (compute, raster) = if with_pipelines {
            (
                Some(Self::create_compute_stage(device, layout)?),
                Some(Self::create_raster_stage(device, target_view)?),
            )
        } else {
            (None, None)
        };

        Ok(Self {
            staging,
            uniforms,
            particles,
            vertices,
            target,
            target_view,
            layout,
            set,
            compute,
            raster,
        })
    }

    fn create_compute_stage<B: Backend>(
        device: &mut Device<B>,
        layout: DescriptorSetLayoutId,
    ) -> Result<ComputeStage> {
        let shader = device.create_shader(&ShaderDesc {
            label: "simulate.comp",
            spirv_code: &PLACEHOLDER_SPIRV,
        })?;
        let pipeline = device.create_compute_pipeline(&ComputePipelineDesc {
            label: "simulate",
            compute_shader: ShaderStageDesc {
                shader,
                entry_point: "main",
            },
            push_constants_size: 16,
            descriptor_set_layouts: &[layout],
        })?;
        Ok(ComputeStage { shader, pipeline })
    }

    fn create_raster_stage<B: Backend>(
        device: &mut Device<B>,
        target_view: ImageViewId,
    ) -> Result<RasterStage> {
        let vertex_shader = device.create_shader(&ShaderDesc {
            label: "particles.vert",
            spirv_code: &PLACEHOLDER_SPIRV,
        })?;
        let fragment_shader = device.create_shader(&ShaderDesc {
            label: "particles.frag",
            spirv_code: &PLACEHOLDER_SPIRV,
        })?;

        let attachments = [RenderPassAttachment::color(
            vk::Format::R8G8B8A8_UNORM,
            vk::AttachmentLoadOp::CLEAR,
        )];
        let render_pass = device.create_render_pass(&RenderPassDesc {
            label: "particles",
            color_attachments: &attachments,
            depth_stencil_attachment: None,
        })?;
        let framebuffer = device.create_framebuffer(&FramebufferDesc {
            label: "offscreen",
            render_pass,
            extent: TARGET_EXTENT,
            layers: 1,
            color_attachments: &[target_view],
            depth_stencil_attachment: None,
        })?;

        let pipeline = device.create_graphics_pipeline(&GraphicsPipelineDesc {
            label: "particles",
            vertex_shader: ShaderStageDesc {
                shader: vertex_shader,
                entry_point: "main",
            },
            fragment_shader: ShaderStageDesc {
                shader: fragment_shader,
                entry_point: "main",
            },
            render_pass,
            vertex_input_bindings: &[vk_encoder::types::VertexInputBinding {
                binding: 0,
                stride: 16,
                input_rate: vk::VertexInputRate::VERTEX,
            }],
            vertex_attributes: &[vk_encoder::types::VertexAttribute {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: 0,
            }],
            push_constants_size: 0,
            descriptor_set_layouts: &[],
            primitive_topology: vk::PrimitiveTopology::POINT_LIST,
            rasterization: Default::default(),
            depth_stencil: Default::default(),
            color_blend: &[ColorBlendAttachment::default()],
            blend_constant: Vec4::ZERO,
        })?;

        Ok(RasterStage {
            vertex_shader,
            fragment_shader,
            render_pass,
            framebuffer,
            pipeline,
        })
    }

    fn record_frame<B: Backend>(
        &self,
        device: &mut Device<B>,
        swapchain: Option<SwapchainId>,
        frame: u32,
    ) -> Result<()> {
        device.begin_frame(swapchain)?;
        let present_target = swapchain.and_then(|id| {
            let state = device.get_swapchain_state(id);
            state
                .current_image
                .map(|index| (state.images[index as usize], state.extent))
        });

        let mut encoder = device.encoder();
        encoder.begin_debug_marker("upload", Vec4::new(0.2, 0.6, 1.0, 1.0));
        let time = frame as f32 / 60.0;
        encoder.update_buffer(self.uniforms, 0, bytemuck::bytes_of(&[time, 0.0, 0.0, 0.0]));
        encoder.copy_buffer(
            self.staging,
            self.particles,
            &[vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: 4096,
            }],
        );
        encoder.copy_buffer(
            self.staging,
            self.vertices,
            &[vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: 4096,
            }],
        );
        encoder.end_debug_marker();

        if let Some(compute) = &self.compute {
            encoder.begin_compute_pass();
            encoder.bind_compute_pipeline(compute.pipeline);
            encoder.bind_descriptor_sets(&[self.set], &[]);
            encoder.push_constants(bytemuck::bytes_of(&[time, 1.0, 0.0, 0.0]));
            encoder.dispatch(16, 1, 1);
            encoder.end_compute_pass();
        }

        match &self.raster {
            Some(raster) => {
                encoder.begin_render_pass(&RenderPassBeginInfo {
                    framebuffer: raster.framebuffer,
                    render_pass: raster.render_pass,
                    render_area: vk::Rect2D {
                        offset: vk::Offset2D { x: 0, y: 0 },
                        extent: TARGET_EXTENT,
                    },
                    color_clear_values: &[Vec4::new(0.02, 0.02, 0.05, 1.0)],
                    depth_stencil_clear_value: Default::default(),
                });
                encoder.bind_graphics_pipeline(raster.pipeline);
                encoder.set_viewport(Viewport::from_extent(TARGET_EXTENT));
                encoder.set_scissor(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: TARGET_EXTENT,
                });
                encoder.bind_vertex_buffers(&[self.vertices], &[0]);
                encoder.draw(256, 1, 0, 0);
                encoder.end_render_pass();
            }
            None => encoder.clear_color_image(self.target, Vec4::new(0.02, 0.02, 0.05, 1.0)),
        }

        if let Some((image, extent)) = present_target {
            encoder.blit_image(
                self.target,
                image,
                &[full_blit(TARGET_EXTENT, extent)],
                vk::Filter::LINEAR,
            );
        }

        if let Err(status) = encoder.status() {
            log::warn!("Frame {} recorded with status {}", frame, status);
        }
        device.submit_frame(swapchain)?;
        Ok(())
    }

    fn destroy<B: Backend>(self, device: &mut Device<B>) {
        if let Some(raster) = self.raster {
            device.destroy_graphics_pipeline(raster.pipeline);
            device.release_framebuffer(raster.framebuffer);
            device.destroy_render_pass(raster.render_pass);
            device.destroy_shader(raster.vertex_shader);
            device.destroy_shader(raster.fragment_shader);
        }
        if let Some(compute) = self.compute {
            device.destroy_compute_pipeline(compute.pipeline);
            device.destroy_shader(compute.shader);
        }
        device.destroy_descriptor_set(self.set);
        device.destroy_descriptor_set_layout(self.layout);
        device.release_image_view(self.target_view);
        device.release_image(self.target);
        for buffer in [self.staging, self.uniforms, self.particles, self.vertices] {
            device.release_buffer(buffer);
        }
        if let Err(err) = device.idle_purge() {
            log::warn!("idle_purge failed during teardown: {}", err);
        }
    }
}

fn full_blit(src: vk::Extent2D, dst: vk::Extent2D) -> vk::ImageBlit {
    let layers = vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level: 0,
        base_array_layer: 0,
        layer_count: 1,
    };
    let corner = |extent: vk::Extent2D| vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: 1,
    };
    vk::ImageBlit {
        src_subresource: layers,
        src_offsets: [vk::Offset3D::default(), corner(src)],
        dst_subresource: layers,
        dst_offsets: [vk::Offset3D::default(), corner(dst)],
    }
}
