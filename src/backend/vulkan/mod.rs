// Vulkan backend
//
// Responsibilities:
// - Owns the instance, device, queue and memory allocator
// - Implements the native device and command traits on top of ash
// - Surfaces for windows the caller owns (via ash-window)
//
// Every object handed out is owned by the caller, which destroys it
// through the matching trait method. Memory still allocated at drop is
// reclaimed before the device goes away.

mod commands;
mod descriptor;
pub mod device;
mod memory;
mod pipeline;
mod swapchain;
mod sync;
mod views;

use anyhow::{Context, Result as AnyResult};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, Allocator};
use parking_lot::Mutex;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::collections::HashMap;
use std::mem::ManuallyDrop;

use super::{
    Backend, BackendKind, DescriptorWrite, NativeDevice, NativeShaderStage, NativeSwapchain,
    Submission,
};
use crate::error::Result;
use crate::types::{
    BufferDesc, BufferViewDesc, DescriptorBindingDesc, GraphicsPipelineDesc, ImageDesc,
    ImageViewDesc, RenderPassDesc, SamplerDesc, SwapchainDesc, NUM_DESCRIPTOR_TYPES,
};

pub use device::{DevicePreference, VulkanContext, VulkanSettings};

pub struct VulkanBackend {
    // Dropped by hand before the context destroys the device
    allocator: ManuallyDrop<Mutex<Allocator>>,
    buffer_memory: HashMap<vk::Buffer, Allocation>,
    image_memory: HashMap<vk::Image, Allocation>,
    context: VulkanContext,
}

impl VulkanBackend {
    pub fn new(settings: &VulkanSettings) -> AnyResult<Self> {
        let context = VulkanContext::new(settings)?;
        let allocator = context
            .create_allocator()
            .context("Failed to create memory allocator")?;

        Ok(Self {
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            buffer_memory: HashMap::new(),
            image_memory: HashMap::new(),
            context,
        })
    }

    pub fn context(&self) -> &VulkanContext {
        &self.context
    }

    /// Create a presentation surface for a window owned by the caller
    pub fn create_surface(
        &self,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> AnyResult<vk::SurfaceKHR> {
        let surface = unsafe {
            ash_window::create_surface(
                &self.context.entry,
                &self.context.instance,
                display,
                window,
                None,
            )
        }
        .context("Failed to create window surface")?;
        Ok(surface)
    }

    /// Destroy a surface once every swapchain built on it is gone
    pub fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        unsafe { self.context.surface_loader.destroy_surface(surface, None) };
    }
}

impl Backend for VulkanBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vulkan
    }
}

impl NativeDevice for VulkanBackend {
    fn create_buffer(&mut self, desc: &BufferDesc) -> Result<vk::Buffer> {
        self.allocate_buffer(desc)
    }

    fn destroy_buffer(&mut self, buffer: vk::Buffer) {
        self.free_buffer(buffer);
    }

    fn write_buffer(&mut self, buffer: vk::Buffer, offset: u64, data: &[u8]) -> Result<()> {
        self.write_mapped(buffer, offset, data)
    }

    fn create_buffer_view(&mut self, buffer: vk::Buffer, desc: &BufferViewDesc) -> Result<vk::BufferView> {
        views::create_buffer_view(&self.context.device, buffer, desc)
    }

    fn destroy_buffer_view(&mut self, view: vk::BufferView) {
        unsafe { self.context.device.destroy_buffer_view(view, None) };
    }

    fn create_image(&mut self, desc: &ImageDesc) -> Result<vk::Image> {
        self.allocate_image(desc)
    }

    fn destroy_image(&mut self, image: vk::Image) {
        self.free_image(image);
    }

    fn create_image_view(&mut self, image: vk::Image, desc: &ImageViewDesc) -> Result<vk::ImageView> {
        views::create_image_view(&self.context.device, image, desc)
    }

    fn destroy_image_view(&mut self, view: vk::ImageView) {
        unsafe { self.context.device.destroy_image_view(view, None) };
    }

    fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<vk::Sampler> {
        views::create_sampler(&self.context.device, desc)
    }

    fn destroy_sampler(&mut self, sampler: vk::Sampler) {
        unsafe { self.context.device.destroy_sampler(sampler, None) };
    }

    fn create_shader(&mut self, spirv: &[u32]) -> Result<vk::ShaderModule> {
        pipeline::create_shader_module(&self.context.device, spirv)
    }

    fn destroy_shader(&mut self, shader: vk::ShaderModule) {
        unsafe { self.context.device.destroy_shader_module(shader, None) };
    }

    fn create_descriptor_set_layout(
        &mut self,
        bindings: &[DescriptorBindingDesc],
    ) -> Result<vk::DescriptorSetLayout> {
        descriptor::create_set_layout(&self.context.device, bindings)
    }

    fn destroy_descriptor_set_layout(&mut self, layout: vk::DescriptorSetLayout) {
        unsafe { self.context.device.destroy_descriptor_set_layout(layout, None) };
    }

    fn create_descriptor_pool(
        &mut self,
        sizes: &[u32; NUM_DESCRIPTOR_TYPES],
        max_sets: u32,
    ) -> Result<vk::DescriptorPool> {
        descriptor::create_pool(&self.context.device, sizes, max_sets)
    }

    fn destroy_descriptor_pool(&mut self, pool: vk::DescriptorPool) {
        unsafe { self.context.device.destroy_descriptor_pool(pool, None) };
    }

    fn allocate_descriptor_set(
        &mut self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
        variable_length: Option<u32>,
    ) -> Result<vk::DescriptorSet> {
        descriptor::allocate_set(&self.context.device, pool, layout, variable_length)
    }

    fn free_descriptor_set(&mut self, pool: vk::DescriptorPool, set: vk::DescriptorSet) {
        descriptor::free_set(&self.context.device, pool, set);
    }

    fn write_descriptor_set(&mut self, write: &DescriptorWrite<'_>) {
        descriptor::write_set(&self.context.device, write);
    }

    fn create_render_pass(&mut self, desc: &RenderPassDesc<'_>) -> Result<vk::RenderPass> {
        pipeline::create_render_pass(&self.context.device, desc)
    }

    fn destroy_render_pass(&mut self, render_pass: vk::RenderPass) {
        unsafe { self.context.device.destroy_render_pass(render_pass, None) };
    }

    fn create_framebuffer(
        &mut self,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
        layers: u32,
    ) -> Result<vk::Framebuffer> {
        pipeline::create_framebuffer(&self.context.device, render_pass, attachments, extent, layers)
    }

    fn destroy_framebuffer(&mut self, framebuffer: vk::Framebuffer) {
        unsafe { self.context.device.destroy_framebuffer(framebuffer, None) };
    }

    fn create_pipeline_layout(
        &mut self,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constants_size: u32,
    ) -> Result<vk::PipelineLayout> {
        pipeline::create_pipeline_layout(&self.context.device, set_layouts, push_constants_size)
    }

    fn destroy_pipeline_layout(&mut self, layout: vk::PipelineLayout) {
        unsafe { self.context.device.destroy_pipeline_layout(layout, None) };
    }

    fn create_compute_pipeline(
        &mut self,
        layout: vk::PipelineLayout,
        stage: NativeShaderStage<'_>,
    ) -> Result<vk::Pipeline> {
        pipeline::create_compute_pipeline(&self.context.device, layout, stage)
    }

    fn create_graphics_pipeline(
        &mut self,
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
        vertex: NativeShaderStage<'_>,
        fragment: NativeShaderStage<'_>,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> Result<vk::Pipeline> {
        pipeline::create_graphics_pipeline(
            &self.context.device,
            layout,
            render_pass,
            vertex,
            fragment,
            desc,
        )
    }

    fn destroy_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe { self.context.device.destroy_pipeline(pipeline, None) };
    }

    fn create_command_buffer(&mut self) -> Result<(vk::CommandPool, vk::CommandBuffer)> {
        sync::create_command_buffer(&self.context.device, self.context.queue_family)
    }

    fn destroy_command_buffer(&mut self, pool: vk::CommandPool, command_buffer: vk::CommandBuffer) {
        sync::destroy_command_buffer(&self.context.device, pool, command_buffer);
    }

    fn reset_command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> Result<()> {
        unsafe {
            self.context
                .device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
        }?;
        Ok(())
    }

    fn begin_command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> Result<()> {
        sync::begin_command_buffer(&self.context.device, command_buffer)
    }

    fn end_command_buffer(&mut self, command_buffer: vk::CommandBuffer) -> Result<()> {
        unsafe { self.context.device.end_command_buffer(command_buffer) }?;
        Ok(())
    }

    fn create_fence(&mut self, signaled: bool) -> Result<vk::Fence> {
        sync::create_fence(&self.context.device, signaled)
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        unsafe { self.context.device.destroy_fence(fence, None) };
    }

    fn wait_for_fence(&mut self, fence: vk::Fence) -> Result<()> {
        unsafe { self.context.device.wait_for_fences(&[fence], true, u64::MAX) }?;
        Ok(())
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> Result<()> {
        unsafe { self.context.device.reset_fences(&[fence]) }?;
        Ok(())
    }

    fn create_semaphore(&mut self) -> Result<vk::Semaphore> {
        sync::create_semaphore(&self.context.device)
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        unsafe { self.context.device.destroy_semaphore(semaphore, None) };
    }

    fn submit(&mut self, submission: &Submission) -> Result<()> {
        sync::submit(&self.context.device, self.context.queue, submission)
    }

    fn wait_idle(&mut self) -> Result<()> {
        unsafe { self.context.device.device_wait_idle() }?;
        Ok(())
    }

    fn wait_queue_idle(&mut self) -> Result<()> {
        unsafe { self.context.device.queue_wait_idle(self.context.queue) }?;
        Ok(())
    }

    fn create_swapchain(&mut self, desc: &SwapchainDesc, old: vk::SwapchainKHR) -> Result<NativeSwapchain> {
        swapchain::create_swapchain(&self.context, desc, old)
    }

    fn destroy_swapchain(&mut self, swapchain: vk::SwapchainKHR) {
        if swapchain != vk::SwapchainKHR::null() {
            unsafe { self.context.swapchain_loader.destroy_swapchain(swapchain, None) };
        }
    }

    fn acquire_next_image(
        &mut self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
    ) -> Result<(u32, bool)> {
        swapchain::acquire_next_image(&self.context, swapchain, semaphore)
    }

    fn present(
        &mut self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool> {
        swapchain::present(&self.context, swapchain, image_index, wait_semaphore)
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        let _ = unsafe { self.context.device.device_wait_idle() };
        self.free_all_memory();
        // Allocator must go before the device
        unsafe { ManuallyDrop::drop(&mut self.allocator) };
    }
}
