// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Surface capabilities are queried on every (re)creation, so a resized or
// minimized window picks up its new extent here.

use ash::vk;

use super::device::VulkanContext;
use crate::backend::NativeSwapchain;
use crate::error::{Result, Status};
use crate::types::SwapchainDesc;

pub fn create_swapchain(
    context: &VulkanContext,
    desc: &SwapchainDesc,
    old: vk::SwapchainKHR,
) -> Result<NativeSwapchain> {
    let surface_loader = &context.surface_loader;
    let physical_device = context.physical_device;

    let supported = unsafe {
        surface_loader.get_physical_device_surface_support(
            physical_device,
            context.queue_family,
            desc.surface,
        )
    }?;
    if !supported {
        log::error!("Queue family {} cannot present to this surface", context.queue_family);
        return Err(Status::SurfaceLost);
    }

    // Query surface capabilities
    let surface_caps = unsafe {
        surface_loader.get_physical_device_surface_capabilities(physical_device, desc.surface)
    }?;

    // Query supported formats
    let formats = unsafe {
        surface_loader.get_physical_device_surface_formats(physical_device, desc.surface)
    }?;

    // Query supported present modes
    let present_modes = unsafe {
        surface_loader.get_physical_device_surface_present_modes(physical_device, desc.surface)
    }?;

    // Choose surface format (requested one, else whatever the surface lists first)
    let surface_format = formats
        .iter()
        .copied()
        .find(|f| f.format == desc.format.format && f.color_space == desc.format.color_space)
        .or_else(|| formats.first().copied())
        .ok_or(Status::FormatNotSupported)?;

    // FIFO is always supported
    let present_mode = if present_modes.contains(&desc.present_mode) {
        desc.present_mode
    } else {
        log::warn!("Present mode {:?} unsupported, using FIFO", desc.present_mode);
        vk::PresentModeKHR::FIFO
    };

    // Choose extent
    let extent = if surface_caps.current_extent.width != u32::MAX {
        surface_caps.current_extent
    } else {
        vk::Extent2D {
            width: desc.preferred_extent.width.clamp(
                surface_caps.min_image_extent.width,
                surface_caps.max_image_extent.width,
            ),
            height: desc.preferred_extent.height.clamp(
                surface_caps.min_image_extent.height,
                surface_caps.max_image_extent.height,
            ),
        }
    };

    // Minimized window: nothing to create until it has an area again
    if extent.width == 0 || extent.height == 0 {
        log::debug!("Surface for '{}' is zero-sized", desc.label);
        return Ok(NativeSwapchain {
            handle: vk::SwapchainKHR::null(),
            images: Vec::new(),
            format: surface_format,
            extent,
        });
    }

    let mut image_count = desc.preferred_buffering.max(surface_caps.min_image_count);
    if surface_caps.max_image_count > 0 && image_count > surface_caps.max_image_count {
        image_count = surface_caps.max_image_count;
    }

    let composite_alpha = if surface_caps
        .supported_composite_alpha
        .contains(desc.composite_alpha)
    {
        desc.composite_alpha
    } else {
        vk::CompositeAlphaFlagsKHR::OPAQUE
    };

    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(desc.surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(desc.usage)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(surface_caps.current_transform)
        .composite_alpha(composite_alpha)
        .present_mode(present_mode)
        .clipped(true)
        .old_swapchain(old);

    let swapchain_loader = &context.swapchain_loader;
    let handle = unsafe { swapchain_loader.create_swapchain(&create_info, None) }?;

    let images = match unsafe { swapchain_loader.get_swapchain_images(handle) } {
        Ok(images) => images,
        Err(err) => {
            unsafe { swapchain_loader.destroy_swapchain(handle, None) };
            return Err(err.into());
        }
    };

    log::info!(
        "Created swapchain '{}': {}x{}, {} images, {:?}",
        desc.label,
        extent.width,
        extent.height,
        images.len(),
        present_mode
    );

    Ok(NativeSwapchain {
        handle,
        images,
        format: surface_format,
        extent,
    })
}

pub fn acquire_next_image(
    context: &VulkanContext,
    swapchain: vk::SwapchainKHR,
    semaphore: vk::Semaphore,
) -> Result<(u32, bool)> {
    let acquired = unsafe {
        context
            .swapchain_loader
            .acquire_next_image(swapchain, u64::MAX, semaphore, vk::Fence::null())
    }?;
    Ok(acquired)
}

pub fn present(
    context: &VulkanContext,
    swapchain: vk::SwapchainKHR,
    image_index: u32,
    wait_semaphore: vk::Semaphore,
) -> Result<bool> {
    let wait_semaphores = [wait_semaphore];
    let swapchains = [swapchain];
    let image_indices = [image_index];

    let present_info = vk::PresentInfoKHR::default()
        .wait_semaphores(&wait_semaphores)
        .swapchains(&swapchains)
        .image_indices(&image_indices);

    let suboptimal = unsafe {
        context
            .swapchain_loader
            .queue_present(context.queue, &present_info)
    }?;
    Ok(suboptimal)
}
