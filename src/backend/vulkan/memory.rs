// Memory - buffers and images backed by gpu-allocator
//
// Host-mapped buffers live in CPU-visible memory and stay persistently
// mapped; everything else is device local. Allocations are keyed by the
// handle they back so destroy can hand them back to the allocator.

use ash::vk;
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;

use super::VulkanBackend;
use crate::error::{Result, Status};
use crate::types::{BufferDesc, ImageDesc};

impl VulkanBackend {
    pub(super) fn allocate_buffer(&mut self, desc: &BufferDesc) -> Result<vk::Buffer> {
        let device = &self.context.device;

        let buffer_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None) }?;
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let location = if desc.host_mapped {
            MemoryLocation::CpuToGpu
        } else {
            MemoryLocation::GpuOnly
        };

        let allocation = self.allocator.lock().allocate(&AllocationCreateDesc {
            name: &desc.label,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(err.into());
            }
        };

        if let Err(err) =
            unsafe { device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) }
        {
            let _ = self.allocator.lock().free(allocation);
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(err.into());
        }

        self.buffer_memory.insert(buffer, allocation);
        Ok(buffer)
    }

    pub(super) fn free_buffer(&mut self, buffer: vk::Buffer) {
        unsafe { self.context.device.destroy_buffer(buffer, None) };
        if let Some(allocation) = self.buffer_memory.remove(&buffer) {
            if let Err(err) = self.allocator.lock().free(allocation) {
                log::warn!("Failed to free buffer memory: {}", err);
            }
        }
    }

    pub(super) fn write_mapped(&mut self, buffer: vk::Buffer, offset: u64, data: &[u8]) -> Result<()> {
        let slice = self
            .buffer_memory
            .get_mut(&buffer)
            .and_then(|allocation| allocation.mapped_slice_mut())
            .ok_or(Status::MemoryMapFailed)?;

        let start = offset as usize;
        slice[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub(super) fn allocate_image(&mut self, desc: &ImageDesc) -> Result<vk::Image> {
        let device = &self.context.device;

        let image_info = vk::ImageCreateInfo::default()
            .image_type(desc.image_type)
            .format(desc.format)
            .extent(desc.extent)
            .mip_levels(desc.mip_levels)
            .array_layers(desc.array_layers)
            .samples(desc.sample_count)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.create_image(&image_info, None) }?;
        let requirements = unsafe { device.get_image_memory_requirements(image) };

        let allocation = self.allocator.lock().allocate(&AllocationCreateDesc {
            name: &desc.label,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(err) => {
                unsafe { device.destroy_image(image, None) };
                return Err(err.into());
            }
        };

        if let Err(err) =
            unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset()) }
        {
            let _ = self.allocator.lock().free(allocation);
            unsafe { device.destroy_image(image, None) };
            return Err(err.into());
        }

        self.image_memory.insert(image, allocation);
        Ok(image)
    }

    pub(super) fn free_image(&mut self, image: vk::Image) {
        unsafe { self.context.device.destroy_image(image, None) };
        if let Some(allocation) = self.image_memory.remove(&image) {
            if let Err(err) = self.allocator.lock().free(allocation) {
                log::warn!("Failed to free image memory: {}", err);
            }
        }
    }

    /// Return every outstanding allocation to the allocator
    pub(super) fn free_all_memory(&mut self) {
        let mut allocator = self.allocator.lock();
        let leaked = self.buffer_memory.len() + self.image_memory.len();
        if leaked > 0 {
            log::warn!("{} allocations still alive at shutdown", leaked);
        }
        for (buffer, allocation) in self.buffer_memory.drain() {
            unsafe { self.context.device.destroy_buffer(buffer, None) };
            let _ = allocator.free(allocation);
        }
        for (image, allocation) in self.image_memory.drain() {
            unsafe { self.context.device.destroy_image(image, None) };
            let _ = allocator.free(allocation);
        }
    }
}
