// Barrier batching
//
// Dependencies produced for one emission point are merged into a single
// native pipeline barrier: stage masks are OR-ed and the per-resource memory
// barriers are listed side by side.

use ash::vk;

use super::access::{AccessRequest, BufferDependency, ImageDependency};
use crate::resources::{Buffer, Image};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBarrier {
    pub buffer: vk::Buffer,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub offset: u64,
    pub size: u64,
}

/// Covers every mip level and array layer of `aspects`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub aspects: vk::ImageAspectFlags,
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BarrierBatch {
    pub src_stages: vk::PipelineStageFlags,
    pub dst_stages: vk::PipelineStageFlags,
    pub buffers: Vec<BufferBarrier>,
    pub images: Vec<ImageBarrier>,
}

impl BarrierBatch {
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.images.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffers.len() + self.images.len()
    }

    pub fn clear(&mut self) {
        self.src_stages = vk::PipelineStageFlags::empty();
        self.dst_stages = vk::PipelineStageFlags::empty();
        self.buffers.clear();
        self.images.clear();
    }

    pub fn push_buffer(&mut self, buffer: vk::Buffer, dep: BufferDependency) {
        self.src_stages |= dep.src.stages;
        self.dst_stages |= dep.dst.stages;
        self.buffers.push(BufferBarrier {
            buffer,
            src_access: dep.src.access,
            dst_access: dep.dst.access,
            offset: 0,
            size: vk::WHOLE_SIZE,
        });
    }

    pub fn push_image(
        &mut self,
        image: vk::Image,
        aspects: vk::ImageAspectFlags,
        dep: ImageDependency,
    ) {
        self.src_stages |= dep.src.stages;
        self.dst_stages |= dep.dst.stages;
        self.images.push(ImageBarrier {
            image,
            aspects,
            src_access: dep.src.access,
            dst_access: dep.dst.access,
            old_layout: dep.old_layout,
            new_layout: dep.new_layout,
        });
    }

    /// Run `request` through the buffer's tracker and queue any resulting barrier
    pub fn access_buffer(&mut self, buffer: &mut Buffer, request: &AccessRequest) {
        if let Some(dep) = buffer.state.sync(request) {
            self.push_buffer(buffer.vk, dep);
        }
    }

    /// Run `request` through the image's tracker and queue any resulting barrier
    pub fn access_image(&mut self, image: &mut Image, request: &AccessRequest) {
        if let Some(dep) = image.state.sync(request) {
            self.push_image(image.vk, image.desc.aspects, dep);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::access::Access;
    use ash::vk::Handle;

    #[test]
    fn merges_stage_masks() {
        let mut batch = BarrierBatch::default();
        batch.push_buffer(
            vk::Buffer::from_raw(1),
            BufferDependency {
                src: Access::new(
                    vk::PipelineStageFlags::TRANSFER,
                    vk::AccessFlags::TRANSFER_WRITE,
                ),
                dst: Access::new(
                    vk::PipelineStageFlags::COMPUTE_SHADER,
                    vk::AccessFlags::SHADER_READ,
                ),
            },
        );
        batch.push_image(
            vk::Image::from_raw(2),
            vk::ImageAspectFlags::COLOR,
            ImageDependency {
                src: Access::default(),
                dst: Access::new(
                    vk::PipelineStageFlags::FRAGMENT_SHADER,
                    vk::AccessFlags::SHADER_READ,
                ),
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            },
        );

        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.src_stages,
            vk::PipelineStageFlags::TRANSFER | vk::PipelineStageFlags::TOP_OF_PIPE
        );
        assert_eq!(
            batch.dst_stages,
            vk::PipelineStageFlags::COMPUTE_SHADER | vk::PipelineStageFlags::FRAGMENT_SHADER
        );

        batch.clear();
        assert!(batch.is_empty());
        assert!(batch.src_stages.is_empty());
    }
}
