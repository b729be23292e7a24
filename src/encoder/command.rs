// Deferred render pass commands and their argument arena
//
// Commands recorded inside a render pass are stored as plain values. Their
// variable-length payloads live in an `ArgPool` owned by the pass and are
// referenced through `ArgSlice` handles, which only resolve against the arena
// generation that produced them.

use std::marker::PhantomData;

use ash::vk;
use glam::Vec4;

use crate::error::{Result, Status};
use crate::resources::{BufferId, DescriptorSetId, GraphicsPipelineId};
use crate::types::Viewport;

/// Typed window into an `ArgPool` lane
pub struct ArgSlice<T> {
    offset: u32,
    len: u32,
    epoch: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ArgSlice<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ArgSlice<T> {}

impl<T> std::fmt::Debug for ArgSlice<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgSlice")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .field("epoch", &self.epoch)
            .finish()
    }
}

impl<T> ArgSlice<T> {
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// A payload element type with its own lane in the arena
pub trait Arg: Copy {
    fn lane(pool: &ArgPool) -> &Vec<Self>;
    fn lane_mut(pool: &mut ArgPool) -> &mut Vec<Self>;
}

macro_rules! arg_lane {
    ($ty:ty => $field:ident) => {
        impl Arg for $ty {
            fn lane(pool: &ArgPool) -> &Vec<Self> {
                &pool.$field
            }

            fn lane_mut(pool: &mut ArgPool) -> &mut Vec<Self> {
                &mut pool.$field
            }
        }
    };
}

arg_lane!(u8 => bytes);
arg_lane!(u32 => words);
arg_lane!(u64 => offsets);
arg_lane!(BufferId => buffers);
arg_lane!(DescriptorSetId => descriptor_sets);

/// Bump arena for render pass payloads, reset once per pass
pub struct ArgPool {
    capacity: usize,
    used: usize,
    epoch: u32,
    bytes: Vec<u8>,
    words: Vec<u32>,
    offsets: Vec<u64>,
    buffers: Vec<BufferId>,
    descriptor_sets: Vec<DescriptorSetId>,
}

impl ArgPool {
    /// `capacity` bounds the total payload size in bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: 0,
            epoch: 0,
            bytes: Vec::new(),
            words: Vec::new(),
            offsets: Vec::new(),
            buffers: Vec::new(),
            descriptor_sets: Vec::new(),
        }
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn push<T: Arg>(&mut self, data: &[T]) -> Result<ArgSlice<T>> {
        let size = std::mem::size_of_val(data);
        if self.used + size > self.capacity {
            return Err(Status::OutOfHostMemory);
        }

        let epoch = self.epoch;
        let lane = T::lane_mut(self);
        lane.try_reserve(data.len())
            .map_err(|_| Status::OutOfHostMemory)?;
        let offset = lane.len() as u32;
        lane.extend_from_slice(data);
        self.used += size;

        Ok(ArgSlice {
            offset,
            len: data.len() as u32,
            epoch,
            _marker: PhantomData,
        })
    }

    pub fn get<T: Arg>(&self, slice: ArgSlice<T>) -> &[T] {
        assert_eq!(
            slice.epoch, self.epoch,
            "argument slice used after its arena was reset"
        );
        let start = slice.offset as usize;
        &T::lane(self)[start..start + slice.len as usize]
    }

    /// Drop every payload; outstanding slices stop resolving
    pub fn reset(&mut self) {
        self.bytes.clear();
        self.words.clear();
        self.offsets.clear();
        self.buffers.clear();
        self.descriptor_sets.clear();
        self.used = 0;
        self.epoch = self.epoch.wrapping_add(1);
    }
}

/// A render pass command awaiting replay
#[derive(Debug, Clone, Copy)]
pub enum Command {
    BindPipeline(GraphicsPipelineId),
    BindDescriptorSets {
        sets: ArgSlice<DescriptorSetId>,
        dynamic_offsets: ArgSlice<u32>,
    },
    PushConstants(ArgSlice<u8>),
    SetViewport(Viewport),
    SetScissor(vk::Rect2D),
    SetBlendConstant(Vec4),
    SetStencilCompareMask {
        faces: vk::StencilFaceFlags,
        mask: u32,
    },
    SetStencilReference {
        faces: vk::StencilFaceFlags,
        reference: u32,
    },
    SetStencilWriteMask {
        faces: vk::StencilFaceFlags,
        mask: u32,
    },
    BindVertexBuffers {
        buffers: ArgSlice<BufferId>,
        offsets: ArgSlice<u64>,
    },
    BindIndexBuffer {
        buffer: BufferId,
        offset: u64,
        index_type: vk::IndexType,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    DrawIndirect {
        buffer: BufferId,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
    DrawIndexedIndirect {
        buffer: BufferId,
        offset: u64,
        draw_count: u32,
        stride: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_resolve_within_their_epoch() {
        let mut pool = ArgPool::new(64);
        let words = pool.push(&[1u32, 2, 3]).unwrap();
        let bytes = pool.push(&[7u8; 4]).unwrap();

        assert_eq!(pool.get(words), &[1, 2, 3]);
        assert_eq!(pool.get(bytes), &[7, 7, 7, 7]);
        assert_eq!(pool.used(), 16);
    }

    #[test]
    fn exceeding_capacity_is_out_of_host_memory() {
        let mut pool = ArgPool::new(8);
        pool.push(&[0u32; 2]).unwrap();
        assert_eq!(pool.push(&[0u8]).unwrap_err(), Status::OutOfHostMemory);
    }

    #[test]
    fn reset_reclaims_capacity() {
        let mut pool = ArgPool::new(8);
        pool.push(&[0u64]).unwrap();
        pool.reset();
        assert_eq!(pool.used(), 0);
        assert!(pool.push(&[0u64]).is_ok());
    }

    #[test]
    #[should_panic(expected = "argument slice used after its arena was reset")]
    fn stale_slice_panics() {
        let mut pool = ArgPool::new(64);
        let slice = pool.push(&[5u32]).unwrap();
        pool.reset();
        pool.get(slice);
    }
}
