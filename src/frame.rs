// Frame ring - N-buffered frame lifecycle
//
// Each ring slot owns a command encoder, a fence signalled when its last
// submission retires, and the semaphores that chain acquire -> submit ->
// present. `tail_frame` is the oldest frame that may still be in flight;
// anything released before it can be destroyed.

use ash::vk;

use crate::backend::Backend;
use crate::encoder::CommandEncoder;
use crate::error::Result;
use crate::resources::{BufferId, FramebufferId, ImageId, ImageViewId, SwapchainId};
use crate::types::FrameInfo;

/// Largest supported ring depth
pub const MAX_BUFFERING: u32 = 4;

/// Oldest frame that may still be executing
pub fn tail_frame(current_frame: u64, buffering: u32) -> u64 {
    current_frame.max(buffering as u64) - buffering as u64
}

/// Native sync objects of one ring slot
pub(crate) struct FrameSlot {
    pub encoder: CommandEncoder,
    pub acquire_semaphore: vk::Semaphore,
    pub submit_semaphore: vk::Semaphore,
    pub submit_fence: vk::Fence,
}

impl FrameSlot {
    fn create<B: Backend>(backend: &mut B, arg_pool_capacity: usize) -> Result<Self> {
        let (command_pool, command_buffer) = backend.create_command_buffer()?;

        let acquire_semaphore = match backend.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(err) => {
                backend.destroy_command_buffer(command_pool, command_buffer);
                return Err(err);
            }
        };
        let submit_semaphore = match backend.create_semaphore() {
            Ok(semaphore) => semaphore,
            Err(err) => {
                backend.destroy_semaphore(acquire_semaphore);
                backend.destroy_command_buffer(command_pool, command_buffer);
                return Err(err);
            }
        };
        // Signaled so the first wait on each slot returns at once
        let submit_fence = match backend.create_fence(true) {
            Ok(fence) => fence,
            Err(err) => {
                backend.destroy_semaphore(submit_semaphore);
                backend.destroy_semaphore(acquire_semaphore);
                backend.destroy_command_buffer(command_pool, command_buffer);
                return Err(err);
            }
        };

        Ok(Self {
            encoder: CommandEncoder::new(command_pool, command_buffer, arg_pool_capacity),
            acquire_semaphore,
            submit_semaphore,
            submit_fence,
        })
    }

    fn destroy<B: Backend>(self, backend: &mut B) {
        backend.destroy_fence(self.submit_fence);
        backend.destroy_semaphore(self.submit_semaphore);
        backend.destroy_semaphore(self.acquire_semaphore);
        backend.destroy_command_buffer(self.encoder.command_pool, self.encoder.command_buffer);
    }
}

pub struct FrameContext {
    buffering: u32,
    current_frame: u64,
    tail_frame: u64,
    ring_index: usize,
    pub(crate) slots: Vec<FrameSlot>,
    /// Swapchain passed to the open `begin_frame`, if any
    pub(crate) swapchain: Option<SwapchainId>,
    /// Whether the open frame acquired a swapchain image
    pub(crate) acquired: bool,
}

impl FrameContext {
    pub fn new<B: Backend>(backend: &mut B, buffering: u32, arg_pool_capacity: usize) -> Result<Self> {
        assert!(
            (1..=MAX_BUFFERING).contains(&buffering),
            "frame buffering must be within 1..={}, got {}",
            MAX_BUFFERING,
            buffering
        );

        let mut slots = Vec::with_capacity(buffering as usize);
        for _ in 0..buffering {
            match FrameSlot::create(backend, arg_pool_capacity) {
                Ok(slot) => slots.push(slot),
                Err(err) => {
                    for slot in slots {
                        slot.destroy(backend);
                    }
                    return Err(err);
                }
            }
        }

        log::debug!("Created frame ring with {} slots", buffering);
        Ok(Self {
            buffering,
            current_frame: 0,
            tail_frame: 0,
            ring_index: 0,
            slots,
            swapchain: None,
            acquired: false,
        })
    }

    pub fn buffering(&self) -> u32 {
        self.buffering
    }

    pub fn current_frame(&self) -> u64 {
        self.current_frame
    }

    pub fn tail_frame(&self) -> u64 {
        self.tail_frame
    }

    pub fn ring_index(&self) -> usize {
        self.ring_index
    }

    pub fn info(&self) -> FrameInfo {
        FrameInfo {
            current: self.current_frame,
            tail: self.tail_frame,
            ring_index: self.ring_index,
            buffering: self.buffering,
        }
    }

    pub(crate) fn slot(&self) -> &FrameSlot {
        &self.slots[self.ring_index]
    }

    pub(crate) fn slot_mut(&mut self) -> &mut FrameSlot {
        &mut self.slots[self.ring_index]
    }

    /// Step to the next frame after a submission
    pub(crate) fn advance(&mut self) {
        self.current_frame += 1;
        self.tail_frame = tail_frame(self.current_frame, self.buffering);
        self.ring_index = (self.ring_index + 1) % self.buffering as usize;
    }

    pub(crate) fn destroy<B: Backend>(&mut self, backend: &mut B) {
        for slot in self.slots.drain(..) {
            slot.destroy(backend);
        }
    }
}

/// An object whose destruction waits for the frames that may use it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    Buffer(BufferId),
    Image(ImageId),
    ImageView(ImageViewId),
    Framebuffer(FramebufferId),
}

/// Released objects, in release order, stamped with the frame they were released in
#[derive(Debug, Default)]
pub struct ReleaseQueue {
    entries: Vec<(u64, Released)>,
}

impl ReleaseQueue {
    pub fn push(&mut self, stamp: u64, object: Released) {
        self.entries.push((stamp, object));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return every entry stamped before `tail`
    pub fn drain_retired(&mut self, tail: u64) -> Vec<Released> {
        let mut retired = Vec::new();
        self.entries.retain(|&(stamp, object)| {
            if stamp < tail {
                retired.push(object);
                false
            } else {
                true
            }
        });
        retired
    }

    pub fn drain_all(&mut self) -> Vec<Released> {
        self.entries.drain(..).map(|(_, object)| object).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::StubBackend;
    use slotmap::KeyData;

    #[test]
    fn tail_frame_lags_by_buffering() {
        assert_eq!(tail_frame(5, 3), 2);
        assert_eq!(tail_frame(3, 3), 0);
        assert_eq!(tail_frame(1, 3), 0);
        assert_eq!(tail_frame(0, 1), 0);
    }

    #[test]
    fn advance_wraps_ring_index() {
        let mut backend = StubBackend::new();
        let mut frames = FrameContext::new(&mut backend, 2, 1024).unwrap();
        frames.advance();
        frames.advance();
        frames.advance();

        assert_eq!(
            frames.info(),
            FrameInfo {
                current: 3,
                tail: 1,
                ring_index: 1,
                buffering: 2,
            }
        );
    }

    #[test]
    fn partial_creation_is_torn_down() {
        let mut backend = StubBackend::new();
        // Slot 0 takes five handles; fail the fence of slot 1
        backend.fail_nth_create(9, crate::error::Status::OutOfHostMemory);
        assert!(FrameContext::new(&mut backend, 2, 1024).is_err());
    }

    #[test]
    #[should_panic(expected = "frame buffering must be within")]
    fn zero_buffering_panics() {
        let mut backend = StubBackend::new();
        let _ = FrameContext::new(&mut backend, 0, 1024);
    }

    #[test]
    fn release_queue_keeps_young_entries() {
        let buffer = BufferId::from(KeyData::from_ffi(1));
        let image = ImageId::from(KeyData::from_ffi(2));
        let mut queue = ReleaseQueue::default();
        queue.push(0, Released::Buffer(buffer));
        queue.push(2, Released::Image(image));

        assert_eq!(queue.drain_retired(1), vec![Released::Buffer(buffer)]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.drain_all(), vec![Released::Image(image)]);
        assert!(queue.is_empty());
    }
}
