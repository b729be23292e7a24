// =============================================================================
// VK-ENCODER - GPU command submission and resource synchronization
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  Device (objects, descriptor heap, frame ring, swapchains)      │
// │    └── Encoder (transfer, compute pass, deferred render pass)   │
// │          └── Access tracker (per-resource barrier derivation)   │
// │                └── Backend (Vulkan via ash, or the call stub)   │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. begin_frame: wait on the ring slot's fence, acquire a swapchain image
// 2. Record through device.encoder(); barriers are derived as commands land
// 3. submit_frame: transition the image for present, submit, present
// 4. Objects released during a frame die once it can no longer be in flight
//
// =============================================================================

pub mod backend;
pub mod config;
pub mod descriptor;
pub mod device;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod resources;
pub mod sync;
pub mod types;

pub use backend::{Backend, BackendKind, NativeCall, StubBackend, VulkanBackend};
pub use config::Config;
pub use descriptor::{HeapStats, PoolStats};
pub use device::{Device, DeviceSettings};
pub use encoder::{Encoder, EncoderState};
pub use error::{Result, Status};
pub use resources::{
    BufferId, BufferViewId, ComputePipelineId, DescriptorSetId, DescriptorSetLayoutId,
    FramebufferId, GraphicsPipelineId, ImageId, ImageViewId, RenderPassId, SamplerId, ShaderId,
    SwapchainId,
};
pub use types::*;
