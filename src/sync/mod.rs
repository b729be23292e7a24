// Synchronization - resource access tracking and barrier batching

pub mod access;
pub mod barrier;
pub mod classify;

pub use access::{
    Access, AccessRequest, AccessSequence, BufferDependency, BufferState, ImageDependency,
    ImageState,
};
pub use barrier::{BarrierBatch, BufferBarrier, ImageBarrier};
pub use classify::PassKind;
