// Resource access tracker
//
// Every buffer and image carries a small state machine describing how the GPU
// has touched it since the last barrier. Feeding an upcoming access through
// `sync` updates that state and yields the dependency (if any) the caller
// must record before the access.

use ash::vk;

const READ_ACCESS: vk::AccessFlags = vk::AccessFlags::from_raw(
    vk::AccessFlags::INDIRECT_COMMAND_READ.as_raw()
        | vk::AccessFlags::INDEX_READ.as_raw()
        | vk::AccessFlags::VERTEX_ATTRIBUTE_READ.as_raw()
        | vk::AccessFlags::UNIFORM_READ.as_raw()
        | vk::AccessFlags::INPUT_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags::SHADER_READ.as_raw()
        | vk::AccessFlags::COLOR_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags::TRANSFER_READ.as_raw()
        | vk::AccessFlags::HOST_READ.as_raw()
        | vk::AccessFlags::MEMORY_READ.as_raw(),
);

const WRITE_ACCESS: vk::AccessFlags = vk::AccessFlags::from_raw(
    vk::AccessFlags::SHADER_WRITE.as_raw()
        | vk::AccessFlags::COLOR_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags::TRANSFER_WRITE.as_raw()
        | vk::AccessFlags::HOST_WRITE.as_raw()
        | vk::AccessFlags::MEMORY_WRITE.as_raw(),
);

pub fn has_read_access(access: vk::AccessFlags) -> bool {
    access.intersects(READ_ACCESS)
}

pub fn has_write_access(access: vk::AccessFlags) -> bool {
    access.intersects(WRITE_ACCESS)
}

/// Where a resource is in its read/write history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessSequence {
    #[default]
    None,
    Reads,
    Write,
    ReadAfterWrite,
}

/// A (stages, access) pair: one side of a memory dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub stages: vk::PipelineStageFlags,
    pub access: vk::AccessFlags,
}

impl Default for Access {
    fn default() -> Self {
        Self {
            stages: vk::PipelineStageFlags::TOP_OF_PIPE,
            access: vk::AccessFlags::NONE,
        }
    }
}

impl Access {
    pub const fn new(stages: vk::PipelineStageFlags, access: vk::AccessFlags) -> Self {
        Self { stages, access }
    }

    fn union(self, other: Access) -> Access {
        Access {
            stages: self.stages | other.stages,
            access: self.access | other.access,
        }
    }
}

/// What an upcoming GPU operation will do to a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRequest {
    pub stages: vk::PipelineStageFlags,
    pub access: vk::AccessFlags,
    /// Images only; `None` keeps the current layout
    pub layout: Option<vk::ImageLayout>,
}

impl AccessRequest {
    pub const fn buffer(stages: vk::PipelineStageFlags, access: vk::AccessFlags) -> Self {
        Self {
            stages,
            access,
            layout: None,
        }
    }

    pub const fn image(
        stages: vk::PipelineStageFlags,
        access: vk::AccessFlags,
        layout: vk::ImageLayout,
    ) -> Self {
        Self {
            stages,
            access,
            layout: Some(layout),
        }
    }

    fn as_access(&self) -> Access {
        Access::new(self.stages, self.access)
    }
}

/// Execution + memory dependency required before a buffer access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDependency {
    pub src: Access,
    pub dst: Access,
}

/// Dependency required before an image access, including its layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDependency {
    pub src: Access,
    pub dst: Access,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}

/// Outcome of one step of the state machine, shared by buffers and images
enum Step {
    Keep,
    Barrier(Access),
    FirstTransition,
}

/// Core transition table. `slot0` holds the last write or the coalesced reads,
/// `slot1` the reads issued since the last write.
fn step(
    sequence: &mut AccessSequence,
    slots: &mut [Access; 2],
    request: Access,
    has_read: bool,
    has_write: bool,
) -> Step {
    match *sequence {
        AccessSequence::None => {
            if has_write {
                *sequence = AccessSequence::Write;
                slots[0] = request;
                Step::FirstTransition
            } else if has_read {
                *sequence = AccessSequence::Reads;
                slots[0] = request;
                Step::Keep
            } else {
                Step::Keep
            }
        }
        AccessSequence::Reads => {
            if has_write {
                let readers = slots[0];
                *sequence = AccessSequence::Write;
                *slots = [request, Access::default()];
                Step::Barrier(readers)
            } else {
                if has_read {
                    slots[0] = slots[0].union(request);
                }
                Step::Keep
            }
        }
        AccessSequence::Write => {
            let writer = slots[0];
            if has_write {
                slots[0] = request;
                Step::Barrier(writer)
            } else if has_read {
                *sequence = AccessSequence::ReadAfterWrite;
                slots[1] = request;
                Step::Barrier(writer)
            } else {
                Step::Keep
            }
        }
        AccessSequence::ReadAfterWrite => {
            if has_write {
                let readers = slots[1];
                *sequence = AccessSequence::Write;
                *slots = [request, Access::default()];
                Step::Barrier(readers)
            } else if has_read {
                // Already covered if a prior post-write reader shares any
                // stage and any access bit with this one.
                if slots[1].stages.intersects(request.stages)
                    && slots[1].access.intersects(request.access)
                {
                    return Step::Keep;
                }
                slots[1] = slots[1].union(request);
                Step::Barrier(slots[0])
            } else {
                Step::Keep
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferState {
    pub sequence: AccessSequence,
    pub access: [Access; 2],
}

impl BufferState {
    /// Advance the state for `request`, returning the barrier to record first
    pub fn sync(&mut self, request: &AccessRequest) -> Option<BufferDependency> {
        let dst = request.as_access();
        let has_read = has_read_access(request.access);
        let has_write = has_write_access(request.access);

        match step(&mut self.sequence, &mut self.access, dst, has_read, has_write) {
            Step::Keep | Step::FirstTransition => None,
            Step::Barrier(src) => Some(BufferDependency { src, dst }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageState {
    pub sequence: AccessSequence,
    pub access: [Access; 2],
    pub layout: vk::ImageLayout,
}

impl Default for ImageState {
    fn default() -> Self {
        Self {
            sequence: AccessSequence::None,
            access: [Access::default(); 2],
            layout: vk::ImageLayout::UNDEFINED,
        }
    }
}

impl ImageState {
    /// Advance the state for `request`. A layout change counts as a write,
    /// so even read-only accesses can produce a transition.
    pub fn sync(&mut self, request: &AccessRequest) -> Option<ImageDependency> {
        let dst = request.as_access();
        let old_layout = self.layout;
        let new_layout = request.layout.unwrap_or(old_layout);
        let needs_transition = new_layout != old_layout;
        let has_read = has_read_access(request.access);
        let has_write = has_write_access(request.access) || needs_transition;

        let outcome = step(&mut self.sequence, &mut self.access, dst, has_read, has_write);
        if has_write {
            self.layout = new_layout;
        }

        let src = match outcome {
            Step::Keep => return None,
            Step::FirstTransition if !needs_transition => return None,
            Step::FirstTransition => Access::default(),
            Step::Barrier(src) => src,
        };

        Some(ImageDependency {
            src,
            dst,
            old_layout,
            new_layout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPUTE: vk::PipelineStageFlags = vk::PipelineStageFlags::COMPUTE_SHADER;
    const FRAGMENT: vk::PipelineStageFlags = vk::PipelineStageFlags::FRAGMENT_SHADER;

    fn read(stages: vk::PipelineStageFlags) -> AccessRequest {
        AccessRequest::buffer(stages, vk::AccessFlags::SHADER_READ)
    }

    fn write(stages: vk::PipelineStageFlags) -> AccessRequest {
        AccessRequest::buffer(stages, vk::AccessFlags::SHADER_WRITE)
    }

    #[test]
    fn first_access_needs_no_barrier() {
        let mut state = BufferState::default();
        assert_eq!(state.sync(&write(COMPUTE)), None);
        assert_eq!(state.sequence, AccessSequence::Write);

        let mut state = BufferState::default();
        assert_eq!(state.sync(&read(COMPUTE)), None);
        assert_eq!(state.sequence, AccessSequence::Reads);
    }

    #[test]
    fn consecutive_reads_coalesce() {
        let mut state = BufferState::default();
        for stages in [COMPUTE, FRAGMENT, vk::PipelineStageFlags::VERTEX_SHADER] {
            assert_eq!(state.sync(&read(stages)), None);
        }
        assert_eq!(state.sequence, AccessSequence::Reads);
        assert_eq!(
            state.access[0].stages,
            COMPUTE | FRAGMENT | vk::PipelineStageFlags::VERTEX_SHADER
        );
    }

    #[test]
    fn write_after_reads_waits_on_union_of_readers() {
        let mut state = BufferState::default();
        state.sync(&read(COMPUTE));
        state.sync(&AccessRequest::buffer(FRAGMENT, vk::AccessFlags::UNIFORM_READ));

        let dep = state.sync(&write(COMPUTE)).expect("barrier");
        assert_eq!(dep.src.stages, COMPUTE | FRAGMENT);
        assert_eq!(
            dep.src.access,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::UNIFORM_READ
        );
        assert_eq!(dep.dst, Access::new(COMPUTE, vk::AccessFlags::SHADER_WRITE));
        assert_eq!(state.sequence, AccessSequence::Write);
        assert_eq!(state.access[1], Access::default());
    }

    #[test]
    fn read_after_write_waits_on_writer() {
        let mut state = BufferState::default();
        state.sync(&write(COMPUTE));

        let dep = state.sync(&read(FRAGMENT)).expect("barrier");
        assert_eq!(dep.src, Access::new(COMPUTE, vk::AccessFlags::SHADER_WRITE));
        assert_eq!(state.sequence, AccessSequence::ReadAfterWrite);
        assert_eq!(state.access[1], Access::new(FRAGMENT, vk::AccessFlags::SHADER_READ));
    }

    #[test]
    fn write_after_write_waits_on_previous_writer_only() {
        let mut state = BufferState::default();
        state.sync(&AccessRequest::buffer(
            vk::PipelineStageFlags::TRANSFER,
            vk::AccessFlags::TRANSFER_WRITE,
        ));
        let dep = state.sync(&write(COMPUTE)).expect("barrier");
        assert_eq!(
            dep.src,
            Access::new(vk::PipelineStageFlags::TRANSFER, vk::AccessFlags::TRANSFER_WRITE)
        );
    }

    #[test]
    fn write_after_read_after_write_waits_on_post_write_readers() {
        let mut state = BufferState::default();
        state.sync(&write(COMPUTE));
        state.sync(&read(FRAGMENT));

        let dep = state.sync(&write(COMPUTE)).expect("barrier");
        assert_eq!(dep.src, Access::new(FRAGMENT, vk::AccessFlags::SHADER_READ));
        assert_eq!(state.sequence, AccessSequence::Write);
    }

    #[test]
    fn read_after_write_skips_when_stage_and_access_intersect() {
        let mut state = BufferState::default();
        state.sync(&write(COMPUTE));
        state.sync(&AccessRequest::buffer(
            COMPUTE | FRAGMENT,
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::UNIFORM_READ,
        ));

        // Only partially covered by the earlier reader, but the intersection
        // test treats it as already synchronized.
        let partial = AccessRequest::buffer(
            FRAGMENT | vk::PipelineStageFlags::VERTEX_SHADER,
            vk::AccessFlags::UNIFORM_READ,
        );
        assert_eq!(state.sync(&partial), None);
        assert_eq!(state.sequence, AccessSequence::ReadAfterWrite);
    }

    #[test]
    fn read_after_write_from_new_stage_waits_on_writer() {
        let mut state = BufferState::default();
        state.sync(&write(COMPUTE));
        state.sync(&read(COMPUTE));

        let dep = state
            .sync(&AccessRequest::buffer(
                vk::PipelineStageFlags::DRAW_INDIRECT,
                vk::AccessFlags::INDIRECT_COMMAND_READ,
            ))
            .expect("barrier");
        assert_eq!(dep.src, Access::new(COMPUTE, vk::AccessFlags::SHADER_WRITE));
        assert_eq!(
            state.access[1].stages,
            COMPUTE | vk::PipelineStageFlags::DRAW_INDIRECT
        );
    }

    #[test]
    fn empty_request_is_ignored() {
        let mut state = BufferState::default();
        state.sync(&write(COMPUTE));
        let before = state;
        assert_eq!(
            state.sync(&AccessRequest::buffer(COMPUTE, vk::AccessFlags::NONE)),
            None
        );
        assert_eq!(state, before);
    }

    #[test]
    fn first_image_use_with_layout_change_transitions_from_top_of_pipe() {
        let mut state = ImageState::default();
        let request = AccessRequest::image(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );

        let dep = state.sync(&request).expect("transition");
        assert_eq!(dep.src, Access::default());
        assert_eq!(dep.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(dep.new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(state.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn layout_change_turns_a_read_into_a_write() {
        let mut state = ImageState::default();
        let sampled = AccessRequest::image(
            FRAGMENT,
            vk::AccessFlags::SHADER_READ,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert!(state.sync(&sampled).is_some());
        assert_eq!(state.sequence, AccessSequence::Write);

        // Same layout again: a plain read after the transition
        let dep = state.sync(&sampled).expect("read after transition");
        assert_eq!(dep.old_layout, dep.new_layout);
        assert_eq!(state.sequence, AccessSequence::ReadAfterWrite);

        // Two reads wanting different layouts serialize
        let storage_read = AccessRequest::image(
            COMPUTE,
            vk::AccessFlags::SHADER_READ,
            vk::ImageLayout::GENERAL,
        );
        let dep = state.sync(&storage_read).expect("layout change");
        assert_eq!(dep.src, Access::new(FRAGMENT, vk::AccessFlags::SHADER_READ));
        assert_eq!(dep.new_layout, vk::ImageLayout::GENERAL);
    }

    #[test]
    fn image_read_without_layout_keeps_layout() {
        let mut state = ImageState {
            layout: vk::ImageLayout::GENERAL,
            ..Default::default()
        };
        let request = AccessRequest {
            stages: COMPUTE,
            access: vk::AccessFlags::SHADER_READ,
            layout: None,
        };
        assert_eq!(state.sync(&request), None);
        assert_eq!(state.layout, vk::ImageLayout::GENERAL);
        assert_eq!(state.sequence, AccessSequence::Reads);
    }
}
