// Descriptor Heap - pooled descriptor set allocation
//
// Responsibilities:
// - Layout creation (at most one variable-length binding, always last)
// - Set allocation from a growable list of native pools
// - Per-type availability accounting, restored on release
// - Descriptor writes, validated against resource usage flags
//
// A pool fits a request when it still has a free set slot and enough
// descriptors of every type the layout uses. When no pool fits, a new one is
// created large enough for the request and appended.

use ash::vk;

use crate::backend::{Backend, DescriptorPayload, DescriptorWrite};
use crate::error::{Result, Status};
use crate::resources::{
    resolve, resolve_mut, BindingResources, DescriptorBinding, DescriptorSet, DescriptorSetId,
    DescriptorSetLayout, DescriptorSetLayoutId, Resources,
};
use crate::sync::classify::{self, PassKind};
use crate::types::{DescriptorSetLayoutDesc, DescriptorSetUpdate, NUM_DESCRIPTOR_TYPES};

/// One native pool plus what is left in it
#[derive(Debug)]
pub struct DescriptorPool {
    pub vk: vk::DescriptorPool,
    pub avail: [u32; NUM_DESCRIPTOR_TYPES],
    pub avail_sets: u32,
}

impl DescriptorPool {
    fn fits(&self, requested: &[u32; NUM_DESCRIPTOR_TYPES]) -> bool {
        self.avail_sets > 0
            && self
                .avail
                .iter()
                .zip(requested)
                .all(|(avail, requested)| avail >= requested)
    }

    fn take(&mut self, requested: &[u32; NUM_DESCRIPTOR_TYPES]) {
        for (avail, requested) in self.avail.iter_mut().zip(requested) {
            *avail -= requested;
        }
        self.avail_sets -= 1;
    }

    fn give_back(&mut self, requested: &[u32; NUM_DESCRIPTOR_TYPES]) {
        for (avail, requested) in self.avail.iter_mut().zip(requested) {
            *avail += requested;
        }
        self.avail_sets += 1;
    }
}

/// Availability snapshot of one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub avail: [u32; NUM_DESCRIPTOR_TYPES],
    pub avail_sets: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapStats {
    pub pools: Vec<PoolStats>,
}

impl HeapStats {
    pub fn num_pools(&self) -> usize {
        self.pools.len()
    }
}

/// Descriptor counts a set consumes, per type
fn requested_counts(bindings: &[DescriptorBinding]) -> [u32; NUM_DESCRIPTOR_TYPES] {
    let mut requested = [0; NUM_DESCRIPTOR_TYPES];
    for binding in bindings {
        requested[binding.ty.index()] += binding.count;
    }
    requested
}

pub struct DescriptorHeap {
    pools: Vec<DescriptorPool>,
    pool_size: u32,

    // Scratch for native writes, reused across updates
    buffer_infos: Vec<vk::DescriptorBufferInfo>,
    image_infos: Vec<vk::DescriptorImageInfo>,
    texel_views: Vec<vk::BufferView>,
}

impl DescriptorHeap {
    pub fn new(pool_size: u32) -> Self {
        assert!(pool_size > 0, "descriptor pool size must be non-zero");
        Self {
            pools: Vec::new(),
            pool_size,
            buffer_infos: Vec::new(),
            image_infos: Vec::new(),
            texel_views: Vec::new(),
        }
    }

    pub fn pool_size(&self) -> u32 {
        self.pool_size
    }

    pub fn stats(&self) -> HeapStats {
        HeapStats {
            pools: self
                .pools
                .iter()
                .map(|pool| PoolStats {
                    avail: pool.avail,
                    avail_sets: pool.avail_sets,
                })
                .collect(),
        }
    }

    pub fn create_layout<B: Backend>(
        &mut self,
        backend: &mut B,
        resources: &mut Resources,
        desc: &DescriptorSetLayoutDesc<'_>,
    ) -> Result<DescriptorSetLayoutId> {
        assert!(
            !desc.bindings.is_empty(),
            "descriptor set layout '{}' has no bindings",
            desc.label
        );
        for (index, binding) in desc.bindings.iter().enumerate() {
            assert!(
                binding.count > 0,
                "binding {} of layout '{}' has a zero descriptor count",
                index,
                desc.label
            );
            assert!(
                !binding.is_variable_length || index + 1 == desc.bindings.len(),
                "only the last binding of layout '{}' may be variable-length",
                desc.label
            );
        }
        let num_variable_length = desc
            .bindings
            .iter()
            .filter(|binding| binding.is_variable_length)
            .count() as u32;

        let vk = backend.create_descriptor_set_layout(desc.bindings)?;
        Ok(resources.descriptor_set_layouts.insert(DescriptorSetLayout {
            vk,
            bindings: desc.bindings.to_vec(),
            num_variable_length,
        }))
    }

    pub fn destroy_layout<B: Backend>(
        &mut self,
        backend: &mut B,
        resources: &mut Resources,
        layout: DescriptorSetLayoutId,
    ) {
        let Some(layout) = resources.descriptor_set_layouts.remove(layout) else {
            panic!("stale or invalid descriptor set layout handle {:?}", layout);
        };
        backend.destroy_descriptor_set_layout(layout.vk);
    }

    /// Allocate a set of `layout`, growing the heap when no pool has room
    pub fn allocate<B: Backend>(
        &mut self,
        backend: &mut B,
        resources: &mut Resources,
        layout_id: DescriptorSetLayoutId,
        variable_lengths: &[u32],
    ) -> Result<DescriptorSetId> {
        let layout = resources.descriptor_set_layout(layout_id);
        assert_eq!(
            variable_lengths.len() as u32,
            layout.num_variable_length,
            "expected {} variable-length counts",
            layout.num_variable_length
        );

        let mut lengths = variable_lengths.iter();
        let mut variable_length = None;
        let bindings: Vec<DescriptorBinding> = layout
            .bindings
            .iter()
            .map(|desc| {
                let next = if desc.is_variable_length {
                    lengths.next()
                } else {
                    None
                };
                let count = match next {
                    Some(&length) => {
                        assert!(
                            (1..=desc.count).contains(&length),
                            "variable-length count {} outside 1..={}",
                            length,
                            desc.count
                        );
                        variable_length = Some(length);
                        length
                    }
                    _ => desc.count,
                };
                DescriptorBinding {
                    ty: desc.ty,
                    count,
                    is_variable_length: desc.is_variable_length,
                    resources: BindingResources::empty(desc.ty, count),
                }
            })
            .collect();
        let requested = requested_counts(&bindings);
        let native_layout = layout.vk;

        let (pool, vk) = self.allocate_native(backend, native_layout, variable_length, &requested)?;
        self.pools[pool].take(&requested);

        Ok(resources.descriptor_sets.insert(DescriptorSet {
            vk,
            pool,
            layout: layout_id,
            bindings,
        }))
    }

    fn allocate_native<B: Backend>(
        &mut self,
        backend: &mut B,
        layout: vk::DescriptorSetLayout,
        variable_length: Option<u32>,
        requested: &[u32; NUM_DESCRIPTOR_TYPES],
    ) -> Result<(usize, vk::DescriptorSet)> {
        for (index, pool) in self.pools.iter().enumerate() {
            if !pool.fits(requested) {
                continue;
            }
            match backend.allocate_descriptor_set(pool.vk, layout, variable_length) {
                Ok(set) => return Ok((index, set)),
                // Counts fit but the driver disagrees; try the next pool
                Err(Status::FragmentedPool | Status::OutOfPoolMemory) => {
                    log::debug!("Descriptor pool {} is fragmented, skipping", index);
                }
                Err(err) => return Err(err),
            }
        }

        // Nothing fits: grow the heap
        let mut sizes = [0; NUM_DESCRIPTOR_TYPES];
        for (size, &requested) in sizes.iter_mut().zip(requested) {
            *size = self.pool_size.max(requested);
        }
        let pool = backend.create_descriptor_pool(&sizes, self.pool_size)?;
        let set = match backend.allocate_descriptor_set(pool, layout, variable_length) {
            Ok(set) => set,
            Err(err) => {
                backend.destroy_descriptor_pool(pool);
                return Err(err);
            }
        };

        log::debug!(
            "Descriptor heap grew to {} pools (pool size {})",
            self.pools.len() + 1,
            self.pool_size
        );
        self.pools.push(DescriptorPool {
            vk: pool,
            avail: sizes,
            avail_sets: self.pool_size,
        });
        Ok((self.pools.len() - 1, set))
    }

    /// Free a set and hand its descriptors back to its pool
    pub fn release<B: Backend>(
        &mut self,
        backend: &mut B,
        resources: &mut Resources,
        set: DescriptorSetId,
    ) {
        let Some(set) = resources.descriptor_sets.remove(set) else {
            panic!("stale or invalid descriptor set handle {:?}", set);
        };
        let pool = &mut self.pools[set.pool];
        pool.give_back(&requested_counts(&set.bindings));
        backend.free_descriptor_set(pool.vk, set.vk);
    }

    /// Write descriptors into one binding of a set
    pub fn update<B: Backend>(
        &mut self,
        backend: &mut B,
        resources: &mut Resources,
        update: &DescriptorSetUpdate<'_>,
    ) {
        let Resources {
            buffers,
            buffer_views,
            images,
            image_views,
            samplers,
            descriptor_sets,
            ..
        } = resources;
        let set = resolve_mut(descriptor_sets, update.set, "descriptor set");
        let native_set = set.vk;
        let num_bindings = set.bindings.len();
        let Some(binding) = set.bindings.get_mut(update.binding as usize) else {
            panic!(
                "binding {} out of range (set has {} bindings)",
                update.binding, num_bindings
            );
        };
        let ty = binding.ty;

        let count = if ty.is_buffer() {
            update.buffers.len()
        } else if ty.is_texel_buffer() {
            update.texel_buffers.len()
        } else {
            update.images.len()
        };
        assert!(count > 0, "descriptor update for binding {} is empty", update.binding);
        assert!(
            update.element as u64 + count as u64 <= binding.count as u64,
            "descriptor update writes elements {}..{} of a {}-element binding",
            update.element,
            update.element as usize + count,
            binding.count
        );
        let first = update.element as usize;

        let payload = match &mut binding.resources {
            BindingResources::Buffers(bound) => {
                self.buffer_infos.clear();
                for (slot, info) in update.buffers.iter().enumerate() {
                    let buffer = resolve(buffers, info.buffer, "buffer");
                    assert!(
                        buffer.desc.usage.contains(ty.required_buffer_usage()),
                        "buffer '{}' lacks {:?} usage for a {:?} binding",
                        buffer.desc.label,
                        ty.required_buffer_usage(),
                        ty
                    );
                    assert!(
                        info.offset <= buffer.desc.size
                            && (info.size == vk::WHOLE_SIZE
                                || info.offset + info.size <= buffer.desc.size),
                        "buffer binding range exceeds buffer '{}'",
                        buffer.desc.label
                    );
                    self.buffer_infos.push(vk::DescriptorBufferInfo {
                        buffer: buffer.vk,
                        offset: info.offset,
                        range: info.size,
                    });
                    bound[first + slot] = Some(info.buffer);
                }
                DescriptorPayload::Buffers(&self.buffer_infos)
            }
            BindingResources::TexelBuffers(bound) => {
                self.texel_views.clear();
                for (slot, &view_id) in update.texel_buffers.iter().enumerate() {
                    let view = resolve(buffer_views, view_id, "buffer view");
                    let buffer = resolve(buffers, view.desc.buffer, "buffer");
                    assert!(
                        buffer.desc.usage.contains(ty.required_buffer_usage()),
                        "buffer '{}' lacks {:?} usage for a {:?} binding",
                        buffer.desc.label,
                        ty.required_buffer_usage(),
                        ty
                    );
                    self.texel_views.push(view.vk);
                    bound[first + slot] = Some(view_id);
                }
                DescriptorPayload::TexelBuffers(&self.texel_views)
            }
            BindingResources::Samplers => {
                self.image_infos.clear();
                for info in update.images {
                    let Some(sampler) = info.sampler else {
                        panic!("{:?} binding requires a sampler", ty);
                    };
                    self.image_infos.push(vk::DescriptorImageInfo {
                        sampler: resolve(samplers, sampler, "sampler").vk,
                        image_view: vk::ImageView::null(),
                        image_layout: vk::ImageLayout::UNDEFINED,
                    });
                }
                DescriptorPayload::Images(&self.image_infos)
            }
            BindingResources::Images(bound) => {
                let layout = classify::descriptor_access(ty, PassKind::Graphics)
                    .and_then(|request| request.layout)
                    .unwrap_or(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
                self.image_infos.clear();
                for (slot, info) in update.images.iter().enumerate() {
                    let sampler = match info.sampler {
                        Some(id) => resolve(samplers, id, "sampler").vk,
                        None => {
                            assert!(!ty.needs_sampler(), "{:?} binding requires a sampler", ty);
                            vk::Sampler::null()
                        }
                    };
                    let Some(view_id) = info.image_view else {
                        panic!("{:?} binding requires an image view", ty);
                    };
                    let view = resolve(image_views, view_id, "image view");
                    let image = resolve(images, view.desc.image, "image");
                    assert!(
                        image.desc.usage.contains(ty.required_image_usage()),
                        "image '{}' lacks {:?} usage for a {:?} binding",
                        image.desc.label,
                        ty.required_image_usage(),
                        ty
                    );
                    self.image_infos.push(vk::DescriptorImageInfo {
                        sampler,
                        image_view: view.vk,
                        image_layout: layout,
                    });
                    bound[first + slot] = Some(view_id);
                }
                DescriptorPayload::Images(&self.image_infos)
            }
        };

        backend.write_descriptor_set(&DescriptorWrite {
            set: native_set,
            binding: update.binding,
            element: update.element,
            ty: ty.to_vk(),
            payload,
        });
    }

    /// Destroy every native pool; sets allocated from them become invalid
    pub fn destroy<B: Backend>(&mut self, backend: &mut B) {
        for pool in self.pools.drain(..) {
            backend.destroy_descriptor_pool(pool.vk);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{NativeCall, StubBackend};
    use crate::types::{DescriptorBindingDesc, DescriptorType};

    fn layout(
        heap: &mut DescriptorHeap,
        backend: &mut StubBackend,
        resources: &mut Resources,
        bindings: &[DescriptorBindingDesc],
    ) -> DescriptorSetLayoutId {
        heap.create_layout(
            backend,
            resources,
            &DescriptorSetLayoutDesc {
                label: "test",
                bindings,
            },
        )
        .unwrap()
    }

    #[test]
    fn allocate_and_release_restore_counts() {
        let mut backend = StubBackend::new();
        let mut resources = Resources::default();
        let mut heap = DescriptorHeap::new(64);
        let layout = layout(
            &mut heap,
            &mut backend,
            &mut resources,
            &[
                DescriptorBindingDesc::new(DescriptorType::UniformBuffer, 2),
                DescriptorBindingDesc::variable(DescriptorType::SampledImage, 16),
            ],
        );

        let set = heap
            .allocate(&mut backend, &mut resources, layout, &[10])
            .unwrap();
        let stats = heap.stats();
        assert_eq!(stats.num_pools(), 1);
        assert_eq!(stats.pools[0].avail[DescriptorType::UniformBuffer.index()], 62);
        assert_eq!(stats.pools[0].avail[DescriptorType::SampledImage.index()], 54);
        assert_eq!(stats.pools[0].avail_sets, 63);

        heap.release(&mut backend, &mut resources, set);
        let stats = heap.stats();
        assert!(stats.pools[0].avail.iter().all(|&avail| avail == 64));
        assert_eq!(stats.pools[0].avail_sets, 64);
    }

    #[test]
    fn oversized_request_grows_the_heap() {
        let mut backend = StubBackend::new();
        let mut resources = Resources::default();
        let mut heap = DescriptorHeap::new(8);
        let small = layout(
            &mut heap,
            &mut backend,
            &mut resources,
            &[DescriptorBindingDesc::new(DescriptorType::StorageBuffer, 1)],
        );
        let large = layout(
            &mut heap,
            &mut backend,
            &mut resources,
            &[DescriptorBindingDesc::new(DescriptorType::StorageBuffer, 20)],
        );

        heap.allocate(&mut backend, &mut resources, small, &[]).unwrap();
        heap.allocate(&mut backend, &mut resources, large, &[]).unwrap();

        let stats = heap.stats();
        assert_eq!(stats.num_pools(), 2);
        assert_eq!(stats.pools[1].avail[DescriptorType::StorageBuffer.index()], 0);
        assert_eq!(stats.pools[1].avail[DescriptorType::UniformBuffer.index()], 8);
    }

    #[test]
    fn failed_allocation_on_new_pool_destroys_it() {
        let mut backend = StubBackend::new();
        let mut resources = Resources::default();
        let mut heap = DescriptorHeap::new(8);
        let layout = layout(
            &mut heap,
            &mut backend,
            &mut resources,
            &[DescriptorBindingDesc::new(DescriptorType::UniformBuffer, 1)],
        );

        // Pool creation succeeds, the set allocation that follows fails
        backend.clear_calls();
        backend.fail_nth_create(1, Status::OutOfPoolMemory);
        let result = heap.allocate(&mut backend, &mut resources, layout, &[]);

        assert_eq!(result.unwrap_err(), Status::OutOfPoolMemory);
        assert_eq!(heap.stats().num_pools(), 0);
        assert!(matches!(
            backend.calls().last(),
            Some(NativeCall::DestroyDescriptorPool(_))
        ));
        assert!(resources.descriptor_sets.is_empty());
    }

    #[test]
    #[should_panic(expected = "only the last binding")]
    fn variable_length_binding_must_be_last() {
        let mut backend = StubBackend::new();
        let mut resources = Resources::default();
        let mut heap = DescriptorHeap::new(8);
        layout(
            &mut heap,
            &mut backend,
            &mut resources,
            &[
                DescriptorBindingDesc::variable(DescriptorType::SampledImage, 4),
                DescriptorBindingDesc::new(DescriptorType::UniformBuffer, 1),
            ],
        );
    }

    #[test]
    #[should_panic(expected = "variable-length count 0 outside")]
    fn zero_variable_length_panics() {
        let mut backend = StubBackend::new();
        let mut resources = Resources::default();
        let mut heap = DescriptorHeap::new(8);
        let layout = layout(
            &mut heap,
            &mut backend,
            &mut resources,
            &[DescriptorBindingDesc::variable(DescriptorType::SampledImage, 4)],
        );
        let _ = heap.allocate(&mut backend, &mut resources, layout, &[0]);
    }

    #[test]
    fn allocation_records_variable_length() {
        let mut backend = StubBackend::new();
        let mut resources = Resources::default();
        let mut heap = DescriptorHeap::new(8);
        let layout = layout(
            &mut heap,
            &mut backend,
            &mut resources,
            &[DescriptorBindingDesc::variable(DescriptorType::SampledImage, 4)],
        );
        heap.allocate(&mut backend, &mut resources, layout, &[3]).unwrap();

        assert!(backend.calls().iter().any(|call| matches!(
            call,
            NativeCall::AllocateDescriptorSet {
                variable_length: Some(3),
                ..
            }
        )));
    }
}
