//! # Region Mesh Arena
//!
//! GPU-visible storage of fixed-size mesh descriptors for every
//! `(region slot, pass, section)` triple.
//!
//! The CPU keeps a byte-exact mirror of the GPU buffer. Per-section
//! updates upload only the touched 128-byte slot; growth reallocates,
//! copies the mirror verbatim (offsets depend only on indices, never on
//! the buffer address), and the caller rebinds.

use basalt_core::Slot;

use crate::layout::{
    descriptor_index, descriptor_offset, mesh_arena_bytes, RenderPassKind, SectionMeshDescriptor,
    DESCRIPTOR_SIZE, PASSES_PER_REGION, SECTIONS_PER_REGION,
};

/// CPU mirror of the descriptor arena.
///
/// Holds the authoritative copy of every descriptor plus the per-pass
/// populated-section counts that back the zero-visibility draw skip.
/// All of the arena's slot arithmetic and the growth-preservation
/// invariant live here, device-free.
#[derive(Debug)]
pub(crate) struct DescriptorTable {
    capacity: u32,
    descriptors: Vec<SectionMeshDescriptor>,
    populated: [u32; 3],
}

impl DescriptorTable {
    pub(crate) fn new(capacity: u32) -> Self {
        let slots = (capacity * PASSES_PER_REGION * SECTIONS_PER_REGION) as usize;
        Self {
            capacity,
            descriptors: vec![SectionMeshDescriptor::default(); slots],
            populated: [0; 3],
        }
    }

    pub(crate) fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Grows to `new_capacity` regions. Existing descriptors keep their
    /// offsets: the layout is region-slot-major, so growth only appends
    /// zeroed slots at the tail.
    pub(crate) fn grow_to(&mut self, new_capacity: u32) {
        debug_assert!(new_capacity >= self.capacity);
        let slots = (new_capacity * PASSES_PER_REGION * SECTIONS_PER_REGION) as usize;
        self.descriptors
            .resize(slots, SectionMeshDescriptor::default());
        self.capacity = new_capacity;
    }

    /// Stores a descriptor. Returns its byte offset in the arena.
    pub(crate) fn set(
        &mut self,
        slot: Slot,
        pass: RenderPassKind,
        section: u32,
        descriptor: SectionMeshDescriptor,
    ) -> u64 {
        let index = descriptor_index(slot.index(), pass, section) as usize;
        let was_empty = self.descriptors[index].is_empty();

        self.descriptors[index] = descriptor;

        let pass_index = pass.index() as usize;
        match (was_empty, descriptor.is_empty()) {
            (true, false) => self.populated[pass_index] += 1,
            (false, true) => self.populated[pass_index] -= 1,
            _ => {}
        }

        descriptor_offset(slot.index(), pass, section)
    }

    /// Clears a descriptor back to the all-zero "no mesh" state.
    pub(crate) fn clear(&mut self, slot: Slot, pass: RenderPassKind, section: u32) -> u64 {
        self.set(slot, pass, section, SectionMeshDescriptor::default())
    }

    pub(crate) fn get(
        &self,
        slot: Slot,
        pass: RenderPassKind,
        section: u32,
    ) -> SectionMeshDescriptor {
        self.descriptors[descriptor_index(slot.index(), pass, section) as usize]
    }

    /// Sections holding geometry for a pass, across all regions.
    pub(crate) fn populated(&self, pass: RenderPassKind) -> u32 {
        self.populated[pass.index() as usize]
    }

    /// Non-empty `(pass, section)` pairs of one region slot.
    pub(crate) fn populated_in_region(&self, slot: Slot) -> Vec<(RenderPassKind, u32)> {
        let mut out = Vec::new();
        for pass in RenderPassKind::ALL {
            for section in 0..SECTIONS_PER_REGION {
                if !self.get(slot, pass, section).is_empty() {
                    out.push((pass, section));
                }
            }
        }
        out
    }

    /// The whole mirror as bytes, for full re-upload after growth.
    pub(crate) fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.descriptors)
    }

    /// One descriptor as bytes, for partial upload.
    pub(crate) fn slot_bytes(&self, index: u64) -> &[u8] {
        let start = (index / u64::from(DESCRIPTOR_SIZE)) as usize;
        bytemuck::bytes_of(&self.descriptors[start])
    }
}

/// The GPU-resident descriptor arena.
///
/// Exclusively owned by the render-thread context. Growth must only be
/// invoked at a frame boundary with no in-flight GPU reads of the old
/// buffer; the context guards that with a bounded fence wait.
pub struct RegionMeshArena {
    table: DescriptorTable,
    buffer: wgpu::Buffer,
    /// Regions the GPU buffer can hold; trails the mirror between a
    /// capacity request and the next frame boundary.
    gpu_capacity: u32,
}

impl RegionMeshArena {
    /// Creates the arena with an initial region capacity.
    #[must_use]
    pub fn new(device: &wgpu::Device, capacity: u32) -> Self {
        Self {
            table: DescriptorTable::new(capacity),
            buffer: Self::create_buffer(device, capacity),
            gpu_capacity: capacity,
        }
    }

    fn create_buffer(device: &wgpu::Device, capacity: u32) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("region mesh arena"),
            size: mesh_arena_bytes(capacity),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Current GPU-side capacity in regions.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.gpu_capacity
    }

    /// The storage buffer, for bind-group creation.
    #[must_use]
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Sections holding geometry for a pass.
    #[must_use]
    pub fn populated_sections(&self, pass: RenderPassKind) -> u32 {
        self.table.populated(pass)
    }

    /// Reads back the descriptor stored for a triple.
    #[must_use]
    pub fn descriptor(
        &self,
        slot: Slot,
        pass: RenderPassKind,
        section: u32,
    ) -> SectionMeshDescriptor {
        self.table.get(slot, pass, section)
    }

    /// Stores a section's mesh metadata and uploads its 128-byte slot.
    ///
    /// A slot beyond the current GPU capacity is mirrored only; the
    /// growth pass at the next frame boundary uploads it.
    pub fn set_section_mesh(
        &mut self,
        queue: &wgpu::Queue,
        slot: Slot,
        pass: RenderPassKind,
        section: u32,
        descriptor: SectionMeshDescriptor,
    ) {
        self.ensure_mirror(slot);
        let offset = self.table.set(slot, pass, section, descriptor);
        if slot.index() < self.gpu_capacity {
            queue.write_buffer(&self.buffer, offset, self.table.slot_bytes(offset));
        }
    }

    /// Removes a section's mesh. Zero facings means the section
    /// contributes no draw commands.
    pub fn clear_section_mesh(
        &mut self,
        queue: &wgpu::Queue,
        slot: Slot,
        pass: RenderPassKind,
        section: u32,
    ) {
        self.ensure_mirror(slot);
        let offset = self.table.clear(slot, pass, section);
        if slot.index() < self.gpu_capacity {
            queue.write_buffer(&self.buffer, offset, self.table.slot_bytes(offset));
        }
    }

    /// Clears every descriptor of a region slot before the slot is
    /// reused, uploading the slot's contiguous byte range once.
    pub fn clear_region(&mut self, queue: &wgpu::Queue, slot: Slot) {
        self.ensure_mirror(slot);
        for (pass, section) in self.table.populated_in_region(slot) {
            self.table.clear(slot, pass, section);
        }
        if slot.index() < self.gpu_capacity {
            let offset = descriptor_offset(slot.index(), RenderPassKind::Solid, 0);
            let len = (PASSES_PER_REGION * SECTIONS_PER_REGION * DESCRIPTOR_SIZE) as usize;
            let start = (offset / u64::from(DESCRIPTOR_SIZE)) as usize;
            let end = start + len / DESCRIPTOR_SIZE as usize;
            queue.write_buffer(
                &self.buffer,
                offset,
                bytemuck::cast_slice(&self.table.descriptors[start..end]),
            );
        }
    }

    /// Regions the mirror must hold right now (GPU growth is deferred).
    fn ensure_mirror(&mut self, slot: Slot) {
        if slot.index() >= self.table.capacity() {
            self.table.grow_to(slot.index() + 1);
        }
    }

    /// Returns `true` if the GPU buffer is too small for `regions` and
    /// the next frame boundary must grow it.
    #[must_use]
    pub fn needs_growth(&self, regions: u32) -> bool {
        regions > self.gpu_capacity
    }

    /// Reallocates the GPU buffer to `new_capacity` regions and uploads
    /// the mirror verbatim. Caller must have fenced all in-flight reads
    /// of the old buffer and must rebind afterwards.
    pub fn grow(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, new_capacity: u32) {
        debug_assert!(new_capacity > self.gpu_capacity);
        tracing::info!(
            old = self.gpu_capacity,
            new = new_capacity,
            "growing region mesh arena"
        );

        self.table.grow_to(new_capacity);
        self.buffer = Self::create_buffer(device, new_capacity);
        queue.write_buffer(&self.buffer, 0, self.table.bytes());
        self.gpu_capacity = new_capacity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Facing, FacingRange};
    use basalt_core::IndexPool;

    fn sample_descriptor(seed: u32) -> SectionMeshDescriptor {
        let mut descriptor = SectionMeshDescriptor {
            facing_mask: Facing::Up.bit() | Facing::Unassigned.bit(),
            total_index_count: seed * 6,
            ..Default::default()
        };
        descriptor.ranges[Facing::Up.index() as usize] = FacingRange {
            first_index: seed,
            index_count: seed * 3,
            base_vertex: seed * 4,
            _pad: 0,
        };
        descriptor
    }

    fn slot(index: u32) -> Slot {
        // Build a real Slot through a pool; slots are not constructible
        // from raw integers by design.
        let mut pool: IndexPool<u32> = IndexPool::new();
        for i in 0..=index {
            pool.add(i);
        }
        pool.index_of(&index).unwrap()
    }

    #[test]
    fn test_write_then_read_back() {
        let mut table = DescriptorTable::new(4);
        let written = sample_descriptor(9);

        table.set(slot(2), RenderPassKind::Cutout, 17, written);
        assert_eq!(table.get(slot(2), RenderPassKind::Cutout, 17), written);

        // Neighbouring slots untouched.
        assert!(table.get(slot(2), RenderPassKind::Cutout, 16).is_empty());
        assert!(table.get(slot(2), RenderPassKind::Cutout, 18).is_empty());
        assert!(table.get(slot(2), RenderPassKind::Solid, 17).is_empty());
    }

    #[test]
    fn test_content_preserved_across_growth() {
        let mut table = DescriptorTable::new(6);
        let written = sample_descriptor(42);
        table.set(slot(5), RenderPassKind::Solid, 200, written);

        let before: Vec<u8> = table.bytes().to_vec();
        table.grow_to(12);

        // Old byte range is verbatim; the readback is exact.
        assert_eq!(&table.bytes()[..before.len()], &before[..]);
        assert_eq!(table.get(slot(5), RenderPassKind::Solid, 200), written);
    }

    #[test]
    fn test_populated_counts_per_pass() {
        let mut table = DescriptorTable::new(2);

        table.set(slot(0), RenderPassKind::Solid, 0, sample_descriptor(1));
        table.set(slot(0), RenderPassKind::Solid, 1, sample_descriptor(2));
        table.set(slot(1), RenderPassKind::Translucent, 0, sample_descriptor(3));
        assert_eq!(table.populated(RenderPassKind::Solid), 2);
        assert_eq!(table.populated(RenderPassKind::Cutout), 0);
        assert_eq!(table.populated(RenderPassKind::Translucent), 1);

        // Overwrite is not a new population.
        table.set(slot(0), RenderPassKind::Solid, 0, sample_descriptor(7));
        assert_eq!(table.populated(RenderPassKind::Solid), 2);

        table.clear(slot(0), RenderPassKind::Solid, 0);
        assert_eq!(table.populated(RenderPassKind::Solid), 1);

        // Clearing an already-empty slot is a no-op.
        table.clear(slot(0), RenderPassKind::Solid, 0);
        assert_eq!(table.populated(RenderPassKind::Solid), 1);
    }

    #[test]
    fn test_populated_in_region_lists_only_that_slot() {
        let mut table = DescriptorTable::new(3);
        table.set(slot(1), RenderPassKind::Solid, 5, sample_descriptor(1));
        table.set(slot(1), RenderPassKind::Cutout, 6, sample_descriptor(2));
        table.set(slot(2), RenderPassKind::Solid, 7, sample_descriptor(3));

        let populated = table.populated_in_region(slot(1));
        assert_eq!(
            populated,
            vec![(RenderPassKind::Solid, 5), (RenderPassKind::Cutout, 6)]
        );
    }

    #[test]
    fn test_mirror_bytes_match_arena_size() {
        let table = DescriptorTable::new(3);
        assert_eq!(table.bytes().len() as u64, mesh_arena_bytes(3));
    }
}
