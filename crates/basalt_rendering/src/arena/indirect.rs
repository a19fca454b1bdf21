//! # Indirect Command Arena
//!
//! One reserved draw-command slot per `(region, pass, section, facing)`
//! combination, split into three contiguous per-pass slices.
//!
//! The host never writes commands. All logical writes come from the
//! cull dispatch; the only host-side operations are the growth
//! copy/remap and a slice clear for the CPU-count draw strategies.

use crate::layout::{
    indirect_arena_bytes, pass_slice_bytes, pass_slice_commands, pass_slice_offset, RenderPassKind,
};

/// GPU buffer of indirect draw command records, sized in lockstep with
/// the region mesh arena.
pub struct IndirectCommandArena {
    buffer: wgpu::Buffer,
    capacity: u32,
}

impl IndirectCommandArena {
    /// Creates the arena with an initial region capacity.
    #[must_use]
    pub fn new(device: &wgpu::Device, capacity: u32) -> Self {
        Self {
            buffer: Self::create_buffer(device, capacity),
            capacity,
        }
    }

    fn create_buffer(device: &wgpu::Device, capacity: u32) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("indirect command arena"),
            size: indirect_arena_bytes(capacity),
            // STORAGE for the cull program, INDIRECT for the draw,
            // COPY_* for growth remap and slice clears.
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::INDIRECT
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    /// Current capacity in regions.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// The command buffer, for bind-group creation and indirect draws.
    #[must_use]
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Byte offset of a pass's command slice at the current capacity.
    #[inline]
    #[must_use]
    pub fn slice_offset(&self, pass: RenderPassKind) -> u64 {
        pass_slice_offset(pass, self.capacity)
    }

    /// Command slots in one pass slice at the current capacity.
    #[inline]
    #[must_use]
    pub fn slice_commands(&self) -> u32 {
        pass_slice_commands(self.capacity)
    }

    /// Zeroes a pass slice so stale tail commands decode as no-ops.
    ///
    /// Only the CPU-count draw strategies need this; the count-buffer
    /// strategy never reads past the live count.
    pub fn clear_pass_slice(&self, encoder: &mut wgpu::CommandEncoder, pass: RenderPassKind) {
        encoder.clear_buffer(
            &self.buffer,
            self.slice_offset(pass),
            Some(pass_slice_bytes(self.capacity)),
        );
    }

    /// Returns `true` if `regions` exceed the current capacity.
    #[must_use]
    pub fn needs_growth(&self, regions: u32) -> bool {
        regions > self.capacity
    }

    /// Reallocates for `new_capacity` regions, remapping each pass
    /// slice to its new offset. Caller must have fenced all in-flight
    /// GPU work against the old buffer and must rebind afterwards.
    pub fn grow(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        new_capacity: u32,
    ) {
        debug_assert!(new_capacity > self.capacity);
        tracing::info!(
            old = self.capacity,
            new = new_capacity,
            "growing indirect command arena"
        );

        let new_buffer = Self::create_buffer(device, new_capacity);
        for pass in RenderPassKind::ALL {
            // Pass slices move when capacity changes; copy each to its
            // new home rather than the raw byte range.
            encoder.copy_buffer_to_buffer(
                &self.buffer,
                pass_slice_offset(pass, self.capacity),
                &new_buffer,
                pass_slice_offset(pass, new_capacity),
                pass_slice_bytes(self.capacity),
            );
        }

        // The encoder keeps the old buffer alive until submission.
        self.buffer = new_buffer;
        self.capacity = new_capacity;
    }
}
