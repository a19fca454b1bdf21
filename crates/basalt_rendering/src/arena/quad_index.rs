//! # Shared Quad Index Buffer
//!
//! Every section mesh is quad geometry sharing one index pattern, so a
//! single index buffer serves all draws: each command reads the first
//! `index_count` indices of the shared pattern against its own base
//! vertex.
//!
//! The buffer is sized from the count-readback high-water mark: grown
//! preemptively when a spike is reported, never shrunk within a
//! session.

/// Indices per quad (two triangles).
pub const INDICES_PER_QUAD: u32 = 6;
/// Vertices per quad.
pub const VERTICES_PER_QUAD: u32 = 4;

/// Builds the shared quad index pattern for `quads` quads.
///
/// Quad `q` occupies vertices `[4q, 4q+4)` and triangulates as
/// `(0, 1, 2) (0, 2, 3)`.
#[must_use]
pub fn build_quad_indices(quads: u32) -> Vec<u32> {
    let mut indices = Vec::with_capacity((quads * INDICES_PER_QUAD) as usize);
    for q in 0..quads {
        let base = q * VERTICES_PER_QUAD;
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    indices
}

/// The shared index buffer, grown to cover the worst-case element
/// count any single draw command has requested.
pub struct SharedQuadIndexBuffer {
    buffer: wgpu::Buffer,
    /// Index capacity of the GPU buffer.
    capacity_indices: u32,
}

impl SharedQuadIndexBuffer {
    /// Index capacity allocated before the first readback arrives.
    pub const INITIAL_INDICES: u32 = 16_384 * INDICES_PER_QUAD;

    /// Creates the buffer at its initial capacity.
    #[must_use]
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let mut this = Self {
            buffer: Self::create_buffer(device, Self::INITIAL_INDICES),
            capacity_indices: Self::INITIAL_INDICES,
        };
        this.upload(queue);
        this
    }

    fn create_buffer(device: &wgpu::Device, indices: u32) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("shared quad index buffer"),
            size: u64::from(indices) * 4,
            usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn upload(&mut self, queue: &wgpu::Queue) {
        let quads = self.capacity_indices / INDICES_PER_QUAD;
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&build_quad_indices(quads)));
    }

    /// Current index capacity.
    #[inline]
    #[must_use]
    pub fn capacity_indices(&self) -> u32 {
        self.capacity_indices
    }

    /// The index buffer for the renderer driver to bind.
    #[must_use]
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Grows to cover `element_count` indices if needed.
    ///
    /// Called with the readback high-water mark each frame; because the
    /// mark is one frame late and monotonic, growth lands before the
    /// spike can recur and the buffer never thrashes.
    pub fn ensure_elements(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, element_count: u32) {
        if element_count <= self.capacity_indices {
            return;
        }
        let new_capacity = grown_index_capacity(self.capacity_indices, element_count);
        tracing::debug!(
            old = self.capacity_indices,
            new = new_capacity,
            "growing shared quad index buffer"
        );
        self.buffer = Self::create_buffer(device, new_capacity);
        self.capacity_indices = new_capacity;
        self.upload(queue);
    }
}

/// Next index capacity covering `needed`, in whole quads with headroom.
fn grown_index_capacity(capacity: u32, needed: u32) -> u32 {
    let geometric = capacity.saturating_mul(3) / 2;
    let target = needed.max(geometric);
    // Round up to a whole quad's worth of indices.
    target.div_ceil(INDICES_PER_QUAD) * INDICES_PER_QUAD
}
