//! # Cull Dispatcher
//!
//! Drives the per-frame cull compute dispatch and the indirect draw
//! that consumes its output.
//!
//! Sequencing protocol, per pass:
//!
//! 1. The pass counter is reset to zero.
//! 2. Uniforms (frustum + camera + pass) are uploaded.
//! 3. One compute pass runs one workgroup per region slot; threads
//!    write commands and bump the atomic counter.
//! 4. The compute pass ends *before* any draw is recorded - the pass
//!    boundary is the memory barrier covering storage writes, atomic
//!    writes, and indirect reads. No ordering exists without it.
//! 5. Exactly one multi-draw per pass consumes the command slice.
//!
//! Step 5 refuses to run for a pass that skipped steps 1-4 this frame:
//! its command slice would be stale garbage.

use std::cell::Cell;

use crate::camera::CullUniforms;
use crate::error::CullingError;
use crate::layout::{RegionCoord, RegionGpuInfo, RenderPassKind, COMMAND_SIZE};
use basalt_core::Slot;

use super::readback::CountReadback;
use crate::arena::{IndirectCommandArena, RegionMeshArena};

/// Uniform-slot stride; one 128-byte block per pass, aligned to the
/// required 256-byte dynamic-offset boundary.
const UNIFORM_STRIDE: u64 = 256;

/// How a pass's command slice is consumed by the draw call.
///
/// A small closed set, chosen once at initialization from detected
/// capabilities - never dynamic dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawStrategy {
    /// One multi-draw sourcing its count from the GPU-side counter.
    /// Zero latency; preferred.
    MultiDrawCount,
    /// One multi-draw with a CPU count from the previous frame's
    /// readback high-water mark.
    MultiDraw,
    /// Per-slot `draw_indexed_indirect` loop; works everywhere.
    DrawLoop,
}

impl DrawStrategy {
    /// Selects the best strategy the device supports.
    #[must_use]
    pub fn select(features: wgpu::Features) -> Self {
        if features.contains(wgpu::Features::MULTI_DRAW_INDIRECT_COUNT) {
            Self::MultiDrawCount
        } else if features.contains(wgpu::Features::MULTI_DRAW_INDIRECT) {
            Self::MultiDraw
        } else {
            Self::DrawLoop
        }
    }

    /// CPU-count strategies draw a fixed slot count, so their slice
    /// must be zeroed before dispatch - stale tail slots then decode
    /// as zero-size no-op commands.
    #[must_use]
    pub const fn needs_slice_clear(self) -> bool {
        !matches!(self, Self::MultiDrawCount)
    }
}

/// Per-frame dispatch/draw ordering guard.
///
/// Interior mutability keeps the draw path usable through a shared
/// borrow alongside the active render pass.
#[derive(Debug, Default)]
struct PassSequencer {
    dispatched: [Cell<bool>; 3],
}

impl PassSequencer {
    fn begin_frame(&self) {
        for flag in &self.dispatched {
            flag.set(false);
        }
    }

    fn record_dispatched(&self, pass: RenderPassKind) {
        self.dispatched[pass.index() as usize].set(true);
    }

    fn check_drawable(&self, pass: RenderPassKind) -> Result<(), CullingError> {
        if self.dispatched[pass.index() as usize].get() {
            Ok(())
        } else {
            Err(CullingError::PassNotDispatched { pass })
        }
    }
}

/// Owns the cull compute pipeline, the per-slot region table, and the
/// cull bind group.
pub struct CullDispatcher {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: Option<wgpu::BindGroup>,
    uniform_buffer: wgpu::Buffer,
    region_table: wgpu::Buffer,
    region_mirror: Vec<RegionGpuInfo>,
    table_capacity: u32,
    strategy: DrawStrategy,
    sequencer: PassSequencer,
}

impl CullDispatcher {
    /// Creates the dispatcher with an initial region capacity.
    ///
    /// The cull program is compiled here, once; a device that cannot
    /// run it is rejected by the context before this point.
    #[must_use]
    pub fn new(device: &wgpu::Device, strategy: DrawStrategy, capacity: u32) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("region cull shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shaders/region_cull.wgsl").into()),
        });

        let bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("region cull bind group layout"),
                entries: &[
                    // Cull uniforms, one slot per pass via dynamic offset.
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: true,
                            min_binding_size: wgpu::BufferSize::new(128),
                        },
                        count: None,
                    },
                    // Region table (read).
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    // Mesh descriptor arena (read).
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    // Indirect command arena (write).
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    // Visible-element counters (atomic).
                    wgpu::BindGroupLayoutEntry {
                        binding: 4,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: false },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("region cull pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("region cull pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: "main",
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cull uniforms"),
            size: UNIFORM_STRIDE * 3,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        tracing::info!(?strategy, "cull dispatcher initialized");

        Self {
            pipeline,
            bind_group_layout,
            bind_group: None,
            uniform_buffer,
            region_table: Self::create_table(device, capacity),
            region_mirror: vec![RegionGpuInfo::default(); capacity as usize],
            table_capacity: capacity,
            strategy,
            sequencer: PassSequencer::default(),
        }
    }

    fn create_table(device: &wgpu::Device, capacity: u32) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("region table"),
            size: u64::from(capacity) * std::mem::size_of::<RegionGpuInfo>() as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// The draw strategy selected at initialization.
    #[inline]
    #[must_use]
    pub fn strategy(&self) -> DrawStrategy {
        self.strategy
    }

    /// Marks a region slot live and records its world translation.
    pub fn set_region(&mut self, queue: &wgpu::Queue, slot: Slot, coord: RegionCoord) {
        self.ensure_mirror(slot);
        let info = RegionGpuInfo {
            origin: coord.world_origin(),
            live: 1,
        };
        self.region_mirror[slot.as_usize()] = info;
        self.upload_region(queue, slot);
    }

    /// Marks a region slot dead; the cull program skips it.
    pub fn clear_region(&mut self, queue: &wgpu::Queue, slot: Slot) {
        self.ensure_mirror(slot);
        self.region_mirror[slot.as_usize()] = RegionGpuInfo::default();
        self.upload_region(queue, slot);
    }

    fn ensure_mirror(&mut self, slot: Slot) {
        if slot.as_usize() >= self.region_mirror.len() {
            self.region_mirror
                .resize(slot.as_usize() + 1, RegionGpuInfo::default());
        }
    }

    fn upload_region(&self, queue: &wgpu::Queue, slot: Slot) {
        if slot.index() < self.table_capacity {
            let offset = u64::from(slot.index()) * std::mem::size_of::<RegionGpuInfo>() as u64;
            queue.write_buffer(
                &self.region_table,
                offset,
                bytemuck::bytes_of(&self.region_mirror[slot.as_usize()]),
            );
        }
    }

    /// Grows the region table and rebuilds the bind group against the
    /// (possibly reallocated) arena buffers. Called at the frame
    /// boundary, after arena growth, behind the same fence.
    pub fn rebind(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        new_capacity: u32,
        mesh: &RegionMeshArena,
        indirect: &IndirectCommandArena,
        readback: &CountReadback,
    ) {
        if new_capacity > self.table_capacity {
            self.region_mirror
                .resize(new_capacity as usize, RegionGpuInfo::default());
            self.region_table = Self::create_table(device, new_capacity);
            self.table_capacity = new_capacity;
            queue.write_buffer(
                &self.region_table,
                0,
                bytemuck::cast_slice(&self.region_mirror),
            );
        }

        self.bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("region cull bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &self.uniform_buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(128),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.region_table.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: mesh.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: indirect.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: readback.counter_buffer().as_entire_binding(),
                },
            ],
        }));
    }

    /// Resets the per-frame sequencing state.
    pub fn begin_frame(&self) {
        self.sequencer.begin_frame();
    }

    /// Uploads one pass's cull uniforms into its dedicated slot.
    ///
    /// Each pass has its own slot: `write_buffer` applies before the
    /// whole submission, so sharing one slot across passes would leak
    /// the last pass's camera into every dispatch.
    pub fn upload_uniforms(
        &self,
        queue: &wgpu::Queue,
        pass: RenderPassKind,
        uniforms: &CullUniforms,
    ) {
        queue.write_buffer(
            &self.uniform_buffer,
            u64::from(pass.index()) * UNIFORM_STRIDE,
            bytemuck::bytes_of(uniforms),
        );
    }

    /// Records the cull compute pass for one render pass.
    ///
    /// Ending the compute pass is the barrier between the shader's
    /// storage/atomic writes and the indirect-draw reads that follow.
    ///
    /// # Panics
    ///
    /// Panics if [`CullDispatcher::rebind`] has never been called;
    /// dispatching without bound arenas is a wiring bug, not a runtime
    /// condition.
    pub fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pass: RenderPassKind,
        region_count: u32,
    ) {
        let bind_group = self
            .bind_group
            .as_ref()
            .expect("cull dispatcher used before rebind");
        debug_assert!(region_count <= self.table_capacity);

        if region_count > 0 {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("region cull pass"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(&self.pipeline);
            cpass.set_bind_group(0, bind_group, &[(u64::from(pass.index()) * UNIFORM_STRIDE) as u32]);
            cpass.dispatch_workgroups(region_count, 1, 1);
        }

        self.sequencer.record_dispatched(pass);
    }

    /// Checks that a pass's cull dispatch was recorded this frame.
    ///
    /// # Errors
    ///
    /// [`CullingError::PassNotDispatched`] otherwise.
    pub fn ensure_dispatched(&self, pass: RenderPassKind) -> Result<(), CullingError> {
        self.sequencer.check_drawable(pass)
    }

    /// Issues the one indirect multi-draw for a pass.
    ///
    /// `conservative_count` is the previous-frame readback high-water
    /// mark; only the CPU-count strategies consume it. Returns the
    /// command-slot count the draw covered.
    ///
    /// # Errors
    ///
    /// [`CullingError::PassNotDispatched`] if the pass's cull dispatch
    /// was not recorded this frame.
    pub fn draw<'rp>(
        &'rp self,
        rpass: &mut wgpu::RenderPass<'rp>,
        pass: RenderPassKind,
        indirect: &'rp IndirectCommandArena,
        readback: &'rp CountReadback,
        conservative_count: u32,
    ) -> Result<u32, CullingError> {
        self.sequencer.check_drawable(pass)?;

        let offset = indirect.slice_offset(pass);
        let max_commands = indirect.slice_commands();

        let covered = match self.strategy {
            DrawStrategy::MultiDrawCount => {
                rpass.multi_draw_indexed_indirect_count(
                    indirect.buffer(),
                    offset,
                    readback.counter_buffer(),
                    u64::from(pass.index()) * 4,
                    max_commands,
                );
                max_commands
            }
            DrawStrategy::MultiDraw => {
                let count = conservative_count.min(max_commands);
                rpass.multi_draw_indexed_indirect(indirect.buffer(), offset, count);
                count
            }
            DrawStrategy::DrawLoop => {
                let count = conservative_count.min(max_commands);
                for i in 0..count {
                    rpass.draw_indexed_indirect(
                        indirect.buffer(),
                        offset + u64::from(i) * u64::from(COMMAND_SIZE),
                    );
                }
                count
            }
        };

        Ok(covered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_prefers_gpu_count() {
        let features =
            wgpu::Features::MULTI_DRAW_INDIRECT | wgpu::Features::MULTI_DRAW_INDIRECT_COUNT;
        assert_eq!(DrawStrategy::select(features), DrawStrategy::MultiDrawCount);
    }

    #[test]
    fn test_strategy_multi_draw_without_count() {
        let features = wgpu::Features::MULTI_DRAW_INDIRECT;
        assert_eq!(DrawStrategy::select(features), DrawStrategy::MultiDraw);
    }

    #[test]
    fn test_strategy_fallback_loop() {
        assert_eq!(
            DrawStrategy::select(wgpu::Features::empty()),
            DrawStrategy::DrawLoop
        );
    }

    #[test]
    fn test_slice_clear_only_for_cpu_count_strategies() {
        assert!(!DrawStrategy::MultiDrawCount.needs_slice_clear());
        assert!(DrawStrategy::MultiDraw.needs_slice_clear());
        assert!(DrawStrategy::DrawLoop.needs_slice_clear());
    }

    #[test]
    fn test_sequencer_refuses_undispatched_pass() {
        let sequencer = PassSequencer::default();
        sequencer.begin_frame();

        assert_eq!(
            sequencer.check_drawable(RenderPassKind::Solid),
            Err(CullingError::PassNotDispatched {
                pass: RenderPassKind::Solid
            })
        );

        sequencer.record_dispatched(RenderPassKind::Solid);
        assert!(sequencer.check_drawable(RenderPassKind::Solid).is_ok());
        // Other passes remain undispatched.
        assert!(sequencer.check_drawable(RenderPassKind::Cutout).is_err());
    }

    #[test]
    fn test_sequencer_resets_each_frame() {
        let sequencer = PassSequencer::default();
        sequencer.record_dispatched(RenderPassKind::Translucent);
        assert!(sequencer.check_drawable(RenderPassKind::Translucent).is_ok());

        sequencer.begin_frame();
        assert!(sequencer
            .check_drawable(RenderPassKind::Translucent)
            .is_err());
    }
}
