//! # Culling Context
//!
//! The owner of everything: index pool, both arenas, the dispatcher,
//! readback, and the visibility collector. Lifecycle is tied to
//! world/session load; teardown is explicit via drop. There are no
//! process-wide statics anywhere in the engine.
//!
//! ## Frame protocol
//!
//! ```text
//! begin_frame(encoder, camera)        growth + readback ingest
//!   for each pass:
//!     cull_pass(encoder, pass)        reset -> uniforms -> dispatch
//!   { render pass open }
//!     draw_pass(rpass, pass)          one multi-draw per pass
//!   { render pass closed }
//! end_frame(encoder)                  counter copy for readback
//! queue.submit(..)
//! frame_submitted()                   async map begins
//! ```
//!
//! All of it runs on the render thread; only the collector thread runs
//! elsewhere, and nothing here ever waits on it.

use std::sync::Arc;
use std::time::Duration;

use basalt_core::{IndexPool, Slot};

use crate::arena::{
    grown_capacity, IndirectCommandArena, RegionMeshArena, SharedQuadIndexBuffer,
};
use crate::camera::{CameraState, CullUniforms};
use crate::config::CullingConfig;
use crate::culling::{
    AsyncVisibilityCollector, CountReadback, CullDispatcher, DrawStrategy, VisibilitySnapshot,
};
use crate::error::CullingError;
use crate::layout::{RegionCoord, RenderPassKind, SectionMeshDescriptor};
use crate::fence::FencePoint;
use crate::stats::CullingStats;

/// Render-thread-owned culling state for one world/session.
pub struct CullingContext {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: CullingConfig,
    pool: IndexPool<RegionCoord>,
    mesh_arena: RegionMeshArena,
    indirect_arena: IndirectCommandArena,
    dispatcher: CullDispatcher,
    readback: CountReadback,
    quad_index: SharedQuadIndexBuffer,
    collector: AsyncVisibilityCollector,
    stats: CullingStats,
    camera: Option<CameraState>,
    frame: u64,
}

impl CullingContext {
    /// Creates the context for a new session.
    ///
    /// The draw strategy is detected here, once, from device features;
    /// it never changes afterwards.
    ///
    /// # Errors
    ///
    /// - [`CullingError::ComputeUnsupported`] when the adapter cannot
    ///   run the cull program. This is fatal configuration, surfaced
    ///   now rather than swallowed per-frame: without the cull dispatch
    ///   a draw would consume stale garbage commands.
    /// - [`CullingError::InvalidConfig`] when `config` fails
    ///   validation.
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        downlevel: &wgpu::DownlevelCapabilities,
        config: CullingConfig,
    ) -> Result<Self, CullingError> {
        config.validate()?;

        if !downlevel
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
        {
            tracing::error!("adapter lacks compute shaders; refusing to create culling context");
            return Err(CullingError::ComputeUnsupported);
        }

        let strategy = DrawStrategy::select(device.features());
        let capacity = config.initial_region_capacity;

        let mesh_arena = RegionMeshArena::new(&device, capacity);
        let indirect_arena = IndirectCommandArena::new(&device, capacity);
        let readback = CountReadback::new(&device);
        let quad_index = SharedQuadIndexBuffer::new(&device, &queue);
        let mut dispatcher = CullDispatcher::new(&device, strategy, capacity);
        dispatcher.rebind(
            &device,
            &queue,
            capacity,
            &mesh_arena,
            &indirect_arena,
            &readback,
        );

        let collector = AsyncVisibilityCollector::new(config.max_draw_distance);

        tracing::info!(
            capacity,
            ?strategy,
            "culling context created"
        );

        Ok(Self {
            device,
            queue,
            config,
            pool: IndexPool::new(),
            mesh_arena,
            indirect_arena,
            dispatcher,
            readback,
            quad_index,
            collector,
            stats: CullingStats::default(),
            camera: None,
            frame: 0,
        })
    }

    // =========================================================================
    // Streaming interface (world subsystem)
    // =========================================================================

    /// Tracks a newly loaded region, returning its stable slot.
    pub fn region_loaded(&mut self, coord: RegionCoord) -> Slot {
        let slot = self.pool.add(coord);
        self.dispatcher.set_region(&self.queue, slot, coord);
        self.collector.catalog().write().insert_region(coord);
        tracing::debug!(?coord, slot = slot.index(), "region loaded");
        slot
    }

    /// Forgets an unloaded region and frees its slot for reuse.
    pub fn region_unloaded(&mut self, coord: RegionCoord) {
        let Some(slot) = self.pool.remove(&coord) else {
            return;
        };
        self.dispatcher.clear_region(&self.queue, slot);
        self.mesh_arena.clear_region(&self.queue, slot);
        self.collector.catalog().write().remove_region(coord);
        tracing::debug!(?coord, slot = slot.index(), "region unloaded");
    }

    /// Slot of a tracked region; `None` means "not yet tracked".
    #[must_use]
    pub fn region_slot(&self, coord: RegionCoord) -> Option<Slot> {
        self.pool.index_of(&coord)
    }

    // =========================================================================
    // Mesh interface (mesh-generation subsystem)
    // =========================================================================

    /// Stores new mesh metadata for a section.
    ///
    /// Untracked regions are skipped with a warning: the streaming
    /// layer owns region lifetimes and a mesh for an unloaded region is
    /// a stale late result, not an error.
    pub fn section_mesh_changed(
        &mut self,
        coord: RegionCoord,
        pass: RenderPassKind,
        section: u32,
        descriptor: &SectionMeshDescriptor,
    ) {
        let Some(slot) = self.pool.index_of(&coord) else {
            tracing::warn!(?coord, "mesh update for untracked region dropped");
            return;
        };

        self.mesh_arena
            .set_section_mesh(&self.queue, slot, pass, section, *descriptor);
        self.update_catalog_section(coord, slot, section);
    }

    /// Removes a section's mesh for one pass.
    pub fn section_mesh_removed(&mut self, coord: RegionCoord, pass: RenderPassKind, section: u32) {
        let Some(slot) = self.pool.index_of(&coord) else {
            return;
        };

        self.mesh_arena
            .clear_section_mesh(&self.queue, slot, pass, section);
        self.update_catalog_section(coord, slot, section);
    }

    /// Keeps the collector catalog's section bit in sync with the
    /// union of the section's descriptors across all passes.
    fn update_catalog_section(&self, coord: RegionCoord, slot: Slot, section: u32) {
        let populated = RenderPassKind::ALL
            .iter()
            .any(|&pass| !self.mesh_arena.descriptor(slot, pass, section).is_empty());

        let mut catalog = self.collector.catalog().write();
        if populated {
            catalog.mark_section(coord, section);
        } else {
            catalog.unmark_section(coord, section);
        }
    }

    // =========================================================================
    // Frame interface (renderer driver loop)
    // =========================================================================

    /// Starts a frame: ingests the previous readback, grows the arenas
    /// if the region pool outgrew them, and primes per-frame state.
    ///
    /// Growth happens here and only here - a frame boundary where no
    /// recorded GPU command reads the old buffers - and is guarded by a
    /// bounded fence on previously submitted work.
    ///
    /// # Errors
    ///
    /// - [`CullingError::FenceTimeout`] when in-flight GPU work did not
    ///   complete within the configured deadline; the frame must be
    ///   aborted.
    /// - [`CullingError::RegionCapacityExhausted`] when growth would
    ///   exceed the representable slot range.
    pub fn begin_frame(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        camera: CameraState,
    ) -> Result<(), CullingError> {
        self.readback.poll_ingest(&self.device);
        self.quad_index.ensure_elements(
            &self.device,
            &self.queue,
            self.readback.max_element_count(),
        );

        let needed = self.pool.high_water_mark();
        if self.mesh_arena.needs_growth(needed) {
            let new_capacity = grown_capacity(
                self.mesh_arena.capacity(),
                needed,
                self.config.growth_factor,
            )?;

            // No in-flight GPU command may read the old buffers while
            // they are replaced.
            FencePoint::after_submitted(&self.queue).wait(
                &self.device,
                Duration::from_millis(self.config.fence_timeout_ms),
            )?;

            self.mesh_arena.grow(&self.device, &self.queue, new_capacity);
            self.indirect_arena.grow(&self.device, encoder, new_capacity);
            self.dispatcher.rebind(
                &self.device,
                &self.queue,
                new_capacity,
                &self.mesh_arena,
                &self.indirect_arena,
                &self.readback,
            );
            self.stats.growth_events += 1;
        }

        self.collector.catalog().write().set_camera(camera);
        self.camera = Some(camera);
        self.dispatcher.begin_frame();

        self.stats.live_regions = self.pool.len() as u32;
        self.stats.region_capacity = self.mesh_arena.capacity();
        self.stats.max_element_count = self.readback.max_element_count();
        for pass in RenderPassKind::ALL {
            let index = pass.index() as usize;
            self.stats.populated_sections[index] = self.mesh_arena.populated_sections(pass);
            self.stats.visible_commands[index] = self.readback.previous_frame_count(pass);
        }

        Ok(())
    }

    /// Records the cull dispatch for one pass: counter reset, uniform
    /// upload, slice clear where the strategy needs it, then the
    /// compute pass. The compute-pass boundary is the barrier before
    /// the indirect draw.
    ///
    /// # Panics
    ///
    /// Panics if called before [`CullingContext::begin_frame`].
    pub fn cull_pass(&mut self, encoder: &mut wgpu::CommandEncoder, pass: RenderPassKind) {
        let camera = self
            .camera
            .expect("cull_pass called before begin_frame");

        self.readback.reset_before_dispatch(&self.queue, pass);

        // Regions loaded after begin_frame sit beyond the current
        // capacity until the next frame's growth; they are simply not
        // culled (and not drawn) this frame.
        let region_count = self
            .pool
            .high_water_mark()
            .min(self.indirect_arena.capacity());
        let uniforms = CullUniforms::new(
            &camera,
            pass.index(),
            self.indirect_arena.capacity(),
            region_count,
            self.config.max_draw_distance,
        );
        self.dispatcher.upload_uniforms(&self.queue, pass, &uniforms);

        if self.dispatcher.strategy().needs_slice_clear() {
            self.indirect_arena.clear_pass_slice(encoder, pass);
        }

        self.dispatcher.dispatch(encoder, pass, region_count);
        self.readback.mark_dispatched(pass);
    }

    /// Issues the one indirect multi-draw for a pass into an open
    /// render pass. The caller has bound its pipeline, the unified
    /// vertex buffer, and [`CullingContext::quad_index_buffer`].
    ///
    /// A pass with zero populated sections is skipped entirely -
    /// no indirect-draw API call is issued - and `Ok(0)` is returned.
    ///
    /// # Errors
    ///
    /// [`CullingError::PassNotDispatched`] when the pass's cull
    /// dispatch was not recorded this frame.
    pub fn draw_pass<'rp>(
        &'rp self,
        rpass: &mut wgpu::RenderPass<'rp>,
        pass: RenderPassKind,
    ) -> Result<u32, CullingError> {
        self.dispatcher.ensure_dispatched(pass)?;

        if self.mesh_arena.populated_sections(pass) == 0 {
            return Ok(0);
        }

        self.dispatcher.draw(
            rpass,
            pass,
            &self.indirect_arena,
            &self.readback,
            self.readback.conservative_count(pass),
        )
    }

    /// Ends the frame: records the counter readback copy.
    pub fn end_frame(&mut self, encoder: &mut wgpu::CommandEncoder) {
        self.readback.encode_copy(encoder);
        self.frame += 1;
        self.stats.frames = self.frame;
    }

    /// Must be called right after the frame's command buffer is
    /// submitted; starts the asynchronous counter map.
    pub fn frame_submitted(&mut self) {
        self.readback.after_submit();
    }

    // =========================================================================
    // Visibility interface (streaming subsystem, scheduling only)
    // =========================================================================

    /// Signals the background collector; non-blocking, coalescing.
    pub fn request_visibility_update(&self) {
        self.collector.request_update();
    }

    /// Latest CPU visibility snapshot; never blocks, returns the empty
    /// snapshot before the first publish. For scheduling decisions
    /// only - drawing is driven by the GPU cull results.
    #[must_use]
    pub fn latest_visibility_snapshot(&self) -> Arc<VisibilitySnapshot> {
        self.collector.latest()
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The draw strategy detected at creation.
    #[must_use]
    pub fn strategy(&self) -> DrawStrategy {
        self.dispatcher.strategy()
    }

    /// The shared quad index buffer for the renderer driver to bind.
    #[must_use]
    pub fn quad_index_buffer(&self) -> &wgpu::Buffer {
        self.quad_index.buffer()
    }

    /// Statistics as of the last [`CullingContext::begin_frame`].
    #[must_use]
    pub fn stats(&self) -> CullingStats {
        self.stats
    }
}
