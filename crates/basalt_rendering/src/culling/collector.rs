//! # Async Visibility Collector
//!
//! Background CPU visibility for scheduling, never for drawing.
//!
//! The render thread signals through a coalescing [`UpdateChannel`];
//! the collector thread traverses the region catalog with the latest
//! camera, stamps a monotonically increasing frame id, and publishes
//! through a [`SnapshotCell`]. The render thread reads the latest
//! snapshot without ever blocking. There is no mid-computation
//! cancellation: a request in flight completes and is simply
//! superseded by the next publish.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::RwLock;

use basalt_core::{SnapshotCell, UpdateChannel};

use crate::camera::{Aabb, CameraState, Containment};
use crate::layout::{RegionCoord, SectionSet, REGION_WORLD_X, REGION_WORLD_Y, REGION_WORLD_Z};

/// Regions and their populated sections, as the collector sees them.
///
/// Maintained by the render thread under a short write lock; the
/// collector reads it under a read lock for the duration of one
/// traversal.
pub struct RegionCatalog {
    camera: Option<CameraState>,
    max_distance: f32,
    regions: HashMap<RegionCoord, SectionSet>,
}

impl RegionCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new(max_distance: f32) -> Self {
        Self {
            camera: None,
            max_distance,
            regions: HashMap::new(),
        }
    }

    /// Records the camera the next traversal uses.
    pub fn set_camera(&mut self, camera: CameraState) {
        self.camera = Some(camera);
    }

    /// Tracks a newly loaded region with no populated sections yet.
    pub fn insert_region(&mut self, coord: RegionCoord) {
        self.regions.entry(coord).or_insert_with(SectionSet::empty);
    }

    /// Forgets an unloaded region.
    pub fn remove_region(&mut self, coord: RegionCoord) {
        self.regions.remove(&coord);
    }

    /// Marks a section as holding geometry in any pass.
    pub fn mark_section(&mut self, coord: RegionCoord, section: u32) {
        self.regions
            .entry(coord)
            .or_insert_with(SectionSet::empty)
            .insert(section);
    }

    /// Unmarks a section that no longer holds geometry in any pass.
    pub fn unmark_section(&mut self, coord: RegionCoord, section: u32) {
        if let Some(sections) = self.regions.get_mut(&coord) {
            sections.remove(section);
        }
    }

    /// Number of tracked regions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Returns `true` if no regions are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Visibility of one region in a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegionVisibility {
    /// The region's coordinate.
    pub coord: RegionCoord,
    /// Sections of the region that passed the visibility test.
    pub sections: SectionSet,
}

/// Immutable, frame-stamped result of one collector traversal.
#[derive(Clone, Debug, Default)]
pub struct VisibilitySnapshot {
    /// Monotonically increasing id; 0 is the pre-publish empty
    /// snapshot. Consumers discard decisions based on an id older than
    /// the one currently driving them.
    pub frame_id: u64,
    /// Visible regions with their visible sections.
    pub regions: Vec<RegionVisibility>,
}

impl VisibilitySnapshot {
    /// The well-defined snapshot returned before the first publish.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }
}

/// One CPU traversal of the catalog.
///
/// Region-level classification first; only regions straddling the
/// frustum pay per-section tests.
fn collect_visible(catalog: &RegionCatalog) -> Vec<RegionVisibility> {
    let Some(camera) = catalog.camera else {
        return Vec::new();
    };
    let frustum = camera.frustum();

    // A region's center can be this far outside the draw distance
    // while some of its sections are still inside.
    let half_diagonal = 0.5
        * (REGION_WORLD_X * REGION_WORLD_X
            + REGION_WORLD_Y * REGION_WORLD_Y
            + REGION_WORLD_Z * REGION_WORLD_Z)
            .sqrt();

    let mut visible = Vec::new();
    for (&coord, sections) in &catalog.regions {
        if sections.is_empty() {
            continue;
        }

        let aabb = Aabb::for_region(coord);
        let center = aabb.center();
        let dx = center[0] - camera.position[0];
        let dy = center[1] - camera.position[1];
        let dz = center[2] - camera.position[2];
        if (dx * dx + dy * dy + dz * dz).sqrt() > catalog.max_distance + half_diagonal {
            continue;
        }

        match frustum.classify_aabb(&aabb) {
            Containment::Outside => {}
            Containment::Inside => visible.push(RegionVisibility {
                coord,
                sections: *sections,
            }),
            Containment::Intersects => {
                let mut passed = SectionSet::empty();
                for section in sections.iter() {
                    if frustum.test_aabb(&Aabb::for_section(coord, section)) {
                        passed.insert(section);
                    }
                }
                if !passed.is_empty() {
                    visible.push(RegionVisibility {
                        coord,
                        sections: passed,
                    });
                }
            }
        }
    }
    visible
}

/// Handle to the background visibility collector thread.
///
/// State machine: Idle -> Computing -> Published -> (superseded) ->
/// Idle. Dropping the handle shuts the thread down and joins it.
pub struct AsyncVisibilityCollector {
    channel: UpdateChannel,
    shutdown: Arc<AtomicBool>,
    cell: Arc<SnapshotCell<VisibilitySnapshot>>,
    catalog: Arc<RwLock<RegionCatalog>>,
    worker: Option<JoinHandle<()>>,
}

impl AsyncVisibilityCollector {
    /// Spawns the collector thread.
    #[must_use]
    pub fn new(max_distance: f32) -> Self {
        let channel = UpdateChannel::new();
        let shutdown = Arc::new(AtomicBool::new(false));
        let cell = Arc::new(SnapshotCell::new(VisibilitySnapshot::empty()));
        let catalog = Arc::new(RwLock::new(RegionCatalog::new(max_distance)));

        let worker = {
            let channel = channel.clone();
            let shutdown = Arc::clone(&shutdown);
            let cell = Arc::clone(&cell);
            let catalog = Arc::clone(&catalog);
            std::thread::Builder::new()
                .name("basalt-visibility".into())
                .spawn(move || Self::run(&channel, &shutdown, &cell, &catalog))
                .expect("failed to spawn visibility collector thread")
        };

        Self {
            channel,
            shutdown,
            cell,
            catalog,
            worker: Some(worker),
        }
    }

    fn run(
        channel: &UpdateChannel,
        shutdown: &AtomicBool,
        cell: &SnapshotCell<VisibilitySnapshot>,
        catalog: &RwLock<RegionCatalog>,
    ) {
        tracing::debug!("visibility collector running");
        let mut frame_id = 0u64;

        while channel.wait() {
            if shutdown.load(Ordering::Acquire) {
                break;
            }

            let regions = {
                let catalog = catalog.read();
                collect_visible(&catalog)
            };

            frame_id += 1;
            cell.publish(VisibilitySnapshot { frame_id, regions });
        }

        tracing::debug!("visibility collector stopped");
    }

    /// The shared catalog the render thread maintains.
    #[must_use]
    pub fn catalog(&self) -> &Arc<RwLock<RegionCatalog>> {
        &self.catalog
    }

    /// Signals the collector; non-blocking, bursts coalesce into at
    /// most one pending traversal. Returns `true` if this call created
    /// the pending request.
    pub fn request_update(&self) -> bool {
        self.channel.request()
    }

    /// Latest published snapshot; the empty snapshot before the first
    /// publish. Never blocks.
    #[must_use]
    pub fn latest(&self) -> Arc<VisibilitySnapshot> {
        self.cell.latest()
    }
}

impl Drop for AsyncVisibilityCollector {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        self.channel.request();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    /// Identity view-projection: frustum is the [-1, 1] cube, so a
    /// camera at the origin sees only regions touching it.
    fn origin_camera() -> CameraState {
        CameraState::new(
            [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
            [0.0, 0.0, 0.0],
        )
    }

    fn wait_for_frame(collector: &AsyncVisibilityCollector, minimum: u64) -> Arc<VisibilitySnapshot> {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let snapshot = collector.latest();
            if snapshot.frame_id >= minimum {
                return snapshot;
            }
            assert!(Instant::now() < deadline, "collector never published");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_empty_snapshot_before_first_publish() {
        let collector = AsyncVisibilityCollector::new(1_024.0);
        let snapshot = collector.latest();
        assert_eq!(snapshot.frame_id, 0);
        assert!(snapshot.regions.is_empty());
    }

    #[test]
    fn test_publish_after_request() {
        let collector = AsyncVisibilityCollector::new(1_024.0);
        {
            let mut catalog = collector.catalog().write();
            catalog.set_camera(origin_camera());
            catalog.mark_section(RegionCoord::new(0, 0, 0), 0);
        }

        collector.request_update();
        let snapshot = wait_for_frame(&collector, 1);

        assert_eq!(snapshot.regions.len(), 1);
        assert_eq!(snapshot.regions[0].coord, RegionCoord::new(0, 0, 0));
        assert!(snapshot.regions[0].sections.contains(0));
    }

    #[test]
    fn test_frame_ids_monotonic() {
        let collector = AsyncVisibilityCollector::new(1_024.0);
        collector.catalog().write().set_camera(origin_camera());

        let mut last = 0u64;
        for round in 1..=5 {
            collector.request_update();
            let snapshot = wait_for_frame(&collector, round);
            assert!(snapshot.frame_id >= last);
            last = snapshot.frame_id;
        }
    }

    #[test]
    fn test_collect_skips_out_of_frustum_regions() {
        let mut catalog = RegionCatalog::new(100_000.0);
        catalog.set_camera(origin_camera());
        // Touches the origin cube.
        catalog.mark_section(RegionCoord::new(0, 0, 0), 0);
        // Far along +X, outside the identity frustum.
        catalog.mark_section(RegionCoord::new(50, 0, 0), 0);

        let visible = collect_visible(&catalog);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].coord, RegionCoord::new(0, 0, 0));
    }

    #[test]
    fn test_collect_respects_draw_distance() {
        let mut catalog = RegionCatalog::new(10.0);
        catalog.set_camera(CameraState::new(
            // Degenerate all-pass matrix: every plane test passes, so
            // only the distance cut applies.
            [
                [0.0, 0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0, 0.0],
                [1.0, 1.0, 1.0, 1.0],
            ],
            [0.0, 0.0, 0.0],
        ));
        catalog.mark_section(RegionCoord::new(0, 0, 0), 0);
        catalog.mark_section(RegionCoord::new(100, 0, 0), 0);

        let visible = collect_visible(&catalog);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].coord, RegionCoord::new(0, 0, 0));
    }

    #[test]
    fn test_collect_without_camera_is_empty() {
        let mut catalog = RegionCatalog::new(1_024.0);
        catalog.mark_section(RegionCoord::new(0, 0, 0), 0);
        assert!(collect_visible(&catalog).is_empty());
    }

    #[test]
    fn test_empty_regions_not_reported() {
        let mut catalog = RegionCatalog::new(1_024.0);
        catalog.set_camera(origin_camera());
        catalog.insert_region(RegionCoord::new(0, 0, 0));

        assert!(collect_visible(&catalog).is_empty());

        catalog.mark_section(RegionCoord::new(0, 0, 0), 3);
        catalog.unmark_section(RegionCoord::new(0, 0, 0), 3);
        assert!(collect_visible(&catalog).is_empty());
    }

    #[test]
    fn test_shutdown_joins_cleanly() {
        let collector = AsyncVisibilityCollector::new(1_024.0);
        collector.request_update();
        drop(collector);
    }
}
