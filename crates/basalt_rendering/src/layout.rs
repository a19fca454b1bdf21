//! # Arena Layout
//!
//! Region/section/facing addressing and the fixed-size GPU records.
//!
//! Every GPU-visible slot in the engine is found by formula from a
//! `(region slot, pass, section)` tuple - no stored pointers, no
//! per-slot bookkeeping. The offset functions here are the single
//! source of truth; the WGSL cull program mirrors them exactly.

use bytemuck::{Pod, Zeroable};

/// Sections along the X axis of a region.
pub const REGION_SECTIONS_X: u32 = 8;
/// Sections along the Y axis of a region.
pub const REGION_SECTIONS_Y: u32 = 4;
/// Sections along the Z axis of a region.
pub const REGION_SECTIONS_Z: u32 = 8;
/// Sections per region (8 x 4 x 8).
pub const SECTIONS_PER_REGION: u32 = REGION_SECTIONS_X * REGION_SECTIONS_Y * REGION_SECTIONS_Z;
/// Render passes per region.
pub const PASSES_PER_REGION: u32 = 3;
/// Facings per section: six axis directions plus the unassigned bucket.
pub const FACINGS_PER_SECTION: u32 = 7;
/// Edge length of a section in world units.
pub const SECTION_WORLD_SIZE: f32 = 16.0;
/// World-space extent of a region along X.
pub const REGION_WORLD_X: f32 = REGION_SECTIONS_X as f32 * SECTION_WORLD_SIZE;
/// World-space extent of a region along Y.
pub const REGION_WORLD_Y: f32 = REGION_SECTIONS_Y as f32 * SECTION_WORLD_SIZE;
/// World-space extent of a region along Z.
pub const REGION_WORLD_Z: f32 = REGION_SECTIONS_Z as f32 * SECTION_WORLD_SIZE;
/// Bytes per [`SectionMeshDescriptor`].
pub const DESCRIPTOR_SIZE: u32 = 128;
/// Bytes per [`DrawIndexedIndirectArgs`].
pub const COMMAND_SIZE: u32 = 20;
/// Indirect command slots reserved per region, per pass.
pub const DRAW_SLOTS_PER_REGION_PASS: u32 = SECTIONS_PER_REGION * FACINGS_PER_SECTION;

/// Coordinate of a region in region space.
///
/// Owned by the external streaming system; the culling core only maps
/// it to a stable arena slot. World translation derives from the
/// coordinate, so unloading a region needs no cleanup beyond freeing
/// the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegionCoord {
    /// Region X in region space.
    pub x: i32,
    /// Region Y in region space.
    pub y: i32,
    /// Region Z in region space.
    pub z: i32,
}

impl RegionCoord {
    /// Creates a region coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// World-space translation of the region's minimum corner.
    #[must_use]
    pub fn world_origin(&self) -> [f32; 3] {
        [
            self.x as f32 * REGION_WORLD_X,
            self.y as f32 * REGION_WORLD_Y,
            self.z as f32 * REGION_WORLD_Z,
        ]
    }
}

/// The three render passes a region participates in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RenderPassKind {
    /// Fully opaque geometry.
    Solid,
    /// Alpha-tested geometry (leaves, grates).
    Cutout,
    /// Alpha-blended geometry, drawn last.
    Translucent,
}

impl RenderPassKind {
    /// All passes in draw order.
    pub const ALL: [Self; 3] = [Self::Solid, Self::Cutout, Self::Translucent];

    /// Index of this pass in arena addressing.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        match self {
            Self::Solid => 0,
            Self::Cutout => 1,
            Self::Translucent => 2,
        }
    }
}

/// Directional bucket of a section's geometry.
///
/// Geometry is split by facing so the cull program can drop faces
/// pointing away from the camera without touching vertex data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Facing {
    /// -Y faces.
    Down,
    /// +Y faces.
    Up,
    /// -Z faces.
    North,
    /// +Z faces.
    South,
    /// -X faces.
    West,
    /// +X faces.
    East,
    /// Faces with no single direction (always drawn when visible).
    Unassigned,
}

impl Facing {
    /// All facings, in bitmask bit order.
    pub const ALL: [Self; 7] = [
        Self::Down,
        Self::Up,
        Self::North,
        Self::South,
        Self::West,
        Self::East,
        Self::Unassigned,
    ];

    /// Index of this facing in descriptor range arrays.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        match self {
            Self::Down => 0,
            Self::Up => 1,
            Self::North => 2,
            Self::South => 3,
            Self::West => 4,
            Self::East => 5,
            Self::Unassigned => 6,
        }
    }

    /// Presence-bitmask bit for this facing.
    #[inline]
    #[must_use]
    pub const fn bit(self) -> u32 {
        1 << self.index()
    }
}

/// Index/vertex sub-range for one facing of a section.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct FacingRange {
    /// First index of the range.
    pub first_index: u32,
    /// Number of indices in the range.
    pub index_count: u32,
    /// Base vertex added before indexing into the vertex buffer.
    pub base_vertex: u32,
    /// Padding to a 16-byte stride.
    pub _pad: u32,
}

/// Fixed-size mesh metadata for one `(region, pass, section)` triple.
///
/// Lives at a byte offset computed purely from its tuple (see
/// [`descriptor_offset`]); an all-zero descriptor means "no mesh": a
/// zero facing mask contributes no draw commands.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct SectionMeshDescriptor {
    /// Bitmask of present facings (bits per [`Facing::bit`]).
    pub facing_mask: u32,
    /// Total index count across all facings; the cull program feeds
    /// this to the shared-index-buffer sizing counter.
    pub total_index_count: u32,
    /// Padding.
    pub _pad: [u32; 2],
    /// Per-facing sub-ranges, indexed by [`Facing::index`].
    pub ranges: [FacingRange; 7],
}

impl SectionMeshDescriptor {
    /// Returns `true` if this descriptor holds no geometry.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.facing_mask == 0
    }
}

/// Standard five-field indexed indirect draw record, GPU layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirectArgs {
    /// Number of indices to draw.
    pub index_count: u32,
    /// Number of instances to draw.
    pub instance_count: u32,
    /// First index.
    pub first_index: u32,
    /// Base vertex.
    pub base_vertex: i32,
    /// First instance; carries the logical draw-slot id so the vertex
    /// stage can recover `(region, section, facing)`.
    pub first_instance: u32,
}

/// Per-slot region record read by the cull program.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct RegionGpuInfo {
    /// World-space translation of the region's minimum corner.
    pub origin: [f32; 3],
    /// 1 while the slot's region is live, 0 otherwise.
    pub live: u32,
}

/// Linear descriptor index for a `(region slot, pass, section)` triple.
///
/// Injective over `[0, capacity) x [0, 3) x [0, 256)`: distinct tuples
/// never collide.
///
/// # Panics
///
/// Debug-asserts that `pass` and `section` are in range; corrupting an
/// adjacent slot is never an acceptable failure mode.
#[inline]
#[must_use]
pub fn descriptor_index(region_slot: u32, pass: RenderPassKind, section: u32) -> u32 {
    debug_assert!(section < SECTIONS_PER_REGION, "section {section} out of range");
    (region_slot * PASSES_PER_REGION + pass.index()) * SECTIONS_PER_REGION + section
}

/// Byte offset of a descriptor inside the mesh arena.
#[inline]
#[must_use]
pub fn descriptor_offset(region_slot: u32, pass: RenderPassKind, section: u32) -> u64 {
    u64::from(descriptor_index(region_slot, pass, section)) * u64::from(DESCRIPTOR_SIZE)
}

/// Bytes of mesh-descriptor storage for `capacity` regions.
#[inline]
#[must_use]
pub fn mesh_arena_bytes(capacity: u32) -> u64 {
    u64::from(capacity)
        * u64::from(PASSES_PER_REGION)
        * u64::from(SECTIONS_PER_REGION)
        * u64::from(DESCRIPTOR_SIZE)
}

/// Indirect command slots in one pass slice for `capacity` regions.
#[inline]
#[must_use]
pub fn pass_slice_commands(capacity: u32) -> u32 {
    capacity * DRAW_SLOTS_PER_REGION_PASS
}

/// Byte offset of a pass's command slice inside the indirect arena.
///
/// Slices are pass-major so each pass's compacted command stream is
/// contiguous and can feed a single multi-draw.
#[inline]
#[must_use]
pub fn pass_slice_offset(pass: RenderPassKind, capacity: u32) -> u64 {
    u64::from(pass.index()) * u64::from(pass_slice_commands(capacity)) * u64::from(COMMAND_SIZE)
}

/// Bytes of one pass's command slice for `capacity` regions.
#[inline]
#[must_use]
pub fn pass_slice_bytes(capacity: u32) -> u64 {
    u64::from(pass_slice_commands(capacity)) * u64::from(COMMAND_SIZE)
}

/// Bytes of indirect-command storage for `capacity` regions.
#[inline]
#[must_use]
pub fn indirect_arena_bytes(capacity: u32) -> u64 {
    u64::from(PASSES_PER_REGION) * pass_slice_bytes(capacity)
}

/// Local minimum corner of a section inside its region.
///
/// Section indices are X-fastest, then Z, then Y; the WGSL cull
/// program decodes the same way.
#[inline]
#[must_use]
pub fn section_local_min(section: u32) -> [f32; 3] {
    let x = section % REGION_SECTIONS_X;
    let z = (section / REGION_SECTIONS_X) % REGION_SECTIONS_Z;
    let y = section / (REGION_SECTIONS_X * REGION_SECTIONS_Z);
    [
        x as f32 * SECTION_WORLD_SIZE,
        y as f32 * SECTION_WORLD_SIZE,
        z as f32 * SECTION_WORLD_SIZE,
    ]
}

/// Set of section indices within one region (256 bits).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SectionSet {
    bits: [u64; 4],
}

impl SectionSet {
    /// The empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self { bits: [0; 4] }
    }

    /// Inserts a section index.
    #[inline]
    pub fn insert(&mut self, section: u32) {
        debug_assert!(section < SECTIONS_PER_REGION);
        self.bits[(section / 64) as usize] |= 1 << (section % 64);
    }

    /// Removes a section index.
    #[inline]
    pub fn remove(&mut self, section: u32) {
        debug_assert!(section < SECTIONS_PER_REGION);
        self.bits[(section / 64) as usize] &= !(1 << (section % 64));
    }

    /// Returns `true` if the section is in the set.
    #[inline]
    #[must_use]
    pub fn contains(&self, section: u32) -> bool {
        debug_assert!(section < SECTIONS_PER_REGION);
        self.bits[(section / 64) as usize] & (1 << (section % 64)) != 0
    }

    /// Number of sections in the set.
    #[inline]
    #[must_use]
    pub fn len(&self) -> u32 {
        self.bits.iter().map(|w| w.count_ones()).sum()
    }

    /// Returns `true` if no sections are set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bits == [0; 4]
    }

    /// Iterates over the set section indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (0..SECTIONS_PER_REGION).filter(|&s| self.contains(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_record_sizes_match_gpu_layout() {
        assert_eq!(std::mem::size_of::<FacingRange>(), 16);
        assert_eq!(
            std::mem::size_of::<SectionMeshDescriptor>(),
            DESCRIPTOR_SIZE as usize
        );
        assert_eq!(
            std::mem::size_of::<DrawIndexedIndirectArgs>(),
            COMMAND_SIZE as usize
        );
        assert_eq!(std::mem::size_of::<RegionGpuInfo>(), 16);
    }

    #[test]
    fn test_descriptor_offsets_injective() {
        let mut seen = HashSet::new();
        for region in 0..4 {
            for pass in RenderPassKind::ALL {
                for section in 0..SECTIONS_PER_REGION {
                    let offset = descriptor_offset(region, pass, section);
                    assert!(
                        seen.insert(offset),
                        "collision at ({region}, {pass:?}, {section})"
                    );
                    assert_eq!(offset % u64::from(DESCRIPTOR_SIZE), 0);
                }
            }
        }
        assert_eq!(seen.len(), 4 * 3 * 256);
    }

    #[test]
    fn test_descriptor_offsets_dense() {
        // Offsets tile the arena with no gaps: the maximum offset plus
        // one slot equals the arena byte size.
        let capacity = 3;
        let last = descriptor_offset(capacity - 1, RenderPassKind::Translucent, 255);
        assert_eq!(last + u64::from(DESCRIPTOR_SIZE), mesh_arena_bytes(capacity));
    }

    #[test]
    fn test_pass_slices_disjoint() {
        let capacity = 8;
        let solid = pass_slice_offset(RenderPassKind::Solid, capacity);
        let cutout = pass_slice_offset(RenderPassKind::Cutout, capacity);
        let translucent = pass_slice_offset(RenderPassKind::Translucent, capacity);

        assert_eq!(solid, 0);
        assert_eq!(cutout, pass_slice_bytes(capacity));
        assert_eq!(translucent, 2 * pass_slice_bytes(capacity));
        assert_eq!(
            translucent + pass_slice_bytes(capacity),
            indirect_arena_bytes(capacity)
        );
    }

    #[test]
    fn test_section_local_min_roundtrip() {
        assert_eq!(section_local_min(0), [0.0, 0.0, 0.0]);
        // x-fastest: section 1 steps along X.
        assert_eq!(section_local_min(1), [16.0, 0.0, 0.0]);
        // one full X row steps along Z.
        assert_eq!(section_local_min(8), [0.0, 0.0, 16.0]);
        // one full XZ layer steps along Y.
        assert_eq!(section_local_min(64), [0.0, 16.0, 0.0]);
        assert_eq!(section_local_min(255), [112.0, 48.0, 112.0]);
    }

    #[test]
    fn test_region_world_origin() {
        let coord = RegionCoord::new(1, -1, 2);
        assert_eq!(coord.world_origin(), [128.0, -64.0, 256.0]);
    }

    #[test]
    fn test_facing_bits_distinct() {
        let mut mask = 0u32;
        for facing in Facing::ALL {
            assert_eq!(mask & facing.bit(), 0);
            mask |= facing.bit();
        }
        assert_eq!(mask, 0x7F);
    }

    #[test]
    fn test_section_set() {
        let mut set = SectionSet::empty();
        assert!(set.is_empty());

        set.insert(0);
        set.insert(63);
        set.insert(64);
        set.insert(255);
        assert_eq!(set.len(), 4);
        assert!(set.contains(64));
        assert!(!set.contains(65));

        set.remove(64);
        assert!(!set.contains(64));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 63, 255]);
    }
}
