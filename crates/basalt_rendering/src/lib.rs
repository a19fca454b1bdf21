//! # BASALT Rendering
//!
//! GPU-driven culling core for a streaming voxel world.
//!
//! The CPU never decides what is drawn. It maintains lightweight
//! per-region mesh metadata in a GPU arena; a compute dispatch culls
//! every section/facing against the camera and emits indirect draw
//! commands that one batched multi-draw consumes.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        PER-FRAME PIPELINE                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Section Metadata Arena ──► Cull Compute ──► Indirect Commands   │
//! │        (128 B slots)        (frustum +        + atomic counts    │
//! │                              facing test)          │             │
//! │                                             barrier│             │
//! │                                                    ▼             │
//! │                                        ONE multi-draw per pass   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A background collector computes CPU-side visibility for streaming
//! decisions only; drawing never waits for it. Counter readback is one
//! frame late and only affects capacity planning, never correctness.
//!
//! Everything is owned by a [`CullingContext`]; there are no
//! process-wide statics.

pub mod arena;
pub mod camera;
pub mod config;
pub mod context;
pub mod culling;
pub mod error;
pub mod fence;
pub mod layout;
pub mod stats;

pub use arena::{IndirectCommandArena, RegionMeshArena, SharedQuadIndexBuffer};
pub use camera::{Aabb, CameraState, Frustum, Plane};
pub use config::CullingConfig;
pub use context::CullingContext;
pub use culling::{
    AsyncVisibilityCollector, CountReadback, CullDispatcher, DrawStrategy, RegionVisibility,
    VisibilitySnapshot,
};
pub use error::CullingError;
pub use layout::{Facing, RegionCoord, RenderPassKind, SectionMeshDescriptor, SectionSet};
pub use stats::CullingStats;
