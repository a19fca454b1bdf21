//! Cross-thread handoff primitives.
//!
//! Two threads matter in BASALT: the render thread and the background
//! visibility collector. These primitives are the only way they talk:
//! the render thread signals through an [`UpdateChannel`], the collector
//! answers through a [`SnapshotCell`]. Neither direction ever blocks the
//! render thread.

mod snapshot;
mod update_channel;

pub use snapshot::SnapshotCell;
pub use update_channel::UpdateChannel;
