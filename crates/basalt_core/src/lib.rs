//! # BASALT Core
//!
//! Engine-agnostic building blocks shared across the BASALT crates:
//!
//! - [`IndexPool`]: stable, reusable integer slots for externally-owned
//!   handles. The backbone of every GPU arena in the engine - slots are
//!   addressed by formula, never by pointer.
//! - [`UpdateChannel`]: a single-slot "latest request" channel that
//!   coalesces bursts of wake-up signals into at most one pending unit
//!   of work.
//! - [`SnapshotCell`]: immutable snapshots published by one thread and
//!   read by another without blocking either.
//!
//! Nothing in this crate touches the GPU; everything is testable on the
//! CPU alone.

pub mod memory;
pub mod sync;

pub use memory::{IndexPool, Slot};
pub use sync::{SnapshotCell, UpdateChannel};
