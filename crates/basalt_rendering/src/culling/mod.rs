//! GPU and CPU culling.
//!
//! The GPU path ([`CullDispatcher`]) decides what is *drawn*; the CPU
//! path ([`AsyncVisibilityCollector`]) decides what is *scheduled*.
//! They share camera math but never share results: the collector's
//! snapshots feed streaming decisions off the render thread's critical
//! path, while the dispatcher's commands are consumed by the GPU
//! without a CPU round-trip.

mod collector;
mod dispatcher;
mod readback;

pub use collector::{
    AsyncVisibilityCollector, RegionCatalog, RegionVisibility, VisibilitySnapshot,
};
pub use dispatcher::{CullDispatcher, DrawStrategy};
pub use readback::CountReadback;
