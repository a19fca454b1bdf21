//! Memory management primitives.
//!
//! The only allocator here is the [`IndexPool`]: everything GPU-sized in
//! BASALT is an arena indexed by pool slots, so keeping the slot range
//! compact is what keeps the arenas compact.

mod index_pool;

pub use index_pool::{IndexPool, Slot};
