//! # Index Pool
//!
//! Stable integer slots for externally-owned handles.
//!
//! Arenas in BASALT are sized by slot count, so the pool must keep the
//! live slot range as small as possible: a freed slot is always reused
//! before a new one is appended. Under long-running streaming churn the
//! maximum live slot is bounded by the number of *currently* live
//! handles, not the historical total.

use std::collections::HashMap;
use std::hash::Hash;

/// A stable slot in an index pool.
///
/// Slots stay fixed for as long as the owning handle is live and are
/// only handed out again after that handle is removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Slot(u32);

impl Slot {
    /// Returns the raw slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Returns the slot index widened for offset arithmetic.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Bidirectional handle <-> slot map with free-list reuse.
///
/// `add` pops the free list first and only appends a fresh slot when no
/// freed slot is available. `index_of` on an unknown handle returns
/// `None`, which callers must treat as "not yet tracked", not as an
/// error.
///
/// # Thread Safety
///
/// Not thread-safe. In BASALT the pool is owned by the render-thread
/// context; no other mutator is permitted.
pub struct IndexPool<K> {
    /// Forward map: handle -> slot.
    slots: HashMap<K, Slot>,
    /// Reverse map: slot index -> owning handle (None while freed).
    owners: Vec<Option<K>>,
    /// Slots released by `remove`, reused LIFO.
    free_list: Vec<u32>,
}

impl<K: Copy + Eq + Hash> IndexPool<K> {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            owners: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Number of live handles.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no handles are live.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Highest slot count ever handed out.
    ///
    /// Arenas size their backing storage from this value: a slot below
    /// the high-water mark is always addressable, even if its previous
    /// owner was removed.
    #[inline]
    #[must_use]
    pub fn high_water_mark(&self) -> u32 {
        self.owners.len() as u32
    }

    /// Adds a handle, returning its stable slot.
    ///
    /// Freed slots are reused before a new one is appended. Adding a
    /// handle that is already live returns its existing slot unchanged.
    ///
    /// # Panics
    ///
    /// Panics if the slot range would exceed `u32::MAX`. Reaching that
    /// many live handles indicates a logic error upstream, not a
    /// recoverable condition.
    pub fn add(&mut self, handle: K) -> Slot {
        if let Some(&slot) = self.slots.get(&handle) {
            return slot;
        }

        let slot = match self.free_list.pop() {
            Some(index) => Slot(index),
            None => {
                let index = self.owners.len();
                assert!(index < u32::MAX as usize, "index pool slot range exhausted");
                self.owners.push(None);
                Slot(index as u32)
            }
        };

        self.owners[slot.as_usize()] = Some(handle);
        self.slots.insert(handle, slot);
        slot
    }

    /// Removes a handle, releasing its slot for reuse.
    ///
    /// Returns the freed slot, or `None` if the handle was not live.
    pub fn remove(&mut self, handle: &K) -> Option<Slot> {
        let slot = self.slots.remove(handle)?;
        self.owners[slot.as_usize()] = None;
        self.free_list.push(slot.index());
        Some(slot)
    }

    /// Looks up the slot for a handle.
    #[inline]
    #[must_use]
    pub fn index_of(&self, handle: &K) -> Option<Slot> {
        self.slots.get(handle).copied()
    }

    /// Looks up the handle owning a slot.
    #[inline]
    #[must_use]
    pub fn owner_of(&self, slot: Slot) -> Option<K> {
        self.owners.get(slot.as_usize()).copied().flatten()
    }

    /// Iterates over all live `(handle, slot)` pairs.
    ///
    /// Iteration order is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = (K, Slot)> + '_ {
        self.slots.iter().map(|(k, s)| (*k, *s))
    }
}

impl<K: Copy + Eq + Hash> Default for IndexPool<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_assigns_sequential_slots() {
        let mut pool: IndexPool<u64> = IndexPool::new();

        for i in 0..10u64 {
            let slot = pool.add(i);
            assert_eq!(slot.index(), i as u32);
        }
        assert_eq!(pool.len(), 10);
        assert_eq!(pool.high_water_mark(), 10);
    }

    #[test]
    fn test_slot_stable_while_live() {
        let mut pool: IndexPool<u64> = IndexPool::new();

        for i in 0..10u64 {
            pool.add(i);
        }
        let before = pool.index_of(&7).unwrap();

        pool.remove(&2);
        pool.remove(&5);
        pool.add(100);
        pool.add(101);

        assert_eq!(pool.index_of(&7).unwrap(), before);
    }

    #[test]
    fn test_freed_slot_reused_before_append() {
        let mut pool: IndexPool<u64> = IndexPool::new();

        for i in 0..10u64 {
            pool.add(i);
        }
        pool.remove(&3);

        let slot = pool.add(10);
        assert_eq!(slot.index(), 3);
        assert_eq!(pool.high_water_mark(), 10);
    }

    #[test]
    fn test_remove_unknown_is_none() {
        let mut pool: IndexPool<u64> = IndexPool::new();
        assert!(pool.remove(&42).is_none());
        assert!(pool.index_of(&42).is_none());
    }

    #[test]
    fn test_add_twice_returns_same_slot() {
        let mut pool: IndexPool<u64> = IndexPool::new();
        let a = pool.add(7);
        let b = pool.add(7);
        assert_eq!(a, b);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_owner_lookup() {
        let mut pool: IndexPool<u64> = IndexPool::new();
        let slot = pool.add(99);
        assert_eq!(pool.owner_of(slot), Some(99));

        pool.remove(&99);
        assert_eq!(pool.owner_of(slot), None);
    }

    #[test]
    fn test_churn_keeps_range_compact() {
        let mut pool: IndexPool<u64> = IndexPool::new();

        // Long streaming churn: 4 live handles at any time.
        for round in 0..1000u64 {
            pool.add(round * 4);
            pool.add(round * 4 + 1);
            pool.add(round * 4 + 2);
            pool.add(round * 4 + 3);
            pool.remove(&(round * 4));
            pool.remove(&(round * 4 + 1));
            pool.remove(&(round * 4 + 2));
            pool.remove(&(round * 4 + 3));
        }

        // The slot range never grew past the peak live count.
        assert_eq!(pool.high_water_mark(), 4);
    }
}
