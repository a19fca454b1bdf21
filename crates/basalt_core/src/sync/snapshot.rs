//! # Snapshot Cell
//!
//! One writer publishes immutable snapshots; any number of readers grab
//! the latest without blocking.
//!
//! A snapshot is fully constructed before it becomes visible - the
//! publish step swaps one `Arc` pointer, so a reader can never observe
//! a half-built value. Superseded snapshots die when the last reader
//! drops its `Arc`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Cell holding the most recently published snapshot.
///
/// Readers pay one uncontended read-lock and an `Arc` clone; the writer
/// pays one write-lock around a pointer-sized swap. Generations are
/// monotonic: a reader that saw generation `n` will never be handed a
/// snapshot older than `n` afterwards.
pub struct SnapshotCell<T> {
    current: RwLock<Arc<T>>,
    generation: AtomicU64,
}

impl<T> SnapshotCell<T> {
    /// Creates a cell holding `initial` at generation 0.
    ///
    /// The initial value plays the role of the "empty" snapshot: reads
    /// before the first publish return it instead of blocking.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            generation: AtomicU64::new(0),
        }
    }

    /// Publishes a new snapshot, superseding the previous one.
    ///
    /// Returns the generation assigned to the published value.
    pub fn publish(&self, value: T) -> u64 {
        let next = Arc::new(value);
        let mut slot = self.current.write();
        *slot = next;
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Returns the latest published snapshot. Never blocks the reader
    /// on in-progress construction - only on the pointer swap itself.
    #[must_use]
    pub fn latest(&self) -> Arc<T> {
        Arc::clone(&self.current.read())
    }

    /// Number of publishes so far (0 = only the initial value exists).
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_value_before_first_publish() {
        let cell = SnapshotCell::new(0u32);
        assert_eq!(*cell.latest(), 0);
        assert_eq!(cell.generation(), 0);
    }

    #[test]
    fn test_publish_supersedes() {
        let cell = SnapshotCell::new(0u32);

        cell.publish(1);
        assert_eq!(*cell.latest(), 1);

        cell.publish(2);
        assert_eq!(*cell.latest(), 2);
        assert_eq!(cell.generation(), 2);
    }

    #[test]
    fn test_old_snapshot_stays_valid_for_holder() {
        let cell = SnapshotCell::new(vec![1, 2, 3]);

        let held = cell.latest();
        cell.publish(vec![4, 5, 6]);

        // The holder keeps reading the value it grabbed.
        assert_eq!(*held, vec![1, 2, 3]);
        assert_eq!(*cell.latest(), vec![4, 5, 6]);
    }

    #[test]
    fn test_generations_monotonic_across_threads() {
        let cell = Arc::new(SnapshotCell::new(0u64));

        let writer = {
            let cell = Arc::clone(&cell);
            std::thread::spawn(move || {
                for i in 1..=1000u64 {
                    cell.publish(i);
                }
            })
        };

        let mut last = 0u64;
        while cell.generation() < 1000 {
            let seen = *cell.latest();
            assert!(seen >= last, "snapshot went backwards: {seen} < {last}");
            last = seen;
        }

        writer.join().unwrap();
        assert_eq!(*cell.latest(), 1000);
    }
}
