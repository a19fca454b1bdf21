//! # Count Readback
//!
//! One-frame-latency feedback from the GPU visible-element counters.
//!
//! Reading an atomic counter back in the frame that wrote it would
//! stall the pipeline, so the counters are copied to a staging buffer
//! at end of frame, mapped asynchronously, and ingested at the start
//! of the *next* frame. The draw path never depends on these values
//! for correctness - the count-buffer strategy reads the live counter
//! on the GPU - so the latency only affects capacity planning.
//!
//! Reported counts are a per-session high-water mark: a spike grows
//! downstream capacity preemptively and nothing ever shrinks, so
//! consumers cannot thrash.

use crossbeam_channel::{bounded, Receiver};

use crate::layout::RenderPassKind;

/// Counter buffer layout: three per-pass command counts plus the
/// session-wide max single-draw index count.
const COUNTER_SLOTS: usize = 4;
const COUNTER_BYTES: u64 = (COUNTER_SLOTS * 4) as u64;
/// Index of the max-element slot, after the three pass slots.
const MAX_ELEMENT_SLOT: usize = 3;

/// CPU-side bookkeeping for counter values and reset state.
///
/// Split from the GPU plumbing so the monotonicity and reset
/// invariants are testable without a device.
#[derive(Debug, Default)]
pub(crate) struct CounterTracker {
    /// Raw counts ingested from the last completed readback.
    last_counts: [u32; 3],
    /// Monotonic per-pass high-water marks.
    high_water: [u32; 3],
    /// Monotonic max single-draw index count.
    max_elements: u32,
    /// Passes whose counter was zeroed since the last dispatch.
    zeroed: [bool; 3],
}

impl CounterTracker {
    /// Records that a pass counter was written to zero.
    pub(crate) fn note_reset(&mut self, pass: RenderPassKind) {
        self.zeroed[pass.index() as usize] = true;
    }

    /// Records that a dispatch consumed the zeroed counter.
    pub(crate) fn note_dispatch(&mut self, pass: RenderPassKind) {
        self.zeroed[pass.index() as usize] = false;
    }

    /// Returns `true` if the pass counter is zeroed and unconsumed.
    pub(crate) fn is_zeroed(&self, pass: RenderPassKind) -> bool {
        self.zeroed[pass.index() as usize]
    }

    /// Ingests one completed readback.
    pub(crate) fn ingest(&mut self, counters: [u32; 4]) {
        for pass in 0..3 {
            self.last_counts[pass] = counters[pass];
            self.high_water[pass] = self.high_water[pass].max(counters[pass]);
        }
        self.max_elements = self.max_elements.max(counters[MAX_ELEMENT_SLOT]);
    }

    /// Raw count from the previous completed frame.
    pub(crate) fn last_count(&self, pass: RenderPassKind) -> u32 {
        self.last_counts[pass.index() as usize]
    }

    /// Conservative (high-water) count for capacity planning.
    pub(crate) fn conservative_count(&self, pass: RenderPassKind) -> u32 {
        self.high_water[pass.index() as usize]
    }

    pub(crate) fn max_elements(&self) -> u32 {
        self.max_elements
    }
}

/// State of the staging buffer round-trip.
enum ReadbackState {
    /// Staging buffer free; a copy may be recorded.
    Idle,
    /// A counter copy is recorded in this frame's encoder.
    CopyRecorded,
    /// The staging buffer is mapping; the channel signals completion.
    Mapping(Receiver<bool>),
}

/// Owns the GPU visible-element counters and their readback path.
pub struct CountReadback {
    counter: wgpu::Buffer,
    staging: wgpu::Buffer,
    state: ReadbackState,
    tracker: CounterTracker,
}

impl CountReadback {
    /// Creates the counter and staging buffers.
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let counter = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("visible element counters"),
            size: COUNTER_BYTES,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("visible element counter staging"),
            size: COUNTER_BYTES,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            counter,
            staging,
            state: ReadbackState::Idle,
            tracker: CounterTracker::default(),
        }
    }

    /// The counter buffer, bound to the cull dispatch and (on the
    /// count-buffer strategy) to the multi-draw.
    #[must_use]
    pub fn counter_buffer(&self) -> &wgpu::Buffer {
        &self.counter
    }

    /// Zeroes one pass's counter ahead of its dispatch.
    pub fn reset_before_dispatch(&mut self, queue: &wgpu::Queue, pass: RenderPassKind) {
        queue.write_buffer(
            &self.counter,
            u64::from(pass.index()) * 4,
            &0u32.to_le_bytes(),
        );
        self.tracker.note_reset(pass);
    }

    /// Records that a dispatch now owns the zeroed counter.
    pub fn mark_dispatched(&mut self, pass: RenderPassKind) {
        debug_assert!(
            self.tracker.is_zeroed(pass),
            "cull dispatch recorded without a counter reset"
        );
        self.tracker.note_dispatch(pass);
    }

    /// Count of commands the previous completed frame emitted.
    #[must_use]
    pub fn previous_frame_count(&self, pass: RenderPassKind) -> u32 {
        self.tracker.last_count(pass)
    }

    /// High-water command count; never decreases within a session.
    #[must_use]
    pub fn conservative_count(&self, pass: RenderPassKind) -> u32 {
        self.tracker.conservative_count(pass)
    }

    /// High-water single-draw index count, for shared-index sizing.
    #[must_use]
    pub fn max_element_count(&self) -> u32 {
        self.tracker.max_elements()
    }

    /// Records the counter -> staging copy at end of frame.
    ///
    /// Skipped while a previous readback is still in flight; counts
    /// then stay one extra frame stale, which the high-water contract
    /// already tolerates.
    pub fn encode_copy(&mut self, encoder: &mut wgpu::CommandEncoder) {
        if matches!(self.state, ReadbackState::Idle) {
            encoder.copy_buffer_to_buffer(&self.counter, 0, &self.staging, 0, COUNTER_BYTES);
            self.state = ReadbackState::CopyRecorded;
        }
    }

    /// Starts the asynchronous map after the frame was submitted.
    pub fn after_submit(&mut self) {
        if matches!(self.state, ReadbackState::CopyRecorded) {
            let (sender, receiver) = bounded(1);
            self.staging
                .slice(..)
                .map_async(wgpu::MapMode::Read, move |result| {
                    let _ = sender.try_send(result.is_ok());
                });
            self.state = ReadbackState::Mapping(receiver);
        }
    }

    /// Non-blocking ingest of a completed map, called at frame start.
    pub fn poll_ingest(&mut self, device: &wgpu::Device) {
        let ReadbackState::Mapping(receiver) = &self.state else {
            return;
        };

        let _ = device.poll(wgpu::Maintain::Poll);
        let Ok(mapped) = receiver.try_recv() else {
            // Not ready yet; try again next frame.
            return;
        };

        if mapped {
            let view = self.staging.slice(..).get_mapped_range();
            let words: &[u32] = bytemuck::cast_slice(&view);
            let counters = [words[0], words[1], words[2], words[3]];
            drop(view);
            self.tracker.ingest(counters);
        } else {
            tracing::warn!("counter readback map failed; keeping previous counts");
        }

        self.staging.unmap();
        self.state = ReadbackState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_marks_counter_zeroed() {
        let mut tracker = CounterTracker::default();

        tracker.note_reset(RenderPassKind::Solid);
        assert!(tracker.is_zeroed(RenderPassKind::Solid));
        assert!(!tracker.is_zeroed(RenderPassKind::Cutout));

        // The dispatch consumes the zeroed state.
        tracker.note_dispatch(RenderPassKind::Solid);
        assert!(!tracker.is_zeroed(RenderPassKind::Solid));
    }

    #[test]
    fn test_high_water_never_decreases() {
        let mut tracker = CounterTracker::default();

        tracker.ingest([100, 5, 0, 600]);
        assert_eq!(tracker.conservative_count(RenderPassKind::Solid), 100);

        // A quieter frame lowers the raw count but not the mark.
        tracker.ingest([40, 2, 0, 300]);
        assert_eq!(tracker.last_count(RenderPassKind::Solid), 40);
        assert_eq!(tracker.conservative_count(RenderPassKind::Solid), 100);

        // A spike raises it.
        tracker.ingest([250, 2, 0, 1_200]);
        assert_eq!(tracker.conservative_count(RenderPassKind::Solid), 250);
    }

    #[test]
    fn test_max_elements_monotonic() {
        let mut tracker = CounterTracker::default();

        tracker.ingest([0, 0, 0, 900]);
        tracker.ingest([0, 0, 0, 300]);
        assert_eq!(tracker.max_elements(), 900);
    }

    #[test]
    fn test_passes_tracked_independently() {
        let mut tracker = CounterTracker::default();

        tracker.ingest([10, 20, 30, 0]);
        assert_eq!(tracker.conservative_count(RenderPassKind::Solid), 10);
        assert_eq!(tracker.conservative_count(RenderPassKind::Cutout), 20);
        assert_eq!(tracker.conservative_count(RenderPassKind::Translucent), 30);
    }
}
