//! # GPU Fence
//!
//! Bounded wait for previously submitted GPU work.
//!
//! Used in exactly one place: before the host releases or resizes a
//! buffer the GPU might still be reading. The wait has a hard deadline;
//! exceeding it is a fatal, reported error, never an indefinite retry.

use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, TryRecvError};

use crate::error::CullingError;

/// How often the wait loop polls the device between channel checks.
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A point in the GPU timeline that signals when all work submitted
/// before it has completed.
pub struct FencePoint {
    signal: Receiver<()>,
}

impl FencePoint {
    /// Registers a fence after all work currently submitted to `queue`.
    ///
    /// The signal fires once the device observes completion; the device
    /// must be polled for that to happen, which [`FencePoint::wait`]
    /// does.
    #[must_use]
    pub fn after_submitted(queue: &wgpu::Queue) -> Self {
        let (sender, signal) = bounded(1);
        queue.on_submitted_work_done(move || {
            // Receiver may already be gone if the caller gave up.
            let _ = sender.try_send(());
        });
        Self { signal }
    }

    /// Blocks until the fence signals, polling `device`, for at most
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`CullingError::FenceTimeout`] if the deadline expires
    /// first.
    pub fn wait(&self, device: &wgpu::Device, timeout: Duration) -> Result<(), CullingError> {
        self.wait_with(timeout, || {
            let _ = device.poll(wgpu::Maintain::Poll);
        })
    }

    /// Deadline loop over an arbitrary poll action. Split out so the
    /// timeout path is testable without a device.
    fn wait_with(
        &self,
        timeout: Duration,
        mut poll: impl FnMut(),
    ) -> Result<(), CullingError> {
        let deadline = Instant::now() + timeout;
        loop {
            poll();
            match self.signal.try_recv() {
                Ok(()) => return Ok(()),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => {}
            }
            if Instant::now() >= deadline {
                let waited_ms = timeout.as_millis() as u64;
                tracing::error!(waited_ms, "GPU fence wait timed out");
                return Err(CullingError::FenceTimeout { waited_ms });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}
