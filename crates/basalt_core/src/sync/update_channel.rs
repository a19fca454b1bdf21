//! # Update Channel
//!
//! A single-slot "latest request" channel.
//!
//! The producer side is a non-blocking signal: a call either creates the
//! one pending request or is a no-op because one is already pending.
//! Ten requests between consumer wake-ups collapse into one unit of
//! work. The consumer side blocks until a request is pending and drains
//! it.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

/// Coalescing wake-up channel between a producer and one consumer.
///
/// Built on a bounded(1) channel: the buffer slot *is* the pending
/// request. Cloning shares the same slot.
#[derive(Clone)]
pub struct UpdateChannel {
    sender: Sender<()>,
    receiver: Receiver<()>,
}

impl UpdateChannel {
    /// Creates a channel with no pending request.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = bounded(1);
        Self { sender, receiver }
    }

    /// Signals that an update is wanted.
    ///
    /// Never blocks. Returns `true` if this call created the pending
    /// request, `false` if it coalesced into one already pending.
    pub fn request(&self) -> bool {
        self.sender.try_send(()).is_ok()
    }

    /// Returns `true` if a request is pending but not yet consumed.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.receiver.is_empty()
    }

    /// Blocks until a request is pending, then consumes it.
    ///
    /// Returns `false` if every producer handle has been dropped and no
    /// request will ever arrive; consumer loops use that as their exit
    /// condition.
    pub fn wait(&self) -> bool {
        self.receiver.recv().is_ok()
    }

    /// Consumes a pending request without blocking.
    ///
    /// Returns `true` if a request was pending.
    pub fn try_take(&self) -> bool {
        match self.receiver.try_recv() {
            Ok(()) => true,
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => false,
        }
    }
}

impl Default for UpdateChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_then_take() {
        let channel = UpdateChannel::new();

        assert!(!channel.is_pending());
        assert!(channel.request());
        assert!(channel.is_pending());
        assert!(channel.try_take());
        assert!(!channel.is_pending());
    }

    #[test]
    fn test_burst_coalesces_to_one() {
        let channel = UpdateChannel::new();

        assert!(channel.request());
        for _ in 0..100 {
            // Already pending: every further signal is a no-op.
            assert!(!channel.request());
        }

        assert!(channel.try_take());
        // Exactly one unit of work was pending.
        assert!(!channel.try_take());
    }

    #[test]
    fn test_request_after_take_is_fresh() {
        let channel = UpdateChannel::new();

        channel.request();
        channel.try_take();

        assert!(channel.request());
        assert!(channel.is_pending());
    }

    #[test]
    fn test_wait_wakes_consumer() {
        let channel = UpdateChannel::new();
        let consumer = channel.clone();

        let worker = std::thread::spawn(move || consumer.wait());
        channel.request();

        assert!(worker.join().unwrap());
    }
}
