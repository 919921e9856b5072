//! Per-request execution context.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::TransportError;

/// Cancellation and time bounds for the network calls of one push.
///
/// The context bounds each attempt; it does not pull a job out of the queue.
/// Clones share the cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl RequestContext {
    /// No timeout, no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    /// Bound every single request to `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Refuse to start requests after `deadline`, and cut the ones in flight.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Time a request may take from now, or the reason it must not start.
    ///
    /// `Ok(None)` means unbounded.
    pub fn budget(&self) -> Result<Option<Duration>, TransportError> {
        if self.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let left = match self.deadline {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                if left.is_zero() {
                    return Err(TransportError::DeadlineExceeded);
                }
                Some(left)
            }
            None => None,
        };

        Ok(match (self.timeout, left) {
            (Some(t), Some(l)) => Some(t.min(l)),
            (t, l) => t.or(l),
        })
    }
}
