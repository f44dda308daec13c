//! Cooperative cancellation shared between a session and its caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable cancellation flag.
///
/// Setting it stops a scan before its next fetch and an unsubscribe run before
/// its next attempt. Work already in flight is allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Clears the flag so the next operation can run.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}
