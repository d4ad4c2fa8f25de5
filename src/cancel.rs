//! Cooperative cancellation shared by every task of a batch

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::error::{BatchScaleError, Result};

/// Sticky cancellation flag.
///
/// Clones share the same flag. Tasks only read it at their checkpoints;
/// a conversion step that is already running finishes before the next
/// checkpoint can observe the cancellation.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancellationSignal {
    /// Create a signal that is not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Once set, the flag is never cleared.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            info!("Cancellation requested");
        }
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Checkpoint: fail with [`BatchScaleError::Cancelled`] if cancellation was requested
    pub fn throw_if_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(BatchScaleError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_starts_clear() {
        let signal = CancellationSignal::new();
        assert!(!signal.is_cancelled());
        assert!(signal.throw_if_cancelled().is_ok());
    }

    #[test]
    fn test_cancel_is_shared_and_sticky() {
        let signal = CancellationSignal::new();
        let clone = signal.clone();

        clone.cancel();
        clone.cancel();

        assert!(signal.is_cancelled());
        assert!(signal.throw_if_cancelled().unwrap_err().is_cancelled());
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let signal = CancellationSignal::new();
        let remote = signal.clone();

        std::thread::spawn(move || remote.cancel()).join().unwrap();

        assert!(signal.is_cancelled());
    }
}
