//! Cooperative cancellation for long-running analyses.
//!
//! Graph algorithms check the token at loop tops; on cancellation the
//! analysis returns an envelope with `error: cancelled` rather than
//! aborting the process. Deadlines reuse the same mechanism: an expired
//! deadline reads as a timeout instead of a cancel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Result, RoamError};

/// Shared cancellation signal with an optional wall-clock deadline.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
}

impl CancelToken {
    /// A token that never fires unless `cancel()` is called.
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that fires automatically after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
            timeout: Some(timeout),
        }
    }

    /// Request cancellation. Safe to call from another thread.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Check the token at a loop top.
    ///
    /// Returns `Cancelled` when cancellation was requested, `Timeout`
    /// when the deadline expired first.
    pub fn check(&self) -> Result<()> {
        if self.flag.load(Ordering::Relaxed) {
            return Err(RoamError::Cancelled);
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(RoamError::Timeout(
                    self.timeout.unwrap_or(Duration::ZERO),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_token_passes() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_cancel_trips_check() {
        let token = CancelToken::new();
        token.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(RoamError::Cancelled)));
    }

    #[test]
    fn test_expired_deadline_reads_as_timeout() {
        let token = CancelToken::with_timeout(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert!(matches!(token.check(), Err(RoamError::Timeout(_))));
    }

    #[test]
    fn test_clone_shares_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
