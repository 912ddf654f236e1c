//! Cooperative cancellation for long-running batch jobs.
//!
//! Jobs poll `is_cancelled()` between units of work (one weight vector,
//! one entity partition) and stop with `ResonanceError::Cancelled`.

use crate::error::{ResonanceError, ResonanceResult};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once `cancel()` has been called on any clone.
    pub fn check(&self) -> ResonanceResult<()> {
        if self.is_cancelled() {
            Err(ResonanceError::Cancelled)
        } else {
            Ok(())
        }
    }
}
