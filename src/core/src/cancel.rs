use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{BakeError, Result};

/// Cooperative cancellation flag shared between a caller and a running build.
///
/// Clones observe the same flag. Long-running steps call [`check`](Self::check)
/// at their boundaries and stop with [`BakeError::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with `Cancelled` if cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(BakeError::Cancelled)
        } else {
            Ok(())
        }
    }
}
