//! Cooperative cancellation for running handlers.
//!
//! Each dispatched handler gets a `CancelToken` through its context. The
//! dispatcher signals it when the execution budget elapses; a long-running
//! handler can poll it between work units and bail out early. The token is
//! advisory — a handler that never checks it simply runs to completion on
//! its blocking thread and has its result discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cancellation token that can be checked by a running handler.
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
