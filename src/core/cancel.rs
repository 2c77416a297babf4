//! Cooperative cancellation flag shared between a running operation and
//! whoever may supersede it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cloneable cancellation token.
///
/// Cancelling is sticky: once set, every clone observes it. Operations poll
/// [`CancelToken::is_cancelled`] at their checkpoints and bail out quietly.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
