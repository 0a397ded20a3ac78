use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bkp_api_types::EngineError;

/// A cancellable context shared by every suspension point an action
/// touches: network calls, disk I/O, backoff sleeps, semaphore acquisitions.
/// A control-plane "stop action" directive sets it; the next suspension
/// point observes it and returns [`EngineError::Cancelled`].
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}
