//! Idempotent cancellation handles.
//!
//! Every subscribe-style operation in this service (location streams, channel
//! subscriptions, geofence watches) hands one of these back to its caller.
//! Cancelling twice is safe, as is cancelling after the underlying task has
//! already finished on its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handle that tears down a background subscription exactly once.
#[derive(Clone)]
pub struct CancelHandle {
    inner: Arc<Inner>,
}

struct Inner {
    cancelled: AtomicBool,
    on_cancel: Box<dyn Fn() + Send + Sync>,
}

impl CancelHandle {
    pub fn new(on_cancel: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                on_cancel: Box::new(on_cancel),
            }),
        }
    }

    /// Run the teardown closure if it has not run yet. Safe to call any
    /// number of times, from any thread.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            (self.inner.on_cancel)();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
