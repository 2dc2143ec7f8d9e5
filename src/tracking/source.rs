//! Continuous position-fix streams.
//!
//! A [`PositionSource`] is anything that can produce an ongoing stream of
//! fixes: device GPS on a mobile client, or — in this service — the ingest
//! API feeding a broadcast channel. Streams are continuous, not one-shot,
//! and stale fixes are filtered out before delivery.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::cancel::CancelHandle;
use crate::models::PositionFix;

#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Request high-accuracy positioning where the source supports it.
    pub high_accuracy: bool,
    /// Fixes older than this at delivery time are dropped, never handed to
    /// the callback.
    pub max_staleness: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            max_staleness: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("position stream lagged, {0} fixes skipped")]
    Lagged(u64),
    #[error("position stream ended")]
    Ended,
}

pub type FixHandler = Arc<dyn Fn(PositionFix) + Send + Sync>;
pub type SourceErrorHandler = Arc<dyn Fn(SourceError) + Send + Sync>;

pub trait PositionSource: Send + Sync {
    /// Begin a continuous stream of fixes at source-defined frequency.
    /// `on_fix` fires for every fresh fix, `on_error` for stream-level
    /// problems. The returned handle stops the stream; cancelling twice is a
    /// no-op.
    fn watch(
        &self,
        options: WatchOptions,
        on_fix: FixHandler,
        on_error: SourceErrorHandler,
    ) -> CancelHandle;
}

/// Fix producer fed by the ingest API. Stands in for device GPS on the
/// server side: whatever the client reports is fanned out to watchers.
pub struct ChannelPositionSource {
    tx: broadcast::Sender<PositionFix>,
}

impl ChannelPositionSource {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Feed one fix into the stream. Fixes pushed while nobody is watching
    /// are discarded.
    pub fn push(&self, fix: PositionFix) {
        let _ = self.tx.send(fix);
    }
}

impl PositionSource for ChannelPositionSource {
    fn watch(
        &self,
        options: WatchOptions,
        on_fix: FixHandler,
        on_error: SourceErrorHandler,
    ) -> CancelHandle {
        // high_accuracy is advisory here: this source relays whatever the
        // reporting device produced.
        debug!(
            high_accuracy = options.high_accuracy,
            max_staleness_ms = options.max_staleness.as_millis() as u64,
            "starting position watch"
        );
        let max_staleness =
            chrono::Duration::from_std(options.max_staleness).unwrap_or(chrono::Duration::MAX);

        let mut rx = self.tx.subscribe();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(fix) => {
                        let age = Utc::now() - fix.captured_at;
                        if age > max_staleness {
                            debug!(age_ms = age.num_milliseconds(), "dropping stale fix");
                            continue;
                        }
                        on_fix(fix);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        on_error(SourceError::Lagged(skipped));
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        on_error(SourceError::Ended);
                        break;
                    }
                }
            }
        });

        let abort = task.abort_handle();
        CancelHandle::new(move || abort.abort())
    }
}
