//! Trip tracking-status reads and writes.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::cancel::CancelHandle;
use crate::channel::{ChannelRegistry, Topic, TopicEvent};
use crate::models::{StatusUpdate, TripTrackingStatus};
use crate::store::TrackingStore;

/// Single write/read path for a trip's tracking lifecycle.
///
/// Transitions are advisory, not enforced: the store has no transactional
/// guard, and dispatch tooling must be able to write manually corrected
/// states. An out-of-order write is logged at `warn` and still applied.
pub struct TripStatusMachine {
    store: Arc<dyn TrackingStore>,
    registry: ChannelRegistry,
}

impl TripStatusMachine {
    pub fn new(store: Arc<dyn TrackingStore>) -> Self {
        let registry = ChannelRegistry::new(store.clone());
        Self { store, registry }
    }

    /// Write the trip's status record. Fields left `None` in `update` keep
    /// their stored value. Returns false when the store write fails; the
    /// caller decides whether to retry.
    pub async fn set_status(&self, update: StatusUpdate) -> bool {
        match self.store.get_trip_status(&update.trip_id).await {
            Ok(Some(current)) if !current.status.allows(update.status) => {
                let kind = if current.status.is_terminal() {
                    "trip status written after terminal state"
                } else {
                    "out-of-order trip status transition"
                };
                warn!(
                    trip_id = %update.trip_id,
                    from = current.status.as_str(),
                    to = update.status.as_str(),
                    "{kind}"
                );
            }
            Ok(_) => {}
            Err(e) => {
                // Only the write matters; a failed pre-read just skips the
                // transition check.
                warn!(trip_id = %update.trip_id, error = %e, "could not read current status");
            }
        }

        match self.store.upsert_trip_status(&update).await {
            Ok(stored) => {
                info!(
                    trip_id = %stored.trip_id,
                    status = stored.status.as_str(),
                    "trip status updated"
                );
                true
            }
            Err(e) => {
                error!(trip_id = %update.trip_id, error = %e, "trip status write failed");
                false
            }
        }
    }

    /// Deliver every remote change of the trip's status record to
    /// `on_change`. Idempotent per trip within this machine instance.
    pub fn subscribe_to_status(
        &self,
        trip_id: &str,
        on_change: impl Fn(TripTrackingStatus) + Send + Sync + 'static,
    ) -> CancelHandle {
        self.registry.subscribe(
            Topic::TripStatus {
                trip_id: trip_id.to_string(),
            },
            Arc::new(move |event| {
                if let TopicEvent::Status(status) = event {
                    on_change(status);
                }
            }),
        )
    }

    /// Teardown of every status subscription held by this machine.
    pub fn unsubscribe_all(&self) {
        self.registry.unsubscribe_all();
    }
}
