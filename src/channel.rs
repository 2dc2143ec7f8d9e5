//! Per-session registry of live change-feed subscriptions.
//!
//! A registry instance belongs to one composition root (a WebSocket
//! connection, the status machine, a tracking session) and guarantees at most
//! one live underlying channel per topic. Subscribing to a topic that is
//! already live logs a warning and hands back the existing cancel handle
//! instead of opening a second channel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::cancel::CancelHandle;
use crate::models::{LocationSample, TripTrackingStatus};
use crate::store::{ChangeEvent, TrackingStore};

/// Scope of a subscription: one trip, and optionally one subject within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// A single subject's live location within a trip.
    SubjectLocation {
        trip_id: String,
        subject_id: String,
    },
    /// The full set of tracked subjects within a trip. Any location change
    /// for the trip triggers a fresh snapshot query, because several subjects
    /// can move independently and the consumer needs a consistent set.
    TripLocations { trip_id: String },
    /// The trip's tracking-status record.
    TripStatus { trip_id: String },
}

/// Typed payload delivered to a topic handler.
#[derive(Debug, Clone)]
pub enum TopicEvent {
    Location(LocationSample),
    /// Consistent snapshot of every tracked subject on the trip.
    LocationSet(Vec<LocationSample>),
    Status(TripTrackingStatus),
}

pub type TopicHandler = Arc<dyn Fn(TopicEvent) + Send + Sync>;

pub struct ChannelRegistry {
    store: Arc<dyn TrackingStore>,
    active: Arc<Mutex<HashMap<Topic, CancelHandle>>>,
}

impl ChannelRegistry {
    pub fn new(store: Arc<dyn TrackingStore>) -> Self {
        Self {
            store,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Open a channel for `topic`, delivering matching change events to
    /// `handler`. Idempotent per topic: a duplicate subscribe returns the
    /// cancel handle of the channel that is already open.
    pub fn subscribe(&self, topic: Topic, handler: TopicHandler) -> CancelHandle {
        let mut active = self.active.lock().unwrap();
        if let Some(existing) = active.get(&topic) {
            warn!(?topic, "duplicate subscribe; reusing existing channel");
            return existing.clone();
        }

        let mut rx = self.store.subscribe_changes();
        let store = self.store.clone();
        let task_topic = topic.clone();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => deliver(&store, &task_topic, event, &handler).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(?task_topic, skipped, "change feed lagged, events skipped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let abort = task.abort_handle();
        let map = Arc::clone(&self.active);
        let key = topic.clone();
        let handle = CancelHandle::new(move || {
            abort.abort();
            map.lock().unwrap().remove(&key);
            debug!(topic = ?key, "channel subscription cancelled");
        });
        active.insert(topic, handle.clone());
        handle
    }

    pub fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    /// Cancel every tracked subscription. Used on full teardown, e.g. when a
    /// client disconnects from a trip view.
    pub fn unsubscribe_all(&self) {
        // Drain under the lock, cancel outside it: each cancel closure
        // re-enters the map to remove its own key.
        let handles: Vec<CancelHandle> = {
            let mut active = self.active.lock().unwrap();
            active.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            handle.cancel();
        }
    }
}

async fn deliver(
    store: &Arc<dyn TrackingStore>,
    topic: &Topic,
    event: ChangeEvent,
    handler: &TopicHandler,
) {
    match (topic, event) {
        (
            Topic::SubjectLocation {
                trip_id,
                subject_id,
            },
            ChangeEvent::Location { sample },
        ) => {
            if &sample.trip_id == trip_id && &sample.subject_id == subject_id {
                handler(TopicEvent::Location(sample));
            }
        }
        (Topic::TripLocations { trip_id }, ChangeEvent::Location { sample }) => {
            if &sample.trip_id != trip_id {
                return;
            }
            // Re-query instead of trusting the incremental payload.
            match store.list_locations(trip_id).await {
                Ok(samples) => handler(TopicEvent::LocationSet(samples)),
                Err(e) => {
                    warn!(trip_id, error = %e, "snapshot query failed, skipping delivery")
                }
            }
        }
        (Topic::TripStatus { trip_id }, ChangeEvent::Status { status }) => {
            if &status.trip_id == trip_id {
                handler(TopicEvent::Status(status));
            }
        }
        // Event kind outside this topic's scope
        _ => {}
    }
}
