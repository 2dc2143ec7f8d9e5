//! Per-(trip, subject) tracking sessions.
//!
//! A session wires a [`ChannelPositionSource`] through an unbounded queue to
//! a [`LocationPublisher`] task. The queue decouples fix delivery from store
//! writes — a slow write never blocks the next fix — while the single
//! consumer keeps per-subject writes in the exact order fixes arrived.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cancel::CancelHandle;
use crate::config::TrackingConfig;
use crate::models::PositionFix;
use crate::store::TrackingStore;
use crate::tracking::{ChannelPositionSource, LocationPublisher, PositionSource, WatchOptions};

/// Fixes buffered ahead of the publisher before the source starts lagging.
const SOURCE_CAPACITY: usize = 32;

type SessionKey = (String, String);

struct Session {
    source: Arc<ChannelPositionSource>,
    cancel: CancelHandle,
}

/// Owns every live tracking session in the process; the composition root
/// for the location pipeline.
pub struct SessionManager {
    store: Arc<dyn TrackingStore>,
    config: TrackingConfig,
    sessions: Arc<Mutex<HashMap<SessionKey, Session>>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn TrackingStore>, config: TrackingConfig) -> Self {
        Self {
            store,
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Start (or reuse) the tracking session for (trip, subject) and return
    /// its cancel handle. Starting an already-running session is a no-op
    /// that hands back the existing handle.
    pub fn start(&self, trip_id: &str, subject_id: &str) -> CancelHandle {
        let key = (trip_id.to_string(), subject_id.to_string());
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(existing) = sessions.get(&key) {
            return existing.cancel.clone();
        }

        info!(trip_id, subject_id, "starting tracking session");
        let source = Arc::new(ChannelPositionSource::new(SOURCE_CAPACITY));

        // Ordered hand-off: the watch callback only enqueues, the publisher
        // task drains sequentially.
        let (queue_tx, mut queue_rx) = mpsc::unbounded_channel::<PositionFix>();
        let watch_cancel = source.watch(
            WatchOptions {
                high_accuracy: true,
                max_staleness: self.config.max_fix_staleness(),
            },
            Arc::new(move |fix| {
                let _ = queue_tx.send(fix);
            }),
            {
                let trip = key.0.clone();
                let subject = key.1.clone();
                Arc::new(move |e| {
                    warn!(trip_id = %trip, subject_id = %subject, error = %e, "position stream error");
                })
            },
        );

        let mut publisher = LocationPublisher::new(
            self.store.clone(),
            key.0.clone(),
            key.1.clone(),
            self.config.min_publish_interval(),
        );
        tokio::spawn(async move {
            // Ends once the watch task (the only sender) is gone.
            while let Some(fix) = queue_rx.recv().await {
                publisher.publish(fix).await;
            }
        });

        let sessions_ref = Arc::clone(&self.sessions);
        let cancel_key = key.clone();
        let cancel = CancelHandle::new(move || {
            watch_cancel.cancel();
            sessions_ref.lock().unwrap().remove(&cancel_key);
            info!(trip_id = %cancel_key.0, subject_id = %cancel_key.1, "tracking session stopped");
        });

        sessions.insert(
            key,
            Session {
                source,
                cancel: cancel.clone(),
            },
        );
        cancel
    }

    /// Feed a fix into a running session. Returns false when no session is
    /// active for the pair.
    pub fn push_fix(&self, trip_id: &str, subject_id: &str, fix: PositionFix) -> bool {
        let key = (trip_id.to_string(), subject_id.to_string());
        let sessions = self.sessions.lock().unwrap();
        match sessions.get(&key) {
            Some(session) => {
                session.source.push(fix);
                true
            }
            None => false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Stop every session belonging to one trip. Called when the trip
    /// reaches a terminal status; fixes reported afterwards are rejected
    /// until a new session is started.
    pub fn stop_trip(&self, trip_id: &str) {
        let cancels: Vec<CancelHandle> = {
            let mut sessions = self.sessions.lock().unwrap();
            let keys: Vec<SessionKey> = sessions
                .keys()
                .filter(|(trip, _)| trip == trip_id)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| sessions.remove(&key))
                .map(|s| s.cancel)
                .collect()
        };
        for cancel in cancels {
            cancel.cancel();
        }
    }

    /// Global teardown: stop every live stream.
    pub fn stop_all(&self) {
        let cancels: Vec<CancelHandle> = {
            let mut sessions = self.sessions.lock().unwrap();
            sessions.drain().map(|(_, s)| s.cancel).collect()
        };
        for cancel in cancels {
            cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Coordinate, EmergencyAlert, LocationSample, StatusUpdate, TripTrackingStatus, UserProfile,
    };
    use crate::store::{ChangeEvent, StoreError};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;
    use tokio::sync::broadcast;

    struct RecordingStore {
        written: Mutex<Vec<LocationSample>>,
        changes_tx: broadcast::Sender<ChangeEvent>,
    }

    impl RecordingStore {
        fn new() -> Self {
            let (changes_tx, _) = broadcast::channel(16);
            Self {
                written: Mutex::new(Vec::new()),
                changes_tx,
            }
        }
    }

    #[async_trait]
    impl TrackingStore for RecordingStore {
        async fn upsert_location(&self, sample: &LocationSample) -> Result<(), StoreError> {
            self.written.lock().unwrap().push(sample.clone());
            Ok(())
        }
        async fn latest_location(
            &self,
            _trip_id: &str,
        ) -> Result<Option<LocationSample>, StoreError> {
            Ok(None)
        }
        async fn latest_location_for(
            &self,
            _trip_id: &str,
            _subject_id: &str,
        ) -> Result<Option<LocationSample>, StoreError> {
            Ok(None)
        }
        async fn list_locations(
            &self,
            _trip_id: &str,
        ) -> Result<Vec<LocationSample>, StoreError> {
            Ok(Vec::new())
        }
        async fn upsert_trip_status(
            &self,
            update: &StatusUpdate,
        ) -> Result<TripTrackingStatus, StoreError> {
            Ok(TripTrackingStatus {
                trip_id: update.trip_id.clone(),
                status: update.status,
                eta: None,
                distance_remaining_meters: 0,
                duration_remaining_seconds: 0,
                updated_at: Utc::now(),
            })
        }
        async fn get_trip_status(
            &self,
            _trip_id: &str,
        ) -> Result<Option<TripTrackingStatus>, StoreError> {
            Ok(None)
        }
        async fn insert_emergency_alert(
            &self,
            _alert: &EmergencyAlert,
        ) -> Result<(), StoreError> {
            Ok(())
        }
        async fn get_profile(&self, _user_id: &str) -> Result<Option<UserProfile>, StoreError> {
            Ok(None)
        }
        async fn trip_participants(&self, _trip_id: &str) -> Result<Vec<String>, StoreError> {
            Ok(Vec::new())
        }
        fn subscribe_changes(&self) -> broadcast::Receiver<ChangeEvent> {
            self.changes_tx.subscribe()
        }
    }

    fn fix(speed: f64) -> PositionFix {
        PositionFix {
            coordinates: Coordinate::new(25.0772, 55.1398).unwrap(),
            heading_degrees: None,
            speed_mps: speed,
            accuracy_meters: 3.0,
            captured_at: Utc::now(),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn fixes_flow_through_to_the_store_in_order() {
        let store = Arc::new(RecordingStore::new());
        let manager = SessionManager::new(store.clone(), TrackingConfig::default());

        manager.start("trip-1", "driver-1");
        settle().await;

        for speed in [1.0, 2.0, 3.0, 4.0] {
            assert!(manager.push_fix("trip-1", "driver-1", fix(speed)));
        }
        settle().await;

        let written = store.written.lock().unwrap();
        let speeds: Vec<f64> = written.iter().map(|s| s.speed_mps).collect();
        assert_eq!(speeds, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(written.iter().all(|s| s.subject_id == "driver-1"));
    }

    #[tokio::test]
    async fn push_without_a_session_is_rejected() {
        let store = Arc::new(RecordingStore::new());
        let manager = SessionManager::new(store, TrackingConfig::default());
        assert!(!manager.push_fix("trip-1", "driver-1", fix(1.0)));
    }

    #[tokio::test]
    async fn start_is_idempotent_per_pair() {
        let store = Arc::new(RecordingStore::new());
        let manager = SessionManager::new(store, TrackingConfig::default());

        manager.start("trip-1", "driver-1");
        manager.start("trip-1", "driver-1");
        manager.start("trip-1", "rider-1");

        assert_eq!(manager.active_count(), 2);
    }

    #[tokio::test]
    async fn cancelled_session_stops_accepting_fixes() {
        let store = Arc::new(RecordingStore::new());
        let manager = SessionManager::new(store.clone(), TrackingConfig::default());

        let cancel = manager.start("trip-1", "driver-1");
        settle().await;
        cancel.cancel();
        cancel.cancel();

        assert_eq!(manager.active_count(), 0);
        assert!(!manager.push_fix("trip-1", "driver-1", fix(1.0)));
    }

    #[tokio::test]
    async fn stop_trip_only_touches_that_trips_sessions() {
        let store = Arc::new(RecordingStore::new());
        let manager = SessionManager::new(store, TrackingConfig::default());

        manager.start("trip-1", "driver-1");
        manager.start("trip-1", "rider-1");
        manager.start("trip-2", "driver-2");
        settle().await;

        manager.stop_trip("trip-1");

        assert_eq!(manager.active_count(), 1);
        assert!(!manager.push_fix("trip-1", "driver-1", fix(1.0)));
        assert!(!manager.push_fix("trip-1", "rider-1", fix(1.0)));
        assert!(manager.push_fix("trip-2", "driver-2", fix(1.0)));
    }

    #[tokio::test]
    async fn stop_all_tears_down_every_session() {
        let store = Arc::new(RecordingStore::new());
        let manager = SessionManager::new(store, TrackingConfig::default());

        manager.start("trip-1", "driver-1");
        manager.start("trip-2", "driver-2");
        manager.stop_all();

        assert_eq!(manager.active_count(), 0);
    }
}
