//! Publishes fixes for one (trip, subject) as store samples.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::models::{LocationSample, PositionFix};
use crate::store::TrackingStore;

/// Turns raw fixes into [`LocationSample`]s and upserts them keyed by
/// (trip, subject). Last write wins; no history is kept at this layer.
///
/// A failed store write is logged and the sample dropped: the next fix
/// supersedes it almost immediately, and a transient write failure must
/// never stop position tracking. There is no synchronous retry.
pub struct LocationPublisher {
    store: Arc<dyn TrackingStore>,
    trip_id: String,
    subject_id: String,
    min_publish_interval: Duration,
    last_published: Option<Instant>,
}

impl LocationPublisher {
    pub fn new(
        store: Arc<dyn TrackingStore>,
        trip_id: impl Into<String>,
        subject_id: impl Into<String>,
        min_publish_interval: Duration,
    ) -> Self {
        Self {
            store,
            trip_id: trip_id.into(),
            subject_id: subject_id.into(),
            min_publish_interval,
            last_published: None,
        }
    }

    pub async fn publish(&mut self, fix: PositionFix) {
        if self.throttled() {
            debug!(
                trip_id = %self.trip_id,
                subject_id = %self.subject_id,
                "throttling fix below minimum publish interval"
            );
            return;
        }

        let sample = LocationSample {
            trip_id: self.trip_id.clone(),
            subject_id: self.subject_id.clone(),
            coordinates: fix.coordinates,
            heading_degrees: fix.heading_degrees,
            speed_mps: fix.speed_mps,
            accuracy_meters: fix.accuracy_meters,
            captured_at: fix.captured_at,
        };

        match self.store.upsert_location(&sample).await {
            Ok(()) => {
                self.last_published = Some(Instant::now());
            }
            Err(e) => {
                warn!(
                    trip_id = %self.trip_id,
                    subject_id = %self.subject_id,
                    error = %e,
                    "location write failed, dropping sample"
                );
            }
        }
    }

    fn throttled(&self) -> bool {
        if self.min_publish_interval.is_zero() {
            return false;
        }
        match self.last_published {
            Some(at) => at.elapsed() < self.min_publish_interval,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Coordinate, EmergencyAlert, StatusUpdate, TripTrackingStatus, UserProfile,
    };
    use crate::store::{ChangeEvent, StoreError, TrackingStore};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use tokio::sync::broadcast;

    /// Store fake that records location writes and can be told to fail them.
    struct RecordingStore {
        written: Mutex<Vec<LocationSample>>,
        fail_writes: AtomicBool,
        changes_tx: broadcast::Sender<ChangeEvent>,
    }

    impl RecordingStore {
        fn new() -> Self {
            let (changes_tx, _) = broadcast::channel(16);
            Self {
                written: Mutex::new(Vec::new()),
                fail_writes: AtomicBool::new(false),
                changes_tx,
            }
        }
    }

    #[async_trait]
    impl TrackingStore for RecordingStore {
        async fn upsert_location(&self, sample: &LocationSample) -> Result<(), StoreError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(StoreError::Data("injected write failure".to_string()));
            }
            self.written.lock().unwrap().push(sample.clone());
            Ok(())
        }
        async fn latest_location(
            &self,
            _trip_id: &str,
        ) -> Result<Option<LocationSample>, StoreError> {
            Ok(self.written.lock().unwrap().last().cloned())
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

    #[tokio::test]
    async fn publishes_samples_bound_to_trip_and_subject() {
        let store = Arc::new(RecordingStore::new());
        let mut publisher =
            LocationPublisher::new(store.clone(), "trip-1", "driver-1", Duration::ZERO);

        publisher.publish(fix(10.0)).await;
        publisher.publish(fix(11.0)).await;

        let written = store.written.lock().unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].trip_id, "trip-1");
        assert_eq!(written[0].subject_id, "driver-1");
        assert_eq!(written[1].speed_mps, 11.0);
    }

    #[tokio::test]
    async fn write_failure_is_swallowed_and_tracking_continues() {
        let store = Arc::new(RecordingStore::new());
        let mut publisher =
            LocationPublisher::new(store.clone(), "trip-1", "driver-1", Duration::ZERO);

        store.fail_writes.store(true, Ordering::SeqCst);
        publisher.publish(fix(10.0)).await;
        assert!(store.written.lock().unwrap().is_empty());

        store.fail_writes.store(false, Ordering::SeqCst);
        publisher.publish(fix(11.0)).await;
        assert_eq!(store.written.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn throttle_skips_fixes_inside_the_interval() {
        let store = Arc::new(RecordingStore::new());
        let mut publisher = LocationPublisher::new(
            store.clone(),
            "trip-1",
            "driver-1",
            Duration::from_millis(100),
        );

        publisher.publish(fix(10.0)).await;
        publisher.publish(fix(11.0)).await; // inside the interval, dropped
        assert_eq!(store.written.lock().unwrap().len(), 1);

        tokio::time::sleep(Duration::from_millis(120)).await;
        publisher.publish(fix(12.0)).await;
        assert_eq!(store.written.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failed_write_does_not_start_the_throttle_window() {
        let store = Arc::new(RecordingStore::new());
        let mut publisher = LocationPublisher::new(
            store.clone(),
            "trip-1",
            "driver-1",
            Duration::from_secs(60),
        );

        store.fail_writes.store(true, Ordering::SeqCst);
        publisher.publish(fix(10.0)).await;

        store.fail_writes.store(false, Ordering::SeqCst);
        publisher.publish(fix(11.0)).await;
        assert_eq!(store.written.lock().unwrap().len(), 1);
    }
}
