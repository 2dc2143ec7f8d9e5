//! Pickup-zone arrival detection.
//!
//! Polls the trip's most recent location on a fixed interval and fires a
//! one-shot callback the first time it lands inside the zone. Polling the
//! store (rather than subscribing to the raw fix stream) keeps the monitor
//! insensitive to fix frequency and applies the same freshness rules as
//! every other reader.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cancel::CancelHandle;
use crate::config::GeofenceConfig;
use crate::geo;
use crate::models::Coordinate;
use crate::store::TrackingStore;

pub struct GeofenceMonitor {
    store: Arc<dyn TrackingStore>,
    config: GeofenceConfig,
}

impl GeofenceMonitor {
    pub fn new(store: Arc<dyn TrackingStore>, config: GeofenceConfig) -> Self {
        Self { store, config }
    }

    /// Watch the trip's latest position until it enters the circle around
    /// `center`. `on_arrival` fires exactly once; afterwards the monitor
    /// stops polling on its own. A `radius` of `None` uses the configured
    /// default.
    ///
    /// Failed or empty position reads skip the tick. A trip with no samples
    /// yet simply has not arrived.
    pub fn monitor_pickup_zone(
        &self,
        trip_id: &str,
        center: Coordinate,
        radius_meters: Option<f64>,
        on_arrival: impl FnOnce() + Send + 'static,
    ) -> CancelHandle {
        let radius = radius_meters.unwrap_or(self.config.default_radius_meters);
        let poll_interval = self.config.poll_interval();
        let store = self.store.clone();
        let trip = trip_id.to_string();
        info!(trip_id = %trip, radius_meters = radius, "monitoring pickup zone");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick of tokio's interval completes immediately;
            // consume it so the first real check happens one interval in.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let sample = match store.latest_location(&trip).await {
                    Ok(Some(sample)) => sample,
                    Ok(None) => {
                        debug!(trip_id = %trip, "no position yet, skipping geofence check");
                        continue;
                    }
                    Err(e) => {
                        warn!(trip_id = %trip, error = %e, "geofence position read failed");
                        continue;
                    }
                };

                if geo::within_geofence(sample.coordinates, center, radius) {
                    info!(trip_id = %trip, "subject entered pickup zone");
                    on_arrival();
                    break;
                }
            }
        });

        let abort = task.abort_handle();
        CancelHandle::new(move || abort.abort())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        EmergencyAlert, LocationSample, StatusUpdate, TripTrackingStatus, UserProfile,
    };
    use crate::store::{ChangeEvent, StoreError};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::broadcast;

    /// Serves a scripted sequence of positions, one per poll, then repeats
    /// the last entry. Counts how many polls were answered.
    struct ScriptedStore {
        script: Mutex<Vec<Result<Option<Coordinate>, ()>>>,
        polls: AtomicUsize,
        changes_tx: broadcast::Sender<ChangeEvent>,
    }

    impl ScriptedStore {
        fn new(script: Vec<Result<Option<Coordinate>, ()>>) -> Self {
            let (changes_tx, _) = broadcast::channel(16);
            let mut script = script;
            script.reverse();
            Self {
                script: Mutex::new(script),
                polls: AtomicUsize::new(0),
                changes_tx,
            }
        }
    }

    #[async_trait]
    impl TrackingStore for ScriptedStore {
        async fn upsert_location(&self, _sample: &LocationSample) -> Result<(), StoreError> {
            Ok(())
        }
        async fn latest_location(
            &self,
            trip_id: &str,
        ) -> Result<Option<LocationSample>, StoreError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            let entry = if script.len() > 1 {
                script.pop().unwrap()
            } else {
                script.last().cloned().unwrap_or(Ok(None))
            };
            match entry {
                Ok(coordinates) => Ok(coordinates.map(|coordinates| LocationSample {
                    trip_id: trip_id.to_string(),
                    subject_id: "driver-1".to_string(),
                    coordinates,
                    heading_degrees: None,
                    speed_mps: 8.0,
                    accuracy_meters: 5.0,
                    captured_at: Utc::now(),
                })),
                Err(()) => Err(StoreError::Data("injected read failure".to_string())),
            }
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

    fn fast_config() -> GeofenceConfig {
        GeofenceConfig {
            poll_interval_ms: 20,
            default_radius_meters: 100.0,
        }
    }

    // Pickup at Dubai Marina; ~300 m and ~3 km away respectively.
    const PICKUP: (f64, f64) = (25.0772, 55.1398);
    const NEARBY: (f64, f64) = (25.0790, 55.1420);
    const FAR: (f64, f64) = (25.0500, 55.1398);

    fn coord(pair: (f64, f64)) -> Coordinate {
        Coordinate::new(pair.0, pair.1).unwrap()
    }

    #[tokio::test]
    async fn fires_once_on_entry_and_stops_polling() {
        let store = Arc::new(ScriptedStore::new(vec![
            Ok(Some(coord(FAR))),
            Ok(Some(coord(FAR))),
            Ok(Some(coord(NEARBY))),
        ]));
        let monitor = GeofenceMonitor::new(store.clone(), fast_config());

        let fired = Arc::new(AtomicUsize::new(0));
        let sink = fired.clone();
        let _handle = monitor.monitor_pickup_zone("trip-1", coord(PICKUP), Some(500.0), move || {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        // Three answered polls, then the loop ended.
        assert_eq!(store.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn boundary_distance_counts_as_inside() {
        // NEARBY sits roughly 290 m from the pickup point; a radius equal to
        // that distance must still fire.
        let distance = geo::distance_meters(coord(PICKUP), coord(NEARBY));
        let store = Arc::new(ScriptedStore::new(vec![Ok(Some(coord(NEARBY)))]));
        let monitor = GeofenceMonitor::new(store, fast_config());

        let fired = Arc::new(AtomicUsize::new(0));
        let sink = fired.clone();
        let _handle =
            monitor.monitor_pickup_zone("trip-1", coord(PICKUP), Some(distance), move || {
                sink.fetch_add(1, Ordering::SeqCst);
            });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_and_empty_reads_skip_the_tick() {
        let store = Arc::new(ScriptedStore::new(vec![
            Err(()),
            Ok(None),
            Ok(Some(coord(NEARBY))),
        ]));
        let monitor = GeofenceMonitor::new(store, fast_config());

        let fired = Arc::new(AtomicUsize::new(0));
        let sink = fired.clone();
        let _handle = monitor.monitor_pickup_zone("trip-1", coord(PICKUP), Some(500.0), move || {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_stops_the_monitor_before_arrival() {
        let store = Arc::new(ScriptedStore::new(vec![Ok(Some(coord(FAR)))]));
        let monitor = GeofenceMonitor::new(store.clone(), fast_config());

        let fired = Arc::new(AtomicUsize::new(0));
        let sink = fired.clone();
        let handle = monitor.monitor_pickup_zone("trip-1", coord(PICKUP), None, move || {
            sink.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.cancel();
        handle.cancel();
        let polls_at_cancel = store.polls.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(store.polls.load(Ordering::SeqCst), polls_at_cancel);
    }
}
