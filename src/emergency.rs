//! SOS handling: durable alert record first, best-effort fan-out second.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info, warn};

use crate::models::{Coordinate, EmergencyAlert, UserProfile};
use crate::notify::{
    EmergencyCallout, EmergencyServicesClient, PushNotification, PushSender, SmsSender,
};
use crate::store::TrackingStore;

/// Per-contact outcome of the SMS fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FanoutReport {
    pub sent: usize,
    pub failed: usize,
}

pub struct EmergencyDispatcher {
    store: Arc<dyn TrackingStore>,
    sms: Arc<dyn SmsSender>,
    push: Arc<dyn PushSender>,
    services: Arc<dyn EmergencyServicesClient>,
}

impl EmergencyDispatcher {
    pub fn new(
        store: Arc<dyn TrackingStore>,
        sms: Arc<dyn SmsSender>,
        push: Arc<dyn PushSender>,
        services: Arc<dyn EmergencyServicesClient>,
    ) -> Self {
        Self {
            store,
            sms,
            push,
            services,
        }
    }

    /// Record an SOS and notify everyone who should know.
    ///
    /// The alert record is the one side effect that must not be lost: if its
    /// write fails the call returns false and no notification goes out. Once
    /// it is stored, the three notification channels run concurrently and
    /// independently; their failures are logged but never fail the call.
    pub async fn send_sos(
        &self,
        trip_id: &str,
        user_id: &str,
        location: Coordinate,
        reason: Option<String>,
    ) -> bool {
        let alert = EmergencyAlert::new(trip_id, user_id, location, reason);
        if let Err(e) = self.store.insert_emergency_alert(&alert).await {
            error!(trip_id, user_id, error = %e, "emergency alert write failed, aborting sos");
            return false;
        }
        info!(trip_id, user_id, alert_id = %alert.id, "emergency alert recorded");

        let (sms_report, _, _) = tokio::join!(
            self.notify_contacts(&alert),
            self.notify_participants(&alert),
            self.notify_services(&alert),
        );
        info!(
            trip_id,
            alert_id = %alert.id,
            sms_sent = sms_report.sent,
            sms_failed = sms_report.failed,
            "sos fan-out finished"
        );
        true
    }

    /// One SMS per emergency contact of the triggering user. A contact
    /// failure is counted and the loop continues.
    async fn notify_contacts(&self, alert: &EmergencyAlert) -> FanoutReport {
        let profile = match self.store.get_profile(&alert.triggered_by).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                warn!(user_id = %alert.triggered_by, "no profile for sos user, skipping sms");
                return FanoutReport::default();
            }
            Err(e) => {
                warn!(user_id = %alert.triggered_by, error = %e, "profile lookup failed, skipping sms");
                return FanoutReport::default();
            }
        };

        let message = sos_message(alert, &profile);
        let sends = profile.emergency_contacts.iter().map(|contact| {
            let message = message.clone();
            async move {
                match self.sms.send_sms(&contact.phone, &message).await {
                    Ok(receipt) => {
                        info!(
                            contact = %contact.name,
                            message_id = %receipt.message_id,
                            "sos sms delivered"
                        );
                        true
                    }
                    Err(e) => {
                        warn!(contact = %contact.name, error = %e, "sos sms failed");
                        false
                    }
                }
            }
        });

        let outcomes = join_all(sends).await;
        let sent = outcomes.iter().filter(|ok| **ok).count();
        FanoutReport {
            sent,
            failed: outcomes.len() - sent,
        }
    }

    /// Push to every trip participant, each send independent.
    async fn notify_participants(&self, alert: &EmergencyAlert) {
        let participants = match self.store.trip_participants(&alert.trip_id).await {
            Ok(participants) => participants,
            Err(e) => {
                warn!(trip_id = %alert.trip_id, error = %e, "participant lookup failed, skipping push");
                return;
            }
        };

        let notification = PushNotification {
            title: "Emergency alert".to_string(),
            body: format!("An SOS was triggered on trip {}", alert.trip_id),
            data: HashMap::from([
                ("type".to_string(), "emergency".to_string()),
                ("trip_id".to_string(), alert.trip_id.clone()),
                (
                    "location".to_string(),
                    format!("{},{}", alert.location.latitude, alert.location.longitude),
                ),
            ]),
        };

        let sends = participants.iter().map(|user_id| {
            let notification = &notification;
            async move {
                if let Err(e) = self.push.send_push(user_id, notification).await {
                    warn!(user_id = %user_id, error = %e, "sos push failed");
                }
            }
        });
        join_all(sends).await;
    }

    async fn notify_services(&self, alert: &EmergencyAlert) {
        let callout = EmergencyCallout {
            trip_id: alert.trip_id.clone(),
            user_id: alert.triggered_by.clone(),
            location: alert.location,
            timestamp: alert.created_at,
        };
        if let Err(e) = self.services.notify(&callout).await {
            warn!(trip_id = %alert.trip_id, error = %e, "emergency services call failed");
        }
    }
}

fn sos_message(alert: &EmergencyAlert, profile: &UserProfile) -> String {
    let maps_link = format!(
        "https://maps.google.com/?q={},{}",
        alert.location.latitude, alert.location.longitude
    );
    match &alert.reason {
        Some(reason) => format!(
            "[Trip {}] {} triggered an emergency alert ({}). Last known location: {}",
            alert.trip_id, profile.display_name, reason, maps_link
        ),
        None => format!(
            "[Trip {}] {} triggered an emergency alert. Last known location: {}",
            alert.trip_id, profile.display_name, maps_link
        ),
    }
}
