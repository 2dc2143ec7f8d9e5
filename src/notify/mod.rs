//! Outbound notification providers.
//!
//! Every provider is a trait so the dispatcher can be tested against fakes
//! and deployments can run without real providers configured. The HTTP
//! implementations post JSON to webhook endpoints; unconfigured providers
//! fall back to log-only senders.

mod http;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::NotificationsConfig;
use crate::models::Coordinate;

pub use http::{WebhookEmergencyServicesClient, WebhookPushSender, WebhookSmsSender};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("provider rejected the message: {0}")]
    Rejected(String),
}

/// Provider acknowledgment for a delivered SMS.
#[derive(Debug, Clone, Serialize)]
pub struct SmsReceipt {
    pub message_id: String,
    pub accepted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
    /// Opaque key/value payload for client-side routing.
    pub data: HashMap<String, String>,
}

/// Details forwarded to the emergency services gateway.
#[derive(Debug, Clone, Serialize)]
pub struct EmergencyCallout {
    pub trip_id: String,
    pub user_id: String,
    pub location: Coordinate,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, phone: &str, message: &str) -> Result<SmsReceipt, NotifyError>;
}

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send_push(
        &self,
        user_id: &str,
        notification: &PushNotification,
    ) -> Result<(), NotifyError>;
}

#[async_trait]
pub trait EmergencyServicesClient: Send + Sync {
    async fn notify(&self, callout: &EmergencyCallout) -> Result<(), NotifyError>;
}

/// Log-only stand-in used when a provider section is absent from the
/// config. Always reports success so the surrounding flow behaves the same
/// in development as in production.
pub struct NoopSender;

#[async_trait]
impl SmsSender for NoopSender {
    async fn send_sms(&self, phone: &str, message: &str) -> Result<SmsReceipt, NotifyError> {
        info!(phone, message, "sms provider not configured, logging only");
        Ok(SmsReceipt {
            message_id: uuid::Uuid::new_v4().to_string(),
            accepted_at: Utc::now(),
        })
    }
}

#[async_trait]
impl PushSender for NoopSender {
    async fn send_push(
        &self,
        user_id: &str,
        notification: &PushNotification,
    ) -> Result<(), NotifyError> {
        info!(
            user_id,
            title = %notification.title,
            "push provider not configured, logging only"
        );
        Ok(())
    }
}

#[async_trait]
impl EmergencyServicesClient for NoopSender {
    async fn notify(&self, callout: &EmergencyCallout) -> Result<(), NotifyError> {
        info!(
            trip_id = %callout.trip_id,
            "emergency services gateway not configured, logging only"
        );
        Ok(())
    }
}

/// Build the provider set from config, substituting log-only senders for
/// anything missing.
pub fn build_providers(
    config: &NotificationsConfig,
) -> (
    Arc<dyn SmsSender>,
    Arc<dyn PushSender>,
    Arc<dyn EmergencyServicesClient>,
) {
    let sms: Arc<dyn SmsSender> = match &config.sms {
        Some(webhook) => Arc::new(WebhookSmsSender::new(webhook.clone())),
        None => {
            warn!("no sms provider configured, falling back to log-only sender");
            Arc::new(NoopSender)
        }
    };
    let push: Arc<dyn PushSender> = match &config.push {
        Some(webhook) => Arc::new(WebhookPushSender::new(webhook.clone())),
        None => {
            warn!("no push provider configured, falling back to log-only sender");
            Arc::new(NoopSender)
        }
    };
    let services: Arc<dyn EmergencyServicesClient> = match &config.emergency_services {
        Some(webhook) => Arc::new(WebhookEmergencyServicesClient::new(webhook.clone())),
        None => {
            warn!("no emergency services gateway configured, falling back to log-only sender");
            Arc::new(NoopSender)
        }
    };
    (sms, push, services)
}
