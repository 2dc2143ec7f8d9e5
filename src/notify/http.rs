//! Webhook-backed provider implementations.
//!
//! Each provider posts a JSON body to its configured endpoint and treats a
//! non-2xx reply as a rejection. The gateway behind the webhook owns
//! carrier-level concerns (retries, routing, rate limits).

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::WebhookConfig;
use crate::notify::{
    EmergencyCallout, EmergencyServicesClient, NotifyError, PushNotification, PushSender,
    SmsReceipt, SmsSender,
};

#[derive(Debug, Serialize)]
struct SmsPayload<'a> {
    to: &'a str,
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct SmsResponse {
    message_id: String,
}

#[derive(Debug, Serialize)]
struct PushPayload<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    notification: &'a PushNotification,
}

pub struct WebhookSmsSender {
    client: Client,
    config: WebhookConfig,
}

impl WebhookSmsSender {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl SmsSender for WebhookSmsSender {
    async fn send_sms(&self, phone: &str, message: &str) -> Result<SmsReceipt, NotifyError> {
        debug!(endpoint = %self.config.endpoint, phone, "sending sms via webhook");
        let response = self
            .client
            .post(&self.config.endpoint)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&SmsPayload { to: phone, message })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(format!(
                "sms gateway returned {}",
                response.status()
            )));
        }
        let body: SmsResponse = response.json().await?;
        Ok(SmsReceipt {
            message_id: body.message_id,
            accepted_at: Utc::now(),
        })
    }
}

pub struct WebhookPushSender {
    client: Client,
    config: WebhookConfig,
}

impl WebhookPushSender {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl PushSender for WebhookPushSender {
    async fn send_push(
        &self,
        user_id: &str,
        notification: &PushNotification,
    ) -> Result<(), NotifyError> {
        debug!(endpoint = %self.config.endpoint, user_id, "sending push via webhook");
        let response = self
            .client
            .post(&self.config.endpoint)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(&PushPayload {
                user_id,
                notification,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(format!(
                "push gateway returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

pub struct WebhookEmergencyServicesClient {
    client: Client,
    config: WebhookConfig,
}

impl WebhookEmergencyServicesClient {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl EmergencyServicesClient for WebhookEmergencyServicesClient {
    async fn notify(&self, callout: &EmergencyCallout) -> Result<(), NotifyError> {
        debug!(
            endpoint = %self.config.endpoint,
            trip_id = %callout.trip_id,
            "notifying emergency services gateway"
        );
        let response = self
            .client
            .post(&self.config.endpoint)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(callout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(NotifyError::Rejected(format!(
                "emergency services gateway returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
