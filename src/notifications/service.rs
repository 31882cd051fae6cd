use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tera::{Context, Tera};
use thiserror::Error;
use tracing::{debug, instrument};

use super::models::{AlertContext, ChannelConfig};
use super::senders::{
    email::EmailSender, telegram::TelegramSender, webhook::WebhookSender, NotificationSender,
    SenderError,
};

pub const DEFAULT_ALERT_TEMPLATE: &str = "{{ target_name }} ({{ target_url }}) is now {{ status }} \
(was {{ previous_status }}) at {{ timestamp }}. Response time: {{ response_time_ms }}ms.\
{% if error %} Error: {{ error }}{% endif %} Owner: {{ owner_name }}";

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Invalid alert destination: {0}")]
    InvalidDestination(#[from] serde_json::Error),
    #[error("Templating error: {0}")]
    Template(String),
    #[error("Sender error: {0}")]
    SenderError(#[from] SenderError),
    #[error("Network error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Outbound side channel for transition alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        destination: &serde_json::Value,
        alert: &AlertContext,
    ) -> Result<(), NotificationError>;
}

pub struct NotificationService {
    template: String,
    telegram: TelegramSender,
    webhook: WebhookSender,
    email: EmailSender,
}

impl NotificationService {
    /// `template` is a tera template rendered against the alert fields.
    pub fn new(template: impl Into<String>, timeout: Duration) -> Result<Self, NotificationError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            template: template.into(),
            telegram: TelegramSender::new(client.clone()),
            webhook: WebhookSender::new(client.clone()),
            email: EmailSender::new(client),
        })
    }

    pub fn render(&self, alert: &AlertContext) -> Result<String, NotificationError> {
        let mut context = Context::new();
        for (key, value) in alert.to_context() {
            context.insert(key, &value);
        }
        Tera::one_off(&self.template, &context, false)
            .map_err(|e| NotificationError::Template(e.to_string()))
    }

    fn sender_for(&self, config: &ChannelConfig) -> &dyn NotificationSender {
        match config {
            ChannelConfig::Telegram { .. } => &self.telegram,
            ChannelConfig::Webhook { .. } => &self.webhook,
            ChannelConfig::Email { .. } => &self.email,
        }
    }
}

#[async_trait]
impl Notifier for NotificationService {
    #[instrument(skip_all, fields(target_name = %alert.target_name, status = %alert.status))]
    async fn notify(
        &self,
        destination: &serde_json::Value,
        alert: &AlertContext,
    ) -> Result<(), NotificationError> {
        let config: ChannelConfig = serde_json::from_value(destination.clone())?;
        let message = self.render(alert)?;
        self.sender_for(&config)
            .send(&config, &message, &alert.to_context())
            .await?;
        debug!(channel = config.channel_type(), "Alert delivered.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::enums::MonitorStatus;
    use chrono::{TimeZone, Utc};

    fn alert(error: Option<&str>) -> AlertContext {
        AlertContext {
            owner_name: "Alice".to_string(),
            target_name: "shop".to_string(),
            target_url: "https://shop.example".to_string(),
            previous_status: MonitorStatus::Online,
            status: MonitorStatus::Offline,
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            response_time_ms: 10_000,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn default_template_renders_every_field() {
        let service = NotificationService::new(DEFAULT_ALERT_TEMPLATE, Duration::from_secs(5)).unwrap();
        let text = service.render(&alert(Some("TIMEOUT: timed out"))).unwrap();
        assert_eq!(
            text,
            "shop (https://shop.example) is now offline (was online) at 2024-05-01T12:00:00Z. \
Response time: 10000ms. Error: TIMEOUT: timed out Owner: Alice"
        );

        let recovered = service.render(&alert(None)).unwrap();
        assert!(!recovered.contains("Error:"));
    }

    #[tokio::test]
    async fn malformed_destination_is_rejected_before_sending() {
        let service = NotificationService::new(DEFAULT_ALERT_TEMPLATE, Duration::from_secs(5)).unwrap();
        let err = service
            .notify(&serde_json::json!({"type": "carrier-pigeon"}), &alert(None))
            .await
            .unwrap_err();
        assert!(matches!(err, NotificationError::InvalidDestination(_)));
    }
}
