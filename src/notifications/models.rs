use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::db::entities::{monitored_target, probe_record};
use crate::db::enums::MonitorStatus;

/// Alert destination stored as JSON on a monitored target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChannelConfig {
    #[serde(rename_all = "camelCase")]
    Telegram { bot_token: String, chat_id: String },
    #[serde(rename_all = "camelCase")]
    Webhook {
        url: String,
        method: String, // "GET" or "POST"
        headers: Option<HashMap<String, String>>,
        body_template: Option<String>,
    },
    /// Transactional mail provider reached over HTTP.
    #[serde(rename_all = "camelCase")]
    Email {
        api_url: String,
        api_key: String,
        from: String,
        to: String,
    },
}

impl ChannelConfig {
    pub fn channel_type(&self) -> &'static str {
        match self {
            ChannelConfig::Telegram { .. } => "telegram",
            ChannelConfig::Webhook { .. } => "webhook",
            ChannelConfig::Email { .. } => "email",
        }
    }
}

/// The fixed field set every transition alert is rendered from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertContext {
    pub owner_name: String,
    pub target_name: String,
    pub target_url: String,
    pub previous_status: MonitorStatus,
    pub status: MonitorStatus,
    pub timestamp: DateTime<Utc>,
    pub response_time_ms: i64,
    pub error: Option<String>,
}

impl AlertContext {
    pub fn new(
        owner_name: &str,
        target: &monitored_target::Model,
        record: &probe_record::Model,
        previous_status: MonitorStatus,
    ) -> Self {
        Self {
            owner_name: owner_name.to_string(),
            target_name: target.name.clone(),
            target_url: target.url.clone(),
            previous_status,
            status: record.status,
            timestamp: record.checked_at,
            response_time_ms: record.response_time_ms,
            error: record.error_detail(),
        }
    }

    /// Flat string map handed to templates and senders.
    pub fn to_context(&self) -> HashMap<String, String> {
        HashMap::from([
            ("owner_name".to_string(), self.owner_name.clone()),
            ("target_name".to_string(), self.target_name.clone()),
            ("target_url".to_string(), self.target_url.clone()),
            ("previous_status".to_string(), self.previous_status.to_string()),
            ("status".to_string(), self.status.to_string()),
            (
                "timestamp".to_string(),
                self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            ),
            ("response_time_ms".to_string(), self.response_time_ms.to_string()),
            ("error".to_string(), self.error.clone().unwrap_or_default()),
        ])
    }
}
