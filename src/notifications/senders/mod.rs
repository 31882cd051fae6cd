use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use super::models::ChannelConfig;

pub mod email;
pub mod telegram;
pub mod webhook;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("Templating error: {0}")]
    TemplatingError(String),
}

/// Delivers one rendered alert through a single channel type.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// `message` is the already rendered alert text. `context` carries the raw
    /// alert fields for channels that render their own payload.
    async fn send(
        &self,
        config: &ChannelConfig,
        message: &str,
        context: &HashMap<String, String>,
    ) -> Result<(), SenderError>;
}

/// Turns a non-2xx reply into a `SendFailed` carrying the response body.
pub(crate) async fn ensure_success(
    channel: &str,
    response: reqwest::Response,
) -> Result<(), SenderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let error_body = response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_string());
    Err(SenderError::SendFailed(format!(
        "{channel} returned non-success status: {status}. Body: {error_body}"
    )))
}
