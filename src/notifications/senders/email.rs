use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;

use super::{ensure_success, NotificationSender, SenderError};
use crate::notifications::models::ChannelConfig;

/// Sends alerts as transactional mail through a provider's HTTP API.
pub struct EmailSender {
    client: Client,
}

impl EmailSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[derive(Serialize, Debug, PartialEq)]
struct MailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: String,
    text: &'a str,
}

fn subject_line(context: &HashMap<String, String>) -> String {
    let target = context.get("target_name").map(String::as_str).unwrap_or("target");
    let status = context.get("status").map(String::as_str).unwrap_or("changed");
    format!("[{}] {target}", status.to_uppercase())
}

fn recipients(to: &str) -> Vec<&str> {
    to.split(',').map(str::trim).filter(|r| !r.is_empty()).collect()
}

#[async_trait]
impl NotificationSender for EmailSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        message: &str,
        context: &HashMap<String, String>,
    ) -> Result<(), SenderError> {
        let ChannelConfig::Email {
            api_url,
            api_key,
            from,
            to,
        } = config
        else {
            return Err(SenderError::InvalidConfiguration(
                "Expected Email config, but found a different type.".to_string(),
            ));
        };

        let to = recipients(to);
        if to.is_empty() {
            return Err(SenderError::InvalidConfiguration(
                "Email config has no recipients.".to_string(),
            ));
        }

        let payload = MailRequest {
            from,
            to,
            subject: subject_line(context),
            text: message,
        };

        let response = self
            .client
            .post(api_url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;
        ensure_success("Mail API", response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_names_status_and_target() {
        let context = HashMap::from([
            ("target_name".to_string(), "billing-api".to_string()),
            ("status".to_string(), "offline".to_string()),
        ]);
        assert_eq!(subject_line(&context), "[OFFLINE] billing-api");
    }

    #[test]
    fn recipient_list_is_comma_separated() {
        assert_eq!(recipients("a@x.io, b@x.io,,"), vec!["a@x.io", "b@x.io"]);
        assert!(recipients(" ").is_empty());
    }
}
