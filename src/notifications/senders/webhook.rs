use async_trait::async_trait;
use reqwest::{header, Client, Method};
use std::collections::HashMap;
use tera::{Context, Tera};

use super::{ensure_success, NotificationSender, SenderError};
use crate::notifications::models::ChannelConfig;

/// Calls an operator supplied URL. POST bodies are rendered from the alert
/// fields, falling back to the plain alert text when no template is set.
pub struct WebhookSender {
    client: Client,
}

impl WebhookSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

pub(crate) fn render_body(
    template: &str,
    context: &HashMap<String, String>,
) -> Result<String, SenderError> {
    let mut tera_context = Context::new();
    for (key, value) in context {
        tera_context.insert(key, value);
    }
    Tera::one_off(template, &tera_context, false)
        .map_err(|e| SenderError::TemplatingError(e.to_string()))
}

#[async_trait]
impl NotificationSender for WebhookSender {
    async fn send(
        &self,
        config: &ChannelConfig,
        message: &str,
        context: &HashMap<String, String>,
    ) -> Result<(), SenderError> {
        let ChannelConfig::Webhook {
            url,
            method,
            headers,
            body_template,
        } = config
        else {
            return Err(SenderError::InvalidConfiguration(
                "Expected Webhook config, but found a different type.".to_string(),
            ));
        };

        let http_method = match method.to_uppercase().as_str() {
            "POST" => Method::POST,
            "GET" => Method::GET,
            _ => {
                return Err(SenderError::InvalidConfiguration(format!(
                    "Unsupported HTTP method: {method}"
                )));
            }
        };

        let mut request_builder = self.client.request(http_method.clone(), url);

        if let Some(h) = headers {
            let mut header_map = header::HeaderMap::new();
            for (key, value) in h {
                let header_name = header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                    SenderError::InvalidConfiguration(format!("Invalid header name: {e}"))
                })?;
                let header_value = header::HeaderValue::from_str(value).map_err(|e| {
                    SenderError::InvalidConfiguration(format!("Invalid header value: {e}"))
                })?;
                header_map.insert(header_name, header_value);
            }
            request_builder = request_builder.headers(header_map);
        }

        if http_method == Method::POST {
            let body = match body_template {
                Some(template) => render_body(template, context)?,
                None => serde_json::json!({ "text": message }).to_string(),
            };
            request_builder = request_builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let response = request_builder.send().await?;
        ensure_success("Webhook", response).await
    }
}
