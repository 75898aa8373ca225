//! Email provider client
//!
//! The upstream provider is reached through a small trait so the dispatch
//! path and the queue worker share one seam, and tests can substitute a
//! mock transport.

use anyhow::Result;
use async_trait::async_trait;
use relaymail_common::config::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A fully prepared outbound message
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Upstream email provider
#[async_trait]
pub trait EmailProvider: Send + Sync {
    /// Submit one message; returns the provider's message id
    async fn send(&self, message: &OutboundMessage) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(rename = "messageId")]
    message_id: String,
}

/// HTTP JSON provider client
pub struct HttpProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpProvider {
    /// Create a new provider client from configuration
    pub fn new(config: &ProviderConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("reqwest client construction cannot fail with these options");

        Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl EmailProvider for HttpProvider {
    async fn send(&self, message: &OutboundMessage) -> Result<String> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(message)
            .send()
            .await?
            .error_for_status()?;

        let parsed: SendResponse = response.json().await?;
        Ok(parsed.message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(uri: &str) -> ProviderConfig {
        ProviderConfig {
            endpoint: format!("{}/v1/send", uri),
            api_key: "pk_test".to_string(),
            from_address: "no-reply@example.com".to_string(),
            timeout_secs: 5,
        }
    }

    fn message() -> OutboundMessage {
        OutboundMessage {
            from: "no-reply@example.com".to_string(),
            to: vec!["ann@example.com".to_string()],
            subject: "Hello".to_string(),
            html: Some("<p>Hi</p>".to_string()),
            text: None,
        }
    }

    #[tokio::test]
    async fn test_send_returns_provider_message_id() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/send"))
            .and(header("authorization", "Bearer pk_test"))
            .and(body_partial_json(serde_json::json!({
                "to": ["ann@example.com"],
                "subject": "Hello"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"messageId": "prov-123"})),
            )
            .mount(&server)
            .await;

        let provider = HttpProvider::new(&config(&server.uri()));
        let id = provider.send(&message()).await.unwrap();
        assert_eq!(id, "prov-123");
    }

    #[tokio::test]
    async fn test_send_surfaces_provider_rejection() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422))
            .mount(&server)
            .await;

        let provider = HttpProvider::new(&config(&server.uri()));
        assert!(provider.send(&message()).await.is_err());
    }
}
