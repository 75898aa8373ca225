//! Link Tracker - rewrites HTML body links into tracked short URLs
//!
//! Links are collected per batch and registered with the click-tracking
//! provider in one bulk call. If the provider is unreachable the body is
//! left unmodified; tracking is best-effort and never blocks a send.

use anyhow::Result;
use regex::Regex;
use relaymail_common::config::TrackingConfig;
use relaymail_common::types::{AccountId, BatchId, EmailId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, warn};

/// Metadata attached to each short link for click correlation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<BatchId>,
    pub account_id: AccountId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_id: Option<EmailId>,
}

/// One original/short URL pair returned by the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortLink {
    #[serde(rename = "originalUrl")]
    pub original_url: String,
    #[serde(rename = "shortUrl")]
    pub short_url: String,
}

#[derive(Debug, Serialize)]
struct CreateLinkRequest {
    url: String,
    metadata: LinkMetadata,
}

#[derive(Debug, Deserialize)]
struct CreateLinksResponse {
    links: Vec<ShortLink>,
}

/// HTTP client for the short-link provider
pub struct ShortLinkClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl ShortLinkClient {
    /// Create a new client from the tracking configuration
    pub fn new(config: &TrackingConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("reqwest client construction cannot fail with these options");

        Self {
            http,
            endpoint: config.shortlink_endpoint.clone(),
            api_key: config.shortlink_api_key.clone(),
        }
    }

    /// Register a set of URLs, one bulk call
    pub async fn create_short_links(
        &self,
        requests: Vec<(String, LinkMetadata)>,
    ) -> Result<Vec<ShortLink>> {
        let body: Vec<CreateLinkRequest> = requests
            .into_iter()
            .map(|(url, metadata)| CreateLinkRequest { url, metadata })
            .collect();

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: CreateLinksResponse = response.json().await?;
        Ok(parsed.links)
    }
}

fn href_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"href="(https?://[^"]+)""#).expect("href pattern is valid")
    })
}

/// Extract unique http(s) href targets from an HTML body, in order
pub fn extract_links(html: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    href_regex()
        .captures_iter(html)
        .map(|c| c[1].to_string())
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// Substitute original URLs with their short counterparts
pub fn rewrite_links(html: &str, mapping: &HashMap<String, String>) -> String {
    let mut result = html.to_string();
    for (original, short) in mapping {
        result = result.replace(
            &format!("href=\"{}\"", original),
            &format!("href=\"{}\"", short),
        );
    }
    result
}

/// Link tracker rewriting batch email bodies through the provider
pub struct LinkTracker {
    client: ShortLinkClient,
    enabled: bool,
}

impl LinkTracker {
    /// Create a new link tracker
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            client: ShortLinkClient::new(config),
            enabled: config.enabled && !config.shortlink_endpoint.is_empty(),
        }
    }

    /// Rewrite the links of one email body, grouped under the batch metadata.
    ///
    /// Returns the body unchanged when tracking is disabled, the body has no
    /// links, or the provider call fails.
    pub async fn track_body(&self, html: &str, metadata: LinkMetadata) -> String {
        if !self.enabled {
            return html.to_string();
        }

        let links = extract_links(html);
        if links.is_empty() {
            return html.to_string();
        }

        let requests: Vec<(String, LinkMetadata)> = links
            .iter()
            .map(|url| (url.clone(), metadata.clone()))
            .collect();

        match self.client.create_short_links(requests).await {
            Ok(short_links) => {
                let mapping: HashMap<String, String> = short_links
                    .into_iter()
                    .map(|l| (l.original_url, l.short_url))
                    .collect();
                debug!(links = mapping.len(), "Rewrote tracked links");
                rewrite_links(html, &mapping)
            }
            Err(e) => {
                warn!("Short-link provider unavailable, sending untracked body: {}", e);
                html.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extract_links() {
        let html = r#"<a href="https://a.example/x">one</a>
            <a href="http://b.example/y?q=1">two</a>
            <a href="https://a.example/x">repeat</a>
            <a href="mailto:x@example.com">skip</a>"#;

        assert_eq!(
            extract_links(html),
            vec![
                "https://a.example/x".to_string(),
                "http://b.example/y?q=1".to_string()
            ]
        );
    }

    #[test]
    fn test_rewrite_links() {
        let html = r#"<a href="https://a.example/x">one</a>"#;
        let mapping = HashMap::from([(
            "https://a.example/x".to_string(),
            "https://sho.rt/abc".to_string(),
        )]);

        assert_eq!(
            rewrite_links(html, &mapping),
            r#"<a href="https://sho.rt/abc">one</a>"#
        );
    }

    #[tokio::test]
    async fn test_track_body_via_provider() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/links"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "links": [
                    {"originalUrl": "https://a.example/x", "shortUrl": "https://sho.rt/abc"}
                ]
            })))
            .mount(&server)
            .await;

        let config = TrackingConfig {
            enabled: true,
            shortlink_endpoint: format!("{}/links", server.uri()),
            shortlink_api_key: "key".to_string(),
            click_webhook_secret: String::new(),
            timeout_secs: 5,
        };
        let tracker = LinkTracker::new(&config);

        let metadata = LinkMetadata {
            batch_id: Some(Uuid::new_v4()),
            account_id: Uuid::new_v4(),
            email_id: None,
        };

        let body = tracker
            .track_body(r#"<a href="https://a.example/x">go</a>"#, metadata)
            .await;

        assert_eq!(body, r#"<a href="https://sho.rt/abc">go</a>"#);
    }

    #[tokio::test]
    async fn test_track_body_provider_down_is_soft_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = TrackingConfig {
            enabled: true,
            shortlink_endpoint: format!("{}/links", server.uri()),
            shortlink_api_key: "key".to_string(),
            click_webhook_secret: String::new(),
            timeout_secs: 5,
        };
        let tracker = LinkTracker::new(&config);

        let html = r#"<a href="https://a.example/x">go</a>"#;
        let body = tracker
            .track_body(
                html,
                LinkMetadata {
                    batch_id: None,
                    account_id: Uuid::new_v4(),
                    email_id: None,
                },
            )
            .await;

        assert_eq!(body, html);
    }
}
