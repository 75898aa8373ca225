//! Webhook subscription management handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use relaymail_common::types::SubscriptionId;
use relaymail_storage::models::{WebhookDeliveryLog, WebhookSubscription};
use relaymail_storage::repository::{WebhookLogRepository, WebhookSubscriptionRepository};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::{error_response, internal_error, ApiError};
use crate::auth::{AppState, AuthContext};

/// Delivery-log rows returned per request
const LOG_PAGE_SIZE: i64 = 50;

/// Request body for registering a subscription
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWebhookRequest {
    pub url: String,
    pub event_types: Vec<String>,
    /// Signing secret; generated when absent
    pub secret: Option<String>,
}

/// Subscription view without the signing secret
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    pub id: SubscriptionId,
    pub url: String,
    pub event_types: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<WebhookSubscription> for SubscriptionResponse {
    fn from(sub: WebhookSubscription) -> Self {
        let event_types = sub.event_types_vec();
        Self {
            id: sub.id,
            url: sub.url,
            event_types,
            created_at: sub.created_at,
        }
    }
}

/// Creation response; the only place the secret is returned
#[derive(Debug, Clone, Serialize)]
pub struct CreatedSubscriptionResponse {
    #[serde(flatten)]
    pub subscription: SubscriptionResponse,
    pub secret: String,
}

/// Event types a subscription may register for
const KNOWN_EVENT_TYPES: &[&str] = &[
    "email.completed",
    "email.failed",
    "email.bounced",
    "email.complained",
    "email.opened",
    "email.clicked",
    "batch.completed",
];

fn validate_event_types(event_types: &[String]) -> Result<(), String> {
    if event_types.is_empty() {
        return Err("event_types must not be empty".to_string());
    }
    for t in event_types {
        if t != "*" && !KNOWN_EVENT_TYPES.contains(&t.as_str()) {
            return Err(format!("unknown event type '{}'", t));
        }
    }
    Ok(())
}

/// Validate a webhook URL to prevent SSRF.
///
/// Rejects non-HTTP(S) schemes, loopback/private/link-local targets, and
/// well-known internal hostnames including the cloud metadata endpoint.
fn validate_webhook_url(url_str: &str) -> Result<(), String> {
    let url = Url::parse(url_str).map_err(|e| format!("invalid URL: {}", e))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(format!(
                "scheme '{}' is not allowed; only http and https are permitted",
                scheme
            ));
        }
    }

    let host = url.host_str().ok_or_else(|| "URL has no host".to_string())?;

    let lower_host = host.to_lowercase();
    if lower_host == "localhost"
        || lower_host.ends_with(".local")
        || lower_host.ends_with(".internal")
        || lower_host == "metadata.google.internal"
        || lower_host == "169.254.169.254"
    {
        return Err(format!("host '{}' is not allowed (internal address)", host));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(&ip) {
            return Err(format!("IP '{}' is not allowed (private range)", ip));
        }
    }

    Ok(())
}

/// Check if an IP address is in a private/reserved range
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_loopback()
                || ipv4.is_private()
                || ipv4.is_link_local()
                || ipv4.is_broadcast()
                || ipv4.is_unspecified()
                // 100.64.0.0/10 (CGNAT)
                || (ipv4.octets()[0] == 100 && (ipv4.octets()[1] & 0xC0) == 64)
        }
        IpAddr::V6(ipv6) => {
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                // fc00::/7 (ULA)
                || (ipv6.segments()[0] & 0xfe00) == 0xfc00
                // fe80::/10 (link-local)
                || (ipv6.segments()[0] & 0xffc0) == 0xfe80
        }
    }
}

fn generate_secret() -> String {
    format!(
        "whsec_{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

/// List subscriptions for the account
pub async fn list_webhooks(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<Vec<SubscriptionResponse>>, ApiError> {
    let repo = WebhookSubscriptionRepository::new(state.db_pool.pool().clone());

    let subscriptions = repo
        .list_by_account(auth.account_id)
        .await
        .map_err(|e| internal_error("Database error while listing webhooks", e))?;

    Ok(Json(subscriptions.into_iter().map(Into::into).collect()))
}

/// Register a new subscription
pub async fn create_webhook(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<CreateWebhookRequest>,
) -> Result<(StatusCode, Json<CreatedSubscriptionResponse>), ApiError> {
    if let Err(message) = validate_webhook_url(&input.url) {
        warn!(account_id = %auth.account_id, "Rejected webhook URL: {}", message);
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "invalid_url",
            message,
        ));
    }
    if let Err(message) = validate_event_types(&input.event_types) {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "invalid_event_types",
            message,
        ));
    }

    let repo = WebhookSubscriptionRepository::new(state.db_pool.pool().clone());

    let count = repo
        .count_by_account(auth.account_id)
        .await
        .map_err(|e| internal_error("Database error while counting webhooks", e))?;
    if count >= state.config.webhooks.max_subscriptions {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "subscription_limit",
            format!(
                "Account already has the maximum of {} webhook subscriptions",
                state.config.webhooks.max_subscriptions
            ),
        ));
    }

    let secret = input.secret.unwrap_or_else(generate_secret);

    let subscription = repo
        .create(auth.account_id, &input.url, &input.event_types, &secret)
        .await
        .map_err(|e| internal_error("Database error while creating webhook", e))?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedSubscriptionResponse {
            subscription: subscription.into(),
            secret,
        }),
    ))
}

/// Get one subscription
pub async fn get_webhook(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(subscription_id): Path<SubscriptionId>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let repo = WebhookSubscriptionRepository::new(state.db_pool.pool().clone());

    let subscription = repo
        .get(auth.account_id, subscription_id)
        .await
        .map_err(|e| internal_error("Database error while fetching webhook", e))?
        .ok_or_else(|| {
            error_response(StatusCode::NOT_FOUND, "not_found", "Subscription not found")
        })?;

    Ok(Json(subscription.into()))
}

/// Delete a subscription
pub async fn delete_webhook(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(subscription_id): Path<SubscriptionId>,
) -> Result<StatusCode, ApiError> {
    let repo = WebhookSubscriptionRepository::new(state.db_pool.pool().clone());

    let deleted = repo
        .delete(auth.account_id, subscription_id)
        .await
        .map_err(|e| internal_error("Database error while deleting webhook", e))?;

    if !deleted {
        return Err(error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            "Subscription not found",
        ));
    }

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct TestDeliveryResponse {
    pub delivered: bool,
    pub response_status: i32,
}

/// Send a synthetic event through the normal delivery path
pub async fn test_webhook(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(subscription_id): Path<SubscriptionId>,
) -> Result<Json<TestDeliveryResponse>, ApiError> {
    let repo = WebhookSubscriptionRepository::new(state.db_pool.pool().clone());

    let subscription = repo
        .get(auth.account_id, subscription_id)
        .await
        .map_err(|e| internal_error("Database error while fetching webhook", e))?
        .ok_or_else(|| {
            error_response(StatusCode::NOT_FOUND, "not_found", "Subscription not found")
        })?;

    let payload = serde_json::json!({
        "event": "webhook.test",
        "timestamp": Utc::now().to_rfc3339(),
        "data": { "subscription_id": subscription.id },
    });

    let outcome = state
        .notifier
        .deliver_and_log(&subscription, "webhook.test", &payload)
        .await;

    Ok(Json(TestDeliveryResponse {
        delivered: outcome.is_success(),
        response_status: outcome.status,
    }))
}

/// List recent delivery attempts for a subscription
pub async fn webhook_logs(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(subscription_id): Path<SubscriptionId>,
) -> Result<Json<Vec<WebhookDeliveryLog>>, ApiError> {
    let subscriptions = WebhookSubscriptionRepository::new(state.db_pool.pool().clone());

    // Ownership check before reading logs
    subscriptions
        .get(auth.account_id, subscription_id)
        .await
        .map_err(|e| internal_error("Database error while fetching webhook", e))?
        .ok_or_else(|| {
            error_response(StatusCode::NOT_FOUND, "not_found", "Subscription not found")
        })?;

    let logs = WebhookLogRepository::new(state.db_pool.pool().clone())
        .list_by_subscription(subscription_id, LOG_PAGE_SIZE)
        .await
        .map_err(|e| internal_error("Database error while listing delivery logs", e))?;

    Ok(Json(logs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymail_common::types::WebhookEvent;

    #[test]
    fn test_url_validation_accepts_public_hosts() {
        assert!(validate_webhook_url("https://hooks.example.com/inbox").is_ok());
        assert!(validate_webhook_url("http://203.0.113.10:8080/hook").is_ok());
    }

    #[test]
    fn test_url_validation_rejects_internal_targets() {
        assert!(validate_webhook_url("https://localhost/hook").is_err());
        assert!(validate_webhook_url("http://127.0.0.1/hook").is_err());
        assert!(validate_webhook_url("http://10.1.2.3/hook").is_err());
        assert!(validate_webhook_url("http://172.16.0.1/hook").is_err());
        assert!(validate_webhook_url("http://192.168.1.1/hook").is_err());
        assert!(validate_webhook_url("http://169.254.169.254/latest/meta-data").is_err());
        assert!(validate_webhook_url("http://metadata.google.internal/").is_err());
        assert!(validate_webhook_url("http://[::1]/hook").is_err());
        assert!(validate_webhook_url("http://service.internal/hook").is_err());
    }

    #[test]
    fn test_url_validation_rejects_other_schemes() {
        assert!(validate_webhook_url("ftp://example.com/hook").is_err());
        assert!(validate_webhook_url("file:///etc/passwd").is_err());
        assert!(validate_webhook_url("not a url").is_err());
    }

    #[test]
    fn test_event_type_validation() {
        assert!(validate_event_types(&["email.bounced".to_string()]).is_ok());
        assert!(validate_event_types(&["*".to_string()]).is_ok());
        assert!(validate_event_types(&[]).is_err());
        assert!(validate_event_types(&["email.exploded".to_string()]).is_err());
    }

    #[test]
    fn test_known_event_types_cover_emitted_events() {
        for event in [
            WebhookEvent::EmailCompleted,
            WebhookEvent::EmailFailed,
            WebhookEvent::EmailBounced,
            WebhookEvent::EmailComplained,
            WebhookEvent::EmailOpened,
            WebhookEvent::EmailClicked,
            WebhookEvent::BatchCompleted,
        ] {
            assert!(KNOWN_EVENT_TYPES.contains(&event.as_str()));
        }
    }
}
