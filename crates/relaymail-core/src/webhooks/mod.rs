//! Webhook Notifier - signed event fan-out to customer endpoints
//!
//! Delivery is best-effort: one attempt per subscription per event, every
//! attempt logged. A subscriber outage is the subscriber's problem; the send
//! pipeline never blocks or retries on their behalf.

use chrono::Utc;
use relaymail_common::signing::webhook_signature_header;
use relaymail_common::types::{AccountId, WebhookEvent};
use relaymail_storage::models::WebhookSubscription;
use relaymail_storage::repository::{WebhookLogRepository, WebhookSubscriptionRepository};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Signature header attached to every outbound delivery
pub const SIGNATURE_HEADER: &str = "X-Relay-Signature";
/// Event-type header attached to every outbound delivery
pub const EVENT_HEADER: &str = "X-Relay-Event";

/// Response bodies are truncated to this length before logging
const MAX_LOGGED_BODY: usize = 1000;

/// Outcome of a single delivery attempt
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    /// HTTP status, or 0 when the request never got a response
    pub status: i32,
    pub body: Option<String>,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Webhook notifier
#[derive(Clone)]
pub struct WebhookNotifier {
    http: reqwest::Client,
    subscriptions: WebhookSubscriptionRepository,
    logs: WebhookLogRepository,
}

impl WebhookNotifier {
    /// Create a new notifier
    pub fn new(
        subscriptions: WebhookSubscriptionRepository,
        logs: WebhookLogRepository,
        timeout_secs: u64,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("reqwest client construction cannot fail with these options");

        Self {
            http,
            subscriptions,
            logs,
        }
    }

    /// Fan an event out to every matching subscription of the account.
    ///
    /// Deliveries run concurrently; each attempt is logged regardless of
    /// outcome. Subscription lookup failures are logged and swallowed so a
    /// notification blip never fails the state change that triggered it.
    pub async fn notify(
        &self,
        account_id: AccountId,
        event: WebhookEvent,
        data: serde_json::Value,
    ) {
        let subscriptions = match self.subscriptions.list_by_account(account_id).await {
            Ok(subs) => subs,
            Err(e) => {
                warn!(%account_id, event = %event, "Failed to load webhook subscriptions: {}", e);
                return;
            }
        };

        let matching: Vec<WebhookSubscription> = subscriptions
            .into_iter()
            .filter(|s| s.matches(event.as_str()))
            .collect();

        if matching.is_empty() {
            return;
        }

        let payload = serde_json::json!({
            "event": event.as_str(),
            "timestamp": Utc::now().to_rfc3339(),
            "data": data,
        });

        let mut tasks = JoinSet::new();
        for subscription in matching {
            let notifier = self.clone();
            let payload = payload.clone();
            let event_type = event.as_str();
            tasks.spawn(async move {
                notifier
                    .deliver_and_log(&subscription, event_type, &payload)
                    .await;
            });
        }

        while tasks.join_next().await.is_some() {}
    }

    /// Deliver one event to one subscription and append the attempt log
    pub async fn deliver_and_log(
        &self,
        subscription: &WebhookSubscription,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> DeliveryOutcome {
        let outcome = self.deliver_once(subscription, event_type, payload).await;

        if let Err(e) = self
            .logs
            .insert(
                subscription.id,
                event_type,
                payload,
                outcome.status,
                outcome.body.as_deref(),
            )
            .await
        {
            warn!(subscription_id = %subscription.id, "Failed to log webhook delivery: {}", e);
        }

        if outcome.is_success() {
            debug!(
                subscription_id = %subscription.id,
                event_type,
                status = outcome.status,
                "Webhook delivered"
            );
        } else {
            warn!(
                subscription_id = %subscription.id,
                event_type,
                status = outcome.status,
                "Webhook delivery failed"
            );
        }

        outcome
    }

    /// One signed POST, no retry
    async fn deliver_once(
        &self,
        subscription: &WebhookSubscription,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> DeliveryOutcome {
        let body = payload.to_string();
        let signature =
            webhook_signature_header(&subscription.secret, Utc::now().timestamp(), &body);

        let result = self
            .http
            .post(&subscription.url)
            .header("content-type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(EVENT_HEADER, event_type)
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status().as_u16() as i32;
                let body = response.text().await.ok().map(truncate_body);
                DeliveryOutcome { status, body }
            }
            // Timeout, DNS failure, refused connection: logged as status 0
            Err(e) => DeliveryOutcome {
                status: 0,
                body: Some(truncate_body(e.to_string())),
            },
        }
    }
}

fn truncate_body(body: String) -> String {
    if body.len() <= MAX_LOGGED_BODY {
        return body;
    }
    let mut end = MAX_LOGGED_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use relaymail_common::signing::verify_webhook_header;
    use uuid::Uuid;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn subscription(url: String) -> WebhookSubscription {
        WebhookSubscription {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            url,
            event_types: serde_json::json!(["*"]),
            secret: "whsec_test".to_string(),
            created_at: Utc::now(),
        }
    }

    fn notifier() -> WebhookNotifier {
        // The repositories are unused by deliver_once; a lazy pool never connects
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        WebhookNotifier::new(
            WebhookSubscriptionRepository::new(pool.clone()),
            WebhookLogRepository::new(pool),
            2,
        )
    }

    #[tokio::test]
    async fn test_delivery_is_signed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header_exists("x-relay-signature"))
            .and(header_exists("x-relay-event"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let sub = subscription(format!("{}/hook", server.uri()));
        let payload = serde_json::json!({"event": "email.completed", "data": {}});

        let outcome = notifier()
            .deliver_once(&sub, "email.completed", &payload)
            .await;

        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.body.as_deref(), Some("ok"));
    }

    #[test]
    fn test_signature_header_verifies() {
        let body = r#"{"event":"email.completed","data":{}}"#;
        let header = webhook_signature_header("whsec_test", 1700000000, body);
        assert!(verify_webhook_header("whsec_test", &header, body));
    }

    #[tokio::test]
    async fn test_transport_failure_is_status_zero() {
        // Nothing listens on this port
        let sub = subscription("http://127.0.0.1:9/hook".to_string());
        let payload = serde_json::json!({"event": "email.failed"});

        let outcome = notifier().deliver_once(&sub, "email.failed", &payload).await;

        assert_eq!(outcome.status, 0);
        assert!(outcome.body.is_some());
        assert!(!outcome.is_success());
    }

    #[test]
    fn test_truncate_body() {
        assert_eq!(truncate_body("short".to_string()), "short");
        let long = "x".repeat(2000);
        assert_eq!(truncate_body(long).len(), 1000);
    }
}
