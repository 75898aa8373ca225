//! Dispatch - hands prepared messages to the upstream provider
//!
//! Two modes share one send path: synchronous mode delivers inline with
//! bounded retries, asynchronous mode enqueues one job per message for the
//! background worker. Both converge on the DeliveryStatusReconciler so
//! outcome accounting is identical either way.

use anyhow::Result;
use chrono::Utc;
use relaymail_common::config::{SendingConfig, WebhookConfig};
use relaymail_common::signing::{encode_unsubscribe_token, UnsubscribeClaims};
use relaymail_storage::models::Email;
use relaymail_storage::repository::JobRepository;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::reconcile::DeliveryStatusReconciler;

pub mod provider;
pub mod queue;

pub use provider::{EmailProvider, HttpProvider, OutboundMessage};
pub use queue::DispatchWorker;

/// Queue name for dispatch jobs
pub const DISPATCH_QUEUE: &str = "email_dispatch";

/// Delay before retry attempt `attempt + 1`: 1s doubling per attempt
pub fn calculate_backoff(attempt: i32) -> Duration {
    let exp = attempt.saturating_sub(1).clamp(0, 10) as u32;
    Duration::from_secs(1u64 << exp)
}

/// Insert an HTML fragment before `</body>`, or append when absent
fn inject_fragment(html: &str, fragment: &str) -> String {
    match html.rfind("</body>") {
        Some(pos) => format!("{}{}{}", &html[..pos], fragment, &html[pos..]),
        None => format!("{}{}", html, fragment),
    }
}

/// Message dispatcher
#[derive(Clone)]
pub struct Dispatcher {
    provider: Arc<dyn EmailProvider>,
    reconciler: Arc<DeliveryStatusReconciler>,
    jobs: JobRepository,
    sending: SendingConfig,
    from_address: String,
    public_url: String,
    unsubscribe_secret: String,
}

impl Dispatcher {
    /// Create a new dispatcher
    pub fn new(
        provider: Arc<dyn EmailProvider>,
        reconciler: Arc<DeliveryStatusReconciler>,
        jobs: JobRepository,
        sending: SendingConfig,
        webhooks: &WebhookConfig,
        from_address: String,
        public_url: String,
    ) -> Self {
        Self {
            provider,
            reconciler,
            jobs,
            sending,
            from_address,
            public_url,
            unsubscribe_secret: webhooks.unsubscribe_secret.clone(),
        }
    }

    /// Dispatch a set of freshly created messages.
    ///
    /// Synchronous mode sends inline in chunks; asynchronous mode enqueues
    /// one job per message and returns immediately.
    pub async fn dispatch(&self, emails: Vec<Email>) -> Result<()> {
        if self.sending.synchronous {
            self.dispatch_inline(emails).await;
            Ok(())
        } else {
            self.enqueue_all(&emails).await
        }
    }

    /// Send inline, `chunk_size` messages at a time.
    ///
    /// Each chunk's sends run concurrently; one message failing never aborts
    /// its siblings, and outcome recording happens per message.
    async fn dispatch_inline(&self, emails: Vec<Email>) {
        for chunk in emails.chunks(self.sending.chunk_size.max(1)) {
            let mut tasks = JoinSet::new();

            for email in chunk.iter().cloned() {
                let dispatcher = self.clone();
                tasks.spawn(async move {
                    dispatcher.send_and_record(email).await;
                });
            }

            while tasks.join_next().await.is_some() {}
        }
    }

    async fn enqueue_all(&self, emails: &[Email]) -> Result<()> {
        let now = Utc::now();
        for email in emails {
            self.jobs
                .enqueue(
                    DISPATCH_QUEUE,
                    &serde_json::json!({ "email_id": email.id }),
                    self.sending.max_attempts,
                    now,
                )
                .await?;
        }
        debug!(count = emails.len(), "Enqueued dispatch jobs");
        Ok(())
    }

    /// Send one message inline regardless of the configured mode.
    ///
    /// Used by the ad-hoc send path, which always resolves before responding.
    pub async fn dispatch_now(&self, email: Email) {
        self.send_and_record(email).await;
    }

    /// One provider submission with the body transforms applied
    pub async fn attempt_send(&self, email: &Email) -> Result<String> {
        let message = self.prepare_message(email);
        self.provider.send(&message).await
    }

    /// Send with inline retries, then record the terminal outcome
    async fn send_and_record(&self, email: Email) {
        let mut last_error = String::new();

        for attempt in 1..=self.sending.max_attempts.max(1) {
            match self.attempt_send(&email).await {
                Ok(provider_message_id) => {
                    if let Err(e) = self
                        .reconciler
                        .record_send_success(email.id, &provider_message_id)
                        .await
                    {
                        warn!(email_id = %email.id, "Failed to record send success: {}", e);
                    }
                    return;
                }
                Err(e) => {
                    last_error = e.to_string();
                    debug!(
                        email_id = %email.id,
                        attempt,
                        "Provider submission failed: {}",
                        last_error
                    );
                    if attempt < self.sending.max_attempts {
                        tokio::time::sleep(calculate_backoff(attempt)).await;
                    }
                }
            }
        }

        if let Err(e) = self
            .reconciler
            .record_send_failure(email.id, &last_error)
            .await
        {
            warn!(email_id = %email.id, "Failed to record send failure: {}", e);
        }
    }

    /// Build the outbound message: open-tracking beacon and unsubscribe
    /// footer are always injected, each exactly once.
    fn prepare_message(&self, email: &Email) -> OutboundMessage {
        let claims = UnsubscribeClaims::new(email.id, email.recipient.clone(), email.account_id);
        let token = encode_unsubscribe_token(&self.unsubscribe_secret, &claims);

        let footer = format!(
            r#"<p style="font-size:12px;color:#888"><a href="{}/unsubscribe/{}">Unsubscribe</a></p>"#,
            self.public_url, token
        );
        let beacon = format!(
            r#"<img src="{}/t/open/{}" width="1" height="1" alt="" style="display:none">"#,
            self.public_url, email.id
        );

        let html = inject_fragment(&inject_fragment(&email.body_html, &footer), &beacon);

        OutboundMessage {
            from: self.from_address.clone(),
            to: vec![email.recipient.clone()],
            subject: email.subject.clone(),
            html: Some(html),
            text: email.body_text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(calculate_backoff(1), Duration::from_secs(1));
        assert_eq!(calculate_backoff(2), Duration::from_secs(2));
        assert_eq!(calculate_backoff(3), Duration::from_secs(4));
        // Degenerate input clamps to the first step
        assert_eq!(calculate_backoff(0), Duration::from_secs(1));
    }

    #[test]
    fn test_inject_before_body_close() {
        let html = "<html><body><p>Hi</p></body></html>";
        let out = inject_fragment(html, "<i>x</i>");
        assert_eq!(out, "<html><body><p>Hi</p><i>x</i></body></html>");
    }

    #[test]
    fn test_inject_appends_without_body_tag() {
        let out = inject_fragment("<p>Hi</p>", "<i>x</i>");
        assert_eq!(out, "<p>Hi</p><i>x</i>");
    }

    #[test]
    fn test_injection_applied_exactly_once() {
        let html = "<html><body><p>Hello</p></body></html>";
        let beacon = r#"<img src="http://localhost/t/open/1">"#;
        let footer = r#"<a href="http://localhost/unsubscribe/t">Unsubscribe</a>"#;

        let out = inject_fragment(&inject_fragment(html, footer), beacon);

        assert_eq!(out.matches("t/open/").count(), 1);
        assert_eq!(out.matches("unsubscribe/").count(), 1);
        // Both fragments land inside the body element
        let body_close = out.rfind("</body>").unwrap();
        assert!(out.find("t/open/").unwrap() < body_close);
        assert!(out.find("unsubscribe/").unwrap() < body_close);
    }
}
