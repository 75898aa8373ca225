//! Delivery Status Reconciler - single writer for message state transitions
//!
//! Every delivery signal, whether from the send path, the provider's
//! bounce/complaint feed, or the tracking endpoints, lands here. Both the
//! synchronous dispatch path and the queue worker converge on these methods
//! so batch counters stay consistent regardless of mode.

use anyhow::Result;
use chrono::Utc;
use relaymail_common::types::{
    AccountId, BatchId, BatchStatus, BounceType, EmailId, SuppressionReason, WebhookEvent,
};
use relaymail_storage::models::Email;
use relaymail_storage::repository::{BatchRepository, EmailRepository, SuppressionRepository};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::batch::BatchAccountant;
use crate::webhooks::WebhookNotifier;

/// Provider notification envelope (SNS-style wrapper)
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEnvelope {
    #[serde(rename = "Type")]
    pub message_type: String,
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
    #[serde(rename = "SubscribeURL", default)]
    pub subscribe_url: Option<String>,
}

/// Parsed body of a `Notification` envelope
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderNotification {
    pub notification_type: String,
    #[serde(default)]
    pub bounce: Option<BounceInfo>,
    #[serde(default)]
    pub complaint: Option<ComplaintInfo>,
    pub mail: MailInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BounceInfo {
    pub bounce_type: String,
    #[serde(default)]
    pub bounced_recipients: Vec<NotifiedRecipient>,
}

impl BounceInfo {
    /// Provider classification mapped to ours; anything not permanent is
    /// treated as transient
    pub fn classification(&self) -> BounceType {
        if self.bounce_type.eq_ignore_ascii_case("permanent") {
            BounceType::Permanent
        } else {
            BounceType::Transient
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintInfo {
    #[serde(default)]
    pub complained_recipients: Vec<NotifiedRecipient>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifiedRecipient {
    pub email_address: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailInfo {
    pub message_id: String,
}

/// Delivery status reconciler
pub struct DeliveryStatusReconciler {
    emails: EmailRepository,
    batches: BatchRepository,
    suppressions: SuppressionRepository,
    accountant: BatchAccountant,
    notifier: WebhookNotifier,
    http: reqwest::Client,
}

impl DeliveryStatusReconciler {
    /// Create a new reconciler
    pub fn new(
        emails: EmailRepository,
        batches: BatchRepository,
        suppressions: SuppressionRepository,
        notifier: WebhookNotifier,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client construction cannot fail with these options");

        Self {
            emails,
            accountant: BatchAccountant::new(batches.clone()),
            batches,
            suppressions,
            notifier,
            http,
        }
    }

    /// Record a successful provider submission
    pub async fn record_send_success(
        &self,
        email_id: EmailId,
        provider_message_id: &str,
    ) -> Result<()> {
        let transitioned = self
            .emails
            .mark_completed(email_id, provider_message_id)
            .await?;
        if !transitioned {
            debug!(%email_id, "Send success for an already-settled email, skipping");
            return Ok(());
        }

        let Some(email) = self.emails.get(email_id).await? else {
            anyhow::bail!("Email {} not found", email_id);
        };

        debug!(%email_id, provider_message_id, "Email completed");

        self.notifier
            .notify(
                email.account_id,
                WebhookEvent::EmailCompleted,
                email_event_data(&email),
            )
            .await;

        self.sync_batch(&email).await
    }

    /// Record a delivery failure after retries are exhausted
    pub async fn record_send_failure(&self, email_id: EmailId, error: &str) -> Result<()> {
        let transitioned = self.emails.mark_failed(email_id, error).await?;
        if !transitioned {
            debug!(%email_id, "Send failure for an already-settled email, skipping");
            return Ok(());
        }

        let Some(email) = self.emails.get(email_id).await? else {
            anyhow::bail!("Email {} not found", email_id);
        };

        info!(%email_id, error, "Email failed");

        self.notifier
            .notify(
                email.account_id,
                WebhookEvent::EmailFailed,
                email_event_data(&email),
            )
            .await;

        self.sync_batch(&email).await
    }

    /// Record a bounce reported by the provider.
    ///
    /// Permanent bounces add the recipient to the suppression list; the
    /// insert is idempotent so replayed notifications are harmless.
    pub async fn record_bounce(
        &self,
        provider_message_id: &str,
        bounce_type: BounceType,
    ) -> Result<()> {
        let Some(email) = self
            .emails
            .get_by_provider_message_id(provider_message_id)
            .await?
        else {
            warn!(provider_message_id, "Bounce for unknown message, ignoring");
            return Ok(());
        };

        let transitioned = self.emails.mark_bounced(email.id, bounce_type).await?;
        if !transitioned {
            debug!(email_id = %email.id, "Bounce already recorded, skipping replay");
            return Ok(());
        }

        if bounce_type == BounceType::Permanent {
            self.suppressions
                .insert(
                    &email.recipient,
                    SuppressionReason::Bounce,
                    Some(email.account_id),
                    Some(email.id),
                )
                .await?;
        }

        info!(email_id = %email.id, %bounce_type, "Email bounced");

        let email = self.emails.get(email.id).await?.unwrap_or(email);
        self.notifier
            .notify(
                email.account_id,
                WebhookEvent::EmailBounced,
                email_event_data(&email),
            )
            .await;

        self.sync_batch(&email).await
    }

    /// Record a spam complaint; the recipient is always suppressed
    pub async fn record_complaint(&self, provider_message_id: &str) -> Result<()> {
        let Some(email) = self
            .emails
            .get_by_provider_message_id(provider_message_id)
            .await?
        else {
            warn!(provider_message_id, "Complaint for unknown message, ignoring");
            return Ok(());
        };

        let transitioned = self.emails.mark_complained(email.id).await?;
        if !transitioned {
            debug!(email_id = %email.id, "Complaint already recorded, skipping replay");
            return Ok(());
        }

        self.suppressions
            .insert(
                &email.recipient,
                SuppressionReason::Complaint,
                Some(email.account_id),
                Some(email.id),
            )
            .await?;

        info!(email_id = %email.id, "Email complained");

        let email = self.emails.get(email.id).await?.unwrap_or(email);
        self.notifier
            .notify(
                email.account_id,
                WebhookEvent::EmailComplained,
                email_event_data(&email),
            )
            .await;

        self.sync_batch(&email).await
    }

    /// Record an open-pixel hit, first-write-wins.
    ///
    /// Never returns an error: the pixel endpoint must serve the image no
    /// matter what, so failures are logged and swallowed here.
    pub async fn record_open(&self, email_id: EmailId) {
        let first_open = match self.emails.set_opened(email_id, Utc::now()).await {
            Ok(first) => first,
            Err(e) => {
                warn!(%email_id, "Failed to record open: {}", e);
                return;
            }
        };

        if !first_open {
            return;
        }

        match self.emails.get(email_id).await {
            Ok(Some(email)) => {
                debug!(%email_id, "Email opened");
                self.notifier
                    .notify(
                        email.account_id,
                        WebhookEvent::EmailOpened,
                        email_event_data(&email),
                    )
                    .await;
            }
            Ok(None) => {}
            Err(e) => warn!(%email_id, "Failed to load opened email: {}", e),
        }
    }

    /// Record a tracked-link click.
    ///
    /// The message timestamp is first-click-only, but the batch clicked
    /// counter increments on every click.
    pub async fn record_click(&self, email_id: EmailId) -> Result<()> {
        let first_click = self.emails.set_clicked(email_id, Utc::now()).await?;

        let Some(email) = self.emails.get(email_id).await? else {
            warn!(%email_id, "Click for unknown message, ignoring");
            return Ok(());
        };

        if let Some(batch_id) = email.batch_id {
            self.accountant.record_click(batch_id).await?;
        }

        if first_click {
            debug!(%email_id, "Email clicked");
            self.notifier
                .notify(
                    email.account_id,
                    WebhookEvent::EmailClicked,
                    email_event_data(&email),
                )
                .await;
        }

        Ok(())
    }

    /// Record a batch-level click when only the batch is known
    pub async fn record_batch_click(&self, batch_id: BatchId) -> Result<()> {
        self.accountant.record_click(batch_id).await
    }

    /// Suppress a recipient who followed their unsubscribe link
    pub async fn record_unsubscribe(
        &self,
        recipient: &str,
        account_id: AccountId,
        email_id: EmailId,
    ) -> Result<()> {
        self.suppressions
            .insert(
                recipient,
                SuppressionReason::Unsubscribe,
                Some(account_id),
                Some(email_id),
            )
            .await?;

        info!(%email_id, "Recipient unsubscribed");
        Ok(())
    }

    /// Handle one inbound provider envelope
    pub async fn handle_envelope(&self, envelope: ProviderEnvelope) -> Result<()> {
        match envelope.message_type.as_str() {
            "SubscriptionConfirmation" => {
                let Some(url) = envelope.subscribe_url else {
                    anyhow::bail!("SubscriptionConfirmation without SubscribeURL");
                };
                self.http.get(&url).send().await?.error_for_status()?;
                info!("Confirmed provider notification subscription");
                Ok(())
            }
            "Notification" => {
                let Some(message) = envelope.message else {
                    anyhow::bail!("Notification without Message");
                };
                let notification: ProviderNotification = serde_json::from_str(&message)?;
                self.handle_notification(notification).await
            }
            other => {
                warn!(message_type = other, "Unrecognized envelope type, ignoring");
                Ok(())
            }
        }
    }

    async fn handle_notification(&self, notification: ProviderNotification) -> Result<()> {
        let message_id = notification.mail.message_id.as_str();

        match notification.notification_type.as_str() {
            "Bounce" => {
                let Some(bounce) = notification.bounce else {
                    anyhow::bail!("Bounce notification without bounce detail");
                };
                self.record_bounce(message_id, bounce.classification()).await
            }
            "Complaint" => self.record_complaint(message_id).await,
            other => {
                warn!(notification_type = other, "Unrecognized notification, ignoring");
                Ok(())
            }
        }
    }

    /// Recompute the owning batch and emit `batch.completed` on the
    /// processing -> terminal transition
    async fn sync_batch(&self, email: &Email) -> Result<()> {
        let Some(batch_id) = email.batch_id else {
            return Ok(());
        };

        let before = self
            .batches
            .get(batch_id)
            .await?
            .and_then(|b| b.status());
        let after = self.accountant.record_outcome(batch_id).await?;

        if before == Some(BatchStatus::Processing) && after != BatchStatus::Processing {
            if let Some(batch) = self.batches.get(batch_id).await? {
                self.notifier
                    .notify(
                        batch.account_id,
                        WebhookEvent::BatchCompleted,
                        serde_json::json!({
                            "batch_id": batch.id,
                            "status": batch.status,
                            "total": batch.total,
                            "queued": batch.queued,
                            "completed": batch.completed,
                            "failed": batch.failed,
                        }),
                    )
                    .await;
            }
        }

        Ok(())
    }
}

fn email_event_data(email: &Email) -> serde_json::Value {
    serde_json::json!({
        "email_id": email.id,
        "batch_id": email.batch_id,
        "recipient": email.recipient,
        "status": email.status,
        "provider_message_id": email.provider_message_id,
        "bounce_type": email.bounce_type,
        "error": email.error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_subscription_confirmation() {
        let body = r#"{
            "Type": "SubscriptionConfirmation",
            "SubscribeURL": "https://provider.example/confirm?token=abc"
        }"#;

        let envelope: ProviderEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.message_type, "SubscriptionConfirmation");
        assert_eq!(
            envelope.subscribe_url.as_deref(),
            Some("https://provider.example/confirm?token=abc")
        );
        assert!(envelope.message.is_none());
    }

    #[test]
    fn test_parse_bounce_notification() {
        let inner = r#"{
            "notificationType": "Bounce",
            "bounce": {
                "bounceType": "Permanent",
                "bouncedRecipients": [{"emailAddress": "gone@example.com"}]
            },
            "mail": {"messageId": "prov-42"}
        }"#;
        let body = serde_json::json!({
            "Type": "Notification",
            "Message": inner,
        })
        .to_string();

        let envelope: ProviderEnvelope = serde_json::from_str(&body).unwrap();
        assert_eq!(envelope.message_type, "Notification");

        let notification: ProviderNotification =
            serde_json::from_str(envelope.message.as_deref().unwrap()).unwrap();
        assert_eq!(notification.notification_type, "Bounce");
        assert_eq!(notification.mail.message_id, "prov-42");

        let bounce = notification.bounce.unwrap();
        assert_eq!(bounce.classification(), BounceType::Permanent);
        assert_eq!(bounce.bounced_recipients[0].email_address, "gone@example.com");
    }

    #[test]
    fn test_parse_complaint_notification() {
        let notification: ProviderNotification = serde_json::from_str(
            r#"{
                "notificationType": "Complaint",
                "complaint": {
                    "complainedRecipients": [{"emailAddress": "angry@example.com"}]
                },
                "mail": {"messageId": "prov-43"}
            }"#,
        )
        .unwrap();

        assert_eq!(notification.notification_type, "Complaint");
        assert!(notification.bounce.is_none());
        assert_eq!(
            notification.complaint.unwrap().complained_recipients[0].email_address,
            "angry@example.com"
        );
    }

    #[test]
    fn test_unknown_bounce_classification_is_transient() {
        let bounce = BounceInfo {
            bounce_type: "Undetermined".to_string(),
            bounced_recipients: vec![],
        };
        assert_eq!(bounce.classification(), BounceType::Transient);
    }
}
