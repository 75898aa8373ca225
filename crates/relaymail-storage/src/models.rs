//! Database models

use chrono::{DateTime, Utc};
use relaymail_common::types::{
    AccountId, BatchId, BatchStatus, EmailId, EmailStatus, JobId, SubscriptionId, TemplateId,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Batch model - one bulk-send request and its rollup counters
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    pub account_id: AccountId,
    pub template_id: Option<TemplateId>,
    pub total: i32,
    pub valid: i32,
    pub suppressed: i32,
    pub duplicates: i32,
    pub queued: i32,
    pub completed: i32,
    pub failed: i32,
    pub clicked: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl Batch {
    /// Typed view of the status column
    pub fn status(&self) -> Option<BatchStatus> {
        self.status.parse().ok()
    }
}

/// Counters known at batch creation time
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: i32,
    pub valid: i32,
    pub suppressed: i32,
    pub duplicates: i32,
    pub queued: i32,
}

/// Email model - one outbound message
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Email {
    pub id: EmailId,
    pub account_id: AccountId,
    pub batch_id: Option<BatchId>,
    pub recipient: String,
    pub subject: String,
    pub body_html: String,
    pub body_text: Option<String>,
    pub status: String,
    pub provider_message_id: Option<String>,
    pub bounce_type: Option<String>,
    pub error: Option<String>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Email {
    /// Typed view of the status column
    pub fn status(&self) -> Option<EmailStatus> {
        self.status.parse().ok()
    }
}

/// Input for inserting an email row
#[derive(Debug, Clone)]
pub struct CreateEmail {
    pub account_id: AccountId,
    pub batch_id: Option<BatchId>,
    pub recipient: String,
    pub subject: String,
    pub body_html: String,
    pub body_text: Option<String>,
    pub status: EmailStatus,
}

/// Per-status counts for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmailStatusCounts {
    pub pending: i32,
    pub processing: i32,
    pub completed: i32,
    pub failed: i32,
    pub bounced: i32,
    pub complained: i32,
}

impl EmailStatusCounts {
    /// Messages that have not reached a terminal status
    pub fn in_flight(&self) -> i32 {
        self.pending + self.processing
    }

    /// Terminal non-success outcomes rolled into the batch `failed` counter
    pub fn unsuccessful(&self) -> i32 {
        self.failed + self.bounced + self.complained
    }
}

/// Suppression entry - an address barred from receiving mail
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Suppression {
    pub id: Uuid,
    pub email: String,
    pub reason: String,
    pub account_id: Option<AccountId>,
    pub email_id: Option<EmailId>,
    pub created_at: DateTime<Utc>,
}

/// Template model (read-only collaborator for the pipeline)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Template {
    pub id: TemplateId,
    pub account_id: AccountId,
    pub name: String,
    pub subject: String,
    pub body_html: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// API key model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub account_id: AccountId,
    pub name: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Whether the key has been revoked
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// Webhook subscription - a customer endpoint registered for lifecycle events
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: SubscriptionId,
    pub account_id: AccountId,
    pub url: String,
    pub event_types: serde_json::Value,
    pub secret: String,
    pub created_at: DateTime<Utc>,
}

impl WebhookSubscription {
    /// Get subscribed event types as a vector
    pub fn event_types_vec(&self) -> Vec<String> {
        serde_json::from_value(self.event_types.clone()).unwrap_or_default()
    }

    /// Whether this subscription matches an event type (exact or wildcard)
    pub fn matches(&self, event_type: &str) -> bool {
        self.event_types_vec()
            .iter()
            .any(|t| t == "*" || t == event_type)
    }
}

/// One webhook delivery attempt, append-only
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WebhookDeliveryLog {
    pub id: Uuid,
    pub subscription_id: SubscriptionId,
    pub event_type: String,
    pub payload: serde_json::Value,
    /// HTTP response status; 0 means transport failure
    pub response_status: i32,
    pub response_body: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Queue job model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub queue: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_matches() {
        let sub = WebhookSubscription {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            url: "https://example.com/hook".to_string(),
            event_types: serde_json::json!(["email.bounced", "batch.completed"]),
            secret: "s".to_string(),
            created_at: Utc::now(),
        };

        assert!(sub.matches("email.bounced"));
        assert!(sub.matches("batch.completed"));
        assert!(!sub.matches("email.opened"));
    }

    #[test]
    fn test_subscription_wildcard() {
        let sub = WebhookSubscription {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            url: "https://example.com/hook".to_string(),
            event_types: serde_json::json!(["*"]),
            secret: "s".to_string(),
            created_at: Utc::now(),
        };

        assert!(sub.matches("email.opened"));
        assert!(sub.matches("anything.else"));
    }

    #[test]
    fn test_status_counts() {
        let counts = EmailStatusCounts {
            pending: 2,
            processing: 1,
            completed: 4,
            failed: 1,
            bounced: 1,
            complained: 1,
        };
        assert_eq!(counts.in_flight(), 3);
        assert_eq!(counts.unsuccessful(), 3);
    }
}
