//! Common types for Relaymail

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for accounts
pub type AccountId = Uuid;

/// Unique identifier for batches
pub type BatchId = Uuid;

/// Unique identifier for emails (outbound messages)
pub type EmailId = Uuid;

/// Unique identifier for templates
pub type TemplateId = Uuid;

/// Unique identifier for webhook subscriptions
pub type SubscriptionId = Uuid;

/// Unique identifier for queue jobs
pub type JobId = Uuid;

/// Timestamp wrapper
pub type Timestamp = DateTime<Utc>;

/// Email address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Parse an email address from a string.
    ///
    /// Accepts the `local@domain.tld` shape: non-empty local part and a
    /// domain containing at least one dot.
    pub fn parse(s: &str) -> Option<Self> {
        let (local, domain) = s.rsplit_once('@')?;
        if local.is_empty() || domain.is_empty() || !domain.contains('.') {
            return None;
        }
        if local.chars().any(char::is_whitespace) || domain.chars().any(char::is_whitespace) {
            return None;
        }
        Some(Self {
            local: local.to_string(),
            domain: domain.to_string(),
        })
    }

    /// Lowercased canonical form used for dedup and suppression lookups
    pub fn normalized(&self) -> String {
        format!("{}@{}", self.local, self.domain).to_lowercase()
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Validation("Invalid email address".to_string()))
    }
}

/// Batch aggregate status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Processing,
    Completed,
    Partial,
    Failed,
}

impl BatchStatus {
    /// Derive the terminal status from resolved counters.
    ///
    /// Only meaningful once every message in the batch has left pending;
    /// callers guard on that before transitioning out of `Processing`.
    pub fn derive(queued: i32, completed: i32, failed: i32) -> Self {
        debug_assert!(completed + failed <= queued);
        if queued > 0 && completed == 0 {
            BatchStatus::Failed
        } else if completed < queued {
            BatchStatus::Partial
        } else {
            BatchStatus::Completed
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Partial => "partial",
            BatchStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(BatchStatus::Processing),
            "completed" => Ok(BatchStatus::Completed),
            "partial" => Ok(BatchStatus::Partial),
            "failed" => Ok(BatchStatus::Failed),
            other => Err(crate::Error::Internal(format!(
                "Unknown batch status: {}",
                other
            ))),
        }
    }
}

/// Per-message delivery status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Bounced,
    Complained,
}

impl EmailStatus {
    /// Whether the status is terminal (no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EmailStatus::Completed
                | EmailStatus::Failed
                | EmailStatus::Bounced
                | EmailStatus::Complained
        )
    }

    /// Transition check: {pending, processing} may advance to any terminal
    /// status, and a completed message may still bounce or draw a complaint
    /// once provider feedback arrives. The repository status guards mirror
    /// this table.
    pub fn can_transition_to(&self, next: EmailStatus) -> bool {
        match self {
            EmailStatus::Pending | EmailStatus::Processing => {
                next.is_terminal() || next == EmailStatus::Processing
            }
            EmailStatus::Completed => {
                matches!(next, EmailStatus::Bounced | EmailStatus::Complained)
            }
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EmailStatus::Pending => "pending",
            EmailStatus::Processing => "processing",
            EmailStatus::Completed => "completed",
            EmailStatus::Failed => "failed",
            EmailStatus::Bounced => "bounced",
            EmailStatus::Complained => "complained",
        }
    }
}

impl std::fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EmailStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EmailStatus::Pending),
            "processing" => Ok(EmailStatus::Processing),
            "completed" => Ok(EmailStatus::Completed),
            "failed" => Ok(EmailStatus::Failed),
            "bounced" => Ok(EmailStatus::Bounced),
            "complained" => Ok(EmailStatus::Complained),
            other => Err(crate::Error::Internal(format!(
                "Unknown email status: {}",
                other
            ))),
        }
    }
}

/// Provider bounce classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BounceType {
    Permanent,
    Transient,
}

impl BounceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BounceType::Permanent => "permanent",
            BounceType::Transient => "transient",
        }
    }
}

impl std::fmt::Display for BounceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an address landed on the suppression list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    Bounce,
    Complaint,
    Unsubscribe,
}

impl SuppressionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuppressionReason::Bounce => "bounce",
            SuppressionReason::Complaint => "complaint",
            SuppressionReason::Unsubscribe => "unsubscribe",
        }
    }
}

impl std::fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle events fanned out to customer webhooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEvent {
    EmailCompleted,
    EmailFailed,
    EmailBounced,
    EmailComplained,
    EmailOpened,
    EmailClicked,
    BatchCompleted,
}

impl WebhookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEvent::EmailCompleted => "email.completed",
            WebhookEvent::EmailFailed => "email.failed",
            WebhookEvent::EmailBounced => "email.bounced",
            WebhookEvent::EmailComplained => "email.complained",
            WebhookEvent::EmailOpened => "email.opened",
            WebhookEvent::EmailClicked => "email.clicked",
            WebhookEvent::BatchCompleted => "batch.completed",
        }
    }
}

impl std::fmt::Display for WebhookEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_email_address_parse() {
        let email = EmailAddress::parse("User@Example.com").unwrap();
        assert_eq!(email.local, "User");
        assert_eq!(email.domain, "Example.com");
        assert_eq!(email.normalized(), "user@example.com");
    }

    #[test]
    fn test_email_address_invalid() {
        assert!(EmailAddress::parse("invalid").is_none());
        assert!(EmailAddress::parse("@example.com").is_none());
        assert!(EmailAddress::parse("user@").is_none());
        assert!(EmailAddress::parse("user@nodot").is_none());
        assert!(EmailAddress::parse("us er@example.com").is_none());
    }

    #[test]
    fn test_batch_status_derive() {
        assert_eq!(BatchStatus::derive(10, 10, 0), BatchStatus::Completed);
        assert_eq!(BatchStatus::derive(10, 7, 3), BatchStatus::Partial);
        assert_eq!(BatchStatus::derive(10, 0, 10), BatchStatus::Failed);
        assert_eq!(BatchStatus::derive(0, 0, 0), BatchStatus::Completed);
    }

    #[test]
    fn test_email_status_transitions() {
        assert!(EmailStatus::Pending.can_transition_to(EmailStatus::Completed));
        assert!(EmailStatus::Pending.can_transition_to(EmailStatus::Processing));
        assert!(EmailStatus::Processing.can_transition_to(EmailStatus::Bounced));
        assert!(!EmailStatus::Completed.can_transition_to(EmailStatus::Failed));
        assert!(!EmailStatus::Bounced.can_transition_to(EmailStatus::Completed));
    }

    #[test]
    fn test_post_delivery_feedback_transitions() {
        // Bounces and complaints arrive keyed by the provider message id,
        // which only exists once the send has completed
        assert!(EmailStatus::Completed.can_transition_to(EmailStatus::Bounced));
        assert!(EmailStatus::Completed.can_transition_to(EmailStatus::Complained));
        assert!(!EmailStatus::Completed.can_transition_to(EmailStatus::Processing));
        assert!(!EmailStatus::Failed.can_transition_to(EmailStatus::Bounced));
        assert!(!EmailStatus::Complained.can_transition_to(EmailStatus::Bounced));
    }

    #[test]
    fn test_webhook_event_display() {
        assert_eq!(WebhookEvent::EmailBounced.to_string(), "email.bounced");
        assert_eq!(WebhookEvent::BatchCompleted.to_string(), "batch.completed");
    }
}
