//! Batch send pipeline
//!
//! Orchestrates a submission end to end: validation and dedup, suppression
//! filtering and quota check (run concurrently), batch creation, link
//! tracking, email row creation, and the dispatch handoff.

use relaymail_common::types::{AccountId, EmailAddress, EmailStatus, TemplateId};
use relaymail_storage::models::{BatchStats, CreateEmail, Email};
use relaymail_storage::repository::{EmailRepository, SuppressionRepository, TemplateRepository};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

pub mod rate_limiter;
pub mod recipients;
pub mod suppression;

pub use rate_limiter::{QuotaDecision, RateLimiter};
pub use recipients::{
    PreparedEmail, ProcessedRecipients, RecipientError, RecipientInput, TemplateContent,
};
pub use suppression::{FilteredRecipients, SuppressionFilter};

use crate::batch::BatchAccountant;
use crate::dispatch::Dispatcher;
use crate::tracking::{LinkMetadata, LinkTracker};

/// Submission-level failures mapped to API responses by the caller
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad request content: empty list, oversize list, missing content,
    /// or every recipient filtered out
    #[error("{0}")]
    Validation(String),

    /// Daily quota rejection
    #[error("{0}")]
    RateLimited(String),

    /// Referenced template does not exist for this account
    #[error("template not found")]
    TemplateNotFound,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// One batch submission as accepted by the API layer
#[derive(Debug, Clone)]
pub struct BatchSubmission {
    pub account_id: AccountId,

    /// Template mode: render this template per recipient
    pub template_id: Option<TemplateId>,

    /// Raw mode: subject/body supplied inline
    pub subject: Option<String>,
    pub body_html: Option<String>,

    pub recipients: Vec<RecipientInput>,
}

/// Accepted-submission summary returned to the caller
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    pub batch_id: relaymail_common::types::BatchId,
    pub status: String,
    pub total: i32,
    pub valid: i32,
    pub suppressed: i32,
    pub duplicates: i32,
    pub queued: i32,
    pub errors: Vec<RecipientError>,
}

/// Batch send pipeline
pub struct BatchPipeline {
    emails: EmailRepository,
    templates: TemplateRepository,
    suppression_filter: SuppressionFilter,
    rate_limiter: RateLimiter,
    accountant: BatchAccountant,
    link_tracker: LinkTracker,
    dispatcher: Dispatcher,
    max_batch_size: usize,
    synchronous: bool,
}

impl BatchPipeline {
    /// Create a new pipeline
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        emails: EmailRepository,
        templates: TemplateRepository,
        suppressions: SuppressionRepository,
        accountant: BatchAccountant,
        link_tracker: LinkTracker,
        dispatcher: Dispatcher,
        daily_limit: i64,
        max_batch_size: usize,
        synchronous: bool,
    ) -> Self {
        Self {
            rate_limiter: RateLimiter::new(emails.clone(), daily_limit),
            suppression_filter: SuppressionFilter::new(suppressions),
            emails,
            templates,
            accountant,
            link_tracker,
            dispatcher,
            max_batch_size,
            synchronous,
        }
    }

    /// Run one submission through the pipeline.
    ///
    /// Returns an accepted summary even when some recipients were filtered;
    /// the per-recipient errors ride along in the outcome.
    #[instrument(skip(self, submission), fields(account_id = %submission.account_id))]
    pub async fn submit(
        &self,
        submission: BatchSubmission,
    ) -> Result<SubmissionOutcome, PipelineError> {
        if submission.recipients.is_empty() {
            return Err(PipelineError::Validation(
                "recipients must not be empty".to_string(),
            ));
        }
        if submission.recipients.len() > self.max_batch_size {
            return Err(PipelineError::Validation(format!(
                "recipient count {} exceeds the maximum of {}",
                submission.recipients.len(),
                self.max_batch_size
            )));
        }

        let template = self.resolve_content(&submission).await?;
        let processed = recipients::process(&submission.recipients, &template);

        if processed.prepared.is_empty() {
            return Err(PipelineError::Validation(
                "no valid recipients in batch".to_string(),
            ));
        }

        // Suppression lookup and quota check are independent reads
        let requested = processed.prepared.len() as i64;
        let (filtered, decision) = tokio::join!(
            self.suppression_filter.filter(processed.prepared.clone()),
            self.rate_limiter.check(submission.account_id, requested),
        );
        let filtered = filtered?;
        let decision = decision?;

        if let Some(message) = decision.rejection_message() {
            return Err(PipelineError::RateLimited(message));
        }
        if filtered.kept.is_empty() {
            return Err(PipelineError::Validation(
                "all recipients are suppressed".to_string(),
            ));
        }

        let stats = BatchStats {
            total: submission.recipients.len() as i32,
            valid: processed.prepared.len() as i32,
            suppressed: filtered.suppressed as i32,
            duplicates: processed.duplicates as i32,
            queued: filtered.kept.len() as i32,
        };

        let batch = self
            .accountant
            .create_batch(submission.account_id, submission.template_id, stats)
            .await?;

        let initial_status = if self.synchronous {
            EmailStatus::Processing
        } else {
            EmailStatus::Pending
        };

        let mut created: Vec<Email> = Vec::with_capacity(filtered.kept.len());
        for prepared in filtered.kept {
            let body_html = self
                .link_tracker
                .track_body(
                    &prepared.body_html,
                    LinkMetadata {
                        batch_id: Some(batch.id),
                        account_id: submission.account_id,
                        email_id: None,
                    },
                )
                .await;

            let email = self
                .emails
                .create(CreateEmail {
                    account_id: submission.account_id,
                    batch_id: Some(batch.id),
                    recipient: prepared.to,
                    subject: prepared.subject,
                    body_html,
                    body_text: None,
                    status: initial_status,
                })
                .await
                .map_err(anyhow::Error::from)?;
            created.push(email);
        }

        info!(
            batch_id = %batch.id,
            queued = created.len(),
            synchronous = self.synchronous,
            "Batch accepted, dispatching"
        );

        self.dispatcher.dispatch(created).await?;

        Ok(SubmissionOutcome {
            batch_id: batch.id,
            status: batch.status,
            total: stats.total,
            valid: stats.valid,
            suppressed: stats.suppressed,
            duplicates: stats.duplicates,
            queued: stats.queued,
            errors: processed.errors,
        })
    }

    /// Send one ad-hoc message outside any batch, inline.
    ///
    /// Suppression and quota apply exactly as in the batch path with a
    /// requested count of one.
    pub async fn send_single(
        &self,
        account_id: AccountId,
        to: &str,
        subject: &str,
        body_html: &str,
    ) -> Result<Email, PipelineError> {
        let Some(address) = EmailAddress::parse(to.trim()) else {
            return Err(PipelineError::Validation(
                "invalid email address".to_string(),
            ));
        };

        let (suppressed, decision) = tokio::join!(
            self.suppression_filter.filter(vec![PreparedEmail {
                to: address.to_string(),
                subject: subject.to_string(),
                body_html: body_html.to_string(),
            }]),
            self.rate_limiter.check(account_id, 1),
        );
        let suppressed = suppressed?;
        let decision = decision?;

        if let Some(message) = decision.rejection_message() {
            return Err(PipelineError::RateLimited(message));
        }
        let Some(prepared) = suppressed.kept.into_iter().next() else {
            return Err(PipelineError::Validation(
                "recipient is suppressed".to_string(),
            ));
        };

        let body_html = self
            .link_tracker
            .track_body(
                &prepared.body_html,
                LinkMetadata {
                    batch_id: None,
                    account_id,
                    email_id: None,
                },
            )
            .await;

        let email = self
            .emails
            .create(CreateEmail {
                account_id,
                batch_id: None,
                recipient: prepared.to,
                subject: prepared.subject,
                body_html,
                body_text: None,
                status: EmailStatus::Processing,
            })
            .await
            .map_err(anyhow::Error::from)?;

        info!(email_id = %email.id, "Single send accepted");

        self.dispatcher.dispatch_now(email.clone()).await;

        // Reload to reflect the recorded outcome
        let refreshed = self
            .emails
            .get(email.id)
            .await
            .map_err(anyhow::Error::from)?
            .unwrap_or(email);

        Ok(refreshed)
    }

    async fn resolve_content(
        &self,
        submission: &BatchSubmission,
    ) -> Result<TemplateContent, PipelineError> {
        if let Some(template_id) = submission.template_id {
            let template = self
                .templates
                .get(submission.account_id, template_id)
                .await
                .map_err(anyhow::Error::from)?
                .ok_or(PipelineError::TemplateNotFound)?;

            return Ok(TemplateContent {
                subject: template.subject,
                body_html: template.body_html,
            });
        }

        match (&submission.subject, &submission.body_html) {
            (Some(subject), Some(body_html)) if !subject.is_empty() && !body_html.is_empty() => {
                Ok(TemplateContent {
                    subject: subject.clone(),
                    body_html: body_html.clone(),
                })
            }
            _ => Err(PipelineError::Validation(
                "subject and html are required when template_id is absent".to_string(),
            )),
        }
    }
}
