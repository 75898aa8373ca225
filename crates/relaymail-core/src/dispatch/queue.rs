//! Background dispatch worker
//!
//! Polls the jobs table for due dispatch jobs and drives them through the
//! provider. Retries are scheduled back onto the table with exponential
//! backoff; the final failure is recorded through the reconciler so batch
//! counters resolve even when delivery never succeeds.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use relaymail_common::types::EmailId;
use relaymail_storage::models::Job;
use relaymail_storage::repository::{EmailRepository, JobRepository};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{calculate_backoff, Dispatcher, DISPATCH_QUEUE};
use crate::reconcile::DeliveryStatusReconciler;

/// Jobs claimed per poll
const FETCH_BATCH: i64 = 10;

/// Background dispatch worker
pub struct DispatchWorker {
    dispatcher: Dispatcher,
    reconciler: Arc<DeliveryStatusReconciler>,
    jobs: JobRepository,
    emails: EmailRepository,
    poll_interval: Duration,
}

impl DispatchWorker {
    /// Create a new worker
    pub fn new(
        dispatcher: Dispatcher,
        reconciler: Arc<DeliveryStatusReconciler>,
        jobs: JobRepository,
        emails: EmailRepository,
        poll_interval: Duration,
    ) -> Self {
        Self {
            dispatcher,
            reconciler,
            jobs,
            emails,
            poll_interval,
        }
    }

    /// Run the poll loop until the process exits
    pub async fn run(self) {
        info!(interval = ?self.poll_interval, "Dispatch worker started");
        let mut ticker = tokio::time::interval(self.poll_interval);

        loop {
            ticker.tick().await;
            if let Err(e) = self.tick().await {
                error!("Dispatch worker tick failed: {}", e);
            }
        }
    }

    /// Claim and process one poll's worth of due jobs
    pub async fn tick(&self) -> Result<usize> {
        let jobs = self.jobs.claim_pending(DISPATCH_QUEUE, FETCH_BATCH).await?;
        let count = jobs.len();

        for job in jobs {
            self.process_job(job).await;
        }

        Ok(count)
    }

    async fn process_job(&self, job: Job) {
        let email_id = match job.payload.get("email_id").and_then(parse_email_id) {
            Some(id) => id,
            None => {
                warn!(job_id = %job.id, "Malformed dispatch payload, dropping job");
                let _ = self.jobs.mark_failed(job.id, "malformed payload").await;
                return;
            }
        };

        let email = match self.emails.get(email_id).await {
            Ok(Some(email)) => email,
            Ok(None) => {
                warn!(job_id = %job.id, %email_id, "Dispatch job for missing email");
                let _ = self.jobs.mark_failed(job.id, "email not found").await;
                return;
            }
            Err(e) => {
                // Transient read failure: leave the job pending for the next poll
                warn!(job_id = %job.id, "Failed to load email for dispatch: {}", e);
                return;
            }
        };

        // Replayed or duplicate jobs: the message already resolved
        if email.status().map(|s| s.is_terminal()).unwrap_or(false) {
            debug!(job_id = %job.id, %email_id, status = %email.status, "Email already terminal, skipping");
            let _ = self.jobs.mark_completed(job.id).await;
            return;
        }

        match self.dispatcher.attempt_send(&email).await {
            Ok(provider_message_id) => {
                if let Err(e) = self
                    .reconciler
                    .record_send_success(email.id, &provider_message_id)
                    .await
                {
                    warn!(%email_id, "Failed to record send success: {}", e);
                }
                let _ = self.jobs.mark_completed(job.id).await;
                debug!(job_id = %job.id, %email_id, "Dispatch job completed");
            }
            Err(e) => self.handle_attempt_failure(&job, email_id, &e.to_string()).await,
        }
    }

    async fn handle_attempt_failure(&self, job: &Job, email_id: EmailId, error: &str) {
        let attempts = job.attempts + 1;

        if attempts >= job.max_attempts {
            info!(
                job_id = %job.id,
                %email_id,
                attempts,
                "Dispatch attempts exhausted: {}",
                error
            );
            let _ = self.jobs.mark_failed(job.id, error).await;
            if let Err(e) = self.reconciler.record_send_failure(email_id, error).await {
                warn!(%email_id, "Failed to record send failure: {}", e);
            }
            return;
        }

        let delay = calculate_backoff(attempts);
        let next = Utc::now()
            + ChronoDuration::from_std(delay).unwrap_or_else(|_| ChronoDuration::seconds(1));

        debug!(
            job_id = %job.id,
            %email_id,
            attempts,
            delay = ?delay,
            "Dispatch attempt failed, retry scheduled: {}",
            error
        );

        if let Err(e) = self
            .jobs
            .schedule_retry(job.id, attempts, error, next)
            .await
        {
            warn!(job_id = %job.id, "Failed to schedule retry: {}", e);
        }
    }
}

fn parse_email_id(value: &serde_json::Value) -> Option<EmailId> {
    value.as_str().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    #[test]
    fn test_parse_email_id_from_payload() {
        let id = Uuid::now_v7();
        let payload = serde_json::json!({ "email_id": id });

        assert_eq!(
            payload.get("email_id").and_then(parse_email_id),
            Some(id)
        );
        assert_eq!(
            serde_json::json!({ "email_id": 42 })
                .get("email_id")
                .and_then(parse_email_id),
            None
        );
    }

    #[test]
    fn test_retry_schedule_uses_backoff() {
        assert_eq!(calculate_backoff(1), Duration::from_secs(1));
        assert_eq!(calculate_backoff(2), Duration::from_secs(2));
    }
}
