//! Batch Accountant - owns the Batch aggregate lifecycle
//!
//! All writers use commutative increments or recompute-from-source updates;
//! nothing overwrites a counter from a stale read, so redundant or
//! out-of-order invocations are safe.

use anyhow::Result;
use relaymail_common::types::{AccountId, BatchId, BatchStatus, TemplateId};
use relaymail_storage::models::{Batch, BatchStats};
use relaymail_storage::repository::BatchRepository;
use tracing::{debug, info};

/// Batch accountant
pub struct BatchAccountant {
    batches: BatchRepository,
}

impl BatchAccountant {
    /// Create a new batch accountant
    pub fn new(batches: BatchRepository) -> Self {
        Self { batches }
    }

    /// Create the batch aggregate with its creation-time counters.
    ///
    /// completed/failed start at zero; status starts at `processing`.
    pub async fn create_batch(
        &self,
        account_id: AccountId,
        template_id: Option<TemplateId>,
        stats: BatchStats,
    ) -> Result<Batch> {
        let batch = self.batches.create(account_id, template_id, stats).await?;

        info!(
            batch_id = %batch.id,
            %account_id,
            total = stats.total,
            queued = stats.queued,
            suppressed = stats.suppressed,
            duplicates = stats.duplicates,
            "Batch created"
        );

        Ok(batch)
    }

    /// Recompute completed/failed from the email rows and, once no message
    /// remains in flight, transition the batch status.
    ///
    /// Returns the batch status after this call. Safe to call redundantly:
    /// while messages are still pending the status stays `processing`, and
    /// repeated calls with unchanged rows recompute the same counters.
    pub async fn record_outcome(&self, batch_id: BatchId) -> Result<BatchStatus> {
        let Some(batch) = self.batches.get(batch_id).await? else {
            anyhow::bail!("Batch {} not found", batch_id);
        };

        let counts = self.batches.email_status_counts(batch_id).await?;
        let completed = counts.completed;
        let failed = counts.unsuccessful();

        if counts.in_flight() > 0 {
            // Still resolving: persist the partial counters but hold status
            self.batches
                .update_outcome(batch_id, completed, failed, BatchStatus::Processing)
                .await?;
            debug!(
                %batch_id,
                in_flight = counts.in_flight(),
                completed,
                failed,
                "Batch outcome recomputed, messages still in flight"
            );
            return Ok(BatchStatus::Processing);
        }

        let status = BatchStatus::derive(batch.queued, completed, failed);
        self.batches
            .update_outcome(batch_id, completed, failed, status)
            .await?;

        info!(%batch_id, %status, completed, failed, "Batch outcome recorded");

        Ok(status)
    }

    /// Atomically bump the batch clicked counter.
    ///
    /// Multiple clicks keep counting toward batch totals even though the
    /// message-level timestamp is first-click-only.
    pub async fn record_click(&self, batch_id: BatchId) -> Result<()> {
        self.batches.increment_clicked(batch_id).await?;
        Ok(())
    }
}
