//! Batch repository

use chrono::Utc;
use relaymail_common::types::{AccountId, BatchId, BatchStatus, TemplateId};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{Batch, BatchStats, EmailStatusCounts};

/// Batch repository
#[derive(Clone)]
pub struct BatchRepository {
    pool: PgPool,
}

impl BatchRepository {
    /// Create a new batch repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a batch in `processing` status with its creation-time counters
    pub async fn create(
        &self,
        account_id: AccountId,
        template_id: Option<TemplateId>,
        stats: BatchStats,
    ) -> Result<Batch, sqlx::Error> {
        let id = Uuid::now_v7();

        sqlx::query_as::<_, Batch>(
            r#"
            INSERT INTO batches (
                id, account_id, template_id, total, valid, suppressed,
                duplicates, queued, completed, failed, clicked, status, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, 0, 0, $9, $10)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(account_id)
        .bind(template_id)
        .bind(stats.total)
        .bind(stats.valid)
        .bind(stats.suppressed)
        .bind(stats.duplicates)
        .bind(stats.queued)
        .bind(BatchStatus::Processing.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
    }

    /// Get a batch by id
    pub async fn get(&self, id: BatchId) -> Result<Option<Batch>, sqlx::Error> {
        sqlx::query_as::<_, Batch>("SELECT * FROM batches WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a batch scoped to an account
    pub async fn get_by_account(
        &self,
        account_id: AccountId,
        id: BatchId,
    ) -> Result<Option<Batch>, sqlx::Error> {
        sqlx::query_as::<_, Batch>("SELECT * FROM batches WHERE account_id = $1 AND id = $2")
            .bind(account_id)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Count emails in a batch grouped by status
    pub async fn email_status_counts(
        &self,
        batch_id: BatchId,
    ) -> Result<EmailStatusCounts, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count
            FROM emails
            WHERE batch_id = $1
            GROUP BY status
            "#,
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = EmailStatusCounts::default();
        for row in rows {
            let status: String = row.get("status");
            let count: i64 = row.get("count");
            let count = count as i32;
            match status.as_str() {
                "pending" => counts.pending = count,
                "processing" => counts.processing = count,
                "completed" => counts.completed = count,
                "failed" => counts.failed = count,
                "bounced" => counts.bounced = count,
                "complained" => counts.complained = count,
                _ => {}
            }
        }

        Ok(counts)
    }

    /// Persist recomputed completed/failed counters and status.
    ///
    /// The counters are always recomputed from the emails table before this
    /// call, so repeating it with unchanged rows is a no-op in effect.
    pub async fn update_outcome(
        &self,
        id: BatchId,
        completed: i32,
        failed: i32,
        status: BatchStatus,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE batches
            SET completed = $2, failed = $3, status = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(completed)
        .bind(failed)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Atomically increment the clicked counter.
    ///
    /// Pure increment, not a recompute, so concurrent click events for the
    /// same batch never lose updates.
    pub async fn increment_clicked(&self, id: BatchId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE batches SET clicked = clicked + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// List batches for an account, newest first
    pub async fn list_by_account(
        &self,
        account_id: AccountId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Batch>, sqlx::Error> {
        sqlx::query_as::<_, Batch>(
            r#"
            SELECT * FROM batches
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }
}
