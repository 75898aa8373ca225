//! Queue job repository
//!
//! Backs the at-least-once dispatch queue. Claiming selects due rows with
//! `FOR UPDATE SKIP LOCKED` and flips them to `processing` in the same
//! statement, so the locks cover the status write and concurrent workers
//! never receive the same job.

use chrono::{DateTime, Utc};
use relaymail_common::types::JobId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Job;

/// Queue job repository
#[derive(Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    /// Create a new job repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue a job
    pub async fn enqueue(
        &self,
        queue: &str,
        payload: &serde_json::Value,
        max_attempts: i32,
        scheduled_at: DateTime<Utc>,
    ) -> Result<JobId, sqlx::Error> {
        let id = Uuid::now_v7();

        sqlx::query(
            r#"
            INSERT INTO jobs (id, queue, payload, status, attempts, max_attempts, scheduled_at, created_at)
            VALUES ($1, $2, $3, 'pending', 0, $4, $5, NOW())
            "#,
        )
        .bind(id)
        .bind(queue)
        .bind(payload)
        .bind(max_attempts)
        .bind(scheduled_at)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Claim due pending jobs for this worker.
    ///
    /// The returned rows are already marked `processing`; single-statement
    /// claiming keeps the row locks alive until the status write lands.
    pub async fn claim_pending(&self, queue: &str, limit: i64) -> Result<Vec<Job>, sqlx::Error> {
        sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = 'processing', started_at = NOW()
            WHERE id IN (
                SELECT id FROM jobs
                WHERE status = 'pending'
                AND queue = $1
                AND scheduled_at <= NOW()
                ORDER BY scheduled_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(queue)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Mark a job as completed
    pub async fn mark_completed(&self, id: JobId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs SET status = 'completed', completed_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mark a job as failed after its final attempt
    pub async fn mark_failed(&self, id: JobId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'failed', last_error = $2, completed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Re-schedule a job for retry
    pub async fn schedule_retry(
        &self,
        id: JobId,
        attempts: i32,
        error: &str,
        scheduled_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'pending',
                attempts = $2,
                last_error = $3,
                scheduled_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(error)
        .bind(scheduled_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
