//! Email repository

use chrono::{DateTime, Utc};
use relaymail_common::types::{AccountId, BatchId, BounceType, EmailId, EmailStatus};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{CreateEmail, Email};

/// Email repository
#[derive(Clone)]
pub struct EmailRepository {
    pool: PgPool,
}

impl EmailRepository {
    /// Create a new email repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one email row
    pub async fn create(&self, input: CreateEmail) -> Result<Email, sqlx::Error> {
        let id = Uuid::now_v7();
        let now = Utc::now();

        sqlx::query_as::<_, Email>(
            r#"
            INSERT INTO emails (
                id, account_id, batch_id, recipient, subject, body_html,
                body_text, status, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.account_id)
        .bind(input.batch_id)
        .bind(&input.recipient)
        .bind(&input.subject)
        .bind(&input.body_html)
        .bind(&input.body_text)
        .bind(input.status.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
    }

    /// Get an email by id
    pub async fn get(&self, id: EmailId) -> Result<Option<Email>, sqlx::Error> {
        sqlx::query_as::<_, Email>("SELECT * FROM emails WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Find an email by the provider's message id (bounce/complaint correlation)
    pub async fn get_by_provider_message_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<Email>, sqlx::Error> {
        sqlx::query_as::<_, Email>("SELECT * FROM emails WHERE provider_message_id = $1")
            .bind(provider_message_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Mark an email completed, storing the provider message id and clearing
    /// any error from a prior attempt.
    ///
    /// Guarded by `EmailStatus::can_transition_to`: only in-flight rows are
    /// touched. Returns whether the transition happened.
    pub async fn mark_completed(
        &self,
        id: EmailId,
        provider_message_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE emails
            SET status = $2, provider_message_id = $3, error = NULL, updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(id)
        .bind(EmailStatus::Completed.as_str())
        .bind(provider_message_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark an email failed with the error detail.
    ///
    /// Only in-flight rows transition; a late failure report never
    /// overwrites a bounce or complaint. Returns whether the transition
    /// happened.
    pub async fn mark_failed(&self, id: EmailId, error: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE emails
            SET status = $2, error = $3, updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing')
            "#,
        )
        .bind(id)
        .bind(EmailStatus::Failed.as_str())
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark an email bounced with its classification.
    ///
    /// Completed rows are eligible: bounces arrive after the provider
    /// accepted the message. Returns whether the transition happened, so
    /// replayed notifications can be detected.
    pub async fn mark_bounced(
        &self,
        id: EmailId,
        bounce_type: BounceType,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE emails
            SET status = $2, bounce_type = $3, updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing', 'completed')
            "#,
        )
        .bind(id)
        .bind(EmailStatus::Bounced.as_str())
        .bind(bounce_type.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark an email complained.
    ///
    /// Same eligibility as bounces. Returns whether the transition happened.
    pub async fn mark_complained(&self, id: EmailId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE emails
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'processing', 'completed')
            "#,
        )
        .bind(id)
        .bind(EmailStatus::Complained.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Set the opened timestamp if not already set (first-open-wins).
    ///
    /// Returns whether this call was the first open.
    pub async fn set_opened(
        &self,
        id: EmailId,
        at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE emails
            SET opened_at = $2, updated_at = NOW()
            WHERE id = $1 AND opened_at IS NULL
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Set the clicked timestamp if not already set (first-click-wins).
    ///
    /// Returns whether this call was the first click.
    pub async fn set_clicked(
        &self,
        id: EmailId,
        at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE emails
            SET clicked_at = $2, updated_at = NOW()
            WHERE id = $1 AND clicked_at IS NULL
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count emails created by an account since a point in time.
    ///
    /// Backs the daily quota: the counter is derived, never stored.
    pub async fn count_since(
        &self,
        account_id: AccountId,
        since: DateTime<Utc>,
    ) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS count FROM emails
            WHERE account_id = $1 AND created_at >= $2
            "#,
        )
        .bind(account_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("count"))
    }

    /// List emails belonging to a batch, in insertion order
    pub async fn list_by_batch(&self, batch_id: BatchId) -> Result<Vec<Email>, sqlx::Error> {
        sqlx::query_as::<_, Email>(
            r#"
            SELECT * FROM emails
            WHERE batch_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await
    }
}
