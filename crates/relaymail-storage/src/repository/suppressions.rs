//! Suppression list repository

use relaymail_common::types::{AccountId, EmailId, SuppressionReason};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::Suppression;

/// Suppression list repository
#[derive(Clone)]
pub struct SuppressionRepository {
    pool: PgPool,
}

impl SuppressionRepository {
    /// Create a new suppression repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a suppression entry; a no-op if the address is already listed
    pub async fn insert(
        &self,
        email: &str,
        reason: SuppressionReason,
        account_id: Option<AccountId>,
        email_id: Option<EmailId>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO suppressions (id, email, reason, account_id, email_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email.to_lowercase())
        .bind(reason.as_str())
        .bind(account_id)
        .bind(email_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Return which of the candidate addresses are suppressed.
    ///
    /// Single round trip regardless of candidate count; addresses are
    /// compared lowercased.
    pub async fn find_suppressed(&self, emails: &[String]) -> Result<Vec<String>, sqlx::Error> {
        if emails.is_empty() {
            return Ok(Vec::new());
        }

        let lowered: Vec<String> = emails.iter().map(|e| e.to_lowercase()).collect();

        let rows = sqlx::query("SELECT email FROM suppressions WHERE email = ANY($1)")
            .bind(&lowered)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|r| r.get::<String, _>("email")).collect())
    }

    /// Get an entry by address
    pub async fn get_by_email(&self, email: &str) -> Result<Option<Suppression>, sqlx::Error> {
        sqlx::query_as::<_, Suppression>("SELECT * FROM suppressions WHERE email = $1")
            .bind(email.to_lowercase())
            .fetch_optional(&self.pool)
            .await
    }
}
