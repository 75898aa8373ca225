//! Template repository

use relaymail_common::types::{AccountId, TemplateId};
use sqlx::PgPool;

use crate::models::Template;

/// Template repository
#[derive(Clone)]
pub struct TemplateRepository {
    pool: PgPool,
}

impl TemplateRepository {
    /// Create a new template repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a template owned by an account
    pub async fn get(
        &self,
        account_id: AccountId,
        id: TemplateId,
    ) -> Result<Option<Template>, sqlx::Error> {
        sqlx::query_as::<_, Template>(
            "SELECT * FROM templates WHERE account_id = $1 AND id = $2",
        )
        .bind(account_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }
}
