//! Webhook subscription and delivery-log repositories

use relaymail_common::types::{AccountId, SubscriptionId};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{WebhookDeliveryLog, WebhookSubscription};

/// Webhook subscription repository
#[derive(Clone)]
pub struct WebhookSubscriptionRepository {
    pool: PgPool,
}

impl WebhookSubscriptionRepository {
    /// Create a new subscription repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Register a new subscription
    pub async fn create(
        &self,
        account_id: AccountId,
        url: &str,
        event_types: &[String],
        secret: &str,
    ) -> Result<WebhookSubscription, sqlx::Error> {
        let event_types_json =
            serde_json::to_value(event_types).unwrap_or_else(|_| serde_json::json!([]));

        sqlx::query_as::<_, WebhookSubscription>(
            r#"
            INSERT INTO webhook_subscriptions (id, account_id, url, event_types, secret)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(account_id)
        .bind(url)
        .bind(&event_types_json)
        .bind(secret)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a subscription scoped to an account
    pub async fn get(
        &self,
        account_id: AccountId,
        id: SubscriptionId,
    ) -> Result<Option<WebhookSubscription>, sqlx::Error> {
        sqlx::query_as::<_, WebhookSubscription>(
            "SELECT * FROM webhook_subscriptions WHERE account_id = $1 AND id = $2",
        )
        .bind(account_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// List all subscriptions for an account
    pub async fn list_by_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<WebhookSubscription>, sqlx::Error> {
        sqlx::query_as::<_, WebhookSubscription>(
            "SELECT * FROM webhook_subscriptions WHERE account_id = $1 ORDER BY created_at ASC",
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Count subscriptions for an account (5-per-account cap)
    pub async fn count_by_account(&self, account_id: AccountId) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM webhook_subscriptions WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("count"))
    }

    /// Delete a subscription owned by an account
    pub async fn delete(
        &self,
        account_id: AccountId,
        id: SubscriptionId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM webhook_subscriptions WHERE account_id = $1 AND id = $2",
        )
        .bind(account_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Webhook delivery-log repository (append-only)
#[derive(Clone)]
pub struct WebhookLogRepository {
    pool: PgPool,
}

impl WebhookLogRepository {
    /// Create a new delivery-log repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record one delivery attempt
    pub async fn insert(
        &self,
        subscription_id: SubscriptionId,
        event_type: &str,
        payload: &serde_json::Value,
        response_status: i32,
        response_body: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO webhook_delivery_logs (
                id, subscription_id, event_type, payload, response_status, response_body
            ) VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(subscription_id)
        .bind(event_type)
        .bind(payload)
        .bind(response_status)
        .bind(response_body)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// List recent attempts for a subscription, newest first
    pub async fn list_by_subscription(
        &self,
        subscription_id: SubscriptionId,
        limit: i64,
    ) -> Result<Vec<WebhookDeliveryLog>, sqlx::Error> {
        sqlx::query_as::<_, WebhookDeliveryLog>(
            r#"
            SELECT * FROM webhook_delivery_logs
            WHERE subscription_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(subscription_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
