//! Batch submission and single-send handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use relaymail_common::types::{BatchId, TemplateId};
use relaymail_core::pipeline::RecipientInput;
use relaymail_core::{BatchSubmission, SubmissionOutcome};
use relaymail_storage::models::{Batch, Email};
use relaymail_storage::repository::{BatchRepository, EmailRepository};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{error_response, internal_error, map_pipeline_error, ApiError};
use crate::auth::{AppState, AuthContext};

/// Request body for batch submission
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBatchRequest {
    /// Template mode: render this template per recipient
    pub template_id: Option<TemplateId>,

    /// Raw mode: subject/body supplied inline
    pub subject: Option<String>,
    pub html: Option<String>,

    pub recipients: Vec<RecipientInput>,
}

/// Submit a batch of emails
pub async fn create_batch(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<CreateBatchRequest>,
) -> Result<Json<SubmissionOutcome>, ApiError> {
    let outcome = state
        .pipeline
        .submit(BatchSubmission {
            account_id: auth.account_id,
            template_id: input.template_id,
            subject: input.subject,
            body_html: input.html,
            recipients: input.recipients,
        })
        .await
        .map_err(map_pipeline_error)?;

    Ok(Json(outcome))
}

/// Get a batch and its rollup counters
pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(batch_id): Path<BatchId>,
) -> Result<Json<Batch>, ApiError> {
    let repo = BatchRepository::new(state.db_pool.pool().clone());

    let batch = repo
        .get_by_account(auth.account_id, batch_id)
        .await
        .map_err(|e| internal_error("Database error while fetching batch", e))?
        .ok_or_else(|| {
            error_response(StatusCode::NOT_FOUND, "not_found", "Batch not found")
        })?;

    Ok(Json(batch))
}

/// Query parameters for listing batches
#[derive(Debug, Clone, Deserialize)]
pub struct ListBatchesQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// List batches for the account, newest first
pub async fn list_batches(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListBatchesQuery>,
) -> Result<Json<Vec<Batch>>, ApiError> {
    let repo = BatchRepository::new(state.db_pool.pool().clone());

    let batches = repo
        .list_by_account(auth.account_id, query.limit.clamp(1, 200), query.offset.max(0))
        .await
        .map_err(|e| internal_error("Database error while listing batches", e))?;

    Ok(Json(batches))
}

/// List the emails belonging to a batch
pub async fn list_batch_emails(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(batch_id): Path<BatchId>,
) -> Result<Json<Vec<Email>>, ApiError> {
    let batches = BatchRepository::new(state.db_pool.pool().clone());

    // Ownership check before reading messages
    batches
        .get_by_account(auth.account_id, batch_id)
        .await
        .map_err(|e| internal_error("Database error while fetching batch", e))?
        .ok_or_else(|| {
            error_response(StatusCode::NOT_FOUND, "not_found", "Batch not found")
        })?;

    let emails = EmailRepository::new(state.db_pool.pool().clone())
        .list_by_batch(batch_id)
        .await
        .map_err(|e| internal_error("Database error while listing batch emails", e))?;

    Ok(Json(emails))
}

/// Request body for a single ad-hoc send
#[derive(Debug, Clone, Deserialize)]
pub struct SendRequest {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Response for a single ad-hoc send
#[derive(Debug, Clone, Serialize)]
pub struct SendResponse {
    pub email_id: relaymail_common::types::EmailId,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Send one email outside any batch
pub async fn send_single(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<SendRequest>,
) -> Result<Json<SendResponse>, ApiError> {
    let email = state
        .pipeline
        .send_single(auth.account_id, &input.to, &input.subject, &input.html)
        .await
        .map_err(map_pipeline_error)?;

    Ok(Json(SendResponse {
        email_id: email.id,
        status: email.status,
        error: email.error,
    }))
}
