//! Inbound notification handlers: provider bounce/complaint feed and the
//! click-tracking webhook
//!
//! Neither endpoint uses API-key auth. The provider feed is validated by its
//! envelope shape; the click webhook is HMAC-verified over the raw body
//! before any parsing happens.

use axum::{body::Bytes, extract::State, http::HeaderMap, http::StatusCode, Json};
use relaymail_common::signing::verify_raw_signature;
use relaymail_core::tracking::LinkMetadata;
use relaymail_core::ProviderEnvelope;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use super::{error_response, internal_error, ApiError};
use crate::auth::AppState;

/// Signature header sent by the click-tracking provider
const CLICK_SIGNATURE_HEADER: &str = "x-signature";

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub status: String,
}

fn ack() -> Json<AckResponse> {
    Json(AckResponse {
        status: "ok".to_string(),
    })
}

/// Receive a provider notification (bounce/complaint envelope)
pub async fn provider_notification(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<AckResponse>, ApiError> {
    let envelope: ProviderEnvelope = serde_json::from_slice(&body).map_err(|e| {
        warn!("Malformed provider envelope: {}", e);
        error_response(
            StatusCode::BAD_REQUEST,
            "invalid_envelope",
            "Request body is not a valid notification envelope",
        )
    })?;

    state
        .reconciler
        .handle_envelope(envelope)
        .await
        .map_err(|e| internal_error("Failed to process provider notification", e))?;

    Ok(ack())
}

/// One click event from the tracking provider
#[derive(Debug, Clone, Deserialize)]
pub struct ClickEvent {
    pub metadata: LinkMetadata,
    #[serde(default)]
    pub url: Option<String>,
}

/// Receive a click-tracking webhook
pub async fn click_notification(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AckResponse>, ApiError> {
    let secret = &state.config.tracking.click_webhook_secret;

    let signature = headers
        .get(CLICK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            error_response(
                StatusCode::UNAUTHORIZED,
                "missing_signature",
                "Signature header required",
            )
        })?;

    // Verify over the exact received bytes, before parsing
    if !verify_raw_signature(secret, signature, &body) {
        warn!("Click webhook signature verification failed");
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "invalid_signature",
            "Signature verification failed",
        ));
    }

    let event: ClickEvent = serde_json::from_slice(&body).map_err(|e| {
        warn!("Malformed click event: {}", e);
        error_response(
            StatusCode::BAD_REQUEST,
            "invalid_event",
            "Request body is not a valid click event",
        )
    })?;

    if let Some(email_id) = event.metadata.email_id {
        state
            .reconciler
            .record_click(email_id)
            .await
            .map_err(|e| internal_error("Failed to record click", e))?;
    } else if let Some(batch_id) = event.metadata.batch_id {
        state
            .reconciler
            .record_batch_click(batch_id)
            .await
            .map_err(|e| internal_error("Failed to record batch click", e))?;
    }

    Ok(ack())
}
