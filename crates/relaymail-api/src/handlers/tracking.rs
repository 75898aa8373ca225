//! Open-pixel and unsubscribe handlers

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
};
use relaymail_common::signing::decode_unsubscribe_token;
use std::sync::Arc;
use tracing::warn;

use crate::auth::AppState;

/// A 1x1 transparent GIF
const PIXEL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

fn pixel_response() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store, max-age=0"),
        ],
        PIXEL_GIF,
    )
}

/// Serve the open-tracking beacon.
///
/// This endpoint always returns the image with 200: a broken or replayed
/// beacon URL must never render as a broken image in a mail client.
pub async fn open_pixel(
    State(state): State<Arc<AppState>>,
    Path(email_id): Path<String>,
) -> impl IntoResponse {
    match email_id.parse() {
        Ok(email_id) => state.reconciler.record_open(email_id).await,
        Err(_) => warn!(id = %email_id, "Open beacon with malformed id"),
    }

    pixel_response()
}

/// Handle an unsubscribe link click.
///
/// The token is self-contained and verified without a database read; the
/// suppression insert is idempotent so repeat visits are harmless.
pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> (StatusCode, Html<&'static str>) {
    let secret = &state.config.webhooks.unsubscribe_secret;

    let Some(claims) = decode_unsubscribe_token(secret, &token) else {
        return (
            StatusCode::BAD_REQUEST,
            Html("<html><body><p>This unsubscribe link is invalid or has expired.</p></body></html>"),
        );
    };

    if let Err(e) = state
        .reconciler
        .record_unsubscribe(&claims.recipient, claims.account_id, claims.email_id)
        .await
    {
        warn!(email_id = %claims.email_id, "Failed to record unsubscribe: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html("<html><body><p>Something went wrong. Please try again later.</p></body></html>"),
        );
    }

    (
        StatusCode::OK,
        Html("<html><body><p>You have been unsubscribed and will receive no further emails.</p></body></html>"),
    )
}
