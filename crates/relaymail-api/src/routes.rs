//! API routes

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{auth_middleware, AppState};
use crate::handlers::{batches, health, notifications, tracking, webhooks};

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Health check routes (no auth required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/ready", get(health::readiness))
        .with_state(state.clone());

    // Webhook subscription routes
    let webhook_routes = Router::new()
        .route("/", get(webhooks::list_webhooks))
        .route("/", post(webhooks::create_webhook))
        .route("/:subscription_id", get(webhooks::get_webhook))
        .route("/:subscription_id", delete(webhooks::delete_webhook))
        .route("/:subscription_id/test", post(webhooks::test_webhook))
        .route("/:subscription_id/logs", get(webhooks::webhook_logs));

    // API v1 routes with authentication
    let api_v1 = Router::new()
        .route("/batches", post(batches::create_batch))
        .route("/batches", get(batches::list_batches))
        .route("/batches/:batch_id", get(batches::get_batch))
        .route("/batches/:batch_id/emails", get(batches::list_batch_emails))
        .route("/send", post(batches::send_single))
        .nest("/webhooks", webhook_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    // Inbound notification routes (verified by envelope/signature, not API key)
    let notification_routes = Router::new()
        .route("/provider", post(notifications::provider_notification))
        .route("/clicks", post(notifications::click_notification))
        .with_state(state.clone());

    // Public tracking routes embedded in email bodies
    let tracking_routes = Router::new()
        .route("/t/open/:email_id", get(tracking::open_pixel))
        .route("/unsubscribe/:token", get(tracking::unsubscribe))
        .with_state(state);

    // Combine all routes
    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .nest("/notifications", notification_routes)
        .merge(tracking_routes)
        .layer(TraceLayer::new_for_http())
}
