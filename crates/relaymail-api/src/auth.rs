//! Authentication module

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use relaymail_common::config::Config;
use relaymail_common::types::AccountId;
use relaymail_core::{BatchPipeline, DeliveryStatusReconciler, WebhookNotifier};
use relaymail_storage::models::ApiKey;
use relaymail_storage::repository::ApiKeyRepository;
use relaymail_storage::DatabasePool;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Application state shared across handlers
pub struct AppState {
    pub db_pool: DatabasePool,
    pub config: Config,
    pub pipeline: BatchPipeline,
    pub reconciler: Arc<DeliveryStatusReconciler>,
    pub notifier: WebhookNotifier,
}

/// Authenticated context extracted from the API key
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The account this API key belongs to
    pub account_id: AccountId,
    /// API key ID for audit logging
    pub api_key_id: Uuid,
}

/// Extract the API key from a request
pub fn extract_api_key(req: &Request) -> Option<&str> {
    // Check Authorization header
    if let Some(auth) = req.headers().get("authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(key) = auth_str.strip_prefix("Bearer ") {
                return Some(key);
            }
        }
    }

    // Check X-API-Key header
    if let Some(key) = req.headers().get("x-api-key") {
        if let Ok(key_str) = key.to_str() {
            return Some(key_str);
        }
    }

    None
}

/// Extract the prefix from an API key (first 8 characters)
fn extract_key_prefix(api_key: &str) -> Option<&str> {
    if api_key.len() >= 8 {
        Some(&api_key[..8])
    } else {
        None
    }
}

/// Hash an API key for comparison
fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify an API key against a stored SHA-256 hex hash
fn verify_api_key(api_key: &str, stored_hash: &str) -> bool {
    hash_api_key(api_key) == stored_hash
}

/// Validate an API key against the database
async fn validate_api_key(db_pool: &DatabasePool, api_key: &str) -> Result<ApiKey, StatusCode> {
    let prefix = extract_key_prefix(api_key).ok_or_else(|| {
        warn!("API key too short");
        StatusCode::UNAUTHORIZED
    })?;

    let repo = ApiKeyRepository::new(db_pool.pool().clone());

    // Find potential matches by prefix
    let candidates = repo.find_by_prefix(prefix).await.map_err(|e| {
        error!("Database error while looking up API key: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    for candidate in candidates {
        if verify_api_key(api_key, &candidate.key_hash) {
            if candidate.is_revoked() {
                warn!("API key {} is revoked", candidate.id);
                return Err(StatusCode::UNAUTHORIZED);
            }

            // Update last_used_at (fire and forget, don't fail auth on this)
            let repo_clone = repo.clone();
            let key_id = candidate.id;
            tokio::spawn(async move {
                if let Err(e) = repo_clone.update_last_used(key_id).await {
                    error!("Failed to update API key last_used_at: {}", e);
                }
            });

            debug!(
                "API key {} authenticated for account {}",
                candidate.id, candidate.account_id
            );
            return Ok(candidate);
        }
    }

    warn!("No matching API key for prefix: {}", prefix);
    Err(StatusCode::UNAUTHORIZED)
}

/// Authentication middleware for the `/api/v1` surface
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let api_key = extract_api_key(&request).ok_or_else(|| {
        warn!("Missing API key in request to {}", request.uri().path());
        StatusCode::UNAUTHORIZED
    })?;

    let validated_key = validate_api_key(&state.db_pool, api_key).await?;

    let auth_context = AuthContext {
        account_id: validated_key.account_id,
        api_key_id: validated_key.id,
    };

    request.extensions_mut().insert(auth_context);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_verify_sha256_hash() {
        let api_key = "rk_test_key_12345";
        let hash = hash_api_key(api_key);

        assert!(verify_api_key(api_key, &hash));
        assert!(!verify_api_key("wrong_key", &hash));
    }

    #[test]
    fn test_key_prefix() {
        assert_eq!(extract_key_prefix("rk_test_key"), Some("rk_test_"));
        assert_eq!(extract_key_prefix("short"), None);
    }
}
