//! Error types for Relaymail

use thiserror::Error;

/// Main error type for Relaymail
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Daily send limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Tracking error: {0}")]
    Tracking(String),

    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Bad signature: {0}")]
    Signature(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for Relaymail
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config(_) => 500,
            Error::Database(_) => 500,
            Error::Auth(_) => 401,
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            Error::PermissionDenied(_) => 403,
            Error::RateLimitExceeded(_) => 429,
            Error::Provider(_) => 502,
            Error::Tracking(_) => 502,
            Error::Webhook(_) => 500,
            Error::Signature(_) => 401,
            Error::Internal(_) => 500,
            Error::Other(_) => 500,
        }
    }

    /// Returns the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config(_) => "CONFIG_ERROR",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Auth(_) => "UNAUTHORIZED",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::PermissionDenied(_) => "FORBIDDEN",
            Error::RateLimitExceeded(_) => "RATE_LIMITED",
            Error::Provider(_) => "PROVIDER_ERROR",
            Error::Tracking(_) => "TRACKING_ERROR",
            Error::Webhook(_) => "WEBHOOK_ERROR",
            Error::Signature(_) => "BAD_SIGNATURE",
            Error::Internal(_) => "INTERNAL_ERROR",
            Error::Other(_) => "INTERNAL_ERROR",
        }
    }
}
