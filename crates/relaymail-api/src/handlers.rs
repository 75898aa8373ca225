//! API request handlers

pub mod batches;
pub mod health;
pub mod notifications;
pub mod tracking;
pub mod webhooks;

use axum::http::StatusCode;
use axum::Json;
use relaymail_core::PipelineError;
use serde::Serialize;
use tracing::error;

/// JSON error body returned by every non-2xx handler response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

pub fn error_response(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

pub fn internal_error(context: &str, e: impl std::fmt::Display) -> ApiError {
    error!("{}: {}", context, e);
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "An internal error occurred",
    )
}

pub fn map_pipeline_error(e: PipelineError) -> ApiError {
    match e {
        PipelineError::Validation(message) => {
            error_response(StatusCode::BAD_REQUEST, "validation_error", message)
        }
        PipelineError::RateLimited(message) => {
            error_response(StatusCode::TOO_MANY_REQUESTS, "rate_limit_exceeded", message)
        }
        // A missing template is bad input like any other: the submission
        // named something the account does not have
        PipelineError::TemplateNotFound => error_response(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "Referenced template does not exist",
        ),
        PipelineError::Internal(e) => internal_error("Pipeline failure", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pipeline_error_status_mapping() {
        let (status, body) = map_pipeline_error(PipelineError::Validation("bad".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.0.error, "validation_error");

        let (status, body) = map_pipeline_error(PipelineError::TemplateNotFound);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.0.error, "validation_error");

        let (status, body) = map_pipeline_error(PipelineError::RateLimited("over".to_string()));
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body.0.error, "rate_limit_exceeded");

        let (status, _) = map_pipeline_error(PipelineError::Internal(anyhow::anyhow!("boom")));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
