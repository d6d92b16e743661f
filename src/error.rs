//! # Error Handling
//!
//! This module defines the HTTP-boundary error type and how it is converted to a response.
//!
//! ## Taxonomy:
//! - **Validation**: bad, missing or oversized input. Always the caller's fault, never retried
//! - **Upstream**: the text-generation provider failed (see [`UpstreamError`]); surfaced
//!   with a distinct status code per kind and never retried here
//! - **Internal**: anything unexpected while handling the request. Logged with detail,
//!   reported to the caller generically
//!
//! ## JSON Response Format:
//! Every failure is a flat object with a human-readable `error` and an optional `message`:
//! ```json
//! { "error": "Rate limit exceeded. Please wait a moment." }
//! ```
//! No failure ever returns a partially-filled success shape.

use crate::simplifier::client::UpstreamError;
use actix_web::error::JsonPayloadError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::fmt;
use tracing::error;

#[derive(Debug)]
pub enum AppError {
    /// User input failed validation rules
    Validation(String),

    /// The upstream text-generation API failed
    Upstream(UpstreamError),

    /// Unexpected server-side failure; the detail is never sent to the caller
    Internal(String),
}

/// Wire shape of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::Upstream(err) => write!(f, "Upstream error: {}", err),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl AppError {
    /// Client-facing body for this error.
    pub fn body(&self) -> ErrorBody {
        match self {
            AppError::Validation(msg) => ErrorBody {
                error: msg.clone(),
                message: None,
            },
            AppError::Upstream(UpstreamError::Unauthorized(_)) => ErrorBody {
                error: "Invalid API key. Please check the upstream API key.".to_string(),
                message: None,
            },
            AppError::Upstream(UpstreamError::RateLimited) => ErrorBody {
                error: "Rate limit exceeded. Please wait a moment.".to_string(),
                message: None,
            },
            AppError::Upstream(UpstreamError::GenerationFailed(detail))
            | AppError::Upstream(UpstreamError::TransportFailure(detail)) => ErrorBody {
                error: "Failed to generate explanation".to_string(),
                message: Some(detail.clone()),
            },
            AppError::Internal(_) => ErrorBody {
                error: "Internal server error".to_string(),
                message: None,
            },
        }
    }
}

/// HTTP status mapping:
/// - Validation → 400
/// - Upstream unauthorized → 401, rate limited → 429, anything else → 500
/// - Internal → 500
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Upstream(UpstreamError::Unauthorized(_)) => StatusCode::UNAUTHORIZED,
            AppError::Upstream(UpstreamError::RateLimited) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let AppError::Internal(detail) = self {
            error!(detail = %detail, "Internal error while handling request");
        }

        HttpResponse::build(self.status_code()).json(self.body())
    }
}

impl From<UpstreamError> for AppError {
    fn from(err: UpstreamError) -> Self {
        AppError::Upstream(err)
    }
}

/// The anyhow crate is used for startup plumbing; anything that leaks into a
/// handler is an internal error.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Malformed JSON or a field of the wrong type is the client's fault.
impl From<JsonPayloadError> for AppError {
    fn from(err: JsonPayloadError) -> Self {
        match err {
            JsonPayloadError::OverflowKnownLength { .. } | JsonPayloadError::Overflow { .. } => {
                AppError::Validation("Request body too large".to_string())
            }
            JsonPayloadError::ContentType => {
                AppError::Validation("Expected a JSON request body".to_string())
            }
            other => AppError::Validation(format!("Invalid JSON body: {}", other)),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::Validation("bad".into()), 400),
            (AppError::Upstream(UpstreamError::Unauthorized(403)), 401),
            (AppError::Upstream(UpstreamError::RateLimited), 429),
            (AppError::Upstream(UpstreamError::GenerationFailed("x".into())), 500),
            (AppError::Upstream(UpstreamError::TransportFailure("x".into())), 500),
            (AppError::Internal("x".into()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code().as_u16(), status, "{}", err);
        }
    }

    #[test]
    fn test_internal_detail_is_not_exposed() {
        let body = AppError::Internal("db password is hunter2".into()).body();
        assert_eq!(body.error, "Internal server error");
        assert!(body.message.is_none());

        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("message").is_none());
        assert!(!json.to_string().contains("hunter2"));
    }

    #[test]
    fn test_anyhow_failure_becomes_generic_500() {
        let err = AppError::from(anyhow::anyhow!("cache lock table corrupted"));
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = serde_json::to_value(err.body()).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "Internal server error" }));
    }

    #[test]
    fn test_generation_failure_carries_message() {
        let body = AppError::Upstream(UpstreamError::GenerationFailed("upstream returned status 502".into())).body();
        assert_eq!(body.error, "Failed to generate explanation");
        assert_eq!(body.message.as_deref(), Some("upstream returned status 502"));
    }
}
