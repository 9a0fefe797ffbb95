//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::aggregator::AggregatorError;
use crate::session::SessionError;
use crate::store::StoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    /// Missing or malformed request field
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid session token
    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    // Upstream aggregator failures; the route picks the status
    #[error("{context}")]
    Upstream {
        status: StatusCode,
        context: &'static str,
        #[source]
        source: AggregatorError,
    },

    // Server errors (5xx)
    #[error("Storage error")]
    Storage(#[from] StoreError),

    #[error("Session error")]
    Session(#[from] SessionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Unauthorized(msg.into())
    }

    /// Wrap an aggregator failure for a route that reports it with `status`
    pub fn upstream(
        status: StatusCode,
        context: &'static str,
    ) -> impl FnOnce(AggregatorError) -> AppError {
        move |source| AppError::Upstream {
            status,
            context,
            source,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, details) = match &self {
            // 400 Bad Request
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, None, None),

            // 401 Unauthorized
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, None, None),

            // 404 Not Found
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, None, None),

            // Aggregator failures carry its code and message through
            AppError::Upstream {
                status,
                context,
                source,
            } => {
                tracing::error!(context, error = %source, "Aggregator call failed");
                (
                    *status,
                    source.code().map(str::to_string),
                    Some(source.message()),
                )
            }

            // 409 Conflict
            AppError::Storage(StoreError::Conflict(msg)) => {
                tracing::warn!("Store conflict: {}", msg);
                (StatusCode::CONFLICT, Some("conflict".to_string()), None)
            }

            // 500 Internal Server Error
            AppError::Storage(e) => {
                tracing::error!("Storage error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Some("storage_error".to_string()),
                    None,
                )
            }
            AppError::Session(e) => {
                tracing::error!("Session error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Some("session_error".to_string()),
                    None,
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Some("internal_error".to_string()),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            code,
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_body_has_only_error() {
        let body = ErrorResponse {
            error: AppError::validation("public_token is required").to_string(),
            code: None,
            details: None,
        };
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            serde_json::json!({ "error": "public_token is required" })
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::validation("x").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::unauthorized("x").into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Storage(StoreError::Conflict("email".into()))
                .into_response()
                .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Storage(StoreError::Corrupt("row".into()))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_uses_route_status() {
        let source = AggregatorError::Upstream {
            status: 400,
            error_type: "INVALID_INPUT".to_string(),
            error_code: "INVALID_ACCESS_TOKEN".to_string(),
            error_message: "bad token".to_string(),
            display_message: None,
        };
        let err = AppError::upstream(StatusCode::BAD_REQUEST, "Failed to fetch balances")(source);
        assert_eq!(err.to_string(), "Failed to fetch balances");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
