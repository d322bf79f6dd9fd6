//! Error types and error handling
//!
//! HTTP handlers return [`OutreachError`]. Client mistakes map to 400; everything
//! else is logged with full detail and answered with a generic 500 body so the
//! server never leaks internals or crashes on a failed request.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::email::EmailError;
use crate::store::StoreError;

/// Application error type
#[derive(Debug, Error)]
pub enum OutreachError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bad request error
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Persistence failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Mail transport failure
    #[error("Email error: {0}")]
    Email(#[from] EmailError),

    /// Server error
    #[error("Server error: {0}")]
    ServerError(String),
}

impl OutreachError {
    /// Shorthand for a 400 response
    #[must_use]
    pub fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Status code this error maps to
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for OutreachError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Self::BadRequest(msg) => msg.clone(),
            other => {
                tracing::error!(error = %other, "Request failed");
                "Internal server error".to_string()
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_maps_to_400() {
        let response = OutreachError::bad_request("email is required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_store_error_maps_to_500() {
        let error = OutreachError::from(StoreError::Unavailable("agent stopped".to_string()));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
