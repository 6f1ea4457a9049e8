//! Web error types for the relay's HTTP API.

use axum::{
    extract::multipart::MultipartRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::TokenError;
use crate::cookies::CookieError;
use crate::extractor::ExtractorError;

/// Error type for web API operations.
///
/// Every variant renders as `{"error": "<message>"}`.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    /// Malformed or incomplete request.
    #[error("{0}")]
    BadRequest(String),

    /// Missing or invalid credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// The endpoint is switched off.
    #[error("{0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Too many requests from one client.
    #[error("{0}")]
    RateLimited(String),

    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

impl WebError {
    pub fn invalid_token() -> Self {
        WebError::Unauthorized("Invalid or expired token".to_string())
    }

    fn status(&self) -> StatusCode {
        match self {
            WebError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WebError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            WebError::Forbidden(_) => StatusCode::FORBIDDEN,
            WebError::NotFound(_) => StatusCode::NOT_FOUND,
            WebError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            WebError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Internal server error: {}", self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<TokenError> for WebError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::RateLimited => WebError::RateLimited(err.to_string()),
        }
    }
}

impl From<ExtractorError> for WebError {
    fn from(err: ExtractorError) -> Self {
        match err {
            ExtractorError::InvalidRequest(msg) => WebError::BadRequest(msg),
            other => WebError::Internal(other.to_string()),
        }
    }
}

impl From<CookieError> for WebError {
    fn from(err: CookieError) -> Self {
        match err {
            CookieError::Io { .. } => WebError::Internal(err.to_string()),
            other => WebError::BadRequest(other.to_string()),
        }
    }
}

impl From<MultipartRejection> for WebError {
    fn from(rejection: MultipartRejection) -> Self {
        WebError::BadRequest(rejection.body_text())
    }
}
