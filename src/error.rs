//! Request-scoped error taxonomy.
//!
//! Every API failure renders as `{"error": {"code": ..., "message": ...}}` with a
//! stable machine-readable code. Upstream dependency failures that have a safe
//! degraded answer (model fallback, skipped retrieval) never reach this type —
//! only failures the caller must see do.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Session not found")]
    BadSession,
    #[error("Name mismatch")]
    Mismatch,
    #[error("No such user")]
    NoSuchUser,
    #[error("Voice not allowed")]
    BadVoice,
    #[error("Too many requests")]
    RateLimited,
    #[error("Admin token not configured")]
    AdminDisabled,
    #[error("Bad admin token")]
    Unauthorised,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadSession => "BAD_SESSION",
            Self::Mismatch => "MISMATCH",
            Self::NoSuchUser => "NO_SUCH_USER",
            Self::BadVoice => "BAD_VOICE",
            Self::RateLimited => "RATE_LIMIT",
            Self::AdminDisabled => "ADMIN_DISABLED",
            Self::Unauthorised => "UNAUTHORISED",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadSession | Self::Mismatch | Self::Unauthorised => StatusCode::UNAUTHORIZED,
            Self::NoSuchUser => StatusCode::NOT_FOUND,
            Self::BadVoice | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::AdminDisabled => StatusCode::FORBIDDEN,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(err) = &self {
            tracing::error!(error = %err, "request failed");
        }
        let body = json!({
            "error": { "code": self.code(), "message": self.to_string() }
        });
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_statuses() {
        assert_eq!(ApiError::BadSession.code(), "BAD_SESSION");
        assert_eq!(ApiError::BadSession.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::RateLimited.code(), "RATE_LIMIT");
        assert_eq!(ApiError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::NoSuchUser.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::AdminDisabled.status(), StatusCode::FORBIDDEN);
    }
}
