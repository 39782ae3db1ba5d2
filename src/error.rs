//! Error types shared across handlers, with their HTTP mappings.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Failures the REST handlers report to clients.
///
/// Anything unexpected is collapsed into `Internal` so that storage or
/// signing details never reach the response body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("invalid credentials")]
    Unauthorized,
    #[error("internal server error")]
    Internal,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Terminal states of the bearer-credential check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthRejection {
    #[error("authorization credentials are not provided")]
    MissingCredential,
    #[error("invalid authorization header format")]
    MalformedCredential,
    #[error("unsupported authorization scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("invalid token")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("invalid token payload")]
    MalformedClaims,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        // all rejections share the status; the body carries the sub-reason
        let body = json!({ "error": self.to_string() });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    }
}
