//! API error types and helpers.
//!
//! # Purpose and responsibility
//! Centralizes HTTP error response construction so every endpoint, the
//! request guard and extractor rejections share one `{code, message}` shape.
//!
//! # Key invariants and assumptions
//! - `body.code` always equals the numeric HTTP status.
//!
//! # Security considerations
//! - Internal errors log details server-side but return generic messages.
use crate::api::types::ErrorResponse;
use crate::store::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

/// Structured API error returned by handlers.
///
/// # Example
/// ```rust
/// use axum::http::StatusCode;
/// use warden::api::error::api_not_found;
///
/// let err = api_not_found("permission not found");
/// assert_eq!(err.status, StatusCode::NOT_FOUND);
/// assert_eq!(err.body.code, 404);
/// ```
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                code: status.as_u16(),
                message: message.into(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub fn api_not_found(message: &str) -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, message)
}

pub fn api_conflict(message: &str) -> ApiError {
    ApiError::new(StatusCode::CONFLICT, message)
}

/// Build a 500 from a store error, logging the detail.
pub fn api_internal(message: &str, err: &StoreError) -> ApiError {
    tracing::error!(error = ?err, "warden storage error");
    ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, message)
}

pub fn api_unauthorized(message: &str) -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, message)
}

pub fn api_forbidden(message: &str) -> ApiError {
    ApiError::new(StatusCode::FORBIDDEN, message)
}

pub fn api_validation_error(message: &str) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, message)
}

/// Translate a store failure into the matching HTTP error.
pub fn api_store_error(err: StoreError) -> ApiError {
    match &err {
        StoreError::NotFound(id) => api_not_found(&format!("permission not found: {id}")),
        StoreError::Conflict(id) => api_conflict(&format!("permission already exists: {id}")),
        StoreError::InvalidPolicyType(_) | StoreError::InvalidRule(_) => {
            api_validation_error(&err.to_string())
        }
        StoreError::Unavailable(_) => api_internal("policy store unavailable", &err),
    }
}
