//! API Error Types
//!
//! Defines error types for the API layer and implements conversion
//! to HTTP responses with appropriate status codes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::identity::IdentityError;
use crate::services::ServiceError;

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request validation failed
    #[error("{0}")]
    Validation(String),

    /// Missing, unknown or expired session, or bad credentials
    #[error("{0}")]
    Unauthorized(String),

    /// The record belongs to another user
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Email address already registered
    #[error("{0}")]
    Conflict(String),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Service unavailable (store shut down)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidEmail(_) | IdentityError::WeakPassword { .. } => {
                ApiError::Validation(err.to_string())
            }
            IdentityError::EmailInUse => ApiError::Conflict(err.to_string()),
            IdentityError::InvalidCredentials => ApiError::Unauthorized(err.to_string()),
            IdentityError::Hashing(_) => ApiError::Internal(err.to_string()),
            IdentityError::Storage(e) => ApiError::Storage(e),
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => ApiError::Validation(msg),
            ServiceError::NotFound(what) => ApiError::NotFound(what),
            ServiceError::Forbidden(what) => ApiError::Forbidden(what),
            ServiceError::Identity(e) => e.into(),
            ServiceError::Storage(e) => ApiError::Storage(e),
        }
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "EMAIL_IN_USE"),
            ApiError::Storage(crate::storage::StorageError::Closed) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORE_CLOSED")
            }
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")
            }
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let request_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "API error occurred"
            );
        } else {
            tracing::warn!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "Request rejected"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
            },
            request_id,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_error_mapping() {
        let (status, code) = ApiError::from(IdentityError::EmailInUse).status_and_code();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(code, "EMAIL_IN_USE");

        let (status, _) = ApiError::from(IdentityError::InvalidCredentials).status_and_code();
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) =
            ApiError::from(IdentityError::WeakPassword { min: 6 }).status_and_code();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_service_error_mapping() {
        let err = ApiError::from(ServiceError::Validation("Passwords do not match".into()));
        assert_eq!(err.to_string(), "Passwords do not match");
        assert_eq!(err.status_and_code().0, StatusCode::BAD_REQUEST);

        let err = ApiError::from(ServiceError::Forbidden("reminder r1".into()));
        assert_eq!(err.status_and_code().0, StatusCode::FORBIDDEN);

        let err = ApiError::from(ServiceError::Identity(IdentityError::EmailInUse));
        assert_eq!(err.status_and_code().0, StatusCode::CONFLICT);
    }
}
