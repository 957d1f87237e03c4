use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::validation::ValidationErrors;

/// Failures reported by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("edit conflict")]
    EditConflict,
    #[error("duplicate email")]
    DuplicateEmail,
    #[error("query exceeded its deadline")]
    Timeout,
    #[error("unsafe sort parameter: {0}")]
    InvalidSort(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Error returned by handlers and middleware. Every variant renders as
/// `{"error": ...}` with the matching status code.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("failed validation")]
    FailedValidation(ValidationErrors),
    #[error("the requested resource could not be found")]
    NotFound,
    #[error("the {0} method is not supported for this resource")]
    MethodNotAllowed(String),
    #[error("unable to update the record due to an edit conflict, please try again")]
    EditConflict,
    #[error("invalid authentication credentials")]
    InvalidCredentials,
    #[error("invalid or missing authentication token")]
    InvalidAuthenticationToken,
    #[error("you must be authenticated to access this resource")]
    AuthenticationRequired,
    #[error("your user account must be activated to access this resource")]
    InactiveAccount,
    #[error("your user account doesn't have the necessary permissions to access this resource")]
    NotPermitted,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("the request took too long to process")]
    RequestTimeout,
    #[error("the server encountered a problem and could not process your request")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::EditConflict => StatusCode::CONFLICT,
            AppError::InvalidCredentials | AppError::InvalidAuthenticationToken => {
                StatusCode::UNAUTHORIZED
            }
            AppError::AuthenticationRequired
            | AppError::InactiveAccount
            | AppError::NotPermitted => StatusCode::FORBIDDEN,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Shorthand for a 422 carrying a single field failure.
    pub fn field(key: &str, message: &str) -> Self {
        let mut errors = ValidationErrors::new();
        errors.insert(key.to_string(), message.to_string());
        AppError::FailedValidation(errors)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AppError::NotFound,
            StoreError::EditConflict => AppError::EditConflict,
            other => AppError::Internal(other.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::FailedValidation(errors) => json!({ "error": errors }),
            AppError::Internal(e) => {
                // Detail stays in the logs.
                error!(error = ?e, "internal error");
                json!({ "error": self.to_string() })
            }
            _ => json!({ "error": self.to_string() }),
        };

        let mut res = (status, Json(body)).into_response();
        if matches!(self, AppError::InvalidAuthenticationToken) {
            res.headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        res
    }
}
