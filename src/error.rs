use std::collections::BTreeMap;
use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::storage::StoreError;

/// Key used for errors that do not belong to a single field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Validation messages keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn first_message(&self) -> Option<&str> {
        self.0
            .values()
            .flat_map(|messages| messages.iter())
            .map(String::as_str)
            .next()
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    // Auth errors
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("You do not have permission to perform this action")]
    PermissionDenied,

    // Device errors
    #[error("Device not found")]
    DeviceNotFound,

    // Validation errors
    #[error("Validation error: {0}")]
    Validation(FieldErrors),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // JWT errors
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    // Internal errors
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn field(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation(FieldErrors::single(field, message))
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { field, message } => AppError::field(field, message),
            StoreError::OutOfRange { field, message } => AppError::field(field, message),
            StoreError::NotFound => AppError::DeviceNotFound,
            StoreError::Database(e) => AppError::Database(e),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            // 400 Bad Request
            AppError::Validation(errors) => {
                let message = errors.first_message().unwrap_or("Invalid input");
                let body = Json(json!({
                    "error": message,
                    "fields": errors,
                }));
                return (StatusCode::BAD_REQUEST, body).into_response();
            }

            // 401 Unauthorized
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::TokenExpired => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            AppError::Jwt(_) => (StatusCode::UNAUTHORIZED, "Invalid token".to_string()),

            // 403 Forbidden
            AppError::PermissionDenied => (StatusCode::FORBIDDEN, self.to_string()),

            // 404 Not Found
            AppError::DeviceNotFound => (StatusCode::NOT_FOUND, self.to_string()),

            // 500 Internal Server Error
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_keep_insertion_per_field() {
        let mut errors = FieldErrors::new();
        errors.add("registration_id", "This field is required.");
        errors.add("active", "Must be a valid boolean.");
        errors.add("registration_id", "second");

        assert_eq!(
            errors.get("registration_id").unwrap(),
            &["This field is required.".to_string(), "second".to_string()]
        );
        assert_eq!(errors.first_message(), Some("Must be a valid boolean."));
    }

    #[test]
    fn validation_error_is_bad_request() {
        let response = AppError::field("registration_id", "This field must be unique.").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_conflict_maps_to_field_error() {
        let err: AppError = StoreError::Conflict {
            field: "registration_id",
            message: "This field must be unique.",
        }
        .into();

        match err {
            AppError::Validation(errors) => assert_eq!(
                errors.get("registration_id").unwrap(),
                &["This field must be unique.".to_string()]
            ),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn not_found_and_forbidden_statuses() {
        assert_eq!(
            AppError::DeviceNotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::PermissionDenied.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
