use std::collections::BTreeMap;

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Key used for errors that are not attached to a single payload field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Field name to list of messages, rendered as the body of a 400 response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Returns `Err(ApiError::Validation)` if any error was collected.
    pub fn into_result(self) -> Result<(), ApiError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self))
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(FieldErrors),

    #[error("Not found")]
    NotFound,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

impl ApiError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.add(field, message);
        ApiError::Validation(errors)
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::field(NON_FIELD_ERRORS, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Validation(errors) => {
                (status, Json(serde_json::json!({ "errors": errors }))).into_response()
            }
            ApiError::NotFound => {
                (status, Json(serde_json::json!({ "detail": "Not found." }))).into_response()
            }
            ApiError::Forbidden(detail) => {
                (status, Json(serde_json::json!({ "detail": detail }))).into_response()
            }
            ApiError::Unauthorized(detail) => (
                status,
                [(header::WWW_AUTHENTICATE, "Bearer")],
                Json(serde_json::json!({ "detail": detail })),
            )
                .into_response(),
            ApiError::Database(err) => {
                tracing::error!(error = %err, "database error");
                (
                    status,
                    Json(serde_json::json!({ "detail": "Internal server error." })),
                )
                    .into_response()
            }
        }
    }
}

/// Name of the unique constraint violated by `err`, if that is what happened.
pub fn unique_violation(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Some(db.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_accumulate_per_field() {
        let mut errors = FieldErrors::new();
        errors.add("name", "This field is required.");
        errors.add("name", "Ensure this field has no more than 128 characters.");
        errors.add("role", "\"owner\" is not a valid choice.");

        assert_eq!(errors.get("name").map(<[String]>::len), Some(2));
        assert_eq!(errors.get("role").map(<[String]>::len), Some(1));
        assert!(errors.get("description").is_none());
    }

    #[test]
    fn empty_field_errors_pass() {
        assert!(FieldErrors::new().into_result().is_ok());
    }

    #[test]
    fn status_codes_follow_rest_conventions() {
        assert_eq!(
            ApiError::invariant("dup").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::forbidden("no").status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::Unauthorized("missing".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Database(sqlx::Error::RowNotFound).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn validation_body_is_keyed_by_field() {
        let errors = match ApiError::invariant("Contact ID 1 has primary phone already.") {
            ApiError::Validation(errors) => errors,
            other => panic!("unexpected {other:?}"),
        };
        let body = serde_json::to_value(&errors).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "non_field_errors": ["Contact ID 1 has primary phone already."]
            })
        );
    }
}
