//! Error types for the library server

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Business rule or input violation (unavailable book, double return, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization failure or deadlock in a borrow/return transaction
    #[error("Transaction conflict: {0}")]
    TransientConflict(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// `<Entity> with ID <id> not found`
    pub fn not_found(entity: &str, id: i32) -> Self {
        AppError::NotFound(format!("{} with ID {} not found", entity, id))
    }

    pub fn book_not_available() -> Self {
        AppError::Validation("Book is not available for borrowing".to_string())
    }

    pub fn already_borrowed() -> Self {
        AppError::Validation("User already has this book borrowed".to_string())
    }

    pub fn already_returned() -> Self {
        AppError::Validation("Book has already been returned".to_string())
    }

    /// Whether the failed operation may succeed if simply run again
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::TransientConflict(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Authentication(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TransientConflict(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status_code: u16,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            AppError::Authentication(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Conflict(msg) => msg,
            AppError::TransientConflict(msg) => {
                tracing::warn!("Giving up after repeated transaction conflicts: {}", msg);
                "The library is busy, please retry".to_string()
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
        };

        let body = Json(ErrorResponse {
            status_code: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
        });

        (status, body).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db) = err {
            if let Some(mapped) = classify_pg_error(db.code().as_deref(), db.constraint(), db.message()) {
                return mapped;
            }
        }
        AppError::Database(err)
    }
}

/// Map Postgres SQLSTATE codes with a business meaning onto error kinds
fn classify_pg_error(code: Option<&str>, constraint: Option<&str>, message: &str) -> Option<AppError> {
    match (code?, constraint) {
        // serialization_failure, deadlock_detected
        ("40001" | "40P01", _) => Some(AppError::TransientConflict(message.to_string())),
        ("23505", Some("borrows_one_open_per_user_book")) => Some(AppError::already_borrowed()),
        ("23505", Some("books_isbn_key")) => {
            Some(AppError::Conflict("Book with this ISBN already exists".to_string()))
        }
        ("23505", Some("users_email_key")) => {
            Some(AppError::Conflict("User with this email already exists".to_string()))
        }
        ("23514", Some("books_available_range")) => Some(AppError::book_not_available()),
        _ => None,
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => msg.to_string(),
                    None => format!("{} is invalid", field),
                })
            })
            .collect();
        messages.sort();
        AppError::Validation(messages.join(", "))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 2, message = "name must be at least 2 characters"))]
        name: String,
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::Authentication("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::TransientConflict("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_only_transaction_conflicts_are_transient() {
        assert!(AppError::TransientConflict("40001".into()).is_transient());
        assert!(!AppError::Validation("Book is not available for borrowing".into()).is_transient());
        assert!(!AppError::NotFound("Book with ID 1 not found".into()).is_transient());
    }

    #[test]
    fn test_pg_error_classification() {
        assert!(classify_pg_error(Some("40001"), None, "could not serialize access")
            .unwrap()
            .is_transient());
        assert!(classify_pg_error(Some("40P01"), None, "deadlock detected")
            .unwrap()
            .is_transient());

        match classify_pg_error(Some("23505"), Some("borrows_one_open_per_user_book"), "dup") {
            Some(AppError::Validation(msg)) => assert_eq!(msg, "User already has this book borrowed"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            classify_pg_error(Some("23505"), Some("users_email_key"), "dup"),
            Some(AppError::Conflict(_))
        ));
        assert!(classify_pg_error(Some("23505"), Some("other_key"), "dup").is_none());
        assert!(classify_pg_error(None, None, "no code").is_none());
    }

    #[test]
    fn test_not_found_message() {
        match AppError::not_found("Author", 42) {
            AppError::NotFound(msg) => assert_eq!(msg, "Author with ID 42 not found"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_validation_errors_keep_messages() {
        let err: AppError = Sample { name: "a".into() }.validate().unwrap_err().into();
        match err {
            AppError::Validation(msg) => assert_eq!(msg, "name must be at least 2 characters"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
