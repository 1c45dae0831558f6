use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Credential failures. The HTTP body never says which one happened beyond
/// "missing" vs "invalid".
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("API key required")]
    MissingKey,

    #[error("Invalid API key")]
    InvalidKey,

    /// The key store could not be read. Treated as unauthenticated.
    #[error("API key lookup failed")]
    ServerError,

    #[error("Admin session required")]
    MissingToken,

    #[error("Invalid admin session")]
    InvalidToken,
}

impl AuthError {
    fn public_message(&self) -> &'static str {
        match self {
            AuthError::MissingKey => "API key required",
            AuthError::InvalidKey | AuthError::ServerError => "Invalid API key",
            AuthError::MissingToken => "Admin session required",
            AuthError::InvalidToken => "Invalid admin session",
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Could not allocate a unique short id after {attempts} attempts")]
    IdAllocationExhausted { attempts: usize },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }

    /// Stable machine-readable kind carried in every error body.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::Auth(_) => "unauthorized",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::IdAllocationExhausted { .. }
            | AppError::Database(_)
            | AppError::Internal(_) => "internal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::IdAllocationExhausted { .. }
            | AppError::Database(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Maps a failed write: unique-constraint violations become conflicts,
    /// everything else stays a database error.
    pub fn from_write(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(format!("duplicate value ({})", db_err.message()))
            }
            _ => AppError::Database(err),
        }
    }
}

/// True when `err` is a unique-constraint violation naming `column`.
pub fn is_unique_violation_on(err: &sqlx::Error, column: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.is_unique_violation() && db_err.message().contains(column)
        }
        _ => false,
    }
}

// Convert AppError to an HTTP response
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, fields) = match &self {
            AppError::Validation(fields) => (self.to_string(), Some(fields.clone())),
            AppError::Auth(auth) => {
                tracing::debug!(reason = ?auth, "Rejected credentials");
                (auth.public_message().to_string(), None)
            }
            AppError::NotFound(_) | AppError::Conflict(_) => (self.to_string(), None),
            AppError::IdAllocationExhausted { .. } | AppError::Database(_) | AppError::Internal(_) => {
                tracing::error!(error = ?self, "Request failed");
                ("Internal server error".to_string(), None)
            }
        };

        let body = Json(ErrorResponse {
            error: self.kind().to_string(),
            message,
            fields,
        });

        (status, body).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::validation("body", rejection.body_text())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::validation("senderName", "required").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::Auth(AuthError::InvalidKey).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::NotFound("Shipment".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("status".into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::IdAllocationExhausted { attempts: 5 }.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_auth_failures_share_generic_message() {
        assert_eq!(AuthError::InvalidKey.public_message(), "Invalid API key");
        assert_eq!(AuthError::ServerError.public_message(), "Invalid API key");
        assert_eq!(AppError::Auth(AuthError::ServerError).kind(), "unauthorized");
    }

    #[tokio::test]
    async fn test_validation_body_lists_fields() {
        let response = AppError::Validation(vec![
            FieldError::new("senderEmail", "must be a valid email address"),
            FieldError::new("devices", "at least one device is required"),
        ])
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "validation");
        assert_eq!(body.fields.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_internal_errors_are_not_exposed() {
        let response = AppError::Internal("pool exploded at 0x1234".into()).into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error, "internal");
        assert_eq!(body.message, "Internal server error");
    }
}
