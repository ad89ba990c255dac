use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Credentials missing or rejected while anonymous access is disabled.
    /// Carries the realm announced in the challenge header.
    #[error("Basic authentication is required")]
    AuthenticationRequired(String),

    /// Resource not found error.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed or incomplete request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Invalid input for an administrative operation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive error.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    Xml(#[from] roxmltree::Error),

    /// Document serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::AuthenticationRequired(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<quick_xml::se::SeError> for AppError {
    fn from(e: quick_xml::se::SeError) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl From<quick_xml::de::DeError> for AppError {
    fn from(e: quick_xml::de::DeError) -> Self {
        AppError::Serialization(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request error");
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        match self {
            AppError::AuthenticationRequired(realm) => {
                let challenge = format!("Basic realm=\"{}\", charset=\"UTF-8\"", realm);
                (
                    status,
                    [(header::WWW_AUTHENTICATE, challenge)],
                    "Basic authentication is required",
                )
                    .into_response()
            }
            other => (status, other.to_string()).into_response(),
        }
    }
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, AppError>;
