//! Error types for Bastion OS.

use thiserror::Error;

/// Result type alias using Bastion's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Bastion operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Authentication failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden (authenticated but not authorized)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An upstream provider (Supabase, Gemini) answered with an error status.
    #[error("{service} returned {status}: {message}")]
    Provider {
        service: String,
        status: u16,
        message: String,
    },

    /// Generation failed or returned an unusable response
    #[error("Inference error: {0}")]
    Inference(String),

    /// Object storage failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a provider error for the given upstream service.
    pub fn provider(service: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Error::Provider {
            service: service.into(),
            status,
            message: message.into(),
        }
    }

    /// True when the upstream provider rejected the request itself (4xx).
    pub fn is_provider_client_error(&self) -> bool {
        matches!(self, Error::Provider { status, .. } if (400..500).contains(status))
    }

    /// True when a database error is a unique-constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Error::Database(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("Client abc".to_string());
        assert_eq!(err.to_string(), "Not found: Client abc");
    }

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("name must not be empty".to_string());
        assert_eq!(err.to_string(), "Invalid input: name must not be empty");
    }

    #[test]
    fn test_error_display_conflict() {
        let err = Error::Conflict("slug taken".to_string());
        assert_eq!(err.to_string(), "Conflict: slug taken");
    }

    #[test]
    fn test_error_display_provider() {
        let err = Error::provider("Gemini", 400, "Unsupported MIME type");
        assert_eq!(err.to_string(), "Gemini returned 400: Unsupported MIME type");
    }

    #[test]
    fn test_provider_client_error_classification() {
        assert!(Error::provider("Gemini", 400, "bad").is_provider_client_error());
        assert!(Error::provider("Supabase Storage", 404, "missing").is_provider_client_error());
        assert!(!Error::provider("Gemini", 503, "overloaded").is_provider_client_error());
        assert!(!Error::Inference("empty".to_string()).is_provider_client_error());
    }

    #[test]
    fn test_unique_violation_false_for_non_database() {
        assert!(!Error::Conflict("x".to_string()).is_unique_violation());
        assert!(!Error::Database(sqlx::Error::RowNotFound).is_unique_violation());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
