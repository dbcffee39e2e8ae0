use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification carried in [`crate::ErrorDetails`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or malformed input. Fatal, never retried.
    Validation,
    /// A backend call failed or returned a non-success status.
    ExternalService,
    /// An attempt exceeded its deadline.
    Timeout,
    /// Anything else, including a panicking stage body.
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::ExternalService => "external_service",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Internal => "internal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorKind::Validation)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors returned by collaborator backends.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{service} returned HTTP {status}: {message}")]
    Http {
        service: String,
        status: u16,
        message: String,
    },

    #[error("{service} request failed: {message}")]
    Transport { service: String, message: String },

    #[error("{service} returned an invalid response: {message}")]
    InvalidResponse { service: String, message: String },

    #[error("{service} rejected the request: {message}")]
    Rejected { service: String, message: String },
}

impl BackendError {
    pub fn service(&self) -> &str {
        match self {
            BackendError::Http { service, .. }
            | BackendError::Transport { service, .. }
            | BackendError::InvalidResponse { service, .. }
            | BackendError::Rejected { service, .. } => service,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_is_not_retryable() {
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(ErrorKind::ExternalService.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
    }

    #[test]
    fn test_backend_error_carries_service() {
        let err = BackendError::Http {
            service: "image".into(),
            status: 503,
            message: "overloaded".into(),
        };
        assert_eq!(err.service(), "image");
        assert!(err.to_string().contains("503"));
    }
}
