//! Typed error hierarchy for the clipforge pipeline.
//!
//! Four enums cover the subsystems:
//! - `StageError`: failures inside a single stage attempt
//! - `TrackingError`: session bookkeeping and persistence failures
//! - `RegenerationError`: artifacts the regeneration controller cannot rebuild
//! - `ConfigError`: invalid configuration rejected at construction time

use clipforge_common::{BackendError, ErrorKind, StageResult};
use std::path::PathBuf;
use thiserror::Error;

use crate::tracking::SessionStatus;

/// Errors from one stage attempt. Converted into a failing
/// [`StageResult`] before they reach the orchestrator.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Invalid input field '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("Stage output is missing field '{field}'")]
    MissingOutput { field: String },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Attempt timed out after {seconds:.1}s")]
    Timeout { seconds: f64 },

    #[error("Stage panicked: {0}")]
    Panicked(String),
}

impl StageError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        StageError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::Validation { .. } | StageError::MissingOutput { .. } => {
                ErrorKind::Validation
            }
            StageError::Backend(_) => ErrorKind::ExternalService,
            StageError::Timeout { .. } => ErrorKind::Timeout,
            StageError::Panicked(_) => ErrorKind::Internal,
        }
    }

    /// Convert into the failing result envelope for `stage`.
    pub fn into_result(self, stage: &str) -> StageResult {
        StageResult::failure(stage, self.kind(), self.to_string())
    }
}

/// Errors from the tracking store.
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("No active tracking session")]
    NoActiveSession,

    #[error("Tracking session {id} not found")]
    SessionNotFound { id: String },

    #[error("Session {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: SessionStatus,
        to: SessionStatus,
    },

    #[error("Tracking file error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to (de)serialize tracking document: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Reasons an artifact cannot be regenerated. Reported per scene.
#[derive(Debug, Error)]
pub enum RegenerationError {
    #[error("No original shot spec for artifact {shot_id} in scene {scene_id}")]
    MissingShot { shot_id: String, scene_id: String },
}

/// Invalid configuration values, rejected when a component is built.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_error_kinds_map_to_taxonomy() {
        assert_eq!(
            StageError::validation("count", "must be positive").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            StageError::MissingOutput {
                field: "script".into()
            }
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            StageError::Timeout { seconds: 2.0 }.kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            StageError::Panicked("boom".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn stage_error_converts_from_backend_error() {
        let backend = BackendError::Transport {
            service: "llm".into(),
            message: "connection refused".into(),
        };
        let err: StageError = backend.into();
        assert_eq!(err.kind(), ErrorKind::ExternalService);
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn stage_error_into_result_carries_stage_and_message() {
        let result = StageError::Timeout { seconds: 1.5 }.into_result("image_generation");
        assert!(!result.success);
        let details = result.error_details.as_ref().unwrap();
        assert_eq!(details.stage, "image_generation");
        assert_eq!(details.kind, ErrorKind::Timeout);
        assert!(result.error_message().contains("1.5"));
    }

    #[test]
    fn tracking_error_invalid_transition_names_states() {
        let err = TrackingError::InvalidTransition {
            id: "s1".into(),
            from: SessionStatus::Completed,
            to: SessionStatus::Failed,
        };
        let msg = err.to_string();
        assert!(msg.contains("completed"));
        assert!(msg.contains("failed"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&StageError::Panicked("x".into()));
        assert_std_error(&TrackingError::NoActiveSession);
        assert_std_error(&RegenerationError::MissingShot {
            shot_id: "a".into(),
            scene_id: "b".into(),
        });
        assert_std_error(&ConfigError::invalid("threshold", "out of range"));
    }
}
