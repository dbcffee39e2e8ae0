//! The universal stage return value.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorKind;

/// Structured context attached to a failing [`StageResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    /// Stage the failure originated in.
    pub stage: String,
    pub kind: ErrorKind,
    pub timestamp: DateTime<Utc>,
}

/// Result envelope returned by every stage and by the retry wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,
}

impl StageResult {
    pub fn ok(data: Map<String, Value>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            error_details: None,
        }
    }

    pub fn failure(stage: &str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            error_details: Some(ErrorDetails {
                stage: stage.to_string(),
                kind,
                timestamp: Utc::now(),
            }),
        }
    }

    /// Kind of the failure, `None` for successful results.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_details.as_ref().map(|d| d.kind)
    }

    /// Whether another attempt could change the outcome.
    pub fn is_retryable(&self) -> bool {
        !self.success && self.error_kind().is_none_or(|k| k.is_retryable())
    }

    /// Raw value of a data field.
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|d| d.get(field))
    }

    /// Decode a data field into a typed record.
    pub fn field<T: DeserializeOwned>(&self, field: &str) -> Option<T> {
        self.value(field)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown error")
    }
}
