//! Per-run telemetry: stage executions, token usage, generated content,
//! file locations and errors, persisted as one JSON document.

use chrono::{DateTime, Utc};
use clipforge_common::{ErrorKind, TokenUsage};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub mod store;
pub mod summary;

pub use store::TrackingStore;
pub use summary::{AllSessionsSummary, SessionSummary};

/// Lifecycle of a tracking session. Only `Running` may transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One attempt of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageExecution {
    pub timestamp: DateTime<Utc>,
    pub attempt: u32,
    pub success: bool,
    #[serde(default)]
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_seconds: f64,
}

impl StageExecution {
    pub fn new(attempt: u32, success: bool, input: Value, duration_seconds: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            attempt,
            success,
            input,
            output: None,
            error: None,
            duration_seconds,
        }
    }

    pub fn with_output(mut self, output: Option<Value>) -> Self {
        self.output = output;
        self
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsageRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedContent {
    pub timestamp: DateTime<Utc>,
    pub content_type: String,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileLocation {
    pub timestamp: DateTime<Utc>,
    pub file_type: String,
    pub path: String,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stage: None,
            kind: None,
            message: message.into(),
            details: None,
        }
    }

    pub fn for_stage(stage: &str, kind: Option<ErrorKind>, message: impl Into<String>) -> Self {
        Self {
            stage: Some(stage.to_string()),
            kind,
            ..Self::new(message)
        }
    }
}

/// Everything recorded for one end-to-end pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedSession {
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    #[serde(default)]
    pub input_params: Map<String, Value>,
    /// Stage name → every recorded attempt.
    #[serde(default)]
    pub agents: BTreeMap<String, Vec<StageExecution>>,
    /// Model name → usage records.
    #[serde(default)]
    pub token_usage: BTreeMap<String, Vec<TokenUsageRecord>>,
    /// Stage name → accumulated seconds.
    #[serde(default)]
    pub time_tracking: BTreeMap<String, f64>,
    #[serde(default)]
    pub generated_content: Vec<GeneratedContent>,
    #[serde(default)]
    pub file_locations: Vec<FileLocation>,
    #[serde(default)]
    pub errors: Vec<ErrorRecord>,
    #[serde(default)]
    pub total_duration_seconds: Option<f64>,
    #[serde(default)]
    pub final_result: Option<Value>,
}

impl TrackedSession {
    pub fn new(input_params: Map<String, Value>) -> Self {
        Self {
            start_time: Utc::now(),
            end_time: None,
            status: SessionStatus::Running,
            input_params,
            agents: BTreeMap::new(),
            token_usage: BTreeMap::new(),
            time_tracking: BTreeMap::new(),
            generated_content: Vec::new(),
            file_locations: Vec::new(),
            errors: Vec::new(),
            total_duration_seconds: None,
            final_result: None,
        }
    }

    /// Move to a terminal status and stamp the end time.
    ///
    /// Returns the current status as the error when the session is already sealed.
    pub fn seal(&mut self, status: SessionStatus) -> Result<(), SessionStatus> {
        if self.status.is_terminal() {
            return Err(self.status);
        }
        let end = Utc::now();
        self.end_time = Some(end);
        self.total_duration_seconds =
            Some((end - self.start_time).num_milliseconds() as f64 / 1000.0);
        self.status = status;
        Ok(())
    }
}

/// On-disk tracking document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingDocument {
    pub last_updated: DateTime<Utc>,
    pub total_sessions: usize,
    #[serde(default)]
    pub sessions: BTreeMap<String, TrackedSession>,
}

impl TrackingDocument {
    pub fn new(sessions: BTreeMap<String, TrackedSession>) -> Self {
        Self {
            last_updated: Utc::now(),
            total_sessions: sessions.len(),
            sessions,
        }
    }
}
