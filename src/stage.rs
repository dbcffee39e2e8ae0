//! The stage abstraction shared by the orchestrator, the retry wrapper and
//! the regeneration controller.

use async_trait::async_trait;
use clipforge_common::StageResult;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::StageError;
use crate::tracking::TrackingStore;

/// Input handed to a stage: a JSON object of named fields.
pub type StageInput = Map<String, Value>;

/// Every stage the pipeline knows, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Hotspot,
    Script,
    Storyboard,
    KeyframeGeneration,
    ImageGeneration,
    ConsistencyCheck,
    Regeneration,
    Synthesis,
}

impl StageName {
    pub const ALL: [StageName; 8] = [
        StageName::Hotspot,
        StageName::Script,
        StageName::Storyboard,
        StageName::KeyframeGeneration,
        StageName::ImageGeneration,
        StageName::ConsistencyCheck,
        StageName::Regeneration,
        StageName::Synthesis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Hotspot => "hotspot",
            StageName::Script => "script",
            StageName::Storyboard => "storyboard",
            StageName::KeyframeGeneration => "keyframe_generation",
            StageName::ImageGeneration => "image_generation",
            StageName::ConsistencyCheck => "consistency_check",
            StageName::Regeneration => "regeneration",
            StageName::Synthesis => "synthesis",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            StageName::Hotspot => "Hotspot selection",
            StageName::Script => "Script writing",
            StageName::Storyboard => "Storyboard",
            StageName::KeyframeGeneration => "Keyframe generation",
            StageName::ImageGeneration => "Image generation",
            StageName::ConsistencyCheck => "Consistency check",
            StageName::Regeneration => "Regeneration",
            StageName::Synthesis => "Synthesis",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One step of the pipeline.
///
/// Implementations never panic on bad input: missing or malformed fields
/// come back as a failing [`StageResult`] with kind `validation`. The
/// tracker is the per-run store; stages record generated content and token
/// usage into it, while attempt records are written by the caller.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    async fn execute(&self, input: &StageInput, tracker: &mut TrackingStore) -> StageResult;
}

/// Deserialize a required input field.
pub fn require<T: DeserializeOwned>(input: &StageInput, field: &str) -> Result<T, StageError> {
    let value = input
        .get(field)
        .filter(|v| !v.is_null())
        .ok_or_else(|| StageError::validation(field, "field is required"))?;
    serde_json::from_value(value.clone())
        .map_err(|e| StageError::validation(field, format!("malformed value: {e}")))
}

/// Deserialize an optional input field; `null` counts as absent.
pub fn optional<T: DeserializeOwned>(
    input: &StageInput,
    field: &str,
) -> Result<Option<T>, StageError> {
    match input.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| StageError::validation(field, format!("malformed value: {e}"))),
    }
}

/// Builder for a stage's output object.
#[derive(Debug, Default)]
pub struct Output(Map<String, Value>);

impl Output {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Serialize>(mut self, field: &str, value: &T) -> Result<Self, StageError> {
        let value = serde_json::to_value(value).map_err(|e| StageError::MissingOutput {
            field: format!("{field} ({e})"),
        })?;
        self.0.insert(field.to_string(), value);
        Ok(self)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// Wrap a stage body's outcome into the result envelope.
pub fn finish(stage: StageName, outcome: Result<Output, StageError>) -> StageResult {
    match outcome {
        Ok(output) => StageResult::ok(output.into_map()),
        Err(e) => {
            tracing::warn!(stage = %stage, error = %e, "stage attempt failed");
            e.into_result(stage.as_str())
        }
    }
}
