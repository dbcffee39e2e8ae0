//! Typed view of the caller's pipeline parameters.

use serde_json::{Map, Value, json};

use crate::errors::StageError;
use crate::stage::StageInput;
use crate::stages::fields;

/// Fallbacks for parameters the caller leaves out.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDefaults {
    pub count: usize,
    pub style: String,
    pub duration: u32,
    pub batch_size: usize,
    pub retry_failed: bool,
    pub output_filename: String,
}

impl Default for PipelineDefaults {
    fn default() -> Self {
        Self {
            count: 5,
            style: "cinematic".to_string(),
            duration: 60,
            batch_size: 4,
            retry_failed: true,
            output_filename: "output.mp4".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineParams {
    pub keywords: Vec<String>,
    pub count: usize,
    pub style: String,
    pub duration: u32,
    pub batch_size: usize,
    pub retry_failed: bool,
    pub output_filename: String,
}

fn wrong_type(field: &str, expected: &str, value: &Value) -> StageError {
    StageError::validation(field, format!("expected {expected}, got {value}"))
}

fn positive_int(map: &Map<String, Value>, field: &str) -> Result<Option<u64>, StageError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match value.as_u64() {
            Some(0) => Err(StageError::validation(field, "must be at least 1")),
            Some(n) => Ok(Some(n)),
            None => Err(wrong_type(field, "a positive integer", value)),
        },
    }
}

fn string(map: &Map<String, Value>, field: &str) -> Result<Option<String>, StageError> {
    match map.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => {
            Err(StageError::validation(field, "must not be empty"))
        }
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(other) => Err(wrong_type(field, "a string", other)),
    }
}

fn keywords(map: &Map<String, Value>) -> Result<Vec<String>, StageError> {
    let clean = |items: Vec<String>| -> Vec<String> {
        items
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect()
    };
    match map.get(fields::KEYWORDS) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::String(s)) => Ok(clean(s.split(',').map(str::to_string).collect())),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(wrong_type(fields::KEYWORDS, "an array of strings", other)),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(clean),
        Some(other) => Err(wrong_type(
            fields::KEYWORDS,
            "a comma-separated string or an array of strings",
            other,
        )),
    }
}

impl PipelineParams {
    /// Validate `map` and fill gaps from `defaults`. Unknown keys are ignored.
    pub fn from_map(map: &StageInput, defaults: &PipelineDefaults) -> Result<Self, StageError> {
        let retry_failed = match map.get("retryFailed") {
            None | Some(Value::Null) => defaults.retry_failed,
            Some(Value::Bool(b)) => *b,
            Some(other) => return Err(wrong_type("retryFailed", "a boolean", other)),
        };
        let duration = match positive_int(map, fields::DURATION)? {
            Some(n) => u32::try_from(n)
                .map_err(|_| StageError::validation(fields::DURATION, "is too large"))?,
            None => defaults.duration,
        };

        Ok(Self {
            keywords: keywords(map)?,
            count: positive_int(map, fields::COUNT)?.map_or(defaults.count, |n| n as usize),
            style: string(map, fields::STYLE)?.unwrap_or_else(|| defaults.style.clone()),
            duration,
            batch_size: positive_int(map, fields::BATCH_SIZE)?
                .map_or(defaults.batch_size, |n| n as usize),
            retry_failed,
            output_filename: string(map, fields::OUTPUT_FILENAME)?
                .unwrap_or_else(|| defaults.output_filename.clone()),
        })
    }

    /// Normalised parameters as recorded on the tracking session.
    pub fn to_map(&self) -> StageInput {
        let value = json!({
            "keywords": self.keywords,
            "count": self.count,
            "style": self.style,
            "duration": self.duration,
            "batchSize": self.batch_size,
            "retryFailed": self.retry_failed,
            "outputFilename": self.output_filename,
        });
        value.as_object().cloned().unwrap_or_default()
    }
}
