//! Project configuration read from `.clipforge/clipforge.toml`.
//!
//! Every field has a default, so an empty or missing file yields a working
//! configuration. Sections map onto the runtime types they configure:
//!
//! ```toml
//! [project]
//! name = "my-channel"
//!
//! [pipeline]
//! count = 5
//! style = "cinematic"
//! duration = 60
//! batch_size = 4
//! retry_failed = true
//! output_filename = "output.mp4"
//!
//! [retry]
//! backoff_unit_ms = 1000
//! attempt_timeout_secs = 300
//!
//! [retry.max_retries]
//! keyframe_generation = 3
//! image_generation = 3
//!
//! [consistency]
//! threshold = 0.8
//! regeneration_threshold = 0.85
//! feature_extraction = true
//!
//! [regeneration]
//! max_retries = 3
//!
//! [backend]
//! base_url = "http://localhost:8188"
//! api_key_env = "CLIPFORGE_API_KEY"
//! request_timeout_secs = 120
//!
//! [tracking]
//! file = "tracking/sessions.json"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::consistency::{ConsistencyConfig, DEFAULT_REGENERATION_THRESHOLD, DEFAULT_THRESHOLD};
use crate::orchestrator::PipelineDefaults;
use crate::orchestrator::retry::{RetryTable, default_max_retries};
use crate::regeneration::{DEFAULT_MAX_RETRIES, RegenerationConfig};
use crate::stage::StageName;

pub const CONFIG_FILE: &str = "clipforge.toml";
pub const BACKEND_URL_ENV: &str = "CLIPFORGE_BACKEND_URL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (optional, defaults to directory name)
    #[serde(default)]
    pub name: Option<String>,
}

/// Fallbacks for run parameters the caller leaves out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_count")]
    pub count: usize,
    #[serde(default = "default_style")]
    pub style: String,
    /// Target video length in seconds
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_true")]
    pub retry_failed: bool,
    #[serde(default = "default_output_filename")]
    pub output_filename: String,
}

fn default_count() -> usize {
    5
}

fn default_style() -> String {
    "cinematic".to_string()
}

fn default_duration() -> u32 {
    60
}

fn default_batch_size() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_output_filename() -> String {
    "output.mp4".to_string()
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            count: default_count(),
            style: default_style(),
            duration: default_duration(),
            batch_size: default_batch_size(),
            retry_failed: default_true(),
            output_filename: default_output_filename(),
        }
    }
}

impl PipelineSection {
    pub fn to_defaults(&self) -> PipelineDefaults {
        PipelineDefaults {
            count: self.count,
            style: self.style.clone(),
            duration: self.duration,
            batch_size: self.batch_size,
            retry_failed: self.retry_failed,
            output_filename: self.output_filename.clone(),
        }
    }
}

/// Stage-level retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    /// Backoff before retry `n` is `backoff_unit_ms * 2^n`
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
    /// Per-attempt deadline; 0 disables it
    #[serde(default = "default_attempt_timeout_secs")]
    pub attempt_timeout_secs: u64,
    /// Overrides keyed by stage name (e.g. `image_generation = 5`)
    #[serde(default)]
    pub max_retries: BTreeMap<String, u32>,
}

fn default_backoff_unit_ms() -> u64 {
    1000
}

fn default_attempt_timeout_secs() -> u64 {
    300
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            backoff_unit_ms: default_backoff_unit_ms(),
            attempt_timeout_secs: default_attempt_timeout_secs(),
            max_retries: BTreeMap::new(),
        }
    }
}

impl RetrySection {
    fn stage(name: &str) -> Option<StageName> {
        StageName::ALL
            .into_iter()
            .find(|s| s.as_str() == name && *s != StageName::Regeneration)
    }

    /// Build the retry table. Unknown stage names are skipped (see `validate`).
    pub fn to_table(&self) -> RetryTable {
        let mut table = RetryTable {
            backoff_unit: Duration::from_millis(self.backoff_unit_ms),
            attempt_timeout: (self.attempt_timeout_secs > 0)
                .then(|| Duration::from_secs(self.attempt_timeout_secs)),
            ..RetryTable::default()
        };
        for (name, retries) in &self.max_retries {
            if let Some(stage) = Self::stage(name) {
                table.max_retries.insert(stage, *retries);
            }
        }
        table
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        (self.attempt_timeout_secs > 0).then(|| Duration::from_secs(self.attempt_timeout_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencySection {
    /// Pass mark for the consistency stage
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Pass mark when rescoring regenerated artifacts
    #[serde(default = "default_regeneration_threshold")]
    pub regeneration_threshold: f64,
    /// Ask the backend for image features; falls back to prompt heuristics when off
    #[serde(default = "default_true")]
    pub feature_extraction: bool,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn default_regeneration_threshold() -> f64 {
    DEFAULT_REGENERATION_THRESHOLD
}

impl Default for ConsistencySection {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
            regeneration_threshold: default_regeneration_threshold(),
            feature_extraction: true,
        }
    }
}

impl ConsistencySection {
    pub fn to_config(&self) -> ConsistencyConfig {
        ConsistencyConfig {
            threshold: self.threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegenerationSection {
    /// Attempts per failing scene
    #[serde(default = "default_regeneration_retries")]
    pub max_retries: u32,
}

fn default_regeneration_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Default for RegenerationSection {
    fn default() -> Self {
        Self {
            max_retries: default_regeneration_retries(),
        }
    }
}

/// Remote service every collaborator talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the bearer token
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8188".to_string()
}

fn default_api_key_env() -> String {
    "CLIPFORGE_API_KEY".to_string()
}

fn default_request_timeout_secs() -> u64 {
    120
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl BackendSection {
    /// Base URL with the environment override applied.
    pub fn resolved_base_url(&self) -> String {
        std::env::var(BACKEND_URL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| self.base_url.clone())
    }

    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingSection {
    /// Tracking document, relative to `.clipforge/`
    #[serde(default = "default_tracking_file")]
    pub file: PathBuf,
}

fn default_tracking_file() -> PathBuf {
    PathBuf::from("tracking/sessions.json")
}

impl Default for TrackingSection {
    fn default() -> Self {
        Self {
            file: default_tracking_file(),
        }
    }
}

/// The complete clipforge.toml configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClipforgeToml {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub consistency: ConsistencySection,
    #[serde(default)]
    pub regeneration: RegenerationSection,
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub tracking: TrackingSection,
}

impl ClipforgeToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse clipforge.toml")
    }

    /// Load `clipforge.toml` from `clipforge_dir`, or defaults if it doesn't exist.
    pub fn load_or_default(clipforge_dir: &Path) -> Result<Self> {
        let config_path = clipforge_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize clipforge.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn regeneration_config(&self) -> RegenerationConfig {
        RegenerationConfig {
            max_retries: self.regeneration.max_retries,
            attempt_timeout: self.retry.attempt_timeout(),
        }
    }

    /// Validate the configuration and return any warnings.
    ///
    /// Values that would be rejected when the pipeline is built are
    /// reported here too, so `config validate` catches them early.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for (name, value) in [
            ("consistency.threshold", self.consistency.threshold),
            (
                "consistency.regeneration_threshold",
                self.consistency.regeneration_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                warnings.push(format!("{name} must be within [0, 1], got {value}"));
            }
        }
        if self.consistency.regeneration_threshold < self.consistency.threshold {
            warnings.push(format!(
                "consistency.regeneration_threshold ({}) is below consistency.threshold ({}); regenerated artifacts may pass more easily than originals",
                self.consistency.regeneration_threshold, self.consistency.threshold
            ));
        }

        if self.pipeline.batch_size == 0 {
            warnings.push("pipeline.batch_size must be at least 1".to_string());
        }
        if self.pipeline.count == 0 {
            warnings.push("pipeline.count must be at least 1".to_string());
        }
        if self.pipeline.duration == 0 {
            warnings.push("pipeline.duration must be at least 1".to_string());
        }
        if self.pipeline.output_filename.trim().is_empty() {
            warnings.push("pipeline.output_filename must not be empty".to_string());
        }

        for name in self.retry.max_retries.keys() {
            if RetrySection::stage(name).is_none() {
                warnings.push(format!(
                    "Unknown stage '{}' in [retry.max_retries]; expected one of: {}",
                    name,
                    known_stages().join(", ")
                ));
            }
        }

        if self.regeneration.max_retries == 0 {
            warnings.push(
                "regeneration.max_retries is 0; failed artifacts will never be regenerated"
                    .to_string(),
            );
        }

        if !self.backend.base_url.starts_with("http://")
            && !self.backend.base_url.starts_with("https://")
        {
            warnings.push(format!(
                "backend.base_url '{}' should start with http:// or https://",
                self.backend.base_url
            ));
        }
        if self.backend.request_timeout_secs == 0 {
            warnings.push("backend.request_timeout_secs must be at least 1".to_string());
        }

        warnings
    }
}

fn known_stages() -> Vec<&'static str> {
    StageName::ALL
        .into_iter()
        .filter(|s| *s != StageName::Regeneration)
        .map(|s| s.as_str())
        .collect()
}

/// Effective per-stage retry budget, for display.
pub fn effective_max_retries(table: &RetryTable) -> Vec<(StageName, u32)> {
    StageName::ALL
        .into_iter()
        .filter(|s| *s != StageName::Regeneration)
        .map(|s| {
            (
                s,
                table
                    .max_retries
                    .get(&s)
                    .copied()
                    .unwrap_or_else(|| default_max_retries(s)),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = ClipforgeToml::parse("").unwrap();
        assert_eq!(config.pipeline.count, 5);
        assert_eq!(config.pipeline.style, "cinematic");
        assert_eq!(config.consistency.threshold, 0.8);
        assert_eq!(config.consistency.regeneration_threshold, 0.85);
        assert_eq!(config.regeneration.max_retries, 3);
        assert_eq!(config.backend.api_key_env, "CLIPFORGE_API_KEY");
        assert_eq!(config.tracking.file, PathBuf::from("tracking/sessions.json"));
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = ClipforgeToml::parse(
            r#"
[pipeline]
style = "anime"

[retry]
backoff_unit_ms = 10

[retry.max_retries]
image_generation = 5
"#,
        )
        .unwrap();
        assert_eq!(config.pipeline.style, "anime");
        assert_eq!(config.pipeline.batch_size, 4);

        let table = config.retry.to_table();
        assert_eq!(table.backoff_unit, Duration::from_millis(10));
        assert_eq!(table.attempt_timeout, Some(Duration::from_secs(300)));
        assert_eq!(table.policy_for(StageName::ImageGeneration).max_retries, 5);
        assert_eq!(table.policy_for(StageName::Script).max_retries, 2);
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let config = ClipforgeToml::parse("[retry]\nattempt_timeout_secs = 0\n").unwrap();
        assert_eq!(config.retry.to_table().attempt_timeout, None);
        assert_eq!(config.regeneration_config().attempt_timeout, None);
    }

    #[test]
    fn test_validate_reports_bad_values() {
        let config = ClipforgeToml::parse(
            r#"
[consistency]
threshold = 1.5

[pipeline]
batch_size = 0

[retry.max_retries]
render = 2

[backend]
base_url = "localhost:8188"
"#,
        )
        .unwrap();
        let warnings = config.validate();
        assert!(warnings.iter().any(|w| w.contains("consistency.threshold")));
        assert!(warnings.iter().any(|w| w.contains("batch_size")));
        assert!(warnings.iter().any(|w| w.contains("Unknown stage 'render'")));
        assert!(warnings.iter().any(|w| w.contains("base_url")));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut config = ClipforgeToml::default();
        config.project.name = Some("aurora-channel".into());
        config.regeneration.max_retries = 1;
        let path = dir.path().join(CONFIG_FILE);
        config.save(&path).unwrap();

        let loaded = ClipforgeToml::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.project.name.as_deref(), Some("aurora-channel"));
        assert_eq!(loaded.regeneration.max_retries, 1);
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = TempDir::new().unwrap();
        let config = ClipforgeToml::load_or_default(dir.path()).unwrap();
        assert_eq!(config.pipeline.output_filename, "output.mp4");
    }

    #[test]
    fn test_effective_retries_cover_every_pipeline_stage() {
        let table = RetryTable::default();
        let retries = effective_max_retries(&table);
        assert_eq!(retries.len(), 7);
        assert!(retries.contains(&(StageName::KeyframeGeneration, 3)));
        assert!(retries.contains(&(StageName::Hotspot, 2)));
    }
}
