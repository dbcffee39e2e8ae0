//! Contracts for the external services the pipeline drives.
//!
//! The pipeline never talks to an LLM, a diffusion service or a muxer
//! directly. Each is reached through one of these traits so stages stay
//! testable and backends stay swappable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::artifact::{Artifact, ShotSpec};
use crate::error::BackendError;

/// A trending topic selected as source material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotspot {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub heat: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One scene of a generated script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptScene {
    pub scene_id: String,
    #[serde(default)]
    pub narration: String,
    /// What the scene shows, used to build shot prompts.
    pub visual: String,
    #[serde(default)]
    pub duration_seconds: f64,
}

/// A generated video script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub title: String,
    pub scenes: Vec<ScriptScene>,
}

impl Script {
    pub fn narration(&self) -> String {
        self.scenes
            .iter()
            .map(|s| s.narration.trim())
            .filter(|n| !n.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Token accounting reported by a text model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Text returned by a [`TextModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub text: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Location of a rendered image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    #[serde(alias = "path")]
    pub url: String,
}

/// Visual features of one image, as reported by a [`FeatureExtractor`].
///
/// Every signal is optional. Missing signals are left out of the weighted
/// comparison rather than scored as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageFeatures {
    #[serde(default)]
    pub color_histogram: Option<Vec<f64>>,
    #[serde(default)]
    pub style_vector: Option<Vec<f64>>,
    /// Visual centre of mass, normalised to the unit square.
    #[serde(default)]
    pub composition: Option<[f64; 2]>,
    #[serde(default)]
    pub texture: Option<Vec<f64>>,
    /// Tone distribution histogram.
    #[serde(default)]
    pub lighting: Option<Vec<f64>>,
    /// Global contrast in `[0, 1]`.
    #[serde(default)]
    pub contrast: Option<f64>,
    /// Edge orientation histogram.
    #[serde(default)]
    pub edges: Option<Vec<f64>>,
    /// Labels of characters detected in the image.
    #[serde(default)]
    pub characters: Option<Vec<String>>,
}

/// Outcome of a feature extraction call.
///
/// `Unavailable` is an expected outcome, not an error: the consistency
/// engine switches to prompt heuristics when it sees one.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureOutcome {
    Extracted(ImageFeatures),
    Unavailable { reason: String },
}

/// Everything the synthesizer needs to compose the final video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisRequest {
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub narration: String,
    pub output_filename: String,
    pub duration_seconds: u32,
}

#[async_trait]
pub trait HotspotSource: Send + Sync {
    async fn fetch(&self, keywords: &[String], count: usize) -> Result<Vec<Hotspot>, BackendError>;
}

#[async_trait]
pub trait TextModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<Completion, BackendError>;
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(&self, shot: &ShotSpec) -> Result<GeneratedImage, BackendError>;
}

#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    async fn extract(&self, image_url: &str) -> FeatureOutcome;
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Compose the video and return its path.
    async fn compose(&self, request: &SynthesisRequest) -> Result<String, BackendError>;
}
