//! Multi-dimensional consistency scoring for a batch of generated artifacts.
//!
//! The engine scores four dimensions over the whole batch:
//! - style, from image features or prompt keywords
//! - character continuity, from detected characters or person mentions
//! - scene cohesion and cross-scene transitions
//! - per-artifact generation quality
//!
//! Each artifact's score is the mean of the three batch-level scores and its
//! own quality score. Artifacts at or above the threshold pass.

pub mod character;
pub mod keywords;
pub mod metrics;
pub mod quality;
pub mod scene;
pub mod style;

use std::sync::Arc;

use clipforge_common::{
    AnalysisMode, Artifact, ConsistencyReport, Dimensions, FeatureExtractor, FeatureOutcome,
    ImageFeatures, ShotSpec,
};
use futures::future::join_all;

use crate::errors::ConfigError;

pub const DEFAULT_THRESHOLD: f64 = 0.8;
pub const DEFAULT_REGENERATION_THRESHOLD: f64 = 0.85;

#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencyConfig {
    /// Minimum per-artifact score to pass.
    pub threshold: f64,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl ConsistencyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::invalid(
                "consistency.threshold",
                format!("{} is outside [0, 1]", self.threshold),
            ));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct ConsistencyEngine {
    config: ConsistencyConfig,
    extractor: Option<Arc<dyn FeatureExtractor>>,
}

impl std::fmt::Debug for ConsistencyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistencyEngine")
            .field("config", &self.config)
            .field("extractor", &self.extractor.is_some())
            .finish()
    }
}

impl ConsistencyEngine {
    pub fn new(
        config: ConsistencyConfig,
        extractor: Option<Arc<dyn FeatureExtractor>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, extractor })
    }

    /// Same engine with a different pass threshold.
    pub fn with_threshold(&self, threshold: f64) -> Result<Self, ConfigError> {
        Self::new(ConsistencyConfig { threshold }, self.extractor.clone())
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    /// Score `artifacts`, write each artifact's score, and partition them.
    ///
    /// `storyboard`, when given, enables cross-scene transition scoring.
    pub async fn evaluate(
        &self,
        artifacts: &mut [Artifact],
        storyboard: Option<&[ShotSpec]>,
    ) -> ConsistencyReport {
        if artifacts.is_empty() {
            return ConsistencyReport::degenerate(self.config.threshold);
        }

        let features = self.extract_features(artifacts).await;
        let mode = if features.is_some() {
            AnalysisMode::Features
        } else {
            AnalysisMode::Heuristic
        };

        let (style_consistency, character_consistency) = match &features {
            Some(features) => {
                let pairs: Vec<(&str, &ImageFeatures)> =
                    features.iter().map(|(id, f)| (id.as_str(), f)).collect();
                let counts: Vec<(&str, usize)> = features
                    .iter()
                    .map(|(id, f)| (id.as_str(), f.characters.as_ref().map_or(0, Vec::len)))
                    .collect();
                (
                    style::score_features(&pairs),
                    character::score_counts(&counts, "detected characters"),
                )
            }
            None => {
                let prompts: Vec<&str> = artifacts.iter().map(|a| a.prompt.as_str()).collect();
                let counts: Vec<(&str, usize)> = artifacts
                    .iter()
                    .map(|a| {
                        (
                            a.shot_id.as_str(),
                            usize::from(keywords::mentions_person(&a.prompt)),
                        )
                    })
                    .collect();
                (
                    style::score_prompts(&prompts),
                    character::score_counts(&counts, "person mentions"),
                )
            }
        };
        let scene_consistency = scene::score(artifacts, storyboard);
        let quality_check = quality::score(artifacts);

        for artifact in artifacts.iter_mut() {
            let score = (style_consistency.score
                + character_consistency.score
                + scene_consistency.score
                + quality::artifact_quality(artifact))
                / 4.0;
            artifact.consistency_score = Some(score.clamp(0.0, 1.0));
        }

        let dimensions = Dimensions {
            style_consistency,
            character_consistency,
            scene_consistency,
            quality_check,
        };
        let (passed_artifacts, failed_artifacts) =
            partition_by_threshold(artifacts, self.config.threshold);
        let pass_rate = passed_artifacts.len() as f64 / artifacts.len() as f64;
        let overall_score = dimensions.mean_score();

        tracing::debug!(
            mode = ?mode,
            overall_score,
            passed = passed_artifacts.len(),
            failed = failed_artifacts.len(),
            threshold = self.config.threshold,
            "consistency evaluated"
        );

        ConsistencyReport {
            dimensions,
            overall_score,
            passed_artifacts,
            failed_artifacts,
            pass_rate,
            threshold: self.config.threshold,
            mode,
        }
    }

    /// Features for every rendered artifact, or `None` when the batch must
    /// fall back to prompt heuristics.
    async fn extract_features(&self, artifacts: &[Artifact]) -> Option<Vec<(String, ImageFeatures)>> {
        let extractor = self.extractor.as_ref()?;
        let rendered: Vec<&Artifact> = artifacts
            .iter()
            .filter(|a| a.success && a.has_location())
            .collect();
        if rendered.is_empty() {
            return None;
        }

        let outcomes = join_all(rendered.iter().map(|a| {
            let url = a.url.as_deref().unwrap_or_default();
            extractor.extract(url)
        }))
        .await;

        let mut features = Vec::with_capacity(outcomes.len());
        for (artifact, outcome) in rendered.iter().zip(outcomes) {
            match outcome {
                FeatureOutcome::Extracted(f) => features.push((artifact.shot_id.clone(), f)),
                FeatureOutcome::Unavailable { reason } => {
                    tracing::warn!(
                        shot_id = %artifact.shot_id,
                        reason = %reason,
                        "feature extraction unavailable, using prompt heuristics for batch"
                    );
                    return None;
                }
            }
        }
        Some(features)
    }
}

/// Split scored artifacts into `(passed, failed)` preserving input order.
/// Unscored artifacts fail.
pub fn partition_by_threshold(artifacts: &[Artifact], threshold: f64) -> (Vec<Artifact>, Vec<Artifact>) {
    artifacts.iter().cloned().partition(|a| a.meets(threshold))
}
