//! Keyframe and full image generation through a [`GenerationBackend`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use clipforge_common::{Artifact, BackendError, GenerationBackend, ShotSpec, StageResult};
use futures::stream::{self, StreamExt};

use super::fields;
use crate::errors::{ConfigError, StageError};
use crate::stage::{Output, Stage, StageInput, StageName, finish, optional, require};
use crate::tracking::TrackingStore;

pub const DEFAULT_BATCH_SIZE: usize = 4;

/// Render every shot, at most `batch_size` at a time, in storyboard order.
/// A failed render becomes a failed artifact rather than an error.
async fn render_shots(
    backend: &dyn GenerationBackend,
    shots: &[ShotSpec],
    batch_size: usize,
) -> Vec<Artifact> {
    stream::iter(shots.iter().cloned())
        .map(|shot| render_one(backend, shot))
        .buffered(batch_size.max(1))
        .collect()
        .await
}

async fn render_one(backend: &dyn GenerationBackend, shot: ShotSpec) -> Artifact {
    match backend.generate(&shot).await {
        Ok(image) => Artifact::generated(&shot, image.url),
        Err(e) => {
            tracing::warn!(shot_id = %shot.shot_id, error = %e, "shot render failed");
            Artifact::failed(&shot, e.to_string())
        }
    }
}

fn all_failed(artifacts: &[Artifact]) -> Option<BackendError> {
    if artifacts.iter().any(|a| a.success) {
        return None;
    }
    let first = artifacts
        .iter()
        .find_map(|a| a.error.clone())
        .unwrap_or_else(|| "no shots rendered".into());
    Some(BackendError::Rejected {
        service: "generation".into(),
        message: format!("all {} renders failed, first error: {first}", artifacts.len()),
    })
}

/// Renders the opening shot of every scene. Later shots of the scene use the
/// keyframe as their reference image.
pub struct KeyframeStage {
    backend: Arc<dyn GenerationBackend>,
}

impl KeyframeStage {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    async fn run(&self, input: &StageInput) -> Result<Output, StageError> {
        let storyboard: Vec<ShotSpec> = require(input, fields::STORYBOARD)?;
        if storyboard.is_empty() {
            return Err(StageError::validation(fields::STORYBOARD, "storyboard is empty"));
        }

        let mut openers: Vec<ShotSpec> = Vec::new();
        for shot in &storyboard {
            if !openers.iter().any(|s| s.scene_id == shot.scene_id) {
                openers.push(shot.clone());
            }
        }

        let keyframes = render_shots(self.backend.as_ref(), &openers, openers.len()).await;
        if let Some(failed) = keyframes.iter().find(|k| !k.success) {
            return Err(BackendError::Rejected {
                service: "generation".into(),
                message: format!(
                    "keyframe for scene {} failed: {}",
                    failed.scene_id,
                    failed.error.as_deref().unwrap_or("unknown error")
                ),
            }
            .into());
        }
        tracing::info!(keyframes = keyframes.len(), "keyframes rendered");
        Output::new().with(fields::KEYFRAMES, &keyframes)
    }
}

#[async_trait]
impl Stage for KeyframeStage {
    fn name(&self) -> StageName {
        StageName::KeyframeGeneration
    }

    async fn execute(&self, input: &StageInput, _tracker: &mut TrackingStore) -> StageResult {
        finish(self.name(), self.run(input).await)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageGenerationConfig {
    /// Concurrent renders per batch.
    pub batch_size: usize,
}

impl Default for ImageGenerationConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Renders every storyboard shot anchored on its scene keyframe.
///
/// Succeeds when at least one shot rendered; failed shots are returned as
/// failed artifacts so the consistency check can score them.
pub struct ImageGenerationStage {
    backend: Arc<dyn GenerationBackend>,
    config: ImageGenerationConfig,
}

impl ImageGenerationStage {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        config: ImageGenerationConfig,
    ) -> Result<Self, ConfigError> {
        if config.batch_size == 0 {
            return Err(ConfigError::invalid("pipeline.batch_size", "must be at least 1"));
        }
        Ok(Self { backend, config })
    }

    async fn run(&self, input: &StageInput) -> Result<Output, StageError> {
        let storyboard: Vec<ShotSpec> = require(input, fields::STORYBOARD)?;
        if storyboard.is_empty() {
            return Err(StageError::validation(fields::STORYBOARD, "storyboard is empty"));
        }
        let keyframes: Vec<Artifact> = optional(input, fields::KEYFRAMES)?.unwrap_or_default();
        let batch_size = match optional::<usize>(input, fields::BATCH_SIZE)? {
            Some(0) => {
                return Err(StageError::validation(fields::BATCH_SIZE, "must be at least 1"));
            }
            Some(n) => n,
            None => self.config.batch_size,
        };

        let anchors: HashMap<&str, &str> = keyframes
            .iter()
            .filter(|k| k.success)
            .filter_map(|k| k.url.as_deref().map(|u| (k.scene_id.as_str(), u)))
            .collect();
        let shots: Vec<ShotSpec> = storyboard
            .into_iter()
            .map(|mut shot| {
                if shot.reference_image.is_none() {
                    shot.reference_image = anchors.get(shot.scene_id.as_str()).map(|u| u.to_string());
                }
                shot
            })
            .collect();

        let artifacts = render_shots(self.backend.as_ref(), &shots, batch_size).await;
        if let Some(err) = all_failed(&artifacts) {
            return Err(err.into());
        }
        tracing::info!(
            rendered = artifacts.iter().filter(|a| a.success).count(),
            total = artifacts.len(),
            batch_size,
            "images rendered"
        );
        Output::new().with(fields::ARTIFACTS, &artifacts)
    }
}

#[async_trait]
impl Stage for ImageGenerationStage {
    fn name(&self) -> StageName {
        StageName::ImageGeneration
    }

    async fn execute(&self, input: &StageInput, _tracker: &mut TrackingStore) -> StageResult {
        finish(self.name(), self.run(input).await)
    }
}
