//! Bounded, per-scene regeneration of artifacts that failed the
//! consistency threshold.
//!
//! Each scene gets up to `max_retries` attempts. Every attempt rebuilds the
//! still-failing shots from the storyboard with a stronger consistency
//! prompt, a lower guidance scale and more sampling steps, anchors them on a
//! passing peer from the same scene, invokes the generation stage exactly
//! once and rescores the result. The generation stage is never wrapped in the
//! pipeline's retry loop here; this controller is the only retry layer.

pub mod escalation;

use std::time::Duration;

use clipforge_common::{
    Artifact, RetryStats, SceneGroup, SceneRetryDetail, ShotSpec, group_by_scene,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::consistency::ConsistencyEngine;
use crate::errors::{ConfigError, RegenerationError};
use crate::orchestrator::retry::invoke_once;
use crate::stage::{Stage, StageInput};
use crate::tracking::TrackingStore;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct RegenerationConfig {
    /// Attempts per scene.
    pub max_retries: u32,
    pub attempt_timeout: Option<Duration>,
}

impl Default for RegenerationConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            attempt_timeout: None,
        }
    }
}

/// A scene that still has failing artifacts after its budget was spent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedScene {
    pub scene_id: String,
    pub retry_count: u32,
    pub remaining_artifacts: Vec<Artifact>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerationOutcome {
    /// Every artifact produced by a regeneration attempt, scored.
    pub regenerated_artifacts: Vec<Artifact>,
    /// Regenerated artifacts that reached the threshold.
    pub final_passed_artifacts: Vec<Artifact>,
    pub failed_scenes: Vec<FailedScene>,
    pub retry_stats: RetryStats,
    /// Artifacts that could not be regenerated at all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RegenerationController {
    config: RegenerationConfig,
}

impl RegenerationController {
    pub fn new(config: RegenerationConfig) -> Result<Self, ConfigError> {
        if config.attempt_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::invalid(
                "regeneration.attempt_timeout",
                "must be greater than zero",
            ));
        }
        Ok(Self { config })
    }

    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Regenerate `failed` scene by scene, in order of first failure.
    ///
    /// `scene_groups` is the full scored artifact set grouped by scene and
    /// supplies reference images; `original_shots` is the storyboard the
    /// failed artifacts were rendered from. An artifact with no storyboard
    /// shot is reported in `errors` and left failed; other scenes proceed.
    pub async fn regenerate(
        &self,
        failed: &[Artifact],
        scene_groups: &[SceneGroup],
        original_shots: &[ShotSpec],
        generation_stage: &dyn Stage,
        engine: &ConsistencyEngine,
        tracker: &mut TrackingStore,
    ) -> RegenerationOutcome {
        let mut outcome = RegenerationOutcome::default();

        for group in group_by_scene(failed) {
            let scene_id = group.scene_id.clone();
            let peers = scene_groups.iter().find(|g| g.scene_id == scene_id);
            let (mut still_failed, orphans): (Vec<Artifact>, Vec<Artifact>) = group
                .artifacts
                .into_iter()
                .partition(|a| original_shots.iter().any(|s| s.shot_id == a.shot_id));
            for orphan in &orphans {
                let err = RegenerationError::MissingShot {
                    shot_id: orphan.shot_id.clone(),
                    scene_id: orphan.scene_id.clone(),
                };
                tracing::warn!(scene_id = %scene_id, error = %err, "artifact cannot be regenerated");
                outcome.errors.push(err.to_string());
            }
            let mut passed: Vec<Artifact> = Vec::new();
            let mut retry_count = 0u32;

            for attempt in 0..self.config.max_retries {
                if still_failed.is_empty() {
                    break;
                }
                retry_count = attempt + 1;

                let reference = peers
                    .and_then(|g| g.passing_peer(engine.threshold()))
                    .or_else(|| passed.first())
                    .and_then(|a| a.url.clone());
                let shots: Vec<ShotSpec> = still_failed
                    .iter()
                    .filter_map(|a| original_shots.iter().find(|s| s.shot_id == a.shot_id))
                    .map(|s| escalation::escalate(s, attempt, reference.as_deref()))
                    .collect();

                tracing::info!(
                    scene_id = %scene_id,
                    attempt,
                    shots = shots.len(),
                    tier = escalation::tier(attempt),
                    "regenerating scene"
                );

                let mut input = StageInput::new();
                input.insert(
                    "storyboard".into(),
                    serde_json::to_value(&shots).unwrap_or(Value::Null),
                );
                let result = invoke_once(
                    generation_stage,
                    &input,
                    self.config.attempt_timeout,
                    attempt,
                    tracker,
                )
                .await;

                if !result.success {
                    tracing::warn!(
                        scene_id = %scene_id,
                        attempt,
                        error = result.error_message(),
                        "regeneration attempt failed"
                    );
                    continue;
                }

                let Some(mut regenerated) = result.field::<Vec<Artifact>>("artifacts") else {
                    tracing::warn!(
                        scene_id = %scene_id,
                        attempt,
                        "regeneration attempt returned no readable artifacts"
                    );
                    continue;
                };
                regenerated.retain(|a| still_failed.iter().any(|f| f.shot_id == a.shot_id));
                if regenerated.is_empty() {
                    tracing::warn!(
                        scene_id = %scene_id,
                        attempt,
                        "regeneration attempt returned none of the requested shots"
                    );
                    continue;
                }

                let report = engine.evaluate(&mut regenerated, Some(original_shots)).await;
                outcome.regenerated_artifacts.extend(regenerated);
                still_failed = still_failed
                    .into_iter()
                    .filter(|f| !report.passed_artifacts.iter().any(|p| p.shot_id == f.shot_id))
                    .map(|f| {
                        report
                            .failed_artifacts
                            .iter()
                            .find(|r| r.shot_id == f.shot_id)
                            .cloned()
                            .unwrap_or(f)
                    })
                    .collect();
                passed.extend(report.passed_artifacts);
            }

            still_failed.extend(orphans);
            let detail = SceneRetryDetail {
                scene_id: scene_id.clone(),
                retry_count,
                success: still_failed.is_empty(),
                passed_count: passed.len(),
                failed_count: still_failed.len(),
            };
            if still_failed.is_empty() {
                tracing::info!(scene_id = %scene_id, retry_count, "scene regenerated");
            } else {
                tracing::warn!(
                    scene_id = %scene_id,
                    retry_count,
                    remaining = still_failed.len(),
                    "scene exhausted its regeneration budget"
                );
                outcome.failed_scenes.push(FailedScene {
                    scene_id: scene_id.clone(),
                    retry_count,
                    remaining_artifacts: still_failed,
                });
            }
            outcome.retry_stats.record(detail);
            outcome.final_passed_artifacts.extend(passed);
        }

        outcome
    }
}
