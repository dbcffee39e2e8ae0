use async_trait::async_trait;
use clipforge_common::{Script, ShotSpec, ShotType, StageResult};
use serde_json::json;

use super::fields;
use crate::errors::StageError;
use crate::stage::{Output, Stage, StageInput, StageName, finish, optional, require};
use crate::tracking::TrackingStore;

const DEFAULT_STYLE: &str = "cinematic";
/// Every scene opens wide, moves in, and ends on a close-up.
const SHOT_SEQUENCE: [ShotType; 3] = [ShotType::Wide, ShotType::Medium, ShotType::Close];
const DEFAULT_NEGATIVE: &str = "blurry, low quality, watermark, text artifacts";
const DEFAULT_SHOT_SECONDS: f64 = 3.0;

/// Breaks each script scene into wide, medium and close shots.
/// Deterministic: the same script and style always yield the same storyboard.
#[derive(Debug, Default)]
pub struct StoryboardStage;

impl StoryboardStage {
    pub fn new() -> Self {
        Self
    }
}

pub fn build_storyboard(script: &Script, style: &str) -> Vec<ShotSpec> {
    script
        .scenes
        .iter()
        .flat_map(|scene| {
            let shot_seconds = if scene.duration_seconds > 0.0 {
                scene.duration_seconds / SHOT_SEQUENCE.len() as f64
            } else {
                DEFAULT_SHOT_SECONDS
            };
            SHOT_SEQUENCE.iter().map(move |shot_type| {
                let prompt = format!(
                    "{style}, {}, {}",
                    scene.visual.trim(),
                    shot_type.prompt_phrase()
                );
                let mut shot = ShotSpec::new(
                    &format!("{}-{}", scene.scene_id, shot_type.as_str()),
                    &scene.scene_id,
                    *shot_type,
                    &prompt,
                );
                shot.negative_prompt = DEFAULT_NEGATIVE.to_string();
                shot.duration_seconds = shot_seconds;
                shot
            })
        })
        .collect()
}

fn plan(input: &StageInput) -> Result<Vec<ShotSpec>, StageError> {
    let script: Script = require(input, fields::SCRIPT)?;
    if script.scenes.is_empty() {
        return Err(StageError::validation(fields::SCRIPT, "script has no scenes"));
    }
    let style: String = optional(input, fields::STYLE)?.unwrap_or_else(|| DEFAULT_STYLE.into());
    Ok(build_storyboard(&script, &style))
}

#[async_trait]
impl Stage for StoryboardStage {
    fn name(&self) -> StageName {
        StageName::Storyboard
    }

    async fn execute(&self, input: &StageInput, tracker: &mut TrackingStore) -> StageResult {
        let outcome = plan(input);

        let outcome = outcome.and_then(|storyboard| {
            tracing::info!(shots = storyboard.len(), "storyboard built");
            if let Err(e) = tracker.record_generated_content(
                "storyboard",
                json!({ "shots": storyboard.len(), "storyboard": &storyboard }),
            ) {
                tracing::warn!(error = %e, "failed to record storyboard");
            }
            Output::new().with(fields::STORYBOARD, &storyboard)
        });
        finish(self.name(), outcome)
    }
}
