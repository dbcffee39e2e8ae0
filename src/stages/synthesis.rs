use std::sync::Arc;

use async_trait::async_trait;
use clipforge_common::{Artifact, Script, StageResult, SynthesisRequest, Synthesizer};
use serde_json::json;

use super::fields;
use crate::errors::StageError;
use crate::stage::{Output, Stage, StageInput, StageName, finish, optional, require};
use crate::tracking::TrackingStore;

const DEFAULT_OUTPUT: &str = "output.mp4";
const DEFAULT_DURATION: u32 = 60;

/// Composes the final video from the artifacts that passed consistency.
pub struct SynthesisStage {
    synthesizer: Arc<dyn Synthesizer>,
}

impl SynthesisStage {
    pub fn new(synthesizer: Arc<dyn Synthesizer>) -> Self {
        Self { synthesizer }
    }

    async fn run(&self, input: &StageInput, tracker: &mut TrackingStore) -> Result<Output, StageError> {
        let artifacts: Vec<Artifact> = require(input, fields::ARTIFACTS)?;
        let usable: Vec<Artifact> = artifacts
            .into_iter()
            .filter(|a| a.success && a.has_location())
            .collect();
        if usable.is_empty() {
            return Err(StageError::validation(
                fields::ARTIFACTS,
                "no rendered artifacts to synthesize",
            ));
        }
        let narration = optional::<Script>(input, fields::SCRIPT)?
            .map(|s| s.narration())
            .unwrap_or_default();
        let request = SynthesisRequest {
            artifacts: usable,
            narration,
            output_filename: optional(input, fields::OUTPUT_FILENAME)?
                .unwrap_or_else(|| DEFAULT_OUTPUT.to_string()),
            duration_seconds: optional(input, fields::DURATION)?.unwrap_or(DEFAULT_DURATION),
        };

        let video_path = self.synthesizer.compose(&request).await?;
        tracing::info!(path = %video_path, clips = request.artifacts.len(), "video composed");

        if let Err(e) = tracker.record_file_location(
            "video",
            &video_path,
            json!({
                "clips": request.artifacts.len(),
                "durationSeconds": request.duration_seconds,
                "outputFilename": request.output_filename,
            }),
        ) {
            tracing::warn!(error = %e, "failed to record video location");
        }

        Output::new().with(fields::VIDEO_PATH, &video_path)
    }
}

#[async_trait]
impl Stage for SynthesisStage {
    fn name(&self) -> StageName {
        StageName::Synthesis
    }

    async fn execute(&self, input: &StageInput, tracker: &mut TrackingStore) -> StageResult {
        finish(self.name(), self.run(input, tracker).await)
    }
}
