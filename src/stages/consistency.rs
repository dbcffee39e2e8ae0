use async_trait::async_trait;
use clipforge_common::{Artifact, ShotSpec, StageResult};
use serde_json::json;

use super::fields;
use crate::consistency::ConsistencyEngine;
use crate::errors::StageError;
use crate::stage::{Output, Stage, StageInput, StageName, finish, optional, require};
use crate::tracking::TrackingStore;

/// Scores the generated artifacts and splits them into passed and failed.
///
/// Artifacts below the threshold are a classification, not a failure: the
/// stage succeeds whenever it could score the batch.
pub struct ConsistencyStage {
    engine: ConsistencyEngine,
}

impl ConsistencyStage {
    pub fn new(engine: ConsistencyEngine) -> Self {
        Self { engine }
    }

    async fn run(&self, input: &StageInput, tracker: &mut TrackingStore) -> Result<Output, StageError> {
        let mut artifacts: Vec<Artifact> = require(input, fields::ARTIFACTS)?;
        let storyboard: Option<Vec<ShotSpec>> = optional(input, fields::STORYBOARD)?;

        let report = self
            .engine
            .evaluate(&mut artifacts, storyboard.as_deref())
            .await;
        tracing::info!(
            overall = report.overall_score,
            pass_rate = report.pass_rate,
            failed = report.failed_artifacts.len(),
            "consistency checked"
        );

        if let Err(e) = tracker.record_generated_content(
            "consistency_report",
            json!({
                "overallScore": report.overall_score,
                "passRate": report.pass_rate,
                "mode": report.mode,
                "issues": report.dimensions.all_issues(),
            }),
        ) {
            tracing::warn!(error = %e, "failed to record consistency report");
        }

        Output::new()
            .with(fields::PASSED_ARTIFACTS, &report.passed_artifacts)?
            .with(fields::FAILED_ARTIFACTS, &report.failed_artifacts)?
            .with(fields::ARTIFACTS, &artifacts)?
            .with(fields::REPORT, &report)
    }
}

#[async_trait]
impl Stage for ConsistencyStage {
    fn name(&self) -> StageName {
        StageName::ConsistencyCheck
    }

    async fn execute(&self, input: &StageInput, tracker: &mut TrackingStore) -> StageResult {
        finish(self.name(), self.run(input, tracker).await)
    }
}
