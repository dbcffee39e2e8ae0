//! Sequential pipeline driver.
//!
//! [`Orchestrator::run`] opens a tracking session, runs every stage through
//! [`execute_with_retry`] in a fixed order, hands failed artifacts to the
//! regeneration controller after the consistency check, and seals the
//! session exactly once on the way out, even when something panics.

pub mod params;
pub mod pipeline;
pub mod retry;

pub use params::{PipelineDefaults, PipelineParams};
pub use pipeline::{Backends, PipelineStages};
pub use retry::{RetryOutcome, RetryPolicy, RetryTable, execute_with_retry};

use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use clipforge_common::{
    Artifact, ConsistencyReport, ErrorKind, RetryStats, ShotSpec, group_by_scene,
};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::consistency::ConsistencyEngine;
use crate::regeneration::RegenerationController;
use crate::stage::{Stage, StageInput, StageName};
use crate::stages::fields;
use crate::tracking::{ErrorRecord, TrackingStore};
use crate::ui::PipelineUI;

/// Stages shown on the progress bar. Regeneration is reported separately.
pub const STAGE_COUNT: u64 = 7;

/// Everything a caller learns from one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    pub success: bool,
    pub session_id: String,
    /// Stage name → that stage's output data.
    #[serde(default)]
    pub stages: BTreeMap<String, Value>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_video_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_stats: Option<RetryStats>,
}

impl PipelineResult {
    fn new(session_id: &str) -> Self {
        Self {
            success: false,
            session_id: session_id.to_string(),
            stages: BTreeMap::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            final_video_path: None,
            failed_stage: None,
            error: None,
            retry_stats: None,
        }
    }

    fn fail(&mut self, stage: Option<StageName>, message: String) {
        self.success = false;
        self.failed_stage = stage.map(|s| s.as_str().to_string());
        self.errors.push(message.clone());
        self.error = Some(message);
    }

    /// Compact form stored as the session's final result.
    pub fn summary(&self) -> Value {
        json!({
            "success": self.success,
            "finalVideoPath": self.final_video_path,
            "failedStage": self.failed_stage,
            "error": self.error,
            "errors": self.errors,
            "warnings": self.warnings,
            "retryStats": self.retry_stats,
            "completedStages": self.stages.keys().collect::<Vec<_>>(),
        })
    }
}

pub struct Orchestrator {
    stages: PipelineStages,
    retry: RetryTable,
    defaults: PipelineDefaults,
    regeneration: RegenerationController,
    regeneration_engine: ConsistencyEngine,
    tracking_path: PathBuf,
    ui: Option<Arc<PipelineUI>>,
}

impl Orchestrator {
    pub fn new(
        stages: PipelineStages,
        regeneration: RegenerationController,
        regeneration_engine: ConsistencyEngine,
        tracking_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            stages,
            retry: RetryTable::default(),
            defaults: PipelineDefaults::default(),
            regeneration,
            regeneration_engine,
            tracking_path: tracking_path.into(),
            ui: None,
        }
    }

    pub fn with_retry_table(mut self, retry: RetryTable) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_defaults(mut self, defaults: PipelineDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_ui(mut self, ui: Arc<PipelineUI>) -> Self {
        self.ui = Some(ui);
        self
    }

    pub fn tracking_path(&self) -> &std::path::Path {
        &self.tracking_path
    }

    /// Run the whole pipeline with a fresh tracking store.
    pub async fn run(&self, params: StageInput) -> PipelineResult {
        let mut tracker = TrackingStore::new(&self.tracking_path);
        self.run_with_store(params, &mut tracker).await
    }

    /// Run the whole pipeline, recording into `tracker`.
    pub async fn run_with_store(
        &self,
        params: StageInput,
        tracker: &mut TrackingStore,
    ) -> PipelineResult {
        let session_id = tracker.start_session(params.clone());
        if let Some(ui) = &self.ui {
            ui.print_header(&session_id);
        }

        let outcome = AssertUnwindSafe(self.drive(&params, &session_id, &mut *tracker))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(result) => {
                if let Err(e) = tracker.end_session(result.summary()) {
                    tracing::error!(session_id = %session_id, error = %e, "failed to seal session");
                }
                result
            }
            Err(payload) => {
                let message = format!("pipeline panicked: {}", retry::panic_message(payload.as_ref()));
                tracing::error!(session_id = %session_id, "{message}");
                if let Err(e) = tracker.fail_session(&message) {
                    tracing::error!(session_id = %session_id, error = %e, "failed to seal session");
                }
                let mut result = PipelineResult::new(&session_id);
                result.fail(None, message);
                result
            }
        };

        tracing::info!(
            session_id = %session_id,
            success = result.success,
            failed_stage = result.failed_stage.as_deref().unwrap_or("-"),
            "pipeline finished"
        );
        if let Some(ui) = &self.ui {
            ui.finish(&result);
        }
        result
    }

    async fn drive(
        &self,
        raw: &StageInput,
        session_id: &str,
        tracker: &mut TrackingStore,
    ) -> PipelineResult {
        let mut result = PipelineResult::new(session_id);

        let params = match PipelineParams::from_map(raw, &self.defaults) {
            Ok(params) => params,
            Err(e) => {
                let message = e.to_string();
                record_error(tracker, ErrorRecord::for_stage("params", Some(e.kind()), &message));
                result.fail(None, message);
                return result;
            }
        };
        let params_json = Value::Object(params.to_map());
        tracing::info!(session_id, params = %params_json, "pipeline started");

        let input = object(json!({
            fields::KEYWORDS: params.keywords,
            fields::COUNT: params.count,
        }));
        let Some(data) = self.step(self.stages.hotspot.as_ref(), input, tracker, &mut result).await
        else {
            return result;
        };
        let Some(hotspots) =
            handoff::<Value>(&data, StageName::Hotspot, fields::HOTSPOTS, tracker, &mut result)
        else {
            return result;
        };

        let input = object(json!({
            fields::HOTSPOTS: hotspots,
            fields::STYLE: params.style,
            fields::DURATION: params.duration,
        }));
        let Some(data) = self.step(self.stages.script.as_ref(), input, tracker, &mut result).await
        else {
            return result;
        };
        let Some(script) =
            handoff::<Value>(&data, StageName::Script, fields::SCRIPT, tracker, &mut result)
        else {
            return result;
        };

        let input = object(json!({
            fields::SCRIPT: script,
            fields::STYLE: params.style,
        }));
        let Some(data) = self
            .step(self.stages.storyboard.as_ref(), input, tracker, &mut result)
            .await
        else {
            return result;
        };
        let Some(storyboard) = handoff::<Vec<ShotSpec>>(
            &data,
            StageName::Storyboard,
            fields::STORYBOARD,
            tracker,
            &mut result,
        ) else {
            return result;
        };

        let input = object(json!({ fields::STORYBOARD: storyboard }));
        let Some(data) = self
            .step(self.stages.keyframe.as_ref(), input, tracker, &mut result)
            .await
        else {
            return result;
        };
        let Some(keyframes) = handoff::<Value>(
            &data,
            StageName::KeyframeGeneration,
            fields::KEYFRAMES,
            tracker,
            &mut result,
        ) else {
            return result;
        };

        let input = object(json!({
            fields::STORYBOARD: storyboard,
            fields::KEYFRAMES: keyframes,
            fields::BATCH_SIZE: params.batch_size,
        }));
        let Some(data) = self.step(self.stages.image.as_ref(), input, tracker, &mut result).await
        else {
            return result;
        };
        let Some(artifacts) = handoff::<Value>(
            &data,
            StageName::ImageGeneration,
            fields::ARTIFACTS,
            tracker,
            &mut result,
        ) else {
            return result;
        };

        let input = object(json!({
            fields::ARTIFACTS: artifacts,
            fields::STORYBOARD: storyboard,
        }));
        let Some(data) = self
            .step(self.stages.consistency.as_ref(), input, tracker, &mut result)
            .await
        else {
            return result;
        };
        let stage = StageName::ConsistencyCheck;
        let Some(report) =
            handoff::<ConsistencyReport>(&data, stage, fields::REPORT, tracker, &mut result)
        else {
            return result;
        };
        let Some(mut passed) =
            handoff::<Vec<Artifact>>(&data, stage, fields::PASSED_ARTIFACTS, tracker, &mut result)
        else {
            return result;
        };
        let Some(failed) =
            handoff::<Vec<Artifact>>(&data, stage, fields::FAILED_ARTIFACTS, tracker, &mut result)
        else {
            return result;
        };
        let scored: Vec<Artifact> = handoff_or(&data, fields::ARTIFACTS)
            .unwrap_or_else(|| passed.iter().chain(&failed).cloned().collect());
        if let Some(ui) = &self.ui {
            ui.show_consistency(&report);
        }

        if !failed.is_empty() {
            if params.retry_failed {
                passed = self
                    .regenerate(&failed, &scored, &storyboard, passed, tracker, &mut result)
                    .await;
            } else {
                result.warnings.push(format!(
                    "{} artifact(s) scored below {:.2}; regeneration disabled",
                    failed.len(),
                    report.threshold
                ));
            }
        }

        let input = object(json!({
            fields::ARTIFACTS: passed,
            fields::SCRIPT: script,
            fields::OUTPUT_FILENAME: params.output_filename,
            fields::DURATION: params.duration,
        }));
        let Some(data) = self
            .step(self.stages.synthesis.as_ref(), input, tracker, &mut result)
            .await
        else {
            return result;
        };
        let Some(video_path) =
            handoff::<String>(&data, StageName::Synthesis, fields::VIDEO_PATH, tracker, &mut result)
        else {
            return result;
        };

        result.final_video_path = Some(video_path);
        result.success = true;
        result
    }

    /// Run one stage with its retry policy and record the outcome.
    async fn step(
        &self,
        stage: &dyn Stage,
        input: StageInput,
        tracker: &mut TrackingStore,
        result: &mut PipelineResult,
    ) -> Option<Map<String, Value>> {
        let name = stage.name();
        tracing::info!(stage = %name, "stage started");
        if let Some(ui) = &self.ui {
            ui.start_stage(name);
        }

        let outcome = execute_with_retry(stage, &input, self.retry.policy_for(name), tracker).await;

        if outcome.result.success {
            if let Some(ui) = &self.ui {
                ui.stage_complete(name, outcome.attempts, &outcome.backoffs);
            }
            let data = outcome.result.data.unwrap_or_default();
            result
                .stages
                .insert(name.as_str().to_string(), Value::Object(data.clone()));
            return Some(data);
        }

        let message = outcome.result.error_message().to_string();
        tracing::error!(stage = %name, attempts = outcome.attempts, error = %message, "stage failed");
        if let Some(ui) = &self.ui {
            ui.stage_failed(name, &message, outcome.attempts, &outcome.backoffs);
        }
        record_error(
            tracker,
            ErrorRecord::for_stage(name.as_str(), outcome.result.error_kind(), &message),
        );
        result.fail(Some(name), message);
        None
    }

    /// Hand failed artifacts to the regeneration controller and merge the
    /// recovered ones into `passed`. Never fails the pipeline.
    async fn regenerate(
        &self,
        failed: &[Artifact],
        scored: &[Artifact],
        storyboard: &[ShotSpec],
        passed: Vec<Artifact>,
        tracker: &mut TrackingStore,
        result: &mut PipelineResult,
    ) -> Vec<Artifact> {
        let groups = group_by_scene(scored);
        let outcome = self
            .regeneration
            .regenerate(
                failed,
                &groups,
                storyboard,
                self.stages.image.as_ref(),
                &self.regeneration_engine,
                tracker,
            )
            .await;

        for error in &outcome.errors {
            let message = format!("regeneration failed: {error}");
            tracing::error!("{message}");
            record_error(
                tracker,
                ErrorRecord::for_stage(
                    StageName::Regeneration.as_str(),
                    Some(ErrorKind::Internal),
                    &message,
                ),
            );
            result.errors.push(message);
        }
        for scene in &outcome.failed_scenes {
            result.warnings.push(format!(
                "scene {} still has {} artifact(s) below threshold after {} regeneration attempt(s)",
                scene.scene_id,
                scene.remaining_artifacts.len(),
                scene.retry_count
            ));
        }
        if let Some(ui) = &self.ui {
            ui.show_regeneration(&outcome.retry_stats, &outcome.failed_scenes);
        }
        match serde_json::to_value(&outcome) {
            Ok(value) => {
                if let Err(e) = tracker.record_generated_content(
                    "regeneration",
                    json!({ "retryStats": outcome.retry_stats }),
                ) {
                    tracing::warn!(error = %e, "failed to record regeneration stats");
                }
                result
                    .stages
                    .insert(StageName::Regeneration.as_str().to_string(), value);
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize regeneration outcome"),
        }
        result.retry_stats = Some(outcome.retry_stats);
        merge_passed(passed, &outcome.final_passed_artifacts, storyboard)
    }
}

fn object(value: Value) -> StageInput {
    match value {
        Value::Object(map) => map,
        _ => StageInput::new(),
    }
}

fn record_error(tracker: &mut TrackingStore, error: ErrorRecord) {
    if let Err(e) = tracker.record_error(error) {
        tracing::warn!(error = %e, "failed to record error");
    }
}

fn handoff_or<T: DeserializeOwned>(data: &Map<String, Value>, field: &str) -> Option<T> {
    data.get(field)
        .filter(|v| !v.is_null())
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// Decode the field the next stage needs, failing the run with a
/// validation error on `stage` when it is missing or malformed.
fn handoff<T: DeserializeOwned>(
    data: &Map<String, Value>,
    stage: StageName,
    field: &str,
    tracker: &mut TrackingStore,
    result: &mut PipelineResult,
) -> Option<T> {
    let value = handoff_or(data, field);
    if value.is_none() {
        let message = format!("{stage} output is missing or has a malformed '{field}' field");
        record_error(
            tracker,
            ErrorRecord::for_stage(stage.as_str(), Some(ErrorKind::Validation), &message),
        );
        result.fail(Some(stage), message);
    }
    value
}

/// Replace or add `recovered` artifacts by shot id, keeping storyboard order.
fn merge_passed(
    mut passed: Vec<Artifact>,
    recovered: &[Artifact],
    storyboard: &[ShotSpec],
) -> Vec<Artifact> {
    for artifact in recovered {
        match passed.iter_mut().find(|a| a.shot_id == artifact.shot_id) {
            Some(slot) => *slot = artifact.clone(),
            None => passed.push(artifact.clone()),
        }
    }
    let position = |shot_id: &str| {
        storyboard
            .iter()
            .position(|s| s.shot_id == shot_id)
            .unwrap_or(usize::MAX)
    };
    passed.sort_by_key(|a| position(&a.shot_id));
    passed
}
