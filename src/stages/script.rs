use std::sync::Arc;

use async_trait::async_trait;
use clipforge_common::{BackendError, Hotspot, Script, StageResult, TextModel};

use super::fields;
use crate::errors::StageError;
use crate::stage::{Output, Stage, StageInput, StageName, finish, optional, require};
use crate::tracking::TrackingStore;
use crate::util::{parse_json_object, truncate};

const DEFAULT_STYLE: &str = "cinematic";
const DEFAULT_DURATION: u32 = 60;

/// Writes a scene-by-scene script for the selected hotspots with a text model.
pub struct ScriptStage {
    model: Arc<dyn TextModel>,
}

fn build_prompt(hotspots: &[Hotspot], style: &str, duration: u32) -> String {
    let topics = hotspots
        .iter()
        .map(|h| {
            if h.description.is_empty() {
                format!("- {}", h.title)
            } else {
                format!("- {}: {}", h.title, h.description)
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Write a {duration}-second short video script in a {style} style about:\n{topics}\n\n\
         Respond with a JSON object: {{\"title\": string, \"scenes\": [{{\"sceneId\": string, \
         \"narration\": string, \"visual\": string, \"durationSeconds\": number}}]}}"
    )
}

impl ScriptStage {
    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self { model }
    }

    async fn run(&self, input: &StageInput, tracker: &mut TrackingStore) -> Result<Output, StageError> {
        let hotspots: Vec<Hotspot> = require(input, fields::HOTSPOTS)?;
        if hotspots.is_empty() {
            return Err(StageError::validation(fields::HOTSPOTS, "no hotspots to write about"));
        }
        let style: String = optional(input, fields::STYLE)?.unwrap_or_else(|| DEFAULT_STYLE.into());
        let duration: u32 = optional(input, fields::DURATION)?.unwrap_or(DEFAULT_DURATION);

        let completion = self.model.complete(&build_prompt(&hotspots, &style, duration)).await?;
        if let Some(usage) = completion.usage
            && let Err(e) = tracker.record_token_usage(&completion.model, usage)
        {
            tracing::warn!(error = %e, "failed to record token usage");
        }

        let script: Script = parse_json_object(&completion.text).map_err(|message| {
            tracing::debug!(output = %truncate(&completion.text, 200), "unparseable script");
            BackendError::InvalidResponse {
                service: "text_model".into(),
                message,
            }
        })?;
        if script.scenes.is_empty() {
            return Err(BackendError::InvalidResponse {
                service: "text_model".into(),
                message: "script has no scenes".into(),
            }
            .into());
        }
        tracing::info!(title = %script.title, scenes = script.scenes.len(), "script written");

        let content = serde_json::to_value(&script)
            .map_err(|e| StageError::MissingOutput { field: format!("script ({e})") })?;
        if let Err(e) = tracker.record_generated_content("script", content) {
            tracing::warn!(error = %e, "failed to record script");
        }

        Output::new().with(fields::SCRIPT, &script)
    }
}

#[async_trait]
impl Stage for ScriptStage {
    fn name(&self) -> StageName {
        StageName::Script
    }

    async fn execute(&self, input: &StageInput, tracker: &mut TrackingStore) -> StageResult {
        finish(self.name(), self.run(input, tracker).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FakeTextModel, active_tracker, input};
    use clipforge_common::ErrorKind;
    use serde_json::json;

    fn hotspots() -> serde_json::Value {
        json!([{"title": "Solar storms", "description": "Auroras seen far south"}])
    }

    #[tokio::test]
    async fn test_parses_script_from_fenced_output_and_records_usage() {
        let (mut tracker, _dir) = active_tracker();
        let stage = ScriptStage::new(Arc::new(FakeTextModel::two_scene_script()));

        let result = stage
            .execute(&input(json!({"hotspots": hotspots(), "style": "documentary"})), &mut tracker)
            .await;

        assert!(result.success, "{:?}", result.error);
        let script: Script = result.field("script").unwrap();
        assert_eq!(script.scenes.len(), 2);

        let id = tracker.current_session_id().unwrap().to_string();
        let session = tracker.session(&id).unwrap();
        assert_eq!(session.token_usage["fake-llm"][0].usage.total_tokens, 150);
        assert!(session.generated_content.iter().any(|c| c.content_type == "script"));
    }

    #[tokio::test]
    async fn test_prose_output_is_retryable_failure() {
        let (mut tracker, _dir) = active_tracker();
        let stage = ScriptStage::new(Arc::new(FakeTextModel::replying("Sorry, I can't help.")));
        let result = stage
            .execute(&input(json!({"hotspots": hotspots()})), &mut tracker)
            .await;
        assert!(!result.success);
        assert_eq!(result.error_kind(), Some(ErrorKind::ExternalService));
        assert!(result.is_retryable());
    }

    #[tokio::test]
    async fn test_missing_hotspots_is_validation() {
        let (mut tracker, _dir) = active_tracker();
        let stage = ScriptStage::new(Arc::new(FakeTextModel::two_scene_script()));
        let result = stage.execute(&input(json!({})), &mut tracker).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::Validation));
    }

    #[test]
    fn test_prompt_mentions_style_and_topics() {
        let hotspots: Vec<Hotspot> = serde_json::from_value(hotspots()).unwrap();
        let prompt = build_prompt(&hotspots, "noir", 45);
        assert!(prompt.contains("45-second"));
        assert!(prompt.contains("noir"));
        assert!(prompt.contains("Solar storms: Auroras"));
    }
}
