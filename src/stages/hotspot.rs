use std::sync::Arc;

use async_trait::async_trait;
use clipforge_common::{BackendError, HotspotSource, StageResult};
use serde_json::json;

use super::fields;
use crate::errors::StageError;
use crate::stage::{Output, Stage, StageInput, StageName, finish, optional};
use crate::tracking::TrackingStore;

const DEFAULT_COUNT: usize = 5;

/// Selects trending topics to build the video around.
pub struct HotspotStage {
    source: Arc<dyn HotspotSource>,
}

impl HotspotStage {
    pub fn new(source: Arc<dyn HotspotSource>) -> Self {
        Self { source }
    }

    async fn run(&self, input: &StageInput, tracker: &mut TrackingStore) -> Result<Output, StageError> {
        let keywords: Vec<String> = optional(input, fields::KEYWORDS)?.unwrap_or_default();
        let count: usize = optional(input, fields::COUNT)?.unwrap_or(DEFAULT_COUNT);
        if count == 0 {
            return Err(StageError::validation(fields::COUNT, "must be at least 1"));
        }

        let mut hotspots = self.source.fetch(&keywords, count).await?;
        if hotspots.is_empty() {
            return Err(BackendError::Rejected {
                service: "hotspot".into(),
                message: format!("no hotspots found for keywords {keywords:?}"),
            }
            .into());
        }
        hotspots.truncate(count);
        tracing::info!(count = hotspots.len(), "hotspots selected");

        if let Err(e) = tracker.record_generated_content(
            "hotspots",
            json!({ "keywords": keywords, "titles": hotspots.iter().map(|h| &h.title).collect::<Vec<_>>() }),
        ) {
            tracing::warn!(error = %e, "failed to record hotspots");
        }

        Output::new().with(fields::HOTSPOTS, &hotspots)
    }
}

#[async_trait]
impl Stage for HotspotStage {
    fn name(&self) -> StageName {
        StageName::Hotspot
    }

    async fn execute(&self, input: &StageInput, tracker: &mut TrackingStore) -> StageResult {
        finish(self.name(), self.run(input, tracker).await)
    }
}
