//! Wiring: collaborators → stages → orchestrator.

use std::path::PathBuf;
use std::sync::Arc;

use clipforge_common::{
    FeatureExtractor, GenerationBackend, HotspotSource, Synthesizer, TextModel,
};

use super::Orchestrator;
use crate::backends::HttpBackend;
use crate::clipforge_config::ClipforgeToml;
use crate::consistency::ConsistencyEngine;
use crate::errors::ConfigError;
use crate::regeneration::RegenerationController;
use crate::stage::Stage;
use crate::stages::{
    ConsistencyStage, HotspotStage, ImageGenerationConfig, ImageGenerationStage, KeyframeStage,
    ScriptStage, StoryboardStage, SynthesisStage,
};

/// One implementation per pipeline step, in execution order.
#[derive(Clone)]
pub struct PipelineStages {
    pub hotspot: Arc<dyn Stage>,
    pub script: Arc<dyn Stage>,
    pub storyboard: Arc<dyn Stage>,
    pub keyframe: Arc<dyn Stage>,
    /// Also invoked by the regeneration controller.
    pub image: Arc<dyn Stage>,
    pub consistency: Arc<dyn Stage>,
    pub synthesis: Arc<dyn Stage>,
}

impl PipelineStages {
    pub fn from_backends(
        backends: &Backends,
        engine: ConsistencyEngine,
        image: ImageGenerationConfig,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            hotspot: Arc::new(HotspotStage::new(backends.hotspots.clone())),
            script: Arc::new(ScriptStage::new(backends.text.clone())),
            storyboard: Arc::new(StoryboardStage::new()),
            keyframe: Arc::new(KeyframeStage::new(backends.generation.clone())),
            image: Arc::new(ImageGenerationStage::new(backends.generation.clone(), image)?),
            consistency: Arc::new(ConsistencyStage::new(engine)),
            synthesis: Arc::new(SynthesisStage::new(backends.synthesizer.clone())),
        })
    }
}

/// External collaborators the stages call.
#[derive(Clone)]
pub struct Backends {
    pub hotspots: Arc<dyn HotspotSource>,
    pub text: Arc<dyn TextModel>,
    pub generation: Arc<dyn GenerationBackend>,
    /// `None` forces prompt heuristics.
    pub features: Option<Arc<dyn FeatureExtractor>>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

impl Backends {
    /// Route every collaborator through one HTTP service.
    pub fn from_http(backend: HttpBackend, feature_extraction: bool) -> Self {
        let shared = Arc::new(backend);
        let features: Option<Arc<dyn FeatureExtractor>> = if feature_extraction {
            Some(shared.clone())
        } else {
            None
        };
        Self {
            hotspots: shared.clone(),
            text: shared.clone(),
            generation: shared.clone(),
            features,
            synthesizer: shared,
        }
    }
}

impl Orchestrator {
    /// Build a fully configured orchestrator. Invalid thresholds, batch
    /// sizes or timeouts are rejected here rather than mid-run.
    pub fn from_config(
        toml: &ClipforgeToml,
        tracking_path: impl Into<PathBuf>,
        backends: Backends,
    ) -> Result<Self, ConfigError> {
        let engine = ConsistencyEngine::new(toml.consistency.to_config(), backends.features.clone())?;
        let regeneration_engine = engine.with_threshold(toml.consistency.regeneration_threshold)?;
        let stages = PipelineStages::from_backends(
            &backends,
            engine,
            ImageGenerationConfig {
                batch_size: toml.pipeline.batch_size,
            },
        )?;
        let regeneration = RegenerationController::new(toml.regeneration_config())?;

        Ok(
            Orchestrator::new(stages, regeneration, regeneration_engine, tracking_path)
                .with_retry_table(toml.retry.to_table())
                .with_defaults(toml.pipeline.to_defaults()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StageName;
    use crate::test_support::{
        FakeExtractor, FakeGenerator, FakeHotspots, FakeSynthesizer, FakeTextModel,
    };
    use std::time::Duration;

    fn fakes() -> Backends {
        Backends {
            hotspots: Arc::new(FakeHotspots::with_titles(&["Auroras"])),
            text: Arc::new(FakeTextModel::two_scene_script()),
            generation: Arc::new(FakeGenerator::new()),
            features: Some(Arc::new(FakeExtractor::uniform())),
            synthesizer: Arc::new(FakeSynthesizer::new()),
        }
    }

    #[test]
    fn test_stages_report_their_names_in_order() {
        let engine = ConsistencyEngine::new(Default::default(), None).unwrap();
        let stages =
            PipelineStages::from_backends(&fakes(), engine, ImageGenerationConfig::default())
                .unwrap();
        let names: Vec<StageName> = [
            &stages.hotspot,
            &stages.script,
            &stages.storyboard,
            &stages.keyframe,
            &stages.image,
            &stages.consistency,
            &stages.synthesis,
        ]
        .iter()
        .map(|s| s.name())
        .collect();
        let expected: Vec<StageName> = StageName::ALL
            .into_iter()
            .filter(|s| *s != StageName::Regeneration)
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_from_config_rejects_invalid_values() {
        let mut toml = ClipforgeToml::default();
        toml.consistency.threshold = 1.2;
        assert!(Orchestrator::from_config(&toml, "t.json", fakes()).is_err());

        let mut toml = ClipforgeToml::default();
        toml.consistency.regeneration_threshold = -0.1;
        assert!(Orchestrator::from_config(&toml, "t.json", fakes()).is_err());

        let mut toml = ClipforgeToml::default();
        toml.pipeline.batch_size = 0;
        assert!(Orchestrator::from_config(&toml, "t.json", fakes()).is_err());
    }

    #[test]
    fn test_from_config_applies_sections() {
        let toml = ClipforgeToml::parse(
            "[retry]\nbackoff_unit_ms = 5\n\n[pipeline]\nstyle = \"noir\"\n",
        )
        .unwrap();
        let orch = Orchestrator::from_config(&toml, "t.json", fakes()).unwrap();
        assert_eq!(orch.retry.backoff_unit, Duration::from_millis(5));
        assert_eq!(orch.defaults.style, "noir");
        assert_eq!(orch.regeneration_engine.threshold(), 0.85);
        assert_eq!(orch.tracking_path(), std::path::Path::new("t.json"));
    }

    #[test]
    fn test_from_http_honours_feature_switch() {
        let backend = HttpBackend::new("http://localhost:1", None, Duration::from_secs(1)).unwrap();
        assert!(Backends::from_http(backend.clone(), true).features.is_some());
        assert!(Backends::from_http(backend, false).features.is_none());
    }
}
