//! Fakes and fixtures shared by unit tests.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use clipforge_common::{
    Artifact, BackendError, Completion, ErrorKind, FeatureExtractor, FeatureOutcome,
    GeneratedImage, GenerationBackend, Hotspot, HotspotSource, ImageFeatures, Script,
    ScriptScene, ShotSpec, ShotType, StageResult, SynthesisRequest, Synthesizer, TextModel,
    TokenUsage,
};
use serde_json::{Map, Value, json};
use tempfile::TempDir;

use crate::stage::{Stage, StageInput, StageName};
use crate::tracking::TrackingStore;

pub fn input(value: Value) -> StageInput {
    value.as_object().cloned().unwrap_or_default()
}

/// Tracker in a temp dir with a running session.
pub fn active_tracker() -> (TrackingStore, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let mut tracker = TrackingStore::new(dir.path().join("sessions.json"));
    tracker.start_session(Map::new());
    (tracker, dir)
}

pub fn success(data: Value) -> StageResult {
    StageResult::ok(input(data))
}

pub fn failure(stage: StageName, kind: ErrorKind) -> StageResult {
    StageResult::failure(stage.as_str(), kind, format!("{stage} failed ({kind})"))
}

pub fn artifact(shot_id: &str, scene_id: &str, shot_type: ShotType, prompt: &str) -> Artifact {
    let spec = ShotSpec::new(shot_id, scene_id, shot_type, prompt);
    Artifact::generated(&spec, format!("https://img.test/{shot_id}.png"))
}

pub fn scored(mut artifact: Artifact, score: f64) -> Artifact {
    artifact.consistency_score = Some(score);
    artifact
}

pub fn artifacts_result(artifacts: &[Artifact]) -> StageResult {
    success(json!({ "artifacts": artifacts }))
}

pub fn two_scene_script() -> Script {
    Script {
        title: "Auroras".into(),
        scenes: vec![
            ScriptScene {
                scene_id: "scene-1".into(),
                narration: "First scene.".into(),
                visual: "green aurora over a frozen lake".into(),
                duration_seconds: 10.0,
            },
            ScriptScene {
                scene_id: "scene-2".into(),
                narration: "Second scene.".into(),
                visual: "a village under the aurora".into(),
                duration_seconds: 10.0,
            },
        ],
    }
}

/// Stage that replays scripted results, repeating the last one when the
/// script runs out.
pub struct ScriptedStage {
    name: StageName,
    results: Mutex<VecDeque<StageResult>>,
    last: Mutex<Option<StageResult>>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<StageInput>>,
    delay: Option<Duration>,
    panic_message: Option<String>,
}

impl ScriptedStage {
    pub fn new(name: StageName, results: Vec<StageResult>) -> Self {
        Self {
            name,
            results: Mutex::new(results.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
            delay: None,
            panic_message: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn panicking(mut self, message: &str) -> Self {
        self.panic_message = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<StageInput> {
        self.inputs.lock().unwrap().clone()
    }

    fn next_result(&self) -> StageResult {
        let next = self.results.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(result) => {
                *last = Some(result.clone());
                result
            }
            None => last.clone().unwrap_or_else(|| success(json!({}))),
        }
    }
}

#[async_trait]
impl Stage for ScriptedStage {
    fn name(&self) -> StageName {
        self.name
    }

    async fn execute(&self, input: &StageInput, _tracker: &mut TrackingStore) -> StageResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(input.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.panic_message {
            panic!("{message}");
        }
        self.next_result()
    }
}

pub struct FakeHotspots {
    titles: Vec<String>,
}

impl FakeHotspots {
    pub fn with_titles(titles: &[&str]) -> Self {
        Self {
            titles: titles.iter().map(|t| t.to_string()).collect(),
        }
    }
}

#[async_trait]
impl HotspotSource for FakeHotspots {
    async fn fetch(&self, _keywords: &[String], _count: usize) -> Result<Vec<Hotspot>, BackendError> {
        Ok(self
            .titles
            .iter()
            .enumerate()
            .map(|(i, title)| Hotspot {
                title: title.clone(),
                description: String::new(),
                heat: 100.0 - i as f64,
                url: None,
            })
            .collect())
    }
}

pub struct FakeTextModel {
    text: String,
}

impl FakeTextModel {
    pub fn replying(text: &str) -> Self {
        Self {
            text: text.to_string(),
        }
    }

    pub fn two_scene_script() -> Self {
        let json = serde_json::to_string_pretty(&two_scene_script()).unwrap_or_default();
        Self::replying(&format!("Here is your script:\n```json\n{json}\n```"))
    }
}

#[async_trait]
impl TextModel for FakeTextModel {
    async fn complete(&self, _prompt: &str) -> Result<Completion, BackendError> {
        Ok(Completion {
            text: self.text.clone(),
            model: "fake-llm".into(),
            usage: Some(TokenUsage::new(100, 50)),
        })
    }
}

pub struct FakeGenerator {
    failing: HashSet<String>,
    always_fail: bool,
    requests: Mutex<Vec<ShotSpec>>,
}

impl FakeGenerator {
    pub fn new() -> Self {
        Self {
            failing: HashSet::new(),
            always_fail: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_shots(shot_ids: &[&str]) -> Self {
        Self {
            failing: shot_ids.iter().map(|s| s.to_string()).collect(),
            ..Self::new()
        }
    }

    pub fn always_failing() -> Self {
        Self {
            always_fail: true,
            ..Self::new()
        }
    }

    pub fn requests(&self) -> Vec<ShotSpec> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for FakeGenerator {
    async fn generate(&self, shot: &ShotSpec) -> Result<GeneratedImage, BackendError> {
        self.requests.lock().unwrap().push(shot.clone());
        if self.always_fail || self.failing.contains(&shot.shot_id) {
            return Err(BackendError::Http {
                service: "generation".into(),
                status: 503,
                message: "overloaded".into(),
            });
        }
        Ok(GeneratedImage {
            url: format!("https://img.test/{}.png", shot.shot_id),
        })
    }
}

/// Extractor returning identical features for every image, or reporting
/// itself unavailable for one shot.
pub struct FakeExtractor {
    unavailable_for: Option<String>,
}

impl FakeExtractor {
    pub fn uniform() -> Self {
        Self {
            unavailable_for: None,
        }
    }

    pub fn unavailable_for(shot_id: &str) -> Self {
        Self {
            unavailable_for: Some(format!("/{shot_id}.png")),
        }
    }
}

#[async_trait]
impl FeatureExtractor for FakeExtractor {
    async fn extract(&self, image_url: &str) -> FeatureOutcome {
        if let Some(suffix) = &self.unavailable_for
            && image_url.ends_with(suffix.as_str())
        {
            return FeatureOutcome::Unavailable {
                reason: "model offline".into(),
            };
        }
        FeatureOutcome::Extracted(ImageFeatures {
            color_histogram: Some(vec![0.2, 0.3, 0.5]),
            style_vector: Some(vec![0.1, 0.9, 0.4]),
            composition: Some([0.5, 0.5]),
            texture: Some(vec![0.1, 0.4, 0.2, 0.8]),
            lighting: Some(vec![1.0, 2.0, 1.0]),
            contrast: Some(0.6),
            edges: Some(vec![0.3, 0.3, 0.4]),
            characters: None,
        })
    }
}

pub struct FakeSynthesizer {
    last: Mutex<Option<SynthesisRequest>>,
}

impl FakeSynthesizer {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(None),
        }
    }

    pub fn last_request(&self) -> Option<SynthesisRequest> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl Synthesizer for FakeSynthesizer {
    async fn compose(&self, request: &SynthesisRequest) -> Result<String, BackendError> {
        *self.last.lock().unwrap() = Some(request.clone());
        Ok(format!("out/{}", request.output_filename))
    }
}
