//! Generated artifacts and the shot specifications they are rendered from.

use serde::{Deserialize, Serialize};

/// Camera framing of a shot, used by scene transition scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShotType {
    #[serde(alias = "wide_shot", alias = "establishing")]
    Wide,
    #[default]
    #[serde(alias = "medium_shot")]
    Medium,
    #[serde(alias = "close_up", alias = "closeup")]
    Close,
}

impl ShotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShotType::Wide => "wide",
            ShotType::Medium => "medium",
            ShotType::Close => "close",
        }
    }

    /// Framing phrase appended to image prompts.
    pub fn prompt_phrase(&self) -> &'static str {
        match self {
            ShotType::Wide => "wide shot",
            ShotType::Medium => "medium shot",
            ShotType::Close => "close-up",
        }
    }
}

impl std::fmt::Display for ShotType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn default_cfg_scale() -> f64 {
    7.5
}

fn default_steps() -> u32 {
    30
}

fn default_shot_duration() -> f64 {
    3.0
}

/// One shot of the storyboard: everything the image backend needs to render it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotSpec {
    pub shot_id: String,
    pub scene_id: String,
    #[serde(default)]
    pub shot_type: ShotType,
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    /// Classifier-free guidance scale ("creativity" control of the diffusion backend).
    #[serde(default = "default_cfg_scale")]
    pub cfg_scale: f64,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default = "default_shot_duration")]
    pub duration_seconds: f64,
    /// Image the backend should anchor on (scene keyframe or a passing peer).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_image: Option<String>,
}

impl ShotSpec {
    pub fn new(shot_id: &str, scene_id: &str, shot_type: ShotType, prompt: &str) -> Self {
        Self {
            shot_id: shot_id.to_string(),
            scene_id: scene_id.to_string(),
            shot_type,
            prompt: prompt.to_string(),
            negative_prompt: String::new(),
            cfg_scale: default_cfg_scale(),
            steps: default_steps(),
            duration_seconds: default_shot_duration(),
            reference_image: None,
        }
    }
}

/// A single generated visual unit (keyframe or image) tied to one shot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub shot_id: String,
    pub scene_id: String,
    pub prompt: String,
    #[serde(default, alias = "path", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub success: bool,
    /// Assigned by the consistency engine, absent until scored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consistency_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Artifact {
    /// Artifact for a shot the backend rendered successfully.
    pub fn generated(shot: &ShotSpec, location: impl Into<String>) -> Self {
        Self {
            shot_id: shot.shot_id.clone(),
            scene_id: shot.scene_id.clone(),
            prompt: shot.prompt.clone(),
            url: Some(location.into()),
            success: true,
            consistency_score: None,
            error: None,
        }
    }

    /// Artifact for a shot whose generation failed.
    pub fn failed(shot: &ShotSpec, error: impl Into<String>) -> Self {
        Self {
            shot_id: shot.shot_id.clone(),
            scene_id: shot.scene_id.clone(),
            prompt: shot.prompt.clone(),
            url: None,
            success: false,
            consistency_score: None,
            error: Some(error.into()),
        }
    }

    pub fn has_location(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.trim().is_empty())
    }

    /// Whether the artifact has been scored at or above `threshold`.
    pub fn meets(&self, threshold: f64) -> bool {
        self.consistency_score.is_some_and(|s| s >= threshold)
    }
}

/// Artifacts sharing a scene id. Derived on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneGroup {
    pub scene_id: String,
    pub artifacts: Vec<Artifact>,
}

impl SceneGroup {
    /// First artifact in the group that scored at or above `threshold`.
    pub fn passing_peer(&self, threshold: f64) -> Option<&Artifact> {
        self.artifacts
            .iter()
            .find(|a| a.success && a.has_location() && a.meets(threshold))
    }
}

/// Group artifacts by scene id, preserving the order in which scenes first appear.
pub fn group_by_scene(artifacts: &[Artifact]) -> Vec<SceneGroup> {
    let mut groups: Vec<SceneGroup> = Vec::new();
    for artifact in artifacts {
        match groups.iter_mut().find(|g| g.scene_id == artifact.scene_id) {
            Some(group) => group.artifacts.push(artifact.clone()),
            None => groups.push(SceneGroup {
                scene_id: artifact.scene_id.clone(),
                artifacts: vec![artifact.clone()],
            }),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(shot: &str, scene: &str) -> Artifact {
        let spec = ShotSpec::new(shot, scene, ShotType::Wide, "a city at dusk");
        Artifact::generated(&spec, format!("https://img/{shot}.png"))
    }

    #[test]
    fn test_group_by_scene_preserves_first_appearance_order() {
        let artifacts = vec![
            artifact("s2-1", "scene-2"),
            artifact("s1-1", "scene-1"),
            artifact("s2-2", "scene-2"),
        ];
        let groups = group_by_scene(&artifacts);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].scene_id, "scene-2");
        assert_eq!(groups[0].artifacts.len(), 2);
        assert_eq!(groups[1].scene_id, "scene-1");
    }

    #[test]
    fn test_artifact_accepts_path_alias() {
        let json = r#"{"shotId":"a","sceneId":"s","prompt":"p","path":"/tmp/a.png","success":true}"#;
        let artifact: Artifact = serde_json::from_str(json).unwrap();
        assert_eq!(artifact.url.as_deref(), Some("/tmp/a.png"));
        assert!(artifact.consistency_score.is_none());
    }

    #[test]
    fn test_shot_spec_defaults_when_deserialized() {
        let json = r#"{"shotId":"a","sceneId":"s","shotType":"close_up","prompt":"p"}"#;
        let shot: ShotSpec = serde_json::from_str(json).unwrap();
        assert_eq!(shot.shot_type, ShotType::Close);
        assert_eq!(shot.cfg_scale, 7.5);
        assert_eq!(shot.steps, 30);
    }

    #[test]
    fn test_failed_artifact_has_no_location() {
        let spec = ShotSpec::new("a", "s", ShotType::Medium, "p");
        let artifact = Artifact::failed(&spec, "backend down");
        assert!(!artifact.success);
        assert!(!artifact.has_location());
        assert_eq!(artifact.error.as_deref(), Some("backend down"));
    }

    #[test]
    fn test_passing_peer_requires_score() {
        let mut scored = artifact("a", "s");
        scored.consistency_score = Some(0.9);
        let group = SceneGroup {
            scene_id: "s".into(),
            artifacts: vec![artifact("b", "s"), scored.clone()],
        };
        assert_eq!(group.passing_peer(0.85), Some(&scored));
        assert!(group.passing_peer(0.95).is_none());
    }
}
