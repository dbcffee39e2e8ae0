//! Concrete pipeline stages built on the collaborator traits.

pub mod consistency;
pub mod generation;
pub mod hotspot;
pub mod script;
pub mod storyboard;
pub mod synthesis;

pub use consistency::ConsistencyStage;
pub use generation::{ImageGenerationConfig, ImageGenerationStage, KeyframeStage};
pub use hotspot::HotspotStage;
pub use script::ScriptStage;
pub use storyboard::StoryboardStage;
pub use synthesis::SynthesisStage;

/// Input and output field names exchanged between stages.
pub mod fields {
    pub const KEYWORDS: &str = "keywords";
    pub const COUNT: &str = "count";
    pub const STYLE: &str = "style";
    pub const DURATION: &str = "duration";
    pub const BATCH_SIZE: &str = "batchSize";
    pub const OUTPUT_FILENAME: &str = "outputFilename";

    pub const HOTSPOTS: &str = "hotspots";
    pub const SCRIPT: &str = "script";
    pub const STORYBOARD: &str = "storyboard";
    pub const KEYFRAMES: &str = "keyframes";
    pub const ARTIFACTS: &str = "artifacts";
    pub const REPORT: &str = "report";
    pub const PASSED_ARTIFACTS: &str = "passedArtifacts";
    pub const FAILED_ARTIFACTS: &str = "failedArtifacts";
    pub const VIDEO_PATH: &str = "videoPath";
}
