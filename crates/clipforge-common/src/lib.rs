//! Shared domain types for the clipforge pipeline.
//!
//! Everything that crosses a stage boundary lives here: the generated
//! [`Artifact`] and the [`ShotSpec`] it was rendered from, the universal
//! [`StageResult`] envelope, the [`ConsistencyReport`] and [`RetryStats`]
//! produced by scoring and regeneration, and the collaborator traits the
//! pipeline uses to reach generative backends.

pub mod artifact;
pub mod collaborators;
pub mod error;
pub mod report;
pub mod result;

pub use artifact::{Artifact, SceneGroup, ShotSpec, ShotType, group_by_scene};
pub use collaborators::{
    Completion, FeatureExtractor, FeatureOutcome, GeneratedImage, GenerationBackend, Hotspot,
    HotspotSource, ImageFeatures, Script, ScriptScene, SynthesisRequest, Synthesizer, TextModel,
    TokenUsage,
};
pub use error::{BackendError, ErrorKind};
pub use report::{
    AnalysisMode, ConsistencyReport, DimensionReport, Dimensions, RetryStats, SceneRetryDetail,
};
pub use result::{ErrorDetails, StageResult};
