pub mod backends;
pub mod clipforge_config;
pub mod config;
pub mod consistency;
pub mod errors;
pub mod logging;
pub mod orchestrator;
pub mod regeneration;
pub mod stage;
pub mod stages;
pub mod tracking;
pub mod ui;
pub mod util;

#[cfg(test)]
mod test_support;

pub use orchestrator::{Orchestrator, PipelineResult};
pub use stage::{Stage, StageInput, StageName};
