use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::clipforge_config::{CONFIG_FILE, ClipforgeToml};

/// Runtime configuration for clipforge.
///
/// Resolves the project directory layout and carries the parsed
/// `clipforge.toml` alongside CLI switches.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub clipforge_dir: PathBuf,
    pub config_file: PathBuf,
    pub log_dir: PathBuf,
    pub tracking_file: PathBuf,
    pub verbose: bool,
    pub toml: ClipforgeToml,
}

impl Config {
    pub fn new(project_dir: &Path, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let clipforge_dir = project_dir.join(".clipforge");
        let toml = ClipforgeToml::load_or_default(&clipforge_dir)?;

        let tracking_file = if toml.tracking.file.is_absolute() {
            toml.tracking.file.clone()
        } else {
            clipforge_dir.join(&toml.tracking.file)
        };

        Ok(Self {
            config_file: clipforge_dir.join(CONFIG_FILE),
            log_dir: clipforge_dir.join("logs"),
            tracking_file,
            project_dir,
            clipforge_dir,
            verbose,
            toml,
        })
    }

    /// Project name from config, or the directory name.
    pub fn project_name(&self) -> String {
        self.toml.project.name.clone().unwrap_or_else(|| {
            self.project_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "clipforge".to_string())
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.log_dir).context("Failed to create log directory")?;
        if let Some(parent) = self.tracking_file.parent() {
            std::fs::create_dir_all(parent).context("Failed to create tracking directory")?;
        }
        Ok(())
    }
}
