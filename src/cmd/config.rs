//! Configuration view and validation commands: `clipforge config`.

use anyhow::Result;

use super::super::ConfigCommands;

pub fn cmd_config(project_dir: &std::path::Path, command: Option<ConfigCommands>) -> Result<()> {
    use clipforge::clipforge_config::{BACKEND_URL_ENV, ClipforgeToml, effective_max_retries};
    use clipforge::config::Config;

    let clipforge_dir = project_dir.join(".clipforge");
    let config_path = clipforge_dir.join("clipforge.toml");

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Clipforge Configuration");
            println!("=======================");
            println!();

            let toml = if config_path.exists() {
                println!("Config file: {}", config_path.display());
                ClipforgeToml::load(&config_path)?
            } else {
                println!("No clipforge.toml found at {}", config_path.display());
                println!("Using default configuration.");
                ClipforgeToml::default()
            };
            println!();

            if let Some(name) = &toml.project.name {
                println!("[project]");
                println!("  name = \"{}\"", name);
                println!();
            }

            println!("[pipeline]");
            println!("  count = {}", toml.pipeline.count);
            println!("  style = \"{}\"", toml.pipeline.style);
            println!("  duration = {}", toml.pipeline.duration);
            println!("  batch_size = {}", toml.pipeline.batch_size);
            println!("  retry_failed = {}", toml.pipeline.retry_failed);
            println!("  output_filename = \"{}\"", toml.pipeline.output_filename);
            println!();

            println!("[retry]");
            println!("  backoff_unit_ms = {}", toml.retry.backoff_unit_ms);
            println!("  attempt_timeout_secs = {}", toml.retry.attempt_timeout_secs);
            for (stage, retries) in effective_max_retries(&toml.retry.to_table()) {
                println!("  max_retries.{} = {}", stage, retries);
            }
            println!();

            println!("[consistency]");
            println!("  threshold = {}", toml.consistency.threshold);
            println!(
                "  regeneration_threshold = {}",
                toml.consistency.regeneration_threshold
            );
            println!(
                "  feature_extraction = {}",
                toml.consistency.feature_extraction
            );
            println!();

            println!("[regeneration]");
            println!("  max_retries = {}", toml.regeneration.max_retries);
            println!();

            println!("[backend]");
            println!("  base_url = \"{}\"", toml.backend.base_url);
            println!("  api_key_env = \"{}\"", toml.backend.api_key_env);
            println!(
                "  request_timeout_secs = {}",
                toml.backend.request_timeout_secs
            );
            println!();

            println!("[tracking]");
            println!("  file = \"{}\"", toml.tracking.file.display());
            println!();

            println!("Effective values (with env overrides):");
            println!(
                "  backend.base_url = \"{}\" ({} overrides)",
                toml.backend.resolved_base_url(),
                BACKEND_URL_ENV
            );
            println!(
                "  api key = {}",
                if toml.backend.api_key().is_some() {
                    "set"
                } else {
                    "not set"
                }
            );
            if let Ok(config) = Config::new(project_dir, false) {
                println!("  tracking file = {}", config.tracking_file.display());
            }
            println!();
            if !config_path.exists() {
                println!("Run 'clipforge config init' to create a clipforge.toml file.");
                println!();
            }
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No clipforge.toml found. Using defaults (valid).");
                return Ok(());
            }

            let toml = ClipforgeToml::load(&config_path)?;
            let warnings = toml.validate();

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                println!("clipforge.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            if !clipforge_dir.exists() {
                std::fs::create_dir_all(&clipforge_dir)?;
            }

            let toml = ClipforgeToml::default();
            toml.save(&config_path)?;

            println!("Created clipforge.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [pipeline] style, duration, batch_size");
            println!("  - [consistency] threshold, regeneration_threshold");
            println!("  - [backend] base_url, api_key_env");
            println!();
        }
    }

    Ok(())
}
