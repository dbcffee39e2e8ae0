//! Full pipeline execution: `clipforge run`.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

use super::super::{Cli, RunArgs};

/// Merge `--params FILE` with the individual flags; flags win.
pub fn build_params(args: &RunArgs) -> Result<Map<String, Value>> {
    let mut params = match &args.params {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read params file: {}", path.display()))?;
            match serde_json::from_str::<Value>(&content)
                .with_context(|| format!("Failed to parse params file: {}", path.display()))?
            {
                Value::Object(map) => map,
                _ => anyhow::bail!("Params file {} must contain a JSON object", path.display()),
            }
        }
        None => Map::new(),
    };

    if let Some(keywords) = &args.keywords {
        params.insert("keywords".into(), Value::from(keywords.as_str()));
    }
    if let Some(count) = args.count {
        params.insert("count".into(), Value::from(count));
    }
    if let Some(style) = &args.style {
        params.insert("style".into(), Value::from(style.as_str()));
    }
    if let Some(duration) = args.duration {
        params.insert("duration".into(), Value::from(duration));
    }
    if let Some(batch_size) = args.batch_size {
        params.insert("batchSize".into(), Value::from(batch_size));
    }
    if args.no_retry_failed {
        params.insert("retryFailed".into(), Value::Bool(false));
    }
    if let Some(output) = &args.output {
        params.insert("outputFilename".into(), Value::from(output.as_str()));
    }
    Ok(params)
}

/// Run the pipeline and print the result JSON. Returns whether it succeeded.
pub async fn cmd_run(project_dir: &Path, cli: &Cli, args: &RunArgs) -> Result<bool> {
    use clipforge::backends::HttpBackend;
    use clipforge::config::Config;
    use clipforge::orchestrator::{Backends, Orchestrator, STAGE_COUNT};
    use clipforge::ui::PipelineUI;

    let config = Config::new(project_dir, cli.verbose)?;
    config.ensure_directories()?;
    let _guard = clipforge::logging::init(&config.log_dir, cli.verbose, cli.log_json)?;

    for warning in config.toml.validate() {
        tracing::warn!("config: {warning}");
    }

    let params = build_params(args)?;
    let backend = HttpBackend::from_config(&config.toml.backend)?;
    tracing::info!(
        project = %config.project_name(),
        backend = %backend.base_url(),
        "starting pipeline"
    );
    let backends = Backends::from_http(backend, config.toml.consistency.feature_extraction);
    let orchestrator = Orchestrator::from_config(&config.toml, config.tracking_file.clone(), backends)?
        .with_ui(Arc::new(PipelineUI::new(STAGE_COUNT, cli.verbose)));

    let result = orchestrator.run(params).await;

    println!(
        "{}",
        serde_json::to_string_pretty(&result).context("Failed to serialize pipeline result")?
    );
    Ok(result.success)
}
