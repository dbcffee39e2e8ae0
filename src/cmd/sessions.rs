//! Tracking document inspection: `clipforge sessions [ID]`.

use anyhow::{Context, Result};
use std::path::Path;

pub fn cmd_sessions(project_dir: &Path, id: Option<&str>, json: bool) -> Result<()> {
    use clipforge::config::Config;
    use clipforge::tracking::TrackingStore;
    use clipforge::tracking::summary::{display_session, display_sessions};

    let config = Config::new(project_dir, false)?;
    let store = TrackingStore::load(&config.tracking_file)
        .with_context(|| format!("Failed to load {}", config.tracking_file.display()))?;

    match id {
        Some(id) => {
            let summary = store
                .session_summary(id)
                .with_context(|| format!("Session '{}' not found", id))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                display_session(&summary);
            }
        }
        None => {
            let summary = store.all_sessions_summary();
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                display_sessions(&summary);
            }
        }
    }

    Ok(())
}
