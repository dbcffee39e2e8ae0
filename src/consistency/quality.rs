use clipforge_common::{Artifact, DimensionReport};

use super::metrics;

/// Quality of a single artifact from its generation outcome.
pub fn artifact_quality(artifact: &Artifact) -> f64 {
    if !artifact.success {
        0.0
    } else if artifact.error.is_some() {
        0.5
    } else if !artifact.has_location() {
        0.3
    } else {
        0.95
    }
}

pub fn score(artifacts: &[Artifact]) -> DimensionReport {
    let qualities: Vec<f64> = artifacts.iter().map(artifact_quality).collect();
    let issues = artifacts
        .iter()
        .filter_map(|a| {
            if !a.success {
                Some(format!(
                    "{} failed to generate: {}",
                    a.shot_id,
                    a.error.as_deref().unwrap_or("unknown error")
                ))
            } else if !a.has_location() {
                Some(format!("{} has no image location", a.shot_id))
            } else {
                None
            }
        })
        .collect();
    let generated = artifacts.iter().filter(|a| a.success).count();
    DimensionReport::new(
        metrics::mean(&qualities).unwrap_or(0.0),
        issues,
        format!("{generated}/{} artifacts generated", artifacts.len()),
    )
}
