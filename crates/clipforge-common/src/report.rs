//! Consistency reports and regeneration bookkeeping.

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;

/// Score, issues and a human-readable summary for one scoring dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionReport {
    pub score: f64,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub details: String,
}

impl DimensionReport {
    pub fn new(score: f64, issues: Vec<String>, details: impl Into<String>) -> Self {
        Self {
            score: score.clamp(0.0, 1.0),
            issues,
            details: details.into(),
        }
    }

    pub fn empty(details: impl Into<String>) -> Self {
        Self {
            score: 0.0,
            issues: Vec::new(),
            details: details.into(),
        }
    }
}

/// Which signal source produced the style and character scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// Image features from the feature extractor.
    Features,
    /// Keywords parsed from prompt text.
    #[default]
    Heuristic,
}

/// The four named dimensions of a consistency evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    pub style_consistency: DimensionReport,
    pub character_consistency: DimensionReport,
    pub scene_consistency: DimensionReport,
    pub quality_check: DimensionReport,
}

impl Dimensions {
    pub fn mean_score(&self) -> f64 {
        (self.style_consistency.score
            + self.character_consistency.score
            + self.scene_consistency.score
            + self.quality_check.score)
            / 4.0
    }

    /// Issues from every dimension, in dimension order.
    pub fn all_issues(&self) -> Vec<String> {
        [
            &self.style_consistency,
            &self.character_consistency,
            &self.scene_consistency,
            &self.quality_check,
        ]
        .iter()
        .flat_map(|d| d.issues.iter().cloned())
        .collect()
    }
}

/// Per-batch consistency evaluation. Never mutated after it is returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub dimensions: Dimensions,
    pub overall_score: f64,
    pub passed_artifacts: Vec<Artifact>,
    pub failed_artifacts: Vec<Artifact>,
    pub pass_rate: f64,
    pub threshold: f64,
    pub mode: AnalysisMode,
}

impl ConsistencyReport {
    /// Report for an empty batch: zero score, nothing classified.
    pub fn degenerate(threshold: f64) -> Self {
        Self {
            dimensions: Dimensions {
                style_consistency: DimensionReport::empty("no artifacts to evaluate"),
                character_consistency: DimensionReport::empty("no artifacts to evaluate"),
                scene_consistency: DimensionReport::empty("no artifacts to evaluate"),
                quality_check: DimensionReport::empty("no artifacts to evaluate"),
            },
            overall_score: 0.0,
            passed_artifacts: Vec::new(),
            failed_artifacts: Vec::new(),
            pass_rate: 0.0,
            threshold,
            mode: AnalysisMode::Heuristic,
        }
    }

    pub fn total_artifacts(&self) -> usize {
        self.passed_artifacts.len() + self.failed_artifacts.len()
    }
}

/// Outcome of regenerating a single scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneRetryDetail {
    pub scene_id: String,
    pub retry_count: u32,
    pub success: bool,
    pub passed_count: usize,
    pub failed_count: usize,
}

/// Aggregate bookkeeping for one regeneration pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryStats {
    pub total_scenes: usize,
    pub total_retries: u32,
    pub successful_regenerations: usize,
    pub failed_regenerations: usize,
    pub retry_details: Vec<SceneRetryDetail>,
}

impl RetryStats {
    pub fn record(&mut self, detail: SceneRetryDetail) {
        self.total_scenes += 1;
        self.total_retries += detail.retry_count;
        if detail.success {
            self.successful_regenerations += 1;
        } else {
            self.failed_regenerations += 1;
        }
        self.retry_details.push(detail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_report_clamps_score() {
        assert_eq!(DimensionReport::new(1.4, vec![], "").score, 1.0);
        assert_eq!(DimensionReport::new(-0.2, vec![], "").score, 0.0);
    }

    #[test]
    fn test_degenerate_report_is_empty() {
        let report = ConsistencyReport::degenerate(0.8);
        assert_eq!(report.overall_score, 0.0);
        assert_eq!(report.pass_rate, 0.0);
        assert_eq!(report.total_artifacts(), 0);
    }

    #[test]
    fn test_retry_stats_record_aggregates() {
        let mut stats = RetryStats::default();
        stats.record(SceneRetryDetail {
            scene_id: "a".into(),
            retry_count: 2,
            success: true,
            passed_count: 2,
            failed_count: 0,
        });
        stats.record(SceneRetryDetail {
            scene_id: "b".into(),
            retry_count: 3,
            success: false,
            passed_count: 0,
            failed_count: 1,
        });
        assert_eq!(stats.total_scenes, 2);
        assert_eq!(stats.total_retries, 5);
        assert_eq!(stats.successful_regenerations, 1);
        assert_eq!(stats.failed_regenerations, 1);
    }

    #[test]
    fn test_report_serializes_named_dimensions() {
        let value = serde_json::to_value(ConsistencyReport::degenerate(0.8)).unwrap();
        assert!(value["dimensions"].get("styleConsistency").is_some());
        assert!(value["dimensions"].get("qualityCheck").is_some());
        assert!(value.get("passRate").is_some());
    }
}
