//! Style consistency across successive artifacts.

use clipforge_common::{DimensionReport, ImageFeatures};
use std::collections::BTreeSet;

use super::keywords;
use super::metrics;

const COLOR_WEIGHT: f64 = 0.20;
const STYLE_WEIGHT: f64 = 0.25;
const COMPOSITION_WEIGHT: f64 = 0.15;
const TEXTURE_WEIGHT: f64 = 0.10;
const LIGHTING_WEIGHT: f64 = 0.15;
const CONTRAST_WEIGHT: f64 = 0.08;
const EDGES_WEIGHT: f64 = 0.07;

/// Pairs scoring below this are reported as issues.
const PAIR_ISSUE_THRESHOLD: f64 = 0.7;
/// Score when the batch mixes conflicting keywords.
pub const CONFLICT_SCORE: f64 = 0.65;
/// Score when no prompt carries a style keyword.
pub const NO_KEYWORD_SCORE: f64 = 0.8;

/// Weighted similarity of two feature sets, renormalised over the signals
/// both sides carry. `None` when they share no comparable signal.
pub fn pair_similarity(a: &ImageFeatures, b: &ImageFeatures) -> Option<f64> {
    let mut signals: Vec<(f64, f64)> = Vec::new();

    if let (Some(x), Some(y)) = (&a.color_histogram, &b.color_histogram)
        && let Some(s) = metrics::cosine(x, y)
    {
        signals.push((COLOR_WEIGHT, s));
    }
    if let (Some(x), Some(y)) = (&a.style_vector, &b.style_vector)
        && let Some(s) = metrics::cosine(x, y)
    {
        signals.push((STYLE_WEIGHT, s));
    }
    if let (Some(x), Some(y)) = (a.composition, b.composition) {
        signals.push((COMPOSITION_WEIGHT, metrics::composition(x, y)));
    }
    if let (Some(x), Some(y)) = (&a.texture, &b.texture)
        && let Some(s) = metrics::pearson(x, y)
    {
        signals.push((TEXTURE_WEIGHT, s));
    }
    if let (Some(x), Some(y)) = (&a.lighting, &b.lighting)
        && let Some(s) = metrics::bhattacharyya(x, y)
    {
        signals.push((LIGHTING_WEIGHT, s));
    }
    if let (Some(x), Some(y)) = (a.contrast, b.contrast) {
        signals.push((CONTRAST_WEIGHT, metrics::contrast(x, y)));
    }
    if let (Some(x), Some(y)) = (&a.edges, &b.edges)
        && let Some(s) = metrics::cosine(x, y)
    {
        signals.push((EDGES_WEIGHT, s));
    }

    let total_weight: f64 = signals.iter().map(|(w, _)| w).sum();
    if total_weight == 0.0 {
        return None;
    }
    Some(signals.iter().map(|(w, s)| w * s).sum::<f64>() / total_weight)
}

/// Feature-mode style score over `(shot id, features)` in batch order.
pub fn score_features(features: &[(&str, &ImageFeatures)]) -> DimensionReport {
    if features.len() < 2 {
        return DimensionReport::new(1.0, Vec::new(), "fewer than two images to compare");
    }

    let mut scores = Vec::new();
    let mut issues = Vec::new();
    for pair in features.windows(2) {
        let (id_a, a) = pair[0];
        let (id_b, b) = pair[1];
        let Some(score) = pair_similarity(a, b) else {
            continue;
        };
        if score < PAIR_ISSUE_THRESHOLD {
            issues.push(format!(
                "Style drift between {id_a} and {id_b} (similarity {score:.2})"
            ));
        }
        scores.push(score);
    }

    match metrics::mean(&scores) {
        Some(score) => DimensionReport::new(
            score,
            issues,
            format!("{} image pairs compared on visual features", scores.len()),
        ),
        None => DimensionReport::new(
            NO_KEYWORD_SCORE,
            issues,
            "no comparable visual signals between images",
        ),
    }
}

/// Heuristic style score from prompt keywords, in batch order.
pub fn score_prompts(prompts: &[&str]) -> DimensionReport {
    let sets: Vec<BTreeSet<&'static str>> = prompts.iter().map(|p| keywords::extract(p)).collect();

    if let Some((a, b)) = keywords::find_conflict(&sets) {
        return DimensionReport::new(
            CONFLICT_SCORE,
            vec![format!("Conflicting style keywords in batch: '{a}' vs '{b}'")],
            "prompt keywords conflict",
        );
    }

    let keyworded: Vec<&BTreeSet<&str>> = sets.iter().filter(|s| !s.is_empty()).collect();
    if keyworded.is_empty() {
        return DimensionReport::new(NO_KEYWORD_SCORE, Vec::new(), "no style keywords in prompts");
    }

    let overlaps: Vec<f64> = keyworded
        .windows(2)
        .map(|pair| metrics::jaccard(pair[0], pair[1]))
        .collect();
    let overlap = metrics::mean(&overlaps).unwrap_or(1.0);
    DimensionReport::new(
        0.7 + 0.25 * overlap,
        Vec::new(),
        format!("mean keyword overlap {overlap:.2}"),
    )
}
