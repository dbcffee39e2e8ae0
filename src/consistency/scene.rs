//! Scene cohesion and cross-scene shot transitions.

use clipforge_common::{Artifact, DimensionReport, ShotSpec, ShotType, group_by_scene};
use std::collections::BTreeSet;

use super::keywords;
use super::metrics;

const COHESION_WEIGHT: f64 = 0.6;
const TRANSITION_WEIGHT: f64 = 0.4;
const ABRUPT_TRANSITION: f64 = 0.70;

/// Score of cutting from a scene ending on `last` to one opening on `first`.
pub fn transition_score(last: ShotType, first: ShotType) -> f64 {
    use ShotType::*;
    match (last, first) {
        (Wide, Medium) | (Medium, Close) => 0.95,
        (Wide, Wide) | (Medium, Medium) | (Close, Medium) | (Medium, Wide) => 0.85,
        (Close, Close) => 0.80,
        (Wide, Close) => 0.75,
        (Close, Wide) => ABRUPT_TRANSITION,
    }
}

fn prompt_tokens(prompt: &str) -> BTreeSet<String> {
    keywords::tokens(prompt)
        .into_iter()
        .filter(|t| t.len() > 2)
        .collect()
}

/// `0.6 + 0.4 × mean pairwise token overlap` of one scene's prompts.
fn cohesion(prompts: &[&str]) -> f64 {
    if prompts.len() < 2 {
        return 1.0;
    }
    let sets: Vec<BTreeSet<String>> = prompts.iter().map(|p| prompt_tokens(p)).collect();
    let mut overlaps = Vec::new();
    for i in 0..sets.len() {
        for j in (i + 1)..sets.len() {
            overlaps.push(metrics::jaccard(&sets[i], &sets[j]));
        }
    }
    0.6 + 0.4 * metrics::mean(&overlaps).unwrap_or(1.0)
}

/// Scene ids of `shots` with their first and last shot types, in order.
fn scene_bounds(shots: &[ShotSpec]) -> Vec<(&str, ShotType, ShotType)> {
    let mut bounds: Vec<(&str, ShotType, ShotType)> = Vec::new();
    for shot in shots {
        match bounds.iter_mut().find(|(id, _, _)| *id == shot.scene_id) {
            Some(entry) => entry.2 = shot.shot_type,
            None => bounds.push((&shot.scene_id, shot.shot_type, shot.shot_type)),
        }
    }
    bounds
}

pub fn score(artifacts: &[Artifact], storyboard: Option<&[ShotSpec]>) -> DimensionReport {
    let groups = group_by_scene(artifacts);
    let cohesions: Vec<f64> = groups
        .iter()
        .map(|g| {
            let prompts: Vec<&str> = g.artifacts.iter().map(|a| a.prompt.as_str()).collect();
            cohesion(&prompts)
        })
        .collect();
    let cohesion_score = metrics::mean(&cohesions).unwrap_or(1.0);

    let mut issues = Vec::new();
    let transitions: Vec<f64> = storyboard
        .map(scene_bounds)
        .filter(|bounds| bounds.len() >= 2)
        .map(|bounds| {
            bounds
                .windows(2)
                .map(|pair| {
                    let (from_id, _, last) = pair[0];
                    let (to_id, first, _) = pair[1];
                    let s = transition_score(last, first);
                    if s <= ABRUPT_TRANSITION {
                        issues.push(format!(
                            "Abrupt transition {last} -> {first} between scenes {from_id} and {to_id}"
                        ));
                    }
                    s
                })
                .collect()
        })
        .unwrap_or_default();

    match metrics::mean(&transitions) {
        Some(transition_score) => DimensionReport::new(
            COHESION_WEIGHT * cohesion_score + TRANSITION_WEIGHT * transition_score,
            issues,
            format!(
                "{} scenes, cohesion {cohesion_score:.2}, transitions {transition_score:.2}",
                groups.len()
            ),
        ),
        None => DimensionReport::new(
            cohesion_score,
            issues,
            format!("{} scenes, cohesion {cohesion_score:.2}", groups.len()),
        ),
    }
}
