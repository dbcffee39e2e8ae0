//! Character continuity across successive artifacts.

use clipforge_common::DimensionReport;

use super::metrics;

/// Score for one successive pair given how many characters differ.
pub fn count_difference_score(difference: usize) -> f64 {
    match difference {
        0 => 1.0,
        1 => 0.85,
        _ => 0.70,
    }
}

/// Score successive character counts, `(shot id, count)` in batch order.
pub fn score_counts(counts: &[(&str, usize)], source: &str) -> DimensionReport {
    if counts.len() < 2 {
        return DimensionReport::new(1.0, Vec::new(), "fewer than two shots to compare");
    }

    let mut issues = Vec::new();
    let scores: Vec<f64> = counts
        .windows(2)
        .map(|pair| {
            let (id_a, a) = pair[0];
            let (id_b, b) = pair[1];
            let difference = a.abs_diff(b);
            if difference >= 2 {
                issues.push(format!(
                    "Character count changes from {a} to {b} between {id_a} and {id_b}"
                ));
            }
            count_difference_score(difference)
        })
        .collect();

    let score = metrics::mean(&scores).unwrap_or(1.0);
    DimensionReport::new(
        score,
        issues,
        format!("{} shot pairs compared on {source}", scores.len()),
    )
}
