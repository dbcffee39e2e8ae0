//! Similarity metrics over image feature signals. Every function returns a
//! value in `[0, 1]`, or `None` when the inputs cannot be compared.

use std::collections::BTreeSet;

/// Cosine similarity, clamped to `[0, 1]`.
pub fn cosine(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some((dot / (norm_a * norm_b)).clamp(0.0, 1.0))
}

/// `1 - d/√2` for two centroids in the unit square.
pub fn composition(a: [f64; 2], b: [f64; 2]) -> f64 {
    let d = ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt();
    (1.0 - d / std::f64::consts::SQRT_2).clamp(0.0, 1.0)
}

/// Pearson correlation mapped from `[-1, 1]` onto `[0, 1]`.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() < 2 || a.len() != b.len() {
        return None;
    }
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a == 0.0 || var_b == 0.0 {
        // Flat signals: identical means identical texture.
        return Some(if a == b { 1.0 } else { 0.5 });
    }
    let r = cov / (var_a.sqrt() * var_b.sqrt());
    Some(((r + 1.0) / 2.0).clamp(0.0, 1.0))
}

/// Bhattacharyya coefficient of two histograms, each normalised to sum 1.
pub fn bhattacharyya(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let sum_a: f64 = a.iter().map(|x| x.max(0.0)).sum();
    let sum_b: f64 = b.iter().map(|x| x.max(0.0)).sum();
    if sum_a == 0.0 || sum_b == 0.0 {
        return None;
    }
    let bc: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| ((x.max(0.0) / sum_a) * (y.max(0.0) / sum_b)).sqrt())
        .sum();
    Some(bc.clamp(0.0, 1.0))
}

/// `1 - |a - b|` for scalars in `[0, 1]`.
pub fn contrast(a: f64, b: f64) -> f64 {
    (1.0 - (a.clamp(0.0, 1.0) - b.clamp(0.0, 1.0)).abs()).clamp(0.0, 1.0)
}

/// Jaccard overlap of two sets. Two empty sets overlap fully.
pub fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
