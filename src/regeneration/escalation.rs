//! Prompt and sampler escalation for successive regeneration attempts.

use clipforge_common::ShotSpec;

const TIER_SUFFIXES: [&str; 3] = [
    "consistent style, uniform lighting",
    "matching color palette, coherent composition",
    "identical color grading, unified aesthetic",
];

const CFG_FLOORS: [f64; 3] = [2.0, 1.5, 1.0];
const CFG_STEP: f64 = 0.5;
const STEPS_PER_ATTEMPT: u32 = 5;

pub const NEGATIVE_SUFFIX: &str = "inconsistent style, varying lighting, mismatched colors";

/// Escalation tier for a 0-based attempt, capped at the strongest tier.
pub fn tier(attempt: u32) -> usize {
    (attempt as usize).min(TIER_SUFFIXES.len() - 1)
}

/// Cumulative prompt suffix for `attempt`.
pub fn prompt_suffix(attempt: u32) -> String {
    TIER_SUFFIXES[..=tier(attempt)].join(", ")
}

pub fn cfg_scale(base: f64, attempt: u32) -> f64 {
    let lowered = base - CFG_STEP * f64::from(attempt + 1);
    lowered.max(CFG_FLOORS[tier(attempt)])
}

pub fn steps(base: u32, attempt: u32) -> u32 {
    base.saturating_add(STEPS_PER_ATTEMPT.saturating_mul(attempt))
}

fn append(base: &str, suffix: &str) -> String {
    let base = base.trim().trim_end_matches(',');
    if base.is_empty() {
        suffix.to_string()
    } else {
        format!("{base}, {suffix}")
    }
}

/// Shot for regeneration attempt `attempt`, always derived from the original.
pub fn escalate(original: &ShotSpec, attempt: u32, reference_image: Option<&str>) -> ShotSpec {
    ShotSpec {
        prompt: append(&original.prompt, &prompt_suffix(attempt)),
        negative_prompt: append(&original.negative_prompt, NEGATIVE_SUFFIX),
        cfg_scale: cfg_scale(original.cfg_scale, attempt),
        steps: steps(original.steps, attempt),
        reference_image: reference_image
            .map(str::to_string)
            .or_else(|| original.reference_image.clone()),
        ..original.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_common::ShotType;

    fn shot() -> ShotSpec {
        ShotSpec::new("s1", "scene-1", ShotType::Medium, "a lighthouse at night")
    }

    #[test]
    fn test_suffix_accumulates_by_tier() {
        assert_eq!(prompt_suffix(0), "consistent style, uniform lighting");
        assert_eq!(
            prompt_suffix(1),
            "consistent style, uniform lighting, matching color palette, coherent composition"
        );
        assert_eq!(prompt_suffix(2), prompt_suffix(5));
        assert!(prompt_suffix(2).ends_with("identical color grading, unified aesthetic"));
    }

    #[test]
    fn test_cfg_lowers_to_floor() {
        assert_eq!(cfg_scale(7.5, 0), 7.0);
        assert_eq!(cfg_scale(7.5, 1), 6.5);
        assert_eq!(cfg_scale(2.0, 0), 2.0);
        assert_eq!(cfg_scale(2.0, 2), 1.0);
        assert_eq!(cfg_scale(1.0, 9), 1.0);
    }

    #[test]
    fn test_escalation_is_monotonic() {
        for base in [1.0, 2.5, 7.5, 12.0] {
            let mut previous: Option<(f64, u32, usize)> = None;
            for attempt in 0..8 {
                let current = (cfg_scale(base, attempt), steps(30, attempt), tier(attempt));
                if let Some((cfg, st, t)) = previous {
                    assert!(current.0 <= cfg, "cfg rose at attempt {attempt} for base {base}");
                    assert!(current.1 >= st);
                    assert!(current.2 >= t);
                }
                previous = Some(current);
            }
        }
    }

    #[test]
    fn test_escalate_rewrites_shot() {
        let escalated = escalate(&shot(), 1, Some("https://img/peer.png"));
        assert!(escalated.prompt.starts_with("a lighthouse at night, consistent style"));
        assert!(escalated.negative_prompt.contains("mismatched colors"));
        assert_eq!(escalated.steps, 35);
        assert_eq!(escalated.cfg_scale, 6.5);
        assert_eq!(escalated.reference_image.as_deref(), Some("https://img/peer.png"));
        assert_eq!(escalated.shot_id, "s1");
        assert_eq!(escalated.shot_type, ShotType::Medium);
    }
}
