//! Prompt keyword vocabulary used when image features are unavailable.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[a-z0-9]+").expect("valid regex"));

const STYLE: &[&str] = &[
    "cinematic",
    "realistic",
    "photorealistic",
    "cartoon",
    "anime",
    "watercolor",
    "oil painting",
    "sketch",
    "minimalist",
    "futuristic",
    "vintage",
    "retro",
    "surreal",
    "documentary",
];

const COLOR: &[&str] = &[
    "vibrant",
    "muted",
    "warm",
    "cool",
    "saturated",
    "desaturated",
    "colorful",
    "monochrome",
    "pastel",
    "neon",
    "golden",
    "teal",
];

const LIGHTING: &[&str] = &[
    "bright",
    "dark",
    "high key",
    "low key",
    "soft light",
    "hard light",
    "backlit",
    "golden hour",
    "sunset",
    "night",
    "studio lighting",
    "natural light",
];

const COMPOSITION: &[&str] = &[
    "wide shot",
    "medium shot",
    "close-up",
    "aerial",
    "symmetrical",
    "rule of thirds",
    "centered",
    "panoramic",
    "low angle",
    "high angle",
];

const MOOD: &[&str] = &[
    "happy",
    "sad",
    "calm",
    "tense",
    "cheerful",
    "gloomy",
    "dramatic",
    "peaceful",
    "mysterious",
    "epic",
    "nostalgic",
];

/// Keyword pairs that cannot describe the same visual style.
pub const CONFLICTS: &[(&str, &str)] = &[
    ("vibrant", "muted"),
    ("warm", "cool"),
    ("bright", "dark"),
    ("realistic", "cartoon"),
    ("photorealistic", "anime"),
    ("saturated", "desaturated"),
    ("colorful", "monochrome"),
    ("high key", "low key"),
    ("happy", "sad"),
    ("calm", "tense"),
    ("cheerful", "gloomy"),
    ("soft light", "hard light"),
    ("futuristic", "vintage"),
];

const PERSON_WORDS: &[&str] = &[
    "person",
    "people",
    "man",
    "men",
    "woman",
    "women",
    "boy",
    "girl",
    "child",
    "children",
    "kid",
    "character",
    "hero",
    "protagonist",
    "host",
    "presenter",
    "crowd",
    "figure",
    "face",
    "he",
    "she",
];

/// Lowercase alphanumeric tokens of `text`.
pub fn tokens(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    WORD.find_iter(&lower).map(|m| m.as_str().to_string()).collect()
}

/// Space-joined token stream padded on both ends, for phrase matching.
fn normalized(text: &str) -> String {
    format!(" {} ", tokens(text).join(" "))
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let needle = format!(" {} ", tokens(phrase).join(" "));
    haystack.contains(&needle)
}

/// Style keywords found in `prompt`, across every category.
pub fn extract(prompt: &str) -> BTreeSet<&'static str> {
    let haystack = normalized(prompt);
    [STYLE, COLOR, LIGHTING, COMPOSITION, MOOD]
        .iter()
        .flat_map(|category| category.iter())
        .filter(|kw| contains_phrase(&haystack, kw))
        .copied()
        .collect()
}

/// First conflicting pair with both sides present somewhere in `keyword_sets`.
pub fn find_conflict(keyword_sets: &[BTreeSet<&'static str>]) -> Option<(&'static str, &'static str)> {
    let all: BTreeSet<&str> = keyword_sets.iter().flatten().copied().collect();
    CONFLICTS
        .iter()
        .find(|(a, b)| all.contains(a) && all.contains(b))
        .copied()
}

/// Whether the prompt mentions a person.
pub fn mentions_person(prompt: &str) -> bool {
    let haystack = normalized(prompt);
    PERSON_WORDS.iter().any(|w| contains_phrase(&haystack, w))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_matches_phrases_and_words() {
        let found = extract("A Vibrant city, soft light, wide shot at golden hour");
        assert!(found.contains("vibrant"));
        assert!(found.contains("soft light"));
        assert!(found.contains("wide shot"));
        assert!(found.contains("golden hour"));
        assert!(!found.contains("hard light"));
    }

    #[test]
    fn test_extract_does_not_match_substrings() {
        let found = extract("a darkened coolant tank");
        assert!(!found.contains("dark"));
        assert!(!found.contains("cool"));
    }

    #[test]
    fn test_find_conflict_across_batch() {
        let sets = vec![extract("vibrant market"), extract("muted alley")];
        assert_eq!(find_conflict(&sets), Some(("vibrant", "muted")));
        let calm = vec![extract("vibrant market"), extract("vibrant alley")];
        assert_eq!(find_conflict(&calm), None);
    }

    #[test]
    fn test_mentions_person() {
        assert!(mentions_person("A woman walks through the rain"));
        assert!(!mentions_person("An empty street at dawn"));
        assert!(!mentions_person("a shell on the beach"));
    }
}
