//! Hashtag extraction and validation.
//!
//! The match pattern is `#([A-Za-z0-9_-]+)\b`. A match survives validation
//! when, normalized to lowercase, it matches `[a-z0-9_-]+` and contains at
//! least one letter. Two rejection rules on the *source* form:
//!
//! - purely numeric tags (`#123`) carry no topic,
//! - all-uppercase tags of length ≥ 8 are treated as shouting constants
//!   (`#DEADLINE_EOD`), while short ones like `#TRADING` normalize to
//!   `trading` and are kept.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Characters of context captured on each side of a match.
const CONTEXT_CHARS: usize = 20;

/// One validated hashtag occurrence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HashtagOccurrence {
    /// Normalized lowercase tag.
    pub tag: String,
    /// Workspace-relative source file.
    pub file: String,
    /// 1-indexed line of the match.
    pub line: usize,
    /// Up to ±20 chars of surrounding text, newlines flattened.
    pub context: String,
}

/// Aggregated occurrences of one tag.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagStats {
    pub count: usize,
    pub occurrences: Vec<HashtagOccurrence>,
}

/// Validate and normalize a raw hashtag body (the text after `#`).
pub fn normalize_tag(raw: &str) -> Option<String> {
    let has_letter = raw.chars().any(|c| c.is_ascii_alphabetic());
    if !has_letter {
        return None;
    }
    let all_upper = raw
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .all(|c| c.is_ascii_uppercase());
    if all_upper && raw.len() >= 8 {
        return None;
    }
    Some(raw.to_ascii_lowercase())
}

/// Extract every valid hashtag in `text`, grouped by normalized tag.
pub fn extract_hashtags(text: &str, file: &str) -> BTreeMap<String, TagStats> {
    let mut tags: BTreeMap<String, TagStats> = BTreeMap::new();
    for occurrence in scan_occurrences(text, file) {
        let stats = tags.entry(occurrence.tag.clone()).or_default();
        stats.count += 1;
        stats.occurrences.push(occurrence);
    }
    tags
}

/// Normalized tags of `text` in first-seen order, deduplicated.
pub fn detect_tags(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for occurrence in scan_occurrences(text, "") {
        if !seen.contains(&occurrence.tag) {
            seen.push(occurrence.tag);
        }
    }
    seen
}

fn scan_occurrences(text: &str, file: &str) -> Vec<HashtagOccurrence> {
    let re = Regex::new(r"#([A-Za-z0-9_-]+)\b").expect("static regex");
    let mut out = Vec::new();
    for caps in re.captures_iter(text) {
        let whole = caps.get(0).expect("match");
        let Some(tag) = normalize_tag(&caps[1]) else {
            continue;
        };
        let line = text[..whole.start()].matches('\n').count() + 1;
        out.push(HashtagOccurrence {
            tag,
            file: file.to_string(),
            line,
            context: context_around(text, whole.start(), whole.end()),
        });
    }
    out
}

/// Slice up to `CONTEXT_CHARS` chars either side of `[start, end)`,
/// respecting char boundaries.
fn context_around(text: &str, start: usize, end: usize) -> String {
    let ctx_start = step_chars_back(text, start, CONTEXT_CHARS);
    let ctx_end = step_chars_forward(text, end, CONTEXT_CHARS);
    text[ctx_start..ctx_end].replace('\n', " ").trim().to_string()
}

fn step_chars_back(text: &str, mut i: usize, n: usize) -> usize {
    for _ in 0..n {
        if i == 0 {
            break;
        }
        i -= 1;
        while i > 0 && !text.is_char_boundary(i) {
            i -= 1;
        }
    }
    i
}

fn step_chars_forward(text: &str, mut i: usize, n: usize) -> usize {
    for _ in 0..n {
        if i >= text.len() {
            break;
        }
        i += 1;
        while i < text.len() && !text.is_char_boundary(i) {
            i += 1;
        }
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_numeric_and_long_uppercase_tags() {
        assert_eq!(normalize_tag("123"), None);
        assert_eq!(normalize_tag("DEADLINE"), None); // 8 chars, all caps
        assert_eq!(normalize_tag("URGENT_TODO"), None);
        assert_eq!(normalize_tag("TRADING"), Some("trading".to_string())); // 7 chars
        assert_eq!(normalize_tag("Trading"), Some("trading".to_string()));
        assert_eq!(normalize_tag("py3"), Some("py3".to_string()));
    }

    #[test]
    fn extracts_and_groups_by_normalized_tag() {
        let text = "## Trading\n#Trading went well\nmore #trading and #python\n#123 ignored\n";
        let tags = extract_hashtags(text, "memory-2026-02-05.md");

        assert_eq!(tags.len(), 2);
        assert_eq!(tags["trading"].count, 2);
        assert_eq!(tags["python"].count, 1);
        assert_eq!(tags["trading"].occurrences[0].line, 2);
        assert_eq!(tags["trading"].occurrences[1].line, 3);
        assert_eq!(tags["python"].occurrences[0].file, "memory-2026-02-05.md");
    }

    #[test]
    fn context_captures_surrounding_text() {
        let text = "went for a run this morning #health felt great afterwards";
        let tags = extract_hashtags(text, "x.md");
        let ctx = &tags["health"].occurrences[0].context;
        assert!(ctx.contains("#health"), "context was {ctx:?}");
        assert!(ctx.contains("morning"), "context was {ctx:?}");
    }

    #[test]
    fn detect_tags_preserves_first_seen_order() {
        let tags = detect_tags("#trading #python #trading #health");
        assert_eq!(tags, vec!["trading", "python", "health"]);
    }

    #[test]
    fn underscore_and_hyphen_tags_are_valid() {
        assert_eq!(detect_tags("#side_project #week-review"), vec![
            "side_project",
            "week-review"
        ]);
    }

    #[test]
    fn context_is_char_boundary_safe() {
        let text = "ünïcödé prefix text #tag suffix";
        let tags = extract_hashtags(text, "x.md");
        assert_eq!(tags["tag"].count, 1);
    }
}
