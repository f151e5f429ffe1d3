//! Locates the span of a user selection inside current message content.
//!
//! The selection string was captured from a rendered view and the content
//! may have shifted since (re-render, concurrent edits), so matching runs a
//! cascade from exact to increasingly fuzzy strategies. The cascade never
//! fails: when nothing matches, the plan degrades to appending the new text
//! behind a marker.

use regex::Regex;
use serde::Serialize;
use tracing::warn;

/// How the replacement span was located
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MatchStrategy {
    /// Verbatim substring at a known byte span
    Exact { start: usize, end: usize },
    /// Whitespace-tolerant regex built from the original selection, applied
    /// globally
    Normalized { pattern: String },
    /// Coarse fallback: swap a single anchor word for the replacement's
    /// first word
    WordAnchor { anchor: String },
    /// Nothing matched; append `*[Rephrased]: <new text>*`
    AppendMarker,
}

/// A replacement plan produced by [`locate`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextPlan {
    pub strategy: MatchStrategy,
    /// Similarity between the selection and what the plan will touch,
    /// 0.0..=1.0
    pub confidence: f64,
    /// Set on lossy strategies whose output the user should check
    pub needs_review: bool,
}

/// Find the best-effort span for `original` inside `content`.
pub fn locate(original: &str, content: &str) -> TextPlan {
    if original.trim().is_empty() {
        return TextPlan {
            strategy: MatchStrategy::AppendMarker,
            confidence: 0.0,
            needs_review: false,
        };
    }

    if let Some(start) = content.find(original) {
        return TextPlan {
            strategy: MatchStrategy::Exact {
                start,
                end: start + original.len(),
            },
            confidence: 1.0,
            needs_review: false,
        };
    }

    let normalized_original = normalize_ws(original);
    if normalize_ws(content).contains(&normalized_original) {
        return TextPlan {
            strategy: MatchStrategy::Normalized {
                pattern: flexible_pattern(original),
            },
            confidence: 1.0,
            needs_review: false,
        };
    }

    let words: Vec<&str> = original
        .split_whitespace()
        .filter(|w| w.chars().count() > 2)
        .collect();
    if !words.is_empty() {
        let present = words.iter().filter(|w| content.contains(**w)).count();
        if present as f64 / words.len() as f64 > 0.7 {
            let anchor = original
                .split_whitespace()
                .find(|w| w.chars().count() > 4 && content.contains(*w));
            if let Some(anchor) = anchor {
                return TextPlan {
                    strategy: MatchStrategy::WordAnchor {
                        anchor: anchor.to_string(),
                    },
                    confidence: anchor_confidence(&normalized_original, content, anchor),
                    needs_review: true,
                };
            }
        }
    }

    TextPlan {
        strategy: MatchStrategy::AppendMarker,
        confidence: 0.0,
        needs_review: false,
    }
}

/// Execute a plan against `content`, substituting `replacement`.
pub fn apply(plan: &TextPlan, content: &str, replacement: &str) -> String {
    match &plan.strategy {
        MatchStrategy::Exact { start, end } => {
            if *start > *end
                || *end > content.len()
                || !content.is_char_boundary(*start)
                || !content.is_char_boundary(*end)
            {
                // The content changed between locate and apply; degrade
                // instead of slicing out of bounds.
                return append_marker(content, replacement);
            }
            let mut out = String::with_capacity(content.len() + replacement.len());
            out.push_str(&content[..*start]);
            out.push_str(replacement);
            out.push_str(&content[*end..]);
            out
        }
        MatchStrategy::Normalized { pattern } => match Regex::new(pattern) {
            Ok(re) => re
                .replace_all(content, regex::NoExpand(replacement))
                .into_owned(),
            Err(err) => {
                warn!(%err, "replacement pattern did not compile; appending instead");
                append_marker(content, replacement)
            }
        },
        MatchStrategy::WordAnchor { anchor } => {
            let first_word = replacement.split_whitespace().next().unwrap_or(replacement);
            content.replacen(anchor.as_str(), first_word, 1)
        }
        MatchStrategy::AppendMarker => append_marker(content, replacement),
    }
}

fn append_marker(content: &str, replacement: &str) -> String {
    format!("{}\n\n*[Rephrased]: {}*", content, replacement)
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Escaped form of the original with whitespace runs generalized to `\s+`,
/// so the global replace tolerates spacing that drifted in re-rendering.
fn flexible_pattern(original: &str) -> String {
    original
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+")
}

/// Similarity between the selection and the neighborhood around the anchor,
/// used to score review-flagged plans.
fn anchor_confidence(normalized_original: &str, content: &str, anchor: &str) -> f64 {
    let Some(pos) = content.find(anchor) else {
        return 0.0;
    };
    let half = normalized_original.len() / 2;
    let start = floor_char_boundary(content, pos.saturating_sub(half));
    let end = ceil_char_boundary(content, (pos + anchor.len() + half).min(content.len()));
    strsim::jaro_winkler(normalized_original, &normalize_ws(&content[start..end]))
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    while index < s.len() && !s.is_char_boundary(index) {
        index += 1;
    }
    index
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_substitutes_only_the_span() {
        let plan = locate("Hello world", "Say: Hello world!");
        assert!(matches!(plan.strategy, MatchStrategy::Exact { .. }));
        assert_eq!(plan.confidence, 1.0);
        assert!(!plan.needs_review);

        let out = apply(&plan, "Say: Hello world!", "Greetings, planet");
        assert_eq!(out, "Say: Greetings, planet!");
    }

    #[test]
    fn test_exact_match_takes_first_occurrence() {
        let content = "abc then abc again";
        let plan = locate("abc", content);
        let out = apply(&plan, content, "xyz");
        assert_eq!(out, "xyz then abc again");
    }

    #[test]
    fn test_normalized_match_tolerates_whitespace_drift() {
        let plan = locate("Hello   world", "Say: Hello world!");
        match &plan.strategy {
            MatchStrategy::Normalized { pattern } => assert_eq!(pattern, r"Hello\s+world"),
            other => panic!("expected normalized strategy, got {:?}", other),
        }

        let out = apply(&plan, "Say: Hello world!", "Greetings");
        assert_eq!(out, "Say: Greetings!");
    }

    #[test]
    fn test_normalized_match_spans_newlines() {
        let content = "first line Hello\nworld second line";
        let plan = locate("Hello world", content);
        let out = apply(&plan, content, "REPLACED");
        assert_eq!(out, "first line REPLACED second line");
    }

    #[test]
    fn test_normalized_replacement_is_global() {
        let content = "Hello  world and Hello\tworld";
        let plan = locate("Hello world", content);
        let out = apply(&plan, content, "X");
        assert_eq!(out, "X and X");
    }

    #[test]
    fn test_normalized_replacement_keeps_dollar_signs_literal() {
        let content = "price is  ten";
        let plan = locate("is ten", content);
        let out = apply(&plan, content, "is $10");
        assert_eq!(out, "price is $10");
    }

    #[test]
    fn test_word_anchor_on_partial_overlap() {
        let content = "The quick brown fox leaped over everything";
        let plan = locate("quick brown fox jumps", content);

        match &plan.strategy {
            MatchStrategy::WordAnchor { anchor } => assert_eq!(anchor, "quick"),
            other => panic!("expected word anchor, got {:?}", other),
        }
        assert!(plan.needs_review);
        assert!(plan.confidence > 0.0 && plan.confidence < 1.0);

        let out = apply(&plan, content, "nimble grey fox runs");
        assert_eq!(out, "The nimble brown fox leaped over everything");
    }

    #[test]
    fn test_low_overlap_falls_through_to_marker() {
        let content = "Say: Hello world!";
        let plan = locate("zzz unrelated text", content);
        assert_eq!(plan.strategy, MatchStrategy::AppendMarker);

        let out = apply(&plan, content, "brand new text");
        assert_eq!(out, "Say: Hello world!\n\n*[Rephrased]: brand new text*");
        assert!(out.ends_with("*[Rephrased]: brand new text*"));
    }

    #[test]
    fn test_overlap_without_long_anchor_word_falls_through() {
        // Every shared word is 4 characters or shorter, so strategy 3 has
        // no anchor to work with even though the overlap is 100%.
        let content = "the cat sat on the mat today";
        let plan = locate("cat sat mat", content);
        assert_eq!(plan.strategy, MatchStrategy::AppendMarker);
    }

    #[test]
    fn test_empty_selection_appends() {
        let plan = locate("   ", "some content");
        assert_eq!(plan.strategy, MatchStrategy::AppendMarker);
    }

    #[test]
    fn test_word_anchor_handles_multibyte_text() {
        let content = "my café münchen journey notes";
        let plan = locate("café münchen notes", content);

        match &plan.strategy {
            // "café" is only 4 chars; "münchen" is the first anchor-length
            // word present.
            MatchStrategy::WordAnchor { anchor } => assert_eq!(anchor, "münchen"),
            other => panic!("expected word anchor, got {:?}", other),
        }

        let out = apply(&plan, content, "wien");
        assert_eq!(out, "my café wien journey notes");
    }

    #[test]
    fn test_apply_with_stale_exact_span_degrades() {
        let plan = TextPlan {
            strategy: MatchStrategy::Exact { start: 10, end: 50 },
            confidence: 1.0,
            needs_review: false,
        };
        let out = apply(&plan, "short", "new");
        assert!(out.ends_with("*[Rephrased]: new*"));
    }
}
