//! Post-processing: deterministic cleanup and budget trimming of body text.
//!
//! Text pulled out of a PDF carries layout artefacts (NULs, hyphenated
//! line-wrap breaks, runs of spaces from column alignment) that waste tokens
//! without adding meaning. Each rule here is a pure `&str → String` pass so
//! the rules stay independently testable.
//!
//! The token budget is expressed in characters (≈4 per token). Text over the
//! budget is cut at the last paragraph break inside the final 30 % of the
//! window, otherwise hard at the limit, and gets [`TRUNCATION_MARKER`]
//! appended after a blank line.

use once_cell::sync::Lazy;
use regex::Regex;

/// Appended to text that was cut to fit the token budget.
pub const TRUNCATION_MARKER: &str = "[truncated]";

/// Characters per token used to turn a token budget into a character budget.
pub const CHARS_PER_TOKEN: usize = 4;

/// Smallest character budget applied to source-derived or cached text.
pub const MIN_TRIM_CHARS: usize = 400;

/// Apply every cleanup rule to the text of one body page.
///
/// Rules (applied in order):
/// 1. Replace control characters (other than newline and tab) with a space
/// 2. Join words hyphenated across a line break (`exam-\nple` → `example`)
/// 3. Collapse runs of spaces and tabs
/// 4. Collapse 3+ consecutive newlines down to 2
/// 5. Trim
pub fn clean_page_text(input: &str) -> String {
    let s = replace_control_chars(input);
    let s = join_hyphenated_breaks(&s);
    let s = collapse_horizontal_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

// ── Rule 1: Control characters ───────────────────────────────────────────────

fn replace_control_chars(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_control() && c != '\n' && c != '\t' {
                ' '
            } else {
                c
            }
        })
        .collect()
}

// ── Rule 2: De-hyphenate line-wrap breaks ────────────────────────────────────

static RE_HYPHEN_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"-\n([a-z])").unwrap());

fn join_hyphenated_breaks(input: &str) -> String {
    RE_HYPHEN_BREAK.replace_all(input, "${1}").into_owned()
}

// ── Rule 3: Horizontal whitespace ────────────────────────────────────────────

static RE_HSPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());

pub(crate) fn collapse_horizontal_whitespace(input: &str) -> String {
    RE_HSPACE.replace_all(input, " ").into_owned()
}

// ── Rule 4: Blank lines ──────────────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

pub(crate) fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").into_owned()
}

// ── Budget ───────────────────────────────────────────────────────────────────

/// Trim source-derived or cached text to `max_tokens`, never below
/// [`MIN_TRIM_CHARS`] characters.
pub fn trim_to_max_tokens(text: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN).max(MIN_TRIM_CHARS);
    truncate_chars(text, max_chars)
}

/// Cut `text` to at most `max_chars` characters plus the truncation marker.
///
/// Already-truncated text whose body fits is returned unchanged, so trimming
/// twice with the same or a larger budget is a no-op.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if let Some(body) = text.strip_suffix(TRUNCATION_MARKER) {
        let body = body.strip_suffix("\n\n").unwrap_or(body);
        if body.chars().count() <= max_chars {
            return text.to_string();
        }
    }

    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let mut trimmed = &text[..cut];
    if let Some(last_break) = trimmed.rfind("\n\n") {
        let break_chars = trimmed[..last_break].chars().count();
        if break_chars as f64 > max_chars as f64 * 0.7 {
            trimmed = &trimmed[..last_break];
        }
    }
    format!("{trimmed}\n\n{TRUNCATION_MARKER}")
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_chars_become_spaces() {
        assert_eq!(replace_control_chars("a\u{0}b\u{7}c\nd\te"), "a b c\nd\te");
    }

    #[test]
    fn test_hyphen_break_joins_lowercase_only() {
        assert_eq!(join_hyphenated_breaks("exam-\nple"), "example");
        assert_eq!(join_hyphenated_breaks("GPT-\n4"), "GPT-\n4");
        assert_eq!(join_hyphenated_breaks("Self-\nAttention"), "Self-\nAttention");
    }

    #[test]
    fn test_clean_page_text_pipeline() {
        let input = "  The  trans-\nformer\t\tmodel\n\n\n\n\nworks.\u{0}  ";
        assert_eq!(clean_page_text(input), "The transformer model\n\nworks.");
    }

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn test_truncate_prefers_late_paragraph_break() {
        let text = format!("{}\n\n{}", "a".repeat(80), "b".repeat(40));
        let out = truncate_chars(&text, 100);
        assert_eq!(out, format!("{}\n\n{TRUNCATION_MARKER}", "a".repeat(80)));
    }

    #[test]
    fn test_truncate_ignores_early_paragraph_break() {
        let text = format!("{}\n\n{}", "a".repeat(10), "b".repeat(200));
        let out = truncate_chars(&text, 100);
        assert!(out.starts_with(&"a".repeat(10)));
        assert_eq!(out.chars().count(), 100 + 2 + TRUNCATION_MARKER.len());
    }

    #[test]
    fn test_truncate_counts_characters_not_bytes() {
        let text = "引".repeat(50);
        let out = truncate_chars(&text, 10);
        assert!(out.starts_with(&"引".repeat(10)));
        assert!(!out.starts_with(&"引".repeat(11)));
    }

    #[test]
    fn test_trim_is_idempotent() {
        let text = "word ".repeat(1000);
        let once = trim_to_max_tokens(&text, 100);
        assert!(once.ends_with(TRUNCATION_MARKER));
        assert_eq!(trim_to_max_tokens(&once, 100), once);
        assert_eq!(trim_to_max_tokens(&once, 500), once);
    }

    #[test]
    fn test_trim_floor() {
        let text = "x".repeat(450);
        // 10 tokens would be 40 chars, but the floor keeps 400.
        let out = trim_to_max_tokens(&text, 10);
        assert!(out.starts_with(&"x".repeat(400)));
        assert!(out.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_trim_with_huge_budget() {
        let text = "short body";
        assert_eq!(trim_to_max_tokens(text, usize::MAX), text);
    }
}
