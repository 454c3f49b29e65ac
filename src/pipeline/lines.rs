//! Line-level heuristics shared by the renderer and the body locator.
//!
//! Running headers and footers ("Preprint. Under review.", the conference
//! name, the paper's short title) repeat on nearly every page. A line's
//! *signature* drops case, digits and punctuation so "Conference 2024, p. 3"
//! and "Conference 2024, p. 4" collapse to one key, and a
//! [`LineFrequencyIndex`] counts signatures across the document.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Raw lines longer than this are body prose, never boilerplate.
pub const MAX_BOILERPLATE_RAW_CHARS: usize = 80;
/// Signatures shorter than this are too generic to count.
pub const MIN_SIGNATURE_CHARS: usize = 4;

static RE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());
static RE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\u{4e00}-\u{9fff}\s]").unwrap());
static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

static RE_PAGE_NUMBERS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"^\d+$").unwrap(),
        Regex::new(r"^page\s*\d+(\s*/\s*\d+)?$").unwrap(),
        Regex::new(r"^\d+\s*/\s*\d+$").unwrap(),
    ]
});

/// Normalized signature of a line: lowercased, digits and punctuation
/// removed, whitespace runs collapsed to one space.
pub fn line_signature(line: &str) -> String {
    let lowered = line.trim().to_lowercase();
    let s = RE_DIGITS.replace_all(&lowered, "");
    let s = RE_PUNCT.replace_all(&s, "");
    RE_SPACES.replace_all(&s, " ").into_owned()
}

/// `12`, `page 3`, `Page 3 / 10`, `3/10`.
pub fn looks_like_page_number(line: &str) -> bool {
    let normalized = line.trim().to_lowercase();
    RE_PAGE_NUMBERS.iter().any(|re| re.is_match(&normalized))
}

/// Occurrence counts of line signatures across one document.
#[derive(Debug, Default, Clone)]
pub struct LineFrequencyIndex {
    counts: HashMap<String, usize>,
}

impl LineFrequencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `line` if it is a boilerplate candidate.
    pub fn observe(&mut self, line: &str) {
        if line.chars().count() > MAX_BOILERPLATE_RAW_CHARS || looks_like_page_number(line) {
            return;
        }
        let sig = line_signature(line);
        if sig.chars().count() < MIN_SIGNATURE_CHARS {
            return;
        }
        *self.counts.entry(sig).or_insert(0) += 1;
    }

    pub fn count(&self, signature: &str) -> usize {
        self.counts.get(signature).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_number_shapes() {
        assert!(looks_like_page_number("12"));
        assert!(looks_like_page_number(" Page 3 "));
        assert!(looks_like_page_number("page3/10"));
        assert!(looks_like_page_number("3 / 10"));
        assert!(!looks_like_page_number("3 pages"));
        assert!(!looks_like_page_number("Section 3"));
    }

    #[test]
    fn signature_drops_digits_and_punctuation() {
        assert_eq!(line_signature("Conference 2024"), "conference ");
        assert_eq!(
            line_signature("Preprint. Under   review!"),
            "preprint under review"
        );
        assert_eq!(line_signature("第3章 引言"), "第章 引言");
    }

    #[test]
    fn index_skips_long_short_and_numeric_lines() {
        let mut idx = LineFrequencyIndex::new();
        idx.observe("42");
        idx.observe("a1");
        idx.observe(&"long sentence ".repeat(10));
        assert!(idx.is_empty());

        idx.observe("Conference 2024");
        idx.observe("Conference 2025");
        assert_eq!(idx.count(&line_signature("Conference 2024")), 2);
        assert_eq!(idx.len(), 1);
    }
}
