//! Body location: pick the page window holding the paper's prose.
//!
//! Front matter (title page, abstract, table of contents) and back matter
//! (references, appendices) are noise for an LLM asked about the method and
//! results. The window starts at the first page in the scan horizon that
//! looks like the introduction and is not a contents page, and stops at the
//! first later page that opens the references, bibliography or appendix.
//!
//! Within the window, page numbers, `arXiv:` stamps and lines repeated on
//! three or more pages are dropped before a page is judged or kept.

use crate::pipeline::lines::{line_signature, looks_like_page_number, LineFrequencyIndex};
use crate::pipeline::postprocess::{clean_page_text, truncate_chars, CHARS_PER_TOKEN};
use crate::pipeline::render::RenderedDocument;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Lines whose signature repeats at least this often are boilerplate.
const BOILERPLATE_MIN_REPEATS: usize = 3;
/// ... provided the signature is at most this long.
const BOILERPLATE_MAX_SIGNATURE_CHARS: usize = 60;

static RE_INTRO: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b1\s*\.?\s*introduction\b",
        r"(?i)\bintroduction\b",
        r"\b引言\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static RE_CONTENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bcontents\b").unwrap());

static RE_END: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\breferences\b",
        r"(?i)\bbibliography\b",
        r"\b参考文献\b",
        r"(?i)\bappendix\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Knobs for [`locate_body`].
#[derive(Debug, Clone, Copy)]
pub struct LocatorOptions {
    pub max_body_pages: usize,
    pub intro_scan_pages: usize,
    pub max_tokens: usize,
}

impl Default for LocatorOptions {
    fn default() -> Self {
        Self {
            max_body_pages: 15,
            intro_scan_pages: 12,
            max_tokens: 10_000,
        }
    }
}

/// Page range `[intro_page, end_page)` that contributed to the body text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyWindow {
    pub intro_page: usize,
    pub end_page: usize,
}

/// Body text plus the window it came from.
#[derive(Debug, Clone)]
pub struct LocatedBody {
    pub window: BodyWindow,
    pub text: String,
}

/// True when the page text reads like the introduction and not a contents page.
pub fn is_intro_page(text: &str) -> bool {
    if RE_CONTENTS.is_match(text) {
        return false;
    }
    RE_INTRO.iter().any(|re| re.is_match(text))
}

/// True when the page text opens the references, bibliography or appendix.
pub fn is_end_page(text: &str) -> bool {
    RE_END.iter().any(|re| re.is_match(text))
}

/// Index of the introduction page within the first `intro_scan_pages` pages.
///
/// Defaults to the second page when nothing matches (the first page is
/// nearly always title and abstract), or the first page of a one-page
/// document.
pub fn find_intro_page(doc: &RenderedDocument, intro_scan_pages: usize) -> usize {
    let total = doc.page_count();
    let horizon = total.min(intro_scan_pages.max(1));
    doc.pages[..horizon]
        .iter()
        .position(|lines| is_intro_page(&lines.join("\n")))
        .unwrap_or(if total > 1 { 1 } else { 0 })
}

/// Select and clean the body window of `doc`.
///
/// Returns `None` when no text survives filtering.
pub fn locate_body(
    doc: &RenderedDocument,
    index: &LineFrequencyIndex,
    options: &LocatorOptions,
) -> Option<LocatedBody> {
    let total = doc.page_count();
    if total == 0 {
        return None;
    }

    let intro = find_intro_page(doc, options.intro_scan_pages);
    let limit = total.min(intro.saturating_add(options.max_body_pages.max(1)));
    let mut end = limit;
    let mut body_pages = Vec::new();

    for i in intro..limit {
        let kept: Vec<&str> = doc.pages[i]
            .iter()
            .map(String::as_str)
            .filter(|line| !is_noise_line(line, index))
            .collect();
        let text = kept.join("\n");
        if i > intro && is_end_page(&text) {
            debug!("Body window ends at page {} (references/appendix)", i + 1);
            end = i;
            break;
        }
        let cleaned = clean_page_text(&text);
        if !cleaned.is_empty() {
            body_pages.push(cleaned);
        }
    }

    if body_pages.is_empty() {
        return None;
    }

    let body = body_pages.join("\n\n");
    let text = truncate_chars(&body, options.max_tokens.saturating_mul(CHARS_PER_TOKEN));
    Some(LocatedBody {
        window: BodyWindow {
            intro_page: intro,
            end_page: end,
        },
        text,
    })
}

fn is_noise_line(line: &str, index: &LineFrequencyIndex) -> bool {
    if looks_like_page_number(line) {
        return true;
    }
    if line.to_lowercase().contains("arxiv:") {
        return true;
    }
    let sig = line_signature(line);
    !sig.is_empty()
        && index.count(&sig) >= BOILERPLATE_MIN_REPEATS
        && sig.chars().count() <= BOILERPLATE_MAX_SIGNATURE_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(pages: &[&str]) -> RenderedDocument {
        RenderedDocument::from_page_texts(pages)
    }

    fn locate(d: &RenderedDocument) -> Option<LocatedBody> {
        locate_body(d, &d.line_frequencies(), &LocatorOptions::default())
    }

    #[test]
    fn contents_page_is_not_the_introduction() {
        let d = doc(&[
            "A Study of Things\nAbstract",
            "Contents\n1 Introduction ..... 3\n2 Method ..... 5",
            "1. Introduction\nWe study things.",
            "2 Method\nWe do things.",
        ]);
        assert_eq!(find_intro_page(&d, 12), 2);
    }

    #[test]
    fn cjk_introduction_is_recognised() {
        let d = doc(&["标题\n摘要", "一 引言 \n正文"]);
        assert_eq!(find_intro_page(&d, 12), 1);
        assert!(is_end_page("参考文献 \n[1] 某"));
    }

    #[test]
    fn defaults_to_second_page_or_only_page() {
        assert_eq!(find_intro_page(&doc(&["title", "body", "more"]), 12), 1);
        assert_eq!(find_intro_page(&doc(&["only page"]), 12), 0);
    }

    #[test]
    fn scan_horizon_limits_intro_search() {
        let d = doc(&["title", "body", "body", "Introduction"]);
        assert_eq!(find_intro_page(&d, 2), 1);
        assert_eq!(find_intro_page(&d, 4), 3);
    }

    #[test]
    fn repeated_header_is_removed_from_body() {
        let d = doc(&[
            "Conference 2024\nTitle\nAbstract text",
            "Conference 2024\n1 Introduction\nTransformers changed everything.",
            "Conference 2024\nWe propose a method.\n3",
            "Conference 2024\nResults are good.\n4",
        ]);
        let body = locate(&d).unwrap();
        assert!(!body.text.contains("Conference 2024"), "{}", body.text);
        assert!(body.text.contains("Transformers changed everything."));
        assert!(body.text.contains("Results are good."));
        assert!(!body.text.lines().any(|l| l.trim() == "3"));
    }

    #[test]
    fn stops_at_references_but_not_on_intro_page() {
        let d = doc(&[
            "Title",
            "1 Introduction\nSee references [1] for background.",
            "Method page.",
            "References\n[1] Someone. 2020.",
            "Appendix material.",
        ]);
        let body = locate(&d).unwrap();
        assert_eq!(body.window, BodyWindow { intro_page: 1, end_page: 3 });
        assert!(body.text.contains("See references"));
        assert!(body.text.contains("Method page."));
        assert!(!body.text.contains("Someone"));
    }

    #[test]
    fn max_body_pages_bounds_window() {
        let d = doc(&["Title", "Introduction\np1", "p2", "p3", "p4"]);
        let opts = LocatorOptions {
            max_body_pages: 2,
            ..LocatorOptions::default()
        };
        let body = locate_body(&d, &d.line_frequencies(), &opts).unwrap();
        assert_eq!(body.window, BodyWindow { intro_page: 1, end_page: 3 });
        assert!(body.text.contains("p2"));
        assert!(!body.text.contains("p3"));
    }

    #[test]
    fn arxiv_stamp_lines_are_dropped() {
        let d = doc(&["Title", "Introduction\narXiv:2401.00001v1 [cs.CL] 1 Jan 2024\nBody."]);
        let body = locate(&d).unwrap();
        assert!(!body.text.contains("2401.00001"));
    }

    #[test]
    fn empty_window_is_none() {
        let d = doc(&["Title", "12", ""]);
        assert!(locate(&d).is_none());
        assert!(locate(&RenderedDocument::default()).is_none());
    }

    #[test]
    fn body_respects_token_budget() {
        let long = "word ".repeat(2000);
        let d = doc(&["Title", &format!("Introduction\n{long}")]);
        let opts = LocatorOptions {
            max_tokens: 100,
            ..LocatorOptions::default()
        };
        let body = locate_body(&d, &d.line_frequencies(), &opts).unwrap();
        assert!(body.text.ends_with(crate::pipeline::postprocess::TRUNCATION_MARKER));
        assert!(body.text.chars().count() <= 400 + 2 + 11);
    }

    #[test]
    fn unbounded_limits_do_not_overflow() {
        let d = doc(&["Title", "Introduction
Body.", "More body.", "References
[1] X."]);
        let opts = LocatorOptions {
            max_body_pages: usize::MAX,
            intro_scan_pages: usize::MAX,
            max_tokens: usize::MAX,
        };
        let body = locate_body(&d, &d.line_frequencies(), &opts).unwrap();
        assert_eq!(body.window, BodyWindow { intro_page: 1, end_page: 3 });
        assert_eq!(body.text, "Introduction\nBody.\n\nMore body.");
    }
}
