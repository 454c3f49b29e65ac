//! Source tree resolution: pick the main LaTeX file of an extracted
//! submission and flatten it into one markup string.
//!
//! Multi-file submissions split the paper across `\input{}`, `\include{}`
//! and `\subfile{}`. Expansion starts at the main file, strips `%` comments
//! line by line, and inlines each referenced file relative to the including
//! file's directory. A visited set keyed on canonical paths keeps cycles and
//! repeated inclusions from duplicating content, and expansion stops
//! [`MAX_INCLUDE_DEPTH`] levels down.

use crate::error::FulltextError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Inclusion nesting below the main file that is still expanded.
pub const MAX_INCLUDE_DEPTH: usize = 8;

const MARKUP_EXTENSION: &str = "tex";
const BEGIN_DOCUMENT: &str = "\\begin{document}";
const END_DOCUMENT: &str = "\\end{document}";
const DOCUMENT_CLASS: &str = "\\documentclass";

static RE_INCLUDE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(?:input|include|subfile)\{([^}]+)\}").unwrap());

/// Read a markup file as UTF-8, dropping invalid byte sequences.
pub fn read_text_file(path: &Path) -> Result<String, FulltextError> {
    let bytes = fs::read(path).map_err(|e| FulltextError::io(path, e))?;
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    Ok(text)
}

/// Remove `%` comments from every line; `\%` is kept.
pub fn strip_comments(text: &str) -> String {
    text.lines()
        .map(|line| {
            let mut prev = None;
            for (i, c) in line.char_indices() {
                if c == '%' && prev != Some('\\') {
                    return &line[..i];
                }
                prev = Some(c);
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Every `.tex` file under `root`, in a stable (file-name sorted) order.
pub fn find_markup_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(MARKUP_EXTENSION))
        })
        .map(|entry| entry.into_path())
        .collect()
}

/// True when `root` already holds at least one markup file.
pub fn has_markup_files(root: &Path) -> bool {
    root.is_dir() && !find_markup_files(root).is_empty()
}

/// Likelihood that `content` is the main document of a submission.
///
/// `\begin{document}` +1000, `\documentclass` +200, `\end{document}` +100,
/// plus one point per KB up to 200.
pub fn main_document_score(content: &str) -> usize {
    let mut score = 0;
    if content.contains(BEGIN_DOCUMENT) {
        score += 1000;
    }
    if content.contains(DOCUMENT_CLASS) {
        score += 200;
    }
    if content.contains(END_DOCUMENT) {
        score += 100;
    }
    score + (content.len() / 1000).min(200)
}

/// Highest-scoring non-empty candidate; the earliest wins a tie.
pub fn select_main_document(candidates: &[PathBuf]) -> Option<PathBuf> {
    let mut best: Option<(usize, &PathBuf)> = None;
    for path in candidates {
        let content = match read_text_file(path) {
            Ok(c) if !c.is_empty() => c,
            Ok(_) => continue,
            Err(e) => {
                debug!("Skipping candidate: {e}");
                continue;
            }
        };
        let score = main_document_score(&content);
        if best.map_or(true, |(top, _)| score > top) {
            best = Some((score, path));
        }
    }
    best.map(|(_, path)| path.clone())
}

/// Resolve an inclusion argument against `base_dir`, trying the bare name
/// and then the name with `.tex`. References that are URLs, that do not
/// exist, or that resolve outside `root` yield `None`.
pub fn resolve_reference(reference: &str, base_dir: &Path, root: &Path) -> Option<PathBuf> {
    let reference = reference
        .trim()
        .trim_matches(|c| c == '"' || c == '\'');
    if reference.is_empty() || reference.starts_with("http") {
        return None;
    }
    let candidates = [
        base_dir.join(reference),
        base_dir.join(format!("{reference}.{MARKUP_EXTENSION}")),
    ];
    candidates
        .into_iter()
        .filter(|c| c.is_file())
        .filter_map(|c| c.canonicalize().ok())
        .find(|c| c.starts_with(root))
}

/// Inline every inclusion in `text`.
///
/// `root` must be canonical. `visited` holds canonical paths already
/// inlined (seed it with the main file). Past [`MAX_INCLUDE_DEPTH`] the
/// remaining inclusion macros are dropped.
pub fn expand_inclusions(
    text: &str,
    base_dir: &Path,
    root: &Path,
    visited: &mut HashSet<PathBuf>,
    depth: usize,
) -> String {
    let text = strip_comments(text);
    if depth > MAX_INCLUDE_DEPTH {
        debug!("Inclusion depth limit reached under {}", base_dir.display());
        return RE_INCLUDE.replace_all(&text, "").into_owned();
    }

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in RE_INCLUDE.captures_iter(&text) {
        let (Some(whole), Some(arg)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        last = whole.end();

        let Some(path) = resolve_reference(arg.as_str(), base_dir, root) else {
            debug!("Unresolved inclusion '{}'", arg.as_str());
            continue;
        };
        if !visited.insert(path.clone()) {
            continue;
        }
        let content = match read_text_file(&path) {
            Ok(c) => c,
            Err(e) => {
                debug!("Unreadable inclusion: {e}");
                continue;
            }
        };
        let parent = path.parent().unwrap_or(root);
        out.push_str(&expand_inclusions(&content, parent, root, visited, depth + 1));
    }
    out.push_str(&text[last..]);
    out
}

/// Keep only the text between `\begin{document}` and `\end{document}`.
pub fn strip_preamble(text: &str) -> &str {
    let body = match text.find(BEGIN_DOCUMENT) {
        Some(i) => &text[i + BEGIN_DOCUMENT.len()..],
        None => text,
    };
    match body.find(END_DOCUMENT) {
        Some(i) => &body[..i],
        None => body,
    }
}

/// Select the main file under `root`, expand its inclusions and strip the
/// preamble.
pub fn build_expanded_markup(root: &Path) -> Result<String, FulltextError> {
    let no_main = || FulltextError::NoMainDocument {
        dir: root.to_path_buf(),
    };
    let root = root.canonicalize().map_err(|e| FulltextError::io(root, e))?;

    let candidates = find_markup_files(&root);
    let main = select_main_document(&candidates).ok_or_else(no_main)?;
    let main = main.canonicalize().map_err(|e| FulltextError::io(&main, e))?;
    let main_text = read_text_file(&main)?;
    if main_text.is_empty() {
        return Err(no_main());
    }
    info!(
        "Main document {} (of {} candidates)",
        main.display(),
        candidates.len()
    );

    let mut visited = HashSet::from([main.clone()]);
    let base_dir = main.parent().unwrap_or(&root);
    let expanded = expand_inclusions(&main_text, base_dir, &root, &mut visited, 0);
    Ok(strip_preamble(&expanded).to_string())
}
