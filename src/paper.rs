//! The paper handed to the pipeline and the cache key derived from it.

use serde::{Deserialize, Serialize};

/// A paper whose body text is requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    /// Repository identifier, e.g. `2401.01234` or `hep-th/9901001`.
    pub identifier: String,
    /// Rendered-document URL. When `None` the configured template is used.
    pub pdf_url: Option<String>,
}

impl Paper {
    /// Surrounding whitespace is dropped so URLs and cache keys agree.
    pub fn new(identifier: impl Into<String>) -> Self {
        let identifier: String = identifier.into();
        Self {
            identifier: identifier.trim().to_string(),
            pdf_url: None,
        }
    }

    pub fn with_pdf_url(mut self, url: impl Into<String>) -> Self {
        self.pdf_url = Some(url.into());
        self
    }

    /// Filename-safe form of the identifier used for every cache artifact.
    pub fn cache_key(&self) -> String {
        cache_key(&self.identifier)
    }
}

/// Escape path separators so an identifier is a single path component.
///
/// Old-style arXiv identifiers contain `/`. A leading `.` is prefixed so no
/// identifier can resolve to `.` or `..`.
pub fn cache_key(identifier: &str) -> String {
    let escaped: String = identifier
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    if escaped.is_empty() || escaped.starts_with('.') {
        format!("_{escaped}")
    } else {
        escaped
    }
}
