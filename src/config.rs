//! Configuration types for body-text acquisition.
//!
//! All extraction behaviour is controlled through [`FulltextConfig`], built
//! via its [`FulltextConfigBuilder`]. Every knob lives in one struct so a run
//! can be logged or diffed against another in a single line.
//!
//! The builder clamps numeric options to their working minimums (a body
//! window of zero pages or a 10-token budget never make sense) and `build()`
//! rejects URL templates that do not reference the identifier.

use crate::error::FulltextError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Placeholder substituted with the paper identifier in URL templates.
pub const ID_PLACEHOLDER: &str = "{id}";

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Configuration for body-text acquisition.
///
/// Built via [`FulltextConfig::builder()`] or using
/// [`FulltextConfig::default()`].
///
/// # Example
/// ```rust
/// use paper_fulltext::FulltextConfig;
///
/// let config = FulltextConfig::builder()
///     .cache_dir("/tmp/fulltext")
///     .pdf_body_max_pages(10)
///     .use_source(false)
///     .build()
///     .unwrap();
/// assert_eq!(config.pdf_body_max_pages, 10);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FulltextConfig {
    /// Root of the on-disk cache. Holds `pdf/`, `source/` and `text/`.
    pub cache_dir: PathBuf,

    /// Try the rendered PDF before the LaTeX source. Default: true.
    pub use_pdf_fulltext: bool,

    /// Maximum number of pages in the body window. Default: 15.
    pub pdf_body_max_pages: usize,

    /// Token budget for the returned body text (≈4 chars per token). Default: 10000.
    pub pdf_body_max_tokens: usize,

    /// How many leading pages are searched for the introduction. Default: 12.
    pub intro_scan_pages: usize,

    /// Age in days after which cached PDFs are swept. `<= 0` disables. Default: 30.
    pub pdf_cache_ttl_days: i64,

    /// Byte cap for a rendered PDF download, in megabytes. Default: 100.
    pub pdf_max_mb: u64,

    /// Fall back to the LaTeX source when the PDF text is short. Default: true.
    pub use_source: bool,

    /// PDF text shorter than this triggers the source fallback. Default: 2000.
    pub source_min_chars: usize,

    /// Byte cap for the source archive, downloaded and unpacked. Default: 30.
    pub source_max_mb: u64,

    /// Age in days after which source archives and text are swept. Default: 30.
    pub source_cache_ttl_days: i64,

    /// Keep the archive and extracted tree after text was derived. Default: false.
    pub keep_source_archive: bool,

    /// Prefer `pandoc` for LaTeX conversion when it is installed. Default: true.
    pub pandoc_conversion: bool,

    /// Rendered-document URL used when a paper carries none.
    pub pdf_url_template: String,

    /// Source-archive URL.
    pub source_url_template: String,

    /// Timeout for each download in seconds. Default: 60.
    pub download_timeout_secs: u64,
}

impl Default for FulltextConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".cache/fulltext"),
            use_pdf_fulltext: true,
            pdf_body_max_pages: 15,
            pdf_body_max_tokens: 10_000,
            intro_scan_pages: 12,
            pdf_cache_ttl_days: 30,
            pdf_max_mb: 100,
            use_source: true,
            source_min_chars: 2000,
            source_max_mb: 30,
            source_cache_ttl_days: 30,
            keep_source_archive: false,
            pandoc_conversion: true,
            pdf_url_template: "https://arxiv.org/pdf/{id}".to_string(),
            source_url_template: "https://arxiv.org/e-print/{id}".to_string(),
            download_timeout_secs: 60,
        }
    }
}

impl FulltextConfig {
    /// Create a new builder for `FulltextConfig`.
    pub fn builder() -> FulltextConfigBuilder {
        FulltextConfigBuilder {
            config: Self::default(),
        }
    }

    /// Rendered-document URL for `identifier`.
    pub fn pdf_url(&self, identifier: &str) -> String {
        self.pdf_url_template.replace(ID_PLACEHOLDER, identifier)
    }

    /// Source-archive URL for `identifier`.
    pub fn source_url(&self, identifier: &str) -> String {
        self.source_url_template.replace(ID_PLACEHOLDER, identifier)
    }

    /// PDF download cap in bytes.
    pub fn pdf_max_bytes(&self) -> u64 {
        self.pdf_max_mb.max(1).saturating_mul(BYTES_PER_MB)
    }

    /// Source archive cap in bytes, applied to the download and to the unpacked size.
    pub fn source_max_bytes(&self) -> u64 {
        self.source_max_mb.max(1).saturating_mul(BYTES_PER_MB)
    }
}

/// Builder for [`FulltextConfig`].
#[derive(Debug)]
pub struct FulltextConfigBuilder {
    config: FulltextConfig,
}

impl FulltextConfigBuilder {
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    pub fn use_pdf_fulltext(mut self, v: bool) -> Self {
        self.config.use_pdf_fulltext = v;
        self
    }

    pub fn pdf_body_max_pages(mut self, n: usize) -> Self {
        self.config.pdf_body_max_pages = n.max(1);
        self
    }

    pub fn pdf_body_max_tokens(mut self, n: usize) -> Self {
        self.config.pdf_body_max_tokens = n.max(100);
        self
    }

    pub fn intro_scan_pages(mut self, n: usize) -> Self {
        self.config.intro_scan_pages = n.max(1);
        self
    }

    pub fn pdf_cache_ttl_days(mut self, days: i64) -> Self {
        self.config.pdf_cache_ttl_days = days;
        self
    }

    pub fn pdf_max_mb(mut self, mb: u64) -> Self {
        self.config.pdf_max_mb = mb.max(1);
        self
    }

    pub fn use_source(mut self, v: bool) -> Self {
        self.config.use_source = v;
        self
    }

    pub fn source_min_chars(mut self, n: usize) -> Self {
        self.config.source_min_chars = n.max(200);
        self
    }

    pub fn source_max_mb(mut self, mb: u64) -> Self {
        self.config.source_max_mb = mb.max(1);
        self
    }

    pub fn source_cache_ttl_days(mut self, days: i64) -> Self {
        self.config.source_cache_ttl_days = days;
        self
    }

    pub fn keep_source_archive(mut self, v: bool) -> Self {
        self.config.keep_source_archive = v;
        self
    }

    pub fn pandoc_conversion(mut self, v: bool) -> Self {
        self.config.pandoc_conversion = v;
        self
    }

    pub fn pdf_url_template(mut self, template: impl Into<String>) -> Self {
        self.config.pdf_url_template = template.into();
        self
    }

    pub fn source_url_template(mut self, template: impl Into<String>) -> Self {
        self.config.source_url_template = template.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<FulltextConfig, FulltextError> {
        let c = &self.config;
        for (name, template) in [
            ("pdf_url_template", &c.pdf_url_template),
            ("source_url_template", &c.source_url_template),
        ] {
            if !template.contains(ID_PLACEHOLDER) {
                return Err(FulltextError::InvalidConfig(format!(
                    "{name} must contain {ID_PLACEHOLDER}, got '{template}'"
                )));
            }
        }
        if c.cache_dir.as_os_str().is_empty() {
            return Err(FulltextError::InvalidConfig(
                "cache_dir must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = FulltextConfig::default();
        assert!(c.use_pdf_fulltext);
        assert!(c.use_source);
        assert!(!c.keep_source_archive);
        assert_eq!(c.pdf_body_max_pages, 15);
        assert_eq!(c.pdf_body_max_tokens, 10_000);
        assert_eq!(c.source_min_chars, 2000);
        assert_eq!(c.source_max_bytes(), 30 * 1024 * 1024);
    }

    #[test]
    fn builder_clamps_minimums() {
        let c = FulltextConfig::builder()
            .pdf_body_max_pages(0)
            .pdf_body_max_tokens(5)
            .source_min_chars(10)
            .source_max_mb(0)
            .build()
            .unwrap();
        assert_eq!(c.pdf_body_max_pages, 1);
        assert_eq!(c.pdf_body_max_tokens, 100);
        assert_eq!(c.source_min_chars, 200);
        assert_eq!(c.source_max_bytes(), 1024 * 1024);
    }

    #[test]
    fn template_without_placeholder_is_rejected() {
        let err = FulltextConfig::builder()
            .source_url_template("https://example.org/src")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("source_url_template"));
    }

    #[test]
    fn urls_substitute_identifier() {
        let c = FulltextConfig::default();
        assert_eq!(c.source_url("2401.00001"), "https://arxiv.org/e-print/2401.00001");
        assert_eq!(c.pdf_url("hep-th/9901001"), "https://arxiv.org/pdf/hep-th/9901001");
    }

    #[test]
    fn deserialises_partial_json_with_defaults() {
        let c: FulltextConfig =
            serde_json::from_str(r#"{"use_source": false, "pdf_body_max_pages": 4}"#).unwrap();
        assert!(!c.use_source);
        assert_eq!(c.pdf_body_max_pages, 4);
        assert_eq!(c.source_min_chars, 2000);
    }

    #[test]
    fn huge_size_caps_saturate() {
        let c = FulltextConfig::builder()
            .pdf_max_mb(u64::MAX)
            .source_max_mb(u64::MAX)
            .build()
            .unwrap();
        assert_eq!(c.pdf_max_bytes(), u64::MAX);
        assert_eq!(c.source_max_bytes(), u64::MAX);
    }
}
