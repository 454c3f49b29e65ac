//! Body assembly: the per-paper orchestration of both extraction paths.
//!
//! ```text
//! text cache hit? ──yes──▶ re-trim ──▶ done
//!       │ no
//!       ▼
//! rendered PDF ──▶ pages ──▶ body window ──▶ text (maybe None)
//!       │
//!       ▼ None or shorter than source_min_chars
//! source archive ──▶ unpack ──▶ flatten ──▶ convert ──▶ trim ──▶ text cache
//!       │
//!       ▼
//! longer of the two wins; nothing at all is `None`, never an error
//! ```
//!
//! Every stage returns `Result`; this module is the only place a failure is
//! logged and turned into "no text from this path". A paper without body
//! text is still analysed downstream from its title and abstract.

use crate::cache::{remove_path, CacheKind, CacheManager};
use crate::config::FulltextConfig;
use crate::error::FulltextError;
use crate::output::{BodyText, TextOrigin};
use crate::paper::Paper;
use crate::pipeline::archive::{extract_archive, ExtractSummary};
use crate::pipeline::fetch::{build_client, download_capped};
use crate::pipeline::latex::ConverterChain;
use crate::pipeline::locate::{locate_body, LocatorOptions};
use crate::pipeline::postprocess::trim_to_max_tokens;
use crate::pipeline::render::{default_backends, extract_document_async, PageTextBackend};
use crate::pipeline::source::{build_expanded_markup, has_markup_files, read_text_file};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Smallest effective fallback threshold, whatever the configuration says.
const MIN_SOURCE_THRESHOLD_CHARS: usize = 200;
/// Smallest effective token budget.
const MIN_TOKEN_BUDGET: usize = 100;

/// Obtains the best available body text for papers.
///
/// Construct one per process and reuse it: the cache sweep runs at most once
/// per assembler, and the HTTP client's connection pool is shared.
///
/// # Example
/// ```rust,no_run
/// use paper_fulltext::{BodyAssembler, FulltextConfig, Paper};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let assembler = BodyAssembler::new(FulltextConfig::default())?;
/// if let Some(text) = assembler.body_text(&Paper::new("1706.03762")).await {
///     println!("{} chars of body text", text.chars().count());
/// }
/// # Ok(())
/// # }
/// ```
pub struct BodyAssembler {
    config: FulltextConfig,
    cache: Arc<CacheManager>,
    client: reqwest::Client,
    backends: Arc<Vec<Box<dyn PageTextBackend>>>,
    converters: Arc<ConverterChain>,
}

impl std::fmt::Debug for BodyAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyAssembler")
            .field("config", &self.config)
            .field(
                "backends",
                &self.backends.iter().map(|b| b.name()).collect::<Vec<_>>(),
            )
            .field("converters", &self.converters)
            .finish_non_exhaustive()
    }
}

impl BodyAssembler {
    /// Assembler with the default backends (pdfium, pdf-extract) and
    /// converters (pandoc if enabled and installed, heuristic).
    pub fn new(config: FulltextConfig) -> Result<Self, FulltextError> {
        let cache = CacheManager::new(
            &config.cache_dir,
            config.pdf_cache_ttl_days,
            config.source_cache_ttl_days,
        );
        let client = build_client(config.download_timeout_secs)?;
        Ok(Self {
            backends: Arc::new(default_backends()),
            converters: Arc::new(ConverterChain::default_chain(config.pandoc_conversion)),
            cache: Arc::new(cache),
            client,
            config,
        })
    }

    /// Replace the page-text backends, tried in order.
    pub fn with_backends(mut self, backends: Vec<Box<dyn PageTextBackend>>) -> Self {
        self.backends = Arc::new(backends);
        self
    }

    /// Replace the markup converter chain.
    pub fn with_converters(mut self, converters: ConverterChain) -> Self {
        self.converters = Arc::new(converters);
        self
    }

    pub fn config(&self) -> &FulltextConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Body text for `paper`, or `None` when neither path yields any.
    pub async fn body_text(&self, paper: &Paper) -> Option<String> {
        self.extract(paper).await.map(|body| body.text)
    }

    /// [`body_text`](Self::body_text) on a private runtime.
    ///
    /// Must not be called from inside an async context.
    pub fn body_text_blocking(&self, paper: &Paper) -> Result<Option<String>, FulltextError> {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| FulltextError::Internal(format!("Failed to create tokio runtime: {e}")))?;
        Ok(runtime.block_on(self.body_text(paper)))
    }

    /// Body text for `paper` together with the path that produced it.
    pub async fn extract(&self, paper: &Paper) -> Option<BodyText> {
        let id = paper.identifier.trim();
        let max_tokens = self.config.pdf_body_max_tokens.max(MIN_TOKEN_BUDGET);
        let body = |text: String, origin: TextOrigin| BodyText {
            identifier: id.to_string(),
            text,
            origin,
        };

        // ── Step 0: Normalized-text cache ───────────────────────────────────
        match self.cached_text(id, max_tokens).await {
            Ok(Some(text)) => {
                info!("{id}: body text served from cache");
                return Some(body(text, TextOrigin::Cache));
            }
            Ok(None) => {}
            Err(e) => warn!("{id}: text cache unreadable: {e}"),
        }

        // ── Step 1: Rendered pages ──────────────────────────────────────────
        let mut best: Option<BodyText> = None;
        if self.config.use_pdf_fulltext {
            match self.rendered_text(paper, max_tokens).await {
                Ok(Some(text)) => best = Some(body(text, TextOrigin::RenderedPages)),
                Ok(None) => info!("{id}: no body window found in rendered pages"),
                Err(e) => warn!("{id}: rendered extraction failed: {e}"),
            }
        }

        // ── Step 2: Source fallback ─────────────────────────────────────────
        let min_chars = self.config.source_min_chars.max(MIN_SOURCE_THRESHOLD_CHARS);
        let rendered_len = best.as_ref().map(BodyText::char_len);
        if self.config.use_source && rendered_len.map_or(true, |len| len < min_chars) {
            info!(
                "{id}: rendered text has {} chars (< {min_chars}); trying source",
                rendered_len.unwrap_or(0)
            );
            match self.source_text(id, max_tokens).await {
                // ── Step 3: Longer text wins ────────────────────────────────
                Ok(text) => {
                    let source_len = text.chars().count();
                    if rendered_len.map_or(true, |len| source_len > len) {
                        best = Some(body(text, TextOrigin::Source));
                    } else {
                        debug!("{id}: keeping rendered text ({source_len} source chars)");
                    }
                }
                Err(e) => warn!("{id}: source extraction failed: {e}"),
            }
        }

        match &best {
            Some(b) => info!("{id}: {} chars of body text from {:?}", b.char_len(), b.origin),
            None => warn!("{id}: no body text available"),
        }
        best
    }

    // ── Text cache ───────────────────────────────────────────────────────────

    async fn cached_text(&self, id: &str, max_tokens: usize) -> Result<Option<String>, FulltextError> {
        let cache = Arc::clone(&self.cache);
        let key = id.to_string();
        let cached = run_blocking(move || match cache.get(&key, CacheKind::NormalizedText) {
            Some(path) => read_text_file(&path).map(Some),
            None => Ok(None),
        })
        .await?;
        Ok(cached
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .map(|text| trim_to_max_tokens(&text, max_tokens)))
    }

    // ── Rendered path ────────────────────────────────────────────────────────

    async fn rendered_text(
        &self,
        paper: &Paper,
        max_tokens: usize,
    ) -> Result<Option<String>, FulltextError> {
        let id = paper.identifier.trim();
        let pdf_path = self.cache_path(id, CacheKind::RenderedBinary).await?;
        if pdf_path.exists() {
            debug!("{id}: rendered document cache hit");
        } else {
            let url = paper
                .pdf_url
                .clone()
                .unwrap_or_else(|| self.config.pdf_url(id));
            download_capped(
                &self.client,
                &url,
                &pdf_path,
                self.config.pdf_max_bytes(),
                self.config.download_timeout_secs,
            )
            .await?;
        }

        let doc = match extract_document_async(pdf_path.clone(), Arc::clone(&self.backends)).await {
            Ok(doc) => doc,
            Err(e @ FulltextError::NotAPdf { .. }) => {
                warn!("{id}: discarding cached download that is not a PDF");
                let _ = tokio::fs::remove_file(&pdf_path).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let options = LocatorOptions {
            max_body_pages: self.config.pdf_body_max_pages.max(1),
            intro_scan_pages: self.config.intro_scan_pages.max(1),
            max_tokens,
        };
        let index = doc.line_frequencies();
        Ok(locate_body(&doc, &index, &options).map(|located| {
            debug!(
                "{id}: body window pages {}..{}",
                located.window.intro_page + 1,
                located.window.end_page
            );
            located.text
        }))
    }

    // ── Source path ──────────────────────────────────────────────────────────

    async fn source_text(&self, id: &str, max_tokens: usize) -> Result<String, FulltextError> {
        let archive = self.cache_path(id, CacheKind::SourceArchive).await?;
        let tree = self.cache_path(id, CacheKind::SourceExtracted).await?;
        let cap = self.config.source_max_bytes();

        let reusable = {
            let tree = tree.clone();
            run_blocking(move || Ok(has_markup_files(&tree))).await?
        };
        if reusable {
            debug!("{id}: reusing extracted source tree");
        } else {
            if archive.exists() {
                debug!("{id}: source archive cache hit");
            } else {
                self.download_source(id, &archive).await?;
            }
            if let Err(e) = unpack(archive.clone(), tree.clone(), cap).await {
                if matches!(e, FulltextError::ArchiveTooLarge { .. }) {
                    return Err(e);
                }
                warn!("{id}: {e}; downloading the archive again");
                self.download_source(id, &archive).await?;
                unpack(archive.clone(), tree.clone(), cap).await?;
            }
        }

        let converters = Arc::clone(&self.converters);
        let flatten_root = tree.clone();
        let text = run_blocking(move || {
            let markup = build_expanded_markup(&flatten_root)?;
            converters.convert(&markup)
        })
        .await?;
        let text = trim_to_max_tokens(&text, max_tokens);

        let cache = Arc::clone(&self.cache);
        let keep = self.config.keep_source_archive;
        let key = id.to_string();
        let cached_text = text.clone();
        run_blocking(move || {
            if let Err(e) = cache.put_text(&key, CacheKind::NormalizedText, &cached_text) {
                warn!("{key}: could not cache body text: {e}");
            }
            if !keep {
                cache.remove(&key, CacheKind::SourceArchive);
                cache.remove(&key, CacheKind::SourceExtracted);
                debug!("{key}: pruned source archive and tree");
            }
            Ok(())
        })
        .await?;

        Ok(text)
    }

    async fn download_source(&self, id: &str, archive: &Path) -> Result<u64, FulltextError> {
        if let Err(e) = tokio::fs::remove_file(archive).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("{id}: could not remove stale archive: {e}");
            }
        }
        download_capped(
            &self.client,
            &self.config.source_url(id),
            archive,
            self.config.source_max_bytes(),
            self.config.download_timeout_secs,
        )
        .await
    }

    async fn cache_path(&self, id: &str, kind: CacheKind) -> Result<PathBuf, FulltextError> {
        let cache = Arc::clone(&self.cache);
        let key = id.to_string();
        run_blocking(move || cache.path(&key, kind)).await
    }
}

/// Replace the extracted tree with a fresh unpack of `archive`.
async fn unpack(archive: PathBuf, tree: PathBuf, cap: u64) -> Result<ExtractSummary, FulltextError> {
    run_blocking(move || {
        remove_path(&tree);
        extract_archive(&archive, &tree, cap)
    })
    .await
}

/// Run filesystem or CPU-bound work on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T, FulltextError>
where
    F: FnOnce() -> Result<T, FulltextError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FulltextError::Internal(format!("Blocking task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct NoPages;

    impl PageTextBackend for NoPages {
        fn name(&self) -> &'static str {
            "no-pages"
        }
        fn extract_pages(&self, path: &Path) -> Result<Vec<String>, FulltextError> {
            Err(FulltextError::CorruptDocument {
                path: path.to_path_buf(),
                detail: "unreadable".into(),
            })
        }
    }

    fn offline_config(root: &Path) -> FulltextConfig {
        FulltextConfig::builder()
            .cache_dir(root)
            .pandoc_conversion(false)
            .pdf_url_template("http://127.0.0.1:9/pdf/{id}")
            .source_url_template("http://127.0.0.1:9/e-print/{id}")
            .download_timeout_secs(2)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn cached_text_short_circuits_and_is_retrimmed() {
        let tmp = TempDir::new().unwrap();
        let assembler = BodyAssembler::new(offline_config(tmp.path()))
            .unwrap()
            .with_backends(vec![Box::new(NoPages)]);
        let long = "sentence ".repeat(10_000);
        assembler
            .cache()
            .put_text("2401.00001", CacheKind::NormalizedText, &long)
            .unwrap();

        let body = assembler.extract(&Paper::new("2401.00001")).await.unwrap();
        assert_eq!(body.origin, TextOrigin::Cache);
        assert!(body.text.ends_with(crate::pipeline::postprocess::TRUNCATION_MARKER));
        assert!(body.char_len() < long.len());
    }

    #[tokio::test]
    async fn both_paths_disabled_yields_none() {
        let tmp = TempDir::new().unwrap();
        let config = FulltextConfig::builder()
            .cache_dir(tmp.path())
            .use_pdf_fulltext(false)
            .use_source(false)
            .pandoc_conversion(false)
            .build()
            .unwrap();
        let assembler = BodyAssembler::new(config).unwrap();
        assert!(assembler.body_text(&Paper::new("2401.00002")).await.is_none());
    }

    #[tokio::test]
    async fn reuses_extracted_tree_without_network() {
        let tmp = TempDir::new().unwrap();
        let mut config = offline_config(tmp.path());
        config.use_pdf_fulltext = false;
        let assembler = BodyAssembler::new(config).unwrap();

        let tree = assembler
            .cache()
            .path("2401.00003", CacheKind::SourceExtracted)
            .unwrap();
        std::fs::create_dir_all(&tree).unwrap();
        std::fs::write(
            tree.join("main.tex"),
            "\\documentclass{article}\\begin{document}\\section{Introduction}Offline body.\\end{document}",
        )
        .unwrap();

        let body = assembler.extract(&Paper::new("2401.00003")).await.unwrap();
        assert_eq!(body.origin, TextOrigin::Source);
        assert_eq!(body.text, "IntroductionOffline body.");
        assert!(!tree.exists(), "tree is pruned after derivation");
        assert!(assembler
            .cache()
            .get("2401.00003", CacheKind::NormalizedText)
            .is_some());
    }

    #[test]
    fn blocking_entry_point_runs_outside_runtime() {
        let tmp = TempDir::new().unwrap();
        let mut config = offline_config(tmp.path());
        config.use_pdf_fulltext = false;
        config.use_source = false;
        let assembler = BodyAssembler::new(config).unwrap();
        assert_eq!(
            assembler
                .body_text_blocking(&Paper::new("2401.00004"))
                .unwrap(),
            None
        );
    }
}
