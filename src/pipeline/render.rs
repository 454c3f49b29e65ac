//! Rendered-document text extraction.
//!
//! Two backends implement [`PageTextBackend`] and are tried in order by
//! [`extract_document`]:
//!
//! 1. [`PdfiumBackend`]: binds the pdfium library (`PDFIUM_LIB_PATH`, then
//!    `./`, then the system library). Reads each page's text in reading
//!    order and retries page-by-page through the raw text segments when that
//!    comes back empty or fails.
//! 2. [`PdfExtractBackend`]: pure Rust, always present, plainer layout.
//!
//! The first backend that opens the document wins. A single unreadable page
//! becomes an empty page rather than failing the document.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and both backends are
//! CPU-bound, so [`extract_document_async`] runs the chain on the blocking
//! pool instead of a Tokio worker.

use crate::error::FulltextError;
use crate::pipeline::lines::LineFrequencyIndex;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pages of a rendered document, each an ordered list of trimmed, non-empty lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedDocument {
    pub pages: Vec<Vec<String>>,
}

impl RenderedDocument {
    /// Split raw per-page text into trimmed non-empty lines.
    pub fn from_page_texts<S: AsRef<str>>(texts: &[S]) -> Self {
        let pages = texts
            .iter()
            .map(|t| {
                t.as_ref()
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .collect();
        Self { pages }
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Boilerplate frequency index over every line of the document.
    pub fn line_frequencies(&self) -> LineFrequencyIndex {
        let mut index = LineFrequencyIndex::new();
        for line in self.pages.iter().flatten() {
            index.observe(line);
        }
        index
    }
}

/// A strategy that turns a rendered binary into per-page raw text.
pub trait PageTextBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Extract the text of every page, in page order.
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, FulltextError>;
}

/// The default strategy order: pdfium, then pdf-extract.
pub fn default_backends() -> Vec<Box<dyn PageTextBackend>> {
    vec![Box::new(PdfiumBackend::default()), Box::new(PdfExtractBackend)]
}

/// Run the backends in order and return the first document that opens.
pub fn extract_document(
    path: &Path,
    backends: &[Box<dyn PageTextBackend>],
) -> Result<RenderedDocument, FulltextError> {
    check_pdf_magic(path)?;

    let mut last_err = FulltextError::BackendUnavailable {
        backend: "none",
        detail: "no page-text backend configured".into(),
    };
    for backend in backends {
        match backend.extract_pages(path) {
            Ok(texts) if !texts.is_empty() => {
                let doc = RenderedDocument::from_page_texts(&texts);
                info!(
                    "{}: extracted {} pages from {}",
                    backend.name(),
                    doc.page_count(),
                    path.display()
                );
                return Ok(doc);
            }
            Ok(_) => {
                debug!("{}: document has no pages", backend.name());
                last_err = FulltextError::CorruptDocument {
                    path: path.to_path_buf(),
                    detail: format!("{} found no pages", backend.name()),
                };
            }
            Err(e) => {
                warn!("{}: {e}", backend.name());
                last_err = e;
            }
        }
    }
    Err(last_err)
}

/// [`extract_document`] on the blocking thread pool.
pub async fn extract_document_async(
    path: PathBuf,
    backends: Arc<Vec<Box<dyn PageTextBackend>>>,
) -> Result<RenderedDocument, FulltextError> {
    tokio::task::spawn_blocking(move || extract_document(&path, &backends))
        .await
        .map_err(|e| FulltextError::Internal(format!("Extraction task panicked: {e}")))?
}

/// Reject files that do not start with `%PDF`.
fn check_pdf_magic(path: &Path) -> Result<(), FulltextError> {
    use std::io::Read;
    let mut f = std::fs::File::open(path).map_err(|e| FulltextError::io(path, e))?;
    let mut magic = [0u8; 4];
    if f.read_exact(&mut magic).is_err() {
        return Err(FulltextError::CorruptDocument {
            path: path.to_path_buf(),
            detail: "file shorter than a PDF header".into(),
        });
    }
    if &magic != b"%PDF" {
        return Err(FulltextError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }
    Ok(())
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// Layout-aware extraction through the pdfium library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    /// Explicit library path; falls back to `PDFIUM_LIB_PATH`, `./`, system.
    pub library_path: Option<PathBuf>,
}

impl PdfiumBackend {
    fn bind(&self) -> Result<Pdfium, FulltextError> {
        let explicit = self
            .library_path
            .clone()
            .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

        let bindings = match explicit {
            Some(path) => Pdfium::bind_to_library(&path),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| FulltextError::BackendUnavailable {
            backend: "pdfium",
            detail: format!("{e:?}"),
        })?;
        Ok(Pdfium::new(bindings))
    }
}

impl PageTextBackend for PdfiumBackend {
    fn name(&self) -> &'static str {
        "pdfium"
    }

    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, FulltextError> {
        let pdfium = self.bind()?;
        let document =
            pdfium
                .load_pdf_from_file(path, None)
                .map_err(|e| FulltextError::CorruptDocument {
                    path: path.to_path_buf(),
                    detail: format!("{e:?}"),
                })?;

        let mut texts = Vec::new();
        for (idx, page) in document.pages().iter().enumerate() {
            let text = match page.text() {
                Ok(page_text) => {
                    let ordered = page_text.all();
                    if ordered.trim().is_empty() {
                        page_text
                            .segments()
                            .iter()
                            .map(|segment| segment.text())
                            .collect::<Vec<_>>()
                            .join("\n")
                    } else {
                        ordered
                    }
                }
                Err(e) => {
                    debug!("pdfium: page {} unreadable: {e:?}", idx + 1);
                    String::new()
                }
            };
            texts.push(text);
        }
        Ok(texts)
    }
}

// ── pdf-extract ──────────────────────────────────────────────────────────

/// Plain extraction through the pure-Rust `pdf-extract` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractBackend;

impl PageTextBackend for PdfExtractBackend {
    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, FulltextError> {
        let bytes = std::fs::read(path).map_err(|e| FulltextError::io(path, e))?;
        let corrupt = |detail: String| FulltextError::CorruptDocument {
            path: path.to_path_buf(),
            detail,
        };

        let loaded = std::panic::catch_unwind(|| pdf_extract::Document::load_mem(&bytes))
            .map_err(|_| corrupt("pdf-extract panicked while loading".into()))?;
        let mut document = loaded.map_err(|e| corrupt(e.to_string()))?;
        if document.is_encrypted() {
            document
                .decrypt("")
                .map_err(|e| corrupt(format!("encrypted document: {e}")))?;
        }

        // Font parsing inside pdf-extract panics on some malformed pages.
        let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
        let texts = page_numbers
            .into_iter()
            .map(|page_num| page_text(&document, page_num))
            .collect();
        Ok(texts)
    }
}

/// Text of one page, or an empty string when the page fails or panics.
fn page_text(document: &pdf_extract::Document, page_num: u32) -> String {
    let mut text = String::new();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut output = pdf_extract::PlainTextOutput::new(&mut text);
        pdf_extract::output_doc_page(document, &mut output, page_num)
    }));
    match result {
        Ok(Ok(())) => text,
        Ok(Err(e)) => {
            debug!("pdf-extract: page {page_num} unreadable: {e}");
            String::new()
        }
        Err(_) => {
            debug!("pdf-extract: page {page_num} panicked");
            String::new()
        }
    }
}
