//! Error types for the paper-fulltext library.
//!
//! A single [`FulltextError`] covers every way one extraction path can fail:
//!
//! * **Unavailable dependency**: no pdfium library could be bound, pandoc is
//!   not installed.
//! * **Malformed input**: corrupt PDF, not-a-PDF, unreadable or oversized
//!   archive, no main LaTeX file.
//! * **Network**: non-2xx response, timeout, download over the byte cap.
//!
//! Stages return `Result<_, FulltextError>`. Only the orchestrator in
//! [`crate::assemble`] turns an error into "no body text", so a paper whose
//! full text is unobtainable is still analysed from its title and abstract.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced while acquiring a paper's body text.
#[derive(Debug, Error)]
pub enum FulltextError {
    // ── Backend errors ────────────────────────────────────────────────────
    /// A text-extraction backend is not present on this machine.
    #[error("Extraction backend '{backend}' is unavailable: {detail}")]
    BackendUnavailable {
        backend: &'static str,
        detail: String,
    },

    // ── Document errors ───────────────────────────────────────────────────
    /// The rendered document could not be opened or parsed.
    #[error("Document '{path}' is corrupt: {detail}")]
    CorruptDocument { path: PathBuf, detail: String },

    /// The downloaded file is not a PDF (often an HTML error page).
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── Network errors ────────────────────────────────────────────────────
    /// HTTP request failed or returned a non-success status.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// Download was aborted because it exceeded the byte cap.
    #[error("Download of '{url}' exceeded the {limit_bytes} byte limit and was aborted")]
    DownloadTooLarge { url: String, limit_bytes: u64 },

    // ── Archive errors ────────────────────────────────────────────────────
    /// The archive unpacks to more than the configured size.
    #[error("Archive '{path}' unpacks to {total_bytes} bytes, over the {limit_bytes} byte limit")]
    ArchiveTooLarge {
        path: PathBuf,
        total_bytes: u64,
        limit_bytes: u64,
    },

    /// The archive is truncated or in an unsupported format.
    #[error("Archive '{path}' could not be read: {detail}")]
    InvalidArchive { path: PathBuf, detail: String },

    /// No LaTeX file in the extracted tree qualifies as the main document.
    #[error("No main LaTeX document found under '{dir}'")]
    NoMainDocument { dir: PathBuf },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// A markup converter failed; the next converter in the chain is tried.
    #[error("Converter '{converter}' failed: {detail}")]
    ConversionFailed {
        converter: &'static str,
        detail: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Local filesystem operation failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FulltextError {
    /// Wrap an `io::Error` together with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FulltextError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_too_large_display() {
        let e = FulltextError::DownloadTooLarge {
            url: "https://arxiv.org/e-print/2401.00001".into(),
            limit_bytes: 1024,
        };
        let msg = e.to_string();
        assert!(msg.contains("1024"), "got: {msg}");
        assert!(msg.contains("e-print/2401.00001"));
    }

    #[test]
    fn archive_too_large_display() {
        let e = FulltextError::ArchiveTooLarge {
            path: PathBuf::from("/tmp/x.tar"),
            total_bytes: 5000,
            limit_bytes: 100,
        };
        let msg = e.to_string();
        assert!(msg.contains("5000"));
        assert!(msg.contains("100 byte"));
    }

    #[test]
    fn io_error_keeps_source() {
        use std::error::Error as _;
        let e = FulltextError::io(
            "/nope",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(e.to_string().contains("/nope"));
        assert!(e.source().is_some());
    }

    #[test]
    fn backend_unavailable_display() {
        let e = FulltextError::BackendUnavailable {
            backend: "pdfium",
            detail: "library not found".into(),
        };
        assert!(e.to_string().contains("pdfium"));
        assert!(e.to_string().contains("library not found"));
    }
}
