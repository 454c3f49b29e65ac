//! # paper-fulltext
//!
//! Obtain the body text of a preprint, ready to hand to an LLM.
//!
//! ## Why this crate?
//!
//! Title and abstract rarely say enough about a paper's method and results,
//! but the whole PDF wastes most of a token budget on front matter, running
//! headers, references and appendices. This crate keeps only the body:
//! either the introduction-to-references page window of the rendered PDF,
//! or, when that comes out short, the paper's own LaTeX source flattened and
//! stripped down to prose.
//!
//! ## Pipeline Overview
//!
//! ```text
//! identifier
//!  │
//!  ├─ 0. Cache    normalized text from an earlier run? return it
//!  ├─ 1. Render   download PDF, per-page text via pdfium or pdf-extract
//!  ├─ 2. Locate   introduction → references window, boilerplate removed
//!  ├─ 3. Source   too short? download e-print, unpack safely, flatten \input
//!  ├─ 4. Convert  LaTeX → prose via pandoc or regex heuristics
//!  └─ 5. Budget   trim to ≈4 chars/token, longer text wins
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paper_fulltext::{BodyAssembler, FulltextConfig, Paper};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FulltextConfig::builder()
//!         .cache_dir(".cache/fulltext")
//!         .pdf_body_max_tokens(8_000)
//!         .build()?;
//!     let assembler = BodyAssembler::new(config)?;
//!     match assembler.extract(&Paper::new("1706.03762")).await {
//!         Some(body) => println!("{:?}: {}", body.origin, body.text),
//!         None => eprintln!("no body text; fall back to the abstract"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `fulltext` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! paper-fulltext = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod cache;
pub mod config;
pub mod error;
pub mod output;
pub mod paper;
pub mod pipeline;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::BodyAssembler;
pub use cache::{CacheKind, CacheManager};
pub use config::{FulltextConfig, FulltextConfigBuilder};
pub use error::FulltextError;
pub use output::{BodyText, TextOrigin};
pub use paper::Paper;
pub use pipeline::latex::{ConverterChain, HeuristicConverter, MarkupConverter, PandocConverter};
pub use pipeline::postprocess::{trim_to_max_tokens, TRUNCATION_MARKER};
pub use pipeline::render::{PageTextBackend, PdfExtractBackend, PdfiumBackend, RenderedDocument};
