//! Pipeline stages for body-text acquisition.
//!
//! Each submodule implements one step; [`crate::assemble`] chains them.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌─▶ render ──▶ locate ──▶ postprocess ─┐
//! fetch ─────┤  (pdfium)   (window)    (clean/trim) ├──▶ longer text wins
//!            └─▶ archive ──▶ source ──▶ latex ──────┘
//!               (safe tar)  (flatten)  (to prose)
//! ```
//!
//! 1. [`fetch`]   capped streaming download into the cache
//! 2. [`render`]  per-page text through a chain of [`render::PageTextBackend`]s;
//!    runs in `spawn_blocking` because pdfium is not async-safe
//! 3. [`lines`]   page-number shapes and running-header signatures
//! 4. [`locate`]  introduction-to-references page window
//! 5. [`postprocess`] page cleanup rules and token-budget trimming
//! 6. [`archive`] size-capped, traversal-safe unpacking
//! 7. [`source`]  main-file scoring and `\input` expansion
//! 8. [`latex`]   LaTeX to prose through a chain of [`latex::MarkupConverter`]s

pub mod archive;
pub mod fetch;
pub mod latex;
pub mod lines;
pub mod locate;
pub mod postprocess;
pub mod render;
pub mod source;
