//! Result types returned by [`crate::BodyAssembler::extract`].

use serde::{Deserialize, Serialize};

/// Where a body text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextOrigin {
    /// Page window of the rendered PDF.
    RenderedPages,
    /// Flattened and converted LaTeX source.
    Source,
    /// Normalized-text cache from an earlier run.
    Cache,
}

/// Body text of one paper, trimmed to the token budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyText {
    pub identifier: String,
    pub text: String,
    pub origin: TextOrigin,
}

impl BodyText {
    /// Length in characters, the unit the fallback threshold is expressed in.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}
