//! LaTeX-to-prose conversion.
//!
//! [`MarkupConverter`] is the seam: [`ConverterChain`] tries each converter
//! in order and keeps the first non-empty result. The default chain runs
//! [`PandocConverter`] when pandoc is installed and enabled, then the
//! always-available [`HeuristicConverter`].
//!
//! The heuristic converter is a pipeline of pure `&str → String` passes:
//!
//! 1. Strip the preamble and everything after `\end{document}`
//! 2. Drop non-prose environments (figures, tables, math, listings, ...)
//! 3. Drop display and inline math
//! 4. Drop `\cite`, `\ref`, `\label` and `\url`
//! 5. Unwrap one-argument macros (`\emph{x}` → `x`), three passes deep,
//!    then drop any macro left over
//! 6. Normalize `~`, braces, escaped specials and whitespace

use crate::error::FulltextError;
use crate::pipeline::postprocess::{collapse_blank_lines, collapse_horizontal_whitespace};
use crate::pipeline::source::strip_preamble;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

/// A strategy that turns expanded LaTeX into plain prose.
pub trait MarkupConverter: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn convert(&self, markup: &str) -> Result<String, FulltextError>;
}

/// Ordered converters; the first non-empty result wins.
pub struct ConverterChain {
    converters: Vec<Box<dyn MarkupConverter>>,
}

impl ConverterChain {
    pub fn new(converters: Vec<Box<dyn MarkupConverter>>) -> Self {
        Self { converters }
    }

    /// Pandoc first when `use_pandoc` is set and it is installed, then the
    /// heuristic converter.
    pub fn default_chain(use_pandoc: bool) -> Self {
        let mut converters: Vec<Box<dyn MarkupConverter>> = Vec::new();
        if use_pandoc {
            let pandoc = PandocConverter::default();
            if pandoc.is_available() {
                converters.push(Box::new(pandoc));
            } else {
                debug!("pandoc not found; using heuristic conversion only");
            }
        }
        converters.push(Box::new(HeuristicConverter));
        Self::new(converters)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.converters.iter().map(|c| c.name()).collect()
    }

    pub fn convert(&self, markup: &str) -> Result<String, FulltextError> {
        let mut last_err = FulltextError::ConversionFailed {
            converter: "none",
            detail: "no converter configured".into(),
        };
        for converter in &self.converters {
            match converter.convert(markup) {
                Ok(text) if !text.trim().is_empty() => return Ok(text),
                Ok(_) => {
                    debug!("{} produced no text", converter.name());
                    last_err = FulltextError::ConversionFailed {
                        converter: converter.name(),
                        detail: "empty output".into(),
                    };
                }
                Err(e) => {
                    warn!("{e}");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}

impl std::fmt::Debug for ConverterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterChain")
            .field("converters", &self.names())
            .finish()
    }
}

// ── Heuristic converter ──────────────────────────────────────────────────────

/// Regex-based LaTeX stripper with no external dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicConverter;

impl MarkupConverter for HeuristicConverter {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn convert(&self, markup: &str) -> Result<String, FulltextError> {
        Ok(latex_to_text(markup))
    }
}

/// Run every heuristic pass over `markup`.
pub fn latex_to_text(markup: &str) -> String {
    let s = strip_preamble(markup);
    let s = drop_environments(s);
    let s = drop_math(&s);
    let s = drop_reference_macros(&s);
    let s = unwrap_macros(&s);
    normalize_residue(&s)
}

/// Environments whose content is never prose.
pub const DROPPED_ENVIRONMENTS: &[&str] = &[
    "figure",
    "table",
    "equation",
    "align",
    "align*",
    "eqnarray",
    "algorithm",
    "algorithmic",
    "lstlisting",
    "verbatim",
    "tikzpicture",
    "thebibliography",
    "appendix",
];

static RE_ENVIRONMENTS: Lazy<Vec<Regex>> = Lazy::new(|| {
    DROPPED_ENVIRONMENTS
        .iter()
        .map(|env| {
            let env = regex::escape(env);
            Regex::new(&format!(r"(?s)\\begin\{{{env}\}}.*?\\end\{{{env}\}}")).unwrap()
        })
        .collect()
});

fn drop_environments(input: &str) -> String {
    RE_ENVIRONMENTS
        .iter()
        .fold(input.to_string(), |s, re| re.replace_all(&s, " ").into_owned())
}

static RE_MATH: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        Regex::new(r"(?s)\$\$.*?\$\$").unwrap(),
        Regex::new(r"\$[^$]*\$").unwrap(),
        Regex::new(r"(?s)\\\[.*?\\\]").unwrap(),
        Regex::new(r"(?s)\\\(.*?\\\)").unwrap(),
    ]
});

fn drop_math(input: &str) -> String {
    RE_MATH
        .iter()
        .fold(input.to_string(), |s, re| re.replace_all(&s, " ").into_owned())
}

static RE_REFERENCE_MACROS: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        Regex::new(r"\\cite[a-zA-Z]*\*?(?:\[[^\]]*\])?\{[^}]*\}").unwrap(),
        Regex::new(r"\\ref\{[^}]*\}").unwrap(),
        Regex::new(r"\\label\{[^}]*\}").unwrap(),
        Regex::new(r"\\url\{[^}]*\}").unwrap(),
    ]
});

fn drop_reference_macros(input: &str) -> String {
    RE_REFERENCE_MACROS
        .iter()
        .fold(input.to_string(), |s, re| re.replace_all(&s, " ").into_owned())
}

const UNWRAP_PASSES: usize = 3;

static RE_ONE_ARG_MACRO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\[a-zA-Z@]+\*?(?:\[[^\]]*\])?\{([^{}]*)\}").unwrap());
static RE_BARE_MACRO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\[a-zA-Z@]+\*?(?:\[[^\]]*\])?").unwrap());

fn unwrap_macros(input: &str) -> String {
    let mut s = input.to_string();
    for _ in 0..UNWRAP_PASSES {
        s = RE_ONE_ARG_MACRO.replace_all(&s, "${1}").into_owned();
    }
    RE_BARE_MACRO.replace_all(&s, " ").into_owned()
}

static RE_ESCAPED_SPECIAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\\([%&_#$])").unwrap());

fn normalize_residue(input: &str) -> String {
    let s = RE_ESCAPED_SPECIAL.replace_all(input, "${1}");
    let s: String = s
        .chars()
        .map(|c| match c {
            '~' | '{' | '}' => ' ',
            other => other,
        })
        .collect();
    let s = collapse_horizontal_whitespace(&s);
    collapse_blank_lines(&s).trim().to_string()
}

// ── pandoc ───────────────────────────────────────────────────────────────────

/// Converts through `pandoc --from=latex --to=plain`.
#[derive(Debug, Clone)]
pub struct PandocConverter {
    pub program: String,
}

impl Default for PandocConverter {
    fn default() -> Self {
        Self {
            program: "pandoc".into(),
        }
    }
}

impl PandocConverter {
    /// True when `<program> --version` runs successfully.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|status| status.success())
    }

    fn failed(&self, detail: impl Into<String>) -> FulltextError {
        FulltextError::ConversionFailed {
            converter: "pandoc",
            detail: detail.into(),
        }
    }
}

impl MarkupConverter for PandocConverter {
    fn name(&self) -> &'static str {
        "pandoc"
    }

    fn convert(&self, markup: &str) -> Result<String, FulltextError> {
        let mut child = Command::new(&self.program)
            .args(["--from=latex", "--to=plain", "--wrap=none"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.failed(format!("failed to spawn {}: {e}", self.program)))?;

        // Feed stdin from another thread so a full stdout pipe cannot deadlock us.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.failed("stdin not captured"))?;
        let input = markup.to_string();
        let writer = std::thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child
            .wait_with_output()
            .map_err(|e| self.failed(format!("failed to collect output: {e}")))?;
        match writer.join() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(self.failed(format!("failed to write input: {e}"))),
            Err(_) => return Err(self.failed("stdin writer panicked")),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failed(format!(
                "exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        let text = collapse_horizontal_whitespace(&text);
        Ok(collapse_blank_lines(&text).trim().to_string())
    }
}
