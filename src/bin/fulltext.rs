//! CLI binary for paper-fulltext.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `FulltextConfig`, runs one `BodyAssembler` over every identifier and
//! prints the body texts.

use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use paper_fulltext::{BodyAssembler, BodyText, FulltextConfig, Paper, TextOrigin};
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Body text of one paper (stdout)
  fulltext 1706.03762

  # Several papers, JSON records to a file
  fulltext 1706.03762 2005.14165 --json -o bodies.json

  # Explicit PDF location, no source fallback
  fulltext 2401.00001 --pdf-url https://example.org/paper.pdf --use-source false

  # Source only, keep the archive for inspection
  fulltext 2401.00001 --use-pdf-fulltext false --keep-source-archive true

PIPELINE:
  1. A cached normalized text is returned immediately (re-trimmed to budget).
  2. The rendered PDF is downloaded and the introduction-to-references page
     window is extracted, with running headers and page numbers removed.
  3. When that yields nothing or fewer than --source-min-chars characters,
     the LaTeX source archive is unpacked, flattened and converted.
  4. The longer of the two texts wins.

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH   Path to libpdfium; otherwise ./ and the system library
                    are tried, then the pure-Rust fallback extractor
  RUST_LOG          Log filter; overrides --verbose/--quiet
"#;

/// Fetch the body text of preprints from their PDF or LaTeX source.
#[derive(Parser, Debug)]
#[command(
    name = "fulltext",
    version,
    about = "Fetch the body text of preprints from their PDF or LaTeX source",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Paper identifiers, e.g. 2401.01234 or hep-th/9901001.
    #[arg(required = true)]
    identifiers: Vec<String>,

    /// Rendered PDF URL (only with a single identifier).
    #[arg(long)]
    pdf_url: Option<String>,

    /// Write output to this file instead of stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output JSON records (identifier, origin, chars, text).
    #[arg(long)]
    json: bool,

    /// Cache root directory.
    #[arg(long, env = "FULLTEXT_CACHE_DIR", default_value = ".cache/fulltext")]
    cache_dir: PathBuf,

    /// Extract from the rendered PDF.
    #[arg(long, env = "USE_PDF_FULLTEXT", default_value_t = true,
          action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
    use_pdf_fulltext: bool,

    /// Maximum pages in the body window.
    #[arg(long, env = "PDF_BODY_MAX_PAGES", default_value_t = 15)]
    pdf_body_max_pages: usize,

    /// Token budget for the body text (≈4 chars per token).
    #[arg(long, env = "PDF_BODY_MAX_TOKENS", default_value_t = 10_000)]
    pdf_body_max_tokens: usize,

    /// Leading pages searched for the introduction.
    #[arg(long, env = "PDF_INTRO_SCAN_PAGES", default_value_t = 12)]
    intro_scan_pages: usize,

    /// Days before cached PDFs are swept (<= 0 disables).
    #[arg(long, env = "PDF_CACHE_TTL_DAYS", default_value_t = 30, allow_negative_numbers = true)]
    pdf_cache_ttl_days: i64,

    /// PDF download cap in megabytes.
    #[arg(long, env = "PDF_MAX_MB", default_value_t = 100)]
    pdf_max_mb: u64,

    /// Fall back to the LaTeX source when PDF text is short.
    #[arg(long, env = "USE_ARXIV_SOURCE", default_value_t = true,
          action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
    use_source: bool,

    /// PDF text shorter than this triggers the source fallback.
    #[arg(long, env = "ARXIV_SOURCE_MIN_CHARS", default_value_t = 2000)]
    source_min_chars: usize,

    /// Source archive cap in megabytes (download and unpacked size).
    #[arg(long, env = "ARXIV_SOURCE_MAX_MB", default_value_t = 30)]
    source_max_mb: u64,

    /// Days before cached source artifacts are swept (<= 0 disables).
    #[arg(long, env = "ARXIV_SOURCE_TTL_DAYS", default_value_t = 30, allow_negative_numbers = true)]
    source_cache_ttl_days: i64,

    /// Keep the source archive and extracted tree after conversion.
    #[arg(long, env = "ARXIV_SOURCE_KEEP_ARCHIVE", default_value_t = false,
          action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
    keep_source_archive: bool,

    /// Use pandoc for LaTeX conversion when installed.
    #[arg(long, env = "FULLTEXT_PANDOC", default_value_t = true,
          action = clap::ArgAction::Set, value_parser = BoolishValueParser::new())]
    pandoc: bool,

    /// PDF URL template; `{id}` is replaced by the identifier.
    #[arg(long, env = "FULLTEXT_PDF_URL_TEMPLATE")]
    pdf_url_template: Option<String>,

    /// Source archive URL template; `{id}` is replaced by the identifier.
    #[arg(long, env = "FULLTEXT_SOURCE_URL_TEMPLATE")]
    source_url_template: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "FULLTEXT_DOWNLOAD_TIMEOUT", default_value_t = 60)]
    download_timeout: u64,

    /// Disable the spinner.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

/// One line of `--json` output.
#[derive(Serialize)]
struct Record<'a> {
    identifier: &'a str,
    origin: Option<TextOrigin>,
    chars: usize,
    text: Option<&'a str>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if cli.pdf_url.is_some() && cli.identifiers.len() > 1 {
        anyhow::bail!("--pdf-url can only be used with a single identifier");
    }

    let config = build_config(&cli)?;
    let assembler = BodyAssembler::new(config).context("Failed to initialise")?;

    // ── Extract, one paper at a time ─────────────────────────────────────
    let started = Instant::now();
    let mut results: Vec<(String, Option<BodyText>)> = Vec::with_capacity(cli.identifiers.len());
    for identifier in &cli.identifiers {
        let mut paper = Paper::new(identifier.clone());
        if let Some(url) = &cli.pdf_url {
            paper = paper.with_pdf_url(url.clone());
        }

        let progress = show_progress.then(|| spinner(identifier));
        let body = assembler.extract(&paper).await;
        if let Some(bar) = progress {
            bar.finish_and_clear();
        }

        if !cli.quiet {
            match &body {
                Some(b) => eprintln!(
                    "{} {}  {}",
                    green("✓"),
                    bold(identifier),
                    dim(&format!("{} chars from {}", b.char_len(), origin_label(b.origin))),
                ),
                None => eprintln!("{} {}  {}", red("✗"), bold(identifier), red("no body text")),
            }
        }
        results.push((identifier.clone(), body));
    }

    // ── Write output ─────────────────────────────────────────────────────
    let rendered = if cli.json {
        render_json(&results)?
    } else {
        render_text(&results)
    };
    match &cli.output {
        Some(path) => write_atomic(path, &rendered).await?,
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(rendered.as_bytes())
                .context("Failed to write to stdout")?;
        }
    }

    if !cli.quiet {
        let found = results.iter().filter(|(_, b)| b.is_some()).count();
        eprintln!(
            "{}/{} papers with body text in {:.1}s",
            found,
            results.len(),
            started.elapsed().as_secs_f64()
        );
    }

    // Papers without body text are reported, not treated as failures.
    Ok(())
}

/// Map CLI args to `FulltextConfig`.
fn build_config(cli: &Cli) -> Result<FulltextConfig> {
    let mut builder = FulltextConfig::builder()
        .cache_dir(&cli.cache_dir)
        .use_pdf_fulltext(cli.use_pdf_fulltext)
        .pdf_body_max_pages(cli.pdf_body_max_pages)
        .pdf_body_max_tokens(cli.pdf_body_max_tokens)
        .intro_scan_pages(cli.intro_scan_pages)
        .pdf_cache_ttl_days(cli.pdf_cache_ttl_days)
        .pdf_max_mb(cli.pdf_max_mb)
        .use_source(cli.use_source)
        .source_min_chars(cli.source_min_chars)
        .source_max_mb(cli.source_max_mb)
        .source_cache_ttl_days(cli.source_cache_ttl_days)
        .keep_source_archive(cli.keep_source_archive)
        .pandoc_conversion(cli.pandoc)
        .download_timeout_secs(cli.download_timeout);

    if let Some(t) = &cli.pdf_url_template {
        builder = builder.pdf_url_template(t.clone());
    }
    if let Some(t) = &cli.source_url_template {
        builder = builder.source_url_template(t.clone());
    }
    builder.build().context("Invalid configuration")
}

fn spinner(identifier: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix(identifier.to_string());
    bar.set_message("fetching body text…");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn origin_label(origin: TextOrigin) -> &'static str {
    match origin {
        TextOrigin::RenderedPages => "rendered pages",
        TextOrigin::Source => "LaTeX source",
        TextOrigin::Cache => "cache",
    }
}

fn render_json(results: &[(String, Option<BodyText>)]) -> Result<String> {
    let records: Vec<Record<'_>> = results
        .iter()
        .map(|(identifier, body)| Record {
            identifier: identifier.as_str(),
            origin: body.as_ref().map(|b| b.origin),
            chars: body.as_ref().map_or(0, BodyText::char_len),
            text: body.as_ref().map(|b| b.text.as_str()),
        })
        .collect();
    let mut json = serde_json::to_string_pretty(&records).context("Failed to serialise output")?;
    json.push('\n');
    Ok(json)
}

fn render_text(results: &[(String, Option<BodyText>)]) -> String {
    let single = results.len() == 1;
    let mut out = String::new();
    for (identifier, body) in results {
        if !single {
            out.push_str(&format!("==> {identifier} <==\n"));
        }
        if let Some(b) = body {
            out.push_str(&b.text);
            if !b.text.ends_with('\n') {
                out.push('\n');
            }
        }
        if !single {
            out.push('\n');
        }
    }
    out
}

/// Write via a sibling temp file and rename so a partial file never appears.
async fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, content)
        .await
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
