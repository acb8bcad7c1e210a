//! CLI binary for edgequake-docextract.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use edgequake_docextract::{
    process_file, save_images, DocumentCategory, Extraction, ExtractionConfig,
    ExtractionProgressCallback, ExtractionResponse, ExtractionStatus, PageSelection,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Start of the page currently in flight.
    page_started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// The bar starts as a spinner; `on_extraction_start` gives it a length.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Converting document…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Extracting");
    }

    fn page_elapsed(&self) -> f64 {
        self.page_started
            .lock()
            .ok()
            .and_then(|mut t| t.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Stop the spinner without printing a summary (no extraction happened).
    fn clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting fields from {total_pages} page(s)…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut t) = self.page_started.lock() {
            *t = Some(Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, field_count: usize) {
        let mark = if field_count > 0 {
            green("✓")
        } else {
            yellow("∅")
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            mark,
            page_num,
            total,
            dim(&format!("{field_count:>3} fields")),
            dim(&format!("{:.1}s", self.page_elapsed())),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{:.1}s", self.page_elapsed())),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} page(s) extracted",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} page(s) extracted  ({} failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract a statement of account (the default document type)
  docextract statement.pdf

  # Invoice, first page only, as JSON
  docextract --doc-type Invoice --first-page-only --json invoice.pdf

  # Convert only and keep the page images
  docextract --no-extract --save-images ./pages scan.png

  # Download from a URL and force the media type
  docextract --mime application/pdf https://example.com/download?id=42

  # List categories / show a tool schema (no API key needed)
  docextract --list-types
  docextract --schema "Credit Note"

DOCUMENT TYPES:
  Statement of Account, Credit Note, Invoice
  Any other --doc-type is converted but not sent to the model.

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key
  OPENAI_API_KEY          OpenAI API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (anthropic, openai, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
"#;

/// Extract structured fields from invoices, credit notes and statements.
#[derive(Parser, Debug)]
#[command(
    name = "docextract",
    version,
    about = "Extract structured fields from business documents using Vision LLMs",
    long_about = "Convert a PDF, PNG or JPEG (local file or URL) into page images and ask a \
Vision Language Model to fill in a fixed field schema for the selected document type. \
Supports OpenAI, Anthropic, Google Gemini and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path or HTTP/HTTPS URL (PDF, PNG or JPEG).
    #[arg(required_unless_present_any = ["list_types", "schema"])]
    input: Option<String>,

    /// Document type: Invoice, Credit Note, Statement of Account.
    #[arg(short = 't', long, env = "DOCEXTRACT_DOC_TYPE", default_value = "Statement of Account")]
    doc_type: String,

    /// Override the detected media type (application/pdf, image/png, image/jpeg).
    #[arg(long, env = "DOCEXTRACT_MIME")]
    mime: Option<String>,

    /// Page selection for PDFs: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "DOCEXTRACT_PAGES", default_value = "all")]
    pages: String,

    /// Only process the first page (same as --pages 1).
    #[arg(long, conflicts_with = "pages")]
    first_page_only: bool,

    /// Convert and show the page images, but do not call the model.
    #[arg(long, env = "DOCEXTRACT_NO_EXTRACT")]
    no_extract: bool,

    /// Write page images to this directory as page-NNN.jpg.
    #[arg(long, env = "DOCEXTRACT_SAVE_IMAGES")]
    save_images: Option<PathBuf>,

    /// Output the full response as JSON instead of a table.
    #[arg(long, env = "DOCEXTRACT_JSON")]
    json: bool,

    /// List the supported document types and exit.
    #[arg(long)]
    list_types: bool,

    /// Print the extraction tool definition for a document type and exit.
    #[arg(long, value_name = "DOC_TYPE")]
    schema: Option<String>,

    /// LLM model ID (e.g. claude-sonnet-4-20250514, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: anthropic, openai, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_LLM_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: anthropic, openai, gemini, azure, ollama."
    )]
    provider: Option<String>,

    /// Rendering DPI for PDF pages (72–400).
    #[arg(long, env = "DOCEXTRACT_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// JPEG quality for page images (1–100).
    #[arg(long, env = "DOCEXTRACT_QUALITY", default_value_t = 85,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Retries per page on LLM failure.
    #[arg(long, env = "DOCEXTRACT_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-page LLM call timeout in seconds.
    #[arg(long, env = "DOCEXTRACT_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DOCEXTRACT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DOCEXTRACT_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "DOCEXTRACT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, env = "DOCEXTRACT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCEXTRACT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and results.
    #[arg(short, long, env = "DOCEXTRACT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.no_extract;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Informational modes ──────────────────────────────────────────────
    if cli.list_types {
        for category in DocumentCategory::ALL {
            let schema = category.schema();
            println!(
                "{:<22} {:<22} {} fields ({} required)",
                category.label(),
                dim(category.key()),
                schema.properties.len(),
                schema.required.len()
            );
        }
        return Ok(());
    }

    if let Some(ref label) = cli.schema {
        let Some(category) = DocumentCategory::from_label(label) else {
            bail!("Unknown document type '{label}'. Try --list-types.");
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&category.schema().tool_definition_json())
                .context("Failed to serialise schema")?
        );
        return Ok(());
    }

    let Some(ref input) = cli.input else {
        bail!("An input file or URL is required");
    };

    // ── Build config ─────────────────────────────────────────────────────
    let cli_progress = show_progress.then(CliProgressCallback::new_dynamic);
    let progress_cb: Option<ProgressCallback> = cli_progress
        .clone()
        .map(|cb| cb as Arc<dyn ExtractionProgressCallback>);

    let config = build_config(&cli, progress_cb).await?;

    // ── Run ──────────────────────────────────────────────────────────────
    let result = process_file(input, cli.doc_type.as_str(), cli.mime.as_deref(), &config).await;
    if let Some(ref cb) = cli_progress {
        cb.clear();
    }
    let response = result.context("Extraction failed")?;

    if let Some(ref dir) = cli.save_images {
        let written = save_images(&response, dir)
            .await
            .context("Failed to save page images")?;
        if !cli.quiet {
            eprintln!(
                "{} wrote {} image(s) to {}",
                green("✔"),
                written.len(),
                bold(&dir.display().to_string())
            );
        }
    }

    if cli.json {
        let json =
            serde_json::to_string_pretty(&response).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        print_response(&response);
    }

    if !cli.quiet && !cli.json && response.status == ExtractionStatus::Extracted {
        eprintln!(
            "   {} tokens in  /  {} tokens out  ·  {}ms total",
            dim(&response.stats.total_input_tokens.to_string()),
            dim(&response.stats.total_output_tokens.to_string()),
            response.stats.total_duration_ms,
        );
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let pages = if cli.first_page_only {
        PageSelection::Single(1)
    } else {
        PageSelection::parse(&cli.pages).context("Invalid --pages")?
    };

    let mut builder = ExtractionConfig::builder()
        .dpi(cli.dpi)
        .jpeg_quality(cli.quality)
        .extract(!cli.no_extract)
        .pages(pages)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Human-readable report: file details, page images, then per-page results.
fn print_response(response: &ExtractionResponse) {
    println!("{}", bold("File details"));
    println!("  Name:           {}", response.file_name);
    println!("  Type:           {}", response.media_type.mime());
    println!("  Document type:  {}", response.document_type);
    println!();

    println!("{}", bold("Page images"));
    for image in &response.images {
        println!(
            "  Page {:>3}  {}x{} px  {}",
            image.page_num,
            image.width,
            image.height,
            dim(&format!("{} KB JPEG", image.jpeg_len().div_ceil(1024)))
        );
    }
    println!();

    match &response.status {
        ExtractionStatus::UnsupportedDocumentType { message } => {
            println!("{}", yellow(message));
        }
        ExtractionStatus::PreviewOnly => {
            println!("{}", dim("Extraction skipped (--no-extract)."));
        }
        ExtractionStatus::Extracted => {
            let order: Vec<&str> = response
                .category
                .map(|c| c.schema().properties.iter().map(|f| f.name).collect())
                .unwrap_or_default();

            for page in &response.pages {
                println!("{}", bold(&format!("Page {}", page.page_num)));
                if let Some(ref err) = page.error {
                    println!("  {}", red(&err.to_string()));
                    continue;
                }
                match &page.extraction {
                    Some(Extraction::Fields {
                        fields,
                        missing_required,
                        ..
                    }) => {
                        let width = fields.keys().map(String::len).max().unwrap_or(0);
                        let known = order.iter().filter_map(|k| fields.get_key_value(*k));
                        let extra = fields.iter().filter(|(k, _)| !order.contains(&k.as_str()));
                        for (name, value) in known.chain(extra) {
                            println!("  {:<width$}  {}", name, render_value(value));
                        }
                        if !missing_required.is_empty() {
                            println!(
                                "  {}",
                                yellow(&format!("missing: {}", missing_required.join(", ")))
                            );
                        }
                    }
                    Some(Extraction::NoToolInvoked { message, model_text }) => {
                        println!("  {}", yellow(message));
                        if !model_text.trim().is_empty() {
                            println!("  {}", dim(model_text.trim()));
                        }
                    }
                    None => println!("  {}", dim("no result")),
                }
            }
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => dim("—"),
        other => other.to_string(),
    }
}
