//! # edgequake-docextract
//!
//! Extract structured fields from business documents (invoices, credit
//! notes, statements of account) using Vision Language Models.
//!
//! ## How it works
//!
//! Every upload becomes one JPEG per page. Each page image is sent to a
//! multimodal model together with a fixed tool schema for the selected
//! document category; the model answers by "calling" that tool, and the
//! call's arguments are the extracted fields. If the model answers in prose
//! instead, the page carries a fallback message and the model's text.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF / PNG / JPEG
//!  │
//!  ├─ 1. Input    resolve local file or download from URL, detect media type
//!  ├─ 2. Render   rasterise PDF pages via pdfium, or decode the image
//!  ├─ 3. Encode   flatten to RGB → JPEG → base64 ImageData
//!  ├─ 4. Extract  one tool-calling request per page, sequential, with retry
//!  └─ 5. Output   page images + per-page fields + stats
//! ```
//!
//! Document types outside [`DocumentCategory`] are still converted, but no
//! model is contacted; the response carries a "not yet supported" message.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docextract::{process_file, Extraction, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from ANTHROPIC_API_KEY / OPENAI_API_KEY / …
//!     let config = ExtractionConfig::default();
//!     let response = process_file("invoice.pdf", "Invoice", None, &config).await?;
//!     for page in &response.pages {
//!         if let Some(Extraction::Fields { fields, .. }) = &page.extraction {
//!             println!("page {}: {}", page.page_num, serde_json::to_string(fields)?);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docextract` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-docextract = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod error;
pub mod media;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod prompts;
pub mod schema;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{
    resolve_backend, BackendError, ExtractionBackend, LlmBackend, ToolCallReply, ToolReply,
    ToolRequest, ToolSpec,
};
pub use config::{ExtractionConfig, ExtractionConfigBuilder, PageSelection};
pub use error::{DocExtractError, PageError};
pub use media::MediaType;
pub use output::{
    Extraction, ExtractionRequest, ExtractionResponse, ExtractionStats, ExtractionStatus,
    PageImage, PageResult,
};
pub use pipeline::input::UploadedFile;
pub use process::{preview, process, process_file, process_sync, save_images};
pub use progress::{ExtractionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use schema::{DocumentCategory, DocumentSchema, FieldSpec, FieldType};
