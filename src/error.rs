//! Error types for the edgequake-docextract library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DocExtractError`]: **Fatal**: the run cannot proceed at all
//!   (unsupported file, corrupt PDF, provider not configured). Returned as
//!   `Err(DocExtractError)` from the top-level `process*` functions.
//!
//! * [`PageError`]: **Non-fatal**: a single page's extraction call failed
//!   (API error, timeout, malformed tool arguments) but the other pages are
//!   fine.
//!   Stored inside [`crate::output::PageResult`] so callers see partial
//!   success rather than losing the whole document to one bad page.
//!
//! A model that answers without calling the extraction tool is neither: it
//! is a normal outcome, [`crate::output::Extraction::NoToolInvoked`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-docextract library.
#[derive(Debug, Error)]
pub enum DocExtractError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a usable file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The declared or inferred media type is not PDF, PNG or JPEG.
    #[error("Unsupported format '{media_type}'\nSupported: application/pdf, image/png, image/jpeg, image/jpg.")]
    UnsupportedFormat { media_type: String },

    // ── Decoding errors ───────────────────────────────────────────────────
    /// PNG/JPEG bytes could not be decoded.
    #[error("Could not decode {media_type} image '{file_name}': {detail}")]
    CorruptImage {
        file_name: String,
        media_type: String,
        detail: String,
    },

    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{file_name}' is corrupt: {detail}")]
    CorruptPdf { file_name: String, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{file_name}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { file_name: String },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{file_name}'")]
    WrongPassword { file_name: String },

    /// The page selection matched no page of the document.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// A page image could not be written as JPEG. Fatal: a page that cannot
    /// be encoded can neither be shown nor sent.
    #[error("JPEG encoding failed for page {page}: {detail}")]
    EncodingFailed { page: usize, detail: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Every page sent for extraction failed; there is nothing to show.
    #[error("All {total} pages failed extraction after {retries} retries each.\nFirst error: {first_error}")]
    AllPagesFailed {
        total: usize,
        retries: u32,
        first_error: String,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not write a page image or report to disk.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDF input needs the pdfium shared library. You can:\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium (file or directory).\n\
  • Place libpdfium next to the executable or in the working directory.\n\
  • Install pdfium system-wide so the dynamic loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The extraction call failed after retries.
    #[error("Page {page}: extraction call failed after {retries} retries: {detail}")]
    ExtractionFailed {
        page: usize,
        retries: u32,
        detail: String,
    },

    /// The extraction call timed out on its last attempt.
    #[error("Page {page}: extraction call timed out after {secs}s")]
    Timeout { page: usize, secs: u64 },

    /// The model called the tool but its arguments were not a JSON object.
    #[error("Page {page}: tool '{tool}' returned malformed arguments: {detail}")]
    MalformedArguments {
        page: usize,
        tool: String,
        detail: String,
    },
}

impl PageError {
    /// 1-indexed page the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::ExtractionFailed { page, .. }
            | PageError::Timeout { page, .. }
            | PageError::MalformedArguments { page, .. } => *page,
        }
    }
}
