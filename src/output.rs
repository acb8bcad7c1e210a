//! Request and response types for one extraction run.
//!
//! An [`ExtractionRequest`] carries everything the user supplied (file name,
//! declared media type, bytes, document-type selection). The pipeline returns
//! an [`ExtractionResponse`] holding the converted page images and, per page,
//! what the model extracted. No state survives between runs.

use crate::error::{DocExtractError, PageError};
use crate::media::MediaType;
use crate::schema::DocumentCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything a user submits for one run.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// Original file name, used for display and error messages.
    pub file_name: String,
    pub media_type: MediaType,
    pub bytes: Vec<u8>,
    /// The document type exactly as the user selected it.
    pub document_type: String,
}

impl ExtractionRequest {
    pub fn new(
        file_name: impl Into<String>,
        media_type: MediaType,
        bytes: Vec<u8>,
        document_type: impl Into<String>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            media_type,
            bytes,
            document_type: document_type.into(),
        }
    }

    /// Build a request from a declared MIME string.
    ///
    /// Fails with [`DocExtractError::UnsupportedFormat`] unless the MIME is
    /// `application/pdf`, `image/png`, `image/jpeg` or `image/jpg`.
    pub fn from_mime(
        file_name: impl Into<String>,
        mime: &str,
        bytes: Vec<u8>,
        document_type: impl Into<String>,
    ) -> Result<Self, DocExtractError> {
        let media_type = MediaType::from_mime(mime)?;
        Ok(Self::new(file_name, media_type, bytes, document_type))
    }

    /// The selected category, or `None` when the selection is not one of
    /// the supported document types.
    pub fn category(&self) -> Option<DocumentCategory> {
        DocumentCategory::from_label(&self.document_type)
    }
}

/// One converted page, JPEG-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageImage {
    /// 1-indexed page number within the source document.
    pub page_num: usize,
    pub width: u32,
    pub height: u32,
    /// JPEG bytes. Omitted from JSON output; use
    /// [`crate::process::save_images`] to write them to disk.
    #[serde(skip)]
    pub jpeg: Vec<u8>,
}

impl PageImage {
    /// Size of the encoded JPEG in bytes.
    pub fn jpeg_len(&self) -> usize {
        self.jpeg.len()
    }
}

/// What the model returned for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Extraction {
    /// The model called the extraction tool.
    Fields {
        tool: String,
        fields: BTreeMap<String, serde_json::Value>,
        /// Required fields the model left out. Reported, never enforced.
        missing_required: Vec<String>,
    },
    /// The model answered without calling the tool.
    NoToolInvoked {
        /// Fixed user-facing explanation.
        message: String,
        /// Whatever text the model produced instead.
        model_text: String,
    },
}

impl Extraction {
    /// Number of extracted fields; `0` for [`Extraction::NoToolInvoked`].
    pub fn field_count(&self) -> usize {
        match self {
            Extraction::Fields { fields, .. } => fields.len(),
            Extraction::NoToolInvoked { .. } => 0,
        }
    }

    pub fn fields(&self) -> Option<&BTreeMap<String, serde_json::Value>> {
        match self {
            Extraction::Fields { fields, .. } => Some(fields),
            Extraction::NoToolInvoked { .. } => None,
        }
    }
}

/// Per-page outcome of the extraction step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    /// 1-indexed page number.
    pub page_num: usize,
    /// `None` when the page failed; see `error`.
    pub extraction: Option<Extraction>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub duration_ms: u64,
    pub retries: u32,
    pub error: Option<PageError>,
}

/// How far the run went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// Pages were sent to the model; see [`ExtractionResponse::pages`].
    Extracted,
    /// Extraction disabled; only the converted images are returned.
    PreviewOnly,
    /// The selected document type has no schema; no call was made.
    UnsupportedDocumentType { message: String },
}

/// Run-level counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionStats {
    /// Pages in the source document (1 for single images).
    pub total_pages: usize,
    /// Pages converted to JPEG.
    pub converted_pages: usize,
    /// Pages where the model called the tool.
    pub extracted_pages: usize,
    /// Pages where the model declined the tool.
    pub no_tool_pages: usize,
    pub failed_pages: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub convert_duration_ms: u64,
    pub extract_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Result of one run, returned to whatever surface displays it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResponse {
    pub file_name: String,
    pub media_type: MediaType,
    /// The selection as the user typed it.
    pub document_type: String,
    /// The matched category, if any.
    pub category: Option<DocumentCategory>,
    pub status: ExtractionStatus,
    pub images: Vec<PageImage>,
    pub pages: Vec<PageResult>,
    pub stats: ExtractionStats,
}

impl ExtractionResponse {
    /// Result for a given 1-indexed page, if that page was extracted.
    pub fn page(&self, page_num: usize) -> Option<&PageResult> {
        self.pages.iter().find(|p| p.page_num == page_num)
    }
}
