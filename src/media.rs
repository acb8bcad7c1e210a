//! Supported upload formats and how their media type is determined.
//!
//! A declared MIME type wins when present (HTTP `Content-Type`, `--mime`).
//! Otherwise the file extension is used, and as a last resort the leading
//! magic bytes. Anything that resolves outside PDF/PNG/JPEG is rejected with
//! [`DocExtractError::UnsupportedFormat`].

use crate::error::DocExtractError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// The media types the tool accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Pdf,
    Png,
    Jpeg,
}

impl MediaType {
    /// Canonical MIME string.
    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Pdf => "application/pdf",
            MediaType::Png => "image/png",
            MediaType::Jpeg => "image/jpeg",
        }
    }

    /// True for formats that can hold more than one page.
    pub fn is_paged(&self) -> bool {
        matches!(self, MediaType::Pdf)
    }

    /// Parse a MIME string, ignoring case and any `; charset=…` parameters.
    ///
    /// `image/jpg` is accepted as an alias of `image/jpeg`.
    pub fn from_mime(mime: &str) -> Result<Self, DocExtractError> {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/pdf" => Ok(MediaType::Pdf),
            "image/png" => Ok(MediaType::Png),
            "image/jpeg" | "image/jpg" => Ok(MediaType::Jpeg),
            _ => Err(DocExtractError::UnsupportedFormat {
                media_type: mime.trim().to_string(),
            }),
        }
    }

    /// Infer from a file extension (`.pdf`, `.png`, `.jpg`, `.jpeg`).
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(MediaType::Pdf),
            "png" => Some(MediaType::Png),
            "jpg" | "jpeg" => Some(MediaType::Jpeg),
            _ => None,
        }
    }

    /// Infer from the leading magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"%PDF") {
            Some(MediaType::Pdf)
        } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(MediaType::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(MediaType::Jpeg)
        } else {
            None
        }
    }

    /// Resolve the media type of an upload.
    ///
    /// Order: declared MIME, then file extension, then magic bytes. A
    /// declared but unsupported MIME is an error even if the bytes would
    /// sniff as something supported.
    pub fn resolve(
        declared: Option<&str>,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Self, DocExtractError> {
        if let Some(mime) = declared.filter(|m| !m.trim().is_empty()) {
            return Self::from_mime(mime);
        }
        if let Some(t) = Self::from_extension(Path::new(file_name)) {
            return Ok(t);
        }
        Self::sniff(bytes).ok_or_else(|| DocExtractError::UnsupportedFormat {
            media_type: Path::new(file_name)
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}
