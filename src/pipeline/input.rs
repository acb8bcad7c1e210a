//! Input resolution: turn a user-supplied path or URL into an uploaded file.
//!
//! The result carries the bytes, a display name and, when the source
//! declared one, a MIME type. For URLs that is the `Content-Type` header;
//! local files declare nothing and fall back to extension/magic detection in
//! [`crate::media::MediaType::resolve`].

use crate::error::DocExtractError;
use crate::media::MediaType;
use crate::output::ExtractionRequest;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A file as the user handed it over, before format detection.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub declared_mime: Option<String>,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    /// Detect the media type and pair the file with a document-type selection.
    ///
    /// `mime_override` beats whatever the source declared.
    pub fn into_request(
        self,
        mime_override: Option<&str>,
        document_type: impl Into<String>,
    ) -> Result<ExtractionRequest, DocExtractError> {
        let declared = mime_override.or(self.declared_mime.as_deref());
        let media_type = MediaType::resolve(declared, &self.file_name, &self.bytes)?;
        debug!("'{}' resolved as {}", self.file_name, media_type);
        Ok(ExtractionRequest::new(
            self.file_name,
            media_type,
            self.bytes,
            document_type,
        ))
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve the input string to an [`UploadedFile`].
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<UploadedFile, DocExtractError> {
    if input.trim().is_empty() {
        return Err(DocExtractError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        read_local(Path::new(input)).await
    }
}

/// Read a local file, mapping I/O failures to input errors.
pub async fn read_local(path: &Path) -> Result<UploadedFile, DocExtractError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => DocExtractError::PermissionDenied {
            path: path.to_path_buf(),
        },
        std::io::ErrorKind::NotFound => DocExtractError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => DocExtractError::InvalidInput {
            input: format!("{}: {}", path.display(), e),
        },
    })?;

    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(UploadedFile {
        file_name: display_name(path),
        declared_mime: None,
        bytes,
    })
}

/// Download a URL into memory.
async fn download_url(url: &str, timeout_secs: u64) -> Result<UploadedFile, DocExtractError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| DocExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            DocExtractError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            DocExtractError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(DocExtractError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let declared_mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|m| !is_generic_mime(m));

    let bytes = response
        .bytes()
        .await
        .map_err(|e| DocExtractError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    info!("Downloaded {} bytes", bytes.len());

    Ok(UploadedFile {
        file_name: filename_from_url(url),
        declared_mime,
        bytes: bytes.to_vec(),
    })
}

/// Servers often label everything `application/octet-stream`; that tells us
/// nothing, so detection falls through to the extension and magic bytes.
fn is_generic_mime(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or_default().trim();
    essence.eq_ignore_ascii_case("application/octet-stream")
        || essence.eq_ignore_ascii_case("binary/octet-stream")
}

/// Extract a reasonable filename from the URL path.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() {
                    return last.to_string();
                }
            }
        }
    }
    "download".to_string()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| PathBuf::from(path).display().to_string())
}
