//! End-to-end entry points: request in, response out.
//!
//! A run always converts the upload first, so the page images are available
//! to display even when nothing is extracted. Then one of three things
//! happens:
//!
//! * the document type is not one of the known categories → status
//!   [`ExtractionStatus::UnsupportedDocumentType`], no model call, no
//!   provider lookup;
//! * extraction is disabled → [`ExtractionStatus::PreviewOnly`];
//! * otherwise each page is sent to the model, one after another →
//!   [`ExtractionStatus::Extracted`].

use crate::backend::resolve_backend;
use crate::config::ExtractionConfig;
use crate::error::DocExtractError;
use crate::output::{
    Extraction, ExtractionRequest, ExtractionResponse, ExtractionStats, ExtractionStatus,
    PageImage, PageResult,
};
use crate::pipeline::{encode, extract, input, render};
use crate::prompts::UNSUPPORTED_DOCUMENT_TYPE_MESSAGE;
use crate::schema::DocumentSchema;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Convert an upload and extract its fields.
///
/// # Returns
/// `Ok(ExtractionResponse)` on success, even if some pages failed
/// (check `response.stats.failed_pages`).
///
/// # Errors
/// Returns `Err(DocExtractError)` only for fatal errors:
/// - unsupported or undecodable file
/// - no LLM provider configured (only when a call would be made)
/// - every page failed extraction
pub async fn process(
    request: &ExtractionRequest,
    config: &ExtractionConfig,
) -> Result<ExtractionResponse, DocExtractError> {
    let total_start = Instant::now();
    let category = request.category();
    info!(
        "Processing '{}' ({}) as '{}'",
        request.file_name, request.media_type, request.document_type
    );

    // ── Step 1: Convert to page images ───────────────────────────────────
    let convert_start = Instant::now();
    let rendered = render::render_document(request, config).await?;
    let images = encode_pages(&rendered, config.jpeg_quality)?;
    let convert_duration_ms = convert_start.elapsed().as_millis() as u64;
    info!(
        "Converted {} of {} pages in {}ms",
        images.len(),
        rendered.total_pages,
        convert_duration_ms
    );

    let mut stats = ExtractionStats {
        total_pages: rendered.total_pages,
        converted_pages: images.len(),
        convert_duration_ms,
        ..Default::default()
    };

    // ── Step 2: Decide whether to extract ────────────────────────────────
    let (status, pages) = match category {
        None => {
            info!(
                "Document type '{}' is not supported; skipping extraction",
                request.document_type
            );
            (
                ExtractionStatus::UnsupportedDocumentType {
                    message: UNSUPPORTED_DOCUMENT_TYPE_MESSAGE.to_string(),
                },
                Vec::new(),
            )
        }
        Some(_) if !config.extract => {
            debug!("Extraction disabled; returning images only");
            (ExtractionStatus::PreviewOnly, Vec::new())
        }
        Some(category) => {
            // ── Step 3: Extract page by page ─────────────────────────────
            let extract_start = Instant::now();
            let pages = extract_pages(category.schema(), &images, config).await?;
            stats.extract_duration_ms = extract_start.elapsed().as_millis() as u64;
            (ExtractionStatus::Extracted, pages)
        }
    };

    // ── Step 4: Stats ────────────────────────────────────────────────────
    for page in &pages {
        match (&page.extraction, &page.error) {
            (_, Some(_)) => stats.failed_pages += 1,
            (Some(Extraction::Fields { .. }), None) => stats.extracted_pages += 1,
            (Some(Extraction::NoToolInvoked { .. }), None) => stats.no_tool_pages += 1,
            (None, None) => {}
        }
        stats.total_input_tokens += page.input_tokens as u64;
        stats.total_output_tokens += page.output_tokens as u64;
    }

    if !pages.is_empty() && stats.failed_pages == pages.len() {
        let first_error = pages
            .iter()
            .find_map(|p| p.error.as_ref())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(DocExtractError::AllPagesFailed {
            total: pages.len(),
            retries: config.max_retries,
            first_error,
        });
    }

    stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Done: {} extracted, {} declined, {} failed, {}ms total",
        stats.extracted_pages, stats.no_tool_pages, stats.failed_pages, stats.total_duration_ms
    );

    Ok(ExtractionResponse {
        file_name: request.file_name.clone(),
        media_type: request.media_type,
        document_type: request.document_type.clone(),
        category,
        status,
        images,
        pages,
        stats,
    })
}

/// Resolve `input` (path or URL), build a request and [`process`] it.
///
/// `mime_override` replaces whatever media type the source declared.
pub async fn process_file(
    input_str: impl AsRef<str>,
    document_type: impl Into<String>,
    mime_override: Option<&str>,
    config: &ExtractionConfig,
) -> Result<ExtractionResponse, DocExtractError> {
    let upload = input::resolve_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let request = upload.into_request(mime_override, document_type)?;
    process(&request, config).await
}

/// Synchronous wrapper around [`process`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_sync(
    request: &ExtractionRequest,
    config: &ExtractionConfig,
) -> Result<ExtractionResponse, DocExtractError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DocExtractError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process(request, config))
}

/// Convert only: return the page images without contacting the model.
///
/// Does not require an LLM provider or API key.
pub async fn preview(
    request: &ExtractionRequest,
    config: &ExtractionConfig,
) -> Result<ExtractionResponse, DocExtractError> {
    let mut config = config.clone();
    config.extract = false;
    process(request, &config).await
}

/// Write every page image of `response` to `dir` as `page-NNN.jpg`.
///
/// Each file is written to a temporary name and renamed, so a crash never
/// leaves a truncated image behind.
pub async fn save_images(
    response: &ExtractionResponse,
    dir: impl AsRef<Path>,
) -> Result<Vec<PathBuf>, DocExtractError> {
    let dir = dir.as_ref();
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| DocExtractError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

    let mut written = Vec::with_capacity(response.images.len());
    for image in &response.images {
        let path = dir.join(format!("page-{:03}.jpg", image.page_num));
        let tmp_path = path.with_extension("jpg.tmp");

        tokio::fs::write(&tmp_path, &image.jpeg)
            .await
            .map_err(|e| DocExtractError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| DocExtractError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;

        debug!("Wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// JPEG-encode every rendered page. Any failure aborts the run.
fn encode_pages(
    rendered: &render::RenderedDocument,
    quality: u8,
) -> Result<Vec<PageImage>, DocExtractError> {
    rendered
        .pages
        .iter()
        .map(|(idx, img)| {
            let jpeg = encode::encode_jpeg(img, quality).map_err(|e| {
                DocExtractError::EncodingFailed {
                    page: idx + 1,
                    detail: e.to_string(),
                }
            })?;
            Ok(PageImage {
                page_num: idx + 1,
                width: img.width(),
                height: img.height(),
                jpeg,
            })
        })
        .collect()
}

/// Send every page image to the model, in page order.
async fn extract_pages(
    schema: &DocumentSchema,
    images: &[PageImage],
    config: &ExtractionConfig,
) -> Result<Vec<PageResult>, DocExtractError> {
    let backend = resolve_backend(config)?;
    let total_pages = images.len();

    if let Some(ref cb) = config.progress_callback {
        cb.on_extraction_start(total_pages);
    }

    let mut results = Vec::with_capacity(total_pages);
    for image in images {
        let page_num = image.page_num;
        if let Some(ref cb) = config.progress_callback {
            cb.on_page_start(page_num, total_pages);
        }

        let data = encode::to_image_data(&image.jpeg);
        let result = extract::extract_page(backend.as_ref(), schema, page_num, data, config).await;

        match (&result.error, &config.progress_callback) {
            (None, Some(cb)) => cb.on_page_complete(
                page_num,
                total_pages,
                result.extraction.as_ref().map_or(0, Extraction::field_count),
            ),
            (Some(e), Some(cb)) => cb.on_page_error(page_num, total_pages, &e.to_string()),
            (Some(e), None) => warn!("{}", e),
            (None, None) => {}
        }

        results.push(result);
    }

    if let Some(ref cb) = config.progress_callback {
        let ok = results.iter().filter(|r| r.error.is_none()).count();
        cb.on_extraction_complete(total_pages, ok);
    }

    Ok(results)
}
