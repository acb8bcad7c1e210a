//! Conversion of an upload into page images.
//!
//! * PDF: each selected page is rasterised via pdfium. pdfium is not
//!   async-safe, so the work runs inside `tokio::task::spawn_blocking`.
//! * PNG / JPEG: decoded with the `image` crate, also off the executor;
//!   always exactly one page, whatever the page selection says. The actual
//!   format is taken from the bytes, so a PNG named `.jpg` still decodes.
//!
//! The page count of the output therefore equals the number of selected PDF
//! pages, or one for single-image formats.

use crate::config::{ExtractionConfig, PageSelection};
use crate::error::DocExtractError;
use crate::media::MediaType;
use crate::output::ExtractionRequest;
use image::{DynamicImage, ImageFormat, ImageReader};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Page images produced from one upload.
pub struct RenderedDocument {
    /// Pages in the source document (1 for single images).
    pub total_pages: usize,
    /// `(page_index_0based, image)` in page order.
    pub pages: Vec<(usize, DynamicImage)>,
}

/// Convert the request's bytes into one image per selected page.
pub async fn render_document(
    request: &ExtractionRequest,
    config: &ExtractionConfig,
) -> Result<RenderedDocument, DocExtractError> {
    match request.media_type {
        MediaType::Png | MediaType::Jpeg => {
            let bytes = request.bytes.clone();
            let file_name = request.file_name.clone();
            let media_type = request.media_type;

            let image = tokio::task::spawn_blocking(move || {
                decode_image(&bytes, media_type, &file_name)
            })
            .await
            .map_err(|e| DocExtractError::Internal(format!("Decode task panicked: {}", e)))??;

            Ok(RenderedDocument {
                total_pages: 1,
                pages: vec![(0, image)],
            })
        }
        MediaType::Pdf => {
            let bytes = request.bytes.clone();
            let file_name = request.file_name.clone();
            let config = config.clone();

            tokio::task::spawn_blocking(move || render_pdf_blocking(&bytes, &file_name, &config))
                .await
                .map_err(|e| DocExtractError::Internal(format!("Render task panicked: {}", e)))?
        }
    }
}

/// Decode a single PNG or JPEG image.
///
/// `media_type` is only a hint: the format is sniffed from the bytes first
/// and the hint is used when sniffing finds nothing.
pub fn decode_image(
    bytes: &[u8],
    media_type: MediaType,
    file_name: &str,
) -> Result<DynamicImage, DocExtractError> {
    let declared = match media_type {
        MediaType::Png => ImageFormat::Png,
        MediaType::Jpeg => ImageFormat::Jpeg,
        MediaType::Pdf => {
            return Err(DocExtractError::Internal(
                "decode_image called with a PDF".into(),
            ))
        }
    };

    let corrupt = |detail: String| DocExtractError::CorruptImage {
        file_name: file_name.to_string(),
        media_type: media_type.mime().to_string(),
        detail,
    };

    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| corrupt(e.to_string()))?;
    match reader.format() {
        None => reader.set_format(declared),
        Some(actual) if actual != declared => warn!(
            "'{}' declared as {} but the bytes are {:?}",
            file_name, media_type, actual
        ),
        Some(_) => {}
    }

    let image = reader.decode().map_err(|e| corrupt(e.to_string()))?;

    debug!(
        "Decoded {} '{}' → {}x{} px",
        media_type,
        file_name,
        image.width(),
        image.height()
    );
    Ok(image)
}

/// Bind to a pdfium shared library.
///
/// `PDFIUM_LIB_PATH` (a library file or the directory holding it) wins;
/// otherwise the working directory is tried, then the system loader path.
pub fn bind_pdfium() -> Result<Pdfium, DocExtractError> {
    let bindings = match std::env::var_os("PDFIUM_LIB_PATH") {
        Some(raw) => {
            let path = PathBuf::from(raw);
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            Pdfium::bind_to_library(lib)
        }
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| DocExtractError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of PDF rasterisation.
fn render_pdf_blocking(
    bytes: &[u8],
    file_name: &str,
    config: &ExtractionConfig,
) -> Result<RenderedDocument, DocExtractError> {
    let pdfium = bind_pdfium()?;
    let password = config.password.as_deref();

    let document = pdfium
        .load_pdf_from_byte_slice(bytes, password)
        .map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    DocExtractError::WrongPassword {
                        file_name: file_name.to_string(),
                    }
                } else {
                    DocExtractError::PasswordRequired {
                        file_name: file_name.to_string(),
                    }
                }
            } else {
                DocExtractError::CorruptPdf {
                    file_name: file_name.to_string(),
                    detail: err_str,
                }
            }
        })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF '{}' loaded: {} pages", file_name, total_pages);

    let indices = config.pages.to_indices(total_pages);
    if indices.is_empty() {
        return Err(DocExtractError::PageOutOfRange {
            page: first_requested_page(&config.pages),
            total: total_pages,
        });
    }

    let max_pixels = config.max_rendered_pixels as i32;
    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(config.dpi as f32 / 72.0)
        .set_maximum_width(max_pixels)
        .set_maximum_height(max_pixels);

    let mut rendered = Vec::with_capacity(indices.len());

    for idx in indices {
        if idx >= total_pages {
            warn!("Skipping page {} (out of range, total={})", idx + 1, total_pages);
            continue;
        }

        let page = pages
            .get(idx as u16)
            .map_err(|e| DocExtractError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            })?;

        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            DocExtractError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        rendered.push((idx, image));
    }

    Ok(RenderedDocument {
        total_pages,
        pages: rendered,
    })
}

fn first_requested_page(selection: &PageSelection) -> usize {
    match selection {
        PageSelection::All => 0,
        PageSelection::Single(p) => *p,
        PageSelection::Range(start, _) => *start,
        PageSelection::Set(pages) => pages.iter().copied().min().unwrap_or(0),
    }
}
