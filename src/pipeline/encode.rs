//! Image encoding: `DynamicImage` → JPEG bytes → base64 `ImageData`.
//!
//! JPEG has no alpha channel, so every image is flattened to 8-bit RGB
//! before encoding. That makes any decodable input encodable, including
//! RGBA PNGs and 16-bit images.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use tracing::debug;

/// Encode a page image as JPEG at the given quality (1–100).
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
    debug!(
        "Encoded {}x{} image → {} bytes JPEG (q={})",
        rgb.width(),
        rgb.height(),
        buf.len(),
        quality
    );
    Ok(buf)
}

/// Wrap JPEG bytes as base64 image data for the VLM request.
pub fn to_image_data(jpeg: &[u8]) -> ImageData {
    let b64 = STANDARD.encode(jpeg);
    debug!("Encoded image → {} bytes base64", b64.len());
    ImageData::new(b64, "image/jpeg").with_detail("high")
}
