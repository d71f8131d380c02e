//! Decode by trial against a fixed format priority, plus the encoders the transcoder and
//! watermark renderer share.

use crate::error::{ProcessingError, ProcessingResult};
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use std::io::Cursor;

/// Trial order: the canonical output format first, then common ingestion formats.
const DECODE_PRIORITY: [ImageFormat; 4] = [
    ImageFormat::WebP,
    ImageFormat::Gif,
    ImageFormat::Png,
    ImageFormat::Jpeg,
];

/// Formats that are never re-encoded.
const SPECIAL_FORMATS: [&str; 1] = ["gif"];
const SPECIAL_MIME_TYPES: [&str; 2] = ["image/gif", "image/svg+xml"];

/// Decode `bytes` into a raster image and report which format recognised it.
pub fn decode(bytes: &[u8]) -> ProcessingResult<(DynamicImage, ImageFormat)> {
    for format in DECODE_PRIORITY {
        if let Ok(img) = image::load_from_memory_with_format(bytes, format) {
            return Ok((img, format));
        }
    }

    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| ProcessingError::UnsupportedFormat("unrecognised byte stream".to_string()))?;
    let img = reader
        .decode()
        .map_err(|e| ProcessingError::UnsupportedFormat(e.to_string()))?;

    tracing::debug!(format = ?format, "Decoded through format sniffing fallback");
    Ok((img, format))
}

/// Read dimensions from the header only.
pub fn decode_config(bytes: &[u8]) -> ProcessingResult<(u32, u32, ImageFormat)> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| ProcessingError::UnsupportedFormat("unrecognised byte stream".to_string()))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| ProcessingError::UnsupportedFormat(e.to_string()))?;
    Ok((width, height, format))
}

/// Short lowercase name used in format decisions ("webp", "jpeg", ...).
pub fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::WebP => "webp",
        ImageFormat::Gif => "gif",
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpeg",
        other => other.extensions_str().first().copied().unwrap_or("unknown"),
    }
}

pub fn mime_for_format(format: ImageFormat) -> &'static str {
    format.to_mime_type()
}

/// File extension (with dot) for a final MIME type; empty when unknown.
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/svg+xml" => ".svg",
        "image/bmp" => ".bmp",
        "image/tiff" => ".tiff",
        "image/heic" => ".heic",
        "image/heif" => ".heif",
        _ => "",
    }
}

/// Animated or vector input that must be passed through untouched.
pub fn is_special(format: &str, mime: &str) -> bool {
    SPECIAL_FORMATS.contains(&format.to_lowercase().as_str()) || SPECIAL_MIME_TYPES.contains(&mime)
}

fn check_quality(quality: u8) -> ProcessingResult<()> {
    if quality > 100 {
        return Err(ProcessingError::InvalidQuality(quality));
    }
    Ok(())
}

/// Lossy webp at `quality` (0-100).
pub fn encode_webp(img: &DynamicImage, quality: u8) -> ProcessingResult<Vec<u8>> {
    check_quality(quality)?;
    let (width, height) = img.dimensions();
    let rgba = img.to_rgba8();

    let encoder = webp::Encoder::from_rgba(&rgba, width, height);
    let encoded = encoder
        .encode_simple(false, quality as f32)
        .map_err(|e| ProcessingError::encode("webp", format!("{:?}", e)))?;

    Ok(encoded.to_vec())
}

/// Progressive JPEG through mozjpeg.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> ProcessingResult<Vec<u8>> {
    check_quality(quality)?;
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
    comp.set_size(width as usize, height as usize);
    comp.set_quality(quality as f32);
    comp.set_progressive_mode();
    comp.set_optimize_coding(true);

    let mut comp = comp
        .start_compress(Vec::new())
        .map_err(|e| ProcessingError::encode("jpeg", e))?;
    comp.write_scanlines(&rgb)
        .map_err(|e| ProcessingError::encode("jpeg", e))?;
    comp.finish().map_err(|e| ProcessingError::encode("jpeg", e))
}

pub fn encode_png(img: &DynamicImage) -> ProcessingResult<Vec<u8>> {
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| ProcessingError::encode("png", e))?;
    Ok(buffer)
}
