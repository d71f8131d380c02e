use crate::codec;
use crate::error::{ProcessingError, ProcessingResult};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

pub const THUMBNAIL_MAX_WIDTH: u32 = 300;
pub const THUMBNAIL_MAX_HEIGHT: u32 = 300;
pub const THUMBNAIL_QUALITY: u8 = 80;

/// Fit inside the thumbnail box, keeping aspect ratio. Never upscales.
pub fn fit(img: &DynamicImage) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width <= THUMBNAIL_MAX_WIDTH && height <= THUMBNAIL_MAX_HEIGHT {
        return img.clone();
    }
    img.resize(THUMBNAIL_MAX_WIDTH, THUMBNAIL_MAX_HEIGHT, FilterType::Lanczos3)
}

/// Encoded thumbnail: JPEG for special formats, webp otherwise.
pub fn generate(img: &DynamicImage, format: &str, mime: &str) -> ProcessingResult<Vec<u8>> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(ProcessingError::Thumbnail("empty image".to_string()));
    }

    let thumb = fit(img);
    let encoded = if codec::is_special(format, mime) {
        codec::encode_jpeg(&thumb, THUMBNAIL_QUALITY)
    } else {
        codec::encode_webp(&thumb, THUMBNAIL_QUALITY)
    };
    encoded.map_err(|e| ProcessingError::Thumbnail(e.to_string()))
}
