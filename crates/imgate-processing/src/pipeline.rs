//! Processing pipeline
//!
//! `ImageService` composes decode, optional watermark, the transcode decision and thumbnail
//! generation into one call. It is constructed once and shared; it holds no mutable state.

use crate::codec;
use crate::error::{ProcessingError, ProcessingResult};
use crate::naming::unique_file_name;
use crate::thumbnail;
use crate::transcoder::{Rule, Transcoded, Transcoder};
use crate::watermark::{FontLoader, WatermarkRenderer};
use bytes::Bytes;
use image::{DynamicImage, GenericImageView};
use imgate_core::{GlobalConfig, Settings};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bound on the buffer reserved up front from a client-declared size.
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// Output of one `process_image` call. Callers copy fields into their records and drop it.
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub original_bytes: Bytes,
    pub compressed_bytes: Bytes,
    /// `None` when thumbnails are disabled or generation failed.
    pub thumbnail_bytes: Option<Bytes>,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub mime_type: String,
    pub output_ext: String,
    pub unique_file_name: String,
}

impl ProcessedImage {
    pub fn thumbnail_mime(&self) -> &'static str {
        if codec::is_special(&self.format, &self.mime_type) {
            "image/jpeg"
        } else {
            "image/webp"
        }
    }

    pub fn compressed_size(&self) -> u64 {
        self.compressed_bytes.len() as u64
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImageService {
    transcoder: Arc<Transcoder>,
}

impl ImageService {
    pub fn new(fonts: FontLoader) -> Self {
        Self {
            transcoder: Arc::new(Transcoder::new(WatermarkRenderer::new(fonts))),
        }
    }

    pub fn from_config(config: &GlobalConfig) -> Self {
        Self::new(FontLoader::new(config.font_dir.clone()))
    }

    /// Renderer shared with the read path.
    pub fn renderer(&self) -> &WatermarkRenderer {
        self.transcoder.renderer()
    }

    /// Read the upload, then run the CPU-bound steps on the blocking pool.
    ///
    /// A non-zero `declared_size` that disagrees with the bytes actually read is reported as
    /// [`ProcessingError::Truncated`], distinct from a decode failure.
    pub async fn process_image<R>(
        &self,
        mut reader: R,
        declared_size: u64,
        declared_content_type: &str,
        settings: &Settings,
    ) -> ProcessingResult<ProcessedImage>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut buffer = Vec::with_capacity(declared_size.min(MAX_PREALLOC) as usize);
        reader.read_to_end(&mut buffer).await?;

        let service = self.clone();
        let content_type = declared_content_type.to_string();
        let settings = settings.clone();
        tokio::task::spawn_blocking(move || {
            service.process_bytes(buffer, declared_size, &content_type, &settings)
        })
        .await
        .map_err(|e| ProcessingError::Task(e.to_string()))?
    }

    pub fn process_bytes(
        &self,
        bytes: Vec<u8>,
        declared_size: u64,
        declared_content_type: &str,
        settings: &Settings,
    ) -> ProcessingResult<ProcessedImage> {
        let start = Instant::now();
        let actual = bytes.len() as u64;
        if declared_size > 0 && actual != declared_size {
            tracing::warn!(
                expected = declared_size,
                actual = actual,
                "Upload size does not match declared size"
            );
            return Err(ProcessingError::Truncated {
                expected: declared_size,
                actual,
            });
        }

        let (img, format) = codec::decode(&bytes)?;
        let (width, height) = img.dimensions();
        let format_name = codec::format_name(format);

        let transcoded = self.transcoder.transcode(
            &img,
            &bytes,
            format_name,
            declared_content_type,
            actual,
            settings,
        )?;

        let thumbnail_bytes = if settings.thumbnail {
            match self.thumbnail_for(&img, &transcoded) {
                Ok(thumb) => Some(Bytes::from(thumb)),
                Err(e) => {
                    tracing::warn!(error = %e, "Thumbnail generation failed, continuing without");
                    None
                }
            }
        } else {
            None
        };

        let output_ext = codec::extension_for_mime(&transcoded.mime).to_string();
        let unique_file_name = unique_file_name(&output_ext);

        tracing::info!(
            file_name = %unique_file_name,
            width = width,
            height = height,
            format = %transcoded.format,
            original_size = actual,
            output_size = transcoded.bytes.len(),
            has_thumbnail = thumbnail_bytes.is_some(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Image processed"
        );

        Ok(ProcessedImage {
            original_bytes: Bytes::from(bytes),
            compressed_bytes: Bytes::from(transcoded.bytes),
            thumbnail_bytes,
            width,
            height,
            format: transcoded.format,
            mime_type: transcoded.mime,
            output_ext,
            unique_file_name,
        })
    }

    /// Thumbnail from the final bytes; reuses the decoded source when they are unchanged.
    fn thumbnail_for(&self, source: &DynamicImage, out: &Transcoded) -> ProcessingResult<Vec<u8>> {
        let unchanged = !out.watermarked
            && matches!(
                out.rule,
                Rule::SpecialFormat | Rule::CanonicalPassThrough | Rule::KeepOriginal
            );

        if unchanged {
            thumbnail::generate(source, &out.format, &out.mime)
        } else {
            let (processed, _) = codec::decode(&out.bytes)
                .map_err(|e| ProcessingError::Thumbnail(e.to_string()))?;
            thumbnail::generate(&processed, &out.format, &out.mime)
        }
    }
}
