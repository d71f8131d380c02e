//! Output format decision
//!
//! The decision is an ordered rule list: the first rule whose predicate matches wins. The
//! watermark step sits between the special-format rule and the canonical-format rules.

use crate::codec;
use crate::error::ProcessingResult;
use crate::watermark::{WatermarkConfig, WatermarkRenderer};
use image::DynamicImage;
use imgate_core::Settings;

pub const CANONICAL_FORMAT: &str = "webp";
pub const CANONICAL_MIME: &str = "image/webp";
pub const REDUCED_QUALITY: u8 = 85;
pub const ORIGINAL_QUALITY: u8 = 100;
pub const COMPRESS_THRESHOLD: u64 = 1024 * 1024;

/// Facts a rule looks at.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub format: &'a str,
    pub mime: &'a str,
    pub original_size: u64,
    pub original_image: bool,
    pub save_webp: bool,
}

impl DecisionInput<'_> {
    fn is_canonical(&self) -> bool {
        self.format.eq_ignore_ascii_case(CANONICAL_FORMAT)
    }

    fn oversized(&self) -> bool {
        self.original_size > COMPRESS_THRESHOLD
    }

    fn foreign_quality(&self) -> u8 {
        if !self.original_image && self.oversized() {
            REDUCED_QUALITY
        } else {
            ORIGINAL_QUALITY
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    SpecialFormat,
    CanonicalPassThrough,
    CanonicalRecompress,
    ConvertToCanonical,
    KeepOriginal,
    DefaultCompress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Original bytes, original format and MIME.
    PassThrough,
    /// Original bytes labelled with the canonical format.
    PassThroughCanonical,
    EncodeCanonical { quality: u8 },
}

struct RuleEntry {
    rule: Rule,
    applies: fn(&DecisionInput) -> bool,
    decide: fn(&DecisionInput) -> Decision,
}

const RULES: [RuleEntry; 6] = [
    RuleEntry {
        rule: Rule::SpecialFormat,
        applies: |i| codec::is_special(i.format, i.mime),
        decide: |_| Decision::PassThrough,
    },
    RuleEntry {
        rule: Rule::CanonicalPassThrough,
        applies: |i| i.is_canonical() && (i.original_image || !i.oversized()),
        decide: |_| Decision::PassThroughCanonical,
    },
    RuleEntry {
        rule: Rule::CanonicalRecompress,
        applies: |i| i.is_canonical(),
        decide: |_| Decision::EncodeCanonical {
            quality: REDUCED_QUALITY,
        },
    },
    RuleEntry {
        rule: Rule::ConvertToCanonical,
        applies: |i| i.save_webp,
        decide: |i| Decision::EncodeCanonical {
            quality: i.foreign_quality(),
        },
    },
    RuleEntry {
        rule: Rule::KeepOriginal,
        applies: |i| i.original_image,
        decide: |_| Decision::PassThrough,
    },
    RuleEntry {
        rule: Rule::DefaultCompress,
        applies: |_| true,
        decide: |_| Decision::EncodeCanonical {
            quality: REDUCED_QUALITY,
        },
    },
];

/// First matching rule and what it decided.
pub fn decide(input: &DecisionInput) -> (Rule, Decision) {
    RULES
        .iter()
        .find(|entry| (entry.applies)(input))
        .map(|entry| (entry.rule, (entry.decide)(input)))
        .unwrap_or((
            Rule::DefaultCompress,
            Decision::EncodeCanonical {
                quality: REDUCED_QUALITY,
            },
        ))
}

#[derive(Debug, Clone)]
pub struct Transcoded {
    pub bytes: Vec<u8>,
    pub format: String,
    pub mime: String,
    pub rule: Rule,
    pub watermarked: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Transcoder {
    renderer: WatermarkRenderer,
}

impl Transcoder {
    pub fn new(renderer: WatermarkRenderer) -> Self {
        Self { renderer }
    }

    pub fn renderer(&self) -> &WatermarkRenderer {
        &self.renderer
    }

    /// Produce the final bytes for a decoded upload.
    ///
    /// `declared_mime` is the client's content type; it only takes part in the special-format
    /// check and labels passed-through bytes.
    pub fn transcode(
        &self,
        img: &DynamicImage,
        original_bytes: &[u8],
        format: &str,
        declared_mime: &str,
        original_size: u64,
        settings: &Settings,
    ) -> ProcessingResult<Transcoded> {
        let mut input = DecisionInput {
            format,
            mime: declared_mime,
            original_size,
            original_image: settings.original_image,
            save_webp: settings.save_webp,
        };

        let (rule, _) = decide(&input);
        if rule == Rule::SpecialFormat {
            return Ok(Transcoded {
                bytes: original_bytes.to_vec(),
                format: format.to_lowercase(),
                mime: label_mime(declared_mime, format),
                rule,
                watermarked: false,
            });
        }

        // Watermarked bytes carry their own container, which replaces the source format.
        let stamped;
        let (source_bytes, source_img, source_format, source_mime) = if settings.watermark.enable {
            let cfg = WatermarkConfig::from_settings(&settings.watermark);
            let bytes = self.renderer.apply_to_bytes(original_bytes, &cfg)?;
            let (decoded, decoded_format) = codec::decode(&bytes)?;
            stamped = (bytes, decoded);
            (
                stamped.0.as_slice(),
                &stamped.1,
                codec::format_name(decoded_format),
                codec::mime_for_format(decoded_format).to_string(),
            )
        } else {
            (
                original_bytes,
                img,
                format,
                label_mime(declared_mime, format),
            )
        };

        input.format = source_format;
        input.mime = &source_mime;
        let (rule, decision) = decide(&input);

        let (bytes, format, mime) = match decision {
            Decision::PassThrough => (
                source_bytes.to_vec(),
                source_format.to_lowercase(),
                source_mime.clone(),
            ),
            Decision::PassThroughCanonical => (
                source_bytes.to_vec(),
                CANONICAL_FORMAT.to_string(),
                CANONICAL_MIME.to_string(),
            ),
            Decision::EncodeCanonical { quality } => (
                codec::encode_webp(source_img, quality)?,
                CANONICAL_FORMAT.to_string(),
                CANONICAL_MIME.to_string(),
            ),
        };

        tracing::debug!(
            rule = ?rule,
            format = %format,
            original_size = original_size,
            output_size = bytes.len(),
            watermarked = settings.watermark.enable,
            "Transcode decision applied"
        );

        Ok(Transcoded {
            bytes,
            format,
            mime,
            rule,
            watermarked: settings.watermark.enable,
        })
    }
}

/// Declared MIME when present, otherwise the MIME implied by the detected format.
fn label_mime(declared: &str, format: &str) -> String {
    if !declared.trim().is_empty() {
        return declared.to_string();
    }
    image::ImageFormat::from_extension(format)
        .map(|f| f.to_mime_type().to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn input<'a>(format: &'a str, mime: &'a str, size: u64) -> DecisionInput<'a> {
        DecisionInput {
            format,
            mime,
            original_size: size,
            original_image: false,
            save_webp: true,
        }
    }

    #[test]
    fn test_special_format_wins_over_everything() {
        let mut i = input("gif", "image/gif", 10 * COMPRESS_THRESHOLD);
        i.original_image = true;
        assert_eq!(decide(&i), (Rule::SpecialFormat, Decision::PassThrough));

        let svg = input("png", "image/svg+xml", 10);
        assert_eq!(decide(&svg).0, Rule::SpecialFormat);
    }

    #[test]
    fn test_small_webp_passes_through() {
        let i = input("webp", "image/webp", COMPRESS_THRESHOLD);
        assert_eq!(
            decide(&i),
            (Rule::CanonicalPassThrough, Decision::PassThroughCanonical)
        );
    }

    #[test]
    fn test_large_webp_with_original_flag_passes_through() {
        let mut i = input("webp", "image/webp", COMPRESS_THRESHOLD + 1);
        i.original_image = true;
        assert_eq!(decide(&i).0, Rule::CanonicalPassThrough);
    }

    #[test]
    fn test_large_webp_recompresses_at_reduced_quality() {
        let i = input("webp", "image/webp", COMPRESS_THRESHOLD + 1);
        assert_eq!(
            decide(&i),
            (
                Rule::CanonicalRecompress,
                Decision::EncodeCanonical {
                    quality: REDUCED_QUALITY
                }
            )
        );
    }

    #[test]
    fn test_foreign_conversion_quality_depends_on_size() {
        let small = input("jpeg", "image/jpeg", 1000);
        assert_eq!(
            decide(&small).1,
            Decision::EncodeCanonical {
                quality: ORIGINAL_QUALITY
            }
        );

        let large = input("png", "image/png", 2 * COMPRESS_THRESHOLD);
        assert_eq!(
            decide(&large),
            (
                Rule::ConvertToCanonical,
                Decision::EncodeCanonical {
                    quality: REDUCED_QUALITY
                }
            )
        );
    }

    #[test]
    fn test_keep_original_when_webp_disabled() {
        let mut i = input("png", "image/png", 2 * COMPRESS_THRESHOLD);
        i.save_webp = false;
        i.original_image = true;
        assert_eq!(decide(&i), (Rule::KeepOriginal, Decision::PassThrough));
    }

    #[test]
    fn test_default_compress_fallback() {
        let mut i = input("png", "image/png", 10);
        i.save_webp = false;
        assert_eq!(
            decide(&i),
            (
                Rule::DefaultCompress,
                Decision::EncodeCanonical {
                    quality: REDUCED_QUALITY
                }
            )
        );
    }

    #[test]
    fn test_small_webp_output_is_byte_identical() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 32, Rgba([1, 2, 3, 255])));
        let bytes = codec::encode_webp(&img, 80).unwrap();
        let settings = Settings::default();

        let out = Transcoder::default()
            .transcode(&img, &bytes, "webp", "image/webp", bytes.len() as u64, &settings)
            .unwrap();
        assert_eq!(out.bytes, bytes);
        assert_eq!(out.mime, CANONICAL_MIME);
    }

    #[test]
    fn test_png_converts_to_webp() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(32, 32, Rgba([9, 9, 9, 255])));
        let bytes = codec::encode_png(&img).unwrap();
        let settings = Settings::default();

        let out = Transcoder::default()
            .transcode(&img, &bytes, "png", "image/png", bytes.len() as u64, &settings)
            .unwrap();
        assert_eq!(out.rule, Rule::ConvertToCanonical);
        assert_eq!(out.format, "webp");
        assert_eq!(codec::decode_config(&out.bytes).unwrap().2, image::ImageFormat::WebP);
    }
}
