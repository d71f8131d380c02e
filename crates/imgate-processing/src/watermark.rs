//! Text watermark rendering
//!
//! Font size adapts to the shorter image side, the anchor is computed from measured glyph
//! advances and the font's vertical metrics, and the result is clamped so text never paints
//! outside the canvas.

use crate::codec;
use crate::error::{ProcessingError, ProcessingResult};
use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::{imageops, DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use imgate_core::WatermarkSettings;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

const DEFAULT_TEXT: &str = "imgate";
const DEFAULT_FONT: &str = "jyhphy.ttf";
const DEFAULT_FONT_SIZE: u32 = 24;
const DEFAULT_RATIO: f64 = 0.02;
const DEFAULT_MIN_FONT_SIZE: u32 = 10;
const DEFAULT_MAX_FONT_SIZE: u32 = 50;
const DEFAULT_COLOR: &str = "FFFFFF";
const MAX_QUERY_FONT_SIZE: u32 = 100;
const MAX_RATIO: f64 = 0.1;
const LONG_TEXT_CHARS: usize = 10;
const RE_ENCODE_JPEG_QUALITY: u8 = 90;

const SYSTEM_FONT_PATHS: [&str; 4] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Helvetica.ttc",
    "C:/Windows/Fonts/simhei.ttf",
    "C:/Windows/Fonts/msyh.ttc",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

impl WatermarkPosition {
    pub const ALL: [WatermarkPosition; 5] = [
        WatermarkPosition::TopLeft,
        WatermarkPosition::TopRight,
        WatermarkPosition::BottomLeft,
        WatermarkPosition::BottomRight,
        WatermarkPosition::Center,
    ];
}

impl FromStr for WatermarkPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "top-left" => Ok(WatermarkPosition::TopLeft),
            "top-right" => Ok(WatermarkPosition::TopRight),
            "bottom-left" => Ok(WatermarkPosition::BottomLeft),
            "bottom-right" => Ok(WatermarkPosition::BottomRight),
            "center" => Ok(WatermarkPosition::Center),
            other => Err(format!("invalid watermark position: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatermarkConfig {
    pub enabled: bool,
    pub text: String,
    pub position: WatermarkPosition,
    /// Used as-is when dynamic sizing is off.
    pub font_size: u32,
    /// Share of the shorter image side.
    pub font_size_ratio: f64,
    pub min_font_size: u32,
    pub max_font_size: u32,
    /// `RRGGBB`, no leading `#`.
    pub color: String,
    pub opacity: f64,
    pub font_path: String,
    pub dynamic_size: bool,
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            text: DEFAULT_TEXT.to_string(),
            position: WatermarkPosition::BottomRight,
            font_size: DEFAULT_FONT_SIZE,
            font_size_ratio: DEFAULT_RATIO,
            min_font_size: DEFAULT_MIN_FONT_SIZE,
            max_font_size: DEFAULT_MAX_FONT_SIZE,
            color: DEFAULT_COLOR.to_string(),
            opacity: 1.0,
            font_path: DEFAULT_FONT.to_string(),
            dynamic_size: true,
        }
    }
}

impl WatermarkConfig {
    /// Write-path watermark derived from the stored settings.
    pub fn from_settings(settings: &WatermarkSettings) -> Self {
        let ratio = if settings.size > 0 {
            (settings.size as f64 / 100.0).min(MAX_RATIO)
        } else {
            DEFAULT_RATIO
        };

        Self {
            enabled: true,
            text: settings.text.clone(),
            position: settings.position.parse().unwrap_or_default(),
            font_size_ratio: ratio,
            color: normalize_color(&settings.color),
            opacity: settings.opacity.clamp(0.0, 1.0),
            ..Default::default()
        }
    }

    /// Read-path overrides from query parameters. Invalid values keep the default.
    pub fn from_query<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut cfg = Self::default();
        let params: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.as_ref().to_string()))
            .collect();
        let get = |name: &str| {
            params
                .iter()
                .find(|(k, v)| k == name && !v.is_empty())
                .map(|(_, v)| v.as_str())
        };

        if !matches!(get("watermark"), Some("true") | Some("1")) {
            return cfg;
        }
        cfg.enabled = true;

        if let Some(text) = get("wm_text") {
            cfg.text = text.to_string();
        }
        if let Some(position) = get("wm_pos").and_then(|p| p.parse().ok()) {
            cfg.position = position;
        }
        if let Some(size) = get("wm_size").and_then(|s| s.parse::<u32>().ok()) {
            if (1..=MAX_QUERY_FONT_SIZE).contains(&size) {
                cfg.font_size = size;
            }
        }
        if matches!(get("wm_dynamic"), Some("false") | Some("0")) {
            cfg.dynamic_size = false;
        }
        if let Some(ratio) = get("wm_ratio").and_then(|r| r.parse::<f64>().ok()) {
            if ratio > 0.0 && ratio <= MAX_RATIO {
                cfg.font_size_ratio = ratio;
            }
        }
        if let Some(min) = get("wm_min_size").and_then(|s| s.parse::<u32>().ok()) {
            if min > 0 {
                cfg.min_font_size = min;
            }
        }
        if let Some(max) = get("wm_max_size").and_then(|s| s.parse::<u32>().ok()) {
            if max > cfg.min_font_size {
                cfg.max_font_size = max.min(MAX_QUERY_FONT_SIZE);
            }
        }
        if let Some(color) = get("wm_color") {
            cfg.color = normalize_color(color);
        }
        if let Some(opacity) = get("wm_opacity").and_then(|o| o.parse::<f64>().ok()) {
            if (0.0..=1.0).contains(&opacity) {
                cfg.opacity = opacity;
            }
        }
        // Only a bare file name; directories come from the font loader.
        if let Some(font) = get("wm_font")
            .and_then(|f| Path::new(f).file_name())
            .and_then(|f| f.to_str())
        {
            cfg.font_path = font.to_string();
        }

        cfg
    }

    /// Font size in pixels for an image of `width` x `height`.
    pub fn resolve_font_size(&self, width: u32, height: u32) -> u32 {
        if !self.dynamic_size {
            return self.font_size;
        }
        if width == 0 || height == 0 {
            return self.min_font_size;
        }

        let min = self.min_font_size as f64;
        let max = self.max_font_size as f64;
        let min_side = width.min(height) as f64;
        let mut size = (min_side * self.font_size_ratio).max(min).min(max);

        let text_len = self.text.chars().count();
        if text_len > LONG_TEXT_CHARS {
            let scale = (LONG_TEXT_CHARS as f64 / text_len as f64).max(0.5);
            size = (size * scale).max(min);
        }

        size.round() as u32
    }

    /// Fill colour with the configured opacity applied to alpha.
    pub fn rgba(&self) -> Rgba<u8> {
        let hex = if is_hex_color(&self.color) {
            self.color.as_str()
        } else {
            DEFAULT_COLOR
        };
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(u8::MAX);
        let alpha = (self.opacity.clamp(0.0, 1.0) * 255.0) as u8;
        Rgba([channel(0), channel(2), channel(4), alpha])
    }
}

fn is_hex_color(color: &str) -> bool {
    color.len() == 6 && color.bytes().all(|b| b.is_ascii_hexdigit())
}

/// `RRGGBB` without the leading `#`; anything else becomes [`DEFAULT_COLOR`].
pub fn normalize_color(raw: &str) -> String {
    let color = raw.trim().trim_start_matches('#');
    if is_hex_color(color) {
        color.to_string()
    } else {
        DEFAULT_COLOR.to_string()
    }
}

/// Edge margin: 1.5% of the width, between 8 and 20 px.
pub fn margin_for(width: u32) -> i32 {
    (width as f64 * 0.015).clamp(8.0, 20.0) as i32
}

/// Baseline anchor `(x, y)` for text of `text_width` x `text_height`.
///
/// Always `0 <= x <= width`; `text_height <= y <= height` whenever the text fits vertically.
pub fn anchor(
    width: u32,
    height: u32,
    text_width: u32,
    text_height: u32,
    position: WatermarkPosition,
) -> (i32, i32) {
    let (w, h) = (width as i32, height as i32);
    let (tw, th) = (text_width as i32, text_height as i32);
    let m = margin_for(width);

    let (x, y) = match position {
        WatermarkPosition::TopLeft => (m, th + m),
        WatermarkPosition::TopRight => (w - tw - m, th + m),
        WatermarkPosition::BottomLeft => (m, h - m),
        WatermarkPosition::BottomRight => (w - tw - m, h - m),
        WatermarkPosition::Center => ((w - tw) / 2, (h + th / 2) / 2),
    };

    let x = x.clamp(0, (w - tw - m).max(0));
    let y = y.clamp(th, (h - m).max(th));
    (x, y)
}

/// Resolves a font by name: embedded bundle, then search directories, then OS defaults.
#[derive(Debug, Clone)]
pub struct FontLoader {
    embedded: Vec<(String, Arc<Vec<u8>>)>,
    search_dirs: Vec<PathBuf>,
    system_fallback: bool,
}

impl Default for FontLoader {
    fn default() -> Self {
        Self::new(None)
    }
}

impl FontLoader {
    /// `font_dir` is searched before the built-in relative directories.
    pub fn new(font_dir: Option<PathBuf>) -> Self {
        let mut search_dirs: Vec<PathBuf> = font_dir.into_iter().collect();
        search_dirs.push(PathBuf::from("assets").join("fonts"));
        search_dirs.push(PathBuf::from("."));
        Self {
            embedded: Vec::new(),
            search_dirs,
            system_fallback: true,
        }
    }

    pub fn with_embedded(mut self, name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.embedded.push((name.into(), Arc::new(bytes)));
        self
    }

    pub fn without_system_fonts(mut self) -> Self {
        self.system_fallback = false;
        self
    }

    pub fn load(&self, name: &str) -> ProcessingResult<FontVec> {
        let bytes = self.load_bytes(name)?;
        FontVec::try_from_vec(bytes).map_err(|e| ProcessingError::FontLoad {
            font: name.to_string(),
            reason: e.to_string(),
        })
    }

    fn load_bytes(&self, name: &str) -> ProcessingResult<Vec<u8>> {
        if let Some((_, bytes)) = self.embedded.iter().find(|(n, _)| n == name) {
            return Ok(bytes.as_ref().clone());
        }

        let mut candidates = vec![PathBuf::from(name)];
        candidates.extend(self.search_dirs.iter().map(|dir| dir.join(name)));
        if self.system_fallback {
            candidates.extend(SYSTEM_FONT_PATHS.iter().map(PathBuf::from));
        }

        for path in &candidates {
            if !path.is_file() {
                continue;
            }
            match std::fs::read(path) {
                Ok(bytes) => {
                    tracing::debug!(font = %name, path = %path.display(), "Loaded watermark font");
                    return Ok(bytes);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read font file");
                }
            }
        }

        Err(ProcessingError::FontLoad {
            font: name.to_string(),
            reason: "no candidate path could be read".to_string(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct WatermarkRenderer {
    fonts: FontLoader,
}

impl WatermarkRenderer {
    pub fn new(fonts: FontLoader) -> Self {
        Self { fonts }
    }

    /// Stamp `cfg.text` onto a copy of `img`.
    pub fn render(&self, img: &DynamicImage, cfg: &WatermarkConfig) -> ProcessingResult<DynamicImage> {
        if !cfg.enabled || cfg.text.is_empty() {
            return Ok(img.clone());
        }

        let font = self.fonts.load(&cfg.font_path)?;
        let (width, height) = img.dimensions();
        let font_size = cfg.resolve_font_size(width, height);
        if font_size == 0 {
            return Err(ProcessingError::Render("resolved font size is zero".to_string()));
        }

        let scale = PxScale::from(font_size as f32);
        let scaled = font.as_scaled(scale);
        let text_width: f32 = cfg
            .text
            .chars()
            .map(|c| scaled.h_advance(scaled.glyph_id(c)))
            .sum();
        let text_height = scaled.ascent() - scaled.descent();

        let (x, baseline) = anchor(
            width,
            height,
            text_width.ceil() as u32,
            text_height.ceil() as u32,
            cfg.position,
        );
        let top = baseline - scaled.ascent().round() as i32;

        let color = cfg.rgba();
        let mut layer = RgbaImage::from_pixel(width, height, Rgba([color[0], color[1], color[2], 0]));
        imageproc::drawing::draw_text_mut(
            &mut layer,
            Rgba([color[0], color[1], color[2], 255]),
            x,
            top,
            scale,
            &font,
            &cfg.text,
        );

        let opacity = color[3] as f32 / 255.0;
        if opacity < 1.0 {
            for pixel in layer.pixels_mut() {
                pixel[3] = (pixel[3] as f32 * opacity) as u8;
            }
        }

        let mut canvas = img.to_rgba8();
        imageops::overlay(&mut canvas, &layer, 0, 0);

        tracing::debug!(
            width = width,
            height = height,
            font_size = font_size,
            x = x,
            y = baseline,
            "Rendered text watermark"
        );

        Ok(DynamicImage::ImageRgba8(canvas))
    }

    /// Decode, stamp and re-encode in the source container. Unknown containers become JPEG.
    pub fn apply_to_bytes(&self, bytes: &[u8], cfg: &WatermarkConfig) -> ProcessingResult<Vec<u8>> {
        if !cfg.enabled {
            return Ok(bytes.to_vec());
        }

        let (img, format) = codec::decode(bytes)?;
        let stamped = self.render(&img, cfg)?;

        match format {
            ImageFormat::Png => codec::encode_png(&stamped),
            _ => codec::encode_jpeg(&stamped, RE_ENCODE_JPEG_QUALITY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system_font() -> Option<FontLoader> {
        let path = Path::new(SYSTEM_FONT_PATHS[0]);
        let bytes = std::fs::read(path).ok()?;
        Some(
            FontLoader::new(None)
                .without_system_fonts()
                .with_embedded(DEFAULT_FONT, bytes),
        )
    }

    #[test]
    fn test_dynamic_font_size_clamps_to_ratio() {
        let cfg = WatermarkConfig {
            text: "short".to_string(),
            ..Default::default()
        };
        assert_eq!(cfg.resolve_font_size(2000, 2000), 40);
        assert_eq!(cfg.resolve_font_size(100, 100), 10);
        assert_eq!(cfg.resolve_font_size(8000, 5000), 50);
    }

    #[test]
    fn test_long_text_scales_down() {
        let cfg = WatermarkConfig {
            text: "x".repeat(21),
            ..Default::default()
        };
        let limit = 40.0 * (10.0f64 / 21.0).max(0.5);
        assert!(cfg.resolve_font_size(2000, 2000) as f64 <= limit.round());
    }

    #[test]
    fn test_fixed_size_when_dynamic_disabled() {
        let cfg = WatermarkConfig {
            dynamic_size: false,
            font_size: 33,
            ..Default::default()
        };
        assert_eq!(cfg.resolve_font_size(4000, 4000), 33);
    }

    #[test]
    fn test_anchor_stays_inside_canvas() {
        for (width, height) in [(200u32, 200u32), (640, 360), (1920, 1080), (300, 1200)] {
            for len in [0u32, 1, 10, 50, 200] {
                let text_width = len * 14;
                let text_height = 29;
                for position in WatermarkPosition::ALL {
                    let (x, y) = anchor(width, height, text_width, text_height, position);
                    assert!(x >= 0 && x <= width as i32, "{:?} x={}", position, x);
                    assert!(
                        y >= text_height as i32 && y <= height as i32,
                        "{:?} y={}",
                        position,
                        y
                    );
                }
            }
        }
    }

    #[test]
    fn test_margin_bounds() {
        assert_eq!(margin_for(100), 8);
        assert_eq!(margin_for(1000), 15);
        assert_eq!(margin_for(4000), 20);
    }

    #[test]
    fn test_from_settings_maps_size_to_ratio() {
        let settings = WatermarkSettings {
            enable: true,
            text: "hello".to_string(),
            position: "top-left".to_string(),
            size: 30,
            color: "#112233".to_string(),
            opacity: 3.0,
        };
        let cfg = WatermarkConfig::from_settings(&settings);
        assert!(cfg.enabled);
        assert_eq!(cfg.position, WatermarkPosition::TopLeft);
        assert_eq!(cfg.font_size_ratio, 0.1);
        assert_eq!(cfg.color, "112233");
        assert_eq!(cfg.opacity, 1.0);
    }

    #[test]
    fn test_from_query_overrides() {
        let cfg = WatermarkConfig::from_query([
            ("watermark", "1"),
            ("wm_text", "mine"),
            ("wm_pos", "center"),
            ("wm_ratio", "0.5"),
            ("wm_min_size", "12"),
            ("wm_max_size", "400"),
            ("wm_color", "#abc"),
            ("wm_opacity", "0.25"),
            ("wm_font", "../../etc/custom.ttf"),
        ]);
        assert!(cfg.enabled);
        assert_eq!(cfg.text, "mine");
        assert_eq!(cfg.position, WatermarkPosition::Center);
        assert_eq!(cfg.font_size_ratio, DEFAULT_RATIO);
        assert_eq!(cfg.min_font_size, 12);
        assert_eq!(cfg.max_font_size, 100);
        assert_eq!(cfg.color, "FFFFFF");
        assert_eq!(cfg.opacity, 0.25);
        assert_eq!(cfg.font_path, "custom.ttf");
    }

    #[test]
    fn test_from_query_disabled_without_flag() {
        let cfg = WatermarkConfig::from_query([("wm_text", "ignored")]);
        assert!(!cfg.enabled);
        assert_eq!(cfg.text, DEFAULT_TEXT);
    }

    #[test]
    fn test_rgba_applies_opacity() {
        let cfg = WatermarkConfig {
            color: "FF8000".to_string(),
            opacity: 0.5,
            ..Default::default()
        };
        assert_eq!(cfg.rgba(), Rgba([255, 128, 0, 127]));
    }

    #[test]
    fn test_non_ascii_color_falls_back_to_white() {
        // Six bytes, four chars.
        let cfg = WatermarkConfig::from_query([("watermark", "1"), ("wm_color", "aééa")]);
        assert_eq!(cfg.color, DEFAULT_COLOR);
        assert_eq!(cfg.rgba(), Rgba([255, 255, 255, 255]));

        let direct = WatermarkConfig {
            color: "aééa".to_string(),
            ..Default::default()
        };
        assert_eq!(direct.rgba(), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_non_hex_color_falls_back_to_white() {
        let cfg = WatermarkConfig::from_query([("watermark", "1"), ("wm_color", "zzzzzz")]);
        assert_eq!(cfg.color, DEFAULT_COLOR);

        let settings = WatermarkSettings {
            color: "#zz0000".to_string(),
            ..Default::default()
        };
        assert_eq!(WatermarkConfig::from_settings(&settings).color, DEFAULT_COLOR);
        assert_eq!(normalize_color(" #a1B2c3 "), "a1B2c3");
    }

    #[test]
    fn test_missing_font_is_fatal_to_render() {
        let renderer = WatermarkRenderer::new(FontLoader::new(None).without_system_fonts());
        let img = DynamicImage::ImageRgba8(RgbaImage::new(50, 50));
        let cfg = WatermarkConfig {
            enabled: true,
            font_path: "does-not-exist.ttf".to_string(),
            ..Default::default()
        };
        let err = renderer.render(&img, &cfg).unwrap_err();
        assert!(matches!(err, ProcessingError::FontLoad { .. }));
    }

    #[test]
    fn test_render_does_not_mutate_input() {
        let Some(fonts) = system_font() else {
            return;
        };
        let renderer = WatermarkRenderer::new(fonts);
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            400,
            300,
            Rgba([255, 255, 255, 255]),
        ));
        let cfg = WatermarkConfig {
            enabled: true,
            color: "000000".to_string(),
            ..Default::default()
        };

        let stamped = renderer.render(&img, &cfg).unwrap();
        assert_eq!(stamped.dimensions(), (400, 300));
        assert!(img.to_rgba8().pixels().all(|p| p.0 == [255, 255, 255, 255]));
        assert!(stamped.to_rgba8().pixels().any(|p| p.0 != [255, 255, 255, 255]));
    }
}
