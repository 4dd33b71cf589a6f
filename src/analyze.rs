//! Metadata-only advisor.
//!
//! Reads headers (never pixels, never encodes) and estimates what
//! compression would achieve. All numbers are heuristics:
//!
//! ```text
//! recommended q  = 70 (>2 MP) | 75 (>0.5 MP) | 80, +5 if opaque with ≥3 channels
//! bits per pixel = (0.3 + 3.0·(q/100)²) · channels/3
//! estimate       = min(pixels · bpp / 8, original size)
//! efficiency     = 1 − estimate/original → ≥0.7 excellent, ≥0.5 good, ≥0.3 fair
//! ```

use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::format::{FormatFamily, FormatId, classify};
use crate::imaging::{avif_header, codec, megapixels};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

const WEB_MAX: (u32, u32) = (1920, 1080);
const PROGRESSIVE_THRESHOLD_BYTES: u64 = 500 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    Srgb,
    Grey,
    Rgb16,
    Grey16,
    /// Floating-point linear RGB.
    ScRgb,
    /// Defined by an embedded ICC profile.
    Embedded,
}

impl ColorSpace {
    fn is_web_safe(self) -> bool {
        matches!(self, Self::Srgb | Self::Grey)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ColorSpaceInfo {
    pub has_alpha: bool,
    pub color_space: ColorSpace,
    pub channel_count: u8,
}

impl ColorSpaceInfo {
    fn from_color_type(color_type: image::ColorType, has_icc: bool) -> Self {
        use image::ColorType as C;
        let color_space = if has_icc {
            ColorSpace::Embedded
        } else {
            match color_type {
                C::L8 | C::La8 => ColorSpace::Grey,
                C::L16 | C::La16 => ColorSpace::Grey16,
                C::Rgb16 | C::Rgba16 => ColorSpace::Rgb16,
                C::Rgb32F | C::Rgba32F => ColorSpace::ScRgb,
                _ => ColorSpace::Srgb,
            }
        };
        Self {
            has_alpha: color_type.has_alpha(),
            color_space,
            channel_count: color_type.channel_count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Efficiency {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Efficiency {
    /// Bucket the fraction of bytes expected to be saved.
    pub fn from_savings(savings: f64) -> Self {
        if savings >= 0.7 {
            Self::Excellent
        } else if savings >= 0.5 {
            Self::Good
        } else if savings >= 0.3 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

impl std::fmt::Display for Efficiency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageAnalysis {
    pub original_size_bytes: u64,
    pub width: u32,
    pub height: u32,
    pub format: FormatId,
    pub estimated_compressed_size_bytes: u64,
    pub recommended_quality: u8,
    pub compression_efficiency: Efficiency,
    /// Advice in display order.
    pub suggestions: Vec<String>,
    pub color_space_info: ColorSpaceInfo,
}

pub fn recommended_quality(dims: (u32, u32), info: &ColorSpaceInfo) -> u8 {
    let mp = megapixels(dims);
    let base = if mp > 2.0 {
        70
    } else if mp > 0.5 {
        75
    } else {
        80
    };
    if !info.has_alpha && info.channel_count >= 3 {
        base + 5
    } else {
        base
    }
}

pub fn estimate_compressed_size(
    dims: (u32, u32),
    channels: u8,
    quality: u8,
    original_size: u64,
) -> u64 {
    let q = f64::from(quality) / 100.0;
    let bpp = (0.3 + 3.0 * q * q) * f64::from(channels) / 3.0;
    let pixels = f64::from(dims.0) * f64::from(dims.1);
    let estimate = (pixels * bpp / 8.0).round() as u64;
    estimate.min(original_size)
}

fn savings(estimate: u64, original: u64) -> f64 {
    if original == 0 {
        return 0.0;
    }
    1.0 - estimate as f64 / original as f64
}

fn suggestions(
    format: FormatId,
    dims: (u32, u32),
    original_size: u64,
    info: &ColorSpaceInfo,
) -> Vec<String> {
    let mut out = Vec::new();
    if format.family() == FormatFamily::Raw {
        out.push(format!(
            "Convert .{format} files to JPEG or PNG before uploading for faster, predictable results"
        ));
    }
    if dims.0 > WEB_MAX.0 || dims.1 > WEB_MAX.1 {
        out.push(format!(
            "Resize to fit {}x{} for web display",
            WEB_MAX.0, WEB_MAX.1
        ));
    }
    if original_size > PROGRESSIVE_THRESHOLD_BYTES {
        out.push("Enable progressive encoding so large images render incrementally".into());
    }
    if info.has_alpha {
        out.push("Image has transparency: use PNG or WebP to preserve it".into());
    }
    if !info.color_space.is_web_safe() {
        out.push("Convert to sRGB for consistent colour across browsers".into());
    }
    if matches!(format, FormatId::Jpeg | FormatId::Png) {
        out.push("Consider WebP or AVIF for smaller files at similar visual quality".into());
    }
    out
}

impl Engine {
    /// Inspect `path` and recommend settings. Reads headers only.
    pub fn analyze(&self, path: &Path) -> Result<ImageAnalysis> {
        let classification = classify(path)?;
        let format = classification.format;
        let original_size_bytes = std::fs::metadata(path)?.len();

        let (dims, info) = match format {
            FormatId::Svg => {
                return Err(EngineError::UnsupportedFormat(
                    ".svg is a vector format and has no raster metadata".into(),
                ));
            }
            FormatId::Raw(_) => {
                let ext = format.extension();
                let dims = self
                    .decoders
                    .dimensions(path, ext)
                    .map_err(|e| e.for_raw(ext))?;
                let info = ColorSpaceInfo {
                    has_alpha: false,
                    color_space: ColorSpace::Rgb16,
                    channel_count: 3,
                };
                (dims, info)
            }
            FormatId::Avif => {
                let header = avif_header(&std::fs::read(path)?)?;
                let info = ColorSpaceInfo {
                    has_alpha: header.has_alpha,
                    color_space: ColorSpace::Srgb,
                    channel_count: if header.has_alpha { 4 } else { 3 },
                };
                ((header.width, header.height), info)
            }
            FormatId::Jpeg | FormatId::Png | FormatId::Webp | FormatId::Tiff => {
                let header = codec::read_header(path, format)?;
                let info = ColorSpaceInfo::from_color_type(header.color_type, header.has_icc);
                ((header.width, header.height), info)
            }
        };

        let recommended_quality = recommended_quality(dims, &info);
        let estimate =
            estimate_compressed_size(dims, info.channel_count, recommended_quality, original_size_bytes);
        let analysis = ImageAnalysis {
            original_size_bytes,
            width: dims.0,
            height: dims.1,
            format,
            estimated_compressed_size_bytes: estimate,
            recommended_quality,
            compression_efficiency: Efficiency::from_savings(savings(estimate, original_size_bytes)),
            suggestions: suggestions(format, dims, original_size_bytes, &info),
            color_space_info: info,
        };
        debug!(
            file = %path.display(),
            quality = analysis.recommended_quality,
            estimate = analysis.estimated_compressed_size_bytes,
            efficiency = %analysis.compression_efficiency,
            "analyzed"
        );
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::raw::DecoderChain;
    use crate::raw::tests::{MockDecoder, RecordedCall, Shared};
    use crate::test_helpers::{gradient_image, noisy_image, write_image};
    use image::{DynamicImage, RgbaImage};
    use std::sync::Arc;
    use tempfile::TempDir;

    const OPAQUE_RGB: ColorSpaceInfo = ColorSpaceInfo {
        has_alpha: false,
        color_space: ColorSpace::Srgb,
        channel_count: 3,
    };

    fn engine_with(chain: DecoderChain) -> Engine {
        Engine::with_decoder_chain(EngineConfig::default(), chain).unwrap()
    }

    #[test]
    fn quality_scales_with_pixel_count() {
        let rgba = ColorSpaceInfo {
            has_alpha: true,
            channel_count: 4,
            ..OPAQUE_RGB
        };
        assert_eq!(recommended_quality((3000, 2000), &rgba), 70);
        assert_eq!(recommended_quality((1000, 800), &rgba), 75);
        assert_eq!(recommended_quality((500, 500), &rgba), 80);
        assert_eq!(recommended_quality((500, 500), &OPAQUE_RGB), 85);
    }

    #[test]
    fn grey_is_not_nudged() {
        let grey = ColorSpaceInfo {
            color_space: ColorSpace::Grey,
            channel_count: 1,
            ..OPAQUE_RGB
        };
        assert_eq!(recommended_quality((100, 100), &grey), 80);
    }

    #[test]
    fn estimate_is_capped_by_original() {
        // 1000x1000 RGB at q=80: bpp = 0.3 + 1.92 = 2.22 → 277_500 bytes
        assert_eq!(estimate_compressed_size((1000, 1000), 3, 80, 10_000_000), 277_500);
        assert_eq!(estimate_compressed_size((1000, 1000), 3, 80, 1_000), 1_000);
    }

    #[test]
    fn efficiency_buckets() {
        assert_eq!(Efficiency::from_savings(0.75), Efficiency::Excellent);
        assert_eq!(Efficiency::from_savings(0.5), Efficiency::Good);
        assert_eq!(Efficiency::from_savings(0.3), Efficiency::Fair);
        assert_eq!(Efficiency::from_savings(0.0), Efficiency::Poor);
        assert_eq!(savings(0, 0), 0.0);
    }

    #[test]
    fn suggestion_order() {
        let info = ColorSpaceInfo {
            has_alpha: true,
            color_space: ColorSpace::Rgb16,
            channel_count: 4,
        };
        let s = suggestions(FormatId::Png, (4000, 3000), 2_000_000, &info);
        assert_eq!(s.len(), 5);
        assert!(s[0].starts_with("Resize"));
        assert!(s[1].contains("progressive"));
        assert!(s[2].contains("transparency"));
        assert!(s[3].contains("sRGB"));
        assert!(s[4].contains("WebP or AVIF"));
    }

    #[test]
    fn small_webp_needs_no_advice() {
        assert!(suggestions(FormatId::Webp, (640, 480), 40_000, &OPAQUE_RGB).is_empty());
    }

    #[test]
    fn analyzes_png_headers() {
        let tmp = TempDir::new().unwrap();
        let path = write_image(tmp.path(), "a.png", &noisy_image(200, 100));
        let a = engine_with(DecoderChain::default()).analyze(&path).unwrap();
        assert_eq!((a.width, a.height), (200, 100));
        assert_eq!(a.format, FormatId::Png);
        assert_eq!(a.original_size_bytes, std::fs::metadata(&path).unwrap().len());
        assert_eq!(a.recommended_quality, 85);
        assert!(a.estimated_compressed_size_bytes <= a.original_size_bytes);
        assert_eq!(a.color_space_info, OPAQUE_RGB);
        assert!(a.suggestions.iter().any(|s| s.contains("WebP or AVIF")));
    }

    #[test]
    fn alpha_is_detected() {
        let tmp = TempDir::new().unwrap();
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, image::Rgba([1, 2, 3, 4])));
        let path = write_image(tmp.path(), "t.png", &rgba);
        let a = engine_with(DecoderChain::default()).analyze(&path).unwrap();
        assert!(a.color_space_info.has_alpha);
        assert_eq!(a.color_space_info.channel_count, 4);
        assert_eq!(a.recommended_quality, 80);
    }

    #[test]
    fn raw_uses_header_probe_and_recommends_conversion() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("shot.nef");
        std::fs::write(&path, b"sensor").unwrap();
        let mock = Arc::new(MockDecoder::working("mock"));
        let engine = engine_with(DecoderChain::new(vec![Box::new(Shared(Arc::clone(&mock)))]));

        let a = engine.analyze(&path).unwrap();
        assert_eq!((a.width, a.height), (64, 48));
        assert!(a.suggestions[0].contains(".nef"));
        assert!(
            !mock
                .get_calls()
                .iter()
                .any(|c| matches!(c, RecordedCall::Decode(..)))
        );
    }

    #[test]
    fn svg_is_unsupported() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logo.svg");
        std::fs::write(&path, b"<svg/>").unwrap();
        assert!(matches!(
            engine_with(DecoderChain::default()).analyze(&path),
            Err(EngineError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn avif_header_only() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("g.avif");
        let options = crate::imaging::build_encoder_options(
            crate::format::OutputFormat::Avif,
            &crate::imaging::EncodeSettings::default(),
        );
        std::fs::write(&path, codec::encode(&gradient_image(48, 32), &options, 1).unwrap()).unwrap();
        let a = engine_with(DecoderChain::default()).analyze(&path).unwrap();
        assert_eq!((a.width, a.height), (48, 32));
        assert!(!a.color_space_info.has_alpha);
    }
}
