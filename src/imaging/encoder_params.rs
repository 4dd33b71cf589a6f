//! Encoder parameter builder.
//!
//! [`build_encoder_options`] is the single place where an abstract
//! `(format, quality, preset)` request becomes concrete encoder knobs. It is
//! pure; the codec layer consumes its output without further branching on
//! presets.
//!
//! | Format | standard | aggressive | lossless |
//! |---|---|---|---|
//! | JPEG | q, caller's progressive flag | q−10, optimised scans | q=100, baseline |
//! | WebP | q, effort 4 | q−5, effort 6 | lossless codec |
//! | AVIF | q, effort 3 | q−5, effort 2 | lossless, effort 0 |
//! | PNG | 256-colour palette | 64-colour palette | truecolour, fast deflate |
//! | TIFF | caller's [`TiffSettings`] | same | same |
//!
//! `mozjpeg` and `progressive` presets only change JPEG; other formats treat
//! them as `standard`.

use super::params::{AlgorithmPreset, EncodeSettings, Quality, TiffCompression};
use crate::format::OutputFormat;
use serde::Serialize;

const JPEG_AGGRESSIVE_DROP: u8 = 10;
const WEBP_AGGRESSIVE_DROP: u8 = 5;
const AVIF_AGGRESSIVE_DROP: u8 = 5;

const WEBP_EFFORT: u8 = 4;
const WEBP_AGGRESSIVE_EFFORT: u8 = 6;

/// AVIF effort on a 0 (fastest) to 9 (slowest) scale. Kept low for latency.
const AVIF_EFFORT: u8 = 3;
const AVIF_AGGRESSIVE_EFFORT: u8 = 2;
const AVIF_LOSSLESS_EFFORT: u8 = 0;

const PNG_COLORS: u16 = 256;
const PNG_AGGRESSIVE_COLORS: u16 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum EncoderOptions {
    Jpeg(JpegOptions),
    Webp(WebpOptions),
    Avif(AvifOptions),
    Png(PngOptions),
    Tiff(TiffOptions),
}

impl EncoderOptions {
    pub fn format(&self) -> OutputFormat {
        match self {
            Self::Jpeg(_) => OutputFormat::Jpeg,
            Self::Webp(_) => OutputFormat::Webp,
            Self::Avif(_) => OutputFormat::Avif,
            Self::Png(_) => OutputFormat::Png,
            Self::Tiff(_) => OutputFormat::Tiff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JpegOptions {
    pub quality: u8,
    pub progressive: bool,
    /// Optimised Huffman tables.
    pub optimize_scans: bool,
    /// mozjpeg-style quantisation tables and 4:2:0 chroma.
    pub mozjpeg: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WebpOptions {
    /// Ignored when `lossless` is set.
    pub quality: u8,
    pub lossless: bool,
    /// libwebp `method`, 0-6.
    pub effort: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AvifOptions {
    /// Ignored when `lossless` is set.
    pub quality: u8,
    /// 0 (fastest) to 9 (slowest).
    pub effort: u8,
    pub lossless: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PngEffort {
    Fast,
    Default,
    Best,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PngOptions {
    /// Palette size; `None` keeps truecolour.
    pub palette_colors: Option<u16>,
    pub dither: bool,
    pub effort: PngEffort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TiffOptions {
    pub compression: TiffCompression,
    pub predictor: bool,
    pub tile: bool,
    pub pyramid: bool,
}

/// Translate an abstract request into concrete encoder options.
pub fn build_encoder_options(format: OutputFormat, settings: &EncodeSettings) -> EncoderOptions {
    let quality = settings.quality;
    let preset = settings.preset;

    match format {
        OutputFormat::Jpeg => EncoderOptions::Jpeg(jpeg_options(quality, preset, settings.progressive)),
        OutputFormat::Webp => EncoderOptions::Webp(match preset {
            AlgorithmPreset::Aggressive => WebpOptions {
                quality: quality.reduced_by(WEBP_AGGRESSIVE_DROP).value(),
                lossless: false,
                effort: WEBP_AGGRESSIVE_EFFORT,
            },
            AlgorithmPreset::Lossless => WebpOptions {
                quality: 100,
                lossless: true,
                effort: WEBP_EFFORT,
            },
            _ => WebpOptions {
                quality: quality.value(),
                lossless: false,
                effort: WEBP_EFFORT,
            },
        }),
        OutputFormat::Avif => EncoderOptions::Avif(match preset {
            AlgorithmPreset::Aggressive => AvifOptions {
                quality: quality.reduced_by(AVIF_AGGRESSIVE_DROP).value(),
                effort: AVIF_AGGRESSIVE_EFFORT,
                lossless: false,
            },
            AlgorithmPreset::Lossless => AvifOptions {
                quality: 100,
                effort: AVIF_LOSSLESS_EFFORT,
                lossless: true,
            },
            _ => AvifOptions {
                quality: quality.value(),
                effort: AVIF_EFFORT,
                lossless: false,
            },
        }),
        OutputFormat::Png => EncoderOptions::Png(match preset {
            AlgorithmPreset::Aggressive => PngOptions {
                palette_colors: Some(PNG_AGGRESSIVE_COLORS),
                dither: true,
                effort: PngEffort::Best,
            },
            // PNG is already lossless; spend as little time as possible.
            AlgorithmPreset::Lossless => PngOptions {
                palette_colors: None,
                dither: false,
                effort: PngEffort::Fast,
            },
            _ => PngOptions {
                palette_colors: Some(PNG_COLORS),
                dither: true,
                effort: PngEffort::Default,
            },
        }),
        OutputFormat::Tiff => EncoderOptions::Tiff(TiffOptions {
            compression: settings.tiff.compression,
            predictor: settings.tiff.predictor
                && settings.tiff.compression != TiffCompression::None,
            tile: settings.tiff.tile,
            pyramid: settings.tiff.pyramid,
        }),
    }
}

fn jpeg_options(quality: Quality, preset: AlgorithmPreset, progressive: bool) -> JpegOptions {
    let base = JpegOptions {
        quality: quality.value(),
        progressive,
        optimize_scans: false,
        mozjpeg: false,
    };
    match preset {
        AlgorithmPreset::Standard => base,
        AlgorithmPreset::Aggressive => JpegOptions {
            quality: quality.reduced_by(JPEG_AGGRESSIVE_DROP).value(),
            optimize_scans: true,
            ..base
        },
        AlgorithmPreset::Lossless => JpegOptions {
            quality: 100,
            progressive: false,
            ..base
        },
        AlgorithmPreset::Mozjpeg => JpegOptions {
            optimize_scans: true,
            mozjpeg: true,
            ..base
        },
        AlgorithmPreset::Progressive => JpegOptions {
            progressive: true,
            optimize_scans: true,
            ..base
        },
    }
}
