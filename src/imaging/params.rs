//! Abstract encode/transform knobs.
//!
//! These types describe *what* the caller wants, not *how* any codec does
//! it. [`encoder_params`](super::encoder_params) turns them into concrete
//! per-format options.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 80). Clamped on construction.
//! - [`AlgorithmPreset`]: Per-format tuning family (standard, aggressive, lossless, ...).
//! - [`ResizeKernel`] / [`ResizeSpec`]: Optional pre-encode resize.
//! - [`TiffSettings`]: TIFF-only container options.
//! - [`EncodeSettings`]: Everything the parameter builder needs besides the format.

use serde::{Deserialize, Serialize};

/// Quality setting for lossy image encoding (1-100).
///
/// The field is private so every value goes through [`Quality::new`];
/// deserialisation clamps the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u32")]
pub struct Quality(u8);

impl From<u32> for Quality {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Clamp into `[min, max]`.
    pub fn clamp_to(self, min: u8, max: u8) -> Self {
        Self::new(u32::from(self.0.clamp(min, max)))
    }

    /// Lower by `amount`, never below 1.
    pub fn reduced_by(self, amount: u8) -> Self {
        Self(self.0.saturating_sub(amount).max(1))
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// Tuning family applied on top of the requested quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmPreset {
    #[default]
    Standard,
    /// Trade fidelity for size.
    Aggressive,
    /// No generational loss.
    Lossless,
    /// mozjpeg-style higher-compression JPEG path.
    Mozjpeg,
    /// Force progressive, scan-optimised output.
    Progressive,
}

impl std::str::FromStr for AlgorithmPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "aggressive" => Ok(Self::Aggressive),
            "lossless" => Ok(Self::Lossless),
            "mozjpeg" => Ok(Self::Mozjpeg),
            "progressive" => Ok(Self::Progressive),
            other => Err(format!("unknown algorithm preset '{other}'")),
        }
    }
}

/// Resampling kernel for the optional resize step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeKernel {
    #[default]
    Lanczos,
    Bicubic,
    Bilinear,
    Nearest,
    /// Skip resizing even when a [`ResizeSpec`] is present.
    None,
}

impl std::str::FromStr for ResizeKernel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lanczos" => Ok(Self::Lanczos),
            "bicubic" => Ok(Self::Bicubic),
            "bilinear" => Ok(Self::Bilinear),
            "nearest" => Ok(Self::Nearest),
            "none" => Ok(Self::None),
            other => Err(format!("unknown resize kernel '{other}'")),
        }
    }
}

/// Target box for the resize step. A missing side scales proportionally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeSpec {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ResizeSpec {
    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none()
    }
}

/// TIFF compression schemes the encoder can write. All are lossless, so the
/// quality dial never applies to TIFF output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TiffCompression {
    None,
    Lzw,
    #[default]
    Deflate,
    PackBits,
}

/// TIFF container options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TiffSettings {
    pub compression: TiffCompression,
    /// Horizontal differencing; helps photographic content under LZW/Deflate.
    pub predictor: bool,
    pub tile: bool,
    pub pyramid: bool,
}

impl Default for TiffSettings {
    fn default() -> Self {
        Self {
            compression: TiffCompression::default(),
            predictor: true,
            tile: false,
            pyramid: false,
        }
    }
}

/// Everything the parameter builder needs besides the target format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeSettings {
    pub quality: Quality,
    pub preset: AlgorithmPreset,
    pub progressive: bool,
    pub tiff: TiffSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn deserialised_quality_is_clamped() {
        assert_eq!(serde_json::from_str::<Quality>("0").unwrap().value(), 1);
        assert_eq!(serde_json::from_str::<Quality>("250").unwrap().value(), 100);
        assert_eq!(serde_json::to_string(&Quality::new(42)).unwrap(), "42");
    }

    #[test]
    fn quality_default_is_80() {
        assert_eq!(Quality::default().value(), 80);
    }

    #[test]
    fn quality_reduced_by_never_hits_zero() {
        assert_eq!(Quality::new(80).reduced_by(10).value(), 70);
        assert_eq!(Quality::new(5).reduced_by(10).value(), 1);
    }

    #[test]
    fn quality_clamp_to_band() {
        assert_eq!(Quality::new(30).clamp_to(75, 95).value(), 75);
        assert_eq!(Quality::new(99).clamp_to(75, 95).value(), 95);
        assert_eq!(Quality::new(85).clamp_to(75, 95).value(), 85);
        assert_eq!(Quality::new(1).clamp_to(0, 0).value(), 1);
    }

    #[test]
    fn preset_parses_case_insensitively() {
        assert_eq!(
            "MozJPEG".parse::<AlgorithmPreset>().unwrap(),
            AlgorithmPreset::Mozjpeg
        );
        assert!("turbo".parse::<AlgorithmPreset>().is_err());
    }

    #[test]
    fn kernel_parses() {
        assert_eq!("bilinear".parse::<ResizeKernel>().unwrap(), ResizeKernel::Bilinear);
        assert_eq!("none".parse::<ResizeKernel>().unwrap(), ResizeKernel::None);
    }

    #[test]
    fn tiff_defaults_lossless_with_predictor() {
        let t = TiffSettings::default();
        assert_eq!(t.compression, TiffCompression::Deflate);
        assert!(t.predictor);
        assert!(!t.tile && !t.pyramid);
    }

    #[test]
    fn resize_spec_empty() {
        assert!(ResizeSpec::default().is_empty());
        assert!(
            !ResizeSpec {
                width: Some(100),
                height: None
            }
            .is_empty()
        );
    }
}
