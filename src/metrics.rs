//! Quality assessment: PSNR, windowed SSIM and a blended score.
//!
//! | Metric | Definition |
//! |---|---|
//! | PSNR | RGB only (alpha ignored), `20·log10(255/√MSE)`, capped at 100 dB; identical images report 100 |
//! | SSIM | Greyscale, non-overlapping windows of `min(8, √(pixels/100))` px, mean over windows, clamped to 0–1 |
//! | Score | `0.6·clamp((PSNR−20)/30·100) + 0.4·SSIM·100`, rounded |
//! | Grade | ≥85 excellent, ≥70 good, ≥50 fair, else poor |
//!
//! [`Engine::assess_quality`] surfaces every failure as
//! [`EngineError::Metrics`], except deadline expiry which stays a
//! [`EngineError::Timeout`]. Compression callers use
//! [`Engine::assess_quality_best_effort`], which never fails: it logs and
//! returns [`QualityMetrics::zeroed`].

use crate::deadline::{Deadline, Stage, race};
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::format::{FormatFamily, classify};
use crate::imaging::codec;
use crate::raw::RawDecodeMode;
use image::{DynamicImage, GenericImageView, GrayImage, RgbImage};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

const MAX_PSNR: f64 = 100.0;
const C1: f64 = (0.01 * 255.0) * (0.01 * 255.0);
const C2: f64 = (0.03 * 255.0) * (0.03 * 255.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityGrade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl std::fmt::Display for QualityGrade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityMetrics {
    /// Decibels, 0–100.
    pub psnr: f64,
    /// 0–1.
    pub ssim: f64,
    pub quality_score: u8,
    pub quality_grade: QualityGrade,
}

impl QualityMetrics {
    /// The result reported when assessment could not run.
    pub fn zeroed() -> Self {
        Self {
            psnr: 0.0,
            ssim: 0.0,
            quality_score: 0,
            quality_grade: QualityGrade::Poor,
        }
    }

    pub fn ssim_percent(&self) -> f64 {
        self.ssim * 100.0
    }
}

fn ensure_same_size(a: (u32, u32), b: (u32, u32)) -> Result<()> {
    if a != b {
        return Err(EngineError::metrics(format!(
            "dimension mismatch: original is {}x{}, compressed is {}x{}",
            a.0, a.1, b.0, b.1
        )));
    }
    if a.0 == 0 || a.1 == 0 {
        return Err(EngineError::metrics("images are empty"));
    }
    Ok(())
}

/// PSNR over the RGB channels.
pub fn psnr(original: &RgbImage, compressed: &RgbImage) -> Result<f64> {
    ensure_same_size(original.dimensions(), compressed.dimensions())?;
    let sum: f64 = original
        .as_raw()
        .iter()
        .zip(compressed.as_raw())
        .map(|(&a, &b)| {
            let d = f64::from(a) - f64::from(b);
            d * d
        })
        .sum();
    let mse = sum / original.as_raw().len() as f64;
    if mse == 0.0 {
        return Ok(MAX_PSNR);
    }
    Ok((20.0 * (255.0 / mse.sqrt()).log10()).min(MAX_PSNR))
}

/// Side of the square SSIM window for an image of `pixels` pixels.
pub fn ssim_window(pixels: u64) -> u32 {
    let side = ((pixels as f64 / 100.0).sqrt()).floor() as u32;
    side.clamp(1, 8)
}

/// Mean SSIM over non-overlapping windows. Edge windows are truncated.
pub fn ssim(original: &GrayImage, compressed: &GrayImage) -> Result<f64> {
    ensure_same_size(original.dimensions(), compressed.dimensions())?;
    let (w, h) = original.dimensions();
    let win = ssim_window(u64::from(w) * u64::from(h));

    let mut total = 0.0;
    let mut windows = 0u64;
    for y0 in (0..h).step_by(win as usize) {
        for x0 in (0..w).step_by(win as usize) {
            let x1 = (x0 + win).min(w);
            let y1 = (y0 + win).min(h);
            total += window_ssim(original, compressed, x0..x1, y0..y1);
            windows += 1;
        }
    }
    Ok((total / windows as f64).clamp(0.0, 1.0))
}

fn window_ssim(a: &GrayImage, b: &GrayImage, xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) -> f64 {
    let n = f64::from((xs.end - xs.start) * (ys.end - ys.start));
    let (mut sum_a, mut sum_b) = (0.0, 0.0);
    for y in ys.clone() {
        for x in xs.clone() {
            sum_a += f64::from(a.get_pixel(x, y)[0]);
            sum_b += f64::from(b.get_pixel(x, y)[0]);
        }
    }
    let (mu_a, mu_b) = (sum_a / n, sum_b / n);

    let (mut var_a, mut var_b, mut cov) = (0.0, 0.0, 0.0);
    for y in ys {
        for x in xs.clone() {
            let da = f64::from(a.get_pixel(x, y)[0]) - mu_a;
            let db = f64::from(b.get_pixel(x, y)[0]) - mu_b;
            var_a += da * da;
            var_b += db * db;
            cov += da * db;
        }
    }
    let (var_a, var_b, cov) = (var_a / n, var_b / n, cov / n);

    ((2.0 * mu_a * mu_b + C1) * (2.0 * cov + C2))
        / ((mu_a * mu_a + mu_b * mu_b + C1) * (var_a + var_b + C2))
}

/// Blend PSNR and SSIM into a 0–100 score.
pub fn score(psnr: f64, ssim: f64) -> u8 {
    let psnr_norm = ((psnr - 20.0) / 30.0 * 100.0).clamp(0.0, 100.0);
    let blended = 0.6 * psnr_norm + 0.4 * ssim.clamp(0.0, 1.0) * 100.0;
    blended.round().clamp(0.0, 100.0) as u8
}

pub fn grade(score: u8) -> QualityGrade {
    match score {
        85.. => QualityGrade::Excellent,
        70..=84 => QualityGrade::Good,
        50..=69 => QualityGrade::Fair,
        _ => QualityGrade::Poor,
    }
}

/// Compare two decoded images.
pub fn compare(original: &DynamicImage, compressed: &DynamicImage) -> Result<QualityMetrics> {
    ensure_same_size(original.dimensions(), compressed.dimensions())?;
    let psnr = psnr(&original.to_rgb8(), &compressed.to_rgb8())?;
    let ssim = ssim(&original.to_luma8(), &compressed.to_luma8())?;
    let quality_score = score(psnr, ssim);
    Ok(QualityMetrics {
        psnr,
        ssim,
        quality_score,
        quality_grade: grade(quality_score),
    })
}

/// Fold a decode failure into [`EngineError::Metrics`], naming the side
/// that failed. Timeouts and metrics errors pass through.
fn as_metrics_error(err: EngineError, side: &str, path: &Path) -> EngineError {
    match err {
        EngineError::Timeout { .. } | EngineError::Metrics(_) => err,
        other => EngineError::metrics(format!(
            "cannot read {side} image {}: {other}",
            path.display()
        )),
    }
}

impl Engine {
    /// Score `compressed` against `original`. Fails on dimension mismatch,
    /// undecodable inputs, or when `limits.metrics_timeout_ms` runs out.
    pub fn assess_quality(&self, original: &Path, compressed: &Path) -> Result<QualityMetrics> {
        let deadline = Deadline::after(self.config.limits.metrics_timeout());
        let a = self
            .decode_for_metrics(original, &deadline)
            .map_err(|e| as_metrics_error(e, "original", original))?;
        let b = self
            .decode_for_metrics(compressed, &deadline)
            .map_err(|e| as_metrics_error(e, "compressed", compressed))?;
        race(&self.pool, &deadline, Stage::Metrics, move || compare(&a, &b))
    }

    /// [`assess_quality`](Self::assess_quality) that never fails.
    pub fn assess_quality_best_effort(&self, original: &Path, compressed: &Path) -> QualityMetrics {
        self.assess_quality(original, compressed)
            .unwrap_or_else(|err| {
                warn!(
                    original = %original.display(),
                    compressed = %compressed.display(),
                    error = %err,
                    "quality assessment skipped"
                );
                QualityMetrics::zeroed()
            })
    }

    fn decode_for_metrics(&self, path: &Path, deadline: &Deadline) -> Result<Arc<DynamicImage>> {
        let classification = classify(path)?;
        if classification.family == FormatFamily::Raw {
            let input = crate::pipeline::InputSource::Path(path.to_path_buf());
            let ext = classification.format.extension();
            return self
                .decode_raw(&input, ext, RawDecodeMode::Display8, deadline)
                .map(|developed| developed.image)
                .map_err(|e| e.for_raw(ext));
        }
        let format = classification.format;
        let path = path.to_path_buf();
        race(&self.pool, deadline, Stage::Decode, move || {
            codec::decode_path(&path, format, false).map(Arc::new)
        })
    }
}
