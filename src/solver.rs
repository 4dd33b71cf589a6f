//! Target-size solver.
//!
//! Finds a quality whose output lands within `solver.tolerance` of a byte
//! target. The input is decoded and transformed once; only the encode is
//! repeated. Each probe is written to its own temp file next to the
//! destination, and the closest one is renamed into place at the end.
//!
//! The step is a damped proportional update rather than a bisection, since
//! output size is neither monotonic nor smooth in quality for every image:
//!
//! ```text
//! q' = clamp(round(q · √(target / size)), min, max)
//! ```
//!
//! Probing stops early when the update no longer changes the quality (the
//! loop is pinned at a bound).

use crate::config::SolverConfig;
use crate::deadline::Stage;
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::imaging::Quality;
use crate::pipeline::{
    CompressionRequest, CompressionResult, next_request_id, persist_output, stage_output,
};
use image::GenericImageView;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Inclusive quality bounds for the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QualityBounds {
    pub min: u8,
    pub max: u8,
}

impl QualityBounds {
    pub fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    pub fn from_config(config: &SolverConfig) -> Self {
        Self::new(config.min_quality, config.max_quality)
    }

    pub fn clamp(&self, quality: u32) -> u8 {
        quality.clamp(u32::from(self.min), u32::from(self.max)) as u8
    }

    fn validate(&self) -> Result<()> {
        if self.min == 0 || self.max > 100 || self.min > self.max {
            return Err(EngineError::invalid_request(format!(
                "quality bounds {}..={} must satisfy 1 <= min <= max <= 100",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetSizeResult {
    #[serde(flatten)]
    pub result: CompressionResult,
    /// Encodes performed.
    pub iterations: u32,
    /// Whether the final size is within tolerance. When false the result is
    /// the closest size seen within the bounds.
    pub achieved: bool,
}

/// One quality update step.
pub fn next_quality(current: u8, size: u64, target: u64, bounds: QualityBounds) -> u8 {
    let ratio = (target as f64 / size.max(1) as f64).sqrt();
    let proposed = (f64::from(current) * ratio).round().max(0.0) as u32;
    bounds.clamp(proposed)
}

/// Relative distance of `size` from `target`.
pub fn relative_error(size: u64, target: u64) -> f64 {
    (size as f64 - target as f64).abs() / target as f64
}

struct Probe {
    quality: u8,
    size: u64,
    error: f64,
    file: NamedTempFile,
}

impl Engine {
    /// Compress `request` so the output is close to `target_bytes`.
    ///
    /// `request.settings.quality` is ignored; the solver picks it. For RAW
    /// inputs the bounds replace the RAW quality band, so the reported
    /// quality always lies within `bounds`.
    ///
    /// When `solver.max_iterations` runs out before any probe lands within
    /// `solver.tolerance`, the file written is the probe whose size was
    /// closest to `target_bytes`, not the last one encoded, and
    /// [`TargetSizeResult::achieved`] is `false`.
    pub fn compress_to_target_size(
        &self,
        request: &CompressionRequest,
        target_bytes: u64,
        bounds: QualityBounds,
    ) -> Result<TargetSizeResult> {
        if target_bytes == 0 {
            return Err(EngineError::invalid_request(
                "target size must be greater than zero",
            ));
        }
        bounds.validate()?;

        let id = next_request_id();
        let deadline = self.deadline_for(request);
        let solver = &self.config.solver;
        let prepared = self.prepare(id, request, &deadline)?;

        let mut quality = bounds.clamp(u32::from(solver.initial_quality));
        let mut best: Option<Probe> = None;
        let mut iterations = 0;
        let mut achieved = false;

        while iterations < solver.max_iterations {
            iterations += 1;
            let probe_quality = Quality::new(u32::from(quality));
            let bytes = self.encode_prepared(&prepared, request, probe_quality, &deadline)?;
            let size = bytes.len() as u64;
            let error = relative_error(size, target_bytes);
            debug!(id, iteration = iterations, quality, size, target = target_bytes, "solver probe");

            if best.as_ref().is_none_or(|b| error < b.error) {
                deadline.check(Stage::Encode)?;
                best = Some(Probe {
                    quality,
                    size,
                    error,
                    file: stage_output(&request.output, &bytes)?,
                });
            }
            if error < solver.tolerance {
                achieved = true;
                break;
            }
            let next = next_quality(quality, size, target_bytes, bounds);
            if next == quality {
                break;
            }
            quality = next;
        }

        let Some(best) = best else {
            return Err(EngineError::invalid_request(
                "solver ran no iterations",
            ));
        };
        deadline.check(Stage::Encode)?;
        let final_size_bytes = persist_output(best.file, &request.output)?;
        debug_assert_eq!(final_size_bytes, best.size);

        let (width, height) = prepared.image.dimensions();
        let result = TargetSizeResult {
            result: CompressionResult {
                output: request.output.clone(),
                format: request.target_format,
                final_size_bytes,
                quality_used: best.quality,
                baseline_size_bytes: prepared.baseline_size_bytes,
                width,
                height,
                elapsed_ms: deadline.elapsed().as_millis() as u64,
            },
            iterations,
            achieved,
        };
        info!(
            id,
            file = %request.source_filename,
            target = target_bytes,
            bytes = final_size_bytes,
            quality = best.quality,
            iterations,
            achieved,
            "target-size compression finished"
        );
        Ok(result)
    }
}
