//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::ResizeSpec;

/// Calculate the output dimensions for a resize request.
///
/// Fits the source inside the requested box while preserving aspect ratio.
/// A missing side scales proportionally. Never enlarges: if the source
/// already fits, returns `None` (no resize needed).
///
/// # Examples
/// ```
/// # use squish::imaging::{ResizeSpec, fit_within};
/// let spec = ResizeSpec { width: Some(800), height: None };
/// assert_eq!(fit_within((1600, 1200), spec), Some((800, 600)));
///
/// // Already small enough
/// assert_eq!(fit_within((400, 300), spec), None);
/// ```
pub fn fit_within(source: (u32, u32), spec: ResizeSpec) -> Option<(u32, u32)> {
    let (src_w, src_h) = source;
    if src_w == 0 || src_h == 0 {
        return None;
    }

    let scale_w = spec.width.map(|w| w as f64 / src_w as f64);
    let scale_h = spec.height.map(|h| h as f64 / src_h as f64);
    let scale = match (scale_w, scale_h) {
        (Some(w), Some(h)) => w.min(h),
        (Some(w), None) => w,
        (None, Some(h)) => h,
        (None, None) => return None,
    };

    if scale >= 1.0 {
        return None;
    }

    let w = ((src_w as f64 * scale).round() as u32).max(1);
    let h = ((src_h as f64 * scale).round() as u32).max(1);
    Some((w, h))
}

/// Megapixels of an image, used by the analyzer heuristics.
pub fn megapixels(dims: (u32, u32)) -> f64 {
    dims.0 as f64 * dims.1 as f64 / 1_000_000.0
}
