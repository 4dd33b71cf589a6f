//! CLI output formatting for every engine operation.
//!
//! # Result-First Display
//!
//! The header line of each block names the file and the headline number
//! (bytes written, score, recommended quality). Supporting facts follow as
//! indented `Key: value` lines, so a terminal full of results reads as a
//! table of contents.
//!
//! # Output Format
//!
//! ## Compress
//!
//! ```text
//! photo.webp 182.4 KB (q80, 1920x1280)
//!     Source: 2.1 MB, saved 91.3%
//!     Time: 412ms
//! ```
//!
//! RAW inputs report savings against the lossless intermediate:
//!
//! ```text
//! shot.jpg 3.2 MB (q75, 6000x4000)
//!     Baseline: 68.7 MB intermediate, saved 95.3%
//! ```
//!
//! ## Target
//!
//! ```text
//! photo.jpg 49.1 KB (q62, 1200x800)
//!     Target: 48.8 KB, reached in 3 iterations
//! ```
//!
//! ## Assess
//!
//! ```text
//! Quality 91 (excellent)
//!     PSNR: 44.12 dB
//!     SSIM: 98.7%
//! ```
//!
//! ## Analyze
//!
//! ```text
//! photo.png 4032x3024 png
//!     Size: 9.8 MB, estimated 1.6 MB (excellent)
//!     Recommended quality: 75
//!     Colour: srgb, 3 channels
//!     - Resize to fit 1920x1080 for web display
//! ```
//!
//! # Architecture
//!
//! Each operation has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::analyze::ImageAnalysis;
use crate::metrics::QualityMetrics;
use crate::pipeline::CompressionResult;
use crate::solver::TargetSizeResult;
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Human-readable byte count with binary units.
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Header line shared by compress and target output.
///
/// ```text
/// photo.webp 182.4 KB (q80, 1920x1280)
/// ```
fn result_header(result: &CompressionResult) -> String {
    format!(
        "{} {} (q{}, {}x{})",
        file_name(&result.output),
        format_bytes(result.final_size_bytes),
        result.quality_used,
        result.width,
        result.height
    )
}

/// Savings line. The baseline replaces the source size when present.
fn savings_line(result: &CompressionResult, original_size: Option<u64>) -> Option<String> {
    match (result.baseline_size_bytes, original_size) {
        (Some(baseline), original) => Some(format!(
            "{}Baseline: {} intermediate, saved {:.1}%",
            indent(1),
            format_bytes(baseline),
            result.savings_percent(original.unwrap_or(baseline))
        )),
        (None, Some(original)) => Some(format!(
            "{}Source: {}, saved {:.1}%",
            indent(1),
            format_bytes(original),
            result.savings_percent(original)
        )),
        (None, None) => None,
    }
}

// ============================================================================
// Compress
// ============================================================================

pub fn format_compress_output(result: &CompressionResult, original_size: Option<u64>) -> Vec<String> {
    let mut lines = vec![result_header(result)];
    lines.extend(savings_line(result, original_size));
    lines.push(format!("{}Time: {}ms", indent(1), result.elapsed_ms));
    lines
}

pub fn print_compress_output(result: &CompressionResult, original_size: Option<u64>) {
    for line in format_compress_output(result, original_size) {
        println!("{}", line);
    }
}

// ============================================================================
// Target
// ============================================================================

pub fn format_target_output(
    result: &TargetSizeResult,
    target_bytes: u64,
    original_size: Option<u64>,
) -> Vec<String> {
    let mut lines = vec![result_header(&result.result)];
    let plural = if result.iterations == 1 { "" } else { "s" };
    let outcome = if result.achieved {
        format!("reached in {} iteration{plural}", result.iterations)
    } else {
        format!("closest after {} iteration{plural}", result.iterations)
    };
    lines.push(format!(
        "{}Target: {}, {}",
        indent(1),
        format_bytes(target_bytes),
        outcome
    ));
    lines.extend(savings_line(&result.result, original_size));
    lines.push(format!("{}Time: {}ms", indent(1), result.result.elapsed_ms));
    lines
}

pub fn print_target_output(result: &TargetSizeResult, target_bytes: u64, original_size: Option<u64>) {
    for line in format_target_output(result, target_bytes, original_size) {
        println!("{}", line);
    }
}

// ============================================================================
// Assess
// ============================================================================

pub fn format_assess_output(metrics: &QualityMetrics) -> Vec<String> {
    vec![
        format!("Quality {} ({})", metrics.quality_score, metrics.quality_grade),
        format!("{}PSNR: {:.2} dB", indent(1), metrics.psnr),
        format!("{}SSIM: {:.1}%", indent(1), metrics.ssim_percent()),
    ]
}

pub fn print_assess_output(metrics: &QualityMetrics) {
    for line in format_assess_output(metrics) {
        println!("{}", line);
    }
}

// ============================================================================
// Analyze
// ============================================================================

pub fn format_analyze_output(path: &Path, analysis: &ImageAnalysis) -> Vec<String> {
    let info = &analysis.color_space_info;
    let colour = serde_json::to_value(info.color_space)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let mut lines = vec![
        format!(
            "{} {}x{} {}",
            file_name(path),
            analysis.width,
            analysis.height,
            analysis.format
        ),
        format!(
            "{}Size: {}, estimated {} ({})",
            indent(1),
            format_bytes(analysis.original_size_bytes),
            format_bytes(analysis.estimated_compressed_size_bytes),
            analysis.compression_efficiency
        ),
        format!(
            "{}Recommended quality: {}",
            indent(1),
            analysis.recommended_quality
        ),
        format!(
            "{}Colour: {}, {} channels{}",
            indent(1),
            colour,
            info.channel_count,
            if info.has_alpha { ", alpha" } else { "" }
        ),
    ];
    for suggestion in &analysis.suggestions {
        lines.push(format!("{}- {}", indent(1), suggestion));
    }
    lines
}

pub fn print_analyze_output(path: &Path, analysis: &ImageAnalysis) {
    for line in format_analyze_output(path, analysis) {
        println!("{}", line);
    }
}
