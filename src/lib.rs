//! # Squish
//!
//! An adaptive image compression and quality verification engine. It
//! decodes raster and camera RAW inputs, re-encodes them with per-format
//! tunings, searches for a byte-size target on request, and scores the
//! fidelity of the result.
//!
//! # Architecture: One Request, One Pipeline
//!
//! Every call runs to completion on a shared worker pool, bounded by its own
//! deadline:
//!
//! ```text
//! classify → decode (RAW: decoder chain → lossless intermediate)
//!          → [resize] → [colour normalise] → encode → persist
//! ```
//!
//! The engine keeps no per-request state. What is shared (worker pool,
//! RAW backends, a small decode cache) is built once from an
//! [`EngineConfig`](config::EngineConfig) and read-only afterwards.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`format`] | Extension classifier: RAW vs standard, canonical format id |
//! | [`raw`] | Ordered RAW decoder chain with cheap capability probes |
//! | [`imaging`] | Encoder parameter builder, codecs, resize and colour transforms |
//! | [`deadline`] | Per-request deadline and the stage race |
//! | [`pipeline`] | `Engine::compress`, including the two-stage RAW path |
//! | [`solver`] | `Engine::compress_to_target_size` |
//! | [`metrics`] | `Engine::assess_quality`: PSNR, windowed SSIM, score and grade |
//! | [`analyze`] | `Engine::analyze`: header-only advice |
//! | [`engine`] | `Engine` construction from configuration |
//! | [`cache`] | Bounded RAW decode cache |
//! | [`config`] | `squish.toml` loading and validation |
//! | [`error`] | Error taxonomy |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## RAW Quality Band and Baseline
//!
//! RAW inputs are developed to a lossless intermediate first, then encoded
//! with the quality held inside `raw.min_quality..=raw.max_quality`
//! (75–95 by default) whatever the caller asked for. The reported
//! `baseline_size_bytes` is the size of that intermediate, not of the RAW
//! file, so savings for RAW inputs are large by construction. Callers that
//! show ratios must use [`CompressionResult::reference_size`].
//!
//! ## Deadlines Instead of Cancellation
//!
//! Codec calls cannot be interrupted. Each stage is raced against the
//! request deadline; on expiry the caller gets [`EngineError::Timeout`] at
//! once, the abandoned job finishes in the background, and its output is
//! discarded. Output is written to a temp file beside the destination and
//! renamed into place only on success, so a timed-out request never leaves
//! a file behind.
//!
//! ## Bounded Internal Parallelism
//!
//! One engine serves many concurrent requests. Encoders run single-threaded
//! by default (`codec.threads = 1`) and the pool size is capped, so load
//! spreads across requests rather than multiplying inside one.

pub mod analyze;
pub mod cache;
pub mod config;
pub mod deadline;
pub mod engine;
pub mod error;
pub mod format;
pub mod imaging;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod raw;
pub mod solver;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use analyze::ImageAnalysis;
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use format::{FormatId, OutputFormat, classify};
pub use metrics::{QualityGrade, QualityMetrics};
pub use pipeline::{CompressionRequest, CompressionResult, InputSource};
pub use raw::{RawDecodeMode, RawDecoder, RawFrame};
pub use solver::{QualityBounds, TargetSizeResult};
