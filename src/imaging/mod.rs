//! Image processing: pure Rust codecs plus two thin native bindings (libwebp, rav1e).
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image` crate, AVIF via `avif-parse` + `rav1d` |
//! | **Resize** | `image::imageops` filters, fit-inside, never upscale |
//! | **Colour normalise** | RGB8, alpha dropped, level stretch |
//! | **Encode** | `jpeg-encoder`, `png` + `color_quant`, `webp`, rav1e, `tiff` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Abstract knobs ([`EncodeSettings`]) and the per-format
//!   [`build_encoder_options`] that resolves them
//! - **Codec**: Format bindings for decode and encode
//! - **Transform**: Resize and colour normalisation between the two

mod avif_decode;
mod calculations;
pub mod codec;
pub mod encoder_params;
mod params;
pub mod transform;

pub use avif_decode::{AvifHeader, avif_header};
pub use calculations::{fit_within, megapixels};
pub use encoder_params::{EncoderOptions, build_encoder_options};
pub use params::{
    AlgorithmPreset, EncodeSettings, Quality, ResizeKernel, ResizeSpec, TiffCompression,
    TiffSettings,
};
