//! Shared test utilities: deterministic synthetic images and disk fixtures.
//!
//! Nothing here reads binary fixtures from the repository; every image is
//! generated in-process so tests stay hermetic.
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = tempfile::TempDir::new().unwrap();
//! let path = write_image(tmp.path(), "in.png", &noisy_image(64, 64));
//! ```

use image::{DynamicImage, Rgb, RgbImage};
use std::path::{Path, PathBuf};

/// Smooth RGB gradient. Compresses well.
pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            128,
        ])
    }))
}

/// Gradient with pseudo-random noise, so encoded size reacts to quality.
pub fn noisy_image(width: u32, height: u32) -> DynamicImage {
    let mut state: u32 = 0x2545_F491;
    let mut next = move || {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (state >> 24) as u8
    };
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        let base = ((x + y) * 255 / (width + height).max(1)) as u8;
        Rgb([
            base.wrapping_add(next() / 4),
            base.wrapping_add(next() / 4),
            (255 - base).wrapping_add(next() / 4),
        ])
    }))
}

/// Save `img` under `dir/name`, format chosen by extension.
pub fn write_image(dir: &Path, name: &str, img: &DynamicImage) -> PathBuf {
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}
