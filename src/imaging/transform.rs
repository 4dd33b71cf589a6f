//! Pixel transforms applied between decode and encode.
//!
//! | Step | Implementation |
//! |---|---|
//! | Resize | [`fit_within`](super::calculations::fit_within) + `DynamicImage::resize_exact` |
//! | Colour normalise | RGB8 conversion, alpha dropped, per-channel level stretch |
//!
//! Orientation is handled at decode time (see [`codec::decode_bytes`](super::codec::decode_bytes)).

use super::calculations::fit_within;
use super::params::{ResizeKernel, ResizeSpec};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbImage};

/// Share of pixels clipped at each end of a channel histogram before the
/// level stretch.
const LEVEL_CLIP: f64 = 0.01;

/// Resampling filter for a kernel; `None` for [`ResizeKernel::None`].
///
/// `image` has no Mitchell filter; `Triangle` is the closest soft
/// interpolating blend it offers, so `bilinear` maps there.
pub fn filter_for(kernel: ResizeKernel) -> Option<FilterType> {
    match kernel {
        ResizeKernel::Lanczos => Some(FilterType::Lanczos3),
        ResizeKernel::Bicubic => Some(FilterType::CatmullRom),
        ResizeKernel::Bilinear => Some(FilterType::Triangle),
        ResizeKernel::Nearest => Some(FilterType::Nearest),
        ResizeKernel::None => None,
    }
}

/// Shrink `img` to fit `spec`. Returns the input untouched when no resize
/// applies (empty spec, `none` kernel or already small enough).
pub fn resize(img: DynamicImage, spec: ResizeSpec, kernel: ResizeKernel) -> DynamicImage {
    let Some(filter) = filter_for(kernel) else {
        return img;
    };
    match fit_within(img.dimensions(), spec) {
        Some((w, h)) => img.resize_exact(w, h, filter),
        None => img,
    }
}

/// Convert to 8-bit RGB, drop alpha, and stretch each channel's levels so
/// the 1st/99th percentiles land on 0/255.
///
/// Channels that are already flat are left alone.
pub fn normalize_color(img: &DynamicImage) -> DynamicImage {
    let mut rgb: RgbImage = img.to_rgb8();
    let total = u64::from(rgb.width()) * u64::from(rgb.height());
    if total == 0 {
        return DynamicImage::ImageRgb8(rgb);
    }

    let mut histograms = [[0u64; 256]; 3];
    for px in rgb.pixels() {
        for (c, hist) in histograms.iter_mut().enumerate() {
            hist[px[c] as usize] += 1;
        }
    }

    let clip = (total as f64 * LEVEL_CLIP) as u64;
    let luts: Vec<Option<[u8; 256]>> = histograms
        .iter()
        .map(|hist| {
            let (low, high) = percentile_bounds(hist, clip);
            (high > low).then(|| stretch_lut(low, high))
        })
        .collect();

    for px in rgb.pixels_mut() {
        for (c, lut) in luts.iter().enumerate() {
            if let Some(lut) = lut {
                px[c] = lut[px[c] as usize];
            }
        }
    }
    DynamicImage::ImageRgb8(rgb)
}

/// Lowest and highest levels after discarding `clip` samples at each end.
fn percentile_bounds(hist: &[u64; 256], clip: u64) -> (u8, u8) {
    let mut seen = 0;
    let mut low = 0u8;
    for (level, &count) in hist.iter().enumerate() {
        seen += count;
        if seen > clip {
            low = level as u8;
            break;
        }
    }
    seen = 0;
    let mut high = 255u8;
    for (level, &count) in hist.iter().enumerate().rev() {
        seen += count;
        if seen > clip {
            high = level as u8;
            break;
        }
    }
    (low, high)
}

fn stretch_lut(low: u8, high: u8) -> [u8; 256] {
    let span = f32::from(high - low);
    let mut lut = [0u8; 256];
    for (level, out) in lut.iter_mut().enumerate() {
        let v = (level as f32 - f32::from(low)) * 255.0 / span;
        *out = v.round().clamp(0.0, 255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, Rgba, RgbaImage};

    fn solid(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([10, 20, 30])))
    }

    #[test]
    fn resize_fits_box() {
        let out = resize(solid(400, 200), ResizeSpec { width: Some(100), height: None }, ResizeKernel::Lanczos);
        assert_eq!(out.dimensions(), (100, 50));
    }

    #[test]
    fn resize_never_upscales() {
        let out = resize(solid(40, 20), ResizeSpec { width: Some(100), height: None }, ResizeKernel::Bicubic);
        assert_eq!(out.dimensions(), (40, 20));
    }

    #[test]
    fn none_kernel_skips_resize() {
        let out = resize(solid(400, 200), ResizeSpec { width: Some(100), height: None }, ResizeKernel::None);
        assert_eq!(out.dimensions(), (400, 200));
    }

    #[test]
    fn every_kernel_but_none_has_a_filter() {
        for kernel in [
            ResizeKernel::Lanczos,
            ResizeKernel::Bicubic,
            ResizeKernel::Bilinear,
            ResizeKernel::Nearest,
        ] {
            assert!(filter_for(kernel).is_some(), "{kernel:?}");
        }
        assert_eq!(filter_for(ResizeKernel::Nearest), Some(FilterType::Nearest));
    }

    #[test]
    fn normalize_drops_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 4])));
        let out = normalize_color(&img);
        assert!(!out.color().has_alpha());
        assert_eq!(out.color(), image::ColorType::Rgb8);
    }

    #[test]
    fn normalize_stretches_narrow_range() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(100, 1, |x, _| {
            let v = 100 + (x as u8 % 51);
            Rgb([v, v, v])
        }));
        let out = normalize_color(&img).to_rgb8();
        let min = out.pixels().map(|p| p[0]).min().unwrap();
        let max = out.pixels().map(|p| p[0]).max().unwrap();
        assert!(min <= 5, "min {min}");
        assert!(max >= 250, "max {max}");
    }

    #[test]
    fn normalize_leaves_flat_channels() {
        let out = normalize_color(&solid(8, 8)).to_rgb8();
        assert_eq!(out.get_pixel(3, 3), &Rgb([10, 20, 30]));
    }
}
