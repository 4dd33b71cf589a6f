//! AVIF decoding without C dependencies.
//!
//! The `image` crate's `avif` feature only compiles the rav1e *encoder*;
//! decoding through it needs the `avif-native` feature and the dav1d C
//! library. We parse the container with `avif-parse` and hand the primary
//! item's AV1 payload to `rav1d` (the Rust port of dav1d) instead.
//!
//! An auxiliary alpha item is decoded the same way; its luma plane becomes
//! the alpha channel of an RGBA8 result. Premultiplied colour is divided
//! back out so downstream encoders see straight alpha.

use crate::error::{EngineError, Result};
use image::{DynamicImage, RgbImage, RgbaImage};

const BACKEND: &str = "avif";

/// Header facts read from the container without decoding pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvifHeader {
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
}

pub fn avif_header(bytes: &[u8]) -> Result<AvifHeader> {
    let avif = avif_parse::read_avif(&mut std::io::Cursor::new(bytes))
        .map_err(|e| EngineError::conversion(BACKEND, format!("invalid AVIF container: {e:?}")))?;
    let meta = avif
        .primary_item_metadata()
        .map_err(|e| EngineError::conversion(BACKEND, format!("unreadable AV1 header: {e:?}")))?;
    Ok(AvifHeader {
        width: meta.max_frame_width.get(),
        height: meta.max_frame_height.get(),
        has_alpha: avif.alpha_item.is_some(),
    })
}

/// Decode an AVIF file to RGB8, or RGBA8 when it carries an alpha item.
pub fn decode_avif(bytes: &[u8]) -> Result<DynamicImage> {
    let avif = avif_parse::read_avif(&mut std::io::Cursor::new(bytes))
        .map_err(|e| EngineError::conversion(BACKEND, format!("invalid AVIF container: {e:?}")))?;
    let color = decode_av1_frame(&avif.primary_item, Planes::to_rgb8)?;

    let Some(alpha_item) = &avif.alpha_item else {
        return RgbImage::from_raw(color.width, color.height, color.samples)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| EngineError::conversion(BACKEND, "decoded frame has the wrong size"));
    };

    let alpha = decode_av1_frame(alpha_item, Planes::to_luma8)?;
    if (alpha.width, alpha.height) != (color.width, color.height) {
        return Err(EngineError::conversion(
            BACKEND,
            format!(
                "alpha plane is {}x{} but the image is {}x{}",
                alpha.width, alpha.height, color.width, color.height
            ),
        ));
    }
    let rgba = merge_alpha(&color.samples, &alpha.samples, avif.premultiplied_alpha);
    RgbaImage::from_raw(color.width, color.height, rgba)
        .map(DynamicImage::ImageRgba8)
        .ok_or_else(|| EngineError::conversion(BACKEND, "decoded frame has the wrong size"))
}

/// Interleave RGB8 with an alpha plane, un-premultiplying when needed.
fn merge_alpha(rgb: &[u8], alpha: &[u8], premultiplied: bool) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(alpha.len() * 4);
    for (px, &a) in rgb.chunks_exact(3).zip(alpha) {
        for &c in px {
            let c = if premultiplied && a > 0 && a < 255 {
                ((u32::from(c) * 255 + u32::from(a) / 2) / u32::from(a)).min(255) as u8
            } else {
                c
            };
            rgba.push(c);
        }
        rgba.push(a);
    }
    rgba
}

struct Frame {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

/// Decode one AV1 item and convert its planes with `convert`.
fn decode_av1_frame(av1: &[u8], convert: unsafe fn(&Planes) -> Vec<u8>) -> Result<Frame> {
    use rav1d::include::dav1d::data::Dav1dData;
    use rav1d::include::dav1d::dav1d::Dav1dSettings;
    use rav1d::include::dav1d::headers::{
        DAV1D_PIXEL_LAYOUT_I400, DAV1D_PIXEL_LAYOUT_I420, DAV1D_PIXEL_LAYOUT_I422,
        DAV1D_PIXEL_LAYOUT_I444,
    };
    use rav1d::include::dav1d::picture::Dav1dPicture;
    use rav1d::src::lib as dav1d;
    use std::ptr::NonNull;

    let fail = |what: &str, code: i32| EngineError::conversion(BACKEND, format!("{what} ({code})"));

    let mut settings = std::mem::MaybeUninit::<Dav1dSettings>::uninit();
    let settings_ptr = NonNull::new(settings.as_mut_ptr())
        .ok_or_else(|| EngineError::conversion(BACKEND, "settings allocation failed"))?;
    // SAFETY: dav1d_default_settings fully initialises the pointee.
    let mut settings = unsafe {
        dav1d::dav1d_default_settings(settings_ptr);
        settings.assume_init()
    };
    // Single-threaded: parallelism is managed by the engine's worker pool.
    settings.n_threads = 1;
    settings.max_frame_delay = 1;

    let mut ctx = None;
    let rc = unsafe { dav1d::dav1d_open(NonNull::new(&mut ctx), NonNull::new(&mut settings)) };
    if rc.0 != 0 {
        return Err(fail("decoder init failed", rc.0));
    }

    let mut data = Dav1dData::default();
    let buf = unsafe { dav1d::dav1d_data_create(NonNull::new(&mut data), av1.len()) };
    if buf.is_null() {
        unsafe { dav1d::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(EngineError::conversion(BACKEND, "input buffer allocation failed"));
    }
    // SAFETY: dav1d_data_create returned a writable buffer of av1.len() bytes.
    unsafe { std::ptr::copy_nonoverlapping(av1.as_ptr(), buf, av1.len()) };

    let rc = unsafe { dav1d::dav1d_send_data(ctx, NonNull::new(&mut data)) };
    if rc.0 != 0 {
        unsafe {
            dav1d::dav1d_data_unref(NonNull::new(&mut data));
            dav1d::dav1d_close(NonNull::new(&mut ctx));
        }
        return Err(fail("AV1 payload rejected", rc.0));
    }

    // SAFETY: an all-zero Dav1dPicture is the documented "empty" state.
    let mut pic: Dav1dPicture = unsafe { std::mem::zeroed() };
    let rc = unsafe { dav1d::dav1d_get_picture(ctx, NonNull::new(&mut pic)) };
    if rc.0 != 0 {
        unsafe { dav1d::dav1d_close(NonNull::new(&mut ctx)) };
        return Err(fail("no frame decoded", rc.0));
    }

    let layout = pic.p.layout;
    let subsampling = if layout == DAV1D_PIXEL_LAYOUT_I400 {
        Some(None)
    } else if layout == DAV1D_PIXEL_LAYOUT_I420 {
        Some(Some((true, true)))
    } else if layout == DAV1D_PIXEL_LAYOUT_I422 {
        Some(Some((true, false)))
    } else if layout == DAV1D_PIXEL_LAYOUT_I444 {
        Some(Some((false, false)))
    } else {
        None
    };

    let frame = match (subsampling, pic.data[0]) {
        (Some(chroma), Some(luma)) => {
            let y = luma.as_ptr() as *const u8;
            let (u, v, ss) = match (chroma, pic.data[1], pic.data[2]) {
                (Some(ss), Some(u), Some(v)) => {
                    (u.as_ptr() as *const u8, v.as_ptr() as *const u8, Some(ss))
                }
                _ => (y, y, None),
            };
            let planes = Planes {
                y,
                u,
                v,
                y_stride: pic.stride[0],
                uv_stride: pic.stride[1],
                width: pic.p.w as u32,
                height: pic.p.h as u32,
                bit_depth: pic.p.bpc as u32,
                subsampling: ss,
            };
            // SAFETY: plane pointers and strides come straight from the
            // decoded picture, which stays referenced until the unref below.
            Ok(Frame {
                width: planes.width,
                height: planes.height,
                samples: unsafe { convert(&planes) },
            })
        }
        (None, _) => Err(EngineError::conversion(
            BACKEND,
            format!("unsupported pixel layout {layout}"),
        )),
        (_, None) => Err(EngineError::conversion(BACKEND, "frame has no luma plane")),
    };

    unsafe {
        dav1d::dav1d_picture_unref(NonNull::new(&mut pic));
        dav1d::dav1d_close(NonNull::new(&mut ctx));
    }
    frame
}

/// Borrowed view of decoded YUV planes.
struct Planes {
    y: *const u8,
    u: *const u8,
    v: *const u8,
    y_stride: isize,
    uv_stride: isize,
    width: u32,
    height: u32,
    bit_depth: u32,
    /// Horizontal/vertical chroma subsampling; `None` for monochrome.
    subsampling: Option<(bool, bool)>,
}

impl Planes {
    /// BT.601 YCbCr → interleaved RGB8.
    unsafe fn to_rgb8(&self) -> Vec<u8> {
        let scale = 255.0 / ((1u32 << self.bit_depth) - 1) as f32;
        let center = (1u32 << (self.bit_depth - 1)) as f32;
        let mut rgb = Vec::with_capacity((self.width * self.height * 3) as usize);

        for row in 0..self.height {
            for col in 0..self.width {
                let luma = unsafe { sample(self.y, self.y_stride, col, row, self.bit_depth) };
                let (r, g, b) = match self.subsampling {
                    None => (luma, luma, luma),
                    Some((ss_x, ss_y)) => {
                        let cx = if ss_x { col / 2 } else { col };
                        let cy = if ss_y { row / 2 } else { row };
                        let cb =
                            unsafe { sample(self.u, self.uv_stride, cx, cy, self.bit_depth) } - center;
                        let cr =
                            unsafe { sample(self.v, self.uv_stride, cx, cy, self.bit_depth) } - center;
                        (
                            luma + 1.402 * cr,
                            luma - 0.344136 * cb - 0.714136 * cr,
                            luma + 1.772 * cb,
                        )
                    }
                };
                rgb.push((r * scale).clamp(0.0, 255.0) as u8);
                rgb.push((g * scale).clamp(0.0, 255.0) as u8);
                rgb.push((b * scale).clamp(0.0, 255.0) as u8);
            }
        }
        rgb
    }

    /// Luma plane scaled to 8 bits, as used for alpha items.
    unsafe fn to_luma8(&self) -> Vec<u8> {
        let scale = 255.0 / ((1u32 << self.bit_depth) - 1) as f32;
        let mut luma = Vec::with_capacity((self.width * self.height) as usize);
        for row in 0..self.height {
            for col in 0..self.width {
                let y = unsafe { sample(self.y, self.y_stride, col, row, self.bit_depth) };
                luma.push((y * scale).round().clamp(0.0, 255.0) as u8);
            }
        }
        luma
    }
}

/// Read one sample; high bit depths are stored as native-endian u16.
#[inline]
unsafe fn sample(plane: *const u8, stride: isize, x: u32, y: u32, bit_depth: u32) -> f32 {
    if bit_depth <= 8 {
        (unsafe { *plane.offset(y as isize * stride + x as isize) }) as f32
    } else {
        let offset = y as isize * stride + x as isize * 2;
        (unsafe { (plane.offset(offset) as *const u16).read_unaligned() }) as f32
    }
}
