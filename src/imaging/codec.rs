//! Concrete codec bindings.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP) | `image` crate (pure Rust decoders) |
//! | Decode (AVIF) | [`avif_decode`](super::avif_decode) (`avif-parse` + `rav1d`) |
//! | Encode → JPEG | `jpeg-encoder` (progressive, optimised Huffman, alternate quant tables) |
//! | Encode → WebP | `webp` (libwebp, lossy and lossless) |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e) |
//! | Encode → PNG | `color_quant` palette + `png` writer |
//! | Encode → TIFF | `tiff` (LZW / Deflate / PackBits, horizontal predictor) |
//!
//! Every encoder returns the encoded bytes; writing to disk is the
//! pipeline's job so a failed or abandoned encode never leaves a file behind.

use super::avif_decode::decode_avif;
use super::encoder_params::{
    AvifOptions, EncoderOptions, JpegOptions, PngEffort, PngOptions, TiffOptions, WebpOptions,
};
use super::params::TiffCompression;
use crate::error::{EngineError, Result};
use crate::format::FormatId;
use image::{DynamicImage, GenericImageView, ImageDecoder, ImageFormat, ImageReader};
use std::io::{Cursor, Seek, Write};
use std::path::Path;

/// Decode a standard raster from memory.
///
/// `hint` is used when the content sniffing cannot identify the format.
/// With `auto_orient`, EXIF orientation is applied so the result is upright.
pub fn decode_bytes(bytes: &[u8], hint: FormatId, auto_orient: bool) -> Result<DynamicImage> {
    if hint == FormatId::Avif || is_avif(bytes) {
        return decode_avif(bytes);
    }

    let mut reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    if reader.format().is_none() {
        if let Some(format) = image_format(hint) {
            reader.set_format(format);
        }
    }
    let format_name = reader
        .format()
        .map(|f| format!("{f:?}").to_lowercase())
        .unwrap_or_else(|| hint.to_string());
    let decode_err = |e: image::ImageError| EngineError::conversion(format_name.clone(), e.to_string());

    let mut decoder = reader.into_decoder().map_err(decode_err)?;
    let orientation = if auto_orient {
        decoder.orientation().ok()
    } else {
        None
    };
    let mut img = DynamicImage::from_decoder(decoder).map_err(decode_err)?;
    if let Some(orientation) = orientation {
        img.apply_orientation(orientation);
    }
    Ok(img)
}

/// Decode a standard raster file from disk.
pub fn decode_path(path: &Path, hint: FormatId, auto_orient: bool) -> Result<DynamicImage> {
    let bytes = std::fs::read(path)?;
    decode_bytes(&bytes, hint, auto_orient)
}

/// Facts available from a raster header without decoding pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterHeader {
    pub width: u32,
    pub height: u32,
    pub color_type: image::ColorType,
    /// An ICC profile is embedded.
    pub has_icc: bool,
}

/// Read dimensions and pixel layout of a non-AVIF raster file.
pub fn read_header(path: &Path, hint: FormatId) -> Result<RasterHeader> {
    let mut reader = ImageReader::open(path)?.with_guessed_format()?;
    if reader.format().is_none() {
        if let Some(format) = image_format(hint) {
            reader.set_format(format);
        }
    }
    let header_err = |e: image::ImageError| EngineError::conversion(hint.to_string(), e.to_string());
    let mut decoder = reader.into_decoder().map_err(header_err)?;
    let (width, height) = decoder.dimensions();
    let has_icc = decoder
        .icc_profile()
        .map_err(header_err)?
        .is_some_and(|icc| !icc.is_empty());
    Ok(RasterHeader {
        width,
        height,
        color_type: decoder.color_type(),
        has_icc,
    })
}

fn is_avif(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[4..8] == b"ftyp" && matches!(&bytes[8..12], b"avif" | b"avis")
}

fn image_format(id: FormatId) -> Option<ImageFormat> {
    match id {
        FormatId::Jpeg => Some(ImageFormat::Jpeg),
        FormatId::Png => Some(ImageFormat::Png),
        FormatId::Webp => Some(ImageFormat::WebP),
        FormatId::Tiff => Some(ImageFormat::Tiff),
        FormatId::Avif | FormatId::Svg | FormatId::Raw(_) => None,
    }
}

/// Encode `img` with fully resolved options.
///
/// `threads` caps the encoder's internal parallelism where the codec
/// supports it.
pub fn encode(img: &DynamicImage, options: &EncoderOptions, threads: usize) -> Result<Vec<u8>> {
    let bytes = match options {
        EncoderOptions::Jpeg(o) => encode_jpeg(img, o)?,
        EncoderOptions::Webp(o) => encode_webp(img, o)?,
        EncoderOptions::Avif(o) => encode_avif(img, o, threads)?,
        EncoderOptions::Png(o) => encode_png(img, o)?,
        EncoderOptions::Tiff(o) => encode_tiff(img, o)?,
    };
    if bytes.is_empty() {
        return Err(EngineError::conversion(
            options.format().to_string(),
            "encoder produced no data",
        ));
    }
    Ok(bytes)
}

fn encode_jpeg(img: &DynamicImage, o: &JpegOptions) -> Result<Vec<u8>> {
    use jpeg_encoder::{ColorType, Encoder, QuantizationTableType, SamplingFactor};

    let (w, h) = img.dimensions();
    let (w, h) = match (u16::try_from(w), u16::try_from(h)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => {
            return Err(EngineError::conversion(
                "jpeg",
                format!("{w}x{h} exceeds the JPEG limit of 65535 pixels per side"),
            ));
        }
    };

    let mut out = Vec::new();
    let mut encoder = Encoder::new(&mut out, o.quality);
    encoder.set_progressive(o.progressive);
    encoder.set_optimized_huffman_tables(o.optimize_scans);
    if o.mozjpeg {
        encoder.set_sampling_factor(SamplingFactor::F_2_2);
        encoder.set_quantization_tables(
            QuantizationTableType::ImageMagick,
            QuantizationTableType::ImageMagick,
        );
    }

    let result = match img {
        DynamicImage::ImageLuma8(gray) => encoder.encode(gray.as_raw(), w, h, ColorType::Luma),
        other => encoder.encode(other.to_rgb8().as_raw(), w, h, ColorType::Rgb),
    };
    result.map_err(|e| EngineError::conversion("jpeg", e.to_string()))?;
    Ok(out)
}

fn encode_webp(img: &DynamicImage, o: &WebpOptions) -> Result<Vec<u8>> {
    let mut config = webp::WebPConfig::new()
        .map_err(|_| EngineError::conversion("webp", "libwebp rejected the default config"))?;
    config.lossless = i32::from(o.lossless);
    config.quality = f32::from(o.quality);
    config.method = i32::from(o.effort);

    let (w, h) = img.dimensions();
    let encoded = if img.color().has_alpha() {
        let rgba = img.to_rgba8();
        webp::Encoder::from_rgba(rgba.as_raw(), w, h).encode_advanced(&config)
    } else {
        let rgb = img.to_rgb8();
        webp::Encoder::from_rgb(rgb.as_raw(), w, h).encode_advanced(&config)
    };
    let memory = encoded.map_err(|e| EngineError::conversion("webp", format!("{e:?}")))?;
    Ok(memory.to_vec())
}

/// Map the 0 (fast) – 9 (slow) effort scale onto rav1e speed 10 (fast) – 1 (slow).
pub(crate) fn avif_speed(effort: u8) -> u8 {
    10 - effort.min(9)
}

fn encode_avif(img: &DynamicImage, o: &AvifOptions, threads: usize) -> Result<Vec<u8>> {
    use image::codecs::avif::AvifEncoder;

    let quality = if o.lossless { 100 } else { o.quality };
    let mut out = Vec::new();
    let encoder = AvifEncoder::new_with_speed_quality(&mut out, avif_speed(o.effort), quality)
        .with_num_threads(Some(threads.max(1)));

    // rav1e takes 8-bit input; widen nothing, narrow everything else.
    let prepared = if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };
    prepared
        .write_with_encoder(encoder)
        .map_err(|e| EngineError::conversion("avif", e.to_string()))?;
    Ok(out)
}

fn png_compression(effort: PngEffort) -> png::Compression {
    match effort {
        PngEffort::Fast => png::Compression::Fast,
        PngEffort::Default => png::Compression::Default,
        PngEffort::Best => png::Compression::Best,
    }
}

fn encode_png(img: &DynamicImage, o: &PngOptions) -> Result<Vec<u8>> {
    match o.palette_colors {
        Some(colors) => encode_png_palette(img, colors, o.dither, o.effort),
        None => encode_png_truecolor(img, o.effort),
    }
}

fn png_err(e: png::EncodingError) -> EngineError {
    EngineError::conversion("png", e.to_string())
}

fn encode_png_truecolor(img: &DynamicImage, effort: PngEffort) -> Result<Vec<u8>> {
    let (w, h) = img.dimensions();
    let (color, depth, data): (png::ColorType, png::BitDepth, Vec<u8>) = match img {
        DynamicImage::ImageLuma8(b) => (png::ColorType::Grayscale, png::BitDepth::Eight, b.as_raw().clone()),
        DynamicImage::ImageLumaA8(b) => (png::ColorType::GrayscaleAlpha, png::BitDepth::Eight, b.as_raw().clone()),
        DynamicImage::ImageRgb8(b) => (png::ColorType::Rgb, png::BitDepth::Eight, b.as_raw().clone()),
        DynamicImage::ImageRgba8(b) => (png::ColorType::Rgba, png::BitDepth::Eight, b.as_raw().clone()),
        DynamicImage::ImageRgb16(b) => (png::ColorType::Rgb, png::BitDepth::Sixteen, to_be_bytes(b.as_raw())),
        DynamicImage::ImageRgba16(b) => (png::ColorType::Rgba, png::BitDepth::Sixteen, to_be_bytes(b.as_raw())),
        DynamicImage::ImageLuma16(b) => (png::ColorType::Grayscale, png::BitDepth::Sixteen, to_be_bytes(b.as_raw())),
        other if other.color().has_alpha() => (png::ColorType::Rgba, png::BitDepth::Eight, other.to_rgba8().into_raw()),
        other => (png::ColorType::Rgb, png::BitDepth::Eight, other.to_rgb8().into_raw()),
    };

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, w, h);
        encoder.set_color(color);
        encoder.set_depth(depth);
        encoder.set_compression(png_compression(effort));
        let mut writer = encoder.write_header().map_err(png_err)?;
        writer.write_image_data(&data).map_err(png_err)?;
        writer.finish().map_err(png_err)?;
    }
    Ok(out)
}

fn to_be_bytes(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_be_bytes()).collect()
}

fn encode_png_palette(img: &DynamicImage, colors: u16, dither: bool, effort: PngEffort) -> Result<Vec<u8>> {
    use color_quant::NeuQuant;

    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    // NeuQuant sample factor: 1 examines every pixel, 30 samples 1/30th.
    let sample_factor = match effort {
        PngEffort::Fast => 30,
        PngEffort::Default => 10,
        PngEffort::Best => 1,
    };
    let quantizer = NeuQuant::new(sample_factor, usize::from(colors.clamp(2, 256)), rgba.as_raw());

    let indices = if dither {
        dither_indices(&quantizer, rgba.as_raw(), w as usize, h as usize)
    } else {
        rgba.as_raw()
            .chunks_exact(4)
            .map(|px| quantizer.index_of(px) as u8)
            .collect()
    };

    let map = quantizer.color_map_rgba();
    let palette: Vec<u8> = map.chunks_exact(4).flat_map(|c| [c[0], c[1], c[2]]).collect();
    let alphas: Vec<u8> = map.chunks_exact(4).map(|c| c[3]).collect();

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, w, h);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(palette);
        if alphas.iter().any(|&a| a < 255) {
            encoder.set_trns(alphas);
        }
        encoder.set_compression(png_compression(effort));
        let mut writer = encoder.write_header().map_err(png_err)?;
        writer.write_image_data(&indices).map_err(png_err)?;
        writer.finish().map_err(png_err)?;
    }
    Ok(out)
}

/// Floyd–Steinberg error diffusion against the quantizer's palette.
fn dither_indices(q: &color_quant::NeuQuant, rgba: &[u8], width: usize, height: usize) -> Vec<u8> {
    let map = q.color_map_rgba();
    let mut work: Vec<f32> = rgba.iter().map(|&v| f32::from(v)).collect();
    let mut indices = Vec::with_capacity(width * height);

    for y in 0..height {
        for x in 0..width {
            let at = (y * width + x) * 4;
            let px = [
                work[at].clamp(0.0, 255.0) as u8,
                work[at + 1].clamp(0.0, 255.0) as u8,
                work[at + 2].clamp(0.0, 255.0) as u8,
                work[at + 3].clamp(0.0, 255.0) as u8,
            ];
            let idx = q.index_of(&px);
            indices.push(idx as u8);

            for c in 0..4 {
                let err = work[at + c] - f32::from(map[idx * 4 + c]);
                let mut spread = |dx: isize, dy: usize, weight: f32| {
                    let nx = x as isize + dx;
                    let ny = y + dy;
                    if nx >= 0 && (nx as usize) < width && ny < height {
                        work[(ny * width + nx as usize) * 4 + c] += err * weight;
                    }
                };
                spread(1, 0, 7.0 / 16.0);
                spread(-1, 1, 3.0 / 16.0);
                spread(0, 1, 5.0 / 16.0);
                spread(1, 1, 1.0 / 16.0);
            }
        }
    }
    indices
}

fn encode_tiff(img: &DynamicImage, o: &TiffOptions) -> Result<Vec<u8>> {
    use tiff::encoder::compression::{Deflate, DeflateLevel, Lzw, Packbits, Uncompressed};

    if o.tile || o.pyramid {
        return Err(EngineError::conversion(
            "tiff",
            "tiled and pyramid TIFF output are not available",
        ));
    }

    let mut cursor = Cursor::new(Vec::new());
    let written = match o.compression {
        TiffCompression::None => write_tiff(&mut cursor, img, Uncompressed, o.predictor),
        TiffCompression::Lzw => write_tiff(&mut cursor, img, Lzw, o.predictor),
        TiffCompression::Deflate => write_tiff(
            &mut cursor,
            img,
            Deflate::with_level(DeflateLevel::Balanced),
            o.predictor,
        ),
        TiffCompression::PackBits => write_tiff(&mut cursor, img, Packbits, o.predictor),
    };
    written.map_err(|e| EngineError::conversion("tiff", e.to_string()))?;
    Ok(cursor.into_inner())
}

/// Uncompressed TIFF, the lossless intermediate for RAW inputs.
pub fn encode_uncompressed_tiff(img: &DynamicImage) -> Result<Vec<u8>> {
    encode_tiff(
        img,
        &TiffOptions {
            compression: TiffCompression::None,
            predictor: false,
            tile: false,
            pyramid: false,
        },
    )
}

fn write_tiff<W, D>(
    writer: &mut W,
    img: &DynamicImage,
    compression: D,
    predictor: bool,
) -> tiff::TiffResult<()>
where
    W: Write + Seek,
    D: tiff::encoder::compression::Compression,
{
    use tiff::encoder::{TiffEncoder, colortype};

    let mut encoder = TiffEncoder::new(writer)?;
    let (w, h) = img.dimensions();
    match img {
        DynamicImage::ImageLuma8(b) => {
            write_tiff_plane::<colortype::Gray8, _, _>(&mut encoder, w, h, compression, b.as_raw(), 1, predictor)
        }
        DynamicImage::ImageLuma16(b) => {
            write_tiff_plane::<colortype::Gray16, _, _>(&mut encoder, w, h, compression, b.as_raw(), 1, predictor)
        }
        DynamicImage::ImageRgb16(b) => {
            write_tiff_plane::<colortype::RGB16, _, _>(&mut encoder, w, h, compression, b.as_raw(), 3, predictor)
        }
        DynamicImage::ImageRgba16(b) => {
            write_tiff_plane::<colortype::RGBA16, _, _>(&mut encoder, w, h, compression, b.as_raw(), 4, predictor)
        }
        other if other.color().has_alpha() => {
            let rgba = other.to_rgba8();
            write_tiff_plane::<colortype::RGBA8, _, _>(&mut encoder, w, h, compression, rgba.as_raw(), 4, predictor)
        }
        other => {
            let rgb = other.to_rgb8();
            write_tiff_plane::<colortype::RGB8, _, _>(&mut encoder, w, h, compression, rgb.as_raw(), 3, predictor)
        }
    }
}

/// Samples that support TIFF horizontal differencing.
trait DeltaSample: Copy {
    fn delta(self, previous: Self) -> Self;
}

impl DeltaSample for u8 {
    fn delta(self, previous: Self) -> Self {
        self.wrapping_sub(previous)
    }
}

impl DeltaSample for u16 {
    fn delta(self, previous: Self) -> Self {
        self.wrapping_sub(previous)
    }
}

/// Apply TIFF predictor 2 in place: each sample becomes the difference to
/// the same channel of the previous pixel in its row.
fn horizontal_difference<T: DeltaSample>(data: &mut [T], row_len: usize, samples_per_pixel: usize) {
    for row in data.chunks_exact_mut(row_len) {
        for i in (samples_per_pixel..row.len()).rev() {
            row[i] = row[i].delta(row[i - samples_per_pixel]);
        }
    }
}

fn write_tiff_plane<C, W, D>(
    encoder: &mut tiff::encoder::TiffEncoder<W>,
    width: u32,
    height: u32,
    compression: D,
    data: &[C::Inner],
    samples_per_pixel: usize,
    predictor: bool,
) -> tiff::TiffResult<()>
where
    C: tiff::encoder::colortype::ColorType,
    C::Inner: DeltaSample,
    [C::Inner]: tiff::encoder::TiffValue,
    W: Write + Seek,
    D: tiff::encoder::compression::Compression,
{
    let mut image = encoder.new_image_with_compression::<C, D>(width, height, compression)?;
    if predictor {
        image
            .encoder()
            .write_tag(tiff::tags::Tag::Predictor, tiff::tags::Predictor::Horizontal.to_u16())?;
        let mut differenced = data.to_vec();
        horizontal_difference(&mut differenced, width as usize * samples_per_pixel, samples_per_pixel);
        image.write_data(&differenced)
    } else {
        image.write_data(data)
    }
}
