//! End-to-end tests for the four public engine operations.
//!
//! Images are generated in-process and written to temp dirs. RAW inputs use
//! a recording decoder so no real camera files or external tools are needed.
//!
//! Run with: cargo test --test engine

use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use squish::config::EngineConfig;
use squish::raw::DecoderChain;
use squish::{
    CompressionRequest, Engine, EngineError, OutputFormat, QualityBounds, QualityGrade,
    RawDecodeMode, RawDecoder, RawFrame,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Counts decode calls and develops a fixed synthetic frame.
struct CountingDecoder {
    decodes: Mutex<Vec<RawDecodeMode>>,
}

impl CountingDecoder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            decodes: Mutex::new(Vec::new()),
        })
    }

    fn decode_count(&self) -> usize {
        self.decodes.lock().unwrap().len()
    }
}

struct Handle(Arc<CountingDecoder>);

impl RawDecoder for Handle {
    fn name(&self) -> &str {
        "counting"
    }

    fn can_decode(&self, _path: &Path) -> bool {
        true
    }

    fn decode(&self, _path: &Path, mode: RawDecodeMode) -> squish::Result<RawFrame> {
        self.0.decodes.lock().unwrap().push(mode);
        Ok(noisy(120, 80).into())
    }

    fn dimensions(&self, _path: &Path) -> squish::Result<(u32, u32)> {
        Ok((120, 80))
    }
}

fn noisy(width: u32, height: u32) -> DynamicImage {
    let mut state: u32 = 7;
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        let n = (state >> 26) as u8;
        Rgb([(x % 256) as u8 ^ n, (y % 256) as u8, ((x + y) % 256) as u8 ^ n])
    }))
}

fn write(dir: &Path, name: &str, img: &DynamicImage) -> PathBuf {
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

fn engine() -> Engine {
    Engine::with_decoder_chain(EngineConfig::default(), DecoderChain::default()).unwrap()
}

fn engine_with_raw(decoder: &Arc<CountingDecoder>) -> Engine {
    let chain = DecoderChain::new(vec![Box::new(Handle(Arc::clone(decoder)))]);
    Engine::with_decoder_chain(EngineConfig::default(), chain).unwrap()
}

#[test]
fn target_size_converges_within_four_iterations() {
    let tmp = TempDir::new().unwrap();
    let input = write(tmp.path(), "photo.jpg", &noisy(800, 600));
    let out = tmp.path().join("out/photo.jpg");
    let request = CompressionRequest::from_path(&input, &out, OutputFormat::Jpeg);

    let r = engine()
        .compress_to_target_size(&request, 50_000, QualityBounds::new(10, 95))
        .unwrap();

    assert!((1..=4).contains(&r.iterations));
    assert!((10..=95).contains(&r.result.quality_used));
    assert!(r.result.final_size_bytes > 0);
    assert_eq!(r.result.final_size_bytes, std::fs::metadata(&out).unwrap().len());
    if r.achieved {
        let err = (r.result.final_size_bytes as f64 - 50_000.0).abs() / 50_000.0;
        assert!(err < 0.10, "achieved but off by {err}");
    }
}

#[test]
fn assessing_a_file_against_itself_is_perfect() {
    let tmp = TempDir::new().unwrap();
    let path = write(tmp.path(), "same.png", &noisy(160, 120));
    let m = engine().assess_quality(&path, &path).unwrap();
    assert_eq!(m.psnr, 100.0);
    assert!((m.ssim_percent() - 100.0).abs() < 1e-9);
    assert_eq!(m.quality_score, 100);
    assert_eq!(m.quality_grade, QualityGrade::Excellent);
}

#[test]
fn compressed_output_scores_below_perfect() {
    let tmp = TempDir::new().unwrap();
    let input = write(tmp.path(), "in.png", &noisy(160, 120));
    let out = tmp.path().join("low.jpg");
    let engine = engine();
    engine
        .compress(&CompressionRequest::from_path(&input, &out, OutputFormat::Jpeg).with_quality(20))
        .unwrap();
    let m = engine.assess_quality(&input, &out).unwrap();
    assert!(m.psnr < 100.0);
    assert!(m.quality_score < 100);
}

#[test]
fn dimension_mismatch_is_a_metrics_error() {
    let tmp = TempDir::new().unwrap();
    let a = write(tmp.path(), "a.png", &noisy(64, 64));
    let b = write(tmp.path(), "b.png", &noisy(64, 32));
    let engine = engine();
    assert!(matches!(engine.assess_quality(&a, &b), Err(EngineError::Metrics(_))));
    assert_eq!(engine.assess_quality_best_effort(&a, &b).quality_score, 0);
}

#[test]
fn one_millisecond_deadline_times_out_cleanly() {
    let tmp = TempDir::new().unwrap();
    let input = write(tmp.path(), "big.png", &noisy(2000, 1500));
    let out_dir = tmp.path().join("out");
    let out = out_dir.join("big.avif");
    let request = CompressionRequest::from_path(&input, &out, OutputFormat::Avif)
        .with_deadline(Duration::from_millis(1));

    let err = engine().compress(&request).unwrap_err();
    assert!(matches!(err, EngineError::Timeout { .. }), "{err}");
    assert!(!out.exists());
    let leftovers = std::fs::read_dir(&out_dir).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[test]
fn unsupported_extension_never_reaches_a_decoder() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("file.xyz");
    std::fs::write(&input, b"whatever").unwrap();
    let decoder = CountingDecoder::new();
    let request = CompressionRequest::from_path(&input, tmp.path().join("o.jpg"), OutputFormat::Jpeg);

    let err = engine_with_raw(&decoder).compress(&request).unwrap_err();
    assert!(matches!(err, EngineError::UnsupportedFormat(_)));
    assert_eq!(decoder.decode_count(), 0);
    assert!(squish::classify("file.xyz").is_err());
}

#[test]
fn raw_baseline_is_the_intermediate_and_quality_is_banded() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("IMG_0001.CR2");
    std::fs::write(&input, vec![0u8; 16]).unwrap();
    let decoder = CountingDecoder::new();
    let engine = engine_with_raw(&decoder);

    for requested in [5, 50, 100] {
        let out = tmp.path().join(format!("q{requested}.jpg"));
        let request =
            CompressionRequest::from_path(&input, &out, OutputFormat::Jpeg).with_quality(requested);
        let result = engine.compress(&request).unwrap();

        let baseline = result.baseline_size_bytes.unwrap();
        // 120x80 RGB8 uncompressed, plus TIFF header
        assert!(baseline >= 120 * 80 * 3);
        assert_ne!(baseline, 16);
        assert!((75..=95).contains(&result.quality_used), "{requested}");
        assert_eq!(result.reference_size(16), baseline);
    }
}

#[test]
fn analyze_reads_metadata_only() {
    let tmp = TempDir::new().unwrap();
    let path = write(tmp.path(), "wide.png", &noisy(2400, 600));
    let analysis = engine().analyze(&path).unwrap();
    assert_eq!((analysis.width, analysis.height), (2400, 600));
    assert_eq!(analysis.recommended_quality, 80);
    assert!(analysis.suggestions[0].starts_with("Resize"));
    let names: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
    assert_eq!(names.len(), 1);
}

#[test]
fn transparency_survives_an_avif_round_trip() {
    let tmp = TempDir::new().unwrap();
    let half_clear = DynamicImage::ImageRgba8(RgbaImage::from_fn(96, 64, |x, _| {
        Rgba([255, 0, 0, if x < 48 { 0 } else { 255 }])
    }));
    let input = write(tmp.path(), "sprite.png", &half_clear);
    let avif = tmp.path().join("sprite.avif");
    let back = tmp.path().join("back.png");
    let engine = engine();

    engine
        .compress(&CompressionRequest::from_path(&input, &avif, OutputFormat::Avif).with_quality(90))
        .unwrap();
    assert!(engine.analyze(&avif).unwrap().color_space_info.has_alpha);
    engine
        .compress(&CompressionRequest::from_path(&avif, &back, OutputFormat::Png))
        .unwrap();

    let decoded = image::open(&back).unwrap().to_rgba8();
    assert!(decoded.get_pixel(0, 0)[3] < 32, "{:?}", decoded.get_pixel(0, 0));
    assert!(decoded.get_pixel(95, 63)[3] > 224, "{:?}", decoded.get_pixel(95, 63));
}

#[test]
fn unreadable_compressed_file_is_a_metrics_error() {
    let tmp = TempDir::new().unwrap();
    let original = write(tmp.path(), "ok.png", &noisy(32, 32));
    let garbage = tmp.path().join("garbage.png");
    std::fs::write(&garbage, b"definitely not a png").unwrap();
    assert!(matches!(
        engine().assess_quality(&original, &garbage),
        Err(EngineError::Metrics(_))
    ));
}
