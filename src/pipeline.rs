//! Compression pipeline.
//!
//! ```text
//! Classify → (RAW? DecoderChain : decode) → [Resize] → [ColorNormalize] → Encode → Stat
//! ```
//!
//! Every arrow except classification is a deadline race (see
//! [`deadline`](crate::deadline)). Output is staged in a uniquely named temp
//! file next to the destination and renamed into place only after a
//! successful encode, so a failed or timed-out request never leaves a
//! partial file behind and concurrent requests never collide.
//!
//! ## RAW inputs
//!
//! RAW files take a two-stage path. Stage 1 develops the sensor data and
//! encodes it as an uncompressed TIFF; that byte count is reported as
//! [`CompressionResult::baseline_size_bytes`]. Stage 2 encodes the same
//! pixels to the requested format with the quality clamped into
//! `raw.min_quality..=raw.max_quality` (75–95 by default) whatever the
//! caller asked for. Any failure on this path names the extension and tells
//! the user to pre-convert. With `web_optimize` the camera's recorded
//! orientation is applied after the intermediate is measured.

use crate::cache::{CacheKey, Developed};
use crate::deadline::{Deadline, Stage, race};
use crate::engine::Engine;
use crate::error::{EngineError, Result};
use crate::format::{Classification, FormatFamily, OutputFormat, classify};
use crate::imaging::{
    EncodeSettings, Quality, ResizeKernel, ResizeSpec, build_encoder_options, codec, transform,
};
use crate::raw::RawDecodeMode;
use image::metadata::Orientation;
use image::{DynamicImage, GenericImageView};
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, info};

static REQUEST_IDS: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_request_id() -> u64 {
    REQUEST_IDS.fetch_add(1, Ordering::Relaxed)
}

/// Where the input pixels come from.
#[derive(Clone)]
pub enum InputSource {
    Path(PathBuf),
    Bytes(Arc<[u8]>),
}

impl InputSource {
    pub fn bytes(data: impl Into<Arc<[u8]>>) -> Self {
        Self::Bytes(data.into())
    }

    pub fn read(&self) -> std::io::Result<Cow<'_, [u8]>> {
        match self {
            Self::Path(path) => std::fs::read(path).map(Cow::Owned),
            Self::Bytes(bytes) => Ok(Cow::Borrowed(&bytes[..])),
        }
    }

    /// Size of the original input.
    pub fn len(&self) -> std::io::Result<u64> {
        match self {
            Self::Path(path) => Ok(std::fs::metadata(path)?.len()),
            Self::Bytes(bytes) => Ok(bytes.len() as u64),
        }
    }

    pub fn is_empty(&self) -> std::io::Result<bool> {
        self.len().map(|n| n == 0)
    }

    /// A path a RAW backend can open. Byte inputs are spilled to a temp file
    /// carrying `extension`, since RAW backends sniff by name as well as
    /// content; the returned guard deletes it.
    fn materialize(&self, extension: &str) -> Result<(PathBuf, Option<NamedTempFile>)> {
        match self {
            Self::Path(path) => Ok((path.clone(), None)),
            Self::Bytes(bytes) => {
                let mut file = tempfile::Builder::new()
                    .prefix("squish-raw-")
                    .suffix(&format!(".{extension}"))
                    .tempfile()?;
                file.write_all(bytes)?;
                file.flush()?;
                Ok((file.path().to_path_buf(), Some(file)))
            }
        }
    }
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
        }
    }
}

/// One compression job.
#[derive(Debug, Clone)]
pub struct CompressionRequest {
    pub input: InputSource,
    /// Name used for classification. Only the extension matters.
    pub source_filename: String,
    /// Final destination. Parent directories are created as needed.
    pub output: PathBuf,
    pub target_format: OutputFormat,
    pub settings: EncodeSettings,
    pub resize_kernel: ResizeKernel,
    pub resize: Option<ResizeSpec>,
    /// Auto-rotate from embedded orientation metadata.
    pub web_optimize: bool,
    /// Convert to 8-bit RGB, drop alpha, stretch levels.
    pub normalize_color: bool,
    /// Overrides `limits.deadline_ms` when set.
    pub deadline: Option<Duration>,
}

impl CompressionRequest {
    pub fn new(
        input: InputSource,
        source_filename: impl Into<String>,
        output: impl Into<PathBuf>,
        target_format: OutputFormat,
    ) -> Self {
        Self {
            input,
            source_filename: source_filename.into(),
            output: output.into(),
            target_format,
            settings: EncodeSettings::default(),
            resize_kernel: ResizeKernel::default(),
            resize: None,
            web_optimize: false,
            normalize_color: false,
            deadline: None,
        }
    }

    /// Request for a file on disk; the filename is taken from `input`.
    pub fn from_path(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        target_format: OutputFormat,
    ) -> Self {
        let input = input.into();
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(InputSource::Path(input), name, output, target_format)
    }

    pub fn with_quality(mut self, quality: u32) -> Self {
        self.settings.quality = Quality::new(quality);
        self
    }

    pub fn with_settings(mut self, settings: EncodeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_resize(mut self, spec: ResizeSpec, kernel: ResizeKernel) -> Self {
        self.resize = Some(spec);
        self.resize_kernel = kernel;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionResult {
    pub output: PathBuf,
    pub format: OutputFormat,
    pub final_size_bytes: u64,
    /// The quality dial after clamping, before per-preset codec adjustments.
    pub quality_used: u8,
    /// Only set for RAW inputs: the size of the uncompressed intermediate,
    /// **not** the RAW file. Ratios for RAW inputs are measured against
    /// this, which makes them look larger than a file-to-file comparison.
    pub baseline_size_bytes: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub elapsed_ms: u64,
}

impl CompressionResult {
    /// The size savings are measured against: the RAW baseline when
    /// present, else the original input size.
    pub fn reference_size(&self, original_size: u64) -> u64 {
        self.baseline_size_bytes.unwrap_or(original_size)
    }

    /// Percentage saved relative to [`reference_size`](Self::reference_size).
    /// Negative when the output grew.
    pub fn savings_percent(&self, original_size: u64) -> f64 {
        let reference = self.reference_size(original_size);
        if reference == 0 {
            return 0.0;
        }
        (1.0 - self.final_size_bytes as f64 / reference as f64) * 100.0
    }
}

/// Decoded, transformed pixels ready for (repeated) encoding.
pub(crate) struct Prepared {
    pub image: Arc<DynamicImage>,
    pub classification: Classification,
    pub baseline_size_bytes: Option<u64>,
}

impl Prepared {
    fn raw_extension(&self) -> Option<&'static str> {
        (self.classification.family == FormatFamily::Raw)
            .then(|| self.classification.format.extension())
    }
}

/// RAW decode rendering for a target format. TIFF output keeps linear
/// 16-bit data; everything else gets display-ready 8-bit.
pub fn raw_mode_for(target: OutputFormat) -> RawDecodeMode {
    match target {
        OutputFormat::Tiff => RawDecodeMode::Linear16,
        _ => RawDecodeMode::Display8,
    }
}

impl Engine {
    /// Run one request to completion.
    pub fn compress(&self, request: &CompressionRequest) -> Result<CompressionResult> {
        let id = next_request_id();
        let deadline = self.deadline_for(request);
        debug!(id, file = %request.source_filename, format = %request.target_format, "compress");

        let prepared = self.prepare(id, request, &deadline)?;
        let quality = self.effective_quality(&prepared, request.settings.quality);
        let bytes = self.encode_prepared(&prepared, request, quality, &deadline)?;

        deadline.check(Stage::Encode)?;
        let staged = stage_output(&request.output, &bytes)?;
        let final_size_bytes = persist_output(staged, &request.output)?;

        let (width, height) = prepared.image.dimensions();
        let result = CompressionResult {
            output: request.output.clone(),
            format: request.target_format,
            final_size_bytes,
            quality_used: quality.value(),
            baseline_size_bytes: prepared.baseline_size_bytes,
            width,
            height,
            elapsed_ms: deadline.elapsed().as_millis() as u64,
        };
        info!(
            id,
            file = %request.source_filename,
            format = %result.format,
            bytes = result.final_size_bytes,
            quality = result.quality_used,
            elapsed_ms = result.elapsed_ms,
            "compressed"
        );
        Ok(result)
    }

    pub(crate) fn deadline_for(&self, request: &CompressionRequest) -> Deadline {
        Deadline::after(request.deadline.unwrap_or_else(|| self.config.limits.deadline()))
    }

    /// Classify, decode and transform. Classification happens first so an
    /// unsupported input never reaches a decoder.
    pub(crate) fn prepare(
        &self,
        id: u64,
        request: &CompressionRequest,
        deadline: &Deadline,
    ) -> Result<Prepared> {
        let classification = classify(&request.source_filename)?;
        if !classification.format.is_raster() {
            return Err(EngineError::UnsupportedFormat(format!(
                ".{} is a vector format and cannot be compressed as a raster",
                classification.format
            )));
        }

        match classification.family {
            FormatFamily::Raw => {
                let ext = classification.format.extension();
                self.prepare_raw(id, request, classification, deadline)
                    .map_err(|e| e.for_raw(ext))
            }
            FormatFamily::Standard => {
                let format = classification.format;
                let source = request.input.clone();
                let auto_orient = request.web_optimize;
                let decoded = race(&self.pool, deadline, Stage::Decode, move || {
                    let bytes = source.read()?;
                    codec::decode_bytes(&bytes, format, auto_orient)
                })?;
                debug!(id, stage = %Stage::Decode, "decoded");
                let image = self.transform(id, Arc::new(decoded), None, request, deadline)?;
                Ok(Prepared {
                    image,
                    classification,
                    baseline_size_bytes: None,
                })
            }
        }
    }

    fn prepare_raw(
        &self,
        id: u64,
        request: &CompressionRequest,
        classification: Classification,
        deadline: &Deadline,
    ) -> Result<Prepared> {
        let ext = classification.format.extension();
        let mode = raw_mode_for(request.target_format);
        let Developed { image: developed, orientation } =
            self.decode_raw(&request.input, ext, mode, deadline)?;
        debug!(id, stage = %Stage::Decode, ?mode, ?orientation, "RAW developed");

        // Stage 1: lossless intermediate, measured for the baseline.
        let pixels = Arc::clone(&developed);
        let intermediate = race(&self.pool, deadline, Stage::Encode, move || {
            codec::encode_uncompressed_tiff(&pixels)
        })?;
        let baseline = intermediate.len() as u64;
        debug!(id, baseline, "RAW intermediate encoded");

        let orientation = request
            .web_optimize
            .then_some(orientation)
            .filter(|o| *o != Orientation::NoTransforms);
        let image = self.transform(id, developed, orientation, request, deadline)?;
        Ok(Prepared {
            image,
            classification,
            baseline_size_bytes: Some(baseline),
        })
    }

    /// Run the decoder chain on the worker pool, consulting the decode cache.
    pub(crate) fn decode_raw(
        &self,
        input: &InputSource,
        extension: &str,
        mode: RawDecodeMode,
        deadline: &Deadline,
    ) -> Result<Developed> {
        let chain = Arc::clone(&self.decoders);
        let cache = Arc::clone(&self.cache);
        let source = input.clone();
        let extension = extension.to_string();
        race(&self.pool, deadline, Stage::Decode, move || {
            let key = if cache.is_enabled() {
                Some(CacheKey::new(&source.read()?, mode))
            } else {
                None
            };
            if let Some(hit) = key.as_ref().and_then(|k| cache.get(k)) {
                debug!(extension = %extension, "RAW decode cache hit");
                return Ok(hit);
            }

            let (path, _spill) = source.materialize(&extension)?;
            let decoded = chain.decode(&path, &extension, mode)?;
            debug!(backend = %decoded.backend, "RAW backend succeeded");
            let developed = Developed {
                image: Arc::new(decoded.image),
                orientation: decoded.orientation,
            };
            if let Some(key) = key {
                cache.insert(key, developed.clone());
            }
            Ok(developed)
        })
    }

    /// Orient, resize and normalise, in that order. `orientation` is only
    /// set for RAW inputs; standard decoders orient while decoding.
    fn transform(
        &self,
        id: u64,
        image: Arc<DynamicImage>,
        orientation: Option<Orientation>,
        request: &CompressionRequest,
        deadline: &Deadline,
    ) -> Result<Arc<DynamicImage>> {
        let kernel = request.resize_kernel;
        let resize = request
            .resize
            .filter(|spec| !spec.is_empty() && kernel != ResizeKernel::None);
        let normalize = request.normalize_color;
        if orientation.is_none() && resize.is_none() && !normalize {
            return Ok(image);
        }

        let out = race(&self.pool, deadline, Stage::Transform, move || {
            let mut img = Arc::unwrap_or_clone(image);
            if let Some(orientation) = orientation {
                img.apply_orientation(orientation);
            }
            if let Some(spec) = resize {
                img = transform::resize(img, spec, kernel);
            }
            if normalize {
                img = transform::normalize_color(&img);
            }
            Ok(Arc::new(img))
        })?;
        debug!(id, stage = %Stage::Transform, dims = ?out.dimensions(), "transformed");
        Ok(out)
    }

    /// Quality the encoder will be driven with: RAW inputs are held inside
    /// the configured band, standard inputs use the request as-is.
    pub(crate) fn effective_quality(&self, prepared: &Prepared, requested: Quality) -> Quality {
        match prepared.classification.family {
            FormatFamily::Raw => {
                requested.clamp_to(self.config.raw.min_quality, self.config.raw.max_quality)
            }
            FormatFamily::Standard => requested,
        }
    }

    /// Encode prepared pixels at an explicit quality.
    pub(crate) fn encode_prepared(
        &self,
        prepared: &Prepared,
        request: &CompressionRequest,
        quality: Quality,
        deadline: &Deadline,
    ) -> Result<Vec<u8>> {
        let settings = EncodeSettings {
            quality,
            ..request.settings
        };
        let options = build_encoder_options(request.target_format, &settings);
        let image = Arc::clone(&prepared.image);
        let threads = self.config.codec.threads;
        let encoded = race(&self.pool, deadline, Stage::Encode, move || {
            codec::encode(&image, &options, threads)
        });
        match prepared.raw_extension() {
            Some(ext) => encoded.map_err(|e| e.for_raw(ext)),
            None => encoded,
        }
    }
}

/// Write `bytes` to a unique temp file in the destination directory.
/// Dropping the returned handle deletes the file.
pub(crate) fn stage_output(output: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    let dir = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;
    let mut file = tempfile::Builder::new()
        .prefix(".squish-")
        .suffix(".part")
        .tempfile_in(dir)?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}

/// Rename a staged file into place and stat the result.
pub(crate) fn persist_output(staged: NamedTempFile, output: &Path) -> Result<u64> {
    staged.persist(output).map_err(|e| EngineError::Io(e.error))?;
    Ok(std::fs::metadata(output)?.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::imaging::AlgorithmPreset;
    use crate::raw::DecoderChain;
    use crate::raw::tests::{MockDecoder, RecordedCall, Shared};
    use crate::test_helpers::{noisy_image, write_image};
    use tempfile::TempDir;

    fn engine_with(mocks: Vec<Arc<MockDecoder>>) -> Engine {
        let chain = DecoderChain::new(
            mocks
                .into_iter()
                .map(|m| Box::new(Shared(m)) as Box<dyn crate::raw::RawDecoder>)
                .collect(),
        );
        Engine::with_decoder_chain(EngineConfig::default(), chain).unwrap()
    }

    fn engine() -> Engine {
        engine_with(Vec::new())
    }

    fn fake_raw(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"sensor bytes").unwrap();
        path
    }

    #[test]
    fn compresses_png_to_jpeg() {
        let tmp = TempDir::new().unwrap();
        let input = write_image(tmp.path(), "in.png", &noisy_image(120, 80));
        let out = tmp.path().join("out/result.jpg");
        let request = CompressionRequest::from_path(&input, &out, OutputFormat::Jpeg).with_quality(70);

        let result = engine().compress(&request).unwrap();
        assert!(result.final_size_bytes > 0);
        assert_eq!(result.final_size_bytes, std::fs::metadata(&out).unwrap().len());
        assert_eq!(result.quality_used, 70);
        assert_eq!(result.baseline_size_bytes, None);
        assert_eq!((result.width, result.height), (120, 80));
    }

    #[test]
    fn resize_is_applied_before_encode() {
        let tmp = TempDir::new().unwrap();
        let input = write_image(tmp.path(), "in.png", &noisy_image(200, 100));
        let out = tmp.path().join("small.webp");
        let request = CompressionRequest::from_path(&input, &out, OutputFormat::Webp).with_resize(
            ResizeSpec {
                width: Some(50),
                height: None,
            },
            ResizeKernel::Bilinear,
        );
        let result = engine().compress(&request).unwrap();
        assert_eq!((result.width, result.height), (50, 25));
        let decoded = image::open(&out).unwrap();
        assert_eq!(decoded.dimensions(), (50, 25));
    }

    #[test]
    fn byte_input_uses_source_filename() {
        let tmp = TempDir::new().unwrap();
        let png = std::fs::read(write_image(tmp.path(), "x.png", &noisy_image(32, 32))).unwrap();
        let out = tmp.path().join("from-bytes.png");
        let request =
            CompressionRequest::new(InputSource::bytes(png), "upload.PNG", &out, OutputFormat::Png);
        assert!(engine().compress(&request).unwrap().final_size_bytes > 0);
    }

    #[test]
    fn unsupported_extension_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let input = fake_raw(tmp.path(), "file.xyz");
        let mock = Arc::new(MockDecoder::working("mock"));
        let out = tmp.path().join("out.jpg");
        let request = CompressionRequest::from_path(&input, &out, OutputFormat::Jpeg);

        let err = engine_with(vec![mock.clone()]).compress(&request).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedFormat(_)));
        assert!(mock.get_calls().is_empty());
        assert!(!out.exists());
    }

    #[test]
    fn svg_is_rejected_before_decode() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("logo.svg");
        std::fs::write(&input, "<svg/>").unwrap();
        let request = CompressionRequest::from_path(&input, tmp.path().join("o.png"), OutputFormat::Png);
        assert!(matches!(
            engine().compress(&request),
            Err(EngineError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn raw_reports_intermediate_baseline_and_clamps_quality() {
        let tmp = TempDir::new().unwrap();
        let input = fake_raw(tmp.path(), "IMG_0001.CR2");
        let mock = Arc::new(MockDecoder::working("mock"));
        let engine = engine_with(vec![mock.clone()]);

        let low = CompressionRequest::from_path(&input, tmp.path().join("low.jpg"), OutputFormat::Jpeg)
            .with_quality(20);
        let result = engine.compress(&low).unwrap();
        assert_eq!(result.quality_used, 75);

        let (w, h) = mock.size;
        let baseline = result.baseline_size_bytes.unwrap();
        assert!(baseline >= u64::from(w * h * 3));
        assert_ne!(baseline, std::fs::metadata(&input).unwrap().len());
        assert_eq!(result.reference_size(12), baseline);

        let high = CompressionRequest::from_path(&input, tmp.path().join("high.jpg"), OutputFormat::Jpeg)
            .with_quality(100);
        assert_eq!(engine.compress(&high).unwrap().quality_used, 95);
    }

    #[test]
    fn raw_orientation_applied_only_with_web_optimize() {
        let tmp = TempDir::new().unwrap();
        let input = fake_raw(tmp.path(), "portrait.cr2");
        let mock = Arc::new(MockDecoder::rotated("mock", Orientation::Rotate90));
        let engine = engine_with(vec![mock.clone()]);
        let (w, h) = mock.size;

        let sideways = CompressionRequest::from_path(&input, tmp.path().join("a.png"), OutputFormat::Png);
        let result = engine.compress(&sideways).unwrap();
        assert_eq!((result.width, result.height), (w, h));

        let mut upright =
            CompressionRequest::from_path(&input, tmp.path().join("b.png"), OutputFormat::Png);
        upright.web_optimize = true;
        let result = engine.compress(&upright).unwrap();
        assert_eq!((result.width, result.height), (h, w));
        assert_eq!(image::open(tmp.path().join("b.png")).unwrap().dimensions(), (h, w));
        // Same sensor data either way, so the baseline does not move.
        assert!(result.baseline_size_bytes.unwrap() >= u64::from(w * h * 3));
    }

    #[test]
    fn raw_to_tiff_requests_linear_decode() {
        let tmp = TempDir::new().unwrap();
        let input = fake_raw(tmp.path(), "shot.nef");
        let mock = Arc::new(MockDecoder::working("mock"));
        let request =
            CompressionRequest::from_path(&input, tmp.path().join("shot.tiff"), OutputFormat::Tiff);
        engine_with(vec![mock.clone()]).compress(&request).unwrap();
        assert!(
            mock.get_calls()
                .iter()
                .any(|c| matches!(c, RecordedCall::Decode(_, RawDecodeMode::Linear16)))
        );
    }

    #[test]
    fn raw_decode_is_cached_by_content() {
        let tmp = TempDir::new().unwrap();
        let input = fake_raw(tmp.path(), "shot.arw");
        let mock = Arc::new(MockDecoder::working("mock"));
        let engine = engine_with(vec![mock.clone()]);
        for name in ["a.jpg", "b.webp"] {
            let format = OutputFormat::from_path(Path::new(name)).unwrap();
            let request = CompressionRequest::from_path(&input, tmp.path().join(name), format);
            engine.compress(&request).unwrap();
        }
        let decodes = mock
            .get_calls()
            .iter()
            .filter(|c| matches!(c, RecordedCall::Decode(..)))
            .count();
        assert_eq!(decodes, 1);
        assert_eq!(engine.cache_stats().hits, 1);
    }

    #[test]
    fn raw_failure_carries_extension_and_hint() {
        let tmp = TempDir::new().unwrap();
        let input = fake_raw(tmp.path(), "broken.dng");
        let engine = engine_with(vec![Arc::new(MockDecoder::failing("mock"))]);
        let request = CompressionRequest::from_path(&input, tmp.path().join("o.jpg"), OutputFormat::Jpeg);
        let message = engine.compress(&request).unwrap_err().to_string();
        assert!(message.contains(".dng"));
        assert!(message.contains(crate::error::PRECONVERT_HINT));
    }

    #[test]
    fn raw_bytes_are_spilled_with_extension() {
        let mock = Arc::new(MockDecoder::working("mock"));
        let tmp = TempDir::new().unwrap();
        let request = CompressionRequest::new(
            InputSource::bytes(b"sensor".to_vec()),
            "upload.raf",
            tmp.path().join("o.png"),
            OutputFormat::Png,
        );
        engine_with(vec![mock.clone()]).compress(&request).unwrap();
        let probed = mock
            .get_calls()
            .into_iter()
            .find_map(|c| match c {
                RecordedCall::Probe(p) => Some(p),
                _ => None,
            })
            .unwrap();
        assert!(probed.ends_with(".raf"));
        assert!(!Path::new(&probed).exists());
    }

    #[test]
    fn expired_deadline_leaves_no_output() {
        let tmp = TempDir::new().unwrap();
        let input = write_image(tmp.path(), "big.png", &noisy_image(1500, 1500));
        let out = tmp.path().join("never.avif");
        let request = CompressionRequest::from_path(&input, &out, OutputFormat::Avif)
            .with_deadline(Duration::from_millis(1));
        let err = engine().compress(&request).unwrap_err();
        assert!(err.is_retryable(), "{err}");
        assert!(!out.exists());
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn lossless_preset_reports_requested_dial() {
        let tmp = TempDir::new().unwrap();
        let input = write_image(tmp.path(), "in.png", &noisy_image(16, 16));
        let request = CompressionRequest::from_path(&input, tmp.path().join("o.jpg"), OutputFormat::Jpeg)
            .with_settings(EncodeSettings {
                quality: Quality::new(60),
                preset: AlgorithmPreset::Lossless,
                ..EncodeSettings::default()
            });
        assert_eq!(engine().compress(&request).unwrap().quality_used, 60);
    }

    #[test]
    fn savings_against_reference() {
        let result = CompressionResult {
            output: PathBuf::from("x"),
            format: OutputFormat::Jpeg,
            final_size_bytes: 250,
            quality_used: 80,
            baseline_size_bytes: None,
            width: 1,
            height: 1,
            elapsed_ms: 0,
        };
        assert!((result.savings_percent(1000) - 75.0).abs() < 1e-9);
        assert_eq!(result.savings_percent(0), 0.0);
        let raw = CompressionResult {
            baseline_size_bytes: Some(500),
            ..result
        };
        assert!((raw.savings_percent(1000) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn staged_output_is_removed_on_drop() {
        let tmp = TempDir::new().unwrap();
        let staged = stage_output(&tmp.path().join("x.jpg"), b"abc").unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());
        drop(staged);
        assert!(!path.exists());
    }
}
