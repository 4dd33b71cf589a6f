//! RAW decoding behind an ordered chain of backends.
//!
//! The [`RawDecoder`] trait is the seam: every backend offers a cheap
//! capability probe ([`RawDecoder::can_decode`]) and a full decode. The
//! [`DecoderChain`] walks its backends in order, skipping those whose probe
//! declines and falling through on failure. When nothing works the caller
//! gets [`EngineError::DecodeUnavailable`], whose message tells the user to
//! pre-convert the file.
//!
//! | Order | Backend | Notes |
//! |---|---|---|
//! | 1 | [`RawlerDecoder`] | in-process demosaic + white balance |
//! | 2 | [`ExternalToolDecoder`] | ImageMagick, only when installed and enabled |

mod external;
mod rawler_decoder;

pub use external::ExternalToolDecoder;
pub use rawler_decoder::RawlerDecoder;

use crate::config::RawConfig;
use crate::error::{EngineError, Result};
use image::DynamicImage;
use image::metadata::Orientation;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Output rendering of a RAW decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawDecodeMode {
    /// sRGB, auto-brightened, 8 bits per channel.
    #[default]
    Display8,
    /// Linear, no brightness adjustment, 16 bits per channel.
    Linear16,
}

/// A developed RAW raster plus the orientation recorded by the camera.
///
/// Pixels are in sensor order; the orientation is applied only when the
/// request asks for it.
pub struct RawFrame {
    pub image: DynamicImage,
    pub orientation: Orientation,
}

impl From<DynamicImage> for RawFrame {
    fn from(image: DynamicImage) -> Self {
        Self {
            image,
            orientation: Orientation::NoTransforms,
        }
    }
}

/// Map an EXIF orientation tag (1-8) onto [`Orientation`]. Missing or
/// out-of-range tags mean upright.
pub fn exif_orientation(tag: Option<u16>) -> Orientation {
    tag.and_then(|t| u8::try_from(t).ok())
        .and_then(Orientation::from_exif)
        .unwrap_or(Orientation::NoTransforms)
}

/// A RAW decoding backend.
pub trait RawDecoder: Send + Sync {
    /// Short identifier used in logs and error diagnostics.
    fn name(&self) -> &str;

    /// Cheap check whether this backend recognises the file. Must not
    /// demosaic or otherwise do the expensive part of a decode.
    fn can_decode(&self, path: &Path) -> bool;

    /// Full decode to a raster.
    fn decode(&self, path: &Path, mode: RawDecodeMode) -> Result<RawFrame>;

    /// Sensor output dimensions without developing the image.
    fn dimensions(&self, path: &Path) -> Result<(u32, u32)>;
}

/// Successful chain decode.
pub struct DecodedRaw {
    pub image: DynamicImage,
    pub orientation: Orientation,
    /// Name of the backend that produced `image`.
    pub backend: String,
}

/// Ordered list of RAW backends.
#[derive(Default)]
pub struct DecoderChain {
    decoders: Vec<Box<dyn RawDecoder>>,
}

impl DecoderChain {
    pub fn new(decoders: Vec<Box<dyn RawDecoder>>) -> Self {
        Self { decoders }
    }

    /// The production chain: rawler first, then the external tool when the
    /// config allows it and a binary is on `PATH`.
    pub fn standard(config: &RawConfig) -> Self {
        let mut decoders: Vec<Box<dyn RawDecoder>> = vec![Box::new(RawlerDecoder::new())];
        if config.external_fallback {
            match ExternalToolDecoder::detect() {
                Some(tool) => decoders.push(Box::new(tool)),
                None => debug!("no external RAW converter on PATH"),
            }
        }
        Self::new(decoders)
    }

    pub fn names(&self) -> Vec<&str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Decode with the first backend that both accepts and succeeds.
    ///
    /// `extension` only feeds the user-facing error.
    pub fn decode(&self, path: &Path, extension: &str, mode: RawDecodeMode) -> Result<DecodedRaw> {
        let mut attempts = Vec::new();
        for decoder in &self.decoders {
            let name = decoder.name();
            if !decoder.can_decode(path) {
                debug!(backend = name, path = %path.display(), "backend declined file");
                attempts.push(format!("{name}: not recognised"));
                continue;
            }
            match decoder.decode(path, mode) {
                Ok(frame) => {
                    debug!(backend = name, ?mode, orientation = ?frame.orientation, "RAW decoded");
                    return Ok(DecodedRaw {
                        image: frame.image,
                        orientation: frame.orientation,
                        backend: name.to_string(),
                    });
                }
                Err(err) => {
                    warn!(backend = name, error = %err, "RAW backend failed, trying next");
                    attempts.push(format!("{name}: {err}"));
                }
            }
        }
        Err(self.unavailable(extension, attempts))
    }

    /// Header-only dimensions from the first backend that can read them.
    pub fn dimensions(&self, path: &Path, extension: &str) -> Result<(u32, u32)> {
        let mut attempts = Vec::new();
        for decoder in &self.decoders {
            let name = decoder.name();
            if !decoder.can_decode(path) {
                attempts.push(format!("{name}: not recognised"));
                continue;
            }
            match decoder.dimensions(path) {
                Ok(dims) => return Ok(dims),
                Err(err) => attempts.push(format!("{name}: {err}")),
            }
        }
        Err(self.unavailable(extension, attempts))
    }

    fn unavailable(&self, extension: &str, attempts: Vec<String>) -> EngineError {
        if self.decoders.is_empty() {
            debug!(extension, "no RAW backends configured");
        }
        EngineError::DecodeUnavailable {
            extension: extension.to_string(),
            attempts,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedCall {
        Probe(String),
        Decode(String, RawDecodeMode),
        Dimensions(String),
    }

    /// Mock decoder that records calls. Uses Mutex so it is Sync.
    pub struct MockDecoder {
        pub name: &'static str,
        pub accepts: bool,
        pub fails: bool,
        pub size: (u32, u32),
        pub orientation: Orientation,
        pub calls: Mutex<Vec<RecordedCall>>,
    }

    impl MockDecoder {
        pub fn working(name: &'static str) -> Self {
            Self {
                name,
                accepts: true,
                fails: false,
                size: (64, 48),
                orientation: Orientation::NoTransforms,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn declining(name: &'static str) -> Self {
            Self {
                accepts: false,
                ..Self::working(name)
            }
        }

        pub fn failing(name: &'static str) -> Self {
            Self {
                fails: true,
                ..Self::working(name)
            }
        }

        pub fn rotated(name: &'static str, orientation: Orientation) -> Self {
            Self {
                orientation,
                ..Self::working(name)
            }
        }

        pub fn get_calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RawDecoder for MockDecoder {
        fn name(&self) -> &str {
            self.name
        }

        fn can_decode(&self, path: &Path) -> bool {
            self.calls
                .lock()
                .unwrap()
                .push(RecordedCall::Probe(path.to_string_lossy().to_string()));
            self.accepts
        }

        fn decode(&self, path: &Path, mode: RawDecodeMode) -> Result<RawFrame> {
            self.calls
                .lock()
                .unwrap()
                .push(RecordedCall::Decode(path.to_string_lossy().to_string(), mode));
            if self.fails {
                return Err(EngineError::conversion(self.name, "sensor data corrupt"));
            }
            let (w, h) = self.size;
            Ok(RawFrame {
                image: DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
                    Rgb([(x * 3) as u8, (y * 5) as u8, 90])
                })),
                orientation: self.orientation,
            })
        }

        fn dimensions(&self, path: &Path) -> Result<(u32, u32)> {
            self.calls
                .lock()
                .unwrap()
                .push(RecordedCall::Dimensions(path.to_string_lossy().to_string()));
            Ok(self.size)
        }
    }

    /// Lets a test keep a handle on a mock after boxing it into a chain.
    pub struct Shared(pub std::sync::Arc<MockDecoder>);

    impl RawDecoder for Shared {
        fn name(&self) -> &str {
            self.0.name()
        }
        fn can_decode(&self, path: &Path) -> bool {
            self.0.can_decode(path)
        }
        fn decode(&self, path: &Path, mode: RawDecodeMode) -> Result<RawFrame> {
            self.0.decode(path, mode)
        }
        fn dimensions(&self, path: &Path) -> Result<(u32, u32)> {
            self.0.dimensions(path)
        }
    }

    fn chain_of(mocks: &[std::sync::Arc<MockDecoder>]) -> DecoderChain {
        DecoderChain::new(
            mocks
                .iter()
                .map(|m| Box::new(Shared(m.clone())) as Box<dyn RawDecoder>)
                .collect(),
        )
    }

    #[test]
    fn first_working_backend_wins() {
        let a = std::sync::Arc::new(MockDecoder::working("a"));
        let b = std::sync::Arc::new(MockDecoder::working("b"));
        let decoded = chain_of(&[a.clone(), b.clone()])
            .decode(Path::new("/x.cr2"), "cr2", RawDecodeMode::Display8)
            .unwrap();
        assert_eq!(decoded.backend, "a");
        assert!(b.get_calls().is_empty());
    }

    #[test]
    fn declining_probe_skips_decode() {
        let a = std::sync::Arc::new(MockDecoder::declining("a"));
        let b = std::sync::Arc::new(MockDecoder::working("b"));
        let decoded = chain_of(&[a.clone(), b.clone()])
            .decode(Path::new("/x.nef"), "nef", RawDecodeMode::Linear16)
            .unwrap();
        assert_eq!(decoded.backend, "b");
        assert_eq!(a.get_calls(), vec![RecordedCall::Probe("/x.nef".into())]);
        assert_eq!(
            b.get_calls(),
            vec![
                RecordedCall::Probe("/x.nef".into()),
                RecordedCall::Decode("/x.nef".into(), RawDecodeMode::Linear16),
            ]
        );
    }

    #[test]
    fn failure_falls_through_to_next_backend() {
        let a = std::sync::Arc::new(MockDecoder::failing("a"));
        let b = std::sync::Arc::new(MockDecoder::working("b"));
        let decoded = chain_of(&[a, b])
            .decode(Path::new("/x.arw"), "arw", RawDecodeMode::Display8)
            .unwrap();
        assert_eq!(decoded.backend, "b");
    }

    #[test]
    fn exhausted_chain_is_decode_unavailable_with_hint() {
        let a = std::sync::Arc::new(MockDecoder::declining("a"));
        let b = std::sync::Arc::new(MockDecoder::failing("b"));
        let err = match chain_of(&[a, b]).decode(Path::new("/x.cr3"), "cr3", RawDecodeMode::Display8) {
            Err(e) => e,
            Ok(_) => panic!("expected failure"),
        };
        match &err {
            EngineError::DecodeUnavailable { extension, attempts } => {
                assert_eq!(extension, "cr3");
                assert_eq!(attempts.len(), 2);
                assert!(attempts[0].starts_with("a:"));
                assert!(attempts[1].contains("sensor data corrupt"));
            }
            other => panic!("unexpected {other:?}"),
        }
        let message = err.to_string();
        assert!(message.contains(".cr3"));
        assert!(message.contains(crate::error::PRECONVERT_HINT));
        assert!(!message.contains("sensor data corrupt"));
    }

    #[test]
    fn empty_chain_is_decode_unavailable() {
        let chain = DecoderChain::default();
        assert!(chain.is_empty());
        assert!(matches!(
            chain.decode(Path::new("/x.dng"), "dng", RawDecodeMode::Display8),
            Err(EngineError::DecodeUnavailable { .. })
        ));
    }

    #[test]
    fn dimensions_use_probe_then_header() {
        let a = std::sync::Arc::new(MockDecoder::working("a"));
        let dims = chain_of(&[a.clone()]).dimensions(Path::new("/x.orf"), "orf").unwrap();
        assert_eq!(dims, (64, 48));
        assert!(
            !a.get_calls()
                .iter()
                .any(|c| matches!(c, RecordedCall::Decode(..)))
        );
    }

    #[test]
    fn orientation_travels_with_the_raster() {
        let a = std::sync::Arc::new(MockDecoder::rotated("a", Orientation::Rotate90));
        let decoded = chain_of(&[a])
            .decode(Path::new("/x.cr2"), "cr2", RawDecodeMode::Display8)
            .unwrap();
        assert_eq!(decoded.orientation, Orientation::Rotate90);
        assert_eq!(decoded.image.width(), 64);
    }

    #[test]
    fn exif_tags_map_to_orientation() {
        assert_eq!(exif_orientation(Some(6)), Orientation::Rotate90);
        assert_eq!(exif_orientation(Some(8)), Orientation::Rotate270);
        assert_eq!(exif_orientation(Some(1)), Orientation::NoTransforms);
        assert_eq!(exif_orientation(Some(0)), Orientation::NoTransforms);
        assert_eq!(exif_orientation(Some(300)), Orientation::NoTransforms);
        assert_eq!(exif_orientation(None), Orientation::NoTransforms);
    }

    #[test]
    fn names_in_order() {
        let chain = chain_of(&[
            std::sync::Arc::new(MockDecoder::working("first")),
            std::sync::Arc::new(MockDecoder::working("second")),
        ]);
        assert_eq!(chain.names(), vec!["first", "second"]);
    }
}
