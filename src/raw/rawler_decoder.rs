//! In-process RAW backend built on `rawler`.

use super::{RawDecodeMode, RawDecoder, RawFrame, exif_orientation};
use crate::error::{EngineError, Result};
use image::DynamicImage;
use rawler::decoders::RawDecodeParams;
use rawler::imgop::develop::{ProcessingStep, RawDevelop};
use rawler::rawsource::RawSource;
use std::path::Path;

const NAME: &str = "rawler";

/// Demosaic, white balance and colour calibration via `rawler`.
#[derive(Debug, Default)]
pub struct RawlerDecoder;

impl RawlerDecoder {
    pub fn new() -> Self {
        Self
    }
}

fn fail(err: impl std::fmt::Display) -> EngineError {
    EngineError::conversion(NAME, err.to_string())
}

impl RawDecoder for RawlerDecoder {
    fn name(&self) -> &str {
        NAME
    }

    fn can_decode(&self, path: &Path) -> bool {
        RawSource::new(path)
            .map(|source| rawler::get_decoder(&source).is_ok())
            .unwrap_or(false)
    }

    fn decode(&self, path: &Path, mode: RawDecodeMode) -> Result<RawFrame> {
        let source = RawSource::new(path).map_err(fail)?;
        let decoder = rawler::get_decoder(&source).map_err(fail)?;
        let params = RawDecodeParams::default();
        let raw = decoder.raw_image(&source, &params, false).map_err(fail)?;

        // Most decoders leave RawImage.orientation at Normal; the EXIF tag
        // is the authoritative source when present.
        let tag = decoder
            .raw_metadata(&source, &params)
            .ok()
            .and_then(|meta| meta.exif.orientation)
            .or_else(|| Some(raw.orientation.to_u16()));
        let orientation = exif_orientation(tag);

        let mut develop = RawDevelop::default();
        if mode == RawDecodeMode::Linear16 {
            develop.steps.retain(|step| !matches!(step, ProcessingStep::SRgb));
        }
        let developed = develop.develop_intermediate(&raw).map_err(fail)?;
        let image = developed
            .to_dynamic_image()
            .ok_or_else(|| fail("developed image has an unsupported channel layout"))?;

        let image = match mode {
            RawDecodeMode::Display8 => DynamicImage::ImageRgb8(image.to_rgb8()),
            RawDecodeMode::Linear16 => DynamicImage::ImageRgb16(image.to_rgb16()),
        };
        Ok(RawFrame { image, orientation })
    }

    fn dimensions(&self, path: &Path) -> Result<(u32, u32)> {
        let source = RawSource::new(path).map_err(fail)?;
        let decoder = rawler::get_decoder(&source).map_err(fail)?;
        // A dummy decode parses headers only.
        let raw = decoder
            .raw_image(&source, &RawDecodeParams::default(), true)
            .map_err(fail)?;
        let width = u32::try_from(raw.width).map_err(fail)?;
        let height = u32::try_from(raw.height).map_err(fail)?;
        Ok((width, height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rejects_non_raw_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fake.cr2");
        std::fs::write(&path, b"this is not a camera file").unwrap();

        let decoder = RawlerDecoder::new();
        assert!(!decoder.can_decode(&path));
        assert!(matches!(
            decoder.decode(&path, RawDecodeMode::Display8),
            Err(EngineError::ConversionFailure { .. })
        ));
    }

    #[test]
    fn missing_file_is_not_decodable() {
        assert!(!RawlerDecoder::new().can_decode(Path::new("/nonexistent/x.nef")));
    }
}
