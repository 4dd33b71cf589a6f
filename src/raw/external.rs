//! General-purpose conversion tool fallback (ImageMagick).
//!
//! Used only when the in-process backend declines or fails. The tool writes
//! PNG to stdout, which is decoded in memory; nothing touches disk.

use super::{RawDecodeMode, RawDecoder, RawFrame};
use crate::error::{EngineError, Result};
use crate::format::FormatId;
use crate::imaging::codec::decode_bytes;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const NAME: &str = "imagemagick";

/// ImageMagick invocation style.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Flavor {
    /// IM7: `magick <in> ...` and `magick identify ...`.
    Magick(PathBuf),
    /// IM6: separate `convert` and `identify` binaries.
    Legacy { convert: PathBuf, identify: PathBuf },
}

#[derive(Debug, Clone)]
pub struct ExternalToolDecoder {
    flavor: Flavor,
}

impl ExternalToolDecoder {
    /// Locate ImageMagick on `PATH`, preferring the IM7 entry point.
    pub fn detect() -> Option<Self> {
        if let Ok(magick) = which::which("magick") {
            return Some(Self {
                flavor: Flavor::Magick(magick),
            });
        }
        match (which::which("convert"), which::which("identify")) {
            (Ok(convert), Ok(identify)) => Some(Self {
                flavor: Flavor::Legacy { convert, identify },
            }),
            _ => None,
        }
    }

    fn convert_command(&self) -> Command {
        match &self.flavor {
            Flavor::Magick(bin) => Command::new(bin),
            Flavor::Legacy { convert, .. } => Command::new(convert),
        }
    }

    fn identify_command(&self) -> Command {
        match &self.flavor {
            Flavor::Magick(bin) => {
                let mut cmd = Command::new(bin);
                cmd.arg("identify");
                cmd
            }
            Flavor::Legacy { identify, .. } => Command::new(identify),
        }
    }

    fn identify(&self, path: &Path) -> Result<(u32, u32)> {
        let output = self
            .identify_command()
            .args(["-ping", "-format", "%w %h\n"])
            .arg(path)
            .output()?;
        let stdout = checked(output)?;
        parse_dimensions(&String::from_utf8_lossy(&stdout))
            .ok_or_else(|| EngineError::conversion(NAME, "identify printed no dimensions"))
    }
}

/// Turn a non-zero exit into a `ConversionFailure` carrying stderr.
fn checked(output: Output) -> Result<Vec<u8>> {
    if output.status.success() {
        return Ok(output.stdout);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let detail = stderr.lines().next().unwrap_or("").trim();
    Err(EngineError::conversion(
        NAME,
        format!("exited with {}: {detail}", output.status),
    ))
}

/// First line of `identify -format "%w %h"` output. Multi-frame files print
/// one line per frame.
fn parse_dimensions(text: &str) -> Option<(u32, u32)> {
    let mut parts = text.lines().next()?.split_whitespace();
    let width = parts.next()?.parse().ok()?;
    let height = parts.next()?.parse().ok()?;
    Some((width, height))
}

/// Rendering arguments. `Linear16` skips auto-levelling and keeps a linear
/// colourspace.
fn render_args(mode: RawDecodeMode) -> &'static [&'static str] {
    match mode {
        RawDecodeMode::Display8 => &["-auto-level", "-depth", "8"],
        RawDecodeMode::Linear16 => &["-colorspace", "RGB", "-depth", "16"],
    }
}

impl RawDecoder for ExternalToolDecoder {
    fn name(&self) -> &str {
        NAME
    }

    fn can_decode(&self, path: &Path) -> bool {
        self.identify(path).is_ok()
    }

    fn decode(&self, path: &Path, mode: RawDecodeMode) -> Result<RawFrame> {
        let mut cmd = self.convert_command();
        // `[0]` selects the main image, not an embedded preview.
        let mut input = path.as_os_str().to_owned();
        input.push("[0]");
        cmd.arg(input).args(render_args(mode)).arg("png:-");
        let png = checked(cmd.output()?)?;
        decode_bytes(&png, FormatId::Png, false).map(RawFrame::from)
    }

    fn dimensions(&self, path: &Path) -> Result<(u32, u32)> {
        self.identify(path)
    }
}
