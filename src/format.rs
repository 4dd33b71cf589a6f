//! Format classification by filename extension.
//!
//! Classification never reads file contents. The extension is lowercased and
//! aliases are folded (`jpg` → `jpeg`, `tif` → `tiff`), so `IMG.CR2` and
//! `img.cr2` classify identically. Anything not listed here is
//! [`EngineError::UnsupportedFormat`] and must not reach a decoder.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// RAW camera formats, named after their usual extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawKind {
    Cr2,
    Cr3,
    Crw,
    Nef,
    Nrw,
    Arw,
    Srf,
    Sr2,
    Dng,
    Orf,
    Rw2,
    Raf,
    Pef,
    Srw,
    Rwl,
    Iiq,
    #[serde(rename = "3fr")]
    ThreeFr,
    Erf,
    Kdc,
    Dcr,
    Mrw,
    Mos,
    X3f,
}

const RAW_EXTENSIONS: &[(&str, RawKind)] = &[
    ("cr2", RawKind::Cr2),
    ("cr3", RawKind::Cr3),
    ("crw", RawKind::Crw),
    ("nef", RawKind::Nef),
    ("nrw", RawKind::Nrw),
    ("arw", RawKind::Arw),
    ("srf", RawKind::Srf),
    ("sr2", RawKind::Sr2),
    ("dng", RawKind::Dng),
    ("orf", RawKind::Orf),
    ("rw2", RawKind::Rw2),
    ("raf", RawKind::Raf),
    ("pef", RawKind::Pef),
    ("srw", RawKind::Srw),
    ("rwl", RawKind::Rwl),
    ("iiq", RawKind::Iiq),
    ("3fr", RawKind::ThreeFr),
    ("erf", RawKind::Erf),
    ("kdc", RawKind::Kdc),
    ("dcr", RawKind::Dcr),
    ("mrw", RawKind::Mrw),
    ("mos", RawKind::Mos),
    ("x3f", RawKind::X3f),
];

impl RawKind {
    pub fn extension(self) -> &'static str {
        RAW_EXTENSIONS
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(ext, _)| *ext)
            .unwrap_or("raw")
    }
}

/// Canonical format id for an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatId {
    Jpeg,
    Png,
    Webp,
    Avif,
    Tiff,
    Svg,
    Raw(RawKind),
}

impl FormatId {
    pub fn family(self) -> FormatFamily {
        match self {
            Self::Raw(_) => FormatFamily::Raw,
            _ => FormatFamily::Standard,
        }
    }

    /// Canonical extension (`jpeg`, `tiff`, `cr2`, ...).
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Avif => "avif",
            Self::Tiff => "tiff",
            Self::Svg => "svg",
            Self::Raw(kind) => kind.extension(),
        }
    }

    /// Whether the raster pipeline can decode this format.
    ///
    /// SVG is recognised so callers get a precise error, but it is a vector
    /// format and never enters the raster pipeline.
    pub fn is_raster(self) -> bool {
        !matches!(self, Self::Svg)
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatFamily {
    Raw,
    Standard,
}

/// Result of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub family: FormatFamily,
    pub format: FormatId,
}

/// Formats the encoder can produce. One variant per encoder; the parameter
/// builder matches on this exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
    Tiff,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Jpeg,
        OutputFormat::Png,
        OutputFormat::Webp,
        OutputFormat::Avif,
        OutputFormat::Tiff,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Avif => "avif",
            Self::Tiff => "tiff",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match classify_extension(ext).ok()?.format {
            FormatId::Jpeg => Some(Self::Jpeg),
            FormatId::Png => Some(Self::Png),
            FormatId::Webp => Some(Self::Webp),
            FormatId::Avif => Some(Self::Avif),
            FormatId::Tiff => Some(Self::Tiff),
            FormatId::Svg | FormatId::Raw(_) => None,
        }
    }

    /// Infer the output format from a path such as `out/photo.webp`.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Avif => "avif",
            Self::Tiff => "tiff",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_extension(s).ok_or_else(|| {
            EngineError::UnsupportedFormat(format!("'{s}' is not an output format"))
        })
    }
}

/// Classify a bare extension (with or without a leading dot).
pub fn classify_extension(ext: &str) -> Result<Classification> {
    let ext = ext.trim_start_matches('.').to_ascii_lowercase();
    let format = match ext.as_str() {
        "jpg" | "jpeg" | "jpe" => FormatId::Jpeg,
        "png" => FormatId::Png,
        "webp" => FormatId::Webp,
        "avif" => FormatId::Avif,
        "tif" | "tiff" => FormatId::Tiff,
        "svg" => FormatId::Svg,
        other => RAW_EXTENSIONS
            .iter()
            .find(|(raw_ext, _)| *raw_ext == other)
            .map(|(_, kind)| FormatId::Raw(*kind))
            .ok_or_else(|| {
                if other.is_empty() {
                    EngineError::UnsupportedFormat("file has no extension".into())
                } else {
                    EngineError::UnsupportedFormat(format!(".{other} files are not supported"))
                }
            })?,
    };
    Ok(Classification {
        family: format.family(),
        format,
    })
}

/// Classify a filename or path by its extension.
pub fn classify(filename: impl AsRef<Path>) -> Result<Classification> {
    let ext = filename
        .as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    classify_extension(ext)
}
