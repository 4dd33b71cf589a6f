//! Engine configuration.
//!
//! Process-wide codec settings (worker pool size, encoder threads, RAW decode
//! cache) plus the defaults for deadlines, the RAW quality band and the
//! target-size solver. An [`EngineConfig`] is built once at startup and handed
//! to [`Engine::new`](crate::Engine::new); nothing mutates it afterwards.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [codec]
//! # max_workers = 4    # Shared worker pool (omit for auto = CPU cores)
//! threads = 1          # Threads a single encoder call may use
//! cache_items = 8      # RAW decode cache entries
//!
//! [limits]
//! deadline_ms = 30000
//! metrics_timeout_ms = 10000
//!
//! [raw]
//! min_quality = 75
//! max_quality = 95
//! external_fallback = true
//!
//! [solver]
//! initial_quality = 75
//! tolerance = 0.10
//! max_iterations = 4
//! min_quality = 10
//! max_quality = 95
//! ```
//!
//! Config files are sparse: override just the values you want. Unknown keys
//! are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Engine configuration loaded from TOML.
///
/// All fields have defaults; a config file only needs the values it changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Shared codec resources.
    pub codec: CodecConfig,
    /// Deadlines.
    pub limits: LimitsConfig,
    /// Two-stage RAW path.
    pub raw: RawConfig,
    /// Target-size solver defaults.
    pub solver: SolverConfig,
}

impl EngineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.codec.max_workers == Some(0) {
            return Err(ConfigError::Validation(
                "codec.max_workers must be at least 1".into(),
            ));
        }
        if self.codec.threads == 0 {
            return Err(ConfigError::Validation(
                "codec.threads must be at least 1".into(),
            ));
        }
        if self.limits.deadline_ms == 0 || self.limits.metrics_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "limits must be greater than zero".into(),
            ));
        }
        validate_band("raw", self.raw.min_quality, self.raw.max_quality)?;
        validate_band("solver", self.solver.min_quality, self.solver.max_quality)?;
        if !(1..=100).contains(&self.solver.initial_quality) {
            return Err(ConfigError::Validation(
                "solver.initial_quality must be 1-100".into(),
            ));
        }
        if self.solver.max_iterations == 0 {
            return Err(ConfigError::Validation(
                "solver.max_iterations must be at least 1".into(),
            ));
        }
        if !(self.solver.tolerance > 0.0 && self.solver.tolerance < 1.0) {
            return Err(ConfigError::Validation(
                "solver.tolerance must be between 0 and 1 (exclusive)".into(),
            ));
        }
        Ok(())
    }
}

fn validate_band(section: &str, min: u8, max: u8) -> Result<(), ConfigError> {
    if min == 0 || max > 100 {
        return Err(ConfigError::Validation(format!(
            "{section} qualities must be 1-100"
        )));
    }
    if min > max {
        return Err(ConfigError::Validation(format!(
            "{section}.min_quality ({min}) exceeds {section}.max_quality ({max})"
        )));
    }
    Ok(())
}

/// Shared codec resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodecConfig {
    /// Size of the shared worker pool every decode/encode runs on.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_workers: Option<usize>,
    /// Threads a single encoder invocation may use internally.
    pub threads: usize,
    /// Entries in the bounded RAW decode cache. Zero disables it.
    pub cache_items: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_workers: None,
            threads: 1,
            cache_items: 8,
        }
    }
}

/// Resolve the effective worker count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (config can constrain down, not up)
pub fn effective_workers(config: &CodecConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_workers.map(|n| n.min(cores)).unwrap_or(cores)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Deadline applied to requests that do not carry their own.
    pub deadline_ms: u64,
    /// Budget for best-effort quality assessment.
    pub metrics_timeout_ms: u64,
}

impl LimitsConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn metrics_timeout(&self) -> Duration {
        Duration::from_millis(self.metrics_timeout_ms)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 30_000,
            metrics_timeout_ms: 10_000,
        }
    }
}

/// RAW inputs are re-encoded inside this quality band whatever the caller asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawConfig {
    pub min_quality: u8,
    pub max_quality: u8,
    /// Fall back to an external converter when the built-in decoder cannot
    /// handle a file.
    pub external_fallback: bool,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            min_quality: 75,
            max_quality: 95,
            external_fallback: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    pub initial_quality: u8,
    /// Accept when `|size - target| / target` drops below this.
    pub tolerance: f64,
    pub max_iterations: u32,
    /// Default bounds for callers that do not pass their own.
    pub min_quality: u8,
    pub max_quality: u8,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            initial_quality: 75,
            tolerance: 0.10,
            max_iterations: 4,
            min_quality: 10,
            max_quality: 95,
        }
    }
}

/// Parse and validate a config from TOML text.
pub fn parse_config(text: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

/// Load config from a TOML file.
///
/// Returns the defaults when `path` is `None`. A path that does not exist
/// is an error: an explicitly requested config file must be present.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    match path {
        None => Ok(EngineConfig::default()),
        Some(path) => parse_config(&fs::read_to_string(path)?),
    }
}

/// Returns a fully-commented stock config with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# squish engine configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# ---------------------------------------------------------------------------
# Shared codec resources (read once at startup)
# ---------------------------------------------------------------------------
[codec]
# Worker pool shared by every decode/encode call.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_workers = 4

# Threads a single encoder call may use. Keep at 1 so concurrent requests
# share CPU predictably.
threads = 1

# Bounded cache for RAW decode intermediates (entries). 0 disables it.
cache_items = 8

# ---------------------------------------------------------------------------
# Deadlines
# ---------------------------------------------------------------------------
[limits]
# Applied to requests that do not set their own deadline.
deadline_ms = 30000

# Budget for best-effort quality assessment after compression.
metrics_timeout_ms = 10000

# ---------------------------------------------------------------------------
# RAW inputs
# ---------------------------------------------------------------------------
[raw]
# RAW files are decoded to a lossless intermediate, then re-encoded with the
# requested quality clamped into this band.
min_quality = 75
max_quality = 95

# Try an external converter (ImageMagick) when the built-in decoder fails.
external_fallback = true

# ---------------------------------------------------------------------------
# Target-size solver
# ---------------------------------------------------------------------------
[solver]
initial_quality = 75

# Accept a result within this fraction of the target size.
tolerance = 0.10

max_iterations = 4

# Default quality bounds when the caller passes none.
min_quality = 10
max_quality = 95
"##
}
