use clap::{Parser, Subcommand};
use squish::config;
use squish::imaging::{AlgorithmPreset, EncodeSettings, Quality, ResizeKernel, ResizeSpec};
use squish::{CompressionRequest, Engine, OutputFormat, QualityBounds, output};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Shared flags for commands that encode an image.
#[derive(clap::Args, Clone)]
struct EncodeArgs {
    /// Input image (raster or camera RAW)
    input: PathBuf,

    /// Output file; the format follows its extension unless --format is given
    output: PathBuf,

    /// Output format (jpeg, png, webp, avif, tiff)
    #[arg(long)]
    format: Option<OutputFormat>,

    /// Tuning preset: standard, aggressive, lossless, mozjpeg, progressive
    #[arg(long, default_value = "standard")]
    preset: AlgorithmPreset,

    /// Request progressive output where the format supports it
    #[arg(long)]
    progressive: bool,

    /// Fit inside this width (never upscales)
    #[arg(long)]
    width: Option<u32>,

    /// Fit inside this height (never upscales)
    #[arg(long)]
    height: Option<u32>,

    /// Resampling kernel: lanczos, bicubic, bilinear, nearest, none
    #[arg(long, default_value = "lanczos")]
    resize_kernel: ResizeKernel,

    /// Auto-rotate from EXIF orientation
    #[arg(long)]
    web_optimize: bool,

    /// Convert to 8-bit sRGB, drop alpha and stretch levels
    #[arg(long)]
    normalize_color: bool,

    /// Per-request deadline in milliseconds (default from config)
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Score the output against the input after encoding
    #[arg(long)]
    assess: bool,
}

#[derive(Parser)]
#[command(name = "squish")]
#[command(about = "Adaptive image compression with quality verification")]
#[command(long_about = "\
Adaptive image compression with quality verification

Decodes JPEG, PNG, WebP, AVIF, TIFF and camera RAW files, re-encodes them
with per-format tunings, optionally searches for a byte-size target, and
scores the result with PSNR and SSIM.

RAW files are developed to a lossless intermediate first. Their output
quality is held between raw.min_quality and raw.max_quality (75-95 by
default), and savings are reported against the intermediate size.

Logging goes to stderr and honours RUST_LOG (default: squish=info).

Run 'squish gen-config' to generate a documented squish.toml.")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Engine configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print results as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compress at a fixed quality
    Compress {
        #[command(flatten)]
        encode: EncodeArgs,

        /// Quality 1-100
        #[arg(short, long, default_value_t = 80)]
        quality: u32,
    },
    /// Search for the quality that lands near a byte size
    Target {
        #[command(flatten)]
        encode: EncodeArgs,

        /// Target size in bytes
        #[arg(long)]
        size: u64,

        /// Lowest quality the search may use (default from config)
        #[arg(long)]
        min_quality: Option<u8>,

        /// Highest quality the search may use (default from config)
        #[arg(long)]
        max_quality: Option<u8>,
    },
    /// Recommend settings from image metadata without encoding
    Analyze {
        input: PathBuf,
    },
    /// Score a compressed image against its original
    Assess {
        original: PathBuf,
        compressed: PathBuf,
    },
    /// Print a stock squish.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging();

    match &cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Compress { encode, quality } => {
            let engine = build_engine(&cli)?;
            let request = build_request(encode, *quality)?;
            let result = engine.compress(&request)?;
            let original = file_size(&encode.input);
            let metrics = encode
                .assess
                .then(|| engine.assess_quality_best_effort(&encode.input, &result.output));
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "result": result,
                        "metrics": metrics,
                    }))?
                );
            } else {
                output::print_compress_output(&result, original);
                if let Some(metrics) = &metrics {
                    output::print_assess_output(metrics);
                }
            }
        }
        Command::Target {
            encode,
            size,
            min_quality,
            max_quality,
        } => {
            let engine = build_engine(&cli)?;
            let defaults = QualityBounds::from_config(&engine.config().solver);
            let bounds = QualityBounds::new(
                min_quality.unwrap_or(defaults.min),
                max_quality.unwrap_or(defaults.max),
            );
            let request = build_request(encode, u32::from(Quality::default().value()))?;
            let result = engine.compress_to_target_size(&request, *size, bounds)?;
            let original = file_size(&encode.input);
            let metrics = encode
                .assess
                .then(|| engine.assess_quality_best_effort(&encode.input, &result.result.output));
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "result": result,
                        "metrics": metrics,
                    }))?
                );
            } else {
                output::print_target_output(&result, *size, original);
                if let Some(metrics) = &metrics {
                    output::print_assess_output(metrics);
                }
            }
        }
        Command::Analyze { input } => {
            let engine = build_engine(&cli)?;
            let analysis = engine.analyze(input)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            } else {
                output::print_analyze_output(input, &analysis);
            }
        }
        Command::Assess {
            original,
            compressed,
        } => {
            let engine = build_engine(&cli)?;
            let metrics = engine.assess_quality(original, compressed)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&metrics)?);
            } else {
                output::print_assess_output(&metrics);
            }
        }
    }

    Ok(())
}

fn build_engine(cli: &Cli) -> Result<Engine, Box<dyn std::error::Error>> {
    let engine_config = config::load_config(cli.config.as_deref())?;
    Ok(Engine::new(engine_config)?)
}

/// Install the stderr subscriber. `RUST_LOG` overrides the default filter.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("squish=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_request(args: &EncodeArgs, quality: u32) -> Result<CompressionRequest, Box<dyn std::error::Error>> {
    let format = match args.format {
        Some(format) => format,
        None => OutputFormat::from_path(&args.output).ok_or_else(|| {
            format!(
                "cannot infer output format from {}; pass --format",
                args.output.display()
            )
        })?,
    };
    let mut request = CompressionRequest::from_path(&args.input, &args.output, format)
        .with_settings(EncodeSettings {
            quality: Quality::new(quality),
            preset: args.preset,
            progressive: args.progressive,
            ..EncodeSettings::default()
        });
    let spec = ResizeSpec {
        width: args.width,
        height: args.height,
    };
    if !spec.is_empty() {
        request = request.with_resize(spec, args.resize_kernel);
    }
    if let Some(ms) = args.deadline_ms {
        request = request.with_deadline(Duration::from_millis(ms));
    }
    request.web_optimize = args.web_optimize;
    request.normalize_color = args.normalize_color;
    Ok(request)
}

fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}
