//! ECU ROM analyzer CLI.
//!
//! Analyzes raw firmware dumps and prints the recovered metadata as
//! human-readable text, CSV, or JSON.

use clap::{Parser, ValueEnum};
use md5::{Digest, Md5};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info};

use ecuscan::formatter::csv_header;
use ecuscan::{
    analyze_bytes_with, AnalyzeOptions, CsvFormatter, HumanFormatter, JsonFormatter, RomFormatter,
};

/// Analyze ECU firmware ROM dumps.
///
/// Recovers the LOADER and firmware-ID records, vector tables, and the
/// embedded checksum words from raw big-endian ROM images.
#[derive(Parser, Debug)]
#[command(name = "ecuscan")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// ROM image file(s) to analyze
    #[arg(required_unless_present = "headers")]
    files: Vec<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "human")]
    format: OutputFormat,

    /// Print the CSV column header line
    #[arg(short = 'l', long)]
    headers: bool,

    /// Force parsing, ignoring image size errors
    #[arg(long)]
    force: bool,

    /// Skip the MD5 digest of the image
    #[arg(long)]
    no_digest: bool,

    /// Verbose diagnostics on stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Output format options.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable name/value lines
    Human,
    /// One CSV row per image
    Csv,
    /// JSON object per image
    Json,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = if args.verbose {
        tracing_subscriber::EnvFilter::new("ecuscan=debug")
    } else {
        tracing_subscriber::EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    if args.headers {
        println!("{}", csv_header());
        if args.files.is_empty() {
            return ExitCode::SUCCESS;
        }
    }

    let opts = AnalyzeOptions {
        force: args.force,
        ..AnalyzeOptions::default()
    };

    let mut failures = 0usize;
    for path in &args.files {
        if let Err(err) = run_one(path, &args, &opts) {
            error!("{}: {err}", path.display());
            failures += 1;
        }
    }

    if failures > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn run_one(path: &Path, args: &Args, opts: &AnalyzeOptions) -> ecuscan::Result<()> {
    let data = std::fs::read(path)?;
    info!("analyzing {} ({} bytes)", path.display(), data.len());

    let digest = if args.no_digest {
        None
    } else {
        Some(hex_digest(&data))
    };

    let filename = path.to_string_lossy().into_owned();
    let rom = analyze_bytes_with(data, &filename, opts, &mut |line| debug!("{line}"))?;

    let output = match args.format {
        OutputFormat::Human => HumanFormatter.format_rom(&rom, digest.as_deref()),
        OutputFormat::Csv => CsvFormatter.format_rom(&rom, digest.as_deref()),
        OutputFormat::Json => JsonFormatter::default().format_rom(&rom, digest.as_deref()),
    };
    print!("{output}");
    Ok(())
}

/// MD5 of the whole image as lowercase hex.
fn hex_digest(data: &[u8]) -> String {
    let digest = Md5::digest(data);
    let mut out = String::with_capacity(32);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
