//! ECU ROM analyzer for big-endian automotive firmware images.
//!
//! This library recovers the metadata and integrity structures embedded
//! in raw firmware dumps of a family of 32-bit big-endian MCUs. The
//! positions of those structures are recorded nowhere in the image; they
//! are found by byte-pattern search, structure-shape heuristics, and
//! algebraic inversion of the checksum equations.
//!
//! # Features
//!
//! - **Checksum engine**: dual sum+xor fold, self-referential word
//!   location, alternate skip-aware variants, and a correction solver
//!   that forces any image region to a chosen checksum pair
//! - **Structural recovery**: staged discovery of the LOADER record,
//!   firmware-ID record, RAMF record, interrupt vector tables, and the
//!   ECUREC auxiliary record
//! - **Variant catalog**: static table of known MCU variants keyed by
//!   CPU tag, driving feature-dependent recovery
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use ecuscan::analyze_file;
//!
//! fn main() -> Result<(), ecuscan::RomError> {
//!     let rom = analyze_file("dumps/1MP2A.bin")?;
//!     if let Some(version) = rom.loader_version {
//!         println!("LOADER {version}");
//!     }
//!     println!("std checksum good: {}", rom.cks_std_good);
//!     Ok(())
//! }
//! ```
//!
//! Missing structures never abort an analysis: the returned [`RomFile`]
//! keeps the corresponding offsets unknown and downstream consumers
//! render them as absent. The only hard error is an image whose size is
//! implausible, and even that yields to [`AnalyzeOptions::force`].

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]

pub mod bytes;
pub mod catalog;
pub mod checksum;
pub mod error;
pub mod formatter;
pub mod ivt;
pub mod pipeline;
pub mod types;

pub use catalog::{Features, FidType};
pub use checksum::{checksum_alt2, checksum_fix, checksum_std, sum32, ChecksumPair, Correction};
pub use error::{Result, RomError};
pub use formatter::{CsvFormatter, HumanFormatter, JsonFormatter, RomFormatter};
pub use ivt::{check_ivt, find_ivt};
pub use types::{AnalyzeOptions, DiagSink, RomFile, MAX_ROMSIZE, MIN_ROMSIZE};

use std::path::Path;

/// Analyze a ROM image file.
///
/// Reads the whole file and runs the recovery pipeline with the built-in
/// catalog. Diagnostics are discarded; use [`analyze_bytes_with`] to
/// capture them.
pub fn analyze_file<P: AsRef<Path>>(path: P) -> Result<RomFile> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let filename = path.to_string_lossy().into_owned();
    analyze_bytes(data, &filename)
}

/// Analyze a ROM image already in memory.
///
/// Runs with the built-in catalog and default options; diagnostics are
/// discarded.
pub fn analyze_bytes(data: Vec<u8>, filename: &str) -> Result<RomFile> {
    analyze_bytes_with(data, filename, &AnalyzeOptions::default(), &mut |_| {})
}

/// Analyze a ROM image with explicit options and a diagnostic sink.
///
/// This is the full-control entry point: the caller supplies the variant
/// catalog, the force flag, and a callback that receives every
/// diagnostic line the pipeline emits.
///
/// # Example
///
/// ```rust
/// use ecuscan::{analyze_bytes_with, AnalyzeOptions};
///
/// let image = vec![0u8; ecuscan::MIN_ROMSIZE];
/// let mut log = Vec::new();
/// let rom = analyze_bytes_with(image, "blank.bin", &AnalyzeOptions::default(), &mut |line| {
///     log.push(line.to_owned());
/// })?;
/// assert!(rom.p_loader.is_none());
/// # Ok::<(), ecuscan::RomError>(())
/// ```
pub fn analyze_bytes_with(
    data: Vec<u8>,
    filename: &str,
    opts: &AnalyzeOptions,
    diag: &mut DiagSink,
) -> Result<RomFile> {
    pipeline::analyze(data, filename, opts, diag)
}

/// Get version information for this library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
