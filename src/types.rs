//! Core types for the ROM analyzer.
//!
//! [`RomFile`] is the analysis record: the owned image plus everything
//! the recovery pipeline managed to locate. Offsets that could not be
//! recovered stay `None`; downstream renderers map that back to the
//! `0xFFFFFFFF` sentinel the on-disk tooling ecosystem expects.

use serde::Serialize;
use std::ops::Range;

use crate::catalog::FidType;

/// Smallest known ROM image (SH7050 class).
pub const MIN_ROMSIZE: usize = 128 * 1024;

/// Largest supported ROM image.
pub const MAX_ROMSIZE: usize = 2048 * 1024;

/// Sentinel value for an unknown offset in rendered output.
pub const UNKNOWN_OFFSET: u32 = u32::MAX;

/// Byte offsets of the fixed fields inside the LOADER struct.
pub mod loader_layout {
    /// `"LOADER"` tag plus two ASCII version digits.
    pub const TAG: usize = 0;
    /// 8-byte CPU string.
    pub const CPU: usize = 8;
    /// `"DATABASE"` marker.
    pub const DATABASE: usize = 16;
    /// Total struct size.
    pub const SIZE: usize = 32;
}

/// Byte offsets of the fixed fields inside the FID base struct.
///
/// Only the head of the struct is fixed across variants; the full size
/// comes from the catalog entry.
pub mod fid_layout {
    /// Firmware ID string.
    pub const FID: usize = 0;
    /// Firmware ID string length.
    pub const FID_LEN: usize = 16;
    /// `"DATABASE"` marker.
    pub const DATABASE: usize = 16;
    /// 8-byte CPU string.
    pub const CPU: usize = 24;
    /// CPU string length.
    pub const CPU_LEN: usize = 8;
    /// Upper bound on any variant's FID struct size, for tail checks.
    pub const MAX_SIZE: usize = 128;
}

/// Diagnostic sink: the core reports every diagnostic line through this
/// callback and never writes to a file or stream itself.
pub type DiagSink<'a> = dyn FnMut(&str) + 'a;

/// Options controlling an analysis run.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzeOptions<'a> {
    /// Catalog of known ROM variants to match the FID CPU string against.
    pub catalog: &'a [FidType],
    /// Proceed past an image-size violation. Per-read bounds checks stay
    /// mandatory either way.
    pub force: bool,
}

impl Default for AnalyzeOptions<'_> {
    fn default() -> Self {
        Self {
            catalog: crate::catalog::BUILTIN,
            force: false,
        }
    }
}

/// Analysis record for one ROM image.
///
/// Created by the analyzer facade; filled in stage by stage by the
/// recovery pipeline. Every offset field is `None` until (and unless)
/// its stage succeeds.
#[derive(Debug, Serialize)]
pub struct RomFile {
    #[serde(skip)]
    image: Vec<u8>,
    filename: String,

    /// Offset of the LOADER struct.
    pub p_loader: Option<u32>,
    /// Parsed LOADER version number (e.g. 80).
    pub loader_version: Option<u8>,

    /// Offset of the FID base struct.
    pub p_fid: Option<u32>,
    /// Selected catalog entry.
    pub fidtype: Option<FidType>,

    /// Offset of the RAMF struct (drift-adjusted).
    pub p_ramf: Option<u32>,
    /// Signed drift of RAMF from its nominal position.
    pub ramf_offset: i32,
    /// RAM-jump entry pointer parsed from RAMF.
    pub ramjump: Option<u32>,
    /// RAM download-area limit parsed from RAMF.
    pub ram_dlamax: Option<u32>,

    /// Offset of the secondary vector table.
    pub p_ivt2: Option<u32>,
    /// Confidence grade for the IVT2 position (0, 50, 75 or 99).
    pub ivt2_confidence: u8,
    /// Best candidate from the brute-force IVT2 scan, when the parsed
    /// pointer did not validate.
    pub ivt2_guess: Option<u32>,

    /// ECUREC position (pointer target for ECUREC variants, or the
    /// parsed RAMF field otherwise).
    pub p_ecurec: Option<u32>,

    /// Standard checksum located and valid.
    pub cks_std_good: bool,
    /// Position of the standard checksum sum word.
    pub p_cks: Option<u32>,
    /// Position of the standard checksum xor word.
    pub p_ckx: Option<u32>,

    /// Alternate checksum block validated.
    pub cks_alt_good: bool,
    /// Position of the alternate checksum sum word.
    pub p_acs: Option<u32>,
    /// Position of the alternate checksum xor word.
    pub p_acx: Option<u32>,
    /// Start of the alternate checksum block.
    pub p_acstart: Option<u32>,
    /// End of the alternate checksum block (inclusive bound as stored).
    pub p_acend: Option<u32>,

    /// Second alternate checksum located.
    pub cks_alt2_good: bool,
    /// Position of the alt2 checksum sum word.
    pub p_a2cs: Option<u32>,
    /// Position of the alt2 checksum xor word.
    pub p_a2cx: Option<u32>,
    /// Start of the alt2 checksum block.
    pub p_ac2start: Option<u32>,

    /// RIPEMD-160 initialization constants present in the image.
    pub has_rm160: bool,

    #[serde(skip)]
    loader_cpu: Option<Range<usize>>,
    #[serde(skip)]
    fid: Option<Range<usize>>,
    #[serde(skip)]
    fid_cpu: Option<Range<usize>>,
}

impl RomFile {
    /// Wrap an image buffer into an empty analysis record.
    pub fn new(image: Vec<u8>, filename: impl Into<String>) -> Self {
        Self {
            image,
            filename: filename.into(),
            p_loader: None,
            loader_version: None,
            p_fid: None,
            fidtype: None,
            p_ramf: None,
            ramf_offset: 0,
            ramjump: None,
            ram_dlamax: None,
            p_ivt2: None,
            ivt2_confidence: 0,
            ivt2_guess: None,
            p_ecurec: None,
            cks_std_good: false,
            p_cks: None,
            p_ckx: None,
            cks_alt_good: false,
            p_acs: None,
            p_acx: None,
            p_acstart: None,
            p_acend: None,
            cks_alt2_good: false,
            p_a2cs: None,
            p_a2cx: None,
            p_ac2start: None,
            has_rm160: false,
            loader_cpu: None,
            fid: None,
            fid_cpu: None,
        }
    }

    /// The raw image bytes.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Mutable image bytes, for the checksum fixer write path.
    pub fn image_mut(&mut self) -> &mut [u8] {
        &mut self.image
    }

    /// Image size in bytes.
    pub fn len(&self) -> usize {
        self.image.len()
    }

    /// True when the image buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    /// Filename label the record was created with.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// LOADER CPU string slice, when the loader was found.
    pub fn loader_cpu(&self) -> Option<&[u8]> {
        self.slice(&self.loader_cpu)
    }

    /// Firmware ID string slice, when the FID struct was found.
    pub fn fid_str(&self) -> Option<&[u8]> {
        self.slice(&self.fid)
    }

    /// FID CPU string slice, when the FID struct was found.
    pub fn fid_cpu(&self) -> Option<&[u8]> {
        self.slice(&self.fid_cpu)
    }

    pub(crate) fn set_loader_cpu(&mut self, range: Range<usize>) {
        self.loader_cpu = self.clamped(range);
    }

    pub(crate) fn set_fid_str(&mut self, range: Range<usize>) {
        self.fid = self.clamped(range);
    }

    pub(crate) fn set_fid_cpu(&mut self, range: Range<usize>) {
        self.fid_cpu = self.clamped(range);
    }

    fn clamped(&self, range: Range<usize>) -> Option<Range<usize>> {
        (range.start <= range.end && range.end <= self.image.len()).then_some(range)
    }

    fn slice(&self, range: &Option<Range<usize>>) -> Option<&[u8]> {
        range.as_ref().map(|r| &self.image[r.clone()])
    }
}

/// Render an optional offset the way the legacy tooling expects:
/// `0xFFFFFFFF` for unknown.
pub fn offset_or_sentinel(off: Option<u32>) -> u32 {
    off.unwrap_or(UNKNOWN_OFFSET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_blank() {
        let rf = RomFile::new(vec![0u8; 16], "test.bin");
        assert_eq!(rf.len(), 16);
        assert_eq!(rf.filename(), "test.bin");
        assert_eq!(rf.p_loader, None);
        assert_eq!(rf.ramf_offset, 0);
        assert!(!rf.cks_alt_good);
        assert!(rf.loader_cpu().is_none());
    }

    #[test]
    fn test_slice_ranges_clamped() {
        let mut rf = RomFile::new(vec![1, 2, 3, 4], "x");
        rf.set_fid_cpu(2..4);
        assert_eq!(rf.fid_cpu(), Some(&[3u8, 4u8][..]));
        rf.set_fid_cpu(2..8); // past end: dropped
        assert_eq!(rf.fid_cpu(), None);
    }

    #[test]
    fn test_offset_sentinel() {
        assert_eq!(offset_or_sentinel(Some(0x40)), 0x40);
        assert_eq!(offset_or_sentinel(None), UNKNOWN_OFFSET);
    }
}
