//! Shared fixtures: synthetic ROM image builder and a test catalog.

use ecuscan::bytes::{load_u32, store_u32};
use ecuscan::checksum::sum32;
use ecuscan::{Features, FidType};

/// Catalog used by the end-to-end scenarios. Layouts match the builder:
/// RAMF fields at +4/+8/+0x0C/+0x10/+0x14, ECUREC record fields at
/// +0/+4/+8/+0x0C/+0x10.
pub static TEST_CATALOG: &[FidType] = &[
    FidType {
        name: "test 512k plain",
        cpu: *b"SH7055S1",
        rom_size: 512 * 1024,
        fid_size: 0x5C,
        ramf_header: 0xFFFF_8000,
        ramf_maxdist: 0x20,
        p_ramjump: 4,
        p_ram_dlamax: 8,
        packs_start: 0,
        packs_end: 0,
        p_ivt2: 0,
        p_ecurec: 0,
        p_romend: 0,
        ivt2_expected: 0,
        features: Features::STD_CKS,
    },
    FidType {
        name: "test 512k altcks",
        cpu: *b"SH7055S2",
        rom_size: 512 * 1024,
        fid_size: 0x5C,
        ramf_header: 0xFFFF_8000,
        ramf_maxdist: 0x20,
        p_ramjump: 4,
        p_ram_dlamax: 8,
        packs_start: 0x0C,
        packs_end: 0x10,
        p_ivt2: 0x14,
        p_ecurec: 0,
        p_romend: 0,
        ivt2_expected: 0x8000,
        features: Features::STD_CKS
            .with(Features::ALT_CKS)
            .with(Features::IVT2),
    },
    FidType {
        name: "test 1M ecurec",
        cpu: *b"SH72531T",
        rom_size: 1024 * 1024,
        fid_size: 0x68,
        ramf_header: 0,
        ramf_maxdist: 0,
        p_ramjump: 0,
        p_ram_dlamax: 0,
        packs_start: 0x04,
        packs_end: 0x08,
        p_ivt2: 0x0C,
        p_ecurec: 0,
        p_romend: 0x10,
        ivt2_expected: 0x0007_FF00,
        features: Features::ALT_CKS
            .with(Features::ALT2_CKS)
            .with(Features::ECUREC)
            .with(Features::IVT2),
    },
];

/// Canonical reset stack pointer used in the synthetic vector tables.
pub const CANON_SP: u32 = 0xFFFF_7FFC;

/// Builder for synthetic ROM images.
///
/// A fresh image is filled with distinct pseudo-random words (a fixed
/// multiplicative hash of the offset) so that stray marker strings or
/// checksum-value collisions cannot occur by accident.
pub struct ImageBuilder {
    buf: Vec<u8>,
}

impl ImageBuilder {
    pub fn new(size: usize) -> Self {
        assert_eq!(size % 4, 0);
        let mut buf = vec![0u8; size];
        let mut off = 0usize;
        while off < size {
            let word = (off as u32).wrapping_mul(0x9E37_79B1);
            store_u32(&mut buf, off, word).unwrap();
            off += 4;
        }
        Self { buf }
    }

    pub fn put(&mut self, off: usize, val: u32) -> &mut Self {
        store_u32(&mut self.buf, off, val).unwrap();
        self
    }

    pub fn bytes(&mut self, off: usize, data: &[u8]) -> &mut Self {
        self.buf[off..off + data.len()].copy_from_slice(data);
        self
    }

    /// LOADER struct: tag+version, CPU string, DATABASE marker.
    pub fn loader(&mut self, at: usize, version: &[u8; 2], cpu: &[u8; 8]) -> &mut Self {
        self.bytes(at, b"LOADER");
        self.bytes(at + 6, version);
        self.bytes(at + 8, cpu);
        self.bytes(at + 16, b"DATABASE");
        self.put(at + 24, 0).put(at + 28, 0)
    }

    /// FID base struct: ID string, DATABASE marker, CPU string.
    pub fn fid(&mut self, at: usize, fid: &[u8; 16], cpu: &[u8; 8]) -> &mut Self {
        self.bytes(at, fid);
        self.bytes(at + 16, b"DATABASE");
        self.bytes(at + 24, cpu)
    }

    /// RAMF struct with the test-catalog field layout.
    pub fn ramf(
        &mut self,
        at: usize,
        acstart: Option<u32>,
        acend: Option<u32>,
        ivt2: Option<u32>,
    ) -> &mut Self {
        self.put(at, 0xFFFF_8000);
        self.put(at + 4, 0xFFFF_6000); // RAM jump entry
        self.put(at + 8, 0xFFFF_7000); // download area limit
        if let Some(v) = acstart {
            self.put(at + 0x0C, v);
        }
        if let Some(v) = acend {
            self.put(at + 0x10, v);
        }
        if let Some(v) = ivt2 {
            self.put(at + 0x14, v);
        }
        self
    }

    /// Canonical vector table: reset pairs then zero padding.
    pub fn ivt(&mut self, at: usize) -> &mut Self {
        let mut off = at;
        while off < at + 0x100 {
            self.put(off, 0);
            off += 4;
        }
        self.put(at, 0x0000_0104);
        self.put(at + 4, CANON_SP);
        self.put(at + 8, 0x0000_0104);
        self.put(at + 12, CANON_SP)
    }

    /// Fold the alt-checksum block (with the historical end rounding)
    /// and embed the resulting words at the given slots.
    pub fn embed_altcks(
        &mut self,
        start: usize,
        end: usize,
        slot_sum: usize,
        slot_xor: usize,
    ) -> &mut Self {
        let bsize = ((end + 1 - start) & !3) + 4;
        let (sum, xor) = sum32(&self.buf[start..start + bsize]);
        self.put(slot_sum, sum).put(slot_xor, xor)
    }

    /// Embed a valid alt2 pair for the suffix starting at `base`,
    /// skipping the word at `skip_abs`.
    pub fn embed_alt2(
        &mut self,
        base: usize,
        slot_sum: usize,
        slot_xor: usize,
        skip_abs: usize,
    ) -> &mut Self {
        self.put(slot_sum, 0).put(slot_xor, 0);
        let mut sum = 0u32;
        let mut xor = 0u32;
        let mut off = base;
        while off + 4 <= self.buf.len() {
            if off != skip_abs {
                let word = load_u32(&self.buf, off).unwrap();
                sum = sum.wrapping_add(word);
                xor ^= word;
            }
            off += 4;
        }
        self.put(slot_sum, sum).put(slot_xor, xor)
    }

    /// Embed the standard whole-image pair. Call last: any later edit
    /// invalidates it.
    pub fn embed_std(&mut self, slot_sum: usize, slot_xor: usize) -> &mut Self {
        self.put(slot_sum, 0).put(slot_xor, 0);
        let (sum, xor) = sum32(&self.buf);
        self.put(slot_sum, sum).put(slot_xor, xor)
    }

    pub fn build(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }
}
