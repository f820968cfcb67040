//! Catalog of known MCU / ROM variants.
//!
//! Each catalog entry pins down one firmware layout: expected image size,
//! FID struct size, the RAMF header sentinel (or zero when the variant
//! carries no RAMF), field offsets inside RAMF or the ECUREC record, the
//! expected secondary vector table position, and a feature set that
//! drives the recovery pipeline.
//!
//! Lookup is by exact 8-byte CPU tag match against the FID CPU string.
//! The table is plain static data; callers may substitute their own.

use serde::Serialize;
use std::fmt;
use std::ops::BitOr;

/// Feature bits describing what a ROM variant carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Features(u32);

impl Features {
    /// No features.
    pub const NONE: Features = Features(0);
    /// Classical whole-image dual checksum present.
    pub const STD_CKS: Features = Features(1 << 0);
    /// Alternate checksum block bounded by start/end pointers.
    pub const ALT_CKS: Features = Features(1 << 1);
    /// Second alternate checksum anchored at the ECUREC record.
    pub const ALT2_CKS: Features = Features(1 << 2);
    /// No RAMF; bounds and IVT2 pointer live in a record near ROM end.
    pub const ECUREC: Features = Features(1 << 3);
    /// Secondary interrupt vector table present.
    pub const IVT2: Features = Features(1 << 4);

    /// True when every bit of `other` is set in `self`.
    pub fn contains(self, other: Features) -> bool {
        self.0 & other.0 == other.0
    }

    /// Combine two feature sets; usable in const context, unlike `|`.
    pub const fn with(self, other: Features) -> Features {
        Features(self.0 | other.0)
    }
}

impl BitOr for Features {
    type Output = Features;

    fn bitor(self, rhs: Features) -> Features {
        Features(self.0 | rhs.0)
    }
}

impl fmt::Display for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Features::STD_CKS, "STDCKS"),
            (Features::ALT_CKS, "ALTCKS"),
            (Features::ALT2_CKS, "ALT2CKS"),
            (Features::ECUREC, "ECUREC"),
            (Features::IVT2, "IVT2"),
        ];
        let mut first = true;
        for (bit, name) in names {
            if self.contains(bit) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        if first {
            write!(f, "-")?;
        }
        Ok(())
    }
}

/// Descriptor for one known ROM variant.
///
/// All `p_*` fields are byte offsets of pointer fields *inside* the RAMF
/// struct (or, for ECUREC variants, inside the ECUREC record). A zero
/// offset means the variant has no such field.
#[derive(Debug, Clone, Serialize)]
pub struct FidType {
    /// Human-readable variant label.
    pub name: &'static str,
    /// 8-byte CPU tag matched against the FID CPU string.
    #[serde(serialize_with = "serialize_cpu")]
    pub cpu: [u8; 8],
    /// Expected image size in bytes.
    pub rom_size: u32,
    /// Size of the FID base struct; RAMF follows immediately after.
    pub fid_size: u32,
    /// First word of RAMF, e.g. `0xFFFF8000`. Zero: variant has no RAMF.
    pub ramf_header: u32,
    /// Maximum drift of the RAMF struct from its nominal position.
    pub ramf_maxdist: u32,
    /// Offset of the RAM-jump entry pointer. Zero: absent.
    pub p_ramjump: u32,
    /// Offset of the RAM download-area limit pointer. Zero: absent.
    pub p_ram_dlamax: u32,
    /// Offset of the alt-checksum block start pointer.
    pub packs_start: u32,
    /// Offset of the alt-checksum block end pointer.
    pub packs_end: u32,
    /// Offset of the IVT2 pointer. Zero: absent.
    pub p_ivt2: u32,
    /// Offset of the ECUREC pointer inside RAMF. Zero: absent.
    pub p_ecurec: u32,
    /// Offset of the ROM-end word inside the ECUREC record.
    pub p_romend: u32,
    /// Expected position of the secondary vector table.
    pub ivt2_expected: u32,
    /// Feature set of the variant.
    pub features: Features,
}

fn serialize_cpu<S: serde::Serializer>(cpu: &[u8; 8], ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_str(&String::from_utf8_lossy(cpu))
}

impl FidType {
    /// CPU tag as a display string.
    pub fn cpu_str(&self) -> String {
        String::from_utf8_lossy(&self.cpu).into_owned()
    }
}

/// Look up a catalog entry by exact 8-byte CPU tag.
pub fn lookup<'a>(table: &'a [FidType], cpu: &[u8]) -> Option<&'a FidType> {
    if cpu.len() != 8 {
        return None;
    }
    table.iter().find(|ft| ft.cpu == cpu)
}

/// Built-in catalog of known variants.
///
/// RAMF-carrying entries share one field layout (header at +0, RAM jump
/// at +4, download limit at +8, block bounds at +0x0C/+0x10, IVT2
/// pointer at +0x14, ECUREC pointer at +0x18); ECUREC entries use the
/// record layout (identity pointer at +0, bounds at +4/+8, IVT2 pointer
/// at +0x0C, ROM-end word at +0x10).
pub static BUILTIN: &[FidType] = &[
    FidType {
        name: "SH7050 128k",
        cpu: *b"SH7050A ",
        rom_size: 128 * 1024,
        fid_size: 0x54,
        ramf_header: 0xFFFF_8000,
        ramf_maxdist: 0x18,
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
        name: "SH7051 256k",
        cpu: *b"SH7051B ",
        rom_size: 256 * 1024,
        fid_size: 0x54,
        ramf_header: 0xFFFF_8000,
        ramf_maxdist: 0x18,
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
        name: "SH7055 512k",
        cpu: *b"SH7055S ",
        rom_size: 512 * 1024,
        fid_size: 0x5C,
        ramf_header: 0xFFFF_8000,
        ramf_maxdist: 0x20,
        p_ramjump: 4,
        p_ram_dlamax: 8,
        packs_start: 0x0C,
        packs_end: 0x10,
        p_ivt2: 0x14,
        p_ecurec: 0x18,
        p_romend: 0,
        ivt2_expected: 0x0001_0000,
        features: Features::STD_CKS.with(Features::ALT_CKS).with(Features::IVT2),
    },
    FidType {
        name: "SH7058 1M",
        cpu: *b"SH7058D ",
        rom_size: 1024 * 1024,
        fid_size: 0x5C,
        ramf_header: 0xFFFF_8000,
        ramf_maxdist: 0x20,
        p_ramjump: 4,
        p_ram_dlamax: 8,
        packs_start: 0x0C,
        packs_end: 0x10,
        p_ivt2: 0x14,
        p_ecurec: 0x18,
        p_romend: 0,
        ivt2_expected: 0x0002_0000,
        features: Features::STD_CKS.with(Features::ALT_CKS).with(Features::IVT2),
    },
    FidType {
        name: "SH705822 1M",
        cpu: *b"SH705822",
        rom_size: 1024 * 1024,
        fid_size: 0x68,
        ramf_header: 0xFFFF_8000,
        ramf_maxdist: 0x20,
        p_ramjump: 4,
        p_ram_dlamax: 8,
        packs_start: 0x0C,
        packs_end: 0x10,
        p_ivt2: 0x14,
        p_ecurec: 0x18,
        p_romend: 0x10,
        ivt2_expected: 0x0002_0000,
        features: Features::STD_CKS.with(Features::ALT_CKS).with(Features::ALT2_CKS).with(Features::IVT2),
    },
    FidType {
        name: "SH705828 1M",
        cpu: *b"SH705828",
        rom_size: 1024 * 1024,
        fid_size: 0x68,
        ramf_header: 0xFFFF_8000,
        ramf_maxdist: 0x20,
        p_ramjump: 4,
        p_ram_dlamax: 8,
        packs_start: 0x0C,
        packs_end: 0x10,
        p_ivt2: 0x14,
        p_ecurec: 0x18,
        p_romend: 0,
        ivt2_expected: 0x0002_0000,
        features: Features::STD_CKS.with(Features::ALT_CKS).with(Features::IVT2),
    },
    FidType {
        name: "SH72531 1M",
        cpu: *b"SH72531 ",
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
        features: Features::STD_CKS.with(Features::ALT_CKS).with(Features::ALT2_CKS).with(Features::ECUREC).with(Features::IVT2),
    },
    FidType {
        name: "SH72533 2M",
        cpu: *b"SH72533 ",
        rom_size: 2048 * 1024,
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
        ivt2_expected: 0x000F_FF00,
        features: Features::STD_CKS.with(Features::ALT_CKS).with(Features::ALT2_CKS).with(Features::ECUREC).with(Features::IVT2),
    },
];
