//! Interrupt vector table heuristics.
//!
//! A vector table on this MCU family opens with two identical reset
//! entries: power-on and manual reset each contribute a (PC, SP) pair.
//! The checks below are shape rules only; they do not prove the table is
//! live, just that it is plausible.
//!
//! Example of a valid table head: `0000 0104, FFFF 7FFC, 0000 0104,
//! FFFF 7FFC, ...`

use crate::bytes::load_u32;

/// Absolute minimum size of a trimmed vector table.
pub const IVT_MIN_SIZE: usize = 0x100;

/// Canonical initial stack pointer seen on most variants.
pub const CANONICAL_SP: u32 = 0xFFFF_7FFC;

/// Check whether `buf` starts with a plausible vector table.
///
/// Requires all of:
/// * at least [`IVT_MIN_SIZE`] bytes;
/// * power-on and manual reset entries identical (word 0 == word 2,
///   word 1 == word 3);
/// * reset PC in the bottom 16 MiB, 2-byte aligned;
/// * reset SP in the top 128 KiB of the address space, 4-byte aligned.
pub fn check_ivt(buf: &[u8]) -> bool {
    if buf.len() < IVT_MIN_SIZE {
        return false;
    }
    let (pc0, sp0, pc1, sp1) = match (
        load_u32(buf, 0),
        load_u32(buf, 4),
        load_u32(buf, 8),
        load_u32(buf, 12),
    ) {
        (Some(a), Some(b), Some(c), Some(d)) => (a, b, c, d),
        _ => return false,
    };

    pc0 == pc1
        && sp0 == sp1
        && pc0 < 0x0100_0000
        && pc0 % 2 == 0
        && sp0 >= 0xFFFE_0000
        && sp0 % 4 == 0
}

/// Scan forward for the first plausible vector table.
///
/// Windows are examined every 16 bytes from the start of `buf`; the
/// offset of the first window passing [`check_ivt`] is returned.
pub fn find_ivt(buf: &[u8]) -> Option<usize> {
    let mut off = 0;
    while off + IVT_MIN_SIZE <= buf.len() {
        if check_ivt(&buf[off..]) {
            return Some(off);
        }
        off += 16;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytes::store_u32;

    fn canonical() -> Vec<u8> {
        let mut buf = vec![0u8; IVT_MIN_SIZE];
        store_u32(&mut buf, 0, 0x0000_0104).unwrap();
        store_u32(&mut buf, 4, CANONICAL_SP).unwrap();
        store_u32(&mut buf, 8, 0x0000_0104).unwrap();
        store_u32(&mut buf, 12, CANONICAL_SP).unwrap();
        buf
    }

    #[test]
    fn test_canonical_ivt_passes() {
        assert!(check_ivt(&canonical()));
    }

    #[test]
    fn test_too_short_fails() {
        let buf = canonical();
        assert!(!check_ivt(&buf[..IVT_MIN_SIZE - 1]));
        assert!(!check_ivt(&[]));
    }

    #[test]
    fn test_mismatched_reset_entries_fail() {
        let mut buf = canonical();
        store_u32(&mut buf, 8, 0x0000_0108).unwrap(); // PC mismatch
        assert!(!check_ivt(&buf));

        let mut buf = canonical();
        store_u32(&mut buf, 12, 0xFFFF_7FF8).unwrap(); // SP mismatch
        assert!(!check_ivt(&buf));
    }

    #[test]
    fn test_pc_shape_rules() {
        let mut buf = canonical();
        store_u32(&mut buf, 0, 0x0100_0000).unwrap(); // out of bottom 16 MiB
        store_u32(&mut buf, 8, 0x0100_0000).unwrap();
        assert!(!check_ivt(&buf));

        let mut buf = canonical();
        store_u32(&mut buf, 0, 0x0000_0105).unwrap(); // odd PC
        store_u32(&mut buf, 8, 0x0000_0105).unwrap();
        assert!(!check_ivt(&buf));
    }

    #[test]
    fn test_sp_shape_rules() {
        let mut buf = canonical();
        store_u32(&mut buf, 4, 0xFFFD_FFFC).unwrap(); // below RAM window
        store_u32(&mut buf, 12, 0xFFFD_FFFC).unwrap();
        assert!(!check_ivt(&buf));

        let mut buf = canonical();
        store_u32(&mut buf, 4, 0xFFFF_7FFE).unwrap(); // unaligned SP
        store_u32(&mut buf, 12, 0xFFFF_7FFE).unwrap();
        assert!(!check_ivt(&buf));
    }

    #[test]
    fn test_find_ivt() {
        let mut buf = vec![0xFFu8; 0x400];
        let table = canonical();
        buf[0x120..0x120 + table.len()].copy_from_slice(&table);
        assert_eq!(find_ivt(&buf), Some(0x120));
        assert_eq!(find_ivt(&buf[0x200..]), None);
        assert_eq!(find_ivt(&[]), None);
    }
}
