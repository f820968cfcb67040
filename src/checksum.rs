//! Dual sum+xor checksum kernel.
//!
//! The firmware integrity scheme folds the image as big-endian 32-bit
//! words into a wrapping sum and an xor. Two words embedded in the image
//! hold the expected values; their positions are not recorded anywhere
//! and have to be recovered algebraically:
//!
//! * xor of the whole image collapses to the stored sum word, because the
//!   stored xor word cancels itself out of the xor channel;
//! * sum of the whole image equals `2*CKS + CKX`, so `CKX = sumt - 2*xort`.
//!
//! All arithmetic in this module is intentionally wrapping mod 2^32; the
//! algebra depends on it. No function here reads or writes outside the
//! given buffer.

use serde::Serialize;

use crate::bytes::{load_u32, store_u32};
use crate::error::{Result, RomError};

/// Fold a buffer into its wrapping 32-bit word sum and xor.
///
/// Words are read big-endian. Trailing bytes past the last whole word are
/// ignored.
pub fn sum32(buf: &[u8]) -> (u32, u32) {
    let mut sum = 0u32;
    let mut xor = 0u32;
    let mut off = 0;
    while off + 4 <= buf.len() {
        let word = u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]);
        sum = sum.wrapping_add(word);
        xor ^= word;
        off += 4;
    }
    (sum, xor)
}

/// A located sum/xor word pair.
///
/// `p_sum` / `p_xor` are offsets of the first aligned word holding each
/// recovered value; the match counts record how many aligned words held
/// it (more than one means the location is ambiguous).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChecksumPair {
    /// Recovered sum value.
    pub sum: u32,
    /// Recovered xor value.
    pub xor: u32,
    /// Offset of the first aligned word equal to `sum`.
    pub p_sum: Option<u32>,
    /// Offset of the first aligned word equal to `xor`.
    pub p_xor: Option<u32>,
    /// Number of aligned words equal to `sum`.
    pub sum_matches: usize,
    /// Number of aligned words equal to `xor`.
    pub xor_matches: usize,
}

impl ChecksumPair {
    /// True when both words were located.
    pub fn complete(&self) -> bool {
        self.p_sum.is_some() && self.p_xor.is_some()
    }

    /// True when either value matched more than one aligned word.
    pub fn ambiguous(&self) -> bool {
        self.sum_matches > 1 || self.xor_matches > 1
    }
}

/// Locate aligned words equal to `sum` and `xor`, skipping `skips`.
fn locate_pair(buf: &[u8], sum: u32, xor: u32, skips: &[usize]) -> ChecksumPair {
    let mut pair = ChecksumPair {
        sum,
        xor,
        p_sum: None,
        p_xor: None,
        sum_matches: 0,
        xor_matches: 0,
    };
    let mut off = 0;
    while off + 4 <= buf.len() {
        if !skips.contains(&off) {
            let word = u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]);
            if word == sum {
                if pair.p_sum.is_none() {
                    pair.p_sum = Some(off as u32);
                }
                pair.sum_matches += 1;
            }
            if word == xor {
                if pair.p_xor.is_none() {
                    pair.p_xor = Some(off as u32);
                }
                pair.xor_matches += 1;
            }
        }
        off += 4;
    }
    pair
}

/// Compute the standard whole-image checksums and locate their words.
///
/// Returns [`RomError::NotFound`] when neither recovered value occurs as
/// an aligned word anywhere in the buffer.
pub fn checksum_std(buf: &[u8]) -> Result<ChecksumPair> {
    let (sumt, xort) = sum32(buf);
    let cks = xort;
    let ckx = sumt.wrapping_sub(xort.wrapping_mul(2));

    let pair = locate_pair(buf, cks, ckx, &[]);
    if pair.sum_matches == 0 && pair.xor_matches == 0 {
        return Err(RomError::NotFound {
            what: "standard checksum words",
        });
    }
    Ok(pair)
}

/// Compute the alternate checksum over `buf`, skipping up to two words.
///
/// Used when the checksum protects a suffix of the image whose summing
/// loop skips extra locations (beyond the sum/xor words themselves).
/// Skip offsets are relative to `buf`; an unaligned or out-of-range skip
/// is ignored, matching a 4-byte-stepped summing loop that can never land
/// on it. Returned offsets are relative to `buf`.
pub fn checksum_alt2(buf: &[u8], skip1: Option<u32>, skip2: Option<u32>) -> Result<ChecksumPair> {
    let mut skips: Vec<usize> = Vec::with_capacity(2);
    for skip in [skip1, skip2].into_iter().flatten() {
        let skip = skip as usize;
        if skip % 4 == 0 && skip + 4 <= buf.len() {
            skips.push(skip);
        }
    }

    let mut sumt = 0u32;
    let mut xort = 0u32;
    let mut off = 0;
    while off + 4 <= buf.len() {
        if !skips.contains(&off) {
            let word = u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]);
            sumt = sumt.wrapping_add(word);
            xort ^= word;
        }
        off += 4;
    }

    let cks = xort;
    let ckx = sumt.wrapping_sub(xort.wrapping_mul(2));

    let pair = locate_pair(buf, cks, ckx, &skips);
    if pair.sum_matches == 0 && pair.xor_matches == 0 {
        return Err(RomError::NotFound {
            what: "alternate checksum words",
        });
    }
    Ok(pair)
}

/// Correction words written by [`checksum_fix`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Correction {
    /// First correction word, written at `p_a`.
    pub a: u32,
    /// Second correction word, written at `p_b`.
    pub b: u32,
    /// Mangler word, written at `p_c`.
    pub mang: u32,
    /// Result of re-running [`checksum_std`] against the targets.
    pub verified: bool,
}

/// One MSB-to-LSB attempt at `a + b == ds`, `a ^ b == dx`.
///
/// `carry` tracks the carry the current bit must receive from the bits
/// below it. A demanded carry that cannot be produced (conflicting sum
/// bit, or a carry still owed below bit 0) means no solution exists for
/// this target pair.
fn solve_pass(ds: u32, dx: u32) -> Option<(u32, u32)> {
    let mut a = 0u32;
    let mut b = 0u32;
    let mut carry = false;
    for bit in (0..32).rev() {
        let xn = (dx >> bit) & 1 == 1;
        let sn = (ds >> bit) & 1 == 1;
        if xn {
            // Bits differ: put the 1 in a.
            a |= 1 << bit;
            if carry {
                if sn {
                    return None;
                }
                // carry stays demanded
            } else {
                carry = !sn;
            }
        } else {
            // Bits equal: both 1 exactly when a carry is demanded.
            if carry {
                a |= 1 << bit;
                b |= 1 << bit;
            }
            carry = sn;
        }
    }
    if carry {
        return None;
    }
    Some((a, b))
}

/// Solve for three correction words that force the image to the stored
/// sum/xor targets.
///
/// The targets are read from `p_cks` / `p_ckx`. The three slots at
/// `p_a`, `p_b`, `p_c` are zeroed, the rest of the image is folded
/// (skipping the two target words), and the solver picks `a`, `b` and a
/// mangler word such that
///
/// ```text
/// CKS = S + a + b + mang      CKX = X ^ a ^ b ^ mang
/// ```
///
/// The mangler starts at `CKX ^ X`, which zeroes the xor residue; when
/// the bitwise solve hits a contradiction the mangler is decremented,
/// the targets are adjusted, and the solve restarts from the MSB. A
/// mangler at 1 with no solution is fatal: the slots are restored
/// byte-for-byte and [`RomError::Infeasible`] is returned.
///
/// On success the three words are written and the result carries a
/// `verified` flag from re-running [`checksum_std`].
pub fn checksum_fix(
    buf: &mut [u8],
    p_cks: u32,
    p_ckx: u32,
    p_a: u32,
    p_b: u32,
    p_c: u32,
) -> Result<Correction> {
    let len = buf.len();
    if len == 0 || len % 4 != 0 {
        return Err(RomError::malformed(format!(
            "checksum_fix needs a word-multiple buffer, got {len} bytes"
        )));
    }
    let offsets = [p_cks, p_ckx, p_a, p_b, p_c];
    for off in offsets {
        if off % 4 != 0 || (off as usize) + 4 > len {
            return Err(RomError::malformed(format!(
                "checksum_fix offset {off:#X} unaligned or out of bounds"
            )));
        }
    }
    for i in 0..offsets.len() {
        for j in (i + 1)..offsets.len() {
            if offsets[i] == offsets[j] {
                return Err(RomError::malformed(format!(
                    "checksum_fix offsets must be distinct, {:#X} repeats",
                    offsets[i]
                )));
            }
        }
    }

    let cks = load_u32(buf, p_cks as usize).expect("bounds checked above");
    let ckx = load_u32(buf, p_ckx as usize).expect("bounds checked above");

    // Zero the correction slots, keeping the original bytes so an
    // infeasible solve leaves the buffer pristine.
    let slots = [p_a as usize, p_b as usize, p_c as usize];
    let mut saved = [[0u8; 4]; 3];
    for (save, &slot) in saved.iter_mut().zip(&slots) {
        save.copy_from_slice(&buf[slot..slot + 4]);
        buf[slot..slot + 4].copy_from_slice(&[0; 4]);
    }

    // Fold everything except the two target words.
    let mut s = 0u32;
    let mut x = 0u32;
    let mut off = 0usize;
    while off + 4 <= len {
        if off != p_cks as usize && off != p_ckx as usize {
            let word = u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]);
            s = s.wrapping_add(word);
            x ^= word;
        }
        off += 4;
    }

    let mut ds = cks.wrapping_sub(s);
    let mut dx = ckx ^ x;
    let mut mang = dx;
    ds = ds.wrapping_sub(mang);
    dx ^= mang;

    let (a, b) = loop {
        match solve_pass(ds, dx) {
            Some(pair) => break pair,
            None => {
                if mang <= 1 {
                    for (save, &slot) in saved.iter().zip(&slots) {
                        buf[slot..slot + 4].copy_from_slice(save);
                    }
                    return Err(RomError::Infeasible { mang });
                }
                ds = ds.wrapping_add(1);
                dx ^= mang ^ (mang - 1);
                mang -= 1;
            }
        }
    };

    store_u32(buf, p_a as usize, a).expect("bounds checked above");
    store_u32(buf, p_b as usize, b).expect("bounds checked above");
    store_u32(buf, p_c as usize, mang).expect("bounds checked above");

    let verified = match checksum_std(buf) {
        Ok(pair) => pair.complete() && pair.sum == cks && pair.xor == ckx,
        Err(_) => false,
    };

    Ok(Correction {
        a,
        b,
        mang,
        verified,
    })
}
