//! Staged structural recovery.
//!
//! Nothing in the image records where its metadata lives; the stages
//! here recover it by byte-pattern search and structure-shape checks,
//! in a fixed order: LOADER, FID, then RAMF (or the ECUREC record for
//! variants without RAMF), the alternate checksum block, the secondary
//! vector table, and finally the whole-image checksum words.
//!
//! A stage that fails leaves its offsets unknown; stages depending on it
//! skip themselves. The only fatal condition is an image whose size is
//! out of bounds, and even that can be overridden with the force option.

use crate::bytes::{self, load_u32};
use crate::catalog::{lookup, Features, FidType};
use crate::checksum::{checksum_alt2, checksum_std};
use crate::error::{Result, RomError};
use crate::ivt::{check_ivt, CANONICAL_SP, IVT_MIN_SIZE};
use crate::types::{
    fid_layout, loader_layout, offset_or_sentinel, AnalyzeOptions, DiagSink, RomFile, MAX_ROMSIZE,
    MIN_ROMSIZE,
};

/// RIPEMD-160 initialization constants probed by [`detect_rm160`].
const RM160_MAGIC: [u32; 2] = [0x6745_2301, 0x98BA_DCFE];

/// Run the full recovery pipeline over an image.
///
/// Missing structures are not errors: the returned record simply keeps
/// the corresponding fields unknown. The only error without `force` is
/// an image size outside the accepted window.
pub fn analyze(
    image: Vec<u8>,
    filename: &str,
    opts: &AnalyzeOptions,
    diag: &mut DiagSink,
) -> Result<RomFile> {
    let size = image.len();
    if size < MIN_ROMSIZE || size > MAX_ROMSIZE || size % 4 != 0 {
        if !opts.force {
            return Err(RomError::InputBounds {
                size,
                min: MIN_ROMSIZE,
                max: MAX_ROMSIZE,
            });
        }
        diag(&format!("unlikely image size {size}; forcing analysis"));
    }

    let mut rf = RomFile::new(image, filename);

    if let Err(err) = find_loader(&mut rf) {
        diag(&format!("{err}"));
    }

    match find_fid(&mut rf, opts.catalog, diag) {
        Ok(_) => {
            if let Err(err) = find_ramf(&mut rf, diag) {
                diag(&format!("find_ramf failed: {err}"));
            }
            locate_std(&mut rf, diag);
        }
        Err(err) => {
            // No FID or no catalog match: everything downstream of the
            // FID struct is unreachable, return the partial record.
            diag(&format!("{err}; cannot recover further structures"));
        }
    }

    detect_rm160(&mut rf);

    Ok(rf)
}

/// Locate the LOADER struct and parse its version number.
///
/// The `"LOADER"` tag anchors the struct; the two bytes after it must be
/// ASCII digits to yield a version. The 8-byte CPU string follows at its
/// fixed offset.
pub fn find_loader(rf: &mut RomFile) -> Result<u32> {
    let tag = bytes::find_bytes(rf.image(), b"LOADER").ok_or(RomError::NotFound {
        what: "LOADER tag",
    })?;

    let version = match rf.image().get(tag + 6..tag + 8) {
        Some([a, b]) if a.is_ascii_digit() && b.is_ascii_digit() => {
            Some((a - b'0') * 10 + (b - b'0'))
        }
        _ => None,
    };

    let p_loader = tag - loader_layout::TAG;
    rf.p_loader = Some(p_loader as u32);
    rf.loader_version = version;
    rf.set_loader_cpu(p_loader + loader_layout::CPU..p_loader + loader_layout::CPU + 8);

    Ok(p_loader as u32)
}

/// Locate the FID struct and select the catalog entry for it.
///
/// Anchors on `"DATAB"`; when the first hit is the LOADER's own marker
/// (detected by the `"LOAD"` tag at the struct head) the search resumes
/// past the LOADER struct. The FID CPU string then selects the catalog
/// entry; no match aborts the remaining pipeline with a partial record.
pub fn find_fid(rf: &mut RomFile, catalog: &[FidType], diag: &mut DiagSink) -> Result<u32> {
    let not_found = RomError::NotFound {
        what: "FID DATABASE marker",
    };

    let (p_fid, cpu) = {
        let buf = rf.image();
        let mut sf = bytes::find_bytes(buf, b"DATAB").ok_or(RomError::NotFound {
            what: "DATABASE marker",
        })?;

        if sf >= loader_layout::DATABASE {
            let head = sf - loader_layout::DATABASE;
            if buf[head..].starts_with(b"LOAD") {
                // That was the LOADER's marker; skip past its struct.
                let from = head + loader_layout::SIZE;
                let rel = buf
                    .get(from..)
                    .and_then(|tail| bytes::find_bytes(tail, b"DATAB"))
                    .ok_or(not_found)?;
                sf = from + rel;
            }
        }

        if sf < fid_layout::DATABASE {
            return Err(RomError::NotFound {
                what: "FID DATABASE marker",
            });
        }
        let p_fid = sf - fid_layout::DATABASE;

        if p_fid + fid_layout::MAX_SIZE >= buf.len() {
            diag("FID too close to end of ROM; possibly incomplete or bad dump");
            return Err(RomError::malformed(format!(
                "FID struct at {p_fid:#X} does not fit the image"
            )));
        }

        let mut cpu = [0u8; fid_layout::CPU_LEN];
        cpu.copy_from_slice(&buf[p_fid + fid_layout::CPU..p_fid + fid_layout::CPU + fid_layout::CPU_LEN]);
        (p_fid, cpu)
    };

    rf.p_fid = Some(p_fid as u32);
    rf.set_fid_str(p_fid + fid_layout::FID..p_fid + fid_layout::FID + fid_layout::FID_LEN);
    rf.set_fid_cpu(p_fid + fid_layout::CPU..p_fid + fid_layout::CPU + fid_layout::CPU_LEN);

    let ft = lookup(catalog, &cpu)
        .cloned()
        .ok_or_else(|| RomError::UnknownFidType {
            tag: String::from_utf8_lossy(&cpu).into_owned(),
        })?;

    if rf.len() != ft.rom_size as usize {
        diag(&format!(
            "ROM size {} k, expected {} k; possibly incomplete dump",
            rf.len() / 1024,
            ft.rom_size / 1024
        ));
    }

    rf.fidtype = Some(ft);
    Ok(p_fid as u32)
}

/// Probe order for the RAMF drift sweep: alternate signs close in, then
/// walk forward only.
fn drift_sequence(maxdist: u32) -> impl Iterator<Item = i64> {
    let mut adj: i64 = 4;
    let mut sign: i64 = 1;
    std::iter::from_fn(move || {
        if adj >= i64::from(maxdist) {
            return None;
        }
        let cur = sign * adj;
        if adj < 0x0C {
            sign = -sign;
            if sign == 1 {
                adj += 4;
            }
        } else {
            sign = 1;
            adj += 4;
        }
        Some(cur)
    })
}

/// Locate and parse the RAMF struct (or the ECUREC record for variants
/// without RAMF), then run every probe that hangs off it: alternate
/// checksum validation, IVT2 sanity and brute force, the ECUREC pointer,
/// and the alt2 checksum anchor.
pub fn find_ramf(rf: &mut RomFile, diag: &mut DiagSink) -> Result<()> {
    let ft = rf
        .fidtype
        .clone()
        .ok_or(RomError::NotFound { what: "FID type" })?;
    let p_fid = rf.p_fid.ok_or(RomError::NotFound { what: "FID struct" })? as usize;
    let siz = rf.len();
    let features = ft.features;
    let mut p_ramf = p_fid + ft.fid_size as usize;

    if ft.ramf_header == 0 {
        let found = features.contains(Features::ECUREC) && find_ecurec(rf, &ft, diag);
        if !found {
            diag("not trying to find RAMF");
            return Ok(());
        }
    } else {
        let testval = load_u32(rf.image(), p_ramf);
        if testval != Some(ft.ramf_header) {
            diag(&format!(
                "unlikely contents for RAMF struct; got {:#010X}",
                testval.unwrap_or(0)
            ));
            let drift = {
                let buf = rf.image();
                drift_sequence(ft.ramf_maxdist).find(|&delta| {
                    let probe = p_ramf as i64 + delta;
                    probe >= 0 && load_u32(buf, probe as usize) == Some(ft.ramf_header)
                })
            };
            match drift {
                Some(delta) => {
                    diag(&format!("probable RAMF found @ delta = {delta:+}"));
                    rf.ramf_offset = delta as i32;
                    p_ramf = (p_ramf as i64 + delta) as usize;
                }
                None => {
                    return Err(RomError::NotFound {
                        what: "RAMF header",
                    });
                }
            }
        }
        rf.p_ramf = Some(p_ramf as u32);
    }

    parse_ramf(rf, &ft, p_ramf);

    if features.contains(Features::ALT_CKS) {
        let sane = matches!(
            (rf.p_acstart, rf.p_acend),
            (Some(start), Some(end))
                if (start as usize) < siz && (end as usize) < siz && start < end
        );
        if !sane {
            diag(&format!(
                "bad alt cks bounds; {:#X} - {:#X}",
                offset_or_sentinel(rf.p_acstart),
                offset_or_sentinel(rf.p_acend)
            ));
            rf.p_acstart = None;
            rf.p_acend = None;
        } else if let Err(err) = validate_altcks(rf, diag) {
            diag(&format!("alt checksum validation failed: {err}"));
        }
    }

    if let Some(ivt2) = rf.p_ivt2 {
        if ivt2 as usize >= siz.saturating_sub(IVT_MIN_SIZE) {
            diag("warning: IVT2 value out of bound, probably due to unusual RAMF structure");
            rf.p_ivt2 = None;
        } else {
            if ivt2 != ft.ivt2_expected {
                diag(&format!("unexpected IVT2 {ivt2:#X}! please report this"));
            }
            if !check_ivt(&rf.image()[ivt2 as usize..]) {
                let buf = rf.image();
                diag(&format!(
                    "unlikely IVT2 location {:#08X}: {:08X} {:08X} {:08X} {:08X}...",
                    ivt2,
                    load_u32(buf, ivt2 as usize).unwrap_or(0),
                    load_u32(buf, ivt2 as usize + 4).unwrap_or(0),
                    load_u32(buf, ivt2 as usize + 8).unwrap_or(0),
                    load_u32(buf, ivt2 as usize + 12).unwrap_or(0),
                ));
                rf.p_ivt2 = None;
            }
        }
    }

    if rf.p_ivt2.is_some() {
        rf.ivt2_confidence = 99;
    } else if features.contains(Features::IVT2) {
        bruteforce_ivt2(rf, diag);
    }

    // Some variants carry an ECUREC pointer in RAMF even though their
    // recovery goes through RAMF, not the record itself.
    if !features.contains(Features::ECUREC) && ft.p_ecurec != 0 {
        rf.p_ecurec = load_u32(rf.image(), p_ramf + ft.p_ecurec as usize);
    }

    if features.contains(Features::ECUREC) {
        match rf.p_ecurec {
            Some(pe) if (pe as usize) + 6 < siz => {
                let id = String::from_utf8_lossy(&rf.image()[pe as usize + 1..pe as usize + 6])
                    .into_owned();
                diag(&format!("probable ECU identity @ {pe:#X}: {id}"));
            }
            _ => {
                diag(&format!(
                    "unlikely ECUREC pointer {:#X}",
                    offset_or_sentinel(rf.p_ecurec)
                ));
                rf.p_ecurec = None;
            }
        }
    }

    anchor_alt2(rf, &ft, diag);

    Ok(())
}

/// Parse the pointer fields out of RAMF at `p_ramf`.
///
/// Fields already filled by the ECUREC path are left alone; fields the
/// catalog declares absent stay unknown.
fn parse_ramf(rf: &mut RomFile, ft: &FidType, p_ramf: usize) {
    if ft.p_ramjump != 0 {
        rf.ramjump = load_u32(rf.image(), p_ramf + ft.p_ramjump as usize);
        rf.ram_dlamax = load_u32(rf.image(), p_ramf + ft.p_ram_dlamax as usize);
    }

    if ft.features.contains(Features::ALT_CKS) {
        if rf.p_acstart.is_none() && rf.p_acend.is_none() && ft.packs_start != 0 {
            rf.p_acstart = load_u32(rf.image(), p_ramf + ft.packs_start as usize);
            rf.p_acend = load_u32(rf.image(), p_ramf + ft.packs_end as usize);
        }
    } else {
        rf.p_acstart = None;
        rf.p_acend = None;
    }

    if ft.p_ivt2 != 0 {
        if rf.p_ivt2.is_none() {
            rf.p_ivt2 = load_u32(rf.image(), p_ramf + ft.p_ivt2 as usize);
        }
    } else {
        rf.p_ivt2 = None;
    }
}

/// Locate the ECUREC record for variants without RAMF.
///
/// Walks every aligned occurrence of the expected IVT2 position; a
/// candidate is accepted when the ROM-end word of the implied record
/// holds `rom_size - 1`. On acceptance the alt-checksum bounds and the
/// ECUREC pointer are read out of the record.
fn find_ecurec(rf: &mut RomFile, ft: &FidType, diag: &mut DiagSink) -> bool {
    let siz = rf.len();
    if siz < 100 {
        return false;
    }

    let hit = {
        let buf = rf.image();
        let mut start = 0usize;
        let mut found = None;
        while start < siz - 100 {
            let Some(cand) = bytes::find_u32_from(buf, start, ft.ivt2_expected) else {
                break;
            };
            start = cand + 4;
            let Some(record) = cand.checked_sub(ft.p_ivt2 as usize) else {
                continue;
            };
            let p_romend = record + ft.p_romend as usize;
            if p_romend >= siz - 4 {
                continue;
            }
            match load_u32(buf, p_romend) {
                Some(romend) if romend.wrapping_add(1) == ft.rom_size => {
                    found = Some(record);
                    break;
                }
                _ => continue,
            }
        }
        found
    };

    let Some(record) = hit else {
        diag("IVT2/ROMEND not found");
        return false;
    };

    rf.p_ivt2 = Some(ft.ivt2_expected);
    rf.p_acstart = load_u32(rf.image(), record + ft.packs_start as usize);
    rf.p_acend = load_u32(rf.image(), record + ft.packs_end as usize);
    rf.p_ecurec = load_u32(rf.image(), record);
    true
}

/// Recompute the fold over the alternate checksum block and locate the
/// resulting words anywhere in the image.
///
/// The block end pointer is often two bytes short of word alignment;
/// the historical bounds semantics round it up: `((end + 1 - start) &
/// !3) + 4` bytes are folded.
pub fn validate_altcks(rf: &mut RomFile, diag: &mut DiagSink) -> Result<()> {
    let ft = rf
        .fidtype
        .as_ref()
        .ok_or(RomError::NotFound { what: "FID type" })?;
    if !ft.features.contains(Features::ALT_CKS) {
        return Err(RomError::NotFound {
            what: "alt checksum feature",
        });
    }

    let (start, end) = match (rf.p_acstart, rf.p_acend) {
        (Some(start), Some(end)) if start < end && (end as usize) < rf.len() => {
            (start as usize, end as usize)
        }
        _ => {
            return Err(RomError::NotFound {
                what: "alt checksum bounds",
            })
        }
    };

    let bsize = ((end + 1 - start) & !3) + 4;
    let clamped_end = (start + bsize).min(rf.len());
    if start + bsize > rf.len() {
        diag(&format!(
            "alt cks block end {:#X} rounds past the image; clamping",
            start + bsize
        ));
    }

    let (located, acs, acx) = {
        let buf = rf.image();
        let (acs, acx) = crate::checksum::sum32(&buf[start..clamped_end]);
        let pacs = bytes::find_u32(buf, acs);
        let pacx = bytes::find_u32(buf, acx);
        ((pacs, pacx), acs, acx)
    };
    diag(&format!(
        "alt cks block {start:#08X} - {end:#08X}: sumt={acs:#010X}, xort={acx:#010X}"
    ));

    match located {
        (Some(pacs), Some(pacx)) => {
            rf.p_acs = Some(pacs as u32);
            rf.p_acx = Some(pacx as u32);
            rf.cks_alt_good = true;
            diag(&format!(
                "confirmed altcks values found: acs @ {pacs:#X}, acx @ {pacx:#X}"
            ));
            Ok(())
        }
        _ => {
            diag("altcks values not found in ROM, possibly unskipped vals or bad algo");
            Err(RomError::NotFound {
                what: "alt checksum words",
            })
        }
    }
}

/// Last-resort scan for a secondary vector table.
///
/// Skips the first 256 bytes so the power-on table cannot match, then
/// checks every aligned 4-byte window. The first hit scores 50; a hit
/// whose stack word is the canonical SP scores 75 and ends the scan.
/// The result goes to the guess fields; the parsed pointer stays
/// unknown.
fn bruteforce_ivt2(rf: &mut RomFile, diag: &mut DiagSink) {
    diag("no IVT2; brute force scan as a last resort");
    let siz = rf.len();
    let (guess, confidence) = {
        let buf = rf.image();
        let mut guess = None;
        let mut confidence = 0u8;
        let mut off = 0x100usize;
        while off + 0x400 <= siz {
            if check_ivt(&buf[off..]) {
                if confidence == 0 {
                    guess = Some(off as u32);
                    confidence = 50;
                }
                if load_u32(buf, off + 4) == Some(CANONICAL_SP) {
                    guess = Some(off as u32);
                    confidence = 75;
                    break;
                }
            }
            off += 4;
        }
        (guess, confidence)
    };

    match guess {
        Some(at) => diag(&format!("possible IVT @ {at:#X} (confidence {confidence})")),
        None => diag("no IVT2 found"),
    }
    rf.ivt2_guess = guess;
    rf.ivt2_confidence = confidence;
}

/// Anchor the alt2 checksum at the ECUREC position.
///
/// The protected range runs from ECUREC to the end of the image; the
/// word right before IVT2 is skipped by the summing loop.
fn anchor_alt2(rf: &mut RomFile, ft: &FidType, diag: &mut DiagSink) {
    if !ft.features.contains(Features::ALT2_CKS) {
        return;
    }
    let (Some(pecurec), Some(ivt2)) = (rf.p_ecurec, rf.p_ivt2) else {
        return;
    };
    let siz = rf.len();
    if pecurec as usize >= siz || ivt2 as usize >= siz {
        return;
    }

    let skip2 = ivt2.wrapping_sub(4).wrapping_sub(pecurec);
    rf.p_ac2start = Some(pecurec);

    let result = checksum_alt2(&rf.image()[pecurec as usize..], None, Some(skip2));
    match result {
        Ok(pair) => {
            if pair.ambiguous() {
                diag("warning: more than one alt2 checksum word candidate");
            }
            rf.p_a2cs = pair.p_sum.map(|off| off + pecurec);
            rf.p_a2cx = pair.p_xor.map(|off| off + pecurec);
            rf.cks_alt2_good = pair.complete();
        }
        Err(_) => {
            diag("alt2 checksum not found ?? bad algo, bad skip, or other problem");
        }
    }
}

/// Locate the standard whole-image checksum words, when the variant
/// declares them.
pub fn locate_std(rf: &mut RomFile, diag: &mut DiagSink) {
    let Some(ft) = rf.fidtype.as_ref() else {
        return;
    };
    if !ft.features.contains(Features::STD_CKS) {
        return;
    }

    match checksum_std(rf.image()) {
        Ok(pair) => {
            if pair.ambiguous() {
                diag(
                    "warning: more than one set of checksums found! \
                     the real checksums should be close to each other",
                );
            }
            rf.p_cks = pair.p_sum;
            rf.p_ckx = pair.p_xor;
            rf.cks_std_good = pair.complete();
        }
        Err(err) => {
            diag(&format!("standard checksum: {err}"));
        }
    }
}

/// Probe for the RIPEMD-160 initialization constants.
pub fn detect_rm160(rf: &mut RomFile) {
    let found = RM160_MAGIC
        .iter()
        .all(|&magic| bytes::find_u32(rf.image(), magic).is_some());
    rf.has_rm160 = found;
}
