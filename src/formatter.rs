//! Output formatters for analysis records.
//!
//! The analyzer produces one flat, ordered property list per ROM; the
//! formatters here render that list as human-readable lines, a CSV row,
//! or JSON. The property order is stable so CSV output from many ROMs
//! lines up under one header.

use serde_json::{json, Map, Value};

use crate::catalog::Features;
use crate::types::RomFile;

/// A single rendered property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    /// Free-form text (quoted in CSV).
    Text(String),
    /// An offset or address, rendered as hex.
    Hex(u32),
    /// A plain number.
    Num(i64),
    /// A boolean flag, rendered 1/0.
    Flag(bool),
    /// Unknown / not applicable for this ROM variant.
    Missing,
}

impl PropValue {
    fn from_offset(off: Option<u32>) -> PropValue {
        off.map_or(PropValue::Missing, PropValue::Hex)
    }

    /// Plain rendering, used by the human and CSV formatters.
    fn render(&self) -> String {
        match self {
            PropValue::Text(s) => s.clone(),
            PropValue::Hex(x) => format!("0x{x:X}"),
            PropValue::Num(n) => n.to_string(),
            PropValue::Flag(b) => if *b { "1" } else { "0" }.to_string(),
            PropValue::Missing => String::new(),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            PropValue::Text(s) => json!(s),
            PropValue::Hex(x) => json!(format!("0x{x:X}")),
            PropValue::Num(n) => json!(n),
            PropValue::Flag(b) => json!(b),
            PropValue::Missing => Value::Null,
        }
    }
}

/// One named property of an analyzed ROM.
#[derive(Debug, Clone)]
pub struct Property {
    /// Column name, stable across ROMs.
    pub name: &'static str,
    /// Rendered value.
    pub value: PropValue,
}

fn prop(name: &'static str, value: PropValue) -> Property {
    Property { name, value }
}

/// Printable text from a raw in-image string slice.
fn image_str(bytes: Option<&[u8]>) -> PropValue {
    match bytes {
        Some(b) => PropValue::Text(
            String::from_utf8_lossy(b)
                .trim_end_matches(['\0', ' '])
                .to_owned(),
        ),
        None => PropValue::Missing,
    }
}

/// Build the ordered property list for one analyzed ROM.
///
/// `digest` is the MD5 of the image when the caller computed one.
pub fn properties(rf: &RomFile, digest: Option<&str>) -> Vec<Property> {
    let features = rf.fidtype.as_ref().map_or(Features::NONE, |ft| ft.features);
    let mut props = Vec::with_capacity(32);

    props.push(prop(
        "ECUID",
        ecuid_from_filename(rf.filename()).map_or(PropValue::Missing, PropValue::Text),
    ));
    props.push(prop("file", PropValue::Text(rf.filename().to_owned())));
    props.push(prop(
        "size",
        PropValue::Text(format!("{}k", rf.len() / 1024)),
    ));

    match rf.loader_version {
        Some(v) => props.push(prop("LOADER ##", PropValue::Text(format!("{v:02}")))),
        None => props.push(prop("LOADER ##", PropValue::Missing)),
    }
    props.push(prop("LOADER ofs", PropValue::from_offset(rf.p_loader)));
    props.push(prop(
        "LOADER CPU",
        image_str(rf.loader_cpu().map(|cpu| &cpu[..6])),
    ));
    props.push(prop(
        "LOADER CPUcode",
        image_str(rf.loader_cpu().map(|cpu| &cpu[6..8])),
    ));

    props.push(prop("FID", image_str(rf.fid_str())));
    props.push(prop("&FID", PropValue::from_offset(rf.p_fid)));
    props.push(prop("FID CPU", image_str(rf.fid_cpu())));
    props.push(prop(
        "FID CPUcode",
        image_str(rf.fid_cpu().map(|cpu| &cpu[6..8])),
    ));

    if rf.p_ramf.is_some() {
        props.push(prop(
            "RAMF_weird",
            PropValue::Text(format!("{:+}", rf.ramf_offset)),
        ));
        props.push(prop("RAMjump_entry", PropValue::from_offset(rf.ramjump)));
    } else {
        props.push(prop("RAMF_weird", PropValue::Missing));
        props.push(prop("RAMjump_entry", PropValue::Missing));
    }

    if features.contains(Features::IVT2) {
        props.push(prop("IVT2", PropValue::from_offset(rf.p_ivt2)));
        props.push(prop(
            "IVT2 confidence",
            PropValue::Text(format!("{:02}", rf.ivt2_confidence)),
        ));
    } else {
        props.push(prop("IVT2", PropValue::Missing));
        props.push(prop("IVT2 confidence", PropValue::Missing));
    }

    if features.contains(Features::STD_CKS) {
        props.push(prop("std cks?", PropValue::Flag(rf.cks_std_good)));
        props.push(prop("&std_s", PropValue::from_offset(rf.p_cks)));
        props.push(prop("&std_x", PropValue::from_offset(rf.p_ckx)));
    } else {
        props.push(prop("std cks?", PropValue::Missing));
        props.push(prop("&std_s", PropValue::Missing));
        props.push(prop("&std_x", PropValue::Missing));
    }

    if features.contains(Features::ALT_CKS) {
        props.push(prop("alt cks?", PropValue::Flag(rf.cks_alt_good)));
        props.push(prop("&alt_s", PropValue::from_offset(rf.p_acs)));
        props.push(prop("&alt_x", PropValue::from_offset(rf.p_acx)));
        props.push(prop("alt_start", PropValue::from_offset(rf.p_acstart)));
        props.push(prop("alt_end", PropValue::from_offset(rf.p_acend)));
    } else {
        props.push(prop("alt cks?", PropValue::Missing));
        props.push(prop("&alt_s", PropValue::Missing));
        props.push(prop("&alt_x", PropValue::Missing));
        props.push(prop("alt_start", PropValue::Missing));
        props.push(prop("alt_end", PropValue::Missing));
    }

    if features.contains(Features::ALT2_CKS) {
        props.push(prop("alt2 cks?", PropValue::Flag(rf.cks_alt2_good)));
        props.push(prop("&alt2_s", PropValue::from_offset(rf.p_a2cs)));
        props.push(prop("&alt2_x", PropValue::from_offset(rf.p_a2cx)));
        props.push(prop("alt2_start", PropValue::from_offset(rf.p_ac2start)));
    } else {
        props.push(prop("alt2 cks?", PropValue::Missing));
        props.push(prop("&alt2_s", PropValue::Missing));
        props.push(prop("&alt2_x", PropValue::Missing));
        props.push(prop("alt2_start", PropValue::Missing));
    }

    props.push(prop("RIPEMD160", PropValue::Flag(rf.has_rm160)));
    props.push(prop(
        "MD5",
        digest.map_or(PropValue::Missing, |d| PropValue::Text(d.to_owned())),
    ));

    props
}

/// The CSV header line matching [`properties`] order.
pub fn csv_header() -> String {
    // Property names are static; a blank record yields the same header
    // as any analyzed one.
    let blank = RomFile::new(Vec::new(), "");
    let names: Vec<String> = properties(&blank, None)
        .iter()
        .map(|p| format!("\"{}\"", p.name))
        .collect();
    names.join(",")
}

/// Try to extract an ECUID from a filename.
///
/// The first `-_. `-delimited token of the basename qualifies when it is
/// 5 alphanumerics, or 6 starting with `1` (the prefix digit is then
/// dropped). The result is uppercased.
pub fn ecuid_from_filename(filename: &str) -> Option<String> {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);
    if base.len() < 5 {
        return None;
    }

    // Only the token head matters: 6 chars of candidate plus separator.
    let head: String = base.chars().take(7).collect();
    let token = head.split(['-', '_', '.', ' ']).next()?;
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    let token = token.to_ascii_uppercase();
    match token.len() {
        5 => Some(token),
        6 if token.starts_with('1') => Some(token[1..].to_owned()),
        _ => None,
    }
}

/// Trait for rendering an analysis record.
pub trait RomFormatter {
    /// Render the complete record. `digest` is the optional MD5 string.
    fn format_rom(&self, rf: &RomFile, digest: Option<&str>) -> String;
}

/// Human-readable output, one `name<TAB>value` line per property.
#[derive(Debug, Clone, Copy, Default)]
pub struct HumanFormatter;

impl RomFormatter for HumanFormatter {
    fn format_rom(&self, rf: &RomFile, digest: Option<&str>) -> String {
        let mut out = String::new();
        for p in properties(rf, digest) {
            out.push_str(p.name);
            out.push('\t');
            out.push_str(&p.value.render());
            out.push('\n');
        }
        out
    }
}

/// One CSV row per record; pair with [`csv_header`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvFormatter;

impl RomFormatter for CsvFormatter {
    fn format_rom(&self, rf: &RomFile, digest: Option<&str>) -> String {
        let fields: Vec<String> = properties(rf, digest)
            .iter()
            .map(|p| match &p.value {
                PropValue::Text(s) => format!("\"{}\"", s.replace('"', "\"\"")),
                other => other.render(),
            })
            .collect();
        let mut row = fields.join(",");
        row.push('\n');
        row
    }
}

/// JSON object output, property names as keys.
#[derive(Debug, Clone, Copy)]
pub struct JsonFormatter {
    /// Pretty-print the object.
    pub pretty: bool,
}

impl Default for JsonFormatter {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl RomFormatter for JsonFormatter {
    fn format_rom(&self, rf: &RomFile, digest: Option<&str>) -> String {
        let mut map = Map::new();
        for p in properties(rf, digest) {
            map.insert(p.name.to_owned(), p.value.to_json());
        }
        let value = Value::Object(map);
        if self.pretty {
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".to_owned())
        } else {
            serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_owned())
        }
    }
}
