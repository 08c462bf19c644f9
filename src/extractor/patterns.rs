//! Ranked regex tables for each extracted field.
//!
//! Grounded on `src/services/date_detection.rs`'s `DATE_PATTERNS`
//! (`static ... LazyLock<Vec<(Regex, &'static str)>>`), generalized from
//! one table to one per field.

use std::sync::LazyLock;

use regex::Regex;

/// Vendor name cues: Thai business-entity prefixes, then Latin corporate
/// suffixes. Rank = table index.
pub static VENDOR_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(ร้าน[ก-๙A-Za-z0-9\s\.]{2,40})").unwrap(),
        Regex::new(r"(บริษัท[ก-๙A-Za-z0-9\s\.]{2,60}(?:จำกัด)?)").unwrap(),
        Regex::new(r"(ห้างหุ้นส่วน[ก-๙A-Za-z0-9\s\.]{2,60})").unwrap(),
        Regex::new(r"(ห้าง[ก-๙A-Za-z0-9\s\.]{2,40})").unwrap(),
        Regex::new(r"(?:ผู้ขาย)[:\s]*([ก-๙A-Za-z0-9\s\.]{2,60})").unwrap(),
        Regex::new(r"([A-Za-z0-9\s\.,&]{2,60}\s+(?:Company|Corp|Corporation|Inc|Ltd|Co\.)\b)").unwrap(),
    ]
});

/// Invoice-number label cues, followed by the code pattern itself.
pub static INVOICE_NUMBER_LABELS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"(?i)(?:เลขที่|หมายเลข|inv(?:oice)?\.?\s*no\.?|no\.?)\s*[:#]?\s*([A-Z0-9\-/]{3,20})").unwrap(),
    ]
});

pub static INVOICE_NUMBER_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z]{1,4}[\-/]?\d{3,12})\b").unwrap());

/// `(pattern, format_tag)`, rank = table index, mirroring
/// `date_detection.rs`'s `(Regex, &'static str)` table shape.
pub static DATE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"(\d{1,2})\s+(ม\.?ค\.?|มกราคม|ก\.?พ\.?|กุมภาพันธ์|มี\.?ค\.?|มีนาคม|เม\.?ย\.?|เมษายน|พ\.?ค\.?|พฤษภาคม|มิ\.?ย\.?|มิถุนายน|ก\.?ค\.?|กรกฎาคม|ส\.?ค\.?|สิงหาคม|ก\.?ย\.?|กันยายน|ต\.?ค\.?|ตุลาคม|พ\.?ย\.?|พฤศจิกายน|ธ\.?ค\.?|ธันวาคม)\s+(\d{4})").unwrap(), "thai_long"),
        (Regex::new(r"(\d{4})-(\d{2})-(\d{2})").unwrap(), "ymd_dash"),
        (Regex::new(r"(\d{1,2})/(\d{1,2})/(\d{4})").unwrap(), "dmy_slash"),
        (Regex::new(r"(\d{1,2})-(\d{1,2})-(\d{4})").unwrap(), "dmy_dash"),
        (
            Regex::new(r"(\d{1,2})\s+(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)[a-z]*\s+(\d{4})").unwrap(),
            "en_long",
        ),
    ]
});

/// Thai month name/abbreviation, in calendar order, for `thai_long` parsing.
pub const THAI_MONTHS: [&str; 12] = [
    "มกราคม", "กุมภาพันธ์", "มีนาคม", "เมษายน", "พฤษภาคม", "มิถุนายน", "กรกฎาคม", "สิงหาคม",
    "กันยายน", "ตุลาคม", "พฤศจิกายน", "ธันวาคม",
];
pub const THAI_MONTHS_ABBREV: [&str; 12] = [
    "ม.ค.", "ก.พ.", "มี.ค.", "เม.ย.", "พ.ค.", "มิ.ย.", "ก.ค.", "ส.ค.", "ก.ย.", "ต.ค.", "พ.ย.", "ธ.ค.",
];

/// Thai total-amount labels, ranked most- to least-specific.
pub static TOTAL_AMOUNT_LABELS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    vec!["รวมทั้งสิ้น", "ยอดสุทธิ", "ราคารวม", "รวม", "ทั้งหมด", "เป็นเงิน"]
});

/// Numeric amount token, optionally comma-grouped, optionally with a
/// Thai/ISO currency marker adjacent.
pub static AMOUNT_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9][0-9,]*(?:\.\d{1,2})?)\s*(?:฿|บาท|THB)?").unwrap());

pub static CURRENCY_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"฿|บาท|THB").unwrap());
