//! Field Extractor — turns recognizer output into the structured invoice
//! fields the result record carries.
//!
//! Regex table shape (`LazyLock<Vec<Regex>>` / `LazyLock<Vec<(Regex,
//! &'static str)>>`) is grounded on `src/services/date_detection.rs`'s
//! `DATE_PATTERNS`.

mod amount;
mod date;
mod invoice_number;
mod line_items;
mod patterns;
mod vendor;

use crate::model::{FieldValue, LineItem, TextRegion};

pub use amount::extract_total_amount;
pub use date::extract_date;
pub use invoice_number::extract_invoice_number;
pub use line_items::extract_line_items;
pub use vendor::extract_vendor;

/// All extracted fields for one completed job.
pub struct ExtractedFields {
    pub vendor: FieldValue<String>,
    pub invoice_number: FieldValue<String>,
    pub date: FieldValue<String>,
    pub total_amount: FieldValue<f64>,
    pub line_items: Vec<LineItem>,
}

pub fn extract_fields(regions: &[TextRegion]) -> ExtractedFields {
    ExtractedFields {
        vendor: extract_vendor(regions),
        invoice_number: extract_invoice_number(regions),
        date: extract_date(regions),
        total_amount: extract_total_amount(regions),
        line_items: extract_line_items(regions),
    }
}
