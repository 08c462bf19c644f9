//! Invoice-number extraction: a labeled pattern first, a bare code pattern
//! second.

use super::patterns::{INVOICE_NUMBER_BARE, INVOICE_NUMBER_LABELS};
use crate::model::{FieldValue, TextRegion};

pub fn extract_invoice_number(regions: &[TextRegion]) -> FieldValue<String> {
    for (rank, pattern) in INVOICE_NUMBER_LABELS.iter().enumerate() {
        for region in regions {
            if let Some(m) = pattern.captures(&region.text).and_then(|c| c.get(1)) {
                let confidence = region.confidence * (1.0 - 0.05 * rank as f64);
                return FieldValue::present(m.as_str().to_string(), confidence);
            }
        }
    }

    let rank = INVOICE_NUMBER_LABELS.len();
    for region in regions {
        if let Some(m) = INVOICE_NUMBER_BARE.find(&region.text) {
            let confidence = region.confidence * (1.0 - 0.05 * rank as f64);
            return FieldValue::present(m.as_str().to_string(), confidence);
        }
    }

    FieldValue::absent()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::region::{Polygon, Script, SourcePass};

    fn region(text: &str, confidence: f64) -> TextRegion {
        TextRegion {
            polygon: Polygon::from_bbox(0, 0, 10, 10),
            text: text.to_string(),
            confidence,
            script: Script::Unknown,
            source_pass: SourcePass::Primary,
            above_threshold: true,
            dual_pass_improved: false,
        }
    }

    #[test]
    fn matches_labeled_invoice_number() {
        let regions = vec![region("เลขที่: INV-2024-001", 0.9)];
        let result = extract_invoice_number(&regions);
        assert_eq!(result.value.unwrap(), "INV-2024-001");
    }

    #[test]
    fn falls_back_to_bare_code_pattern() {
        let regions = vec![region("Reference ABC1234", 0.8)];
        let result = extract_invoice_number(&regions);
        assert_eq!(result.value.unwrap(), "ABC1234");
    }

    #[test]
    fn absent_when_nothing_matches() {
        let regions = vec![region("just some plain text", 0.8)];
        let result = extract_invoice_number(&regions);
        assert!(result.value.is_none());
    }
}
