//! Total-amount extraction: Thai labels ranked by specificity, then a
//! generic numeric fallback.

use super::patterns::{AMOUNT_NUMBER, TOTAL_AMOUNT_LABELS};
use crate::model::{FieldValue, TextRegion};

const MAX_PLAUSIBLE_AMOUNT: f64 = 1_000_000.0;
const LOOKAHEAD_CHARS: usize = 30;

pub fn extract_total_amount(regions: &[TextRegion]) -> FieldValue<f64> {
    for (rank, &label) in TOTAL_AMOUNT_LABELS.iter().enumerate() {
        let best = regions
            .iter()
            .filter_map(|r| {
                let idx = r.text.find(label)?;
                let window_start = idx + label.len();
                let window = &r.text[window_start..];
                let amount = parse_amount_near(window)?;
                Some((amount, r.confidence))
            })
            .max_by(|a, b| a.1.total_cmp(&b.1));

        if let Some((amount, region_confidence)) = best {
            let confidence = region_confidence * (1.0 - 0.05 * rank as f64);
            return FieldValue::present(amount, confidence.max(0.0));
        }
    }

    let rank = TOTAL_AMOUNT_LABELS.len();
    let fallback = regions
        .iter()
        .filter_map(|r| parse_amount_near(&r.text).map(|amount| (amount, r.confidence)))
        .max_by(|a, b| a.1.total_cmp(&b.1));

    match fallback {
        Some((amount, region_confidence)) => {
            let confidence = region_confidence * (1.0 - 0.05 * rank as f64);
            FieldValue::present(amount, confidence.max(0.0))
        }
        None => FieldValue::absent(),
    }
}

/// Find and parse the first plausible numeric amount within the next
/// `LOOKAHEAD_CHARS` characters of `text`.
fn parse_amount_near(text: &str) -> Option<f64> {
    let window: String = text.chars().take(LOOKAHEAD_CHARS).collect();
    let cap = AMOUNT_NUMBER.captures(&window)?;
    parse_numeric_token(cap.get(1)?.as_str())
}

fn parse_numeric_token(token: &str) -> Option<f64> {
    let cleaned: String = token.chars().filter(|&c| c != ',').collect();
    let value: f64 = cleaned.parse().ok()?;
    if value > 0.0 && value <= MAX_PLAUSIBLE_AMOUNT {
        Some(value)
    } else {
        None
    }
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
    fn matches_highest_priority_label_first() {
        let regions = vec![region("รวม 900.00", 0.8), region("รวมทั้งสิ้น 1,250.50", 0.9)];
        let result = extract_total_amount(&regions);
        assert_eq!(result.value.unwrap(), 1250.50);
    }

    #[test]
    fn strips_commas_from_amount() {
        let regions = vec![region("รวมทั้งสิ้น 12,345.00 บาท", 0.9)];
        let result = extract_total_amount(&regions);
        assert_eq!(result.value.unwrap(), 12345.00);
    }

    #[test]
    fn rejects_out_of_bounds_amounts() {
        let regions = vec![region("รวมทั้งสิ้น 99999999", 0.9)];
        let result = extract_total_amount(&regions);
        assert!(result.value.is_none());
    }

    #[test]
    fn falls_back_to_generic_number_when_no_label_present() {
        let regions = vec![region("245.50", 0.7)];
        let result = extract_total_amount(&regions);
        assert_eq!(result.value.unwrap(), 245.50);
    }
}
