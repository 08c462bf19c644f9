//! Line-item extraction: regions carrying an amount-like token at
//! confidence >= 0.6 become individual line items.

use super::patterns::AMOUNT_NUMBER;
use crate::model::{LineItem, TextRegion};

const MIN_CONFIDENCE: f64 = 0.6;
const MAX_LINE_ITEMS: usize = 10;

pub fn extract_line_items(regions: &[TextRegion]) -> Vec<LineItem> {
    let mut items: Vec<LineItem> = regions
        .iter()
        .filter(|r| r.confidence >= MIN_CONFIDENCE)
        .filter_map(|r| {
            let cap = AMOUNT_NUMBER.captures(&r.text)?;
            let matched = cap.get(0)?;
            let amount: f64 = cap.get(1)?.as_str().replace(',', "").parse().ok()?;
            let description = strip_amount(&r.text, matched.as_str());
            Some(LineItem {
                description,
                amount,
                confidence: r.confidence,
            })
        })
        .collect();

    items.truncate(MAX_LINE_ITEMS);
    items
}

fn strip_amount(text: &str, matched: &str) -> String {
    text.replacen(matched, "", 1).trim().trim_matches(|c: char| c == '-' || c == ':').trim().to_string()
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
    fn extracts_description_and_amount() {
        let regions = vec![region("Coffee 120.00", 0.7)];
        let items = extract_line_items(&regions);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].description, "Coffee");
        assert_eq!(items[0].amount, 120.0);
    }

    #[test]
    fn excludes_low_confidence_regions() {
        let regions = vec![region("Coffee 120.00", 0.5)];
        let items = extract_line_items(&regions);
        assert!(items.is_empty());
    }

    #[test]
    fn clamps_to_ten_entries() {
        let regions: Vec<TextRegion> = (0..15).map(|i| region(&format!("Item{i} 10.00"), 0.8)).collect();
        let items = extract_line_items(&regions);
        assert_eq!(items.len(), 10);
    }
}
