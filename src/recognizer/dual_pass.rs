//! Dual-pass merge: reconcile two recognizer passes run over the same
//! image by bounding-box IoU, per the §4.3 merge rule.

use crate::model::region::thai_fraction;
use crate::model::TextRegion;

const IOU_MATCH_THRESHOLD: f64 = 0.5;
const THAI_DOMINANT_THRESHOLD: f64 = 0.20;
const OVERRIDE_MARGIN: f64 = 0.25;

/// For each primary region, find the best-IoU secondary region (if any
/// clears `IOU_MATCH_THRESHOLD`) and pick a winner per the Thai-dominance
/// rule. Unmatched secondary regions are appended unchanged.
pub fn merge_dual_pass(primary: Vec<TextRegion>, secondary: Vec<TextRegion>) -> Vec<TextRegion> {
    let mut secondary_used = vec![false; secondary.len()];
    let mut merged = Vec::with_capacity(primary.len() + secondary.len());

    for p in primary {
        let best = secondary
            .iter()
            .enumerate()
            .filter(|(i, _)| !secondary_used[*i])
            .map(|(i, s)| (i, p.polygon.iou(&s.polygon)))
            .filter(|(_, iou)| *iou >= IOU_MATCH_THRESHOLD)
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match best {
            Some((idx, _)) => {
                secondary_used[idx] = true;
                merged.push(pick_winner(p, &secondary[idx]));
            }
            None => merged.push(p),
        }
    }

    for (i, s) in secondary.into_iter().enumerate() {
        if !secondary_used[i] {
            merged.push(s);
        }
    }

    merged
}

fn pick_winner(primary: TextRegion, secondary: &TextRegion) -> TextRegion {
    let thai_dominant = thai_fraction(&primary.text) >= THAI_DOMINANT_THRESHOLD;

    let prefer_secondary = if thai_dominant {
        secondary.confidence >= primary.confidence * (1.0 + OVERRIDE_MARGIN)
    } else {
        !(primary.confidence >= secondary.confidence * (1.0 + OVERRIDE_MARGIN))
    };

    if prefer_secondary {
        let mut winner = secondary.clone();
        winner.dual_pass_improved = true;
        winner
    } else {
        primary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::region::{Polygon, Script, SourcePass};

    fn region(text: &str, confidence: f64, bbox: (i32, i32, i32, i32)) -> TextRegion {
        TextRegion {
            polygon: Polygon::from_bbox(bbox.0, bbox.1, bbox.2, bbox.3),
            text: text.to_string(),
            confidence,
            script: Script::Unknown,
            source_pass: SourcePass::Primary,
            above_threshold: true,
            dual_pass_improved: false,
        }
    }

    #[test]
    fn thai_dominant_region_keeps_primary_unless_secondary_clears_margin() {
        let primary = vec![region("ใบแจ้งหนี้", 0.6, (0, 0, 50, 20))];
        let secondary = vec![region("ใบแจงหน", 0.65, (0, 0, 50, 20))];
        let merged = merge_dual_pass(primary, secondary);
        assert_eq!(merged.len(), 1);
        assert!(!merged[0].dual_pass_improved);
    }

    #[test]
    fn thai_dominant_region_takes_secondary_when_margin_cleared() {
        let primary = vec![region("ใบแจ้งหนี้", 0.4, (0, 0, 50, 20))];
        let secondary = vec![region("ใบแจ้งหนี้ที่ถูกต้อง", 0.9, (0, 0, 50, 20))];
        let merged = merge_dual_pass(primary, secondary);
        assert!(merged[0].dual_pass_improved);
    }

    #[test]
    fn english_region_prefers_secondary_unless_primary_clears_margin() {
        let primary = vec![region("Invoice Total", 0.5, (0, 0, 50, 20))];
        let secondary = vec![region("Invoice Totaal", 0.55, (0, 0, 50, 20))];
        let merged = merge_dual_pass(primary, secondary);
        assert!(merged[0].dual_pass_improved);
    }

    #[test]
    fn unmatched_secondary_regions_are_appended() {
        let primary = vec![region("A", 0.5, (0, 0, 10, 10))];
        let secondary = vec![region("B", 0.5, (100, 100, 10, 10))];
        let merged = merge_dual_pass(primary, secondary);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn each_secondary_region_matches_at_most_once() {
        let primary = vec![region("A", 0.5, (0, 0, 10, 10)), region("B", 0.5, (0, 0, 10, 10))];
        let secondary = vec![region("C", 0.9, (0, 0, 10, 10))];
        let merged = merge_dual_pass(primary, secondary);
        assert_eq!(merged.len(), 2);
    }

    /// Property 8: merging regions with themselves is idempotent — the
    /// merged set carries the same text/confidence/polygon per region as
    /// the input, regardless of which pass "wins" the tie.
    #[test]
    fn merging_regions_with_themselves_yields_the_same_set() {
        let regions = vec![
            region("ใบแจ้งหนี้", 0.6, (0, 0, 50, 20)),
            region("Invoice Total", 0.8, (0, 30, 60, 20)),
            region("245.50", 0.95, (0, 60, 30, 20)),
        ];
        let merged = merge_dual_pass(regions.clone(), regions.clone());
        assert_eq!(merged.len(), regions.len());
        for (original, result) in regions.iter().zip(merged.iter()) {
            assert_eq!(result.text, original.text);
            assert_eq!(result.confidence, original.confidence);
            assert_eq!(result.polygon, original.polygon);
        }
    }
}
