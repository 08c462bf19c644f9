//! Vendor name extraction: Thai business-entity prefixes and Latin
//! corporate suffixes, then two progressively looser fallbacks.

use super::patterns::VENDOR_PATTERNS;
use crate::model::{FieldValue, TextRegion};

const KEYWORD_STOPWORDS: [&str; 6] = ["invoice", "total", "date", "no.", "receipt", "tax"];

pub fn extract_vendor(regions: &[TextRegion]) -> FieldValue<String> {
    if let Some((text, confidence)) = match_ranked_patterns(regions) {
        return FieldValue::present(text, confidence);
    }
    if let Some((text, confidence)) = short_region_fallback(regions) {
        return FieldValue::present(text, confidence);
    }
    if let Some((text, confidence)) = desperate_fallback(regions) {
        return FieldValue::present(text, confidence);
    }
    FieldValue::absent()
}

fn match_ranked_patterns(regions: &[TextRegion]) -> Option<(String, f64)> {
    for (rank, pattern) in VENDOR_PATTERNS.iter().enumerate() {
        for region in regions {
            if let Some(m) = pattern.captures(&region.text).and_then(|c| c.get(1)) {
                let confidence = region.confidence * (1.0 - 0.05 * rank as f64);
                return Some((m.as_str().trim().to_string(), confidence.clamp(0.0, 1.0)));
            }
        }
    }
    None
}

/// Highest-confidence short (<= 40 chars), non-keyword region among the
/// first three detected regions.
fn short_region_fallback(regions: &[TextRegion]) -> Option<(String, f64)> {
    regions
        .iter()
        .take(3)
        .filter(|r| r.text.chars().count() <= 40 && !is_keyword(&r.text))
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .map(|r| (r.text.trim().to_string(), r.confidence))
}

/// Last resort: the region maximizing `length * confidence`, confidence
/// rescaled into the 0.3-0.4 band to signal low trust.
fn desperate_fallback(regions: &[TextRegion]) -> Option<(String, f64)> {
    let best = regions
        .iter()
        .max_by(|a, b| {
            let score_a = a.text.chars().count() as f64 * a.confidence;
            let score_b = b.text.chars().count() as f64 * b.confidence;
            score_a.total_cmp(&score_b)
        })?;
    if best.text.trim().is_empty() {
        return None;
    }
    let scaled = 0.3 + 0.1 * best.confidence.clamp(0.0, 1.0);
    Some((best.text.trim().to_string(), scaled))
}

fn is_keyword(text: &str) -> bool {
    let lower = text.to_lowercase();
    KEYWORD_STOPWORDS.iter().any(|k| lower.contains(k))
}
