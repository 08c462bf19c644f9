//! Invoice date extraction: Thai and English month names, Buddhist-era
//! years, and several numeric date layouts.

use chrono::NaiveDate;

use super::patterns::{DATE_PATTERNS, THAI_MONTHS, THAI_MONTHS_ABBREV};
use crate::model::{FieldValue, TextRegion};

const EN_MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

pub fn extract_date(regions: &[TextRegion]) -> FieldValue<String> {
    for (rank, (pattern, format)) in DATE_PATTERNS.iter().enumerate() {
        for region in regions {
            if let Some(caps) = pattern.captures(&region.text) {
                if let Some(date) = parse_captured(&caps, format) {
                    let confidence = region.confidence * (1.0 - 0.1 * rank as f64);
                    return FieldValue::present(date.format("%Y-%m-%d").to_string(), confidence.max(0.0));
                }
            }
        }
    }
    FieldValue::absent()
}

fn parse_captured(caps: &regex::Captures, format: &str) -> Option<NaiveDate> {
    match format {
        "thai_long" => {
            let day: u32 = caps.get(1)?.as_str().parse().ok()?;
            let month_text = caps.get(2)?.as_str();
            let month = thai_month_index(month_text)? as u32 + 1;
            let year = normalize_buddhist_year(caps.get(3)?.as_str().parse().ok()?);
            NaiveDate::from_ymd_opt(year, month, day)
        }
        "ymd_dash" => {
            let year: i32 = caps.get(1)?.as_str().parse().ok()?;
            let month: u32 = caps.get(2)?.as_str().parse().ok()?;
            let day: u32 = caps.get(3)?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        }
        "dmy_slash" | "dmy_dash" => {
            let day: u32 = caps.get(1)?.as_str().parse().ok()?;
            let month: u32 = caps.get(2)?.as_str().parse().ok()?;
            let year = normalize_buddhist_year(caps.get(3)?.as_str().parse().ok()?);
            NaiveDate::from_ymd_opt(year, month, day)
        }
        "en_long" => {
            let day: u32 = caps.get(1)?.as_str().parse().ok()?;
            let month_text = caps.get(2)?.as_str().to_lowercase();
            let month = EN_MONTHS.iter().position(|m| *m == month_text)? as u32 + 1;
            let year: i32 = caps.get(3)?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        }
        _ => None,
    }
}

fn thai_month_index(text: &str) -> Option<usize> {
    let normalized = text.trim_end_matches('.');
    THAI_MONTHS
        .iter()
        .position(|m| *m == text)
        .or_else(|| THAI_MONTHS_ABBREV.iter().position(|m| m.trim_end_matches('.') == normalized))
}

/// Thai invoices commonly print years in the Buddhist Era (543 years
/// ahead of the Common Era). Any year past a plausible CE invoice date is
/// treated as BE and converted.
fn normalize_buddhist_year(year: i32) -> i32 {
    if year > 2100 {
        year - 543
    } else {
        year
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
    fn parses_iso_date() {
        let regions = vec![region("Date: 2024-03-15", 0.9)];
        let result = extract_date(&regions);
        assert_eq!(result.value.unwrap(), "2024-03-15");
    }

    #[test]
    fn parses_buddhist_era_thai_long_form() {
        let regions = vec![region("15 มีนาคม 2567", 0.9)];
        let result = extract_date(&regions);
        assert_eq!(result.value.unwrap(), "2024-03-15");
    }

    #[test]
    fn parses_slash_dmy() {
        let regions = vec![region("15/03/2024", 0.8)];
        let result = extract_date(&regions);
        assert_eq!(result.value.unwrap(), "2024-03-15");
    }

    #[test]
    fn absent_when_no_date_like_text() {
        let regions = vec![region("no date here", 0.8)];
        let result = extract_date(&regions);
        assert!(result.value.is_none());
    }
}
