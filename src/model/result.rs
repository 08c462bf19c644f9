//! OCR result record — one per successfully completed job.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::region::TextRegion;

/// Processing-quality grade assigned to a completed pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Good,
    Acceptable,
    Poor,
}

/// A scalar extracted field. Absence is represented by `value: null,
/// confidence: 0`, never by a missing key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldValue<T> {
    pub value: Option<T>,
    pub confidence: f64,
}

impl<T> FieldValue<T> {
    pub fn absent() -> Self {
        Self {
            value: None,
            confidence: 0.0,
        }
    }

    pub fn present(value: T, confidence: f64) -> Self {
        Self {
            value: Some(value),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// A single extracted line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub amount: f64,
    pub confidence: f64,
}

/// Processing metadata attached to a completed `OcrResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrMetadata {
    pub stages_run: Vec<String>,
    pub operations_failed: Vec<(String, String)>,
    pub preprocessing_applied: Vec<String>,
    pub processing_quality: Quality,
    pub quality_before: f64,
    pub quality_after: f64,
    pub model_descriptor: String,
    pub dual_pass: bool,
    pub timings_ms: HashMap<String, u64>,
}

/// The structured result of a completed invoice OCR job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrResult {
    pub job_id: String,
    pub submitter_id: String,
    pub created_at: DateTime<Utc>,

    pub vendor: FieldValue<String>,
    pub invoice_number: FieldValue<String>,
    pub date: FieldValue<String>,
    pub total_amount: FieldValue<f64>,
    pub line_items: Vec<LineItem>,

    /// Raw region list, clamped to at most 20 entries.
    pub raw_regions: Vec<TextRegion>,
    pub overall_confidence: f64,
    pub metadata: OcrMetadata,
}

impl OcrResult {
    /// Recompute `overall_confidence` as the length-weighted mean of region
    /// confidences, `w_i = max(1, len(text_i)/10)` — Testable Property 7.
    pub fn compute_overall_confidence(regions: &[TextRegion]) -> f64 {
        if regions.is_empty() {
            return 0.0;
        }
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for r in regions {
            let w = (r.text.chars().count() as f64 / 10.0).max(1.0);
            weighted_sum += r.confidence * w;
            weight_total += w;
        }
        if weight_total <= 0.0 {
            0.0
        } else {
            weighted_sum / weight_total
        }
    }

    /// Clamp `raw_regions` to at most 20 entries and `line_items` to at
    /// most 10, per the data-model invariants.
    pub fn clamp_lists(&mut self) {
        self.raw_regions.truncate(20);
        self.line_items.truncate(10);
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
    fn overall_confidence_is_length_weighted() {
        let regions = vec![region("short", 0.5), region("a much longer piece of text", 0.9)];
        let c = OcrResult::compute_overall_confidence(&regions);
        assert!(c > 0.5 && c < 0.9);
    }

    #[test]
    fn overall_confidence_of_empty_is_zero() {
        assert_eq!(OcrResult::compute_overall_confidence(&[]), 0.0);
    }

    #[test]
    fn field_value_absent_has_zero_confidence_and_null_value() {
        let fv: FieldValue<String> = FieldValue::absent();
        assert!(fv.value.is_none());
        assert_eq!(fv.confidence, 0.0);
    }

    #[test]
    fn field_value_present_clamps_confidence() {
        let fv = FieldValue::present("x".to_string(), 1.5);
        assert_eq!(fv.confidence, 1.0);
    }

    #[test]
    fn clamp_lists_enforces_bounds() {
        let mut result = OcrResult {
            job_id: "j".into(),
            submitter_id: "u".into(),
            created_at: Utc::now(),
            vendor: FieldValue::absent(),
            invoice_number: FieldValue::absent(),
            date: FieldValue::absent(),
            total_amount: FieldValue::absent(),
            line_items: (0..15).map(|i| LineItem { description: format!("item{i}"), amount: 1.0, confidence: 0.9 }).collect(),
            raw_regions: (0..30).map(|_| region("x", 0.5)).collect(),
            overall_confidence: 0.5,
            metadata: OcrMetadata {
                stages_run: vec![],
                operations_failed: vec![],
                preprocessing_applied: vec![],
                processing_quality: Quality::Good,
                quality_before: 0.0,
                quality_after: 0.0,
                model_descriptor: "test".into(),
                dual_pass: false,
                timings_ms: HashMap::new(),
            },
        };
        result.clamp_lists();
        assert_eq!(result.raw_regions.len(), 20);
        assert_eq!(result.line_items.len(), 10);
    }
}
