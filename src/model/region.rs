//! Text region — a single recognizer output tuple.

use serde::{Deserialize, Serialize};

/// Detected script for a region of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Script {
    Th,
    En,
    Mixed,
    Numeric,
    Unknown,
}

/// Which recognizer pass produced a region, before dual-pass merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourcePass {
    Primary,
    Secondary,
}

/// Four integer vertices of a simple (non-self-intersecting) quadrilateral,
/// in order around the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Polygon {
    pub vertices: [(i32, i32); 4],
}

impl Polygon {
    pub fn from_bbox(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self {
            vertices: [(x, y), (x + w, y), (x + w, y + h), (x, y + h)],
        }
    }

    /// Axis-aligned bounding box of the polygon: `(min_x, min_y, max_x, max_y)`.
    pub fn bbox(&self) -> (i32, i32, i32, i32) {
        let xs = self.vertices.iter().map(|v| v.0);
        let ys = self.vertices.iter().map(|v| v.1);
        (
            xs.clone().min().unwrap(),
            ys.clone().min().unwrap(),
            xs.max().unwrap(),
            ys.max().unwrap(),
        )
    }

    /// Intersection-over-union of the axis-aligned bounding boxes of two
    /// polygons.
    pub fn iou(&self, other: &Polygon) -> f64 {
        let (ax0, ay0, ax1, ay1) = self.bbox();
        let (bx0, by0, bx1, by1) = other.bbox();

        let ix0 = ax0.max(bx0);
        let iy0 = ay0.max(by0);
        let ix1 = ax1.min(bx1);
        let iy1 = ay1.min(by1);

        let inter_w = (ix1 - ix0).max(0) as f64;
        let inter_h = (iy1 - iy0).max(0) as f64;
        let intersection = inter_w * inter_h;

        let area_a = ((ax1 - ax0).max(0) as f64) * ((ay1 - ay0).max(0) as f64);
        let area_b = ((bx1 - bx0).max(0) as f64) * ((by1 - by0).max(0) as f64);
        let union = area_a + area_b - intersection;

        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// A single recognizer output: a quadrilateral, its text, and a confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRegion {
    pub polygon: Polygon,
    pub text: String,
    pub confidence: f64,
    pub script: Script,
    pub source_pass: SourcePass,
    pub above_threshold: bool,
    /// Set when a dual-pass merge replaced this region's text with the
    /// higher-confidence alternative from the other pass.
    #[serde(default)]
    pub dual_pass_improved: bool,
}

impl TextRegion {
    pub fn new(polygon: Polygon, text: String, confidence: f64, source_pass: SourcePass) -> Self {
        let script = detect_script(&text);
        Self {
            polygon,
            text,
            confidence,
            script,
            source_pass,
            above_threshold: false,
            dual_pass_improved: false,
        }
    }
}

/// Classify the dominant script of `text` by character ratios.
pub fn detect_script(text: &str) -> Script {
    let mut thai = 0usize;
    let mut latin = 0usize;
    let mut digit = 0usize;
    let mut total = 0usize;

    for c in text.chars() {
        if c.is_whitespace() {
            continue;
        }
        total += 1;
        let cp = c as u32;
        if (0x0E00..=0x0E7F).contains(&cp) {
            thai += 1;
            if (0x0E50..=0x0E59).contains(&cp) {
                digit += 1;
            }
        } else if c.is_ascii_digit() {
            digit += 1;
        } else if c.is_ascii_alphabetic() {
            latin += 1;
        }
    }

    if total == 0 {
        return Script::Unknown;
    }

    let thai_ratio = thai as f64 / total as f64;
    let latin_ratio = latin as f64 / total as f64;
    let digit_ratio = digit as f64 / total as f64;

    if thai_ratio > 0.30 {
        if latin_ratio > 0.20 {
            Script::Mixed
        } else {
            Script::Th
        }
    } else if latin_ratio > 0.50 {
        Script::En
    } else if digit_ratio > 0.60 {
        Script::Numeric
    } else {
        Script::Unknown
    }
}

/// Fraction of Thai codepoints (U+0E00-U+0E7F) among non-whitespace chars.
pub fn thai_fraction(text: &str) -> f64 {
    let mut thai = 0usize;
    let mut total = 0usize;
    for c in text.chars() {
        if c.is_whitespace() {
            continue;
        }
        total += 1;
        if (0x0E00..=0x0E7F).contains(&(c as u32)) {
            thai += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        thai as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let p = Polygon::from_bbox(0, 0, 10, 10);
        assert!((p.iou(&p) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = Polygon::from_bbox(0, 0, 10, 10);
        let b = Polygon::from_bbox(100, 100, 10, 10);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn script_detection_thai_dominant() {
        assert_eq!(detect_script("ร้านอาหารดีใจ"), Script::Th);
    }

    #[test]
    fn script_detection_english() {
        assert_eq!(detect_script("Invoice Total"), Script::En);
    }

    #[test]
    fn script_detection_numeric() {
        assert_eq!(detect_script("245.50"), Script::Numeric);
    }

    #[test]
    fn thai_fraction_threshold() {
        assert!(thai_fraction("ร้านอาหารดีใจ") >= 0.20);
        assert_eq!(thai_fraction("Invoice"), 0.0);
    }
}
