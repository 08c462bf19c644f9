//! Test doubles for the `Recognizer` trait.

use async_trait::async_trait;
use image::GrayImage;

use super::Recognizer;
use crate::error::RecognizerError;
use crate::model::TextRegion;

/// Always returns an empty region list. Useful for exercising pipeline and
/// orchestrator paths without a real OCR backend.
#[derive(Debug, Default)]
pub struct NullRecognizer;

#[async_trait]
impl Recognizer for NullRecognizer {
    async fn extract(&self, _image: &GrayImage, _confidence_threshold: f64) -> Result<Vec<TextRegion>, RecognizerError> {
        Ok(Vec::new())
    }
}

/// Returns a fixed, pre-baked set of regions regardless of input, filtered
/// by `confidence_threshold`. Used in tests to exercise the extractor and
/// orchestrator without shelling out to a real recognizer binary.
pub struct FixtureRecognizer {
    regions: Vec<TextRegion>,
}

impl FixtureRecognizer {
    pub fn new(regions: Vec<TextRegion>) -> Self {
        Self { regions }
    }
}

#[async_trait]
impl Recognizer for FixtureRecognizer {
    async fn extract(&self, _image: &GrayImage, confidence_threshold: f64) -> Result<Vec<TextRegion>, RecognizerError> {
        Ok(self
            .regions
            .iter()
            .cloned()
            .map(|mut r| {
                r.above_threshold = r.confidence >= confidence_threshold;
                r
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::region::{Polygon, Script, SourcePass};

    #[tokio::test]
    async fn null_recognizer_returns_empty() {
        let recognizer = NullRecognizer;
        let img = GrayImage::new(10, 10);
        let regions = recognizer.extract(&img, 0.3).await.unwrap();
        assert!(regions.is_empty());
    }

    #[tokio::test]
    async fn fixture_recognizer_marks_above_threshold() {
        let region = TextRegion {
            polygon: Polygon::from_bbox(0, 0, 10, 10),
            text: "Total".to_string(),
            confidence: 0.4,
            script: Script::En,
            source_pass: SourcePass::Primary,
            above_threshold: false,
            dual_pass_improved: false,
        };
        let recognizer = FixtureRecognizer::new(vec![region]);
        let img = GrayImage::new(10, 10);
        let regions = recognizer.extract(&img, 0.5).await.unwrap();
        assert!(!regions[0].above_threshold);
    }
}
