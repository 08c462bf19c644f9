//! Tesseract-backed recognizer: shells out to the `tesseract` binary's TSV
//! output mode, one word per line with a bounding box and a confidence.
//!
//! Grounded on `src/ocr/tesseract.rs`'s `run_tesseract` (spawn the binary,
//! treat `ErrorKind::NotFound` as a distinct "backend not installed" error
//! rather than an OCR failure) and `src/ocr/model_utils.rs`'s
//! `check_binary` availability probe.

use std::io::ErrorKind;

use async_trait::async_trait;
use image::GrayImage;
use tempfile::TempDir;
use tokio::process::Command;

use super::Recognizer;
use crate::error::RecognizerError;
use crate::model::region::{Polygon, SourcePass};
use crate::model::TextRegion;

pub struct TesseractBackend {
    language: String,
}

impl TesseractBackend {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    /// True if the `tesseract` binary is on `PATH`.
    pub async fn is_available() -> bool {
        Command::new("tesseract")
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Recognizer for TesseractBackend {
    async fn extract(
        &self,
        image: &GrayImage,
        confidence_threshold: f64,
    ) -> Result<Vec<TextRegion>, RecognizerError> {
        let temp_dir =
            TempDir::new().map_err(|e| RecognizerError::Failed(format!("temp dir: {e}")))?;
        let image_path = temp_dir.path().join("input.png");
        image
            .save(&image_path)
            .map_err(|e| RecognizerError::Failed(format!("encode temp image: {e}")))?;

        let output = Command::new("tesseract")
            .arg(&image_path)
            .arg("stdout")
            .args(["-l", &self.language])
            .arg("tsv")
            .output()
            .await;

        let output = match output {
            Ok(o) => o,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RecognizerError::BackendUnavailable(
                    "tesseract not found on PATH (install tesseract-ocr)".to_string(),
                ));
            }
            Err(e) => return Err(RecognizerError::Failed(e.to_string())),
        };

        if !output.status.success() {
            return Err(RecognizerError::Failed(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let regions = parse_tsv(&tsv, confidence_threshold);
        Ok(regions)
    }
}

/// Parse tesseract's `tsv` output mode: tab-separated columns
/// `level page_num block_num par_num line_num word_num left top width
/// height conf text`. Rows with `conf == -1` are structural (block/line
/// markers, not words) and are skipped.
fn parse_tsv(tsv: &str, confidence_threshold: f64) -> Vec<TextRegion> {
    let mut regions = Vec::new();
    for line in tsv.lines().skip(1) {
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        let (left, top, width, height, conf, text) = (cols[6], cols[7], cols[8], cols[9], cols[10], cols[11]);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let (Ok(left), Ok(top), Ok(width), Ok(height), Ok(conf)) = (
            left.parse::<i32>(),
            top.parse::<i32>(),
            width.parse::<i32>(),
            height.parse::<i32>(),
            conf.parse::<f64>(),
        ) else {
            continue;
        };
        if conf < 0.0 {
            continue;
        }
        let confidence = (conf / 100.0).clamp(0.0, 1.0);
        let mut region = TextRegion::new(
            Polygon::from_bbox(left, top, width, height),
            text.to_string(),
            confidence,
            SourcePass::Primary,
        );
        region.above_threshold = confidence >= confidence_threshold;
        regions.push(region);
    }
    regions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tsv_skips_structural_rows_and_keeps_words() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
                   1\t1\t0\t0\t0\t0\t0\t0\t100\t100\t-1\t\n\
                   5\t1\t1\t1\t1\t1\t10\t20\t30\t15\t91.5\tTotal\n";
        let regions = parse_tsv(tsv, 0.3);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].text, "Total");
        assert!((regions[0].confidence - 0.915).abs() < 1e-9);
        assert!(regions[0].above_threshold);
    }

    #[test]
    fn parse_tsv_ignores_malformed_rows() {
        let tsv = "header\n1\t2\t3\n";
        let regions = parse_tsv(tsv, 0.3);
        assert!(regions.is_empty());
    }
}
