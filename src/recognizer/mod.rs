//! Recognizer — the pluggable text-extraction capability.
//!
//! The `Recognizer` trait and its `TesseractBackend` implementation are
//! grounded on the teacher's `OcrBackend` trait and `TesseractBackend`
//! (`src/ocr/backend.rs`, `src/ocr/tesseract.rs`): shell out to the
//! `tesseract` binary via `std::process::Command`, treat "binary not on
//! PATH" as a distinct backend-unavailable error rather than a recognition
//! failure. Dual-pass merge is new (§4.3) and has no teacher analog; it is
//! grounded on the region/IoU primitives in `model::region`.

mod dual_pass;
mod fixture;
mod tesseract_backend;

pub use dual_pass::merge_dual_pass;
pub use fixture::{FixtureRecognizer, NullRecognizer};
pub use tesseract_backend::TesseractBackend;

use async_trait::async_trait;
use image::GrayImage;

use crate::error::RecognizerError;
use crate::model::TextRegion;

/// A pluggable OCR capability: bytes in, text regions out.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn extract(
        &self,
        image: &GrayImage,
        confidence_threshold: f64,
    ) -> Result<Vec<TextRegion>, RecognizerError>;
}

/// Run `primary`, and if dual-pass mode is enabled also run `secondary` and
/// merge with `merge_dual_pass`. Returns the merged region list and
/// whether a second pass actually ran (for metadata's `dual_pass` flag).
pub async fn run(
    primary: &dyn Recognizer,
    secondary: Option<&dyn Recognizer>,
    image: &GrayImage,
    confidence_threshold: f64,
) -> Result<(Vec<TextRegion>, bool), RecognizerError> {
    let primary_regions = primary.extract(image, confidence_threshold).await?;
    match secondary {
        Some(secondary) => {
            let secondary_regions = secondary.extract(image, confidence_threshold).await?;
            Ok((merge_dual_pass(primary_regions, secondary_regions), true))
        }
        None => Ok((primary_regions, false)),
    }
}
