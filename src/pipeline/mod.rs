//! Image Pipeline — decode, gate, and enhance an invoice photo before it
//! reaches the recognizer.
//!
//! The stage list and graceful-degradation envelope are grounded on the
//! teacher's layered OCR-engine fallback (`src/ocr/mod.rs`: try the
//! primary engine, fall back, and only then give up), generalized here
//! from "one fallback for the whole job" to "each stage gets its own
//! primary/fallback/skip envelope, and the pipeline as a whole never
//! fails except at decode or the classification gate."

pub mod boundary;
pub mod classification;
mod imgproc;
pub mod scoring;
mod stages;

use std::path::PathBuf;

use image::GrayImage;
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::model::Quality;
use boundary::{detect_boundary, BoundaryStrategy, Quad};
use classification::ClassificationScores;
use stages::Attempt;

/// Pipeline-local failure: either the input can't be decoded at all, or
/// the classification gate rejected it. Both are terminal for the job.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not decode image: {0}")]
    Decode(String),
    #[error("image rejected by document classifier ({0})")]
    NonDocument(ClassificationScores),
}

/// Everything downstream stages (recognizer, result store, webhook) need
/// to know about how the image was prepared.
pub struct PipelineOutput {
    pub image: GrayImage,
    pub operations_applied: Vec<String>,
    pub operations_failed: Vec<(String, String)>,
    pub quality_before: f64,
    pub quality_after: f64,
    pub processing_quality: Quality,
    pub boundary_strategy: Option<&'static str>,
    pub classification_scores: ClassificationScores,
}

struct DebugSink {
    dir: Option<PathBuf>,
    job_id: String,
    index: u32,
}

impl DebugSink {
    fn write(&mut self, stage: &str, img: &GrayImage) {
        let Some(root) = &self.dir else { return };
        self.index += 1;
        let job_dir = root.join(&self.job_id);
        if std::fs::create_dir_all(&job_dir).is_err() {
            return;
        }
        let path = job_dir.join(format!("{:02}_{}.png", self.index, stage));
        let _ = img.save(&path);
    }
}

/// Overall sharpness/contrast proxy used for the before/after quality
/// scores in metadata: normalized edge density, a cheap stand-in for a
/// full no-reference quality metric.
fn quality_score(img: &GrayImage) -> f64 {
    imgproc::edge_density(img, 30).clamp(0.0, 1.0) * 4.0
}

pub fn run(bytes: &[u8], config: &PipelineConfig, job_id: &str) -> Result<PipelineOutput, PipelineError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| PipelineError::Decode(e.to_string()))?;
    let gray = decoded.to_luma8();

    let mut sink = DebugSink {
        dir: config.debug_dir.clone(),
        job_id: job_id.to_string(),
        index: 0,
    };

    let quality_before = quality_score(&gray);

    let mut operations_applied = Vec::new();
    let mut operations_failed = Vec::new();
    let mut core_stage_successes = 0u32;
    let disabled = |name: &str| config.disabled_stages.iter().any(|s| s == name);

    // 1. resize
    let mut image = if disabled("resize") {
        operations_failed.push(("resize".to_string(), "disabled by configuration".to_string()));
        gray.clone()
    } else {
        let resize_attempt = stages::resize(&gray, config.max_width, config.max_height);
        core_stage_successes += 1;
        apply(resize_attempt, gray.clone(), "resize", &mut operations_applied, &mut operations_failed, &mut sink)
    };

    // 2. document_classification gate (not disable-able: it's the safety gate)
    let classification_scores = classification::classify(&image);
    if !classification::is_document(&classification_scores) {
        return Err(PipelineError::NonDocument(classification_scores));
    }
    operations_applied.push("document_classification".to_string());

    // Boundary detection runs once and its result is shared by crop_invoice
    // and perspective_correct.
    let boundary = detect_boundary(&image);
    let boundary_strategy = boundary.as_ref().map(|(_, strategy, _)| strategy_label(*strategy));

    // 3. crop_invoice
    if disabled("crop_invoice") {
        operations_failed.push(("crop_invoice".to_string(), "disabled by configuration".to_string()));
    } else {
        let crop_attempt = stages::crop_invoice(&image, boundary.as_ref().map(|(q, _, _)| q));
        image = apply(crop_attempt, image.clone(), "crop_invoice", &mut operations_applied, &mut operations_failed, &mut sink);
    }

    // Re-detect boundary against the cropped frame for perspective_correct,
    // since crop shifts coordinates.
    let boundary_after_crop = detect_boundary(&image);

    // 4. denoise
    if disabled("denoise") {
        operations_failed.push(("denoise".to_string(), "disabled by configuration".to_string()));
    } else {
        let denoise_attempt = stages::denoise(&image);
        image = apply(denoise_attempt, image.clone(), "denoise", &mut operations_applied, &mut operations_failed, &mut sink);
    }

    // 5. enhance_contrast
    if disabled("enhance_contrast") {
        operations_failed.push(("enhance_contrast".to_string(), "disabled by configuration".to_string()));
    } else {
        let contrast_attempt = stages::enhance_contrast(&image);
        let contrast_succeeded = matches!(contrast_attempt, Attempt::Primary(_));
        image = apply(contrast_attempt, image.clone(), "enhance_contrast", &mut operations_applied, &mut operations_failed, &mut sink);
        if contrast_succeeded {
            core_stage_successes += 1;
        }
    }

    // 6. perspective_correct
    if disabled("perspective_correct") {
        operations_failed.push(("perspective_correct".to_string(), "disabled by configuration".to_string()));
    } else {
        let quad_ref: Option<&Quad> = boundary_after_crop.as_ref().map(|(q, _, _)| q);
        let perspective_attempt = stages::perspective_correct(&image, quad_ref);
        image = apply(perspective_attempt, image.clone(), "perspective_correct", &mut operations_applied, &mut operations_failed, &mut sink);
    }

    // 7. deskew
    if disabled("deskew") {
        operations_failed.push(("deskew".to_string(), "disabled by configuration".to_string()));
    } else {
        let deskew_attempt = stages::deskew(&image);
        image = apply(deskew_attempt, image.clone(), "deskew", &mut operations_applied, &mut operations_failed, &mut sink);
    }

    // 8. sharpen
    if disabled("sharpen") {
        operations_failed.push(("sharpen".to_string(), "disabled by configuration".to_string()));
    } else {
        let sharpen_attempt = stages::sharpen(&image);
        image = apply(sharpen_attempt, image.clone(), "sharpen", &mut operations_applied, &mut operations_failed, &mut sink);
    }

    // 9. threshold
    if disabled("threshold") {
        operations_failed.push(("threshold".to_string(), "disabled by configuration".to_string()));
    } else {
        let threshold_attempt = stages::threshold(&image);
        let threshold_succeeded = matches!(threshold_attempt, Attempt::Primary(_));
        image = apply(threshold_attempt, image.clone(), "threshold", &mut operations_applied, &mut operations_failed, &mut sink);
        if threshold_succeeded {
            core_stage_successes += 1;
        }
    }

    let quality_after = quality_score(&image);
    let processing_quality = match core_stage_successes {
        0 => Quality::Poor,
        1 => Quality::Acceptable,
        _ => Quality::Good,
    };

    Ok(PipelineOutput {
        image,
        operations_applied,
        operations_failed,
        quality_before,
        quality_after,
        processing_quality,
        boundary_strategy,
        classification_scores,
    })
}

fn strategy_label(strategy: BoundaryStrategy) -> &'static str {
    strategy.as_str()
}

/// Apply a stage's outcome: primary and fallback results replace `current`;
/// a skip leaves `current` untouched but still records why.
fn apply(
    attempt: Attempt,
    current: GrayImage,
    stage: &str,
    applied: &mut Vec<String>,
    failed: &mut Vec<(String, String)>,
    sink: &mut DebugSink,
) -> GrayImage {
    match attempt {
        Attempt::Primary(img) => {
            applied.push(stage.to_string());
            sink.write(stage, &img);
            img
        }
        Attempt::Fallback(img, reason) => {
            applied.push(stage.to_string());
            failed.push((stage.to_string(), reason));
            sink.write(stage, &img);
            img
        }
        Attempt::Skipped(reason) => {
            failed.push((stage.to_string(), reason));
            current
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};

    fn document_like_png(w: u32, h: u32) -> Vec<u8> {
        let img: GrayImage = ImageBuffer::from_fn(w, h, |x, y| {
            if x > w / 10 && x < w * 9 / 10 && y > h / 10 && y < h * 9 / 10 {
                Luma([235])
            } else {
                Luma([15])
            }
        });
        let mut bytes = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut bytes);
        img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
        bytes
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            max_width: 512,
            max_height: 512,
            debug_dir: None,
            disabled_stages: Vec::new(),
        }
    }

    #[test]
    fn rejects_undecodable_bytes() {
        let err = run(&[1, 2, 3, 4], &test_config(), "job-1").unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn accepts_document_like_image_and_runs_core_stages() {
        let bytes = document_like_png(300, 200);
        let output = run(&bytes, &test_config(), "job-2").unwrap();
        assert!(output.operations_applied.contains(&"resize".to_string()));
        assert!(output.operations_applied.contains(&"document_classification".to_string()));
    }

    #[test]
    fn pipeline_never_fails_past_the_classification_gate() {
        let bytes = document_like_png(20, 20);
        let result = run(&bytes, &test_config(), "job-3");
        assert!(result.is_ok() || matches!(result, Err(PipelineError::NonDocument(_))));
    }
}
