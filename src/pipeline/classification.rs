//! Document classification gate (spec-named "is this actually an
//! invoice-shaped document, not a photo of a cat").
//!
//! Five weighted signals combine into a single acceptance score; grounded
//! on the teacher's `RobotsChecker`-style weighted-signal gating in
//! `src/repository/crawl.rs`, generalized from crawl-permission scoring to
//! image-quality scoring.

use image::GrayImage;

use super::boundary::largest_blob_bbox;
use super::imgproc::{edge_density, otsu_threshold, threshold_binary};

/// Per-signal breakdown plus the accept/reject verdict.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationScores {
    pub text_density: f64,
    pub edge_structure: f64,
    pub rectangularity: f64,
    pub brightness_uniformity: f64,
    pub aspect_ratio: f64,
    pub total: f64,
}

/// Acceptance threshold: the weighted sum must reach at least this much.
pub const ACCEPT_THRESHOLD: f64 = 0.25;

pub fn classify(gray: &GrayImage) -> ClassificationScores {
    let text_density = text_density_signal(gray);
    let edge_structure = edge_structure_signal(gray);
    let rectangularity = rectangularity_signal(gray);
    let brightness_uniformity = brightness_uniformity_signal(gray);
    let aspect_ratio = aspect_ratio_signal(gray);

    let total = 0.35 * text_density
        + 0.25 * edge_structure
        + 0.20 * rectangularity
        + 0.10 * brightness_uniformity
        + 0.10 * aspect_ratio;

    ClassificationScores {
        text_density,
        edge_structure,
        rectangularity,
        brightness_uniformity,
        aspect_ratio,
        total,
    }
}

pub fn is_document(scores: &ClassificationScores) -> bool {
    scores.total >= ACCEPT_THRESHOLD
}

/// Sum of elongated horizontal foreground blob area over image area, as a
/// crude stand-in for morphological-close-then-contour-area text-line
/// density.
fn text_density_signal(gray: &GrayImage) -> f64 {
    let t = otsu_threshold(gray);
    let mask = threshold_binary(gray, t, true);
    match largest_blob_bbox(&mask) {
        Some(quad) => (quad.area() / (gray.width() as f64 * gray.height() as f64)).clamp(0.0, 1.0),
        None => 0.0,
    }
}

fn edge_structure_signal(gray: &GrayImage) -> f64 {
    edge_density(gray, 50).clamp(0.0, 1.0) * 3.0
}

/// Fraction of the frame occupied by the largest roughly-rectangular
/// bright blob, as a stand-in for "4-vertex polygonal approximation rate."
fn rectangularity_signal(gray: &GrayImage) -> f64 {
    let t = otsu_threshold(gray);
    let mask = threshold_binary(gray, t, true);
    let Some(quad) = largest_blob_bbox(&mask) else {
        return 0.0;
    };
    let bbox_area = quad.width() * quad.height();
    let blob_area = quad.area();
    if bbox_area <= 0.0 {
        0.0
    } else {
        (blob_area / bbox_area).clamp(0.0, 1.0)
    }
}

fn brightness_uniformity_signal(gray: &GrayImage) -> f64 {
    let pixels: Vec<f64> = gray.pixels().map(|p| p.0[0] as f64).collect();
    if pixels.is_empty() {
        return 0.0;
    }
    let mean = pixels.iter().sum::<f64>() / pixels.len() as f64;
    let variance = pixels.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / pixels.len() as f64;
    let stddev = variance.sqrt();
    let brightness_component = (mean / 255.0).clamp(0.0, 1.0);
    let uniformity_component = (1.0 - stddev / 128.0).clamp(0.0, 1.0);
    (brightness_component + uniformity_component) / 2.0
}

fn aspect_ratio_signal(gray: &GrayImage) -> f64 {
    let ratio = gray.width() as f64 / gray.height().max(1) as f64;
    if (1.2..=2.0).contains(&ratio) {
        1.0
    } else if (1.0..=3.5).contains(&ratio) {
        0.8
    } else if (3.5..=5.0).contains(&ratio) {
        0.6
    } else {
        let dist = if ratio < 1.0 { 1.0 - ratio } else { ratio - 5.0 };
        (0.6 - dist * 0.2).max(0.0)
    }
}
