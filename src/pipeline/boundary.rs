//! Document boundary detection: a cascade of increasingly permissive
//! strategies for finding the invoice's bounding quadrilateral, used by
//! `crop_invoice` and `perspective_correct`.
//!
//! Grounded on the teacher's layered-fallback shape (`src/ocr/mod.rs`'s
//! primary/fallback engine selection), generalized from "try engine A then
//! B" to "try detection strategy 1..4, first validated candidate wins."

use image::GrayImage;

use super::imgproc::{adaptive_threshold_mean, edge_density, otsu_threshold, threshold_binary};
use super::scoring::{score_candidate, CandidateScore};

/// An axis-ish bounding quadrilateral, stored as four corners in
/// top-left, top-right, bottom-right, bottom-left order. Detection in
/// this implementation always yields axis-aligned boxes (true
/// perspective quadrilaterals need real contour polygon approximation,
/// which is out of scope for the hand-rolled primitives here); the shape
/// still carries four independent corners so downstream perspective
/// correction has somewhere to warp from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub corners: [(f64, f64); 4],
}

impl Quad {
    pub fn from_bbox(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            corners: [(x0, y0), (x1, y0), (x1, y1), (x0, y1)],
        }
    }

    pub fn width(&self) -> f64 {
        let (tl, tr) = (self.corners[0], self.corners[1]);
        ((tr.0 - tl.0).powi(2) + (tr.1 - tl.1).powi(2)).sqrt()
    }

    pub fn height(&self) -> f64 {
        let (tl, bl) = (self.corners[0], self.corners[3]);
        ((bl.0 - tl.0).powi(2) + (bl.1 - tl.1).powi(2)).sqrt()
    }

    pub fn centroid(&self) -> (f64, f64) {
        let (sx, sy) = self.corners.iter().fold((0.0, 0.0), |acc, c| (acc.0 + c.0, acc.1 + c.1));
        (sx / 4.0, sy / 4.0)
    }

    /// Shoelace formula.
    pub fn area(&self) -> f64 {
        let mut sum = 0.0;
        for i in 0..4 {
            let (x0, y0) = self.corners[i];
            let (x1, y1) = self.corners[(i + 1) % 4];
            sum += x0 * y1 - x1 * y0;
        }
        (sum / 2.0).abs()
    }

    pub fn perimeter(&self) -> f64 {
        (0..4)
            .map(|i| {
                let (x0, y0) = self.corners[i];
                let (x1, y1) = self.corners[(i + 1) % 4];
                ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt()
            })
            .sum()
    }
}

/// Which cascade stage produced the accepted candidate, for metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryStrategy {
    AdaptiveCanny,
    ColorSegmentation,
    EnhancedContour,
    TextRegionCluster,
}

impl BoundaryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BoundaryStrategy::AdaptiveCanny => "adaptive_canny",
            BoundaryStrategy::ColorSegmentation => "color_segmentation",
            BoundaryStrategy::EnhancedContour => "enhanced_contour",
            BoundaryStrategy::TextRegionCluster => "text_region_cluster",
        }
    }
}

/// Run the detection cascade; the first stage whose best candidate clears
/// its validation threshold wins.
pub fn detect_boundary(gray: &GrayImage) -> Option<(Quad, BoundaryStrategy, CandidateScore)> {
    if let Some((q, score)) = adaptive_canny(gray) {
        if score.total >= 0.75 {
            return Some((q, BoundaryStrategy::AdaptiveCanny, score));
        }
    }
    if let Some((q, score)) = color_segmentation(gray) {
        if score.total >= 0.4 && score.position >= 0.5 {
            return Some((q, BoundaryStrategy::ColorSegmentation, score));
        }
    }
    if let Some((q, score)) = enhanced_contour(gray) {
        if score.total >= 0.7 {
            return Some((q, BoundaryStrategy::EnhancedContour, score));
        }
    }
    text_region_cluster(gray).map(|(q, score)| (q, BoundaryStrategy::TextRegionCluster, score))
}

/// Conservative/moderate/aggressive/adaptive-mean/adaptive-stddev edge
/// thresholds, each producing one bounding-box candidate from the largest
/// connected foreground blob; the highest-scoring candidate is returned.
fn adaptive_canny(gray: &GrayImage) -> Option<(Quad, CandidateScore)> {
    let thresholds: [u8; 5] = [40, 60, 90, edge_mean_threshold(gray), edge_stddev_threshold(gray)];
    best_candidate_over(gray, &thresholds, |g, t| {
        let edges = super::imgproc::sobel_magnitude(g);
        threshold_binary(&edges, t, true)
    })
}

fn edge_mean_threshold(gray: &GrayImage) -> u8 {
    let edges = super::imgproc::sobel_magnitude(gray);
    let hist = super::imgproc::histogram(&edges);
    let total: u64 = hist.iter().map(|&c| c as u64).sum();
    if total == 0 {
        return 60;
    }
    let sum: u64 = hist.iter().enumerate().map(|(i, &c)| i as u64 * c as u64).sum();
    (sum / total) as u8
}

fn edge_stddev_threshold(gray: &GrayImage) -> u8 {
    let edges = super::imgproc::sobel_magnitude(gray);
    let hist = super::imgproc::histogram(&edges);
    let total: f64 = hist.iter().map(|&c| c as f64).sum();
    if total == 0.0 {
        return 60;
    }
    let mean: f64 = hist.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum::<f64>() / total;
    let variance: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &c)| c as f64 * (i as f64 - mean).powi(2))
        .sum::<f64>()
        / total;
    (mean + variance.sqrt()).min(255.0) as u8
}

/// Documents tend to be bright and low-saturation relative to surrounding
/// background; approximate that with an Otsu-threshold-on-brightness mask.
fn color_segmentation(gray: &GrayImage) -> Option<(Quad, CandidateScore)> {
    let t = otsu_threshold(gray);
    let mask = threshold_binary(gray, t, true);
    let quad = largest_blob_bbox(&mask)?;
    let score = score_candidate(&quad, gray.width(), gray.height());
    Some((quad, score))
}

fn enhanced_contour(gray: &GrayImage) -> Option<(Quad, CandidateScore)> {
    let windows: [u32; 3] = [15, 25, 35];
    best_candidate_over(gray, &windows, |g, w| adaptive_threshold_mean(g, w, 5))
}

fn text_region_cluster(gray: &GrayImage) -> Option<(Quad, CandidateScore)> {
    let edges = super::imgproc::sobel_magnitude(gray);
    let mask = threshold_binary(&edges, 40, true);
    let quad = largest_blob_bbox(&mask)?;
    let area_frac = quad.area() / (gray.width() as f64 * gray.height() as f64);
    if area_frac < 0.02 {
        return None;
    }
    let score = score_candidate(&quad, gray.width(), gray.height());
    Some((quad, score))
}

fn best_candidate_over<T: Copy>(
    gray: &GrayImage,
    params: &[T],
    to_mask: impl Fn(&GrayImage, T) -> GrayImage,
) -> Option<(Quad, CandidateScore)> {
    params
        .iter()
        .filter_map(|&p| {
            let mask = to_mask(gray, p);
            let quad = largest_blob_bbox(&mask)?;
            let score = score_candidate(&quad, gray.width(), gray.height());
            Some((quad, score))
        })
        .max_by(|a, b| a.1.total.total_cmp(&b.1.total))
}

/// Bounding box of the largest 4-connected foreground (255) component,
/// found by flood fill. Returns `None` if the mask is empty.
pub fn largest_blob_bbox(mask: &GrayImage) -> Option<Quad> {
    let (w, h) = mask.dimensions();
    let mut visited = vec![false; (w * h) as usize];
    let idx = |x: u32, y: u32| (y * w + x) as usize;

    let mut best: Option<(u32, u32, u32, u32, u64)> = None;

    for y in 0..h {
        for x in 0..w {
            if visited[idx(x, y)] || mask.get_pixel(x, y).0[0] == 0 {
                continue;
            }
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (x, y, x, y);
            let mut area = 0u64;
            let mut stack = vec![(x, y)];
            visited[idx(x, y)] = true;
            while let Some((cx, cy)) = stack.pop() {
                area += 1;
                min_x = min_x.min(cx);
                min_y = min_y.min(cy);
                max_x = max_x.max(cx);
                max_y = max_y.max(cy);
                let neighbors = [
                    (cx.wrapping_sub(1), cy),
                    (cx + 1, cy),
                    (cx, cy.wrapping_sub(1)),
                    (cx, cy + 1),
                ];
                for (nx, ny) in neighbors {
                    if nx < w && ny < h && !visited[idx(nx, ny)] && mask.get_pixel(nx, ny).0[0] != 0 {
                        visited[idx(nx, ny)] = true;
                        stack.push((nx, ny));
                    }
                }
            }
            if best.map(|(_, _, _, _, a)| area > a).unwrap_or(true) {
                best = Some((min_x, min_y, max_x, max_y, area));
            }
        }
    }

    best.map(|(x0, y0, x1, y1, _)| Quad::from_bbox(x0 as f64, y0 as f64, (x1 + 1) as f64, (y1 + 1) as f64))
}
