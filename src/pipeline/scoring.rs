//! Multi-criteria candidate scoring for boundary-detection candidates.

use super::boundary::Quad;

/// Breakdown of a candidate quadrilateral's score, `total` in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateScore {
    pub position: f64,
    pub aspect: f64,
    pub size: f64,
    pub compactness: f64,
    pub border: f64,
    pub total: f64,
}

/// `total = 0.25*position + 0.20*aspect + 0.20*size + 0.20*compactness + 0.15*border`.
pub fn score_candidate(quad: &Quad, image_w: u32, image_h: u32) -> CandidateScore {
    let (w, h) = (image_w as f64, image_h as f64);
    let position = position_score(quad, w, h);
    let aspect = aspect_score(quad);
    let size = size_score(quad, w, h);
    let compactness = compactness_score(quad);
    let border = border_score(quad, w, h);
    let total = 0.25 * position + 0.20 * aspect + 0.20 * size + 0.20 * compactness + 0.15 * border;
    CandidateScore {
        position,
        aspect,
        size,
        compactness,
        border,
        total,
    }
}

fn position_score(quad: &Quad, w: f64, h: f64) -> f64 {
    let (cx, cy) = quad.centroid();
    let target = (0.6 * w, 0.5 * h);
    let dist = ((cx - target.0).powi(2) + (cy - target.1).powi(2)).sqrt();
    let max_dist = (w.powi(2) + h.powi(2)).sqrt();
    (1.0 - dist / max_dist.max(1.0)).clamp(0.0, 1.0)
}

fn aspect_score(quad: &Quad) -> f64 {
    let (w, h) = (quad.width().max(1.0), quad.height().max(1.0));
    let ratio = h / w;
    if (1.2..=3.0).contains(&ratio) {
        1.0
    } else if ratio < 1.2 {
        (ratio / 1.2).clamp(0.0, 1.0)
    } else {
        (3.0 / ratio).clamp(0.0, 1.0)
    }
}

fn size_score(quad: &Quad, w: f64, h: f64) -> f64 {
    let frac = quad.area() / (w * h).max(1.0);
    if (0.10..=0.60).contains(&frac) {
        1.0
    } else if frac < 0.10 {
        (frac / 0.10).clamp(0.0, 1.0)
    } else {
        (0.60 / frac).clamp(0.0, 1.0)
    }
}

fn compactness_score(quad: &Quad) -> f64 {
    let perimeter = quad.perimeter().max(1.0);
    let compactness = 4.0 * std::f64::consts::PI * quad.area() / perimeter.powi(2);
    // A perfect rectangle scores roughly pi/4 under this formula; rescale
    // so a rectangle lands near 1.0 and clamp to [0, 1].
    (compactness / (std::f64::consts::PI / 4.0)).clamp(0.0, 1.0)
}

fn border_score(quad: &Quad, w: f64, h: f64) -> f64 {
    let margin = 0.05 * w.min(h);
    let (x0, y0) = quad.corners[0];
    let (x1, y1) = quad.corners[2];
    let dists = [x0, y0, w - x1, h - y1];
    let min_dist = dists.iter().cloned().fold(f64::MAX, f64::min);
    if min_dist >= margin {
        1.0
    } else {
        (min_dist / margin.max(1.0)).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centered_tall_rectangle_scores_highly() {
        let quad = Quad::from_bbox(55.0, 15.0, 125.0, 85.0);
        let score = score_candidate(&quad, 200, 100);
        assert!(score.aspect > 0.0);
        assert!(score.total > 0.0 && score.total <= 1.0);
    }

    #[test]
    fn tiny_candidate_scores_low_on_size() {
        let quad = Quad::from_bbox(0.0, 0.0, 5.0, 5.0);
        let score = score_candidate(&quad, 200, 200);
        assert!(score.size < 0.2);
    }

    #[test]
    fn candidate_touching_edge_scores_low_on_border() {
        let quad = Quad::from_bbox(0.0, 0.0, 100.0, 100.0);
        let score = score_candidate(&quad, 200, 200);
        assert!(score.border < 1.0);
    }
}
