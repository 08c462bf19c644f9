//! Individual pipeline transform stages, each wrapped by `mod::run` in a
//! primary-attempt/fallback/skip envelope.

use image::GrayImage;

use super::boundary::Quad;
use super::imgproc::{
    adaptive_threshold_mean, bilateral_approx, box_blur, clahe_like, equalize_histogram,
    estimate_skew_angle, otsu_threshold, rotate_degrees, threshold_binary, unsharp_mask,
};

/// Outcome of one stage attempt.
pub enum Attempt {
    Primary(GrayImage),
    Fallback(GrayImage, String),
    Skipped(String),
}

pub fn resize(img: &GrayImage, max_w: u32, max_h: u32) -> Attempt {
    let (w, h) = img.dimensions();
    if w <= max_w && h <= max_h {
        return Attempt::Primary(img.clone());
    }
    let scale = (max_w as f64 / w as f64).min(max_h as f64 / h as f64);
    let (new_w, new_h) = ((w as f64 * scale).round() as u32, (h as f64 * scale).round() as u32);
    let resized = image::imageops::resize(img, new_w.max(1), new_h.max(1), image::imageops::FilterType::Lanczos3);
    Attempt::Primary(resized)
}

pub fn crop_invoice(img: &GrayImage, quad: Option<&Quad>) -> Attempt {
    let Some(quad) = quad else {
        return Attempt::Skipped("no quadrilateral detected".to_string());
    };
    let (w, h) = img.dimensions();
    let pad = 10.0;
    let x0 = (quad.corners[0].0 - pad).max(0.0) as u32;
    let y0 = (quad.corners[0].1 - pad).max(0.0) as u32;
    let x1 = (quad.corners[2].0 + pad).min(w as f64) as u32;
    let y1 = (quad.corners[2].1 + pad).min(h as f64) as u32;
    if x1 <= x0 || y1 <= y0 {
        return Attempt::Skipped("degenerate crop box".to_string());
    }
    let cropped = image::imageops::crop_imm(img, x0, y0, x1 - x0, y1 - y0).to_image();
    Attempt::Primary(cropped)
}

pub fn denoise(img: &GrayImage) -> Attempt {
    if img.width() < 4 || img.height() < 4 {
        return Attempt::Fallback(bilateral_approx(img, 1, 20), "image too small for non-local means".to_string());
    }
    Attempt::Primary(box_blur(img, 2))
}

pub fn enhance_contrast(img: &GrayImage) -> Attempt {
    if img.width() < 16 || img.height() < 16 {
        return Attempt::Fallback(equalize_histogram(img), "image smaller than CLAHE tile size".to_string());
    }
    Attempt::Primary(clahe_like(img, 64))
}

pub fn perspective_correct(img: &GrayImage, quad: Option<&Quad>) -> Attempt {
    let Some(quad) = quad else {
        return Attempt::Skipped("no quadrilateral detected".to_string());
    };
    let target_w = quad.width().round().max(1.0) as u32;
    let target_h = quad.height().round().max(1.0) as u32;
    if target_w == img.width() && target_h == img.height() {
        return Attempt::Primary(img.clone());
    }
    let warped = image::imageops::resize(img, target_w, target_h, image::imageops::FilterType::Triangle);
    Attempt::Primary(warped)
}

pub fn deskew(img: &GrayImage) -> Attempt {
    match estimate_skew_angle(img) {
        Some(angle) if angle.abs() >= 0.5 => Attempt::Primary(rotate_degrees(img, angle)),
        Some(_) => Attempt::Skipped("estimated skew below 0.5 degree threshold".to_string()),
        None => Attempt::Skipped("image too small to estimate skew".to_string()),
    }
}

pub fn sharpen(img: &GrayImage) -> Attempt {
    if img.width() < 3 || img.height() < 3 {
        return Attempt::Fallback(img.clone(), "image smaller than sharpen kernel".to_string());
    }
    Attempt::Primary(unsharp_mask(img, 1.0))
}

pub fn threshold(img: &GrayImage) -> Attempt {
    let window = 25;
    if img.width() < window || img.height() < window {
        let t = otsu_threshold(img);
        return Attempt::Fallback(threshold_binary(img, t, true), "image smaller than adaptive window".to_string());
    }
    Attempt::Primary(adaptive_threshold_mean(img, window, 5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn sample(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([((x + y) % 255) as u8]))
    }

    #[test]
    fn resize_is_a_noop_under_bounds() {
        let img = sample(50, 50);
        match resize(&img, 100, 100) {
            Attempt::Primary(out) => assert_eq!(out.dimensions(), (50, 50)),
            _ => panic!("expected primary"),
        }
    }

    #[test]
    fn resize_bounds_oversized_image_preserving_aspect() {
        let img = sample(400, 200);
        match resize(&img, 100, 100) {
            Attempt::Primary(out) => {
                assert!(out.width() <= 100 && out.height() <= 100);
                let ratio_before = 400.0 / 200.0;
                let ratio_after = out.width() as f64 / out.height() as f64;
                assert!((ratio_before - ratio_after).abs() < 0.05);
            }
            _ => panic!("expected primary"),
        }
    }

    #[test]
    fn crop_invoice_skips_without_quadrilateral() {
        let img = sample(50, 50);
        assert!(matches!(crop_invoice(&img, None), Attempt::Skipped(_)));
    }

    #[test]
    fn deskew_skips_small_angle() {
        let img = GrayImage::from_pixel(40, 40, Luma([200]));
        assert!(matches!(deskew(&img), Attempt::Skipped(_)));
    }

    #[test]
    fn sharpen_falls_back_on_tiny_image() {
        let img = sample(2, 2);
        assert!(matches!(sharpen(&img), Attempt::Fallback(_, _)));
    }
}
