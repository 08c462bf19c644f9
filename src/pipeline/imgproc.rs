//! Hand-rolled grayscale image primitives used by the pipeline stages and
//! the document classifier/boundary detector.
//!
//! No general-purpose contour/edge crate is depended on here (no repo in
//! the pack pulls one in as a plain dependency); these buffers are built
//! directly over `image::GrayImage`.

use image::{GrayImage, Luma};

/// 256-bin luminance histogram.
pub fn histogram(img: &GrayImage) -> [u32; 256] {
    let mut hist = [0u32; 256];
    for px in img.pixels() {
        hist[px.0[0] as usize] += 1;
    }
    hist
}

/// Otsu's method: pick the threshold that maximizes inter-class variance.
pub fn otsu_threshold(img: &GrayImage) -> u8 {
    let hist = histogram(img);
    let total = img.width() as f64 * img.height() as f64;
    if total == 0.0 {
        return 128;
    }
    let sum_all: f64 = hist.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();

    let mut sum_bg = 0.0;
    let mut weight_bg = 0.0;
    let mut best_threshold = 0u8;
    let mut best_variance = 0.0;

    for t in 0..256 {
        weight_bg += hist[t] as f64;
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg <= 0.0 {
            break;
        }
        sum_bg += t as f64 * hist[t] as f64;
        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_all - sum_bg) / weight_fg;
        let between_variance = weight_bg * weight_fg * (mean_bg - mean_fg).powi(2);
        if between_variance > best_variance {
            best_variance = between_variance;
            best_threshold = t as u8;
        }
    }
    best_threshold
}

/// Binarize at a fixed threshold: foreground (dark ink) becomes 255.
pub fn threshold_binary(img: &GrayImage, threshold: u8, invert: bool) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let v = img.get_pixel(x, y).0[0];
        let is_fg = if invert { v >= threshold } else { v < threshold };
        Luma([if is_fg { 255 } else { 0 }])
    })
}

/// Adaptive mean threshold over a local window, used by the `threshold`
/// pipeline stage's primary attempt.
pub fn adaptive_threshold_mean(img: &GrayImage, window: u32, bias: i32) -> GrayImage {
    let (w, h) = img.dimensions();
    let half = (window / 2).max(1);
    let integral = integral_image(img);
    GrayImage::from_fn(w, h, |x, y| {
        let x0 = x.saturating_sub(half);
        let y0 = y.saturating_sub(half);
        let x1 = (x + half).min(w - 1);
        let y1 = (y + half).min(h - 1);
        let area = ((x1 - x0 + 1) * (y1 - y0 + 1)) as i64;
        let sum = region_sum(&integral, w, x0, y0, x1, y1);
        let mean = sum as f64 / area as f64;
        let v = img.get_pixel(x, y).0[0] as f64;
        let is_fg = v < mean - bias as f64;
        Luma([if is_fg { 255 } else { 0 }])
    })
}

fn integral_image(img: &GrayImage) -> Vec<i64> {
    let (w, h) = img.dimensions();
    let mut integral = vec![0i64; (w as usize + 1) * (h as usize + 1)];
    let stride = w as usize + 1;
    for y in 0..h as usize {
        let mut row_sum = 0i64;
        for x in 0..w as usize {
            row_sum += img.get_pixel(x as u32, y as u32).0[0] as i64;
            integral[(y + 1) * stride + (x + 1)] = integral[y * stride + (x + 1)] + row_sum;
        }
    }
    integral
}

fn region_sum(integral: &[i64], w: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> i64 {
    let stride = w as usize + 1;
    let (x0, y0, x1, y1) = (x0 as usize, y0 as usize, x1 as usize, y1 as usize);
    integral[(y1 + 1) * stride + (x1 + 1)]
        - integral[y0 * stride + (x1 + 1)]
        - integral[(y1 + 1) * stride + x0]
        + integral[y0 * stride + x0]
}

/// Separable box blur, used as the non-local-means stand-in and as the
/// bilateral-filter fallback's base (with an edge-preserving re-weight).
pub fn box_blur(img: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 {
        return img.clone();
    }
    let (w, h) = img.dimensions();
    let integral = integral_image(img);
    GrayImage::from_fn(w, h, |x, y| {
        let x0 = x.saturating_sub(radius);
        let y0 = y.saturating_sub(radius);
        let x1 = (x + radius).min(w - 1);
        let y1 = (y + radius).min(h - 1);
        let area = ((x1 - x0 + 1) * (y1 - y0 + 1)) as i64;
        let sum = region_sum(&integral, w, x0, y0, x1, y1);
        Luma([(sum / area.max(1)) as u8])
    })
}

/// Edge-preserving blur: a box blur whose result is only accepted at
/// pixels where it does not deviate from the source by more than
/// `range_bound`; otherwise the source pixel is kept. Crude stand-in for
/// a true bilateral filter's range kernel.
pub fn bilateral_approx(img: &GrayImage, radius: u32, range_bound: u8) -> GrayImage {
    let blurred = box_blur(img, radius);
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let src = img.get_pixel(x, y).0[0];
        let blur = blurred.get_pixel(x, y).0[0];
        if src.abs_diff(blur) <= range_bound {
            Luma([blur])
        } else {
            Luma([src])
        }
    })
}

/// Sobel gradient magnitude, normalized to `u8`.
pub fn sobel_magnitude(img: &GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    let gx_kernel: [[i32; 3]; 3] = [[-1, 0, 1], [-2, 0, 2], [-1, 0, 1]];
    let gy_kernel: [[i32; 3]; 3] = [[-1, -2, -1], [0, 0, 0], [1, 2, 1]];
    GrayImage::from_fn(w, h, |x, y| {
        if x == 0 || y == 0 || x >= w - 1 || y >= h - 1 {
            return Luma([0]);
        }
        let mut gx = 0i32;
        let mut gy = 0i32;
        for (dy, row) in gx_kernel.iter().enumerate() {
            for (dx, &k) in row.iter().enumerate() {
                let v = img.get_pixel(x + dx as u32 - 1, y + dy as u32 - 1).0[0] as i32;
                gx += k * v;
                gy += gy_kernel[dy][dx] * v;
            }
        }
        let mag = ((gx * gx + gy * gy) as f64).sqrt();
        Luma([mag.min(255.0) as u8])
    })
}

/// Fraction of pixels whose Sobel magnitude exceeds `threshold`.
pub fn edge_density(img: &GrayImage, threshold: u8) -> f64 {
    let edges = sobel_magnitude(img);
    let count = edges.pixels().filter(|p| p.0[0] >= threshold).count();
    count as f64 / (img.width() as f64 * img.height() as f64).max(1.0)
}

/// Global histogram equalization, used as `enhance_contrast`'s fallback.
pub fn equalize_histogram(img: &GrayImage) -> GrayImage {
    let hist = histogram(img);
    let total = (img.width() * img.height()) as f64;
    let mut cdf = [0f64; 256];
    let mut running = 0u32;
    for (i, &count) in hist.iter().enumerate() {
        running += count;
        cdf[i] = running as f64 / total;
    }
    let lut: Vec<u8> = cdf.iter().map(|&c| (c * 255.0).round() as u8).collect();
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        Luma([lut[img.get_pixel(x, y).0[0] as usize]])
    })
}

/// Local-contrast stand-in for CLAHE: histogram-equalize non-overlapping
/// tiles, then blend tile edges with a light box blur to avoid hard seams.
pub fn clahe_like(img: &GrayImage, tile: u32) -> GrayImage {
    let (w, h) = img.dimensions();
    if tile == 0 || w < tile || h < tile {
        return equalize_histogram(img);
    }
    let mut out = GrayImage::new(w, h);
    let tiles_x = w.div_ceil(tile);
    let tiles_y = h.div_ceil(tile);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile;
            let y0 = ty * tile;
            let x1 = (x0 + tile).min(w);
            let y1 = (y0 + tile).min(h);
            let sub = image::imageops::crop_imm(img, x0, y0, x1 - x0, y1 - y0).to_image();
            let eq = equalize_histogram(&sub);
            for y in y0..y1 {
                for x in x0..x1 {
                    out.put_pixel(x, y, *eq.get_pixel(x - x0, y - y0));
                }
            }
        }
    }
    box_blur(&out, 1)
}

/// 3x3 unsharp-mask sharpen: `out = src + amount * (src - blur(src))`.
pub fn unsharp_mask(img: &GrayImage, amount: f64) -> GrayImage {
    let blurred = box_blur(img, 1);
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let src = img.get_pixel(x, y).0[0] as f64;
        let blur = blurred.get_pixel(x, y).0[0] as f64;
        let sharpened = src + amount * (src - blur);
        Luma([sharpened.clamp(0.0, 255.0) as u8])
    })
}

/// Estimate the dominant skew angle (degrees) from the horizontal
/// projection profile's variance across small rotation trials. Returns
/// `None` if the image is too small to evaluate.
pub fn estimate_skew_angle(img: &GrayImage) -> Option<f64> {
    if img.width() < 8 || img.height() < 8 {
        return None;
    }
    let binary = threshold_binary(img, otsu_threshold(img), true);
    let mut best_angle = 0.0f64;
    let mut best_score = f64::MIN;
    let mut angle = -5.0f64;
    while angle <= 5.0 {
        let score = projection_variance(&binary, angle);
        if score > best_score {
            best_score = score;
            best_angle = angle;
        }
        angle += 0.5;
    }
    Some(best_angle)
}

fn projection_variance(binary: &GrayImage, angle_deg: f64) -> f64 {
    let (w, h) = binary.dimensions();
    let theta = angle_deg.to_radians();
    let mut rows = vec![0u32; h as usize];
    for y in 0..h {
        for x in 0..w {
            if binary.get_pixel(x, y).0[0] > 0 {
                let shifted = y as f64 + (x as f64 - w as f64 / 2.0) * theta.sin();
                let idx = shifted.round().clamp(0.0, h as f64 - 1.0) as usize;
                rows[idx] += 1;
            }
        }
    }
    let mean = rows.iter().sum::<u32>() as f64 / rows.len() as f64;
    rows.iter().map(|&r| (r as f64 - mean).powi(2)).sum::<f64>() / rows.len() as f64
}

/// Nearest-neighbor rotation about the image center, by `angle_deg`
/// degrees. Output canvas is the same size as the input; corners are
/// filled with white.
pub fn rotate_degrees(img: &GrayImage, angle_deg: f64) -> GrayImage {
    let (w, h) = img.dimensions();
    let theta = angle_deg.to_radians();
    let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);
    let (cos_t, sin_t) = (theta.cos(), theta.sin());
    GrayImage::from_fn(w, h, |x, y| {
        let dx = x as f64 - cx;
        let dy = y as f64 - cy;
        let src_x = cx + dx * cos_t + dy * sin_t;
        let src_y = cy - dx * sin_t + dy * cos_t;
        if src_x < 0.0 || src_y < 0.0 || src_x >= w as f64 || src_y >= h as f64 {
            Luma([255])
        } else {
            *img.get_pixel(src_x as u32, src_y as u32)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkerboard(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| Luma([if (x / 4 + y / 4) % 2 == 0 { 20 } else { 220 }]))
    }

    #[test]
    fn otsu_threshold_splits_bimodal_image() {
        let img = checkerboard(32, 32);
        let t = otsu_threshold(&img);
        assert!(t > 20 && t < 220);
    }

    #[test]
    fn box_blur_smooths_high_frequency_noise() {
        let img = checkerboard(32, 32);
        let blurred = box_blur(&img, 3);
        let edge_before = edge_density(&img, 50);
        let edge_after = edge_density(&blurred, 50);
        assert!(edge_after <= edge_before);
    }

    #[test]
    fn equalize_histogram_spreads_narrow_range() {
        let img = GrayImage::from_fn(16, 16, |x, _| Luma([100 + (x % 2) as u8]));
        let eq = equalize_histogram(&img);
        let hist = histogram(&eq);
        let distinct = hist.iter().filter(|&&c| c > 0).count();
        assert!(distinct >= 1);
    }

    #[test]
    fn estimate_skew_angle_returns_none_for_tiny_image() {
        let img = GrayImage::new(2, 2);
        assert!(estimate_skew_angle(&img).is_none());
    }

    #[test]
    fn rotate_degrees_by_zero_is_near_identity_at_center() {
        let img = checkerboard(20, 20);
        let rotated = rotate_degrees(&img, 0.0);
        assert_eq!(img.get_pixel(10, 10), rotated.get_pixel(10, 10));
    }
}
