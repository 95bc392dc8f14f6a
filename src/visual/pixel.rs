//! Perceptual pixel comparison in YIQ space with anti-aliasing detection,
//! plus the fit/pad normalization used when image sizes differ.

use image::{imageops, Rgba, RgbaImage};
use crate::errors::AuditError;

/// Squared YIQ distance between black and white; scales the `0..=1` threshold.
const MAX_YIQ_DELTA: f64 = 35215.0;

const DIFF_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
const AA_COLOR: Rgba<u8> = Rgba([255, 255, 0, 255]);
const PAD_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Debug, Clone, Copy)]
pub struct DiffOptions {
    /// Per-pixel color distance threshold in `0.0..=1.0`; lower is stricter.
    pub threshold: f64,
    /// Count anti-aliased pixels as differences.
    pub include_aa: bool,
    /// Opacity of unchanged pixels in the diff image.
    pub alpha: f64,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self { threshold: 0.1, include_aa: false, alpha: 0.1 }
    }
}

#[derive(Debug, Clone)]
pub struct DiffOutcome {
    pub diff_pixels: u64,
    pub width: u32,
    pub height: u32,
    /// Red marks differing pixels, yellow anti-aliasing, faded gray unchanged.
    pub diff_image: RgbaImage,
}

impl DiffOutcome {
    pub fn total_pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn difference_percentage(&self) -> f64 {
        let total = self.total_pixels();
        if total == 0 {
            return 0.0;
        }
        self.diff_pixels as f64 / total as f64 * 100.0
    }
}

fn blend(c: f64, a: f64) -> f64 {
    255.0 + (c - 255.0) * a
}

fn rgb2y(r: f64, g: f64, b: f64) -> f64 {
    r * 0.29889531 + g * 0.58662247 + b * 0.11448223
}

fn rgb2i(r: f64, g: f64, b: f64) -> f64 {
    r * 0.59597799 - g * 0.27417610 - b * 0.32180189
}

fn rgb2q(r: f64, g: f64, b: f64) -> f64 {
    r * 0.21147017 - g * 0.52261711 + b * 0.31114694
}

fn premultiplied(p: &Rgba<u8>) -> (f64, f64, f64) {
    let [r, g, b, a] = p.0;
    let (r, g, b) = (r as f64, g as f64, b as f64);
    if a < 255 {
        let a = a as f64 / 255.0;
        (blend(r, a), blend(g, a), blend(b, a))
    } else {
        (r, g, b)
    }
}

/// Signed perceptual distance: negative when the first pixel is brighter.
/// With `y_only` only the luma difference is returned.
fn color_delta(p1: &Rgba<u8>, p2: &Rgba<u8>, y_only: bool) -> f64 {
    if p1 == p2 {
        return 0.0;
    }
    let (r1, g1, b1) = premultiplied(p1);
    let (r2, g2, b2) = premultiplied(p2);

    let y1 = rgb2y(r1, g1, b1);
    let y2 = rgb2y(r2, g2, b2);
    let y = y1 - y2;
    if y_only {
        return y;
    }
    let i = rgb2i(r1, g1, b1) - rgb2i(r2, g2, b2);
    let q = rgb2q(r1, g1, b1) - rgb2q(r2, g2, b2);
    let delta = 0.5053 * y * y + 0.299 * i * i + 0.1957 * q * q;
    if y1 > y2 { -delta } else { delta }
}

/// The 3x3 neighbourhood bounds of (x, y), and whether it sits on an edge.
fn neighbourhood(x: u32, y: u32, w: u32, h: u32) -> (u32, u32, u32, u32, bool) {
    let x0 = x.saturating_sub(1);
    let y0 = y.saturating_sub(1);
    let x2 = (x + 1).min(w - 1);
    let y2 = (y + 1).min(h - 1);
    let on_edge = x == x0 || x == x2 || y == y0 || y == y2;
    (x0, y0, x2, y2, on_edge)
}

/// More than two neighbours with exactly the same color.
fn has_many_siblings(img: &RgbaImage, x1: u32, y1: u32) -> bool {
    let (x0, y0, x2, y2, edge) = neighbourhood(x1, y1, img.width(), img.height());
    let center = img.get_pixel(x1, y1);
    let mut zeroes = u32::from(edge);
    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }
            if img.get_pixel(x, y) == center {
                zeroes += 1;
            }
            if zeroes > 2 {
                return true;
            }
        }
    }
    false
}

/// Whether the pixel looks like an anti-aliasing artifact: it sits between a
/// darkest and a brightest neighbour that are both part of flat regions.
fn antialiased(img: &RgbaImage, x1: u32, y1: u32, other: &RgbaImage) -> bool {
    let (x0, y0, x2, y2, edge) = neighbourhood(x1, y1, img.width(), img.height());
    let center = img.get_pixel(x1, y1);
    let mut zeroes = u32::from(edge);
    let (mut min, mut max) = (0.0f64, 0.0f64);
    let (mut min_at, mut max_at) = ((0, 0), (0, 0));

    for x in x0..=x2 {
        for y in y0..=y2 {
            if x == x1 && y == y1 {
                continue;
            }
            let delta = color_delta(center, img.get_pixel(x, y), true);
            if delta == 0.0 {
                zeroes += 1;
                if zeroes > 2 {
                    return false;
                }
            } else if delta < min {
                min = delta;
                min_at = (x, y);
            } else if delta > max {
                max = delta;
                max_at = (x, y);
            }
        }
    }

    if min == 0.0 || max == 0.0 {
        return false;
    }
    (has_many_siblings(img, min_at.0, min_at.1) && has_many_siblings(other, min_at.0, min_at.1))
        || (has_many_siblings(img, max_at.0, max_at.1) && has_many_siblings(other, max_at.0, max_at.1))
}

fn gray_pixel(p: &Rgba<u8>, alpha: f64) -> Rgba<u8> {
    let [r, g, b, a] = p.0;
    let luma = rgb2y(r as f64, g as f64, b as f64);
    let v = blend(luma, alpha * a as f64 / 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba([v, v, v, 255])
}

/// Compare two equally sized images pixel by pixel.
pub fn pixel_diff(img1: &RgbaImage, img2: &RgbaImage, opts: &DiffOptions) -> Result<DiffOutcome, AuditError> {
    if img1.dimensions() != img2.dimensions() {
        return Err(AuditError::Image(format!(
            "Image sizes do not match: {:?} vs {:?}",
            img1.dimensions(),
            img2.dimensions()
        )));
    }
    let (width, height) = img1.dimensions();
    let mut output = RgbaImage::new(width, height);

    if img1.as_raw() == img2.as_raw() {
        for (x, y, p) in img1.enumerate_pixels() {
            output.put_pixel(x, y, gray_pixel(p, opts.alpha));
        }
        return Ok(DiffOutcome { diff_pixels: 0, width, height, diff_image: output });
    }

    let max_delta = MAX_YIQ_DELTA * opts.threshold * opts.threshold;
    let mut diff_pixels = 0u64;

    for y in 0..height {
        for x in 0..width {
            let p1 = img1.get_pixel(x, y);
            let delta = color_delta(p1, img2.get_pixel(x, y), false);
            if delta.abs() > max_delta {
                if !opts.include_aa && (antialiased(img1, x, y, img2) || antialiased(img2, x, y, img1)) {
                    output.put_pixel(x, y, AA_COLOR);
                } else {
                    output.put_pixel(x, y, DIFF_COLOR);
                    diff_pixels += 1;
                }
            } else {
                output.put_pixel(x, y, gray_pixel(p1, opts.alpha));
            }
        }
    }

    Ok(DiffOutcome { diff_pixels, width, height, diff_image: output })
}

/// Scale to fit inside `width`x`height` keeping aspect ratio, then center on
/// a white canvas of exactly that size. Never crops.
pub fn contain_fit(img: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if img.dimensions() == (width, height) {
        return img.clone();
    }
    let scale = (width as f64 / img.width() as f64).min(height as f64 / img.height() as f64);
    let new_w = ((img.width() as f64 * scale).round() as u32).clamp(1, width);
    let new_h = ((img.height() as f64 * scale).round() as u32).clamp(1, height);
    let resized = if (new_w, new_h) == img.dimensions() {
        img.clone()
    } else {
        imageops::resize(img, new_w, new_h, imageops::FilterType::Lanczos3)
    };

    let mut canvas = RgbaImage::from_pixel(width, height, PAD_COLOR);
    let left = (width - new_w) / 2;
    let top = (height - new_h) / 2;
    imageops::overlay(&mut canvas, &resized, left as i64, top as i64);
    canvas
}

/// Bring both images to the larger of each dimension when their sizes differ.
pub fn normalize_pair(img1: RgbaImage, img2: RgbaImage) -> (RgbaImage, RgbaImage) {
    if img1.dimensions() == img2.dimensions() {
        return (img1, img2);
    }
    let width = img1.width().max(img2.width());
    let height = img1.height().max(img2.height());
    (contain_fit(&img1, width, height), contain_fit(&img2, width, height))
}

/// Normalize then diff. Empty images are rejected.
pub fn compare_images(baseline: RgbaImage, current: RgbaImage, opts: &DiffOptions) -> Result<DiffOutcome, AuditError> {
    if baseline.width() == 0 || baseline.height() == 0 || current.width() == 0 || current.height() == 0 {
        return Err(AuditError::Image("Cannot compare an empty image".into()));
    }
    let (a, b) = normalize_pair(baseline, current);
    pixel_diff(&a, &b, opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);

    fn white(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, WHITE)
    }

    #[test]
    fn test_identical_images_have_no_difference() {
        let img = white(40, 30);
        let out = pixel_diff(&img, &img.clone(), &DiffOptions::default()).unwrap();
        assert_eq!(out.diff_pixels, 0);
        assert_eq!(out.difference_percentage(), 0.0);
        assert_eq!(out.diff_image.dimensions(), (40, 30));
    }

    #[test]
    fn test_black_square_on_white() {
        let baseline = white(100, 100);
        let mut current = white(100, 100);
        for x in 40..50 {
            for y in 40..50 {
                current.put_pixel(x, y, BLACK);
            }
        }
        let out = pixel_diff(&baseline, &current, &DiffOptions::default()).unwrap();
        assert_eq!(out.diff_pixels, 100);
        assert!((out.difference_percentage() - 1.0).abs() < 1e-9);
        assert_eq!(*out.diff_image.get_pixel(45, 45), DIFF_COLOR);
        assert_ne!(*out.diff_image.get_pixel(5, 5), DIFF_COLOR);
    }

    #[test]
    fn test_faint_change_is_below_threshold() {
        let baseline = white(10, 10);
        let current = RgbaImage::from_pixel(10, 10, Rgba([250, 250, 250, 255]));
        let out = pixel_diff(&baseline, &current, &DiffOptions::default()).unwrap();
        assert_eq!(out.diff_pixels, 0);
    }

    #[test]
    fn test_mismatched_sizes_are_rejected_without_normalization() {
        assert!(pixel_diff(&white(10, 10), &white(10, 12), &DiffOptions::default()).is_err());
    }

    #[test]
    fn test_contain_fit_pads_without_cropping() {
        let img = RgbaImage::from_pixel(50, 100, BLACK);
        let fitted = contain_fit(&img, 100, 100);
        assert_eq!(fitted.dimensions(), (100, 100));
        // Black content centered, white padding on both sides
        assert_eq!(*fitted.get_pixel(0, 50), WHITE);
        assert_eq!(*fitted.get_pixel(99, 50), WHITE);
        assert_eq!(*fitted.get_pixel(50, 50), BLACK);
    }

    #[test]
    fn test_normalize_pair_uses_larger_dimensions() {
        let (a, b) = normalize_pair(white(80, 60), white(100, 40));
        assert_eq!(a.dimensions(), (100, 60));
        assert_eq!(b.dimensions(), (100, 60));
        let out = compare_images(white(80, 60), white(100, 40), &DiffOptions::default()).unwrap();
        assert_eq!(out.diff_pixels, 0);
    }

    #[test]
    fn test_color_delta_sign() {
        assert!(color_delta(&WHITE, &BLACK, false) < 0.0);
        assert!(color_delta(&BLACK, &WHITE, false) > 0.0);
        assert_eq!(color_delta(&WHITE, &WHITE, false), 0.0);
    }
}
