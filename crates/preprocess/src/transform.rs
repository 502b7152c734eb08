//! Pixel-level steps. The filters themselves come from `image` and
//! `imageproc`; this module only fixes their parameters and geometry.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};

pub const WHITE: u8 = 255;

pub fn grayscale(img: &DynamicImage) -> GrayImage {
    img.to_luma8()
}

/// Median filter over a `(2r+1)²` window. Radius 0 is a no-op.
pub fn median_denoise(gray: &GrayImage, radius: u32) -> GrayImage {
    if radius == 0 {
        return gray.clone();
    }
    imageproc::filter::median_filter(gray, radius, radius)
}

/// Largest size with the source aspect ratio that fits in the target box.
/// An image wider than the box takes the full target width; otherwise it
/// takes the full height. The free side is rounded and kept at least 1.
pub fn fit_dimensions(width: u32, height: u32, target_w: u32, target_h: u32) -> (u32, u32) {
    let img_ratio = width as f64 / height as f64;
    let target_ratio = target_w as f64 / target_h as f64;

    if img_ratio > target_ratio {
        let h = (target_w as f64 / img_ratio).round() as u32;
        (target_w, h.clamp(1, target_h))
    } else {
        let w = (target_h as f64 * img_ratio).round() as u32;
        (w.clamp(1, target_w), target_h)
    }
}

/// Aspect-preserving resize, then center onto a `target_w × target_h` canvas
/// filled with `fill`.
pub fn resize_and_pad(gray: &GrayImage, target_w: u32, target_h: u32, fill: u8) -> GrayImage {
    let (new_w, new_h) = fit_dimensions(gray.width(), gray.height(), target_w, target_h);
    let resized = imageops::resize(gray, new_w, new_h, FilterType::Lanczos3);

    let mut canvas = GrayImage::from_pixel(target_w, target_h, Luma([fill]));
    let x = (target_w - new_w) / 2;
    let y = (target_h - new_h) / 2;
    imageops::overlay(&mut canvas, &resized, x as i64, y as i64);
    canvas
}

/// Height after scaling `width` to `base_width`; truncated, at least 1.
pub fn scaled_height(width: u32, height: u32, base_width: u32) -> u32 {
    let scale = base_width as f64 / width as f64;
    ((height as f64 * scale) as u32).max(1)
}

pub fn resize_to_width(gray: &GrayImage, base_width: u32) -> GrayImage {
    let h = scaled_height(gray.width(), gray.height(), base_width);
    imageops::resize(gray, base_width, h, FilterType::Lanczos3)
}

pub fn gaussian_blur(gray: &GrayImage, sigma: f32) -> GrayImage {
    imageproc::filter::gaussian_blur_f32(gray, sigma)
}

/// Global binarization at the Otsu level: above the level becomes white,
/// everything else black.
pub fn otsu_binarize(gray: &GrayImage) -> GrayImage {
    let level = imageproc::contrast::otsu_level(gray);
    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p[0] = if p[0] > level { WHITE } else { 0 };
    }
    out
}
