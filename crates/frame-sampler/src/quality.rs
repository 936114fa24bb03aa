//! Per-frame quality metrics
//!
//! All metrics work on the luma channel:
//! - **Sharpness**: variance of the Laplacian response (low for blur)
//! - **Brightness**: mean luma, 0-255
//! - **Motion**: mean absolute luma difference between two frames, measured on
//!   a small fixed grid so the cost does not depend on resolution

use image::imageops::FilterType;
use image::GrayImage;
use imageproc::filter::laplacian_filter;

/// Variance of the Laplacian of a luma image
#[must_use]
pub fn sharpness(luma: &GrayImage) -> f64 {
    let response = laplacian_filter(luma);
    let count = response.as_raw().len();
    if count == 0 {
        return 0.0;
    }

    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for &value in response.as_raw() {
        let v = f64::from(value);
        sum += v;
        sum_sq += v * v;
    }
    let mean = sum / count as f64;
    (sum_sq / count as f64 - mean * mean).max(0.0)
}

/// Mean luma (0-255)
#[must_use]
pub fn brightness(luma: &GrayImage) -> f64 {
    let raw = luma.as_raw();
    if raw.is_empty() {
        return 0.0;
    }
    raw.iter().map(|&v| f64::from(v)).sum::<f64>() / raw.len() as f64
}

/// Downsample a luma image to a `grid` x `grid` thumbnail for motion comparison
#[must_use]
pub fn motion_thumbnail(luma: &GrayImage, grid: u32) -> GrayImage {
    let grid = grid.max(1);
    image::imageops::resize(luma, grid, grid, FilterType::Triangle)
}

/// Mean absolute difference between two equally sized thumbnails
#[must_use]
pub fn mean_abs_diff(a: &GrayImage, b: &GrayImage) -> f64 {
    let total: u64 = a
        .as_raw()
        .iter()
        .zip(b.as_raw())
        .map(|(&x, &y)| u64::from(x.abs_diff(y)))
        .sum();
    let count = a.as_raw().len().min(b.as_raw().len());
    if count == 0 {
        return 0.0;
    }
    total as f64 / count as f64
}
