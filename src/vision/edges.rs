//! Edge maps and smoothing

use image::GrayImage;
use imageproc::{edges::canny, filter::gaussian_blur_f32};
use serde::{Deserialize, Serialize};

/// Hysteresis thresholds for Canny edge detection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CannyThresholds {
    pub low: f32,
    pub high: f32,
}

impl CannyThresholds {
    pub const fn new(low: f32, high: f32) -> Self {
        Self { low, high }
    }

    pub fn is_valid(&self) -> bool {
        self.low.is_finite() && self.high.is_finite() && 0.0 <= self.low && self.low <= self.high
    }
}

/// Binary edge map: 255 on edges, 0 elsewhere
#[inline]
pub fn edge_map(gray: &GrayImage, thresholds: CannyThresholds) -> GrayImage {
    canny(gray, thresholds.low, thresholds.high)
}

/// Sigma used for a square Gaussian kernel of `ksize` when none is given
/// explicitly: `0.3 * ((ksize - 1) * 0.5 - 1) + 0.8`.
#[inline]
pub fn kernel_sigma(ksize: u32) -> f32 {
    0.3 * ((ksize.max(1) - 1) as f32 * 0.5 - 1.0) + 0.8
}

/// Gaussian blur sized like a `ksize x ksize` kernel
pub fn blur(gray: &GrayImage, ksize: u32) -> GrayImage {
    gaussian_blur_f32(gray, kernel_sigma(ksize))
}
