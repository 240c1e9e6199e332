//! Pixel-level building blocks shared by the chart analyzers
//!
//! Conventions follow the usual 8-bit computer-vision defaults so thresholds
//! carry over unchanged from chart tooling:
//!
//! - **color**: HSV with hue in `[0, 180)`, luma with BT.601 weights
//! - **edges**: Canny edge maps and Gaussian smoothing
//! - **morphology**: rectangular erode/dilate/open with a centered anchor
//! - **hough**: progressive probabilistic Hough line segments
//! - **contours**: external border tracing with simple chain compression

pub mod color;
pub mod contours;
pub mod edges;
pub mod hough;
pub mod morphology;

pub use color::*;
pub use contours::*;
pub use edges::*;
pub use hough::*;
pub use morphology::*;

use image::GrayImage;

/// Number of non-zero pixels in a single-channel image
#[inline]
pub fn count_nonzero(image: &GrayImage) -> usize {
    image.pixels().filter(|p| p[0] != 0).count()
}

/// Fraction of non-zero pixels, 0.0 for an empty image
#[inline]
pub fn nonzero_density(image: &GrayImage) -> f64 {
    let total = image.width() as usize * image.height() as usize;
    if total == 0 {
        return 0.0;
    }
    count_nonzero(image) as f64 / total as f64
}
