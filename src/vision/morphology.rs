//! Rectangular grayscale morphology
//!
//! Kernels are anchored at `(width / 2, height / 2)`. Dilation uses the
//! reflected anchor so that opening never grows a shape. Pixels outside the
//! image are ignored.

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

/// Rectangular structuring element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RectKernel {
    pub width: u32,
    pub height: u32,
}

impl RectKernel {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Tall-thin kernel isolating vertical strokes
    pub const fn vertical(height: u32) -> Self {
        Self::new(1, height)
    }

    /// Short-wide kernel isolating horizontal strokes
    pub const fn horizontal(width: u32) -> Self {
        Self::new(width, 1)
    }

    #[inline]
    pub fn anchor(&self) -> (u32, u32) {
        (self.width / 2, self.height / 2)
    }

    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Window `[start, end]` covered by a kernel axis of `len` anchored at `anchor`
#[inline]
fn window(pos: u32, len: u32, anchor: u32, limit: u32) -> (u32, u32) {
    let start = pos.saturating_sub(anchor);
    let end = (pos + (len - 1 - anchor)).min(limit - 1);
    (start, end)
}

fn rank_filter(
    image: &GrayImage,
    kernel: RectKernel,
    reflect: bool,
    identity: u8,
    pick: fn(u8, u8) -> u8,
) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || !kernel.is_valid() {
        return image.clone();
    }
    let (mut ax, mut ay) = kernel.anchor();
    if reflect {
        ax = kernel.width - 1 - ax;
        ay = kernel.height - 1 - ay;
    }

    let rows = GrayImage::from_fn(width, height, |x, y| {
        let (start, end) = window(x, kernel.width, ax, width);
        Luma([(start..=end).map(|xx| image.get_pixel(xx, y)[0]).fold(identity, pick)])
    });

    GrayImage::from_fn(width, height, |x, y| {
        let (start, end) = window(y, kernel.height, ay, height);
        Luma([(start..=end).map(|yy| rows.get_pixel(x, yy)[0]).fold(identity, pick)])
    })
}

/// Minimum over the kernel window
pub fn erode(image: &GrayImage, kernel: RectKernel) -> GrayImage {
    rank_filter(image, kernel, false, u8::MAX, u8::min)
}

/// Maximum over the kernel window
pub fn dilate(image: &GrayImage, kernel: RectKernel) -> GrayImage {
    rank_filter(image, kernel, true, u8::MIN, u8::max)
}

/// Opening: erosion followed by dilation. Removes structure smaller than the kernel.
pub fn open(image: &GrayImage, kernel: RectKernel) -> GrayImage {
    dilate(&erode(image, kernel), kernel)
}
