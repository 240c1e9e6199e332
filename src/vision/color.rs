//! Color-space conversion and hue-band masks
//!
//! HSV follows the 8-bit convention: hue is halved into `[0, 180)`, saturation
//! and value span `[0, 255]`. Luma uses BT.601 weights in 14-bit fixed point.

use image::{GrayImage, Luma, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

// ============================================================
// LUMA
// ============================================================

const LUMA_SHIFT: u32 = 14;
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;

/// BT.601 luma of one pixel
#[inline]
pub fn luma(Rgb([r, g, b]): Rgb<u8>) -> u8 {
    let y = r as u32 * LUMA_R + g as u32 * LUMA_G + b as u32 * LUMA_B + (1 << (LUMA_SHIFT - 1));
    (y >> LUMA_SHIFT).min(255) as u8
}

/// Convert an RGB buffer to single-channel luma
pub fn grayscale(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        Luma([luma(*image.get_pixel(x, y))])
    })
}

// ============================================================
// HSV
// ============================================================

/// 8-bit HSV pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl From<Rgb<u8>> for Hsv {
    fn from(Rgb([r, g, b]): Rgb<u8>) -> Self {
        let (r, g, b) = (r as i32, g as i32, b as i32);
        let v = r.max(g).max(b);
        let min = r.min(g).min(b);
        let diff = v - min;

        let s = if v == 0 { 0 } else { (255 * diff + v / 2) / v };

        let h = if diff == 0 {
            0.0
        } else {
            let diff = diff as f64;
            let degrees = if v == r {
                60.0 * (g - b) as f64 / diff
            } else if v == g {
                120.0 + 60.0 * (b - r) as f64 / diff
            } else {
                240.0 + 60.0 * (r - g) as f64 / diff
            };
            if degrees < 0.0 {
                degrees + 360.0
            } else {
                degrees
            }
        };

        Self {
            h: (h / 2.0).round().min(180.0) as u8,
            s: s.clamp(0, 255) as u8,
            v: v as u8,
        }
    }
}

/// Inclusive HSV box `lower..=upper` on every channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    #[inline]
    pub fn contains(&self, px: Hsv) -> bool {
        (self.lower[0]..=self.upper[0]).contains(&px.h)
            && (self.lower[1]..=self.upper[1]).contains(&px.s)
            && (self.lower[2]..=self.upper[2]).contains(&px.v)
    }

    pub fn is_valid(&self) -> bool {
        self.lower.iter().zip(&self.upper).all(|(lo, hi)| lo <= hi) && self.upper[0] <= 180
    }
}

/// A hue band, optionally unioned with a second range for bands that wrap
/// around hue 0/180 (red).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HueBand {
    pub primary: HsvRange,
    #[serde(default)]
    pub wrap: Option<HsvRange>,
}

impl HueBand {
    pub const fn single(range: HsvRange) -> Self {
        Self { primary: range, wrap: None }
    }

    pub const fn wrapping(primary: HsvRange, wrap: HsvRange) -> Self {
        Self { primary, wrap: Some(wrap) }
    }

    #[inline]
    pub fn contains(&self, px: Hsv) -> bool {
        self.primary.contains(px) || self.wrap.is_some_and(|w| w.contains(px))
    }

    pub fn is_valid(&self) -> bool {
        self.primary.is_valid() && self.wrap.map_or(true, |w| w.is_valid())
    }
}

/// Standard marker bands
pub mod bands {
    use super::{HsvRange, HueBand};

    pub const GREEN: HueBand = HueBand::single(HsvRange::new([35, 50, 50], [85, 255, 255]));
    pub const RED: HueBand = HueBand::wrapping(
        HsvRange::new([0, 50, 50], [10, 255, 255]),
        HsvRange::new([170, 50, 50], [180, 255, 255]),
    );
    pub const BLUE: HueBand = HueBand::single(HsvRange::new([100, 30, 30], [130, 255, 255]));
    pub const PURPLE: HueBand = HueBand::single(HsvRange::new([140, 30, 30], [170, 255, 255]));
    pub const YELLOW: HueBand = HueBand::single(HsvRange::new([15, 50, 50], [35, 255, 255]));
}

/// Row-major HSV image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HsvImage {
    width: u32,
    height: u32,
    data: Vec<Hsv>,
}

impl HsvImage {
    pub fn from_rgb(image: &RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            data: image.pixels().map(|p| Hsv::from(*p)).collect(),
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Option<Hsv> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.data.get((y * self.width + x) as usize).copied()
    }

    /// Pixels inside `band`
    pub fn count_in(&self, band: &HueBand) -> usize {
        self.data.iter().filter(|px| band.contains(**px)).count()
    }

    /// Fraction of pixels inside `band`, 0.0 for an empty image
    pub fn fraction_in(&self, band: &HueBand) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.count_in(band) as f64 / self.data.len() as f64
    }

    /// Binary mask (255 inside, 0 outside)
    pub fn mask(&self, band: &HueBand) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let inside = self.get(x, y).is_some_and(|px| band.contains(px));
            Luma([if inside { 255 } else { 0 }])
        })
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_hues() {
        assert_eq!(Hsv::from(Rgb([255, 0, 0])), Hsv { h: 0, s: 255, v: 255 });
        assert_eq!(Hsv::from(Rgb([0, 255, 0])), Hsv { h: 60, s: 255, v: 255 });
        assert_eq!(Hsv::from(Rgb([0, 0, 255])), Hsv { h: 120, s: 255, v: 255 });
        assert_eq!(Hsv::from(Rgb([0, 0, 0])), Hsv { h: 0, s: 0, v: 0 });
        assert_eq!(Hsv::from(Rgb([128, 128, 128])).s, 0);
    }

    #[test]
    fn test_red_band_wraps() {
        // magenta-leaning red lands near hue 175
        let px = Hsv::from(Rgb([255, 0, 40]));
        assert!(px.h >= 170);
        assert!(bands::RED.contains(px));
        assert!(bands::RED.contains(Hsv::from(Rgb([255, 20, 0]))));
        assert!(!bands::RED.contains(Hsv::from(Rgb([0, 200, 0]))));
    }

    #[test]
    fn test_marker_bands() {
        assert!(bands::GREEN.contains(Hsv::from(Rgb([0, 200, 83]))));
        assert!(bands::BLUE.contains(Hsv::from(Rgb([33, 150, 243]))));
        assert!(bands::PURPLE.contains(Hsv::from(Rgb([200, 0, 255]))));
        assert!(bands::YELLOW.contains(Hsv::from(Rgb([255, 200, 0]))));
        // gray carries no hue
        assert!(!bands::BLUE.contains(Hsv::from(Rgb([200, 200, 200]))));
    }

    #[test]
    fn test_luma_weights() {
        assert_eq!(luma(Rgb([255, 255, 255])), 255);
        assert_eq!(luma(Rgb([0, 0, 0])), 0);
        assert_eq!(luma(Rgb([255, 0, 0])), 76);
        assert_eq!(luma(Rgb([0, 255, 0])), 150);
        assert_eq!(luma(Rgb([0, 0, 255])), 29);
    }

    #[test]
    fn test_fraction_and_mask() {
        let mut img = RgbImage::new(10, 10);
        for x in 0..10 {
            img.put_pixel(x, 0, Rgb([0, 200, 0]));
        }
        let hsv = HsvImage::from_rgb(&img);
        assert_eq!(hsv.count_in(&bands::GREEN), 10);
        assert!((hsv.fraction_in(&bands::GREEN) - 0.1).abs() < 1e-12);
        let mask = hsv.mask(&bands::GREEN);
        assert_eq!(mask.get_pixel(3, 0)[0], 255);
        assert_eq!(mask.get_pixel(3, 1)[0], 0);
    }

    #[test]
    fn test_band_validation() {
        assert!(bands::RED.is_valid());
        let inverted = HueBand::single(HsvRange::new([90, 0, 0], [10, 255, 255]));
        assert!(!inverted.is_valid());
    }
}
