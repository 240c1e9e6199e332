//! Progressive probabilistic Hough transform
//!
//! Non-zero pixels are visited in a pseudo-random order driven by a fixed-seed
//! multiply-with-carry generator, so the segment list (and its order) is
//! reproducible for a given image. A pixel votes for every angle; as soon as
//! one accumulator cell reaches the threshold, the line through that pixel is
//! followed in both directions across gaps of at most `max_line_gap` pixels.
//! Pixels of an accepted segment withdraw their votes and are consumed.

use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Fixed-point precision for walking along a line
const WALK_SHIFT: u32 = 16;

/// Parameters for [`detect_segments`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoughParams {
    /// Distance resolution in pixels
    pub rho: f64,
    /// Angle resolution in radians
    pub theta: f64,
    /// Minimum accumulator votes
    pub threshold: u32,
    /// Minimum segment extent along x or y
    pub min_line_length: u32,
    /// Maximum run of background pixels bridged inside a segment
    pub max_line_gap: u32,
    /// Stop after this many segments
    pub max_lines: usize,
}

impl Default for HoughParams {
    fn default() -> Self {
        Self {
            rho: 1.0,
            theta: std::f64::consts::PI / 180.0,
            threshold: 50,
            min_line_length: 0,
            max_line_gap: 0,
            max_lines: usize::MAX,
        }
    }
}

impl HoughParams {
    pub fn new(threshold: u32, min_line_length: u32, max_line_gap: u32) -> Self {
        Self {
            threshold,
            min_line_length,
            max_line_gap,
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.rho.is_finite() && self.rho > 0.0 && self.theta.is_finite() && self.theta > 0.0
    }
}

/// Line segment with integer endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Segment {
    #[inline]
    pub fn dx(&self) -> i32 {
        self.x2 - self.x1
    }

    #[inline]
    pub fn dy(&self) -> i32 {
        self.y2 - self.y1
    }

    #[inline]
    pub fn length(&self) -> f64 {
        (self.dx() as f64).hypot(self.dy() as f64)
    }

    /// Absolute angle against the x axis in degrees, `0..=180`
    #[inline]
    pub fn angle_degrees(&self) -> f64 {
        (self.dy() as f64).atan2(self.dx() as f64).to_degrees().abs()
    }
}

/// Multiply-with-carry generator seeded with all ones
struct Mwc(u64);

impl Mwc {
    const MULTIPLIER: u64 = 4_164_903_690;

    fn new() -> Self {
        Self(u64::MAX)
    }

    #[inline]
    fn next_u32(&mut self) -> u32 {
        self.0 = (self.0 & 0xFFFF_FFFF)
            .wrapping_mul(Self::MULTIPLIER)
            .wrapping_add(self.0 >> 32);
        self.0 as u32
    }

    /// Uniform in `0..bound`
    #[inline]
    fn below(&mut self, bound: u32) -> u32 {
        self.next_u32() % bound
    }
}

/// Vote table over `(angle, rho)`
struct Accumulator {
    trig: Vec<(f32, f32)>,
    numrho: usize,
    offset: i32,
    cells: Vec<i32>,
}

impl Accumulator {
    fn new(width: i32, height: i32, params: &HoughParams) -> Self {
        let irho = (1.0 / params.rho) as f32;
        let numangle = ((std::f64::consts::PI / params.theta).round() as usize).max(1);
        let numrho = ((((width + height) * 2 + 1) as f64 / params.rho).round() as usize).max(1);
        let trig = (0..numangle)
            .map(|n| {
                let angle = (n as f64 * params.theta) as f32;
                (angle.cos() * irho, angle.sin() * irho)
            })
            .collect();
        Self {
            trig,
            numrho,
            offset: (numrho as i32 - 1) / 2,
            cells: vec![0; numangle * numrho],
        }
    }

    #[inline]
    fn cell(&self, n: usize, x: i32, y: i32) -> usize {
        let (cos, sin) = self.trig[n];
        let r = (x as f32 * cos + y as f32 * sin).round() as i32 + self.offset;
        n * self.numrho + r.clamp(0, self.numrho as i32 - 1) as usize
    }

    /// Add one vote per angle, returning the strongest `(votes, angle)`
    fn vote(&mut self, x: i32, y: i32, floor: i32) -> (i32, usize) {
        let mut best = (floor, 0);
        for n in 0..self.trig.len() {
            let idx = self.cell(n, x, y);
            self.cells[idx] += 1;
            if best.0 < self.cells[idx] {
                best = (self.cells[idx], n);
            }
        }
        best
    }

    fn withdraw(&mut self, x: i32, y: i32) {
        for n in 0..self.trig.len() {
            let idx = self.cell(n, x, y);
            self.cells[idx] -= 1;
        }
    }
}

/// Fixed-point walker stepping one pixel along the major axis
#[derive(Clone, Copy)]
struct Walker {
    x: i64,
    y: i64,
    dx: i64,
    dy: i64,
    x_major: bool,
}

impl Walker {
    fn new(x: i32, y: i32, cos: f32, sin: f32) -> Self {
        // direction along the line is perpendicular to its normal
        let a = -sin;
        let b = cos;
        let unit = (1i64 << WALK_SHIFT) as f32;
        let half = 1i64 << (WALK_SHIFT - 1);
        if a.abs() > b.abs() {
            Self {
                x: x as i64,
                y: ((y as i64) << WALK_SHIFT) + half,
                dx: if a > 0.0 { 1 } else { -1 },
                dy: (b * unit / a.abs()).round() as i64,
                x_major: true,
            }
        } else {
            Self {
                x: ((x as i64) << WALK_SHIFT) + half,
                y: y as i64,
                dx: (a * unit / b.abs()).round() as i64,
                dy: if b > 0.0 { 1 } else { -1 },
                x_major: false,
            }
        }
    }

    fn reversed(mut self) -> Self {
        self.dx = -self.dx;
        self.dy = -self.dy;
        self
    }

    #[inline]
    fn pixel(&self) -> (i64, i64) {
        if self.x_major {
            (self.x, self.y >> WALK_SHIFT)
        } else {
            (self.x >> WALK_SHIFT, self.y)
        }
    }

    #[inline]
    fn step(&mut self) {
        self.x += self.dx;
        self.y += self.dy;
    }
}

/// Detect line segments among the non-zero pixels of `image`.
///
/// Segments are returned in discovery order.
pub fn detect_segments(image: &GrayImage, params: &HoughParams) -> Vec<Segment> {
    let (width, height) = (image.width() as i32, image.height() as i32);
    if width == 0 || height == 0 || !params.is_valid() {
        return Vec::new();
    }

    let mut accum = Accumulator::new(width, height, params);
    let mut mask = vec![false; (width * height) as usize];
    let mut points: Vec<(i32, i32)> = Vec::new();
    for (x, y, px) in image.enumerate_pixels() {
        if px[0] != 0 {
            points.push((x as i32, y as i32));
            mask[(y as i32 * width + x as i32) as usize] = true;
        }
    }

    let inside = |x: i64, y: i64| x >= 0 && x < width as i64 && y >= 0 && y < height as i64;
    let index = |x: i64, y: i64| (y * width as i64 + x) as usize;
    let threshold = params.threshold as i32;
    let max_gap = params.max_line_gap;
    let min_len = params.min_line_length as i32;

    let mut rng = Mwc::new();
    let mut segments = Vec::new();
    let mut count = points.len();

    while count > 0 {
        let idx = rng.below(count as u32) as usize;
        let (x, y) = points[idx];
        points[idx] = points[count - 1];
        count -= 1;

        if !mask[index(x as i64, y as i64)] {
            continue;
        }

        let (votes, angle) = accum.vote(x, y, threshold - 1);
        if votes < threshold {
            continue;
        }

        let (cos, sin) = accum.trig[angle];
        let forward = Walker::new(x, y, cos, sin);
        let walkers = [forward, forward.reversed()];

        // extend in both directions
        let mut ends = [(x as i64, y as i64); 2];
        for (end, start) in ends.iter_mut().zip(walkers) {
            let mut walker = start;
            let mut gap = 0;
            loop {
                let (px, py) = walker.pixel();
                if !inside(px, py) {
                    break;
                }
                if mask[index(px, py)] {
                    gap = 0;
                    *end = (px, py);
                } else {
                    gap += 1;
                    if gap > max_gap {
                        break;
                    }
                }
                walker.step();
            }
        }

        let good = (ends[1].0 - ends[0].0).abs() >= min_len as i64
            || (ends[1].1 - ends[0].1).abs() >= min_len as i64;

        // consume the walked pixels
        for (end, start) in ends.iter().zip(walkers) {
            let mut walker = start;
            loop {
                let (px, py) = walker.pixel();
                if !inside(px, py) {
                    break;
                }
                let m = index(px, py);
                if mask[m] {
                    if good {
                        accum.withdraw(px as i32, py as i32);
                    }
                    mask[m] = false;
                }
                if (px, py) == *end {
                    break;
                }
                walker.step();
            }
        }

        if good {
            segments.push(Segment {
                x1: ends[0].0 as i32,
                y1: ends[0].1 as i32,
                x2: ends[1].0 as i32,
                y2: ends[1].1 as i32,
            });
            if segments.len() >= params.max_lines {
                break;
            }
        }
    }

    segments
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn canvas(width: u32, height: u32, lit: impl Fn(u32, u32) -> bool) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| Luma([if lit(x, y) { 255 } else { 0 }]))
    }

    #[test]
    fn test_mwc_sequence_is_fixed() {
        let mut a = Mwc::new();
        let mut b = Mwc::new();
        let xs: Vec<u32> = (0..8).map(|_| a.next_u32()).collect();
        let ys: Vec<u32> = (0..8).map(|_| b.next_u32()).collect();
        assert_eq!(xs, ys);
        assert!(xs.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_empty_image() {
        let img = GrayImage::new(40, 40);
        assert!(detect_segments(&img, &HoughParams::new(10, 10, 2)).is_empty());
    }

    #[test]
    fn test_single_horizontal_line() {
        let img = canvas(200, 100, |x, y| y == 40 && (20..180).contains(&x));
        let segments = detect_segments(&img, &HoughParams::new(40, 50, 10));
        assert_eq!(segments.len(), 1);
        let s = segments[0];
        assert_eq!(s.y1, 40);
        assert_eq!(s.y2, 40);
        assert_eq!(s.dx().abs(), 159);
        assert!(s.angle_degrees() < 1.0 || s.angle_degrees() > 179.0);
    }

    #[test]
    fn test_vertical_line() {
        let img = canvas(100, 200, |x, y| x == 30 && (10..190).contains(&y));
        let segments = detect_segments(&img, &HoughParams::new(40, 50, 10));
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].dx(), 0);
        assert!((segments[0].angle_degrees() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_gap_bridging() {
        // 10px hole in the middle of the line
        let img = canvas(200, 60, |x, y| y == 30 && (10..190).contains(&x) && !(95..105).contains(&x));
        let bridged = detect_segments(&img, &HoughParams::new(30, 100, 15));
        assert_eq!(bridged.len(), 1);
        let split = detect_segments(&img, &HoughParams::new(30, 100, 5));
        assert!(split.is_empty());
    }

    #[test]
    fn test_short_lines_rejected() {
        let img = canvas(200, 100, |x, y| y == 50 && (0..30).contains(&x));
        assert!(detect_segments(&img, &HoughParams::new(10, 50, 5)).is_empty());
    }

    #[test]
    fn test_deterministic_order() {
        let img = canvas(300, 200, |x, y| (y == 40 || y == 90 || y == 150) && (20..280).contains(&x));
        let params = HoughParams::new(40, 100, 10);
        let first = detect_segments(&img, &params);
        let second = detect_segments(&img, &params);
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[test]
    fn test_max_lines() {
        let img = canvas(300, 200, |x, y| (y == 40 || y == 90 || y == 150) && (20..280).contains(&x));
        let params = HoughParams {
            max_lines: 2,
            ..HoughParams::new(40, 100, 10)
        };
        assert_eq!(detect_segments(&img, &params).len(), 2);
    }
}
