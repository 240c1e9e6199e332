//! External contour extraction

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;

/// Outermost borders of the non-zero regions of `image`, each compressed with
/// [`compress_chain`]. Holes and borders nested inside holes are dropped.
pub fn external_contours(image: &GrayImage) -> Vec<Vec<Point<i32>>> {
    find_contours::<i32>(image)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|c| compress_chain(&c.points))
        .collect()
}

#[inline]
fn step(from: Point<i32>, to: Point<i32>) -> (i32, i32) {
    ((to.x - from.x).signum(), (to.y - from.y).signum())
}

/// Keep only the end points of horizontal, vertical and diagonal runs.
///
/// The first and last points of the chain are always kept.
pub fn compress_chain(points: &[Point<i32>]) -> Vec<Point<i32>> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let mut out = Vec::with_capacity(points.len());
    out.push(points[0]);
    for w in points.windows(3) {
        if step(w[0], w[1]) != step(w[1], w[2]) {
            out.push(w[1]);
        }
    }
    if let Some(last) = points.last() {
        out.push(*last);
    }
    out
}
