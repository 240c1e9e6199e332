//! Chart analyzers
//!
//! Each analyzer is an independent heuristic over one decoded [`Raster`]:
//!
//! - **trend**: green/red hue balance
//! - **existing_trade**: annotated trade markers and horizontal price levels
//! - **candlestick**: directional edge density
//! - **support_resistance**: near-horizontal lines on the raw grayscale
//! - **price_action**: vertical displacement of external contours
//! - **volume**: bar-like structure in the bottom band
//!
//! Analyzers are their own configuration: every threshold is a public field
//! with a serde default, and `analyze` never mutates `self`.
//!
//! [`Raster`]: crate::raster::Raster

/// Generate `with_defaults()` -> `Self::default()` for multiple analyzer types.
macro_rules! impl_with_defaults {
  ($($analyzer:ty),* $(,)?) => {
    $(impl $analyzer {
      pub fn with_defaults() -> Self { Self::default() }
    })*
  };
}

pub mod candlestick;
pub mod existing_trade;
pub mod price_action;
pub mod support_resistance;
pub mod trend;
pub mod volume;

pub use candlestick::*;
pub use existing_trade::*;
pub use price_action::*;
pub use support_resistance::*;
pub use trend::*;
pub use volume::*;

use serde::Serialize;

use crate::vision::Segment;

/// Near-horizontal segment treated as a candidate price level
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectedLevel {
    /// Mean row of the two endpoints
    pub y_position: f64,
    /// `y_position / height`
    pub height_ratio: f64,
    /// Horizontal extent in pixels
    pub length: u32,
    /// `length / width`
    pub strength: f64,
}

/// Keep flat, wide segments and sort them top to bottom.
///
/// A segment qualifies when `|dy| <= max_dy` and `|dx| >= min_dx`. The sort is
/// stable, so levels on the same row keep detection order.
pub fn horizontal_levels(
    segments: &[Segment],
    width: u32,
    height: u32,
    max_dy: u32,
    min_dx: u32,
) -> Vec<DetectedLevel> {
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let mut levels: Vec<DetectedLevel> = segments
        .iter()
        .filter(|s| s.dy().unsigned_abs() <= max_dy && s.dx().unsigned_abs() >= min_dx)
        .map(|s| {
            let y_position = (s.y1 + s.y2) as f64 / 2.0;
            let length = s.dx().unsigned_abs();
            DetectedLevel {
                y_position,
                height_ratio: y_position / height as f64,
                length,
                strength: length as f64 / width as f64,
            }
        })
        .collect();

    levels.sort_by(|a, b| a.y_position.total_cmp(&b.y_position));
    levels
}
