//! Support and resistance levels from near-horizontal lines
//!
//! Lines are detected on the raw grayscale raster, so every non-zero pixel
//! votes. A level's strength grows with the number of levels accepted before
//! it (`min(1, index * 0.1)`), which ranks later discoveries first. Ties keep
//! the detector's native order.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    params::{check_params, get_scalar, get_span, ParamMeta, ParameterizedAnalyzer},
    raster::Raster,
    vision::{detect_segments, HoughParams, Segment},
    AnalyzerError, AnalyzerId, ChartAnalyzer, ChartError, Result,
};

impl_with_defaults!(SupportResistanceFinder);

/// One ranked level
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankedLevel {
    /// Integer midpoint row
    pub y_position: i32,
    pub length: f64,
    pub strength: f64,
}

/// Output of [`SupportResistanceFinder`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupportResistance {
    pub levels_detected: usize,
    pub strong_levels: Vec<RankedLevel>,
    pub has_support_resistance: bool,
}

impl fmt::Display for SupportResistance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} levels", self.levels_detected)?;
        if let Some(top) = self.strong_levels.first() {
            write!(f, ", strongest at row {} ({:.1})", top.y_position, top.strength)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupportResistanceFinder {
    pub hough: HoughParams,
    /// Maximum deviation from horizontal in degrees
    pub max_angle: f64,
    pub strength_step: f64,
    pub top_levels: usize,
    /// `has_support_resistance` requires more than this many levels
    pub min_levels: usize,
}

impl Default for SupportResistanceFinder {
    fn default() -> Self {
        Self {
            hough: HoughParams::new(100, 50, 10),
            max_angle: 5.0,
            strength_step: 0.1,
            top_levels: 5,
            min_levels: 2,
        }
    }
}

impl SupportResistanceFinder {
    #[inline]
    fn is_flat(&self, segment: &Segment) -> bool {
        let angle = segment.angle_degrees();
        angle < self.max_angle || angle > 180.0 - self.max_angle
    }

    /// Rank segments in detection order
    pub fn rank(&self, segments: &[Segment]) -> SupportResistance {
        let mut levels: Vec<RankedLevel> = Vec::new();
        for segment in segments.iter().filter(|s| self.is_flat(s)) {
            let strength = (levels.len() as f64 * self.strength_step).min(1.0);
            levels.push(RankedLevel {
                y_position: (segment.y1 + segment.y2).div_euclid(2),
                length: segment.length(),
                strength,
            });
        }

        let levels_detected = levels.len();
        levels.sort_by(|a, b| b.strength.total_cmp(&a.strength));
        levels.truncate(self.top_levels);

        SupportResistance {
            levels_detected,
            strong_levels: levels,
            has_support_resistance: levels_detected > self.min_levels,
        }
    }
}

impl ChartAnalyzer for SupportResistanceFinder {
    type Output = SupportResistance;

    fn id(&self) -> AnalyzerId {
        AnalyzerId::SupportResistance
    }

    fn analyze(&self, raster: &Raster) -> std::result::Result<SupportResistance, AnalyzerError> {
        if raster.is_empty() {
            return Err(AnalyzerError::EmptyRaster);
        }
        let segments = detect_segments(&raster.to_gray(), &self.hough);
        Ok(self.rank(&segments))
    }

    fn degraded(&self) -> SupportResistance {
        SupportResistance {
            levels_detected: 0,
            strong_levels: Vec::new(),
            has_support_resistance: false,
        }
    }

    fn validate_config(&self) -> Result<()> {
        if !self.hough.is_valid() {
            return Err(ChartError::InvalidConfig("support_resistance hough resolution".into()));
        }
        if !(0.0..=90.0).contains(&self.max_angle) {
            return Err(ChartError::OutOfRange {
                field: "max_angle",
                value: self.max_angle,
                min: 0.0,
                max: 90.0,
            });
        }
        if !self.strength_step.is_finite() || self.strength_step < 0.0 {
            return Err(ChartError::InvalidValue("strength_step must be finite and >= 0"));
        }
        Ok(())
    }
}

// ============================================================
// PARAMETERS
// ============================================================

static SUPPORT_RESISTANCE_PARAMS: &[ParamMeta] = &[
    ParamMeta::span("threshold", 100.0, (50.0, 200.0, 25.0), "Hough votes for a line"),
    ParamMeta::span("min_line_length", 50.0, (20.0, 100.0, 10.0), "Minimum line length"),
    ParamMeta::scalar("max_line_gap", 10.0, (0.0, 30.0, 5.0), "Gap bridged inside a line"),
    ParamMeta::scalar("max_angle", 5.0, (1.0, 15.0, 1.0), "Deviation from horizontal in degrees"),
];

impl ParameterizedAnalyzer for SupportResistanceFinder {
    fn param_meta() -> &'static [ParamMeta] {
        SUPPORT_RESISTANCE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        check_params(Self::param_meta(), params)?;
        let defaults = Self::default();
        Ok(Self {
            hough: HoughParams {
                threshold: get_span(params, "threshold", 100)?.get() as u32,
                min_line_length: get_span(params, "min_line_length", 50)?.get() as u32,
                max_line_gap: get_scalar(params, "max_line_gap", 10.0)?.round() as u32,
                ..defaults.hough
            },
            max_angle: get_scalar(params, "max_angle", 5.0)?,
            ..defaults
        })
    }

    fn analyzer_id() -> AnalyzerId {
        AnalyzerId::SupportResistance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn flat(y: i32) -> Segment {
        Segment { x1: 0, y1: y, x2: 100, y2: y + 1 }
    }

    #[test]
    fn test_rank_by_discovery_order() {
        let segments = [
            flat(10),
            Segment { x1: 0, y1: 0, x2: 50, y2: 50 }, // diagonal, dropped
            flat(20),
            flat(30),
            flat(40),
        ];
        let out = SupportResistanceFinder::default().rank(&segments);
        assert_eq!(out.levels_detected, 4);
        assert!(out.has_support_resistance);
        let rows: Vec<i32> = out.strong_levels.iter().map(|l| l.y_position).collect();
        assert_eq!(rows, vec![40, 30, 20, 10]);
        assert_eq!(out.strong_levels[3].strength, 0.0);
    }

    #[test]
    fn test_top_five_and_saturation() {
        let segments: Vec<Segment> = (0..15).map(|i| flat(i * 5)).collect();
        let out = SupportResistanceFinder::default().rank(&segments);
        assert_eq!(out.levels_detected, 15);
        assert_eq!(out.strong_levels.len(), 5);
        // indices 10..15 all saturate at 1.0 and keep detection order
        let rows: Vec<i32> = out.strong_levels.iter().map(|l| l.y_position).collect();
        assert_eq!(rows, vec![50, 55, 60, 65, 70]);
        assert!(out.strong_levels.iter().all(|l| l.strength == 1.0));
    }

    #[test]
    fn test_reversed_segment_is_flat() {
        let back = Segment { x1: 100, y1: 10, x2: 0, y2: 11 };
        let out = SupportResistanceFinder::default().rank(&[back]);
        assert_eq!(out.levels_detected, 1);
        assert!(!out.has_support_resistance);
    }

    #[test]
    fn test_black_raster_has_no_levels() {
        let raster = Raster::from_rgb(RgbImage::from_pixel(80, 60, Rgb([0, 0, 0])));
        let out = SupportResistanceFinder::default().analyze(&raster).unwrap();
        assert_eq!(out.levels_detected, 0);
        assert!(out.strong_levels.is_empty());
    }
}
