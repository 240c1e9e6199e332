//! Price action from the vertical drift of external contours

use std::collections::HashMap;
use std::fmt;

use imageproc::point::Point;
use serde::{Deserialize, Serialize};

use crate::{
    params::{check_params, get_ratio, get_span, ParamMeta, ParameterizedAnalyzer},
    raster::Raster,
    vision::{blur, edge_map, external_contours, CannyThresholds},
    AnalyzerError, AnalyzerId, ChartAnalyzer, ChartError, Ratio, Result, Span,
};

impl_with_defaults!(PriceActionAnalyzer);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveDirection {
    Upward,
    Downward,
    Sideways,
    Unclear,
}

impl MoveDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveDirection::Upward => "upward",
            MoveDirection::Downward => "downward",
            MoveDirection::Sideways => "sideways",
            MoveDirection::Unclear => "unclear",
        }
    }

    /// Upward or downward
    #[inline]
    pub fn is_directional(&self) -> bool {
        matches!(self, MoveDirection::Upward | MoveDirection::Downward)
    }
}

/// Output of [`PriceActionAnalyzer`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceAction {
    pub trend_direction: MoveDirection,
    pub trend_strength: f64,
    pub upward_movements: usize,
    pub downward_movements: usize,
}

impl fmt::Display for PriceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.2}), {} up / {} down",
            self.trend_direction.as_str(),
            self.trend_strength,
            self.upward_movements,
            self.downward_movements
        )
    }
}

/// Blur, edge, trace external contours, then compare each contour's first
/// and last point. Image rows grow downward, so a smaller final row is an
/// upward move.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceActionAnalyzer {
    pub blur_size: Span,
    pub canny: CannyThresholds,
    /// Contours need more than this many points after compression
    pub min_points: usize,
    pub upward_ratio: Ratio,
    pub downward_ratio: Ratio,
    pub sideways_strength: Ratio,
    pub unclear_strength: Ratio,
}

impl Default for PriceActionAnalyzer {
    fn default() -> Self {
        Self {
            blur_size: Span::new_const(5),
            canny: CannyThresholds::new(50.0, 150.0),
            min_points: 10,
            upward_ratio: Ratio::new_const(0.6),
            downward_ratio: Ratio::new_const(0.4),
            sideways_strength: Ratio::new_const(0.5),
            unclear_strength: Ratio::new_const(0.3),
        }
    }
}

impl PriceActionAnalyzer {
    /// Up and down counts over qualifying contours
    pub fn count_moves(&self, contours: &[Vec<Point<i32>>]) -> (usize, usize) {
        contours
            .iter()
            .filter(|c| c.len() > self.min_points)
            .filter_map(|c| Some((c.first()?.y, c.last()?.y)))
            .fold((0, 0), |(up, down), (first, last)| match last.cmp(&first) {
                std::cmp::Ordering::Less => (up + 1, down),
                std::cmp::Ordering::Greater => (up, down + 1),
                std::cmp::Ordering::Equal => (up, down),
            })
    }

    pub fn classify(&self, upward: usize, downward: usize) -> PriceAction {
        let total = upward + downward;
        let (trend_direction, trend_strength) = if total == 0 {
            (MoveDirection::Unclear, self.unclear_strength.get())
        } else {
            let ratio = upward as f64 / total as f64;
            if ratio > self.upward_ratio.get() {
                (MoveDirection::Upward, ratio)
            } else if ratio < self.downward_ratio.get() {
                (MoveDirection::Downward, 1.0 - ratio)
            } else {
                (MoveDirection::Sideways, self.sideways_strength.get())
            }
        };

        PriceAction {
            trend_direction,
            trend_strength,
            upward_movements: upward,
            downward_movements: downward,
        }
    }
}

impl ChartAnalyzer for PriceActionAnalyzer {
    type Output = PriceAction;

    fn id(&self) -> AnalyzerId {
        AnalyzerId::PriceAction
    }

    fn analyze(&self, raster: &Raster) -> std::result::Result<PriceAction, AnalyzerError> {
        if raster.is_empty() {
            return Err(AnalyzerError::EmptyRaster);
        }
        let smoothed = blur(&raster.to_gray(), self.blur_size.get() as u32);
        let contours = external_contours(&edge_map(&smoothed, self.canny));
        let (up, down) = self.count_moves(&contours);
        Ok(self.classify(up, down))
    }

    fn degraded(&self) -> PriceAction {
        self.classify(0, 0)
    }

    fn validate_config(&self) -> Result<()> {
        if !self.canny.is_valid() {
            return Err(ChartError::InvalidConfig("price_action canny thresholds".into()));
        }
        if self.downward_ratio > self.upward_ratio {
            return Err(ChartError::InvalidConfig(
                "price_action downward_ratio exceeds upward_ratio".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// PARAMETERS
// ============================================================

static PRICE_ACTION_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("upward_ratio", 0.6, (0.5, 0.8, 0.05), "Up share above which the move is upward"),
    ParamMeta::ratio("downward_ratio", 0.4, (0.2, 0.5, 0.05), "Up share below which the move is downward"),
    ParamMeta::span("min_points", 10.0, (5.0, 30.0, 5.0), "Contour points required"),
];

impl ParameterizedAnalyzer for PriceActionAnalyzer {
    fn param_meta() -> &'static [ParamMeta] {
        PRICE_ACTION_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        check_params(Self::param_meta(), params)?;
        Ok(Self {
            upward_ratio: get_ratio(params, "upward_ratio", 0.6)?,
            downward_ratio: get_ratio(params, "downward_ratio", 0.4)?,
            min_points: get_span(params, "min_points", 10)?.get(),
            ..Self::default()
        })
    }

    fn analyzer_id() -> AnalyzerId {
        AnalyzerId::PriceAction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn contour(first_y: i32, last_y: i32, len: usize) -> Vec<Point<i32>> {
        let mut points: Vec<Point<i32>> = (0..len as i32).map(|i| Point::new(i, first_y)).collect();
        if let Some(last) = points.last_mut() {
            last.y = last_y;
        }
        points
    }

    #[test]
    fn test_count_moves() {
        let analyzer = PriceActionAnalyzer::default();
        let contours = vec![
            contour(50, 10, 12), // up
            contour(10, 50, 12), // down
            contour(20, 20, 12), // flat, ignored
            contour(50, 10, 10), // too short
        ];
        assert_eq!(analyzer.count_moves(&contours), (1, 1));
    }

    #[test]
    fn test_classify_branches() {
        let analyzer = PriceActionAnalyzer::default();

        let up = analyzer.classify(7, 3);
        assert_eq!(up.trend_direction, MoveDirection::Upward);
        assert!((up.trend_strength - 0.7).abs() < 1e-12);

        let down = analyzer.classify(1, 4);
        assert_eq!(down.trend_direction, MoveDirection::Downward);
        assert!((down.trend_strength - 0.8).abs() < 1e-12);

        let side = analyzer.classify(1, 1);
        assert_eq!(side.trend_direction, MoveDirection::Sideways);
        assert_eq!(side.trend_strength, 0.5);

        // boundaries are exclusive
        assert_eq!(analyzer.classify(3, 2).trend_direction, MoveDirection::Sideways);
        assert_eq!(analyzer.classify(2, 3).trend_direction, MoveDirection::Sideways);
    }

    #[test]
    fn test_black_raster_is_unclear() {
        let out = PriceActionAnalyzer::default()
            .analyze(&Raster::from_rgb(RgbImage::new(50, 50)))
            .unwrap();
        assert_eq!(out.trend_direction, MoveDirection::Unclear);
        assert_eq!(out.trend_strength, 0.3);
        assert_eq!((out.upward_movements, out.downward_movements), (0, 0));
    }
}
