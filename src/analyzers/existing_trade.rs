//! Detection of trade setups already drawn on the chart
//!
//! Two independent cues are combined with a logical OR:
//!
//! - colored annotations (blue entry lines, purple position boxes)
//! - three or more flat, wide lines found by Hough on the edge map
//!
//! When either fires, stop-loss and take-profit offsets are estimated from the
//! nearest levels above and below the vertical midpoint, which stands in for
//! the current price.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{horizontal_levels, DetectedLevel};
use crate::{
    params::{check_params, get_ratio, get_scalar, get_span, ParamMeta, ParameterizedAnalyzer},
    raster::Raster,
    vision::{bands, detect_segments, edge_map, CannyThresholds, HoughParams, HsvImage, HueBand},
    AnalyzerError, AnalyzerId, ChartAnalyzer, ChartError, Ratio, Result,
};

impl_with_defaults!(ExistingTradeDetector);

// ============================================================
// OUTPUT TYPES
// ============================================================

/// How a detected setup is turned into a signal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeMode {
    /// Reproduce the drawn stop and target offsets
    #[default]
    Copy,
    /// Follow the chart with fixed offsets
    Follow,
}

/// Marker pixel counts and densities
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MarkerStats {
    pub blue_lines: usize,
    pub purple_zones: usize,
    pub red_lines: usize,
    pub yellow_lines: usize,
    pub horizontal_levels: usize,
    pub blue_density: f64,
    pub purple_density: f64,
    pub red_density: f64,
    pub yellow_density: f64,
}

/// Which trigger branches fired
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TriggerFlags {
    pub blue_lines: bool,
    pub purple_zones: bool,
    pub level_count: bool,
}

impl TriggerFlags {
    #[inline]
    pub fn any(&self) -> bool {
        self.blue_lines || self.purple_zones || self.level_count
    }
}

/// Offsets derived from the detected levels, in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TradeParameters {
    pub stop_loss_percent: f64,
    pub take_profit_percent: f64,
    pub levels_above: usize,
    pub levels_below: usize,
}

/// Output of [`ExistingTradeDetector`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExistingTrade {
    pub has_existing_trade: bool,
    pub mode: Option<TradeMode>,
    pub markers: MarkerStats,
    pub triggers: TriggerFlags,
    pub levels: Vec<DetectedLevel>,
    pub parameters: Option<TradeParameters>,
    pub confidence: f64,
}

impl fmt::Display for ExistingTrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(params) = self.parameters.filter(|_| self.has_existing_trade) else {
            return write!(
                f,
                "no trade setup ({} levels, blue {:.4}, purple {:.4})",
                self.levels.len(),
                self.markers.blue_density,
                self.markers.purple_density
            );
        };

        let mut fired = Vec::new();
        if self.triggers.blue_lines {
            fired.push("blue lines");
        }
        if self.triggers.purple_zones {
            fired.push("purple zones");
        }
        if self.triggers.level_count {
            fired.push("level count");
        }
        write!(
            f,
            "trade setup via {} ({} levels), SL {}% TP {}%",
            fired.join(" + "),
            self.levels.len(),
            params.stop_loss_percent,
            params.take_profit_percent
        )
    }
}

// ============================================================
// DETECTOR
// ============================================================

/// `clamp(distance * scale, min, max)` for one offset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OffsetRule {
    pub scale: f64,
    pub min: f64,
    pub max: f64,
}

impl OffsetRule {
    pub const fn new(scale: f64, min: f64, max: f64) -> Self {
        Self { scale, min, max }
    }

    #[inline]
    pub fn apply(&self, distance: f64) -> f64 {
        (distance * self.scale).max(self.min).min(self.max)
    }

    fn is_valid(&self) -> bool {
        self.scale.is_finite() && self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

/// Annotated trade setup detector
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExistingTradeDetector {
    pub mode: TradeMode,
    pub blue: HueBand,
    pub purple: HueBand,
    pub red: HueBand,
    pub yellow: HueBand,
    pub canny: CannyThresholds,
    pub hough_threshold: u32,
    pub max_line_gap: u32,
    /// Minimum level length is `width / min_length_divisor`
    pub min_length_divisor: u32,
    /// Maximum row difference between level endpoints
    pub max_level_dy: u32,
    pub blue_density: Ratio,
    pub purple_density: Ratio,
    pub min_levels: usize,
    /// Row standing in for the current price, as a fraction of height
    pub price_row: Ratio,
    pub take_profit: OffsetRule,
    pub stop_loss: OffsetRule,
    pub default_stop_loss: f64,
    pub default_take_profit: f64,
    pub trade_confidence: Ratio,
}

impl Default for ExistingTradeDetector {
    fn default() -> Self {
        Self {
            mode: TradeMode::Copy,
            blue: bands::BLUE,
            purple: bands::PURPLE,
            red: bands::RED,
            yellow: bands::YELLOW,
            canny: CannyThresholds::new(30.0, 100.0),
            hough_threshold: 40,
            max_line_gap: 20,
            min_length_divisor: 4,
            max_level_dy: 3,
            blue_density: Ratio::new_const(0.002),
            purple_density: Ratio::new_const(0.001),
            min_levels: 3,
            price_row: Ratio::new_const(0.5),
            take_profit: OffsetRule::new(10.0, 0.5, 3.0),
            stop_loss: OffsetRule::new(8.0, 0.3, 2.0),
            default_stop_loss: 0.5,
            default_take_profit: 1.5,
            trade_confidence: Ratio::new_const(0.9),
        }
    }
}

/// Count of levels on one side of `row`, and the distance to the closest
fn nearest(levels: &[DetectedLevel], row: f64, side: impl Fn(f64) -> bool) -> (usize, Option<f64>) {
    levels
        .iter()
        .filter(|l| side(l.y_position))
        .fold((0, None), |(count, best): (usize, Option<f64>), l| {
            let distance = (l.y_position - row).abs();
            (count + 1, Some(best.map_or(distance, |b| b.min(distance))))
        })
}

/// One decimal, rounding the exact binary value half to even
fn round_tenth(value: f64) -> f64 {
    format!("{value:.1}").parse().unwrap_or(value)
}

impl ExistingTradeDetector {
    fn marker_stats(&self, hsv: &HsvImage, levels: usize) -> MarkerStats {
        let total = (hsv.width() as usize * hsv.height() as usize).max(1) as f64;
        let blue_lines = hsv.count_in(&self.blue);
        let purple_zones = hsv.count_in(&self.purple);
        let red_lines = hsv.count_in(&self.red);
        let yellow_lines = hsv.count_in(&self.yellow);
        MarkerStats {
            blue_lines,
            purple_zones,
            red_lines,
            yellow_lines,
            horizontal_levels: levels,
            blue_density: blue_lines as f64 / total,
            purple_density: purple_zones as f64 / total,
            red_density: red_lines as f64 / total,
            yellow_density: yellow_lines as f64 / total,
        }
    }

    /// Flat, wide edge segments sorted top to bottom
    pub fn detect_levels(&self, raster: &Raster) -> Vec<DetectedLevel> {
        let (width, height) = (raster.width(), raster.height());
        let min_dx = width / self.min_length_divisor;
        let edges = edge_map(&raster.to_gray(), self.canny);
        let segments = detect_segments(
            &edges,
            &HoughParams::new(self.hough_threshold, min_dx, self.max_line_gap),
        );
        horizontal_levels(&segments, width, height, self.max_level_dy, min_dx)
    }

    /// Stop and target offsets from the levels nearest the price row.
    ///
    /// Falls back to the default offsets unless there is at least one level on
    /// each side. Both offsets are rounded to one decimal.
    pub fn trade_parameters(&self, levels: &[DetectedLevel], height: u32) -> TradeParameters {
        let height = height as f64;
        let price_row = height * self.price_row.get();

        let (levels_above, above) = nearest(levels, price_row, |y| y < price_row);
        let (levels_below, below) = nearest(levels, price_row, |y| y > price_row);

        let (stop_loss, take_profit) = match (above, below) {
            (Some(above), Some(below)) if height > 0.0 => (
                self.stop_loss.apply(below / height),
                self.take_profit.apply(above / height),
            ),
            _ => (self.default_stop_loss, self.default_take_profit),
        };

        TradeParameters {
            stop_loss_percent: round_tenth(stop_loss),
            take_profit_percent: round_tenth(take_profit),
            levels_above,
            levels_below,
        }
    }
}

impl ChartAnalyzer for ExistingTradeDetector {
    type Output = ExistingTrade;

    fn id(&self) -> AnalyzerId {
        AnalyzerId::ExistingTrade
    }

    fn analyze(&self, raster: &Raster) -> std::result::Result<ExistingTrade, AnalyzerError> {
        if raster.is_empty() {
            return Err(AnalyzerError::EmptyRaster);
        }

        let levels = self.detect_levels(raster);
        let markers = self.marker_stats(&raster.to_hsv(), levels.len());
        let triggers = TriggerFlags {
            blue_lines: markers.blue_density > self.blue_density.get(),
            purple_zones: markers.purple_density > self.purple_density.get(),
            level_count: levels.len() >= self.min_levels,
        };

        if !triggers.any() {
            return Ok(ExistingTrade {
                has_existing_trade: false,
                mode: None,
                markers,
                triggers,
                levels,
                parameters: None,
                confidence: 0.0,
            });
        }

        let parameters = self.trade_parameters(&levels, raster.height());
        Ok(ExistingTrade {
            has_existing_trade: true,
            mode: Some(self.mode),
            markers,
            triggers,
            levels,
            parameters: Some(parameters),
            confidence: self.trade_confidence.get(),
        })
    }

    fn degraded(&self) -> ExistingTrade {
        ExistingTrade {
            has_existing_trade: false,
            mode: None,
            markers: MarkerStats::default(),
            triggers: TriggerFlags::default(),
            levels: Vec::new(),
            parameters: None,
            confidence: 0.0,
        }
    }

    fn validate_config(&self) -> Result<()> {
        let bands = [self.blue, self.purple, self.red, self.yellow];
        if bands.iter().any(|b| !b.is_valid()) {
            return Err(ChartError::InvalidConfig("marker hue band has inverted bounds".into()));
        }
        if !self.canny.is_valid() {
            return Err(ChartError::InvalidConfig("existing_trade canny thresholds".into()));
        }
        if self.min_length_divisor == 0 {
            return Err(ChartError::InvalidValue("min_length_divisor must be > 0"));
        }
        if !self.stop_loss.is_valid() || !self.take_profit.is_valid() {
            return Err(ChartError::InvalidConfig("offset rule min exceeds max".into()));
        }
        for value in [self.default_stop_loss, self.default_take_profit] {
            if !value.is_finite() || value < 0.0 {
                return Err(ChartError::InvalidValue("default offsets must be finite and >= 0"));
            }
        }
        Ok(())
    }
}

// ============================================================
// PARAMETERS
// ============================================================

static EXISTING_TRADE_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("blue_density", 0.002, (0.001, 0.01, 0.001), "Blue marker density trigger"),
    ParamMeta::ratio("purple_density", 0.001, (0.0005, 0.005, 0.0005), "Purple zone density trigger"),
    ParamMeta::span("min_levels", 3.0, (2.0, 6.0, 1.0), "Horizontal levels that trigger on their own"),
    ParamMeta::span("hough_threshold", 40.0, (20.0, 80.0, 10.0), "Hough votes for a level"),
    ParamMeta::scalar("max_line_gap", 20.0, (0.0, 40.0, 5.0), "Gap bridged inside a level"),
];

impl ParameterizedAnalyzer for ExistingTradeDetector {
    fn param_meta() -> &'static [ParamMeta] {
        EXISTING_TRADE_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        check_params(Self::param_meta(), params)?;
        Ok(Self {
            blue_density: get_ratio(params, "blue_density", 0.002)?,
            purple_density: get_ratio(params, "purple_density", 0.001)?,
            min_levels: get_span(params, "min_levels", 3)?.get(),
            hough_threshold: get_span(params, "hough_threshold", 40)?.get() as u32,
            max_line_gap: get_scalar(params, "max_line_gap", 20.0)?.round() as u32,
            ..Self::default()
        })
    }

    fn analyzer_id() -> AnalyzerId {
        AnalyzerId::ExistingTrade
    }
}
