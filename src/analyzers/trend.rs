//! Trend from the balance of green and red hues

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    params::{check_params, get_ratio, get_scalar, ParamMeta, ParameterizedAnalyzer},
    raster::Raster,
    vision::{bands, HueBand},
    AnalyzerError, AnalyzerId, ChartAnalyzer, ChartError, Ratio, Result,
};

impl_with_defaults!(TrendColorAnalyzer);

/// Direction implied by chart colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorTrend {
    Bullish,
    Bearish,
    Neutral,
}

impl ColorTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorTrend::Bullish => "bullish",
            ColorTrend::Bearish => "bearish",
            ColorTrend::Neutral => "neutral",
        }
    }
}

/// Color with the larger pixel fraction (ties go to red)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DominantColor {
    Green,
    Red,
}

/// Output of [`TrendColorAnalyzer`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendAnalysis {
    pub trend: ColorTrend,
    pub confidence: f64,
    pub green_ratio: f64,
    pub red_ratio: f64,
    pub dominant_color: DominantColor,
}

impl fmt::Display for TrendAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.2}), green {:.4}, red {:.4}",
            self.trend.as_str(),
            self.confidence,
            self.green_ratio,
            self.red_ratio
        )
    }
}

/// Green vs red hue fractions over the whole raster
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendColorAnalyzer {
    pub green: HueBand,
    pub red: HueBand,
    /// Winning fraction must exceed this
    pub min_ratio: f64,
    pub base_confidence: f64,
    /// Confidence gained per unit of winning fraction
    pub ratio_gain: f64,
    pub max_confidence: f64,
    pub neutral_confidence: f64,
}

impl Default for TrendColorAnalyzer {
    fn default() -> Self {
        Self {
            green: bands::GREEN,
            red: bands::RED,
            min_ratio: 0.02,
            base_confidence: 0.6,
            ratio_gain: 5.0,
            max_confidence: 0.95,
            neutral_confidence: 0.5,
        }
    }
}

impl TrendColorAnalyzer {
    /// Classify a pair of fractions
    pub fn classify(&self, green_ratio: f64, red_ratio: f64) -> TrendAnalysis {
        let score = |ratio: f64| (self.base_confidence + ratio * self.ratio_gain).min(self.max_confidence);

        let (trend, confidence) = if green_ratio > red_ratio && green_ratio > self.min_ratio {
            (ColorTrend::Bullish, score(green_ratio))
        } else if red_ratio > green_ratio && red_ratio > self.min_ratio {
            (ColorTrend::Bearish, score(red_ratio))
        } else {
            (ColorTrend::Neutral, self.neutral_confidence)
        };

        TrendAnalysis {
            trend,
            confidence,
            green_ratio,
            red_ratio,
            dominant_color: if green_ratio > red_ratio {
                DominantColor::Green
            } else {
                DominantColor::Red
            },
        }
    }
}

impl ChartAnalyzer for TrendColorAnalyzer {
    type Output = TrendAnalysis;

    fn id(&self) -> AnalyzerId {
        AnalyzerId::TrendColors
    }

    fn analyze(&self, raster: &Raster) -> std::result::Result<TrendAnalysis, AnalyzerError> {
        if raster.is_empty() {
            return Err(AnalyzerError::EmptyRaster);
        }
        let hsv = raster.to_hsv();
        Ok(self.classify(hsv.fraction_in(&self.green), hsv.fraction_in(&self.red)))
    }

    fn degraded(&self) -> TrendAnalysis {
        TrendAnalysis {
            trend: ColorTrend::Neutral,
            confidence: self.neutral_confidence,
            green_ratio: 0.0,
            red_ratio: 0.0,
            dominant_color: DominantColor::Red,
        }
    }

    fn validate_config(&self) -> Result<()> {
        if !self.green.is_valid() || !self.red.is_valid() {
            return Err(ChartError::InvalidConfig("trend hue band has inverted bounds".into()));
        }
        for value in [
            self.min_ratio,
            self.base_confidence,
            self.max_confidence,
            self.neutral_confidence,
        ] {
            Ratio::new(value)?;
        }
        if !self.ratio_gain.is_finite() || self.ratio_gain < 0.0 {
            return Err(ChartError::InvalidValue("trend ratio_gain must be finite and >= 0"));
        }
        Ok(())
    }
}

// ============================================================
// PARAMETERS
// ============================================================

static TREND_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("min_ratio", 0.02, (0.005, 0.05, 0.005), "Minimum winning hue fraction"),
    ParamMeta::ratio("base_confidence", 0.6, (0.5, 0.7, 0.05), "Confidence at the threshold"),
    ParamMeta::scalar("ratio_gain", 5.0, (1.0, 10.0, 1.0), "Confidence per unit of hue fraction"),
];

impl ParameterizedAnalyzer for TrendColorAnalyzer {
    fn param_meta() -> &'static [ParamMeta] {
        TREND_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        check_params(Self::param_meta(), params)?;
        Ok(Self {
            min_ratio: get_ratio(params, "min_ratio", 0.02)?.get(),
            base_confidence: get_ratio(params, "base_confidence", 0.6)?.get(),
            ratio_gain: get_scalar(params, "ratio_gain", 5.0)?,
            ..Self::default()
        })
    }

    fn analyzer_id() -> AnalyzerId {
        AnalyzerId::TrendColors
    }
}
