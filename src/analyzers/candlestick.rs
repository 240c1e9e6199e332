//! Candlestick structure from directional edge density

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    params::{check_params, get_ratio, get_scalar, get_span, ParamMeta, ParameterizedAnalyzer},
    raster::Raster,
    vision::{count_nonzero, edge_map, open, CannyThresholds, RectKernel},
    AnalyzerError, AnalyzerId, ChartAnalyzer, ChartError, Ratio, Result, Span,
};

impl_with_defaults!(CandlestickDetector);

/// Pattern label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    StandardCandlesticks,
    NoClearPattern,
}

/// Output of [`CandlestickDetector`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandlestickPatterns {
    pub pattern_detected: bool,
    pub pattern_type: PatternKind,
    pub confidence: f64,
    pub candlestick_density: f64,
}

impl fmt::Display for CandlestickPatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.pattern_type {
            PatternKind::StandardCandlesticks => "standard candlesticks",
            PatternKind::NoClearPattern => "no clear pattern",
        };
        write!(
            f,
            "{label} (density {:.4}, confidence {:.2})",
            self.candlestick_density, self.confidence
        )
    }
}

/// Edge map opened with a tall and a wide kernel; bodies and wicks survive
/// the tall one, caps and gridlines the wide one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CandlestickDetector {
    pub canny: CannyThresholds,
    /// Length of both structuring elements
    pub stroke_length: Span,
    pub min_density: Ratio,
    /// Confidence per unit of density
    pub density_gain: f64,
    pub max_confidence: Ratio,
    pub absent_confidence: Ratio,
}

impl Default for CandlestickDetector {
    fn default() -> Self {
        Self {
            canny: CannyThresholds::new(50.0, 150.0),
            stroke_length: Span::new_const(10),
            min_density: Ratio::new_const(0.01),
            density_gain: 50.0,
            max_confidence: Ratio::new_const(0.9),
            absent_confidence: Ratio::new_const(0.3),
        }
    }
}

impl CandlestickDetector {
    pub fn classify(&self, density: f64) -> CandlestickPatterns {
        if density > self.min_density.get() {
            CandlestickPatterns {
                pattern_detected: true,
                pattern_type: PatternKind::StandardCandlesticks,
                confidence: (density * self.density_gain).min(self.max_confidence.get()),
                candlestick_density: density,
            }
        } else {
            CandlestickPatterns {
                pattern_detected: false,
                pattern_type: PatternKind::NoClearPattern,
                confidence: self.absent_confidence.get(),
                candlestick_density: density,
            }
        }
    }
}

impl ChartAnalyzer for CandlestickDetector {
    type Output = CandlestickPatterns;

    fn id(&self) -> AnalyzerId {
        AnalyzerId::Candlestick
    }

    fn analyze(&self, raster: &Raster) -> std::result::Result<CandlestickPatterns, AnalyzerError> {
        if raster.is_empty() {
            return Err(AnalyzerError::EmptyRaster);
        }
        let edges = edge_map(&raster.to_gray(), self.canny);
        let length = self.stroke_length.get() as u32;
        let vertical = count_nonzero(&open(&edges, RectKernel::vertical(length)));
        let horizontal = count_nonzero(&open(&edges, RectKernel::horizontal(length)));

        let density = (vertical + horizontal) as f64 / raster.pixel_count() as f64;
        Ok(self.classify(density))
    }

    fn degraded(&self) -> CandlestickPatterns {
        CandlestickPatterns {
            pattern_detected: false,
            pattern_type: PatternKind::NoClearPattern,
            confidence: self.absent_confidence.get(),
            candlestick_density: 0.0,
        }
    }

    fn validate_config(&self) -> Result<()> {
        if !self.canny.is_valid() {
            return Err(ChartError::InvalidConfig("candlestick canny thresholds".into()));
        }
        if !self.density_gain.is_finite() || self.density_gain < 0.0 {
            return Err(ChartError::InvalidValue("density_gain must be finite and >= 0"));
        }
        Ok(())
    }
}

// ============================================================
// PARAMETERS
// ============================================================

static CANDLESTICK_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("min_density", 0.01, (0.005, 0.05, 0.005), "Edge density for a pattern"),
    ParamMeta::scalar("density_gain", 50.0, (10.0, 100.0, 10.0), "Confidence per unit of density"),
    ParamMeta::span("stroke_length", 10.0, (5.0, 20.0, 5.0), "Structuring element length"),
];

impl ParameterizedAnalyzer for CandlestickDetector {
    fn param_meta() -> &'static [ParamMeta] {
        CANDLESTICK_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        check_params(Self::param_meta(), params)?;
        Ok(Self {
            min_density: get_ratio(params, "min_density", 0.01)?,
            density_gain: get_scalar(params, "density_gain", 50.0)?,
            stroke_length: get_span(params, "stroke_length", 10)?,
            ..Self::default()
        })
    }

    fn analyzer_id() -> AnalyzerId {
        AnalyzerId::Candlestick
    }
}
