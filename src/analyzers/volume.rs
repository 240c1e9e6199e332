//! Volume bars in the bottom band of the chart

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    params::{check_params, get_ratio, get_span, ParamMeta, ParameterizedAnalyzer},
    raster::Raster,
    vision::{nonzero_density, open, RectKernel},
    AnalyzerError, AnalyzerId, ChartAnalyzer, ChartError, Ratio, Result, Span,
};

impl_with_defaults!(VolumeAnalyzer);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumePattern {
    BarsDetected,
    NoVolumeVisible,
}

/// Output of [`VolumeAnalyzer`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeAnalysis {
    pub volume_present: bool,
    pub volume_pattern: VolumePattern,
    pub volume_density: f64,
}

impl fmt::Display for VolumeAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.volume_pattern {
            VolumePattern::BarsDetected => "bars detected",
            VolumePattern::NoVolumeVisible => "no volume visible",
        };
        write!(f, "{label} (density {:.4})", self.volume_density)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeAnalyzer {
    /// First row of the band as a fraction of height
    pub band_start: Ratio,
    /// Height of the vertical structuring element
    pub bar_height: Span,
    pub min_density: Ratio,
}

impl Default for VolumeAnalyzer {
    fn default() -> Self {
        Self {
            band_start: Ratio::new_const(0.7),
            bar_height: Span::new_const(5),
            min_density: Ratio::new_const(0.005),
        }
    }
}

impl ChartAnalyzer for VolumeAnalyzer {
    type Output = VolumeAnalysis;

    fn id(&self) -> AnalyzerId {
        AnalyzerId::Volume
    }

    fn analyze(&self, raster: &Raster) -> std::result::Result<VolumeAnalysis, AnalyzerError> {
        let band = raster.bottom_band(self.band_start.get());
        if band.is_empty() {
            return Err(AnalyzerError::EmptyRegion("volume band"));
        }

        let bars = open(&band.to_gray(), RectKernel::vertical(self.bar_height.get() as u32));
        let density = nonzero_density(&bars);
        let present = density > self.min_density.get();

        Ok(VolumeAnalysis {
            volume_present: present,
            volume_pattern: if present {
                VolumePattern::BarsDetected
            } else {
                VolumePattern::NoVolumeVisible
            },
            volume_density: density,
        })
    }

    fn degraded(&self) -> VolumeAnalysis {
        VolumeAnalysis {
            volume_present: false,
            volume_pattern: VolumePattern::NoVolumeVisible,
            volume_density: 0.0,
        }
    }

    fn validate_config(&self) -> Result<()> {
        if self.band_start.get() >= 1.0 {
            return Err(ChartError::InvalidConfig("volume band_start leaves no rows".into()));
        }
        Ok(())
    }
}

// ============================================================
// PARAMETERS
// ============================================================

static VOLUME_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio("band_start", 0.7, (0.5, 0.9, 0.05), "First row of the volume band"),
    ParamMeta::span("bar_height", 5.0, (3.0, 9.0, 2.0), "Vertical structuring element height"),
    ParamMeta::ratio("min_density", 0.005, (0.001, 0.02, 0.001), "Bar density for volume"),
];

impl ParameterizedAnalyzer for VolumeAnalyzer {
    fn param_meta() -> &'static [ParamMeta] {
        VOLUME_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        check_params(Self::param_meta(), params)?;
        Ok(Self {
            band_start: get_ratio(params, "band_start", 0.7)?,
            bar_height: get_span(params, "bar_height", 5)?,
            min_density: get_ratio(params, "min_density", 0.005)?,
            ..Self::default()
        })
    }

    fn analyzer_id() -> AnalyzerId {
        AnalyzerId::Volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_bars_in_bottom_band() {
        // 2 px wide bars from row 80 down, every 10 columns
        let img = RgbImage::from_fn(100, 100, |x, y| {
            if y >= 80 && x % 10 < 2 {
                Rgb([120, 120, 120])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let out = VolumeAnalyzer::with_defaults()
            .analyze(&Raster::from_rgb(img))
            .unwrap();
        assert!(out.volume_present);
        assert_eq!(out.volume_pattern, VolumePattern::BarsDetected);
        // 20 columns x 20 rows over a 100 x 30 band
        assert!((out.volume_density - 400.0 / 3000.0).abs() < 1e-12);
    }

    #[test]
    fn test_content_above_band_ignored() {
        let img = RgbImage::from_fn(100, 100, |_, y| {
            if y < 60 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let out = VolumeAnalyzer::default().analyze(&Raster::from_rgb(img)).unwrap();
        assert!(!out.volume_present);
        assert_eq!(out.volume_density, 0.0);
    }

    #[test]
    fn test_empty_band() {
        let raster = Raster::from_rgb(RgbImage::new(10, 0));
        assert_eq!(
            VolumeAnalyzer::default().analyze(&raster),
            Err(AnalyzerError::EmptyRegion("volume band"))
        );
    }
}
