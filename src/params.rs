//! Parameter metadata for chart analyzers
//!
//! This module describes each analyzer's tunable thresholds, enabling:
//! - Threshold sweeps over labelled chart sets
//! - Parameter documentation
//! - Validation of externally supplied overrides
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//!
//! use chartsig::params::ParameterizedAnalyzer;
//! use chartsig::prelude::*;
//!
//! for param in TrendColorAnalyzer::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let mut overrides = HashMap::new();
//! overrides.insert("min_ratio", 0.05);
//! let analyzer = TrendColorAnalyzer::with_params(&overrides).unwrap();
//! assert_eq!(analyzer.min_ratio, 0.05);
//! ```

use std::collections::HashMap;

use crate::{AnalyzerId, ChartError, Ratio, Result, Span};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
  /// Fraction in 0.0..=1.0
  Ratio,
  /// Positive pixel count or length
  Span,
  /// Unbounded multiplier or angle, limited only by its range
  Scalar,
}

/// Metadata for a single analyzer parameter
#[derive(Debug, Clone)]
pub struct ParamMeta {
  /// Parameter name, matching the config field (e.g., "min_density")
  pub name: &'static str,
  pub param_type: ParamType,
  pub default: f64,
  /// Range for sweeps: (min, max, step)
  pub range: (f64, f64, f64),
  pub description: &'static str,
}

impl ParamMeta {
  pub const fn ratio(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Ratio, default, range, description }
  }

  pub const fn span(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Span, default, range, description }
  }

  pub const fn scalar(
    name: &'static str,
    default: f64,
    range: (f64, f64, f64),
    description: &'static str,
  ) -> Self {
    Self { name, param_type: ParamType::Scalar, default, range, description }
  }

  /// All sweep values from `min` to `max` inclusive
  pub fn generate_grid(&self) -> Vec<f64> {
    let (min, max, step) = self.range;
    if step <= 0.0 {
      return vec![min];
    }
    let mut values = Vec::new();
    let mut i = 0u32;
    loop {
      let v = min + step * i as f64;
      if v > max + step * 1e-9 {
        break;
      }
      values.push(v.min(max));
      i += 1;
    }
    values
  }

  /// Validate a value for this parameter
  pub fn validate(&self, value: f64) -> Result<()> {
    let (min, max, _) = self.range;
    if value.is_nan() || value < min || value > max {
      return Err(ChartError::OutOfRange { field: self.name, value, min, max });
    }
    match self.param_type {
      ParamType::Ratio => Ratio::new(value).map(|_| ()),
      ParamType::Span => {
        if value < 1.0 || value.fract() != 0.0 {
          return Err(ChartError::InvalidValue("Span must be a positive integer"));
        }
        Ok(())
      },
      ParamType::Scalar => Ok(()),
    }
  }
}

// ============================================================
// PARAMETERIZED ANALYZER TRAIT
// ============================================================

/// Analyzers whose thresholds can be discovered and overridden by name
pub trait ParameterizedAnalyzer: Sized {
  fn param_meta() -> &'static [ParamMeta];

  /// Build from overrides; missing parameters keep their defaults.
  ///
  /// Unknown names and out-of-range values are rejected.
  fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

  fn analyzer_id() -> AnalyzerId;
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

/// Reject names not in `meta` and values outside their ranges
pub fn check_params(meta: &[ParamMeta], params: &HashMap<&str, f64>) -> Result<()> {
  for (name, value) in params {
    let param = meta
      .iter()
      .find(|m| m.name == *name)
      .ok_or_else(|| ChartError::InvalidConfig(format!("unknown parameter: {name}")))?;
    param.validate(*value)?;
  }
  Ok(())
}

/// Helper to get a Ratio from params with default fallback
pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
  let value = params.get(key).copied().unwrap_or(default);
  Ratio::new(value)
}

/// Helper to get a Span from params with default fallback
pub fn get_span(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Span> {
  let value = params.get(key).copied().unwrap_or(default as f64);
  if value < 1.0 || value.fract() != 0.0 {
    return Err(ChartError::InvalidValue("Span must be a positive integer"));
  }
  Span::new(value as usize)
}

/// Helper to get a finite scalar from params with default fallback
pub fn get_scalar(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<f64> {
  let value = params.get(key).copied().unwrap_or(default);
  if !value.is_finite() {
    return Err(ChartError::InvalidValue("parameter must be finite"));
  }
  Ok(value)
}

// ============================================================
// TESTS
// ============================================================
