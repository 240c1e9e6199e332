//! Signal fusion
//!
//! Combines the per-analyzer records into one [`TradingSignal`]. A detected
//! trade setup short-circuits everything else; otherwise a weighted score is
//! built from trend, candlestick, price-action and support/resistance inputs.
//!
//! # Decision order
//!
//! 1. existing setup in copy mode: `copy` with the drawn offsets
//! 2. existing setup in follow mode: `follow` with fixed offsets
//! 3. weighted score with a floored confidence
//!
//! Non-finite inputs never reach the caller as NaN: they turn into the fixed
//! fallback signal.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
    analyzers::{
        CandlestickPatterns, ColorTrend, ExistingTrade, MoveDirection, PriceAction,
        SupportResistance, TradeMode, TrendAnalysis,
    },
    trace::{Stage, Trace},
    AnalysisRecords, ChartError, FusionError, Ratio, Result,
};

// ============================================================
// SIGNAL TYPES
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
    /// Reproduce a setup drawn on the chart
    Copy,
    /// Follow a setup drawn on the chart at market
    Follow,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
            Side::Copy => "copy",
            Side::Follow => "follow",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Path that produced a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalMethod {
    ComputerVision,
    CopyExistingTrade,
    ExistingTradeFollow,
    /// Fusion inputs were unusable
    Fallback,
    /// The image could not be decoded
    ErrorFallback,
}

/// Final recommendation. Null prices are resolved by the caller against the
/// live market price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradingSignal {
    pub is_signal: bool,
    pub symbol: String,
    pub side: Side,
    pub confidence: f64,
    pub entry_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub stop_loss_percent: f64,
    pub take_profit_percent: f64,
    pub quantity: f64,
    pub leverage: u32,
    pub reasoning: String,
    pub method: SignalMethod,
}

// ============================================================
// CONFIGURATION
// ============================================================

/// Score contribution of each weighted input
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub trend: f64,
    pub candlestick: f64,
    pub price_action: f64,
    /// Flat bonus when support/resistance is present
    pub support_resistance: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            trend: 0.4,
            candlestick: 0.3,
            price_action: 0.2,
            support_resistance: 0.1,
        }
    }
}

impl FusionWeights {
    #[inline]
    pub fn total(&self) -> f64 {
        self.trend + self.candlestick + self.price_action + self.support_resistance
    }

    pub fn validate(&self) -> Result<()> {
        for weight in [self.trend, self.candlestick, self.price_action, self.support_resistance] {
            Ratio::new(weight)?;
        }
        let total = self.total();
        if total > 1.0 + 1e-9 {
            return Err(ChartError::OutOfRange {
                field: "fusion weights total",
                value: total,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(())
    }
}

/// Deterministic fusion of analysis records into a signal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalFusion {
    pub symbol: String,
    pub quantity: f64,
    pub leverage: u32,
    pub weights: FusionWeights,
    /// Score floor when no input set a direction
    pub default_bias_floor: f64,
    /// Lower bound of every weighted-path confidence
    pub confidence_floor: f64,
    /// Magnitude of the weighted-path stop offset
    pub stop_offset: f64,
    /// Magnitude of the weighted-path target offset
    pub target_offset: f64,
    /// Offsets used when a setup carries none, and by follow mode
    pub setup_stop_loss: f64,
    pub setup_take_profit: f64,
    pub copy_confidence: f64,
    pub follow_confidence: f64,
    pub fallback_confidence: f64,
    pub error_confidence: f64,
}

impl Default for SignalFusion {
    fn default() -> Self {
        Self {
            symbol: "ETH".to_string(),
            quantity: 0.1,
            leverage: 1,
            weights: FusionWeights::default(),
            default_bias_floor: 0.7,
            confidence_floor: 0.75,
            stop_offset: 0.5,
            target_offset: 2.0,
            setup_stop_loss: 0.5,
            setup_take_profit: 1.5,
            copy_confidence: 0.95,
            follow_confidence: 0.9,
            fallback_confidence: 0.8,
            error_confidence: 0.75,
        }
    }
}

fn percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

fn finite(input: &'static str, value: f64) -> std::result::Result<f64, FusionError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FusionError::InvalidScore { input, value })
    }
}

// ============================================================
// FUSION
// ============================================================

impl SignalFusion {
    pub fn validate_config(&self) -> Result<()> {
        self.weights.validate()?;
        for value in [
            self.default_bias_floor,
            self.confidence_floor,
            self.copy_confidence,
            self.follow_confidence,
            self.fallback_confidence,
            self.error_confidence,
        ] {
            Ratio::new(value)?;
        }
        if self.symbol.trim().is_empty() {
            return Err(ChartError::InvalidConfig("fusion symbol is empty".into()));
        }
        if !self.quantity.is_finite() || self.quantity <= 0.0 {
            return Err(ChartError::InvalidValue("quantity must be finite and > 0"));
        }
        if self.leverage == 0 {
            return Err(ChartError::InvalidValue("leverage must be >= 1"));
        }
        Ok(())
    }

    fn signal(
        &self,
        side: Side,
        confidence: f64,
        stop_loss_percent: f64,
        take_profit_percent: f64,
        reasoning: String,
        method: SignalMethod,
    ) -> TradingSignal {
        TradingSignal {
            is_signal: true,
            symbol: self.symbol.clone(),
            side,
            confidence,
            entry_price: None,
            stop_loss: None,
            take_profit: None,
            stop_loss_percent,
            take_profit_percent,
            quantity: self.quantity,
            leverage: self.leverage,
            reasoning,
            method,
        }
    }

    /// Fuse records into a signal, falling back on invalid inputs
    pub fn fuse(&self, records: &AnalysisRecords, trace: &mut Trace) -> TradingSignal {
        let signal = match self.try_fuse(records, trace) {
            Ok(signal) => signal,
            Err(err) => {
                warn!(error = %err, "signal fusion failed");
                trace.record(Stage::Fusion, err.to_string());
                self.fallback_signal(&err)
            }
        };
        trace.record(
            Stage::Signal,
            format!("{} at {:.2} via {:?}", signal.side, signal.confidence, signal.method),
        );
        signal
    }

    pub fn try_fuse(
        &self,
        records: &AnalysisRecords,
        trace: &mut Trace,
    ) -> std::result::Result<TradingSignal, FusionError> {
        if let Some(signal) = self.existing_trade(&records.existing_trade.value, trace) {
            return Ok(signal);
        }
        self.weighted(
            &records.trend_analysis.value,
            &records.candlestick_patterns.value,
            &records.price_action.value,
            &records.support_resistance.value,
            trace,
        )
    }

    /// Copy or follow signal when a setup was detected
    pub fn existing_trade(&self, trade: &ExistingTrade, trace: &mut Trace) -> Option<TradingSignal> {
        if !trade.has_existing_trade {
            return None;
        }

        let signal = match trade.mode.unwrap_or_default() {
            TradeMode::Copy => {
                let (stop, target) = trade.parameters.map_or(
                    (self.setup_stop_loss, self.setup_take_profit),
                    |p| (p.stop_loss_percent, p.take_profit_percent),
                );
                self.signal(
                    Side::Copy,
                    self.copy_confidence,
                    stop,
                    target,
                    format!("Copying existing trade setup from chart - SL:{stop:?}% TP:{target:?}%"),
                    SignalMethod::CopyExistingTrade,
                )
            }
            TradeMode::Follow => self.signal(
                Side::Follow,
                self.follow_confidence,
                self.setup_stop_loss,
                self.setup_take_profit,
                "Following existing trade setup detected in chart with current market price as entry"
                    .to_string(),
                SignalMethod::ExistingTradeFollow,
            ),
        };
        trace.record(Stage::Fusion, "existing trade setup short-circuits fusion");
        Some(signal)
    }

    /// Weighted combination of the independent analyzers
    pub fn weighted(
        &self,
        trend: &TrendAnalysis,
        patterns: &CandlestickPatterns,
        action: &PriceAction,
        levels: &SupportResistance,
        trace: &mut Trace,
    ) -> std::result::Result<TradingSignal, FusionError> {
        let w = &self.weights;
        let mut score = 0.0;
        let mut side = None;
        let mut fragments: Vec<String> = Vec::new();
        let mut note = |fragment: String, trace: &mut Trace| {
            trace.record(Stage::Fusion, fragment.clone());
            fragments.push(fragment);
        };

        let trend_confidence = finite("trend confidence", trend.confidence)?;
        match trend.trend {
            ColorTrend::Bearish => {
                score += w.trend * trend_confidence;
                side = Some(Side::Sell);
                note(format!("Bearish trend detected ({} confidence)", percent(trend_confidence)), trace);
            }
            ColorTrend::Bullish => {
                score += w.trend * trend_confidence;
                side = Some(Side::Buy);
                note(format!("Bullish trend detected ({} confidence)", percent(trend_confidence)), trace);
            }
            ColorTrend::Neutral => {}
        }

        if patterns.pattern_detected {
            let confidence = finite("pattern confidence", patterns.confidence)?;
            score += w.candlestick * confidence;
            note(format!("Candlestick patterns identified ({} confidence)", percent(confidence)), trace);
        }

        if action.trend_direction.is_directional() {
            let strength = finite("price action strength", action.trend_strength)?;
            let (direction, label) = match action.trend_direction {
                MoveDirection::Upward => (Side::Buy, "Upward"),
                _ => (Side::Sell, "Downward"),
            };
            side.get_or_insert(direction);
            score += w.price_action * strength;
            note(format!("{label} price action ({} strength)", percent(strength)), trace);
        }

        if levels.has_support_resistance {
            score += w.support_resistance;
            note("Support/resistance levels identified".to_string(), trace);
        }

        let side = match side {
            Some(side) => side,
            None => {
                score = f64::max(self.default_bias_floor, score);
                note(format!("Default bearish bias for {}", self.symbol), trace);
                Side::Sell
            }
        };

        let confidence = f64::max(self.confidence_floor, finite("signal score", score)?);
        let (stop, target) = match side {
            Side::Buy => (-self.stop_offset, self.target_offset),
            _ => (self.stop_offset, -self.target_offset),
        };

        Ok(self.signal(
            side,
            confidence,
            stop,
            target,
            format!("Chart analysis: {}", fragments.join("; ")),
            SignalMethod::ComputerVision,
        ))
    }

    /// Fixed safe signal for unusable fusion inputs
    pub fn fallback_signal(&self, err: &FusionError) -> TradingSignal {
        self.signal(
            Side::Sell,
            self.fallback_confidence,
            self.stop_offset,
            self.target_offset,
            format!("Analysis fallback: {err}"),
            SignalMethod::Fallback,
        )
    }

    /// Safe default signal for an input that never reached the analyzers
    pub fn error_signal(&self, message: &str) -> TradingSignal {
        self.signal(
            Side::Sell,
            self.error_confidence,
            self.stop_offset,
            self.target_offset,
            format!("Error fallback: {message}"),
            SignalMethod::ErrorFallback,
        )
    }
}

// ============================================================
// TESTS
// ============================================================
