//! # chartsig - chart screenshot signal engine
//!
//! Turns a single chart screenshot into a structured trading recommendation by
//! fusing independent image heuristics: color balance, annotated trade
//! markers, candlestick edge density, horizontal levels, contour motion and
//! volume bars.
//!
//! ## Quick Start
//!
//! ```rust
//! use chartsig::prelude::*;
//! use image::{Rgb, RgbImage};
//!
//! let engine = EngineBuilder::new().build().unwrap();
//!
//! // any decoded image works; encoded bytes go through `engine.analyze(&bytes)`
//! let raster = Raster::from_rgb(RgbImage::from_pixel(64, 48, Rgb([0, 0, 0])));
//! let analysis = engine.analyze_raster(&raster);
//!
//! assert!(analysis.signal.confidence >= 0.75);
//! assert_eq!(analysis.signal.side, Side::Sell);
//! ```

pub mod analyzers;
pub mod fusion;
pub mod params;
pub mod raster;
pub mod trace;
pub mod vision;

pub mod prelude {
    pub use crate::{
        // Analyzers
        analyzers::*,
        // Parallel
        analyze_parallel,
        // Fusion
        fusion::{FusionWeights, Side, SignalFusion, SignalMethod, TradingSignal},
        // Parameters
        params::{get_ratio, get_scalar, get_span, ParamMeta, ParamType, ParameterizedAnalyzer},
        // Decoding
        raster::{ImageDecoder, Raster},
        // Trace
        trace::{Stage, Trace, TraceStep},
        AnalysisMode,
        AnalysisRecords,
        AnalyzerError,
        AnalyzerId,
        BatchError,
        BatchResult,
        ChartAnalysis,
        // Core traits
        ChartAnalyzer,
        ChartConfig,
        ChartEngine,
        // Errors
        ChartError,
        ChartReport,
        DecodeError,
        EngineBuilder,
        EngineConfig,
        FusionError,
        Ratio,
        Record,
        RecordStatus,
        Result,
        Span,
    };
}

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use analyzers::{
    CandlestickDetector, CandlestickPatterns, ExistingTrade, ExistingTradeDetector, PriceAction,
    PriceActionAnalyzer, SupportResistance, SupportResistanceFinder, TrendAnalysis,
    TrendColorAnalyzer, VolumeAnalysis, VolumeAnalyzer,
};
use fusion::{SignalFusion, SignalMethod, TradingSignal};
use raster::{ImageDecoder, Raster};
use trace::{Stage, Trace};

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, ChartError>;

/// Top-level errors
#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Fusion failed: {0}")]
    Fusion(#[from] FusionError),
}

/// The input could not be turned into a raster. Fatal to the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("data URI has no ',' separator")]
    InvalidDataUri,

    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("image data too small: {len} bytes (minimum {min})")]
    TooSmall { len: usize, min: usize },

    #[error("unsupported or corrupt image: {0}")]
    Image(#[source] image::ImageError),
}

/// Internal failure of one analyzer. Converted into a degraded record.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnalyzerError {
    #[error("raster is empty")]
    EmptyRaster,

    #[error("analysis region is empty: {0}")]
    EmptyRegion(&'static str),

    #[error("non-finite {metric}: {value}")]
    NonFinite { metric: &'static str, value: f64 },

    #[error("analyzer panicked: {0}")]
    Panicked(String),
}

/// Fusion inputs could not be combined. Answered with the fixed safe signal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FusionError {
    #[error("invalid {input} score: {value}")]
    InvalidScore { input: &'static str, value: f64 },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(ChartError::InvalidValue("Ratio cannot be NaN or infinite"));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(ChartError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Pixel span or count (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Span(usize);

impl Span {
    /// Create a new Span, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(ChartError::InvalidValue("Span must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Span {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Span {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Span::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// ANALYZER TRAIT
// ============================================================

/// Identifier of an analyzer stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerId {
    TrendColors,
    ExistingTrade,
    Candlestick,
    SupportResistance,
    PriceAction,
    Volume,
}

impl AnalyzerId {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyzerId::TrendColors => "trend_colors",
            AnalyzerId::ExistingTrade => "existing_trade",
            AnalyzerId::Candlestick => "candlestick",
            AnalyzerId::SupportResistance => "support_resistance",
            AnalyzerId::PriceAction => "price_action",
            AnalyzerId::Volume => "volume",
        }
    }
}

impl fmt::Display for AnalyzerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One independent heuristic over a decoded raster.
///
/// Implementations hold their own thresholds and never share mutable state,
/// so any number of analyzers may run concurrently on the same raster.
pub trait ChartAnalyzer: Send + Sync {
    type Output: Clone + Send + fmt::Display + Serialize;

    fn id(&self) -> AnalyzerId;

    fn analyze(&self, raster: &Raster) -> std::result::Result<Self::Output, AnalyzerError>;

    /// Neutral value substituted when `analyze` fails or is skipped
    fn degraded(&self) -> Self::Output;

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }
}

/// Outcome tag of an analysis record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecordStatus {
    Complete,
    Degraded { reason: String },
    Skipped,
}

/// Result of one analyzer plus its status
#[derive(Debug, Clone, Serialize)]
pub struct Record<T> {
    pub status: RecordStatus,
    #[serde(flatten)]
    pub value: T,
}

impl<T> Record<T> {
    pub fn complete(value: T) -> Self {
        Self {
            status: RecordStatus::Complete,
            value,
        }
    }

    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Self {
            status: RecordStatus::Degraded {
                reason: reason.into(),
            },
            value,
        }
    }

    pub fn skipped(value: T) -> Self {
        Self {
            status: RecordStatus::Skipped,
            value,
        }
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        matches!(self.status, RecordStatus::Complete)
    }

    #[inline]
    pub fn is_degraded(&self) -> bool {
        matches!(self.status, RecordStatus::Degraded { .. })
    }

    #[inline]
    pub fn is_skipped(&self) -> bool {
        matches!(self.status, RecordStatus::Skipped)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Run an analyzer behind a failure boundary.
///
/// Errors and panics are logged and replaced by the analyzer's degraded value.
pub fn run_isolated<A: ChartAnalyzer>(analyzer: &A, raster: &Raster) -> Record<A::Output> {
    let id = analyzer.id();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| analyzer.analyze(raster)))
        .unwrap_or_else(|payload| Err(AnalyzerError::Panicked(panic_message(&*payload))));

    match outcome {
        Ok(value) => Record::complete(value),
        Err(err) => {
            warn!(analyzer = id.as_str(), error = %err, "analyzer degraded");
            Record::degraded(analyzer.degraded(), err.to_string())
        }
    }
}

// ============================================================
// ENGINE CONFIGURATION
// ============================================================

/// Analysis depth selected by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    #[default]
    Comprehensive,
    /// Skips the candlestick and volume analyzers
    Quick,
}

/// Engine configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mode: AnalysisMode,
    /// Run analyzers on the rayon pool instead of the calling thread
    pub parallel: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: AnalysisMode::Comprehensive,
            parallel: true,
        }
    }
}

/// Full pipeline configuration, deserializable as one document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub engine: EngineConfig,
    pub decoder: ImageDecoder,
    pub trend: TrendColorAnalyzer,
    pub existing_trade: ExistingTradeDetector,
    pub candlestick: CandlestickDetector,
    pub support_resistance: SupportResistanceFinder,
    pub price_action: PriceActionAnalyzer,
    pub volume: VolumeAnalyzer,
    pub fusion: SignalFusion,
}

impl ChartConfig {
    fn validate(&self) -> Result<()> {
        if self.decoder.min_payload_bytes == 0 {
            return Err(ChartError::InvalidConfig(
                "decoder.min_payload_bytes must be > 0".into(),
            ));
        }
        self.trend.validate_config()?;
        self.existing_trade.validate_config()?;
        self.candlestick.validate_config()?;
        self.support_resistance.validate_config()?;
        self.price_action.validate_config()?;
        self.volume.validate_config()?;
        self.fusion.validate_config()
    }
}

// ============================================================
// ANALYSIS OUTPUT
// ============================================================

/// Per-analyzer records of one invocation
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRecords {
    pub trend_analysis: Record<TrendAnalysis>,
    pub existing_trade: Record<ExistingTrade>,
    pub candlestick_patterns: Record<CandlestickPatterns>,
    pub support_resistance: Record<SupportResistance>,
    pub price_action: Record<PriceAction>,
    pub volume_analysis: Record<VolumeAnalysis>,
}

impl AnalysisRecords {
    fn trace_into(&self, trace: &mut Trace) {
        trace_record(trace, AnalyzerId::TrendColors, &self.trend_analysis);
        trace_record(trace, AnalyzerId::ExistingTrade, &self.existing_trade);
        trace_record(trace, AnalyzerId::Candlestick, &self.candlestick_patterns);
        trace_record(trace, AnalyzerId::SupportResistance, &self.support_resistance);
        trace_record(trace, AnalyzerId::PriceAction, &self.price_action);
        trace_record(trace, AnalyzerId::Volume, &self.volume_analysis);
    }

    /// Analyzers whose record was degraded
    pub fn degraded(&self) -> Vec<AnalyzerId> {
        [
            (AnalyzerId::TrendColors, self.trend_analysis.is_degraded()),
            (AnalyzerId::ExistingTrade, self.existing_trade.is_degraded()),
            (AnalyzerId::Candlestick, self.candlestick_patterns.is_degraded()),
            (AnalyzerId::SupportResistance, self.support_resistance.is_degraded()),
            (AnalyzerId::PriceAction, self.price_action.is_degraded()),
            (AnalyzerId::Volume, self.volume_analysis.is_degraded()),
        ]
        .into_iter()
        .filter_map(|(id, degraded)| degraded.then_some(id))
        .collect()
    }
}

fn trace_record<T: fmt::Display>(trace: &mut Trace, id: AnalyzerId, record: &Record<T>) {
    let message = match &record.status {
        RecordStatus::Complete => record.value.to_string(),
        RecordStatus::Degraded { reason } => format!("degraded ({reason}); using {}", record.value),
        RecordStatus::Skipped => "skipped in quick mode".to_string(),
    };
    trace.record(Stage::Analyzer(id), message);
}

/// Records, signal and trace of one successful invocation
#[derive(Debug, Clone, Serialize)]
pub struct ChartAnalysis {
    pub records: AnalysisRecords,
    pub signal: TradingSignal,
    pub trace: Trace,
}

/// Caller-facing result. Always carries a usable signal.
#[derive(Debug, Clone, Serialize)]
pub struct ChartReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisRecords>,
    pub trading_signal: TradingSignal,
    pub confidence: f64,
    pub method: SignalMethod,
    pub trace: Trace,
}

impl From<ChartAnalysis> for ChartReport {
    fn from(analysis: ChartAnalysis) -> Self {
        Self {
            success: true,
            error: None,
            confidence: analysis.signal.confidence,
            method: analysis.signal.method,
            analysis: Some(analysis.records),
            trading_signal: analysis.signal,
            trace: analysis.trace,
        }
    }
}

// ============================================================
// CHART ENGINE
// ============================================================

/// Main analysis engine
#[derive(Debug, Clone)]
pub struct ChartEngine {
    config: ChartConfig,
}

impl ChartEngine {
    #[inline]
    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    /// Decode an encoded image without analyzing it
    pub fn decode(&self, input: &[u8]) -> Result<Raster> {
        Ok(self.config.decoder.decode(input)?)
    }

    /// Analyze encoded bytes; never fails.
    ///
    /// A decode failure yields `success = false` with the safe default signal.
    pub fn analyze(&self, input: &[u8]) -> ChartReport {
        match self.try_analyze(input) {
            Ok(analysis) => analysis.into(),
            Err(err) => {
                error!(error = %err, bytes = input.len(), "chart analysis failed");
                let mut trace = Trace::new();
                trace.record(Stage::Decode, err.to_string());
                let signal = self.config.fusion.error_signal(&err.to_string());
                trace.record(Stage::Signal, signal.reasoning.clone());
                ChartReport {
                    success: false,
                    error: Some(err.to_string()),
                    analysis: None,
                    confidence: signal.confidence,
                    method: signal.method,
                    trading_signal: signal,
                    trace,
                }
            }
        }
    }

    /// Analyze encoded bytes, surfacing decode errors
    pub fn try_analyze(&self, input: &[u8]) -> Result<ChartAnalysis> {
        let raster = self.decode(input)?;
        Ok(self.analyze_raster(&raster))
    }

    /// Analyze an already decoded raster
    pub fn analyze_raster(&self, raster: &Raster) -> ChartAnalysis {
        let mut trace = Trace::new();
        trace.record(
            Stage::Decode,
            format!("raster {}x{}", raster.width(), raster.height()),
        );

        let records = self.run_analyzers(raster);
        records.trace_into(&mut trace);

        let signal = self.config.fusion.fuse(&records, &mut trace);
        info!(
            side = ?signal.side,
            confidence = signal.confidence,
            method = ?signal.method,
            "chart signal generated"
        );

        ChartAnalysis {
            records,
            signal,
            trace,
        }
    }

    /// Run every analyzer and collect their records
    pub fn run_analyzers(&self, raster: &Raster) -> AnalysisRecords {
        let cfg = &self.config;
        let (
            (trend_analysis, existing_trade),
            ((candlestick_patterns, support_resistance), (price_action, volume_analysis)),
        ) = if cfg.engine.parallel {
            rayon::join(
                || {
                    rayon::join(
                        || run_isolated(&cfg.trend, raster),
                        || run_isolated(&cfg.existing_trade, raster),
                    )
                },
                || {
                    rayon::join(
                        || {
                            rayon::join(
                                || self.run_optional(&cfg.candlestick, raster),
                                || run_isolated(&cfg.support_resistance, raster),
                            )
                        },
                        || {
                            rayon::join(
                                || run_isolated(&cfg.price_action, raster),
                                || self.run_optional(&cfg.volume, raster),
                            )
                        },
                    )
                },
            )
        } else {
            (
                (
                    run_isolated(&cfg.trend, raster),
                    run_isolated(&cfg.existing_trade, raster),
                ),
                (
                    (
                        self.run_optional(&cfg.candlestick, raster),
                        run_isolated(&cfg.support_resistance, raster),
                    ),
                    (
                        run_isolated(&cfg.price_action, raster),
                        self.run_optional(&cfg.volume, raster),
                    ),
                ),
            )
        };

        AnalysisRecords {
            trend_analysis,
            existing_trade,
            candlestick_patterns,
            support_resistance,
            price_action,
            volume_analysis,
        }
    }

    /// Analyzers that quick mode may skip
    fn run_optional<A: ChartAnalyzer>(&self, analyzer: &A, raster: &Raster) -> Record<A::Output> {
        match self.config.engine.mode {
            AnalysisMode::Comprehensive => run_isolated(analyzer, raster),
            AnalysisMode::Quick => Record::skipped(analyzer.degraded()),
        }
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating ChartEngine instances
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    config: ChartConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a full configuration document
    pub fn from_config(config: ChartConfig) -> Self {
        Self { config }
    }

    pub fn mode(mut self, mode: AnalysisMode) -> Self {
        self.config.engine.mode = mode;
        self
    }

    /// Enable/disable analyzer fan-out on the rayon pool
    pub fn parallel(mut self, enable: bool) -> Self {
        self.config.engine.parallel = enable;
        self
    }

    /// Symbol stamped on every emitted signal
    pub fn symbol(mut self, symbol: impl Into<String>) -> Self {
        self.config.fusion.symbol = symbol.into();
        self
    }

    pub fn decoder(mut self, decoder: ImageDecoder) -> Self {
        self.config.decoder = decoder;
        self
    }

    pub fn trend(mut self, analyzer: TrendColorAnalyzer) -> Self {
        self.config.trend = analyzer;
        self
    }

    pub fn existing_trade(mut self, detector: ExistingTradeDetector) -> Self {
        self.config.existing_trade = detector;
        self
    }

    pub fn candlestick(mut self, detector: CandlestickDetector) -> Self {
        self.config.candlestick = detector;
        self
    }

    pub fn support_resistance(mut self, finder: SupportResistanceFinder) -> Self {
        self.config.support_resistance = finder;
        self
    }

    pub fn price_action(mut self, analyzer: PriceActionAnalyzer) -> Self {
        self.config.price_action = analyzer;
        self
    }

    pub fn volume(mut self, analyzer: VolumeAnalyzer) -> Self {
        self.config.volume = analyzer;
        self
    }

    pub fn fusion(mut self, fusion: SignalFusion) -> Self {
        self.config.fusion = fusion;
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<ChartEngine> {
        self.config.validate()?;
        Ok(ChartEngine {
            config: self.config,
        })
    }
}

// ============================================================
// PARALLEL ANALYSIS
// ============================================================

use rayon::prelude::*;

/// Result of analyzing one image in a batch
#[derive(Debug)]
pub struct BatchResult {
    pub id: String,
    pub analysis: ChartAnalysis,
}

/// Error from analyzing one image in a batch
#[derive(Debug)]
pub struct BatchError {
    pub id: String,
    pub error: ChartError,
}

/// Parallel analysis of multiple encoded images
pub fn analyze_parallel<'a, I>(engine: &ChartEngine, images: I) -> (Vec<BatchResult>, Vec<BatchError>)
where
    I: IntoParallelIterator<Item = (&'a str, &'a [u8])>,
{
    let results: Vec<_> = images
        .into_par_iter()
        .map(|(id, bytes)| {
            engine
                .try_analyze(bytes)
                .map(|analysis| BatchResult {
                    id: id.to_string(),
                    analysis,
                })
                .map_err(|error| BatchError {
                    id: id.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
