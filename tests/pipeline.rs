//! End-to-end tests for the chart signal pipeline.
//!
//! Synthetic charts are drawn in memory, encoded to PNG and fed through the
//! public engine API.

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chartsig::prelude::*;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn encode_png(img: RgbImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn black_chart() -> RgbImage {
    RgbImage::from_pixel(400, 300, Rgb([0, 0, 0]))
}

fn fill(img: &mut RgbImage, xs: std::ops::Range<u32>, ys: std::ops::Range<u32>, color: Rgb<u8>) {
    for y in ys {
        for x in xs.clone() {
            img.put_pixel(x, y, color);
        }
    }
}

/// Green candles with staggered tops so no two bodies share a horizontal edge
fn green_candles() -> RgbImage {
    let mut img = black_chart();
    for i in 0..20u32 {
        let top = 40 + (i * 37) % 120;
        fill(&mut img, i * 20..i * 20 + 6, top..top + 80, Rgb([0, 200, 0]));
    }
    img
}

fn engine() -> ChartEngine {
    EngineBuilder::new().build().unwrap()
}

#[test]
fn test_black_chart_defaults_to_bearish_bias() {
    init_tracing();
    let bytes = encode_png(black_chart());
    assert!(bytes.len() >= 100);

    let report = engine().analyze(&bytes);
    assert!(report.success);
    assert!(report.error.is_none());

    let analysis = report.analysis.as_ref().unwrap();
    assert_eq!(analysis.trend_analysis.value.trend, ColorTrend::Neutral);
    assert!(!analysis.candlestick_patterns.value.pattern_detected);
    assert!(!analysis.volume_analysis.value.volume_present);
    assert!(!analysis.existing_trade.value.has_existing_trade);

    let signal = &report.trading_signal;
    assert!(signal.is_signal);
    assert_eq!(signal.side, Side::Sell);
    assert_eq!(signal.confidence, 0.75);
    assert_eq!(signal.symbol, "ETH");
    assert_eq!(signal.reasoning, "Chart analysis: Default bearish bias for ETH");
    assert_eq!(report.method, SignalMethod::ComputerVision);
    assert_eq!(report.confidence, signal.confidence);
}

#[test]
fn test_blue_line_copies_existing_trade() {
    init_tracing();
    let mut img = black_chart();
    fill(&mut img, 50..350, 150..153, Rgb([0, 0, 255]));

    let report = engine().analyze(&encode_png(img));
    let trade = &report.analysis.as_ref().unwrap().existing_trade.value;
    assert!(trade.has_existing_trade);
    assert!(trade.triggers.blue_lines);
    assert_eq!(trade.markers.blue_lines, 900);

    let signal = &report.trading_signal;
    assert_eq!(signal.side, Side::Copy);
    assert_eq!(signal.confidence, 0.95);
    assert_eq!(signal.method, SignalMethod::CopyExistingTrade);
    assert!(signal
        .reasoning
        .starts_with("Copying existing trade setup from chart - SL:"));
    assert!(signal.entry_price.is_none());
}

#[test]
fn test_follow_mode_from_config() {
    let detector = ExistingTradeDetector {
        mode: TradeMode::Follow,
        ..Default::default()
    };
    let engine = EngineBuilder::new().existing_trade(detector).build().unwrap();
    let mut img = black_chart();
    fill(&mut img, 50..350, 150..153, Rgb([0, 0, 255]));

    let signal = engine.analyze(&encode_png(img)).trading_signal;
    assert_eq!(signal.side, Side::Follow);
    assert_eq!(signal.confidence, 0.9);
    assert_eq!((signal.stop_loss_percent, signal.take_profit_percent), (0.5, 1.5));
    assert_eq!(signal.method, SignalMethod::ExistingTradeFollow);
}

#[test]
fn test_green_candles_produce_buy_with_ordered_reasoning() {
    init_tracing();
    let report = engine().analyze(&encode_png(green_candles()));
    let analysis = report.analysis.as_ref().unwrap();
    assert_eq!(analysis.trend_analysis.value.trend, ColorTrend::Bullish);
    assert!(!analysis.existing_trade.value.has_existing_trade);

    let signal = &report.trading_signal;
    assert_eq!(signal.side, Side::Buy);
    assert!(signal.confidence >= 0.75);
    assert_eq!((signal.stop_loss_percent, signal.take_profit_percent), (-0.5, 2.0));
    assert!(signal
        .reasoning
        .starts_with("Chart analysis: Bullish trend detected (95.0% confidence)"));

    let order = [
        "Bullish trend detected",
        "Candlestick patterns identified",
        "price action",
        "Support/resistance levels identified",
    ];
    let positions: Vec<usize> = order
        .iter()
        .filter_map(|fragment| signal.reasoning.find(fragment))
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
    assert!(!signal.reasoning.contains("Default bearish bias"));
}

#[test]
fn test_quick_mode_skips_candlestick_and_volume() {
    let engine = EngineBuilder::new().mode(AnalysisMode::Quick).build().unwrap();
    let report = engine.analyze(&encode_png(green_candles()));
    let analysis = report.analysis.unwrap();
    assert!(analysis.candlestick_patterns.is_skipped());
    assert!(analysis.volume_analysis.is_skipped());
    assert!(analysis.trend_analysis.is_complete());
    assert!(!analysis.candlestick_patterns.value.pattern_detected);

    // a skipped candlestick record adds no fragment
    assert!(!report.trading_signal.reasoning.contains("Candlestick"));
    let skipped: Vec<&str> = report
        .trace
        .messages(Stage::Analyzer(AnalyzerId::Volume))
        .collect();
    assert_eq!(skipped, vec!["skipped in quick mode"]);
}

#[test]
fn test_undecodable_input_reports_error_fallback() {
    init_tracing();
    let report = engine().analyze(b"definitely not an image");
    assert!(!report.success);
    assert!(report.error.is_some());
    assert!(report.analysis.is_none());

    let signal = &report.trading_signal;
    assert_eq!(signal.side, Side::Sell);
    assert_eq!(signal.confidence, 0.75);
    assert_eq!((signal.stop_loss_percent, signal.take_profit_percent), (0.5, 2.0));
    assert_eq!(signal.method, SignalMethod::ErrorFallback);
    assert!(signal.reasoning.starts_with("Error fallback: "));
    assert_eq!(report.trace.messages(Stage::Decode).count(), 1);
}

#[test]
fn test_base64_and_data_uri_inputs() {
    let bytes = encode_png(green_candles());
    let encoded = STANDARD.encode(&bytes);
    let uri = format!("data:image/png;base64,{encoded}");
    let engine = engine();

    let raw = engine.try_analyze(&bytes).unwrap();
    let from_b64 = engine.try_analyze(encoded.as_bytes()).unwrap();
    let from_uri = engine.try_analyze(uri.as_bytes()).unwrap();
    assert_eq!(raw.signal, from_b64.signal);
    assert_eq!(raw.signal, from_uri.signal);
}

#[test]
fn test_report_json_shape() {
    let report = engine().analyze(&encode_png(black_chart()));
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["success"], true);
    assert!(json.get("error").is_none());
    assert_eq!(json["trading_signal"]["isSignal"], true);
    assert_eq!(json["trading_signal"]["side"], "sell");
    assert_eq!(json["trading_signal"]["stopLossPercent"], 0.5);
    assert!(json["trading_signal"]["entryPrice"].is_null());
    assert_eq!(json["method"], "computer_vision");

    let trend = &json["analysis"]["trend_analysis"];
    assert_eq!(trend["status"]["state"], "complete");
    assert_eq!(trend["trend"], "neutral");
    assert_eq!(json["analysis"]["volume_analysis"]["volume_pattern"], "no_volume_visible");
    assert_eq!(json["analysis"]["candlestick_patterns"]["pattern_type"], "no_clear_pattern");
    assert!(json["trace"].as_array().unwrap().len() >= 8);
}

#[test]
fn test_config_document_round_trip() {
    let config: ChartConfig = serde_json::from_str(
        r#"{
            "engine": { "mode": "quick", "parallel": false },
            "fusion": { "symbol": "BTC" },
            "volume": { "min_density": 0.01 }
        }"#,
    )
    .unwrap();
    assert_eq!(config.engine.mode, AnalysisMode::Quick);
    assert_eq!(config.volume.min_density.get(), 0.01);
    assert_eq!(config.volume.bar_height.get(), 5);

    let engine = EngineBuilder::from_config(config).build().unwrap();
    let signal = engine.analyze(&encode_png(black_chart())).trading_signal;
    assert_eq!(signal.symbol, "BTC");
    assert_eq!(signal.reasoning, "Chart analysis: Default bearish bias for BTC");

    let invalid = serde_json::from_str::<ChartConfig>(r#"{ "volume": { "min_density": 2.0 } }"#);
    assert!(invalid.is_err());
}

#[test]
fn test_batch_analysis() {
    let good = encode_png(black_chart());
    let candles = encode_png(green_candles());
    let bad = b"data:image/png;base64".to_vec();
    let images: Vec<(&str, &[u8])> = vec![
        ("black", good.as_slice()),
        ("broken", bad.as_slice()),
        ("candles", candles.as_slice()),
    ];

    let (results, errors) = analyze_parallel(&engine(), images);
    assert_eq!(results.len(), 2);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].id, "broken");
    assert!(matches!(
        errors[0].error,
        ChartError::Decode(DecodeError::InvalidDataUri)
    ));

    let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["black", "candles"]);
    assert_eq!(results[1].analysis.signal.side, Side::Buy);
}
