//! Integration tests for the individual chart analyzers.

use std::collections::HashMap;

use chartsig::prelude::*;
use image::{Rgb, RgbImage};

fn canvas(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([0, 0, 0]))
}

fn hline(img: &mut RgbImage, y: u32, thickness: u32, color: Rgb<u8>) {
    for y in y..y + thickness {
        for x in 0..img.width() {
            img.put_pixel(x, y, color);
        }
    }
}

/// Four evenly spaced colorless price lines, two on each side of the midpoint
fn gray_levels() -> Raster {
    let mut img = canvas(400, 300);
    for y in [40, 110, 180, 250] {
        hline(&mut img, y, 4, Rgb([200, 200, 200]));
    }
    Raster::from_rgb(img)
}

// ============================================================
// TREND COLORS
// ============================================================

#[test]
fn test_green_majority_is_bullish() {
    let mut img = canvas(100, 100);
    for x in 0..100 {
        for y in 0..3 {
            img.put_pixel(x, y, Rgb([40, 180, 60]));
        }
    }
    img.put_pixel(0, 50, Rgb([230, 30, 30]));

    let out = TrendColorAnalyzer::default()
        .analyze(&Raster::from_rgb(img))
        .unwrap();
    assert_eq!(out.trend, ColorTrend::Bullish);
    assert!(out.confidence >= 0.6);
    assert!(out.green_ratio > out.red_ratio);
    assert_eq!(out.dominant_color, DominantColor::Green);
}

#[test]
fn test_red_majority_is_bearish() {
    let mut img = canvas(100, 100);
    for x in 0..100 {
        for y in 90..100 {
            img.put_pixel(x, y, Rgb([240, 20, 60]));
        }
    }
    let out = TrendColorAnalyzer::default()
        .analyze(&Raster::from_rgb(img))
        .unwrap();
    assert_eq!(out.trend, ColorTrend::Bearish);
    assert!((out.red_ratio - 0.1).abs() < 1e-12);
    assert_eq!(out.confidence, 0.95);
}

// ============================================================
// EXISTING TRADE
// ============================================================

#[test]
fn test_gray_levels_trigger_by_count() {
    let out = ExistingTradeDetector::default().analyze(&gray_levels()).unwrap();

    assert!(out.levels.len() >= 3);
    assert!(out.has_existing_trade);
    assert!(out.triggers.level_count);
    assert!(!out.triggers.blue_lines);
    assert!(!out.triggers.purple_zones);
    assert_eq!(out.markers.blue_lines, 0);

    let params = out.parameters.unwrap();
    assert!((0.3..=2.0).contains(&params.stop_loss_percent));
    assert!((0.5..=3.0).contains(&params.take_profit_percent));
    assert!(params.levels_above > 0);
    assert!(params.levels_below > 0);

    // top to bottom
    assert!(out
        .levels
        .windows(2)
        .all(|w| w[0].y_position <= w[1].y_position));
    assert!(out.levels.iter().all(|l| l.strength >= 0.25));
}

#[test]
fn test_two_levels_without_markers_do_not_trigger() {
    let mut img = canvas(400, 300);
    hline(&mut img, 100, 1, Rgb([200, 200, 200]));
    let out = ExistingTradeDetector::default()
        .analyze(&Raster::from_rgb(img))
        .unwrap();
    assert!(out.levels.len() < 3);
    assert!(!out.has_existing_trade);
    assert!(out.parameters.is_none());
}

#[test]
fn test_short_blue_segment_below_density() {
    let mut img = canvas(400, 300);
    for x in 0..50 {
        img.put_pixel(x, 20, Rgb([0, 0, 255]));
    }
    let out = ExistingTradeDetector::default()
        .analyze(&Raster::from_rgb(img))
        .unwrap();
    // 50 / 120000 < 0.002
    assert!(!out.triggers.blue_lines);
    assert!(!out.has_existing_trade);
}

// ============================================================
// SUPPORT / RESISTANCE
// ============================================================

#[test]
fn test_raw_gray_lines_are_ranked() {
    let mut img = canvas(400, 300);
    for y in [30, 100, 170, 240] {
        hline(&mut img, y, 1, Rgb([255, 255, 255]));
    }
    let out = SupportResistanceFinder::default()
        .analyze(&Raster::from_rgb(img))
        .unwrap();
    assert!(out.levels_detected >= 4);
    assert!(out.has_support_resistance);
    assert!(out.strong_levels.len() <= 5);
    assert!(out
        .strong_levels
        .windows(2)
        .all(|w| w[0].strength >= w[1].strength));
    for level in &out.strong_levels {
        assert!([30, 100, 170, 240].contains(&level.y_position));
    }
}

// ============================================================
// VOLUME / CANDLESTICK / PRICE ACTION
// ============================================================

#[test]
fn test_volume_bars_at_bottom() {
    let mut img = canvas(200, 100);
    for x in (0..200).step_by(8) {
        for y in 85..100 {
            img.put_pixel(x, y, Rgb([90, 90, 90]));
            img.put_pixel(x + 1, y, Rgb([90, 90, 90]));
        }
    }
    let out = VolumeAnalyzer::default().analyze(&Raster::from_rgb(img)).unwrap();
    assert!(out.volume_present);
    assert_eq!(out.volume_pattern, VolumePattern::BarsDetected);
}

#[test]
fn test_price_action_on_flat_chart_is_unclear() {
    let out = PriceActionAnalyzer::default()
        .analyze(&Raster::from_rgb(canvas(120, 90)))
        .unwrap();
    assert_eq!(out.trend_direction, MoveDirection::Unclear);
}

#[test]
fn test_price_action_counts_are_consistent() {
    let mut img = canvas(200, 150);
    // rising staircase of filled blocks
    for step in 0..8u32 {
        let top = 120 - step * 14;
        for y in top..top + 10 {
            for x in step * 24..step * 24 + 16 {
                img.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
    }
    let out = PriceActionAnalyzer::default()
        .analyze(&Raster::from_rgb(img))
        .unwrap();
    match out.trend_direction {
        MoveDirection::Unclear => {
            assert_eq!(out.upward_movements + out.downward_movements, 0);
            assert_eq!(out.trend_strength, 0.3);
        },
        MoveDirection::Sideways => assert_eq!(out.trend_strength, 0.5),
        MoveDirection::Upward | MoveDirection::Downward => {
            assert!(out.trend_strength > 0.6 && out.trend_strength <= 1.0);
        },
    }
}

#[test]
fn test_candlestick_with_params() {
    let mut params = HashMap::new();
    params.insert("min_density", 0.05);
    let strict = CandlestickDetector::with_params(&params).unwrap();
    assert_eq!(strict.min_density.get(), 0.05);
    assert_eq!(CandlestickDetector::analyzer_id(), AnalyzerId::Candlestick);

    params.insert("min_density", 0.5);
    assert!(CandlestickDetector::with_params(&params).is_err());
}

#[test]
fn test_every_param_grid_validates() {
    let metas = [
        TrendColorAnalyzer::param_meta(),
        ExistingTradeDetector::param_meta(),
        CandlestickDetector::param_meta(),
        SupportResistanceFinder::param_meta(),
        PriceActionAnalyzer::param_meta(),
        VolumeAnalyzer::param_meta(),
    ];
    for meta in metas.iter().flat_map(|m| m.iter()) {
        let grid = meta.generate_grid();
        assert!(!grid.is_empty(), "{} has an empty grid", meta.name);
        for value in grid {
            assert!(meta.validate(value).is_ok(), "{} = {value} rejected", meta.name);
        }
    }
}
