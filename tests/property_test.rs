//! Property tests for the signal engine.
//!
//! These laws must hold for any positive price series, independent of the
//! particular signals that fire.

mod common;

use common::*;
use proptest::prelude::*;
use stocksignal::domain::analyzer::StockAnalyzer;
use stocksignal::domain::buy_signals::{adjust_buy_score, BuySignalAnalyzer};
use stocksignal::domain::price_levels::PriceLevelDetector;
use stocksignal::domain::sell_signals::{adjust_sell_score, SellSignalAnalyzer};
use stocksignal::domain::settings::EngineSettings;
use stocksignal::domain::signal::MarketTrend;

fn closes_strategy() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0f64..1000.0, 10..120)
}

fn trend_strategy() -> impl Strategy<Value = MarketTrend> {
    prop_oneof![
        Just(MarketTrend::Bull),
        Just(MarketTrend::Bear),
        Just(MarketTrend::Sideways),
        Just(MarketTrend::Unknown),
    ]
}

proptest! {
    #[test]
    fn levels_bracket_current(closes in closes_strategy()) {
        let bars = bars_from_closes(&closes);
        let detector = PriceLevelDetector::default();
        let levels = detector.detect_floor_ceiling(&bars).unwrap();

        prop_assert!(levels.floor <= levels.current);
        prop_assert!(levels.current <= levels.ceiling);
        prop_assert!(levels.floor_date <= bars.last().unwrap().date);

        let metrics = detector.calculate_position_metrics(&bars, None).unwrap();
        prop_assert!((0.0..=1.0).contains(&metrics.position_in_range));
        prop_assert!(metrics.from_floor_pct >= 0.0);
        prop_assert!(metrics.from_ceiling_pct <= 0.0);
    }

    #[test]
    fn atr_aligned_and_non_negative(closes in closes_strategy(), period in 2usize..30) {
        let bars = bars_from_closes(&closes);
        let atr = PriceLevelDetector::default().calculate_atr(&bars, period);

        prop_assert_eq!(atr.len(), bars.len());
        prop_assert!(atr.iter().all(|v| v.is_finite() && *v >= 0.0));
    }

    #[test]
    fn rsi_bounded_and_aligned(closes in closes_strategy()) {
        let bars = bars_from_closes(&closes);
        let rsi = BuySignalAnalyzer::default().calculate_rsi(&bars);

        prop_assert_eq!(rsi.len(), bars.len());
        prop_assert!(rsi.iter().all(|v| (0.0..=100.0).contains(v)));
    }

    #[test]
    fn scores_stay_in_range(closes in closes_strategy(), trend in trend_strategy()) {
        let bars = bars_from_closes(&closes);
        let engine = StockAnalyzer::new(&EngineSettings::default(), Box::new(StaticTrend(trend)));
        let result = engine.analyze_stock("PROP", &bars, None, trend).unwrap();

        for score in [
            result.buy_analysis.buy_score,
            result.buy_analysis.market_adjusted_score,
            result.sell_analysis.sell_score,
            result.sell_analysis.market_adjusted_score,
        ] {
            prop_assert!((0.0..=100.0).contains(&score));
        }
    }

    #[test]
    fn bear_market_halves_weak_buy_scores(score in 0.0f64..80.0) {
        let (adjusted, _) = adjust_buy_score(score, MarketTrend::Bear);
        prop_assert!((adjusted - score * 0.5).abs() < 1e-9);
    }

    #[test]
    fn bull_market_boost_is_capped(score in 0.0f64..=100.0) {
        let (adjusted, _) = adjust_buy_score(score, MarketTrend::Bull);
        prop_assert!((adjusted - (score * 1.1).min(100.0)).abs() < 1e-9);

        let (sell_adjusted, _) = adjust_sell_score(score, MarketTrend::Bear);
        prop_assert!((sell_adjusted - (score * 1.2).min(100.0)).abs() < 1e-9);
    }

    #[test]
    fn bull_market_damps_weak_sell_scores(score in 0.0f64..80.0) {
        let (adjusted, tag) = adjust_sell_score(score, MarketTrend::Bull);
        prop_assert!((adjusted - score * 0.7).abs() < 1e-9);
        prop_assert!(tag.is_some());
    }

    #[test]
    fn strong_sell_scores_survive_bull_market(score in 80.0f64..=100.0) {
        prop_assert_eq!(adjust_sell_score(score, MarketTrend::Bull).0, score);
    }

    #[test]
    fn neutral_trends_leave_scores(score in 0.0f64..=100.0) {
        prop_assert_eq!(adjust_buy_score(score, MarketTrend::Unknown).0, score);
        prop_assert_eq!(adjust_sell_score(score, MarketTrend::Sideways).0, score);
    }

    #[test]
    fn stop_loss_forces_full_score(
        buy_price in 10.0f64..100_000.0,
        drop in 0.0701f64..0.9,
        trend in trend_strategy(),
    ) {
        let mut closes = vec![buy_price; 30];
        closes.push(buy_price * (1.0 - drop));
        let bars = bars_from_closes(&closes);

        let analysis = SellSignalAnalyzer::default()
            .analyze_sell_signals(&bars, Some(buy_price), trend, None)
            .unwrap();

        prop_assert!(analysis.stop_loss_triggered);
        prop_assert_eq!(analysis.sell_score, 100.0);
        prop_assert_eq!(analysis.market_adjusted_score, 100.0);
    }

    #[test]
    fn trailing_stop_rises_with_high(
        buy_price in 10.0f64..1000.0,
        gain_low in 0.0f64..1.0,
        extra in 0.0f64..1.0,
    ) {
        let sell = SellSignalAnalyzer::default();
        let low_high = buy_price * (1.0 + gain_low);
        let high_high = low_high * (1.0 + extra);

        let a = sell.calculate_trailing_stop(buy_price, buy_price, Some(low_high), 0.10);
        let b = sell.calculate_trailing_stop(buy_price, buy_price, Some(high_high), 0.10);

        prop_assert!(b.trailing_stop_price >= a.trailing_stop_price);
        prop_assert!(a.trailing_stop_price >= buy_price * (1.0 - 0.07) - 1e-9);
    }
}
