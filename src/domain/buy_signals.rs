//! Buy-side signal scoring.
//!
//! Four independent signals feed a weighted score: knee proximity (30), RSI
//! oversold (25), volume surge (20) and a recent golden cross (25). The
//! market trend then damps or boosts the score.

use serde::Serialize;
use tracing::{debug, info};

use crate::domain::momentum::{NEUTRAL_RSI, neutral_filled_rsi, volume_against_mean};
use crate::domain::numeric::clamp_score;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::price_levels::{PriceLevelDetector, ThresholdMode, ZoneStatus};
use crate::domain::settings::EngineSettings;
use crate::domain::signal::{
    CrossDirection, CrossInfo, MaOverlay, MarketTrend, SignalTag, detect_cross,
};

pub const KNEE_WEIGHT: f64 = 30.0;
pub const RSI_OVERSOLD_WEIGHT: f64 = 25.0;
pub const VOLUME_SURGE_WEIGHT: f64 = 20.0;
pub const GOLDEN_CROSS_WEIGHT: f64 = 25.0;

/// Raw scores at or above this are not damped in a bear market.
pub const STRONG_SCORE: f64 = 80.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuyAnalysis {
    pub knee_status: ZoneStatus,
    pub rsi: f64,
    pub is_rsi_oversold: bool,
    pub volume_surge: bool,
    pub golden_cross: CrossInfo,
    pub chase_buy_safe: bool,
    pub from_floor_pct: f64,
    pub stop_loss_price: f64,
    pub signals: Vec<SignalTag>,
    pub buy_score: f64,
    pub market_trend: MarketTrend,
    pub market_adjusted_score: f64,
}

#[derive(Debug, Clone)]
pub struct BuySignalAnalyzer {
    detector: PriceLevelDetector,
    threshold_mode: ThresholdMode,
    knee_threshold: f64,
    stop_loss_pct: f64,
    chase_risk_threshold: f64,
    rsi_period: usize,
    rsi_oversold: f64,
    ma_short: usize,
    ma_long: usize,
    volume_window: usize,
    volume_surge_multiplier: f64,
}

impl Default for BuySignalAnalyzer {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl BuySignalAnalyzer {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            detector: PriceLevelDetector::new(settings.lookback, settings.atr_period),
            threshold_mode: settings.threshold_mode,
            knee_threshold: settings.knee_threshold,
            stop_loss_pct: settings.stop_loss_pct,
            chase_risk_threshold: settings.chase_risk_threshold,
            rsi_period: settings.rsi_period,
            rsi_oversold: settings.rsi_oversold,
            ma_short: settings.ma_short,
            ma_long: settings.ma_long,
            volume_window: settings.volume_window,
            volume_surge_multiplier: settings.volume_surge_multiplier,
        }
    }

    pub fn calculate_rsi(&self, bars: &[OhlcvBar]) -> Vec<f64> {
        neutral_filled_rsi(bars, self.rsi_period)
    }

    pub fn check_volume_surge(&self, bars: &[OhlcvBar], multiplier: f64) -> bool {
        let Some((current, avg)) = volume_against_mean(bars, self.volume_window) else {
            return false;
        };
        let surge = current >= avg * multiplier;
        if surge {
            info!(
                current,
                avg,
                ratio = current / avg,
                "volume surge detected"
            );
        }
        surge
    }

    pub fn check_golden_cross(&self, bars: &[OhlcvBar]) -> CrossInfo {
        detect_cross(bars, None, self.ma_short, self.ma_long, CrossDirection::Golden)
    }

    pub fn check_golden_cross_with(&self, bars: &[OhlcvBar], overlay: &MaOverlay) -> CrossInfo {
        detect_cross(
            bars,
            Some(overlay),
            self.ma_short,
            self.ma_long,
            CrossDirection::Golden,
        )
    }

    pub fn calculate_stop_loss_price(&self, buy_price: f64) -> f64 {
        buy_price * (1.0 - self.stop_loss_pct)
    }

    pub fn analyze_buy_signals(
        &self,
        bars: &[OhlcvBar],
        trend: MarketTrend,
    ) -> Option<BuyAnalysis> {
        self.analyze_buy_signals_with(bars, trend, None)
    }

    /// Same as [`Self::analyze_buy_signals`], reading moving averages from
    /// `overlay` when supplied.
    pub fn analyze_buy_signals_with(
        &self,
        bars: &[OhlcvBar],
        trend: MarketTrend,
        overlay: Option<&MaOverlay>,
    ) -> Option<BuyAnalysis> {
        let last = bars.last()?;

        let knee_status = self
            .detector
            .is_at_knee(bars, self.knee_threshold, self.threshold_mode);

        let rsi = self.calculate_rsi(bars).last().copied().unwrap_or(NEUTRAL_RSI);
        let is_rsi_oversold = rsi < self.rsi_oversold;

        let volume_surge = self.check_volume_surge(bars, self.volume_surge_multiplier);

        let golden_cross = detect_cross(
            bars,
            overlay,
            self.ma_short,
            self.ma_long,
            CrossDirection::Golden,
        );

        let from_floor_pct = self
            .detector
            .calculate_position_metrics(bars, None)
            .map(|m| m.from_floor_pct)
            .unwrap_or(0.0);
        let chase_buy_safe = from_floor_pct < self.chase_risk_threshold;

        let stop_loss_price = self.calculate_stop_loss_price(last.close);

        let mut signals = Vec::new();
        let mut score = 0.0;
        if knee_status.active {
            signals.push(SignalTag::KneeReached);
            score += KNEE_WEIGHT;
        }
        if is_rsi_oversold {
            signals.push(SignalTag::RsiOversold);
            score += RSI_OVERSOLD_WEIGHT;
        }
        if volume_surge {
            signals.push(SignalTag::VolumeSurge);
            score += VOLUME_SURGE_WEIGHT;
        }
        if let Some(days_ago) = golden_cross.days_ago.filter(|_| golden_cross.is_cross) {
            signals.push(SignalTag::GoldenCross { days_ago });
            score += GOLDEN_CROSS_WEIGHT;
        }
        let buy_score = clamp_score(score);

        let (market_adjusted_score, market_tag) = adjust_buy_score(buy_score, trend);
        signals.extend(market_tag);

        debug!(
            buy_score,
            market_adjusted_score,
            trend = %trend,
            "buy signals scored"
        );

        Some(BuyAnalysis {
            knee_status,
            rsi,
            is_rsi_oversold,
            volume_surge,
            golden_cross,
            chase_buy_safe,
            from_floor_pct,
            stop_loss_price,
            signals,
            buy_score,
            market_trend: trend,
            market_adjusted_score,
        })
    }
}

/// Bear markets halve scores below [`STRONG_SCORE`]; bull markets add 10%.
pub fn adjust_buy_score(score: f64, trend: MarketTrend) -> (f64, Option<SignalTag>) {
    match trend {
        MarketTrend::Bear if score < STRONG_SCORE => {
            (clamp_score(score * 0.5), Some(SignalTag::BuyInBearMarket))
        }
        MarketTrend::Bear => (clamp_score(score), None),
        MarketTrend::Bull => (clamp_score(score * 1.1), Some(SignalTag::BuyInBullMarket)),
        MarketTrend::Sideways => (clamp_score(score), Some(SignalTag::SidewaysMarket)),
        MarketTrend::Unknown => (clamp_score(score), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn make_bars(closes: &[f64], volumes: &[f64]) -> Vec<OhlcvBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&c, &v))| OhlcvBar {
                date: start + chrono::Duration::days(i as i64),
                open: c,
                high: c * 1.01,
                low: c * 0.99,
                close: c,
                volume: v,
            })
            .collect()
    }

    #[test]
    fn stop_loss_price_is_fixed_fraction() {
        let analyzer = BuySignalAnalyzer::default();
        assert_relative_eq!(analyzer.calculate_stop_loss_price(100_000.0), 93_000.0);
        assert_relative_eq!(analyzer.calculate_stop_loss_price(0.0), 0.0);
    }

    #[test]
    fn rsi_short_series_neutral() {
        let analyzer = BuySignalAnalyzer::default();
        let bars = make_bars(&[10.0; 13], &[1.0; 13]);
        assert_eq!(analyzer.calculate_rsi(&bars), vec![50.0; 13]);
    }

    #[test]
    fn volume_surge_detected() {
        let analyzer = BuySignalAnalyzer::default();
        // 19 rows of 850k plus one of 2M: mean 907.5k, 2M >= 1.815M
        let mut volumes = vec![850_000.0; 19];
        volumes.push(2_000_000.0);
        let bars = make_bars(&[100.0; 20], &volumes);
        assert!(analyzer.check_volume_surge(&bars, 2.0));
        assert!(!analyzer.check_volume_surge(&bars, 3.0));
    }

    #[test]
    fn volume_surge_needs_twenty_rows() {
        let analyzer = BuySignalAnalyzer::default();
        let mut volumes = vec![1.0; 18];
        volumes.push(100.0);
        let bars = make_bars(&[100.0; 19], &volumes);
        assert!(!analyzer.check_volume_surge(&bars, 2.0));
    }

    #[test]
    fn golden_cross_requires_sixty_rows() {
        let analyzer = BuySignalAnalyzer::default();
        let bars = make_bars(&[100.0; 59], &[1.0; 59]);
        let info = analyzer.check_golden_cross(&bars);
        assert!(!info.is_cross);
        assert!(info.ma_short.is_none());
    }

    #[test]
    fn golden_cross_from_overlay() {
        let analyzer = BuySignalAnalyzer::default();
        let bars = make_bars(&[100.0; 60], &[1.0; 60]);
        let mut short = vec![Some(9.0); 60];
        short[58] = Some(11.0);
        short[59] = Some(11.5);
        let overlay = MaOverlay::new(short, vec![Some(10.0); 60]);

        let info = analyzer.check_golden_cross_with(&bars, &overlay);
        assert!(info.is_cross);
        assert_eq!(info.days_ago, Some(2));
    }

    #[test]
    fn empty_input_is_none() {
        let analyzer = BuySignalAnalyzer::default();
        assert!(analyzer.analyze_buy_signals(&[], MarketTrend::Bull).is_none());
    }

    #[test]
    fn oversold_and_surge_score() {
        let analyzer = BuySignalAnalyzer::default();
        // steady decline drives RSI to 0; last volume spikes
        let closes: Vec<f64> = (0..30).map(|i| 200.0 - i as f64).collect();
        let mut volumes = vec![1000.0; 29];
        volumes.push(5000.0);
        let bars = make_bars(&closes, &volumes);

        let analysis = analyzer.analyze_buy_signals(&bars, MarketTrend::Unknown).unwrap();
        assert!(analysis.is_rsi_oversold);
        assert!(analysis.volume_surge);
        assert!(analysis.signals.contains(&SignalTag::RsiOversold));
        assert!(analysis.signals.contains(&SignalTag::VolumeSurge));
        assert!(analysis.buy_score >= 45.0);
        assert_eq!(analysis.market_adjusted_score, analysis.buy_score);
        assert!(analysis.chase_buy_safe);
    }

    #[test]
    fn bear_market_halves_weak_scores() {
        assert_eq!(
            adjust_buy_score(50.0, MarketTrend::Bear),
            (25.0, Some(SignalTag::BuyInBearMarket))
        );
        assert_eq!(adjust_buy_score(80.0, MarketTrend::Bear), (80.0, None));
    }

    #[test]
    fn bull_market_boost_is_capped() {
        let (score, tag) = adjust_buy_score(50.0, MarketTrend::Bull);
        assert_relative_eq!(score, 55.0);
        assert_eq!(tag, Some(SignalTag::BuyInBullMarket));
        assert_eq!(adjust_buy_score(100.0, MarketTrend::Bull).0, 100.0);
    }

    #[test]
    fn sideways_and_unknown_unchanged() {
        assert_eq!(
            adjust_buy_score(45.0, MarketTrend::Sideways),
            (45.0, Some(SignalTag::SidewaysMarket))
        );
        assert_eq!(adjust_buy_score(45.0, MarketTrend::Unknown), (45.0, None));
    }

    #[test]
    fn chase_warning_when_far_above_floor() {
        let analyzer = BuySignalAnalyzer::default();
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + 2.0 * i as f64).collect();
        let bars = make_bars(&closes, &[1000.0; 30]);
        let analysis = analyzer.analyze_buy_signals(&bars, MarketTrend::Unknown).unwrap();
        assert!(analysis.from_floor_pct > 0.25);
        assert!(!analysis.chase_buy_safe);
        assert!(!analysis.is_rsi_oversold);
    }
}
