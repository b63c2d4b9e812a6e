//! Sell-side signal scoring with fixed and trailing stop-loss checks.
//!
//! A triggered stop (fixed or trailing) forces the sell score to 100 and
//! skips composite scoring. Otherwise four signals feed a weighted score:
//! shoulder proximity (30), RSI overbought (25), volume decrease (20) and a
//! recent dead cross (25), adjusted for the market trend.

use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

use crate::domain::indicator::stddev::sample_std;
use crate::domain::momentum::{neutral_filled_rsi, volume_against_mean, NEUTRAL_RSI};
use crate::domain::numeric::{clamp_score, safe_divide, safe_percentage};
use crate::domain::ohlcv::{tail, OhlcvBar};
use crate::domain::price_levels::{PriceLevelDetector, ThresholdMode, ZoneStatus};
use crate::domain::settings::EngineSettings;
use crate::domain::signal::{
    detect_cross, CrossDirection, CrossInfo, MaOverlay, MarketTrend, SignalTag,
};

pub const SHOULDER_WEIGHT: f64 = 30.0;
pub const RSI_OVERBOUGHT_WEIGHT: f64 = 25.0;
pub const VOLUME_DECREASE_WEIGHT: f64 = 20.0;
pub const DEAD_CROSS_WEIGHT: f64 = 25.0;

/// Raw scores at or above this are not damped in a bull market.
pub const STRONG_SCORE: f64 = 80.0;

/// Daily return std-dev that maps to a volatility of 1.0.
const VOLATILITY_SCALE: f64 = 0.05;
const HIGH_VOLATILITY: f64 = 0.5;
/// Tolerance on the fixed stop comparison; absorbs float rounding when the
/// loss lands exactly on `-stop_loss_pct`.
const STOP_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SellStrategy {
    FullSell,
    PartialHalf,
    PartialThird,
    Hold,
    InsufficientInfo,
}

impl fmt::Display for SellStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SellStrategy::FullSell => "FULL_SELL",
            SellStrategy::PartialHalf => "PARTIAL_HALF",
            SellStrategy::PartialThird => "PARTIAL_THIRD",
            SellStrategy::Hold => "HOLD",
            SellStrategy::InsufficientInfo => "INSUFFICIENT_INFO",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopType {
    Trailing,
    Fixed,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrailingStopInfo {
    pub trailing_stop_price: f64,
    pub is_trailing: bool,
    pub stop_type: StopType,
    pub trailing_triggered: bool,
    pub highest_price: f64,
    pub loss_from_high: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SellAnalysis {
    pub shoulder_status: ZoneStatus,
    pub rsi: f64,
    pub is_rsi_overbought: bool,
    pub volume_decrease: bool,
    pub dead_cross: CrossInfo,
    pub profit_rate: Option<f64>,
    /// `profit_rate` when the position is under water, otherwise `None`.
    pub loss_rate: Option<f64>,
    pub volatility: f64,
    pub sell_strategy: SellStrategy,
    pub signals: Vec<SignalTag>,
    pub sell_score: f64,
    pub market_trend: MarketTrend,
    pub market_adjusted_score: f64,
    pub stop_loss_triggered: bool,
    pub stop_loss_message: Option<String>,
    pub stop_loss_price: Option<f64>,
    pub trailing_stop: TrailingStopInfo,
}

#[derive(Debug, Clone)]
pub struct SellSignalAnalyzer {
    detector: PriceLevelDetector,
    threshold_mode: ThresholdMode,
    shoulder_threshold: f64,
    stop_loss_pct: f64,
    trailing_pct: f64,
    profit_target_full: f64,
    profit_target_partial: f64,
    rsi_period: usize,
    rsi_overbought: f64,
    ma_short: usize,
    ma_long: usize,
    volume_window: usize,
    volume_decrease_threshold: f64,
    volatility_period: usize,
}

impl Default for SellSignalAnalyzer {
    fn default() -> Self {
        Self::new(&EngineSettings::default())
    }
}

impl SellSignalAnalyzer {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            detector: PriceLevelDetector::new(settings.lookback, settings.atr_period),
            threshold_mode: settings.threshold_mode,
            shoulder_threshold: settings.shoulder_threshold,
            stop_loss_pct: settings.stop_loss_pct,
            trailing_pct: settings.trailing_pct,
            profit_target_full: settings.profit_target_full,
            profit_target_partial: settings.profit_target_partial,
            rsi_period: settings.rsi_period,
            rsi_overbought: settings.rsi_overbought,
            ma_short: settings.ma_short,
            ma_long: settings.ma_long,
            volume_window: settings.volume_window,
            volume_decrease_threshold: settings.volume_decrease_threshold,
            volatility_period: settings.volatility_period,
        }
    }

    pub fn calculate_rsi(&self, bars: &[OhlcvBar]) -> Vec<f64> {
        neutral_filled_rsi(bars, self.rsi_period)
    }

    pub fn check_volume_decrease(&self, bars: &[OhlcvBar], threshold: f64) -> bool {
        volume_against_mean(bars, self.volume_window)
            .map(|(current, avg)| current <= avg * threshold)
            .unwrap_or(false)
    }

    pub fn check_dead_cross(&self, bars: &[OhlcvBar]) -> CrossInfo {
        detect_cross(bars, None, self.ma_short, self.ma_long, CrossDirection::Dead)
    }

    pub fn check_dead_cross_with(&self, bars: &[OhlcvBar], overlay: &MaOverlay) -> CrossInfo {
        detect_cross(
            bars,
            Some(overlay),
            self.ma_short,
            self.ma_long,
            CrossDirection::Dead,
        )
    }

    /// `(current - buy) / buy`, or `None` without a usable buy price.
    pub fn calculate_profit_rate(&self, current: f64, buy_price: Option<f64>) -> Option<f64> {
        let buy = buy_price.filter(|b| b.is_finite() && *b > 0.0)?;
        Some(safe_percentage(current, buy, 0.0))
    }

    pub fn recommend_sell_strategy(
        &self,
        profit_rate: Option<f64>,
        volatility: f64,
    ) -> SellStrategy {
        let Some(rate) = profit_rate else {
            return SellStrategy::InsufficientInfo;
        };
        if rate >= self.profit_target_full {
            SellStrategy::FullSell
        } else if rate >= self.profit_target_partial {
            if volatility > HIGH_VOLATILITY {
                SellStrategy::PartialHalf
            } else {
                SellStrategy::PartialThird
            }
        } else {
            SellStrategy::Hold
        }
    }

    /// Sample std-dev of daily returns over the last `period` rows, scaled so
    /// that 5% maps to 1.0 and capped there. 0 for short series.
    pub fn calculate_volatility(&self, bars: &[OhlcvBar], period: usize) -> f64 {
        if bars.is_empty() || bars.len() < period {
            return 0.0;
        }

        let recent = tail(bars, period);
        let returns: Vec<f64> = recent
            .windows(2)
            .filter_map(|w| {
                let change = safe_divide(w[1].close - w[0].close, w[0].close, f64::NAN);
                change.is_finite().then_some(change)
            })
            .collect();

        if returns.len() < 2 {
            return 0.0;
        }

        (sample_std(&returns) / VOLATILITY_SCALE).min(1.0)
    }

    pub fn calculate_trailing_stop(
        &self,
        buy_price: f64,
        current: f64,
        highest_price: Option<f64>,
        trailing_pct: f64,
    ) -> TrailingStopInfo {
        let highest = highest_price
            .filter(|h| h.is_finite())
            .unwrap_or(current);
        let loss_from_high = if highest > 0.0 {
            safe_percentage(current, highest, 0.0)
        } else {
            0.0
        };

        if !(buy_price.is_finite() && buy_price > 0.0) {
            return TrailingStopInfo {
                trailing_stop_price: 0.0,
                is_trailing: false,
                stop_type: StopType::None,
                trailing_triggered: false,
                highest_price: highest,
                loss_from_high,
            };
        }

        let fixed_stop = buy_price * (1.0 - self.stop_loss_pct);

        if highest > buy_price {
            let trailing_stop = highest * (1.0 - trailing_pct);
            TrailingStopInfo {
                trailing_stop_price: trailing_stop.max(fixed_stop),
                is_trailing: true,
                stop_type: StopType::Trailing,
                trailing_triggered: current <= trailing_stop,
                highest_price: highest,
                loss_from_high,
            }
        } else {
            TrailingStopInfo {
                trailing_stop_price: fixed_stop,
                is_trailing: false,
                stop_type: StopType::Fixed,
                trailing_triggered: false,
                highest_price: highest,
                loss_from_high,
            }
        }
    }

    pub fn analyze_sell_signals(
        &self,
        bars: &[OhlcvBar],
        buy_price: Option<f64>,
        trend: MarketTrend,
        highest_price: Option<f64>,
    ) -> Option<SellAnalysis> {
        self.analyze_sell_signals_with(bars, buy_price, trend, highest_price, None)
    }

    /// Same as [`Self::analyze_sell_signals`], reading moving averages from
    /// `overlay` when supplied.
    pub fn analyze_sell_signals_with(
        &self,
        bars: &[OhlcvBar],
        buy_price: Option<f64>,
        trend: MarketTrend,
        highest_price: Option<f64>,
        overlay: Option<&MaOverlay>,
    ) -> Option<SellAnalysis> {
        let current = bars.last()?.close;

        let profit_rate = self.calculate_profit_rate(current, buy_price);
        let volatility = self.calculate_volatility(bars, self.volatility_period);
        let sell_strategy = self.recommend_sell_strategy(profit_rate, volatility);

        let shoulder_status =
            self.detector
                .is_at_shoulder(bars, self.shoulder_threshold, self.threshold_mode);
        let rsi = self.calculate_rsi(bars).last().copied().unwrap_or(NEUTRAL_RSI);
        let is_rsi_overbought = rsi > self.rsi_overbought;
        let volume_decrease = self.check_volume_decrease(bars, self.volume_decrease_threshold);
        let dead_cross = detect_cross(
            bars,
            overlay,
            self.ma_short,
            self.ma_long,
            CrossDirection::Dead,
        );

        let valid_buy = buy_price.filter(|b| b.is_finite() && *b > 0.0);
        let stop_loss_price = valid_buy.map(|b| b * (1.0 - self.stop_loss_pct));
        let trailing_stop = self.calculate_trailing_stop(
            valid_buy.unwrap_or(0.0),
            current,
            highest_price,
            self.trailing_pct,
        );

        let fixed_triggered = profit_rate
            .map(|rate| rate <= -self.stop_loss_pct + STOP_EPSILON)
            .unwrap_or(false);
        let trailing_triggered = trailing_stop.trailing_triggered;

        let mut analysis = SellAnalysis {
            shoulder_status,
            rsi,
            is_rsi_overbought,
            volume_decrease,
            dead_cross,
            profit_rate,
            loss_rate: profit_rate.filter(|rate| *rate < 0.0),
            volatility,
            sell_strategy,
            signals: Vec::new(),
            sell_score: 0.0,
            market_trend: trend,
            market_adjusted_score: 0.0,
            stop_loss_triggered: fixed_triggered || trailing_triggered,
            stop_loss_message: None,
            stop_loss_price,
            trailing_stop,
        };

        if analysis.stop_loss_triggered {
            let rate = profit_rate.unwrap_or(0.0);
            let message = if fixed_triggered {
                analysis.signals.push(SignalTag::FixedStopLoss);
                format!(
                    "stop-loss triggered: {:+.1}% (limit -{:.1}%)",
                    rate * 100.0,
                    self.stop_loss_pct * 100.0
                )
            } else {
                format!(
                    "trailing stop triggered: {:.2} <= {:.2} ({:+.1}% from high {:.2})",
                    current,
                    trailing_stop.highest_price * (1.0 - self.trailing_pct),
                    trailing_stop.loss_from_high * 100.0,
                    trailing_stop.highest_price
                )
            };
            if trailing_triggered {
                analysis.signals.push(SignalTag::TrailingStop);
            }
            warn!(current, loss_rate = rate, "{message}");
            analysis.stop_loss_message = Some(message);
            analysis.sell_score = 100.0;
            analysis.market_adjusted_score = 100.0;
            return Some(analysis);
        }

        let mut score = 0.0;
        if analysis.shoulder_status.active {
            analysis.signals.push(SignalTag::ShoulderReached);
            score += SHOULDER_WEIGHT;
        }
        if is_rsi_overbought {
            analysis.signals.push(SignalTag::RsiOverbought);
            score += RSI_OVERBOUGHT_WEIGHT;
        }
        if volume_decrease {
            analysis.signals.push(SignalTag::VolumeDecrease);
            score += VOLUME_DECREASE_WEIGHT;
        }
        let dead_cross = &analysis.dead_cross;
        if let Some(days_ago) = dead_cross.days_ago.filter(|_| dead_cross.is_cross) {
            analysis.signals.push(SignalTag::DeadCross { days_ago });
            score += DEAD_CROSS_WEIGHT;
        }
        analysis.sell_score = clamp_score(score);

        let (adjusted, market_tag) = adjust_sell_score(analysis.sell_score, trend);
        analysis.market_adjusted_score = adjusted;
        analysis.signals.extend(market_tag);

        debug!(
            sell_score = analysis.sell_score,
            market_adjusted_score = adjusted,
            trend = %trend,
            "sell signals scored"
        );

        Some(analysis)
    }
}

/// Bull markets damp scores below [`STRONG_SCORE`] by 30%; bear markets add 20%.
pub fn adjust_sell_score(score: f64, trend: MarketTrend) -> (f64, Option<SignalTag>) {
    match trend {
        MarketTrend::Bull if score < STRONG_SCORE => {
            (clamp_score(score * 0.7), Some(SignalTag::SellInBullMarket))
        }
        MarketTrend::Bull => (clamp_score(score), None),
        MarketTrend::Bear => (clamp_score(score * 1.2), Some(SignalTag::SellInBearMarket)),
        MarketTrend::Sideways => (clamp_score(score), Some(SignalTag::SidewaysMarket)),
        MarketTrend::Unknown => (clamp_score(score), None),
    }
}
