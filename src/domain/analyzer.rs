//! Per-symbol orchestration: runs the detector and both analyzers, resolves a
//! BUY/SELL/HOLD action, and supports batch analysis and priority ranking.

use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

use crate::domain::buy_signals::{BuyAnalysis, BuySignalAnalyzer};
use crate::domain::error::SignalError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::price_levels::{
    PositionMetrics, PriceLevelDetector, PriceLevels, ThresholdMode, VolatilityInfo, ZoneStatus,
};
use crate::domain::recommendation::{
    get_buy_recommendation, get_sell_recommendation, NO_CLEAR_SIGNAL,
};
use crate::domain::sell_signals::{SellAnalysis, SellSignalAnalyzer};
use crate::domain::settings::EngineSettings;
use crate::domain::signal::{MaOverlay, MarketTrend};
use crate::ports::market_trend_port::MarketTrendProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeAction::Buy => write!(f, "BUY"),
            TradeAction::Sell => write!(f, "SELL"),
            TradeAction::Hold => write!(f, "HOLD"),
        }
    }
}

impl std::str::FromStr for TradeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(TradeAction::Buy),
            "SELL" => Ok(TradeAction::Sell),
            "HOLD" => Ok(TradeAction::Hold),
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

/// An open position used for profit, stop-loss and trailing-stop checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub buy_price: f64,
    pub highest_price: Option<f64>,
}

/// Score thresholds for the final action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionThresholds {
    pub buy: f64,
    pub sell: f64,
    pub margin: f64,
}

impl Default for DecisionThresholds {
    fn default() -> Self {
        Self {
            buy: 30.0,
            sell: 30.0,
            margin: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeDecision {
    pub action: TradeAction,
    pub overall_recommendation: String,
}

/// BUY needs `buy >= thresholds.buy` and a lead of more than `margin` over
/// sell; SELL mirrors it. BUY is checked first.
pub fn decide(buy: f64, sell: f64, thresholds: &DecisionThresholds) -> TradeAction {
    if buy >= thresholds.buy && buy > sell + thresholds.margin {
        TradeAction::Buy
    } else if sell >= thresholds.sell && sell > buy + thresholds.margin {
        TradeAction::Sell
    } else {
        TradeAction::Hold
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockAnalysis {
    pub symbol: String,
    pub current_price: f64,
    pub market_trend: MarketTrend,
    pub price_levels: Option<PriceLevels>,
    pub position_metrics: Option<PositionMetrics>,
    pub volatility: VolatilityInfo,
    pub knee: ZoneStatus,
    pub shoulder: ZoneStatus,
    pub buy_analysis: BuyAnalysis,
    pub buy_recommendation: String,
    pub sell_analysis: SellAnalysis,
    pub sell_recommendation: String,
    #[serde(flatten)]
    pub decision: TradeDecision,
}

impl StockAnalysis {
    pub fn action(&self) -> TradeAction {
        self.decision.action
    }

    pub fn buy_score(&self) -> f64 {
        self.buy_analysis.market_adjusted_score
    }

    pub fn sell_score(&self) -> f64 {
        self.sell_analysis.market_adjusted_score
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisFailure {
    pub symbol: String,
    pub error: String,
}

/// One entry of a batch result. Failures never abort the batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisOutcome {
    Analysed(Box<StockAnalysis>),
    Failed(AnalysisFailure),
}

impl AnalysisOutcome {
    pub fn symbol(&self) -> &str {
        match self {
            AnalysisOutcome::Analysed(a) => &a.symbol,
            AnalysisOutcome::Failed(f) => &f.symbol,
        }
    }

    pub fn analysis(&self) -> Option<&StockAnalysis> {
        match self {
            AnalysisOutcome::Analysed(a) => Some(a),
            AnalysisOutcome::Failed(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub symbol: String,
    pub bars: Vec<OhlcvBar>,
    pub position: Option<Position>,
    pub overlay: Option<MaOverlay>,
}

impl AnalysisRequest {
    pub fn new(symbol: impl Into<String>, bars: Vec<OhlcvBar>) -> Self {
        Self {
            symbol: symbol.into(),
            bars,
            position: None,
            overlay: None,
        }
    }

    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_overlay(mut self, overlay: MaOverlay) -> Self {
        self.overlay = Some(overlay);
        self
    }
}

/// Rejects series the analyzers cannot score: empty input, non-finite or
/// non-positive closes, negative volume and out-of-order dates.
pub fn validate_series(symbol: &str, bars: &[OhlcvBar]) -> Result<(), SignalError> {
    if bars.is_empty() {
        return Err(SignalError::NoData {
            code: symbol.to_string(),
        });
    }

    let invalid = |reason: String| SignalError::InvalidSeries {
        symbol: symbol.to_string(),
        reason,
    };

    for (i, bar) in bars.iter().enumerate() {
        if !(bar.close.is_finite() && bar.close > 0.0) {
            return Err(invalid(format!("close {} on {} is not positive", bar.close, bar.date)));
        }
        if !(bar.volume.is_finite() && bar.volume >= 0.0) {
            return Err(invalid(format!("volume {} on {} is invalid", bar.volume, bar.date)));
        }
        if i > 0 && bar.date < bars[i - 1].date {
            return Err(invalid(format!("dates not ascending at {}", bar.date)));
        }
    }
    Ok(())
}

pub struct StockAnalyzer {
    detector: PriceLevelDetector,
    buy: BuySignalAnalyzer,
    sell: SellSignalAnalyzer,
    thresholds: DecisionThresholds,
    threshold_mode: ThresholdMode,
    knee_threshold: f64,
    shoulder_threshold: f64,
    trend_provider: Box<dyn MarketTrendProvider>,
}

impl StockAnalyzer {
    pub fn new(settings: &EngineSettings, trend_provider: Box<dyn MarketTrendProvider>) -> Self {
        Self {
            detector: PriceLevelDetector::new(settings.lookback, settings.atr_period),
            buy: BuySignalAnalyzer::new(settings),
            sell: SellSignalAnalyzer::new(settings),
            thresholds: DecisionThresholds {
                buy: settings.buy_threshold,
                sell: settings.sell_threshold,
                margin: settings.decision_margin,
            },
            threshold_mode: settings.threshold_mode,
            knee_threshold: settings.knee_threshold,
            shoulder_threshold: settings.shoulder_threshold,
            trend_provider,
        }
    }

    pub fn market_trend(&self) -> MarketTrend {
        self.trend_provider.market_trend()
    }

    pub fn analyze_stock(
        &self,
        symbol: &str,
        bars: &[OhlcvBar],
        position: Option<&Position>,
        trend: MarketTrend,
    ) -> Result<StockAnalysis, SignalError> {
        self.analyze_stock_with(symbol, bars, position, trend, None)
    }

    pub fn analyze_stock_with(
        &self,
        symbol: &str,
        bars: &[OhlcvBar],
        position: Option<&Position>,
        trend: MarketTrend,
        overlay: Option<&MaOverlay>,
    ) -> Result<StockAnalysis, SignalError> {
        validate_series(symbol, bars)?;

        let empty = || SignalError::NoData {
            code: symbol.to_string(),
        };

        let current_price = bars[bars.len() - 1].close;
        let price_levels = self.detector.detect_floor_ceiling(bars);
        let position_metrics = self.detector.calculate_position_metrics(bars, None);
        let volatility = self.detector.calculate_volatility_level(bars);
        let knee = self
            .detector
            .is_at_knee(bars, self.knee_threshold, self.threshold_mode);
        let shoulder =
            self.detector
                .is_at_shoulder(bars, self.shoulder_threshold, self.threshold_mode);

        let buy_analysis = self
            .buy
            .analyze_buy_signals_with(bars, trend, overlay)
            .ok_or_else(empty)?;
        let sell_analysis = self
            .sell
            .analyze_sell_signals_with(
                bars,
                position.map(|p| p.buy_price),
                trend,
                position.and_then(|p| p.highest_price),
                overlay,
            )
            .ok_or_else(empty)?;

        let buy_recommendation = get_buy_recommendation(Some(&buy_analysis));
        let sell_recommendation = get_sell_recommendation(Some(&sell_analysis));

        let action = decide(
            buy_analysis.market_adjusted_score,
            sell_analysis.market_adjusted_score,
            &self.thresholds,
        );
        let overall_recommendation = match action {
            TradeAction::Buy => buy_recommendation.clone(),
            TradeAction::Sell => sell_recommendation.clone(),
            TradeAction::Hold => NO_CLEAR_SIGNAL.to_string(),
        };

        Ok(StockAnalysis {
            symbol: symbol.to_string(),
            current_price,
            market_trend: trend,
            price_levels,
            position_metrics,
            volatility,
            knee,
            shoulder,
            buy_analysis,
            buy_recommendation,
            sell_analysis,
            sell_recommendation,
            decision: TradeDecision {
                action,
                overall_recommendation,
            },
        })
    }

    /// Analyzes every request in parallel under one market trend read from
    /// the provider. Output order matches input order.
    pub fn analyze_multiple_stocks(&self, requests: &[AnalysisRequest]) -> Vec<AnalysisOutcome> {
        let trend = self.market_trend();
        info!(symbols = requests.len(), trend = %trend, "analyzing batch");

        requests
            .par_iter()
            .map(|request| {
                match self.analyze_stock_with(
                    &request.symbol,
                    &request.bars,
                    request.position.as_ref(),
                    trend,
                    request.overlay.as_ref(),
                ) {
                    Ok(analysis) => AnalysisOutcome::Analysed(Box::new(analysis)),
                    Err(e) => {
                        warn!(symbol = %request.symbol, error = %e, "analysis failed");
                        AnalysisOutcome::Failed(AnalysisFailure {
                            symbol: request.symbol.clone(),
                            error: e.to_string(),
                        })
                    }
                }
            })
            .collect()
    }
}

/// Highest-scoring analyses for `action`, error records dropped. HOLD keeps
/// the first `top_n` valid results in input order.
pub fn get_priority_stocks(
    results: &[AnalysisOutcome],
    action: TradeAction,
    top_n: usize,
) -> Vec<&StockAnalysis> {
    let mut valid: Vec<&StockAnalysis> =
        results.iter().filter_map(AnalysisOutcome::analysis).collect();

    match action {
        TradeAction::Buy => valid.sort_by(|a, b| b.buy_score().total_cmp(&a.buy_score())),
        TradeAction::Sell => valid.sort_by(|a, b| b.sell_score().total_cmp(&a.sell_score())),
        TradeAction::Hold => {}
    }

    valid.truncate(top_n);
    valid
}
