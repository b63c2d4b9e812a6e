//! Human-readable text for signal tags and analyses.

use std::fmt;

use crate::domain::buy_signals::BuyAnalysis;
use crate::domain::sell_signals::SellAnalysis;
use crate::domain::signal::SignalTag;

pub const NO_CLEAR_SIGNAL: &str = "watch - no clear signal";

impl fmt::Display for SignalTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalTag::KneeReached => write!(f, "knee reached"),
            SignalTag::RsiOversold => write!(f, "RSI oversold"),
            SignalTag::VolumeSurge => write!(f, "volume surge"),
            SignalTag::GoldenCross { days_ago } => write!(f, "golden cross ({days_ago} days ago)"),
            SignalTag::ShoulderReached => write!(f, "shoulder reached"),
            SignalTag::RsiOverbought => write!(f, "RSI overbought"),
            SignalTag::VolumeDecrease => write!(f, "volume decrease"),
            SignalTag::DeadCross { days_ago } => write!(f, "dead cross ({days_ago} days ago)"),
            SignalTag::FixedStopLoss => write!(f, "fixed stop-loss"),
            SignalTag::TrailingStop => write!(f, "trailing stop"),
            SignalTag::BuyInBearMarket => write!(f, "bear market"),
            SignalTag::BuyInBullMarket => write!(f, "bull market"),
            SignalTag::SellInBullMarket => write!(f, "bull market (holding favoured)"),
            SignalTag::SellInBearMarket => write!(f, "bear market (consider selling)"),
            SignalTag::SidewaysMarket => write!(f, "sideways market"),
        }
    }
}

pub fn join_signals(signals: &[SignalTag]) -> String {
    signals
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn get_buy_recommendation(analysis: Option<&BuyAnalysis>) -> String {
    let Some(analysis) = analysis else {
        return "cannot evaluate".to_string();
    };

    let score = analysis.market_adjusted_score;
    let mut text = if score >= 70.0 {
        "strong buy"
    } else if score >= 50.0 {
        "consider buying"
    } else if score >= 30.0 {
        "watch"
    } else {
        "not suitable for buying"
    }
    .to_string();

    if !analysis.chase_buy_safe {
        text.push_str(" (chase-buy risk)");
    }
    if !analysis.signals.is_empty() {
        text.push_str(" - ");
        text.push_str(&join_signals(&analysis.signals));
    }
    text
}

pub fn get_sell_recommendation(analysis: Option<&SellAnalysis>) -> String {
    let Some(analysis) = analysis else {
        return "cannot evaluate".to_string();
    };

    if analysis.stop_loss_triggered {
        let mut text = if analysis.signals.contains(&SignalTag::FixedStopLoss) {
            format!(
                "must sell now: stop-loss triggered ({:+.1}%)",
                analysis.loss_rate.unwrap_or(0.0) * 100.0
            )
        } else {
            format!(
                "must sell now: trailing stop triggered ({:+.1}% from high)",
                analysis.trailing_stop.loss_from_high * 100.0
            )
        };
        if let Some(message) = &analysis.stop_loss_message {
            text.push_str(" - ");
            text.push_str(message);
        }
        return text;
    }

    let score = analysis.market_adjusted_score;
    let mut text = if score >= 70.0 {
        "strong sell"
    } else if score >= 50.0 {
        "consider selling"
    } else if score >= 30.0 {
        "watch"
    } else {
        "hold"
    }
    .to_string();

    text.push_str(&format!(" ({})", analysis.sell_strategy));
    if let Some(rate) = analysis.profit_rate {
        text.push_str(&format!(" [profit rate: {:+.1}%]", rate * 100.0));
    }
    if !analysis.signals.is_empty() {
        text.push_str(" - ");
        text.push_str(&join_signals(&analysis.signals));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::buy_signals::BuySignalAnalyzer;
    use crate::domain::ohlcv::OhlcvBar;
    use crate::domain::sell_signals::SellSignalAnalyzer;
    use crate::domain::signal::MarketTrend;
    use chrono::NaiveDate;

    fn make_bars(closes: &[f64]) -> Vec<OhlcvBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                OhlcvBar::close_only(start + chrono::Duration::days(i as i64), c, 1000.0)
            })
            .collect()
    }

    #[test]
    fn tag_labels() {
        assert_eq!(SignalTag::GoldenCross { days_ago: 3 }.to_string(), "golden cross (3 days ago)");
        assert_eq!(
            join_signals(&[SignalTag::RsiOversold, SignalTag::VolumeSurge]),
            "RSI oversold, volume surge"
        );
        assert_eq!(join_signals(&[]), "");
    }

    #[test]
    fn missing_analysis_cannot_evaluate() {
        assert_eq!(get_buy_recommendation(None), "cannot evaluate");
        assert_eq!(get_sell_recommendation(None), "cannot evaluate");
    }

    #[test]
    fn buy_ladder_and_chase_warning() {
        let bars = make_bars(&[100.0; 30]);
        let mut analysis = BuySignalAnalyzer::default()
            .analyze_buy_signals(&bars, MarketTrend::Unknown)
            .unwrap();

        analysis.market_adjusted_score = 75.0;
        analysis.signals = vec![SignalTag::KneeReached];
        assert_eq!(get_buy_recommendation(Some(&analysis)), "strong buy - knee reached");

        analysis.market_adjusted_score = 55.0;
        analysis.chase_buy_safe = false;
        analysis.signals.clear();
        assert_eq!(
            get_buy_recommendation(Some(&analysis)),
            "consider buying (chase-buy risk)"
        );

        analysis.market_adjusted_score = 10.0;
        analysis.chase_buy_safe = true;
        assert_eq!(get_buy_recommendation(Some(&analysis)), "not suitable for buying");
    }

    #[test]
    fn sell_text_includes_strategy_and_profit() {
        let bars = make_bars(&[120.0; 30]);
        let mut analysis = SellSignalAnalyzer::default()
            .analyze_sell_signals(&bars, Some(100.0), MarketTrend::Unknown, None)
            .unwrap();
        analysis.market_adjusted_score = 35.0;

        assert_eq!(
            get_sell_recommendation(Some(&analysis)),
            "watch (PARTIAL_THIRD) [profit rate: +20.0%]"
        );
    }

    #[test]
    fn sell_stop_loss_short_circuits() {
        let mut closes = vec![100.0; 30];
        closes.push(90.0);
        let analysis = SellSignalAnalyzer::default()
            .analyze_sell_signals(&make_bars(&closes), Some(100.0), MarketTrend::Unknown, None)
            .unwrap();

        let text = get_sell_recommendation(Some(&analysis));
        assert!(text.starts_with("must sell now: stop-loss triggered (-10.0%)"));
    }

    #[test]
    fn trailing_stop_in_profit_is_not_called_stop_loss() {
        let mut closes = vec![100.0; 30];
        closes.push(125.0);
        let bars = make_bars(&closes);
        let analysis = SellSignalAnalyzer::default()
            .analyze_sell_signals(&bars, Some(100.0), MarketTrend::Unknown, Some(150.0))
            .unwrap();

        assert!(analysis.stop_loss_triggered);
        assert_eq!(analysis.loss_rate, None);
        let text = get_sell_recommendation(Some(&analysis));
        assert!(
            text.starts_with("must sell now: trailing stop triggered (-16.7% from high)"),
            "{text}"
        );
        assert!(!text.contains("stop-loss triggered"));
    }
}
