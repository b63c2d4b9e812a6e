//! Engine thresholds and their validation.
//!
//! Every threshold has a default; an `[engine]` config section may override
//! any of them. Values are range-checked before an analyzer is built.

use crate::domain::error::SignalError;
use crate::domain::price_levels::ThresholdMode;
use crate::domain::signal::MarketTrend;
use crate::ports::config_port::ConfigPort;

const SECTION: &str = "engine";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub lookback: usize,
    pub atr_period: usize,
    pub threshold_mode: ThresholdMode,
    pub knee_threshold: f64,
    pub shoulder_threshold: f64,
    pub stop_loss_pct: f64,
    pub chase_risk_threshold: f64,
    pub profit_target_full: f64,
    pub profit_target_partial: f64,
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub ma_short: usize,
    pub ma_long: usize,
    pub volume_window: usize,
    pub volume_surge_multiplier: f64,
    pub volume_decrease_threshold: f64,
    pub volatility_period: usize,
    pub trailing_pct: f64,
    pub buy_threshold: f64,
    pub sell_threshold: f64,
    pub decision_margin: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            lookback: 60,
            atr_period: 14,
            threshold_mode: ThresholdMode::Dynamic,
            knee_threshold: 0.15,
            shoulder_threshold: 0.15,
            stop_loss_pct: 0.07,
            chase_risk_threshold: 0.25,
            profit_target_full: 0.30,
            profit_target_partial: 0.15,
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            ma_short: 20,
            ma_long: 60,
            volume_window: 20,
            volume_surge_multiplier: 2.0,
            volume_decrease_threshold: 0.7,
            volatility_period: 20,
            trailing_pct: 0.10,
            buy_threshold: 30.0,
            sell_threshold: 30.0,
            decision_margin: 10.0,
        }
    }
}

impl EngineSettings {
    /// Reads `[engine]`, falling back to defaults for absent keys.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SignalError> {
        let d = Self::default();

        let settings = Self {
            lookback: read_period(config, "lookback", d.lookback, 10)?,
            atr_period: read_period(config, "atr_period", d.atr_period, 1)?,
            threshold_mode: read_threshold_mode(config)?,
            knee_threshold: read_fraction(config, "knee_threshold", d.knee_threshold)?,
            shoulder_threshold: read_fraction(config, "shoulder_threshold", d.shoulder_threshold)?,
            stop_loss_pct: read_fraction(config, "stop_loss_pct", d.stop_loss_pct)?,
            chase_risk_threshold: read_positive(
                config,
                "chase_risk_threshold",
                d.chase_risk_threshold,
            )?,
            profit_target_full: read_positive(config, "profit_target_full", d.profit_target_full)?,
            profit_target_partial: read_positive(
                config,
                "profit_target_partial",
                d.profit_target_partial,
            )?,
            rsi_period: read_period(config, "rsi_period", d.rsi_period, 2)?,
            rsi_oversold: read_rsi_level(config, "rsi_oversold", d.rsi_oversold)?,
            rsi_overbought: read_rsi_level(config, "rsi_overbought", d.rsi_overbought)?,
            ma_short: read_period(config, "ma_short", d.ma_short, 1)?,
            ma_long: read_period(config, "ma_long", d.ma_long, 2)?,
            volume_window: read_period(config, "volume_window", d.volume_window, 1)?,
            volume_surge_multiplier: read_positive(
                config,
                "volume_surge_multiplier",
                d.volume_surge_multiplier,
            )?,
            volume_decrease_threshold: read_positive(
                config,
                "volume_decrease_threshold",
                d.volume_decrease_threshold,
            )?,
            volatility_period: read_period(config, "volatility_period", d.volatility_period, 2)?,
            trailing_pct: read_fraction(config, "trailing_pct", d.trailing_pct)?,
            buy_threshold: read_score(config, "buy_threshold", d.buy_threshold)?,
            sell_threshold: read_score(config, "sell_threshold", d.sell_threshold)?,
            decision_margin: read_score(config, "decision_margin", d.decision_margin)?,
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Cross-field checks.
    pub fn validate(&self) -> Result<(), SignalError> {
        if self.ma_short >= self.ma_long {
            return Err(invalid("ma_short", "ma_short must be shorter than ma_long"));
        }
        if self.rsi_oversold >= self.rsi_overbought {
            return Err(invalid(
                "rsi_oversold",
                "rsi_oversold must be below rsi_overbought",
            ));
        }
        if self.profit_target_partial > self.profit_target_full {
            return Err(invalid(
                "profit_target_partial",
                "profit_target_partial must not exceed profit_target_full",
            ));
        }
        Ok(())
    }
}

/// Checks the `[analysis]` and `[data]` sections used by the CLI.
pub fn validate_analysis_config(config: &dyn ConfigPort) -> Result<(), SignalError> {
    match config.get_string("data", "dir") {
        Some(s) if !s.trim().is_empty() => {}
        _ => {
            return Err(SignalError::ConfigMissing {
                section: "data".to_string(),
                key: "dir".to_string(),
            });
        }
    }

    if let Some(trend) = config.get_string("analysis", "market_trend") {
        trend
            .parse::<MarketTrend>()
            .map_err(|reason| SignalError::ConfigInvalid {
                section: "analysis".to_string(),
                key: "market_trend".to_string(),
                reason,
            })?;
    }

    EngineSettings::from_config(config)?;
    Ok(())
}

fn invalid(key: &str, reason: &str) -> SignalError {
    SignalError::ConfigInvalid {
        section: SECTION.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn read_period(
    config: &dyn ConfigPort,
    key: &str,
    default: usize,
    minimum: usize,
) -> Result<usize, SignalError> {
    let value = config.get_int(SECTION, key, default as i64);
    if value < minimum as i64 {
        return Err(invalid(key, &format!("{key} must be at least {minimum}")));
    }
    Ok(value as usize)
}

fn read_fraction(config: &dyn ConfigPort, key: &str, default: f64) -> Result<f64, SignalError> {
    let value = config.get_double(SECTION, key, default);
    if !(value > 0.0 && value < 1.0) {
        return Err(invalid(key, &format!("{key} must be between 0 and 1")));
    }
    Ok(value)
}

fn read_positive(config: &dyn ConfigPort, key: &str, default: f64) -> Result<f64, SignalError> {
    let value = config.get_double(SECTION, key, default);
    if !(value.is_finite() && value > 0.0) {
        return Err(invalid(key, &format!("{key} must be positive")));
    }
    Ok(value)
}

fn read_rsi_level(config: &dyn ConfigPort, key: &str, default: f64) -> Result<f64, SignalError> {
    let value = config.get_double(SECTION, key, default);
    if !(value > 0.0 && value < 100.0) {
        return Err(invalid(key, &format!("{key} must be between 0 and 100")));
    }
    Ok(value)
}

fn read_score(config: &dyn ConfigPort, key: &str, default: f64) -> Result<f64, SignalError> {
    let value = config.get_double(SECTION, key, default);
    if !(0.0..=100.0).contains(&value) {
        return Err(invalid(key, &format!("{key} must be between 0 and 100")));
    }
    Ok(value)
}

fn read_threshold_mode(config: &dyn ConfigPort) -> Result<ThresholdMode, SignalError> {
    match config.get_string(SECTION, "threshold_mode") {
        None => Ok(ThresholdMode::Dynamic),
        Some(s) => match s.trim().to_ascii_lowercase().as_str() {
            "dynamic" => Ok(ThresholdMode::Dynamic),
            "static" => Ok(ThresholdMode::Static),
            _ => Err(invalid(
                "threshold_mode",
                "threshold_mode must be 'dynamic' or 'static'",
            )),
        },
    }
}
