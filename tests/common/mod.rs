#![allow(dead_code)]

use chrono::NaiveDate;
pub use stocksignal::domain::ohlcv::OhlcvBar;
use stocksignal::domain::error::SignalError;
use stocksignal::domain::signal::{MaOverlay, MarketTrend};
use stocksignal::ports::data_port::DataPort;
use stocksignal::ports::market_trend_port::MarketTrendProvider;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, code: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(code.to_string(), bars);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(&self, code: &str, _exchange: &str) -> Result<Vec<OhlcvBar>, SignalError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(SignalError::DataSource {
                reason: reason.clone(),
            });
        }
        self.data
            .get(code)
            .cloned()
            .ok_or_else(|| SignalError::NoData {
                code: code.to_string(),
            })
    }

    fn list_symbols(&self, _exchange: &str) -> Result<Vec<String>, SignalError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub struct StaticTrend(pub MarketTrend);

impl MarketTrendProvider for StaticTrend {
    fn market_trend(&self) -> MarketTrend {
        self.0
    }
}

pub fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

/// Bars with a +/-1% intraday range around each close and constant volume.
pub fn bars_from_closes(closes: &[f64]) -> Vec<OhlcvBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| OhlcvBar {
            date: start_date() + chrono::Duration::days(i as i64),
            open: c,
            high: c * 1.01,
            low: c * 0.99,
            close: c,
            volume: 1_000_000.0,
        })
        .collect()
}

pub fn bars_with_volumes(closes: &[f64], volumes: &[f64]) -> Vec<OhlcvBar> {
    let mut bars = bars_from_closes(closes);
    for (bar, &v) in bars.iter_mut().zip(volumes) {
        bar.volume = v;
    }
    bars
}

pub fn flat_bars(price: f64, count: usize) -> Vec<OhlcvBar> {
    bars_from_closes(&vec![price; count])
}

/// Rises from `start` by `step` per bar.
pub fn rising_bars(start: f64, step: f64, count: usize) -> Vec<OhlcvBar> {
    let closes: Vec<f64> = (0..count).map(|i| start + step * i as f64).collect();
    bars_from_closes(&closes)
}

/// Falls for `down` bars then recovers for `up` bars.
pub fn v_shaped_bars(start: f64, step: f64, down: usize, up: usize) -> Vec<OhlcvBar> {
    let mut closes: Vec<f64> = (0..down).map(|i| start - step * i as f64).collect();
    let bottom = start - step * (down as f64 - 1.0);
    closes.extend((1..=up).map(|i| bottom + step * i as f64));
    bars_from_closes(&closes)
}

/// Short MA above long for all but the last two rows, then below: a dead
/// cross two rows before the end.
pub fn falling_ma_overlay(len: usize) -> MaOverlay {
    let mut short = vec![Some(105.0); len];
    short[len - 2] = Some(95.0);
    short[len - 1] = Some(94.0);
    MaOverlay::new(short, vec![Some(100.0); len])
}

pub fn write_csv_with_overlay(
    dir: &std::path::Path,
    code: &str,
    exchange: &str,
    bars: &[OhlcvBar],
    overlay: &MaOverlay,
) {
    let cell = |v: Option<f64>| v.map(|v| v.to_string()).unwrap_or_default();
    let mut content = String::from("date,open,high,low,close,volume,MA20,MA60\n");
    for (i, b) in bars.iter().enumerate() {
        content.push_str(&format!(
            "{},{},{},{},{},{},{},{}\n",
            b.date,
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume,
            cell(overlay.short[i]),
            cell(overlay.long[i])
        ));
    }
    std::fs::write(dir.join(format!("{}_{}.csv", code, exchange)), content).unwrap();
}

pub fn write_csv(dir: &std::path::Path, code: &str, exchange: &str, bars: &[OhlcvBar]) {
    let mut content = String::from("date,open,high,low,close,volume\n");
    for b in bars {
        content.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.date, b.open, b.high, b.low, b.close, b.volume
        ));
    }
    std::fs::write(dir.join(format!("{}_{}.csv", code, exchange)), content).unwrap();
}
