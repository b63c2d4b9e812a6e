//! Technical indicator implementations.
//!
//! Every indicator produces an [`IndicatorSeries`] aligned one-to-one with the
//! input bars. Points inside the warm-up window are marked `valid: false`;
//! callers decide how to fill them (neutral RSI, median ATR, ...).

pub mod atr;
pub mod rsi;
pub mod sma;
pub mod stddev;

use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Sma(usize),
    Rsi(usize),
    Atr(usize),
    Stddev(usize),
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index` if it is past warm-up.
    pub fn get(&self, index: usize) -> Option<f64> {
        self.values
            .get(index)
            .filter(|p| p.valid && p.value.is_finite())
            .map(|p| p.value)
    }

    pub fn last_valid(&self) -> Option<f64> {
        self.values
            .iter()
            .rev()
            .find(|p| p.valid && p.value.is_finite())
            .map(|p| p.value)
    }

    pub fn valid_values(&self) -> Vec<f64> {
        self.values
            .iter()
            .filter(|p| p.valid && p.value.is_finite())
            .map(|p| p.value)
            .collect()
    }

    /// Plain values with invalid points replaced by `fill`.
    pub fn filled(&self, fill: f64) -> Vec<f64> {
        self.values
            .iter()
            .map(|p| if p.valid && p.value.is_finite() { p.value } else { fill })
            .collect()
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Sma(period) => write!(f, "SMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Stddev(period) => write!(f, "STDDEV({})", period),
        }
    }
}
