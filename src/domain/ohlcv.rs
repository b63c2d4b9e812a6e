//! OHLCV bar representation.

use chrono::NaiveDate;
use serde::Serialize;

/// One daily row. A bar whose `high` or `low` is not finite is treated as
/// having no intraday range (the source had no High/Low columns).
#[derive(Debug, Clone, Serialize)]
pub struct OhlcvBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl OhlcvBar {
    /// Bar without intraday range information.
    pub fn close_only(date: NaiveDate, close: f64, volume: f64) -> Self {
        Self {
            date,
            open: close,
            high: f64::NAN,
            low: f64::NAN,
            close,
            volume,
        }
    }

    pub fn has_range(&self) -> bool {
        self.high.is_finite() && self.low.is_finite()
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

/// The most recent `n` bars (all of them when `n` exceeds the length).
pub fn tail(bars: &[OhlcvBar], n: usize) -> &[OhlcvBar] {
    &bars[bars.len().saturating_sub(n)..]
}
