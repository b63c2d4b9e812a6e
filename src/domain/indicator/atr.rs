//! Average True Range as a rolling mean of true ranges.
//!
//! TR[0] = high - low; TR[i] = max(high - low, |high - C[i-1]|, |low - C[i-1]|).
//! ATR(n)[i] = mean(TR[i-n+1..=i]). Warmup: first (n-1) bars are invalid, and
//! any window touching a bar without a high/low range is invalid too.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_atr(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let tr_values: Vec<Option<f64>> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            if !bar.has_range() {
                return None;
            }
            let tr = if i == 0 {
                bar.high - bar.low
            } else {
                bar.true_range(bars[i - 1].close)
            };
            tr.is_finite().then_some(tr)
        })
        .collect();

    let mut values = Vec::with_capacity(bars.len());

    for (i, bar) in bars.iter().enumerate() {
        let window = if period > 0 && i + 1 >= period {
            Some(&tr_values[i + 1 - period..=i])
        } else {
            None
        };

        let mean = window.and_then(|w| {
            let sum = w.iter().copied().sum::<Option<f64>>()?;
            Some(sum / period as f64)
        });

        values.push(IndicatorPoint {
            date: bar.date,
            valid: mean.is_some(),
            value: mean.unwrap_or(0.0),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Atr(period),
        values,
    }
}
