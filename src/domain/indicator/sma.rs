//! Simple moving average of closing prices.
//!
//! SMA(n)[i] = mean(C[i-n+1..=i]); the first (n-1) bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_sma(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let mut values = Vec::with_capacity(bars.len());
    let mut window_sum = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        window_sum += bar.close;
        if period > 0 && i >= period {
            window_sum -= bars[i - period].close;
        }

        let valid = period > 0 && i + 1 >= period;
        values.push(IndicatorPoint {
            date: bar.date,
            valid,
            value: if valid { window_sum / period as f64 } else { 0.0 },
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Sma(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_bars(prices: &[f64]) -> Vec<OhlcvBar> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                OhlcvBar::close_only(
                    NaiveDate::from_ymd_opt(2024, 1, (i + 1) as u32).unwrap(),
                    close,
                    1000.0,
                )
            })
            .collect()
    }

    #[test]
    fn sma_basic() {
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let series = calculate_sma(&bars, 3);

        assert_eq!(series.len(), 5);
        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!((series.get(2).unwrap() - 2.0).abs() < 1e-10);
        assert!((series.get(3).unwrap() - 3.0).abs() < 1e-10);
        assert!((series.get(4).unwrap() - 4.0).abs() < 1e-10);
    }

    #[test]
    fn sma_insufficient_data() {
        let bars = make_bars(&[1.0, 2.0]);
        let series = calculate_sma(&bars, 5);
        assert_eq!(series.len(), 2);
        assert!(series.valid_values().is_empty());
    }

    #[test]
    fn sma_zero_period_is_all_invalid() {
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        let series = calculate_sma(&bars, 0);
        assert!(series.values.iter().all(|p| !p.valid));
    }

    #[test]
    fn sma_indicator_type() {
        let series = calculate_sma(&make_bars(&[1.0]), 20);
        assert_eq!(series.indicator_type, IndicatorType::Sma(20));
    }
}
