//! Rolling standard deviation of closing prices.
//!
//! Sample standard deviation (n - 1 denominator) over n closes.
//! Warmup: first (n-1) bars are invalid; periods below 2 are never valid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_stddev(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    let mut values = Vec::with_capacity(bars.len());

    for i in 0..bars.len() {
        let date = bars[i].date;
        let valid = period >= 2 && i + 1 >= period;

        let value = if valid {
            let start = i + 1 - period;
            let closes: Vec<f64> = bars[start..=i].iter().map(|b| b.close).collect();
            sample_std(&closes)
        } else {
            0.0
        };

        values.push(IndicatorPoint {
            date,
            valid,
            value,
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Stddev(period),
        values,
    }
}

/// Sample standard deviation; 0.0 for fewer than two values.
pub fn sample_std(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    let variance = data
        .iter()
        .map(|x| {
            let diff = x - mean;
            diff * diff
        })
        .sum::<f64>()
        / (data.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_bars(prices: &[f64]) -> Vec<OhlcvBar> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcvBar {
                date: NaiveDate::from_ymd_opt(2024, 1, (i + 1) as u32).unwrap(),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn stddev_warmup() {
        let bars = make_bars(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        let series = calculate_stddev(&bars, 3);

        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!(series.values[2].valid);
        assert!(series.values[3].valid);
        assert!(series.values[4].valid);
    }

    #[test]
    fn stddev_constant_values() {
        let bars = make_bars(&[100.0, 100.0, 100.0, 100.0, 100.0]);
        let series = calculate_stddev(&bars, 3);
        assert!((series.get(2).unwrap() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stddev_known_values() {
        let bars = make_bars(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let series = calculate_stddev(&bars, 8);

        // sum of squared deviations = 32, n - 1 = 7
        let expected = (32.0_f64 / 7.0).sqrt();
        assert!((series.get(7).unwrap() - expected).abs() < 1e-10);
    }

    #[test]
    fn stddev_period_one_never_valid() {
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        let series = calculate_stddev(&bars, 1);
        assert!(series.valid_values().is_empty());
    }

    #[test]
    fn sample_std_short_input() {
        assert_eq!(sample_std(&[]), 0.0);
        assert_eq!(sample_std(&[5.0]), 0.0);
    }
}
