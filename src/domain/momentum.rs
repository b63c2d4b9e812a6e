//! RSI and volume helpers shared by the buy and sell analyzers.

use tracing::{debug, warn};

use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::numeric::{clip_value, is_valid_number, mean};
use crate::domain::ohlcv::{tail, OhlcvBar};

pub const NEUTRAL_RSI: f64 = 50.0;

/// RSI aligned with `bars`. Short series yield a constant 50 series; warm-up
/// and undefined points are filled with 50 and everything is clipped to
/// `[0, 100]`. Empty input yields an empty vector.
pub fn neutral_filled_rsi(bars: &[OhlcvBar], period: usize) -> Vec<f64> {
    if bars.is_empty() {
        return Vec::new();
    }
    if bars.len() < period {
        debug!(rows = bars.len(), period, "not enough rows for RSI, using neutral value");
        return vec![NEUTRAL_RSI; bars.len()];
    }

    calculate_rsi(bars, period)
        .filled(NEUTRAL_RSI)
        .into_iter()
        .map(|v| clip_value(v, 0.0, 100.0))
        .collect()
}

/// Last volume and the mean of the last `window` volumes. `None` when fewer
/// than `window` rows exist or the mean is zero or not finite.
pub fn volume_against_mean(bars: &[OhlcvBar], window: usize) -> Option<(f64, f64)> {
    if window == 0 || bars.len() < window {
        debug!(rows = bars.len(), window, "not enough rows for volume check");
        return None;
    }

    let current = bars[bars.len() - 1].volume;
    let recent: Vec<f64> = tail(bars, window).iter().map(|b| b.volume).collect();
    let avg = mean(&recent)?;

    if !is_valid_number(current) || !is_valid_number(avg) {
        warn!("volume check skipped: non-finite volume");
        return None;
    }
    if avg == 0.0 {
        warn!("volume check skipped: mean volume is zero");
        return None;
    }
    Some((current, avg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bars_with(closes: &[f64], volumes: &[f64]) -> Vec<OhlcvBar> {
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&c, &v))| {
                OhlcvBar::close_only(start + chrono::Duration::days(i as i64), c, v)
            })
            .collect()
    }

    #[test]
    fn short_series_is_neutral() {
        let bars = bars_with(&[100.0, 101.0, 99.0, 102.0, 98.0], &[1.0; 5]);
        assert_eq!(neutral_filled_rsi(&bars, 14), vec![50.0; 5]);
    }

    #[test]
    fn empty_series_is_empty() {
        assert!(neutral_filled_rsi(&[], 14).is_empty());
    }

    #[test]
    fn warmup_filled_with_neutral() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
        let bars = bars_with(&closes, &[1.0; 20]);
        let rsi = neutral_filled_rsi(&bars, 14);
        assert_eq!(rsi.len(), 20);
        assert!(rsi[..14].iter().all(|&v| v == 50.0));
        assert_eq!(rsi[19], 100.0);
    }

    #[test]
    fn volume_requires_window_rows() {
        let bars = bars_with(&[1.0; 10], &[100.0; 10]);
        assert!(volume_against_mean(&bars, 20).is_none());
    }

    #[test]
    fn volume_zero_mean_is_none() {
        let bars = bars_with(&[1.0; 20], &[0.0; 20]);
        assert!(volume_against_mean(&bars, 20).is_none());
    }

    #[test]
    fn volume_mean_over_last_window() {
        let mut volumes = vec![1000.0; 5];
        volumes.extend(vec![100.0; 20]);
        let bars = bars_with(&[1.0; 25], &volumes);
        let (current, avg) = volume_against_mean(&bars, 20).unwrap();
        assert_eq!(current, 100.0);
        assert_eq!(avg, 100.0);
    }
}
