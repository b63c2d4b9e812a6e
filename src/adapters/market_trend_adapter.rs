//! Market trend providers.
//!
//! [`IndexTrendProvider`] classifies a market index by the gap between its
//! 20- and 60-day moving averages. [`FixedTrendProvider`] returns a label set
//! in configuration.

use tracing::{info, warn};

use crate::domain::indicator::sma::calculate_sma;
use crate::domain::numeric::safe_divide;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::signal::MarketTrend;
use crate::ports::market_trend_port::MarketTrendProvider;

const SHORT_PERIOD: usize = 20;
const LONG_PERIOD: usize = 60;
/// MA gap beyond which the market counts as trending.
const TREND_GAP: f64 = 0.02;

pub struct FixedTrendProvider {
    trend: MarketTrend,
}

impl FixedTrendProvider {
    pub fn new(trend: MarketTrend) -> Self {
        Self { trend }
    }
}

impl MarketTrendProvider for FixedTrendProvider {
    fn market_trend(&self) -> MarketTrend {
        self.trend
    }
}

/// Classifies once at construction; the index bars are not retained.
pub struct IndexTrendProvider {
    trend: MarketTrend,
}

impl IndexTrendProvider {
    pub fn new(index_bars: &[OhlcvBar]) -> Self {
        Self {
            trend: classify_index_trend(index_bars),
        }
    }
}

impl MarketTrendProvider for IndexTrendProvider {
    fn market_trend(&self) -> MarketTrend {
        self.trend
    }
}

/// `(MA20 - MA60) / MA60` above +2% is BULL, below -2% BEAR, otherwise
/// SIDEWAYS. Fewer than 60 rows is UNKNOWN.
pub fn classify_index_trend(bars: &[OhlcvBar]) -> MarketTrend {
    if bars.len() < LONG_PERIOD {
        warn!(rows = bars.len(), "not enough index rows for market trend");
        return MarketTrend::Unknown;
    }

    let (Some(short), Some(long)) = (
        calculate_sma(bars, SHORT_PERIOD).last_valid(),
        calculate_sma(bars, LONG_PERIOD).last_valid(),
    ) else {
        return MarketTrend::Unknown;
    };

    let gap = safe_divide(short - long, long, f64::NAN);
    let trend = if gap.is_nan() {
        MarketTrend::Unknown
    } else if gap > TREND_GAP {
        MarketTrend::Bull
    } else if gap < -TREND_GAP {
        MarketTrend::Bear
    } else {
        MarketTrend::Sideways
    };

    info!(%trend, gap_pct = gap * 100.0, "market trend classified");
    trend
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn index_bars(closes: impl Iterator<Item = f64>) -> Vec<OhlcvBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        closes
            .enumerate()
            .map(|(i, c)| OhlcvBar::close_only(start + chrono::Duration::days(i as i64), c, 0.0))
            .collect()
    }

    #[test]
    fn fixed_provider_returns_label() {
        assert_eq!(
            FixedTrendProvider::new(MarketTrend::Bear).market_trend(),
            MarketTrend::Bear
        );
    }

    #[test]
    fn short_index_is_unknown() {
        let bars = index_bars((0..59).map(|_| 100.0));
        assert_eq!(classify_index_trend(&bars), MarketTrend::Unknown);
    }

    #[test]
    fn rising_index_is_bull() {
        let bars = index_bars((0..80).map(|i| 100.0 + i as f64));
        assert_eq!(classify_index_trend(&bars), MarketTrend::Bull);
        assert_eq!(IndexTrendProvider::new(&bars).market_trend(), MarketTrend::Bull);
    }

    #[test]
    fn falling_index_is_bear() {
        let bars = index_bars((0..80).map(|i| 200.0 - i as f64));
        assert_eq!(classify_index_trend(&bars), MarketTrend::Bear);
    }

    #[test]
    fn flat_index_is_sideways() {
        let bars = index_bars((0..80).map(|i| 100.0 + (i % 2) as f64 * 0.5));
        assert_eq!(classify_index_trend(&bars), MarketTrend::Sideways);
    }
}
