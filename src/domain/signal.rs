//! Signal vocabulary shared by the buy and sell analyzers: market trend
//! labels, machine-readable signal tags, and moving-average cross detection.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::domain::indicator::sma::calculate_sma;
use crate::domain::ohlcv::OhlcvBar;

/// Number of most recent day-pairs scanned for a fresh cross.
pub const CROSS_SCAN_DAYS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketTrend {
    Bull,
    Bear,
    Sideways,
    #[default]
    Unknown,
}

impl fmt::Display for MarketTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MarketTrend::Bull => "BULL",
            MarketTrend::Bear => "BEAR",
            MarketTrend::Sideways => "SIDEWAYS",
            MarketTrend::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

impl FromStr for MarketTrend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BULL" => Ok(MarketTrend::Bull),
            "BEAR" => Ok(MarketTrend::Bear),
            "SIDEWAYS" => Ok(MarketTrend::Sideways),
            "UNKNOWN" => Ok(MarketTrend::Unknown),
            other => Err(format!("unknown market trend '{other}'")),
        }
    }
}

/// Machine-readable signal emitted by an analyzer. Display text lives in
/// [`crate::domain::recommendation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalTag {
    KneeReached,
    RsiOversold,
    VolumeSurge,
    GoldenCross { days_ago: usize },
    ShoulderReached,
    RsiOverbought,
    VolumeDecrease,
    DeadCross { days_ago: usize },
    FixedStopLoss,
    TrailingStop,
    /// Bear market damping a buy score.
    BuyInBearMarket,
    /// Bull market boosting a buy score.
    BuyInBullMarket,
    /// Bull market favouring holding over selling.
    SellInBullMarket,
    /// Bear market strengthening a sell score.
    SellInBearMarket,
    SidewaysMarket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossDirection {
    /// Short MA crosses from below to above the long MA.
    Golden,
    /// Short MA crosses from above to below the long MA.
    Dead,
}

/// Result of a moving-average cross scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrossInfo {
    pub is_cross: bool,
    pub ma_short: Option<f64>,
    pub ma_long: Option<f64>,
    /// Rows since the cross, only set when one was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_ago: Option<usize>,
    /// Whether the short MA currently sits on the cross side, only set when
    /// no fresh cross was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currently_aligned: Option<bool>,
}

/// Caller-supplied moving averages aligned with the bars. When absent, the
/// analyzers compute their own into local vectors.
#[derive(Debug, Clone, Default)]
pub struct MaOverlay {
    pub short: Vec<Option<f64>>,
    pub long: Vec<Option<f64>>,
}

impl MaOverlay {
    pub fn new(short: Vec<Option<f64>>, long: Vec<Option<f64>>) -> Self {
        Self { short, long }
    }

    pub fn compute(bars: &[OhlcvBar], short_period: usize, long_period: usize) -> Self {
        let short = calculate_sma(bars, short_period);
        let long = calculate_sma(bars, long_period);
        Self {
            short: (0..bars.len()).map(|i| short.get(i)).collect(),
            long: (0..bars.len()).map(|i| long.get(i)).collect(),
        }
    }

    pub fn matches(&self, bars: &[OhlcvBar]) -> bool {
        self.short.len() == bars.len() && self.long.len() == bars.len()
    }
}

/// Scans the last [`CROSS_SCAN_DAYS`] day-pairs for a cross in `direction`.
///
/// Requires at least `long_period` rows. A supplied overlay is used when its
/// length matches the bars; otherwise MAs are computed locally.
pub fn detect_cross(
    bars: &[OhlcvBar],
    overlay: Option<&MaOverlay>,
    short_period: usize,
    long_period: usize,
    direction: CrossDirection,
) -> CrossInfo {
    if bars.is_empty() || bars.len() < long_period {
        return CrossInfo::default();
    }

    let local;
    let ma = match overlay {
        Some(o) if o.matches(bars) => o,
        _ => {
            local = MaOverlay::compute(bars, short_period, long_period);
            &local
        }
    };

    let n = bars.len();
    let last_short = ma.short[n - 1];
    let last_long = ma.long[n - 1];

    for i in 1..(CROSS_SCAN_DAYS + 1).min(n) {
        let prev = n - 1 - i;
        let curr = n - i;

        let (Some(prev_short), Some(prev_long)) = (ma.short[prev], ma.long[prev]) else {
            continue;
        };
        let (Some(curr_short), Some(curr_long)) = (ma.short[curr], ma.long[curr]) else {
            continue;
        };

        let crossed = match direction {
            CrossDirection::Golden => prev_short < prev_long && curr_short > curr_long,
            CrossDirection::Dead => prev_short > prev_long && curr_short < curr_long,
        };

        if crossed {
            return CrossInfo {
                is_cross: true,
                ma_short: last_short,
                ma_long: last_long,
                days_ago: Some(i),
                currently_aligned: None,
            };
        }
    }

    let currently_aligned = match (last_short, last_long) {
        (Some(s), Some(l)) => Some(match direction {
            CrossDirection::Golden => s > l,
            CrossDirection::Dead => s < l,
        }),
        _ => None,
    };

    CrossInfo {
        is_cross: false,
        ma_short: last_short,
        ma_long: last_long,
        days_ago: None,
        currently_aligned,
    }
}
