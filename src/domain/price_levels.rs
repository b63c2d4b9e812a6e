//! Floor/ceiling detection and volatility-adaptive knee/shoulder bands.
//!
//! The floor and ceiling are the lowest and highest closes in the most recent
//! `lookback` rows. A "knee" is a zone modestly above the floor, a "shoulder"
//! a zone modestly below the ceiling. In dynamic mode the zones are placed
//! `2 * ATR * factor` away from the level, where the factor widens in volatile
//! markets and narrows in calm ones; the band is one ATR either side.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::domain::indicator::atr::calculate_atr as true_range_atr;
use crate::domain::indicator::stddev::calculate_stddev;
use crate::domain::indicator::IndicatorSeries;
use crate::domain::numeric::{clip_value, mean, median, safe_percentage};
use crate::domain::ohlcv::{tail, OhlcvBar};

/// Fewest rows in the lookback window for levels to be reported.
pub const MIN_LEVEL_ROWS: usize = 10;
/// Number of trailing ATR samples averaged for the volatility ratio.
pub const ATR_AVERAGE_WINDOW: usize = 60;
/// Half-width of the static knee/shoulder band around the threshold.
pub const STATIC_BAND: f64 = 0.05;

const LOW_VOLATILITY_RATIO: f64 = 0.7;
const HIGH_VOLATILITY_RATIO: f64 = 1.3;
const DYNAMIC_ATR_MULTIPLE: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceLevels {
    pub floor: f64,
    pub floor_date: NaiveDate,
    pub ceiling: f64,
    pub ceiling_date: NaiveDate,
    pub current: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionMetrics {
    pub from_floor_pct: f64,
    pub from_ceiling_pct: f64,
    pub position_in_range: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolatilityLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl VolatilityLevel {
    pub fn adjustment_factor(self) -> f64 {
        match self {
            VolatilityLevel::Low => 0.8,
            VolatilityLevel::Medium => 1.0,
            VolatilityLevel::High => 1.3,
        }
    }
}

impl fmt::Display for VolatilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolatilityLevel::Low => write!(f, "LOW"),
            VolatilityLevel::Medium => write!(f, "MEDIUM"),
            VolatilityLevel::High => write!(f, "HIGH"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VolatilityInfo {
    pub level: VolatilityLevel,
    pub current_atr: f64,
    pub avg_atr: f64,
    pub atr_ratio: f64,
    pub adjustment_factor: f64,
}

impl Default for VolatilityInfo {
    fn default() -> Self {
        Self {
            level: VolatilityLevel::Medium,
            current_atr: 0.0,
            avg_atr: 0.0,
            atr_ratio: 0.0,
            adjustment_factor: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    /// ATR-based band around `level ± 2 * ATR * factor`.
    #[default]
    Dynamic,
    /// Fixed `threshold ± 0.05` band on the percentage distance from the level.
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DynamicBand {
    pub price: f64,
    pub lower: f64,
    pub upper: f64,
    pub volatility_level: VolatilityLevel,
    pub atr: f64,
    pub adjustment_factor: f64,
}

/// Knee or shoulder proximity check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneStatus {
    pub active: bool,
    /// Distance from the floor (knee) or ceiling (shoulder) as a fraction.
    pub from_level_pct: Option<f64>,
    pub band: Option<DynamicBand>,
    pub message: String,
}

impl ZoneStatus {
    fn insufficient() -> Self {
        Self {
            active: false,
            from_level_pct: None,
            band: None,
            message: "insufficient data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Zone {
    Knee,
    Shoulder,
}

#[derive(Debug, Clone)]
pub struct PriceLevelDetector {
    lookback: usize,
    atr_period: usize,
}

impl Default for PriceLevelDetector {
    fn default() -> Self {
        Self::new(60, 14)
    }
}

impl PriceLevelDetector {
    pub fn new(lookback: usize, atr_period: usize) -> Self {
        Self {
            lookback,
            atr_period,
        }
    }

    /// Lowest and highest close over the last `lookback` rows. The earliest
    /// row wins ties. `None` when the window has fewer than 10 rows.
    pub fn detect_floor_ceiling(&self, bars: &[OhlcvBar]) -> Option<PriceLevels> {
        let window = tail(bars, self.lookback);
        if window.len() < MIN_LEVEL_ROWS {
            debug!(rows = window.len(), "not enough rows for floor/ceiling");
            return None;
        }

        let mut floor = &window[0];
        let mut ceiling = &window[0];
        for bar in &window[1..] {
            if bar.close < floor.close {
                floor = bar;
            }
            if bar.close > ceiling.close {
                ceiling = bar;
            }
        }

        let current = window[window.len() - 1].close;

        Some(PriceLevels {
            floor: floor.close,
            floor_date: floor.date,
            ceiling: ceiling.close,
            ceiling_date: ceiling.date,
            current,
        })
    }

    /// ATR aligned one-to-one with `bars`.
    ///
    /// Uses the rolling mean of true range when every bar has a high/low
    /// range, and the rolling sample std-dev of close otherwise (or when the
    /// true-range series has no valid point). Warm-up gaps are filled with
    /// the median of the valid values. Empty input yields `[0.0]`.
    pub fn calculate_atr(&self, bars: &[OhlcvBar], period: usize) -> Vec<f64> {
        if bars.is_empty() {
            return vec![0.0];
        }

        let effective = if bars.len() < period {
            bars.len().max(2)
        } else {
            period
        };

        let series = if bars.iter().all(OhlcvBar::has_range) {
            let tr = true_range_atr(bars, effective);
            if tr.valid_values().is_empty() {
                debug!(period = effective, "true range ATR degenerate, using close std-dev");
                calculate_stddev(bars, effective)
            } else {
                tr
            }
        } else {
            debug!(period = effective, "high/low absent, using close std-dev as ATR");
            calculate_stddev(bars, effective)
        };

        fill_with_median(&series)
    }

    pub fn calculate_volatility_level(&self, bars: &[OhlcvBar]) -> VolatilityInfo {
        if bars.is_empty() {
            return VolatilityInfo::default();
        }

        let atr = self.calculate_atr(bars, self.atr_period);
        let current_atr = atr[atr.len() - 1];
        let recent = &atr[atr.len().saturating_sub(ATR_AVERAGE_WINDOW)..];

        let avg_atr = match mean(recent) {
            Some(avg) if avg.is_finite() && avg > 0.0 => avg,
            _ => {
                debug!("average ATR degenerate, defaulting to MEDIUM volatility");
                return VolatilityInfo::default();
            }
        };

        let atr_ratio = current_atr / avg_atr;
        let level = if atr_ratio < LOW_VOLATILITY_RATIO {
            VolatilityLevel::Low
        } else if atr_ratio > HIGH_VOLATILITY_RATIO {
            VolatilityLevel::High
        } else {
            VolatilityLevel::Medium
        };

        VolatilityInfo {
            level,
            current_atr,
            avg_atr,
            atr_ratio,
            adjustment_factor: level.adjustment_factor(),
        }
    }

    /// Where `price` (the last close when `None`) sits relative to the
    /// detected levels.
    pub fn calculate_position_metrics(
        &self,
        bars: &[OhlcvBar],
        price: Option<f64>,
    ) -> Option<PositionMetrics> {
        let levels = self.detect_floor_ceiling(bars)?;
        Some(position_of(price.unwrap_or(levels.current), &levels))
    }

    pub fn is_at_knee(&self, bars: &[OhlcvBar], threshold: f64, mode: ThresholdMode) -> ZoneStatus {
        self.zone_status(bars, threshold, mode, Zone::Knee)
    }

    pub fn is_at_shoulder(
        &self,
        bars: &[OhlcvBar],
        threshold: f64,
        mode: ThresholdMode,
    ) -> ZoneStatus {
        self.zone_status(bars, threshold, mode, Zone::Shoulder)
    }

    fn zone_status(
        &self,
        bars: &[OhlcvBar],
        threshold: f64,
        mode: ThresholdMode,
        zone: Zone,
    ) -> ZoneStatus {
        let Some(levels) = self.detect_floor_ceiling(bars) else {
            return ZoneStatus::insufficient();
        };
        let metrics = position_of(levels.current, &levels);

        match mode {
            ThresholdMode::Static => static_zone(&metrics, threshold, zone, None),
            ThresholdMode::Dynamic => {
                let volatility = self.calculate_volatility_level(bars);
                if volatility.current_atr > 0.0 {
                    dynamic_zone(&levels, &metrics, &volatility, zone)
                } else {
                    debug!("ATR is zero, knee/shoulder falls back to static band");
                    static_zone(&metrics, threshold, zone, Some(volatility.level))
                }
            }
        }
    }
}

fn position_of(price: f64, levels: &PriceLevels) -> PositionMetrics {
    let from_floor_pct = if levels.floor > 0.0 {
        safe_percentage(price, levels.floor, 0.0)
    } else {
        0.0
    };
    let from_ceiling_pct = if levels.ceiling > 0.0 {
        safe_percentage(price, levels.ceiling, 0.0)
    } else {
        0.0
    };
    let range = levels.ceiling - levels.floor;
    let position_in_range = if range > 0.0 {
        (price - levels.floor) / range
    } else {
        0.5
    };

    PositionMetrics {
        from_floor_pct,
        from_ceiling_pct,
        position_in_range,
    }
}

fn fill_with_median(series: &IndicatorSeries) -> Vec<f64> {
    let fill = median(&series.valid_values()).unwrap_or(0.0);
    series
        .filled(fill)
        .into_iter()
        .map(|v| clip_value(v, 0.0, f64::INFINITY))
        .collect()
}

/// Fixed band of [`STATIC_BAND`] around `threshold`. `volatility` is only
/// echoed in the message (dynamic mode falling back on a zero ATR).
fn static_zone(
    metrics: &PositionMetrics,
    threshold: f64,
    zone: Zone,
    volatility: Option<VolatilityLevel>,
) -> ZoneStatus {
    let suffix = volatility
        .map(|level| format!(", volatility {level}"))
        .unwrap_or_default();
    match zone {
        Zone::Knee => {
            let pct = metrics.from_floor_pct;
            let lower = threshold - STATIC_BAND;
            let upper = threshold + STATIC_BAND;
            let active = (lower..=upper).contains(&pct);
            let label = if active {
                "knee zone"
            } else if pct < lower {
                "near floor"
            } else {
                "above knee"
            };
            ZoneStatus {
                active,
                from_level_pct: Some(pct),
                band: None,
                message: format!("{label} (floor {:+.1}%{suffix})", pct * 100.0),
            }
        }
        Zone::Shoulder => {
            let pct = metrics.from_ceiling_pct;
            let lower = -threshold - STATIC_BAND;
            let upper = -threshold + STATIC_BAND;
            let active = (lower..=upper).contains(&pct);
            let label = if active {
                "shoulder zone"
            } else if pct > upper {
                "near ceiling"
            } else {
                "below shoulder"
            };
            ZoneStatus {
                active,
                from_level_pct: Some(pct),
                band: None,
                message: format!("{label} (ceiling {:+.1}%{suffix})", pct * 100.0),
            }
        }
    }
}

fn dynamic_zone(
    levels: &PriceLevels,
    metrics: &PositionMetrics,
    volatility: &VolatilityInfo,
    zone: Zone,
) -> ZoneStatus {
    let atr = volatility.current_atr;
    let offset = DYNAMIC_ATR_MULTIPLE * atr * volatility.adjustment_factor;
    let price = match zone {
        Zone::Knee => levels.floor + offset,
        Zone::Shoulder => levels.ceiling - offset,
    };
    let band = DynamicBand {
        price,
        lower: price - atr,
        upper: price + atr,
        volatility_level: volatility.level,
        atr,
        adjustment_factor: volatility.adjustment_factor,
    };

    let current = levels.current;
    let active = (band.lower..=band.upper).contains(&current);

    let (label, pct, level_name) = match zone {
        Zone::Knee => {
            let label = if active {
                "knee zone"
            } else if current < band.lower {
                "near floor"
            } else {
                "above knee"
            };
            (label, metrics.from_floor_pct, "floor")
        }
        Zone::Shoulder => {
            let label = if active {
                "shoulder zone"
            } else if current > band.upper {
                "near ceiling"
            } else {
                "below shoulder"
            };
            (label, metrics.from_ceiling_pct, "ceiling")
        }
    };

    ZoneStatus {
        active,
        from_level_pct: Some(pct),
        band: Some(band),
        message: format!(
            "{label} ({level_name} {:+.1}%, volatility {})",
            pct * 100.0,
            volatility.level
        ),
    }
}
