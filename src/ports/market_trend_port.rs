//! Market regime port.

use crate::domain::signal::MarketTrend;

/// Supplies the prevailing market trend to the orchestrator. Implementations
/// must be cheap to call and safe to share across batch worker threads.
pub trait MarketTrendProvider: Send + Sync {
    fn market_trend(&self) -> MarketTrend;
}
