//! Core domain types and logic: price levels, signal scoring and the
//! per-symbol decision.

pub mod analyzer;
pub mod buy_signals;
pub mod error;
pub mod indicator;
pub mod momentum;
pub mod numeric;
pub mod ohlcv;
pub mod price_levels;
pub mod recommendation;
pub mod sell_signals;
pub mod settings;
pub mod signal;
