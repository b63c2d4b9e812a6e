//! Data access port trait.

use crate::domain::error::SignalError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::signal::MaOverlay;

pub trait DataPort {
    /// Daily bars for `code`, ascending by date.
    fn fetch_ohlcv(&self, code: &str, exchange: &str) -> Result<Vec<OhlcvBar>, SignalError>;

    fn list_symbols(&self, exchange: &str) -> Result<Vec<String>, SignalError>;

    /// Moving averages the source already carries for `code`, aligned with
    /// [`DataPort::fetch_ohlcv`]. `None` when the source has no such columns.
    fn fetch_ma_overlay(
        &self,
        _code: &str,
        _exchange: &str,
        _short_period: usize,
        _long_period: usize,
    ) -> Result<Option<MaOverlay>, SignalError> {
        Ok(None)
    }
}
