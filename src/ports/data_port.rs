//! Market data access port trait.

use chrono::NaiveDateTime;

use crate::domain::error::AetherError;
use crate::domain::ohlcv::PriceSeries;

pub trait DataPort {
    /// Bars for `symbol` with timestamps inside `[start, end]`; open bounds are unlimited.
    fn fetch_series(
        &self,
        symbol: &str,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<PriceSeries, AetherError>;

    fn list_symbols(&self) -> Result<Vec<String>, AetherError>;

    /// First timestamp, last timestamp and bar count, or `None` if the symbol has no bars.
    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime, usize)>, AetherError> {
        match self.fetch_series(symbol, None, None) {
            Ok(series) => Ok(series
                .first_timestamp()
                .zip(series.last_timestamp())
                .map(|(first, last)| (first, last, series.len()))),
            Err(AetherError::NoData { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
