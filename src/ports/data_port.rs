//! Market data port trait.

use chrono::NaiveDateTime;

use crate::domain::error::EngineError;
use crate::domain::indicator_row::IndicatorRow;

pub trait DataPort {
    /// Indicator rows within `[start, end]` (either bound optional), in
    /// strictly increasing timestamp order.
    fn fetch_rows(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<IndicatorRow>, EngineError>;
}
