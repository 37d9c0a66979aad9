//! CSV file data adapter.
//!
//! One file per instrument and timeframe. The header names the columns of
//! [`IndicatorRow`]; indicator columns may be absent or blank.

use chrono::NaiveDateTime;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::domain::error::EngineError;
use crate::domain::indicator_row::IndicatorRow;
use crate::ports::data_port::DataPort;

pub struct CsvAdapter {
    path: PathBuf,
}

impl CsvAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl DataPort for CsvAdapter {
    fn fetch_rows(
        &self,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Vec<IndicatorRow>, EngineError> {
        let mut rdr = csv::Reader::from_path(&self.path).map_err(|e| EngineError::Data {
            reason: format!("failed to read {}: {}", self.path.display(), e),
        })?;

        let mut rows: Vec<IndicatorRow> = Vec::new();
        // Ordering is checked over every row in the file, filtered or not.
        let mut last_seen: Option<NaiveDateTime> = None;
        for (line, result) in rdr.deserialize::<IndicatorRow>().enumerate() {
            // Header is line 1.
            let row = result.map_err(|e| EngineError::Data {
                reason: format!("{} line {}: {}", self.path.display(), line + 2, e),
            })?;

            if let Some(prev) = last_seen {
                if row.timestamp <= prev {
                    return Err(EngineError::Data {
                        reason: format!(
                            "{} line {}: timestamp {} does not follow {}",
                            self.path.display(),
                            line + 2,
                            row.timestamp,
                            prev
                        ),
                    });
                }
            }
            last_seen = Some(row.timestamp);

            if start.is_some_and(|s| row.timestamp < s) || end.is_some_and(|e| row.timestamp > e) {
                debug!(timestamp = %row.timestamp, "row outside requested range");
                continue;
            }
            rows.push(row);
        }

        info!(path = %self.path.display(), rows = rows.len(), "loaded indicator rows");
        Ok(rows)
    }
}
