//! CSV file data adapter.
//!
//! Reads `<CODE>_<EXCHANGE>.csv` files with the columns
//! `date,open,high,low,close,volume`. Empty high/low cells load as NaN so the
//! engine treats the bar as having no intraday range. Optional `MA<n>`
//! columns (for example `MA20`, `MA60`) are exposed as a moving-average
//! overlay.

use crate::domain::error::SignalError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::signal::MaOverlay;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, code: &str, exchange: &str) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", code, exchange))
    }

    fn read_file(&self, code: &str, exchange: &str) -> Result<String, SignalError> {
        let path = self.csv_path(code, exchange);
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => SignalError::NoData {
                code: code.to_string(),
            },
            _ => data_error(format!("failed to read {}: {}", path.display(), e)),
        })
    }
}

fn data_error(reason: String) -> SignalError {
    SignalError::DataSource { reason }
}

fn parse_field(record: &csv::StringRecord, index: usize, name: &str) -> Result<f64, SignalError> {
    record
        .get(index)
        .ok_or_else(|| data_error(format!("missing {} column", name)))?
        .trim()
        .parse()
        .map_err(|e| data_error(format!("invalid {} value: {}", name, e)))
}

fn parse_date(record: &csv::StringRecord) -> Result<NaiveDate, SignalError> {
    let date_str = record
        .get(0)
        .ok_or_else(|| data_error("missing date column".into()))?;
    NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
        .map_err(|e| data_error(format!("invalid date format: {}", e)))
}

fn column_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

fn parse_optional_field(
    record: &csv::StringRecord,
    index: usize,
    name: &str,
) -> Result<f64, SignalError> {
    match record.get(index).map(str::trim) {
        None | Some("") => Ok(f64::NAN),
        Some(value) => value
            .parse()
            .map_err(|e| data_error(format!("invalid {} value: {}", name, e))),
    }
}

impl DataPort for CsvAdapter {
    fn fetch_ohlcv(&self, code: &str, exchange: &str) -> Result<Vec<OhlcvBar>, SignalError> {
        let content = self.read_file(code, exchange)?;

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.records() {
            let record = result.map_err(|e| data_error(format!("CSV parse error: {}", e)))?;

            let date = parse_date(&record)?;

            let close = parse_field(&record, 4, "close")?;
            let open = match record.get(1).map(str::trim) {
                None | Some("") => close,
                Some(_) => parse_field(&record, 1, "open")?,
            };

            bars.push(OhlcvBar {
                date,
                open,
                high: parse_optional_field(&record, 2, "high")?,
                low: parse_optional_field(&record, 3, "low")?,
                close,
                volume: parse_field(&record, 5, "volume")?,
            });
        }

        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    fn list_symbols(&self, exchange: &str) -> Result<Vec<String>, SignalError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            data_error(format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ))
        })?;

        let suffix = format!("_{}.csv", exchange);
        let mut symbols = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| data_error(format!("directory entry error: {}", e)))?;

            let name = entry.file_name();
            let name_str = name.to_string_lossy();

            if let Some(code) = name_str.strip_suffix(&suffix) {
                symbols.push(code.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn fetch_ma_overlay(
        &self,
        code: &str,
        exchange: &str,
        short_period: usize,
        long_period: usize,
    ) -> Result<Option<MaOverlay>, SignalError> {
        let content = self.read_file(code, exchange)?;
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| data_error(format!("CSV header error: {}", e)))?
            .clone();

        let short_name = format!("ma{}", short_period);
        let long_name = format!("ma{}", long_period);
        let (Some(short_idx), Some(long_idx)) = (
            column_index(&headers, &short_name),
            column_index(&headers, &long_name),
        ) else {
            return Ok(None);
        };

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| data_error(format!("CSV parse error: {}", e)))?;
            let short = parse_optional_field(&record, short_idx, &short_name)?;
            let long = parse_optional_field(&record, long_idx, &long_name)?;
            rows.push((
                parse_date(&record)?,
                Some(short).filter(|v| v.is_finite()),
                Some(long).filter(|v| v.is_finite()),
            ));
        }

        rows.sort_by_key(|r| r.0);
        let (short, long) = rows.into_iter().map(|(_, s, l)| (s, l)).unzip();
        Ok(Some(MaOverlay::new(short, long)))
    }
}
