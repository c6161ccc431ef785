// projeto: pm25forecast
// file: src/neural/data.rs
// Spreadsheet loading, daily series validation and sequence windowing

use calamine::{open_workbook_auto, Data, DataType, Reader};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, Trim};
use log::{debug, info};
use ndarray::{s, Array1, Array2};
use std::fs::File;
use std::path::Path;

use crate::neural::utils::ForecastError;

pub const DATE_COLUMN: &str = "date";
pub const VALUE_COLUMN: &str = "pm25";

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Daily observations, strictly ascending by date.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl TimeSeries {
    /// Sorts the observations chronologically. Duplicate dates and
    /// non-finite values are rejected.
    pub fn from_observations(mut rows: Vec<(NaiveDate, f64)>) -> Result<Self, ForecastError> {
        if let Some((date, value)) = rows.iter().find(|(_, v)| !v.is_finite()) {
            return Err(ForecastError::Format(format!(
                "non-finite pm25 value {} on {}",
                value, date
            )));
        }

        rows.sort_by_key(|(date, _)| *date);

        if let Some(pair) = rows.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(ForecastError::Format(format!(
                "duplicate date {} in input",
                pair[0].0
            )));
        }

        let (dates, values) = rows.into_iter().unzip();
        Ok(TimeSeries { dates, values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    /// The last `n` values, or every value when the series is shorter.
    pub fn tail(&self, n: usize) -> &[f64] {
        &self.values[self.values.len().saturating_sub(n)..]
    }
}

/// Overlapping windows of length W (one per row) and the value that follows each one.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceSet {
    pub inputs: Array2<f64>,
    pub targets: Array1<f64>,
}

impl SequenceSet {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn window_length(&self) -> usize {
        self.inputs.ncols()
    }

    /// Chronological split: the leading `floor(len * ratio)` windows, then the rest.
    pub fn split(&self, ratio: f64) -> (SequenceSet, SequenceSet) {
        let split_index = ((self.len() as f64 * ratio) as usize).min(self.len());
        let head = SequenceSet {
            inputs: self.inputs.slice(s![..split_index, ..]).to_owned(),
            targets: self.targets.slice(s![..split_index]).to_owned(),
        };
        let tail = SequenceSet {
            inputs: self.inputs.slice(s![split_index.., ..]).to_owned(),
            targets: self.targets.slice(s![split_index..]).to_owned(),
        };
        (head, tail)
    }
}

pub fn create_sequences(series: &[f64], window: usize) -> Result<SequenceSet, ForecastError> {
    if window == 0 {
        return Err(ForecastError::Config(
            "window length must be at least 1".to_string(),
        ));
    }
    if series.len() <= window {
        return Err(ForecastError::InsufficientData {
            required: window + 1,
            actual: series.len(),
        });
    }

    let count = series.len() - window;
    let inputs = Array2::from_shape_fn((count, window), |(i, j)| series[i + j]);
    let targets = Array1::from_shape_fn(count, |i| series[i + window]);

    debug!("🔧 [Data] Created {} windows of length {}", count, window);
    Ok(SequenceSet { inputs, targets })
}

/// Reads `date`/`pm25` observations from a CSV file or the first sheet of a workbook.
pub fn load_time_series(path: &Path) -> Result<TimeSeries, ForecastError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    info!("📥 [Data] Loading observations from {}", path.display());
    let rows = match extension.as_str() {
        "csv" => load_csv(path)?,
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => load_spreadsheet(path)?,
        other => {
            return Err(ForecastError::Format(format!(
                "unsupported input extension '{}' for {} (expected csv, xlsx, xls or ods)",
                other,
                path.display()
            )));
        }
    };

    let series = TimeSeries::from_observations(rows)?;
    if let (Some(first), Some(last)) = (series.first_date(), series.last_date()) {
        info!(
            "✅ [Data] Loaded {} daily observations ({} → {})",
            series.len(),
            first,
            last
        );
    }
    Ok(series)
}

pub fn load_csv(path: &Path) -> Result<Vec<(NaiveDate, f64)>, ForecastError> {
    let file = File::open(path).map_err(|e| ForecastError::io(path, e))?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(file);

    let headers = rdr.headers().map_err(|e| csv_error(path, e))?.clone();
    let (date_idx, value_idx) = locate_columns(headers.iter())?;

    let mut rows = Vec::new();
    for (i, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| csv_error(path, e))?;
        let line = i + 2;
        let date_raw = record.get(date_idx).unwrap_or("");
        let value_raw = record.get(value_idx).unwrap_or("");
        if date_raw.is_empty() && value_raw.is_empty() {
            continue;
        }

        let date = parse_date(date_raw).ok_or_else(|| {
            ForecastError::Format(format!("row {}: unparsable date '{}'", line, date_raw))
        })?;
        let value = parse_number(value_raw).ok_or_else(|| {
            ForecastError::Format(format!("row {}: pm25 '{}' is not a number", line, value_raw))
        })?;
        rows.push((date, value));
    }

    debug!("📊 [Data] Read {} CSV rows", rows.len());
    Ok(rows)
}

pub fn load_spreadsheet(path: &Path) -> Result<Vec<(NaiveDate, f64)>, ForecastError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| spreadsheet_error(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| {
            ForecastError::Format(format!("workbook {} has no worksheets", path.display()))
        })?
        .map_err(|e| spreadsheet_error(path, e))?;

    let mut sheet_rows = range.rows();
    let header = sheet_rows.next().ok_or_else(|| ForecastError::Schema {
        missing: vec![DATE_COLUMN.to_string(), VALUE_COLUMN.to_string()],
    })?;
    let (date_idx, value_idx) = locate_columns(header.iter().map(|c| c.to_string()))?;

    let mut rows = Vec::new();
    for (i, cells) in sheet_rows.enumerate() {
        let line = i + 2;
        let date_cell = cells.get(date_idx).unwrap_or(&Data::Empty);
        let value_cell = cells.get(value_idx).unwrap_or(&Data::Empty);
        if date_cell.is_empty() && value_cell.is_empty() {
            continue;
        }

        let date = date_from_cell(date_cell).ok_or_else(|| {
            ForecastError::Format(format!("row {}: unparsable date '{}'", line, date_cell))
        })?;
        let value = number_from_cell(value_cell).ok_or_else(|| {
            ForecastError::Format(format!("row {}: pm25 '{}' is not a number", line, value_cell))
        })?;
        rows.push((date, value));
    }

    debug!("📊 [Data] Read {} spreadsheet rows", rows.len());
    Ok(rows)
}

/// Finds the `date` and `pm25` columns, ignoring case and surrounding whitespace.
fn locate_columns<I, S>(headers: I) -> Result<(usize, usize), ForecastError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let names: Vec<String> = headers
        .into_iter()
        .map(|h| h.as_ref().trim().to_ascii_lowercase())
        .collect();
    let date_idx = names.iter().position(|n| n == DATE_COLUMN);
    let value_idx = names.iter().position(|n| n == VALUE_COLUMN);

    match (date_idx, value_idx) {
        (Some(d), Some(v)) => Ok((d, v)),
        _ => {
            let mut missing = Vec::new();
            if date_idx.is_none() {
                missing.push(DATE_COLUMN.to_string());
            }
            if value_idx.is_none() {
                missing.push(VALUE_COLUMN.to_string());
            }
            Err(ForecastError::Schema { missing })
        }
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime.date());
        }
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.date_naive())
}

pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn date_from_cell(cell: &Data) -> Option<NaiveDate> {
    match cell {
        Data::String(text) | Data::DateTimeIso(text) => parse_date(text),
        Data::Empty => None,
        other => other.as_date(),
    }
}

fn number_from_cell(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(v) => Some(*v).filter(|v| v.is_finite()),
        Data::Int(v) => Some(*v as f64),
        Data::String(text) => parse_number(text),
        _ => None,
    }
}

fn csv_error(path: &Path, err: csv::Error) -> ForecastError {
    let message = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(source) => ForecastError::io(path, source),
        _ => ForecastError::Format(format!("{}: {}", path.display(), message)),
    }
}

fn spreadsheet_error(path: &Path, err: calamine::Error) -> ForecastError {
    match err {
        calamine::Error::Io(source) => ForecastError::io(path, source),
        other => ForecastError::Format(format!("{}: {}", path.display(), other)),
    }
}
