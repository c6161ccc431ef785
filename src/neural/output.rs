// projeto: pm25forecast
// file: src/neural/output.rs
// Dated forecast result and its JSON file

use chrono::{Days, NaiveDate};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::neural::utils::ForecastError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub dates: Vec<NaiveDate>,
    pub predictions: Vec<f64>,
}

impl ForecastResult {
    /// Pairs prediction `k` (1-based) with `last_date + k` days.
    pub fn from_predictions(
        last_date: NaiveDate,
        predictions: Vec<f64>,
    ) -> Result<Self, ForecastError> {
        let dates = (1..=predictions.len() as u64)
            .map(|k| {
                last_date.checked_add_days(Days::new(k)).ok_or_else(|| {
                    ForecastError::Format(format!(
                        "forecast date {} days after {} is out of range",
                        k, last_date
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ForecastResult { dates, predictions })
    }

    /// Fails with `Format` when `last_date + days` is not a representable date.
    pub fn check_horizon(last_date: NaiveDate, days: usize) -> Result<NaiveDate, ForecastError> {
        last_date
            .checked_add_days(Days::new(days as u64))
            .ok_or_else(|| {
                ForecastError::Format(format!(
                    "a {}-day forecast after {} is past the last representable date",
                    days, last_date
                ))
            })
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }
}

/// Creates or truncates `path`. Parent directories must already exist.
pub fn write_predictions(
    result: &ForecastResult,
    path: &Path,
    pretty: bool,
) -> Result<(), ForecastError> {
    let file = File::create(path).map_err(|e| ForecastError::io(path, e))?;
    let mut writer = BufWriter::new(file);

    if pretty {
        serde_json::to_writer_pretty(&mut writer, result)?;
    } else {
        serde_json::to_writer(&mut writer, result)?;
    }
    writer.flush().map_err(|e| ForecastError::io(path, e))?;

    info!(
        "💾 [Output] {} predictions written to {}",
        result.len(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::TempDir;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_dates_follow_last_observation() {
        let result = ForecastResult::from_predictions(day(2023, 12, 30), vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(
            result.dates,
            vec![day(2023, 12, 31), day(2024, 1, 1), day(2024, 1, 2)]
        );
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_empty_forecast_has_no_dates() {
        let result = ForecastResult::from_predictions(day(2024, 2, 28), Vec::new()).unwrap();
        assert!(result.is_empty());
        assert!(result.dates.is_empty());
    }

    #[test]
    fn test_date_overflow_is_format_error() {
        let err = ForecastResult::from_predictions(NaiveDate::MAX, vec![1.0]).unwrap_err();
        assert!(matches!(err, ForecastError::Format(_)));
    }

    #[test]
    fn test_horizon_check_runs_without_predictions() {
        assert_eq!(
            ForecastResult::check_horizon(day(2023, 1, 10), 2).unwrap(),
            day(2023, 1, 12)
        );
        assert_eq!(ForecastResult::check_horizon(NaiveDate::MAX, 0).unwrap(), NaiveDate::MAX);
        assert!(matches!(
            ForecastResult::check_horizon(NaiveDate::MAX, 1),
            Err(ForecastError::Format(_))
        ));
    }

    #[test]
    fn test_json_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("predictions.json");
        let result = ForecastResult::from_predictions(day(2024, 2, 28), vec![80.5, 91.25]).unwrap();

        write_predictions(&result, &path, false).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            r#"{"dates":["2024-02-29","2024-03-01"],"predictions":[80.5,91.25]}"#
        );
    }

    #[test]
    fn test_pretty_output_parses_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("predictions.json");
        std::fs::write(&path, "stale contents that are longer than the new file would be").unwrap();

        let result = ForecastResult::from_predictions(day(2023, 1, 1), vec![42.0]).unwrap();
        write_predictions(&result, &path, true).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains('\n'));
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["dates"][0], "2023-01-02");
        assert_eq!(value["predictions"][0], 42.0);
    }

    #[test]
    fn test_missing_directory_is_io_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("predictions.json");
        let result = ForecastResult::from_predictions(day(2023, 1, 1), vec![1.0]).unwrap();

        let err = write_predictions(&result, &path, false).unwrap_err();
        match err {
            ForecastError::Io { path: failed, .. } => assert_eq!(failed, path),
            other => panic!("expected Io error, got {:?}", other),
        }
        assert!(!dir.path().join("missing").exists());
    }
}
