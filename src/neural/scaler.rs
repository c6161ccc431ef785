// projeto: pm25forecast
// file: src/neural/scaler.rs
// Min-max scaling fit once on the full history

use serde::{Deserialize, Serialize};

use crate::neural::utils::ForecastError;

/// Fitted min-max state. Built once per run and passed by reference to the
/// windowing, training, evaluation and rollout stages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: f64,
    max: f64,
}

impl MinMaxScaler {
    pub fn fit(values: &[f64]) -> Result<Self, ForecastError> {
        if values.is_empty() {
            return Err(ForecastError::InsufficientData {
                required: 1,
                actual: 0,
            });
        }

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        if !min.is_finite() || !max.is_finite() {
            return Err(ForecastError::Format(
                "series contains non-finite values".to_string(),
            ));
        }
        if max <= min {
            return Err(ForecastError::DegenerateRange { value: min });
        }

        Ok(MinMaxScaler { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    fn range(&self) -> f64 {
        self.max - self.min
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.min) / self.range()
    }

    pub fn inverse(&self, scaled: f64) -> f64 {
        scaled * self.range() + self.min
    }

    pub fn transform_all(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.transform(v)).collect()
    }

    pub fn inverse_all(&self, scaled: &[f64]) -> Vec<f64> {
        scaled.iter().map(|&s| self.inverse(s)).collect()
    }
}
