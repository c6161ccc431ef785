// projeto: pm25forecast
// file: src/neural/forecast.rs
// Autoregressive rollout: each prediction is fed back as the newest input

use log::debug;
use std::collections::VecDeque;

use crate::neural::scaler::MinMaxScaler;
use crate::neural::utils::ForecastError;

/// Longest horizon accepted, about ten years of daily steps.
pub const MAX_FORECAST_DAYS: usize = 3650;

/// Anything that maps one normalized window to the next normalized value.
pub trait SequenceRegressor {
    fn predict_one(&self, window: &[f64]) -> f64;
}

/// Rolls the model `days` steps ahead and returns the normalized outputs.
pub fn forecast_normalized<M: SequenceRegressor + ?Sized>(
    model: &M,
    last_window: &[f64],
    days: usize,
) -> Result<Vec<f64>, ForecastError> {
    if days > MAX_FORECAST_DAYS {
        return Err(ForecastError::Config(format!(
            "forecast horizon of {} days exceeds the limit of {}",
            days, MAX_FORECAST_DAYS
        )));
    }

    let mut current: VecDeque<f64> = last_window.iter().copied().collect();
    let mut outputs = Vec::with_capacity(days);

    for step in 1..=days {
        let prediction = model.predict_one(current.make_contiguous());
        if !prediction.is_finite() {
            return Err(ForecastError::Training(format!(
                "non-finite prediction {} at forecast step {}",
                prediction, step
            )));
        }
        debug!("🔮 [Forecast] step {}: {:.6} (normalized)", step, prediction);

        outputs.push(prediction);
        current.pop_front();
        current.push_back(prediction);
    }

    Ok(outputs)
}

/// Rolls the model forward and maps the outputs back to pm25 units.
pub fn forecast<M: SequenceRegressor + ?Sized>(
    model: &M,
    last_window: &[f64],
    scaler: &MinMaxScaler,
    days: usize,
) -> Result<Vec<f64>, ForecastError> {
    let normalized = forecast_normalized(model, last_window, days)?;
    Ok(scaler.inverse_all(&normalized))
}
