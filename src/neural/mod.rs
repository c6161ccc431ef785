// projeto: pm25forecast
// file: src/neural/mod.rs
// Module declarations for the PM2.5 forecasting pipeline

pub mod utils;    // Error type, Adam optimizer and activations
pub mod data;     // Spreadsheet/CSV loading and sequence windowing
pub mod scaler;   // Min-max normalization
pub mod metrics;  // Training history and evaluation metrics
pub mod model;    // LSTM regressor with backpropagation through time
pub mod forecast; // Autoregressive rollout
pub mod output;   // Dated result and JSON writer

// Re-export commonly used items for convenience
pub use data::{create_sequences, load_time_series, SequenceSet, TimeSeries};
pub use forecast::{forecast, forecast_normalized, SequenceRegressor, MAX_FORECAST_DAYS};
pub use metrics::{EpochMetrics, EvaluationMetrics, MetricsTracker};
pub use model::LstmRegressor;
pub use output::{write_predictions, ForecastResult};
pub use scaler::MinMaxScaler;
pub use utils::{AdamOptimizer, ForecastError};
