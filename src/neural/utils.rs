// projeto: pm25forecast
// file: src/neural/utils.rs
// Error type, Adam optimizer and activation helpers shared by the neural modules

use ndarray::{Array1, ArrayD, ArrayViewD, ArrayViewMutD, ShapeError, Zip};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Missing required column(s): {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("Format error: {0}")]
    Format(String),

    #[error("Insufficient data: need at least {required} observations, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Degenerate range: every observation equals {value}, min-max scaling is undefined")]
    DegenerateRange { value: f64 },

    #[error("Training error: {0}")]
    Training(String),

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ForecastError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ForecastError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit status for this error kind. Zero is reserved for success.
    pub fn exit_code(&self) -> i32 {
        match self {
            ForecastError::Config(_) => 2,
            ForecastError::Schema { .. } => 3,
            ForecastError::Format(_) => 4,
            ForecastError::InsufficientData { .. } => 5,
            ForecastError::DegenerateRange { .. } => 6,
            ForecastError::Training(_) => 7,
            ForecastError::Io { .. } => 8,
            ForecastError::Serialization(_) => 9,
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            ForecastError::Config(_) => {
                "check the TOML configuration file and the command-line overrides"
            }
            ForecastError::Schema { .. } => {
                "the first sheet must have a header row with 'date' and 'pm25' columns"
            }
            ForecastError::Format(_) => {
                "dates must look like 2023-01-01 and pm25 must be numeric, one row per day"
            }
            ForecastError::InsufficientData { .. } => {
                "provide more daily observations than the window length"
            }
            ForecastError::DegenerateRange { .. } => {
                "the pm25 column must contain at least two distinct values"
            }
            ForecastError::Training(_) => {
                "try a smaller learning rate, a clip norm or more data"
            }
            ForecastError::Io { .. } => {
                "make sure the input file exists and the output directory is writable"
            }
            ForecastError::Serialization(_) => "the forecast could not be encoded as JSON",
        }
    }
}

impl From<ShapeError> for ForecastError {
    fn from(err: ShapeError) -> Self {
        ForecastError::Training(format!("shape error: {}", err))
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::Serialization(err.to_string())
    }
}

/// Adam with one bias-correction step per mini-batch. Moments are keyed by
/// parameter name so layers can be updated one tensor at a time.
#[derive(Debug, Clone)]
pub struct AdamOptimizer {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub t: i32,
    m: HashMap<&'static str, ArrayD<f64>>,
    v: HashMap<&'static str, ArrayD<f64>>,
}

impl AdamOptimizer {
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        AdamOptimizer {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: HashMap::new(),
            v: HashMap::new(),
        }
    }

    /// β1 = 0.9, β2 = 0.999, ε = 1e-7.
    pub fn with_learning_rate(learning_rate: f64) -> Self {
        Self::new(learning_rate, 0.9, 0.999, 1e-7)
    }

    pub fn begin_step(&mut self) {
        self.t += 1;
    }

    pub fn update(
        &mut self,
        param_name: &'static str,
        mut param: ArrayViewMutD<'_, f64>,
        gradient: ArrayViewD<'_, f64>,
    ) {
        let (lr, beta1, beta2, epsilon) =
            (self.learning_rate, self.beta1, self.beta2, self.epsilon);
        let t = self.t.max(1);
        let correction1 = 1.0 - beta1.powi(t);
        let correction2 = 1.0 - beta2.powi(t);

        let m = self
            .m
            .entry(param_name)
            .or_insert_with(|| ArrayD::zeros(gradient.raw_dim()));
        let v = self
            .v
            .entry(param_name)
            .or_insert_with(|| ArrayD::zeros(gradient.raw_dim()));

        Zip::from(&mut param)
            .and(&gradient)
            .and(m)
            .and(v)
            .for_each(|p, &g, m, v| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / correction1;
                let v_hat = *v / correction2;
                *p -= lr * m_hat / (v_hat.sqrt() + epsilon);
            });
    }

}

pub fn sigmoid(x: &Array1<f64>) -> Array1<f64> {
    x.mapv(sigmoid_scalar)
}

pub fn relu(x: &Array1<f64>) -> Array1<f64> {
    x.mapv(|val| val.max(0.0))
}

/// Derivative of the sigmoid expressed through its output `s`.
pub fn sigmoid_grad(s: &Array1<f64>) -> Array1<f64> {
    s.mapv(|val| val * (1.0 - val))
}

/// Derivative of ReLU evaluated at the pre-activation `z`.
pub fn relu_grad(z: &Array1<f64>) -> Array1<f64> {
    z.mapv(|val| if val > 0.0 { 1.0 } else { 0.0 })
}

pub fn sigmoid_scalar(x: f64) -> f64 {
    if x > 500.0 {
        1.0
    } else if x < -500.0 {
        0.0
    } else {
        1.0 / (1.0 + (-x).exp())
    }
}

/// Lengths must match; callers build both slices from the same rows.
pub fn mse_loss(predictions: &[f64], targets: &[f64]) -> f64 {
    debug_assert_eq!(predictions.len(), targets.len());
    let n = predictions.len() as f64;
    predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (p - t).powi(2))
        .sum::<f64>()
        / n
}

/// Scales every tensor by the same factor when their joint L2 norm exceeds
/// `max_norm`. Returns the norm before clipping.
pub fn clip_global_norm(gradients: &mut [ArrayViewMutD<'_, f64>], max_norm: f64) -> f64 {
    let norm = gradients
        .iter()
        .map(|g| g.iter().map(|x| x * x).sum::<f64>())
        .sum::<f64>()
        .sqrt();
    if norm > max_norm && norm > 0.0 {
        let scale = max_norm / norm;
        for g in gradients.iter_mut() {
            g.mapv_inplace(|x| x * scale);
        }
    }
    norm
}
