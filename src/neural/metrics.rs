// projeto: pm25forecast
// file: src/neural/metrics.rs
// Training history and hold-out evaluation metrics

use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct MetricsTracker {
    pub history: Vec<EpochMetrics>,
    pub best_val_loss: Option<f64>,
    pub best_epoch: usize,
    pub patience_counter: usize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an epoch and returns true once `patience` epochs have passed
    /// without a better validation loss. Without validation data or patience
    /// it never asks to stop.
    pub fn add_metrics(&mut self, metrics: EpochMetrics, patience: Option<usize>) -> bool {
        if let Some(val_loss) = metrics.val_loss {
            let improved = self.best_val_loss.is_none_or(|best| val_loss < best);
            if improved {
                self.best_val_loss = Some(val_loss);
                self.best_epoch = metrics.epoch;
                self.patience_counter = 0;
            } else {
                self.patience_counter += 1;
            }
        }
        self.history.push(metrics);

        match patience {
            Some(limit) => self.best_val_loss.is_some() && self.patience_counter >= limit,
            None => false,
        }
    }

    pub fn epochs_run(&self) -> usize {
        self.history.len()
    }

    pub fn get_latest_metrics(&self) -> Option<&EpochMetrics> {
        self.history.last()
    }

    pub fn print_summary(&self) {
        let Some(last) = self.get_latest_metrics() else {
            return;
        };
        info!("📈 [Metrics] Training summary:");
        info!("   ├── Epochs run: {}", self.epochs_run());
        info!("   ├── Final train loss: {:.6}", last.train_loss);
        match self.best_val_loss {
            Some(best) => info!("   └── Best val loss: {:.6} (epoch {})", best, self.best_epoch),
            None => info!("   └── No validation hold-out"),
        }
    }
}

/// Errors of the evaluation partition, measured in the original pm25 units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub samples: usize,
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    /// Percentage; observations equal to zero are skipped.
    pub mape: Option<f64>,
}

impl EvaluationMetrics {
    pub fn compute(predictions: &[f64], targets: &[f64]) -> Option<Self> {
        if predictions.is_empty() || predictions.len() != targets.len() {
            return None;
        }
        let n = predictions.len() as f64;

        let mse = predictions
            .iter()
            .zip(targets)
            .map(|(p, t)| (p - t).powi(2))
            .sum::<f64>()
            / n;
        let mae = predictions
            .iter()
            .zip(targets)
            .map(|(p, t)| (p - t).abs())
            .sum::<f64>()
            / n;

        let ratios: Vec<f64> = predictions
            .iter()
            .zip(targets)
            .filter(|(_, t)| **t != 0.0)
            .map(|(p, t)| ((p - t) / t).abs())
            .collect();
        let mape = (!ratios.is_empty())
            .then(|| ratios.iter().sum::<f64>() / ratios.len() as f64 * 100.0);

        Some(EvaluationMetrics {
            samples: predictions.len(),
            mse,
            rmse: mse.sqrt(),
            mae,
            mape,
        })
    }

    pub fn log(&self) {
        info!("🔍 [Metrics] Evaluation on {} held-out windows:", self.samples);
        info!("   ├── MSE: {:.4}", self.mse);
        info!("   ├── RMSE: {:.4}", self.rmse);
        info!("   ├── MAE: {:.4}", self.mae);
        match self.mape {
            Some(mape) => info!("   └── MAPE: {:.2}%", mape),
            None => info!("   └── MAPE: n/a"),
        }
    }
}
