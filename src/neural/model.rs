// projeto: pm25forecast
// file: src/neural/model.rs
// Single-layer LSTM regressor (ReLU cell activation) with a dense output unit

use log::{debug, info, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewD, ArrayViewMutD, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand_distr::{Distribution, Normal};

use crate::config::ModelConfig;
use crate::neural::forecast::SequenceRegressor;
use crate::neural::metrics::{EpochMetrics, MetricsTracker};
use crate::neural::utils::{
    clip_global_norm, mse_loss, relu, relu_grad, sigmoid, sigmoid_grad, AdamOptimizer,
    ForecastError,
};

/// Every time step carries a single pm25 reading.
pub const FEATURES: usize = 1;

#[derive(Debug, Clone)]
pub struct LstmLayerWeights {
    pub w_ii: Array2<f64>, // Input gate input weights
    pub w_if: Array2<f64>, // Forget gate input weights
    pub w_ig: Array2<f64>, // Cell gate input weights
    pub w_io: Array2<f64>, // Output gate input weights
    pub w_hi: Array2<f64>, // Input gate hidden weights
    pub w_hf: Array2<f64>, // Forget gate hidden weights
    pub w_hg: Array2<f64>, // Cell gate hidden weights
    pub w_ho: Array2<f64>, // Output gate hidden weights
    pub b_i: Array1<f64>,  // Input gate bias
    pub b_f: Array1<f64>,  // Forget gate bias
    pub b_g: Array1<f64>,  // Cell gate bias
    pub b_o: Array1<f64>,  // Output gate bias
}

#[derive(Debug, Clone)]
pub struct DenseLayerWeights {
    pub w: Array2<f64>, // (1, hidden)
    pub b: Array1<f64>, // (1)
}

/// Parameters of the whole network. Also used as the gradient accumulator.
#[derive(Debug, Clone)]
pub struct ModelWeights {
    pub lstm: LstmLayerWeights,
    pub dense: DenseLayerWeights,
}

impl ModelWeights {
    fn zeros_like(other: &ModelWeights) -> Self {
        let l = &other.lstm;
        ModelWeights {
            lstm: LstmLayerWeights {
                w_ii: Array2::zeros(l.w_ii.raw_dim()),
                w_if: Array2::zeros(l.w_if.raw_dim()),
                w_ig: Array2::zeros(l.w_ig.raw_dim()),
                w_io: Array2::zeros(l.w_io.raw_dim()),
                w_hi: Array2::zeros(l.w_hi.raw_dim()),
                w_hf: Array2::zeros(l.w_hf.raw_dim()),
                w_hg: Array2::zeros(l.w_hg.raw_dim()),
                w_ho: Array2::zeros(l.w_ho.raw_dim()),
                b_i: Array1::zeros(l.b_i.raw_dim()),
                b_f: Array1::zeros(l.b_f.raw_dim()),
                b_g: Array1::zeros(l.b_g.raw_dim()),
                b_o: Array1::zeros(l.b_o.raw_dim()),
            },
            dense: DenseLayerWeights {
                w: Array2::zeros(other.dense.w.raw_dim()),
                b: Array1::zeros(other.dense.b.raw_dim()),
            },
        }
    }

    fn params(&self) -> Vec<(&'static str, ArrayViewD<'_, f64>)> {
        let l = &self.lstm;
        vec![
            ("lstm.w_ii", l.w_ii.view().into_dyn()),
            ("lstm.w_if", l.w_if.view().into_dyn()),
            ("lstm.w_ig", l.w_ig.view().into_dyn()),
            ("lstm.w_io", l.w_io.view().into_dyn()),
            ("lstm.w_hi", l.w_hi.view().into_dyn()),
            ("lstm.w_hf", l.w_hf.view().into_dyn()),
            ("lstm.w_hg", l.w_hg.view().into_dyn()),
            ("lstm.w_ho", l.w_ho.view().into_dyn()),
            ("lstm.b_i", l.b_i.view().into_dyn()),
            ("lstm.b_f", l.b_f.view().into_dyn()),
            ("lstm.b_g", l.b_g.view().into_dyn()),
            ("lstm.b_o", l.b_o.view().into_dyn()),
            ("dense.w", self.dense.w.view().into_dyn()),
            ("dense.b", self.dense.b.view().into_dyn()),
        ]
    }

    fn params_mut(&mut self) -> Vec<(&'static str, ArrayViewMutD<'_, f64>)> {
        let l = &mut self.lstm;
        vec![
            ("lstm.w_ii", l.w_ii.view_mut().into_dyn()),
            ("lstm.w_if", l.w_if.view_mut().into_dyn()),
            ("lstm.w_ig", l.w_ig.view_mut().into_dyn()),
            ("lstm.w_io", l.w_io.view_mut().into_dyn()),
            ("lstm.w_hi", l.w_hi.view_mut().into_dyn()),
            ("lstm.w_hf", l.w_hf.view_mut().into_dyn()),
            ("lstm.w_hg", l.w_hg.view_mut().into_dyn()),
            ("lstm.w_ho", l.w_ho.view_mut().into_dyn()),
            ("lstm.b_i", l.b_i.view_mut().into_dyn()),
            ("lstm.b_f", l.b_f.view_mut().into_dyn()),
            ("lstm.b_g", l.b_g.view_mut().into_dyn()),
            ("lstm.b_o", l.b_o.view_mut().into_dyn()),
            ("dense.w", self.dense.w.view_mut().into_dyn()),
            ("dense.b", self.dense.b.view_mut().into_dyn()),
        ]
    }

    /// Global L2 clipping across every gradient tensor.
    fn clip_by_norm(&mut self, max_norm: f64) -> f64 {
        let mut views: Vec<ArrayViewMutD<'_, f64>> =
            self.params_mut().into_iter().map(|(_, view)| view).collect();
        clip_global_norm(&mut views, max_norm)
    }
}

/// Activations of one time step, kept for backpropagation through time.
struct StepCache {
    x: Array1<f64>,
    h_prev: Array1<f64>,
    c_prev: Array1<f64>,
    i: Array1<f64>,
    f: Array1<f64>,
    z_g: Array1<f64>,
    g: Array1<f64>,
    o: Array1<f64>,
    c: Array1<f64>,
}

struct ForwardPass {
    prediction: f64,
    steps: Vec<StepCache>,
    h_last: Array1<f64>,
}

pub struct LstmRegressor {
    hidden_size: usize,
    weights: ModelWeights,
}

impl LstmRegressor {
    /// Glorot-normal kernels, zero biases except a forget-gate bias of one.
    pub fn new(hidden_size: usize, rng: &mut StdRng) -> Result<Self, ForecastError> {
        if hidden_size == 0 {
            return Err(ForecastError::Config(
                "hidden size must be at least 1".to_string(),
            ));
        }

        let kernel_std = (2.0 / (FEATURES + 4 * hidden_size) as f64).sqrt();
        let recurrent_std = (2.0 / (hidden_size + 4 * hidden_size) as f64).sqrt();
        let dense_std = (2.0 / (hidden_size + 1) as f64).sqrt();
        let normal = |std: f64| {
            Normal::new(0.0, std)
                .map_err(|e| ForecastError::Training(format!("invalid init distribution: {}", e)))
        };
        let kernel = normal(kernel_std)?;
        let recurrent = normal(recurrent_std)?;
        let dense = normal(dense_std)?;

        let mut input_matrix = || Array2::from_shape_fn((hidden_size, FEATURES), |_| kernel.sample(rng));
        let (w_ii, w_if, w_ig, w_io) = (input_matrix(), input_matrix(), input_matrix(), input_matrix());
        let mut hidden_matrix =
            || Array2::from_shape_fn((hidden_size, hidden_size), |_| recurrent.sample(rng));
        let (w_hi, w_hf, w_hg, w_ho) = (hidden_matrix(), hidden_matrix(), hidden_matrix(), hidden_matrix());
        let dense_w = Array2::from_shape_fn((1, hidden_size), |_| dense.sample(rng));

        let model = LstmRegressor {
            hidden_size,
            weights: ModelWeights {
                lstm: LstmLayerWeights {
                    w_ii,
                    w_if,
                    w_ig,
                    w_io,
                    w_hi,
                    w_hf,
                    w_hg,
                    w_ho,
                    b_i: Array1::zeros(hidden_size),
                    b_f: Array1::ones(hidden_size),
                    b_g: Array1::zeros(hidden_size),
                    b_o: Array1::zeros(hidden_size),
                },
                dense: DenseLayerWeights {
                    w: dense_w,
                    b: Array1::zeros(1),
                },
            },
        };

        debug!(
            "🛠️ [Model] LSTM initialized with {} hidden units and {} parameters",
            hidden_size,
            model.num_parameters()
        );
        Ok(model)
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    pub fn num_parameters(&self) -> usize {
        self.weights.params().iter().map(|(_, p)| p.len()).sum()
    }

    fn forward(&self, window: ArrayView1<'_, f64>) -> ForwardPass {
        let l = &self.weights.lstm;
        let mut h = Array1::zeros(self.hidden_size);
        let mut c = Array1::zeros(self.hidden_size);
        let mut steps = Vec::with_capacity(window.len());

        for &value in window.iter() {
            let x = Array1::from_elem(FEATURES, value);

            let i = sigmoid(&(l.w_ii.dot(&x) + l.w_hi.dot(&h) + &l.b_i));
            let f = sigmoid(&(l.w_if.dot(&x) + l.w_hf.dot(&h) + &l.b_f));
            let z_g = l.w_ig.dot(&x) + l.w_hg.dot(&h) + &l.b_g;
            let g = relu(&z_g);
            let o = sigmoid(&(l.w_io.dot(&x) + l.w_ho.dot(&h) + &l.b_o));

            let c_next = &f * &c + &i * &g;
            let h_next = &o * &relu(&c_next);

            steps.push(StepCache {
                x,
                h_prev: h,
                c_prev: c,
                i,
                f,
                z_g,
                g,
                o,
                c: c_next.clone(),
            });
            h = h_next;
            c = c_next;
        }

        let prediction = self.weights.dense.w.dot(&h)[0] + self.weights.dense.b[0];
        ForwardPass {
            prediction,
            steps,
            h_last: h,
        }
    }

    /// Accumulates d(loss)/d(weights) into `grads`, given d(loss)/d(prediction).
    fn backward(&self, pass: &ForwardPass, d_prediction: f64, grads: &mut ModelWeights) {
        let l = &self.weights.lstm;

        grads.dense.w += &(&pass.h_last * d_prediction).insert_axis(Axis(0));
        grads.dense.b[0] += d_prediction;

        let mut dh = self.weights.dense.w.row(0).to_owned() * d_prediction;
        let mut dc_next: Array1<f64> = Array1::zeros(self.hidden_size);

        for step in pass.steps.iter().rev() {
            let dz_o = &dh * &relu(&step.c) * &sigmoid_grad(&step.o);
            let dc = &dh * &step.o * &relu_grad(&step.c) + &dc_next;
            let dz_i = &dc * &step.g * &sigmoid_grad(&step.i);
            let dz_g = &dc * &step.i * &relu_grad(&step.z_g);
            let dz_f = &dc * &step.c_prev * &sigmoid_grad(&step.f);
            dc_next = &dc * &step.f;

            let g = &mut grads.lstm;
            g.w_ii += &outer(&dz_i, &step.x);
            g.w_if += &outer(&dz_f, &step.x);
            g.w_ig += &outer(&dz_g, &step.x);
            g.w_io += &outer(&dz_o, &step.x);
            g.w_hi += &outer(&dz_i, &step.h_prev);
            g.w_hf += &outer(&dz_f, &step.h_prev);
            g.w_hg += &outer(&dz_g, &step.h_prev);
            g.w_ho += &outer(&dz_o, &step.h_prev);
            g.b_i += &dz_i;
            g.b_f += &dz_f;
            g.b_g += &dz_g;
            g.b_o += &dz_o;

            dh = l.w_hi.t().dot(&dz_i)
                + l.w_hf.t().dot(&dz_f)
                + l.w_hg.t().dot(&dz_g)
                + l.w_ho.t().dot(&dz_o);
        }
    }

    /// Mean-squared-error loss and gradient over a batch of window indices.
    fn batch_gradients(
        &self,
        inputs: ArrayView2<'_, f64>,
        targets: ArrayView1<'_, f64>,
        batch: &[usize],
    ) -> (f64, ModelWeights) {
        let mut grads = ModelWeights::zeros_like(&self.weights);
        let scale = 1.0 / batch.len() as f64;
        let mut loss = 0.0;

        for &idx in batch {
            let pass = self.forward(inputs.row(idx));
            let error = pass.prediction - targets[idx];
            loss += error * error;
            self.backward(&pass, 2.0 * error * scale, &mut grads);
        }

        (loss * scale, grads)
    }

    fn apply_gradients(&mut self, grads: &ModelWeights, optimizer: &mut AdamOptimizer) {
        optimizer.begin_step();
        for ((name, param), (_, grad)) in self.weights.params_mut().into_iter().zip(grads.params()) {
            optimizer.update(name, param, grad);
        }
    }

    /// Fits the model on `inputs` (one window per row) against `targets`.
    ///
    /// The trailing `validation_split` share is held out before shuffling and only
    /// reported as `val_loss`. The remaining rows are shuffled every epoch and fed
    /// in mini-batches of `batch_size`; a final short batch is kept.
    pub fn fit(
        &mut self,
        inputs: ArrayView2<'_, f64>,
        targets: ArrayView1<'_, f64>,
        params: &ModelConfig,
        rng: &mut StdRng,
    ) -> Result<MetricsTracker, ForecastError> {
        if inputs.nrows() != targets.len() {
            return Err(ForecastError::Training(format!(
                "{} windows but {} targets",
                inputs.nrows(),
                targets.len()
            )));
        }
        if inputs.nrows() == 0 {
            return Err(ForecastError::Training(
                "training partition is empty".to_string(),
            ));
        }

        let total = inputs.nrows();
        let mut fit_count = (total as f64 * (1.0 - params.validation_split)) as usize;
        if fit_count == 0 {
            warn!(
                "⚠️ [Model] Validation split {:.2} would leave no rows to fit; skipping hold-out",
                params.validation_split
            );
            fit_count = total;
        }
        let val_indices: Vec<usize> = (fit_count..total).collect();
        let mut order: Vec<usize> = (0..fit_count).collect();
        let batch_size = params.batch_size.max(1);
        if fit_count < batch_size {
            warn!(
                "⚠️ [Model] Only {} windows to fit, fewer than one batch of {}; training on a single partial batch",
                fit_count, batch_size
            );
        }

        info!(
            "🎓 [Model] Training on {} windows ({} held out for validation) for {} epochs",
            fit_count,
            val_indices.len(),
            params.epochs
        );

        let mut optimizer = AdamOptimizer::with_learning_rate(params.learning_rate);
        let mut tracker = MetricsTracker::new();

        for epoch in 1..=params.epochs {
            order.shuffle(rng);

            let mut epoch_loss = 0.0;
            for batch in order.chunks(batch_size) {
                let (loss, mut grads) = self.batch_gradients(inputs, targets, batch);
                if let Some(clip) = params.clip_norm {
                    grads.clip_by_norm(clip);
                }
                self.apply_gradients(&grads, &mut optimizer);
                epoch_loss += loss * batch.len() as f64;
            }
            let train_loss = epoch_loss / fit_count as f64;

            if !train_loss.is_finite() {
                return Err(ForecastError::Training(format!(
                    "loss diverged to {} at epoch {}",
                    train_loss, epoch
                )));
            }

            let val_loss = (!val_indices.is_empty()).then(|| {
                let (predictions, expected): (Vec<f64>, Vec<f64>) = val_indices
                    .iter()
                    .map(|&idx| (self.forward(inputs.row(idx)).prediction, targets[idx]))
                    .unzip();
                mse_loss(&predictions, &expected)
            });

            let line = match val_loss {
                Some(v) => format!("Epoch {:3}/{}: loss={:.6} val_loss={:.6}", epoch, params.epochs, train_loss, v),
                None => format!("Epoch {:3}/{}: loss={:.6}", epoch, params.epochs, train_loss),
            };
            if epoch <= 10 || epoch % 5 == 0 {
                info!("📈 [Model] {}", line);
            } else {
                debug!("📈 [Model] {}", line);
            }

            let should_stop = tracker.add_metrics(
                EpochMetrics {
                    epoch,
                    train_loss,
                    val_loss,
                },
                params.patience,
            );
            if should_stop {
                warn!("⏹️ [Model] Early stopping at epoch {}", epoch);
                break;
            }
        }

        Ok(tracker)
    }

    pub fn predict_batch(&self, inputs: ArrayView2<'_, f64>) -> Vec<f64> {
        inputs
            .rows()
            .into_iter()
            .map(|row| self.forward(row).prediction)
            .collect()
    }
}

impl SequenceRegressor for LstmRegressor {
    fn predict_one(&self, window: &[f64]) -> f64 {
        self.forward(ArrayView1::from(window)).prediction
    }
}

fn outer(a: &Array1<f64>, b: &Array1<f64>) -> Array2<f64> {
    a.view()
        .insert_axis(Axis(1))
        .dot(&b.view().insert_axis(Axis(0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn config(epochs: usize) -> ModelConfig {
        ModelConfig {
            epochs,
            seed: Some(7),
            ..ModelConfig::default()
        }
    }

    fn sine_windows(count: usize, window: usize) -> (Array2<f64>, Array1<f64>) {
        let series: Vec<f64> = (0..count + window)
            .map(|t| 0.5 + 0.4 * (t as f64 * 0.6).sin())
            .collect();
        let inputs = Array2::from_shape_fn((count, window), |(i, j)| series[i + j]);
        let targets = Array1::from_shape_fn(count, |i| series[i + window]);
        (inputs, targets)
    }

    #[test]
    fn test_lstm_creation() {
        let mut rng = StdRng::seed_from_u64(1);
        let model = LstmRegressor::new(50, &mut rng).unwrap();
        assert_eq!(model.hidden_size(), 50);
        // 4 gates * (input + recurrent + bias) + dense weights + dense bias
        assert_eq!(model.num_parameters(), 4 * (50 * 1 + 50 * 50 + 50) + 50 + 1);
        assert!(model.weights.lstm.b_f.iter().all(|&b| b == 1.0));
        assert!(LstmRegressor::new(0, &mut rng).is_err());
    }

    #[test]
    fn test_predict_one_is_pure() {
        let mut rng = StdRng::seed_from_u64(3);
        let model = LstmRegressor::new(8, &mut rng).unwrap();
        let window = [0.1, 0.4, 0.3, 0.9, 0.2, 0.5, 0.7];
        let first = model.predict_one(&window);
        let second = model.predict_one(&window);
        assert_eq!(first, second);
        assert!(first.is_finite());
    }

    #[test]
    fn test_gradients_match_finite_differences() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut model = LstmRegressor::new(4, &mut rng).unwrap();
        // keep every ReLU away from its kink so the derivative is well defined
        model.weights.lstm.b_g.fill(0.3);
        let (inputs, targets) = sine_windows(3, 5);
        let batch = [0usize, 1, 2];

        let (_, grads) = model.batch_gradients(inputs.view(), targets.view(), &batch);
        let eps = 1e-6;

        let probes: Vec<(&'static str, usize)> = vec![
            ("lstm.w_ii", 1),
            ("lstm.w_hf", 5),
            ("lstm.w_hg", 2),
            ("lstm.b_o", 3),
            ("lstm.b_i", 0),
            ("dense.w", 2),
            ("dense.b", 0),
        ];
        for (name, flat_idx) in probes {
            let analytic = grads
                .params()
                .into_iter()
                .find(|(n, _)| *n == name)
                .map(|(_, g)| g.iter().nth(flat_idx).copied().unwrap())
                .unwrap();

            let mut loss_at = |delta: f64| {
                for (n, mut p) in model.weights.params_mut() {
                    if n == name {
                        *p.iter_mut().nth(flat_idx).unwrap() += delta;
                    }
                }
                let (loss, _) = model.batch_gradients(inputs.view(), targets.view(), &batch);
                for (n, mut p) in model.weights.params_mut() {
                    if n == name {
                        *p.iter_mut().nth(flat_idx).unwrap() -= delta;
                    }
                }
                loss
            };
            let numeric = (loss_at(eps) - loss_at(-eps)) / (2.0 * eps);

            let tolerance = 1e-5 + 1e-3 * numeric.abs().max(analytic.abs());
            assert!(
                (numeric - analytic).abs() < tolerance,
                "{}[{}]: numeric {} vs analytic {}",
                name,
                flat_idx,
                numeric,
                analytic
            );
        }
    }

    #[test]
    fn test_fit_reduces_training_loss() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut model = LstmRegressor::new(16, &mut rng).unwrap();
        let (inputs, targets) = sine_windows(40, 7);

        let params = ModelConfig {
            learning_rate: 0.01,
            ..config(30)
        };
        let tracker = model
            .fit(inputs.view(), targets.view(), &params, &mut rng)
            .unwrap();
        assert_eq!(tracker.epochs_run(), 30);
        let first = tracker.history.first().unwrap().train_loss;
        let last = tracker.history.last().unwrap().train_loss;
        assert!(last < first, "loss went from {} to {}", first, last);
        assert!(tracker.history.iter().all(|m| m.val_loss.is_some()));
    }

    #[test]
    fn test_fit_with_partial_batch_and_tiny_partition() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut model = LstmRegressor::new(8, &mut rng).unwrap();
        let (inputs, targets) = sine_windows(1, 7);

        let tracker = model
            .fit(inputs.view(), targets.view(), &config(3), &mut rng)
            .unwrap();
        assert_eq!(tracker.epochs_run(), 3);
        assert!(tracker.history.iter().all(|m| m.val_loss.is_none()));
    }

    #[test]
    fn test_fit_rejects_empty_or_mismatched_partitions() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut model = LstmRegressor::new(4, &mut rng).unwrap();
        let empty_inputs = Array2::<f64>::zeros((0, 7));
        let empty_targets = Array1::<f64>::zeros(0);
        assert!(matches!(
            model.fit(empty_inputs.view(), empty_targets.view(), &config(1), &mut rng),
            Err(ForecastError::Training(_))
        ));

        let (inputs, _) = sine_windows(4, 7);
        let targets = Array1::<f64>::zeros(3);
        assert!(matches!(
            model.fit(inputs.view(), targets.view(), &config(1), &mut rng),
            Err(ForecastError::Training(_))
        ));
    }

    #[test]
    fn test_predict_batch_matches_predict_one() {
        let mut rng = StdRng::seed_from_u64(4);
        let model = LstmRegressor::new(6, &mut rng).unwrap();
        let (inputs, _) = sine_windows(3, 7);
        let batch = model.predict_batch(inputs.view());
        for (i, row) in inputs.rows().into_iter().enumerate() {
            assert_eq!(batch[i], model.predict_one(row.as_slice().unwrap()));
        }
    }
}
