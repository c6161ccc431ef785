// projeto: pm25forecast
// file: src/lib.rs
// Pipeline de previsão: planilha → normalização → janelas → LSTM → previsão → JSON

pub mod config;
pub mod neural;

use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::time::Instant;

use crate::config::Config;
use crate::neural::{
    EvaluationMetrics, ForecastError, ForecastResult, LstmRegressor, MinMaxScaler,
    create_sequences, forecast, load_time_series, write_predictions,
};

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct ForecastReport {
    pub result: ForecastResult,
    pub metrics: Option<EvaluationMetrics>,
    pub epochs_run: usize,
    pub output: PathBuf,
}

/// Runs the whole pipeline once. The output file is written only after every
/// other step has succeeded.
pub fn run(config: &Config) -> Result<ForecastReport, ForecastError> {
    config.validate()?;
    let start = Instant::now();
    let params = &config.model;
    let window = params.window_length;

    info!("📂 Carregando dados de: {}", config.paths.input.display());
    let series = load_time_series(&config.paths.input)?;
    if series.len() <= window {
        return Err(ForecastError::InsufficientData {
            required: window + 1,
            actual: series.len(),
        });
    }
    let last_date = series
        .last_date()
        .ok_or(ForecastError::InsufficientData { required: window + 1, actual: 0 })?;
    ForecastResult::check_horizon(last_date, config.output.days)?;

    let scaler = MinMaxScaler::fit(series.values())?;
    info!(
        "📏 Normalização min-max: min={:.2} max={:.2}",
        scaler.min(),
        scaler.max()
    );
    let normalized = scaler.transform_all(series.values());

    let sequences = create_sequences(&normalized, window)?;
    let (train, eval) = sequences.split(params.train_split);
    info!(
        "🔧 {} janelas de {} dias: {} treino, {} avaliação",
        sequences.len(),
        sequences.window_length(),
        train.len(),
        eval.len()
    );

    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let mut model = LstmRegressor::new(params.hidden_size, &mut rng)?;
    info!(
        "🧠 LSTM com {} unidades ocultas ({} parâmetros)",
        model.hidden_size(),
        model.num_parameters()
    );

    let tracker = model.fit(train.inputs.view(), train.targets.view(), params, &mut rng)?;
    tracker.print_summary();

    let metrics = if eval.is_empty() {
        warn!("⚠️ Partição de avaliação vazia; métricas não calculadas");
        None
    } else {
        let predictions = scaler.inverse_all(&model.predict_batch(eval.inputs.view()));
        let targets = scaler.inverse_all(&eval.targets.to_vec());
        let metrics = EvaluationMetrics::compute(&predictions, &targets);
        if let Some(m) = &metrics {
            m.log();
        }
        metrics
    };

    let last_window = scaler.transform_all(series.tail(window));
    let predictions = forecast(&model, &last_window, &scaler, config.output.days)?;
    let result = ForecastResult::from_predictions(last_date, predictions)?;
    for (date, value) in result.dates.iter().zip(&result.predictions) {
        info!("🔮 {} → {:.2} µg/m³", date, value);
    }

    write_predictions(&result, &config.paths.output, config.output.pretty)?;
    info!("✅ Pipeline concluído em {:.2}s", start.elapsed().as_secs_f64());

    Ok(ForecastReport {
        result,
        metrics,
        epochs_run: tracker.epochs_run(),
        output: config.paths.output.clone(),
    })
}
