// projeto: pm25forecast
// file: src/main.rs
// Ponto de entrada: previsão diária de PM2.5 a partir de planilha

use clap::Parser;
use log::{error, info};
use std::path::PathBuf;

use pm25forecast::config::Config;
use pm25forecast::neural::ForecastError;
use pm25forecast::run;

#[derive(Parser, Debug)]
#[command(
    name = "pm25-forecast",
    author = "Júnior NSF",
    version,
    about = "Previsão diária de PM2.5 com LSTM",
    long_about = "Lê observações diárias de PM2.5 de uma planilha, treina uma LSTM de uma camada e grava a previsão dos próximos dias em JSON."
)]
struct Cli {
    /// Planilha de entrada (.xlsx, .xls, .ods ou .csv) com colunas date e pm25
    #[arg(long)]
    input: Option<PathBuf>,

    /// Arquivo JSON de saída
    #[arg(long)]
    output: Option<PathBuf>,

    /// Número de dias a prever
    #[arg(long)]
    days: Option<usize>,

    /// Número de épocas de treinamento
    #[arg(long)]
    epochs: Option<usize>,

    /// Comprimento da janela (dias de histórico por previsão)
    #[arg(long)]
    window: Option<usize>,

    /// Semente para inicialização e embaralhamento reprodutíveis
    #[arg(long)]
    seed: Option<u64>,

    /// Arquivo de configuração TOML
    #[arg(long)]
    config: Option<PathBuf>,

    /// Gravar JSON indentado
    #[arg(long)]
    pretty: bool,

    /// Modo verboso de logging
    #[arg(long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(input) = &self.input {
            config.paths.input = input.clone();
        }
        if let Some(output) = &self.output {
            config.paths.output = output.clone();
        }
        if let Some(days) = self.days {
            config.output.days = days;
        }
        if let Some(epochs) = self.epochs {
            config.model.epochs = epochs;
        }
        if let Some(window) = self.window {
            config.model.window_length = window;
        }
        if let Some(seed) = self.seed {
            config.model.seed = Some(seed);
        }
        if self.pretty {
            config.output.pretty = true;
        }
    }
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    info!("🚀 Previsão de PM2.5 iniciada");

    let outcome = Config::load(cli.config.as_deref()).and_then(|mut config| {
        cli.apply(&mut config);
        run(&config)
    });

    match outcome {
        Ok(report) => {
            info!(
                "🏁 {} dias previstos em {} ({} épocas)",
                report.result.len(),
                report.output.display(),
                report.epochs_run
            );
        }
        Err(e) => {
            report_error(&e);
            std::process::exit(e.exit_code());
        }
    }
}

fn report_error(e: &ForecastError) {
    error!("❌ {}", e);
    error!("💡 {}", e.hint());
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp_secs()
        .init();
}
