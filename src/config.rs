// projeto: pm25forecast
// file: src/config.rs
// Módulo de configuração: caminhos, hiperparâmetros e saída

use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::neural::{ForecastError, MAX_FORECAST_DAYS};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub model: ModelConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub input: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub window_length: usize,
    pub hidden_size: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub train_split: f64,
    pub validation_split: f64,
    pub clip_norm: Option<f64>,
    pub patience: Option<usize>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub days: usize,
    pub pretty: bool,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("public/dhaka-air-quality.xlsx"),
            output: PathBuf::from("public/predictions.json"),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            window_length: 7,
            hidden_size: 50,
            epochs: 50,
            batch_size: 32,
            learning_rate: 0.001,
            train_split: 0.8,
            validation_split: 0.1,
            clip_norm: Some(1.0),
            patience: None,
            seed: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            days: 7,
            pretty: false,
        }
    }
}

impl Config {
    /// Reads a TOML file when a path is given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ForecastError> {
        let Some(path) = path else {
            return Ok(Config::default());
        };

        let content = fs::read_to_string(path).map_err(|e| {
            ForecastError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content).map_err(|e| {
            ForecastError::Config(format!("cannot parse {}: {}", path.display(), e))
        })?;

        info!("⚙️ Configuração carregada de: {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ForecastError> {
        let m = &self.model;

        if m.window_length == 0 {
            return Err(invalid("window_length must be at least 1"));
        }
        if m.hidden_size == 0 {
            return Err(invalid("hidden_size must be at least 1"));
        }
        if m.epochs == 0 {
            return Err(invalid("epochs must be at least 1"));
        }
        if m.batch_size == 0 {
            return Err(invalid("batch_size must be at least 1"));
        }
        if !(m.learning_rate.is_finite() && m.learning_rate > 0.0) {
            return Err(invalid("learning_rate must be a positive number"));
        }
        if !(m.train_split > 0.0 && m.train_split <= 1.0) {
            return Err(invalid("train_split must be in (0, 1]"));
        }
        if !(m.validation_split >= 0.0 && m.validation_split < 1.0) {
            return Err(invalid("validation_split must be in [0, 1)"));
        }
        if let Some(clip) = m.clip_norm {
            if !(clip.is_finite() && clip > 0.0) {
                return Err(invalid("clip_norm must be positive when set"));
            }
        }
        if self.output.days > MAX_FORECAST_DAYS {
            return Err(ForecastError::Config(format!(
                "days must be at most {}, got {}",
                MAX_FORECAST_DAYS, self.output.days
            )));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> ForecastError {
    ForecastError::Config(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model.window_length, 7);
        assert_eq!(config.output.days, 7);
        assert_eq!(config.paths.output, PathBuf::from("public/predictions.json"));
    }

    #[test]
    fn test_load_without_path_returns_defaults() {
        assert_eq!(Config::load(None).unwrap(), Config::default());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[model]\nepochs = 5\nseed = 42\n\n[output]\ndays = 3\npretty = true\n",
        )
        .unwrap();

        let config = Config::load(Some(path.as_path())).unwrap();
        assert_eq!(config.model.epochs, 5);
        assert_eq!(config.model.seed, Some(42));
        assert_eq!(config.model.hidden_size, 50);
        assert_eq!(config.output.days, 3);
        assert!(config.output.pretty);
        assert_eq!(config.paths, PathsConfig::default());
    }

    #[test]
    fn test_missing_or_broken_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Config::load(Some(missing.as_path())),
            Err(ForecastError::Config(_))
        ));

        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "[model\nepochs = ").unwrap();
        assert!(matches!(
            Config::load(Some(broken.as_path())),
            Err(ForecastError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        let cases: Vec<fn(&mut Config)> = vec![
            |c: &mut Config| c.model.window_length = 0,
            |c: &mut Config| c.model.hidden_size = 0,
            |c: &mut Config| c.model.epochs = 0,
            |c: &mut Config| c.model.batch_size = 0,
            |c: &mut Config| c.model.learning_rate = 0.0,
            |c: &mut Config| c.model.train_split = 0.0,
            |c: &mut Config| c.model.train_split = 1.5,
            |c: &mut Config| c.model.validation_split = 1.0,
            |c: &mut Config| c.model.validation_split = -0.1,
            |c: &mut Config| c.model.clip_norm = Some(0.0),
            |c: &mut Config| c.output.days = MAX_FORECAST_DAYS + 1,
            |c: &mut Config| c.output.days = usize::MAX,
        ];
        for mutate in cases {
            let mut config = Config::default();
            mutate(&mut config);
            assert!(matches!(config.validate(), Err(ForecastError::Config(_))));
        }

        let mut edge = Config::default();
        edge.model.train_split = 1.0;
        edge.model.validation_split = 0.0;
        edge.model.clip_norm = None;
        edge.output.days = MAX_FORECAST_DAYS;
        assert!(edge.validate().is_ok());
        edge.output.days = 0;
        assert!(edge.validate().is_ok());
    }
}
