//! Experiment configuration
//!
//! One JSON file describes a whole run: where the data lives and how much of
//! it to sample, the architecture, the training hyperparameters, where logs
//! go and which artifacts to write.
//!
//! # Example
//!
//! ```json
//! {
//!   "name": "mlp-baseline",
//!   "data": { "dir": "data", "train_samples": 6000, "test_samples": 1000, "seed": 42 },
//!   "architecture": { "layers": [
//!     { "layer_type": "dense", "input_size": 784, "output_size": 10 },
//!     { "layer_type": "activation", "size": 10, "function": "softmax" }
//!   ]},
//!   "training": { "batch_size": 128, "epochs": 10, "optimizer": { "kind": "adam" } },
//!   "logging": { "log_root": "logs" }
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::architecture::{validate_architecture, ArchitectureConfig};
use crate::data::{FeatureShape, NUM_CLASSES};
use crate::error::{Error, Result};
use crate::train::{TrainingConfig, Validation};

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_log_root() -> PathBuf {
    PathBuf::from("logs")
}

fn default_true() -> bool {
    true
}

/// Corpus location and subsampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
    pub train_samples: usize,
    pub test_samples: usize,
    #[serde(default)]
    pub feature_shape: FeatureShape,
    /// Fixes sampling, initialization and shuffling; the clock is used when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Download missing corpus files (requires the `download` feature).
    #[serde(default)]
    pub download: bool,
}

/// Where run directories are created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_root")]
    pub log_root: PathBuf,
    /// Write per-epoch scalars to `events.jsonl`.
    #[serde(default = "default_true")]
    pub event_log: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_root: default_log_root(),
            event_log: true,
        }
    }
}

/// Artifacts written into the run directory after evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_true")]
    pub history_csv: bool,
    #[serde(default = "default_true")]
    pub confusion_heatmap: bool,
    #[serde(default = "default_true")]
    pub layer_graph: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            history_csv: true,
            confusion_heatmap: true,
            layer_graph: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub data: DataConfig,
    pub architecture: ArchitectureConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Loads and validates an experiment configuration from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use mnist_experiments::config::load_config;
///
/// let cfg = load_config("config/mnist_mlp.json").unwrap();
/// assert_eq!(cfg.training.epochs, 10);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<ExperimentConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ExperimentConfig = serde_json::from_str(&contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Reports the first invalid value of `config`.
pub fn validate_config(config: &ExperimentConfig) -> Result<()> {
    if config.data.train_samples == 0 {
        return Err(Error::config("data.train_samples must be greater than 0"));
    }
    if config.data.test_samples == 0 {
        return Err(Error::config("data.test_samples must be greater than 0"));
    }

    validate_architecture(&config.architecture)?;
    match config.architecture.output_size() {
        Some(NUM_CLASSES) => {}
        other => {
            return Err(Error::config(format!(
                "architecture must end with {NUM_CLASSES} outputs, found {}",
                other.map_or_else(|| "none".to_string(), |n| n.to_string())
            )));
        }
    }

    config.training.validate()?;
    if let Validation::Holdout { fraction } = config.training.validation {
        let held_out = (config.data.train_samples as f32 * fraction).round() as usize;
        if held_out == 0 || held_out >= config.data.train_samples {
            return Err(Error::config(format!(
                "holdout fraction {fraction} leaves an empty split of {} training samples",
                config.data.train_samples
            )));
        }
    }
    Ok(())
}
