//! Mini-batch training loop.
//!
//! [`Trainer::fit`] runs synchronous mini-batch gradient descent: for each
//! epoch the training indices are shuffled, split into batches, and each batch
//! goes forward, through the loss, backward, and through the optimizers. One
//! [`EpochMetrics`] record is appended to the [`History`] per epoch.

pub mod run;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::data::{argmax, LabeledData};
use crate::error::{Error, Result};
use crate::evaluate::Evaluator;
use crate::layers::Phase;
use crate::loss::LossKind;
use crate::model::Model;
use crate::optimizers::{Optimizer, OptimizerConfig};
use crate::utils::rng::SimpleRng;

pub use run::{read_events, EventLog, InMemorySink, MetricSink, RunDirectory, RunId, ScalarEvent};

pub const TAG_TRAIN_LOSS: &str = "train/loss";
pub const TAG_TRAIN_ACCURACY: &str = "train/accuracy";
pub const TAG_VALIDATION_LOSS: &str = "validation/loss";
pub const TAG_VALIDATION_ACCURACY: &str = "validation/accuracy";

fn default_batch_size() -> usize {
    128
}

fn default_epochs() -> usize {
    10
}

fn default_shuffle() -> bool {
    true
}

/// Which data, if any, is evaluated after every epoch.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Validation {
    #[default]
    None,
    /// The sampled test split doubles as validation data.
    TestSplit,
    /// The trailing `fraction` of the training sample is held out.
    Holdout { fraction: f32 },
}

/// Training hyperparameters.
///
/// ```json
/// {
///   "batch_size": 128,
///   "epochs": 10,
///   "loss": "categorical_crossentropy",
///   "optimizer": { "kind": "adam" },
///   "validation": { "kind": "holdout", "fraction": 0.1 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default)]
    pub loss: LossKind,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default = "default_shuffle")]
    pub shuffle: bool,
    #[serde(default)]
    pub validation: Validation,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            epochs: default_epochs(),
            loss: LossKind::default(),
            optimizer: OptimizerConfig::default(),
            shuffle: default_shuffle(),
            validation: Validation::default(),
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config("training.batch_size must be greater than 0"));
        }
        if self.epochs == 0 {
            return Err(Error::config("training.epochs must be greater than 0"));
        }
        if let Validation::Holdout { fraction } = self.validation {
            if !(fraction > 0.0 && fraction < 1.0) {
                return Err(Error::config(
                    "training.validation.fraction must be in range (0.0, 1.0)",
                ));
            }
        }
        self.optimizer.validate()
    }
}

/// Metrics of one finished epoch. `epoch` starts at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    pub loss: f32,
    pub accuracy: f32,
    pub val_loss: Option<f32>,
    pub val_accuracy: Option<f32>,
}

/// Per-epoch records in epoch order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    epochs: Vec<EpochMetrics>,
}

impl History {
    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn records(&self) -> &[EpochMetrics] {
        &self.epochs
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    fn push(&mut self, metrics: EpochMetrics) {
        self.epochs.push(metrics);
    }

    /// Writes `epoch,loss,accuracy,val_loss,val_accuracy` rows; missing
    /// validation values are left empty.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "epoch,loss,accuracy,val_loss,val_accuracy")?;
        let opt = |v: Option<f32>| v.map(|v| v.to_string()).unwrap_or_default();
        for m in &self.epochs {
            writeln!(
                out,
                "{},{},{},{},{}",
                m.epoch,
                m.loss,
                m.accuracy,
                opt(m.val_loss),
                opt(m.val_accuracy)
            )?;
        }
        out.flush()?;
        Ok(())
    }
}

/// One optimizer instance per parameter buffer, created on first use.
struct OptimizerBank {
    config: OptimizerConfig,
    optimizers: HashMap<(usize, usize), Box<dyn Optimizer>>,
}

impl OptimizerBank {
    fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            optimizers: HashMap::new(),
        }
    }

    fn step(&mut self, model: &mut Model) {
        let config = self.config;
        let optimizers = &mut self.optimizers;
        model.apply_gradients(&mut |layer, slot, params, grads| {
            optimizers
                .entry((layer, slot))
                .or_insert_with(|| config.build())
                .update(params, grads);
        });
    }
}

fn check_compatible(model: &Model, data: &LabeledData) -> Result<()> {
    if model.input_size() != data.feature_len() {
        return Err(Error::ShapeMismatch {
            index: 0,
            expected: model.input_size(),
            actual: data.feature_len(),
        });
    }
    if model.output_size() != data.num_classes() {
        return Err(Error::config(format!(
            "model produces {} outputs but the data has {} classes",
            model.output_size(),
            data.num_classes()
        )));
    }
    Ok(())
}

pub(crate) fn count_correct(outputs: &[f32], labels: &[u8], num_classes: usize) -> usize {
    outputs
        .chunks(num_classes)
        .zip(labels)
        .filter(|(row, &label)| argmax(row) == label as usize)
        .count()
}

/// Runs the training loop for a [`TrainingConfig`].
pub struct Trainer {
    config: TrainingConfig,
    rng: SimpleRng,
}

impl Trainer {
    /// `rng` drives the per-epoch shuffle.
    pub fn new(config: TrainingConfig, rng: SimpleRng) -> Self {
        Self { config, rng }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Trains `model` on `train` for the configured number of epochs.
    ///
    /// `validation`, when given, is evaluated in inference mode after every
    /// epoch. Every scalar of the epoch record is also sent to `sink`. Fails
    /// before the first step if the model and the data disagree on feature
    /// width or class count.
    pub fn fit(
        &mut self,
        model: &mut Model,
        train: &LabeledData,
        validation: Option<&LabeledData>,
        mut sink: Option<&mut dyn MetricSink>,
    ) -> Result<History> {
        self.config.validate()?;
        if train.is_empty() {
            return Err(Error::config("training data is empty"));
        }
        check_compatible(model, train)?;
        if let Some(val) = validation {
            check_compatible(model, val)?;
        }

        let batch_size = self.config.batch_size;
        let classes = train.num_classes();
        let loss_kind = self.config.loss;
        let evaluator = Evaluator::new(loss_kind, batch_size);
        let mut bank = OptimizerBank::new(self.config.optimizer);
        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut history = History::default();

        let mut batch_x = Vec::with_capacity(batch_size * train.feature_len());
        let mut batch_y = Vec::with_capacity(batch_size * classes);
        let mut grad = Vec::with_capacity(batch_size * classes);

        tracing::info!(
            examples = train.len(),
            epochs = self.config.epochs,
            batch_size,
            loss = loss_kind.name(),
            optimizer = self.config.optimizer.name(),
            "training started"
        );

        for epoch in 1..=self.config.epochs {
            let started = Instant::now();
            if self.config.shuffle {
                self.rng.shuffle_usize(&mut order);
            }

            let mut loss_sum = 0.0f64;
            let mut correct = 0usize;
            for chunk in order.chunks(batch_size) {
                let rows = chunk.len();
                train.gather(chunk, &mut batch_x, &mut batch_y);

                let activations = model.forward(&batch_x, rows, Phase::Training);
                let output = &activations[activations.len() - 1];
                grad.clear();
                grad.resize(rows * classes, 0.0);
                let batch_loss = loss_kind.compute(output, &batch_y, rows, classes, &mut grad);

                loss_sum += batch_loss as f64 + model.regularization_loss() as f64 * rows as f64;
                let labels: Vec<u8> = chunk.iter().map(|&i| train.labels()[i]).collect();
                correct += count_correct(output, &labels, classes);

                model.backward(&activations, &grad, rows);
                bank.step(model);
            }

            let mut metrics = EpochMetrics {
                epoch,
                loss: (loss_sum / train.len() as f64) as f32,
                accuracy: correct as f32 / train.len() as f32,
                val_loss: None,
                val_accuracy: None,
            };
            if let Some(val) = validation {
                let evaluation = evaluator.evaluate(model, val)?;
                metrics.val_loss = Some(evaluation.loss);
                metrics.val_accuracy = Some(evaluation.accuracy);
            }

            tracing::info!(
                epoch,
                loss = metrics.loss,
                accuracy = metrics.accuracy,
                val_loss = ?metrics.val_loss,
                val_accuracy = ?metrics.val_accuracy,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "epoch finished"
            );

            if let Some(sink) = sink.as_deref_mut() {
                sink.log_scalar(epoch, TAG_TRAIN_LOSS, metrics.loss)?;
                sink.log_scalar(epoch, TAG_TRAIN_ACCURACY, metrics.accuracy)?;
                if let (Some(loss), Some(accuracy)) = (metrics.val_loss, metrics.val_accuracy) {
                    sink.log_scalar(epoch, TAG_VALIDATION_LOSS, loss)?;
                    sink.log_scalar(epoch, TAG_VALIDATION_ACCURACY, accuracy)?;
                }
            }
            history.push(metrics);
        }

        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_config_defaults() {
        let config: TrainingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, TrainingConfig::default());
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.epochs, 10);
        assert!(config.shuffle);
        assert_eq!(config.validation, Validation::None);
    }

    #[test]
    fn test_validation_variants_parse() {
        let holdout: Validation =
            serde_json::from_str(r#"{"kind": "holdout", "fraction": 0.2}"#).unwrap();
        assert_eq!(holdout, Validation::Holdout { fraction: 0.2 });
        let test: Validation = serde_json::from_str(r#"{"kind": "test_split"}"#).unwrap();
        assert_eq!(test, Validation::TestSplit);
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let config = TrainingConfig {
            batch_size: 0,
            ..TrainingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_count_correct() {
        let outputs = [0.9, 0.1, 0.2, 0.8, 0.6, 0.4];
        assert_eq!(count_correct(&outputs, &[0, 1, 1], 2), 2);
    }

    #[test]
    fn test_history_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let mut history = History::default();
        history.push(EpochMetrics {
            epoch: 1,
            loss: 0.5,
            accuracy: 0.75,
            val_loss: None,
            val_accuracy: None,
        });
        history.push(EpochMetrics {
            epoch: 2,
            loss: 0.25,
            accuracy: 0.875,
            val_loss: Some(0.3),
            val_accuracy: Some(0.9),
        });
        history.write_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "epoch,loss,accuracy,val_loss,val_accuracy");
        assert_eq!(lines[1], "1,0.5,0.75,,");
        assert_eq!(lines[2], "2,0.25,0.875,0.3,0.9");
    }
}
