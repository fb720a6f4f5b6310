//! Model evaluation and the confusion matrix.

use std::fmt;

use crate::data::{argmax, LabeledData};
use crate::error::{Error, Result};
use crate::loss::LossKind;
use crate::model::Model;

/// Loss, accuracy and predicted labels over one dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Mean loss per example, including the model's regularization penalty.
    pub loss: f32,
    pub accuracy: f32,
    /// Predicted class of every example, in dataset order.
    pub predictions: Vec<u8>,
}

/// Runs a model over data in inference mode, in fixed-size batches.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    loss: LossKind,
    batch_size: usize,
}

impl Evaluator {
    pub fn new(loss: LossKind, batch_size: usize) -> Self {
        Self {
            loss,
            batch_size: batch_size.max(1),
        }
    }

    /// Computes loss, accuracy and predictions in a single pass.
    ///
    /// Dropout is inactive and the model is not modified.
    pub fn evaluate(&self, model: &Model, data: &LabeledData) -> Result<Evaluation> {
        if model.input_size() != data.feature_len() {
            return Err(Error::ShapeMismatch {
                index: 0,
                expected: model.input_size(),
                actual: data.feature_len(),
            });
        }
        let classes = data.num_classes();
        if model.output_size() != classes {
            return Err(Error::config(format!(
                "model produces {} outputs but the data has {} classes",
                model.output_size(),
                classes
            )));
        }
        if data.is_empty() {
            return Err(Error::config("cannot evaluate an empty dataset"));
        }

        let feature_len = data.feature_len();
        let mut loss_sum = 0.0f64;
        let mut correct = 0usize;
        let mut predictions = Vec::with_capacity(data.len());
        let mut grad = Vec::new();

        for start in (0..data.len()).step_by(self.batch_size) {
            let rows = self.batch_size.min(data.len() - start);
            let inputs = &data.features()[start * feature_len..(start + rows) * feature_len];
            let targets = &data.targets()[start * classes..(start + rows) * classes];
            let outputs = model.predict(inputs, rows);

            grad.clear();
            grad.resize(rows * classes, 0.0);
            loss_sum += self.loss.compute(&outputs, targets, rows, classes, &mut grad) as f64;

            for (row, &label) in outputs.chunks(classes).zip(&data.labels()[start..start + rows]) {
                let predicted = argmax(row);
                if predicted == label as usize {
                    correct += 1;
                }
                predictions.push(predicted as u8);
            }
        }

        let total = data.len() as f64;
        Ok(Evaluation {
            loss: (loss_sum / total) as f32 + model.regularization_loss(),
            accuracy: (correct as f64 / total) as f32,
            predictions,
        })
    }

    /// Predicted class of each row of `features`.
    ///
    /// `features` must hold whole rows of `model.input_size()` values.
    pub fn predict_classes(&self, model: &Model, features: &[f32]) -> Result<Vec<u8>> {
        let feature_len = model.input_size();
        if features.len() % feature_len != 0 {
            return Err(Error::ShapeMismatch {
                index: 0,
                expected: feature_len,
                actual: features.len() % feature_len,
            });
        }
        let classes = model.output_size();
        let mut predictions = Vec::with_capacity(features.len() / feature_len);
        for batch in features.chunks(self.batch_size * feature_len) {
            let rows = batch.len() / feature_len;
            let outputs = model.predict(batch, rows);
            predictions.extend(outputs.chunks(classes).map(|row| argmax(row) as u8));
        }
        Ok(predictions)
    }
}

/// K×K counts: row = true class, column = predicted class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    num_classes: usize,
    counts: Vec<u64>,
}

impl ConfusionMatrix {
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            counts: vec![0; num_classes * num_classes],
        }
    }

    /// Counts each `(truth[i], predicted[i])` pair.
    pub fn from_predictions(truth: &[u8], predicted: &[u8], num_classes: usize) -> Result<Self> {
        if truth.len() != predicted.len() {
            return Err(Error::config(format!(
                "{} true labels but {} predictions",
                truth.len(),
                predicted.len()
            )));
        }
        let mut matrix = Self::new(num_classes);
        for (&t, &p) in truth.iter().zip(predicted) {
            let (t, p) = (t as usize, p as usize);
            if t >= num_classes || p >= num_classes {
                return Err(Error::config(format!(
                    "class pair ({t}, {p}) out of range for {num_classes} classes"
                )));
            }
            matrix.counts[t * num_classes + p] += 1;
        }
        Ok(matrix)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u64 {
        self.counts[truth * self.num_classes + predicted]
    }

    /// Counts for examples whose true class is `truth`.
    pub fn row(&self, truth: usize) -> &[u64] {
        &self.counts[truth * self.num_classes..(truth + 1) * self.num_classes]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Trace of the matrix.
    pub fn correct(&self) -> u64 {
        (0..self.num_classes).map(|k| self.get(k, k)).sum()
    }

    pub fn accuracy(&self) -> f32 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.correct() as f32 / total as f32
        }
    }

    /// Fraction of class `k` examples predicted as `k`; `None` if the class
    /// never occurs.
    pub fn recall(&self, k: usize) -> Option<f32> {
        let support: u64 = self.row(k).iter().sum();
        (support > 0).then(|| self.get(k, k) as f32 / support as f32)
    }

    /// Largest single cell.
    pub fn max_count(&self) -> u64 {
        self.counts.iter().copied().max().unwrap_or(0)
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self.max_count().to_string().len().max(3) + 1;
        write!(f, "{:>6}", "t\\p")?;
        for p in 0..self.num_classes {
            write!(f, "{:>width$}", p)?;
        }
        writeln!(f)?;
        for t in 0..self.num_classes {
            write!(f, "{:>6}", t)?;
            for &count in self.row(t) {
                write!(f, "{:>width$}", count)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_trace() {
        let truth = [0, 0, 1, 2, 2, 2];
        let predicted = [0, 1, 1, 2, 0, 2];
        let matrix = ConfusionMatrix::from_predictions(&truth, &predicted, 3).unwrap();

        assert_eq!(matrix.total(), 6);
        assert_eq!(matrix.correct(), 4);
        assert_eq!(matrix.get(0, 1), 1);
        assert_eq!(matrix.get(2, 0), 1);
        assert_eq!(matrix.row(2), &[1, 0, 2]);
        assert!((matrix.accuracy() - 4.0 / 6.0).abs() < 1e-6);
        assert_eq!(matrix.recall(1), Some(1.0));
    }

    #[test]
    fn test_recall_of_missing_class() {
        let matrix = ConfusionMatrix::from_predictions(&[0], &[0], 3).unwrap();
        assert_eq!(matrix.recall(2), None);
    }

    #[test]
    fn test_rejects_mismatched_lengths() {
        assert!(ConfusionMatrix::from_predictions(&[0, 1], &[0], 2).is_err());
        assert!(ConfusionMatrix::from_predictions(&[0], &[5], 2).is_err());
    }

    #[test]
    fn test_display_has_one_line_per_class() {
        let matrix = ConfusionMatrix::from_predictions(&[0, 1], &[0, 0], 2).unwrap();
        let text = matrix.to_string();
        assert_eq!(text.lines().count(), 3);
    }
}
