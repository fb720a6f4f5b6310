//! Loss functions over a batch of predictions.
//!
//! Predictions and targets are row-major `rows × cols` buffers. [`LossKind::compute`]
//! returns the loss summed over the batch and writes the per-sample gradient with
//! respect to the predictions; layers average parameter gradients over the batch.

use serde::{Deserialize, Serialize};

/// Probability clip range for cross-entropy.
pub const PROBABILITY_EPSILON: f32 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    /// `-Σ t·ln(p)` with `p` clipped to `[1e-7, 1 - 1e-7]`. Expects probabilities,
    /// so the model should end in a softmax activation.
    #[default]
    CategoricalCrossentropy,
    /// Mean over classes of `(p - t)²`.
    MeanSquaredError,
}

impl LossKind {
    pub fn name(&self) -> &'static str {
        match self {
            LossKind::CategoricalCrossentropy => "categorical_crossentropy",
            LossKind::MeanSquaredError => "mean_squared_error",
        }
    }

    /// Computes the summed loss of `rows` samples and fills `grad`.
    ///
    /// # Panics
    ///
    /// Panics if any buffer is not `rows * cols` long.
    pub fn compute(
        &self,
        predictions: &[f32],
        targets: &[f32],
        rows: usize,
        cols: usize,
        grad: &mut [f32],
    ) -> f32 {
        let len = rows * cols;
        assert_eq!(predictions.len(), len, "Predictions length mismatch");
        assert_eq!(targets.len(), len, "Targets length mismatch");
        assert_eq!(grad.len(), len, "Gradient length mismatch");

        let mut total = 0.0f32;
        match self {
            LossKind::CategoricalCrossentropy => {
                for i in 0..len {
                    let p = predictions[i].clamp(PROBABILITY_EPSILON, 1.0 - PROBABILITY_EPSILON);
                    let t = targets[i];
                    total -= t * p.ln();
                    grad[i] = -t / p;
                }
            }
            LossKind::MeanSquaredError => {
                let inv_cols = 1.0 / cols as f32;
                for i in 0..len {
                    let diff = predictions[i] - targets[i];
                    total += diff * diff * inv_cols;
                    grad[i] = 2.0 * diff * inv_cols;
                }
            }
        }
        total
    }
}
