//! Layer trait definition for neural network layers
//!
//! Every layer works on flat, row-major `f32` buffers holding a whole batch
//! (`batch_size × input_size` in, `batch_size × output_size` out). Parameter
//! gradients are accumulated inside the layer during `backward` and handed to
//! the optimizers through [`Layer::apply_gradients`].

/// Whether a forward pass is part of training or inference.
///
/// Dropout only drops units during [`Phase::Training`]; evaluation always runs
/// with [`Phase::Inference`] and leaves the layers untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Training,
    Inference,
}

/// Callback receiving `(slot, parameters, gradients)` for each parameter buffer.
///
/// `slot` numbers the layer's buffers (weights are 0, biases are 1) so the
/// caller can keep one optimizer state per buffer.
pub type ParameterVisitor<'a> = dyn FnMut(usize, &mut [f32], &[f32]) + 'a;

/// Core trait for neural network layers.
pub trait Layer {
    /// Short type name used in summaries and graphs (e.g. `"dense"`).
    fn kind(&self) -> &'static str;

    /// Forward propagation through the layer.
    ///
    /// # Arguments
    ///
    /// * `input` - Input data flattened as a 1D array (batch_size × input_size)
    /// * `output` - Output buffer to store results (batch_size × output_size)
    /// * `batch_size` - Number of samples in the batch
    /// * `phase` - Training or inference
    ///
    /// # Panics
    ///
    /// Implementations panic if buffer lengths don't match the declared sizes.
    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize, phase: Phase);

    /// Backward propagation through the layer.
    ///
    /// Writes the gradient with respect to `input` into `grad_input` and
    /// accumulates parameter gradients (averaged over the batch) internally.
    /// `input` and `output` must be the buffers of the matching forward pass.
    fn backward(
        &self,
        input: &[f32],
        output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    );

    /// Hands each parameter buffer and its accumulated gradient to `visit`,
    /// then clears the accumulated gradients.
    ///
    /// Layers without parameters keep the default no-op.
    fn apply_gradients(&mut self, _visit: &mut ParameterVisitor<'_>) {}

    /// Regularization penalty contributed to the loss (0 for most layers).
    fn regularization_loss(&self) -> f32 {
        0.0
    }

    /// Number of input features per sample.
    fn input_size(&self) -> usize;

    /// Number of output features per sample.
    fn output_size(&self) -> usize;

    /// Total count of trainable weights and biases.
    fn parameter_count(&self) -> usize;

    /// Output shape per sample as printed in summaries, e.g. `(8, 14, 14)`.
    fn output_shape(&self) -> Vec<usize> {
        vec![self.output_size()]
    }
}
