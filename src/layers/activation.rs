//! Element-wise and row-wise non-linearities as standalone layers.

use serde::{Deserialize, Serialize};

use crate::layers::{Layer, Phase};
use crate::utils::activations::{
    relu_backward, relu_inplace, sigmoid_backward, sigmoid_inplace, softmax_backward, softmax_rows,
    tanh_backward, tanh_inplace,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationKind {
    Relu,
    Sigmoid,
    Tanh,
    Softmax,
    Linear,
}

impl ActivationKind {
    pub fn name(&self) -> &'static str {
        match self {
            ActivationKind::Relu => "relu",
            ActivationKind::Sigmoid => "sigmoid",
            ActivationKind::Tanh => "tanh",
            ActivationKind::Softmax => "softmax",
            ActivationKind::Linear => "linear",
        }
    }
}

/// Activation layer over `size` features per sample.
///
/// Softmax normalizes each sample's row; the others act per element.
pub struct ActivationLayer {
    size: usize,
    function: ActivationKind,
}

impl ActivationLayer {
    pub fn new(size: usize, function: ActivationKind) -> Self {
        Self { size, function }
    }

    pub fn function(&self) -> ActivationKind {
        self.function
    }
}

impl Layer for ActivationLayer {
    fn kind(&self) -> &'static str {
        self.function.name()
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize, _phase: Phase) {
        assert_eq!(input.len(), batch_size * self.size, "activation input len mismatch");
        output.copy_from_slice(input);
        match self.function {
            ActivationKind::Relu => relu_inplace(output),
            ActivationKind::Sigmoid => sigmoid_inplace(output),
            ActivationKind::Tanh => tanh_inplace(output),
            ActivationKind::Softmax => softmax_rows(output, batch_size, self.size),
            ActivationKind::Linear => {}
        }
    }

    fn backward(
        &self,
        _input: &[f32],
        output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        assert_eq!(
            grad_output.len(),
            batch_size * self.size,
            "activation grad_output len mismatch"
        );
        match self.function {
            ActivationKind::Relu => relu_backward(output, grad_output, grad_input),
            ActivationKind::Sigmoid => sigmoid_backward(output, grad_output, grad_input),
            ActivationKind::Tanh => tanh_backward(output, grad_output, grad_input),
            ActivationKind::Softmax => {
                softmax_backward(output, grad_output, grad_input, batch_size, self.size)
            }
            ActivationKind::Linear => grad_input.copy_from_slice(grad_output),
        }
    }

    fn input_size(&self) -> usize {
        self.size
    }

    fn output_size(&self) -> usize {
        self.size
    }

    fn parameter_count(&self) -> usize {
        0
    }
}
