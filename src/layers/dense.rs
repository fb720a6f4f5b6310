//! Dense (fully connected) layer implementation
//!
//! Performs `output = input × weights + biases`, optionally with an L2 penalty
//! on the weights.

use std::cell::RefCell;

use crate::layers::{Layer, ParameterVisitor, Phase};
use crate::utils::SimpleRng;

/// Dense (fully connected) layer with weights and biases.
///
/// # Fields
///
/// * `weights` - Weight matrix stored row-major (input_size × output_size)
/// * `biases` - Bias vector (output_size)
/// * `l2` - L2 penalty factor; adds `l2 * Σw²` to the loss
///
/// # Example
///
/// ```
/// use mnist_experiments::layers::{DenseLayer, Layer};
/// use mnist_experiments::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// let layer = DenseLayer::new(784, 512, &mut rng);
/// assert_eq!(layer.input_size(), 784);
/// assert_eq!(layer.output_size(), 512);
/// ```
pub struct DenseLayer {
    input_size: usize,
    output_size: usize,
    weights: Vec<f32>,
    biases: Vec<f32>,
    l2: f32,
    grad_weights: RefCell<Vec<f32>>,
    grad_biases: RefCell<Vec<f32>>,
}

impl DenseLayer {
    /// Create a new DenseLayer with Xavier initialization.
    ///
    /// Weights are sampled from U[-limit, limit] with
    /// limit = sqrt(6 / (input_size + output_size)); biases start at zero.
    pub fn new(input_size: usize, output_size: usize, rng: &mut SimpleRng) -> Self {
        let mut weights = vec![0.0f32; input_size * output_size];
        let limit = (6.0f32 / (input_size + output_size) as f32).sqrt();

        for value in &mut weights {
            *value = rng.gen_range_f32(-limit, limit);
        }

        Self::from_parameters(input_size, output_size, weights, vec![0.0f32; output_size])
    }

    /// Builds a layer from explicit parameters.
    ///
    /// # Panics
    ///
    /// Panics if the buffer lengths don't match the sizes.
    pub fn from_parameters(
        input_size: usize,
        output_size: usize,
        weights: Vec<f32>,
        biases: Vec<f32>,
    ) -> Self {
        assert_eq!(weights.len(), input_size * output_size, "weights length mismatch");
        assert_eq!(biases.len(), output_size, "biases length mismatch");

        Self {
            input_size,
            output_size,
            grad_weights: RefCell::new(vec![0.0f32; weights.len()]),
            grad_biases: RefCell::new(vec![0.0f32; output_size]),
            weights,
            biases,
            l2: 0.0,
        }
    }

    /// Sets the L2 penalty factor on the weights.
    pub fn with_l2(mut self, l2: f32) -> Self {
        self.l2 = l2;
        self
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn biases(&self) -> &[f32] {
        &self.biases
    }

    pub fn l2(&self) -> f32 {
        self.l2
    }
}

impl Layer for DenseLayer {
    fn kind(&self) -> &'static str {
        "dense"
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize, _phase: Phase) {
        assert_eq!(input.len(), batch_size * self.input_size, "dense input len mismatch");
        assert_eq!(output.len(), batch_size * self.output_size, "dense output len mismatch");

        for b in 0..batch_size {
            let x = &input[b * self.input_size..(b + 1) * self.input_size];
            let y = &mut output[b * self.output_size..(b + 1) * self.output_size];
            y.copy_from_slice(&self.biases);

            for (i, &xi) in x.iter().enumerate() {
                if xi == 0.0 {
                    continue;
                }
                let w_row = &self.weights[i * self.output_size..(i + 1) * self.output_size];
                for (yj, &w) in y.iter_mut().zip(w_row) {
                    *yj += xi * w;
                }
            }
        }
    }

    fn backward(
        &self,
        input: &[f32],
        _output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        assert_eq!(
            grad_output.len(),
            batch_size * self.output_size,
            "dense grad_output len mismatch"
        );
        assert_eq!(grad_input.len(), batch_size * self.input_size, "dense grad_input len mismatch");

        let scale = 1.0 / batch_size as f32;
        let mut grad_w = self.grad_weights.borrow_mut();
        let mut grad_b = self.grad_biases.borrow_mut();

        for b in 0..batch_size {
            let x = &input[b * self.input_size..(b + 1) * self.input_size];
            let g = &grad_output[b * self.output_size..(b + 1) * self.output_size];
            let dx = &mut grad_input[b * self.input_size..(b + 1) * self.input_size];

            for (gb, &gj) in grad_b.iter_mut().zip(g) {
                *gb += gj * scale;
            }

            for i in 0..self.input_size {
                let w_row = &self.weights[i * self.output_size..(i + 1) * self.output_size];
                let gw_row = &mut grad_w[i * self.output_size..(i + 1) * self.output_size];
                let xi = x[i] * scale;
                let mut acc = 0.0f32;
                for j in 0..self.output_size {
                    gw_row[j] += xi * g[j];
                    acc += g[j] * w_row[j];
                }
                dx[i] = acc;
            }
        }
    }

    fn apply_gradients(&mut self, visit: &mut ParameterVisitor<'_>) {
        let grad_w = self.grad_weights.get_mut();
        let grad_b = self.grad_biases.get_mut();

        if self.l2 > 0.0 {
            for (g, &w) in grad_w.iter_mut().zip(&self.weights) {
                *g += 2.0 * self.l2 * w;
            }
        }

        visit(0, &mut self.weights, grad_w);
        visit(1, &mut self.biases, grad_b);

        grad_w.iter_mut().for_each(|g| *g = 0.0);
        grad_b.iter_mut().for_each(|g| *g = 0.0);
    }

    fn regularization_loss(&self) -> f32 {
        if self.l2 == 0.0 {
            return 0.0;
        }
        self.l2 * self.weights.iter().map(|w| w * w).sum::<f32>()
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }
}
