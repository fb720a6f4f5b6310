//! Dropout layer implementation for regularization
//!
//! During training a fraction of input units is zeroed and the survivors are
//! scaled by `1/(1-rate)` (inverted dropout), so inference passes inputs
//! through unchanged.

use std::cell::RefCell;

use crate::layers::{Layer, Phase};
use crate::utils::rng::SimpleRng;

/// Dropout layer for regularization.
///
/// # Fields
///
/// * `size` - Number of input/output features (dropout doesn't change dimensions)
/// * `rate` - Probability of dropping each unit, in [0.0, 1.0)
/// * `mask` - Scale applied to each unit in the last training forward pass
/// * `rng` - Random number generator for dropout mask generation
///
/// # Example
///
/// ```
/// use mnist_experiments::layers::{DropoutLayer, Layer, Phase};
/// use mnist_experiments::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// let layer = DropoutLayer::new(4, 0.5, &mut rng);
/// let input = [1.0f32; 4];
/// let mut output = [0.0f32; 4];
/// layer.forward(&input, &mut output, 1, Phase::Inference);
/// assert_eq!(output, input);
/// ```
pub struct DropoutLayer {
    size: usize,
    rate: f32,
    mask: RefCell<Vec<f32>>,
    rng: RefCell<SimpleRng>,
}

impl DropoutLayer {
    /// Creates a new dropout layer.
    ///
    /// The layer draws its masks from a fork of `rng`, so construction advances
    /// `rng` once and the layer stays reproducible under a fixed seed.
    ///
    /// # Panics
    ///
    /// Panics if `rate` is outside [0.0, 1.0).
    pub fn new(size: usize, rate: f32, rng: &mut SimpleRng) -> Self {
        assert!((0.0..1.0).contains(&rate), "dropout rate must be in range [0.0, 1.0)");

        let fork = SimpleRng::new(((rng.next_u32() as u64) << 32) | rng.next_u32() as u64);
        Self {
            size,
            rate,
            mask: RefCell::new(Vec::new()),
            rng: RefCell::new(fork),
        }
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }
}

impl Layer for DropoutLayer {
    fn kind(&self) -> &'static str {
        "dropout"
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize, phase: Phase) {
        let total_size = batch_size * self.size;
        assert_eq!(
            input.len(),
            total_size,
            "input len mismatch: expected {}, got {}",
            total_size,
            input.len()
        );
        assert_eq!(
            output.len(),
            total_size,
            "output len mismatch: expected {}, got {}",
            total_size,
            output.len()
        );

        let mut mask = self.mask.borrow_mut();
        if phase == Phase::Inference || self.rate == 0.0 {
            output.copy_from_slice(input);
            mask.clear();
            mask.resize(total_size, 1.0);
            return;
        }

        let scale = 1.0 / (1.0 - self.rate);
        let mut rng = self.rng.borrow_mut();
        mask.resize(total_size, 0.0);

        for ((m, out), &x) in mask.iter_mut().zip(output.iter_mut()).zip(input) {
            if rng.next_f32() >= self.rate {
                *m = scale;
                *out = x * scale;
            } else {
                *m = 0.0;
                *out = 0.0;
            }
        }
    }

    /// Applies the mask of the last forward pass to the gradient.
    fn backward(
        &self,
        _input: &[f32],
        _output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        let total_size = batch_size * self.size;
        assert_eq!(grad_output.len(), total_size, "grad_output len mismatch");
        assert_eq!(grad_input.len(), total_size, "grad_input len mismatch");

        let mask = self.mask.borrow();
        assert_eq!(mask.len(), total_size, "dropout backward without matching forward");
        for ((g_in, &g_out), &m) in grad_input.iter_mut().zip(grad_output).zip(mask.iter()) {
            *g_in = g_out * m;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropout_rate_statistical_verification() {
        let mut rng = SimpleRng::new(42);
        let layer = DropoutLayer::new(1000, 0.5, &mut rng);
        let input = vec![1.0f32; 1000 * 20];
        let mut output = vec![0.0f32; 1000 * 20];

        layer.forward(&input, &mut output, 20, Phase::Training);

        let dropped = output.iter().filter(|&&x| x == 0.0).count();
        let actual = dropped as f32 / output.len() as f32;
        assert!((actual - 0.5).abs() < 0.05, "drop rate {}", actual);
        assert!(output.iter().all(|&x| x == 0.0 || (x - 2.0).abs() < 1e-6));
    }

    #[test]
    fn test_dropout_zero_rate_is_identity_in_training() {
        let mut rng = SimpleRng::new(3);
        let layer = DropoutLayer::new(3, 0.0, &mut rng);
        let input = [0.1, -0.2, 0.3];
        let mut output = [0.0; 3];
        layer.forward(&input, &mut output, 1, Phase::Training);
        assert_eq!(output, input);
    }

    #[test]
    fn test_backward_uses_forward_mask() {
        let mut rng = SimpleRng::new(11);
        let layer = DropoutLayer::new(64, 0.25, &mut rng);
        let input = vec![1.0f32; 64];
        let mut output = vec![0.0f32; 64];
        layer.forward(&input, &mut output, 1, Phase::Training);

        let grad_output = vec![1.0f32; 64];
        let mut grad_input = vec![0.0f32; 64];
        layer.backward(&input, &output, &grad_output, &mut grad_input, 1);

        assert_eq!(grad_input, output);
    }

    #[test]
    #[should_panic(expected = "dropout rate")]
    fn test_rate_of_one_rejected() {
        let mut rng = SimpleRng::new(1);
        let _ = DropoutLayer::new(4, 1.0, &mut rng);
    }
}
