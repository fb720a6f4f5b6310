//! Stochastic Gradient Descent (SGD) optimizer implementation
//!
//! Plain update `w = w - η * g`, or with momentum `v = μv - ηg; w = w + v`.

use crate::optimizers::Optimizer;

/// Stochastic Gradient Descent optimizer.
///
/// # Example
///
/// ```
/// use mnist_experiments::optimizers::{Optimizer, SGD};
///
/// let mut optimizer = SGD::new(0.1);
/// let mut params = vec![1.0, 2.0, 3.0];
/// optimizer.update(&mut params, &[0.1, 0.2, 0.3]);
/// assert!((params[0] - 0.99).abs() < 1e-6);
/// assert!((params[2] - 2.97).abs() < 1e-6);
/// ```
pub struct SGD {
    learning_rate: f32,
    momentum: f32,
    velocity: Vec<f32>,
}

impl SGD {
    /// Vanilla SGD without momentum.
    pub fn new(learning_rate: f32) -> Self {
        Self::with_momentum(learning_rate, 0.0)
    }

    pub fn with_momentum(learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: Vec::new(),
        }
    }

    pub fn momentum(&self) -> f32 {
        self.momentum
    }
}

impl Optimizer for SGD {
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32]) {
        assert_eq!(
            parameters.len(),
            gradients.len(),
            "Parameters and gradients must have the same length"
        );

        if self.momentum == 0.0 {
            for (param, grad) in parameters.iter_mut().zip(gradients.iter()) {
                *param -= self.learning_rate * grad;
            }
            return;
        }

        if self.velocity.len() != parameters.len() {
            self.velocity = vec![0.0; parameters.len()];
        }
        let steps = parameters
            .iter_mut()
            .zip(gradients)
            .zip(self.velocity.iter_mut());
        for ((param, grad), v) in steps {
            *v = self.momentum * *v - self.learning_rate * grad;
            *param += *v;
        }
    }

    fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sgd_new() {
        let optimizer = SGD::new(0.01);
        assert_eq!(optimizer.learning_rate(), 0.01);
        assert_eq!(optimizer.momentum(), 0.0);
    }

    #[test]
    fn test_sgd_update() {
        let mut optimizer = SGD::new(0.1);
        let mut params = vec![1.0, 2.0, 3.0];
        let grads = vec![0.1, 0.2, 0.3];

        optimizer.update(&mut params, &grads);

        assert!((params[0] - 0.99).abs() < 1e-6);
        assert!((params[1] - 1.98).abs() < 1e-6);
        assert!((params[2] - 2.97).abs() < 1e-6);
    }

    #[test]
    fn test_momentum_accumulates() {
        let mut optimizer = SGD::with_momentum(0.1, 0.9);
        let mut params = vec![0.0];

        optimizer.update(&mut params, &[1.0]);
        assert!((params[0] + 0.1).abs() < 1e-6);

        // v = 0.9 * -0.1 - 0.1 = -0.19
        optimizer.update(&mut params, &[1.0]);
        assert!((params[0] + 0.29).abs() < 1e-6);
    }

    #[test]
    #[should_panic(expected = "Parameters and gradients must have the same length")]
    fn test_sgd_mismatched_lengths() {
        let mut optimizer = SGD::new(0.1);
        let mut params = vec![1.0, 2.0];
        optimizer.update(&mut params, &[0.1]);
    }
}
