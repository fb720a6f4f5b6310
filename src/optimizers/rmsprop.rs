//! RMSprop optimizer implementation

use crate::optimizers::Optimizer;

/// RMSprop: scales each step by a running root-mean-square of gradients.
///
/// ```text
/// s = ρ * s + (1 - ρ) * g²
/// w = w - η * g / (√s + ε)
/// ```
pub struct RmsProp {
    learning_rate: f32,
    rho: f32,
    epsilon: f32,
    mean_square: Vec<f32>,
}

impl RmsProp {
    pub fn new(learning_rate: f32, rho: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            rho,
            epsilon,
            mean_square: Vec::new(),
        }
    }
}

impl Optimizer for RmsProp {
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32]) {
        assert_eq!(
            parameters.len(),
            gradients.len(),
            "Parameters and gradients must have the same length"
        );

        if self.mean_square.len() != parameters.len() {
            self.mean_square = vec![0.0; parameters.len()];
        }

        let steps = parameters
            .iter_mut()
            .zip(gradients)
            .zip(self.mean_square.iter_mut());
        for ((param, &g), s) in steps {
            *s = self.rho * *s + (1.0 - self.rho) * g * g;
            *param -= self.learning_rate * g / (s.sqrt() + self.epsilon);
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
    fn test_first_step() {
        // s = 0.1 * g², so the step is lr / sqrt(0.1) in the gradient's direction.
        let mut optimizer = RmsProp::new(0.001, 0.9, 1e-7);
        let mut params = vec![0.0, 0.0];
        optimizer.update(&mut params, &[2.0, -0.5]);

        let expected = 0.001 / 0.1f32.sqrt();
        assert!((params[0] + expected).abs() < 1e-5);
        assert!((params[1] - expected).abs() < 1e-5);
    }

    #[test]
    fn test_mean_square_accumulates() {
        let mut optimizer = RmsProp::new(0.01, 0.9, 1e-7);
        let mut params = vec![0.0];
        optimizer.update(&mut params, &[1.0]);
        optimizer.update(&mut params, &[1.0]);

        // s = 0.1 after the first step, 0.9 * 0.1 + 0.1 = 0.19 after the second.
        assert!((optimizer.mean_square[0] - 0.19).abs() < 1e-6);
        let expected = 0.01 / 0.1f32.sqrt() + 0.01 / 0.19f32.sqrt();
        assert!((params[0] + expected).abs() < 1e-5);
    }
}
