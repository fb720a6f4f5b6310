//! Optimizer abstractions for neural network parameter updates
//!
//! Optimizers turn accumulated gradients into parameter updates. Stateful
//! optimizers (momentum SGD, Adam, RMSprop) keep one state vector per
//! parameter buffer, so the trainer holds one optimizer instance per buffer,
//! all built from the same [`OptimizerConfig`].
//!
//! # Available Optimizers
//!
//! - SGD: gradient descent with optional momentum
//! - Adam: adaptive moment estimation with bias correction
//! - RMSprop: per-parameter step sizes from a running mean of squared gradients
//!
//! # Example
//!
//! ```
//! use mnist_experiments::optimizers::{Optimizer, OptimizerConfig};
//!
//! let config: OptimizerConfig = serde_json::from_str(r#"{"kind": "adam"}"#).unwrap();
//! let mut optimizer = config.build();
//! let mut weights = vec![1.0f32, 2.0];
//! optimizer.update(&mut weights, &[0.5, -0.5]);
//! assert!(weights[0] < 1.0 && weights[1] > 2.0);
//! ```

pub mod adam;
pub mod rmsprop;
pub mod sgd;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use adam::Adam;
pub use rmsprop::RmsProp;
pub use sgd::SGD;

/// Core trait for neural network optimizers.
pub trait Optimizer {
    /// Update parameters in place using their gradients.
    ///
    /// # Panics
    ///
    /// Implementations panic if parameters and gradients have different lengths.
    fn update(&mut self, parameters: &mut [f32], gradients: &[f32]);

    fn learning_rate(&self) -> f32;
}

fn default_sgd_lr() -> f32 {
    0.01
}

fn default_adaptive_lr() -> f32 {
    0.001
}

fn default_beta1() -> f32 {
    0.9
}

fn default_beta2() -> f32 {
    0.999
}

fn default_rho() -> f32 {
    0.9
}

fn default_epsilon() -> f32 {
    1e-7
}

/// Optimization algorithm and its hyperparameters.
///
/// ```json
/// { "kind": "sgd", "learning_rate": 0.01, "momentum": 0.9 }
/// { "kind": "adam" }
/// { "kind": "rmsprop", "learning_rate": 0.0005 }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerConfig {
    Sgd {
        #[serde(default = "default_sgd_lr")]
        learning_rate: f32,
        #[serde(default)]
        momentum: f32,
    },
    Adam {
        #[serde(default = "default_adaptive_lr")]
        learning_rate: f32,
        #[serde(default = "default_beta1")]
        beta1: f32,
        #[serde(default = "default_beta2")]
        beta2: f32,
        #[serde(default = "default_epsilon")]
        epsilon: f32,
    },
    #[serde(rename = "rmsprop")]
    RmsProp {
        #[serde(default = "default_adaptive_lr")]
        learning_rate: f32,
        #[serde(default = "default_rho")]
        rho: f32,
        #[serde(default = "default_epsilon")]
        epsilon: f32,
    },
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig::Sgd {
            learning_rate: default_sgd_lr(),
            momentum: 0.0,
        }
    }
}

impl OptimizerConfig {
    /// Creates a fresh optimizer with no accumulated state.
    pub fn build(&self) -> Box<dyn Optimizer> {
        match *self {
            OptimizerConfig::Sgd {
                learning_rate,
                momentum,
            } => Box::new(SGD::with_momentum(learning_rate, momentum)),
            OptimizerConfig::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => Box::new(Adam::new(learning_rate, beta1, beta2, epsilon)),
            OptimizerConfig::RmsProp {
                learning_rate,
                rho,
                epsilon,
            } => Box::new(RmsProp::new(learning_rate, rho, epsilon)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OptimizerConfig::Sgd { .. } => "sgd",
            OptimizerConfig::Adam { .. } => "adam",
            OptimizerConfig::RmsProp { .. } => "rmsprop",
        }
    }

    pub fn learning_rate(&self) -> f32 {
        match *self {
            OptimizerConfig::Sgd { learning_rate, .. }
            | OptimizerConfig::Adam { learning_rate, .. }
            | OptimizerConfig::RmsProp { learning_rate, .. } => learning_rate,
        }
    }

    /// Checks hyperparameter ranges.
    pub fn validate(&self) -> Result<()> {
        let lr = self.learning_rate();
        if !(lr.is_finite() && lr > 0.0) {
            return Err(Error::config(format!(
                "{}: learning_rate must be positive",
                self.name()
            )));
        }
        match *self {
            OptimizerConfig::Sgd { momentum, .. } => {
                if !(0.0..1.0).contains(&momentum) {
                    return Err(Error::config("sgd: momentum must be in range [0.0, 1.0)"));
                }
            }
            OptimizerConfig::Adam {
                beta1,
                beta2,
                epsilon,
                ..
            } => {
                if !(0.0..1.0).contains(&beta1) || !(0.0..1.0).contains(&beta2) {
                    return Err(Error::config(
                        "adam: beta1 and beta2 must be in range [0.0, 1.0)",
                    ));
                }
                if epsilon <= 0.0 {
                    return Err(Error::config("adam: epsilon must be positive"));
                }
            }
            OptimizerConfig::RmsProp { rho, epsilon, .. } => {
                if !(0.0..1.0).contains(&rho) {
                    return Err(Error::config("rmsprop: rho must be in range [0.0, 1.0)"));
                }
                if epsilon <= 0.0 {
                    return Err(Error::config("rmsprop: epsilon must be positive"));
                }
            }
        }
        Ok(())
    }
}
