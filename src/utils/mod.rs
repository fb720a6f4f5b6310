//! Shared utilities: random number generation, activation math and logging setup.

pub mod activations;
pub mod logging;
pub mod rng;

pub use activations::{relu_inplace, softmax_rows};
pub use rng::SimpleRng;
