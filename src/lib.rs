//! MNIST Experiments Library
//!
//! Small CPU deep-learning toolkit for handwritten-digit classification:
//! load and subsample the MNIST corpus, build a sequential model from explicit
//! layer descriptors, train it with mini-batch gradient descent, and evaluate
//! it into a loss/accuracy report, a confusion matrix and run artifacts.
//!
//! # Modules
//!
//! - `data`: IDX parsing, corpus subsampling, one-hot encoding
//! - `layers`: Layer trait and implementations (Dense, Conv2D, MaxPool2D, etc.)
//! - `architecture`: Layer descriptors, validation and model building
//! - `model`: Sequential model, summary and layer graph
//! - `loss`, `optimizers`: Loss functions and optimizer implementations (SGD, Adam, RMSprop)
//! - `train`: Training loop, history, run directories and metric sinks
//! - `evaluate`, `report`: Evaluation, confusion matrix, heatmap and graph output
//! - `pipeline`: End-to-end experiment runner
//! - `config`: Experiment configuration files
//! - `utils`: RNG, activation kernels, logging setup

pub mod architecture;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluate;
pub mod layers;
pub mod loss;
pub mod model;
pub mod optimizers;
pub mod pipeline;
pub mod report;
pub mod train;
pub mod utils;

pub use error::{Error, Result};
