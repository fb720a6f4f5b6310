//! Architecture configuration structures
//!
//! A model is described as an ordered list of explicit layer descriptors,
//! usually read from the `architecture` section of an experiment config. Every
//! descriptor carries its own sizes, so a whole architecture can be checked
//! before any weight is allocated.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::layers::{
    ActivationKind, ActivationLayer, Conv2DLayer, DenseLayer, DropoutLayer, FlattenLayer, Layer,
    MaxPool2DLayer, Padding,
};
use crate::layers::conv2d::output_extent;
use crate::model::Model;
use crate::utils::rng::SimpleRng;

fn default_stride() -> usize {
    1
}

fn default_pool_size() -> usize {
    2
}

/// Configuration for a single layer.
///
/// # Examples
///
/// ```json
/// { "layer_type": "dense", "input_size": 784, "output_size": 128, "l2": 0.001 }
/// ```
///
/// ```json
/// {
///   "layer_type": "conv2d",
///   "in_channels": 1,
///   "out_channels": 8,
///   "kernel_size": 3,
///   "padding": "same",
///   "input_height": 28,
///   "input_width": 28
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layer_type", rename_all = "snake_case")]
pub enum LayerSpec {
    Dense {
        input_size: usize,
        output_size: usize,
        #[serde(default)]
        l2: f32,
    },
    Conv2d {
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        #[serde(default = "default_stride")]
        stride: usize,
        #[serde(default)]
        padding: Padding,
        input_height: usize,
        input_width: usize,
        #[serde(default)]
        l2: f32,
    },
    MaxPool2d {
        channels: usize,
        input_height: usize,
        input_width: usize,
        #[serde(default = "default_pool_size")]
        pool_size: usize,
        /// Defaults to `pool_size` (non-overlapping windows).
        #[serde(default)]
        stride: Option<usize>,
        #[serde(default)]
        padding: Padding,
    },
    Flatten {
        channels: usize,
        height: usize,
        width: usize,
    },
    Dropout {
        size: usize,
        rate: f32,
    },
    Activation {
        size: usize,
        function: ActivationKind,
    },
}

impl LayerSpec {
    pub fn layer_type(&self) -> &'static str {
        match self {
            LayerSpec::Dense { .. } => "dense",
            LayerSpec::Conv2d { .. } => "conv2d",
            LayerSpec::MaxPool2d { .. } => "max_pool2d",
            LayerSpec::Flatten { .. } => "flatten",
            LayerSpec::Dropout { .. } => "dropout",
            LayerSpec::Activation { .. } => "activation",
        }
    }

    /// Features per sample entering the layer.
    pub fn input_size(&self) -> usize {
        match *self {
            LayerSpec::Dense { input_size, .. } => input_size,
            LayerSpec::Conv2d {
                in_channels,
                input_height,
                input_width,
                ..
            } => in_channels * input_height * input_width,
            LayerSpec::MaxPool2d {
                channels,
                input_height,
                input_width,
                ..
            } => channels * input_height * input_width,
            LayerSpec::Flatten {
                channels,
                height,
                width,
            } => channels * height * width,
            LayerSpec::Dropout { size, .. } | LayerSpec::Activation { size, .. } => size,
        }
    }

    /// Features per sample leaving the layer, or `None` when a window does not
    /// fit the input.
    pub fn output_size(&self) -> Option<usize> {
        match *self {
            LayerSpec::Dense { output_size, .. } => Some(output_size),
            LayerSpec::Conv2d {
                out_channels,
                kernel_size,
                stride,
                padding,
                input_height,
                input_width,
                ..
            } => {
                let (h, _) = output_extent(input_height, kernel_size, stride, padding)?;
                let (w, _) = output_extent(input_width, kernel_size, stride, padding)?;
                Some(out_channels * h * w)
            }
            LayerSpec::MaxPool2d {
                channels,
                input_height,
                input_width,
                pool_size,
                stride,
                padding,
            } => {
                let stride = stride.unwrap_or(pool_size);
                let (h, _) = output_extent(input_height, pool_size, stride, padding)?;
                let (w, _) = output_extent(input_width, pool_size, stride, padding)?;
                Some(channels * h * w)
            }
            _ => Some(self.input_size()),
        }
    }

    fn validate(&self, index: usize) -> Result<()> {
        let positive = |name: &str, value: usize| {
            if value == 0 {
                Err(Error::layer(
                    index,
                    format!("{} {} must be greater than 0", self.layer_type(), name),
                ))
            } else {
                Ok(())
            }
        };
        let l2_ok = |l2: f32| {
            if l2.is_finite() && l2 >= 0.0 {
                Ok(())
            } else {
                Err(Error::layer(
                    index,
                    format!("{} l2 must be a non-negative number", self.layer_type()),
                ))
            }
        };

        match *self {
            LayerSpec::Dense {
                input_size,
                output_size,
                l2,
            } => {
                positive("input_size", input_size)?;
                positive("output_size", output_size)?;
                l2_ok(l2)?;
            }
            LayerSpec::Conv2d {
                in_channels,
                out_channels,
                kernel_size,
                stride,
                input_height,
                input_width,
                l2,
                ..
            } => {
                positive("in_channels", in_channels)?;
                positive("out_channels", out_channels)?;
                positive("kernel_size", kernel_size)?;
                positive("stride", stride)?;
                positive("input_height", input_height)?;
                positive("input_width", input_width)?;
                l2_ok(l2)?;
            }
            LayerSpec::MaxPool2d {
                channels,
                input_height,
                input_width,
                pool_size,
                stride,
                ..
            } => {
                positive("channels", channels)?;
                positive("input_height", input_height)?;
                positive("input_width", input_width)?;
                positive("pool_size", pool_size)?;
                positive("stride", stride.unwrap_or(pool_size))?;
            }
            LayerSpec::Flatten {
                channels,
                height,
                width,
            } => {
                positive("channels", channels)?;
                positive("height", height)?;
                positive("width", width)?;
            }
            LayerSpec::Dropout { size, rate } => {
                positive("size", size)?;
                if !(0.0..1.0).contains(&rate) {
                    return Err(Error::layer(index, "dropout rate must be in range [0.0, 1.0)"));
                }
            }
            LayerSpec::Activation { size, .. } => positive("size", size)?,
        }

        if self.output_size().is_none() {
            return Err(Error::layer(
                index,
                format!("{} window does not fit its input", self.layer_type()),
            ));
        }
        Ok(())
    }

    fn build(&self, rng: &mut SimpleRng) -> Box<dyn Layer> {
        match *self {
            LayerSpec::Dense {
                input_size,
                output_size,
                l2,
            } => Box::new(DenseLayer::new(input_size, output_size, rng).with_l2(l2)),
            LayerSpec::Conv2d {
                in_channels,
                out_channels,
                kernel_size,
                stride,
                padding,
                input_height,
                input_width,
                l2,
            } => Box::new(
                Conv2DLayer::new(
                    in_channels,
                    out_channels,
                    kernel_size,
                    stride,
                    padding,
                    input_height,
                    input_width,
                    rng,
                )
                .with_l2(l2),
            ),
            LayerSpec::MaxPool2d {
                channels,
                input_height,
                input_width,
                pool_size,
                stride,
                padding,
            } => Box::new(MaxPool2DLayer::new(
                channels,
                input_height,
                input_width,
                pool_size,
                stride.unwrap_or(pool_size),
                padding,
            )),
            LayerSpec::Flatten {
                channels,
                height,
                width,
            } => Box::new(FlattenLayer::new(channels, height, width)),
            LayerSpec::Dropout { size, rate } => Box::new(DropoutLayer::new(size, rate, rng)),
            LayerSpec::Activation { size, function } => {
                Box::new(ActivationLayer::new(size, function))
            }
        }
    }
}

/// Configuration for the entire network: layers in application order.
///
/// # Example
///
/// ```json
/// {
///   "layers": [
///     { "layer_type": "dense", "input_size": 784, "output_size": 128 },
///     { "layer_type": "activation", "size": 128, "function": "relu" },
///     { "layer_type": "dropout", "size": 128, "rate": 0.2 },
///     { "layer_type": "dense", "input_size": 128, "output_size": 10 },
///     { "layer_type": "activation", "size": 10, "function": "softmax" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureConfig {
    pub layers: Vec<LayerSpec>,
}

impl ArchitectureConfig {
    /// Features per sample the first layer expects.
    pub fn input_size(&self) -> Option<usize> {
        self.layers.first().map(LayerSpec::input_size)
    }

    /// Features per sample the last layer produces.
    pub fn output_size(&self) -> Option<usize> {
        self.layers.last().and_then(LayerSpec::output_size)
    }
}

/// Loads and validates an architecture from a JSON file.
///
/// # Examples
///
/// ```no_run
/// use mnist_experiments::architecture::load_architecture;
///
/// let arch = load_architecture("config/architectures/mlp.json").unwrap();
/// assert!(!arch.layers.is_empty());
/// ```
pub fn load_architecture(path: impl AsRef<Path>) -> Result<ArchitectureConfig> {
    let contents = fs::read_to_string(path)?;
    let config: ArchitectureConfig = serde_json::from_str(&contents)?;
    validate_architecture(&config)?;
    Ok(config)
}

/// Checks every layer's values and that each layer's input size equals the
/// previous layer's output size.
pub fn validate_architecture(config: &ArchitectureConfig) -> Result<()> {
    if config.layers.is_empty() {
        return Err(Error::config("architecture must contain at least one layer"));
    }

    let mut previous_output: Option<usize> = None;
    for (index, layer) in config.layers.iter().enumerate() {
        layer.validate(index)?;
        if let Some(actual) = previous_output {
            let expected = layer.input_size();
            if expected != actual {
                return Err(Error::ShapeMismatch {
                    index,
                    expected,
                    actual,
                });
            }
        }
        previous_output = layer.output_size();
    }
    Ok(())
}

/// Builds a model from a validated architecture.
///
/// `feature_len` is the dimensionality of the examples the model will see;
/// a first layer expecting anything else is rejected before any weights are
/// created. Weights are Xavier-uniform from `rng`, biases start at zero.
pub fn build_model(
    config: &ArchitectureConfig,
    feature_len: usize,
    rng: &mut SimpleRng,
) -> Result<Model> {
    validate_architecture(config)?;

    let expected = config.layers[0].input_size();
    if expected != feature_len {
        return Err(Error::ShapeMismatch {
            index: 0,
            expected,
            actual: feature_len,
        });
    }

    let layers: Vec<Box<dyn Layer>> = config.layers.iter().map(|spec| spec.build(rng)).collect();
    let model = Model::new(layers)?;
    tracing::debug!(
        layers = config.layers.len(),
        parameters = model.parameter_count(),
        "built model"
    );
    Ok(model)
}
