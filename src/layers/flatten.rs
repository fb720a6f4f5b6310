//! Flatten: reinterprets `channels × height × width` feature maps as a vector.
//!
//! Buffers are already flat, so the layer only copies data; it exists to make
//! the shape change explicit in the architecture.

use crate::layers::{Layer, Phase};

pub struct FlattenLayer {
    channels: usize,
    height: usize,
    width: usize,
}

impl FlattenLayer {
    pub fn new(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
        }
    }

    pub fn input_shape(&self) -> [usize; 3] {
        [self.channels, self.height, self.width]
    }
}

impl Layer for FlattenLayer {
    fn kind(&self) -> &'static str {
        "flatten"
    }

    fn forward(&self, input: &[f32], output: &mut [f32], _batch_size: usize, _phase: Phase) {
        output.copy_from_slice(input);
    }

    fn backward(
        &self,
        _input: &[f32],
        _output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        _batch_size: usize,
    ) {
        grad_input.copy_from_slice(grad_output);
    }

    fn input_size(&self) -> usize {
        self.channels * self.height * self.width
    }

    fn output_size(&self) -> usize {
        self.input_size()
    }

    fn parameter_count(&self) -> usize {
        0
    }
}
