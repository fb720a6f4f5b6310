//! 2D max pooling over channel-first feature maps.

use std::cell::RefCell;

use crate::layers::conv2d::{output_extent, Padding};
use crate::layers::{Layer, Phase};

/// Max pooling with a square window.
///
/// Forward remembers, for every output cell, which input cell won, and
/// backward routes the gradient only to that cell. Windows hanging over a
/// `Same` border only consider the cells inside the input.
pub struct MaxPool2DLayer {
    channels: usize,
    input_height: usize,
    input_width: usize,
    pool_size: usize,
    stride: usize,
    output_height: usize,
    output_width: usize,
    pad_top: isize,
    pad_left: isize,
    argmax: RefCell<Vec<usize>>,
}

impl MaxPool2DLayer {
    /// # Panics
    ///
    /// Panics if the window does not fit the input under the padding policy.
    pub fn new(
        channels: usize,
        input_height: usize,
        input_width: usize,
        pool_size: usize,
        stride: usize,
        padding: Padding,
    ) -> Self {
        let (output_height, pad_top) =
            output_extent(input_height, pool_size, stride, padding)
                .expect("pool window does not fit input height");
        let (output_width, pad_left) =
            output_extent(input_width, pool_size, stride, padding)
                .expect("pool window does not fit input width");

        Self {
            channels,
            input_height,
            input_width,
            pool_size,
            stride,
            output_height,
            output_width,
            pad_top: pad_top as isize,
            pad_left: pad_left as isize,
            argmax: RefCell::new(Vec::new()),
        }
    }

    pub fn output_height(&self) -> usize {
        self.output_height
    }

    pub fn output_width(&self) -> usize {
        self.output_width
    }
}

impl Layer for MaxPool2DLayer {
    fn kind(&self) -> &'static str {
        "max_pool2d"
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize, _phase: Phase) {
        assert_eq!(input.len(), batch_size * self.input_size(), "max_pool2d input len mismatch");
        assert_eq!(output.len(), batch_size * self.output_size(), "max_pool2d output len mismatch");

        let in_spatial = self.input_height * self.input_width;
        let out_spatial = self.output_height * self.output_width;
        let mut argmax = self.argmax.borrow_mut();
        argmax.resize(output.len(), 0);

        for plane in 0..batch_size * self.channels {
            let in_base = plane * in_spatial;
            let out_base = plane * out_spatial;

            for py in 0..self.output_height {
                for px in 0..self.output_width {
                    let mut best = f32::NEG_INFINITY;
                    let mut best_idx = in_base;

                    for dy in 0..self.pool_size {
                        for dx in 0..self.pool_size {
                            let iy = (py * self.stride + dy) as isize - self.pad_top;
                            let ix = (px * self.stride + dx) as isize - self.pad_left;
                            if iy < 0
                                || ix < 0
                                || iy >= self.input_height as isize
                                || ix >= self.input_width as isize
                            {
                                continue;
                            }
                            let idx = in_base + iy as usize * self.input_width + ix as usize;
                            if input[idx] > best {
                                best = input[idx];
                                best_idx = idx;
                            }
                        }
                    }

                    let out_idx = out_base + py * self.output_width + px;
                    output[out_idx] = best;
                    argmax[out_idx] = best_idx;
                }
            }
        }
    }

    fn backward(
        &self,
        _input: &[f32],
        _output: &[f32],
        grad_output: &[f32],
        grad_input: &mut [f32],
        batch_size: usize,
    ) {
        assert_eq!(
            grad_input.len(),
            batch_size * self.input_size(),
            "max_pool2d grad_input len mismatch"
        );
        let argmax = self.argmax.borrow();
        assert_eq!(argmax.len(), grad_output.len(), "max_pool2d backward without matching forward");

        grad_input.iter_mut().for_each(|v| *v = 0.0);
        for (&src, &g) in argmax.iter().zip(grad_output) {
            grad_input[src] += g;
        }
    }

    fn input_size(&self) -> usize {
        self.channels * self.input_height * self.input_width
    }

    fn output_size(&self) -> usize {
        self.channels * self.output_height * self.output_width
    }

    fn parameter_count(&self) -> usize {
        0
    }

    fn output_shape(&self) -> Vec<usize> {
        vec![self.channels, self.output_height, self.output_width]
    }
}
