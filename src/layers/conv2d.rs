//! 2D Convolutional layer implementation
//!
//! Inputs and outputs are stored channel-first per sample
//! (`channels × height × width`), which for a single grayscale channel is the
//! same memory layout as a flattened image.

use std::cell::RefCell;

use serde::{Deserialize, Serialize};

use crate::layers::{Layer, ParameterVisitor, Phase};
use crate::utils::SimpleRng;

/// Padding policy for convolution and pooling windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Padding {
    /// No padding; windows must fit entirely inside the input.
    #[default]
    Valid,
    /// Zero-pad so that `output = ceil(input / stride)`.
    Same,
}

/// Output extent and leading pad along one spatial axis.
///
/// Returns `None` when a `Valid` window does not fit or any argument is zero.
///
/// ```
/// use mnist_experiments::layers::conv2d::{output_extent, Padding};
///
/// assert_eq!(output_extent(28, 3, 1, Padding::Valid), Some((26, 0)));
/// assert_eq!(output_extent(28, 3, 1, Padding::Same), Some((28, 1)));
/// assert_eq!(output_extent(28, 2, 2, Padding::Valid), Some((14, 0)));
/// ```
pub fn output_extent(
    input: usize,
    window: usize,
    stride: usize,
    padding: Padding,
) -> Option<(usize, usize)> {
    if input == 0 || window == 0 || stride == 0 {
        return None;
    }
    match padding {
        Padding::Valid => {
            if window > input {
                None
            } else {
                Some(((input - window) / stride + 1, 0))
            }
        }
        Padding::Same => {
            let out = input.div_ceil(stride);
            let needed = (out - 1) * stride + window;
            let pad_total = needed.saturating_sub(input);
            Some((out, pad_total / 2))
        }
    }
}

/// 2D Convolutional layer with learnable filters.
///
/// # Fields
///
/// * `weights` - Filters (out_channels × in_channels × kernel_size × kernel_size)
/// * `biases` - One bias per output channel
/// * `pad_top`, `pad_left` - Leading zero padding derived from the policy
///
/// # Example
///
/// ```
/// use mnist_experiments::layers::{Conv2DLayer, Layer, Padding};
/// use mnist_experiments::utils::SimpleRng;
///
/// let mut rng = SimpleRng::new(42);
/// let layer = Conv2DLayer::new(1, 8, 3, 1, Padding::Same, 28, 28, &mut rng);
/// assert_eq!(layer.output_size(), 8 * 28 * 28);
/// ```
pub struct Conv2DLayer {
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: Padding,
    input_height: usize,
    input_width: usize,
    output_height: usize,
    output_width: usize,
    pad_top: isize,
    pad_left: isize,
    weights: Vec<f32>,
    biases: Vec<f32>,
    l2: f32,
    grad_weights: RefCell<Vec<f32>>,
    grad_biases: RefCell<Vec<f32>>,
}

impl Conv2DLayer {
    /// Create a new Conv2DLayer with Xavier initialization.
    ///
    /// fan_in = in_channels × kernel², fan_out = out_channels × kernel².
    ///
    /// # Panics
    ///
    /// Panics if the kernel does not fit the input under the padding policy;
    /// architectures are validated before layers are constructed.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: Padding,
        input_height: usize,
        input_width: usize,
        rng: &mut SimpleRng,
    ) -> Self {
        let (output_height, pad_top) = output_extent(input_height, kernel_size, stride, padding)
            .expect("kernel does not fit input height");
        let (output_width, pad_left) = output_extent(input_width, kernel_size, stride, padding)
            .expect("kernel does not fit input width");

        let fan_in = (in_channels * kernel_size * kernel_size) as f32;
        let fan_out = (out_channels * kernel_size * kernel_size) as f32;
        let limit = (6.0f32 / (fan_in + fan_out)).sqrt();

        let weight_count = out_channels * in_channels * kernel_size * kernel_size;
        let mut weights = vec![0.0f32; weight_count];
        for value in &mut weights {
            *value = rng.gen_range_f32(-limit, limit);
        }

        Self {
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
            input_height,
            input_width,
            output_height,
            output_width,
            pad_top: pad_top as isize,
            pad_left: pad_left as isize,
            weights,
            biases: vec![0.0f32; out_channels],
            l2: 0.0,
            grad_weights: RefCell::new(vec![0.0f32; weight_count]),
            grad_biases: RefCell::new(vec![0.0f32; out_channels]),
        }
    }

    /// Sets the L2 penalty factor on the filters.
    pub fn with_l2(mut self, l2: f32) -> Self {
        self.l2 = l2;
        self
    }

    /// Replaces the filters and biases.
    ///
    /// # Panics
    ///
    /// Panics if the lengths differ from the current parameters.
    pub fn set_parameters(&mut self, weights: Vec<f32>, biases: Vec<f32>) {
        assert_eq!(weights.len(), self.weights.len(), "weights length mismatch");
        assert_eq!(biases.len(), self.biases.len(), "biases length mismatch");
        self.weights = weights;
        self.biases = biases;
    }

    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn padding(&self) -> Padding {
        self.padding
    }

    pub fn output_height(&self) -> usize {
        self.output_height
    }

    pub fn output_width(&self) -> usize {
        self.output_width
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Input pixel index for output position `(oy, ox)` and kernel tap
    /// `(ky, kx)`, or `None` when the tap falls into the padding.
    #[inline]
    fn input_offset(&self, oy: usize, ox: usize, ky: usize, kx: usize) -> Option<usize> {
        let iy = (oy * self.stride + ky) as isize - self.pad_top;
        let ix = (ox * self.stride + kx) as isize - self.pad_left;
        if iy < 0 || ix < 0 || iy >= self.input_height as isize || ix >= self.input_width as isize {
            None
        } else {
            Some(iy as usize * self.input_width + ix as usize)
        }
    }
}

impl Layer for Conv2DLayer {
    fn kind(&self) -> &'static str {
        "conv2d"
    }

    fn forward(&self, input: &[f32], output: &mut [f32], batch_size: usize, _phase: Phase) {
        assert_eq!(input.len(), batch_size * self.input_size(), "conv2d input len mismatch");
        assert_eq!(output.len(), batch_size * self.output_size(), "conv2d output len mismatch");

        let out_spatial = self.output_height * self.output_width;
        let in_spatial = self.input_height * self.input_width;
        let k = self.kernel_size;

        for b in 0..batch_size {
            let in_base = b * self.in_channels * in_spatial;
            let out_base_b = b * self.out_channels * out_spatial;

            for oc in 0..self.out_channels {
                let out_base = out_base_b + oc * out_spatial;

                for oy in 0..self.output_height {
                    for ox in 0..self.output_width {
                        let mut sum = self.biases[oc];

                        for ic in 0..self.in_channels {
                            let w_base = (oc * self.in_channels + ic) * k * k;
                            let in_base_c = in_base + ic * in_spatial;

                            for ky in 0..k {
                                for kx in 0..k {
                                    if let Some(offset) = self.input_offset(oy, ox, ky, kx) {
                                        sum += input[in_base_c + offset]
                                            * self.weights[w_base + ky * k + kx];
                                    }
                                }
                            }
                        }

                        output[out_base + oy * self.output_width + ox] = sum;
                    }
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
            batch_size * self.output_size(),
            "conv2d grad_output len mismatch"
        );
        assert_eq!(
            grad_input.len(),
            batch_size * self.input_size(),
            "conv2d grad_input len mismatch"
        );

        let scale = 1.0f32 / batch_size as f32;
        let out_spatial = self.output_height * self.output_width;
        let in_spatial = self.input_height * self.input_width;
        let k = self.kernel_size;

        let mut grad_w = self.grad_weights.borrow_mut();
        let mut grad_b = self.grad_biases.borrow_mut();

        grad_input.iter_mut().for_each(|v| *v = 0.0);

        for b in 0..batch_size {
            let in_base = b * self.in_channels * in_spatial;
            let g_base_b = b * self.out_channels * out_spatial;

            for oc in 0..self.out_channels {
                let g_base = g_base_b + oc * out_spatial;

                for oy in 0..self.output_height {
                    for ox in 0..self.output_width {
                        let g = grad_output[g_base + oy * self.output_width + ox];
                        if g == 0.0 {
                            continue;
                        }
                        grad_b[oc] += g * scale;

                        for ic in 0..self.in_channels {
                            let w_base = (oc * self.in_channels + ic) * k * k;
                            let in_base_c = in_base + ic * in_spatial;

                            for ky in 0..k {
                                for kx in 0..k {
                                    if let Some(offset) = self.input_offset(oy, ox, ky, kx) {
                                        let in_idx = in_base_c + offset;
                                        let w_idx = w_base + ky * k + kx;
                                        grad_w[w_idx] += g * input[in_idx] * scale;
                                        grad_input[in_idx] += g * self.weights[w_idx];
                                    }
                                }
                            }
                        }
                    }
                }
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
        self.in_channels * self.input_height * self.input_width
    }

    fn output_size(&self) -> usize {
        self.out_channels * self.output_height * self.output_width
    }

    fn parameter_count(&self) -> usize {
        self.weights.len() + self.biases.len()
    }

    fn output_shape(&self) -> Vec<usize> {
        vec![self.out_channels, self.output_height, self.output_width]
    }
}
