//! Activation functions over flat row-major buffers.
//!
//! Forward functions work in place. Backward functions take the activation
//! *output* (not the pre-activation) and turn an upstream gradient into the
//! gradient with respect to the pre-activation.

/// ReLU applied in-place.
pub fn relu_inplace(data: &mut [f32]) {
    for value in data.iter_mut() {
        if *value < 0.0 {
            *value = 0.0;
        }
    }
}

/// Logistic sigmoid applied in-place.
pub fn sigmoid_inplace(data: &mut [f32]) {
    for value in data.iter_mut() {
        *value = 1.0 / (1.0 + (-*value).exp());
    }
}

/// Hyperbolic tangent applied in-place.
pub fn tanh_inplace(data: &mut [f32]) {
    for value in data.iter_mut() {
        *value = value.tanh();
    }
}

/// Softmax applied row-wise.
///
/// Uses the max-subtraction trick for numerical stability.
///
/// # Arguments
/// * `outputs` - Flat array containing row-major matrix data
/// * `rows` - Number of rows in the matrix
/// * `cols` - Number of columns in the matrix
pub fn softmax_rows(outputs: &mut [f32], rows: usize, cols: usize) {
    if cols == 0 {
        return;
    }
    assert_eq!(outputs.len(), rows * cols, "outputs length mismatch in softmax_rows");

    for row in outputs.chunks_exact_mut(cols).take(rows) {
        let mut max_value = row[0];
        for &value in row.iter().skip(1) {
            if value > max_value {
                max_value = value;
            }
        }

        let mut sum = 0.0f32;
        for value in row.iter_mut() {
            *value = (*value - max_value).exp();
            sum += *value;
        }

        let inv_sum = 1.0f32 / sum;
        for value in row.iter_mut() {
            *value *= inv_sum;
        }
    }
}

pub fn relu_backward(output: &[f32], grad_output: &[f32], grad_input: &mut [f32]) {
    for ((g_in, &g_out), &y) in grad_input.iter_mut().zip(grad_output).zip(output) {
        *g_in = if y > 0.0 { g_out } else { 0.0 };
    }
}

pub fn sigmoid_backward(output: &[f32], grad_output: &[f32], grad_input: &mut [f32]) {
    for ((g_in, &g_out), &y) in grad_input.iter_mut().zip(grad_output).zip(output) {
        *g_in = g_out * y * (1.0 - y);
    }
}

pub fn tanh_backward(output: &[f32], grad_output: &[f32], grad_input: &mut [f32]) {
    for ((g_in, &g_out), &y) in grad_input.iter_mut().zip(grad_output).zip(output) {
        *g_in = g_out * (1.0 - y * y);
    }
}

/// Row-wise softmax Jacobian-vector product: `dx = y * (g - <g, y>)`.
pub fn softmax_backward(
    output: &[f32],
    grad_output: &[f32],
    grad_input: &mut [f32],
    rows: usize,
    cols: usize,
) {
    for r in 0..rows {
        let range = r * cols..(r + 1) * cols;
        let y = &output[range.clone()];
        let g = &grad_output[range.clone()];
        let dot: f32 = y.iter().zip(g).map(|(a, b)| a * b).sum();
        for ((dx, &yi), &gi) in grad_input[range].iter_mut().zip(y).zip(g) {
            *dx = yi * (gi - dot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON_F32: f32 = 1e-6;

    #[test]
    fn test_relu_mixed() {
        let mut data = vec![-2.0, -1.0, 0.0, 1.0, 2.0];
        relu_inplace(&mut data);
        assert_eq!(data, vec![0.0, 0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_sigmoid_zero() {
        let mut data = vec![0.0f32];
        sigmoid_inplace(&mut data);
        assert!((data[0] - 0.5).abs() < EPSILON_F32);
    }

    #[test]
    fn test_tanh_is_odd() {
        let mut data = vec![-0.7f32, 0.7];
        tanh_inplace(&mut data);
        assert!((data[0] + data[1]).abs() < EPSILON_F32);
    }

    #[test]
    fn test_softmax_single_row_sum() {
        let mut data = vec![1.0, 2.0, 3.0];
        softmax_rows(&mut data, 1, 3);
        let sum: f32 = data.iter().sum();
        assert!((sum - 1.0).abs() < EPSILON_F32);
    }

    #[test]
    fn test_softmax_numerical_stability() {
        let mut data = vec![1000.0, 1001.0, 1002.0];
        softmax_rows(&mut data, 1, 3);
        let sum: f32 = data.iter().sum();
        assert!((sum - 1.0).abs() < EPSILON_F32);
        assert!(!data.iter().any(|&x| x.is_nan() || x.is_infinite()));
    }

    #[test]
    fn test_relu_backward_masks_inactive_units() {
        let output = [0.0, 2.0, 0.0, 0.5];
        let grad_output = [1.0, 1.0, 1.0, -3.0];
        let mut grad_input = [9.0; 4];
        relu_backward(&output, &grad_output, &mut grad_input);
        assert_eq!(grad_input, [0.0, 1.0, 0.0, -3.0]);
    }

    #[test]
    fn test_softmax_backward_with_cross_entropy_gradient() {
        // -t/y through softmax reduces to y - t.
        let mut y = vec![0.5f32, 1.0, -0.5];
        softmax_rows(&mut y, 1, 3);
        let target = [0.0f32, 1.0, 0.0];
        let upstream: Vec<f32> = y.iter().zip(&target).map(|(p, t)| -t / p).collect();
        let mut dx = [0.0f32; 3];
        softmax_backward(&y, &upstream, &mut dx, 1, 3);
        for j in 0..3 {
            assert!((dx[j] - (y[j] - target[j])).abs() < 1e-5);
        }
    }
}
