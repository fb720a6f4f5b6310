// Tests for numerical gradient checking using finite differences.
// Analytical parameter gradients from Model::backward are compared against
// central differences of the batch-mean loss plus the L2 penalty.

use approx::relative_eq;
use mnist_experiments::layers::{
    ActivationKind, ActivationLayer, Conv2DLayer, DenseLayer, FlattenLayer, Layer, Padding, Phase,
};
use mnist_experiments::loss::LossKind;
use mnist_experiments::model::Model;
use mnist_experiments::utils::SimpleRng;

const EPSILON: f32 = 1e-3;

// Batch-mean loss plus regularization, the quantity the parameter gradients describe.
fn objective(model: &Model, loss: LossKind, input: &[f32], targets: &[f32], rows: usize) -> f32 {
    let output = model.predict(input, rows);
    let cols = model.output_size();
    let mut scratch = vec![0.0f32; rows * cols];
    loss.compute(&output, targets, rows, cols, &mut scratch) / rows as f32
        + model.regularization_loss()
}

// Runs one forward/backward pass and collects every (layer, slot) gradient buffer.
fn analytic_gradients(
    model: &mut Model,
    loss: LossKind,
    input: &[f32],
    targets: &[f32],
    rows: usize,
) -> Vec<(usize, usize, Vec<f32>)> {
    let activations = model.forward(input, rows, Phase::Training);
    let cols = model.output_size();
    let mut grad = vec![0.0f32; rows * cols];
    loss.compute(&activations[activations.len() - 1], targets, rows, cols, &mut grad);
    model.backward(&activations, &grad, rows);

    let mut collected = Vec::new();
    model.apply_gradients(&mut |layer, slot, _params, grads| {
        collected.push((layer, slot, grads.to_vec()))
    });
    collected
}

fn nudge(model: &mut Model, layer: usize, slot: usize, index: usize, delta: f32) {
    model.apply_gradients(&mut |l, s, params, _grads| {
        if l == layer && s == slot {
            params[index] += delta;
        }
    });
}

fn numeric_gradient(
    model: &mut Model,
    loss: LossKind,
    input: &[f32],
    targets: &[f32],
    rows: usize,
    (layer, slot, index): (usize, usize, usize),
) -> f32 {
    nudge(model, layer, slot, index, EPSILON);
    let plus = objective(model, loss, input, targets, rows);
    nudge(model, layer, slot, index, -2.0 * EPSILON);
    let minus = objective(model, loss, input, targets, rows);
    nudge(model, layer, slot, index, EPSILON);
    (plus - minus) / (2.0 * EPSILON)
}

// Checks up to `per_buffer` evenly spaced entries of every parameter buffer.
fn check_model(
    mut model: Model,
    loss: LossKind,
    input: &[f32],
    targets: &[f32],
    rows: usize,
    per_buffer: usize,
) {
    let gradients = analytic_gradients(&mut model, loss, input, targets, rows);
    assert!(!gradients.is_empty(), "model has no parameters");

    for (layer, slot, grads) in gradients {
        let step = (grads.len() / per_buffer).max(1);
        for index in (0..grads.len()).step_by(step) {
            let numeric =
                numeric_gradient(&mut model, loss, input, targets, rows, (layer, slot, index));
            let analytic = grads[index];
            assert!(
                relative_eq!(analytic, numeric, epsilon = 2e-3, max_relative = 5e-2),
                "layer {layer} slot {slot} index {index}: analytic {analytic}, numeric {numeric}"
            );
        }
    }
}

fn random_input(len: usize, rng: &mut SimpleRng) -> Vec<f32> {
    (0..len).map(|_| rng.gen_range_f32(-1.0, 1.0)).collect()
}

fn one_hot_rows(labels: &[usize], classes: usize) -> Vec<f32> {
    let mut targets = vec![0.0f32; labels.len() * classes];
    for (row, &label) in labels.iter().enumerate() {
        targets[row * classes + label] = 1.0;
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Dense Stacks
    // ========================================================================

    #[test]
    fn test_gradient_checking_dense_softmax_crossentropy() {
        let mut rng = SimpleRng::new(42);
        let model = Model::new(vec![
            Box::new(DenseLayer::new(5, 4, &mut rng)),
            Box::new(ActivationLayer::new(4, ActivationKind::Sigmoid)),
            Box::new(DenseLayer::new(4, 3, &mut rng)),
            Box::new(ActivationLayer::new(3, ActivationKind::Softmax)),
        ])
        .unwrap();
        let input = random_input(2 * 5, &mut rng);
        let targets = one_hot_rows(&[0, 2], 3);

        check_model(model, LossKind::CategoricalCrossentropy, &input, &targets, 2, 20);
    }

    #[test]
    fn test_gradient_checking_dense_tanh_mse() {
        let mut rng = SimpleRng::new(7);
        let model = Model::new(vec![
            Box::new(DenseLayer::new(3, 6, &mut rng)),
            Box::new(ActivationLayer::new(6, ActivationKind::Tanh)),
            Box::new(DenseLayer::new(6, 2, &mut rng)),
            Box::new(ActivationLayer::new(2, ActivationKind::Linear)),
        ])
        .unwrap();
        let input = random_input(3 * 3, &mut rng);
        let targets = vec![0.5, -0.5, 1.0, 0.0, -1.0, 0.25];

        check_model(model, LossKind::MeanSquaredError, &input, &targets, 3, 20);
    }

    #[test]
    fn test_gradient_checking_with_l2_penalty() {
        let mut rng = SimpleRng::new(9);
        let model = Model::new(vec![
            Box::new(DenseLayer::new(4, 3, &mut rng).with_l2(0.05)),
            Box::new(ActivationLayer::new(3, ActivationKind::Softmax)),
        ])
        .unwrap();
        let input = random_input(4, &mut rng);
        let targets = one_hot_rows(&[1], 3);

        check_model(model, LossKind::CategoricalCrossentropy, &input, &targets, 1, 12);
    }

    // ========================================================================
    // Convolutional Stacks
    // ========================================================================

    #[test]
    fn test_gradient_checking_conv_valid() {
        let mut rng = SimpleRng::new(3);
        let conv = Conv2DLayer::new(1, 2, 3, 1, Padding::Valid, 5, 5, &mut rng);
        assert_eq!(conv.output_shape(), vec![2, 3, 3]);
        let model = Model::new(vec![
            Box::new(conv),
            Box::new(ActivationLayer::new(18, ActivationKind::Tanh)),
            Box::new(FlattenLayer::new(2, 3, 3)),
            Box::new(DenseLayer::new(18, 3, &mut rng)),
            Box::new(ActivationLayer::new(3, ActivationKind::Softmax)),
        ])
        .unwrap();
        let input = random_input(2 * 25, &mut rng);
        let targets = one_hot_rows(&[2, 0], 3);

        check_model(model, LossKind::CategoricalCrossentropy, &input, &targets, 2, 18);
    }

    #[test]
    fn test_gradient_checking_conv_same_strided() {
        let mut rng = SimpleRng::new(5);
        let conv = Conv2DLayer::new(2, 2, 3, 2, Padding::Same, 4, 4, &mut rng).with_l2(0.01);
        assert_eq!(conv.output_shape(), vec![2, 2, 2]);
        let model = Model::new(vec![
            Box::new(conv),
            Box::new(ActivationLayer::new(8, ActivationKind::Sigmoid)),
            Box::new(FlattenLayer::new(2, 2, 2)),
            Box::new(DenseLayer::new(8, 2, &mut rng)),
            Box::new(ActivationLayer::new(2, ActivationKind::Softmax)),
        ])
        .unwrap();
        let input = random_input(2 * 16, &mut rng);
        let targets = one_hot_rows(&[1], 2);

        check_model(model, LossKind::CategoricalCrossentropy, &input, &targets, 1, 36);
    }

    #[test]
    fn test_gradients_cleared_after_apply() {
        let mut rng = SimpleRng::new(1);
        let mut model = Model::new(vec![
            Box::new(DenseLayer::new(2, 2, &mut rng)),
            Box::new(ActivationLayer::new(2, ActivationKind::Softmax)),
        ])
        .unwrap();
        let input = [0.3, -0.7];
        let targets = [1.0, 0.0];

        let loss = LossKind::CategoricalCrossentropy;
        let first = analytic_gradients(&mut model, loss, &input, &targets, 1);
        let second = analytic_gradients(&mut model, loss, &input, &targets, 1);
        // Parameters were not changed, so a fresh pass yields the same gradients
        // rather than twice the first ones.
        assert_eq!(first, second);
    }
}
