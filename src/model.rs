//! Sequential model: an ordered stack of layers with matching sizes.

use petgraph::dot::Dot;
use petgraph::graph::DiGraph;

use crate::error::{Error, Result};
use crate::layers::{Layer, Phase};

/// Linear stack of layers.
///
/// Construction checks that every layer's input size equals the previous
/// layer's output size, so a built model can always run a forward pass.
pub struct Model {
    layers: Vec<Box<dyn Layer>>,
}

impl Model {
    pub fn new(layers: Vec<Box<dyn Layer>>) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::config("a model needs at least one layer"));
        }
        for (index, pair) in layers.windows(2).enumerate() {
            let expected = pair[1].input_size();
            let actual = pair[0].output_size();
            if expected != actual {
                return Err(Error::ShapeMismatch {
                    index: index + 1,
                    expected,
                    actual,
                });
            }
        }
        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[Box<dyn Layer>] {
        &self.layers
    }

    pub fn input_size(&self) -> usize {
        self.layers[0].input_size()
    }

    pub fn output_size(&self) -> usize {
        self.layers[self.layers.len() - 1].output_size()
    }

    pub fn parameter_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.parameter_count()).sum()
    }

    /// Sum of the layers' L2 penalties.
    pub fn regularization_loss(&self) -> f32 {
        self.layers.iter().map(|layer| layer.regularization_loss()).sum()
    }

    /// Runs the batch through every layer.
    ///
    /// Returns all activations: element 0 is a copy of `input`, element `i + 1`
    /// is the output of layer `i`. [`Model::backward`] needs the full list.
    pub fn forward(&self, input: &[f32], batch_size: usize, phase: Phase) -> Vec<Vec<f32>> {
        let mut activations = Vec::with_capacity(self.layers.len() + 1);
        activations.push(input.to_vec());
        for layer in &self.layers {
            let mut output = vec![0.0f32; batch_size * layer.output_size()];
            let last = activations.len() - 1;
            layer.forward(&activations[last], &mut output, batch_size, phase);
            activations.push(output);
        }
        activations
    }

    /// Inference-mode forward pass returning only the final layer's output.
    pub fn predict(&self, input: &[f32], batch_size: usize) -> Vec<f32> {
        self.forward(input, batch_size, Phase::Inference)
            .pop()
            .unwrap_or_default()
    }

    /// Backpropagates `grad_output` (gradient of the loss w.r.t. the final
    /// output) through every layer, accumulating parameter gradients.
    pub fn backward(&self, activations: &[Vec<f32>], grad_output: &[f32], batch_size: usize) {
        assert_eq!(
            activations.len(),
            self.layers.len() + 1,
            "activations must come from Model::forward"
        );

        let mut grad = grad_output.to_vec();
        for (i, layer) in self.layers.iter().enumerate().rev() {
            let mut grad_input = vec![0.0f32; batch_size * layer.input_size()];
            layer.backward(
                &activations[i],
                &activations[i + 1],
                &grad,
                &mut grad_input,
                batch_size,
            );
            grad = grad_input;
        }
    }

    /// Hands every parameter buffer to `visit` as `(layer, slot, params, grads)`
    /// and clears the accumulated gradients.
    pub fn apply_gradients(&mut self, visit: &mut dyn FnMut(usize, usize, &mut [f32], &[f32])) {
        for (index, layer) in self.layers.iter_mut().enumerate() {
            layer.apply_gradients(&mut |slot, params, grads| visit(index, slot, params, grads));
        }
    }

    /// Keras-style table of layers, output shapes and parameter counts.
    pub fn summary(&self) -> String {
        let rule = "=".repeat(64);
        let mut out = String::new();
        out.push_str(&format!("{:<28}{:<24}{:>12}\n", "Layer (type)", "Output Shape", "Param #"));
        out.push_str(&rule);
        out.push('\n');
        for (index, layer) in self.layers.iter().enumerate() {
            let name = format!("{}_{} ({})", layer.kind(), index, layer.kind());
            out.push_str(&format!(
                "{:<28}{:<24}{:>12}\n",
                name,
                format_shape(&layer.output_shape()),
                layer.parameter_count()
            ));
        }
        out.push_str(&rule);
        out.push('\n');
        out.push_str(&format!("Total params: {}\n", self.parameter_count()));
        out
    }

    /// Directed chain `input -> layer_0 -> ... -> layer_n`, edges labelled with
    /// the per-sample shape flowing between nodes.
    pub fn layer_graph(&self) -> DiGraph<String, String> {
        let mut graph = DiGraph::new();
        let mut previous = graph.add_node(format!("input\n({})", self.input_size()));
        let mut previous_shape = format_shape(&[self.input_size()]);

        for (index, layer) in self.layers.iter().enumerate() {
            let label = format!(
                "{}_{}\nin: {} out: {}\nparams: {}",
                layer.kind(),
                index,
                layer.input_size(),
                layer.output_size(),
                layer.parameter_count()
            );
            let node = graph.add_node(label);
            graph.add_edge(previous, node, previous_shape);
            previous = node;
            previous_shape = format_shape(&layer.output_shape());
        }
        graph
    }

    /// Graphviz DOT rendering of [`Model::layer_graph`].
    pub fn to_dot(&self) -> String {
        let graph = self.layer_graph();
        format!("{}", Dot::with_config(&graph, &[]))
    }
}

fn format_shape(shape: &[usize]) -> String {
    let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
    format!("({})", dims.join(", "))
}
