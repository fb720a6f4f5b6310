//! Visual artifacts of an evaluated run: a confusion heatmap and the layer graph.

use std::fs;
use std::path::Path;

use plotters::prelude::*;

use crate::error::{Error, Result};
use crate::evaluate::ConfusionMatrix;
use crate::model::Model;

/// Side length of one heatmap cell in pixels.
pub const CELL_SIZE: u32 = 32;
const GRID: u32 = 1;

/// White for 0, deep blue for 1.
pub(crate) fn heatmap_color(fraction: f32) -> RGBColor {
    let t = fraction.clamp(0.0, 1.0);
    let lerp = |from: f32, to: f32| (from + (to - from) * t).round() as u8;
    RGBColor(lerp(255.0, 8.0), lerp(255.0, 48.0), lerp(255.0, 107.0))
}

/// Renders the confusion matrix as a PNG grid, one cell per (true, predicted)
/// pair, row = true class.
///
/// Cell intensity is the count divided by the row total, so every true class
/// is shaded on the same scale regardless of its support.
pub fn write_confusion_heatmap(matrix: &ConfusionMatrix, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let plot_err = |err: &dyn std::fmt::Display| Error::Plot {
        path: path.to_path_buf(),
        reason: err.to_string(),
    };

    let k = matrix.num_classes() as u32;
    let side = k * CELL_SIZE + GRID;
    let area = BitMapBackend::new(path, (side, side)).into_drawing_area();
    area.fill(&RGBColor(160, 160, 160)).map_err(|e| plot_err(&e))?;

    for truth in 0..matrix.num_classes() {
        let support: u64 = matrix.row(truth).iter().sum();
        for predicted in 0..matrix.num_classes() {
            let fraction = if support == 0 {
                0.0
            } else {
                matrix.get(truth, predicted) as f32 / support as f32
            };
            let x0 = (predicted as u32 * CELL_SIZE + GRID) as i32;
            let y0 = (truth as u32 * CELL_SIZE + GRID) as i32;
            let x1 = x0 + (CELL_SIZE - GRID) as i32;
            let y1 = y0 + (CELL_SIZE - GRID) as i32;
            area.draw(&Rectangle::new([(x0, y0), (x1, y1)], heatmap_color(fraction).filled()))
                .map_err(|e| plot_err(&e))?;
        }
    }

    area.present().map_err(|e| plot_err(&e))?;
    tracing::debug!(path = %path.display(), "wrote confusion heatmap");
    Ok(())
}

/// Writes the model's layer graph in Graphviz DOT format.
pub fn write_layer_graph(model: &Model, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, model.to_dot())?;
    tracing::debug!(path = %path.display(), "wrote layer graph");
    Ok(())
}
