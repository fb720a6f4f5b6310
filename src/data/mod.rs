//! Dataset loading and label encoding.
//!
//! [`Corpus`] holds the raw MNIST splits; [`Corpus::sample`] draws a
//! normalized, one-hot encoded [`LabeledData`] for each split.

pub mod idx;
pub mod mnist;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use mnist::{Corpus, SampleRequest, NUM_CLASSES};

/// Layout of each example's features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureShape {
    /// `[rows * cols]`, for fully-connected models.
    #[default]
    Flat,
    /// `[1, rows, cols]`, single channel, for convolutional models.
    Image,
}

impl FeatureShape {
    pub fn dims(&self, rows: usize, cols: usize) -> Vec<usize> {
        match self {
            FeatureShape::Flat => vec![rows * cols],
            FeatureShape::Image => vec![1, rows, cols],
        }
    }
}

/// Maps a pixel byte into `[0, 1]`.
pub fn normalize_pixel(pixel: u8) -> f32 {
    pixel as f32 / 255.0
}

/// Length-`num_classes` vector with a single 1 at `label`.
///
/// # Panics
///
/// Panics if `label >= num_classes`.
pub fn one_hot(label: usize, num_classes: usize) -> Vec<f32> {
    assert!(label < num_classes, "label {label} out of range for {num_classes} classes");
    let mut encoded = vec![0.0f32; num_classes];
    encoded[label] = 1.0;
    encoded
}

/// One-hot encodes every label into a flat `labels.len() × num_classes` buffer.
pub fn one_hot_batch(labels: &[u8], num_classes: usize) -> Vec<f32> {
    let mut encoded = vec![0.0f32; labels.len() * num_classes];
    for (row, &label) in labels.iter().enumerate() {
        let label = label as usize;
        assert!(label < num_classes, "label {label} out of range for {num_classes} classes");
        encoded[row * num_classes + label] = 1.0;
    }
    encoded
}

/// Index of the largest value; the first one wins ties. Returns 0 for an
/// empty slice.
pub fn argmax(values: &[f32]) -> usize {
    let mut best = 0usize;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Normalized examples of one split with their labels and one-hot targets.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledData {
    features: Vec<f32>,
    labels: Vec<u8>,
    targets: Vec<f32>,
    feature_shape: Vec<usize>,
    num_classes: usize,
}

impl LabeledData {
    /// `features` holds `labels.len()` rows of `feature_shape.product()` values.
    pub fn new(
        features: Vec<f32>,
        labels: Vec<u8>,
        feature_shape: Vec<usize>,
        num_classes: usize,
    ) -> Result<Self> {
        let feature_len: usize = feature_shape.iter().product();
        if feature_len == 0 || num_classes == 0 {
            return Err(Error::config("feature shape and class count must be non-zero"));
        }
        if features.len() != labels.len() * feature_len {
            return Err(Error::config(format!(
                "{} features do not form {} examples of {} values",
                features.len(),
                labels.len(),
                feature_len
            )));
        }
        if let Some(&bad) = labels.iter().find(|&&l| l as usize >= num_classes) {
            return Err(Error::config(format!(
                "label {bad} out of range for {num_classes} classes"
            )));
        }

        let targets = one_hot_batch(&labels, num_classes);
        Ok(Self {
            features,
            labels,
            targets,
            feature_shape,
            num_classes,
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Values per example.
    pub fn feature_len(&self) -> usize {
        self.feature_shape.iter().product()
    }

    pub fn feature_shape(&self) -> &[usize] {
        &self.feature_shape
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn features(&self) -> &[f32] {
        &self.features
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    pub fn targets(&self) -> &[f32] {
        &self.targets
    }

    pub fn example(&self, index: usize) -> &[f32] {
        let len = self.feature_len();
        &self.features[index * len..(index + 1) * len]
    }

    pub fn target(&self, index: usize) -> &[f32] {
        &self.targets[index * self.num_classes..(index + 1) * self.num_classes]
    }

    /// Copies the examples at `indices` into contiguous batch buffers.
    pub fn gather(&self, indices: &[usize], features: &mut Vec<f32>, targets: &mut Vec<f32>) {
        features.clear();
        targets.clear();
        for &i in indices {
            features.extend_from_slice(self.example(i));
            targets.extend_from_slice(self.target(i));
        }
    }

    /// Holds out the trailing `fraction` of the examples (rounded to the
    /// nearest count).
    ///
    /// Returns `(kept, held_out)`; no shuffling happens, so the split is
    /// reproducible for a given sample.
    pub fn split_tail(&self, fraction: f32) -> Result<(LabeledData, LabeledData)> {
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(Error::config("holdout fraction must be in range (0.0, 1.0)"));
        }
        let held_out = ((self.len() as f32) * fraction).round() as usize;
        let kept = self.len().saturating_sub(held_out);
        if kept == 0 || held_out == 0 {
            return Err(Error::config(format!(
                "holdout fraction {fraction} leaves an empty split of {} examples",
                self.len()
            )));
        }

        let len = self.feature_len();
        let head = LabeledData::new(
            self.features[..kept * len].to_vec(),
            self.labels[..kept].to_vec(),
            self.feature_shape.clone(),
            self.num_classes,
        )?;
        let tail = LabeledData::new(
            self.features[kept * len..].to_vec(),
            self.labels[kept..].to_vec(),
            self.feature_shape.clone(),
            self.num_classes,
        )?;
        Ok((head, tail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_hot_has_single_one() {
        for label in 0..10 {
            let encoded = one_hot(label, 10);
            assert_eq!(encoded.iter().filter(|&&v| v == 1.0).count(), 1);
            assert_eq!(encoded.iter().sum::<f32>(), 1.0);
            assert_eq!(argmax(&encoded), label);
        }
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_one_hot_rejects_large_label() {
        one_hot(10, 10);
    }

    #[test]
    fn test_argmax_first_wins_ties() {
        assert_eq!(argmax(&[0.2, 0.5, 0.5, 0.1]), 1);
        assert_eq!(argmax(&[]), 0);
    }

    #[test]
    fn test_normalize_bounds() {
        assert_eq!(normalize_pixel(0), 0.0);
        assert_eq!(normalize_pixel(255), 1.0);
    }

    #[test]
    fn test_feature_shape_dims() {
        assert_eq!(FeatureShape::Flat.dims(28, 28), vec![784]);
        assert_eq!(FeatureShape::Image.dims(28, 28), vec![1, 28, 28]);
    }

    #[test]
    fn test_split_tail() {
        let features = (0..10).map(|v| v as f32).collect();
        let data = LabeledData::new(features, vec![0, 1, 2, 3, 4], vec![2], 10).unwrap();
        let (head, tail) = data.split_tail(0.2).unwrap();
        assert_eq!(head.len(), 4);
        assert_eq!(tail.len(), 1);
        assert_eq!(tail.labels(), &[4]);
        assert_eq!(tail.example(0), &[8.0, 9.0]);

        assert!(data.split_tail(0.0).is_err());
        assert!(data.split_tail(0.95).is_err());
        assert!(data.split_tail(0.05).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_label() {
        assert!(LabeledData::new(vec![0.0; 2], vec![0, 10], vec![1], 10).is_err());
    }
}
