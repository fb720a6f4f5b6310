//! The MNIST corpus: 60,000 training and 10,000 test images of 28x28 digits.

use std::path::Path;

use crate::data::idx::{read_idx_images, read_idx_labels, IdxImages};
use crate::data::{normalize_pixel, FeatureShape, LabeledData};
use crate::error::{Error, Result, Split};
use crate::utils::rng::SimpleRng;

pub const TRAIN_IMAGES: &str = "train-images-idx3-ubyte";
pub const TRAIN_LABELS: &str = "train-labels-idx1-ubyte";
pub const TEST_IMAGES: &str = "t10k-images-idx3-ubyte";
pub const TEST_LABELS: &str = "t10k-labels-idx1-ubyte";

/// Digit classes 0-9.
pub const NUM_CLASSES: usize = 10;

#[cfg(feature = "download")]
const MIRROR_URL: &str = "https://storage.googleapis.com/cvdf-datasets/mnist/";

/// How many examples to draw from each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRequest {
    pub train: usize,
    pub test: usize,
}

/// Raw pixels and labels of both splits. Immutable once built.
#[derive(Debug, Clone)]
pub struct Corpus {
    rows: usize,
    cols: usize,
    train_images: Vec<u8>,
    train_labels: Vec<u8>,
    test_images: Vec<u8>,
    test_labels: Vec<u8>,
}

fn check_split(
    pixels_per_image: usize,
    images: &[u8],
    labels: &[u8],
) -> std::result::Result<(), String> {
    if images.len() != labels.len() * pixels_per_image {
        return Err(format!(
            "{} image bytes do not match {} labels of {} pixels",
            images.len(),
            labels.len(),
            pixels_per_image
        ));
    }
    let out_of_range = labels
        .iter()
        .enumerate()
        .find(|(_, &l)| l as usize >= NUM_CLASSES);
    if let Some((index, &label)) = out_of_range {
        return Err(format!("label {label} at index {index} is not a digit"));
    }
    Ok(())
}

impl Corpus {
    /// Builds a corpus from in-memory splits, applying the same checks as
    /// [`Corpus::load`].
    pub fn from_parts(
        rows: usize,
        cols: usize,
        train_images: Vec<u8>,
        train_labels: Vec<u8>,
        test_images: Vec<u8>,
        test_labels: Vec<u8>,
    ) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(Error::corpus("<memory>", "image resolution must be non-zero"));
        }
        let pixels = rows * cols;
        check_split(pixels, &train_images, &train_labels)
            .map_err(|reason| Error::corpus("<memory>/train", reason))?;
        check_split(pixels, &test_images, &test_labels)
            .map_err(|reason| Error::corpus("<memory>/test", reason))?;

        Ok(Self {
            rows,
            cols,
            train_images,
            train_labels,
            test_images,
            test_labels,
        })
    }

    /// Loads the four IDX files from `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let train = read_idx_images(dir.join(TRAIN_IMAGES))?;
        let train_labels = read_idx_labels(dir.join(TRAIN_LABELS))?;
        let test = read_idx_images(dir.join(TEST_IMAGES))?;
        let test_labels = read_idx_labels(dir.join(TEST_LABELS))?;

        Self::check_file_pair(&train, &train_labels, &dir.join(TRAIN_LABELS))?;
        Self::check_file_pair(&test, &test_labels, &dir.join(TEST_LABELS))?;
        if (test.rows, test.cols) != (train.rows, train.cols) {
            return Err(Error::corpus(
                dir.join(TEST_IMAGES),
                format!(
                    "resolution {}x{} differs from training images {}x{}",
                    test.rows, test.cols, train.rows, train.cols
                ),
            ));
        }

        tracing::info!(
            dir = %dir.display(),
            train = train.count,
            test = test.count,
            rows = train.rows,
            cols = train.cols,
            "loaded MNIST corpus"
        );
        Self::from_parts(
            train.rows,
            train.cols,
            train.pixels,
            train_labels,
            test.pixels,
            test_labels,
        )
    }

    fn check_file_pair(images: &IdxImages, labels: &[u8], labels_path: &Path) -> Result<()> {
        if images.count != labels.len() {
            return Err(Error::corpus(
                labels_path,
                format!("{} labels for {} images", labels.len(), images.count),
            ));
        }
        check_split(images.rows * images.cols, &images.pixels, labels)
            .map_err(|reason| Error::corpus(labels_path, reason))
    }

    /// Downloads any missing file from the CVDF mirror into `dir`, then loads.
    ///
    /// Files already present are reused, so only the first call touches the
    /// network.
    #[cfg(feature = "download")]
    pub fn fetch(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        for name in [TRAIN_IMAGES, TRAIN_LABELS, TEST_IMAGES, TEST_LABELS] {
            download_if_missing(dir, name)?;
        }
        Self::load(dir)
    }

    pub fn image_rows(&self) -> usize {
        self.rows
    }

    pub fn image_cols(&self) -> usize {
        self.cols
    }

    pub fn pixels_per_image(&self) -> usize {
        self.rows * self.cols
    }

    /// Number of examples in `split`.
    pub fn len(&self, split: Split) -> usize {
        match split {
            Split::Train => self.train_labels.len(),
            Split::Test => self.test_labels.len(),
        }
    }

    fn split_parts(&self, split: Split) -> (&[u8], &[u8]) {
        match split {
            Split::Train => (&self.train_images, &self.train_labels),
            Split::Test => (&self.test_images, &self.test_labels),
        }
    }

    /// Raw pixels of one image.
    pub fn image(&self, split: Split, index: usize) -> &[u8] {
        let pixels = self.pixels_per_image();
        let (images, _) = self.split_parts(split);
        &images[index * pixels..(index + 1) * pixels]
    }

    pub fn label(&self, split: Split, index: usize) -> u8 {
        self.split_parts(split).1[index]
    }

    /// Draws `request.train` training and `request.test` test examples without
    /// replacement.
    ///
    /// Both counts are checked before anything is copied. Training examples
    /// only ever come from the training split and test examples from the test
    /// split.
    pub fn sample(
        &self,
        request: SampleRequest,
        shape: FeatureShape,
        rng: &mut SimpleRng,
    ) -> Result<(LabeledData, LabeledData)> {
        for (split, requested) in [(Split::Train, request.train), (Split::Test, request.test)] {
            let available = self.len(split);
            if requested > available {
                return Err(Error::SampleCount {
                    split,
                    requested,
                    available,
                });
            }
        }

        let train = self.sample_split(Split::Train, request.train, shape, rng)?;
        let test = self.sample_split(Split::Test, request.test, shape, rng)?;
        tracing::debug!(train = train.len(), test = test.len(), "sampled corpus");
        Ok((train, test))
    }

    fn sample_split(
        &self,
        split: Split,
        count: usize,
        shape: FeatureShape,
        rng: &mut SimpleRng,
    ) -> Result<LabeledData> {
        let available = self.len(split);
        let indices = rng.sample_indices(available, count).ok_or(Error::SampleCount {
            split,
            requested: count,
            available,
        })?;

        let mut features = Vec::with_capacity(count * self.pixels_per_image());
        let mut labels = Vec::with_capacity(count);
        for &index in &indices {
            features.extend(self.image(split, index).iter().map(|&p| normalize_pixel(p)));
            labels.push(self.label(split, index));
        }
        LabeledData::new(features, labels, shape.dims(self.rows, self.cols), NUM_CLASSES)
    }
}

#[cfg(feature = "download")]
fn download_if_missing(dir: &Path, name: &str) -> Result<()> {
    use flate2::read::GzDecoder;
    use std::fs::{self, File};

    let target = dir.join(name);
    if target.exists() {
        tracing::debug!(file = %target.display(), "using cached file");
        return Ok(());
    }

    let url = format!("{MIRROR_URL}{name}.gz");
    tracing::info!(%url, "downloading");
    let bytes = reqwest::blocking::get(&url)?.error_for_status()?.bytes()?;

    let partial = dir.join(format!("{name}.part"));
    {
        let mut output = File::create(&partial)?;
        let mut decoder = GzDecoder::new(&bytes[..]);
        std::io::copy(&mut decoder, &mut output)?;
    }
    fs::rename(&partial, &target)?;
    Ok(())
}
