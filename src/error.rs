//! Error type shared by every stage of an experiment.
//!
//! Loading, building, training and reporting all return [`Result`]; any
//! error is terminal for the current run.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Which corpus split a request refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Test => write!(f, "test"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("malformed corpus file {}: {reason}", path.display())]
    Corpus { path: PathBuf, reason: String },

    #[error("requested {requested} {split} examples but only {available} are available")]
    SampleCount {
        split: Split,
        requested: usize,
        available: usize,
    },

    #[error("layer {index}: {reason}")]
    Layer { index: usize, reason: String },

    #[error("layer {index} expects input size {expected} but receives {actual}")]
    ShapeMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },

    #[error("run directory {} already exists", .0.display())]
    RunDirectoryExists(PathBuf),

    #[error("failed to render {}: {reason}", path.display())]
    Plot { path: PathBuf, reason: String },

    #[cfg(feature = "download")]
    #[error("download failed: {0}")]
    Download(#[from] reqwest::Error),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    pub(crate) fn corpus(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::Corpus {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn layer(index: usize, reason: impl Into<String>) -> Self {
        Error::Layer {
            index,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
