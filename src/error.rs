//! Error types for the pose-graph violence training pipeline.
//!
//! This module is the single source of truth for all error types in the
//! crate. Every module that produces an error imports its error type from
//! here rather than defining it inline.
//!
//! ## Hierarchy
//!
//! ```text
//! TrainError (top-level)
//! ├── ConfigError   (config validation / file loading)
//! └── DatasetError  (directory scans, keypoint file I/O and format)
//! ```
//!
//! Per-sample problems (empty or malformed keypoints) are never errors: the
//! graph builder returns `None` and the corpus assembler skips the instance.

use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// TrainResult
// ---------------------------------------------------------------------------

/// Convenient `Result` alias used by orchestration-level functions.
pub type TrainResult<T> = Result<T, TrainError>;

// ---------------------------------------------------------------------------
// TrainError: top-level aggregator
// ---------------------------------------------------------------------------

/// Top-level error type for the training pipeline.
///
/// Every variant is fatal: the run aborts on the first one. There is no retry
/// logic anywhere in the pipeline.
#[derive(Debug, Error)]
pub enum TrainError {
    /// A configuration validation or loading error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A corpus assembly or file access error.
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Corpus assembly produced no graphs, so there is nothing to train on.
    #[error("Corpus is empty: no valid pose graphs were produced")]
    EmptyCorpus,

    /// A split produced no samples for a stage that needs at least one.
    #[error("Split `{split}` is empty; the corpus is too small for the configured ratios")]
    EmptySplit {
        /// Name of the empty split (`train`, `val`, `test`).
        split: &'static str,
    },

    /// ROC / PR quantities are undefined because only one class is present.
    #[error(
        "Degenerate label distribution: {positives} positive and {negatives} negative samples \
         (both classes are required)"
    )]
    DegenerateLabels {
        /// Number of positive (violent) labels.
        positives: usize,
        /// Number of negative (non-violent) labels.
        negatives: usize,
    },

    /// Scores and labels passed to a metric have different lengths.
    #[error("Length mismatch: {scores} scores vs {labels} labels")]
    LengthMismatch {
        /// Number of scores.
        scores: usize,
        /// Number of labels.
        labels: usize,
    },

    /// A shape mismatch was detected between two arrays.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        actual: Vec<usize>,
    },

    /// A training step failed inside the classifier backend.
    #[error("Training step failed: {0}")]
    TrainingStep(String),

    /// A model artifact or report could not be saved or loaded.
    #[error("Artifact error: {message} (path: {path:?})")]
    Artifact {
        /// Human-readable description.
        message: String,
        /// Path that was being accessed.
        path: PathBuf,
    },
}

impl TrainError {
    /// Construct a [`TrainError::TrainingStep`].
    pub fn training_step<S: Into<String>>(msg: S) -> Self {
        TrainError::TrainingStep(msg.into())
    }

    /// Construct a [`TrainError::Artifact`].
    pub fn artifact<S: Into<String>>(msg: S, path: impl Into<PathBuf>) -> Self {
        TrainError::Artifact { message: msg.into(), path: path.into() }
    }

    /// Construct a [`TrainError::ShapeMismatch`].
    pub fn shape_mismatch(expected: Vec<usize>, actual: Vec<usize>) -> Self {
        TrainError::ShapeMismatch { expected, actual }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors produced when loading or validating a [`TrainingConfig`].
///
/// [`TrainingConfig`]: crate::config::TrainingConfig
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an invalid value.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// A configuration file could not be read from disk.
    #[error("Cannot read config file `{path}`: {source}")]
    FileRead {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file contains malformed JSON.
    #[error("Cannot parse config file `{path}`: {source}")]
    ParseError {
        /// Path that was being parsed.
        path: PathBuf,
        /// Underlying JSON parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Construct a [`ConfigError::InvalidValue`].
    pub fn invalid_value<S: Into<String>>(field: &'static str, reason: S) -> Self {
        ConfigError::InvalidValue { field, reason: reason.into() }
    }
}

// ---------------------------------------------------------------------------
// DatasetError
// ---------------------------------------------------------------------------

/// Errors produced while assembling the labeled corpus.
///
/// A missing camera directory is not an error on its own (that source is
/// skipped); these variants cover the conditions that abort a run.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// A required class directory does not exist.
    #[error("Directory not found: {path}")]
    DirectoryNotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// A class directory exists but holds no `*.json` keypoint files.
    #[error("No JSON keypoint files found in `{path}`")]
    NoEligibleFiles {
        /// Directory that was scanned.
        path: PathBuf,
    },

    /// No camera source exists for one of the two class labels.
    #[error("No camera source directory exists for label `{label}` under `{data_dir}`")]
    NoSourceForLabel {
        /// Label name (`violent` / `non-violent`).
        label: String,
        /// Root data directory.
        data_dir: PathBuf,
    },

    /// A low-level I/O error while reading a file or directory.
    #[error("I/O error reading `{path}`: {source}")]
    IoError {
        /// Path being read when the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A keypoint file is not a valid keypoint document.
    #[error("Invalid data format in `{path}`: {message}")]
    InvalidFormat {
        /// Path of the malformed file.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },
}

impl DatasetError {
    /// Construct a [`DatasetError::IoError`].
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DatasetError::IoError { path: path.into(), source }
    }

    /// Construct a [`DatasetError::InvalidFormat`].
    pub fn invalid_format<S: Into<String>>(path: impl Into<PathBuf>, msg: S) -> Self {
        DatasetError::InvalidFormat { path: path.into(), message: msg.into() }
    }
}
