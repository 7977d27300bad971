//! # Pose-Graph Violence Classifier Training
//!
//! This crate trains a binary classifier that labels human poses as violent or
//! non-violent. Poses come from an external pose estimator as per-frame
//! keypoint JSON files; each detected person becomes one skeleton graph.
//! It includes configuration management, corpus assembly, stratified
//! splitting, a graph classifier, the training loop, and threshold
//! calibration.
//!
//! ## Architecture
//!
//! ```text
//! TrainingConfig ──► RunContext (device + data layout)
//!       │                 │
//!       │          CorpusAssembler ──► KeypointFile ──► PoseGraphBuilder
//!       │                 │
//!       │          LabeledCorpus ──► DatasetSplitter ──► train / val / test
//!       │                                                   │
//!       │                                               DataLoader
//!       │                                                   │
//!       └──► Trainer ──► GraphClassifier ◄── Evaluator ──► ThresholdOptimizer
//!                                                   │
//!                                          ModelArtifact + hand-off JSON
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pose_violence_train::config::TrainingConfig;
//! use pose_violence_train::device::SystemProbe;
//!
//! let mut config = TrainingConfig::default();
//! config.data_dir = "json".into();
//! config.sample_percentage = 100;
//!
//! let summary = pose_violence_train::pipeline::run(&config, &SystemProbe, true)
//!     .expect("training run");
//! println!("threshold = {:.4}", summary.evaluation.threshold());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod artifact;
pub mod config;
pub mod dataset;
pub mod device;
pub mod error;
pub mod eval;
pub mod graph;
pub mod keypoints;
pub mod loader;
pub mod losses;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod split;
#[cfg(feature = "tch-backend")]
pub mod tch_model;
pub mod trainer;

// Convenient re-exports at the crate root.
pub use config::TrainingConfig;
pub use dataset::{CorpusAssembler, LabeledCorpus};
pub use error::{ConfigError, DatasetError, TrainError, TrainResult};
pub use graph::{PoseGraph, PoseGraphBuilder};
pub use metrics::{ThresholdOptimizer, ThresholdReport};
pub use model::{ClassifierMode, GcnClassifier, GraphClassifier};
pub use split::DatasetSplitter;
pub use trainer::{EpochMetrics, Trainer};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
