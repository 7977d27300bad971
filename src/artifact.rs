//! Persisted model artifact and visualization hand-off products.
//!
//! The artifact is written once, at the end of a run, as a single JSON
//! document. The threshold report inside it is stored verbatim: loading an
//! artifact never recomputes metrics.
//!
//! The hand-off products are plain JSON for an external plotting tool:
//!
//! | File                          | Contents                                   |
//! |-------------------------------|--------------------------------------------|
//! | `training_metrics.json`       | per-epoch metrics + test summary           |
//! | `classification_scores.json`  | test scores, labels and chosen threshold   |
//! | `sample_pose_graph.json`      | one test pose graph with its edges         |

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::TrainingConfig;
use crate::device::ComputeDevice;
use crate::error::{TrainError, TrainResult};
use crate::eval::TestEvaluation;
use crate::graph::PoseGraph;
use crate::keypoints::ClassLabel;
use crate::metrics::{threshold_serde, ThresholdReport};
use crate::model::{load_classifier, GraphClassifier, ModelParameters};
use crate::trainer::EpochMetrics;

/// File name of the training-metrics hand-off product.
pub const TRAINING_METRICS_FILE: &str = "training_metrics.json";
/// File name of the score hand-off product.
pub const CLASSIFICATION_SCORES_FILE: &str = "classification_scores.json";
/// File name of the sample-graph hand-off product.
pub const SAMPLE_POSE_FILE: &str = "sample_pose_graph.json";

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------

fn write_json<T: Serialize>(path: &Path, value: &T) -> TrainResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| TrainError::artifact(format!("cannot create directory: {e}"), parent))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).map_err(|e| TrainError::artifact(format!("cannot write: {e}"), path))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> TrainResult<T> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| TrainError::artifact(format!("cannot read: {e}"), path))?;
    serde_json::from_str(&contents)
        .map_err(|e| TrainError::artifact(format!("invalid JSON: {e}"), path))
}

// ---------------------------------------------------------------------------
// ModelArtifact
// ---------------------------------------------------------------------------

/// Trained parameters plus the calibrated threshold and its report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Trained classifier parameters.
    pub parameters: ModelParameters,
    /// Chosen decision threshold.
    #[serde(with = "threshold_serde")]
    pub threshold: f64,
    /// Operating-point metrics at `threshold`.
    pub metrics: ThresholdReport,
    /// Mean test loss.
    pub test_loss: f64,
    /// Test ROC AUC.
    pub test_auc: f64,
    /// Configuration of the run that produced the artifact.
    pub config: TrainingConfig,
}

impl ModelArtifact {
    /// Bundle a trained model with its test evaluation.
    pub fn new(
        model: &dyn GraphClassifier,
        evaluation: &TestEvaluation,
        config: &TrainingConfig,
    ) -> TrainResult<Self> {
        Ok(ModelArtifact {
            parameters: model.parameters()?,
            threshold: evaluation.threshold(),
            metrics: evaluation.report,
            test_loss: evaluation.loss,
            test_auc: evaluation.auc,
            config: config.clone(),
        })
    }

    /// Write the artifact to `path`.
    pub fn save(&self, path: &Path) -> TrainResult<()> {
        write_json(path, self)?;
        info!("Model saved to {}", path.display());
        Ok(())
    }

    /// Read an artifact previously written by [`ModelArtifact::save`].
    pub fn load(path: &Path) -> TrainResult<Self> {
        read_json(path)
    }

    /// Rebuild the classifier stored in this artifact, in eval mode.
    pub fn restore_classifier(&self, device: ComputeDevice) -> TrainResult<Box<dyn GraphClassifier>> {
        load_classifier(&self.parameters, &self.config, device)
    }
}

// ---------------------------------------------------------------------------
// Hand-off products
// ---------------------------------------------------------------------------

/// Headline test metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestSummary {
    /// Mean test loss.
    pub loss: f64,
    /// Test ROC AUC.
    pub auc: f64,
    /// F1 score at the chosen threshold.
    pub f1: f64,
    /// Chosen threshold.
    #[serde(with = "threshold_serde")]
    pub threshold: f64,
}

/// Per-epoch metrics and the final test summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    /// Epoch records in completion order.
    pub epochs: Vec<EpochMetrics>,
    /// Test-set summary.
    pub test: TestSummary,
}

/// Test scores and labels with the chosen threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSet {
    /// Predicted probabilities.
    pub scores: Vec<f32>,
    /// True labels.
    pub labels: Vec<f32>,
    /// Chosen threshold.
    #[serde(with = "threshold_serde")]
    pub threshold: f64,
}

/// One pose graph for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplePose {
    /// `[x, y, confidence]` per node.
    pub node_features: Vec<Vec<f32>>,
    /// Directed edges `[source, target]`, both directions of every bone,
    /// in the same order as the model's edge index.
    pub edges: Vec<[usize; 2]>,
    /// Whether the graph is labeled violent.
    pub is_violent: bool,
}

impl From<&PoseGraph> for SamplePose {
    fn from(g: &PoseGraph) -> Self {
        let snap = g.to_snapshot();
        SamplePose {
            node_features: snap.node_features,
            edges: g.directed_edges().map(|(src, dst)| [src, dst]).collect(),
            is_violent: g.class() == ClassLabel::Violent,
        }
    }
}

/// The three visualization products of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct HandoffProducts {
    /// Epoch metrics and test summary.
    pub history: TrainingHistory,
    /// Test scores.
    pub scores: ScoreSet,
    /// Example graph, if the test split had one.
    pub sample: Option<SamplePose>,
}

impl HandoffProducts {
    /// Assemble the products from a finished run.
    pub fn new(
        epochs: &[EpochMetrics],
        evaluation: &TestEvaluation,
        sample: Option<&PoseGraph>,
    ) -> Self {
        HandoffProducts {
            history: TrainingHistory {
                epochs: epochs.to_vec(),
                test: TestSummary {
                    loss: evaluation.loss,
                    auc: evaluation.auc,
                    f1: evaluation.report.f1_score,
                    threshold: evaluation.threshold(),
                },
            },
            scores: ScoreSet {
                scores: evaluation.predictions.scores.clone(),
                labels: evaluation.predictions.labels.clone(),
                threshold: evaluation.threshold(),
            },
            sample: sample.map(SamplePose::from),
        }
    }

    /// Write every product into `dir`, returning the paths written.
    pub fn write(&self, dir: &Path) -> TrainResult<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(3);

        let path = dir.join(TRAINING_METRICS_FILE);
        write_json(&path, &self.history)?;
        written.push(path);

        let path = dir.join(CLASSIFICATION_SCORES_FILE);
        write_json(&path, &self.scores)?;
        written.push(path);

        if let Some(sample) = &self.sample {
            let path = dir.join(SAMPLE_POSE_FILE);
            write_json(&path, sample)?;
            written.push(path);
        }

        info!("Wrote {} visualization files to {}", written.len(), dir.display());
        Ok(written)
    }
}

/// Read a hand-off product back (for tooling and tests).
pub fn read_product<T: DeserializeOwned>(path: &Path) -> TrainResult<T> {
    read_json(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Predictions;
    use crate::model::GcnClassifier;
    use tempfile::tempdir;

    fn evaluation() -> TestEvaluation {
        TestEvaluation {
            loss: 0.42,
            auc: 0.9,
            report: ThresholdReport {
                threshold_j: 0.61,
                threshold_distance: 0.55,
                threshold_f1: f64::INFINITY,
                sensitivity: 0.8,
                specificity: 0.9,
                precision: 0.88,
                f1_score: 0.83,
                youdens_j: 0.7,
            },
            predictions: Predictions { scores: vec![0.9, 0.1], labels: vec![1.0, 0.0], loss: 0.42 },
        }
    }

    #[test]
    fn artifact_round_trip_keeps_report_verbatim() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("out").join("model.json");
        let cfg = TrainingConfig::default();
        let model = GcnClassifier::from_config(&cfg);
        let artifact = ModelArtifact::new(&model, &evaluation(), &cfg).unwrap();
        artifact.save(&path).unwrap();

        let loaded = ModelArtifact::load(&path).unwrap();
        assert_eq!(loaded.metrics, artifact.metrics);
        assert!(loaded.metrics.threshold_f1.is_infinite());
        assert_eq!(loaded, artifact);
    }

    #[test]
    fn missing_artifact_is_an_error() {
        let tmp = tempdir().unwrap();
        let err = ModelArtifact::load(&tmp.path().join("none.json")).unwrap_err();
        assert!(matches!(err, TrainError::Artifact { .. }));
    }

    #[test]
    fn handoff_files_written() {
        let tmp = tempdir().unwrap();
        let epochs = vec![EpochMetrics { epoch: 1, train_loss: 0.7, val_loss: 0.6, val_auc: None }];
        let products = HandoffProducts::new(&epochs, &evaluation(), None);
        let written = products.write(tmp.path()).unwrap();
        assert_eq!(written.len(), 2);

        let history: TrainingHistory = read_product(&written[0]).unwrap();
        assert_eq!(history.epochs, epochs);
        assert_eq!(history.test.threshold, 0.61);
        let scores: ScoreSet = read_product(&written[1]).unwrap();
        assert_eq!(scores.labels, vec![1.0, 0.0]);
    }

    #[test]
    fn sample_pose_carries_directed_edges() {
        let kp = crate::keypoints::KeypointArray::from_triples(&[[0.5, 0.5, 0.9]; 17]);
        let g = crate::graph::PoseGraphBuilder::coco().normalize(false).build(&kp, ClassLabel::Violent).unwrap();
        let sample = SamplePose::from(&g);

        assert_eq!(sample.edges.len(), g.num_directed_edges());
        assert_eq!(sample.edges.len(), 2 * g.edges().len());
        for &[a, b] in g.edges() {
            assert!(sample.edges.contains(&[a, b]));
            assert!(sample.edges.contains(&[b, a]));
        }
        assert!(sample.is_violent);
    }
}
