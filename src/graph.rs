//! Pose graphs: one node per joint, edges along the anatomical skeleton.
//!
//! [`PoseGraphBuilder`] is a pure transformation from a [`KeypointArray`] to a
//! [`PoseGraph`]. Invalid input produces `None` ("no sample"), never an
//! error: the corpus assembler filters those out and keeps going.
//!
//! The skeleton is shared between every graph produced by one builder, so a
//! corpus of a million poses holds a single copy of the edge list.

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ConfigError;
use crate::keypoints::{ClassLabel, KeypointArray};

/// Width of a node feature vector: `[x, y, confidence]`.
pub const NODE_FEATURE_DIM: usize = 3;

/// Number of joints in the COCO skeleton.
pub const COCO_NUM_KEYPOINTS: usize = 17;

/// COCO-17 bones as undirected joint-index pairs.
///
/// Joint order: nose, left/right eye, left/right ear, left/right shoulder,
/// left/right elbow, left/right wrist, left/right hip, left/right knee,
/// left/right ankle.
pub const COCO_SKELETON: [[usize; 2]; 19] = [
    [15, 13], // left ankle - left knee
    [13, 11], // left knee - left hip
    [16, 14], // right ankle - right knee
    [14, 12], // right knee - right hip
    [11, 12], // hips
    [5, 11],  // left shoulder - left hip
    [6, 12],  // right shoulder - right hip
    [5, 6],   // shoulders
    [5, 7],   // left shoulder - left elbow
    [6, 8],   // right shoulder - right elbow
    [7, 9],   // left elbow - left wrist
    [8, 10],  // right elbow - right wrist
    [1, 2],   // eyes
    [0, 1],   // nose - left eye
    [0, 2],   // nose - right eye
    [1, 3],   // left eye - left ear
    [2, 4],   // right eye - right ear
    [3, 5],   // left ear - left shoulder
    [4, 6],   // right ear - right shoulder
];

// ---------------------------------------------------------------------------
// PoseGraph
// ---------------------------------------------------------------------------

/// Graph-structured representation of one person's pose.
///
/// Invariants: `node_features` has shape `[num_nodes, NODE_FEATURE_DIM]` and
/// every skeleton endpoint is `< num_nodes`.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseGraph {
    node_features: Array2<f32>,
    skeleton: Arc<[[usize; 2]]>,
    label: f32,
}

impl PoseGraph {
    /// Node feature matrix `[num_nodes, 3]`.
    pub fn node_features(&self) -> &Array2<f32> {
        &self.node_features
    }

    /// Number of nodes (joints).
    pub fn num_nodes(&self) -> usize {
        self.node_features.nrows()
    }

    /// Undirected skeleton bones.
    pub fn edges(&self) -> &[[usize; 2]] {
        &self.skeleton
    }

    /// Number of directed edges (each bone in both directions).
    pub fn num_directed_edges(&self) -> usize {
        self.skeleton.len() * 2
    }

    /// Both directions of every bone, as `(source, target)`.
    pub fn directed_edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.skeleton.iter().flat_map(|&[a, b]| [(a, b), (b, a)])
    }

    /// Directed edge index `[2, 2 · bones]`: row 0 sources, row 1 targets.
    pub fn edge_index(&self) -> Array2<usize> {
        let mut idx = Array2::<usize>::zeros((2, self.num_directed_edges()));
        for (e, (src, dst)) in self.directed_edges().enumerate() {
            idx[[0, e]] = src;
            idx[[1, e]] = dst;
        }
        idx
    }

    /// Scalar class label (`1.0` violent, `0.0` non-violent).
    pub fn label(&self) -> f32 {
        self.label
    }

    /// Class of this graph.
    pub fn class(&self) -> ClassLabel {
        ClassLabel::from_value(self.label)
    }

    /// Plain-data copy for external consumers (e.g. plotting).
    pub fn to_snapshot(&self) -> PoseGraphSnapshot {
        PoseGraphSnapshot {
            node_features: self.node_features.outer_iter().map(|row| row.to_vec()).collect(),
            edges: self.skeleton.to_vec(),
            label: self.label,
        }
    }
}

/// Serializable copy of a [`PoseGraph`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseGraphSnapshot {
    /// One `[x, y, confidence]` row per node.
    pub node_features: Vec<Vec<f32>>,
    /// Undirected skeleton bones.
    pub edges: Vec<[usize; 2]>,
    /// Scalar label.
    pub label: f32,
}

// ---------------------------------------------------------------------------
// PoseGraphBuilder
// ---------------------------------------------------------------------------

/// Converts keypoint arrays into [`PoseGraph`]s.
#[derive(Debug, Clone)]
pub struct PoseGraphBuilder {
    num_keypoints: usize,
    skeleton: Arc<[[usize; 2]]>,
    normalize: bool,
    min_confidence: f32,
}

impl PoseGraphBuilder {
    /// Builder for the COCO-17 skeleton with normalisation enabled.
    pub fn coco() -> Self {
        PoseGraphBuilder {
            num_keypoints: COCO_NUM_KEYPOINTS,
            skeleton: Arc::from(&COCO_SKELETON[..]),
            normalize: true,
            min_confidence: 0.0,
        }
    }

    /// Builder for a custom skeleton.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] when `num_keypoints` is zero or a bone
    /// references a joint index `>= num_keypoints`.
    pub fn with_skeleton(
        num_keypoints: usize,
        skeleton: &[[usize; 2]],
    ) -> Result<Self, ConfigError> {
        if num_keypoints == 0 {
            return Err(ConfigError::invalid_value("num_keypoints", "must be > 0"));
        }
        if let Some(bad) = skeleton.iter().find(|e| e[0] >= num_keypoints || e[1] >= num_keypoints) {
            return Err(ConfigError::invalid_value(
                "skeleton",
                format!("edge {bad:?} references a joint >= {num_keypoints}"),
            ));
        }
        Ok(PoseGraphBuilder {
            num_keypoints,
            skeleton: Arc::from(skeleton),
            normalize: true,
            min_confidence: 0.0,
        })
    }

    /// Builder matching a training configuration.
    ///
    /// Only the COCO skeleton is built in, so `num_keypoints` must be 17.
    pub fn from_config(config: &crate::config::TrainingConfig) -> Result<Self, ConfigError> {
        if config.num_keypoints != COCO_NUM_KEYPOINTS {
            return Err(ConfigError::invalid_value(
                "num_keypoints",
                format!(
                    "no built-in skeleton for {} joints (COCO has {COCO_NUM_KEYPOINTS})",
                    config.num_keypoints
                ),
            ));
        }
        Ok(Self::coco()
            .normalize(config.normalize_keypoints)
            .min_confidence(config.min_keypoint_confidence))
    }

    /// Enable or disable bounding-box normalisation of coordinates.
    pub fn normalize(mut self, on: bool) -> Self {
        self.normalize = on;
        self
    }

    /// Confidence at or below which a joint counts as absent.
    pub fn min_confidence(mut self, threshold: f32) -> Self {
        self.min_confidence = threshold;
        self
    }

    /// Expected joints per pose.
    pub fn num_keypoints(&self) -> usize {
        self.num_keypoints
    }

    /// The shared skeleton.
    pub fn skeleton(&self) -> &[[usize; 2]] {
        &self.skeleton
    }

    /// Build a labeled graph, or `None` when the pose is unusable.
    ///
    /// A pose is unusable when it is empty, has a joint count other than
    /// `num_keypoints`, contains a non-finite value, or has no joint with
    /// confidence above the threshold.
    pub fn build(&self, keypoints: &KeypointArray, label: ClassLabel) -> Option<PoseGraph> {
        if keypoints.is_empty() || keypoints.len() != self.num_keypoints {
            return None;
        }
        if keypoints
            .joints
            .iter()
            .any(|k| !(k.x.is_finite() && k.y.is_finite() && k.confidence.is_finite()))
        {
            return None;
        }
        let present = |c: f32| c > self.min_confidence;
        if !keypoints.joints.iter().any(|k| present(k.confidence)) {
            return None;
        }

        let (cx, cy, scale) = if self.normalize {
            reference_frame(keypoints, self.min_confidence)
        } else {
            (0.0, 0.0, 1.0)
        };

        let mut node_features = Array2::<f32>::zeros((self.num_keypoints, NODE_FEATURE_DIM));
        for (j, k) in keypoints.joints.iter().enumerate() {
            let (x, y) = if self.normalize && !present(k.confidence) {
                (0.0, 0.0)
            } else {
                ((k.x - cx) / scale, (k.y - cy) / scale)
            };
            node_features[[j, 0]] = x;
            node_features[[j, 1]] = y;
            node_features[[j, 2]] = k.confidence;
        }

        Some(PoseGraph { node_features, skeleton: Arc::clone(&self.skeleton), label: label.value() })
    }
}

impl Default for PoseGraphBuilder {
    fn default() -> Self {
        Self::coco()
    }
}

/// Bounding-box center and diagonal of the present joints.
///
/// The diagonal falls back to `1.0` for a degenerate (single point) box.
fn reference_frame(keypoints: &KeypointArray, min_confidence: f32) -> (f32, f32, f32) {
    let mut x_min = f32::MAX;
    let mut x_max = f32::MIN;
    let mut y_min = f32::MAX;
    let mut y_max = f32::MIN;
    for k in keypoints.joints.iter().filter(|k| k.confidence > min_confidence) {
        x_min = x_min.min(k.x);
        x_max = x_max.max(k.x);
        y_min = y_min.min(k.y);
        y_max = y_max.max(k.y);
    }
    let w = (x_max - x_min).max(0.0);
    let h = (y_max - y_min).max(0.0);
    let diag = (w * w + h * h).sqrt();
    let scale = if diag > 1e-6 { diag } else { 1.0 };
    ((x_min + x_max) / 2.0, (y_min + y_max) / 2.0, scale)
}
