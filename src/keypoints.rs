//! Keypoint record parsing.
//!
//! One source file describes one video. The document layout is:
//!
//! ```text
//! {
//!   "instance_info": [                 // frames, in order
//!     {
//!       "frame_id": 1,                 // informational only
//!       "instances": [                 // people in the frame, in order
//!         { "keypoints": [[x, y, c], ...] },
//!         { "keypoints": [[x, y], ...], "keypoint_scores": [c, ...] }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Both the triple form and the pose-estimator's pair + `keypoint_scores`
//! form are accepted. Anything else in the document is ignored. An instance
//! whose keypoints are missing, empty, or malformed converts to `None` and is
//! skipped by the caller. A malformed instance never fails the whole file;
//! only a document that is not JSON, or whose frame list is malformed, does.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

use crate::error::DatasetError;

// ---------------------------------------------------------------------------
// ClassLabel
// ---------------------------------------------------------------------------

/// Binary class of a source directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassLabel {
    /// Violent behaviour (positive class, label `1.0`).
    Violent,
    /// Non-violent behaviour (negative class, label `0.0`).
    NonViolent,
}

impl ClassLabel {
    /// Scalar training target for this class.
    pub fn value(self) -> f32 {
        match self {
            ClassLabel::Violent => 1.0,
            ClassLabel::NonViolent => 0.0,
        }
    }

    /// Class for a scalar label (`>= 0.5` is violent).
    pub fn from_value(v: f32) -> Self {
        if v >= 0.5 {
            ClassLabel::Violent
        } else {
            ClassLabel::NonViolent
        }
    }

    /// Human-readable name used in logs and errors.
    pub fn name(self) -> &'static str {
        match self {
            ClassLabel::Violent => "violent",
            ClassLabel::NonViolent => "non-violent",
        }
    }
}

// ---------------------------------------------------------------------------
// Keypoint / KeypointArray
// ---------------------------------------------------------------------------

/// One joint detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// Horizontal image coordinate.
    pub x: f32,
    /// Vertical image coordinate.
    pub y: f32,
    /// Detector confidence.
    pub confidence: f32,
}

impl Keypoint {
    /// Construct a keypoint.
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Keypoint { x, y, confidence }
    }
}

/// Ordered joints of one person in one frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeypointArray {
    /// Joints in skeleton order.
    pub joints: Vec<Keypoint>,
}

impl KeypointArray {
    /// Wrap a joint list.
    pub fn new(joints: Vec<Keypoint>) -> Self {
        KeypointArray { joints }
    }

    /// Build from `(x, y, confidence)` triples.
    pub fn from_triples(triples: &[[f32; 3]]) -> Self {
        KeypointArray {
            joints: triples.iter().map(|t| Keypoint::new(t[0], t[1], t[2])).collect(),
        }
    }

    /// Number of joints.
    pub fn len(&self) -> usize {
        self.joints.len()
    }

    /// `true` when no joints are present.
    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }
}

// ---------------------------------------------------------------------------
// On-disk document
// ---------------------------------------------------------------------------

/// A parsed keypoint source file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeypointFile {
    /// Frame records in file order.
    #[serde(default)]
    pub instance_info: Vec<FrameRecord>,
}

/// One frame of a keypoint file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameRecord {
    /// Frame identifier as written by the producer; not interpreted.
    #[serde(default)]
    pub frame_id: serde_json::Value,
    /// Person instances in detection order. Entries that do not match the
    /// instance shape are kept as empty records so they count as skipped.
    #[serde(default, deserialize_with = "lenient_instances")]
    pub instances: Vec<InstanceRecord>,
}

/// Decode each instance on its own; a bad one becomes an empty record.
fn lenient_instances<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<InstanceRecord>, D::Error> {
    let items = match serde_json::Value::deserialize(d)? {
        serde_json::Value::Array(items) => items,
        _ => return Ok(Vec::new()),
    };
    Ok(items
        .into_iter()
        .map(|item| serde_json::from_value(item).unwrap_or_default())
        .collect())
}

/// One detected person.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Per-joint rows: `[x, y, c]` or `[x, y]`.
    #[serde(default)]
    pub keypoints: Vec<Vec<f32>>,
    /// Per-joint confidences accompanying `[x, y]` rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keypoint_scores: Option<Vec<f32>>,
}

impl InstanceRecord {
    /// Convert the raw rows into a [`KeypointArray`].
    ///
    /// Returns `None` when there are no rows, a row has fewer than two
    /// values, or `keypoint_scores` is present with a different length.
    pub fn to_keypoint_array(&self) -> Option<KeypointArray> {
        if self.keypoints.is_empty() {
            return None;
        }
        if let Some(scores) = &self.keypoint_scores {
            if scores.len() != self.keypoints.len() {
                return None;
            }
        }
        let joints = self
            .keypoints
            .iter()
            .enumerate()
            .map(|(j, row)| match row.as_slice() {
                [x, y, c, ..] => Some(Keypoint::new(*x, *y, *c)),
                [x, y] => {
                    let c = self
                        .keypoint_scores
                        .as_ref()
                        .map_or(1.0, |scores| scores[j]);
                    Some(Keypoint::new(*x, *y, c))
                }
                _ => None,
            })
            .collect::<Option<Vec<_>>>()?;
        Some(KeypointArray::new(joints))
    }
}

impl KeypointFile {
    /// Read and parse the keypoint file at `path`.
    ///
    /// # Errors
    ///
    /// [`DatasetError::IoError`] when the file cannot be read and
    /// [`DatasetError::InvalidFormat`] when it is not a keypoint document.
    pub fn read(path: &Path) -> Result<Self, DatasetError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| DatasetError::io_error(path, e))?;
        Self::parse(&contents).map_err(|e| DatasetError::invalid_format(path, e.to_string()))
    }

    /// Parse a keypoint document from a JSON string.
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Every instance of every frame, in file order, converted to a
    /// [`KeypointArray`] (`None` for instances that must be skipped).
    pub fn instances(&self) -> impl Iterator<Item = Option<KeypointArray>> + '_ {
        self.instance_info
            .iter()
            .flat_map(|frame| frame.instances.iter())
            .map(InstanceRecord::to_keypoint_array)
    }

    /// Number of person instances in the file, including skipped ones.
    pub fn num_instances(&self) -> usize {
        self.instance_info.iter().map(|f| f.instances.len()).sum()
    }
}
