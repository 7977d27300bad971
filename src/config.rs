//! Training configuration for the pose-graph violence classifier.
//!
//! [`TrainingConfig`] is the single source of truth for all hyper-parameters,
//! data locations, split ratios, and output paths used throughout the
//! pipeline. It is passed explicitly through the call chain; nothing reads
//! ambient globals. It is serializable via [`serde`] so it can be stored to /
//! restored from JSON and embedded in the saved model artifact.
//!
//! # Example
//!
//! ```rust
//! use pose_violence_train::config::TrainingConfig;
//!
//! let cfg = TrainingConfig::default();
//! cfg.validate().expect("default config is valid");
//!
//! assert_eq!(cfg.num_keypoints, 17);
//! assert_eq!(cfg.batch_size, 32);
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Default location of the persisted model artifact, relative to the working
/// directory.
pub const DEFAULT_ARTIFACT_PATH: &str = "violence_detection_model.json";

// ---------------------------------------------------------------------------
// TrainingConfig
// ---------------------------------------------------------------------------

/// Complete configuration for a training run.
///
/// All fields have documented defaults. Use [`TrainingConfig::default()`] as
/// a starting point, then override individual fields as needed. Unknown
/// fields in a JSON file are rejected so typos surface immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfig {
    // -----------------------------------------------------------------------
    // Data
    // -----------------------------------------------------------------------
    /// Root directory holding the class directories. Default: **`json`**.
    pub data_dir: PathBuf,

    /// Name of the violent class directory under `data_dir`.
    /// Default: **`violent`**.
    pub violent_dir: String,

    /// Name of the non-violent class directory under `data_dir`.
    /// Default: **`non-violent`**.
    pub non_violent_dir: String,

    /// Camera source sub-directories, processed in order and concatenated.
    ///
    /// A camera whose directories are missing is skipped. Default:
    /// **`["cam1", "cam2"]`**.
    pub cameras: Vec<String>,

    /// Extra sub-directory appended to every camera directory when the run
    /// executes on the CPU (host-side preprocessed copies). Default: **none**.
    pub cpu_data_subdir: Option<String>,

    /// Percentage of files per class directory to process, in `[1, 100]`.
    ///
    /// At least one file is always processed. Default: **1**.
    pub sample_percentage: u32,

    // -----------------------------------------------------------------------
    // Pose graph
    // -----------------------------------------------------------------------
    /// Number of joints per pose (COCO 17-joint skeleton). Default: **17**.
    pub num_keypoints: usize,

    /// Center joint coordinates on the pose bounding box and divide by its
    /// diagonal. Default: **true**.
    pub normalize_keypoints: bool,

    /// Joints with confidence at or below this value are considered absent
    /// when deciding whether a pose is valid and when computing the
    /// normalisation box. Default: **0.0**.
    pub min_keypoint_confidence: f32,

    // -----------------------------------------------------------------------
    // Model
    // -----------------------------------------------------------------------
    /// Hidden width of the graph layers. Default: **64**.
    pub hidden_channels: usize,

    /// Number of attention heads per graph-attention layer. Default: **4**.
    ///
    /// Only read by the `tch-backend` graph transformer. The default GCN
    /// ignores it, though it is still validated and stored in artifacts.
    pub attention_heads: usize,

    /// Number of stacked graph-attention layers. Default: **2**.
    ///
    /// Only read by the `tch-backend` graph transformer; the GCN has a
    /// single propagation layer.
    pub attention_layers: usize,

    // -----------------------------------------------------------------------
    // Optimisation
    // -----------------------------------------------------------------------
    /// Mini-batch size (graphs per batch). Default: **32**.
    pub batch_size: usize,

    /// Total number of training epochs. Default: **2**.
    pub num_epochs: usize,

    /// Adam learning rate. Default: **1e-3**.
    pub learning_rate: f64,

    // -----------------------------------------------------------------------
    // Splitting
    // -----------------------------------------------------------------------
    /// Fraction of the corpus held out as the test split (stratified).
    /// Default: **0.2**.
    pub test_split_ratio: f64,

    /// Fraction of the remaining train+val pool used for validation.
    /// Default: **0.25**.
    pub validation_split_ratio: f64,

    // -----------------------------------------------------------------------
    // Outputs
    // -----------------------------------------------------------------------
    /// Path of the persisted model artifact.
    /// Default: **`violence_detection_model.json`**.
    pub artifact_path: PathBuf,

    /// Directory receiving the visualization hand-off files.
    /// Default: **`plots`**.
    pub report_dir: PathBuf,

    // -----------------------------------------------------------------------
    // Device
    // -----------------------------------------------------------------------
    /// Use a CUDA device when the capability probe reports one.
    /// Default: **false**.
    pub use_gpu: bool,

    /// CUDA device index when `use_gpu` is `true`. Default: **0**.
    pub gpu_device_id: usize,

    // -----------------------------------------------------------------------
    // Reproducibility
    // -----------------------------------------------------------------------
    /// Seed for the splitter, the batch shuffler, and parameter
    /// initialisation. Default: **42**.
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            // Data
            data_dir: PathBuf::from("json"),
            violent_dir: "violent".to_string(),
            non_violent_dir: "non-violent".to_string(),
            cameras: vec!["cam1".to_string(), "cam2".to_string()],
            cpu_data_subdir: None,
            sample_percentage: 1,
            // Pose graph
            num_keypoints: 17,
            normalize_keypoints: true,
            min_keypoint_confidence: 0.0,
            // Model
            hidden_channels: 64,
            attention_heads: 4,
            attention_layers: 2,
            // Optimisation
            batch_size: 32,
            num_epochs: 2,
            learning_rate: 1e-3,
            // Splitting
            test_split_ratio: 0.2,
            validation_split_ratio: 0.25,
            // Outputs
            artifact_path: PathBuf::from(DEFAULT_ARTIFACT_PATH),
            report_dir: PathBuf::from("plots"),
            // Device
            use_gpu: false,
            gpu_device_id: 0,
            // Reproducibility
            seed: 42,
        }
    }
}

impl TrainingConfig {
    /// Load a [`TrainingConfig`] from a JSON file at `path` and validate it.
    ///
    /// Fields absent from the file keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileRead`] if the file cannot be opened,
    /// [`ConfigError::ParseError`] if the JSON is malformed, and
    /// [`ConfigError::InvalidValue`] if validation fails.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: TrainingConfig =
            serde_json::from_str(&contents).map_err(|source| ConfigError::ParseError {
                path: path.to_path_buf(),
                source,
            })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize this configuration to pretty-printed JSON and write it to
    /// `path`, creating parent directories if necessary.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileRead`] if the directory cannot be created or
    /// the file cannot be written.
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::FileRead {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::invalid_value("(serialization)", e.to_string()))?;
        std::fs::write(path, json).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Per-node feature width produced by the graph builder (`x`, `y`,
    /// `confidence`).
    pub fn node_feature_dim(&self) -> usize {
        crate::graph::NODE_FEATURE_DIM
    }

    /// Validate all fields and return an error describing the first problem
    /// found, or `Ok(())` if the configuration is coherent.
    ///
    /// # Validated invariants
    ///
    /// - `sample_percentage` is within `[1, 100]`.
    /// - Class directory names are non-empty and distinct.
    /// - At least one camera is listed and no camera name is empty.
    /// - `num_keypoints`, `batch_size`, `num_epochs` are at least 1.
    /// - `hidden_channels`, `attention_heads`, `attention_layers` are at least
    ///   1 and `hidden_channels` is divisible by `attention_heads`.
    /// - `learning_rate` is finite and strictly positive.
    /// - Both split ratios lie strictly inside `(0, 1)`.
    /// - `min_keypoint_confidence` is finite.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Data
        if !(1..=100).contains(&self.sample_percentage) {
            return Err(ConfigError::invalid_value(
                "sample_percentage",
                format!("must be in [1, 100], got {}", self.sample_percentage),
            ));
        }
        if self.violent_dir.trim().is_empty() {
            return Err(ConfigError::invalid_value("violent_dir", "must not be empty"));
        }
        if self.non_violent_dir.trim().is_empty() {
            return Err(ConfigError::invalid_value("non_violent_dir", "must not be empty"));
        }
        if self.violent_dir == self.non_violent_dir {
            return Err(ConfigError::invalid_value(
                "non_violent_dir",
                "must differ from violent_dir",
            ));
        }
        if self.cameras.is_empty() {
            return Err(ConfigError::invalid_value("cameras", "at least one camera is required"));
        }
        if self.cameras.iter().any(|c| c.trim().is_empty()) {
            return Err(ConfigError::invalid_value("cameras", "camera names must not be empty"));
        }

        // Pose graph
        if self.num_keypoints == 0 {
            return Err(ConfigError::invalid_value("num_keypoints", "must be > 0"));
        }
        if !self.min_keypoint_confidence.is_finite() {
            return Err(ConfigError::invalid_value(
                "min_keypoint_confidence",
                "must be finite",
            ));
        }

        // Model dims
        if self.hidden_channels == 0 {
            return Err(ConfigError::invalid_value("hidden_channels", "must be > 0"));
        }
        if self.attention_heads == 0 {
            return Err(ConfigError::invalid_value("attention_heads", "must be > 0"));
        }
        if self.attention_layers == 0 {
            return Err(ConfigError::invalid_value("attention_layers", "must be > 0"));
        }
        if self.hidden_channels % self.attention_heads != 0 {
            return Err(ConfigError::invalid_value(
                "hidden_channels",
                format!(
                    "must be divisible by attention_heads ({} % {} != 0)",
                    self.hidden_channels, self.attention_heads
                ),
            ));
        }

        // Optimisation
        if self.batch_size == 0 {
            return Err(ConfigError::invalid_value("batch_size", "must be > 0"));
        }
        if self.num_epochs == 0 {
            return Err(ConfigError::invalid_value("num_epochs", "must be > 0"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(ConfigError::invalid_value("learning_rate", "must be > 0.0"));
        }

        // Splits
        if !(self.test_split_ratio > 0.0 && self.test_split_ratio < 1.0) {
            return Err(ConfigError::invalid_value(
                "test_split_ratio",
                "must be in (0.0, 1.0)",
            ));
        }
        if !(self.validation_split_ratio > 0.0 && self.validation_split_ratio < 1.0) {
            return Err(ConfigError::invalid_value(
                "validation_split_ratio",
                "must be in (0.0, 1.0)",
            ));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
