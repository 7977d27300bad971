//! Integration tests for [`pose_violence_train::config`].
//!
//! Covers the documented defaults, JSON persistence, and the validation
//! rules. Files are written into [`tempfile::TempDir`]s.

use pose_violence_train::config::{TrainingConfig, DEFAULT_ARTIFACT_PATH};
use pose_violence_train::error::ConfigError;
use std::path::PathBuf;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// The defaults must match the documented values.
#[test]
fn defaults_match_documentation() {
    let cfg = TrainingConfig::default();
    assert_eq!(cfg.batch_size, 32);
    assert_eq!(cfg.num_epochs, 2);
    assert!((cfg.learning_rate - 1e-3).abs() < 1e-15);
    assert_eq!(cfg.sample_percentage, 1);
    assert_eq!(cfg.hidden_channels, 64);
    assert_eq!(cfg.attention_heads, 4);
    assert_eq!(cfg.attention_layers, 2);
    assert!((cfg.test_split_ratio - 0.2).abs() < 1e-15);
    assert!((cfg.validation_split_ratio - 0.25).abs() < 1e-15);
    assert_eq!(cfg.seed, 42);
    assert_eq!(cfg.num_keypoints, 17);
    assert_eq!(cfg.cameras, vec!["cam1".to_string(), "cam2".to_string()]);
    assert_eq!(cfg.artifact_path, PathBuf::from(DEFAULT_ARTIFACT_PATH));
    assert_eq!(cfg.node_feature_dim(), 3);
    assert!(!cfg.use_gpu);
}

// ---------------------------------------------------------------------------
// JSON persistence
// ---------------------------------------------------------------------------

/// A saved config reloads to an identical value.
#[test]
fn save_and_reload() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("cfg.json");

    let cfg = TrainingConfig {
        data_dir: PathBuf::from("/data/poses"),
        cpu_data_subdir: Some("processed".into()),
        sample_percentage: 50,
        num_epochs: 10,
        seed: 7,
        ..TrainingConfig::default()
    };
    cfg.to_json(&path).expect("save");

    let loaded = TrainingConfig::from_json(&path).expect("load");
    assert_eq!(loaded, cfg);
}

/// A file holding an invalid value is rejected on load.
#[test]
fn invalid_file_rejected_on_load() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("cfg.json");
    std::fs::write(&path, r#"{ "sample_percentage": 0 }"#).unwrap();

    let err = TrainingConfig::from_json(&path).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { field: "sample_percentage", .. }));
}

/// Malformed JSON is a parse error, not a panic.
#[test]
fn malformed_json_is_parse_error() {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("cfg.json");
    std::fs::write(&path, "{ batch_size: ").unwrap();

    let err = TrainingConfig::from_json(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError { .. }));
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Each zero-valued count is rejected with its own field name.
#[test]
fn zero_counts_name_their_field() {
    let cases: [(&str, fn(&mut TrainingConfig)); 5] = [
        ("batch_size", |c| c.batch_size = 0),
        ("num_epochs", |c| c.num_epochs = 0),
        ("hidden_channels", |c| c.hidden_channels = 0),
        ("attention_heads", |c| c.attention_heads = 0),
        ("num_keypoints", |c| c.num_keypoints = 0),
    ];
    for (name, mutate) in cases {
        let mut cfg = TrainingConfig::default();
        mutate(&mut cfg);
        match cfg.validate() {
            Err(ConfigError::InvalidValue { field, .. }) => assert_eq!(field, name),
            other => panic!("expected InvalidValue for {name}, got {other:?}"),
        }
    }
}

/// Non-positive and non-finite learning rates are rejected.
#[test]
fn learning_rate_must_be_positive_and_finite() {
    for lr in [0.0, -1e-3, f64::NAN, f64::INFINITY] {
        let cfg = TrainingConfig { learning_rate: lr, ..TrainingConfig::default() };
        assert!(cfg.validate().is_err(), "learning_rate {lr} must be rejected");
    }
}

/// An empty camera list leaves nothing to load.
#[test]
fn cameras_required() {
    let cfg = TrainingConfig { cameras: vec![], ..TrainingConfig::default() };
    assert!(cfg.validate().is_err());
}
