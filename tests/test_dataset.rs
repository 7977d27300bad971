//! Integration tests for [`pose_violence_train::dataset`].
//!
//! Every test lays out a small keypoint corpus on disk under a
//! [`tempfile::TempDir`]:
//!
//! ```text
//! <tmp>/violent/cam1/*.json
//! <tmp>/non-violent/cam1/*.json
//! ```

use pose_violence_train::config::TrainingConfig;
use pose_violence_train::dataset::CorpusAssembler;
use pose_violence_train::device::{ComputeDevice, FixedProbe, RunContext};
use pose_violence_train::error::{DatasetError, TrainError};
use pose_violence_train::graph::PoseGraphBuilder;
use std::path::Path;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Write `n_files` keypoint files, each with one frame of `persons` people.
fn write_files(dir: &Path, n_files: usize, persons: usize) {
    std::fs::create_dir_all(dir).unwrap();
    for f in 0..n_files {
        let instances: Vec<serde_json::Value> = (0..persons)
            .map(|p| {
                let kps: Vec<[f32; 3]> = (0..17)
                    .map(|j| [10.0 * j as f32 + p as f32, 5.0 * j as f32 + f as f32, 0.9])
                    .collect();
                serde_json::json!({ "keypoints": kps })
            })
            .collect();
        let doc = serde_json::json!({
            "instance_info": [ { "frame_id": 0, "instances": instances } ]
        });
        std::fs::write(dir.join(format!("video_{f:03}.json")), doc.to_string()).unwrap();
    }
}

fn config(root: &Path, sample_percentage: u32) -> TrainingConfig {
    TrainingConfig {
        data_dir: root.to_path_buf(),
        sample_percentage,
        ..TrainingConfig::default()
    }
}

fn assembler(cfg: &TrainingConfig) -> CorpusAssembler {
    CorpusAssembler::new(PoseGraphBuilder::from_config(cfg).unwrap(), cfg.sample_percentage).unwrap()
}

// ---------------------------------------------------------------------------
// File truncation
// ---------------------------------------------------------------------------

/// 100 percent processes every file in both directories.
#[test]
fn full_percentage_processes_every_file() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("violent/cam1"), 7, 2);
    write_files(&tmp.path().join("non-violent/cam1"), 5, 1);

    let cfg = config(tmp.path(), 100);
    let ctx = RunContext::resolve(&cfg, &FixedProbe(0));
    let (corpus, report) = assembler(&cfg).assemble(&ctx).unwrap();

    assert_eq!(report.directories.len(), 2);
    assert_eq!(report.directories[0].files_processed, 7);
    assert_eq!(report.directories[1].files_processed, 5);
    assert_eq!(corpus.num_positive(), 14);
    assert_eq!(corpus.num_negative(), 5);
}

/// 1 percent still processes one file per directory.
#[test]
fn one_percent_processes_at_least_one_file() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("violent/cam1"), 3, 1);
    write_files(&tmp.path().join("non-violent/cam1"), 3, 1);

    let cfg = config(tmp.path(), 1);
    let ctx = RunContext::resolve(&cfg, &FixedProbe(0));
    let (corpus, report) = assembler(&cfg).assemble(&ctx).unwrap();

    assert!(report.directories.iter().all(|d| d.files_processed == 1));
    assert_eq!(corpus.len(), 2);
}

/// Assembly order: violent samples precede non-violent ones per camera.
#[test]
fn assembly_order_is_deterministic() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("violent/cam1"), 2, 1);
    write_files(&tmp.path().join("non-violent/cam1"), 2, 1);

    let cfg = config(tmp.path(), 100);
    let ctx = RunContext::resolve(&cfg, &FixedProbe(0));
    let (a, _) = assembler(&cfg).assemble(&ctx).unwrap();
    let (b, _) = assembler(&cfg).assemble(&ctx).unwrap();

    assert_eq!(a.labels(), vec![1.0, 1.0, 0.0, 0.0]);
    assert_eq!(a.graphs(), b.graphs());
}

/// Malformed person records are skipped without losing the rest of the file.
#[test]
fn malformed_instances_do_not_abort_assembly() {
    let tmp = TempDir::new().unwrap();
    let good: Vec<[f32; 3]> = (0..17).map(|j| [j as f32, 2.0 * j as f32, 0.9]).collect();
    let bad_shapes = [
        serde_json::json!({ "keypoints": null }),
        serde_json::json!({ "keypoints": [[1.0, null, 0.9]] }),
        serde_json::json!({ "keypoints": [1.0, 2.0, 0.9] }),
        serde_json::json!({ "keypoints": "not a pose" }),
    ];
    for class in ["violent", "non-violent"] {
        let dir = tmp.path().join(class).join("cam1");
        std::fs::create_dir_all(&dir).unwrap();
        for (i, bad) in bad_shapes.iter().enumerate() {
            let doc = serde_json::json!({
                "instance_info": [ { "frame_id": 0, "instances": [ bad, { "keypoints": good } ] } ]
            });
            std::fs::write(dir.join(format!("f{i}.json")), doc.to_string()).unwrap();
        }
    }

    let cfg = config(tmp.path(), 100);
    let ctx = RunContext::resolve(&cfg, &FixedProbe(0));
    let (corpus, report) = assembler(&cfg).assemble(&ctx).unwrap();

    assert_eq!(corpus.num_positive(), 4);
    assert_eq!(corpus.num_negative(), 4);
    for d in &report.directories {
        assert_eq!(d.instances_seen, 8);
        assert_eq!(d.skipped(), 4);
    }
}

// ---------------------------------------------------------------------------
// Camera sources
// ---------------------------------------------------------------------------

/// A missing second camera is skipped and reported.
#[test]
fn missing_second_camera_is_tolerated() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("violent/cam1"), 2, 1);
    write_files(&tmp.path().join("non-violent/cam1"), 2, 1);

    let cfg = config(tmp.path(), 100);
    let ctx = RunContext::resolve(&cfg, &FixedProbe(0));
    let (corpus, report) = assembler(&cfg).assemble(&ctx).unwrap();

    assert_eq!(corpus.len(), 4);
    assert_eq!(report.skipped_cameras, vec!["cam2".to_string()]);
}

/// A camera with only one class directory is skipped whole, so it cannot
/// skew the class balance.
#[test]
fn half_present_camera_is_skipped_whole() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("violent/cam1"), 2, 1);
    write_files(&tmp.path().join("non-violent/cam1"), 2, 1);
    write_files(&tmp.path().join("violent/cam2"), 5, 3);

    let cfg = config(tmp.path(), 100);
    let ctx = RunContext::resolve(&cfg, &FixedProbe(0));
    let (corpus, report) = assembler(&cfg).assemble(&ctx).unwrap();

    assert_eq!(corpus.num_positive(), 2, "cam2 violent samples must not be loaded");
    assert_eq!(corpus.num_negative(), 2);
    assert_eq!(report.directories.len(), 2);
    assert_eq!(report.skipped_cameras, vec!["cam2".to_string()]);
}

/// Classes split across cameras leave no complete camera, which is fatal.
#[test]
fn no_complete_camera_is_fatal() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("violent/cam1"), 1, 1);
    write_files(&tmp.path().join("non-violent/cam2"), 1, 1);

    let cfg = config(tmp.path(), 100);
    let ctx = RunContext::resolve(&cfg, &FixedProbe(0));
    let err = assembler(&cfg).assemble(&ctx).unwrap_err();
    assert!(matches!(err, TrainError::Dataset(DatasetError::NoSourceForLabel { .. })));
}

/// Both cameras are concatenated when present.
#[test]
fn cameras_are_concatenated() {
    let tmp = TempDir::new().unwrap();
    for cam in ["cam1", "cam2"] {
        write_files(&tmp.path().join("violent").join(cam), 1, 1);
        write_files(&tmp.path().join("non-violent").join(cam), 1, 2);
    }
    let cfg = config(tmp.path(), 100);
    let ctx = RunContext::resolve(&cfg, &FixedProbe(0));
    let (corpus, report) = assembler(&cfg).assemble(&ctx).unwrap();

    assert_eq!(corpus.len(), 6);
    assert_eq!(report.total_files_processed(), 4);
    assert_eq!(corpus.labels(), vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
}

/// No directory at all for one label leaves no complete camera, which is fatal.
#[test]
fn label_without_any_source_is_fatal() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("violent/cam1"), 2, 1);

    let cfg = config(tmp.path(), 100);
    let ctx = RunContext::resolve(&cfg, &FixedProbe(0));
    let err = assembler(&cfg).assemble(&ctx).unwrap_err();
    match err {
        TrainError::Dataset(DatasetError::NoSourceForLabel { label, .. }) => {
            assert_eq!(label, "non-violent")
        }
        other => panic!("expected NoSourceForLabel, got {other:?}"),
    }
}

/// An existing directory with no JSON files is fatal.
#[test]
fn directory_without_json_is_fatal() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("violent/cam1"), 1, 1);
    std::fs::create_dir_all(tmp.path().join("non-violent/cam1")).unwrap();
    std::fs::write(tmp.path().join("non-violent/cam1/readme.txt"), "x").unwrap();

    let cfg = config(tmp.path(), 100);
    let ctx = RunContext::resolve(&cfg, &FixedProbe(0));
    let err = assembler(&cfg).assemble(&ctx).unwrap_err();
    assert!(matches!(err, TrainError::Dataset(DatasetError::NoEligibleFiles { .. })));
}

/// Files whose every instance is malformed leave an empty corpus, which is
/// fatal once assembly finishes.
#[test]
fn all_instances_skipped_is_empty_corpus() {
    let tmp = TempDir::new().unwrap();
    for class in ["violent", "non-violent"] {
        let dir = tmp.path().join(class).join("cam1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("a.json"),
            r#"{"instance_info":[{"frame_id":0,"instances":[{"keypoints":[]}]}]}"#,
        )
        .unwrap();
    }
    let cfg = config(tmp.path(), 100);
    let ctx = RunContext::resolve(&cfg, &FixedProbe(0));
    let err = assembler(&cfg).assemble(&ctx).unwrap_err();
    assert!(matches!(err, TrainError::EmptyCorpus));
}

/// The host-only sub-directory is honoured on the CPU.
#[test]
fn cpu_subdirectory_layout() {
    let tmp = TempDir::new().unwrap();
    write_files(&tmp.path().join("violent/cam1/processed"), 1, 1);
    write_files(&tmp.path().join("non-violent/cam1/processed"), 1, 1);

    let cfg = TrainingConfig { cpu_data_subdir: Some("processed".into()), ..config(tmp.path(), 100) };
    let ctx = RunContext::resolve(&cfg, &FixedProbe(0));
    assert_eq!(ctx.device, ComputeDevice::Cpu);
    let (corpus, _) = assembler(&cfg).assemble(&ctx).unwrap();
    assert_eq!(corpus.len(), 2);
}
