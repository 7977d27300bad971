//! Integration tests for keypoint parsing and [`PoseGraphBuilder`].
//!
//! [`PoseGraphBuilder`]: pose_violence_train::graph::PoseGraphBuilder

use pose_violence_train::graph::{PoseGraphBuilder, COCO_NUM_KEYPOINTS, COCO_SKELETON};
use pose_violence_train::keypoints::{ClassLabel, KeypointArray, KeypointFile};

fn pose(n: usize, conf: f32) -> KeypointArray {
    KeypointArray::from_triples(
        &(0..n).map(|j| [100.0 + j as f32 * 3.0, 50.0 + (j % 5) as f32 * 7.0, conf]).collect::<Vec<_>>(),
    )
}

/// Every skeleton bone references a valid COCO joint.
#[test]
fn skeleton_endpoints_in_range() {
    assert_eq!(COCO_SKELETON.len(), 19);
    for [a, b] in COCO_SKELETON {
        assert!(a < COCO_NUM_KEYPOINTS && b < COCO_NUM_KEYPOINTS);
        assert_ne!(a, b);
    }
}

/// A valid pose yields N nodes and edges whose endpoints are all `< N`.
#[test]
fn valid_pose_builds_graph() {
    let g = PoseGraphBuilder::coco().build(&pose(17, 0.7), ClassLabel::NonViolent).expect("graph");
    assert_eq!(g.num_nodes(), 17);
    assert_eq!(g.label(), 0.0);

    let ei = g.edge_index();
    assert_eq!(ei.dim(), (2, 38));
    assert!(ei.iter().all(|&v| v < 17));
    // Both directions of the first bone are present.
    let [a, b] = COCO_SKELETON[0];
    let pairs: Vec<(usize, usize)> = g.directed_edges().collect();
    assert!(pairs.contains(&(a, b)));
    assert!(pairs.contains(&(b, a)));
}

/// Empty input yields no sample.
#[test]
fn empty_pose_yields_no_sample() {
    assert!(PoseGraphBuilder::coco().build(&KeypointArray::default(), ClassLabel::Violent).is_none());
}

/// Wrong joint counts yield no sample.
#[test]
fn wrong_node_count_yields_no_sample() {
    for n in [1, 16, 18, 33] {
        assert!(PoseGraphBuilder::coco().build(&pose(n, 0.7), ClassLabel::Violent).is_none());
    }
}

/// The confidence threshold decides whether any joint is present.
#[test]
fn min_confidence_filters_weak_poses() {
    let b = PoseGraphBuilder::coco().min_confidence(0.5);
    assert!(b.build(&pose(17, 0.4), ClassLabel::Violent).is_none());
    assert!(b.build(&pose(17, 0.6), ClassLabel::Violent).is_some());
}

/// The config builder rejects skeleton sizes without a built-in topology.
#[test]
fn builder_from_config_requires_coco() {
    let mut cfg = pose_violence_train::TrainingConfig::default();
    assert!(PoseGraphBuilder::from_config(&cfg).is_ok());
    cfg.num_keypoints = 25;
    assert!(PoseGraphBuilder::from_config(&cfg).is_err());
}

/// Parsed file instances feed straight into the builder.
#[test]
fn file_instances_to_graphs() {
    let kps: Vec<[f32; 3]> = (0..17).map(|j| [j as f32, 2.0 * j as f32, 0.9]).collect();
    let doc = serde_json::json!({
        "instance_info": [
            { "frame_id": 0, "instances": [ { "keypoints": kps }, { "keypoints": [] } ] },
            { "frame_id": 1, "instances": [] },
            { "frame_id": 2, "instances": [ { "keypoints": kps } ] }
        ]
    });
    let file = KeypointFile::parse(&doc.to_string()).expect("parse");
    let b = PoseGraphBuilder::coco();
    let graphs: Vec<_> = file
        .instances()
        .filter_map(|kp| kp.and_then(|kp| b.build(&kp, ClassLabel::Violent)))
        .collect();
    assert_eq!(file.num_instances(), 3);
    assert_eq!(graphs.len(), 2);
}
