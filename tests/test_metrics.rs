//! Integration tests for ROC analysis and threshold calibration in
//! [`pose_violence_train::metrics`].

use approx::assert_abs_diff_eq;
use pose_violence_train::error::TrainError;
use pose_violence_train::metrics::{
    roc_auc, roc_curve, roc_curve_with, ConfusionMatrix, ThresholdOptimizer, ThresholdReport,
};

// ---------------------------------------------------------------------------
// Perfect separation
// ---------------------------------------------------------------------------

/// Every positive outscoring every negative gives a perfect operating point.
#[test]
fn perfectly_separable_scores() {
    let scores = [0.9f32, 0.8, 0.2, 0.1];
    let labels = [1.0f32, 1.0, 0.0, 0.0];

    assert_abs_diff_eq!(roc_auc(&scores, &labels).unwrap(), 1.0, epsilon = 1e-12);

    let r = ThresholdOptimizer::new().optimize(&scores, &labels).unwrap();
    assert_abs_diff_eq!(r.sensitivity, 1.0);
    assert_abs_diff_eq!(r.specificity, 1.0);
    assert_abs_diff_eq!(r.precision, 1.0);
    assert_abs_diff_eq!(r.f1_score, 1.0);
    assert_abs_diff_eq!(r.youdens_j, 1.0);
    // The lowest positive score is the boundary for all three criteria.
    assert_abs_diff_eq!(r.threshold_j, f64::from(0.8f32));
    assert_eq!(r.threshold_distance, r.threshold_j);
    assert_eq!(r.threshold_f1, r.threshold_j);
    assert!(r.is_positive(0.8) && !r.is_positive(0.2));
}

/// Inverted scores give AUC 0 and Youden's J settles on the sentinel.
#[test]
fn inverted_scores() {
    let scores = [0.1f32, 0.2, 0.8, 0.9];
    let labels = [1.0f32, 1.0, 0.0, 0.0];
    assert_abs_diff_eq!(roc_auc(&scores, &labels).unwrap(), 0.0, epsilon = 1e-12);

    let r = ThresholdOptimizer::new().optimize(&scores, &labels).unwrap();
    assert!(r.threshold_j.is_infinite());
    assert_abs_diff_eq!(r.youdens_j, 0.0);
    assert_abs_diff_eq!(r.sensitivity, 0.0);
}

// ---------------------------------------------------------------------------
// Curve shape
// ---------------------------------------------------------------------------

/// The curve starts at the origin with an infinite threshold, ends at
/// (1, 1), and is monotone.
#[test]
fn curve_is_anchored_and_monotone() {
    let scores = [0.95f32, 0.7, 0.7, 0.6, 0.4, 0.35, 0.3, 0.1];
    let labels = [1.0f32, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0];
    let roc = roc_curve(&scores, &labels).unwrap();

    assert_eq!((roc.fpr[0], roc.tpr[0]), (0.0, 0.0));
    assert!(roc.thresholds[0].is_infinite());
    assert_eq!(*roc.fpr.last().unwrap(), 1.0);
    assert_eq!(*roc.tpr.last().unwrap(), 1.0);
    for w in roc.fpr.windows(2).chain(roc.tpr.windows(2)) {
        assert!(w[1] >= w[0]);
    }
    for w in roc.thresholds.windows(2) {
        assert!(w[1] < w[0]);
    }

    let full = roc_curve_with(&scores, &labels, false).unwrap();
    assert!(full.len() >= roc.len());
    assert_abs_diff_eq!(full.auc(), roc.auc(), epsilon = 1e-12);
}

/// AUC equals the fraction of correctly ranked positive/negative pairs,
/// counting ties as one half.
#[test]
fn auc_matches_pairwise_ranking() {
    let scores = [0.95f32, 0.7, 0.7, 0.6, 0.4, 0.35, 0.3, 0.1];
    let labels = [1.0f32, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0];
    let mut wins = 0.0;
    let mut pairs = 0.0;
    for (i, &li) in labels.iter().enumerate() {
        for (j, &lj) in labels.iter().enumerate() {
            if li == 1.0 && lj == 0.0 {
                pairs += 1.0;
                if scores[i] > scores[j] {
                    wins += 1.0;
                } else if scores[i] == scores[j] {
                    wins += 0.5;
                }
            }
        }
    }
    assert_abs_diff_eq!(roc_auc(&scores, &labels).unwrap(), wins / pairs, epsilon = 1e-12);
}

// ---------------------------------------------------------------------------
// Failure modes
// ---------------------------------------------------------------------------

/// A single class makes the ROC undefined.
#[test]
fn degenerate_labels_are_rejected() {
    let err = ThresholdOptimizer::new().optimize(&[0.3, 0.6], &[1.0, 1.0]).unwrap_err();
    assert!(matches!(err, TrainError::DegenerateLabels { positives: 2, negatives: 0 }));
    assert!(roc_auc(&[0.3, 0.6], &[0.0, 0.0]).is_err());
}

/// Mismatched slices are rejected rather than truncated.
#[test]
fn length_mismatch_is_rejected() {
    let err = roc_curve(&[0.1, 0.2, 0.3], &[0.0, 1.0]).unwrap_err();
    assert!(matches!(err, TrainError::LengthMismatch { .. }));
}

/// Zero denominators give 0 rather than NaN.
#[test]
fn zero_denominators_yield_zero() {
    let empty = ConfusionMatrix { tp: 0, fp: 0, tn: 0, fn_: 0 };
    assert_eq!(empty.sensitivity(), 0.0);
    assert_eq!(empty.specificity(), 0.0);
    assert_eq!(empty.precision(), 0.0);
    assert_eq!(empty.f1(), 0.0);

    // Nothing predicted positive: precision undefined, reported as 0.
    let cm = ConfusionMatrix::at_threshold(&[0.1, 0.2], &[1.0, 0.0], f64::INFINITY);
    assert_eq!(cm.tp + cm.fp, 0);
    assert_eq!(cm.precision(), 0.0);
    assert_eq!(cm.f1(), 0.0);
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Reports survive JSON, including an infinite threshold.
#[test]
fn report_json_keeps_infinite_thresholds() {
    let scores = [0.1f32, 0.2, 0.8, 0.9];
    let labels = [1.0f32, 1.0, 0.0, 0.0];
    let r = ThresholdOptimizer::new().optimize(&scores, &labels).unwrap();

    let json = serde_json::to_string(&r).unwrap();
    let back: ThresholdReport = serde_json::from_str(&json).unwrap();
    assert_eq!(back, r);
}
