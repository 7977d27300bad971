//! Ranking metrics and decision-threshold calibration.
//!
//! This module provides:
//!
//! - **ROC curve** ([`roc_curve`]): false-positive and true-positive rates at
//!   every distinct score, collinear points dropped, with a leading sentinel
//!   point `(0, 0)` at threshold `+∞`.
//! - **ROC AUC** ([`roc_auc`]): trapezoidal area under that curve.
//! - **Confusion matrix** at a cut (`score >= threshold` predicts positive).
//! - **Threshold optimisation** ([`ThresholdOptimizer`]): three candidate
//!   thresholds (Youden's J, closest-to-(0, 1), max F1) and the operating
//!   point metrics at the canonical one.
//!
//! The canonical threshold is always the Youden's J candidate. The other two
//! candidates are reported for comparison only.
//!
//! Every ratio with a zero denominator is defined as `0.0`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{TrainError, TrainResult};

// ---------------------------------------------------------------------------
// Input checks
// ---------------------------------------------------------------------------

fn check_inputs(scores: &[f32], labels: &[f32]) -> TrainResult<(usize, usize)> {
    if scores.len() != labels.len() {
        return Err(TrainError::LengthMismatch { scores: scores.len(), labels: labels.len() });
    }
    let positives = labels.iter().filter(|&&y| y >= 0.5).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return Err(TrainError::DegenerateLabels { positives, negatives });
    }
    Ok((positives, negatives))
}

// ---------------------------------------------------------------------------
// ROC curve
// ---------------------------------------------------------------------------

/// Receiver operating characteristic curve.
///
/// Points are ordered by decreasing threshold. `thresholds[0]` is `+∞`.
#[derive(Debug, Clone, PartialEq)]
pub struct RocCurve {
    /// False-positive rate per point.
    pub fpr: Vec<f64>,
    /// True-positive rate per point.
    pub tpr: Vec<f64>,
    /// Score threshold per point.
    pub thresholds: Vec<f64>,
}

impl RocCurve {
    /// Number of points.
    pub fn len(&self) -> usize {
        self.thresholds.len()
    }

    /// `true` when the curve has no points.
    pub fn is_empty(&self) -> bool {
        self.thresholds.is_empty()
    }

    /// Trapezoidal area under the curve.
    pub fn auc(&self) -> f64 {
        self.fpr
            .windows(2)
            .zip(self.tpr.windows(2))
            .map(|(x, y)| (x[1] - x[0]) * (y[1] + y[0]) / 2.0)
            .sum()
    }
}

/// ROC curve with collinear intermediate points dropped.
///
/// # Errors
///
/// [`TrainError::LengthMismatch`] if the inputs differ in length and
/// [`TrainError::DegenerateLabels`] unless both classes are present.
pub fn roc_curve(scores: &[f32], labels: &[f32]) -> TrainResult<RocCurve> {
    roc_curve_with(scores, labels, true)
}

/// ROC curve, optionally keeping every distinct-score point.
pub fn roc_curve_with(
    scores: &[f32],
    labels: &[f32],
    drop_intermediate: bool,
) -> TrainResult<RocCurve> {
    let (positives, negatives) = check_inputs(scores, labels)?;

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    // Cumulative counts at the last index of every distinct score.
    let mut tps: Vec<f64> = Vec::new();
    let mut fps: Vec<f64> = Vec::new();
    let mut thresholds: Vec<f64> = Vec::new();
    let mut tp = 0.0f64;
    for (rank, &i) in order.iter().enumerate() {
        if labels[i] >= 0.5 {
            tp += 1.0;
        }
        let last_of_run = order
            .get(rank + 1)
            .map_or(true, |&next| scores[next] != scores[i]);
        if last_of_run {
            tps.push(tp);
            fps.push((rank + 1) as f64 - tp);
            thresholds.push(f64::from(scores[i]));
        }
    }

    if drop_intermediate && tps.len() > 2 {
        let keep: Vec<usize> = (0..tps.len())
            .filter(|&k| {
                k == 0
                    || k + 1 == tps.len()
                    || second_diff(&fps, k - 1) != 0.0
                    || second_diff(&tps, k - 1) != 0.0
            })
            .collect();
        tps = keep.iter().map(|&k| tps[k]).collect();
        fps = keep.iter().map(|&k| fps[k]).collect();
        thresholds = keep.iter().map(|&k| thresholds[k]).collect();
    }

    let p = positives as f64;
    let n = negatives as f64;
    let mut curve = RocCurve {
        fpr: Vec::with_capacity(tps.len() + 1),
        tpr: Vec::with_capacity(tps.len() + 1),
        thresholds: Vec::with_capacity(tps.len() + 1),
    };
    curve.fpr.push(0.0);
    curve.tpr.push(0.0);
    curve.thresholds.push(f64::INFINITY);
    for k in 0..tps.len() {
        curve.fpr.push(fps[k] / n);
        curve.tpr.push(tps[k] / p);
        curve.thresholds.push(thresholds[k]);
    }
    Ok(curve)
}

/// `v[k + 2] − 2 v[k + 1] + v[k]`.
fn second_diff(v: &[f64], k: usize) -> f64 {
    v[k + 2] - 2.0 * v[k + 1] + v[k]
}

/// Area under the ROC curve.
pub fn roc_auc(scores: &[f32], labels: &[f32]) -> TrainResult<f64> {
    Ok(roc_curve(scores, labels)?.auc())
}

// ---------------------------------------------------------------------------
// ConfusionMatrix
// ---------------------------------------------------------------------------

/// Binary confusion matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// True positives.
    pub tp: usize,
    /// False positives.
    pub fp: usize,
    /// True negatives.
    pub tn: usize,
    /// False negatives.
    pub fn_: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl ConfusionMatrix {
    /// Matrix for the cut `score >= threshold`.
    pub fn at_threshold(scores: &[f32], labels: &[f32], threshold: f64) -> Self {
        let mut cm = ConfusionMatrix::default();
        for (&s, &y) in scores.iter().zip(labels) {
            let predicted = f64::from(s) >= threshold;
            match (predicted, y >= 0.5) {
                (true, true) => cm.tp += 1,
                (true, false) => cm.fp += 1,
                (false, false) => cm.tn += 1,
                (false, true) => cm.fn_ += 1,
            }
        }
        cm
    }

    /// Number of samples.
    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    /// `tp / (tp + fn)` (recall, true-positive rate).
    pub fn sensitivity(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    /// `tn / (tn + fp)` (true-negative rate).
    pub fn specificity(&self) -> f64 {
        ratio(self.tn, self.tn + self.fp)
    }

    /// `tp / (tp + fp)`.
    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// `2 tp / (2 tp + fp + fn)`.
    pub fn f1(&self) -> f64 {
        ratio(2 * self.tp, 2 * self.tp + self.fp + self.fn_)
    }

    /// `(tp + tn) / total`.
    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }
}

// ---------------------------------------------------------------------------
// ThresholdReport
// ---------------------------------------------------------------------------

/// Operating point chosen on one score/label set.
///
/// Immutable once computed; persisted verbatim inside the model artifact.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdReport {
    /// Youden's J candidate (the canonical threshold).
    #[serde(with = "threshold_serde")]
    pub threshold_j: f64,
    /// Closest-to-(0, 1) candidate.
    #[serde(with = "threshold_serde")]
    pub threshold_distance: f64,
    /// Max-F1 candidate.
    #[serde(with = "threshold_serde")]
    pub threshold_f1: f64,
    /// Sensitivity at the canonical threshold.
    pub sensitivity: f64,
    /// Specificity at the canonical threshold.
    pub specificity: f64,
    /// Precision at the canonical threshold.
    pub precision: f64,
    /// F1 score at the canonical threshold.
    pub f1_score: f64,
    /// `TPR − FPR` at the canonical threshold.
    pub youdens_j: f64,
}

impl ThresholdReport {
    /// The threshold used for decisions.
    pub fn threshold(&self) -> f64 {
        self.threshold_j
    }

    /// `true` if `score` is classified as violent.
    pub fn is_positive(&self, score: f32) -> bool {
        f64::from(score) >= self.threshold()
    }
}

impl fmt::Display for ThresholdReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "threshold={:.4} (dist={:.4} f1-opt={:.4})  sens={:.4} spec={:.4} prec={:.4} f1={:.4} J={:.4}",
            self.threshold_j,
            self.threshold_distance,
            self.threshold_f1,
            self.sensitivity,
            self.specificity,
            self.precision,
            self.f1_score,
            self.youdens_j
        )
    }
}

/// Serde helper storing non-finite thresholds as strings, since JSON numbers
/// cannot carry `inf`.
pub mod threshold_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    /// Serialize `v` as a number, or as `"inf"`, `"-inf"`, `"nan"`.
    pub fn serialize<S: Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
        if v.is_finite() {
            s.serialize_f64(*v)
        } else if v.is_nan() {
            s.serialize_str("nan")
        } else if *v > 0.0 {
            s.serialize_str("inf")
        } else {
            s.serialize_str("-inf")
        }
    }

    /// Inverse of [`serialize`].
    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        match Repr::deserialize(d)? {
            Repr::Number(v) => Ok(v),
            Repr::Text(t) => match t.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "nan" => Ok(f64::NAN),
                other => Err(serde::de::Error::custom(format!("invalid threshold `{other}`"))),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// ThresholdOptimizer
// ---------------------------------------------------------------------------

/// Computes the three threshold candidates and the canonical operating point.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdOptimizer;

impl ThresholdOptimizer {
    /// Create an optimizer.
    pub fn new() -> Self {
        ThresholdOptimizer
    }

    /// Optimise the decision threshold for `scores` against `labels`.
    ///
    /// Ties are broken by curve order (first maximum / minimum wins), so the
    /// higher threshold is preferred.
    ///
    /// # Errors
    ///
    /// [`TrainError::DegenerateLabels`] unless both classes are present and
    /// [`TrainError::LengthMismatch`] if the slices differ in length.
    pub fn optimize(&self, scores: &[f32], labels: &[f32]) -> TrainResult<ThresholdReport> {
        let roc = roc_curve(scores, labels)?;

        let j: Vec<f64> = roc.tpr.iter().zip(&roc.fpr).map(|(t, f)| t - f).collect();
        let idx_j = argmax_first(&j);

        let dist: Vec<f64> = roc
            .tpr
            .iter()
            .zip(&roc.fpr)
            .map(|(t, f)| ((1.0 - t).powi(2) + f.powi(2)).sqrt())
            .collect();
        let idx_d = argmin_first(&dist);

        let f1: Vec<f64> = roc
            .thresholds
            .iter()
            .map(|&t| ConfusionMatrix::at_threshold(scores, labels, t).f1())
            .collect();
        let idx_f1 = argmax_first(&f1);

        let chosen = roc.thresholds[idx_j];
        let cm = ConfusionMatrix::at_threshold(scores, labels, chosen);

        Ok(ThresholdReport {
            threshold_j: chosen,
            threshold_distance: roc.thresholds[idx_d],
            threshold_f1: roc.thresholds[idx_f1],
            sensitivity: cm.sensitivity(),
            specificity: cm.specificity(),
            precision: cm.precision(),
            f1_score: f1[idx_j],
            youdens_j: j[idx_j],
        })
    }
}

fn argmax_first(v: &[f64]) -> usize {
    let mut best = 0;
    for (i, &x) in v.iter().enumerate() {
        if x > v[best] {
            best = i;
        }
    }
    best
}

fn argmin_first(v: &[f64]) -> usize {
    let mut best = 0;
    for (i, &x) in v.iter().enumerate() {
        if x < v[best] {
            best = i;
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn roc_of_separable_scores() {
        let roc = roc_curve(&[0.9, 0.8, 0.2, 0.1], &[1.0, 1.0, 0.0, 0.0]).unwrap();
        assert!(roc.thresholds[0].is_infinite());
        assert_eq!(roc.fpr[0], 0.0);
        assert_eq!(roc.tpr[0], 0.0);
        assert_eq!(*roc.fpr.last().unwrap(), 1.0);
        assert_eq!(*roc.tpr.last().unwrap(), 1.0);
        assert_abs_diff_eq!(roc.auc(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn roc_drops_collinear_points() {
        // 0.9 and 0.8 both positives: the middle point is collinear.
        let scores = [0.9, 0.8, 0.7, 0.1];
        let labels = [1.0, 1.0, 1.0, 0.0];
        let full = roc_curve_with(&scores, &labels, false).unwrap();
        let dropped = roc_curve(&scores, &labels).unwrap();
        assert_eq!(full.len(), 5);
        assert!(dropped.len() < full.len());
        assert_abs_diff_eq!(full.auc(), dropped.auc(), epsilon = 1e-12);
    }

    #[test]
    fn tied_scores_form_one_point() {
        let roc = roc_curve_with(&[0.5, 0.5, 0.5, 0.5], &[1.0, 0.0, 1.0, 0.0], false).unwrap();
        assert_eq!(roc.len(), 2);
        assert_abs_diff_eq!(roc.auc(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn auc_counts_ranked_pairs() {
        // Pairs (pos, neg): 0.8>0.6, 0.8>0.3, 0.4<0.6, 0.4>0.3 -> 3/4.
        let auc = roc_auc(&[0.8, 0.4, 0.6, 0.3], &[1.0, 1.0, 0.0, 0.0]).unwrap();
        assert_abs_diff_eq!(auc, 0.75, epsilon = 1e-12);
    }

    #[test]
    fn degenerate_labels_rejected() {
        let err = roc_curve(&[0.1, 0.2], &[1.0, 1.0]).unwrap_err();
        assert!(matches!(err, TrainError::DegenerateLabels { positives: 2, negatives: 0 }));
        let err = roc_curve(&[0.1], &[1.0, 0.0]).unwrap_err();
        assert!(matches!(err, TrainError::LengthMismatch { .. }));
    }

    #[test]
    fn confusion_matrix_zero_denominators() {
        let cm = ConfusionMatrix::at_threshold(&[0.1, 0.2], &[0.0, 0.0], 0.5);
        assert_eq!(cm.tn, 2);
        assert_eq!(cm.precision(), 0.0);
        assert_eq!(cm.sensitivity(), 0.0);
        assert_eq!(cm.f1(), 0.0);
        assert_eq!(cm.specificity(), 1.0);
    }

    #[test]
    fn optimizer_on_perfect_scores() {
        let report = ThresholdOptimizer::new()
            .optimize(&[1.0, 1.0, 1.0, 0.0, 0.0], &[1.0, 1.0, 1.0, 0.0, 0.0])
            .unwrap();
        assert_eq!(report.threshold(), 1.0);
        assert_eq!(report.sensitivity, 1.0);
        assert_eq!(report.specificity, 1.0);
        assert_eq!(report.precision, 1.0);
        assert_eq!(report.f1_score, 1.0);
        assert_eq!(report.youdens_j, 1.0);
    }

    #[test]
    fn optimizer_first_maximum_wins() {
        // J is 0.5 at both 0.7 and 0.4; the higher threshold comes first.
        let scores = [0.9, 0.7, 0.6, 0.4, 0.3, 0.1];
        let labels = [1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let report = ThresholdOptimizer::new().optimize(&scores, &labels).unwrap();
        let roc = roc_curve(&scores, &labels).unwrap();
        let j: Vec<f64> = roc.tpr.iter().zip(&roc.fpr).map(|(t, f)| t - f).collect();
        let first = j
            .iter()
            .position(|&x| x == j.iter().cloned().fold(f64::MIN, f64::max))
            .unwrap();
        assert_eq!(report.threshold_j, roc.thresholds[first]);
    }

    #[test]
    fn report_serializes_infinite_threshold() {
        let report = ThresholdReport {
            threshold_j: 0.5,
            threshold_distance: f64::INFINITY,
            threshold_f1: 0.25,
            sensitivity: 1.0,
            specificity: 0.5,
            precision: 0.75,
            f1_score: 0.8,
            youdens_j: 0.5,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"threshold_distance\":\"inf\""));
        let back: ThresholdReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
