//! Held-out evaluation: loss, AUC and the calibrated decision threshold.
//!
//! [`predict`] is the shared inference pass (eval mode, ordered batches, no
//! parameter updates) used both for per-epoch validation and for the final
//! test evaluation.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{TrainError, TrainResult};
use crate::loader::DataLoader;
use crate::losses::{bce_mean, LossAccumulator};
use crate::metrics::{roc_auc, ThresholdOptimizer, ThresholdReport};
use crate::model::{ClassifierMode, GraphClassifier};
use crate::split::CorpusView;

/// Scores and labels collected by one inference pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Predictions {
    /// Predicted violence probabilities.
    pub scores: Vec<f32>,
    /// True labels, aligned with `scores`.
    pub labels: Vec<f32>,
    /// Sample-weighted mean binary cross-entropy.
    pub loss: f64,
}

impl Predictions {
    /// Number of predictions.
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// `true` when nothing was predicted.
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

/// Run `model` in eval mode over `view` and collect scores and loss.
pub fn predict(
    model: &mut dyn GraphClassifier,
    view: &CorpusView<'_>,
    batch_size: usize,
) -> TrainResult<Predictions> {
    model.set_mode(ClassifierMode::Eval);
    let loader = DataLoader::new(view, batch_size, false, 0);
    let mut out = Predictions {
        scores: Vec::with_capacity(view.len()),
        labels: Vec::with_capacity(view.len()),
        loss: 0.0,
    };
    let mut acc = LossAccumulator::new();
    for batch in loader.iter_ordered() {
        let probs = model.forward(&batch)?;
        let labels = batch.labels().to_vec();
        if probs.len() != labels.len() {
            return Err(TrainError::LengthMismatch { scores: probs.len(), labels: labels.len() });
        }
        acc.add_batch(bce_mean(&probs, &labels), labels.len());
        out.scores.extend(probs);
        out.labels.extend(labels);
    }
    out.loss = acc.mean();
    Ok(out)
}

/// Result of the final held-out evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct TestEvaluation {
    /// Mean test loss.
    pub loss: f64,
    /// Test ROC AUC.
    pub auc: f64,
    /// Calibrated operating point.
    pub report: ThresholdReport,
    /// Raw scores and labels, for the visualization hand-off.
    pub predictions: Predictions,
}

impl TestEvaluation {
    /// The canonical decision threshold.
    pub fn threshold(&self) -> f64 {
        self.report.threshold()
    }
}

/// Evaluates a trained classifier on the test split.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    batch_size: usize,
    optimizer: ThresholdOptimizer,
}

impl Evaluator {
    /// Evaluator iterating in batches of `batch_size`.
    pub fn new(batch_size: usize) -> Self {
        Evaluator { batch_size, optimizer: ThresholdOptimizer::new() }
    }

    /// Compute loss, AUC and the threshold report on `test`.
    ///
    /// # Errors
    ///
    /// [`TrainError::EmptySplit`] for an empty test split and
    /// [`TrainError::DegenerateLabels`] when it holds a single class.
    pub fn evaluate(
        &self,
        model: &mut dyn GraphClassifier,
        test: &CorpusView<'_>,
    ) -> TrainResult<TestEvaluation> {
        if test.is_empty() {
            return Err(TrainError::EmptySplit { split: "test" });
        }
        let predictions = predict(model, test, self.batch_size)?;
        let auc = roc_auc(&predictions.scores, &predictions.labels)?;
        let report = self.optimizer.optimize(&predictions.scores, &predictions.labels)?;

        info!("Test Loss: {:.4}, Test AUC: {:.4}", predictions.loss, auc);
        info!("Optimal classification threshold: {:.4}", report.threshold());
        info!("Threshold metrics: {report}");

        Ok(TestEvaluation { loss: predictions.loss, auc, report, predictions })
    }
}
