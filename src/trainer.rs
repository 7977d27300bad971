//! Epoch-driven training loop.
//!
//! Each epoch:
//!
//! 1. train mode, shuffled training batches (seed `seed + epoch`), one
//!    optimiser step per batch, loss weighted by batch size;
//! 2. eval mode, ordered validation batches, no parameter updates;
//! 3. validation AUC from every collected `(score, label)` pair;
//! 4. one [`EpochMetrics`] record appended.
//!
//! Epochs run strictly in sequence. There is no early stopping and no
//! per-epoch checkpoint; the caller persists the final model.

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::TrainingConfig;
use crate::error::{TrainError, TrainResult};
use crate::eval::predict;
use crate::loader::DataLoader;
use crate::losses::{bce_mean, LossAccumulator};
use crate::metrics::roc_auc;
use crate::model::{ClassifierMode, GraphClassifier};
use crate::split::{CorpusSplit, CorpusView};

// ---------------------------------------------------------------------------
// EpochMetrics
// ---------------------------------------------------------------------------

/// Metrics of one completed epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Sample-weighted mean training loss (pre-step predictions).
    pub train_loss: f64,
    /// Sample-weighted mean validation loss.
    pub val_loss: f64,
    /// Validation ROC AUC; `None` when the validation split holds one class.
    pub val_auc: Option<f64>,
}

// ---------------------------------------------------------------------------
// Trainer
// ---------------------------------------------------------------------------

/// Drives a [`GraphClassifier`] through the configured number of epochs.
#[derive(Debug, Clone)]
pub struct Trainer {
    batch_size: usize,
    num_epochs: usize,
    seed: u64,
    show_progress: bool,
}

impl Trainer {
    /// Trainer using the batch size, epoch count and seed of `config`.
    pub fn new(config: &TrainingConfig) -> Self {
        Trainer {
            batch_size: config.batch_size,
            num_epochs: config.num_epochs,
            seed: config.seed,
            show_progress: false,
        }
    }

    /// Show an `indicatif` progress bar over training batches.
    pub fn with_progress(mut self, on: bool) -> Self {
        self.show_progress = on;
        self
    }

    /// Configured number of epochs.
    pub fn num_epochs(&self) -> usize {
        self.num_epochs
    }

    /// Train `model` on `split.train`, validating on `split.val` after every
    /// epoch. Returns the metrics of every epoch in completion order.
    ///
    /// # Errors
    ///
    /// [`TrainError::EmptySplit`] when the training or validation split is
    /// empty, and any error raised by the classifier.
    pub fn fit(
        &self,
        model: &mut dyn GraphClassifier,
        split: &CorpusSplit<'_>,
    ) -> TrainResult<Vec<EpochMetrics>> {
        if split.train.is_empty() {
            return Err(TrainError::EmptySplit { split: "train" });
        }
        if split.val.is_empty() {
            return Err(TrainError::EmptySplit { split: "val" });
        }

        info!(
            "Training {} for {} epochs (batch size {}, {} trainable parameters)",
            model.architecture(),
            self.num_epochs,
            self.batch_size,
            model.num_parameters()
        );

        let mut history = Vec::with_capacity(self.num_epochs);
        for epoch in 1..=self.num_epochs {
            let train_loss = self.train_epoch(model, &split.train, epoch)?;

            let val = predict(model, &split.val, self.batch_size)?;
            let val_auc = match roc_auc(&val.scores, &val.labels) {
                Ok(auc) => Some(auc),
                Err(TrainError::DegenerateLabels { positives, negatives }) => {
                    warn!(
                        "Validation split has {positives} positive / {negatives} negative samples; \
                         AUC undefined for epoch {epoch}"
                    );
                    None
                }
                Err(e) => return Err(e),
            };

            match val_auc {
                Some(auc) => info!(
                    "Epoch {epoch}/{}: Train Loss: {train_loss:.4}, Val Loss: {:.4}, Val AUC: {auc:.4}",
                    self.num_epochs, val.loss
                ),
                None => info!(
                    "Epoch {epoch}/{}: Train Loss: {train_loss:.4}, Val Loss: {:.4}, Val AUC: n/a",
                    self.num_epochs, val.loss
                ),
            }
            history.push(EpochMetrics { epoch, train_loss, val_loss: val.loss, val_auc });
        }
        Ok(history)
    }

    /// One pass over the training split; returns the mean training loss.
    pub fn train_epoch(
        &self,
        model: &mut dyn GraphClassifier,
        train: &CorpusView<'_>,
        epoch: usize,
    ) -> TrainResult<f64> {
        model.set_mode(ClassifierMode::Train);
        let loader = DataLoader::new(train, self.batch_size, true, self.seed);
        let pb = self.progress_bar(loader.num_batches() as u64, epoch);

        let mut acc = LossAccumulator::new();
        for (i, batch) in loader.iter_epoch(epoch).enumerate() {
            let probs = model.train_step(&batch)?;
            let labels = batch.labels().to_vec();
            let loss = bce_mean(&probs, &labels);
            if !loss.is_finite() {
                return Err(TrainError::training_step(format!(
                    "non-finite loss at epoch {epoch}, batch {i}"
                )));
            }
            debug!("epoch {epoch} batch {i}: loss {loss:.6}");
            acc.add_batch(loss, labels.len());
            pb.inc(1);
        }
        pb.finish_and_clear();
        Ok(acc.mean())
    }

    fn progress_bar(&self, len: u64, epoch: usize) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{msg} [{elapsed_precise}] [{bar:40.green/white}] {pos}/{len} batches")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        pb.set_message(format!("Epoch {epoch}/{}", self.num_epochs));
        pb
    }
}
