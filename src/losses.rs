//! Binary cross-entropy for probability outputs.
//!
//! ```text
//! BCE(p, y) = −[ y · ln p + (1 − y) · ln(1 − p) ]
//! ```
//!
//! Each logarithm is clamped from below at `-100`, the same convention
//! PyTorch's `BCELoss` uses, so a saturated prediction yields a large but
//! finite loss instead of infinity.

/// Lower clamp applied to `ln p` and `ln(1 − p)`.
pub const LOG_CLAMP: f64 = -100.0;

/// Loss of one prediction.
pub fn bce(prob: f32, label: f32) -> f64 {
    let p = f64::from(prob);
    let y = f64::from(label);
    let log_p = p.ln().max(LOG_CLAMP);
    let log_1mp = (1.0 - p).ln().max(LOG_CLAMP);
    -(y * log_p + (1.0 - y) * log_1mp)
}

/// Mean loss over a batch; `0.0` for an empty batch.
pub fn bce_mean(probs: &[f32], labels: &[f32]) -> f64 {
    let n = probs.len().min(labels.len());
    if n == 0 {
        return 0.0;
    }
    bce_sum(probs, labels) / n as f64
}

/// Summed loss over a batch.
pub fn bce_sum(probs: &[f32], labels: &[f32]) -> f64 {
    probs.iter().zip(labels).map(|(&p, &y)| bce(p, y)).sum()
}

/// Running sample-weighted mean of per-batch mean losses.
///
/// Each batch contributes `mean_loss · batch_len`, so the final value equals
/// the per-sample mean regardless of how the last batch is sized.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LossAccumulator {
    weighted_sum: f64,
    samples: usize,
}

impl LossAccumulator {
    /// Empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one batch.
    pub fn add_batch(&mut self, mean_loss: f64, batch_len: usize) {
        self.weighted_sum += mean_loss * batch_len as f64;
        self.samples += batch_len;
    }

    /// Samples seen so far.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Sample-weighted mean loss; `0.0` before any batch.
    pub fn mean(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.weighted_sum / self.samples as f64
        }
    }
}
