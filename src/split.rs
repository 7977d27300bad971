//! Seeded train / validation / test splitting.
//!
//! The first split holds out `test_ratio` of the corpus, stratified on the
//! label so both parts keep the corpus class proportions. The remaining
//! train+val pool is then split again, unstratified, holding out
//! `val_ratio` of it for validation.
//!
//! Sizes follow the usual convention: the held-out part gets
//! `⌈ratio · n⌉` samples and the other part the rest. Within the stratified
//! split each class receives its proportional share of the test slots,
//! rounded down, with the leftover slots going to the classes with the
//! largest fractional remainders.
//!
//! Splitting only produces index lists. [`SplitIndices::views`] turns them
//! into borrowed [`CorpusView`]s so no graph is copied.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::config::TrainingConfig;
use crate::dataset::LabeledCorpus;
use crate::error::{ConfigError, TrainError, TrainResult};
use crate::graph::PoseGraph;
use crate::keypoints::ClassLabel;

// ---------------------------------------------------------------------------
// SplitIndices
// ---------------------------------------------------------------------------

/// Disjoint corpus indices for the three splits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    /// Training samples.
    pub train: Vec<usize>,
    /// Validation samples.
    pub val: Vec<usize>,
    /// Held-out test samples.
    pub test: Vec<usize>,
}

impl SplitIndices {
    /// Total number of indices across all splits.
    pub fn total(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    /// Borrow the corpus graphs referenced by each split.
    pub fn views<'a>(&self, corpus: &'a LabeledCorpus) -> CorpusSplit<'a> {
        let pick = |idx: &[usize]| CorpusView {
            graphs: idx.iter().filter_map(|&i| corpus.get(i)).collect(),
        };
        CorpusSplit { train: pick(&self.train), val: pick(&self.val), test: pick(&self.test) }
    }
}

// ---------------------------------------------------------------------------
// CorpusView / CorpusSplit
// ---------------------------------------------------------------------------

/// A borrowed subset of a [`LabeledCorpus`].
#[derive(Debug, Clone, Default)]
pub struct CorpusView<'a> {
    graphs: Vec<&'a PoseGraph>,
}

impl<'a> CorpusView<'a> {
    /// View over explicitly chosen graphs.
    pub fn new(graphs: Vec<&'a PoseGraph>) -> Self {
        CorpusView { graphs }
    }

    /// View over every graph of `corpus`.
    pub fn all(corpus: &'a LabeledCorpus) -> Self {
        CorpusView { graphs: corpus.graphs().iter().collect() }
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    /// `true` when the view holds no samples.
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    /// Graphs in view order.
    pub fn graphs(&self) -> &[&'a PoseGraph] {
        &self.graphs
    }

    /// Sample at `idx`.
    pub fn get(&self, idx: usize) -> Option<&'a PoseGraph> {
        self.graphs.get(idx).copied()
    }

    /// Labels in view order.
    pub fn labels(&self) -> Vec<f32> {
        self.graphs.iter().map(|g| g.label()).collect()
    }

    /// Number of violent samples.
    pub fn num_positive(&self) -> usize {
        self.graphs.iter().filter(|g| g.class() == ClassLabel::Violent).count()
    }

    /// Fraction of violent samples (`0.0` for an empty view).
    pub fn positive_fraction(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.num_positive() as f64 / self.len() as f64
        }
    }
}

/// The three borrowed splits of one corpus.
#[derive(Debug, Clone)]
pub struct CorpusSplit<'a> {
    /// Training samples.
    pub train: CorpusView<'a>,
    /// Validation samples.
    pub val: CorpusView<'a>,
    /// Held-out test samples.
    pub test: CorpusView<'a>,
}

// ---------------------------------------------------------------------------
// DatasetSplitter
// ---------------------------------------------------------------------------

/// Deterministic two-stage splitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatasetSplitter {
    test_ratio: f64,
    val_ratio: f64,
    seed: u64,
}

impl DatasetSplitter {
    /// Create a splitter.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] when a ratio lies outside `(0, 1)`.
    pub fn new(test_ratio: f64, val_ratio: f64, seed: u64) -> Result<Self, ConfigError> {
        if !(test_ratio > 0.0 && test_ratio < 1.0) {
            return Err(ConfigError::invalid_value("test_split_ratio", "must be in (0.0, 1.0)"));
        }
        if !(val_ratio > 0.0 && val_ratio < 1.0) {
            return Err(ConfigError::invalid_value(
                "validation_split_ratio",
                "must be in (0.0, 1.0)",
            ));
        }
        Ok(DatasetSplitter { test_ratio, val_ratio, seed })
    }

    /// Splitter using the ratios and seed of `config`.
    pub fn from_config(config: &TrainingConfig) -> Result<Self, ConfigError> {
        Self::new(config.test_split_ratio, config.validation_split_ratio, config.seed)
    }

    /// Split `corpus` into train / val / test indices.
    ///
    /// # Errors
    ///
    /// [`TrainError::EmptySplit`] when the corpus is too small for every
    /// split to receive at least one sample.
    pub fn split(&self, corpus: &LabeledCorpus) -> TrainResult<SplitIndices> {
        self.split_labels(&corpus.labels())
    }

    /// Split a label vector; indices refer to positions in `labels`.
    pub fn split_labels(&self, labels: &[f32]) -> TrainResult<SplitIndices> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let (trainval, test) = self.stratified_holdout(labels, &mut rng)?;

        let mut pool = trainval;
        pool.shuffle(&mut rng);
        let n_val = holdout_size(pool.len(), self.val_ratio);
        if n_val == pool.len() {
            return Err(TrainError::EmptySplit { split: "train" });
        }
        let train = pool.split_off(n_val);
        let val = pool;

        info!(
            "Split sizes: train={} val={} test={} (train+val={})",
            train.len(),
            val.len(),
            test.len(),
            train.len() + val.len()
        );
        Ok(SplitIndices { train, val, test })
    }

    /// Stratified `(rest, holdout)` split on `labels`.
    fn stratified_holdout(
        &self,
        labels: &[f32],
        rng: &mut ChaCha8Rng,
    ) -> TrainResult<(Vec<usize>, Vec<usize>)> {
        let n = labels.len();
        let n_test = holdout_size(n, self.test_ratio);
        if n_test == 0 {
            return Err(TrainError::EmptySplit { split: "test" });
        }
        if n_test >= n {
            return Err(TrainError::EmptySplit { split: "train" });
        }

        // Class order: non-violent (0.0) then violent (1.0).
        let mut classes: Vec<Vec<usize>> = vec![Vec::new(), Vec::new()];
        for (i, &l) in labels.iter().enumerate() {
            classes[usize::from(ClassLabel::from_value(l) == ClassLabel::Violent)].push(i);
        }
        let counts: Vec<usize> = classes.iter().map(Vec::len).collect();
        let per_class = allocate_proportional(&counts, n_test);

        let mut rest = Vec::with_capacity(n - n_test);
        let mut holdout = Vec::with_capacity(n_test);
        for (members, &k) in classes.iter_mut().zip(&per_class) {
            members.shuffle(rng);
            holdout.extend_from_slice(&members[..k]);
            rest.extend_from_slice(&members[k..]);
        }
        holdout.shuffle(rng);
        rest.shuffle(rng);
        Ok((rest, holdout))
    }
}

/// Held-out part size: `⌈ratio · n⌉`, ignoring floating-point noise.
fn holdout_size(n: usize, ratio: f64) -> usize {
    let exact = ratio * n as f64;
    let size = (exact - 1e-9).ceil().max(0.0) as usize;
    size.min(n)
}

/// Distribute `total` slots over groups proportionally to `counts` using
/// floor plus largest remainder. Ties go to the earlier group.
fn allocate_proportional(counts: &[usize], total: usize) -> Vec<usize> {
    let n: usize = counts.iter().sum();
    if n == 0 {
        return vec![0; counts.len()];
    }
    let exact: Vec<f64> = counts.iter().map(|&c| total as f64 * c as f64 / n as f64).collect();
    let mut alloc: Vec<usize> = exact
        .iter()
        .zip(counts)
        .map(|(&e, &c)| (e.floor() as usize).min(c))
        .collect();

    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal).then(a.cmp(&b))
    });

    let mut remaining = total.saturating_sub(alloc.iter().sum());
    while remaining > 0 {
        let before = remaining;
        for &g in &order {
            if remaining == 0 {
                break;
            }
            if alloc[g] < counts[g] {
                alloc[g] += 1;
                remaining -= 1;
            }
        }
        if remaining == before {
            break;
        }
    }
    alloc
}
