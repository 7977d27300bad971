//! Graph classifiers.
//!
//! The training loop and evaluator only see the [`GraphClassifier`]
//! capability: a forward pass from a [`GraphBatch`] to one violence
//! probability per graph, a training step, and a train / eval mode switch.
//!
//! # Built-in classifier
//!
//! ```text
//! node features [ΣN, 3]
//!       │
//!       ▼
//! ┌──────────────────────────┐
//! │ GCN layer                │  Â X W₁ + b₁,  Â = D^-½ (A + I) D^-½
//! │ ReLU                     │
//! └──────────────────────────┘
//!       │  [ΣN, hidden]
//!       ▼
//! ┌──────────────────────────┐
//! │ global mean pool         │  per graph
//! └──────────────────────────┘
//!       │  [B, hidden]
//!       ▼
//! ┌──────────────────────────┐
//! │ linear head + sigmoid    │
//! └──────────────────────────┘
//!       │
//!       ▼
//!   probabilities [B]
//! ```
//!
//! [`GcnClassifier`] is pure `ndarray` with analytic gradients and an Adam
//! optimiser, so it runs everywhere. The libtorch graph transformer lives in
//! [`crate::tch_model`] behind the `tch-backend` feature.

use ndarray::{Array, Array1, Array2, Axis, Dimension};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::TrainingConfig;
use crate::device::ComputeDevice;
use crate::error::{TrainError, TrainResult};
use crate::graph::NODE_FEATURE_DIM;
use crate::loader::GraphBatch;

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// Whether the classifier is being optimised or only queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifierMode {
    /// Training: parameters may be updated.
    Train,
    /// Inference: parameters are frozen.
    Eval,
}

impl fmt::Display for ClassifierMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifierMode::Train => write!(f, "train"),
            ClassifierMode::Eval => write!(f, "eval"),
        }
    }
}

/// A differentiable graph-level binary classifier.
pub trait GraphClassifier {
    /// Architecture tag stored with the parameters.
    fn architecture(&self) -> &'static str;

    /// Violence probability for every graph in `batch`, without updating
    /// parameters.
    fn forward(&self, batch: &GraphBatch) -> TrainResult<Vec<f32>>;

    /// Forward pass, binary cross-entropy backward pass and one optimiser
    /// step. Returns the probabilities computed before the update.
    ///
    /// Fails when the classifier is in [`ClassifierMode::Eval`].
    fn train_step(&mut self, batch: &GraphBatch) -> TrainResult<Vec<f32>>;

    /// Switch between training and inference.
    fn set_mode(&mut self, mode: ClassifierMode);

    /// Current mode.
    fn mode(&self) -> ClassifierMode;

    /// Snapshot of all trainable parameters.
    fn parameters(&self) -> TrainResult<ModelParameters>;

    /// Number of scalar trainable parameters.
    fn num_parameters(&self) -> usize {
        self.parameters().map(|p| p.num_values()).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// ModelParameters
// ---------------------------------------------------------------------------

/// One named parameter tensor in row-major order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterTensor {
    /// Parameter name (e.g. `conv.weight`).
    pub name: String,
    /// Tensor shape.
    pub shape: Vec<usize>,
    /// Values, row-major.
    pub values: Vec<f32>,
}

impl ParameterTensor {
    fn from_array<D: Dimension>(name: &str, a: &Array<f32, D>) -> Self {
        ParameterTensor {
            name: name.to_string(),
            shape: a.shape().to_vec(),
            values: a.iter().copied().collect(),
        }
    }
}

/// Trainable state of a classifier, tagged with its architecture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// Architecture tag ([`GraphClassifier::architecture`]).
    pub architecture: String,
    /// Named tensors.
    pub tensors: Vec<ParameterTensor>,
}

impl ModelParameters {
    /// Tensor named `name`.
    pub fn get(&self, name: &str) -> Option<&ParameterTensor> {
        self.tensors.iter().find(|t| t.name == name)
    }

    /// Total number of scalar values.
    pub fn num_values(&self) -> usize {
        self.tensors.iter().map(|t| t.values.len()).sum()
    }

    fn array1(&self, name: &str, len: usize) -> TrainResult<Array1<f32>> {
        let t = self.require(name)?;
        if t.shape != [len] || t.values.len() != len {
            return Err(TrainError::shape_mismatch(vec![len], t.shape.clone()));
        }
        Ok(Array1::from(t.values.clone()))
    }

    fn array2(&self, name: &str, rows: usize, cols: usize) -> TrainResult<Array2<f32>> {
        let t = self.require(name)?;
        if t.shape != [rows, cols] {
            return Err(TrainError::shape_mismatch(vec![rows, cols], t.shape.clone()));
        }
        Array2::from_shape_vec((rows, cols), t.values.clone())
            .map_err(|_| TrainError::shape_mismatch(vec![rows, cols], vec![t.values.len()]))
    }

    fn require(&self, name: &str) -> TrainResult<&ParameterTensor> {
        self.get(name)
            .ok_or_else(|| TrainError::training_step(format!("missing parameter `{name}`")))
    }
}

// ---------------------------------------------------------------------------
// Adam
// ---------------------------------------------------------------------------

/// Adam optimiser over a fixed list of parameter slots.
#[derive(Debug, Clone)]
pub struct Adam {
    lr: f32,
    beta1: f32,
    beta2: f32,
    eps: f32,
    t: i32,
    moments: Vec<(Vec<f32>, Vec<f32>)>,
}

impl Adam {
    /// Adam with the usual `β₁ = 0.9`, `β₂ = 0.999`, `ε = 1e-8`. One slot per
    /// entry of `sizes`.
    pub fn new(lr: f64, sizes: &[usize]) -> Self {
        Adam {
            lr: lr as f32,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            t: 0,
            moments: sizes.iter().map(|&n| (vec![0.0; n], vec![0.0; n])).collect(),
        }
    }

    /// Start a new optimisation step (advances the bias-correction counter).
    pub fn begin_step(&mut self) {
        self.t += 1;
    }

    /// Steps taken so far.
    pub fn steps(&self) -> i32 {
        self.t
    }

    /// Update the parameter in `slot` from its gradient.
    pub fn update<D: Dimension>(
        &mut self,
        slot: usize,
        param: &mut Array<f32, D>,
        grad: &Array<f32, D>,
    ) -> TrainResult<()> {
        let (beta1, beta2, eps, lr) = (self.beta1, self.beta2, self.eps, self.lr);
        let t = self.t.max(1);
        let bc1 = 1.0 - beta1.powi(t);
        let bc2 = 1.0 - beta2.powi(t);
        let (m, v) = self
            .moments
            .get_mut(slot)
            .ok_or_else(|| TrainError::training_step(format!("no optimiser slot {slot}")))?;
        if m.len() != param.len() || param.shape() != grad.shape() {
            return Err(TrainError::shape_mismatch(param.shape().to_vec(), grad.shape().to_vec()));
        }
        for (((p, &g), m), v) in param.iter_mut().zip(grad.iter()).zip(m.iter_mut()).zip(v.iter_mut()) {
            *m = beta1 * *m + (1.0 - beta1) * g;
            *v = beta2 * *v + (1.0 - beta2) * g * g;
            let m_hat = *m / bc1;
            let v_hat = *v / bc2;
            *p -= lr * m_hat / (v_hat.sqrt() + eps);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// GcnClassifier
// ---------------------------------------------------------------------------

/// Architecture tag of [`GcnClassifier`].
pub const GCN_ARCHITECTURE: &str = "gcn-meanpool";

/// One-layer graph convolutional classifier.
#[derive(Debug, Clone)]
pub struct GcnClassifier {
    w1: Array2<f32>,
    b1: Array1<f32>,
    w2: Array1<f32>,
    b2: Array1<f32>,
    optimizer: Adam,
    mode: ClassifierMode,
}

/// Intermediate values of one forward pass, kept for the backward pass.
struct ForwardCache {
    ax: Array2<f32>,
    z: Array2<f32>,
    pooled: Array2<f32>,
    probs: Array1<f32>,
}

impl GcnClassifier {
    /// Freshly initialised classifier.
    ///
    /// Weights are drawn uniformly from `±√(6 / (fan_in + fan_out))` with a
    /// ChaCha8 RNG seeded from `seed`; biases start at zero.
    pub fn new(in_dim: usize, hidden: usize, learning_rate: f64, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let a1 = (6.0 / (in_dim + hidden) as f32).sqrt();
        let a2 = (6.0 / (hidden + 1) as f32).sqrt();
        let w1 = Array2::from_shape_fn((in_dim, hidden), |_| rng.gen_range(-a1..a1));
        let w2 = Array1::from_shape_fn(hidden, |_| rng.gen_range(-a2..a2));
        GcnClassifier {
            w1,
            b1: Array1::zeros(hidden),
            w2,
            b2: Array1::zeros(1),
            optimizer: Adam::new(learning_rate, &[in_dim * hidden, hidden, hidden, 1]),
            mode: ClassifierMode::Train,
        }
    }

    /// Classifier sized from `config`.
    pub fn from_config(config: &TrainingConfig) -> Self {
        Self::new(config.node_feature_dim(), config.hidden_channels, config.learning_rate, config.seed)
    }

    /// Rebuild a classifier from stored parameters, in eval mode.
    ///
    /// # Errors
    ///
    /// Fails if the architecture tag differs or a tensor is missing or has
    /// the wrong shape.
    pub fn from_parameters(params: &ModelParameters, learning_rate: f64) -> TrainResult<Self> {
        if params.architecture != GCN_ARCHITECTURE {
            return Err(TrainError::training_step(format!(
                "cannot load `{}` parameters into {GCN_ARCHITECTURE}",
                params.architecture
            )));
        }
        let w1_shape = params.require("conv.weight")?.shape.clone();
        let (in_dim, hidden) = match w1_shape.as_slice() {
            [f, h] => (*f, *h),
            _ => return Err(TrainError::shape_mismatch(vec![NODE_FEATURE_DIM, 0], w1_shape)),
        };
        Ok(GcnClassifier {
            w1: params.array2("conv.weight", in_dim, hidden)?,
            b1: params.array1("conv.bias", hidden)?,
            w2: params.array1("head.weight", hidden)?,
            b2: params.array1("head.bias", 1)?,
            optimizer: Adam::new(learning_rate, &[in_dim * hidden, hidden, hidden, 1]),
            mode: ClassifierMode::Eval,
        })
    }

    /// Hidden width.
    pub fn hidden_channels(&self) -> usize {
        self.b1.len()
    }

    fn check_batch(&self, batch: &GraphBatch) -> TrainResult<()> {
        let f = batch.node_features().ncols();
        if f != self.w1.nrows() {
            return Err(TrainError::shape_mismatch(
                vec![batch.num_nodes(), self.w1.nrows()],
                vec![batch.num_nodes(), f],
            ));
        }
        Ok(())
    }

    fn forward_cached(&self, batch: &GraphBatch) -> TrainResult<ForwardCache> {
        self.check_batch(batch)?;
        let ax = propagate(batch);
        let z = ax.dot(&self.w1) + &self.b1;
        let h = z.mapv(|v| v.max(0.0));

        let ptr = batch.graph_ptr();
        let mut pooled = Array2::<f32>::zeros((batch.num_graphs(), self.hidden_channels()));
        for g in 0..batch.num_graphs() {
            let rows = h.slice(ndarray::s![ptr[g]..ptr[g + 1], ..]);
            if let Some(mean) = rows.mean_axis(Axis(0)) {
                pooled.row_mut(g).assign(&mean);
            }
        }

        let logits = pooled.dot(&self.w2) + self.b2[0];
        let probs = logits.mapv(sigmoid);
        Ok(ForwardCache { ax, z, pooled, probs })
    }
}

impl GraphClassifier for GcnClassifier {
    fn architecture(&self) -> &'static str {
        GCN_ARCHITECTURE
    }

    fn forward(&self, batch: &GraphBatch) -> TrainResult<Vec<f32>> {
        Ok(self.forward_cached(batch)?.probs.to_vec())
    }

    fn train_step(&mut self, batch: &GraphBatch) -> TrainResult<Vec<f32>> {
        if self.mode != ClassifierMode::Train {
            return Err(TrainError::training_step("train_step called in eval mode"));
        }
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let cache = self.forward_cached(batch)?;
        let n_graphs = batch.num_graphs() as f32;

        // d(mean BCE)/d(logit) = (p - y) / B
        let dlogit: Array1<f32> = (&cache.probs - &batch.labels()) / n_graphs;
        let dw2 = cache.pooled.t().dot(&dlogit);
        let db2 = Array1::from(vec![dlogit.sum()]);

        let ptr = batch.graph_ptr();
        let mut dz = Array2::<f32>::zeros(cache.z.raw_dim());
        for g in 0..batch.num_graphs() {
            let (start, end) = (ptr[g], ptr[g + 1]);
            let scale = dlogit[g] / (end - start).max(1) as f32;
            for i in start..end {
                for k in 0..self.w2.len() {
                    if cache.z[[i, k]] > 0.0 {
                        dz[[i, k]] = scale * self.w2[k];
                    }
                }
            }
        }
        let dw1 = cache.ax.t().dot(&dz);
        let db1 = dz.sum_axis(Axis(0));

        self.optimizer.begin_step();
        self.optimizer.update(0, &mut self.w1, &dw1)?;
        self.optimizer.update(1, &mut self.b1, &db1)?;
        self.optimizer.update(2, &mut self.w2, &dw2)?;
        self.optimizer.update(3, &mut self.b2, &db2)?;

        Ok(cache.probs.to_vec())
    }

    fn set_mode(&mut self, mode: ClassifierMode) {
        self.mode = mode;
    }

    fn mode(&self) -> ClassifierMode {
        self.mode
    }

    fn parameters(&self) -> TrainResult<ModelParameters> {
        Ok(ModelParameters {
            architecture: GCN_ARCHITECTURE.to_string(),
            tensors: vec![
                ParameterTensor::from_array("conv.weight", &self.w1),
                ParameterTensor::from_array("conv.bias", &self.b1),
                ParameterTensor::from_array("head.weight", &self.w2),
                ParameterTensor::from_array("head.bias", &self.b2),
            ],
        })
    }
}

/// `Â X` with `Â = D^-½ (A + I) D^-½` over the batch's directed edges.
fn propagate(batch: &GraphBatch) -> Array2<f32> {
    let x = batch.node_features();
    let ei = batch.edge_index();
    let n = x.nrows();

    let mut deg = vec![1.0f32; n];
    for e in 0..ei.ncols() {
        deg[ei[[1, e]]] += 1.0;
    }

    let mut ax = Array2::<f32>::zeros(x.raw_dim());
    for i in 0..n {
        ax.row_mut(i).scaled_add(1.0 / deg[i], &x.row(i));
    }
    for e in 0..ei.ncols() {
        let (src, dst) = (ei[[0, e]], ei[[1, e]]);
        let w = 1.0 / (deg[src] * deg[dst]).sqrt();
        ax.row_mut(dst).scaled_add(w, &x.row(src));
    }
    ax
}

fn sigmoid(x: f32) -> f32 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Build the classifier for this run.
///
/// With the `tch-backend` feature the libtorch graph transformer is used on
/// `device`; otherwise the pure-Rust [`GcnClassifier`] runs on the CPU.
pub fn build_classifier(
    config: &TrainingConfig,
    device: ComputeDevice,
) -> TrainResult<Box<dyn GraphClassifier>> {
    #[cfg(feature = "tch-backend")]
    {
        let model = crate::tch_model::GraphTransformerClassifier::new(config, device)?;
        Ok(Box::new(model))
    }
    #[cfg(not(feature = "tch-backend"))]
    {
        if device.is_accelerator() {
            tracing::warn!("{device} requested but no tensor backend is linked; GCN runs on the CPU");
        }
        Ok(Box::new(GcnClassifier::from_config(config)))
    }
}

/// Rebuild a classifier from stored parameters, dispatching on the
/// architecture tag.
pub fn load_classifier(
    params: &ModelParameters,
    config: &TrainingConfig,
    device: ComputeDevice,
) -> TrainResult<Box<dyn GraphClassifier>> {
    match params.architecture.as_str() {
        GCN_ARCHITECTURE => Ok(Box::new(GcnClassifier::from_parameters(params, config.learning_rate)?)),
        #[cfg(feature = "tch-backend")]
        crate::tch_model::TRANSFORMER_ARCHITECTURE => Ok(Box::new(
            crate::tch_model::GraphTransformerClassifier::from_parameters(params, config, device)?,
        )),
        other => {
            let _ = device;
            Err(TrainError::training_step(format!("unknown architecture `{other}`")))
        }
    }
}
