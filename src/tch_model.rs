//! libtorch graph-transformer classifier (feature `tch-backend`).
//!
//! # Architecture
//!
//! ```text
//! node features [ΣN, 3]
//!       │
//!       ▼
//! ┌─────────────────────┐
//! │ input projection    │  Linear 3 → hidden
//! └─────────────────────┘
//!       │
//!       ▼   × attention_layers
//! ┌─────────────────────────────────────────┐
//! │ multi-head edge attention (self-loops)  │  softmax over incoming edges
//! │ output projection, residual, LayerNorm  │
//! │ ReLU                                    │
//! └─────────────────────────────────────────┘
//!       │
//!       ▼
//! ┌─────────────────────┐
//! │ global mean pool    │  [B, hidden]
//! └─────────────────────┘
//!       │
//!       ▼
//! ┌─────────────────────┐
//! │ MLP head + sigmoid  │  [B]
//! └─────────────────────┘
//! ```
//!
//! Parameters live in one `VarStore`; the optimiser is `tch::nn::Adam`.

use tch::nn::{self, Module, OptimizerConfig};
use tch::{Device, Kind, Reduction, Tensor};

use crate::config::TrainingConfig;
use crate::device::ComputeDevice;
use crate::error::{TrainError, TrainResult};
use crate::loader::GraphBatch;
use crate::model::{ClassifierMode, GraphClassifier, ModelParameters, ParameterTensor};

/// Architecture tag of [`GraphTransformerClassifier`].
pub const TRANSFORMER_ARCHITECTURE: &str = "graph-transformer";

fn tch_err(e: tch::TchError) -> TrainError {
    TrainError::training_step(e.to_string())
}

// ---------------------------------------------------------------------------
// Attention layer
// ---------------------------------------------------------------------------

struct EdgeAttention {
    query: nn::Linear,
    key: nn::Linear,
    value: nn::Linear,
    out: nn::Linear,
    norm: nn::LayerNorm,
    heads: i64,
    head_dim: i64,
}

impl EdgeAttention {
    fn new(p: nn::Path, hidden: i64, heads: i64) -> Self {
        let cfg = Default::default();
        EdgeAttention {
            query: nn::linear(&p / "query", hidden, hidden, cfg),
            key: nn::linear(&p / "key", hidden, hidden, cfg),
            value: nn::linear(&p / "value", hidden, hidden, cfg),
            out: nn::linear(&p / "out", hidden, hidden, cfg),
            norm: nn::layer_norm(&p / "norm", vec![hidden], Default::default()),
            heads,
            head_dim: hidden / heads,
        }
    }

    /// `h`: `[N, hidden]`, `src` / `dst`: `[E]` including self-loops.
    fn forward(&self, h: &Tensor, src: &Tensor, dst: &Tensor) -> Tensor {
        let n = h.size()[0];
        let shape = [-1, self.heads, self.head_dim];
        let q = h.apply(&self.query).reshape(shape);
        let k = h.apply(&self.key).reshape(shape);
        let v = h.apply(&self.value).reshape(shape);

        // Per-edge, per-head scores [E, H].
        let scores = (q.index_select(0, dst) * k.index_select(0, src)).sum_dim_intlist(
            [-1i64].as_slice(),
            false,
            Kind::Float,
        ) / (self.head_dim as f64).sqrt();
        let weights = (&scores - scores.max()).exp();
        let denom = Tensor::zeros([n, self.heads], (Kind::Float, h.device()))
            .index_add(0, dst, &weights);
        let alpha = &weights / denom.index_select(0, dst).clamp_min(1e-12);

        let messages = v.index_select(0, src) * alpha.unsqueeze(-1);
        let agg = Tensor::zeros([n, self.heads, self.head_dim], (Kind::Float, h.device()))
            .index_add(0, dst, &messages)
            .reshape([n, -1]);

        (h + agg.apply(&self.out)).apply(&self.norm).relu()
    }
}

// ---------------------------------------------------------------------------
// GraphTransformerClassifier
// ---------------------------------------------------------------------------

/// Multi-head graph-attention classifier backed by libtorch.
pub struct GraphTransformerClassifier {
    vs: nn::VarStore,
    input: nn::Linear,
    layers: Vec<EdgeAttention>,
    head_hidden: nn::Linear,
    head_out: nn::Linear,
    optimizer: nn::Optimizer,
    device: Device,
    mode: ClassifierMode,
}

impl GraphTransformerClassifier {
    /// Build a freshly initialised model on `device`.
    pub fn new(config: &TrainingConfig, device: ComputeDevice) -> TrainResult<Self> {
        tch::manual_seed(config.seed as i64);
        let device: Device = device.into();
        let vs = nn::VarStore::new(device);
        let root = vs.root();

        let hidden = config.hidden_channels as i64;
        let heads = config.attention_heads as i64;
        let input = nn::linear(&root / "input", config.node_feature_dim() as i64, hidden, Default::default());
        let layers = (0..config.attention_layers)
            .map(|i| EdgeAttention::new(&root / format!("layer{i}"), hidden, heads))
            .collect();
        let head_hidden = nn::linear(&root / "head_hidden", hidden, hidden / 2, Default::default());
        let head_out = nn::linear(&root / "head_out", hidden / 2, 1, Default::default());

        let optimizer = nn::Adam::default().build(&vs, config.learning_rate).map_err(tch_err)?;

        Ok(GraphTransformerClassifier {
            vs,
            input,
            layers,
            head_hidden,
            head_out,
            optimizer,
            device,
            mode: ClassifierMode::Train,
        })
    }

    /// Rebuild a model from stored parameters, in eval mode.
    pub fn from_parameters(
        params: &ModelParameters,
        config: &TrainingConfig,
        device: ComputeDevice,
    ) -> TrainResult<Self> {
        if params.architecture != TRANSFORMER_ARCHITECTURE {
            return Err(TrainError::training_step(format!(
                "cannot load `{}` parameters into {TRANSFORMER_ARCHITECTURE}",
                params.architecture
            )));
        }
        let mut model = Self::new(config, device)?;
        let mut vars = model.vs.variables();
        tch::no_grad(|| -> TrainResult<()> {
            for t in &params.tensors {
                let var = vars.get_mut(&t.name).ok_or_else(|| {
                    TrainError::training_step(format!("unexpected parameter `{}`", t.name))
                })?;
                let expected: Vec<usize> = var.size().iter().map(|&d| d as usize).collect();
                if expected != t.shape {
                    return Err(TrainError::shape_mismatch(expected, t.shape.clone()));
                }
                let shape: Vec<i64> = t.shape.iter().map(|&d| d as i64).collect();
                let src = Tensor::from_slice(&t.values).reshape(shape.as_slice()).to_device(model.device);
                var.copy_(&src);
            }
            Ok(())
        })?;
        model.mode = ClassifierMode::Eval;
        Ok(model)
    }

    fn batch_tensors(&self, batch: &GraphBatch) -> (Tensor, Tensor, Tensor, Tensor) {
        let n = batch.num_nodes() as i64;
        let x: Vec<f32> = batch.node_features().iter().copied().collect();
        let x = Tensor::from_slice(&x).reshape([n, -1]).to_device(self.device);

        let ei = batch.edge_index();
        let mut src: Vec<i64> = ei.row(0).iter().map(|&v| v as i64).collect();
        let mut dst: Vec<i64> = ei.row(1).iter().map(|&v| v as i64).collect();
        src.extend(0..n);
        dst.extend(0..n);
        let src = Tensor::from_slice(&src).to_device(self.device);
        let dst = Tensor::from_slice(&dst).to_device(self.device);

        let membership: Vec<i64> = batch.batch().iter().map(|&g| g as i64).collect();
        let membership = Tensor::from_slice(&membership).to_device(self.device);
        (x, src, dst, membership)
    }

    fn forward_tensor(&self, batch: &GraphBatch) -> Tensor {
        let (x, src, dst, membership) = self.batch_tensors(batch);
        let mut h = x.apply(&self.input).relu();
        for layer in &self.layers {
            h = layer.forward(&h, &src, &dst);
        }

        let b = batch.num_graphs() as i64;
        let hidden = h.size()[1];
        let sums = Tensor::zeros([b, hidden], (Kind::Float, self.device)).index_add(0, &membership, &h);
        let ones = Tensor::ones([h.size()[0]], (Kind::Float, self.device));
        let counts = Tensor::zeros([b], (Kind::Float, self.device)).index_add(0, &membership, &ones);
        let pooled = sums / counts.clamp_min(1.0).unsqueeze(1);

        self.head_out
            .forward(&self.head_hidden.forward(&pooled).relu())
            .squeeze_dim(1)
            .sigmoid()
    }

    fn labels_tensor(&self, batch: &GraphBatch) -> Tensor {
        let labels: Vec<f32> = batch.labels().to_vec();
        Tensor::from_slice(&labels).to_device(self.device)
    }
}

fn to_vec(t: &Tensor) -> TrainResult<Vec<f32>> {
    let flat = t.detach().to_device(Device::Cpu).to_kind(Kind::Float).reshape([-1]);
    Vec::<f32>::try_from(&flat).map_err(tch_err)
}

impl GraphClassifier for GraphTransformerClassifier {
    fn architecture(&self) -> &'static str {
        TRANSFORMER_ARCHITECTURE
    }

    fn forward(&self, batch: &GraphBatch) -> TrainResult<Vec<f32>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let probs = tch::no_grad(|| self.forward_tensor(batch));
        to_vec(&probs)
    }

    fn train_step(&mut self, batch: &GraphBatch) -> TrainResult<Vec<f32>> {
        if self.mode != ClassifierMode::Train {
            return Err(TrainError::training_step("train_step called in eval mode"));
        }
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let probs = self.forward_tensor(batch);
        let labels = self.labels_tensor(batch);
        let loss = probs.binary_cross_entropy::<Tensor>(&labels, None, Reduction::Mean);
        let out = to_vec(&probs)?;
        self.optimizer.backward_step(&loss);
        Ok(out)
    }

    fn set_mode(&mut self, mode: ClassifierMode) {
        self.mode = mode;
    }

    fn mode(&self) -> ClassifierMode {
        self.mode
    }

    fn parameters(&self) -> TrainResult<ModelParameters> {
        let mut named: Vec<(String, Tensor)> = self.vs.variables().into_iter().collect();
        named.sort_by(|a, b| a.0.cmp(&b.0));
        let tensors = named
            .into_iter()
            .map(|(name, t)| {
                Ok(ParameterTensor {
                    name,
                    shape: t.size().iter().map(|&d| d as usize).collect(),
                    values: to_vec(&t)?,
                })
            })
            .collect::<TrainResult<Vec<_>>>()?;
        Ok(ModelParameters { architecture: TRANSFORMER_ARCHITECTURE.to_string(), tensors })
    }
}
