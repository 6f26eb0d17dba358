//! Node classifiers: a GCN and a graph-agnostic MLP baseline.
//!
//! Both return `log_softmax` scores of shape `(N, C)` so the training loop
//! can apply NLL loss directly.

use parking_lot::Mutex;

use candle_core::{Result, Tensor, TensorId, D};
use candle_nn::{linear, ops, Linear, Module, VarBuilder, VarMap};

use nodeclf_common::{ModelConfig, ModelKind};

use crate::adjacency::NormalizedAdjacency;
use crate::gcn::GcnConv;

// ── NodeClassifier ──────────────────────────────────────────────────────────

/// Per-node scoring over a whole graph.
///
/// `train = true` enables dropout. Parameters live in the `VarMap` the
/// model was built from; the model itself only holds handles to them.
pub trait NodeClassifier: Send + Sync {
    fn forward_t(&self, x: &Tensor, edge_index: &Tensor, train: bool) -> Result<Tensor>;

    /// Evaluation-mode forward.
    fn forward(&self, x: &Tensor, edge_index: &Tensor) -> Result<Tensor> {
        self.forward_t(x, edge_index, false)
    }
}

// ── Gcn ─────────────────────────────────────────────────────────────────────

/// Stacked [`GcnConv`] layers with ReLU and dropout in between.
///
/// The normalised adjacency is computed on first use and cached against the
/// identity of the `edge_index` tensor (tensors are immutable, and clones
/// share the id). Any other edge tensor rebuilds it, even one with the same
/// contents.
pub struct Gcn {
    layers: Vec<GcnConv>,
    dropout: f32,
    adjacency: Mutex<Option<((TensorId, usize), NormalizedAdjacency)>>,
}

impl Gcn {
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let dims = config.layer_dims();
        let layers = dims
            .windows(2)
            .enumerate()
            .map(|(i, w)| GcnConv::new(w[0], w[1], vb.pp(format!("conv{i}"))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            layers,
            dropout: config.dropout,
            adjacency: Mutex::new(None),
        })
    }

    fn adjacency(&self, edge_index: &Tensor, num_nodes: usize) -> Result<NormalizedAdjacency> {
        let key = (edge_index.id(), num_nodes);
        let mut cache = self.adjacency.lock();
        if let Some((cached_key, adj)) = cache.as_ref() {
            if *cached_key == key {
                return Ok(adj.clone());
            }
        }
        let adj = NormalizedAdjacency::new(edge_index, num_nodes)?;
        *cache = Some((key, adj.clone()));
        Ok(adj)
    }
}

impl NodeClassifier for Gcn {
    fn forward_t(&self, x: &Tensor, edge_index: &Tensor, train: bool) -> Result<Tensor> {
        let adj = self.adjacency(edge_index, x.dim(0)?)?;
        let last = self.layers.len() - 1;
        let mut h = x.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            if train && self.dropout > 0.0 {
                h = ops::dropout(&h, self.dropout)?;
            }
            h = layer.forward(&h, &adj)?;
            if i < last {
                h = h.relu()?;
            }
        }
        ops::log_softmax(&h, D::Minus1)
    }
}

// ── Mlp ─────────────────────────────────────────────────────────────────────

/// Feature-only baseline: same layer widths as [`Gcn`], edges ignored.
pub struct Mlp {
    layers: Vec<Linear>,
    dropout: f32,
}

impl Mlp {
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let dims = config.layer_dims();
        let layers = dims
            .windows(2)
            .enumerate()
            .map(|(i, w)| linear(w[0], w[1], vb.pp(format!("lin{i}"))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            layers,
            dropout: config.dropout,
        })
    }
}

impl NodeClassifier for Mlp {
    fn forward_t(&self, x: &Tensor, _edge_index: &Tensor, train: bool) -> Result<Tensor> {
        let last = self.layers.len() - 1;
        let mut h = x.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            if train && self.dropout > 0.0 {
                h = ops::dropout(&h, self.dropout)?;
            }
            h = layer.forward(&h)?;
            if i < last {
                h = h.relu()?;
            }
        }
        ops::log_softmax(&h, D::Minus1)
    }
}

// ── Builder ─────────────────────────────────────────────────────────────────

/// Build the classifier named by `config.kind`.
///
/// `num_features` and `num_classes` must already be filled from the dataset.
pub fn build_model(config: &ModelConfig, vb: VarBuilder) -> Result<Box<dyn NodeClassifier>> {
    if config.num_features == 0 || config.num_classes == 0 {
        candle_core::bail!(
            "model needs num_features and num_classes from the dataset (got {} / {})",
            config.num_features,
            config.num_classes
        );
    }
    if config.num_layers == 0 {
        candle_core::bail!("model needs at least one layer");
    }
    let model: Box<dyn NodeClassifier> = match config.kind {
        ModelKind::Gcn => Box::new(Gcn::new(config, vb)?),
        ModelKind::Mlp => Box::new(Mlp::new(config, vb)?),
    };
    Ok(model)
}

/// Total number of trainable scalars in `varmap`.
pub fn parameter_count(varmap: &VarMap) -> usize {
    varmap
        .all_vars()
        .iter()
        .map(|v| v.as_tensor().elem_count())
        .sum()
}

// ── Tests ───────────────────────────────────────────────────────────────────
