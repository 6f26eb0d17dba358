//! Task configuration for node classification.
//!
//! Serialised as JSON. Every field has a sensible default so a minimal `{}`
//! JSON produces a working GCN run on a small synthetic graph.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

// ── TaskConfig ──────────────────────────────────────────────────────────────

/// Top-level configuration: loop budget, optimiser knobs, and the sections
/// forwarded to the model and dataset builders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Hard cap on training epochs (must be ≥ 1).
    #[serde(default = "default_max_epoch")]
    pub max_epoch: usize,
    /// Consecutive non-improving epochs tolerated before stopping.
    /// `0` disables early stopping.
    #[serde(default = "default_patience")]
    pub patience: usize,
    #[serde(default = "default_lr")]
    pub lr: f64,
    #[serde(default = "default_weight_decay")]
    pub weight_decay: f64,
    #[serde(default)]
    pub optimizer: OptimizerKind,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,
}

/// Optimiser family. `Adam` applies weight decay as a coupled L2 term on the
/// gradient; `AdamW` decays the weights directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    #[default]
    Adam,
    AdamW,
    Sgd,
}

impl OptimizerKind {
    pub fn from_str(s: &str) -> Self {
        match s {
            "adamw" => Self::AdamW,
            "sgd" => Self::Sgd,
            _ => Self::Adam,
        }
    }
}

// ── ModelConfig ─────────────────────────────────────────────────────────────

/// Architecture of the node classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Gcn,
    Mlp,
}

impl ModelKind {
    pub fn from_str(s: &str) -> Self {
        match s {
            "mlp" => Self::Mlp,
            _ => Self::Gcn,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub kind: ModelKind,
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    /// Number of layers including the output layer.
    #[serde(default = "default_num_layers")]
    pub num_layers: usize,
    #[serde(default = "default_dropout")]
    pub dropout: f32,
    /// Filled from the dataset before the model is built.
    #[serde(default)]
    pub num_features: usize,
    /// Filled from the dataset before the model is built.
    #[serde(default)]
    pub num_classes: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::Gcn,
            hidden_size: default_hidden_size(),
            num_layers: default_num_layers(),
            dropout: default_dropout(),
            num_features: 0,
            num_classes: 0,
        }
    }
}

impl ModelConfig {
    /// Layer widths from input to output: `[F, H, .., H, C]`.
    pub fn layer_dims(&self) -> Vec<usize> {
        let mut dims = Vec::with_capacity(self.num_layers + 1);
        dims.push(self.num_features);
        for _ in 1..self.num_layers {
            dims.push(self.hidden_size);
        }
        dims.push(self.num_classes);
        dims
    }
}

// ── DatasetConfig ───────────────────────────────────────────────────────────

/// Where the graph comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum DatasetConfig {
    /// Seeded stochastic block model with class-correlated binary features.
    Synthetic(SyntheticConfig),
    /// A dataset written by `GraphDataset::save`.
    Safetensors { path: PathBuf },
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self::Synthetic(SyntheticConfig::default())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    #[serde(default = "default_num_nodes")]
    pub num_nodes: usize,
    #[serde(default = "default_syn_classes")]
    pub num_classes: usize,
    #[serde(default = "default_syn_features")]
    pub num_features: usize,
    /// Edge probability between two nodes of the same class.
    #[serde(default = "default_p_in")]
    pub p_in: f64,
    /// Edge probability between nodes of different classes.
    #[serde(default = "default_p_out")]
    pub p_out: f64,
    /// Probability that a feature in the node's own class block is active.
    /// Features outside the block fire at a quarter of this rate.
    #[serde(default = "default_feature_signal")]
    pub feature_signal: f64,
    #[serde(default = "default_train_per_class")]
    pub train_per_class: usize,
    #[serde(default = "default_num_val")]
    pub num_val: usize,
    #[serde(default = "default_num_test")]
    pub num_test: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            num_nodes: default_num_nodes(),
            num_classes: default_syn_classes(),
            num_features: default_syn_features(),
            p_in: default_p_in(),
            p_out: default_p_out(),
            feature_signal: default_feature_signal(),
            train_per_class: default_train_per_class(),
            num_val: default_num_val(),
            num_test: default_num_test(),
            seed: default_seed(),
        }
    }
}

// ── Default value functions ─────────────────────────────────────────────────

fn default_max_epoch() -> usize {
    500
}
fn default_patience() -> usize {
    100
}
fn default_lr() -> f64 {
    0.01
}
fn default_weight_decay() -> f64 {
    5e-4
}
fn default_hidden_size() -> usize {
    64
}
fn default_num_layers() -> usize {
    2
}
fn default_dropout() -> f32 {
    0.5
}
fn default_num_nodes() -> usize {
    600
}
fn default_syn_classes() -> usize {
    3
}
fn default_syn_features() -> usize {
    96
}
fn default_p_in() -> f64 {
    0.02
}
fn default_p_out() -> f64 {
    0.002
}
fn default_feature_signal() -> f64 {
    0.3
}
fn default_train_per_class() -> usize {
    20
}
fn default_num_val() -> usize {
    150
}
fn default_num_test() -> usize {
    300
}
fn default_seed() -> u64 {
    42
}

// ── Impl ────────────────────────────────────────────────────────────────────

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_epoch: default_max_epoch(),
            patience: default_patience(),
            lr: default_lr(),
            weight_decay: default_weight_decay(),
            optimizer: OptimizerKind::Adam,
            model: ModelConfig::default(),
            dataset: DatasetConfig::default(),
        }
    }
}

impl TaskConfig {
    /// Reject settings the training loop cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_epoch == 0 {
            anyhow::bail!("max_epoch must be at least 1");
        }
        if !(self.lr > 0.0) {
            anyhow::bail!("lr must be positive, got {}", self.lr);
        }
        if self.weight_decay < 0.0 {
            anyhow::bail!("weight_decay must be non-negative, got {}", self.weight_decay);
        }
        if self.model.num_layers == 0 {
            anyhow::bail!("model.num_layers must be at least 1");
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            anyhow::bail!("model.dropout must be in [0, 1), got {}", self.model.dropout);
        }
        Ok(())
    }

    /// Save config to a JSON file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
