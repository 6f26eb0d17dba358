//! Trainer: a node classifier, its optimiser, and the graph it learns from.
//!
//! [`NodeClassificationTrainer`] is the candle-backed [`TrainingSession`]:
//! full-graph forward with dropout, masked NLL on the training nodes, one
//! optimiser update per epoch. Snapshots are [`Checkpoint`]s of the `VarMap`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};

use nodeclf_common::{build_dataset, GraphDataset, Split, TaskConfig};
use nodeclf_core::{build_model, parameter_count, NodeClassifier};

use crate::checkpoint::Checkpoint;
use crate::early_stopping::EarlyStoppingConfig;
use crate::metrics::{evaluate_split, masked_nll, EvalResult};
use crate::optim::NodeOptimizer;
use crate::session::{run_early_stopping, EpochRecord, RunReport, TrainingSession};

pub struct NodeClassificationTrainer {
    model: Box<dyn NodeClassifier>,
    varmap: VarMap,
    optimizer: NodeOptimizer,
    dataset: GraphDataset,
    config: TaskConfig,
}

impl NodeClassificationTrainer {
    /// Build a fresh model sized to `dataset` on the dataset's device.
    pub fn new(mut config: TaskConfig, dataset: GraphDataset) -> anyhow::Result<Self> {
        config.validate()?;
        config.model.num_features = dataset.num_features;
        config.model.num_classes = dataset.num_classes;

        let device = dataset.features.device().clone();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = build_model(&config.model, vb)?;
        let optimizer = NodeOptimizer::new(
            config.optimizer,
            varmap.all_vars(),
            config.lr,
            config.weight_decay,
        )?;

        tracing::info!(
            model = ?config.model.kind,
            layers = config.model.num_layers,
            hidden = config.model.hidden_size,
            params = parameter_count(&varmap),
            optimizer = ?config.optimizer,
            lr = config.lr,
            weight_decay = config.weight_decay,
            "Model ready"
        );

        Ok(Self {
            model,
            varmap,
            optimizer,
            dataset,
            config,
        })
    }

    /// Build the dataset named by `config.dataset`, then the trainer.
    pub fn from_config(config: TaskConfig, device: &Device) -> anyhow::Result<Self> {
        let dataset = build_dataset(&config.dataset, device)?;
        Self::new(config, dataset)
    }

    pub fn early_stopping(&self) -> EarlyStoppingConfig {
        EarlyStoppingConfig {
            max_epoch: self.config.max_epoch,
            patience: self.config.patience,
        }
    }

    pub fn run(&mut self) -> anyhow::Result<RunReport> {
        self.run_with(|_| {})
    }

    /// Run the early-stopping loop, calling `on_epoch` after every epoch.
    pub fn run_with<F: FnMut(&EpochRecord)>(&mut self, on_epoch: F) -> anyhow::Result<RunReport> {
        let es = self.early_stopping();
        let report = run_early_stopping(self, &es, on_epoch)?;
        tracing::info!(
            acc = report.acc,
            epochs = report.epochs_run,
            stopped_early = report.stopped_early,
            best_epoch = ?report.best_epoch,
            "Run finished"
        );
        Ok(report)
    }

    /// Evaluation-mode metrics on one split.
    pub fn evaluate(&self, split: Split) -> anyhow::Result<EvalResult> {
        let ds = &self.dataset;
        let log_probs = self.model.forward(&ds.features, &ds.edge_index)?;
        evaluate_split(&log_probs, ds, split)
    }

    /// Metrics on all three splits from a single forward pass.
    pub fn evaluate_all(&self) -> anyhow::Result<Vec<(Split, EvalResult)>> {
        let ds = &self.dataset;
        let log_probs = self.model.forward(&ds.features, &ds.edge_index)?;
        Split::ALL
            .iter()
            .map(|&split| evaluate_split(&log_probs, ds, split).map(|r| (split, r)))
            .collect()
    }

    /// Write `model.safetensors` and `config.json` into `dir`.
    pub fn save(&self, dir: &Path) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        let path = dir.join("model.safetensors");
        self.varmap.save(&path)?;
        self.config.save(&dir.join("config.json"))?;
        Ok(path)
    }

    /// Overwrite the live weights with a file written by [`save`](Self::save).
    pub fn load_weights(&mut self, path: &Path) -> anyhow::Result<()> {
        self.varmap
            .load(path)
            .with_context(|| format!("load weights {}", path.display()))?;
        Ok(())
    }

    /// Config with `num_features`/`num_classes` filled from the dataset.
    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn dataset(&self) -> &GraphDataset {
        &self.dataset
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    pub fn device(&self) -> &Device {
        self.dataset.features.device()
    }
}

impl TrainingSession for NodeClassificationTrainer {
    type Snapshot = Checkpoint;

    fn train_step(&mut self) -> anyhow::Result<f64> {
        let ds = &self.dataset;
        let log_probs = self.model.forward_t(&ds.features, &ds.edge_index, true)?;
        let loss = masked_nll(&log_probs, &ds.labels, ds.mask_index(Split::Train))?;
        self.optimizer.backward_step(&loss)?;
        Ok(loss.to_scalar::<f32>()? as f64)
    }

    fn eval_step(&self, split: Split) -> anyhow::Result<EvalResult> {
        self.evaluate(split)
    }

    fn snapshot(&self, epoch: usize) -> anyhow::Result<Checkpoint> {
        Checkpoint::capture(&self.varmap, epoch)
    }

    fn restore(&mut self, snapshot: Checkpoint) -> anyhow::Result<()> {
        snapshot.restore(&self.varmap)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use nodeclf_common::{DatasetConfig, SyntheticConfig};

    fn small_config() -> TaskConfig {
        let mut config = TaskConfig {
            max_epoch: 5,
            patience: 2,
            ..Default::default()
        };
        config.model.hidden_size = 8;
        config.dataset = DatasetConfig::Synthetic(SyntheticConfig {
            num_nodes: 60,
            num_classes: 3,
            num_features: 12,
            p_in: 0.2,
            p_out: 0.02,
            feature_signal: 0.5,
            train_per_class: 5,
            num_val: 15,
            num_test: 20,
            seed: 7,
        });
        config
    }

    fn trainer() -> NodeClassificationTrainer {
        NodeClassificationTrainer::from_config(small_config(), &Device::Cpu).unwrap()
    }

    #[test]
    fn sizes_model_from_dataset() {
        let t = trainer();
        assert_eq!(t.config().model.num_features, 12);
        assert_eq!(t.config().model.num_classes, 3);
        // 12·8 + 8 + 8·3 + 3
        assert_eq!(parameter_count(t.varmap()), 131);
    }

    #[test]
    fn train_step_changes_weights_and_eval_does_not() {
        let mut t = trainer();
        let before = t.evaluate(Split::Val).unwrap();
        assert_eq!(t.evaluate(Split::Val).unwrap(), before);

        let loss = t.train_step().unwrap();
        assert!(loss.is_finite() && loss > 0.0);
        assert_ne!(t.evaluate(Split::Val).unwrap().loss, before.loss);
    }

    #[test]
    fn restore_brings_back_snapshot_metrics() {
        let mut t = trainer();
        t.train_step().unwrap();
        let ckpt = t.snapshot(0).unwrap();
        let at_snapshot = t.evaluate(Split::Val).unwrap();

        for _ in 0..3 {
            t.train_step().unwrap();
        }
        assert_ne!(t.evaluate(Split::Val).unwrap().loss, at_snapshot.loss);

        t.restore(ckpt).unwrap();
        assert_eq!(t.evaluate(Split::Val).unwrap(), at_snapshot);
    }

    #[test]
    fn saved_weights_reload_into_fresh_trainer() {
        let mut t = trainer();
        t.train_step().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = t.save(dir.path()).unwrap();
        assert!(dir.path().join("config.json").exists());

        let config = TaskConfig::load(&dir.path().join("config.json")).unwrap();
        let mut fresh = NodeClassificationTrainer::new(config, t.dataset().clone()).unwrap();
        fresh.load_weights(&path).unwrap();
        assert_eq!(
            fresh.evaluate(Split::Test).unwrap(),
            t.evaluate(Split::Test).unwrap()
        );
    }

    #[test]
    fn evaluate_all_covers_every_split() {
        let t = trainer();
        let all = t.evaluate_all().unwrap();
        let splits: Vec<Split> = all.iter().map(|(s, _)| *s).collect();
        assert_eq!(splits, Split::ALL.to_vec());
        for (split, result) in all {
            assert_eq!(result, t.evaluate(split).unwrap());
            assert!((0.0..=1.0).contains(&result.accuracy));
        }
    }
}
