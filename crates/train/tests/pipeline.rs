//! End-to-end runs on small synthetic graphs (CPU only).

use candle_core::Device;

use nodeclf_common::{
    generate_synthetic, DatasetConfig, ModelKind, OptimizerKind, Split, SyntheticConfig,
    TaskConfig,
};
use nodeclf_train::{NodeClassificationTrainer, RunReport, Verdict};

fn strong_signal() -> SyntheticConfig {
    SyntheticConfig {
        num_nodes: 90,
        num_classes: 3,
        num_features: 30,
        p_in: 0.3,
        p_out: 0.01,
        feature_signal: 0.6,
        train_per_class: 8,
        num_val: 24,
        num_test: 30,
        seed: 3,
    }
}

fn task(kind: ModelKind, optimizer: OptimizerKind) -> TaskConfig {
    let mut config = TaskConfig {
        max_epoch: 60,
        patience: 20,
        lr: 0.05,
        optimizer,
        dataset: DatasetConfig::Synthetic(strong_signal()),
        ..Default::default()
    };
    config.model.kind = kind;
    config.model.hidden_size = 16;
    config
}

/// The reported accuracy must come from the model the loop ended with:
/// the restored checkpoint after a patience stop, the live model otherwise.
fn assert_consistent(trainer: &NodeClassificationTrainer, report: &RunReport) {
    assert!((0.0..=1.0).contains(&report.acc));
    assert_eq!(report.epochs_run, report.history.len());
    assert_eq!(report.acc, trainer.evaluate(Split::Test).unwrap().accuracy);

    let val_loss = trainer.evaluate(Split::Val).unwrap().loss;
    let last = report.history.last().unwrap();
    if report.stopped_early {
        assert_eq!(last.verdict, Verdict::Exhausted);
        assert_eq!(val_loss, report.best_val_loss);
    } else {
        assert_eq!(report.epochs_run, trainer.config().max_epoch);
        assert_eq!(val_loss, last.val_loss);
    }
}

#[test]
fn gcn_learns_block_structure() {
    let mut trainer =
        NodeClassificationTrainer::from_config(task(ModelKind::Gcn, OptimizerKind::Adam), &Device::Cpu)
            .unwrap();
    let mut seen = 0;
    let report = trainer.run_with(|r| {
        assert_eq!(r.epoch, seen);
        seen += 1;
    })
    .unwrap();

    assert_eq!(seen, report.epochs_run);
    assert_consistent(&trainer, &report);
    assert!(report.best_epoch.is_some());
    assert!(report.best_val_acc >= 0.5, "best val acc {}", report.best_val_acc);
}

#[test]
fn mlp_with_sgd_runs_to_completion() {
    let mut config = task(ModelKind::Mlp, OptimizerKind::Sgd);
    config.max_epoch = 15;
    config.patience = 0;
    let mut trainer = NodeClassificationTrainer::from_config(config, &Device::Cpu).unwrap();
    let report = trainer.run().unwrap();

    assert!(!report.stopped_early);
    assert_eq!(report.epochs_run, 15);
    assert_consistent(&trainer, &report);
}

#[test]
fn safetensors_dataset_trains_like_generated_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graph.safetensors");
    generate_synthetic(&strong_signal(), &Device::Cpu)
        .unwrap()
        .save(&path)
        .unwrap();

    let mut config = task(ModelKind::Gcn, OptimizerKind::AdamW);
    config.max_epoch = 10;
    config.dataset = DatasetConfig::Safetensors { path };
    let mut trainer = NodeClassificationTrainer::from_config(config, &Device::Cpu).unwrap();
    assert_eq!(trainer.dataset().num_nodes(), 90);
    assert_eq!(trainer.dataset().split_len(Split::Train), 24);

    let report = trainer.run().unwrap();
    assert_consistent(&trainer, &report);

    let out = dir.path().join("run");
    trainer.save(&out).unwrap();
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"Acc\""));
    assert!(out.join("model.safetensors").exists());
}
