use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use candle_core::Device;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use nodeclf_common::{
    generate_synthetic, DatasetConfig, ModelKind, OptimizerKind, SyntheticConfig, TaskConfig,
};
use nodeclf_train::{NodeClassificationTrainer, RunReport};

#[derive(Parser, Debug)]
#[command(name = "nodeclf", about = "Node classification with early stopping")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a node classifier until validation stops improving.
    Train(TrainArgs),
    /// Write a seeded synthetic graph to a safetensors file.
    Synth(SynthArgs),
    /// Evaluate a saved model on every split.
    Eval(EvalArgs),
}

// ── Train ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
struct TrainArgs {
    /// Task config; a default one is written here if the file is missing.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
    #[arg(long)]
    max_epoch: Option<usize>,
    /// 0 disables early stopping.
    #[arg(long)]
    patience: Option<usize>,
    #[arg(long)]
    lr: Option<f64>,
    #[arg(long)]
    weight_decay: Option<f64>,
    #[arg(long, value_parser = ["adam", "adamw", "sgd"])]
    optimizer: Option<String>,
    #[arg(long, value_parser = ["gcn", "mlp"])]
    model: Option<String>,
    #[arg(long)]
    hidden_size: Option<usize>,
    #[arg(long)]
    num_layers: Option<usize>,
    #[arg(long)]
    dropout: Option<f32>,
    /// Train on a dataset written by `nodeclf synth` instead of the config's.
    #[arg(long)]
    dataset: Option<PathBuf>,
    /// Independent runs; accuracy is reported as mean ± std.
    #[arg(long, default_value_t = 1)]
    runs: usize,
    /// Where to write model.safetensors, config.json and report.json.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    cpu: bool,
}

// ── Synth ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
struct SynthArgs {
    #[arg(long)]
    output: PathBuf,
    #[arg(long)]
    num_nodes: Option<usize>,
    #[arg(long)]
    num_classes: Option<usize>,
    #[arg(long)]
    num_features: Option<usize>,
    #[arg(long)]
    p_in: Option<f64>,
    #[arg(long)]
    p_out: Option<f64>,
    #[arg(long)]
    feature_signal: Option<f64>,
    #[arg(long)]
    train_per_class: Option<usize>,
    #[arg(long)]
    num_val: Option<usize>,
    #[arg(long)]
    num_test: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
}

// ── Eval ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
struct EvalArgs {
    /// Directory written by `nodeclf train --output-dir`.
    #[arg(long)]
    model_dir: PathBuf,
    #[arg(long)]
    dataset: Option<PathBuf>,
    #[arg(long)]
    cpu: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Train(args) => cmd_train(args),
        Command::Synth(args) => cmd_synth(args),
        Command::Eval(args) => cmd_eval(args),
    }
}

fn select_device(cpu: bool) -> Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else {
        Ok(Device::cuda_if_available(0)?)
    }
}

// ── Command implementations ────────────────────────────────────────────────────

fn cmd_train(args: TrainArgs) -> Result<()> {
    let mut config = if args.config.exists() {
        TaskConfig::load(&args.config)?
    } else {
        let default = TaskConfig::default();
        default.save(&args.config)?;
        eprintln!("Created default config at {}", args.config.display());
        default
    };
    apply_overrides(&mut config, &args);
    config.validate()?;
    anyhow::ensure!(args.runs >= 1, "--runs must be at least 1");

    let device = select_device(args.cpu)?;
    tracing::info!(device = ?device, runs = args.runs, "Starting training");

    let mut accs = Vec::with_capacity(args.runs);
    for run in 0..args.runs {
        let mut trainer = NodeClassificationTrainer::from_config(config.clone(), &device)?;
        let report = train_with_progress(&mut trainer)?;
        println!("Test accuracy = {:.4}", report.acc);
        accs.push(report.acc);

        if let Some(dir) = &args.output_dir {
            let dir = if args.runs > 1 {
                dir.join(format!("run-{run}"))
            } else {
                dir.clone()
            };
            save_run(&trainer, &report, &dir)?;
        }
    }

    if args.runs > 1 {
        let (mean, std) = mean_std(&accs);
        println!("Acc = {mean:.4} ± {std:.4} over {} runs", args.runs);
    }
    Ok(())
}

fn apply_overrides(config: &mut TaskConfig, args: &TrainArgs) {
    if let Some(v) = args.max_epoch {
        config.max_epoch = v;
    }
    if let Some(v) = args.patience {
        config.patience = v;
    }
    if let Some(v) = args.lr {
        config.lr = v;
    }
    if let Some(v) = args.weight_decay {
        config.weight_decay = v;
    }
    if let Some(v) = &args.optimizer {
        config.optimizer = OptimizerKind::from_str(v);
    }
    if let Some(v) = &args.model {
        config.model.kind = ModelKind::from_str(v);
    }
    if let Some(v) = args.hidden_size {
        config.model.hidden_size = v;
    }
    if let Some(v) = args.num_layers {
        config.model.num_layers = v;
    }
    if let Some(v) = args.dropout {
        config.model.dropout = v;
    }
    if let Some(path) = &args.dataset {
        config.dataset = DatasetConfig::Safetensors { path: path.clone() };
    }
}

fn train_with_progress(trainer: &mut NodeClassificationTrainer) -> Result<RunReport> {
    let pb = ProgressBar::new(trainer.config().max_epoch as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    let report = trainer.run_with(|record| {
        pb.set_message(record.status_line());
        pb.inc(1);
    })?;
    if report.stopped_early {
        pb.abandon();
    } else {
        pb.finish();
    }
    Ok(report)
}

fn save_run(trainer: &NodeClassificationTrainer, report: &RunReport, dir: &Path) -> Result<()> {
    let weights = trainer.save(dir)?;
    let report_path = dir.join("report.json");
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(&report_path, json)
        .with_context(|| format!("write {}", report_path.display()))?;
    tracing::info!(weights = %weights.display(), report = %report_path.display(), "Saved run");
    Ok(())
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn cmd_synth(args: SynthArgs) -> Result<()> {
    let mut config = SyntheticConfig::default();
    macro_rules! set {
        ($($field:ident),*) => {
            $(if let Some(v) = args.$field {
                config.$field = v;
            })*
        };
    }
    set!(
        num_nodes,
        num_classes,
        num_features,
        p_in,
        p_out,
        feature_signal,
        train_per_class,
        num_val,
        num_test,
        seed
    );

    let dataset = generate_synthetic(&config, &Device::Cpu)?;
    dataset.save(&args.output)?;
    eprintln!(
        "Wrote {} nodes, {} edges, {} classes to {}",
        dataset.num_nodes(),
        dataset.num_edges(),
        dataset.num_classes,
        args.output.display()
    );
    Ok(())
}

fn cmd_eval(args: EvalArgs) -> Result<()> {
    let mut config = TaskConfig::load(&args.model_dir.join("config.json"))?;
    if let Some(path) = args.dataset {
        config.dataset = DatasetConfig::Safetensors { path };
    }
    let device = select_device(args.cpu)?;
    let mut trainer = NodeClassificationTrainer::from_config(config, &device)?;
    trainer.load_weights(&args.model_dir.join("model.safetensors"))?;

    for (split, result) in trainer.evaluate_all()? {
        println!(
            "{split:<5}  acc {:.4}  loss {:.4}",
            result.accuracy, result.loss
        );
    }
    Ok(())
}
