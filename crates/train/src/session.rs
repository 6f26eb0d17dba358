//! The epoch loop, generic over whatever it trains.
//!
//! [`run_early_stopping`] drives a [`TrainingSession`]: one optimisation step
//! per epoch, train/val evaluation, an [`EarlyStoppingState`] update, and a
//! final test evaluation. The best snapshot is restored only when patience
//! ends the run; a run that uses up `max_epoch` is tested as it stands.

use std::collections::BTreeMap;

use serde::Serialize;

use nodeclf_common::Split;

use crate::early_stopping::{EarlyStoppingConfig, EarlyStoppingState, EpochEval, Verdict};
use crate::error::TrainError;
use crate::metrics::EvalResult;

// ── TrainingSession ─────────────────────────────────────────────────────────

/// Model, optimiser and data, as seen by the loop.
pub trait TrainingSession {
    /// Independent copy of the trainable state.
    type Snapshot;

    /// One optimisation step over the training split. Returns the loss.
    fn train_step(&mut self) -> anyhow::Result<f64>;

    /// Evaluation-mode metrics on `split`. Must not change parameters.
    fn eval_step(&self, split: Split) -> anyhow::Result<EvalResult>;

    fn snapshot(&self, epoch: usize) -> anyhow::Result<Self::Snapshot>;

    fn restore(&mut self, snapshot: Self::Snapshot) -> anyhow::Result<()>;
}

// ── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_acc: f64,
    pub val_loss: f64,
    pub val_acc: f64,
    pub verdict: Verdict,
}

impl EpochRecord {
    /// `Epoch: 003, Train: 0.9500, Val: 0.7120`
    pub fn status_line(&self) -> String {
        format!(
            "Epoch: {:03}, Train: {:.4}, Val: {:.4}",
            self.epoch, self.train_acc, self.val_acc
        )
    }
}

/// Outcome of a full run. Serialises the test accuracy under `"Acc"`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(rename = "Acc")]
    pub acc: f64,
    pub epochs_run: usize,
    pub stopped_early: bool,
    pub best_epoch: Option<usize>,
    pub best_val_loss: f64,
    pub best_val_acc: f64,
    pub history: Vec<EpochRecord>,
}

impl RunReport {
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        BTreeMap::from([("Acc".to_string(), self.acc)])
    }
}

// ── Loop ────────────────────────────────────────────────────────────────────

/// Train `session` until patience runs out or `max_epoch` epochs have run,
/// then evaluate the test split.
///
/// `on_epoch` sees every record as soon as it is produced.
pub fn run_early_stopping<S, F>(
    session: &mut S,
    config: &EarlyStoppingConfig,
    mut on_epoch: F,
) -> anyhow::Result<RunReport>
where
    S: TrainingSession,
    F: FnMut(&EpochRecord),
{
    config.validate()?;

    let mut state = EarlyStoppingState::new(config.patience);
    let mut history = Vec::with_capacity(config.max_epoch);
    let mut stopped_at = None;

    for epoch in 0..config.max_epoch {
        let train_loss = session.train_step()?;
        let train = session.eval_step(Split::Train)?;
        let val = session.eval_step(Split::Val)?;

        let eval = EpochEval {
            val_loss: val.loss,
            val_acc: val.accuracy,
        };
        let (next, verdict) = state.observe(epoch, eval, || session.snapshot(epoch))?;
        state = next;

        let record = EpochRecord {
            epoch,
            train_loss,
            train_acc: train.accuracy,
            val_loss: val.loss,
            val_acc: val.accuracy,
            verdict,
        };
        tracing::debug!(
            epoch,
            train_loss,
            train_acc = train.accuracy,
            val_loss = val.loss,
            val_acc = val.accuracy,
            ?verdict,
            "Epoch done"
        );
        on_epoch(&record);
        history.push(record);

        if verdict == Verdict::Exhausted {
            stopped_at = Some(epoch);
            break;
        }
    }

    let (best, snapshot) = state.finish();
    if let Some(epoch) = stopped_at {
        let snapshot = snapshot.ok_or(TrainError::MissingCheckpoint {
            epoch,
            patience: config.patience,
        })?;
        session.restore(snapshot)?;
        tracing::info!(
            epoch,
            best_epoch = ?best.best_epoch,
            best_val_loss = best.best_loss,
            "Patience exhausted, restored best checkpoint"
        );
    }

    let test = session.eval_step(Split::Test)?;
    Ok(RunReport {
        acc: test.accuracy,
        epochs_run: history.len(),
        stopped_early: stopped_at.is_some(),
        best_epoch: best.best_epoch,
        best_val_loss: best.best_loss,
        best_val_acc: best.best_score,
        history,
    })
}

// ── Tests ───────────────────────────────────────────────────────────────────
