//! Dual-criterion early stopping.
//!
//! An epoch counts as an improvement when validation loss does not exceed
//! the lowest loss seen **or** validation accuracy reaches the highest
//! accuracy seen. Inside an improving epoch a checkpoint is taken only when
//! the loss also does not exceed the loss of the current best checkpoint.
//! Patience counts consecutive non-improving epochs; the run stops when the
//! counter, after incrementing, equals `patience` (so `patience = 0` never
//! stops).
//!
//! The state is moved through each epoch by value:
//! `(state, epoch result) → (state', verdict)`.

use serde::Serialize;

use crate::error::TrainError;

/// Loop budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EarlyStoppingConfig {
    /// Hard cap on epochs.
    pub max_epoch: usize,
    /// Consecutive non-improving epochs tolerated.
    pub patience: usize,
}

impl EarlyStoppingConfig {
    pub fn validate(&self) -> Result<(), TrainError> {
        if self.max_epoch == 0 {
            return Err(TrainError::InvalidConfig(
                "max_epoch must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Validation metrics of one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochEval {
    pub val_loss: f64,
    pub val_acc: f64,
}

/// Outcome of observing one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    /// Loss or accuracy improved; `checkpointed` when a snapshot was taken.
    Improved { checkpointed: bool },
    /// No improvement; counter after the increment.
    Stalled { patience_counter: usize },
    /// Counter reached `patience`; restore the best snapshot and stop.
    Exhausted,
}

/// Best-so-far figures left after the state is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BestSummary {
    pub best_epoch: Option<usize>,
    pub best_loss: f64,
    pub best_score: f64,
    pub min_loss_seen: f64,
    pub max_score_seen: f64,
}

/// Early-stopping state. `S` is whatever the session uses as a snapshot.
#[derive(Debug)]
pub struct EarlyStoppingState<S> {
    patience: usize,
    best_loss: f64,
    best_score: f64,
    best_epoch: Option<usize>,
    min_loss_seen: f64,
    max_score_seen: f64,
    patience_counter: usize,
    best_snapshot: Option<S>,
}

impl<S> EarlyStoppingState<S> {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best_loss: f64::INFINITY,
            best_score: 0.0,
            best_epoch: None,
            min_loss_seen: f64::INFINITY,
            max_score_seen: 0.0,
            patience_counter: 0,
            best_snapshot: None,
        }
    }

    /// Fold one epoch into the state.
    ///
    /// `snapshot` is called only when the checkpoint gate passes; its error
    /// aborts the run.
    pub fn observe<F>(
        mut self,
        epoch: usize,
        eval: EpochEval,
        snapshot: F,
    ) -> anyhow::Result<(Self, Verdict)>
    where
        F: FnOnce() -> anyhow::Result<S>,
    {
        let EpochEval { val_loss, val_acc } = eval;

        if val_loss <= self.min_loss_seen || val_acc >= self.max_score_seen {
            let checkpointed = val_loss <= self.best_loss;
            if checkpointed {
                self.best_snapshot = Some(snapshot()?);
                self.best_loss = val_loss;
                self.best_score = val_acc;
                self.best_epoch = Some(epoch);
            }
            // f64::min/max skip NaN, keeping both trackers monotone.
            self.min_loss_seen = self.min_loss_seen.min(val_loss);
            self.max_score_seen = self.max_score_seen.max(val_acc);
            self.patience_counter = 0;
            return Ok((self, Verdict::Improved { checkpointed }));
        }

        self.patience_counter += 1;
        let verdict = if self.patience_counter == self.patience {
            Verdict::Exhausted
        } else {
            Verdict::Stalled {
                patience_counter: self.patience_counter,
            }
        };
        Ok((self, verdict))
    }

    pub fn patience(&self) -> usize {
        self.patience
    }

    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn min_loss_seen(&self) -> f64 {
        self.min_loss_seen
    }

    pub fn max_score_seen(&self) -> f64 {
        self.max_score_seen
    }

    pub fn patience_counter(&self) -> usize {
        self.patience_counter
    }

    pub fn has_snapshot(&self) -> bool {
        self.best_snapshot.is_some()
    }

    /// Consume the state, handing back the summary and the best snapshot.
    pub fn finish(self) -> (BestSummary, Option<S>) {
        let summary = BestSummary {
            best_epoch: self.best_epoch,
            best_loss: self.best_loss,
            best_score: self.best_score,
            min_loss_seen: self.min_loss_seen,
            max_score_seen: self.max_score_seen,
        };
        (summary, self.best_snapshot)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
