//! Named failures of the training loop.
//!
//! Everything else (candle numeric errors, I/O) travels as `anyhow::Error`.
//! These variants can be recovered with `err.downcast_ref::<TrainError>()`.

use nodeclf_common::Split;

#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    /// Patience ran out before any epoch passed the checkpoint gate, so there
    /// is no best model to restore. Only reachable when every improving
    /// epoch reported a NaN validation loss.
    #[error("patience {patience} exhausted at epoch {epoch} with no checkpoint to restore")]
    MissingCheckpoint { epoch: usize, patience: usize },

    #[error("{0} split selects no nodes")]
    EmptySplit(Split),

    #[error("invalid training config: {0}")]
    InvalidConfig(String),
}
