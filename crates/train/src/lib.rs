//! # nodeclf-train — Early-Stopping Training Loop
//!
//! Trains a node classifier until validation stops improving:
//!
//! * **[`run_early_stopping`]** — the epoch loop over any [`TrainingSession`].
//! * **[`EarlyStoppingState`]** — dual-criterion improvement tracking
//!   (validation loss **or** accuracy), patience counter, best snapshot.
//! * **[`NodeClassificationTrainer`]** — candle session: model + optimiser +
//!   dataset, with [`Checkpoint`] snapshots of the `VarMap`.
//! * **[`NodeOptimizer`]** — Adam (coupled L2), AdamW, or SGD.
//! * **[`RunReport`]** — test accuracy under `"Acc"` plus the epoch history.

pub mod checkpoint;
pub mod early_stopping;
pub mod error;
pub mod metrics;
pub mod optim;
pub mod session;
pub mod trainer;

pub use checkpoint::Checkpoint;
pub use early_stopping::{BestSummary, EarlyStoppingConfig, EarlyStoppingState, EpochEval, Verdict};
pub use error::TrainError;
pub use metrics::{accuracy, evaluate_split, masked_nll, EvalResult};
pub use optim::NodeOptimizer;
pub use session::{run_early_stopping, EpochRecord, RunReport, TrainingSession};
pub use trainer::NodeClassificationTrainer;
