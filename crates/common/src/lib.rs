//! # nodeclf-common — Shared Primitives
//!
//! Types shared across every crate in the workspace:
//!
//! * **[`TaskConfig`]** — loop budget, optimiser knobs, model and dataset sections (JSON).
//! * **[`GraphDataset`]** / **[`Split`]** — validated graph tensors and split masks.
//! * **[`build_dataset`]** — config → dataset (synthetic generator or safetensors file).

pub mod config;
pub mod data;
pub mod synthetic;

pub use config::{
    DatasetConfig, ModelConfig, ModelKind, OptimizerKind, SyntheticConfig, TaskConfig,
};
pub use data::{build_dataset, GraphDataset, Split};
pub use synthetic::generate_synthetic;
