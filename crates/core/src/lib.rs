//! # nodeclf-core — Graph Layers and Classifiers
//!
//! Everything needed to score nodes of a graph:
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`adjacency`] | `NormalizedAdjacency` (`D^{-1/2}(A+I)D^{-1/2}`, sparse propagation) |
//! | [`gcn`] | `GcnConv` layer |
//! | [`model`] | `NodeClassifier` trait, `Gcn`, `Mlp`, `build_model` |
//!
//! All compute goes through `candle-core`/`candle-nn`, so the same models
//! run on CPU, CUDA, and Metal. Models are `Send + Sync`; the GCN adjacency
//! cache uses `parking_lot::Mutex`.

pub mod adjacency;
pub mod gcn;
pub mod model;

pub use adjacency::NormalizedAdjacency;
pub use gcn::GcnConv;
pub use model::{build_model, parameter_count, Gcn, Mlp, NodeClassifier};
