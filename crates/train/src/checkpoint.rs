//! Owned parameter snapshots.
//!
//! A [`Checkpoint`] copies every tensor of a `VarMap` into fresh storage, so
//! later optimiser updates cannot reach it. [`Checkpoint::restore`] writes
//! the copies back into the live variables in place; models built from the
//! same `VarMap` see the restored weights immediately.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use candle_core::Tensor;
use candle_nn::VarMap;

#[derive(Debug, Clone)]
pub struct Checkpoint {
    epoch: usize,
    tensors: HashMap<String, Tensor>,
}

impl Checkpoint {
    /// Deep-copy all variables of `varmap`.
    pub fn capture(varmap: &VarMap, epoch: usize) -> anyhow::Result<Self> {
        let data = varmap
            .data()
            .lock()
            .map_err(|e| anyhow::anyhow!("varmap lock poisoned: {e}"))?;
        let mut tensors = HashMap::with_capacity(data.len());
        for (name, var) in data.iter() {
            tensors.insert(name.clone(), var.as_tensor().copy()?);
        }
        Ok(Self { epoch, tensors })
    }

    /// Write the snapshot back into `varmap`. Every live variable must have
    /// a counterpart of the same shape.
    pub fn restore(&self, varmap: &VarMap) -> anyhow::Result<()> {
        let data = varmap
            .data()
            .lock()
            .map_err(|e| anyhow::anyhow!("varmap lock poisoned: {e}"))?;
        for (name, var) in data.iter() {
            let saved = self
                .tensors
                .get(name)
                .with_context(|| format!("checkpoint has no tensor `{name}`"))?;
            var.set(saved)
                .with_context(|| format!("restore `{name}` from epoch {}", self.epoch))?;
        }
        Ok(())
    }

    /// Epoch the snapshot was taken at.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    /// Save as safetensors (same layout as `VarMap::save`).
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        candle_core::safetensors::save(&self.tensors, path)
            .with_context(|| format!("write checkpoint {}", path.display()))?;
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
