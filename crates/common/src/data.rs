//! Graph dataset: features, edges, labels, and the three split masks.
//!
//! * **[`GraphDataset`]** — validated, immutable container of candle tensors.
//! * **[`Split`]** — train / validation / test selector.
//! * **[`build_dataset`]** — resolve a [`DatasetConfig`] into a dataset.
//!
//! Masks are stored as `u8` 0/1 tensors. Candle has no boolean indexing, so
//! [`GraphDataset::mask_index`] converts a mask into row indices once and
//! caches them for `index_select`.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use anyhow::Context;
use candle_core::{DType, Device, Tensor};
use serde::{Deserialize, Serialize};

use crate::config::DatasetConfig;
use crate::synthetic::generate_synthetic;

// ── Split ───────────────────────────────────────────────────────────────────

/// Which mask an evaluation runs over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    /// Tensor name used in safetensors files.
    pub fn mask_name(self) -> &'static str {
        match self {
            Self::Train => "train_mask",
            Self::Val => "val_mask",
            Self::Test => "test_mask",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Train => "train",
            Self::Val => "val",
            Self::Test => "test",
        };
        f.pad(s)
    }
}

// ── GraphDataset ────────────────────────────────────────────────────────────

/// Node-classification dataset held on a single device.
#[derive(Debug, Clone)]
pub struct GraphDataset {
    /// `(N, F)` f32.
    pub features: Tensor,
    /// `(2, E)` u32; row 0 = source, row 1 = target.
    pub edge_index: Tensor,
    /// `(N,)` u32.
    pub labels: Tensor,
    pub train_mask: Tensor,
    pub val_mask: Tensor,
    pub test_mask: Tensor,
    pub num_features: usize,
    pub num_classes: usize,
    index: HashMap<Split, Tensor>,
}

impl GraphDataset {
    /// Build from raw host vectors and validate every invariant.
    ///
    /// * `features`: row-major `num_nodes × num_features`.
    /// * `edges`: directed `(source, target)` pairs.
    /// * masks: one flag per node; must be pairwise disjoint and non-empty.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        features: Vec<f32>,
        num_features: usize,
        edges: &[(u32, u32)],
        labels: Vec<u32>,
        num_classes: usize,
        train_mask: Vec<bool>,
        val_mask: Vec<bool>,
        test_mask: Vec<bool>,
        device: &Device,
    ) -> anyhow::Result<Self> {
        let n = labels.len();
        if num_features == 0 || features.len() != n * num_features {
            anyhow::bail!(
                "features hold {} values, expected {n} nodes × {num_features} features",
                features.len()
            );
        }
        let features = Tensor::from_vec(features, (n, num_features), device)?;
        let (src, dst): (Vec<u32>, Vec<u32>) = edges.iter().copied().unzip();
        let e = src.len();
        let edge_index = Tensor::from_vec([src, dst].concat(), (2, e), device)?;
        let labels = Tensor::from_vec(labels, n, device)?;
        let to_mask = |m: Vec<bool>| -> candle_core::Result<Tensor> {
            let len = m.len();
            Tensor::from_vec(m.into_iter().map(u8::from).collect::<Vec<_>>(), len, device)
        };
        Self::new(
            features,
            edge_index,
            labels,
            to_mask(train_mask)?,
            to_mask(val_mask)?,
            to_mask(test_mask)?,
            num_classes,
        )
    }

    /// Wrap existing tensors, checking shapes, index ranges, and mask
    /// disjointness.
    pub fn new(
        features: Tensor,
        edge_index: Tensor,
        labels: Tensor,
        train_mask: Tensor,
        val_mask: Tensor,
        test_mask: Tensor,
        num_classes: usize,
    ) -> anyhow::Result<Self> {
        let (n, num_features) = features.dims2().context("features must be (N, F)")?;
        let features = features.to_dtype(DType::F32)?;

        let labels = labels.to_dtype(DType::U32)?;
        if labels.dims1()? != n {
            anyhow::bail!("labels have {} entries, expected {n}", labels.dims1()?);
        }
        if let Some(&bad) = labels.to_vec1::<u32>()?.iter().find(|&&y| y as usize >= num_classes) {
            anyhow::bail!("label {bad} out of range for {num_classes} classes");
        }

        let edge_index = edge_index.to_dtype(DType::U32)?;
        let (rows, _) = edge_index.dims2().context("edge_index must be (2, E)")?;
        if rows != 2 {
            anyhow::bail!("edge_index must have 2 rows, got {rows}");
        }
        for row in edge_index.to_vec2::<u32>()? {
            if let Some(&bad) = row.iter().find(|&&v| v as usize >= n) {
                anyhow::bail!("edge endpoint {bad} out of range for {n} nodes");
            }
        }

        let (train_mask, train_flags, train_index) = check_mask(Split::Train, train_mask, n)?;
        let (val_mask, val_flags, val_index) = check_mask(Split::Val, val_mask, n)?;
        let (test_mask, test_flags, test_index) = check_mask(Split::Test, test_mask, n)?;
        for i in 0..n {
            let hits = [&train_flags, &val_flags, &test_flags]
                .iter()
                .filter(|m| m[i] != 0)
                .count();
            if hits > 1 {
                anyhow::bail!("node {i} belongs to more than one split");
            }
        }
        let index = HashMap::from([
            (Split::Train, train_index),
            (Split::Val, val_index),
            (Split::Test, test_index),
        ]);

        Ok(Self {
            features,
            edge_index,
            labels,
            train_mask,
            val_mask,
            test_mask,
            num_features,
            num_classes,
            index,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.labels.dims()[0]
    }

    pub fn num_edges(&self) -> usize {
        self.edge_index.dims()[1]
    }

    pub fn mask(&self, split: Split) -> &Tensor {
        match split {
            Split::Train => &self.train_mask,
            Split::Val => &self.val_mask,
            Split::Test => &self.test_mask,
        }
    }

    /// Row indices (u32) selected by the split's mask.
    pub fn mask_index(&self, split: Split) -> &Tensor {
        &self.index[&split]
    }

    /// Number of nodes selected by the split's mask.
    pub fn split_len(&self, split: Split) -> usize {
        self.index[&split].dims()[0]
    }

    /// Write all tensors to a safetensors file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let num_classes = Tensor::new(&[self.num_classes as u32], &Device::Cpu)?;
        let tensors: HashMap<String, Tensor> = [
            ("features", self.features.clone()),
            ("edge_index", self.edge_index.clone()),
            ("labels", self.labels.clone()),
            (Split::Train.mask_name(), self.train_mask.clone()),
            (Split::Val.mask_name(), self.val_mask.clone()),
            (Split::Test.mask_name(), self.test_mask.clone()),
            ("num_classes", num_classes),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        candle_core::safetensors::save(&tensors, path)
            .with_context(|| format!("write dataset {}", path.display()))?;
        Ok(())
    }

    /// Load a dataset written by [`save`](Self::save).
    pub fn load(path: &Path, device: &Device) -> anyhow::Result<Self> {
        let mut tensors = candle_core::safetensors::load(path, device)
            .with_context(|| format!("read dataset {}", path.display()))?;
        let mut take = |name: &str| {
            tensors
                .remove(name)
                .with_context(|| format!("{} is missing tensor `{name}`", path.display()))
        };
        let features = take("features")?;
        let edge_index = take("edge_index")?;
        let labels = take("labels")?;
        let train_mask = take(Split::Train.mask_name())?;
        let val_mask = take(Split::Val.mask_name())?;
        let test_mask = take(Split::Test.mask_name())?;
        let num_classes = take("num_classes")?.to_dtype(DType::U32)?.to_vec1::<u32>()?;
        let num_classes = *num_classes
            .first()
            .context("num_classes tensor is empty")? as usize;
        Self::new(
            features,
            edge_index,
            labels,
            train_mask,
            val_mask,
            test_mask,
            num_classes,
        )
    }
}

/// Normalise a mask to u8, check its length, and collect its row indices.
fn check_mask(split: Split, mask: Tensor, n: usize) -> anyhow::Result<(Tensor, Vec<u8>, Tensor)> {
    let mask = mask.to_dtype(DType::U8)?;
    let flags = mask.to_vec1::<u8>()?;
    if flags.len() != n {
        anyhow::bail!("{split} mask has {} entries, expected {n}", flags.len());
    }
    let rows: Vec<u32> = flags
        .iter()
        .enumerate()
        .filter(|(_, &v)| v != 0)
        .map(|(i, _)| i as u32)
        .collect();
    if rows.is_empty() {
        anyhow::bail!("{split} mask selects no nodes");
    }
    let len = rows.len();
    let index = Tensor::from_vec(rows, len, mask.device())?;
    Ok((mask, flags, index))
}

/// Resolve a dataset section of the task config.
pub fn build_dataset(config: &DatasetConfig, device: &Device) -> anyhow::Result<GraphDataset> {
    let dataset = match config {
        DatasetConfig::Synthetic(syn) => generate_synthetic(syn, device)?,
        DatasetConfig::Safetensors { path } => GraphDataset::load(path, device)?,
    };
    tracing::info!(
        nodes = dataset.num_nodes(),
        edges = dataset.num_edges(),
        features = dataset.num_features,
        classes = dataset.num_classes,
        train = dataset.split_len(Split::Train),
        val = dataset.split_len(Split::Val),
        test = dataset.split_len(Split::Test),
        "Dataset ready"
    );
    Ok(dataset)
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn path_graph(masks: [Vec<bool>; 3]) -> anyhow::Result<GraphDataset> {
        let [train, val, test] = masks;
        GraphDataset::from_parts(
            vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 0.0],
            2,
            &[(0, 1), (1, 0), (1, 2), (2, 1), (2, 3), (3, 2)],
            vec![0, 1, 1, 0],
            2,
            train,
            val,
            test,
            &Device::Cpu,
        )
    }

    fn default_masks() -> [Vec<bool>; 3] {
        [
            vec![true, true, false, false],
            vec![false, false, true, false],
            vec![false, false, false, true],
        ]
    }

    #[test]
    fn mask_index_lists_selected_rows() {
        let ds = path_graph(default_masks()).unwrap();
        assert_eq!(ds.num_nodes(), 4);
        assert_eq!(ds.num_edges(), 6);
        assert_eq!(ds.mask_index(Split::Train).to_vec1::<u32>().unwrap(), vec![0, 1]);
        assert_eq!(ds.mask_index(Split::Val).to_vec1::<u32>().unwrap(), vec![2]);
        assert_eq!(ds.split_len(Split::Test), 1);
        assert_eq!(ds.mask(Split::Val).to_vec1::<u8>().unwrap(), vec![0, 0, 1, 0]);
    }

    #[test]
    fn overlapping_masks_are_rejected() {
        let err = path_graph([
            vec![true, true, false, false],
            vec![false, true, true, false],
            vec![false, false, false, true],
        ])
        .unwrap_err();
        assert!(err.to_string().contains("more than one split"), "{err}");
    }

    #[test]
    fn empty_split_is_rejected() {
        let err = path_graph([
            vec![true, true, false, false],
            vec![false; 4],
            vec![false, false, false, true],
        ])
        .unwrap_err();
        assert!(err.to_string().contains("val mask selects no nodes"), "{err}");
    }

    #[test]
    fn out_of_range_edge_is_rejected() {
        let [train, val, test] = default_masks();
        let err = GraphDataset::from_parts(
            vec![0.0; 8],
            2,
            &[(0, 9)],
            vec![0, 1, 1, 0],
            2,
            train,
            val,
            test,
            &Device::Cpu,
        )
        .unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");
    }

    #[test]
    fn label_out_of_range_is_rejected() {
        let [train, val, test] = default_masks();
        let err = GraphDataset::from_parts(
            vec![0.0; 8],
            2,
            &[],
            vec![0, 1, 2, 0],
            2,
            train,
            val,
            test,
            &Device::Cpu,
        )
        .unwrap_err();
        assert!(err.to_string().contains("label 2"), "{err}");
    }

    #[test]
    fn save_and_load_preserve_graph() {
        let ds = path_graph(default_masks()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.safetensors");
        ds.save(&path).unwrap();

        let loaded = GraphDataset::load(&path, &Device::Cpu).unwrap();
        assert_eq!(loaded.num_classes, 2);
        assert_eq!(loaded.num_features, 2);
        assert_eq!(
            loaded.edge_index.to_vec2::<u32>().unwrap(),
            ds.edge_index.to_vec2::<u32>().unwrap()
        );
        assert_eq!(loaded.labels.to_vec1::<u32>().unwrap(), vec![0, 1, 1, 0]);
        assert_eq!(
            loaded.mask_index(Split::Test).to_vec1::<u32>().unwrap(),
            vec![3]
        );
    }
}
