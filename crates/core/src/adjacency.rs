//! Symmetrically normalised adjacency `Â = D^{-1/2} (A + I) D^{-1/2}`.
//!
//! Stored sparsely as `(src, dst, weight)` triples so propagation is a
//! gather on sources followed by a scatter-add on targets. Both ops are
//! differentiable in candle, so gradients flow back into `H`.

use candle_core::{Result, Tensor};

/// Edge list with GCN normalisation weights, self loops included.
#[derive(Debug, Clone)]
pub struct NormalizedAdjacency {
    src: Tensor,
    dst: Tensor,
    /// `(E', 1)` so it broadcasts over feature columns.
    weight: Tensor,
    num_nodes: usize,
}

impl NormalizedAdjacency {
    /// Build from a `(2, E)` u32 edge index over `num_nodes` nodes.
    ///
    /// Existing self loops are dropped and exactly one is added per node.
    /// Degree is counted at the target node, matching message flow from
    /// source to target.
    pub fn new(edge_index: &Tensor, num_nodes: usize) -> Result<Self> {
        let ei = edge_index.to_vec2::<u32>()?;
        let (sources, targets) = match ei.as_slice() {
            [s, t] => (s, t),
            _ => candle_core::bail!("edge_index must have 2 rows, got {}", ei.len()),
        };

        let mut src = Vec::with_capacity(sources.len() + num_nodes);
        let mut dst = Vec::with_capacity(targets.len() + num_nodes);
        for (&s, &t) in sources.iter().zip(targets) {
            if s as usize >= num_nodes || t as usize >= num_nodes {
                candle_core::bail!("edge ({s}, {t}) out of range for {num_nodes} nodes");
            }
            if s != t {
                src.push(s);
                dst.push(t);
            }
        }
        for i in 0..num_nodes as u32 {
            src.push(i);
            dst.push(i);
        }

        let mut degree = vec![0f32; num_nodes];
        for &t in &dst {
            degree[t as usize] += 1.0;
        }
        let inv_sqrt: Vec<f32> = degree
            .iter()
            .map(|&d| if d > 0.0 { d.powf(-0.5) } else { 0.0 })
            .collect();
        let weight: Vec<f32> = src
            .iter()
            .zip(&dst)
            .map(|(&s, &t)| inv_sqrt[s as usize] * inv_sqrt[t as usize])
            .collect();

        let device = edge_index.device();
        let e = src.len();
        Ok(Self {
            src: Tensor::from_vec(src, e, device)?,
            dst: Tensor::from_vec(dst, e, device)?,
            weight: Tensor::from_vec(weight, (e, 1), device)?,
            num_nodes,
        })
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Number of stored entries, self loops included.
    pub fn num_entries(&self) -> usize {
        self.src.dims()[0]
    }

    /// `Â · h` for `h` of shape `(N, D)`.
    pub fn propagate(&self, h: &Tensor) -> Result<Tensor> {
        let messages = h.index_select(&self.src, 0)?.broadcast_mul(&self.weight)?;
        h.zeros_like()?.index_add(&self.dst, &messages, 0)
    }

    /// Host copy of the `(src, dst, weight)` triples.
    pub fn entries(&self) -> Result<Vec<(u32, u32, f32)>> {
        let src = self.src.to_vec1::<u32>()?;
        let dst = self.dst.to_vec1::<u32>()?;
        let weight = self.weight.flatten_all()?.to_vec1::<f32>()?;
        Ok(src
            .into_iter()
            .zip(dst)
            .zip(weight)
            .map(|((s, t), w)| (s, t, w))
            .collect())
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn edge_index(edges: &[(u32, u32)]) -> Tensor {
        let (s, t): (Vec<u32>, Vec<u32>) = edges.iter().copied().unzip();
        let e = s.len();
        Tensor::from_vec([s, t].concat(), (2, e), &Device::Cpu).unwrap()
    }

    #[test]
    fn path_graph_weights() {
        // 0 - 1 - 2 with self loops: degrees [2, 3, 2].
        let ei = edge_index(&[(0, 1), (1, 0), (1, 2), (2, 1)]);
        let adj = NormalizedAdjacency::new(&ei, 3).unwrap();
        assert_eq!(adj.num_entries(), 7);

        let entries = adj.entries().unwrap();
        let w = |s: u32, t: u32| {
            entries
                .iter()
                .find(|(a, b, _)| *a == s && *b == t)
                .map(|e| e.2)
                .unwrap()
        };
        assert!((w(0, 0) - 0.5).abs() < 1e-6);
        assert!((w(1, 1) - 1.0 / 3.0).abs() < 1e-6);
        assert!((w(0, 1) - 1.0 / 6f32.sqrt()).abs() < 1e-6);
        assert!((w(2, 1) - 1.0 / 6f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn existing_self_loops_are_not_doubled() {
        let ei = edge_index(&[(0, 0), (0, 1), (1, 0), (1, 1)]);
        let adj = NormalizedAdjacency::new(&ei, 2).unwrap();
        assert_eq!(adj.num_entries(), 4);
        for (_, _, w) in adj.entries().unwrap() {
            assert!((w - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn propagate_sums_weighted_neighbours() {
        let ei = edge_index(&[(0, 1), (1, 0), (1, 2), (2, 1)]);
        let adj = NormalizedAdjacency::new(&ei, 3).unwrap();
        let h = Tensor::new(&[[1f32, 0.], [0., 1.], [2., 2.]], &Device::Cpu).unwrap();
        let out = adj.propagate(&h).unwrap().to_vec2::<f32>().unwrap();

        let c = 1.0 / 6f32.sqrt();
        // node 0: 0.5·h0 + c·h1
        assert!((out[0][0] - 0.5).abs() < 1e-5);
        assert!((out[0][1] - c).abs() < 1e-5);
        // node 1: c·h0 + h1/3 + c·h2
        assert!((out[1][0] - (c + 2.0 * c)).abs() < 1e-5);
        assert!((out[1][1] - (1.0 / 3.0 + 2.0 * c)).abs() < 1e-5);
        // node 2: c·h1 + 0.5·h2
        assert!((out[2][0] - 1.0).abs() < 1e-5);
        assert!((out[2][1] - (c + 1.0)).abs() < 1e-5);
    }

    #[test]
    fn out_of_range_endpoint_is_an_error() {
        let ei = edge_index(&[(0, 1), (1, 3)]);
        let err = NormalizedAdjacency::new(&ei, 3).unwrap_err();
        assert!(err.to_string().contains("(1, 3)"), "{err}");
    }

    #[test]
    fn isolated_nodes_keep_their_own_features() {
        let ei = edge_index(&[]);
        let adj = NormalizedAdjacency::new(&ei, 2).unwrap();
        let h = Tensor::new(&[[3f32], [4.]], &Device::Cpu).unwrap();
        let out = adj.propagate(&h).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(out, vec![vec![3.0], vec![4.0]]);
    }
}
