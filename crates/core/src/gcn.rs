//! Graph convolution layer (Kipf & Welling): `H' = Â · (H W) + b`.

use candle_core::{Result, Tensor};
use candle_nn::{linear_no_bias, Init, Linear, Module, VarBuilder};

use crate::adjacency::NormalizedAdjacency;

/// One GCN layer. The linear transform runs before propagation so the
/// scatter works on the (usually narrower) output width.
pub struct GcnConv {
    lin: Linear,
    bias: Tensor,
}

impl GcnConv {
    /// `vb` should be scoped to the layer prefix (e.g. `vb.pp("conv0")`).
    pub fn new(in_dim: usize, out_dim: usize, vb: VarBuilder) -> Result<Self> {
        let lin = linear_no_bias(in_dim, out_dim, vb.pp("lin"))?;
        let bias = vb.get_with_hints(out_dim, "bias", Init::Const(0.))?;
        Ok(Self { lin, bias })
    }

    pub fn forward(&self, x: &Tensor, adj: &NormalizedAdjacency) -> Result<Tensor> {
        let h = self.lin.forward(x)?;
        adj.propagate(&h)?.broadcast_add(&self.bias)
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
