//! Optimiser wrapper over candle's `AdamW` and `SGD`.
//!
//! candle only ships decoupled weight decay. Plain Adam and SGD fold L2 decay
//! into the gradients instead (`g += wd · θ`) before the update.

use candle_core::{backprop::GradStore, Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, SGD};

use nodeclf_common::OptimizerKind;

enum Inner {
    AdamW(AdamW),
    Sgd(SGD),
}

pub struct NodeOptimizer {
    inner: Inner,
    kind: OptimizerKind,
    vars: Vec<Var>,
    /// Coupled L2 coefficient added to gradients; 0 for `adamw`.
    l2: f64,
}

impl NodeOptimizer {
    pub fn new(
        kind: OptimizerKind,
        vars: Vec<Var>,
        lr: f64,
        weight_decay: f64,
    ) -> anyhow::Result<Self> {
        let (inner, l2) = match kind {
            OptimizerKind::Adam => {
                let params = ParamsAdamW {
                    lr,
                    weight_decay: 0.0,
                    ..Default::default()
                };
                (Inner::AdamW(AdamW::new(vars.clone(), params)?), weight_decay)
            }
            OptimizerKind::AdamW => {
                let params = ParamsAdamW {
                    lr,
                    weight_decay,
                    ..Default::default()
                };
                (Inner::AdamW(AdamW::new(vars.clone(), params)?), 0.0)
            }
            OptimizerKind::Sgd => (Inner::Sgd(SGD::new(vars.clone(), lr)?), weight_decay),
        };
        Ok(Self {
            inner,
            kind,
            vars,
            l2,
        })
    }

    /// Backpropagate `loss` and apply one update.
    pub fn backward_step(&mut self, loss: &Tensor) -> anyhow::Result<()> {
        let mut grads = loss.backward()?;
        if self.l2 > 0.0 {
            add_l2(&mut grads, &self.vars, self.l2)?;
        }
        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(grad_norm = grad_norm(&grads, &self.vars)?, "Gradients");
        }
        match &mut self.inner {
            Inner::AdamW(opt) => opt.step(&grads)?,
            Inner::Sgd(opt) => opt.step(&grads)?,
        }
        Ok(())
    }

    pub fn learning_rate(&self) -> f64 {
        match &self.inner {
            Inner::AdamW(opt) => opt.learning_rate(),
            Inner::Sgd(opt) => opt.learning_rate(),
        }
    }

    pub fn kind(&self) -> OptimizerKind {
        self.kind
    }
}

// ── Gradient utilities ──────────────────────────────────────────────────────

/// `g ← g + coef · θ` for every variable that received a gradient.
fn add_l2(grads: &mut GradStore, vars: &[Var], coef: f64) -> candle_core::Result<()> {
    for var in vars {
        if let Some(g) = grads.remove(var.as_tensor()) {
            let decayed = (g + var.as_tensor().affine(coef, 0.0)?)?;
            grads.insert(var.as_tensor(), decayed);
        }
    }
    Ok(())
}

/// Total L2 norm of gradients.
fn grad_norm(grads: &GradStore, vars: &[Var]) -> candle_core::Result<f64> {
    let mut total = 0.0f64;
    for var in vars {
        if let Some(g) = grads.get(var.as_tensor()) {
            total += g.sqr()?.sum_all()?.to_scalar::<f32>()? as f64;
        }
    }
    Ok(total.sqrt())
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};

    /// One step on `loss = sum(w)` from `w = 1`, so every gradient is 1.
    fn one_step(kind: OptimizerKind, lr: f64, wd: f64) -> f32 {
        let w = Var::ones(3, DType::F32, &Device::Cpu).unwrap();
        let mut opt = NodeOptimizer::new(kind, vec![w.clone()], lr, wd).unwrap();
        let loss = w.as_tensor().sum_all().unwrap();
        opt.backward_step(&loss).unwrap();
        let after = w.as_tensor().to_vec1::<f32>().unwrap();
        assert!(after.windows(2).all(|p| p[0] == p[1]));
        after[0]
    }

    #[test]
    fn sgd_folds_l2_into_gradient() {
        // 1 - 0.1 · (1 + 0.5 · 1)
        let w = one_step(OptimizerKind::Sgd, 0.1, 0.5);
        assert!((w - 0.85).abs() < 1e-6, "{w}");
    }

    #[test]
    fn adam_step_is_lr_regardless_of_l2() {
        // First Adam step moves each weight by lr · g / |g|.
        let w = one_step(OptimizerKind::Adam, 0.1, 0.5);
        assert!((w - 0.9).abs() < 1e-4, "{w}");
    }

    #[test]
    fn adamw_decays_weights_directly() {
        // (1 - 0.1 · 0.5) - 0.1
        let w = one_step(OptimizerKind::AdamW, 0.1, 0.5);
        assert!((w - 0.85).abs() < 1e-4, "{w}");
    }

    #[test]
    fn learning_rate_is_reported() {
        let w = Var::ones(1, DType::F32, &Device::Cpu).unwrap();
        let opt = NodeOptimizer::new(OptimizerKind::Sgd, vec![w], 0.05, 0.0).unwrap();
        assert_eq!(opt.learning_rate(), 0.05);
        assert_eq!(opt.kind(), OptimizerKind::Sgd);
    }

    #[test]
    fn vars_outside_the_graph_are_untouched() {
        let used = Var::ones(2, DType::F32, &Device::Cpu).unwrap();
        let unused = Var::ones(2, DType::F32, &Device::Cpu).unwrap();
        let mut opt = NodeOptimizer::new(
            OptimizerKind::Sgd,
            vec![used.clone(), unused.clone()],
            0.1,
            0.5,
        )
        .unwrap();
        let loss = used.as_tensor().sum_all().unwrap();
        opt.backward_step(&loss).unwrap();
        assert_eq!(unused.as_tensor().to_vec1::<f32>().unwrap(), vec![1.0, 1.0]);
    }
}
