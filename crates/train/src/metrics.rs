//! Masked NLL loss and accuracy over a split.

use candle_core::{Tensor, D};
use candle_nn::loss;
use serde::Serialize;

use nodeclf_common::{GraphDataset, Split};

use crate::error::TrainError;

/// Accuracy and mean NLL over one split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EvalResult {
    pub accuracy: f64,
    pub loss: f64,
}

/// Mean NLL of `log_probs` rows picked by `index` against their labels.
pub fn masked_nll(
    log_probs: &Tensor,
    labels: &Tensor,
    index: &Tensor,
) -> candle_core::Result<Tensor> {
    let lp = log_probs.index_select(index, 0)?;
    let y = labels.index_select(index, 0)?;
    loss::nll(&lp, &y)
}

/// Count rows whose argmax equals the label. Returns `(correct, total)`.
pub fn correct_count(log_probs: &Tensor, labels: &Tensor) -> candle_core::Result<(usize, usize)> {
    let pred = log_probs.argmax(D::Minus1)?;
    let hits = pred.eq(labels)?.to_vec1::<u8>()?;
    let correct = hits.iter().filter(|&&h| h != 0).count();
    Ok((correct, hits.len()))
}

/// Fraction of rows whose argmax equals the label: exactly `m / k`.
pub fn accuracy(log_probs: &Tensor, labels: &Tensor) -> candle_core::Result<f64> {
    let (correct, total) = correct_count(log_probs, labels)?;
    if total == 0 {
        candle_core::bail!("accuracy over zero rows");
    }
    Ok(correct as f64 / total as f64)
}

/// Loss and accuracy of full-graph `log_probs` restricted to `split`.
pub fn evaluate_split(
    log_probs: &Tensor,
    dataset: &GraphDataset,
    split: Split,
) -> anyhow::Result<EvalResult> {
    if dataset.split_len(split) == 0 {
        return Err(TrainError::EmptySplit(split).into());
    }
    let index = dataset.mask_index(split);
    let lp = log_probs.index_select(index, 0)?;
    let y = dataset.labels.index_select(index, 0)?;
    let loss = loss::nll(&lp, &y)?.to_scalar::<f32>()? as f64;
    let accuracy = accuracy(&lp, &y)?;
    Ok(EvalResult { accuracy, loss })
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn log_probs(rows: &[[f32; 3]]) -> Tensor {
        let flat: Vec<f32> = rows.iter().flatten().map(|p| p.ln()).collect();
        Tensor::from_vec(flat, (rows.len(), 3), &Device::Cpu).unwrap()
    }

    fn toy_dataset() -> GraphDataset {
        // train = {0, 1, 2}, val = {3}, test = {4}
        GraphDataset::from_parts(
            vec![0.0; 10],
            2,
            &[],
            vec![0, 1, 2, 0, 1],
            3,
            vec![true, true, true, false, false],
            vec![false, false, false, true, false],
            vec![false, false, false, false, true],
            &Device::Cpu,
        )
        .unwrap()
    }

    #[test]
    fn accuracy_is_exact_fraction() {
        let lp = log_probs(&[
            [0.7, 0.2, 0.1],
            [0.1, 0.8, 0.1],
            [0.6, 0.3, 0.1],
            [0.2, 0.2, 0.6],
        ]);
        let y = Tensor::new(&[0u32, 1, 2, 2], &Device::Cpu).unwrap();
        // rows 0, 1, 3 correct
        assert_eq!(correct_count(&lp, &y).unwrap(), (3, 4));
        assert_eq!(accuracy(&lp, &y).unwrap(), 0.75);
    }

    #[test]
    fn masked_nll_uses_only_selected_rows() {
        let lp = log_probs(&[
            [0.5, 0.25, 0.25],
            [0.1, 0.8, 0.1],
            [0.01, 0.01, 0.98],
        ]);
        let y = Tensor::new(&[0u32, 1, 0], &Device::Cpu).unwrap();
        let idx = Tensor::new(&[0u32, 1], &Device::Cpu).unwrap();
        let got = masked_nll(&lp, &y, &idx)
            .unwrap()
            .to_scalar::<f32>()
            .unwrap();
        let want = -(0.5f32.ln() + 0.8f32.ln()) / 2.0;
        assert!((got - want).abs() < 1e-6, "{got} vs {want}");
    }

    #[test]
    fn evaluate_split_restricts_to_mask() {
        let ds = toy_dataset();
        let lp = log_probs(&[
            [0.7, 0.2, 0.1],
            [0.7, 0.2, 0.1],
            [0.1, 0.1, 0.8],
            [0.4, 0.5, 0.1],
            [0.2, 0.5, 0.3],
        ]);

        let train = evaluate_split(&lp, &ds, Split::Train).unwrap();
        // labels 0, 1, 2 → predictions 0, 0, 2
        assert!((train.accuracy - 2.0 / 3.0).abs() < 1e-12);
        let want = -(0.7f64.ln() + 0.2f64.ln() + 0.8f64.ln()) / 3.0;
        assert!((train.loss - want).abs() < 1e-5);

        let val = evaluate_split(&lp, &ds, Split::Val).unwrap();
        assert_eq!(val.accuracy, 0.0);

        let test = evaluate_split(&lp, &ds, Split::Test).unwrap();
        assert_eq!(test.accuracy, 1.0);
        assert!((test.loss - -(0.5f64.ln())).abs() < 1e-5);
    }
}
