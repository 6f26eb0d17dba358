//! Seeded synthetic graphs for smoke runs and tests.
//!
//! A stochastic block model: nodes are assigned round-robin to classes, edges
//! are drawn independently with probability `p_in` inside a class and `p_out`
//! across classes. Features are sparse binary bag-of-words vectors whose
//! active entries concentrate in a per-class block, then row-normalised.
//! The split follows the Planetoid convention: a fixed number of training
//! nodes per class, then validation and test nodes from the remainder.

use candle_core::Device;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::config::SyntheticConfig;
use crate::data::GraphDataset;

/// Generate a dataset from `config`. Same config (and seed) → same graph.
pub fn generate_synthetic(config: &SyntheticConfig, device: &Device) -> anyhow::Result<GraphDataset> {
    let n = config.num_nodes;
    let c = config.num_classes;
    let f = config.num_features;
    if c < 2 {
        anyhow::bail!("synthetic graph needs at least 2 classes, got {c}");
    }
    if f < c {
        anyhow::bail!("num_features ({f}) must be at least num_classes ({c})");
    }
    for (name, p) in [
        ("p_in", config.p_in),
        ("p_out", config.p_out),
        ("feature_signal", config.feature_signal),
    ] {
        if !(0.0..=1.0).contains(&p) {
            anyhow::bail!("{name} must be a probability, got {p}");
        }
    }
    let needed = config.train_per_class * c + config.num_val + config.num_test;
    if needed > n {
        anyhow::bail!("split sizes need {needed} nodes but the graph has {n}");
    }

    let mut rng = StdRng::seed_from_u64(config.seed);

    let labels: Vec<u32> = (0..n).map(|i| (i % c) as u32).collect();

    // Features: class k owns the block [k·f/c, (k+1)·f/c).
    let block = f / c;
    let off_rate = config.feature_signal / 4.0;
    let mut features = vec![0f32; n * f];
    for (i, &y) in labels.iter().enumerate() {
        let lo = y as usize * block;
        let hi = lo + block;
        let row = &mut features[i * f..(i + 1) * f];
        for (j, v) in row.iter_mut().enumerate() {
            let p = if (lo..hi).contains(&j) {
                config.feature_signal
            } else {
                off_rate
            };
            if rng.gen_bool(p) {
                *v = 1.0;
            }
        }
        let sum: f32 = row.iter().sum();
        if sum > 0.0 {
            row.iter_mut().for_each(|v| *v /= sum);
        }
    }

    // Undirected edges stored in both directions.
    let mut edges = Vec::new();
    for i in 0..n {
        for j in (i + 1)..n {
            let p = if labels[i] == labels[j] {
                config.p_in
            } else {
                config.p_out
            };
            if rng.gen_bool(p) {
                edges.push((i as u32, j as u32));
                edges.push((j as u32, i as u32));
            }
        }
    }

    // Planetoid-style split over a seeded permutation.
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut rng);
    let mut train = vec![false; n];
    let mut val = vec![false; n];
    let mut test = vec![false; n];
    let mut per_class = vec![0usize; c];
    let mut rest = Vec::with_capacity(n);
    for &i in &order {
        let y = labels[i] as usize;
        if per_class[y] < config.train_per_class {
            per_class[y] += 1;
            train[i] = true;
        } else {
            rest.push(i);
        }
    }
    for &i in rest.iter().take(config.num_val) {
        val[i] = true;
    }
    for &i in rest.iter().skip(config.num_val).take(config.num_test) {
        test[i] = true;
    }

    GraphDataset::from_parts(features, f, &edges, labels, c, train, val, test, device)
}

// ── Tests ───────────────────────────────────────────────────────────────────
