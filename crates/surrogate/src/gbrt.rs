//! Gradient boosted regression trees fitted on the quantile loss.
//!
//! Three boosting models are fitted at the quantiles 0.16, 0.5 and 0.84: the
//! median is used as the prediction and half the inter-quantile range as the
//! standard deviation.
use crate::errors::Result;
use crate::traits::{check_nx, check_training, Surrogate};
use crate::tree::{RegressionTree, TreeParams};
use crate::utils::{quantile, Workers};
use log::debug;
use ndarray::{Array1, ArrayView1, ArrayView2, Zip};
use ndarray_rand::rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Default number of boosting stages
pub const GBRT_N_ESTIMATORS: usize = 30;
/// Quantiles giving (lower, median, upper) predictions
pub const GBRT_QUANTILES: [f64; 3] = [0.16, 0.5, 0.84];

/// Quantile boosting hyperparameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GbrtParams {
    pub(crate) n_estimators: usize,
    pub(crate) learning_rate: f64,
    pub(crate) tree: TreeParams,
    pub(crate) quantiles: [f64; 3],
    pub(crate) workers: Workers,
    pub(crate) seed: u64,
}

impl Default for GbrtParams {
    fn default() -> Self {
        GbrtParams {
            n_estimators: GBRT_N_ESTIMATORS,
            learning_rate: 0.1,
            tree: TreeParams::default().max_depth(Some(3)),
            quantiles: GBRT_QUANTILES,
            workers: Workers::default(),
            seed: 0,
        }
    }
}

impl GbrtParams {
    /// Set the number of boosting stages
    pub fn n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    /// Set the shrinkage of each stage
    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the number of threads used for fitting (-1 means all cores)
    pub fn n_jobs(mut self, n_jobs: i32) -> Self {
        self.workers = Workers::new(n_jobs);
        self
    }

    /// Run on the given workers (their pool is shared)
    pub fn workers(mut self, workers: Workers) -> Self {
        self.workers = workers;
        self
    }

    /// Set the seed from which model seeds are drawn
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fit the three quantile models (in parallel)
    pub fn fit(&self, x: &ArrayView2<f64>, y: &ArrayView1<f64>) -> Result<Gbrt> {
        check_training(x, y)?;
        let mut rng = Xoshiro256Plus::seed_from_u64(self.seed);
        let seeds: Vec<u64> = (0..self.quantiles.len()).map(|_| rng.gen()).collect();
        let models = self.workers.install(|| {
            self.quantiles[..]
                .par_iter()
                .zip(seeds.par_iter())
                .map(|(alpha, seed)| self.fit_quantile(x, y, *alpha, *seed))
                .collect::<Vec<_>>()
        })?;
        Ok(Gbrt {
            models,
            nx: x.ncols(),
        })
    }

    fn fit_quantile(
        &self,
        x: &ArrayView2<f64>,
        y: &ArrayView1<f64>,
        alpha: f64,
        seed: u64,
    ) -> QuantileBoosting {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        let n = x.nrows();
        let init = quantile(&y.to_vec(), alpha);
        let mut pred = Array1::from_elem(n, init);
        let mut trees = Vec::with_capacity(self.n_estimators);
        for _ in 0..self.n_estimators {
            let residuals = y - &pred;
            // negative gradient of the quantile (pinball) loss
            let neg_grad = residuals.mapv(|r| if r > 0. { alpha } else { alpha - 1. });
            let mut tree = self
                .tree
                .fit(x, &neg_grad.view(), (0..n).collect(), &mut rng);
            let leaves: Vec<usize> = x.rows().into_iter().map(|r| tree.leaf_index(&r)).collect();
            let mut by_leaf: HashMap<usize, Vec<f64>> = HashMap::new();
            for (leaf, r) in leaves.iter().zip(residuals.iter()) {
                by_leaf.entry(*leaf).or_default().push(*r);
            }
            for (leaf, res) in by_leaf.iter() {
                tree.set_leaf_value(*leaf, quantile(res, alpha));
            }
            Zip::from(&mut pred)
                .and(x.rows())
                .for_each(|p, row| *p += self.learning_rate * tree.predict_one(&row));
            trees.push(tree);
        }
        debug!("Quantile {alpha} boosting: {} stages", trees.len());
        QuantileBoosting {
            init,
            learning_rate: self.learning_rate,
            trees,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct QuantileBoosting {
    init: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl QuantileBoosting {
    fn predict_one(&self, x: &ArrayView1<f64>) -> f64 {
        self.init
            + self.learning_rate * self.trees.iter().map(|t| t.predict_one(x)).sum::<f64>()
    }
}

/// A fitted quantile boosting model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Gbrt {
    models: Vec<QuantileBoosting>,
    nx: usize,
}

impl Gbrt {
    /// Lower, median and upper quantile predictions at `x` points
    pub fn predict_quantiles(&self, x: &ArrayView2<f64>) -> Result<Vec<Array1<f64>>> {
        check_nx(self.nx, x)?;
        Ok(self
            .models
            .iter()
            .map(|m| x.rows().into_iter().map(|r| m.predict_one(&r)).collect())
            .collect())
    }
}

impl fmt::Display for Gbrt {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let n = self.models.first().map_or(0, |m| m.trees.len());
        write!(f, "GBRT(n_estimators={n})")
    }
}

impl Surrogate for Gbrt {
    fn nx(&self) -> usize {
        self.nx
    }

    fn predict_valstd(&self, x: &ArrayView2<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
        let q = self.predict_quantiles(x)?;
        let std = (&q[2] - &q[0]).mapv(|v| v.abs() / 2.);
        Ok((q[1].to_owned(), std))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn test_gbrt_quantiles_ordered() {
        let x = Array2::from_shape_fn((80, 1), |(i, _)| i as f64 / 79.);
        // deterministic pseudo noise
        let y = x
            .column(0)
            .iter()
            .enumerate()
            .map(|(i, v)| 3. * v + ((i * 37 % 11) as f64 / 11. - 0.5))
            .collect::<Array1<f64>>();
        let model = GbrtParams::default().fit(&x.view(), &y.view()).unwrap();
        let xt = Array2::from_shape_vec((3, 1), vec![0.2, 0.5, 0.8]).unwrap();
        let q = model.predict_quantiles(&xt.view()).unwrap();
        for i in 0..3 {
            assert!(q[0][i] < q[2][i]);
        }
        let (mean, std) = model.predict_valstd(&xt.view()).unwrap();
        assert!(std.iter().all(|s| *s > 0.));
        // median follows the trend
        assert!(mean[0] < mean[1] && mean[1] < mean[2]);
        assert_eq!(model.to_string(), "GBRT(n_estimators=30)");
    }
}
