//! Tree ensembles (random forest and extremely randomized trees) whose
//! uncertainty is given by the spread of the trees.
use crate::errors::Result;
use crate::traits::{check_nx, check_training, Surrogate};
use crate::tree::{MaxFeatures, RegressionTree, Splitter, TreeParams};
use crate::utils::Workers;
use log::debug;
use ndarray::{Array1, ArrayView1, ArrayView2, Zip};
use ndarray_rand::rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Default number of trees
pub const FOREST_N_TREES: usize = 100;

/// Lower bound of the variance of a leaf
const MIN_VARIANCE: f64 = 0.;

/// Forest hyperparameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub(crate) n_trees: usize,
    pub(crate) bootstrap: bool,
    pub(crate) tree: TreeParams,
    pub(crate) workers: Workers,
    pub(crate) seed: u64,
}

impl ForestParams {
    /// Random forest: bootstrap samples, one random feature per split
    pub fn random_forest() -> Self {
        ForestParams {
            n_trees: FOREST_N_TREES,
            bootstrap: true,
            tree: TreeParams::default().max_features(MaxFeatures::Count(1)),
            workers: Workers::default(),
            seed: 0,
        }
    }

    /// Extremely randomized trees: whole training set, random thresholds,
    /// at least 3 samples per leaf
    pub fn extra_trees() -> Self {
        ForestParams {
            n_trees: FOREST_N_TREES,
            bootstrap: false,
            tree: TreeParams::default()
                .splitter(Splitter::Random)
                .min_samples_leaf(3),
            workers: Workers::default(),
            seed: 0,
        }
    }

    /// Set the number of trees
    pub fn n_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees.max(1);
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

    /// Set the seed from which tree seeds are drawn
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the hyperparameters of the trees
    pub fn tree_params(mut self, tree: TreeParams) -> Self {
        self.tree = tree;
        self
    }

    /// Fit the forest, trees are grown in parallel with their own seed
    pub fn fit(&self, x: &ArrayView2<f64>, y: &ArrayView1<f64>) -> Result<Forest> {
        check_training(x, y)?;
        let now = Instant::now();
        let mut rng = Xoshiro256Plus::seed_from_u64(self.seed);
        let seeds: Vec<u64> = (0..self.n_trees).map(|_| rng.gen()).collect();
        let n = x.nrows();
        let trees = self.workers.install(|| {
            seeds
                .par_iter()
                .map(|seed| {
                    let mut rng = Xoshiro256Plus::seed_from_u64(*seed);
                    let samples = if self.bootstrap {
                        (0..n).map(|_| rng.gen_range(0..n)).collect()
                    } else {
                        (0..n).collect()
                    };
                    self.tree.fit(x, y, samples, &mut rng)
                })
                .collect::<Vec<_>>()
        })?;
        debug!(
            "Forest of {} trees fitted on {} points in {:?}",
            trees.len(),
            n,
            now.elapsed()
        );
        Ok(Forest {
            trees,
            bootstrap: self.bootstrap,
            nx: x.ncols(),
            workers: self.workers.clone(),
        })
    }
}

/// A fitted tree ensemble
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Forest {
    trees: Vec<RegressionTree>,
    bootstrap: bool,
    nx: usize,
    workers: Workers,
}

impl Forest {
    /// Number of trees
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn predict_valstd_one(&self, x: &ArrayView1<f64>) -> (f64, f64) {
        let n = self.trees.len() as f64;
        let (sum, sum_sq) = self.trees.iter().fold((0., 0.), |acc, tree| {
            let (value, variance) = tree.predict_leaf(x);
            (acc.0 + value, acc.1 + variance.max(MIN_VARIANCE) + value * value)
        });
        let mean = sum / n;
        // law of total variance over the trees
        let var = (sum_sq / n - mean * mean).max(0.);
        (mean, var.sqrt())
    }
}

impl fmt::Display for Forest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = if self.bootstrap { "RF" } else { "ET" };
        write!(f, "{kind}(n_trees={})", self.trees.len())
    }
}

impl Surrogate for Forest {
    fn nx(&self) -> usize {
        self.nx
    }

    fn predict_valstd(&self, x: &ArrayView2<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
        check_nx(self.nx, x)?;
        let mut mean = Array1::zeros(x.nrows());
        let mut std = Array1::zeros(x.nrows());
        self.workers.install(|| {
            Zip::from(&mut mean)
                .and(&mut std)
                .and(x.rows())
                .par_for_each(|m, s, row| (*m, *s) = self.predict_valstd_one(&row))
        })?;
        Ok((mean, std))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;

    fn data() -> (Array2<f64>, Array1<f64>) {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let x = Array2::random_using((60, 2), Uniform::new(0f64, 1.), &mut rng);
        let y = x.map_axis(ndarray::Axis(1), |r| (r[0] - 0.3).powi(2) + r[1]);
        (x, y)
    }

    #[test]
    fn test_forest_deterministic_per_seed() {
        let (x, y) = data();
        let params = ForestParams::random_forest().n_trees(20).seed(3);
        let f1 = params.fit(&x.view(), &y.view()).unwrap();
        let f2 = params.clone().n_jobs(-1).fit(&x.view(), &y.view()).unwrap();
        let xt = Array2::from_shape_vec((2, 2), vec![0.1, 0.2, 0.8, 0.9]).unwrap();
        let (m1, s1) = f1.predict_valstd(&xt.view()).unwrap();
        let (m2, s2) = f2.predict_valstd(&xt.view()).unwrap();
        assert_eq!(m1, m2);
        assert_eq!(s1, s2);
        assert!(s1.iter().all(|v| *v >= 0.));
    }

    #[test]
    fn test_extra_trees_fit_training_data() {
        let (x, y) = data();
        let forest = ForestParams::extra_trees()
            .n_trees(30)
            .fit(&x.view(), &y.view())
            .unwrap();
        assert_eq!(forest.n_trees(), 30);
        assert_eq!(forest.to_string(), "ET(n_trees=30)");
        let (mean, _) = forest.predict_valstd(&x.view()).unwrap();
        let mse = (&mean - &y).mapv(|v| v * v).mean().unwrap();
        assert!(mse < 0.02, "mse = {mse}");
    }

    #[test]
    fn test_constant_target_has_zero_std() {
        let (x, _) = data();
        let y = Array1::from_elem(x.nrows(), 2.5);
        let forest = ForestParams::random_forest()
            .n_trees(10)
            .fit(&x.view(), &y.view())
            .unwrap();
        let (mean, std) = forest.predict_valstd(&x.slice(ndarray::s![..5, ..])).unwrap();
        mean.iter().for_each(|m| assert_abs_diff_eq!(*m, 2.5, epsilon = 1e-9));
        std.iter().for_each(|s| assert_abs_diff_eq!(*s, 0., epsilon = 1e-6));
    }

    #[test]
    fn test_predictions_run_on_the_fitting_pool() {
        let (x, y) = data();
        let workers = Workers::new(2);
        let forest = ForestParams::random_forest()
            .n_trees(5)
            .workers(workers.clone())
            .fit(&x.view(), &y.view())
            .unwrap();
        assert!(forest.workers.shares_pool(&workers));
        assert!(workers.is_built());
        let (mean, _) = forest.predict_valstd(&x.view()).unwrap();
        assert_eq!(mean.len(), x.nrows());
    }

    #[test]
    fn test_wrong_input_dimension() {
        let (x, y) = data();
        let forest = ForestParams::random_forest()
            .n_trees(5)
            .fit(&x.view(), &y.view())
            .unwrap();
        assert!(forest.predict(&Array2::zeros((3, 4)).view()).is_err());
    }
}
