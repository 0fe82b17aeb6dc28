use crate::errors::Result;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2};
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex};

/// A structure to store (n, nx) matrix data and its mean and standard deviation vectors.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct NormalizedData {
    /// normalized data
    pub data: Array2<f64>,
    /// mean vector computed from data
    pub mean: Array1<f64>,
    /// standard deviation vector computed from data
    pub std: Array1<f64>,
}

impl NormalizedData {
    pub fn new(x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> NormalizedData {
        let mean = x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(x.ncols()));
        let ddof = if x.nrows() > 1 { 1. } else { 0. };
        let mut std = x.std_axis(Axis(0), ddof);
        std.mapv_inplace(|v| if v == 0. { 1. } else { v });
        let data = (x - &mean) / &std;
        NormalizedData { data, mean, std }
    }
}

/// Rayon thread pool of `n_jobs` threads, -1 (or any value < 1) means all cores.
///
/// The pool is built on first use and shared by every clone, so a builder and
/// the models it trains run on the same threads.
#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub struct Workers {
    n_jobs: i32,
    pool: Arc<Mutex<Option<Arc<ThreadPool>>>>,
}

impl Workers {
    /// Workers of `n_jobs` threads
    pub fn new(n_jobs: i32) -> Self {
        Workers {
            n_jobs,
            pool: Arc::new(Mutex::new(None)),
        }
    }

    /// Requested number of threads
    pub fn n_jobs(&self) -> i32 {
        self.n_jobs
    }

    /// Number of threads of the pool
    pub fn n_threads(&self) -> usize {
        if self.n_jobs < 1 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.n_jobs as usize
        }
    }

    /// Whether the pool has been built
    pub fn is_built(&self) -> bool {
        self.pool.lock().map_or(false, |pool| pool.is_some())
    }

    fn pool(&self) -> Result<Arc<ThreadPool>> {
        let mut guard = self.pool.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }
        let pool = Arc::new(
            ThreadPoolBuilder::new()
                .num_threads(self.n_threads())
                .build()?,
        );
        *guard = Some(pool.clone());
        Ok(pool)
    }

    /// Run `op` within the pool
    pub fn install<OP, R>(&self, op: OP) -> Result<R>
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        Ok(self.pool()?.install(op))
    }

    /// Whether both share the same pool
    pub fn shares_pool(&self, other: &Workers) -> bool {
        Arc::ptr_eq(&self.pool, &other.pool)
    }
}

impl Default for Workers {
    fn default() -> Self {
        Workers::new(1)
    }
}

impl From<i32> for Workers {
    fn from(n_jobs: i32) -> Self {
        Workers::new(n_jobs)
    }
}

impl From<Workers> for i32 {
    fn from(workers: Workers) -> Self {
        workers.n_jobs
    }
}

impl PartialEq for Workers {
    fn eq(&self, other: &Self) -> bool {
        self.n_jobs == other.n_jobs
    }
}

impl fmt::Debug for Workers {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Workers")
            .field("n_jobs", &self.n_jobs)
            .field("built", &self.is_built())
            .finish()
    }
}

/// Quantile of `values` at level `alpha` in \[0, 1\] with linear interpolation
/// between closest ranks. Returns 0 for an empty slice.
pub(crate) fn quantile(values: &[f64], alpha: f64) -> f64 {
    if values.is_empty() {
        return 0.;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = alpha.clamp(0., 1.) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let up = pos.ceil() as usize;
    sorted[lo] + (pos - lo as f64) * (sorted[up] - sorted[lo])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_normalized_data() {
        let x = array![[1., 5.], [3., 5.]];
        let nd = NormalizedData::new(&x);
        assert_abs_diff_eq!(nd.mean, array![2., 5.]);
        // constant column keeps a unit std
        assert_abs_diff_eq!(nd.std[1], 1.);
        assert_abs_diff_eq!(nd.data.column(1).sum(), 0.);
    }

    #[test]
    fn test_quantile() {
        let v = [3., 1., 2., 4.];
        assert_abs_diff_eq!(quantile(&v, 0.), 1.);
        assert_abs_diff_eq!(quantile(&v, 0.5), 2.5);
        assert_abs_diff_eq!(quantile(&v, 1.), 4.);
        assert_abs_diff_eq!(quantile(&[], 0.3), 0.);
    }

    #[test]
    fn test_workers_pool_built_once() {
        let workers = Workers::new(2);
        assert!(!workers.is_built());
        let copy = workers.clone();
        let n = workers.install(rayon::current_num_threads).unwrap();
        assert_eq!(n, 2);
        assert!(copy.is_built());
        assert!(copy.shares_pool(&workers));
        let first = workers.pool().unwrap();
        let second = copy.pool().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Workers::new(2).shares_pool(&workers));
    }
}
