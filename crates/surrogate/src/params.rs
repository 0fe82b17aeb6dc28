use crate::errors::{Result, SurrogateError};
use crate::forest::{Forest, ForestParams};
use crate::gbrt::{Gbrt, GbrtParams};
use crate::gp::{GaussianProcess, GpParams};
use crate::traits::Surrogate;
use crate::utils::Workers;
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named kinds of surrogate model
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurrogateKind {
    /// Random forest
    RF,
    /// Extremely randomized trees
    ET,
    /// Gradient boosted quantile regression trees
    GBRT,
    /// Gaussian process
    GP,
    /// No model: candidates are always drawn at random
    DUMMY,
}

impl FromStr for SurrogateKind {
    type Err = SurrogateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RF" => Ok(SurrogateKind::RF),
            "ET" => Ok(SurrogateKind::ET),
            "GBRT" => Ok(SurrogateKind::GBRT),
            "GP" => Ok(SurrogateKind::GP),
            "DUMMY" => Ok(SurrogateKind::DUMMY),
            _ => Err(SurrogateError::UnknownKind(s.to_string())),
        }
    }
}

impl fmt::Display for SurrogateKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            SurrogateKind::RF => "RF",
            SurrogateKind::ET => "ET",
            SurrogateKind::GBRT => "GBRT",
            SurrogateKind::GP => "GP",
            SurrogateKind::DUMMY => "DUMMY",
        };
        write!(f, "{name}")
    }
}

/// Surrogate builder: a kind plus fitting resources.
///
/// ```
/// use ambs_surrogate::{Surrogate, SurrogateKind, SurrogateParams};
/// use ndarray::array;
///
/// let x = array![[0.], [0.25], [0.5], [0.75], [1.]];
/// let y = array![0., 0.5, 1., 0.5, 0.];
/// let model = SurrogateParams::new(SurrogateKind::ET)
///     .seed(42)
///     .train(&x.view(), &y.view())
///     .unwrap();
/// let (mean, std) = model.predict_valstd(&x.view()).unwrap();
/// assert_eq!(mean.len(), 5);
/// assert!(std.iter().all(|s| *s >= 0.));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurrogateParams {
    kind: SurrogateKind,
    workers: Workers,
    seed: u64,
}

impl SurrogateParams {
    /// Builder of the given kind (one thread, seed 0)
    pub fn new(kind: SurrogateKind) -> Self {
        SurrogateParams {
            kind,
            workers: Workers::default(),
            seed: 0,
        }
    }

    /// Set the number of threads used for fitting (-1 means all cores).
    /// The thread pool is built once and shared by clones of this builder.
    pub fn n_jobs(mut self, n_jobs: i32) -> Self {
        self.workers = Workers::new(n_jobs);
        self
    }

    /// Workers running the fits
    pub fn workers(&self) -> &Workers {
        &self.workers
    }

    /// Set the seed of the model randomness
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the seed in place (used to draw a new seed at each refit)
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    /// Model kind
    pub fn kind(&self) -> SurrogateKind {
        self.kind
    }

    /// Whether the kind builds a model at all
    pub fn is_trainable(&self) -> bool {
        self.kind != SurrogateKind::DUMMY
    }

    /// Train a model of the configured kind on `(x, y)`
    pub fn train(&self, x: &ArrayView2<f64>, y: &ArrayView1<f64>) -> Result<SurrogateModel> {
        match self.kind {
            SurrogateKind::RF => Ok(SurrogateModel::Forest(
                ForestParams::random_forest()
                    .workers(self.workers.clone())
                    .seed(self.seed)
                    .fit(x, y)?,
            )),
            SurrogateKind::ET => Ok(SurrogateModel::Forest(
                ForestParams::extra_trees()
                    .workers(self.workers.clone())
                    .seed(self.seed)
                    .fit(x, y)?,
            )),
            SurrogateKind::GBRT => Ok(SurrogateModel::Gbrt(
                GbrtParams::default()
                    .workers(self.workers.clone())
                    .seed(self.seed)
                    .fit(x, y)?,
            )),
            SurrogateKind::GP => Ok(SurrogateModel::Gp(
                GpParams::default()
                    .workers(self.workers.clone())
                    .seed(self.seed)
                    .fit(x, y)?,
            )),
            SurrogateKind::DUMMY => Err(SurrogateError::NotTrainable(self.kind.to_string())),
        }
    }
}

/// A trained surrogate, one variant per model family
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SurrogateModel {
    /// RF or ET
    Forest(Forest),
    /// Quantile boosting
    Gbrt(Gbrt),
    /// Gaussian process
    Gp(GaussianProcess),
}

impl SurrogateModel {
    fn inner(&self) -> &dyn Surrogate {
        match self {
            SurrogateModel::Forest(m) => m,
            SurrogateModel::Gbrt(m) => m,
            SurrogateModel::Gp(m) => m,
        }
    }
}

impl fmt::Display for SurrogateModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self.inner(), f)
    }
}

impl Surrogate for SurrogateModel {
    fn nx(&self) -> usize {
        self.inner().nx()
    }

    fn predict(&self, x: &ArrayView2<f64>) -> Result<Array1<f64>> {
        self.inner().predict(x)
    }

    fn predict_valstd(&self, x: &ArrayView2<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
        self.inner().predict_valstd(x)
    }

    fn predict_valstd_gradients(
        &self,
        x: &ArrayView1<f64>,
    ) -> Result<(f64, f64, Array1<f64>, Array1<f64>)> {
        self.inner().predict_valstd_gradients(x)
    }

    fn has_gradients(&self) -> bool {
        self.inner().has_gradients()
    }
}
