//! Optimizer configuration.
use crate::acquisition::{AcqConstraint, AcqFunc, AcqParams};
use crate::errors::{OptimError, Result};
use ambs_surrogate::SurrogateKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default size of the candidate pool scored at each ask
pub const DEFAULT_N_POINTS: usize = 10_000;
/// Default number of random points before the surrogate is fitted
pub const DEFAULT_N_INITIAL_POINTS: usize = 10;
/// Default number of pool points refined by L-BFGS
pub const DEFAULT_N_RESTARTS_OPTIMIZER: usize = 5;
/// Max number of resampling rounds when removing duplicated candidates
pub const DEFAULT_MAX_DEDUP_ROUNDS: usize = 10;

/// Strategy used to propose several points at once
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultiPointStrategy {
    /// Constant liar with the minimum of observed objectives
    ClMin,
    /// Constant liar with the mean of observed objectives
    ClMean,
    /// Constant liar with the maximum of observed objectives
    ClMax,
    /// The best scored candidates
    TopK,
    /// Candidates drawn with a Boltzmann distribution over their utility
    Boltzmann,
}

impl FromStr for MultiPointStrategy {
    type Err = OptimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cl_min" => Ok(MultiPointStrategy::ClMin),
            "cl_mean" => Ok(MultiPointStrategy::ClMean),
            "cl_max" => Ok(MultiPointStrategy::ClMax),
            "topk" => Ok(MultiPointStrategy::TopK),
            "boltzmann" => Ok(MultiPointStrategy::Boltzmann),
            _ => Err(OptimError::InvalidConfig(format!(
                "unknown multi point strategy '{s}'"
            ))),
        }
    }
}

impl fmt::Display for MultiPointStrategy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            MultiPointStrategy::ClMin => "cl_min",
            MultiPointStrategy::ClMean => "cl_mean",
            MultiPointStrategy::ClMax => "cl_max",
            MultiPointStrategy::TopK => "topk",
            MultiPointStrategy::Boltzmann => "boltzmann",
        };
        write!(f, "{name}")
    }
}

/// How failed evaluations are handled
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Failures are dropped from the history
    Ignore,
    /// Failures get the mean of successful objectives
    Mean,
    /// Failures get the minimum of successful objectives
    Min,
    /// Failures get the maximum of successful objectives
    Max,
}

impl FromStr for FailurePolicy {
    type Err = OptimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ignore" => Ok(FailurePolicy::Ignore),
            "mean" => Ok(FailurePolicy::Mean),
            "min" => Ok(FailurePolicy::Min),
            "max" => Ok(FailurePolicy::Max),
            _ => Err(OptimError::InvalidConfig(format!(
                "unknown failure policy '{s}'"
            ))),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            FailurePolicy::Ignore => "ignore",
            FailurePolicy::Mean => "mean",
            FailurePolicy::Min => "min",
            FailurePolicy::Max => "max",
        };
        write!(f, "{name}")
    }
}

/// Method used to minimize the acquisition function
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcqOptimizer {
    /// Best point of the candidate pool
    Sampling,
    /// Best pool points refined with L-BFGS
    Lbfgs,
    /// `Lbfgs` when the surrogate has gradients and the space is continuous,
    /// `Sampling` otherwise
    Auto,
}

impl FromStr for AcqOptimizer {
    type Err = OptimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sampling" => Ok(AcqOptimizer::Sampling),
            "lbfgs" => Ok(AcqOptimizer::Lbfgs),
            "auto" => Ok(AcqOptimizer::Auto),
            _ => Err(OptimError::InvalidConfig(format!(
                "unknown acquisition optimizer '{s}'"
            ))),
        }
    }
}

/// A set of validated optimizer options
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OptimizerValidConfig {
    pub(crate) surrogate: SurrogateKind,
    pub(crate) acq_func: AcqFunc,
    pub(crate) acq_params: AcqParams,
    pub(crate) acq_optimizer: AcqOptimizer,
    pub(crate) n_points: usize,
    pub(crate) n_restarts_optimizer: usize,
    pub(crate) filter_duplicated: bool,
    pub(crate) max_dedup_rounds: usize,
    pub(crate) n_initial_points: usize,
    pub(crate) filter_failures: FailurePolicy,
    pub(crate) temperature: f64,
    pub(crate) n_jobs: i32,
    pub(crate) seed: Option<u64>,
}

impl Default for OptimizerValidConfig {
    fn default() -> Self {
        OptimizerValidConfig {
            surrogate: SurrogateKind::RF,
            acq_func: AcqFunc::LCB,
            acq_params: AcqParams::default(),
            acq_optimizer: AcqOptimizer::Auto,
            n_points: DEFAULT_N_POINTS,
            n_restarts_optimizer: DEFAULT_N_RESTARTS_OPTIMIZER,
            filter_duplicated: true,
            max_dedup_rounds: DEFAULT_MAX_DEDUP_ROUNDS,
            n_initial_points: DEFAULT_N_INITIAL_POINTS,
            filter_failures: FailurePolicy::Mean,
            temperature: 1.,
            n_jobs: 1,
            seed: None,
        }
    }
}

impl OptimizerValidConfig {
    /// Surrogate kind
    pub fn surrogate(&self) -> SurrogateKind {
        self.surrogate
    }

    /// Acquisition criterion
    pub fn acq_func(&self) -> AcqFunc {
        self.acq_func
    }

    /// Acquisition parameters
    pub fn acq_params(&self) -> &AcqParams {
        &self.acq_params
    }

    /// Acquisition optimizer
    pub fn acq_optimizer(&self) -> AcqOptimizer {
        self.acq_optimizer
    }

    /// Size of the candidate pool
    pub fn n_points(&self) -> usize {
        self.n_points
    }

    /// Number of random points before fitting
    pub fn n_initial_points(&self) -> usize {
        self.n_initial_points
    }

    /// Failure policy
    pub fn filter_failures(&self) -> FailurePolicy {
        self.filter_failures
    }

    /// Random seed
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

/// Optimizer options builder
///
/// ```
/// use ambs_optim::{AcqFunc, OptimizerConfig};
/// use ambs_surrogate::SurrogateKind;
///
/// let config = OptimizerConfig::default()
///     .surrogate(SurrogateKind::ET)
///     .acq_func(AcqFunc::EI)
///     .xi(0.01)
///     .n_points(1000)
///     .seed(42)
///     .check()
///     .unwrap();
/// assert_eq!(config.n_points(), 1000);
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OptimizerConfig(OptimizerValidConfig);

impl OptimizerConfig {
    /// Set the surrogate kind
    pub fn surrogate(mut self, surrogate: SurrogateKind) -> Self {
        self.0.surrogate = surrogate;
        self
    }

    /// Set the acquisition criterion
    pub fn acq_func(mut self, acq_func: AcqFunc) -> Self {
        self.0.acq_func = acq_func;
        self
    }

    /// Set the LCB exploration weight (`f64::INFINITY` for pure exploration)
    pub fn kappa(mut self, kappa: f64) -> Self {
        self.0.acq_params.kappa = kappa;
        self
    }

    /// Set the EI/PI improvement margin
    pub fn xi(mut self, xi: f64) -> Self {
        self.0.acq_params.xi = xi;
        self
    }

    /// Set a constraint masking expected improvement
    pub fn constraint(mut self, constraint: AcqConstraint) -> Self {
        self.0.acq_params.constraint = Some(constraint);
        self
    }

    /// Set the acquisition optimizer
    pub fn acq_optimizer(mut self, acq_optimizer: AcqOptimizer) -> Self {
        self.0.acq_optimizer = acq_optimizer;
        self
    }

    /// Set the size of the candidate pool
    pub fn n_points(mut self, n_points: usize) -> Self {
        self.0.n_points = n_points;
        self
    }

    /// Set the number of pool points refined by L-BFGS
    pub fn n_restarts_optimizer(mut self, n_restarts_optimizer: usize) -> Self {
        self.0.n_restarts_optimizer = n_restarts_optimizer;
        self
    }

    /// Whether candidates already in the pool or in the history are resampled
    pub fn filter_duplicated(mut self, filter_duplicated: bool) -> Self {
        self.0.filter_duplicated = filter_duplicated;
        self
    }

    /// Set the max number of resampling rounds used to remove duplicates
    pub fn max_dedup_rounds(mut self, max_dedup_rounds: usize) -> Self {
        self.0.max_dedup_rounds = max_dedup_rounds;
        self
    }

    /// Set the number of random points told before the surrogate is fitted
    pub fn n_initial_points(mut self, n_initial_points: usize) -> Self {
        self.0.n_initial_points = n_initial_points;
        self
    }

    /// Set the failure policy
    pub fn filter_failures(mut self, filter_failures: FailurePolicy) -> Self {
        self.0.filter_failures = filter_failures;
        self
    }

    /// Set the temperature of the Boltzmann strategy
    pub fn temperature(mut self, temperature: f64) -> Self {
        self.0.temperature = temperature;
        self
    }

    /// Set the number of threads used to fit surrogates (-1 means all cores)
    pub fn n_jobs(mut self, n_jobs: i32) -> Self {
        self.0.n_jobs = n_jobs;
        self
    }

    /// Set the random seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.0.seed = Some(seed);
        self
    }

    /// Check options consistency
    pub fn check_ref(&self) -> Result<&OptimizerValidConfig> {
        let config = &self.0;
        let kappa = config.acq_params.kappa;
        if kappa.is_nan() || kappa < 0. {
            return Err(OptimError::InvalidConfig(format!(
                "kappa should be a non negative value, got {kappa}"
            )));
        }
        if !config.acq_params.xi.is_finite() {
            return Err(OptimError::InvalidConfig(format!(
                "xi should be finite, got {}",
                config.acq_params.xi
            )));
        }
        if config.n_points == 0 {
            return Err(OptimError::InvalidConfig(
                "n_points should be greater than 0".to_string(),
            ));
        }
        if config.n_jobs == 0 {
            return Err(OptimError::InvalidConfig(
                "n_jobs should be positive or -1".to_string(),
            ));
        }
        if config.temperature.is_nan() || config.temperature <= 0. {
            return Err(OptimError::InvalidConfig(format!(
                "temperature should be positive, got {}",
                config.temperature
            )));
        }
        if config.acq_optimizer == AcqOptimizer::Lbfgs && config.n_restarts_optimizer == 0 {
            return Err(OptimError::InvalidConfig(
                "n_restarts_optimizer should be greater than 0 with lbfgs".to_string(),
            ));
        }
        Ok(config)
    }

    /// Check and return the validated options
    pub fn check(self) -> Result<OptimizerValidConfig> {
        self.check_ref()?;
        Ok(self.0)
    }
}

impl From<OptimizerValidConfig> for OptimizerConfig {
    fn from(valid: OptimizerValidConfig) -> Self {
        OptimizerConfig(valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(
            "cl_max".parse::<MultiPointStrategy>().unwrap(),
            MultiPointStrategy::ClMax
        );
        assert_eq!(MultiPointStrategy::Boltzmann.to_string(), "boltzmann");
        assert_eq!("ignore".parse::<FailurePolicy>().unwrap(), FailurePolicy::Ignore);
        assert_eq!("auto".parse::<AcqOptimizer>().unwrap(), AcqOptimizer::Auto);
        assert!("qUCB".parse::<MultiPointStrategy>().is_err());
        assert!("zero".parse::<FailurePolicy>().is_err());
        assert!("cobyla".parse::<AcqOptimizer>().is_err());
    }

    #[test]
    fn test_defaults() {
        let config = OptimizerConfig::default().check().unwrap();
        assert_eq!(config.surrogate(), SurrogateKind::RF);
        assert_eq!(config.acq_func(), AcqFunc::LCB);
        assert_eq!(config.acq_params().kappa, 1.96);
        assert_eq!(config.acq_params().xi, 0.001);
        assert_eq!(config.n_points(), 10_000);
        assert_eq!(config.n_initial_points(), 10);
        assert_eq!(config.filter_failures(), FailurePolicy::Mean);
        assert!(config.filter_duplicated);
    }

    #[test]
    fn test_invalid_options() {
        assert!(OptimizerConfig::default().kappa(-1.).check().is_err());
        assert!(OptimizerConfig::default().kappa(f64::INFINITY).check().is_ok());
        assert!(OptimizerConfig::default().xi(f64::NAN).check().is_err());
        assert!(OptimizerConfig::default().n_points(0).check().is_err());
        assert!(OptimizerConfig::default().n_jobs(0).check().is_err());
        assert!(OptimizerConfig::default().temperature(0.).check().is_err());
        assert!(OptimizerConfig::default()
            .acq_optimizer(AcqOptimizer::Lbfgs)
            .n_restarts_optimizer(0)
            .check()
            .is_err());
    }
}
