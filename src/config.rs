//! Search options named in the maximization convention of the search.
//!
//! The optimizer minimizes, so the objective is negated and some option names
//! are remapped: multi point strategies `cl_min` and `cl_max` are swapped,
//! `UCB` becomes `LCB` and the failure policy `min` becomes `max`.
use crate::errors::{AmbsError, Result};
use crate::evaluator::GatherMode;
use ambs_optim::{
    AcqFunc, AcqOptimizer, FailurePolicy, MultiPointStrategy, OptimizerConfig, DEFAULT_KAPPA,
    DEFAULT_N_INITIAL_POINTS, DEFAULT_N_POINTS, DEFAULT_N_RESTARTS_OPTIMIZER, DEFAULT_XI,
};
use ambs_surrogate::SurrogateKind;
use env_logger::{Builder, Env};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Environment variable setting the log level
pub const AMBS_LOG: &str = "AMBS_LOG";

/// Multi point strategy names from maximization to minimization
pub const MAP_MULTI_POINT_STRATEGY: [(&str, &str); 2] = [("cl_min", "cl_max"), ("cl_max", "cl_min")];
/// Acquisition function names from maximization to minimization
pub const MAP_ACQ_FUNC: [(&str, &str); 1] = [("UCB", "LCB")];
/// Failure policy names from maximization to minimization
pub const MAP_FILTER_FAILURES: [(&str, &str); 1] = [("min", "max")];

/// Acquisition functions accepted by the search
pub const ACQ_FUNC_ALLOWED: [&str; 6] = ["UCB", "EI", "PI", "EIps", "PIps", "gp_hedge"];

fn mapped<'a>(table: &[(&'a str, &'a str)], name: &'a str) -> &'a str {
    table
        .iter()
        .find(|(from, _)| *from == name)
        .map_or(name, |(_, to)| to)
}

fn parse<T: FromStr>(option: &str, name: &str) -> Result<T> {
    name.parse::<T>().map_err(|_| {
        AmbsError::InvalidConfig(format!("Parameter '{option}={name}' has an unknown value"))
    })
}

/// Initialize `env_logger` from [`AMBS_LOG`] (default `info`), once
pub fn init_logger() {
    let env = Env::new().filter_or(AMBS_LOG, "info");
    let mut builder = Builder::from_env(env);
    let builder = builder.target(env_logger::Target::Stdout);
    builder.try_init().ok();
}

/// Validated search options
#[derive(Clone, Debug)]
pub struct SearchValidConfig {
    pub(crate) optimizer: OptimizerConfig,
    pub(crate) strategy: MultiPointStrategy,
    pub(crate) filter_failures: FailurePolicy,
    pub(crate) gather_mode: GatherMode,
}

impl SearchValidConfig {
    /// Optimizer options in the minimization convention
    pub fn optimizer(&self) -> &OptimizerConfig {
        &self.optimizer
    }

    /// Multi point strategy in the minimization convention
    pub fn strategy(&self) -> MultiPointStrategy {
        self.strategy
    }

    /// Failure policy in the minimization convention
    pub fn filter_failures(&self) -> FailurePolicy {
        self.filter_failures
    }

    /// Gather mode
    pub fn gather_mode(&self) -> GatherMode {
        self.gather_mode
    }
}

/// Search options as given by the user (objective maximized).
///
/// ```
/// use ambs::SearchConfig;
/// use ambs_optim::{FailurePolicy, MultiPointStrategy};
///
/// let config = SearchConfig::default()
///     .acq_func("UCB")
///     .multi_point_strategy("cl_max")
///     .filter_failures("min")
///     .check()
///     .unwrap();
/// assert_eq!(config.strategy(), MultiPointStrategy::ClMin);
/// assert_eq!(config.filter_failures(), FailurePolicy::Max);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    surrogate_model: String,
    acq_func: String,
    acq_optimizer: String,
    n_restarts_optimizer: usize,
    kappa: f64,
    xi: f64,
    n_points: usize,
    filter_duplicated: bool,
    multi_point_strategy: String,
    n_jobs: i32,
    n_initial_points: usize,
    sync_communication: bool,
    filter_failures: String,
    seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            surrogate_model: "RF".to_string(),
            acq_func: "UCB".to_string(),
            acq_optimizer: "auto".to_string(),
            n_restarts_optimizer: DEFAULT_N_RESTARTS_OPTIMIZER,
            kappa: DEFAULT_KAPPA,
            xi: DEFAULT_XI,
            n_points: DEFAULT_N_POINTS,
            filter_duplicated: true,
            multi_point_strategy: "cl_max".to_string(),
            n_jobs: 1,
            n_initial_points: DEFAULT_N_INITIAL_POINTS,
            sync_communication: false,
            filter_failures: "mean".to_string(),
            seed: None,
        }
    }
}

impl SearchConfig {
    /// Surrogate model: `RF`, `ET`, `GBRT`, `GP` or `DUMMY`
    pub fn surrogate_model(mut self, name: &str) -> Self {
        self.surrogate_model = name.to_string();
        self
    }

    /// Acquisition function: `UCB`, `EI`, `PI`, `EIps`, `PIps` or `gp_hedge`
    pub fn acq_func(mut self, name: &str) -> Self {
        self.acq_func = name.to_string();
        self
    }

    /// Acquisition optimizer: `sampling`, `lbfgs` or `auto`
    pub fn acq_optimizer(mut self, name: &str) -> Self {
        self.acq_optimizer = name.to_string();
        self
    }

    /// Number of best candidates refined by `lbfgs`
    pub fn n_restarts_optimizer(mut self, n_restarts_optimizer: usize) -> Self {
        self.n_restarts_optimizer = n_restarts_optimizer;
        self
    }

    /// Exploration weight of `UCB`, `f64::INFINITY` for pure exploration
    pub fn kappa(mut self, kappa: f64) -> Self {
        self.kappa = kappa;
        self
    }

    /// Improvement margin of `EI` and `PI`
    pub fn xi(mut self, xi: f64) -> Self {
        self.xi = xi;
        self
    }

    /// Number of candidates scored at each ask
    pub fn n_points(mut self, n_points: usize) -> Self {
        self.n_points = n_points;
        self
    }

    /// Sample unique candidates until the space is exhausted
    pub fn filter_duplicated(mut self, filter_duplicated: bool) -> Self {
        self.filter_duplicated = filter_duplicated;
        self
    }

    /// Multi point strategy: `cl_min`, `cl_mean`, `cl_max`, `topk` or `boltzmann`
    pub fn multi_point_strategy(mut self, name: &str) -> Self {
        self.multi_point_strategy = name.to_string();
        self
    }

    /// Threads used to fit the surrogate, -1 for all cores
    pub fn n_jobs(mut self, n_jobs: i32) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Number of evaluations before the surrogate is fitted
    pub fn n_initial_points(mut self, n_initial_points: usize) -> Self {
        self.n_initial_points = n_initial_points;
        self
    }

    /// Gather evaluations in lock-step (`ALL`) instead of as they complete
    pub fn sync_communication(mut self, sync_communication: bool) -> Self {
        self.sync_communication = sync_communication;
        self
    }

    /// Objective given to failed evaluations: `ignore`, `mean`, `min` or `max`
    pub fn filter_failures(mut self, name: &str) -> Self {
        self.filter_failures = name.to_string();
        self
    }

    /// Random seed
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check option names and values, mapping them to the minimization convention
    pub fn check(&self) -> Result<SearchValidConfig> {
        let surrogate: SurrogateKind = parse("surrogate_model", &self.surrogate_model)?;
        if !ACQ_FUNC_ALLOWED.contains(&self.acq_func.as_str()) {
            return Err(AmbsError::InvalidConfig(format!(
                "Parameter 'acq_func={}' should have a value in {ACQ_FUNC_ALLOWED:?}",
                self.acq_func
            )));
        }
        let acq_func: AcqFunc = parse("acq_func", mapped(&MAP_ACQ_FUNC, &self.acq_func))?;
        let acq_optimizer: AcqOptimizer = parse("acq_optimizer", &self.acq_optimizer)?;
        let strategy: MultiPointStrategy = parse(
            "multi_point_strategy",
            mapped(&MAP_MULTI_POINT_STRATEGY, &self.multi_point_strategy),
        )?;
        let filter_failures: FailurePolicy = parse(
            "filter_failures",
            mapped(&MAP_FILTER_FAILURES, &self.filter_failures),
        )?;
        let mut optimizer = OptimizerConfig::default()
            .surrogate(surrogate)
            .acq_func(acq_func)
            .acq_optimizer(acq_optimizer)
            .n_restarts_optimizer(self.n_restarts_optimizer)
            .kappa(self.kappa)
            .xi(self.xi)
            .n_points(self.n_points)
            .filter_duplicated(self.filter_duplicated)
            .n_jobs(self.n_jobs)
            .n_initial_points(self.n_initial_points)
            .filter_failures(filter_failures);
        if let Some(seed) = self.seed {
            optimizer = optimizer.seed(seed);
        }
        optimizer
            .check_ref()
            .map_err(|e| AmbsError::InvalidConfig(e.to_string()))?;
        let gather_mode = if self.sync_communication {
            GatherMode::All
        } else {
            GatherMode::Batch
        };
        Ok(SearchValidConfig {
            optimizer,
            strategy,
            filter_failures,
            gather_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_mapping() {
        let config = SearchConfig::default().check().unwrap();
        assert_eq!(config.strategy(), MultiPointStrategy::ClMin);
        assert_eq!(config.filter_failures(), FailurePolicy::Mean);
        assert_eq!(config.gather_mode(), GatherMode::Batch);
        let optimizer = config.optimizer().check_ref().unwrap();
        assert_eq!(optimizer.acq_func(), AcqFunc::LCB);
        assert_eq!(optimizer.surrogate(), SurrogateKind::RF);
        assert_eq!(optimizer.n_points(), 10_000);
        assert_eq!(optimizer.n_initial_points(), 10);
    }

    #[test]
    fn test_names_mapping() {
        let config = SearchConfig::default()
            .multi_point_strategy("cl_min")
            .filter_failures("max")
            .acq_func("EI")
            .sync_communication(true)
            .check()
            .unwrap();
        assert_eq!(config.strategy(), MultiPointStrategy::ClMax);
        // only min is remapped
        assert_eq!(config.filter_failures(), FailurePolicy::Max);
        assert_eq!(config.gather_mode(), GatherMode::All);
        assert_eq!(
            config.optimizer().check_ref().unwrap().acq_func(),
            AcqFunc::EI
        );
        let config = SearchConfig::default()
            .multi_point_strategy("cl_mean")
            .filter_failures("ignore")
            .check()
            .unwrap();
        assert_eq!(config.strategy(), MultiPointStrategy::ClMean);
        assert_eq!(config.filter_failures(), FailurePolicy::Ignore);
    }

    #[test]
    fn test_invalid_options() {
        let invalid = [
            SearchConfig::default().surrogate_model("SVM"),
            SearchConfig::default().acq_func("LCB"),
            SearchConfig::default().acq_func("qUCB"),
            SearchConfig::default().multi_point_strategy("qUCB"),
            SearchConfig::default().filter_failures("median"),
            SearchConfig::default().acq_optimizer("adam"),
            SearchConfig::default().kappa(f64::NAN),
            SearchConfig::default().n_points(0),
        ];
        for config in invalid {
            assert!(
                matches!(config.check(), Err(AmbsError::InvalidConfig(_))),
                "{config:?}"
            );
        }
    }
}
