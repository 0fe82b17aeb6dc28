//! Asynchronous model-based search driving an [`Optimizer`] against an [`Evaluator`].
//!
//! The objective given by the evaluator is maximized. Each iteration gathers
//! completed evaluations, tells them to the optimizer (negated), asks for as
//! many new configurations as evaluations were received and submits them, so
//! that every worker stays busy.
use crate::checkpoint::Checkpoint;
use crate::config::{init_logger, SearchConfig, SearchValidConfig};
use crate::errors::{AmbsError, Result};
use crate::evaluator::{Evaluation, Evaluator};
use crate::problem::Problem;
use ambs_optim::{FailurePolicy, Optimizer, Outcome, PointGenerator};
use ambs_space::{
    reshape_around, Config, NamedConfig, ReshapeReport, Value, DEFAULT_FAC_CATEGORICAL,
    DEFAULT_FAC_NUMERICAL,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Evaluations gathered by a search
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Every gathered evaluation in gathering order
    pub evaluations: Vec<Evaluation>,
    /// Successful evaluation with the highest objective
    pub best: Option<Evaluation>,
}

impl fmt::Display for SearchResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.best.as_ref().and_then(|b| b.outcome.value().map(|y| (b, y))) {
            Some((best, y)) => write!(
                f,
                "{} evaluation(s), best objective {y} at {:?}",
                self.evaluations.len(),
                best.config
            ),
            None => write!(f, "{} evaluation(s), no success", self.evaluations.len()),
        }
    }
}

/// Asynchronous model-based search.
///
/// ```
/// use ambs::{Ambs, Problem, SearchConfig, ThreadEvaluator};
/// use ambs_space::{Dimension, NamedConfig, Scale, Space};
///
/// fn run(config: &NamedConfig) -> anyhow::Result<f64> {
///     let x = config["x"].as_f64().unwrap_or_default();
///     Ok(-(x - 1.).powi(2))
/// }
///
/// let space = Space::new(vec![Dimension::continuous("x", -5., 5., Scale::Linear).unwrap()]).unwrap();
/// let evaluator = ThreadEvaluator::new(run, 2).unwrap();
/// let config = SearchConfig::default().n_initial_points(4).n_points(500).seed(42);
/// let mut search = Ambs::new(Problem::new(space), evaluator, config).unwrap();
/// let result = search.search(Some(12), None).unwrap();
/// assert!(result.evaluations.len() >= 12);
/// println!("{result}");
/// ```
pub struct Ambs<E: Evaluator> {
    problem: Problem,
    evaluator: E,
    config: SearchValidConfig,
    optimizer: Optimizer,
    warm_started: bool,
    evaluations: Vec<Evaluation>,
}

impl<E: Evaluator> Ambs<E> {
    /// Search of `problem` with `evaluator`. Options are checked before anything runs.
    pub fn new(problem: Problem, evaluator: E, config: SearchConfig) -> Result<Self> {
        init_logger();
        let config = config.check()?;
        let optimizer = Optimizer::new(problem.space().clone(), config.optimizer.clone())?;
        Ok(Ambs {
            problem,
            evaluator,
            config,
            optimizer,
            warm_started: false,
            evaluations: vec![],
        })
    }

    /// Problem explored
    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    /// Underlying optimizer (minimizing the negated objective)
    pub fn optimizer(&self) -> &Optimizer {
        &self.optimizer
    }

    /// Evaluator
    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    /// Validated options
    pub fn config(&self) -> &SearchValidConfig {
        &self.config
    }

    /// Every evaluation gathered so far
    pub fn evaluations(&self) -> &[Evaluation] {
        &self.evaluations
    }

    /// Install a generator of initial points used while the surrogate is not fitted
    pub fn set_generator(&mut self, generator: Box<dyn PointGenerator>) {
        self.optimizer.set_generator(generator);
    }

    /// List form to named form
    pub fn to_named(&self, x: &[Value]) -> NamedConfig {
        self.optimizer.space().to_named(x)
    }

    /// Run the search until `max_evals` evaluations are gathered (`None` for
    /// no limit) or `timeout` is elapsed. The timeout is checked between
    /// iterations, evaluations in flight are not cancelled.
    pub fn search(
        &mut self,
        max_evals: Option<usize>,
        timeout: Option<Duration>,
    ) -> Result<SearchResult> {
        let start = Instant::now();
        let num_workers = self.evaluator.num_workers();
        info!("Generating {num_workers} initial points...");
        let t1 = Instant::now();
        let batch = self.get_random_batch(num_workers)?;
        self.evaluator.submit(batch)?;
        info!("Generation took: {:?}", t1.elapsed());

        let mut num_evals_done = 0;
        let first = self.evaluations.len();
        while max_evals.map_or(true, |max| num_evals_done < max) {
            if timeout.is_some_and(|t| start.elapsed() >= t) {
                info!("Timeout reached after {num_evals_done} evaluation(s)");
                break;
            }
            info!("Gathering jobs...");
            let t1 = Instant::now();
            let new_results = self.evaluator.gather(self.config.gather_mode, 1)?;
            info!("Gathered {} job(s) in {:?}", new_results.len(), t1.elapsed());
            if new_results.is_empty() {
                warn!("No evaluation in flight, search stopped");
                break;
            }
            let num_received = new_results.len();
            num_evals_done += num_received;

            let t1 = Instant::now();
            let (opt_x, opt_y, costs) = self.to_observations(&new_results)?;
            self.evaluations.extend(new_results);
            info!("Transformation took {:?}", t1.elapsed());

            if !opt_y.is_empty() {
                let t1 = Instant::now();
                self.optimizer.tell_timed(&opt_x, &opt_y, &costs)?;
                info!("Fitting took {:?}", t1.elapsed());
            }

            if max_evals.is_some_and(|max| num_evals_done >= max) {
                break;
            }

            info!("Asking {num_received} new configurations...");
            let t1 = Instant::now();
            let new_x = self.optimizer.ask(num_received, self.config.strategy)?;
            info!("Asking took {:?}", t1.elapsed());

            let new_batch: Vec<NamedConfig> = new_x.iter().map(|x| self.to_named(x)).collect();
            info!("Submitting {} configurations...", new_batch.len());
            let t1 = Instant::now();
            self.evaluator.submit(new_batch)?;
            info!("Submission took {:?}", t1.elapsed());
        }

        let evaluations = self.evaluations[first..].to_vec();
        let best = evaluations
            .iter()
            .filter(|e| e.outcome.value().is_some())
            .max_by(|a, b| {
                let (a, b) = (a.outcome.value(), b.outcome.value());
                a.unwrap_or(f64::NEG_INFINITY)
                    .total_cmp(&b.unwrap_or(f64::NEG_INFINITY))
            })
            .cloned();
        let result = SearchResult { evaluations, best };
        info!("Search done in {:?}: {result}", start.elapsed());
        Ok(result)
    }

    /// Completed evaluations in the optimizer convention: list form, negated
    /// objectives and durations in seconds. Non-finite objectives become
    /// failures, failures are dropped under the `ignore` policy.
    fn to_observations(
        &self,
        evaluations: &[Evaluation],
    ) -> Result<(Vec<Config>, Vec<Outcome>, Vec<f64>)> {
        let space = self.optimizer.space();
        let mut opt_x = Vec::with_capacity(evaluations.len());
        let mut opt_y = Vec::with_capacity(evaluations.len());
        let mut costs = Vec::with_capacity(evaluations.len());
        for evaluation in evaluations {
            let outcome = match evaluation.outcome {
                Outcome::Success(y) if y.is_finite() => Outcome::Success(-y),
                _ if self.config.filter_failures == FailurePolicy::Ignore => continue,
                _ => Outcome::Failure,
            };
            opt_x.push(space.to_list(&evaluation.config)?);
            opt_y.push(outcome);
            costs.push(evaluation.elapsed.as_secs_f64());
        }
        Ok((opt_x, opt_y, costs))
    }

    /// Batch of `size` configurations to seed the workers: the problem starting
    /// points (unless the surrogate was fitted from a checkpoint) completed by
    /// proposals of the optimizer, random samples while it is not fitted.
    pub fn get_random_batch(&mut self, size: usize) -> Result<Vec<NamedConfig>> {
        info!("Creating random batch of size {size}...");
        let t1 = Instant::now();
        let mut batch: Vec<NamedConfig> = if self.warm_started {
            vec![]
        } else {
            self.problem
                .starting_points()
                .iter()
                .map(|x| self.to_named(x))
                .collect()
        };
        let n_points = size.saturating_sub(batch.len());
        if n_points > 0 {
            let points = self.optimizer.ask(n_points, self.config.strategy)?;
            batch.extend(points.iter().map(|x| self.to_named(x)));
        }
        info!("Random batch created in {:?}", t1.elapsed());
        Ok(batch)
    }

    /// Warm start the surrogate with the results of a previous search.
    /// Failed rows are skipped. Nothing is told when the checkpoint is
    /// incompatible with the search space.
    pub fn fit_surrogate(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        let (x, y) = checkpoint.observations(self.optimizer.space())?;
        if let Some(v) = y.iter().find(|v| !v.is_finite()) {
            return Err(AmbsError::IncompatibleCheckpoint(format!(
                "objective should be finite, got {v}"
            )));
        }
        let y: Vec<Outcome> = y.into_iter().map(|v| Outcome::Success(-v)).collect();
        info!("Fitting surrogate on {} previous evaluation(s)", y.len());
        self.optimizer.tell(&x, &y)?;
        self.optimizer.skip_initial_points()?;
        self.warm_started = true;
        Ok(())
    }

    /// Concentrate the search around the best configuration of a previous
    /// search with default factors
    pub fn fit_search_space(&mut self, checkpoint: &Checkpoint) -> Result<ReshapeReport> {
        self.fit_search_space_with(checkpoint, DEFAULT_FAC_NUMERICAL, DEFAULT_FAC_CATEGORICAL)
    }

    /// Concentrate the search around the best configuration of a previous search.
    ///
    /// Numeric dimensions get a truncated normal prior centered on the best
    /// value with `sigma = max(1, (upper - lower) * fac_numerical)`, the best
    /// category gets weight `fac_categorical` (others 1). The history is kept.
    pub fn fit_search_space_with(
        &mut self,
        checkpoint: &Checkpoint,
        fac_numerical: f64,
        fac_categorical: f64,
    ) -> Result<ReshapeReport> {
        let best = checkpoint.best(self.optimizer.space())?;
        let (space, report) =
            reshape_around(self.optimizer.space(), &best, fac_numerical, fac_categorical)?;
        self.optimizer.reconfigure(space, true)?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{GatherMode, ThreadEvaluator};
    use ambs_space::{Dimension, Domain, Prior, Scale, Space};
    use std::collections::BTreeMap;

    fn space() -> Space {
        Space::new(vec![
            Dimension::continuous("x", -5., 5., Scale::Linear).unwrap(),
            Dimension::categorical("kind", &["a", "b", "c"]).unwrap(),
        ])
        .unwrap()
    }

    fn run(config: &NamedConfig) -> anyhow::Result<f64> {
        let x = config["x"].as_f64().unwrap_or(f64::NAN);
        if x.is_nan() {
            anyhow::bail!("missing x");
        }
        let bonus = if config["kind"] == Value::Cat("b".to_string()) { 1. } else { 0. };
        if x > 4. {
            anyhow::bail!("out of memory");
        }
        Ok(bonus - (x - 1.).powi(2))
    }

    fn config() -> SearchConfig {
        SearchConfig::default()
            .n_initial_points(5)
            .n_points(200)
            .seed(0)
    }

    /// Evaluator replaying a fixed objective synchronously
    struct Sequential {
        queue: Vec<NamedConfig>,
        submitted: Vec<Vec<NamedConfig>>,
    }

    impl Evaluator for Sequential {
        fn num_workers(&self) -> usize {
            3
        }

        fn submit(&mut self, batch: Vec<NamedConfig>) -> Result<()> {
            self.submitted.push(batch.clone());
            self.queue.extend(batch);
            Ok(())
        }

        fn gather(&mut self, mode: GatherMode, _min_count: usize) -> Result<Vec<Evaluation>> {
            let n = match mode {
                GatherMode::All => self.queue.len(),
                GatherMode::Batch => self.queue.len().min(1),
            };
            Ok(self
                .queue
                .drain(..n)
                .map(|config| Evaluation {
                    outcome: run(&config).map_or(Outcome::Failure, Outcome::Success),
                    config,
                    elapsed: Duration::from_millis(10),
                })
                .collect())
        }
    }

    fn sequential() -> Sequential {
        Sequential {
            queue: vec![],
            submitted: vec![],
        }
    }

    #[test]
    fn test_search_with_threads() {
        let evaluator = ThreadEvaluator::new(run, 4).unwrap();
        let mut search = Ambs::new(Problem::new(space()), evaluator, config()).unwrap();
        let result = search.search(Some(20), None).unwrap();
        assert!(result.evaluations.len() >= 20);
        assert!(search.optimizer().is_fitted());
        let best = result.best.unwrap();
        assert!(best.outcome.value().unwrap() > -4.);
        for evaluation in result.evaluations.iter() {
            search.optimizer().space().to_list(&evaluation.config).unwrap();
        }
    }

    #[test]
    fn test_steady_state_batches() {
        let mut search = Ambs::new(Problem::new(space()), sequential(), config()).unwrap();
        let result = search.search(Some(10), None).unwrap();
        assert_eq!(result.evaluations.len(), 10);
        let submitted = &search.evaluator().submitted;
        assert_eq!(submitted[0].len(), 3);
        // one evaluation gathered, one submitted
        assert!(submitted[1..].iter().all(|b| b.len() == 1));
        assert_eq!(search.optimizer().history().len(), 10);
    }

    #[test]
    fn test_lock_step_and_ignore() {
        let config = config().sync_communication(true).filter_failures("ignore");
        let mut search = Ambs::new(Problem::new(space()), sequential(), config).unwrap();
        let result = search.search(Some(12), None).unwrap();
        assert_eq!(result.evaluations.len(), 12);
        let submitted = &search.evaluator().submitted;
        assert!(submitted.iter().all(|b| b.len() == 3));
        let failures = result
            .evaluations
            .iter()
            .filter(|e| e.outcome.is_failure())
            .count();
        assert_eq!(search.optimizer().history().len(), 12 - failures);
    }

    #[test]
    fn test_timeout() {
        let mut search = Ambs::new(Problem::new(space()), sequential(), config()).unwrap();
        let result = search.search(None, Some(Duration::ZERO)).unwrap();
        assert!(result.evaluations.is_empty());
        assert!(result.best.is_none());
    }

    #[test]
    fn test_starting_points_first() {
        let mut problem = Problem::new(space());
        problem
            .add_starting_point(BTreeMap::from([(
                "kind".to_string(),
                Some(Value::Cat("b".to_string())),
            )]))
            .unwrap();
        let mut search = Ambs::new(problem, sequential(), config()).unwrap();
        let batch = search.get_random_batch(3).unwrap();
        assert_eq!(batch.len(), 3);
        assert!(batch[0]["x"].is_missing());
        assert_eq!(batch[0]["kind"], Value::Cat("b".to_string()));
        // missing values are told as failures
        search.search(Some(3), None).unwrap();
        assert_eq!(search.evaluations()[0].outcome, Outcome::Failure);
    }

    const RESULTS: &str = "\
x,kind,objective,job_id
0.5,b,0.75,0
3.0,a,-4.0,1
4.5,c,F,2
1.2,b,0.96,3
-2.0,c,-9.0,4
-1.0,a,-4.0,5
";

    #[test]
    fn test_fit_surrogate() {
        let checkpoint = Checkpoint::from_reader(RESULTS.as_bytes()).unwrap();
        let mut search = Ambs::new(Problem::new(space()), sequential(), config()).unwrap();
        search.fit_surrogate(&checkpoint).unwrap();
        assert!(search.optimizer().is_fitted());
        assert_eq!(search.optimizer().history().len(), 5);
        let best = search.optimizer().best().unwrap();
        assert_eq!(best.outcome, Outcome::Success(-0.96));

        let incompatible = Checkpoint::from_reader("x,objective\n1.0,2.0\n".as_bytes()).unwrap();
        assert!(matches!(
            search.fit_surrogate(&incompatible),
            Err(AmbsError::IncompatibleCheckpoint(_))
        ));
        assert_eq!(search.optimizer().history().len(), 5);

        let mut problem = Problem::new(space());
        problem
            .add_starting_point(BTreeMap::from([("x".to_string(), Some(Value::Real(1.)))]))
            .unwrap();
        search.problem = problem;
        // warm started: no starting point
        let batch = search.get_random_batch(2).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|c| !c["kind"].is_missing()));
    }

    #[test]
    fn test_failed_fit_surrogate_keeps_starting_points() {
        let checkpoint =
            Checkpoint::from_reader("x,kind,objective\n0.5,b,0.75\n1.0,a,nan\n".as_bytes())
                .unwrap();
        let mut problem = Problem::new(space());
        problem
            .add_starting_point(BTreeMap::from([(
                "kind".to_string(),
                Some(Value::Cat("b".to_string())),
            )]))
            .unwrap();
        let mut search = Ambs::new(problem, sequential(), config()).unwrap();
        assert!(matches!(
            search.fit_surrogate(&checkpoint),
            Err(AmbsError::IncompatibleCheckpoint(_))
        ));
        assert!(!search.warm_started);
        assert!(search.optimizer().history().is_empty());
        assert_eq!(search.optimizer().n_initial_points_left(), 5);

        search.search(Some(3), None).unwrap();
        let first = &search.evaluator().submitted[0][0];
        assert!(first["x"].is_missing());
        assert_eq!(first["kind"], Value::Cat("b".to_string()));
    }

    #[test]
    fn test_fit_search_space() {
        let checkpoint = Checkpoint::from_reader(RESULTS.as_bytes()).unwrap();
        let mut search = Ambs::new(Problem::new(space()), sequential(), config()).unwrap();
        let report = search.fit_search_space(&checkpoint).unwrap();
        assert!(report.untouched.is_empty());
        let space = search.optimizer().space();
        match space.dimension("x").unwrap().domain() {
            Domain::Continuous { prior, .. } => assert_eq!(
                *prior,
                Prior::TruncatedNormal {
                    mu: 1.2,
                    sigma: 1.25
                }
            ),
            other => panic!("unexpected {other:?}"),
        }
        match space.dimension("kind").unwrap().domain() {
            Domain::Categorical { weights, .. } => {
                let weights = weights.as_ref().unwrap();
                assert!(weights[1] > weights[0]);
            }
            other => panic!("unexpected {other:?}"),
        }
        let result = search.search(Some(6), None).unwrap();
        assert_eq!(result.evaluations.len(), 6);
    }
}
