//! Ask/tell optimizer over a search space.
//!
//! The optimizer is *cold* until `n_initial_points` evaluations have been told:
//! it then samples the space (or asks the installed [`PointGenerator`]). Once
//! warm it refits its surrogate at each tell and proposes new points by scoring
//! a large pool of random candidates with the acquisition function. The pool is
//! drawn from a seed renewed at each refit: asking again without telling returns
//! the same points.
use crate::acquisition::{gaussian_acquisition, AcqFunc};
use crate::config::{
    AcqOptimizer, FailurePolicy, MultiPointStrategy, OptimizerConfig, OptimizerValidConfig,
};
use crate::errors::{OptimError, Result};
use crate::history::{History, Observation, Outcome};
use crate::lbfgs::{self, AcqProblem};
use crate::portfolio::{Hedge, HEDGE_MEMBERS};
use ambs_space::{Config, Space};
use ambs_surrogate::{Surrogate, SurrogateKind, SurrogateModel, SurrogateParams};
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView2};
use ndarray_rand::rand::{Rng, SeedableRng};
use ndarray_stats::QuantileExt;
use rand_xoshiro::Xoshiro256Plus;
use std::collections::HashSet;
use std::time::Instant;

/// A source of configurations used instead of random sampling while the
/// optimizer is cold (e.g. a generative model trained on previous results)
pub trait PointGenerator: Send + Sync {
    /// Generate `n` configurations of `space`
    fn generate(&mut self, space: &Space, n: usize, rng: &mut Xoshiro256Plus) -> Vec<Config>;
}

/// Selected candidate: pool index, encoded point and hedge proposals
type Pick = (usize, Array1<f64>, Option<Array2<f64>>);

/// Surrogate-based optimizer with an ask/tell interface, minimizing the told
/// objective values.
///
/// ```
/// use ambs_optim::{MultiPointStrategy, Optimizer, OptimizerConfig, Outcome};
/// use ambs_space::{Dimension, Scale, Space};
///
/// let space = Space::new(vec![Dimension::continuous("x", -2., 2., Scale::Linear).unwrap()]).unwrap();
/// let config = OptimizerConfig::default().n_initial_points(5).n_points(200).seed(0);
/// let mut opt = Optimizer::new(space, config).unwrap();
/// for _ in 0..4 {
///     let xs = opt.ask(3, MultiPointStrategy::ClMax).unwrap();
///     let ys: Vec<Outcome> = xs
///         .iter()
///         .map(|x| Outcome::Success(x[0].as_f64().unwrap().powi(2)))
///         .collect();
///     opt.tell(&xs, &ys).unwrap();
/// }
/// assert!(opt.is_fitted());
/// assert_eq!(opt.history().len(), 12);
/// ```
pub struct Optimizer {
    space: Space,
    config: OptimizerValidConfig,
    surrogate: SurrogateParams,
    history: History,
    model: Option<SurrogateModel>,
    cost_model: Option<SurrogateModel>,
    hedge: Option<Hedge>,
    rng: Xoshiro256Plus,
    ask_seed: u64,
    n_initial_remaining: usize,
    initial_skipped: bool,
    generator: Option<Box<dyn PointGenerator>>,
}

impl Optimizer {
    /// Build an optimizer of `space` after checking `config`
    pub fn new(space: Space, config: OptimizerConfig) -> Result<Self> {
        let config = config.check()?;
        check_space(&space, &config)?;
        let mut rng = if let Some(seed) = config.seed {
            Xoshiro256Plus::seed_from_u64(seed)
        } else {
            Xoshiro256Plus::from_entropy()
        };
        let surrogate = SurrogateParams::new(config.surrogate)
            .n_jobs(config.n_jobs)
            .seed(rng.gen());
        let hedge = (config.acq_func == AcqFunc::GpHedge).then(Hedge::default);
        let ask_seed = rng.gen();
        Ok(Optimizer {
            space,
            n_initial_remaining: config.n_initial_points,
            config,
            surrogate,
            history: History::default(),
            model: None,
            cost_model: None,
            hedge,
            rng,
            ask_seed,
            initial_skipped: false,
            generator: None,
        })
    }

    /// Search space
    pub fn space(&self) -> &Space {
        &self.space
    }

    /// Validated options
    pub fn config(&self) -> &OptimizerValidConfig {
        &self.config
    }

    /// Told observations
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Current surrogate, if fitted
    pub fn model(&self) -> Option<&SurrogateModel> {
        self.model.as_ref()
    }

    /// Whether asks are driven by the surrogate
    pub fn is_fitted(&self) -> bool {
        self.model.is_some()
    }

    /// Number of evaluations still expected before the surrogate is fitted
    pub fn n_initial_points_left(&self) -> usize {
        self.n_initial_remaining
    }

    /// Best successful observation
    pub fn best(&self) -> Option<&Observation> {
        self.history.best()
    }

    /// Install a generator of initial points
    pub fn set_generator(&mut self, generator: Box<dyn PointGenerator>) {
        self.generator = Some(generator);
    }

    /// Tell outcomes of configurations `x`
    pub fn tell(&mut self, x: &[Config], y: &[Outcome]) -> Result<()> {
        self.tell_records(x, y, None)
    }

    /// Tell outcomes of configurations `x` with evaluation durations in seconds,
    /// required by per-second criteria
    pub fn tell_timed(&mut self, x: &[Config], y: &[Outcome], costs: &[f64]) -> Result<()> {
        self.tell_records(x, y, Some(costs))
    }

    fn tell_records(&mut self, x: &[Config], y: &[Outcome], costs: Option<&[f64]>) -> Result<()> {
        if x.len() != y.len() {
            return Err(OptimError::InvalidValue(format!(
                "{} configurations told with {} outcomes",
                x.len(),
                y.len()
            )));
        }
        if let Some(costs) = costs {
            if costs.len() != x.len() {
                return Err(OptimError::InvalidValue(format!(
                    "{} configurations told with {} costs",
                    x.len(),
                    costs.len()
                )));
            }
        }
        for (config, outcome) in x.iter().zip(y.iter()) {
            self.space.validate(config)?;
            if let Outcome::Success(v) = outcome {
                if !v.is_finite() {
                    return Err(OptimError::InvalidValue(format!(
                        "objective value should be finite, got {v}"
                    )));
                }
            }
        }
        let ignore = self.config.filter_failures == FailurePolicy::Ignore;
        for (i, (config, outcome)) in x.iter().zip(y.iter()).enumerate() {
            if outcome.is_failure() && ignore {
                continue;
            }
            self.history.push(Observation {
                config: config.clone(),
                outcome: *outcome,
                cost: costs.map(|c| c[i]),
            });
        }
        self.n_initial_remaining = self.n_initial_remaining.saturating_sub(x.len());
        self.refit()
    }

    /// Mark initial exploration as done and fit the surrogate on the current history
    pub fn skip_initial_points(&mut self) -> Result<()> {
        self.initial_skipped = true;
        self.n_initial_remaining = 0;
        self.refit()
    }

    /// Replace the search space.
    ///
    /// The history is kept when `keep_history` is set, which requires a space
    /// with the same dimension names containing every told configuration.
    /// Nothing is changed when validation fails.
    pub fn reconfigure(&mut self, space: Space, keep_history: bool) -> Result<()> {
        check_space(&space, &self.config)?;
        let history = if keep_history {
            if !self.space.is_compatible(&space) {
                return Err(OptimError::InvalidConfig(
                    "history can only be kept with the same dimension names".to_string(),
                ));
            }
            for observation in self.history.iter() {
                space.validate(&observation.config)?;
            }
            self.history.clone()
        } else {
            History::default()
        };
        self.n_initial_remaining = if self.initial_skipped {
            0
        } else {
            self.config.n_initial_points.saturating_sub(history.len())
        };
        self.space = space;
        self.history = history;
        self.refit()
    }

    fn refit(&mut self) -> Result<()> {
        self.ask_seed = self.rng.gen();
        self.model = None;
        self.cost_model = None;
        if !self.surrogate.is_trainable() || self.n_initial_remaining > 0 {
            return Ok(());
        }
        let Some(y) = self.history.targets(self.config.filter_failures) else {
            warn!("No successful evaluation yet, surrogate not fitted");
            return Ok(());
        };
        let now = Instant::now();
        let x = self.space.transform(&self.history.configs())?;
        let y = Array1::from(y);
        self.surrogate.set_seed(self.rng.gen());
        let model = self.surrogate.train(&x.view(), &y.view())?;
        if let Some(hedge) = self.hedge.as_mut() {
            hedge.update(&model)?;
        }
        if self.config.acq_func.is_per_second() {
            let (configs, log_costs) = self.history.log_costs();
            if configs.is_empty() {
                return Err(OptimError::InvalidValue(format!(
                    "{} criterion needs evaluation costs, use tell_timed",
                    self.config.acq_func
                )));
            }
            let xc = self.space.transform(&configs)?;
            let params = self.surrogate.clone().seed(self.rng.gen());
            self.cost_model = Some(params.train(&xc.view(), &Array1::from(log_costs).view())?);
        }
        debug!(
            "Surrogate {} fitted on {} points in {:?}",
            model,
            x.nrows(),
            now.elapsed()
        );
        self.model = Some(model);
        Ok(())
    }

    /// Propose `n` configurations to evaluate next.
    ///
    /// Once fitted, the proposals only depend on the state left by the last
    /// tell: repeated asks return the same configurations.
    pub fn ask(&mut self, n: usize, strategy: MultiPointStrategy) -> Result<Vec<Config>> {
        if n == 0 {
            return Ok(vec![]);
        }
        let Some(model) = self.model.as_ref() else {
            let points = match self.generator.as_mut() {
                Some(generator) => generator.generate(&self.space, n, &mut self.rng),
                None => self.space.sample(n, &mut self.rng),
            };
            for point in points.iter() {
                self.space.validate(point)?;
            }
            return Ok(points);
        };
        let now = Instant::now();
        let mut rng = Xoshiro256Plus::seed_from_u64(self.ask_seed);
        let (points, proposals) = self.ask_fitted(model, n, strategy, &mut rng)?;
        if let (Some(hedge), Some(proposals)) = (self.hedge.as_mut(), proposals) {
            hedge.record(proposals);
        }
        debug!("Asked {} points ({strategy}) in {:?}", points.len(), now.elapsed());
        Ok(points)
    }

    fn ask_fitted(
        &self,
        model: &SurrogateModel,
        n: usize,
        strategy: MultiPointStrategy,
        rng: &mut Xoshiro256Plus,
    ) -> Result<(Vec<Config>, Option<Array2<f64>>)> {
        let (pool, x_pool) = self.candidates(rng)?;
        let (mut points, proposals) = match strategy {
            MultiPointStrategy::ClMin | MultiPointStrategy::ClMean | MultiPointStrategy::ClMax => {
                self.constant_liar(model, &pool, &x_pool, n, strategy, rng)?
            }
            MultiPointStrategy::TopK | MultiPointStrategy::Boltzmann => {
                let y_opt = self.y_opt();
                let taken = vec![false; pool.len()];
                let (_, values, proposals) = self.score(model, &x_pool.view(), &taken, y_opt, rng)?;
                let selected = if strategy == MultiPointStrategy::TopK {
                    top_k(&values, n)
                } else {
                    boltzmann(&values, n, self.config.temperature, rng)
                };
                let points = selected.into_iter().map(|i| pool[i].clone()).collect();
                (points, proposals)
            }
        };
        while points.len() < n {
            points.push(self.random_config(rng));
        }
        Ok((points, proposals))
    }

    fn y_opt(&self) -> f64 {
        self.history
            .targets(self.config.filter_failures)
            .map_or(f64::INFINITY, |y| y.into_iter().fold(f64::INFINITY, f64::min))
    }

    fn random_config(&self, rng: &mut Xoshiro256Plus) -> Config {
        self.space
            .dimensions()
            .iter()
            .map(|d| d.sample(&mut *rng))
            .collect()
    }

    /// Pool of random candidates, without duplicates (within the pool and
    /// with the history) when `filter_duplicated` is set
    fn candidates(&self, rng: &mut Xoshiro256Plus) -> Result<(Vec<Config>, Array2<f64>)> {
        let n_points = self.config.n_points;
        let raw = self.space.sample(n_points, rng);
        if !self.config.filter_duplicated {
            let x = self.space.transform(&raw)?;
            return Ok((raw, x));
        }
        let mut seen: HashSet<Config> = self.history.iter().map(|r| r.config.clone()).collect();
        let mut pool = Vec::with_capacity(n_points);
        let mut batch = raw.clone();
        for round in 0..=self.config.max_dedup_rounds {
            for config in batch {
                if seen.insert(config.clone()) {
                    pool.push(config);
                }
            }
            if pool.len() >= n_points || round == self.config.max_dedup_rounds {
                break;
            }
            batch = self.space.sample(n_points - pool.len(), rng);
        }
        if pool.is_empty() {
            debug!("Search space exhausted, duplicated candidates are kept");
            pool = raw;
        }
        let x = self.space.transform(&pool)?;
        Ok((pool, x))
    }

    /// Acquisition values of the pool with the configured criterion.
    /// With `gp_hedge` every member proposes its best free candidate and
    /// one member is drawn to score the pool.
    fn score(
        &self,
        model: &SurrogateModel,
        x_pool: &ArrayView2<f64>,
        taken: &[bool],
        y_opt: f64,
        rng: &mut Xoshiro256Plus,
    ) -> Result<(AcqFunc, Array1<f64>, Option<Array2<f64>>)> {
        let params = &self.config.acq_params;
        let cost_model = self.cost_model.as_ref().map(|m| m as &dyn Surrogate);
        let Some(hedge) = self.hedge.as_ref() else {
            let criterion = self.config.acq_func;
            let values = gaussian_acquisition(x_pool, model, y_opt, criterion, params, cost_model)?;
            return Ok((criterion, values, None));
        };
        let mut proposals = Array2::zeros((HEDGE_MEMBERS.len(), x_pool.ncols()));
        let mut scores = Vec::with_capacity(HEDGE_MEMBERS.len());
        for (i, member) in HEDGE_MEMBERS.iter().enumerate() {
            let values = gaussian_acquisition(x_pool, model, y_opt, *member, params, None)?;
            if let Some(best) = best_free(&values, taken) {
                proposals.row_mut(i).assign(&x_pool.row(best));
            }
            scores.push(values);
        }
        let chosen = hedge.choose(rng);
        debug!("Hedge follows {}", HEDGE_MEMBERS[chosen]);
        Ok((HEDGE_MEMBERS[chosen], scores.swap_remove(chosen), Some(proposals)))
    }

    fn use_lbfgs(&self, model: &SurrogateModel) -> bool {
        match self.config.acq_optimizer {
            AcqOptimizer::Sampling => false,
            AcqOptimizer::Lbfgs => true,
            AcqOptimizer::Auto => model.has_gradients() && self.space.is_continuous(),
        }
    }

    /// Best free candidate, refined with L-BFGS when enabled
    fn pick_one(
        &self,
        model: &SurrogateModel,
        x_pool: &ArrayView2<f64>,
        taken: &[bool],
        y_opt: f64,
        rng: &mut Xoshiro256Plus,
    ) -> Result<Option<Pick>> {
        let (criterion, values, proposals) = self.score(model, x_pool, taken, y_opt, rng)?;
        let Some(best) = best_free(&values, taken) else {
            return Ok(None);
        };
        let mut x_best = x_pool.row(best).to_owned();
        if self.use_lbfgs(model) {
            let mut order: Vec<usize> = (0..values.len()).filter(|i| !taken[*i]).collect();
            order.sort_by(|a, b| values[*a].total_cmp(&values[*b]));
            order.truncate(self.config.n_restarts_optimizer);
            let mut best_value = values[best];
            for start in order {
                let problem = AcqProblem {
                    model,
                    cost_model: self.cost_model.as_ref().map(|m| m as &dyn Surrogate),
                    y_opt,
                    criterion,
                    params: &self.config.acq_params,
                };
                match lbfgs::minimize(problem, &x_pool.row(start)) {
                    Ok((x, value)) if value < best_value => {
                        best_value = value;
                        x_best = x;
                    }
                    Ok(_) => (),
                    Err(err) => debug!("L-BFGS refinement failed: {err}"),
                }
            }
        }
        Ok(Some((best, x_best, proposals)))
    }

    /// Constant liar: after each pick the surrogate is refitted on the history
    /// augmented with the picked point and a lie (min, mean or max of the
    /// objectives told so far, computed once before the first pick).
    fn constant_liar(
        &self,
        model: &SurrogateModel,
        pool: &[Config],
        x_pool: &Array2<f64>,
        n: usize,
        strategy: MultiPointStrategy,
        rng: &mut Xoshiro256Plus,
    ) -> Result<(Vec<Config>, Option<Array2<f64>>)> {
        let mut train_configs = self.history.configs();
        let mut y_train = self
            .history
            .targets(self.config.filter_failures)
            .unwrap_or_default();
        let lie = constant_lie(&y_train, strategy);
        let mut taken = vec![false; pool.len()];
        let mut liar_model: Option<SurrogateModel> = None;
        let mut first_proposals = None;
        let mut points = Vec::with_capacity(n);
        for i in 0..n {
            let current = liar_model.as_ref().unwrap_or(model);
            let y_opt = y_train.iter().copied().fold(f64::INFINITY, f64::min);
            let config = match self.pick_one(current, &x_pool.view(), &taken, y_opt, rng)? {
                Some((idx, x_best, proposals)) => {
                    taken[idx] = true;
                    if i == 0 {
                        first_proposals = proposals;
                    }
                    if x_best == x_pool.row(idx) {
                        pool[idx].clone()
                    } else {
                        self.space.inverse_transform(&x_best.view())
                    }
                }
                None => self.random_config(rng),
            };
            if i + 1 < n {
                train_configs.push(config.clone());
                y_train.push(lie);
                let x = self.space.transform(&train_configs)?;
                let y = Array1::from(y_train.clone());
                let params = self.surrogate.clone().seed(rng.gen());
                liar_model = Some(params.train(&x.view(), &y.view())?);
            }
            points.push(config);
        }
        Ok((points, first_proposals))
    }
}

/// Value told for pending points: min, mean or max of `y`
fn constant_lie(y: &[f64], strategy: MultiPointStrategy) -> f64 {
    match strategy {
        MultiPointStrategy::ClMin => y.iter().copied().fold(f64::INFINITY, f64::min),
        MultiPointStrategy::ClMax => y.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        _ => y.iter().sum::<f64>() / y.len() as f64,
    }
}

fn check_space(space: &Space, config: &OptimizerValidConfig) -> Result<()> {
    if space.is_empty() {
        return Err(OptimError::InvalidConfig(
            "search space has no dimension".to_string(),
        ));
    }
    if config.acq_optimizer == AcqOptimizer::Lbfgs
        && (config.surrogate != SurrogateKind::GP || !space.is_continuous())
    {
        return Err(OptimError::InvalidConfig(
            "lbfgs acquisition optimizer requires a GP surrogate on a continuous space"
                .to_string(),
        ));
    }
    Ok(())
}

/// Index of the lowest value among candidates not taken yet
fn best_free(values: &Array1<f64>, taken: &[bool]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(i, _)| !taken[*i])
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}

/// Indices of the `n` lowest values
fn top_k(values: &Array1<f64>, n: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|a, b| values[*a].total_cmp(&values[*b]));
    order.truncate(n);
    order
}

/// Draw `n` distinct indices with probability proportional to
/// `exp(u / temperature)`, `u` being the utility (negated values) rescaled to [0, 1]
fn boltzmann<R: Rng>(values: &Array1<f64>, n: usize, temperature: f64, rng: &mut R) -> Vec<usize> {
    let utility = values.mapv(|v| -v);
    let (lo, hi) = match (utility.min_skipnan(), utility.max_skipnan()) {
        (lo, hi) if hi > lo => (*lo, *hi),
        _ => (0., 1.),
    };
    let mut weights: Vec<f64> = utility
        .iter()
        .map(|u| {
            let scaled = ((u - lo) / (hi - lo)).clamp(0., 1.);
            if scaled.is_nan() {
                0.
            } else {
                (scaled / temperature).exp()
            }
        })
        .collect();
    let mut selected = Vec::with_capacity(n);
    for _ in 0..n.min(values.len()) {
        let total: f64 = weights.iter().sum();
        if total <= 0. {
            break;
        }
        let mut r = rng.gen::<f64>() * total;
        let mut idx = None;
        for (i, w) in weights.iter().enumerate() {
            if *w > 0. {
                idx = Some(i);
                if r < *w {
                    break;
                }
                r -= w;
            }
        }
        if let Some(i) = idx {
            selected.push(i);
            weights[i] = 0.;
        }
    }
    selected
}
