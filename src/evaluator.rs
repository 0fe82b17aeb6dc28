//! Evaluator contract consumed by the search and a local thread pool evaluator.
use crate::errors::{AmbsError, Result};
use ambs_optim::Outcome;
use ambs_space::NamedConfig;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How completed evaluations are collected
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatherMode {
    /// Return as soon as `min_count` evaluations are completed
    #[default]
    Batch,
    /// Wait for every outstanding evaluation (lock-step)
    All,
}

impl FromStr for GatherMode {
    type Err = AmbsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "BATCH" => Ok(GatherMode::Batch),
            "ALL" => Ok(GatherMode::All),
            _ => Err(AmbsError::InvalidConfig(format!("unknown gather mode '{s}'"))),
        }
    }
}

impl fmt::Display for GatherMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GatherMode::Batch => write!(f, "BATCH"),
            GatherMode::All => write!(f, "ALL"),
        }
    }
}

/// A completed evaluation, the objective being maximized
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Evaluated configuration
    pub config: NamedConfig,
    /// Objective value or failure
    pub outcome: Outcome,
    /// Wall-clock duration of the evaluation
    pub elapsed: Duration,
}

/// Executes batches of configurations, possibly on remote workers.
/// Calls may block for an arbitrary time.
pub trait Evaluator {
    /// Number of evaluations that can run concurrently
    fn num_workers(&self) -> usize;

    /// Start the evaluation of `batch`
    fn submit(&mut self, batch: Vec<NamedConfig>) -> Result<()>;

    /// Collect completed evaluations. Returns an empty list when nothing is
    /// in flight.
    fn gather(&mut self, mode: GatherMode, min_count: usize) -> Result<Vec<Evaluation>>;
}

/// Objective of the [`ThreadEvaluator`], returning the value to maximize
pub trait RunFunction: Fn(&NamedConfig) -> anyhow::Result<f64> + Send + Sync + 'static {}
impl<F> RunFunction for F where F: Fn(&NamedConfig) -> anyhow::Result<f64> + Send + Sync + 'static {}

/// Evaluator running the objective on a local rayon thread pool.
///
/// Objective errors, panics and non-finite values are reported as
/// [`Outcome::Failure`].
pub struct ThreadEvaluator<F: RunFunction> {
    run: Arc<F>,
    pool: rayon::ThreadPool,
    num_workers: usize,
    sender: Sender<Evaluation>,
    receiver: Receiver<Evaluation>,
    in_flight: usize,
}

impl<F: RunFunction> ThreadEvaluator<F> {
    /// Evaluator of `run` with `num_workers` threads
    pub fn new(run: F, num_workers: usize) -> Result<Self> {
        if num_workers == 0 {
            return Err(AmbsError::InvalidConfig(
                "evaluator needs at least one worker".to_string(),
            ));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .build()
            .map_err(|e| AmbsError::Evaluator(e.to_string()))?;
        let (sender, receiver) = channel();
        Ok(ThreadEvaluator {
            run: Arc::new(run),
            pool,
            num_workers,
            sender,
            receiver,
            in_flight: 0,
        })
    }

    /// Number of submitted evaluations not gathered yet
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    fn receive(&mut self) -> Result<Evaluation> {
        let evaluation = self
            .receiver
            .recv()
            .map_err(|e| AmbsError::Evaluator(e.to_string()))?;
        self.in_flight -= 1;
        Ok(evaluation)
    }
}

fn evaluate<F: RunFunction>(run: &F, config: NamedConfig) -> Evaluation {
    let start = Instant::now();
    let outcome = match catch_unwind(AssertUnwindSafe(|| run(&config))) {
        Ok(Ok(value)) if value.is_finite() => Outcome::Success(value),
        Ok(Ok(value)) => {
            warn!("Non-finite objective {value} for {config:?}");
            Outcome::Failure
        }
        Ok(Err(err)) => {
            warn!("Evaluation of {config:?} failed: {err}");
            Outcome::Failure
        }
        Err(_) => {
            warn!("Evaluation of {config:?} panicked");
            Outcome::Failure
        }
    };
    Evaluation {
        config,
        outcome,
        elapsed: start.elapsed(),
    }
}

impl<F: RunFunction> Evaluator for ThreadEvaluator<F> {
    fn num_workers(&self) -> usize {
        self.num_workers
    }

    fn submit(&mut self, batch: Vec<NamedConfig>) -> Result<()> {
        debug!("Submitting {} configuration(s)", batch.len());
        for config in batch {
            let run = Arc::clone(&self.run);
            let sender = self.sender.clone();
            self.pool.spawn(move || {
                // the receiver lives as long as the evaluator
                sender.send(evaluate(run.as_ref(), config)).ok();
            });
            self.in_flight += 1;
        }
        Ok(())
    }

    fn gather(&mut self, mode: GatherMode, min_count: usize) -> Result<Vec<Evaluation>> {
        let mut done = vec![];
        let wanted = match mode {
            GatherMode::All => self.in_flight,
            GatherMode::Batch => min_count.max(1).min(self.in_flight),
        };
        while done.len() < wanted {
            done.push(self.receive()?);
        }
        if mode == GatherMode::Batch {
            while let Ok(evaluation) = self.receiver.try_recv() {
                self.in_flight -= 1;
                done.push(evaluation);
            }
        }
        Ok(done)
    }
}
