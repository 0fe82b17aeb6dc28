//! Observation history and failure imputation.
use crate::config::FailurePolicy;
use ambs_space::Config;
use serde::{Deserialize, Serialize};

/// Result of one evaluation as seen by the optimizer
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    /// Objective value (to be minimized)
    Success(f64),
    /// The evaluation failed
    Failure,
}

impl Outcome {
    /// Objective value of a success
    pub fn value(&self) -> Option<f64> {
        match self {
            Outcome::Success(v) => Some(*v),
            Outcome::Failure => None,
        }
    }

    /// Whether the evaluation failed
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure)
    }
}

impl From<f64> for Outcome {
    fn from(value: f64) -> Self {
        Outcome::Success(value)
    }
}

/// One told configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Configuration in dimension order
    pub config: Config,
    /// Evaluation outcome
    pub outcome: Outcome,
    /// Evaluation duration in seconds
    pub cost: Option<f64>,
}

/// Append-only list of observations
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    records: Vec<Observation>,
}

impl History {
    /// Append an observation
    pub fn push(&mut self, observation: Observation) {
        self.records.push(observation);
    }

    /// Number of observations
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing was observed
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Observations in telling order
    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.records.iter()
    }

    /// Observed configurations in telling order
    pub fn configs(&self) -> Vec<Config> {
        self.records.iter().map(|r| r.config.clone()).collect()
    }

    /// Number of failed observations
    pub fn n_failures(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_failure()).count()
    }

    /// Observation with the lowest successful objective
    pub fn best(&self) -> Option<&Observation> {
        self.records
            .iter()
            .filter(|r| r.outcome.value().is_some())
            .min_by(|a, b| {
                let (a, b) = (a.outcome.value(), b.outcome.value());
                a.unwrap_or(f64::INFINITY)
                    .total_cmp(&b.unwrap_or(f64::INFINITY))
            })
    }

    /// Objective values used to fit a surrogate, failures being imputed with
    /// the aggregate of successes given by `policy`.
    /// Returns `None` while no evaluation succeeded.
    pub fn targets(&self, policy: FailurePolicy) -> Option<Vec<f64>> {
        let successes: Vec<f64> = self
            .records
            .iter()
            .filter_map(|r| r.outcome.value())
            .collect();
        if successes.is_empty() {
            return None;
        }
        let imputed = match policy {
            FailurePolicy::Mean | FailurePolicy::Ignore => {
                successes.iter().sum::<f64>() / successes.len() as f64
            }
            FailurePolicy::Min => successes.iter().copied().fold(f64::INFINITY, f64::min),
            FailurePolicy::Max => successes.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        };
        Some(
            self.records
                .iter()
                .map(|r| r.outcome.value().unwrap_or(imputed))
                .collect(),
        )
    }

    /// Configurations and `ln(cost)` of the observations with a positive cost
    pub fn log_costs(&self) -> (Vec<Config>, Vec<f64>) {
        self.records
            .iter()
            .filter_map(|r| match r.cost {
                Some(c) if c > 0. && c.is_finite() => Some((r.config.clone(), c.ln())),
                _ => None,
            })
            .unzip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambs_space::Value;
    use approx::assert_abs_diff_eq;

    fn history(outcomes: &[Outcome]) -> History {
        let mut h = History::default();
        for (i, outcome) in outcomes.iter().enumerate() {
            h.push(Observation {
                config: vec![Value::Int(i as i64)],
                outcome: *outcome,
                cost: Some(i as f64),
            });
        }
        h
    }

    #[test]
    fn test_targets_imputation() {
        let h = history(&[
            Outcome::Success(1.),
            Outcome::Failure,
            Outcome::Success(3.),
            Outcome::Success(8.),
        ]);
        assert_eq!(h.n_failures(), 1);
        assert_abs_diff_eq!(h.targets(FailurePolicy::Mean).unwrap()[1], 4.);
        assert_abs_diff_eq!(h.targets(FailurePolicy::Min).unwrap()[1], 1.);
        assert_abs_diff_eq!(h.targets(FailurePolicy::Max).unwrap()[1], 8.);
        assert_eq!(h.targets(FailurePolicy::Max).unwrap().len(), 4);
    }

    #[test]
    fn test_no_success() {
        let h = history(&[Outcome::Failure, Outcome::Failure]);
        assert!(h.targets(FailurePolicy::Mean).is_none());
        assert!(h.best().is_none());
    }

    #[test]
    fn test_best_and_costs() {
        let h = history(&[Outcome::Success(2.), Outcome::Failure, Outcome::Success(-1.)]);
        assert_eq!(h.best().map(|r| r.config.clone()), Some(vec![Value::Int(2)]));
        // zero cost of the first record is skipped
        let (configs, costs) = h.log_costs();
        assert_eq!(configs.len(), 2);
        assert_abs_diff_eq!(costs[1], 2f64.ln());
    }
}
