//! Prior-guided reshaping of a search space around a known good configuration.
use crate::conditions::{translate_all, TranslationReport};
use crate::dimension::{Domain, Prior};
use crate::errors::Result;
use crate::space::Space;
use crate::value::{NamedConfig, Value};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Default factor applied to the range of numeric dimensions to get sigma
pub const DEFAULT_FAC_NUMERICAL: f64 = 0.125;
/// Default weight of the best category (others get 1 before normalization)
pub const DEFAULT_FAC_CATEGORICAL: f64 = 10.;

/// A dimension kept unchanged by the reshaping
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UntouchedDimension {
    /// Dimension name
    pub name: String,
    /// Why the dimension was kept as is
    pub reason: String,
}

/// What the reshaping could not handle
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReshapeReport {
    /// Dimensions kept unchanged
    pub untouched: Vec<UntouchedDimension>,
    /// Conditions and forbidden clauses left untranslated
    pub clauses: TranslationReport,
}

impl ReshapeReport {
    fn untouched(&mut self, name: &str, reason: String) {
        warn!("Not fitting dimension '{name}': {reason}");
        self.untouched.push(UntouchedDimension {
            name: name.to_string(),
            reason,
        });
    }
}

/// Build a new space whose sampling distributions concentrate around `best`.
///
/// * numeric dimensions get a truncated normal prior with `mu = best` and
///   `sigma = max(1, (upper - lower) * fac_numerical)`,
/// * categorical dimensions get weight `fac_categorical` on the best category
///   and 1 elsewhere, normalized.
///
/// Dimensions absent from `best` (or with a missing value) are kept unchanged.
/// Conditions and forbidden clauses are translated onto the new space, the
/// ones which cannot be translated are kept as is and reported.
pub fn reshape_around(
    space: &Space,
    best: &NamedConfig,
    fac_numerical: f64,
    fac_categorical: f64,
) -> Result<(Space, ReshapeReport)> {
    let mut report = ReshapeReport::default();
    let mut dims = Vec::with_capacity(space.len());
    for dim in space.dimensions() {
        let value = match best.get(dim.name()) {
            Some(v) if !v.is_missing() => v,
            Some(_) => {
                report.untouched(dim.name(), "missing value in best configuration".to_string());
                dims.push(dim.clone());
                continue;
            }
            None => {
                report.untouched(dim.name(), "not found in the results".to_string());
                dims.push(dim.clone());
                continue;
            }
        };
        let reshaped = match (dim.domain(), value.as_f64()) {
            (Domain::Continuous { lower, upper, .. }, Some(mu)) => {
                let sigma = f64::max(1.0, (upper - lower) * fac_numerical);
                Some(dim.clone().with_prior(Prior::TruncatedNormal { mu, sigma })?)
            }
            (Domain::Integer { lower, upper, .. }, Some(mu)) => {
                let sigma = f64::max(1.0, (upper - lower) as f64 * fac_numerical);
                Some(dim.clone().with_prior(Prior::TruncatedNormal { mu, sigma })?)
            }
            (Domain::Categorical { choices, .. }, None) => {
                match choices.iter().position(|choice| Value::from(choice.as_str()) == *value) {
                    Some(index) => {
                        let mut weights = vec![1.0; choices.len()];
                        weights[index] = fac_categorical;
                        let total: f64 = weights.iter().sum();
                        let weights: Vec<f64> = weights.iter().map(|w| w / total).collect();
                        Some(dim.clone().with_weights(&weights)?)
                    }
                    None => None,
                }
            }
            _ => None,
        };
        match reshaped {
            Some(d) => dims.push(d),
            None => {
                report.untouched(dim.name(), format!("value {value} not supported"));
                dims.push(dim.clone());
            }
        }
    }
    let reshaped = Space::new(dims)?;
    let (conditions, forbiddens, clauses) = translate_all(space, &reshaped);
    report.clauses = clauses;
    info!(
        "Search space reshaped ({} untouched dimension(s), {} untranslated clause(s))",
        report.untouched.len(),
        report.clauses.unsupported.len()
    );
    Ok((reshaped.with_clauses(conditions, forbiddens), report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Condition, Dimension, Forbidden, Scale};
    use approx::assert_abs_diff_eq;
    use ndarray_rand::rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    fn space() -> Space {
        Space::new(vec![
            Dimension::continuous("x", 0., 100., Scale::Linear).unwrap(),
            Dimension::integer("n", 0, 4).unwrap(),
            Dimension::categorical("c", &["a", "b", "c"]).unwrap(),
            Dimension::integer("unseen", 0, 4).unwrap(),
        ])
        .unwrap()
    }

    fn best() -> NamedConfig {
        let mut best = NamedConfig::new();
        best.insert("x".to_string(), Value::Real(80.));
        best.insert("n".to_string(), Value::Int(2));
        best.insert("c".to_string(), Value::from("b"));
        best
    }

    #[test]
    fn test_reshape_priors_and_weights() {
        let (sp, report) = reshape_around(
            &space(),
            &best(),
            DEFAULT_FAC_NUMERICAL,
            DEFAULT_FAC_CATEGORICAL,
        )
        .unwrap();
        match sp.dimensions()[0].domain() {
            Domain::Continuous {
                prior: Prior::TruncatedNormal { mu, sigma },
                ..
            } => {
                assert_abs_diff_eq!(*mu, 80.);
                assert_abs_diff_eq!(*sigma, 12.5);
            }
            other => panic!("unexpected {other:?}"),
        }
        match sp.dimensions()[1].domain() {
            // range 4 * 0.125 < 1
            Domain::Integer {
                prior: Prior::TruncatedNormal { sigma, .. },
                ..
            } => assert_abs_diff_eq!(*sigma, 1.),
            other => panic!("unexpected {other:?}"),
        }
        match sp.dimensions()[2].domain() {
            Domain::Categorical {
                weights: Some(w), ..
            } => {
                assert_abs_diff_eq!(w[1], 10. / 12.);
                assert_abs_diff_eq!(w[0], 1. / 12.);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(sp.dimensions()[3], space().dimensions()[3]);
        assert_eq!(report.untouched.len(), 1);
        assert_eq!(report.untouched[0].name, "unseen");

        let mut rng = Xoshiro256Plus::seed_from_u64(0);
        let samples = sp.sample(200, &mut rng);
        let mean: f64 = samples.iter().map(|c| c[0].as_f64().unwrap()).sum::<f64>() / 200.;
        assert!((mean - 80.).abs() < 10., "got {mean}");
    }

    #[test]
    fn test_reshape_keeps_clauses() {
        let sp = space()
            .with_conditions(vec![Condition::Equals {
                child: "x".to_string(),
                parent: "c".to_string(),
                value: Value::from("a"),
            }])
            .unwrap()
            .with_forbiddens(vec![Forbidden::Relation {
                left: "n".to_string(),
                right: "unseen".to_string(),
                relation: "equal".to_string(),
            }])
            .unwrap();
        let (reshaped, report) = reshape_around(&sp, &best(), 0.125, 10.).unwrap();
        assert_eq!(reshaped.conditions(), sp.conditions());
        assert_eq!(reshaped.forbiddens(), sp.forbiddens());
        assert_eq!(report.clauses.unsupported.len(), 1);
    }
}
