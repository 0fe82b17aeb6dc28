use crate::errors::{Result, SpaceError};
use crate::value::{Value, NA_CATEGORY};
use ndarray_rand::rand::Rng;
use ndarray_rand::rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Encoded coordinate used for a missing numeric value.
/// It lies outside the unit interval used for regular values.
pub const MISSING_ENCODED: f64 = -1.0;

const TRUNCATED_NORMAL_MAX_TRIES: usize = 1000;

/// Scale of a continuous dimension
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scale {
    /// Values are drawn uniformly in \[lower, upper\]
    Linear,
    /// Values are drawn log-uniformly in \[lower, upper\], requires lower > 0
    Log,
}

/// Sampling distribution of a numeric dimension
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Prior {
    /// Uniform with respect to the dimension scale
    Uniform,
    /// Normal distribution truncated to the dimension bounds
    TruncatedNormal {
        /// Location of the distribution
        mu: f64,
        /// Spread of the distribution
        sigma: f64,
    },
}

/// Domain definition of a dimension
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Domain {
    /// Real values in \[lower, upper\]
    Continuous {
        /// Lower bound
        lower: f64,
        /// Upper bound
        upper: f64,
        /// Linear or logarithmic scale
        scale: Scale,
        /// Sampling distribution
        prior: Prior,
    },
    /// Integer values in lower..=upper
    Integer {
        /// Lower bound (included)
        lower: i64,
        /// Upper bound (included)
        upper: i64,
        /// Sampling distribution
        prior: Prior,
    },
    /// Unordered labels with optional sampling weights
    Categorical {
        /// Available labels
        choices: Vec<String>,
        /// Optional sampling weights, one per choice
        weights: Option<Vec<f64>>,
    },
}

/// A named axis of the search space
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dimension {
    name: String,
    domain: Domain,
}

impl Dimension {
    /// Continuous dimension in \[lower, upper\] with the given scale
    pub fn continuous(name: &str, lower: f64, upper: f64, scale: Scale) -> Result<Self> {
        Self::new(
            name,
            Domain::Continuous {
                lower,
                upper,
                scale,
                prior: Prior::Uniform,
            },
        )
    }

    /// Integer dimension in lower..=upper
    pub fn integer(name: &str, lower: i64, upper: i64) -> Result<Self> {
        Self::new(
            name,
            Domain::Integer {
                lower,
                upper,
                prior: Prior::Uniform,
            },
        )
    }

    /// Categorical dimension with uniform sampling among `choices`
    pub fn categorical<S: AsRef<str>>(name: &str, choices: &[S]) -> Result<Self> {
        Self::new(
            name,
            Domain::Categorical {
                choices: choices.iter().map(|c| c.as_ref().to_string()).collect(),
                weights: None,
            },
        )
    }

    /// Dimension from an explicit domain, checked for consistency
    pub fn new(name: &str, domain: Domain) -> Result<Self> {
        let invalid = |reason: &str| SpaceError::InvalidDimension {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        match &domain {
            Domain::Continuous {
                lower,
                upper,
                scale,
                prior,
            } => {
                if !(lower.is_finite() && upper.is_finite() && lower < upper) {
                    return Err(invalid("bounds should be finite with lower < upper"));
                }
                if *scale == Scale::Log && *lower <= 0. {
                    return Err(invalid("log scale requires a positive lower bound"));
                }
                check_prior(prior).map_err(|r| invalid(r))?;
            }
            Domain::Integer {
                lower,
                upper,
                prior,
            } => {
                if lower > upper {
                    return Err(invalid("lower bound should not exceed upper bound"));
                }
                check_prior(prior).map_err(|r| invalid(r))?;
            }
            Domain::Categorical { choices, weights } => {
                if choices.is_empty() {
                    return Err(invalid("no choices"));
                }
                if let Some(w) = weights {
                    if w.len() != choices.len() {
                        return Err(invalid("one weight per choice expected"));
                    }
                    if w.iter().any(|v| !v.is_finite() || *v < 0.) || w.iter().sum::<f64>() <= 0. {
                        return Err(invalid("weights should be non negative and not all zero"));
                    }
                }
            }
        }
        Ok(Dimension {
            name: name.to_string(),
            domain,
        })
    }

    /// Set sampling weights of a categorical dimension
    pub fn with_weights(self, weights: &[f64]) -> Result<Self> {
        match self.domain {
            Domain::Categorical { choices, .. } => Self::new(
                &self.name,
                Domain::Categorical {
                    choices,
                    weights: Some(weights.to_vec()),
                },
            ),
            _ => Err(SpaceError::InvalidDimension {
                name: self.name,
                reason: "weights apply to categorical dimension only".to_string(),
            }),
        }
    }

    /// Set the sampling prior of a numeric dimension
    pub fn with_prior(self, new_prior: Prior) -> Result<Self> {
        let domain = match self.domain {
            Domain::Continuous {
                lower,
                upper,
                scale,
                ..
            } => Domain::Continuous {
                lower,
                upper,
                scale,
                prior: new_prior,
            },
            Domain::Integer { lower, upper, .. } => Domain::Integer {
                lower,
                upper,
                prior: new_prior,
            },
            Domain::Categorical { .. } => {
                return Err(SpaceError::InvalidDimension {
                    name: self.name,
                    reason: "prior applies to numeric dimension only".to_string(),
                })
            }
        };
        Self::new(&self.name, domain)
    }

    /// Dimension name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dimension domain
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Whether the dimension takes real values
    pub fn is_continuous(&self) -> bool {
        matches!(self.domain, Domain::Continuous { .. })
    }

    /// Whether the dimension is numeric (continuous or integer)
    pub fn is_numeric(&self) -> bool {
        !matches!(self.domain, Domain::Categorical { .. })
    }

    /// Sentinel standing for a missing value of this dimension
    pub fn missing_value(&self) -> Value {
        match self.domain {
            Domain::Categorical { .. } => Value::Cat(NA_CATEGORY.to_string()),
            _ => Value::Real(f64::NAN),
        }
    }

    /// Whether `value` belongs to the domain (missing sentinels are accepted)
    pub fn contains(&self, value: &Value) -> bool {
        if value.is_missing() {
            return true;
        }
        match (&self.domain, value) {
            (Domain::Continuous { lower, upper, .. }, Value::Real(v)) => {
                *lower <= *v && *v <= *upper
            }
            (Domain::Continuous { lower, upper, .. }, Value::Int(v)) => {
                *lower <= *v as f64 && *v as f64 <= *upper
            }
            (Domain::Integer { lower, upper, .. }, Value::Int(v)) => lower <= v && v <= upper,
            (Domain::Categorical { choices, .. }, Value::Cat(c)) => choices.contains(c),
            _ => false,
        }
    }

    /// Draw one value of the dimension
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Value {
        match &self.domain {
            Domain::Continuous {
                lower,
                upper,
                scale,
                prior,
            } => match prior {
                Prior::Uniform => {
                    let u: f64 = rng.gen();
                    let v = match scale {
                        Scale::Linear => lower + u * (upper - lower),
                        Scale::Log => (lower.ln() + u * (upper.ln() - lower.ln())).exp(),
                    };
                    Value::Real(v.clamp(*lower, *upper))
                }
                Prior::TruncatedNormal { mu, sigma } => {
                    Value::Real(truncated_normal(rng, *mu, *sigma, *lower, *upper))
                }
            },
            Domain::Integer {
                lower,
                upper,
                prior,
            } => match prior {
                Prior::Uniform => Value::Int(rng.gen_range(*lower..=*upper)),
                Prior::TruncatedNormal { mu, sigma } => {
                    let (lo, up) = (*lower as f64 - 0.5, *upper as f64 + 0.5);
                    let v = truncated_normal(rng, *mu, *sigma, lo, up).round() as i64;
                    Value::Int(v.clamp(*lower, *upper))
                }
            },
            Domain::Categorical { choices, weights } => {
                let idx = match weights {
                    None => rng.gen_range(0..choices.len()),
                    Some(w) => {
                        let total: f64 = w.iter().sum();
                        let mut u: f64 = rng.gen::<f64>() * total;
                        let mut idx = choices.len() - 1;
                        for (i, wi) in w.iter().enumerate() {
                            if u < *wi {
                                idx = i;
                                break;
                            }
                            u -= wi;
                        }
                        idx
                    }
                };
                Value::Cat(choices[idx].clone())
            }
        }
    }

    /// Number of encoded coordinates (one-hot for categorical)
    pub fn encoded_len(&self) -> usize {
        match &self.domain {
            Domain::Categorical { choices, .. } => choices.len(),
            _ => 1,
        }
    }

    /// Write the encoding of `value` in `out` (of length [`Dimension::encoded_len`]).
    /// Numeric values are mapped on \[0, 1\] wrt to the scale, categories are one-hot encoded.
    pub fn encode_into(&self, value: &Value, out: &mut [f64]) {
        match &self.domain {
            Domain::Continuous {
                lower,
                upper,
                scale,
                ..
            } => {
                out[0] = match value.as_f64() {
                    Some(v) if !v.is_nan() => match scale {
                        Scale::Linear => (v - lower) / (upper - lower),
                        Scale::Log => (v.ln() - lower.ln()) / (upper.ln() - lower.ln()),
                    },
                    _ => MISSING_ENCODED,
                };
            }
            Domain::Integer { lower, upper, .. } => {
                out[0] = match value.as_f64() {
                    Some(v) if !v.is_nan() => {
                        if upper > lower {
                            (v - *lower as f64) / (*upper - *lower) as f64
                        } else {
                            0.
                        }
                    }
                    _ => MISSING_ENCODED,
                };
            }
            Domain::Categorical { choices, .. } => {
                out.iter_mut().for_each(|v| *v = 0.);
                if let Value::Cat(c) = value {
                    if let Some(i) = choices.iter().position(|choice| choice == c) {
                        out[i] = 1.;
                    }
                }
            }
        }
    }

    /// Inverse of [`Dimension::encode_into`], encoded coordinates are clipped to \[0, 1\]
    pub fn decode(&self, encoded: &[f64]) -> Value {
        match &self.domain {
            Domain::Continuous {
                lower,
                upper,
                scale,
                ..
            } => {
                let u = encoded[0].clamp(0., 1.);
                let v = match scale {
                    Scale::Linear => lower + u * (upper - lower),
                    Scale::Log => (lower.ln() + u * (upper.ln() - lower.ln())).exp(),
                };
                Value::Real(v.clamp(*lower, *upper))
            }
            Domain::Integer { lower, upper, .. } => {
                let u = encoded[0].clamp(0., 1.);
                let v = (*lower as f64 + u * (*upper - *lower) as f64).round() as i64;
                Value::Int(v.clamp(*lower, *upper))
            }
            Domain::Categorical { choices, .. } => {
                let mut best = 0;
                for (i, v) in encoded.iter().enumerate() {
                    if *v > encoded[best] {
                        best = i;
                    }
                }
                Value::Cat(choices[best].clone())
            }
        }
    }

    /// Coerce a text field (e.g. read from a checkpoint) to a value of this dimension.
    /// Empty or `nan` fields give the missing sentinel.
    pub fn parse(&self, text: &str) -> Result<Value> {
        let text = text.trim();
        let parse_error = || SpaceError::ParseError {
            name: self.name.clone(),
            value: text.to_string(),
        };
        let missing = text.is_empty() || text.eq_ignore_ascii_case("nan");
        match &self.domain {
            Domain::Continuous { .. } => {
                if missing {
                    return Ok(self.missing_value());
                }
                text.parse::<f64>().map(Value::Real).map_err(|_| parse_error())
            }
            Domain::Integer { .. } => {
                if missing {
                    return Ok(self.missing_value());
                }
                match text.parse::<i64>() {
                    Ok(v) => Ok(Value::Int(v)),
                    Err(_) => {
                        let v = text.parse::<f64>().map_err(|_| parse_error())?;
                        if v.fract() == 0. {
                            Ok(Value::Int(v as i64))
                        } else {
                            Err(parse_error())
                        }
                    }
                }
            }
            Domain::Categorical { .. } => {
                if text.is_empty() {
                    Ok(self.missing_value())
                } else {
                    Ok(Value::Cat(text.to_string()))
                }
            }
        }
    }
}

fn check_prior(prior: &Prior) -> std::result::Result<(), &'static str> {
    match prior {
        Prior::Uniform => Ok(()),
        Prior::TruncatedNormal { mu, sigma } => {
            if mu.is_finite() && sigma.is_finite() && *sigma > 0. {
                Ok(())
            } else {
                Err("truncated normal prior requires finite mu and positive sigma")
            }
        }
    }
}

/// Rejection sampling of N(mu, sigma) restricted to \[lower, upper\],
/// falls back to uniform sampling when the acceptance rate is too low
fn truncated_normal<R: Rng>(rng: &mut R, mu: f64, sigma: f64, lower: f64, upper: f64) -> f64 {
    for _ in 0..TRUNCATED_NORMAL_MAX_TRIES {
        let z: f64 = rng.sample(StandardNormal);
        let v = mu + sigma * z;
        if lower <= v && v <= upper {
            return v;
        }
    }
    lower + rng.gen::<f64>() * (upper - lower)
}
