use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Reserved category used in place of a missing categorical value
pub const NA_CATEGORY: &str = "NA";

/// A value taken by one dimension of a configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Integer value
    Int(i64),
    /// Real value, `NaN` stands for a missing numeric value
    Real(f64),
    /// Category label, [`NA_CATEGORY`] stands for a missing categorical value
    Cat(String),
}

impl Value {
    /// Numeric view of the value (`None` for categories)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            Value::Cat(_) => None,
        }
    }

    /// Whether the value is the missing sentinel of its kind
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Real(v) => v.is_nan(),
            Value::Int(_) => false,
            Value::Cat(c) => c == NA_CATEGORY,
        }
    }
}

// Reals compare by bit pattern so that configurations can be used as
// hash keys when filtering duplicated candidates.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
            (Value::Cat(a), Value::Cat(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Int(v) => v.hash(state),
            Value::Real(v) => v.to_bits().hash(state),
            Value::Cat(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Cat(v) => write!(f, "{v}"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Cat(v.to_string())
    }
}

/// A configuration as a list of values given in dimension order
pub type Config = Vec<Value>;

/// A configuration as a mapping from dimension name to value
pub type NamedConfig = BTreeMap<String, Value>;
