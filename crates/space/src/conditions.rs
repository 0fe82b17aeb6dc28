//! Conditional activation and forbidden clauses attached to a search space.
//!
//! Those relationships are carried along the space as data: sampling does not
//! enforce them. When a space is rebuilt (see [`crate::reshape_around`]) each
//! clause is translated onto the new space by a partial function, clauses which
//! cannot be translated are passed through and reported.
use crate::space::Space;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Activation condition of a child dimension depending on a parent value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    /// child active when parent == value
    Equals {
        /// Conditioned dimension
        child: String,
        /// Conditioning dimension
        parent: String,
        /// Parent value
        value: Value,
    },
    /// child active when parent != value
    NotEquals {
        /// Conditioned dimension
        child: String,
        /// Conditioning dimension
        parent: String,
        /// Parent value
        value: Value,
    },
    /// child active when parent < value
    LessThan {
        /// Conditioned dimension
        child: String,
        /// Conditioning dimension
        parent: String,
        /// Parent value
        value: Value,
    },
    /// child active when parent > value
    GreaterThan {
        /// Conditioned dimension
        child: String,
        /// Conditioning dimension
        parent: String,
        /// Parent value
        value: Value,
    },
    /// child active when parent is one of values
    In {
        /// Conditioned dimension
        child: String,
        /// Conditioning dimension
        parent: String,
        /// Parent values
        values: Vec<Value>,
    },
    /// All components hold
    And(Vec<Condition>),
    /// At least one component holds
    Or(Vec<Condition>),
    /// A condition kind known by the space definition layer only
    Custom {
        /// Kind of the condition
        kind: String,
        /// Conditioned dimension
        child: String,
        /// Conditioning dimension
        parent: String,
    },
}

/// Combination of values which must not be sampled
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Forbidden {
    /// name == value is forbidden
    Equals {
        /// Dimension name
        name: String,
        /// Forbidden value
        value: Value,
    },
    /// name in values is forbidden
    In {
        /// Dimension name
        name: String,
        /// Forbidden values
        values: Vec<Value>,
    },
    /// Conjunction of forbidden clauses
    And(Vec<Forbidden>),
    /// Relation between two dimensions (e.g. `left < right`)
    Relation {
        /// Left hand side dimension
        left: String,
        /// Right hand side dimension
        right: String,
        /// Relation name
        relation: String,
    },
}

impl Condition {
    /// Names of the dimensions referenced by the condition
    pub fn names(&self) -> Vec<&str> {
        match self {
            Condition::Equals { child, parent, .. }
            | Condition::NotEquals { child, parent, .. }
            | Condition::LessThan { child, parent, .. }
            | Condition::GreaterThan { child, parent, .. }
            | Condition::In { child, parent, .. }
            | Condition::Custom { child, parent, .. } => vec![child.as_str(), parent.as_str()],
            Condition::And(comps) | Condition::Or(comps) => {
                comps.iter().flat_map(|c| c.names()).collect()
            }
        }
    }
}

impl Forbidden {
    /// Names of the dimensions referenced by the clause
    pub fn names(&self) -> Vec<&str> {
        match self {
            Forbidden::Equals { name, .. } | Forbidden::In { name, .. } => vec![name.as_str()],
            Forbidden::And(comps) => comps.iter().flat_map(|c| c.names()).collect(),
            Forbidden::Relation { left, right, .. } => vec![left.as_str(), right.as_str()],
        }
    }
}

/// A clause which could not be translated onto a new space
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnsupportedClause {
    /// Clause rendered as text
    pub clause: String,
    /// Why the clause was not translated
    pub reason: String,
}

/// Outcome of the translation of one clause
#[derive(Clone, Debug, PartialEq)]
pub enum Translation<T> {
    /// Clause bound to the new space
    Translated(T),
    /// Clause left untouched
    Unsupported(T, String),
}

/// Accumulated report of clauses left untranslated
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslationReport {
    /// Untranslated clauses
    pub unsupported: Vec<UnsupportedClause>,
}

impl TranslationReport {
    /// Whether every clause was translated
    pub fn is_complete(&self) -> bool {
        self.unsupported.is_empty()
    }

    fn record<T: std::fmt::Debug>(&mut self, translation: Translation<T>) -> T {
        match translation {
            Translation::Translated(t) => t,
            Translation::Unsupported(t, reason) => {
                log::warn!("Clause {t:?} not translated: {reason}");
                self.unsupported.push(UnsupportedClause {
                    clause: format!("{t:?}"),
                    reason,
                });
                t
            }
        }
    }
}

fn check_value(space: &Space, name: &str, value: &Value) -> Result<(), String> {
    match space.dimension(name) {
        None => Err(format!("dimension '{name}' not found")),
        Some(dim) if !dim.contains(value) => {
            Err(format!("value {value} not in domain of '{name}'"))
        }
        Some(_) => Ok(()),
    }
}

fn check_leaf(space: &Space, child: &str, parent: &str, values: &[&Value]) -> Result<(), String> {
    if space.dimension(child).is_none() {
        return Err(format!("dimension '{child}' not found"));
    }
    values
        .iter()
        .try_for_each(|value| check_value(space, parent, value))
}

/// Translate a condition onto `space`
pub fn translate_condition(cond: &Condition, space: &Space) -> Translation<Condition> {
    let checked = match cond {
        Condition::Equals {
            child,
            parent,
            value,
        }
        | Condition::NotEquals {
            child,
            parent,
            value,
        } => check_leaf(space, child, parent, &[value]),
        Condition::LessThan {
            child,
            parent,
            value,
        }
        | Condition::GreaterThan {
            child,
            parent,
            value,
        } => match space.dimension(parent) {
            Some(dim) if dim.is_numeric() => check_leaf(space, child, parent, &[value]),
            Some(_) => Err(format!("ordering on categorical dimension '{parent}'")),
            None => Err(format!("dimension '{parent}' not found")),
        },
        Condition::In {
            child,
            parent,
            values,
        } => check_leaf(space, child, parent, &values.iter().collect::<Vec<_>>()),
        Condition::And(comps) | Condition::Or(comps) => {
            let mut translated = Vec::with_capacity(comps.len());
            for comp in comps {
                match translate_condition(comp, space) {
                    Translation::Translated(c) => translated.push(c),
                    Translation::Unsupported(_, reason) => {
                        return Translation::Unsupported(cond.clone(), reason)
                    }
                }
            }
            return Translation::Translated(match cond {
                Condition::And(_) => Condition::And(translated),
                _ => Condition::Or(translated),
            });
        }
        Condition::Custom { kind, .. } => Err(format!("condition kind '{kind}' not supported")),
    };
    match checked {
        Ok(()) => Translation::Translated(cond.clone()),
        Err(reason) => Translation::Unsupported(cond.clone(), reason),
    }
}

/// Translate a forbidden clause onto `space`
pub fn translate_forbidden(forbidden: &Forbidden, space: &Space) -> Translation<Forbidden> {
    let checked = match forbidden {
        Forbidden::Equals { name, value } => check_value(space, name, value),
        Forbidden::In { name, values } => values
            .iter()
            .try_for_each(|value| check_value(space, name, value)),
        Forbidden::And(comps) => {
            let mut translated = Vec::with_capacity(comps.len());
            for comp in comps {
                match translate_forbidden(comp, space) {
                    Translation::Translated(f) => translated.push(f),
                    Translation::Unsupported(_, reason) => {
                        return Translation::Unsupported(forbidden.clone(), reason)
                    }
                }
            }
            return Translation::Translated(Forbidden::And(translated));
        }
        Forbidden::Relation { relation, .. } => {
            Err(format!("forbidden relation '{relation}' not supported"))
        }
    };
    match checked {
        Ok(()) => Translation::Translated(forbidden.clone()),
        Err(reason) => Translation::Unsupported(forbidden.clone(), reason),
    }
}

/// Translate every condition and forbidden clause of `from` onto `to`,
/// untranslated clauses are kept as is and reported.
pub fn translate_all(from: &Space, to: &Space) -> (Vec<Condition>, Vec<Forbidden>, TranslationReport) {
    let mut report = TranslationReport::default();
    let conditions = from
        .conditions()
        .iter()
        .map(|c| report.record(translate_condition(c, to)))
        .collect();
    let forbiddens = from
        .forbiddens()
        .iter()
        .map(|f| report.record(translate_forbidden(f, to)))
        .collect();
    (conditions, forbiddens, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dimension, Scale};

    fn space() -> Space {
        Space::new(vec![
            Dimension::categorical("opt", &["sgd", "adam"]).unwrap(),
            Dimension::continuous("momentum", 0., 1., Scale::Linear).unwrap(),
            Dimension::integer("layers", 1, 8).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_translate_leaf_and_conjunction() {
        let sp = space();
        let eq = Condition::Equals {
            child: "momentum".to_string(),
            parent: "opt".to_string(),
            value: Value::from("sgd"),
        };
        assert_eq!(translate_condition(&eq, &sp), Translation::Translated(eq.clone()));
        let gt = Condition::GreaterThan {
            child: "momentum".to_string(),
            parent: "layers".to_string(),
            value: Value::Int(2),
        };
        let and = Condition::And(vec![eq, gt]);
        assert!(matches!(
            translate_condition(&and, &sp),
            Translation::Translated(Condition::And(v)) if v.len() == 2
        ));
    }

    #[test]
    fn test_unsupported_clauses_reported() {
        let sp = space()
            .with_conditions(vec![Condition::Custom {
                kind: "Fancy".to_string(),
                child: "momentum".to_string(),
                parent: "opt".to_string(),
            }])
            .unwrap()
            .with_forbiddens(vec![
                Forbidden::Relation {
                    left: "layers".to_string(),
                    right: "momentum".to_string(),
                    relation: "less".to_string(),
                },
                Forbidden::Equals {
                    name: "opt".to_string(),
                    value: Value::from("adam"),
                },
            ])
            .unwrap();
        let (conds, forbs, report) = translate_all(&sp, &sp);
        assert_eq!(conds.len(), 1);
        assert_eq!(forbs.len(), 2);
        assert_eq!(report.unsupported.len(), 2);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_value_outside_new_domain() {
        let sp = space();
        let f = Forbidden::In {
            name: "opt".to_string(),
            values: vec![Value::from("rmsprop")],
        };
        assert!(matches!(
            translate_forbidden(&f, &sp),
            Translation::Unsupported(_, _)
        ));
    }
}
