//! Hyperparameter problem: a search space and optional starting points.
use crate::errors::Result;
use ambs_space::{Config, NamedConfig, Space, Value};
use std::collections::BTreeMap;

/// Search space to explore with configurations to evaluate first
#[derive(Clone, Debug, PartialEq)]
pub struct Problem {
    space: Space,
    starting_points: Vec<Config>,
}

impl Problem {
    /// A problem without starting point
    pub fn new(space: Space) -> Self {
        Problem {
            space,
            starting_points: vec![],
        }
    }

    /// Add a starting point. Dimensions absent from `point` or set to `None`
    /// get the missing sentinel of their dimension (`NaN` or `"NA"`).
    pub fn add_starting_point(&mut self, point: BTreeMap<String, Option<Value>>) -> Result<()> {
        let config = self.space.complete(&point)?;
        self.starting_points.push(config);
        Ok(())
    }

    /// Add a fully specified starting point
    pub fn with_starting_point(mut self, point: &NamedConfig) -> Result<Self> {
        let partial = point
            .iter()
            .map(|(k, v)| (k.clone(), Some(v.clone())))
            .collect();
        self.add_starting_point(partial)?;
        Ok(self)
    }

    /// Search space
    pub fn space(&self) -> &Space {
        &self.space
    }

    /// Dimension names in order
    pub fn hyperparameter_names(&self) -> Vec<&str> {
        self.space.names()
    }

    /// Starting points in list form
    pub fn starting_points(&self) -> &[Config] {
        &self.starting_points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambs_space::{Dimension, Scale, NA_CATEGORY};

    #[test]
    fn test_starting_points_with_missing_values() {
        let space = Space::new(vec![
            Dimension::continuous("lr", 1e-4, 1e-1, Scale::Log).unwrap(),
            Dimension::integer("units", 1, 64).unwrap(),
            Dimension::categorical("activation", &["relu", "tanh"]).unwrap(),
        ])
        .unwrap();
        let mut problem = Problem::new(space);
        let point = BTreeMap::from([
            ("units".to_string(), Some(Value::Int(32))),
            ("activation".to_string(), None),
        ]);
        problem.add_starting_point(point).unwrap();
        let start = &problem.starting_points()[0];
        assert!(start[0].as_f64().unwrap().is_nan());
        assert_eq!(start[1], Value::Int(32));
        assert_eq!(start[2], Value::Cat(NA_CATEGORY.to_string()));

        let unknown = BTreeMap::from([("dropout".to_string(), Some(Value::Real(0.1)))]);
        assert!(problem.add_starting_point(unknown).is_err());
        let out = BTreeMap::from([("units".to_string(), Some(Value::Int(100)))]);
        assert!(problem.add_starting_point(out).is_err());
        assert_eq!(problem.starting_points().len(), 1);
    }
}
