use crate::conditions::{Condition, Forbidden};
use crate::dimension::Dimension;
use crate::errors::{Result, SpaceError};
use crate::value::{Config, NamedConfig, Value};
use ndarray::{Array1, Array2, ArrayView1};
use ndarray_rand::rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// An ordered list of named dimensions plus the conditions and forbidden
/// clauses relating them.
///
/// ```
/// use ambs_space::{Dimension, Scale, Space};
/// use ndarray_rand::rand::SeedableRng;
/// use rand_xoshiro::Xoshiro256Plus;
///
/// let space = Space::new(vec![
///     Dimension::continuous("lr", 1e-4, 1e-1, Scale::Log).unwrap(),
///     Dimension::integer("units", 8, 128).unwrap(),
///     Dimension::categorical("act", &["relu", "tanh"]).unwrap(),
/// ])
/// .unwrap();
/// let mut rng = Xoshiro256Plus::seed_from_u64(42);
/// let configs = space.sample(5, &mut rng);
/// assert_eq!(configs.len(), 5);
/// assert_eq!(space.transform(&configs).unwrap().ncols(), 4);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Space {
    dims: Vec<Dimension>,
    #[serde(default)]
    conditions: Vec<Condition>,
    #[serde(default)]
    forbiddens: Vec<Forbidden>,
}

impl Space {
    /// Space from a list of dimensions with distinct names
    pub fn new(dims: Vec<Dimension>) -> Result<Self> {
        let mut names = HashSet::new();
        for dim in dims.iter() {
            if !names.insert(dim.name()) {
                return Err(SpaceError::DuplicatedName(dim.name().to_string()));
            }
        }
        Ok(Space {
            dims,
            conditions: vec![],
            forbiddens: vec![],
        })
    }

    /// Attach conditions, every referenced dimension should exist
    pub fn with_conditions(mut self, conditions: Vec<Condition>) -> Result<Self> {
        for name in conditions.iter().flat_map(|c| c.names()) {
            self.check_name(name)?;
        }
        self.conditions = conditions;
        Ok(self)
    }

    /// Attach forbidden clauses, every referenced dimension should exist
    pub fn with_forbiddens(mut self, forbiddens: Vec<Forbidden>) -> Result<Self> {
        for name in forbiddens.iter().flat_map(|f| f.names()) {
            self.check_name(name)?;
        }
        self.forbiddens = forbiddens;
        Ok(self)
    }

    // Clauses coming out of a translation are kept even when they do
    // not bind to this space anymore.
    pub(crate) fn with_clauses(
        mut self,
        conditions: Vec<Condition>,
        forbiddens: Vec<Forbidden>,
    ) -> Self {
        self.conditions = conditions;
        self.forbiddens = forbiddens;
        self
    }

    fn check_name(&self, name: &str) -> Result<()> {
        self.index_of(name)
            .map(|_| ())
            .ok_or_else(|| SpaceError::UnknownDimension(name.to_string()))
    }

    /// Number of dimensions
    pub fn len(&self) -> usize {
        self.dims.len()
    }

    /// Whether the space has no dimension
    pub fn is_empty(&self) -> bool {
        self.dims.is_empty()
    }

    /// Dimensions in order
    pub fn dimensions(&self) -> &[Dimension] {
        &self.dims
    }

    /// Dimension names in order
    pub fn names(&self) -> Vec<&str> {
        self.dims.iter().map(|d| d.name()).collect()
    }

    /// Position of the dimension `name`
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.dims.iter().position(|d| d.name() == name)
    }

    /// Dimension called `name`
    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dims.iter().find(|d| d.name() == name)
    }

    /// Attached conditions
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Attached forbidden clauses
    pub fn forbiddens(&self) -> &[Forbidden] {
        &self.forbiddens
    }

    /// Whether every dimension is continuous
    pub fn is_continuous(&self) -> bool {
        self.dims.iter().all(|d| d.is_continuous())
    }

    /// Whether both spaces have the same dimension names in the same order
    pub fn is_compatible(&self, other: &Space) -> bool {
        self.names() == other.names()
    }

    /// Draw `n` independent configurations.
    /// Conditions and forbidden clauses are not enforced.
    pub fn sample<R: Rng>(&self, n: usize, rng: &mut R) -> Vec<Config> {
        (0..n)
            .map(|_| self.dims.iter().map(|d| d.sample(rng)).collect())
            .collect()
    }

    /// Check arity and domain of each value of `config`
    pub fn validate(&self, config: &[Value]) -> Result<()> {
        if config.len() != self.dims.len() {
            return Err(SpaceError::WrongArity {
                expected: self.dims.len(),
                got: config.len(),
            });
        }
        for (dim, value) in self.dims.iter().zip(config.iter()) {
            if !dim.contains(value) {
                return Err(SpaceError::OutOfDomain {
                    name: dim.name().to_string(),
                    value: value.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Number of columns of the encoded representation
    pub fn encoded_len(&self) -> usize {
        self.dims.iter().map(|d| d.encoded_len()).sum()
    }

    /// Encode one configuration (see [`Dimension::encode_into`])
    pub fn transform_one(&self, config: &[Value]) -> Result<Array1<f64>> {
        if config.len() != self.dims.len() {
            return Err(SpaceError::WrongArity {
                expected: self.dims.len(),
                got: config.len(),
            });
        }
        let mut row = Array1::zeros(self.encoded_len());
        let mut offset = 0;
        if let Some(out) = row.as_slice_mut() {
            for (dim, value) in self.dims.iter().zip(config.iter()) {
                let len = dim.encoded_len();
                dim.encode_into(value, &mut out[offset..offset + len]);
                offset += len;
            }
        }
        Ok(row)
    }

    /// Encode configurations as rows of a (n, encoded_len) matrix
    pub fn transform(&self, configs: &[Config]) -> Result<Array2<f64>> {
        let mut x = Array2::zeros((configs.len(), self.encoded_len()));
        for (mut row, config) in x.rows_mut().into_iter().zip(configs.iter()) {
            row.assign(&self.transform_one(config)?);
        }
        Ok(x)
    }

    /// Decode one encoded row into a configuration
    pub fn inverse_transform(&self, row: &ArrayView1<f64>) -> Config {
        let encoded = row.to_vec();
        let mut offset = 0;
        self.dims
            .iter()
            .map(|dim| {
                let len = dim.encoded_len();
                let value = dim.decode(&encoded[offset..offset + len]);
                offset += len;
                value
            })
            .collect()
    }

    /// List form to named form
    pub fn to_named(&self, config: &[Value]) -> NamedConfig {
        self.dims
            .iter()
            .zip(config.iter())
            .map(|(d, v)| (d.name().to_string(), v.clone()))
            .collect()
    }

    /// Named form to list form in dimension order, every dimension is required
    pub fn to_list(&self, named: &NamedConfig) -> Result<Config> {
        self.dims
            .iter()
            .map(|d| {
                named
                    .get(d.name())
                    .cloned()
                    .ok_or_else(|| SpaceError::UnknownDimension(d.name().to_string()))
            })
            .collect()
    }

    /// Complete a partial configuration: absent or `None` values are replaced
    /// by the missing sentinel of their dimension.
    pub fn complete(&self, partial: &BTreeMap<String, Option<Value>>) -> Result<Config> {
        if let Some(unknown) = partial.keys().find(|k| self.index_of(k).is_none()) {
            return Err(SpaceError::UnknownDimension(unknown.clone()));
        }
        let config: Config = self
            .dims
            .iter()
            .map(|d| match partial.get(d.name()) {
                Some(Some(v)) => v.clone(),
                _ => d.missing_value(),
            })
            .collect();
        self.validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Scale, NA_CATEGORY};
    use approx::assert_abs_diff_eq;
    use ndarray_rand::rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    fn space() -> Space {
        Space::new(vec![
            Dimension::continuous("x", -5., 5., Scale::Linear).unwrap(),
            Dimension::integer("n", 1, 10).unwrap(),
            Dimension::categorical("c", &["a", "b", "c"]).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_duplicated_names() {
        let res = Space::new(vec![
            Dimension::integer("n", 1, 10).unwrap(),
            Dimension::integer("n", 1, 3).unwrap(),
        ]);
        assert_eq!(res, Err(SpaceError::DuplicatedName("n".to_string())));
    }

    #[test]
    fn test_sample_in_domain() {
        let sp = space();
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let configs = sp.sample(50, &mut rng);
        assert_eq!(configs.len(), 50);
        for config in configs.iter() {
            assert_eq!(config.len(), 3);
            sp.validate(config).unwrap();
        }
    }

    #[test]
    fn test_transform_inverse() {
        let sp = space();
        let config = vec![Value::Real(0.), Value::Int(10), Value::from("c")];
        let x = sp.transform(&[config.clone()]).unwrap();
        assert_eq!(x.ncols(), 5);
        assert_abs_diff_eq!(x[[0, 0]], 0.5);
        assert_abs_diff_eq!(x[[0, 1]], 1.);
        assert_eq!(x.row(0).to_vec()[2..].to_vec(), vec![0., 0., 1.]);
        assert_eq!(sp.inverse_transform(&x.row(0)), config);
    }

    #[test]
    fn test_named_conversions() {
        let sp = space();
        let config = vec![Value::Real(1.5), Value::Int(2), Value::from("a")];
        let named = sp.to_named(&config);
        assert_eq!(named["n"], Value::Int(2));
        assert_eq!(sp.to_list(&named).unwrap(), config);
        let mut partial = named.clone();
        partial.remove("c");
        assert_eq!(
            sp.to_list(&partial),
            Err(SpaceError::UnknownDimension("c".to_string()))
        );
    }

    #[test]
    fn test_complete_with_sentinels() {
        let sp = space();
        let mut partial = BTreeMap::new();
        partial.insert("n".to_string(), Some(Value::Int(4)));
        partial.insert("x".to_string(), None);
        let config = sp.complete(&partial).unwrap();
        assert!(config[0].is_missing());
        assert_eq!(config[1], Value::Int(4));
        assert_eq!(config[2], Value::from(NA_CATEGORY));

        partial.insert("z".to_string(), None);
        assert!(sp.complete(&partial).is_err());
    }

    #[test]
    fn test_validate_errors() {
        let sp = space();
        assert!(matches!(
            sp.validate(&[Value::Real(0.)]),
            Err(SpaceError::WrongArity { expected: 3, got: 1 })
        ));
        assert!(matches!(
            sp.validate(&[Value::Real(6.), Value::Int(1), Value::from("a")]),
            Err(SpaceError::OutOfDomain { .. })
        ));
    }
}
