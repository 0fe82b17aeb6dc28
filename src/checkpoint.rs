//! Results of a previous search read from a csv file.
//!
//! The table holds one column per dimension plus an `objective` column.
//! Other columns (`job_id`, timestamps, ...) are ignored. Objectives starting
//! with `F` mark failed evaluations.
use crate::errors::{AmbsError, Result};
use ambs_space::{Config, NamedConfig, Space};
use csv::ReaderBuilder;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Name of the objective column
pub const OBJECTIVE_COLUMN: &str = "objective";
/// Prefix of the objective of a failed evaluation
pub const FAILURE_PREFIX: char = 'F';

/// Raw table of a previous search
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Checkpoint {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Checkpoint {
    /// Read a csv file with headers
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_reader(File::open(path)?)
    }

    /// Read csv content with headers
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(b',')
            .from_reader(reader);
        let headers = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let rows = reader
            .records()
            .map(|record| record.map(|r| r.iter().map(String::from).collect()))
            .collect::<std::result::Result<Vec<Vec<String>>, csv::Error>>()?;
        Ok(Checkpoint { headers, rows })
    }

    /// Column names
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Number of rows, failures included
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no row
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    fn objective_column(&self) -> Result<usize> {
        self.column(OBJECTIVE_COLUMN).ok_or_else(|| {
            AmbsError::IncompatibleCheckpoint(format!("no '{OBJECTIVE_COLUMN}' column"))
        })
    }

    /// Successful rows as (row, objective)
    fn successes(&self) -> Result<Vec<(&[String], f64)>> {
        let objective = self.objective_column()?;
        self.rows
            .iter()
            .filter(|row| !row[objective].trim_start().starts_with(FAILURE_PREFIX))
            .map(|row| {
                let text = row[objective].trim();
                text.parse::<f64>()
                    .map(|y| (row.as_slice(), y))
                    .map_err(|_| {
                        AmbsError::IncompatibleCheckpoint(format!("invalid objective '{text}'"))
                    })
            })
            .collect()
    }

    /// Successful configurations of `space` in list form with their objective.
    /// Every dimension of `space` must have a column.
    pub fn observations(&self, space: &Space) -> Result<(Vec<Config>, Vec<f64>)> {
        let missing: Vec<&str> = space
            .names()
            .into_iter()
            .chain(std::iter::once(OBJECTIVE_COLUMN))
            .filter(|name| self.column(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(AmbsError::IncompatibleCheckpoint(format!(
                "missing column(s) {}",
                missing.join(", ")
            )));
        }
        let columns: Vec<usize> = space.names().iter().filter_map(|n| self.column(n)).collect();
        let mut configs = vec![];
        let mut objectives = vec![];
        for (row, y) in self.successes()? {
            let config = space
                .dimensions()
                .iter()
                .zip(columns.iter())
                .map(|(dim, col)| dim.parse(&row[*col]))
                .collect::<ambs_space::Result<Config>>()?;
            space.validate(&config)?;
            configs.push(config);
            objectives.push(y);
        }
        Ok((configs, objectives))
    }

    /// Successful row with the highest objective, restricted to the dimensions
    /// of `space` found in the table
    pub fn best(&self, space: &Space) -> Result<NamedConfig> {
        let Some((row, _)) = self
            .successes()?
            .into_iter()
            .max_by(|a, b| a.1.total_cmp(&b.1))
        else {
            return Err(AmbsError::IncompatibleCheckpoint(
                "no successful evaluation".to_string(),
            ));
        };
        let mut best = NamedConfig::new();
        for dim in space.dimensions() {
            if let Some(col) = self.column(dim.name()) {
                best.insert(dim.name().to_string(), dim.parse(&row[col])?);
            }
        }
        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambs_space::{Dimension, Scale, Value};

    const RESULTS: &str = "\
units,activation,lr,objective,job_id,timestamp_submit
32,relu,0.01,0.8,0,1.2
8,tanh,0.001,F_timeout,1,1.3
64,tanh,0.05,0.9,2,1.5
16,relu,0.002,-0.2,3,1.9
";

    fn space() -> Space {
        Space::new(vec![
            Dimension::continuous("lr", 1e-4, 1e-1, Scale::Log).unwrap(),
            Dimension::integer("units", 1, 64).unwrap(),
            Dimension::categorical("activation", &["relu", "tanh"]).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_observations_skip_failures() {
        let checkpoint = Checkpoint::from_reader(RESULTS.as_bytes()).unwrap();
        assert_eq!(checkpoint.len(), 4);
        let (configs, y) = checkpoint.observations(&space()).unwrap();
        assert_eq!(y, vec![0.8, 0.9, -0.2]);
        assert_eq!(
            configs[0],
            vec![Value::Real(0.01), Value::Int(32), Value::Cat("relu".to_string())]
        );
    }

    #[test]
    fn test_missing_columns() {
        let checkpoint = Checkpoint::from_reader("units,objective\n3,1.0\n".as_bytes()).unwrap();
        match checkpoint.observations(&space()) {
            Err(AmbsError::IncompatibleCheckpoint(msg)) => {
                assert!(msg.contains("lr") && msg.contains("activation"))
            }
            other => panic!("unexpected {other:?}"),
        }
        let checkpoint = Checkpoint::from_reader("lr,units,activation\n".as_bytes()).unwrap();
        assert!(matches!(
            checkpoint.observations(&space()),
            Err(AmbsError::IncompatibleCheckpoint(_))
        ));
    }

    #[test]
    fn test_best_row() {
        let checkpoint = Checkpoint::from_reader(RESULTS.as_bytes()).unwrap();
        let best = checkpoint.best(&space()).unwrap();
        assert_eq!(best["units"], Value::Int(64));
        assert_eq!(best["activation"], Value::Cat("tanh".to_string()));

        let partial = Checkpoint::from_reader("units,objective\n3,1.0\n5,2.0\n".as_bytes()).unwrap();
        let best = partial.best(&space()).unwrap();
        assert_eq!(best.len(), 1);
        assert_eq!(best["units"], Value::Int(5));
    }
}
