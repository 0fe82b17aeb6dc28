use thiserror::Error;

/// A result type for search space operations
pub type Result<T> = std::result::Result<T, SpaceError>;

/// An error raised when defining or using a search [`Space`](crate::Space)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpaceError {
    /// When a dimension definition is invalid (empty range, no choices, ...)
    #[error("Invalid dimension '{name}': {reason}")]
    InvalidDimension {
        /// Name of the faulty dimension
        name: String,
        /// Description of the problem
        reason: String,
    },
    /// When two dimensions share the same name
    #[error("Duplicated dimension name '{0}'")]
    DuplicatedName(String),
    /// When a configuration has not the expected number of values
    #[error("Configuration has {got} values, expected {expected}")]
    WrongArity {
        /// Number of dimensions of the space
        expected: usize,
        /// Number of values of the configuration
        got: usize,
    },
    /// When a value does not belong to its dimension domain
    #[error("Value {value} out of domain of dimension '{name}'")]
    OutOfDomain {
        /// Name of the dimension
        name: String,
        /// Offending value rendered as text
        value: String,
    },
    /// When a named configuration misses a dimension
    #[error("Unknown or missing dimension '{0}'")]
    UnknownDimension(String),
    /// When a text value cannot be coerced to the dimension type
    #[error("Cannot parse '{value}' for dimension '{name}'")]
    ParseError {
        /// Name of the dimension
        name: String,
        /// Raw text
        value: String,
    },
}
