use thiserror::Error;

/// A result type for optimizer operations
pub type Result<T> = std::result::Result<T, OptimError>;

/// An error raised by the acquisition engine or the [`Optimizer`](crate::Optimizer)
#[derive(Error, Debug)]
pub enum OptimError {
    /// When an option name or value is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// When candidate points are not given as a 2-D array
    #[error("Candidates are {0}-dimensional, however they must be 2-dimensional")]
    NotTwoDimensional(usize),
    /// When the surrogate returns predictions of unexpected length
    #[error("Surrogate returned {got} predictions for {expected} candidates")]
    PredictionShape {
        /// Number of candidates
        expected: usize,
        /// Number of predictions
        got: usize,
    },
    /// When an invalid value is told or encountered
    #[error("Value error: {0}")]
    InvalidValue(String),
    /// When a surrogate fails to fit or predict
    #[error(transparent)]
    Surrogate(#[from] ambs_surrogate::SurrogateError),
    /// When a configuration does not fit the search space
    #[error(transparent)]
    Space(#[from] ambs_space::SpaceError),
    /// When an Argmin framework is raised
    #[error(transparent)]
    Argmin(#[from] argmin::core::Error),
}
