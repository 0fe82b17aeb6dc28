use thiserror::Error;

/// A result type for search errors
pub type Result<T> = std::result::Result<T, AmbsError>;

/// An error raised by the asynchronous model-based search
#[derive(Error, Debug)]
pub enum AmbsError {
    /// When configuration is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// When results of a previous search cannot be used for warm start
    #[error("Incompatible checkpoint: {0}")]
    IncompatibleCheckpoint(String),
    /// When the evaluator cannot run the submitted configurations
    #[error("Evaluator error: {0}")]
    Evaluator(String),
    /// When reading a checkpoint fails
    #[error(transparent)]
    Csv(#[from] csv::Error),
    /// When IO fails
    #[error("IO error")]
    Io(#[from] std::io::Error),
    /// When the optimizer fails
    #[error(transparent)]
    Optim(#[from] ambs_optim::OptimError),
    /// When a configuration does not fit the search space
    #[error(transparent)]
    Space(#[from] ambs_space::SpaceError),
}
