use thiserror::Error;

/// A result type for surrogate training and prediction
pub type Result<T> = std::result::Result<T, SurrogateError>;

/// An error when training or using a [`Surrogate`](crate::Surrogate)
#[derive(Error, Debug)]
pub enum SurrogateError {
    /// When no training data is given
    #[error("Empty training set")]
    EmptyTrainingSet,
    /// When inputs and outputs do not match
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When the likelihood cannot be computed whatever the hyperparameters
    #[error("Likelihood computation error: {0}")]
    LikelihoodComputationError(String),
    /// When gradients are requested from a model which does not provide them
    #[error("Gradients not supported by {0} surrogate")]
    GradientsUnsupported(String),
    /// When the surrogate kind does not build any model
    #[error("Surrogate kind {0} is not trainable")]
    NotTrainable(String),
    /// When the surrogate kind name is unknown
    #[error("Unknown surrogate kind '{0}'")]
    UnknownKind(String),
    /// When the thread pool used for fitting cannot be built
    #[error("Thread pool error: {0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),
    /// When error due to a bad value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
}
