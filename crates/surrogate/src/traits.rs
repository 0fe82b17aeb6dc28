use crate::errors::{Result, SurrogateError};
use ndarray::{Array1, ArrayView1, ArrayView2};

/// A regression model providing a posterior mean and a standard deviation
/// at each requested point.
///
/// Inputs are encoded configurations as rows of a (n, nx) matrix.
pub trait Surrogate: std::fmt::Display + Sync + Send {
    /// Number of input features the model was trained on
    fn nx(&self) -> usize;

    /// Predict mean values at `x` points
    fn predict(&self, x: &ArrayView2<f64>) -> Result<Array1<f64>> {
        Ok(self.predict_valstd(x)?.0)
    }

    /// Predict mean values and standard deviations at `x` points
    fn predict_valstd(&self, x: &ArrayView2<f64>) -> Result<(Array1<f64>, Array1<f64>)>;

    /// Predict mean, standard deviation and their gradients wrt x at a single point `x`
    fn predict_valstd_gradients(
        &self,
        _x: &ArrayView1<f64>,
    ) -> Result<(f64, f64, Array1<f64>, Array1<f64>)> {
        Err(SurrogateError::GradientsUnsupported(self.to_string()))
    }

    /// Whether [`Surrogate::predict_valstd_gradients`] is available
    fn has_gradients(&self) -> bool {
        false
    }
}

/// Check prediction input against the training dimension
pub(crate) fn check_nx(expected: usize, x: &ArrayView2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(SurrogateError::ShapeMismatch(format!(
            "expected {expected} columns, got {}",
            x.ncols()
        )));
    }
    Ok(())
}

/// Check training data consistency
pub(crate) fn check_training(x: &ArrayView2<f64>, y: &ArrayView1<f64>) -> Result<()> {
    if x.nrows() == 0 {
        return Err(SurrogateError::EmptyTrainingSet);
    }
    if x.nrows() != y.len() {
        return Err(SurrogateError::ShapeMismatch(format!(
            "{} training inputs for {} outputs",
            x.nrows(),
            y.len()
        )));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(SurrogateError::InvalidValueError(
            "training outputs should be finite".to_string(),
        ));
    }
    Ok(())
}
