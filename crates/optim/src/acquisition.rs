//! Acquisition functions turning a surrogate posterior into utility values.
//!
//! Every criterion follows the "to be minimized" convention: lower confidence
//! bound is returned as is while expected improvement and probability of
//! improvement are negated. Per-second variants are further divided by the
//! expected evaluation time predicted by a cost model fitted on `ln(cost)`.
use crate::errors::{OptimError, Result};
use ambs_surrogate::Surrogate;
use libm::erfc;
use ndarray::{Array1, ArrayBase, ArrayView1, ArrayView2, Axis, Data, Dimension, Ix2, Zip};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

const SQRT_2PI: f64 = 2.5066282746310007;

/// Default exploration weight of the lower confidence bound
pub const DEFAULT_KAPPA: f64 = 1.96;
/// Default improvement margin of EI and PI
pub const DEFAULT_XI: f64 = 0.001;

/// Cumulative distribution function of Standard Normal at x
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Probability density function of Standard Normal at x
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / SQRT_2PI
}

/// Acquisition criteria
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcqFunc {
    /// Lower confidence bound `mean - kappa * std`
    LCB,
    /// Expected improvement
    EI,
    /// Probability of improvement
    PI,
    /// Expected improvement per second
    EIps,
    /// Probability of improvement per second
    PIps,
    /// Portfolio of LCB, EI and PI (see [`Hedge`](crate::Hedge))
    GpHedge,
}

impl AcqFunc {
    /// Whether the criterion needs a cost model
    pub fn is_per_second(&self) -> bool {
        matches!(self, AcqFunc::EIps | AcqFunc::PIps)
    }
}

impl FromStr for AcqFunc {
    type Err = OptimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "LCB" => Ok(AcqFunc::LCB),
            "EI" => Ok(AcqFunc::EI),
            "PI" => Ok(AcqFunc::PI),
            "EIps" => Ok(AcqFunc::EIps),
            "PIps" => Ok(AcqFunc::PIps),
            "gp_hedge" => Ok(AcqFunc::GpHedge),
            _ => Err(OptimError::InvalidConfig(format!(
                "unknown acquisition function '{s}'"
            ))),
        }
    }
}

impl fmt::Display for AcqFunc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            AcqFunc::LCB => "LCB",
            AcqFunc::EI => "EI",
            AcqFunc::PI => "PI",
            AcqFunc::EIps => "EIps",
            AcqFunc::PIps => "PIps",
            AcqFunc::GpHedge => "gp_hedge",
        };
        write!(f, "{name}")
    }
}

type ConstraintFn = dyn Fn(&ArrayView2<f64>) -> Array1<f64> + Send + Sync;

/// A black-box constraint applied to expected improvement:
/// the criterion is zeroed where `func(x) > threshold`.
#[derive(Clone)]
pub struct AcqConstraint {
    func: Arc<ConstraintFn>,
    threshold: f64,
}

impl AcqConstraint {
    /// Constraint from a function of encoded candidates (one value per row)
    pub fn new<F>(func: F, threshold: f64) -> Self
    where
        F: Fn(&ArrayView2<f64>) -> Array1<f64> + Send + Sync + 'static,
    {
        AcqConstraint {
            func: Arc::new(func),
            threshold,
        }
    }

    fn violated(&self, x: &ArrayView2<f64>) -> Result<Array1<bool>> {
        let values = (self.func)(x);
        if values.len() != x.nrows() {
            return Err(OptimError::PredictionShape {
                expected: x.nrows(),
                got: values.len(),
            });
        }
        Ok(values.mapv(|v| v > self.threshold))
    }
}

impl fmt::Debug for AcqConstraint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AcqConstraint")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

/// Parameters of the acquisition criteria
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AcqParams {
    /// Exploration weight of LCB, `f64::INFINITY` means pure exploration
    pub kappa: f64,
    /// Improvement margin of EI and PI
    pub xi: f64,
    /// Optional constraint on EI
    #[serde(skip)]
    pub constraint: Option<AcqConstraint>,
}

impl Default for AcqParams {
    fn default() -> Self {
        AcqParams {
            kappa: DEFAULT_KAPPA,
            xi: DEFAULT_XI,
            constraint: None,
        }
    }
}

fn predictions(x: &ArrayView2<f64>, model: &dyn Surrogate) -> Result<(Array1<f64>, Array1<f64>)> {
    let (mu, std) = model.predict_valstd(x)?;
    for got in [mu.len(), std.len()] {
        if got != x.nrows() {
            return Err(OptimError::PredictionShape {
                expected: x.nrows(),
                got,
            });
        }
    }
    Ok((mu, std))
}

fn lcb(mu: f64, std: f64, kappa: f64) -> f64 {
    if kappa == f64::INFINITY {
        -std
    } else {
        mu - kappa * std
    }
}

fn pi(mu: f64, std: f64, y_opt: f64, xi: f64) -> f64 {
    if std > 0. {
        norm_cdf((y_opt - xi - mu) / std)
    } else {
        0.
    }
}

fn ei(mu: f64, std: f64, y_opt: f64, xi: f64) -> f64 {
    if std > 0. {
        let improve = y_opt - xi - mu;
        let t = improve / std;
        improve * norm_cdf(t) + std * norm_pdf(t)
    } else {
        0.
    }
}

/// Lower confidence bound at `x` rows
pub fn gaussian_lcb(x: &ArrayView2<f64>, model: &dyn Surrogate, kappa: f64) -> Result<Array1<f64>> {
    let (mu, std) = predictions(x, model)?;
    Ok(Zip::from(&mu)
        .and(&std)
        .map_collect(|m, s| lcb(*m, *s, kappa)))
}

/// Probability of improving `y_opt - xi` at `x` rows (to be maximized)
pub fn gaussian_pi(
    x: &ArrayView2<f64>,
    model: &dyn Surrogate,
    y_opt: f64,
    xi: f64,
) -> Result<Array1<f64>> {
    let (mu, std) = predictions(x, model)?;
    Ok(Zip::from(&mu)
        .and(&std)
        .map_collect(|m, s| pi(*m, *s, y_opt, xi)))
}

/// Expected improvement over `y_opt - xi` at `x` rows (to be maximized)
pub fn gaussian_ei(
    x: &ArrayView2<f64>,
    model: &dyn Surrogate,
    y_opt: f64,
    xi: f64,
    constraint: Option<&AcqConstraint>,
) -> Result<Array1<f64>> {
    let (mu, std) = predictions(x, model)?;
    let mut values = Zip::from(&mu)
        .and(&std)
        .map_collect(|m, s| ei(*m, *s, y_opt, xi));
    if let Some(constraint) = constraint {
        Zip::from(&mut values)
            .and(&constraint.violated(x)?)
            .for_each(|v, violated| {
                if *violated {
                    *v = 0.
                }
            });
    }
    Ok(values)
}

/// Acquisition values of `criterion` at the rows of `x`, to be minimized.
///
/// `x` must be 2-dimensional, `cost_model` is required by per-second criteria.
pub fn gaussian_acquisition<S: Data<Elem = f64>, D: Dimension>(
    x: &ArrayBase<S, D>,
    model: &dyn Surrogate,
    y_opt: f64,
    criterion: AcqFunc,
    params: &AcqParams,
    cost_model: Option<&dyn Surrogate>,
) -> Result<Array1<f64>> {
    let x = x
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| OptimError::NotTwoDimensional(x.ndim()))?;
    let values = match criterion {
        AcqFunc::LCB => gaussian_lcb(&x, model, params.kappa)?,
        AcqFunc::EI | AcqFunc::EIps => {
            -gaussian_ei(&x, model, y_opt, params.xi, params.constraint.as_ref())?
        }
        AcqFunc::PI | AcqFunc::PIps => -gaussian_pi(&x, model, y_opt, params.xi)?,
        AcqFunc::GpHedge => return Err(hedge_error()),
    };
    if criterion.is_per_second() {
        let (mu, std) = predictions(&x, cost_model.ok_or_else(|| cost_error(criterion))?)?;
        let inv_t = Zip::from(&mu)
            .and(&std)
            .map_collect(|m, s| (-m + 0.5 * s * s).exp());
        Ok(values * inv_t)
    } else {
        Ok(values)
    }
}

/// Acquisition value and gradient wrt `x` of `criterion` at a single point,
/// to be minimized. Requires surrogates providing gradients.
pub fn gaussian_acquisition_1d(
    x: &ArrayView1<f64>,
    model: &dyn Surrogate,
    y_opt: f64,
    criterion: AcqFunc,
    params: &AcqParams,
    cost_model: Option<&dyn Surrogate>,
) -> Result<(f64, Array1<f64>)> {
    let (mu, std, mu_grad, std_grad) = gradients(x, model)?;
    let (mut value, mut grad) = match criterion {
        AcqFunc::LCB => {
            if params.kappa == f64::INFINITY {
                (-std, -std_grad)
            } else {
                (mu - params.kappa * std, mu_grad - std_grad * params.kappa)
            }
        }
        AcqFunc::EI | AcqFunc::EIps => {
            let violated = match &params.constraint {
                Some(c) => c.violated(&x.view().insert_axis(Axis(0)))?[0],
                None => false,
            };
            if violated || std <= 0. {
                (0., Array1::zeros(x.len()))
            } else {
                let improve = y_opt - params.xi - mu;
                let t = improve / std;
                let (cdf, pdf) = (norm_cdf(t), norm_pdf(t));
                let value = improve * cdf + std * pdf;
                // derivative of the pdf term cancels with the one of the cdf term
                let grad = std_grad * pdf - mu_grad * cdf;
                (-value, -grad)
            }
        }
        AcqFunc::PI | AcqFunc::PIps => {
            if std <= 0. {
                (0., Array1::zeros(x.len()))
            } else {
                let improve = y_opt - params.xi - mu;
                let t = improve / std;
                let t_grad = (mu_grad * (-std) - std_grad * improve) / (std * std);
                (-norm_cdf(t), -(t_grad * norm_pdf(t)))
            }
        }
        AcqFunc::GpHedge => return Err(hedge_error()),
    };
    if criterion.is_per_second() {
        let cost_model = cost_model.ok_or_else(|| cost_error(criterion))?;
        let (c_mu, c_std, c_mu_grad, c_std_grad) = gradients(x, cost_model)?;
        let inv_t = (-c_mu + 0.5 * c_std * c_std).exp();
        value *= inv_t;
        grad = grad * inv_t + (c_std_grad * c_std - c_mu_grad) * value;
    }
    Ok((value, grad))
}

fn gradients(
    x: &ArrayView1<f64>,
    model: &dyn Surrogate,
) -> Result<(f64, f64, Array1<f64>, Array1<f64>)> {
    let (mu, std, mu_grad, std_grad) = model.predict_valstd_gradients(x)?;
    for got in [mu_grad.len(), std_grad.len()] {
        if got != x.len() {
            return Err(OptimError::PredictionShape {
                expected: x.len(),
                got,
            });
        }
    }
    Ok((mu, std, mu_grad, std_grad))
}

fn hedge_error() -> OptimError {
    OptimError::InvalidConfig("gp_hedge is a portfolio, evaluate one of its members".to_string())
}

fn cost_error(criterion: AcqFunc) -> OptimError {
    OptimError::InvalidConfig(format!("{criterion} criterion requires a cost model"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use finitediff::FiniteDiff;
    use ndarray::{array, Array2, Array3};

    /// Smooth synthetic posterior in 3 dimensions
    pub(crate) struct Bowl;

    fn bowl_mean(x: &ArrayView1<f64>) -> f64 {
        x.iter()
            .enumerate()
            .map(|(i, v)| (i + 1) as f64 * (v - 0.3).powi(2))
            .sum()
    }

    fn bowl_std(x: &ArrayView1<f64>) -> f64 {
        0.1 + 0.5 * x.dot(x)
    }

    impl fmt::Display for Bowl {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "Bowl")
        }
    }

    impl Surrogate for Bowl {
        fn nx(&self) -> usize {
            3
        }

        fn predict_valstd(
            &self,
            x: &ArrayView2<f64>,
        ) -> ambs_surrogate::Result<(Array1<f64>, Array1<f64>)> {
            Ok((
                x.map_axis(Axis(1), |r| bowl_mean(&r)),
                x.map_axis(Axis(1), |r| bowl_std(&r)),
            ))
        }

        fn predict_valstd_gradients(
            &self,
            x: &ArrayView1<f64>,
        ) -> ambs_surrogate::Result<(f64, f64, Array1<f64>, Array1<f64>)> {
            let mean_grad = Array1::from_shape_fn(3, |i| 2. * (i + 1) as f64 * (x[i] - 0.3));
            Ok((bowl_mean(x), bowl_std(x), mean_grad, x.to_owned()))
        }

        fn has_gradients(&self) -> bool {
            true
        }
    }

    /// Posterior with a fixed mean per row and no uncertainty
    struct Certain;

    impl fmt::Display for Certain {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "Certain")
        }
    }

    impl Surrogate for Certain {
        fn nx(&self) -> usize {
            1
        }

        fn predict_valstd(
            &self,
            x: &ArrayView2<f64>,
        ) -> ambs_surrogate::Result<(Array1<f64>, Array1<f64>)> {
            Ok((x.column(0).to_owned(), Array1::zeros(x.nrows())))
        }
    }

    /// Model returning one prediction whatever the number of candidates
    struct Broken;

    impl fmt::Display for Broken {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "Broken")
        }
    }

    impl Surrogate for Broken {
        fn nx(&self) -> usize {
            1
        }

        fn predict_valstd(
            &self,
            _x: &ArrayView2<f64>,
        ) -> ambs_surrogate::Result<(Array1<f64>, Array1<f64>)> {
            Ok((array![0.], array![1.]))
        }
    }

    fn points() -> Array2<f64> {
        array![
            [0.1, 0.2, 0.3],
            [0.5, 0.4, 0.9],
            [0.9, 0.1, 0.6],
            [0.3, 0.8, 0.2],
            [0.7, 0.7, 0.7],
        ]
    }

    #[test]
    fn test_acq_func_names() {
        assert_eq!("gp_hedge".parse::<AcqFunc>().unwrap(), AcqFunc::GpHedge);
        assert_eq!(AcqFunc::EIps.to_string(), "EIps");
        assert!(AcqFunc::PIps.is_per_second());
        assert!(matches!(
            "UCB".parse::<AcqFunc>(),
            Err(OptimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_norm() {
        assert_abs_diff_eq!(norm_cdf(0.), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(norm_cdf(1.96), 0.9750021048517795, epsilon = 1e-9);
        assert_abs_diff_eq!(norm_pdf(0.), 1. / SQRT_2PI, epsilon = 1e-12);
    }

    #[test]
    fn test_lcb_kappa_limits() {
        let x = points();
        let (mu, std) = Bowl.predict_valstd(&x.view()).unwrap();
        let params = AcqParams {
            kappa: 0.,
            ..AcqParams::default()
        };
        let values = gaussian_acquisition(&x, &Bowl, 0., AcqFunc::LCB, &params, None).unwrap();
        assert_abs_diff_eq!(values, mu, epsilon = 1e-12);

        let params = AcqParams {
            kappa: f64::INFINITY,
            ..AcqParams::default()
        };
        let values = gaussian_acquisition(&x, &Bowl, 0., AcqFunc::LCB, &params, None).unwrap();
        assert_abs_diff_eq!(values, -std, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_std_gives_zero_improvement() {
        let x = array![[-1.], [0.], [2.]];
        let params = AcqParams::default();
        for criterion in [AcqFunc::EI, AcqFunc::PI] {
            let values = gaussian_acquisition(&x, &Certain, 1., criterion, &params, None).unwrap();
            assert_abs_diff_eq!(values, Array1::zeros(3));
        }
    }

    #[test]
    fn test_ei_pi_prefer_low_mean() {
        let x = points();
        let params = AcqParams::default();
        for criterion in [AcqFunc::EI, AcqFunc::PI] {
            let values = gaussian_acquisition(&x, &Bowl, 0.2, criterion, &params, None).unwrap();
            assert!(values.iter().all(|v| *v <= 0.));
            // first point is the closest to the bowl minimum with the lowest std
            let lowest = values
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i);
            assert_eq!(lowest, Some(0));
        }
    }

    #[test]
    fn test_candidates_must_be_2d() {
        let params = AcqParams::default();
        let x1 = array![0.1, 0.2, 0.3];
        assert!(matches!(
            gaussian_acquisition(&x1, &Bowl, 0., AcqFunc::LCB, &params, None),
            Err(OptimError::NotTwoDimensional(1))
        ));
        let x3 = Array3::<f64>::zeros((2, 2, 3));
        assert!(matches!(
            gaussian_acquisition(&x3, &Bowl, 0., AcqFunc::EI, &params, None),
            Err(OptimError::NotTwoDimensional(3))
        ));
    }

    #[test]
    fn test_prediction_shape_mismatch() {
        let x = array![[0.], [1.], [2.]];
        let res = gaussian_acquisition(&x, &Broken, 0., AcqFunc::PI, &AcqParams::default(), None);
        assert!(matches!(
            res,
            Err(OptimError::PredictionShape {
                expected: 3,
                got: 1
            })
        ));
    }

    #[test]
    fn test_per_second_requires_cost_model() {
        let x = points();
        let params = AcqParams::default();
        assert!(matches!(
            gaussian_acquisition(&x, &Bowl, 0.2, AcqFunc::EIps, &params, None),
            Err(OptimError::InvalidConfig(_))
        ));
        let ei = gaussian_acquisition(&x, &Bowl, 0.2, AcqFunc::EI, &params, None).unwrap();
        let eips = gaussian_acquisition(&x, &Bowl, 0.2, AcqFunc::EIps, &params, Some(&Bowl)).unwrap();
        let (c_mu, c_std) = Bowl.predict_valstd(&x.view()).unwrap();
        let expected = ei * (c_std.mapv(|s| 0.5 * s * s) - c_mu).mapv(f64::exp);
        assert_abs_diff_eq!(eips, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_constraint_masks_ei() {
        let x = points();
        let params = AcqParams {
            constraint: Some(AcqConstraint::new(|x| x.column(0).to_owned(), 0.6)),
            ..AcqParams::default()
        };
        let values = gaussian_acquisition(&x, &Bowl, 0.5, AcqFunc::EI, &params, None).unwrap();
        assert_abs_diff_eq!(values[2], 0.);
        assert_abs_diff_eq!(values[4], 0.);
        assert!(values[0] < 0.);
        let (v, g) =
            gaussian_acquisition_1d(&x.row(2), &Bowl, 0.5, AcqFunc::EI, &params, None).unwrap();
        assert_abs_diff_eq!(v, 0.);
        assert_abs_diff_eq!(g, Array1::zeros(3));
    }

    #[test]
    fn test_gradients_against_finite_differences() {
        let params = AcqParams::default();
        let y_opt = 0.5;
        for criterion in [
            AcqFunc::LCB,
            AcqFunc::EI,
            AcqFunc::PI,
            AcqFunc::EIps,
            AcqFunc::PIps,
        ] {
            for row in points().rows() {
                let (value, grad) =
                    gaussian_acquisition_1d(&row, &Bowl, y_opt, criterion, &params, Some(&Bowl))
                        .unwrap();
                let f = |x: &Vec<f64>| -> f64 {
                    let x = Array2::from_shape_vec((1, 3), x.clone()).unwrap();
                    gaussian_acquisition(&x, &Bowl, y_opt, criterion, &params, Some(&Bowl))
                        .unwrap()[0]
                };
                let x = row.to_vec();
                assert_abs_diff_eq!(value, f(&x), epsilon = 1e-12);
                let grad_central = x.central_diff(&f);
                for i in 0..3 {
                    assert_abs_diff_eq!(grad[i], grad_central[i], epsilon = 1e-5);
                }
            }
        }
    }
}
