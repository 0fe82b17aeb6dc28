//! Gaussian process regression (ordinary kriging) with a squared exponential
//! anisotropic correlation kernel.
//!
//! Inputs and outputs are normalized before training. The kernel length scales
//! (theta) are obtained by maximizing the reduced likelihood using COBYLA from
//! several starting points in log10 space.
use crate::errors::{Result, SurrogateError};
use crate::traits::{check_nx, check_training, Surrogate};
use crate::utils::{NormalizedData, Workers};
use linfa_linalg::{cholesky::*, triangular::*};
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Axis, Data, Ix1, Ix2, Zip};
use ndarray_rand::rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Default number of multistart for hyperparameters optimization
pub const GP_OPTIM_N_START: usize = 10;
/// Minimum of function evaluations for COBYLA optimizer
pub const GP_COBYLA_MIN_EVAL: usize = 25;
/// Maximum of function evaluations for COBYLA optimizer
pub const GP_COBYLA_MAX_EVAL: usize = 1000;

/// Default initial theta
pub const GP_THETA_INIT: f64 = 1e-1;
/// Default theta bounds
pub const GP_THETA_BOUNDS: (f64, f64) = (1e-2, 1e1);

/// Gaussian process hyperparameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GpParams {
    pub(crate) theta_init: f64,
    pub(crate) theta_bounds: (f64, f64),
    pub(crate) n_start: usize,
    pub(crate) max_eval: usize,
    pub(crate) nugget: f64,
    pub(crate) workers: Workers,
    pub(crate) seed: u64,
}

impl Default for GpParams {
    fn default() -> Self {
        GpParams {
            theta_init: GP_THETA_INIT,
            theta_bounds: GP_THETA_BOUNDS,
            n_start: GP_OPTIM_N_START,
            max_eval: GP_COBYLA_MAX_EVAL,
            nugget: 100. * f64::EPSILON,
            workers: Workers::default(),
            seed: 0,
        }
    }
}

impl GpParams {
    /// Set initial theta and its bounds
    pub fn theta_tuning(mut self, init: f64, bounds: (f64, f64)) -> Self {
        self.theta_init = init;
        self.theta_bounds = bounds;
        self
    }

    /// Set the number of additional starting points of the likelihood optimization
    pub fn n_start(mut self, n_start: usize) -> Self {
        self.n_start = n_start;
        self
    }

    /// Set the max number of likelihood evaluations per start.
    /// Given max_eval has to be greater than [GP_COBYLA_MIN_EVAL].
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.max_eval = GP_COBYLA_MIN_EVAL.max(max_eval);
        self
    }

    /// Set the nugget added to the correlation matrix diagonal
    pub fn nugget(mut self, nugget: f64) -> Self {
        self.nugget = nugget;
        self
    }

    /// Set the number of threads used for the multistart (-1 means all cores)
    pub fn n_jobs(mut self, n_jobs: i32) -> Self {
        self.workers = Workers::new(n_jobs);
        self
    }

    /// Run on the given workers (their pool is shared)
    pub fn workers(mut self, workers: Workers) -> Self {
        self.workers = workers;
        self
    }

    /// Set the seed used to draw the multistart points
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn check(&self) -> Result<()> {
        let (lo, up) = self.theta_bounds;
        if !(lo > 0. && lo < up && lo <= self.theta_init && self.theta_init <= up) {
            return Err(SurrogateError::InvalidValueError(format!(
                "theta init {} should lie within bounds ({lo}, {up}) with 0 < lower < upper",
                self.theta_init
            )));
        }
        Ok(())
    }

    /// Fit GP parameters using maximum likelihood
    pub fn fit(&self, x: &ArrayView2<f64>, y: &ArrayView1<f64>) -> Result<GaussianProcess> {
        check_training(x, y)?;
        self.check()?;
        let nx = x.ncols();
        let xtrain = NormalizedData::new(x);
        let ytrain = NormalizedData::new(&y.to_owned().insert_axis(Axis(1)));
        let yn = ytrain.data.column(0).to_owned();

        let bounds = vec![(self.theta_bounds.0.log10(), self.theta_bounds.1.log10()); nx];
        let theta_inits = self.multistart(&bounds);
        let objfn = |p: &[f64], _u: &mut ()| -> f64 {
            let theta: Array1<f64> = p.iter().map(|v| 10f64.powf(*v)).collect();
            // optimizer may return nan values
            if theta.iter().any(|v| !v.is_finite()) {
                return f64::INFINITY;
            }
            match reduced_likelihood(&xtrain.data, &yn, &theta, self.nugget) {
                Ok((lkh, _)) => -lkh,
                Err(_) => f64::INFINITY,
            }
        };

        let now = Instant::now();
        let maxeval = (10 * nx).clamp(GP_COBYLA_MIN_EVAL, self.max_eval);
        let (fmin, log_theta) = self.workers.install(|| {
            theta_inits
                .par_iter()
                .map(|theta0| optimize_theta(&objfn, theta0, &bounds, maxeval))
                .reduce(
                    || (f64::INFINITY, theta_inits[0].clone()),
                    |a, b| if b.0 < a.0 { b } else { a },
                )
        })?;
        debug!("GP likelihood optimization in {:?}", now.elapsed());
        if !fmin.is_finite() && fmin != f64::NEG_INFINITY {
            warn!("GP likelihood optimization failed, fallback to initial theta");
        }
        let theta: Array1<f64> = log_theta.iter().map(|v| 10f64.powf(*v)).collect();
        let (likelihood, inner) = reduced_likelihood(&xtrain.data, &yn, &theta, self.nugget)?;
        Ok(GaussianProcess {
            theta,
            likelihood,
            sigma2: inner.sigma2 * ytrain.std[0] * ytrain.std[0],
            inner,
            xt_norm: xtrain,
            yt_mean: ytrain.mean[0],
            yt_std: ytrain.std[0],
        })
    }

    /// Starting points in log10 space: theta init then random points within bounds
    fn multistart(&self, bounds: &[(f64, f64)]) -> Vec<Vec<f64>> {
        let mut rng = Xoshiro256Plus::seed_from_u64(self.seed);
        let mut starts = vec![vec![self.theta_init.log10(); bounds.len()]];
        for _ in 0..self.n_start {
            starts.push(bounds.iter().map(|(lo, up)| rng.gen_range(*lo..*up)).collect());
        }
        starts
    }
}

fn optimize_theta<F>(objfn: &F, theta0: &[f64], bounds: &[(f64, f64)], maxeval: usize) -> (f64, Vec<f64>)
where
    F: Fn(&[f64], &mut ()) -> f64,
{
    use cobyla::{minimize, Func, StopTols};

    let cons: Vec<&dyn Func<()>> = vec![];
    match minimize(
        |x: &[f64], u: &mut ()| objfn(x, u),
        theta0,
        bounds,
        &cons,
        (),
        maxeval,
        cobyla::RhoBeg::All(0.5),
        Some(StopTols {
            ftol_rel: 1e-4,
            ..StopTols::default()
        }),
    ) {
        Ok((_, x_opt, fval)) => {
            let fval = if f64::is_nan(fval) { f64::INFINITY } else { fval };
            (fval, x_opt)
        }
        Err((status, x_opt, _)) => {
            warn!("Cobyla optimizer in GP failed status={status:?}");
            (f64::INFINITY, x_opt)
        }
    }
}

/// Internal parameters computed during training and used in prediction
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct GpInnerParams {
    /// Process variance of normalized outputs
    sigma2: f64,
    /// Constant mean of normalized outputs
    beta: f64,
    /// R^-1 (y - beta)
    gamma: Array1<f64>,
    /// Cholesky factor of the correlation matrix R
    r_chol: Array2<f64>,
    /// L^-1 1
    ft: Array1<f64>,
    /// |L^-1 1|
    ft_norm: f64,
    /// R^-1 1
    r_inv_ones: Array1<f64>,
}

fn correlation(
    xnorm: &ArrayBase<impl Data<Elem = f64>, Ix2>,
    xt: &Array2<f64>,
    theta: &Array1<f64>,
) -> Array2<f64> {
    let mut r = Array2::zeros((xnorm.nrows(), xt.nrows()));
    Zip::from(r.rows_mut())
        .and(xnorm.rows())
        .for_each(|mut r_row, x| {
            Zip::from(&mut r_row).and(xt.rows()).for_each(|rij, xtj| {
                let d2: f64 = Zip::from(&x)
                    .and(&xtj)
                    .and(theta)
                    .fold(0., |acc, a, b, t| acc + t * (a - b) * (a - b));
                *rij = (-d2).exp();
            })
        });
    r
}

/// Compute reduced likelihood function
/// xn: normalized training inputs, yn: normalized training outputs,
/// nugget: factor to improve numerical stability
fn reduced_likelihood(
    xn: &Array2<f64>,
    yn: &Array1<f64>,
    theta: &Array1<f64>,
    nugget: f64,
) -> Result<(f64, GpInnerParams)> {
    let n = xn.nrows();
    let mut r_mx = correlation(xn, xn, theta);
    r_mx.diag_mut().mapv_inplace(|v| v + v * nugget);
    // R cholesky decomposition
    let r_chol = r_mx.cholesky()?;
    let ones: Array2<f64> = Array2::ones((n, 1));
    let ft = r_chol.solve_triangular(&ones, UPLO::Lower)?;
    let ft_norm = ft.column(0).dot(&ft.column(0)).sqrt();
    if ft_norm < 1e-12 {
        return Err(SurrogateError::LikelihoodComputationError(
            "F is too ill conditioned".to_string(),
        ));
    }
    let yt = r_chol.solve_triangular(&yn.view().insert_axis(Axis(1)), UPLO::Lower)?;
    // Generalized least squares for the constant mean
    let beta = ft.column(0).dot(&yt.column(0)) / (ft_norm * ft_norm);
    let rho = &yt - &(&ft * beta);
    let rho_sqr = rho.mapv(|v| v * v).sum();
    let gamma = r_chol.t().solve_triangular_into(rho, UPLO::Upper)?;
    let r_inv_ones = r_chol.t().solve_triangular(&ft, UPLO::Upper)?;

    // The determinant of R is equal to the squared product of
    // the diagonal elements of its Cholesky decomposition r_chol
    let n_obs = n as f64;
    let logdet = r_chol.diag().mapv(|v| v.log10()).sum() * 2. / n_obs;
    let sigma2 = rho_sqr / n_obs;
    let reduced_likelihood = -n_obs * (sigma2.log10() + logdet);
    Ok((
        reduced_likelihood,
        GpInnerParams {
            sigma2,
            beta,
            gamma: gamma.column(0).to_owned(),
            r_chol,
            ft: ft.column(0).to_owned(),
            ft_norm,
            r_inv_ones: r_inv_ones.column(0).to_owned(),
        },
    ))
}

/// A fitted Gaussian process
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GaussianProcess {
    theta: Array1<f64>,
    likelihood: f64,
    /// Process variance in output units
    sigma2: f64,
    inner: GpInnerParams,
    xt_norm: NormalizedData,
    yt_mean: f64,
    yt_std: f64,
}

impl GaussianProcess {
    /// Optimized kernel parameters (wrt normalized inputs)
    pub fn theta(&self) -> &Array1<f64> {
        &self.theta
    }

    /// Process variance
    pub fn variance(&self) -> f64 {
        self.sigma2
    }

    /// Reduced likelihood at optimum
    pub fn likelihood(&self) -> f64 {
        self.likelihood
    }

    fn normalize(&self, x: &ArrayBase<impl Data<Elem = f64>, Ix2>) -> Array2<f64> {
        (x - &self.xt_norm.mean) / &self.xt_norm.std
    }

    fn gradients_one(
        &self,
        x: &ArrayBase<impl Data<Elem = f64>, Ix1>,
    ) -> Result<(f64, f64, Array1<f64>, Array1<f64>)> {
        let inner = &self.inner;
        let xt = &self.xt_norm.data;
        let xnorm = self.normalize(&x.view().insert_axis(Axis(0)));
        let r = correlation(&xnorm, xt, &self.theta).row(0).to_owned();

        // dr_i/dx_d = -2 theta_d (xn_d - xt_id) r_i / xstd_d
        let mut dr = Array2::zeros((xt.nrows(), xt.ncols()));
        Zip::from(dr.rows_mut())
            .and(xt.rows())
            .and(&r)
            .for_each(|mut dr_i, xt_i, r_i| {
                Zip::from(&mut dr_i)
                    .and(&xnorm.row(0))
                    .and(&xt_i)
                    .and(&self.theta)
                    .and(&self.xt_norm.std)
                    .for_each(|d, xn, xtv, t, s| *d = -2. * t * (xn - xtv) * r_i / s);
            });

        let mean = (inner.beta + r.dot(&inner.gamma)) * self.yt_std + self.yt_mean;
        let mean_grad = dr.t().dot(&inner.gamma) * self.yt_std;

        let rt = inner
            .r_chol
            .solve_triangular(&r.view().insert_axis(Axis(1)), UPLO::Lower)?;
        let r_inv_r = inner.r_chol.t().solve_triangular(&rt, UPLO::Upper)?;
        let r_inv_r = r_inv_r.column(0);
        let u = (inner.r_inv_ones.dot(&r) - 1.) / inner.ft_norm;
        let var = self.sigma2 * (1. - r.dot(&r_inv_r) + u * u);
        let var_grad = (dr.t().dot(&r_inv_r) * -2. + dr.t().dot(&inner.r_inv_ones) * (2. * u / inner.ft_norm))
            * self.sigma2;
        if var > 0. {
            let std = var.sqrt();
            Ok((mean, std, mean_grad, var_grad / (2. * std)))
        } else {
            Ok((mean, 0., mean_grad, Array1::zeros(x.len())))
        }
    }
}

impl fmt::Display for GaussianProcess {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "GP(theta={}, variance={})", self.theta, self.sigma2)
    }
}

impl Surrogate for GaussianProcess {
    fn nx(&self) -> usize {
        self.theta.len()
    }

    fn predict_valstd(&self, x: &ArrayView2<f64>) -> Result<(Array1<f64>, Array1<f64>)> {
        check_nx(self.nx(), x)?;
        let inner = &self.inner;
        let xnorm = self.normalize(x);
        let corr = correlation(&xnorm, &self.xt_norm.data, &self.theta);
        let mean = (corr.dot(&inner.gamma) + inner.beta) * self.yt_std + self.yt_mean;

        let rt = inner.r_chol.solve_triangular(&corr.t(), UPLO::Lower)?;
        let u = (inner.ft.dot(&rt) - 1.) / inner.ft_norm;
        let mse = (rt.mapv(|v| v * v).sum_axis(Axis(0)) * -1. + 1. + u.mapv(|v| v * v)) * self.sigma2;
        // Mean Squared Error might be slightly negative depending on
        // machine precision: set to zero in that case
        let std = mse.mapv(|v| if v < 0. { 0. } else { v.sqrt() });
        Ok((mean, std))
    }

    fn predict_valstd_gradients(
        &self,
        x: &ArrayView1<f64>,
    ) -> Result<(f64, f64, Array1<f64>, Array1<f64>)> {
        if x.len() != self.nx() {
            return Err(SurrogateError::ShapeMismatch(format!(
                "expected {} components, got {}",
                self.nx(),
                x.len()
            )));
        }
        self.gradients_one(x)
    }

    fn has_gradients(&self) -> bool {
        true
    }
}
