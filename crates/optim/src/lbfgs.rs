//! Local refinement of the acquisition function with argmin L-BFGS
//! in the encoded unit hypercube.
use crate::acquisition::{gaussian_acquisition, gaussian_acquisition_1d, AcqFunc, AcqParams};
use crate::errors::Result;
use ambs_surrogate::Surrogate;
use argmin::core::{CostFunction, Executor, Gradient, State};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use ndarray::{Array1, ArrayView1, ArrayView2};

const LBFGS_MEMORY: usize = 7;
const LBFGS_MAX_ITERS: u64 = 50;
const LBFGS_TOL_GRAD: f64 = 1e-6;
const EPS: f64 = 1e-12;

/// Acquisition criterion at a single encoded point
pub(crate) struct AcqProblem<'a> {
    pub model: &'a dyn Surrogate,
    pub cost_model: Option<&'a dyn Surrogate>,
    pub y_opt: f64,
    pub criterion: AcqFunc,
    pub params: &'a AcqParams,
}

fn clamp_unit(x: &[f64]) -> Vec<f64> {
    x.iter().map(|v| v.clamp(0., 1.)).collect()
}

impl<'a> CostFunction for AcqProblem<'a> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        let x = clamp_unit(x);
        let pt = ArrayView2::from_shape((1, x.len()), &x)?;
        let values = gaussian_acquisition(
            &pt,
            self.model,
            self.y_opt,
            self.criterion,
            self.params,
            self.cost_model,
        )
        .map_err(|e| argmin::core::Error::msg(e.to_string()))?;
        Ok(values[0])
    }
}

impl<'a> Gradient for AcqProblem<'a> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, x: &Self::Param) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        let x = clamp_unit(x);
        let (_, grad) = gaussian_acquisition_1d(
            &ArrayView1::from(&x),
            self.model,
            self.y_opt,
            self.criterion,
            self.params,
            self.cost_model,
        )
        .map_err(|e| argmin::core::Error::msg(e.to_string()))?;
        // projected gradient: no move outside the hypercube
        Ok(x.iter()
            .zip(grad.iter())
            .map(|(xi, gi)| {
                if (*xi <= EPS && *gi > 0.) || (*xi >= 1. - EPS && *gi < 0.) {
                    0.
                } else {
                    *gi
                }
            })
            .collect())
    }
}

/// Minimize the acquisition criterion from `x0`.
/// Returns the best point found (clamped to the unit hypercube) and its value.
pub(crate) fn minimize(problem: AcqProblem, x0: &ArrayView1<f64>) -> Result<(Array1<f64>, f64)> {
    let init = clamp_unit(&x0.to_vec());
    let linesearch = MoreThuenteLineSearch::new();
    let solver = LBFGS::new(linesearch, LBFGS_MEMORY).with_tolerance_grad(LBFGS_TOL_GRAD)?;
    let res = Executor::new(problem, solver)
        .configure(|state| state.param(init.clone()).max_iters(LBFGS_MAX_ITERS))
        .run()?;
    let state = res.state();
    let best = state.get_best_param().cloned().unwrap_or(init);
    Ok((Array1::from(clamp_unit(&best)), state.get_best_cost()))
}
