//! L-BFGS with More-Thuente line search, backed by `argmin`.
//!
//! Objectives without an analytic gradient are differentiated with central
//! finite differences. The adapter remembers the best point it evaluated, so a
//! run that aborts (for example a failed line search) still reports where it got.

use std::cell::RefCell;

use argmin::core::{
    CostFunction, Error as ArgminError, Executor, State, TerminationReason, TerminationStatus,
};
use argmin::core::Gradient as ArgminGradient;
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use finitediff::FiniteDiff;

use crate::error::{CovError, Result};

use super::traits::{MinimizeOutcome, Minimizer, Objective};

type Theta = Vec<f64>;
type MoreThuente = MoreThuenteLineSearch<Theta, Theta, f64>;
type Lbfgs = LBFGS<MoreThuente, Theta, Theta, f64>;

pub const DEFAULT_TOL_GRAD: f64 = 1e-6;
pub const DEFAULT_TOL_COST: f64 = 1e-12;
pub const DEFAULT_MAX_ITER: usize = 300;
pub const DEFAULT_LBFGS_MEM: usize = 7;

/// Stopping rules and history size for [`LbfgsMinimizer`].
#[derive(Debug, Clone, PartialEq)]
pub struct LbfgsOptions {
    tol_grad: Option<f64>,
    tol_cost: Option<f64>,
    max_iter: usize,
    memory: usize,
}

impl LbfgsOptions {
    /// Validated options. At least one tolerance must be set; tolerances must be
    /// positive and finite, and `max_iter` and `memory` nonzero.
    pub fn new(
        tol_grad: Option<f64>,
        tol_cost: Option<f64>,
        max_iter: usize,
        memory: usize,
    ) -> Result<Self> {
        if tol_grad.is_none() && tol_cost.is_none() {
            return Err(CovError::Config(
                "L-BFGS needs a gradient or cost tolerance".to_string(),
            ));
        }
        for (label, tol) in [("tol_grad", tol_grad), ("tol_cost", tol_cost)] {
            if let Some(t) = tol {
                if !(t > 0.0 && t.is_finite()) {
                    return Err(CovError::Config(format!(
                        "L-BFGS {label} must be positive and finite, got {t}"
                    )));
                }
            }
        }
        if max_iter == 0 {
            return Err(CovError::Config("L-BFGS max_iter must be positive".to_string()));
        }
        if memory == 0 {
            return Err(CovError::Config("L-BFGS memory must be positive".to_string()));
        }
        Ok(Self {
            tol_grad,
            tol_cost,
            max_iter,
            memory,
        })
    }

    pub fn tol_grad(&self) -> Option<f64> {
        self.tol_grad
    }

    pub fn tol_cost(&self) -> Option<f64> {
        self.tol_cost
    }

    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    pub fn memory(&self) -> usize {
        self.memory
    }
}

impl Default for LbfgsOptions {
    fn default() -> Self {
        Self {
            tol_grad: Some(DEFAULT_TOL_GRAD),
            tol_cost: Some(DEFAULT_TOL_COST),
            max_iter: DEFAULT_MAX_ITER,
            memory: DEFAULT_LBFGS_MEM,
        }
    }
}

/// [`Minimizer`] running argmin's L-BFGS.
#[derive(Debug, Clone, Default)]
pub struct LbfgsMinimizer {
    options: LbfgsOptions,
}

impl LbfgsMinimizer {
    pub fn new(options: LbfgsOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LbfgsOptions {
        &self.options
    }

    fn build_solver(&self) -> Result<Lbfgs> {
        let mut solver = LBFGS::new(MoreThuenteLineSearch::new(), self.options.memory);
        if let Some(g) = self.options.tol_grad {
            solver = solver
                .with_tolerance_grad(g)
                .map_err(|e| CovError::Optimizer(e.to_string()))?;
        }
        if let Some(c) = self.options.tol_cost {
            solver = solver
                .with_tolerance_cost(c)
                .map_err(|e| CovError::Optimizer(e.to_string()))?;
        }
        Ok(solver)
    }
}

impl Minimizer for LbfgsMinimizer {
    fn minimize(&self, objective: &dyn Objective, theta0: Vec<f64>) -> Result<MinimizeOutcome> {
        if theta0.is_empty() {
            let value = objective.value(&theta0)?;
            return Ok(MinimizeOutcome {
                theta: theta0,
                value,
                converged: true,
                status: "no free parameters".to_string(),
                iterations: 0,
            });
        }

        let solver = self.build_solver()?;
        let best = RefCell::new(BestPoint::default());
        let problem = ObjectiveAdapter {
            objective,
            best: &best,
        };
        let max_iter = self.options.max_iter as u64;
        let start = theta0.clone();

        let run = Executor::new(problem, solver)
            .configure(|state| state.param(start).max_iters(max_iter))
            .run();

        match run {
            Ok(result) => {
                let state = result.state();
                let (converged, status) = describe_termination(state.get_termination_status());
                let theta = state
                    .get_best_param()
                    .cloned()
                    .or_else(|| best.borrow().theta.clone())
                    .unwrap_or(theta0);
                let value = objective.value(&theta)?;
                Ok(MinimizeOutcome {
                    theta,
                    value,
                    converged,
                    status,
                    iterations: state.get_iter(),
                })
            }
            Err(err) => {
                let snapshot = best.borrow().clone();
                let (theta, value) = match snapshot.theta {
                    Some(theta) => (theta, snapshot.value),
                    None => {
                        let value = objective.value(&theta0)?;
                        (theta0, value)
                    }
                };
                log::warn!("L-BFGS aborted, keeping best evaluated point: {err}");
                Ok(MinimizeOutcome {
                    theta,
                    value,
                    converged: false,
                    status: format!("aborted: {err}"),
                    iterations: 0,
                })
            }
        }
    }
}

fn describe_termination(status: &TerminationStatus) -> (bool, String) {
    match status {
        TerminationStatus::Terminated(
            reason @ (TerminationReason::SolverConverged | TerminationReason::TargetCostReached),
        ) => (true, format!("{reason:?}")),
        TerminationStatus::Terminated(reason) => (false, format!("{reason:?}")),
        TerminationStatus::NotTerminated => (false, "NotTerminated".to_string()),
    }
}

/// Lowest finite value evaluated so far.
#[derive(Debug, Clone)]
struct BestPoint {
    theta: Option<Theta>,
    value: f64,
}

impl Default for BestPoint {
    fn default() -> Self {
        Self {
            theta: None,
            value: f64::INFINITY,
        }
    }
}

impl BestPoint {
    fn offer(&mut self, theta: &[f64], value: f64) {
        if value < self.value {
            self.value = value;
            self.theta = Some(theta.to_vec());
        }
    }
}

/// Exposes an [`Objective`] as an argmin problem.
struct ObjectiveAdapter<'a> {
    objective: &'a dyn Objective,
    best: &'a RefCell<BestPoint>,
}

impl CostFunction for ObjectiveAdapter<'_> {
    type Param = Theta;
    type Output = f64;

    fn cost(&self, theta: &Self::Param) -> std::result::Result<Self::Output, ArgminError> {
        let value = self.objective.value(theta)?;
        if !value.is_finite() {
            return Err(CovError::Optimizer(format!("objective is not finite ({value})")).into());
        }
        self.best.borrow_mut().offer(theta, value);
        Ok(value)
    }
}

impl ArgminGradient for ObjectiveAdapter<'_> {
    type Param = Theta;
    type Gradient = Theta;

    fn gradient(&self, theta: &Self::Param) -> std::result::Result<Self::Gradient, ArgminError> {
        let grad = match self.objective.gradient(theta) {
            Ok(g) => g,
            Err(CovError::GradientNotImplemented) => {
                let failure: RefCell<Option<CovError>> = RefCell::new(None);
                let cost = |t: &Theta| -> f64 {
                    match self.objective.value(t) {
                        Ok(v) => v,
                        Err(e) => {
                            let mut slot = failure.borrow_mut();
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                            f64::NAN
                        }
                    }
                };
                let g = theta.central_diff(&cost);
                if let Some(e) = failure.into_inner() {
                    return Err(e.into());
                }
                g
            }
            Err(e) => return Err(e.into()),
        };
        if grad.len() != theta.len() {
            return Err(CovError::dim(theta.len(), grad.len(), "objective gradient").into());
        }
        if grad.iter().any(|g| !g.is_finite()) {
            return Err(CovError::Optimizer("gradient has non-finite entries".to_string()).into());
        }
        Ok(grad)
    }
}
