use crate::error::{CovError, Result};

/// Scalar function of a flat parameter vector, to be minimized.
pub trait Objective {
    /// Objective value at `theta`.
    fn value(&self, theta: &[f64]) -> Result<f64>;

    /// Analytic gradient at `theta`. Minimizers fall back to finite differences
    /// when this returns [`CovError::GradientNotImplemented`].
    fn gradient(&self, _theta: &[f64]) -> Result<Vec<f64>> {
        Err(CovError::GradientNotImplemented)
    }
}

/// A gradient-based minimizer that can be injected into model fitting.
pub trait Minimizer {
    /// Minimize `objective` starting from `theta0`.
    ///
    /// Failing to converge is not an error: the outcome carries `converged = false`
    /// and a status describing why the run stopped.
    fn minimize(&self, objective: &dyn Objective, theta0: Vec<f64>) -> Result<MinimizeOutcome>;
}

/// Result of a minimization run.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizeOutcome {
    /// Best parameter vector found.
    pub theta: Vec<f64>,
    /// Objective value at `theta`.
    pub value: f64,
    pub converged: bool,
    pub status: String,
    /// Completed iterations; zero when the solver aborted.
    pub iterations: u64,
}
