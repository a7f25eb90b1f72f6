use crate::error::{CovError, Result};
use crate::matrix::dense::inverse_spd;
use crate::types::DenseMatrix;

use super::params::Parameter;

/// Contract shared by every structured covariance parameterization.
///
/// A covariance represents an `n x n` symmetric positive-definite matrix that is
/// only ever accessed through its log-determinant and the action of its inverse.
/// `solve` and `log_determinant` are pure functions of the current parameters;
/// parameters only change through [`set_parameters`](Covariance::set_parameters).
pub trait Covariance: Send + Sync + std::fmt::Debug {
    /// Human-readable name: "Identity", "AR1", "KroneckerFactored", etc.
    fn name(&self) -> &str;

    /// Dimension `n` of the represented matrix.
    fn size(&self) -> usize;

    /// log|Sigma|.
    fn log_determinant(&self) -> f64;

    /// Compute Sigma^{-1} X. `x` must have `size()` rows.
    fn solve(&self, x: &DenseMatrix) -> Result<DenseMatrix>;

    /// Free parameters in a stable order with stable shapes.
    fn parameters(&self) -> Vec<Parameter>;

    /// Overwrite the free parameters. Names and shapes must match [`parameters`](Covariance::parameters).
    fn set_parameters(&mut self, params: &[Parameter]) -> Result<()>;

    /// Clone into a boxed trait object.
    fn clone_boxed(&self) -> Box<dyn Covariance>;

    /// Total number of scalar parameters.
    fn n_params(&self) -> usize {
        self.parameters().iter().map(Parameter::len).sum()
    }

    /// Log-density of a prior the variant places on its own parameters.
    fn regularization_log_density(&self) -> f64 {
        0.0
    }

    /// Dense Sigma^{-1}. Intended for tests and inspection only.
    fn precision_matrix(&self) -> Result<DenseMatrix> {
        let n = self.size();
        self.solve(&DenseMatrix::identity(n, n))
    }

    /// Dense Sigma. Intended for tests and inspection only.
    fn covariance_matrix(&self) -> Result<DenseMatrix> {
        let prec = self.precision_matrix()?;
        let sym = (&prec + prec.transpose()) * 0.5;
        inverse_spd(&sym, self.name())
    }
}

impl Clone for Box<dyn Covariance> {
    fn clone(&self) -> Box<dyn Covariance> {
        self.clone_boxed()
    }
}

/// Reject a right-hand side whose row count differs from the covariance size.
pub(crate) fn check_rows(name: &str, size: usize, x: &DenseMatrix) -> Result<()> {
    if x.nrows() != size {
        return Err(CovError::dim(size, x.nrows(), format!("{name} solve")));
    }
    Ok(())
}

/// Validate a dimension passed to a constructor.
pub(crate) fn check_size(name: &str, size: usize) -> Result<()> {
    if size == 0 {
        return Err(CovError::Config(format!("{name} size must be positive")));
    }
    Ok(())
}
