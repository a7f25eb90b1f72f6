use rand::Rng;

use crate::error::Result;
use crate::matrix::dense::lower_with_exp_diag;
use crate::types::DenseMatrix;

use super::cholesky::initial_raw_factor;
use super::params::{check_parameters, Parameter};
use super::traits::{check_rows, Covariance};

/// Covariance parameterized by a Cholesky factor of its precision: Sigma^{-1} = M M'.
///
/// Parameters: `[Linv_full]`, transformed into M the same way as
/// [`UnconstrainedCholesky`](super::UnconstrainedCholesky). Solving is two
/// triangular multiplies; no substitution is needed.
///
/// `M` is the lower factor of the precision, so `solve(X) = M (M' X)`. The
/// transposed orientation `M' M` would not reproduce an `inv_sigma` initializer.
#[derive(Debug, Clone)]
pub struct UnconstrainedInvCholesky {
    raw: DenseMatrix,
}

impl UnconstrainedInvCholesky {
    /// Exactly one of `size` (random init) or `inv_sigma` (a target precision) must be given.
    pub fn new(size: Option<usize>, inv_sigma: Option<&DenseMatrix>, rng: &mut impl Rng) -> Result<Self> {
        let raw = initial_raw_factor("UnconstrainedInvCholesky", size, inv_sigma, rng)?;
        Ok(Self { raw })
    }

    /// Lower-triangular factor M of the precision.
    pub fn factor(&self) -> DenseMatrix {
        lower_with_exp_diag(&self.raw)
    }
}

impl Covariance for UnconstrainedInvCholesky {
    fn name(&self) -> &str {
        "UnconstrainedInvCholesky"
    }

    fn size(&self) -> usize {
        self.raw.nrows()
    }

    fn log_determinant(&self) -> f64 {
        -2.0 * self.raw.diagonal().sum()
    }

    fn solve(&self, x: &DenseMatrix) -> Result<DenseMatrix> {
        check_rows(self.name(), self.size(), x)?;
        let m = self.factor();
        Ok(&m * (m.tr_mul(x)))
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![Parameter::new("Linv_full", self.raw.clone())]
    }

    fn set_parameters(&mut self, params: &[Parameter]) -> Result<()> {
        check_parameters(self.name(), &self.parameters(), params)?;
        self.raw.copy_from(&params[0].value);
        Ok(())
    }

    fn clone_boxed(&self) -> Box<dyn Covariance> {
        Box::new(self.clone())
    }

    fn precision_matrix(&self) -> Result<DenseMatrix> {
        let m = self.factor();
        Ok(&m * m.transpose())
    }
}
