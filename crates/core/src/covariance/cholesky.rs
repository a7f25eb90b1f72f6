use rand::Rng;
use statrs::function::gamma::ln_gamma;

use crate::error::{CovError, Result};
use crate::matrix::dense::{lower_with_exp_diag, raw_cholesky_params};
use crate::types::DenseMatrix;

use super::params::{check_parameters, standard_normal, Parameter};
use super::traits::{check_rows, check_size, Covariance};

/// Pick the raw parameter matrix from exactly one of `size` or an explicit target.
pub(crate) fn initial_raw_factor(
    name: &str,
    size: Option<usize>,
    target: Option<&DenseMatrix>,
    rng: &mut impl Rng,
) -> Result<DenseMatrix> {
    match (size, target) {
        (Some(_), Some(_)) => Err(CovError::Config(format!(
            "{name} takes either a size or an initial matrix, not both"
        ))),
        (None, None) => Err(CovError::Config(format!(
            "{name} needs a size or an initial matrix"
        ))),
        (Some(n), None) => {
            check_size(name, n)?;
            Ok(standard_normal(n, n, rng))
        }
        (None, Some(m)) => raw_cholesky_params(m, name),
    }
}

fn raw_diagonal_sum(raw: &DenseMatrix) -> f64 {
    raw.diagonal().sum()
}

/// Covariance parameterized by its Cholesky factor: Sigma = L L'.
///
/// Parameters: `[L_full]`, an unconstrained n x n matrix. Its lower triangle,
/// with the diagonal exponentiated, is L; the upper triangle is ignored.
#[derive(Debug, Clone)]
pub struct UnconstrainedCholesky {
    raw: DenseMatrix,
}

impl UnconstrainedCholesky {
    /// Exactly one of `size` (random init) or `sigma` (factorized) must be given.
    pub fn new(size: Option<usize>, sigma: Option<&DenseMatrix>, rng: &mut impl Rng) -> Result<Self> {
        let raw = initial_raw_factor("UnconstrainedCholesky", size, sigma, rng)?;
        Ok(Self { raw })
    }

    /// Lower-triangular factor L.
    pub fn factor(&self) -> DenseMatrix {
        lower_with_exp_diag(&self.raw)
    }
}

impl Covariance for UnconstrainedCholesky {
    fn name(&self) -> &str {
        "UnconstrainedCholesky"
    }

    fn size(&self) -> usize {
        self.raw.nrows()
    }

    fn log_determinant(&self) -> f64 {
        2.0 * raw_diagonal_sum(&self.raw)
    }

    fn solve(&self, x: &DenseMatrix) -> Result<DenseMatrix> {
        check_rows(self.name(), self.size(), x)?;
        let l = self.factor();
        let mut z = x.clone();
        if !(l.solve_lower_triangular_mut(&mut z) && l.tr_solve_lower_triangular_mut(&mut z)) {
            return Err(CovError::not_pd("UnconstrainedCholesky factor"));
        }
        Ok(z)
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![Parameter::new("L_full", self.raw.clone())]
    }

    fn set_parameters(&mut self, params: &[Parameter]) -> Result<()> {
        check_parameters(self.name(), &self.parameters(), params)?;
        self.raw.copy_from(&params[0].value);
        Ok(())
    }

    fn clone_boxed(&self) -> Box<dyn Covariance> {
        Box::new(self.clone())
    }

    fn covariance_matrix(&self) -> Result<DenseMatrix> {
        let l = self.factor();
        Ok(&l * l.transpose())
    }
}

/// Scale of the Wishart prior's scale matrix `WISHART_SCALE * I`.
const WISHART_SCALE: f64 = 1e5;

/// Cholesky covariance with a broad Wishart prior on Sigma.
///
/// The prior has `size + 2` degrees of freedom and scale `1e5 * I`, which keeps
/// Sigma away from singularity without pulling it toward a particular value.
#[derive(Debug, Clone)]
pub struct CholeskyWishartReg {
    chol: UnconstrainedCholesky,
    df: f64,
}

impl CholeskyWishartReg {
    pub fn new(size: Option<usize>, sigma: Option<&DenseMatrix>, rng: &mut impl Rng) -> Result<Self> {
        let raw = initial_raw_factor("CholeskyWishartReg", size, sigma, rng)?;
        let chol = UnconstrainedCholesky { raw };
        let df = chol.size() as f64 + 2.0;
        Ok(Self { chol, df })
    }

    pub fn factor(&self) -> DenseMatrix {
        self.chol.factor()
    }

    pub fn degrees_of_freedom(&self) -> f64 {
        self.df
    }
}

/// ln of the multivariate gamma function Gamma_p(a).
pub(crate) fn ln_multivariate_gamma(p: usize, a: f64) -> f64 {
    let p_f = p as f64;
    p_f * (p_f - 1.0) / 4.0 * std::f64::consts::PI.ln()
        + (1..=p).map(|j| ln_gamma(a + (1.0 - j as f64) / 2.0)).sum::<f64>()
}

impl Covariance for CholeskyWishartReg {
    fn name(&self) -> &str {
        "CholeskyWishartReg"
    }

    fn size(&self) -> usize {
        self.chol.size()
    }

    fn log_determinant(&self) -> f64 {
        self.chol.log_determinant()
    }

    fn solve(&self, x: &DenseMatrix) -> Result<DenseMatrix> {
        self.chol.solve(x)
    }

    fn parameters(&self) -> Vec<Parameter> {
        self.chol.parameters()
    }

    fn set_parameters(&mut self, params: &[Parameter]) -> Result<()> {
        self.chol.set_parameters(params)
    }

    fn clone_boxed(&self) -> Box<dyn Covariance> {
        Box::new(self.clone())
    }

    /// Wishart(df, 1e5 I) log-density of Sigma = L L'.
    fn regularization_log_density(&self) -> f64 {
        let p = self.size();
        let p_f = p as f64;
        let nu = self.df;
        // tr(L L') is the squared Frobenius norm of L.
        let trace_sigma = self.factor().norm_squared();
        (nu - p_f - 1.0) / 2.0 * self.log_determinant()
            - trace_sigma / (2.0 * WISHART_SCALE)
            - nu * p_f / 2.0 * std::f64::consts::LN_2
            - nu / 2.0 * p_f * WISHART_SCALE.ln()
            - ln_multivariate_gamma(p, nu / 2.0)
    }

    fn covariance_matrix(&self) -> Result<DenseMatrix> {
        self.chol.covariance_matrix()
    }
}
