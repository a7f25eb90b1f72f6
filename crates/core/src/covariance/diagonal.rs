use rand::Rng;
use statrs::distribution::{Continuous, InverseGamma};

use crate::error::{CovError, Result};
use crate::types::{DenseMatrix, DenseVector};

use super::params::{check_parameters, standard_normal, Parameter};
use super::traits::{check_rows, check_size, Covariance};

/// Diagonal covariance: Sigma = diag(v).
///
/// Parameters: `[log_prec]` (n x 1), the log-precisions `-ln v_i`.
#[derive(Debug, Clone)]
pub struct Diagonal {
    log_prec: DenseVector,
}

impl Diagonal {
    /// Create a diagonal covariance from per-dimension variances, or from
    /// standard normal log-precisions when `diag_var` is `None`.
    pub fn new(size: usize, diag_var: Option<&[f64]>, rng: &mut impl Rng) -> Result<Self> {
        check_size("Diagonal", size)?;
        let log_prec = match diag_var {
            Some(v) => {
                if v.len() != size {
                    return Err(CovError::Config(format!(
                        "Diagonal of size {size} given {} variances",
                        v.len()
                    )));
                }
                if let Some(bad) = v.iter().find(|x| !(**x > 0.0 && x.is_finite())) {
                    return Err(CovError::Config(format!(
                        "Diagonal variances must be positive and finite, got {bad}"
                    )));
                }
                DenseVector::from_iterator(size, v.iter().map(|x| -x.ln()))
            }
            None => DenseVector::from_column_slice(standard_normal(size, 1, rng).as_slice()),
        };
        Ok(Self { log_prec })
    }

    /// Per-dimension precisions 1 / v_i.
    pub fn precisions(&self) -> DenseVector {
        self.log_prec.map(f64::exp)
    }
}

impl Covariance for Diagonal {
    fn name(&self) -> &str {
        "Diagonal"
    }

    fn size(&self) -> usize {
        self.log_prec.len()
    }

    fn log_determinant(&self) -> f64 {
        -self.log_prec.sum()
    }

    fn solve(&self, x: &DenseMatrix) -> Result<DenseMatrix> {
        check_rows(self.name(), self.size(), x)?;
        let prec = self.precisions();
        let mut z = x.clone();
        for (i, mut row) in z.row_iter_mut().enumerate() {
            row *= prec[i];
        }
        Ok(z)
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![Parameter::vector("log_prec", self.log_prec.as_slice())]
    }

    fn set_parameters(&mut self, params: &[Parameter]) -> Result<()> {
        check_parameters(self.name(), &self.parameters(), params)?;
        self.log_prec.copy_from_slice(params[0].value.as_slice());
        Ok(())
    }

    fn clone_boxed(&self) -> Box<dyn Covariance> {
        Box::new(self.clone())
    }

    fn precision_matrix(&self) -> Result<DenseMatrix> {
        Ok(DenseMatrix::from_diagonal(&self.precisions()))
    }

    fn covariance_matrix(&self) -> Result<DenseMatrix> {
        Ok(DenseMatrix::from_diagonal(&self.log_prec.map(|p| (-p).exp())))
    }
}

/// Default inverse-gamma shape.
pub const DEFAULT_GAMMA_ALPHA: f64 = 1.5;
/// Default inverse-gamma scale.
pub const DEFAULT_GAMMA_BETA: f64 = 1e-10;

/// Diagonal covariance with an inverse-gamma prior on each precision.
///
/// Solves and log-determinants are those of the wrapped [`Diagonal`]; the
/// prior only contributes `regularization_log_density`.
#[derive(Debug, Clone)]
pub struct DiagonalGammaPrior {
    diag: Diagonal,
    prior: InverseGamma,
}

impl DiagonalGammaPrior {
    /// `alpha`/`beta` default to 1.5 and 1e-10.
    pub fn new(
        size: usize,
        diag_var: Option<&[f64]>,
        alpha: Option<f64>,
        beta: Option<f64>,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        let alpha = alpha.unwrap_or(DEFAULT_GAMMA_ALPHA);
        let beta = beta.unwrap_or(DEFAULT_GAMMA_BETA);
        let prior = InverseGamma::new(alpha, beta)
            .map_err(|e| CovError::Distribution(format!("inverse-gamma({alpha}, {beta}): {e}")))?;
        Ok(Self {
            diag: Diagonal::new(size, diag_var, rng)?,
            prior,
        })
    }

    pub fn precisions(&self) -> DenseVector {
        self.diag.precisions()
    }
}

impl Covariance for DiagonalGammaPrior {
    fn name(&self) -> &str {
        "DiagonalGammaPrior"
    }

    fn size(&self) -> usize {
        self.diag.size()
    }

    fn log_determinant(&self) -> f64 {
        self.diag.log_determinant()
    }

    fn solve(&self, x: &DenseMatrix) -> Result<DenseMatrix> {
        self.diag.solve(x)
    }

    fn parameters(&self) -> Vec<Parameter> {
        self.diag.parameters()
    }

    fn set_parameters(&mut self, params: &[Parameter]) -> Result<()> {
        self.diag.set_parameters(params)
    }

    fn clone_boxed(&self) -> Box<dyn Covariance> {
        Box::new(self.clone())
    }

    fn regularization_log_density(&self) -> f64 {
        self.precisions().iter().map(|&p| self.prior.ln_pdf(p)).sum()
    }

    fn precision_matrix(&self) -> Result<DenseMatrix> {
        self.diag.precision_matrix()
    }

    fn covariance_matrix(&self) -> Result<DenseMatrix> {
        self.diag.covariance_matrix()
    }
}
