use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::{CovError, Result};
use crate::types::DenseMatrix;

use super::params::{check_parameters, Parameter};
use super::traits::{check_rows, check_size, Covariance};

/// Isotropic covariance: Sigma = sigma^2 * I.
///
/// Parameters: `[log_var]`, the log of sigma^2. Any real value is valid.
#[derive(Debug, Clone)]
pub struct Isotropic {
    size: usize,
    log_var: f64,
}

impl Isotropic {
    /// Create an isotropic covariance. Without `var`, log-variance is drawn from N(0, 1).
    pub fn new(size: usize, var: Option<f64>, rng: &mut impl Rng) -> Result<Self> {
        check_size("Isotropic", size)?;
        let log_var = match var {
            Some(v) if v > 0.0 && v.is_finite() => v.ln(),
            Some(v) => {
                return Err(CovError::Config(format!(
                    "Isotropic variance must be positive and finite, got {v}"
                )))
            }
            None => rng.sample(StandardNormal),
        };
        Ok(Self { size, log_var })
    }

    /// Current variance sigma^2.
    pub fn var(&self) -> f64 {
        self.log_var.exp()
    }
}

impl Covariance for Isotropic {
    fn name(&self) -> &str {
        "Isotropic"
    }

    fn size(&self) -> usize {
        self.size
    }

    fn log_determinant(&self) -> f64 {
        self.size as f64 * self.log_var
    }

    fn solve(&self, x: &DenseMatrix) -> Result<DenseMatrix> {
        check_rows(self.name(), self.size, x)?;
        Ok(x * (-self.log_var).exp())
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![Parameter::scalar("log_var", self.log_var)]
    }

    fn set_parameters(&mut self, params: &[Parameter]) -> Result<()> {
        check_parameters(self.name(), &self.parameters(), params)?;
        self.log_var = params[0].value[(0, 0)];
        Ok(())
    }

    fn clone_boxed(&self) -> Box<dyn Covariance> {
        Box::new(self.clone())
    }

    fn covariance_matrix(&self) -> Result<DenseMatrix> {
        Ok(DenseMatrix::identity(self.size, self.size) * self.var())
    }
}
