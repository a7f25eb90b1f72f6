use crate::error::Result;
use crate::types::DenseMatrix;

use super::params::{check_parameters, Parameter};
use super::traits::{check_rows, check_size, Covariance};

/// Identity covariance: Sigma = I. No free parameters.
#[derive(Debug, Clone)]
pub struct Identity {
    size: usize,
}

impl Identity {
    pub fn new(size: usize) -> Result<Self> {
        check_size("Identity", size)?;
        Ok(Self { size })
    }
}

impl Covariance for Identity {
    fn name(&self) -> &str {
        "Identity"
    }

    fn size(&self) -> usize {
        self.size
    }

    fn log_determinant(&self) -> f64 {
        0.0
    }

    fn solve(&self, x: &DenseMatrix) -> Result<DenseMatrix> {
        check_rows(self.name(), self.size, x)?;
        Ok(x.clone())
    }

    fn parameters(&self) -> Vec<Parameter> {
        Vec::new()
    }

    fn set_parameters(&mut self, params: &[Parameter]) -> Result<()> {
        check_parameters(self.name(), &[], params)
    }

    fn clone_boxed(&self) -> Box<dyn Covariance> {
        Box::new(self.clone())
    }

    fn precision_matrix(&self) -> Result<DenseMatrix> {
        Ok(DenseMatrix::identity(self.size, self.size))
    }

    fn covariance_matrix(&self) -> Result<DenseMatrix> {
        Ok(DenseMatrix::identity(self.size, self.size))
    }
}
