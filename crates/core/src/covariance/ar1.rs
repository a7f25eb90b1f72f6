use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::{CovError, Result};
use crate::matrix::sparse::{ar1_band_templates, sparse_to_dense, spmm};
use crate::types::{DenseMatrix, SparseMat};

use super::params::{check_parameters, Parameter};
use super::traits::{check_rows, check_size, Covariance};

/// First-order autoregressive covariance over one or more independent runs.
///
/// Parameters: `[rho_unc, log_sigma]`, mapped to `rho = 2 * sigmoid(rho_unc) - 1`
/// and `sigma = exp(log_sigma)`. Within each run the precision is
///
/// ```text
/// Sigma^{-1} = (I - rho * offdiag + rho^2 * interior) / sigma^2
/// ```
///
/// where `offdiag` has ones on the first sub/super-diagonal and `interior` has ones
/// on every diagonal position except the run's first and last. Runs never couple.
///
/// Log-determinant, per run of length r: `2 r ln(sigma) - ln(1 - rho^2)`, or
/// `2 ln(sigma)` when r = 1.
#[derive(Debug, Clone)]
pub struct Ar1 {
    rho_unc: f64,
    log_sigma: f64,
    run_lengths: Vec<usize>,
    offdiag: SparseMat,
    interior: SparseMat,
}

impl Ar1 {
    /// Create an AR(1) covariance. `scan_onsets` are run start offsets; the default
    /// is a single run covering all `size` rows. Missing `rho`/`sigma` are drawn
    /// as standard normal unconstrained values.
    pub fn new(
        size: usize,
        rho: Option<f64>,
        sigma: Option<f64>,
        scan_onsets: Option<&[usize]>,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        check_size("AR1", size)?;
        let rho_unc = match rho {
            Some(r) if r > -1.0 && r < 1.0 => 2.0 * r.atanh(),
            Some(r) => {
                return Err(CovError::Config(format!(
                    "AR1 rho must lie in (-1, 1), got {r}"
                )))
            }
            None => rng.sample(StandardNormal),
        };
        let log_sigma = match sigma {
            Some(s) if s > 0.0 && s.is_finite() => s.ln(),
            Some(s) => {
                return Err(CovError::Config(format!(
                    "AR1 sigma must be positive and finite, got {s}"
                )))
            }
            None => rng.sample(StandardNormal),
        };
        let run_lengths = match scan_onsets {
            Some(onsets) => run_lengths_from_onsets(size, onsets)?,
            None => vec![size],
        };
        let (offdiag, interior) = ar1_band_templates(&run_lengths);

        Ok(Self {
            rho_unc,
            log_sigma,
            run_lengths,
            offdiag,
            interior,
        })
    }

    /// Autocorrelation in (-1, 1).
    pub fn rho(&self) -> f64 {
        // 2 * sigmoid(u) - 1 == tanh(u / 2)
        (0.5 * self.rho_unc).tanh()
    }

    pub fn sigma(&self) -> f64 {
        self.log_sigma.exp()
    }

    pub fn run_lengths(&self) -> &[usize] {
        &self.run_lengths
    }
}

fn run_lengths_from_onsets(size: usize, onsets: &[usize]) -> Result<Vec<usize>> {
    if onsets.first() != Some(&0) {
        return Err(CovError::Config(
            "AR1 scan onsets must start at 0".to_string(),
        ));
    }
    if onsets.windows(2).any(|w| w[1] <= w[0]) {
        return Err(CovError::Config(
            "AR1 scan onsets must be strictly increasing".to_string(),
        ));
    }
    if let Some(&last) = onsets.last() {
        if last >= size {
            return Err(CovError::Config(format!(
                "AR1 scan onset {last} is outside size {size}"
            )));
        }
    }
    Ok(onsets
        .iter()
        .zip(onsets.iter().skip(1).chain(std::iter::once(&size)))
        .map(|(start, end)| end - start)
        .collect())
}

impl Covariance for Ar1 {
    fn name(&self) -> &str {
        "AR1"
    }

    fn size(&self) -> usize {
        self.run_lengths.iter().sum()
    }

    fn log_determinant(&self) -> f64 {
        let rho = self.rho();
        let log_one_minus_rho2 = (1.0 - rho * rho).ln();
        self.run_lengths
            .iter()
            .map(|&r| {
                let base = 2.0 * r as f64 * self.log_sigma;
                if r > 1 {
                    base - log_one_minus_rho2
                } else {
                    base
                }
            })
            .sum()
    }

    fn solve(&self, x: &DenseMatrix) -> Result<DenseMatrix> {
        check_rows(self.name(), self.size(), x)?;
        let rho = self.rho();
        let inv_sigma2 = (-2.0 * self.log_sigma).exp();
        let z = x - spmm(&self.offdiag, x) * rho + spmm(&self.interior, x) * (rho * rho);
        Ok(z * inv_sigma2)
    }

    fn parameters(&self) -> Vec<Parameter> {
        vec![
            Parameter::scalar("rho_unc", self.rho_unc),
            Parameter::scalar("log_sigma", self.log_sigma),
        ]
    }

    fn set_parameters(&mut self, params: &[Parameter]) -> Result<()> {
        check_parameters(self.name(), &self.parameters(), params)?;
        self.rho_unc = params[0].value[(0, 0)];
        self.log_sigma = params[1].value[(0, 0)];
        Ok(())
    }

    fn clone_boxed(&self) -> Box<dyn Covariance> {
        Box::new(self.clone())
    }

    fn precision_matrix(&self) -> Result<DenseMatrix> {
        let n = self.size();
        let rho = self.rho();
        let prec = DenseMatrix::identity(n, n) - sparse_to_dense(&self.offdiag) * rho
            + sparse_to_dense(&self.interior) * (rho * rho);
        Ok(prec / self.sigma().powi(2))
    }
}
