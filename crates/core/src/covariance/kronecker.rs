use rand::Rng;

use crate::error::{CovError, Result};
use crate::matrix::dense::{lower_with_exp_diag, raw_cholesky_params};
use crate::matrix::kronecker::{
    kronecker_product, mask_marginal_counts, solve_lower_kron, solve_lower_masked_kron,
    solve_upper_kron, solve_upper_masked_kron,
};
use crate::types::DenseMatrix;

use super::params::{check_parameters, standard_normal, Parameter};
use super::traits::{check_rows, Covariance};

/// Kronecker-factored covariance: Sigma = (L_1 L_1') (x) ... (x) (L_k L_k').
///
/// Parameters: `[L0_full, L1_full, ...]`, one unconstrained s_i x s_i matrix per
/// factor, transformed like [`UnconstrainedCholesky`](super::UnconstrainedCholesky).
///
/// With a mask, only the flattened positions flagged `true` exist. The covariance
/// is then `(P L P')(P L P')'` for `L = L_1 (x) ... (x) L_k` and `P` the selector of
/// valid rows; `size()` counts valid entries and `solve` takes the compressed
/// right-hand side (valid rows only, in flattened order).
#[derive(Debug, Clone)]
pub struct KroneckerFactored {
    sizes: Vec<usize>,
    raw: Vec<DenseMatrix>,
    mask: Option<Vec<bool>>,
    counts: Vec<Vec<usize>>,
    size: usize,
}

impl KroneckerFactored {
    /// Create from per-factor sizes, with optional per-factor initial covariances
    /// and an optional validity mask of length `sizes.iter().product()`.
    pub fn new(
        sizes: &[usize],
        sigmas: Option<&[DenseMatrix]>,
        mask: Option<Vec<bool>>,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        if sizes.is_empty() {
            return Err(CovError::Config(
                "KroneckerFactored needs at least one factor size".to_string(),
            ));
        }
        if let Some(i) = sizes.iter().position(|&s| s == 0) {
            return Err(CovError::Config(format!(
                "KroneckerFactored factor {i} has size 0"
            )));
        }

        let raw = match sigmas {
            Some(sigmas) => {
                if sigmas.len() != sizes.len() {
                    return Err(CovError::Config(format!(
                        "KroneckerFactored has {} sizes but {} initial matrices",
                        sizes.len(),
                        sigmas.len()
                    )));
                }
                sizes
                    .iter()
                    .zip(sigmas)
                    .enumerate()
                    .map(|(i, (&s, sigma))| {
                        if sigma.shape() != (s, s) {
                            return Err(CovError::dim(
                                s,
                                sigma.nrows(),
                                format!("KroneckerFactored initial matrix {i}"),
                            ));
                        }
                        raw_cholesky_params(sigma, &format!("KroneckerFactored factor {i}"))
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            None => sizes.iter().map(|&s| standard_normal(s, s, rng)).collect(),
        };

        let full_size: usize = sizes.iter().product();
        let (counts, size) = match &mask {
            Some(m) => {
                if m.len() != full_size {
                    return Err(CovError::Config(format!(
                        "KroneckerFactored mask has length {}, expected {full_size}",
                        m.len()
                    )));
                }
                let n_valid = m.iter().filter(|&&v| v).count();
                if n_valid == 0 {
                    return Err(CovError::Config(
                        "KroneckerFactored mask has no valid entries".to_string(),
                    ));
                }
                (mask_marginal_counts(sizes, m), n_valid)
            }
            None => (
                sizes.iter().map(|&s| vec![full_size / s; s]).collect(),
                full_size,
            ),
        };

        Ok(Self {
            sizes: sizes.to_vec(),
            raw,
            mask,
            counts,
            size,
        })
    }

    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    /// Size of the unmasked grid, the product of the factor sizes.
    pub fn full_size(&self) -> usize {
        self.sizes.iter().product()
    }

    pub fn mask(&self) -> Option<&[bool]> {
        self.mask.as_deref()
    }

    /// Lower-triangular factors L_i.
    pub fn factors(&self) -> Vec<DenseMatrix> {
        self.raw.iter().map(lower_with_exp_diag).collect()
    }
}

impl Covariance for KroneckerFactored {
    fn name(&self) -> &str {
        "KroneckerFactored"
    }

    fn size(&self) -> usize {
        self.size
    }

    /// Each factor's raw diagonal entry d recurs once per valid combination of
    /// the other modes, so it is weighted by that count.
    fn log_determinant(&self) -> f64 {
        2.0 * self
            .raw
            .iter()
            .zip(&self.counts)
            .map(|(raw, counts)| {
                raw.diagonal()
                    .iter()
                    .zip(counts)
                    .map(|(d, &c)| d * c as f64)
                    .sum::<f64>()
            })
            .sum::<f64>()
    }

    /// `x` has `size()` rows: with a mask, the valid rows only in flattened
    /// order, never the full `full_size()` grid.
    fn solve(&self, x: &DenseMatrix) -> Result<DenseMatrix> {
        check_rows(self.name(), self.size, x)?;
        let factors = self.factors();
        match &self.mask {
            Some(mask) => {
                let z = solve_lower_masked_kron(&factors, x, mask)?;
                solve_upper_masked_kron(&factors, &z, mask)
            }
            None => {
                let z = solve_lower_kron(&factors, x)?;
                solve_upper_kron(&factors, &z)
            }
        }
    }

    fn parameters(&self) -> Vec<Parameter> {
        self.raw
            .iter()
            .enumerate()
            .map(|(i, r)| Parameter::new(format!("L{i}_full"), r.clone()))
            .collect()
    }

    fn set_parameters(&mut self, params: &[Parameter]) -> Result<()> {
        check_parameters(self.name(), &self.parameters(), params)?;
        for (raw, p) in self.raw.iter_mut().zip(params) {
            raw.copy_from(&p.value);
        }
        Ok(())
    }

    fn clone_boxed(&self) -> Box<dyn Covariance> {
        Box::new(self.clone())
    }

    fn covariance_matrix(&self) -> Result<DenseMatrix> {
        let factors = self.factors();
        match &self.mask {
            Some(mask) => {
                let valid: Vec<usize> = mask
                    .iter()
                    .enumerate()
                    .filter_map(|(i, &v)| v.then_some(i))
                    .collect();
                let l = kronecker_product(&factors)
                    .select_rows(valid.iter())
                    .select_columns(valid.iter());
                Ok(&l * l.transpose())
            }
            None => {
                let covs: Vec<DenseMatrix> = factors.iter().map(|l| l * l.transpose()).collect();
                Ok(kronecker_product(&covs))
            }
        }
    }
}
