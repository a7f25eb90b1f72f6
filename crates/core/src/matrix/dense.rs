use nalgebra::{Cholesky, DMatrix, Dyn};

use crate::error::{CovError, Result};

/// Cholesky factorization of a symmetric positive-definite matrix.
///
/// Rejects non-square input and any zero or non-finite pivot; nalgebra alone
/// accepts an exactly singular matrix with a zero pivot.
pub fn cholesky(a: &DMatrix<f64>, context: &str) -> Result<Cholesky<f64, Dyn>> {
    if a.nrows() != a.ncols() {
        return Err(CovError::dim(a.nrows(), a.ncols(), context));
    }
    let chol = a.clone().cholesky().ok_or_else(|| CovError::not_pd(context))?;
    if chol.l_dirty().diagonal().iter().any(|d| !(*d > 0.0 && d.is_finite())) {
        return Err(CovError::not_pd(context));
    }
    Ok(chol)
}

/// Lower-triangular factor L such that A = L * L^T.
pub fn cholesky_lower(a: &DMatrix<f64>, context: &str) -> Result<DMatrix<f64>> {
    Ok(cholesky(a, context)?.l())
}

/// Compute the log-determinant of an SPD matrix via Cholesky: log|A| = 2 * sum(log(diag(L))).
pub fn log_determinant_spd(a: &DMatrix<f64>) -> Option<f64> {
    let chol = cholesky(a, "log-determinant").ok()?;
    Some(2.0 * chol.l_dirty().diagonal().iter().map(|d| d.ln()).sum::<f64>())
}

/// Compute the inverse of an SPD matrix via Cholesky.
pub fn inverse_spd(a: &DMatrix<f64>, context: &str) -> Result<DMatrix<f64>> {
    Ok(cholesky(a, context)?.inverse())
}

/// Map an unconstrained square matrix onto a Cholesky factor: keep the lower
/// triangle and exponentiate the diagonal. Entries above the diagonal are ignored.
pub fn lower_with_exp_diag(raw: &DMatrix<f64>) -> DMatrix<f64> {
    let n = raw.nrows();
    let mut l = raw.lower_triangle();
    for i in 0..n {
        l[(i, i)] = raw[(i, i)].exp();
    }
    l
}

/// Inverse of [`lower_with_exp_diag`] for an SPD target: factor it and log the
/// diagonal so the forward transform reconstructs the same factor.
pub fn raw_cholesky_params(sigma: &DMatrix<f64>, context: &str) -> Result<DMatrix<f64>> {
    let mut l = cholesky_lower(sigma, context)?;
    for i in 0..l.nrows() {
        l[(i, i)] = l[(i, i)].ln();
    }
    Ok(l)
}

/// Normalize a covariance matrix to a correlation matrix: D^{-1/2} * S * D^{-1/2}.
pub fn cov2corr(cov: &DMatrix<f64>) -> DMatrix<f64> {
    let n = cov.nrows();
    let sd: Vec<f64> = (0..n).map(|i| cov[(i, i)].sqrt()).collect();
    DMatrix::from_fn(n, n, |i, j| cov[(i, j)] / (sd[i] * sd[j]))
}

/// Flatten the lower triangle of a Cholesky factor (row-major), logging the
/// diagonal so that every vector maps to a unique factor with positive diagonal.
pub fn flatten_cholesky_unique(l: &DMatrix<f64>) -> Vec<f64> {
    let n = l.nrows();
    let mut flat = Vec::with_capacity(n * (n + 1) / 2);
    for i in 0..n {
        for j in 0..=i {
            let v = l[(i, j)];
            flat.push(if i == j { v.ln() } else { v });
        }
    }
    flat
}

/// Inverse of [`flatten_cholesky_unique`].
pub fn unflatten_cholesky_unique(flat: &[f64]) -> Result<DMatrix<f64>> {
    let n = triangular_side(flat.len()).ok_or_else(|| {
        CovError::InvalidParameter(format!(
            "{} is not a triangular number of Cholesky entries",
            flat.len()
        ))
    })?;
    let mut l = DMatrix::zeros(n, n);
    let mut idx = 0;
    for i in 0..n {
        for j in 0..=i {
            l[(i, j)] = if i == j { flat[idx].exp() } else { flat[idx] };
            idx += 1;
        }
    }
    Ok(l)
}

/// Side length n such that n * (n + 1) / 2 == len.
fn triangular_side(len: usize) -> Option<usize> {
    let mut n = 0;
    while n * (n + 1) / 2 < len {
        n += 1;
    }
    (n * (n + 1) / 2 == len).then_some(n)
}

/// Compute the trace of a matrix.
pub fn trace(a: &DMatrix<f64>) -> f64 {
    (0..a.nrows().min(a.ncols())).map(|i| a[(i, i)]).sum()
}

/// Compute the Frobenius norm of a matrix.
pub fn frobenius_norm(a: &DMatrix<f64>) -> f64 {
    a.iter().map(|x| x * x).sum::<f64>().sqrt()
}
