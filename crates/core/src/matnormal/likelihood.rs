//! Matrix-normal log-densities evaluated through the [`Covariance`] contract.
//!
//! Only `solve` and `log_determinant` of the row/column covariances are used,
//! so structured covariances never have to be materialized.

use std::f64::consts::PI;

use crate::covariance::Covariance;
use crate::error::{CovError, Result};
use crate::matrix::dense::{cholesky, trace};
use crate::types::DenseMatrix;

fn check_shape(y: &DenseMatrix, row_cov: &dyn Covariance, col_cov: &dyn Covariance) -> Result<()> {
    if y.nrows() != row_cov.size() {
        return Err(CovError::dim(row_cov.size(), y.nrows(), "matrix-normal rows"));
    }
    if y.ncols() != col_cov.size() {
        return Err(CovError::dim(col_cov.size(), y.ncols(), "matrix-normal columns"));
    }
    Ok(())
}

/// log-density of `Y ~ MN(0, R, C)`:
///
/// ```text
/// -(n p / 2) ln(2 pi) - (p / 2) ln|R| - (n / 2) ln|C| - tr(C^{-1} Y' R^{-1} Y) / 2
/// ```
pub fn matnorm_logp(y: &DenseMatrix, row_cov: &dyn Covariance, col_cov: &dyn Covariance) -> Result<f64> {
    check_shape(y, row_cov, col_cov)?;
    let (n, p) = (y.nrows() as f64, y.ncols() as f64);
    let ry = row_cov.solve(y)?;
    let quad = trace(&col_cov.solve(&y.tr_mul(&ry))?);
    Ok(-0.5 * n * p * (2.0 * PI).ln()
        - 0.5 * p * row_cov.log_determinant()
        - 0.5 * n * col_cov.log_determinant()
        - 0.5 * quad)
}

/// log-density of `Y ~ MN(0, R + A S A', C)`, with the latent `A`-mapping
/// marginalized out.
///
/// Uses Woodbury for `(R + A S A')^{-1} Y` and the matrix determinant lemma
/// `ln|R + A S A'| = ln|R| + ln|S| + ln|S^{-1} + A' R^{-1} A|`, so only k x k
/// systems are factorized, `k` being the number of columns of `A`.
pub fn matnorm_logp_marginal_row(
    y: &DenseMatrix,
    row_cov: &dyn Covariance,
    col_cov: &dyn Covariance,
    marg: &DenseMatrix,
    marg_cov: &dyn Covariance,
) -> Result<f64> {
    check_shape(y, row_cov, col_cov)?;
    if marg.nrows() != row_cov.size() {
        return Err(CovError::dim(row_cov.size(), marg.nrows(), "marginal loading rows"));
    }
    if marg.ncols() != marg_cov.size() {
        return Err(CovError::dim(marg_cov.size(), marg.ncols(), "marginal loading columns"));
    }
    let (n, p) = (y.nrows() as f64, y.ncols() as f64);
    let k = marg.ncols();

    let ry = row_cov.solve(y)?;
    let ra = row_cov.solve(marg)?;

    // S^{-1} + A' R^{-1} A
    let inner = marg_cov.solve(&DenseMatrix::identity(k, k))? + marg.tr_mul(&ra);
    let inner = (&inner + inner.transpose()) * 0.5;
    let inner_chol = cholesky(&inner, "marginal Woodbury inner matrix")?;
    let inner_logdet = 2.0 * inner_chol.l_dirty().diagonal().map(f64::ln).sum();

    // (R + A S A')^{-1} Y
    let uy = &ry - &ra * inner_chol.solve(&ra.tr_mul(y));
    let quad = trace(&col_cov.solve(&y.tr_mul(&uy))?);

    let logdet_u = row_cov.log_determinant() + marg_cov.log_determinant() + inner_logdet;
    Ok(-0.5 * n * p * (2.0 * PI).ln() - 0.5 * p * logdet_u - 0.5 * n * col_cov.log_determinant()
        - 0.5 * quad)
}

/// log-density of `Y ~ MN(0, R, C + A S A')`, the column-side counterpart of
/// [`matnorm_logp_marginal_row`].
pub fn matnorm_logp_marginal_col(
    y: &DenseMatrix,
    row_cov: &dyn Covariance,
    col_cov: &dyn Covariance,
    marg: &DenseMatrix,
    marg_cov: &dyn Covariance,
) -> Result<f64> {
    check_shape(y, row_cov, col_cov)?;
    matnorm_logp_marginal_row(&y.transpose(), col_cov, row_cov, marg, marg_cov)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::covariance::test_util::{random_matrix, random_spd, rng};
    use crate::covariance::{Ar1, Identity, Isotropic, UnconstrainedCholesky};
    use crate::matrix::dense::{cholesky_lower, log_determinant_spd};
    use crate::matrix::kronecker_product;
    use approx::assert_relative_eq;

    /// Dense log N(0, C (x) U) of vec(Y).
    fn dense_logp(y: &DenseMatrix, u: &DenseMatrix, c: &DenseMatrix) -> f64 {
        let cov = kronecker_product(&[c.clone(), u.clone()]);
        let v = DenseMatrix::from_column_slice(y.len(), 1, y.as_slice());
        let l = cholesky_lower(&cov, "test").unwrap();
        let z = l.solve_lower_triangular(&v).unwrap();
        -0.5 * y.len() as f64 * (2.0 * PI).ln()
            - 0.5 * log_determinant_spd(&cov).unwrap()
            - 0.5 * z.norm_squared()
    }

    #[test]
    fn test_matnorm_logp_matches_dense() {
        let mut r = rng(20);
        let sigma_r = random_spd(4, &mut r);
        let sigma_c = random_spd(3, &mut r);
        let row = UnconstrainedCholesky::new(None, Some(&sigma_r), &mut r).unwrap();
        let col = UnconstrainedCholesky::new(None, Some(&sigma_c), &mut r).unwrap();
        let y = random_matrix(4, 3, &mut r);
        assert_relative_eq!(
            matnorm_logp(&y, &row, &col).unwrap(),
            dense_logp(&y, &sigma_r, &sigma_c),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_marginal_row_matches_dense() {
        let mut r = rng(21);
        let row = Ar1::new(5, Some(0.3), Some(1.2), None, &mut r).unwrap();
        let sigma_c = random_spd(3, &mut r);
        let col = UnconstrainedCholesky::new(None, Some(&sigma_c), &mut r).unwrap();
        let marg_cov = Isotropic::new(2, Some(0.7), &mut r).unwrap();
        let a = random_matrix(5, 2, &mut r);
        let y = random_matrix(5, 3, &mut r);

        let u = row.covariance_matrix().unwrap() + &a * a.transpose() * 0.7;
        assert_relative_eq!(
            matnorm_logp_marginal_row(&y, &row, &col, &a, &marg_cov).unwrap(),
            dense_logp(&y, &u, &sigma_c),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_marginal_col_matches_dense() {
        let mut r = rng(22);
        let sigma_r = random_spd(3, &mut r);
        let row = UnconstrainedCholesky::new(None, Some(&sigma_r), &mut r).unwrap();
        let col = Identity::new(4).unwrap();
        let marg_cov = Identity::new(2).unwrap();
        let a = random_matrix(4, 2, &mut r);
        let y = random_matrix(3, 4, &mut r);

        let c = DenseMatrix::identity(4, 4) + &a * a.transpose();
        assert_relative_eq!(
            matnorm_logp_marginal_col(&y, &row, &col, &a, &marg_cov).unwrap(),
            dense_logp(&y, &sigma_r, &c),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_shape_errors() {
        let row = Identity::new(3).unwrap();
        let col = Identity::new(2).unwrap();
        let y = DenseMatrix::zeros(2, 3);
        assert!(matches!(
            matnorm_logp(&y, &row, &col),
            Err(CovError::DimensionMismatch { .. })
        ));
        let y = DenseMatrix::zeros(3, 2);
        let marg_cov = Identity::new(2).unwrap();
        assert!(matnorm_logp_marginal_row(&y, &row, &col, &DenseMatrix::zeros(3, 1), &marg_cov).is_err());
    }
}
