use approx::assert_relative_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::matrix::dense::log_determinant_spd;
use crate::types::DenseMatrix;

use super::traits::Covariance;

pub(crate) fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub(crate) fn random_matrix(rows: usize, cols: usize, rng: &mut StdRng) -> DenseMatrix {
    DenseMatrix::from_fn(rows, cols, |_, _| rng.gen_range(-1.0..1.0))
}

/// Well-conditioned SPD matrix: A A' + n I.
pub(crate) fn random_spd(n: usize, rng: &mut StdRng) -> DenseMatrix {
    let a = random_matrix(n, n, rng);
    &a * a.transpose() + DenseMatrix::identity(n, n) * n as f64
}

pub(crate) fn assert_matrix_close(a: &DenseMatrix, b: &DenseMatrix, eps: f64) {
    assert_eq!(a.shape(), b.shape());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_relative_eq!(*x, *y, epsilon = eps, max_relative = eps);
    }
}

/// `solve(Sigma X) == X` for a few shapes, including X = Sigma (recovers I).
pub(crate) fn assert_solve_roundtrip(cov: &dyn Covariance, eps: f64) {
    let n = cov.size();
    let sigma = cov.covariance_matrix().unwrap();
    let mut r = rng(99);
    for m in [1, 3] {
        let x = random_matrix(n, m, &mut r);
        let back = cov.solve(&(&sigma * &x)).unwrap();
        assert_matrix_close(&back, &x, eps);
    }
    assert_matrix_close(&cov.solve(&sigma).unwrap(), &DenseMatrix::identity(n, n), eps);
}

pub(crate) fn assert_logdet_matches_dense(cov: &dyn Covariance, eps: f64) {
    let sigma = cov.covariance_matrix().unwrap();
    let dense = log_determinant_spd(&sigma).unwrap();
    assert_relative_eq!(cov.log_determinant(), dense, epsilon = eps, max_relative = eps);
}
