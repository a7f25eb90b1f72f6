//! Contract checks shared by every covariance variant: inverse-apply round trip,
//! log-determinant against a dense factorization, linearity and purity of
//! `solve`, and parameter read/overwrite stability.

use approx::assert_relative_eq;
use matnormal_core::covariance::{
    Ar1, CholeskyWishartReg, Covariance, Diagonal, DiagonalGammaPrior, Identity, Isotropic,
    KroneckerFactored, UnconstrainedCholesky, UnconstrainedInvCholesky,
};
use matnormal_core::types::DenseMatrix;
use matnormal_core::CovError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_matrix(rows: usize, cols: usize, rng: &mut StdRng) -> DenseMatrix {
    DenseMatrix::from_fn(rows, cols, |_, _| rng.gen_range(-1.0..1.0))
}

fn random_spd(n: usize, rng: &mut StdRng) -> DenseMatrix {
    let a = random_matrix(n, n, rng);
    &a * a.transpose() + DenseMatrix::identity(n, n) * n as f64
}

fn all_variants() -> Vec<Box<dyn Covariance>> {
    let mut rng = StdRng::seed_from_u64(2024);
    let sigma = random_spd(5, &mut rng);
    let prec = random_spd(4, &mut rng);
    let sigmas = vec![random_spd(2, &mut rng), random_spd(3, &mut rng)];
    let mask = vec![true, false, true, true, true, false];

    vec![
        Box::new(Identity::new(4).unwrap()),
        Box::new(Isotropic::new(5, None, &mut rng).unwrap()),
        Box::new(Diagonal::new(6, None, &mut rng).unwrap()),
        Box::new(DiagonalGammaPrior::new(3, None, None, None, &mut rng).unwrap()),
        Box::new(Ar1::new(7, Some(0.45), Some(0.9), Some(&[0, 4]), &mut rng).unwrap()),
        Box::new(UnconstrainedCholesky::new(None, Some(&sigma), &mut rng).unwrap()),
        Box::new(CholeskyWishartReg::new(None, Some(&sigma), &mut rng).unwrap()),
        Box::new(UnconstrainedInvCholesky::new(None, Some(&prec), &mut rng).unwrap()),
        Box::new(KroneckerFactored::new(&[2, 3], Some(sigmas.as_slice()), None, &mut rng).unwrap()),
        Box::new(KroneckerFactored::new(&[2, 3], Some(sigmas.as_slice()), Some(mask), &mut rng).unwrap()),
    ]
}

fn assert_close(a: &DenseMatrix, b: &DenseMatrix, eps: f64, what: &str) {
    assert_eq!(a.shape(), b.shape(), "{what}: shape");
    for (x, y) in a.iter().zip(b.iter()) {
        assert_relative_eq!(*x, *y, epsilon = eps, max_relative = eps);
    }
}

#[test]
fn test_solve_inverts_covariance() {
    let mut rng = StdRng::seed_from_u64(1);
    for cov in all_variants() {
        let n = cov.size();
        let sigma = cov.covariance_matrix().unwrap();
        for m in [1, 4] {
            let x = random_matrix(n, m, &mut rng);
            let back = cov.solve(&(&sigma * &x)).unwrap();
            assert_close(&back, &x, 1e-8, cov.name());
        }
        // Solving against Sigma itself recovers the identity.
        assert_close(
            &cov.solve(&sigma).unwrap(),
            &DenseMatrix::identity(n, n),
            1e-8,
            cov.name(),
        );
    }
}

#[test]
fn test_log_determinant_matches_dense() {
    for cov in all_variants() {
        let sigma = cov.covariance_matrix().unwrap();
        let chol = sigma.cholesky().expect("covariance should be SPD");
        let dense = 2.0 * chol.l().diagonal().map(f64::ln).sum();
        assert_relative_eq!(cov.log_determinant(), dense, epsilon = 1e-8, max_relative = 1e-10);
    }
}

#[test]
fn test_solve_is_linear_and_pure() {
    let mut rng = StdRng::seed_from_u64(2);
    for cov in all_variants() {
        let n = cov.size();
        let a = random_matrix(n, 2, &mut rng);
        let b = random_matrix(n, 2, &mut rng);
        let combined = cov.solve(&(&a * 2.0 - &b)).unwrap();
        let separate = cov.solve(&a).unwrap() * 2.0 - cov.solve(&b).unwrap();
        assert_close(&combined, &separate, 1e-10, cov.name());

        // Repeated calls give identical results and do not move the parameters.
        let params = cov.parameters();
        assert_eq!(cov.solve(&a).unwrap(), cov.solve(&a).unwrap());
        assert_eq!(cov.log_determinant(), cov.log_determinant());
        assert_eq!(cov.parameters(), params);
    }
}

#[test]
fn test_parameters_overwrite_is_stable() {
    for mut cov in all_variants() {
        let params = cov.parameters();
        let names: Vec<String> = params.iter().map(|p| p.name.clone()).collect();
        let n_params: usize = params.iter().map(|p| p.len()).sum();
        assert_eq!(cov.n_params(), n_params, "{}", cov.name());

        let logdet = cov.log_determinant();
        cov.set_parameters(&params).unwrap();
        assert_eq!(cov.log_determinant(), logdet, "{}", cov.name());

        let after: Vec<String> = cov.parameters().iter().map(|p| p.name.clone()).collect();
        assert_eq!(after, names);
    }
}

#[test]
fn test_wrong_row_count_is_rejected() {
    for cov in all_variants() {
        let x = DenseMatrix::zeros(cov.size() + 1, 1);
        assert!(
            matches!(cov.solve(&x), Err(CovError::DimensionMismatch { .. })),
            "{}",
            cov.name()
        );
    }
}

#[test]
fn test_regularization_defaults_to_zero() {
    for cov in all_variants() {
        let reg = cov.regularization_log_density();
        match cov.name() {
            "DiagonalGammaPrior" | "CholeskyWishartReg" => assert!(reg.is_finite() && reg != 0.0),
            _ => assert_eq!(reg, 0.0, "{}", cov.name()),
        }
    }
}

#[test]
fn test_clone_boxed_is_independent() {
    let mut rng = StdRng::seed_from_u64(3);
    let source: Box<dyn Covariance> = Box::new(Isotropic::new(3, Some(2.0), &mut rng).unwrap());
    let mut copy = source.clone();
    let mut params = copy.parameters();
    params[0].value[(0, 0)] = 0.0;
    copy.set_parameters(&params).unwrap();
    assert_relative_eq!(source.log_determinant(), 3.0 * 2.0_f64.ln(), epsilon = 1e-12);
    assert_eq!(copy.log_determinant(), 0.0);
}
