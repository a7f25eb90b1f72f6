//! End-to-end MN-RSA fit with identity noise.
//!
//! With identity temporal and spatial covariances and no nuisance regressors,
//! the fitted effect covariance should stay close to the naive estimate from
//! ordinary least squares. That only holds when the effects dominate the fixed
//! unit noise: on pure noise the maximum-likelihood U correctly shrinks to zero.
//! The first fit therefore uses noiseless `Y = X B` with large effects, and the
//! random fit draws `Y` from the model itself.

use approx::assert_relative_eq;
use matnormal_core::covariance::{Ar1, Diagonal, Identity};
use matnormal_core::matnormal::{Mnrsa, MnrsaConfig};
use matnormal_core::matrix::dense::frobenius_norm;
use matnormal_core::optim::{LbfgsMinimizer, LbfgsOptions};
use matnormal_core::types::DenseMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 10 x 3 design of sinusoids at distinct frequencies.
fn design() -> DenseMatrix {
    DenseMatrix::from_fn(10, 3, |i, j| (0.5 * (i + 1) as f64 * (j + 1) as f64).sin())
}

/// Effects with zero mean across the 5 voxels in every condition.
fn effects() -> DenseMatrix {
    DenseMatrix::from_row_slice(
        3,
        5,
        &[
            10.0, -5.0, 3.0, -6.0, -2.0, //
            -4.0, 8.0, -3.0, 1.0, -2.0, //
            6.0, 2.0, -9.0, 4.0, -3.0,
        ],
    )
}

#[test]
fn test_identity_noise_recovers_naive_estimate() {
    init_logger();
    let x = design();
    let y = &x * effects();

    let mut model = Mnrsa::new(
        Box::new(Identity::new(10).unwrap()),
        Box::new(Identity::new(5).unwrap()),
        MnrsaConfig::default().n_nureg(0),
    );
    let fit = model.fit(&x, &y, &LbfgsMinimizer::default()).unwrap();

    assert!(fit.log_likelihood >= fit.initial_log_likelihood - 1e-9);
    assert_eq!(fit.n_params, 6);
    assert_eq!(fit.x_0.shape(), (10, 0));

    let rel = frobenius_norm(&(&fit.u - &fit.naive_u)) / frobenius_norm(&fit.naive_u);
    assert!(rel < 0.35, "relative difference {rel}, status {}", fit.status);

    for i in 0..3 {
        assert_relative_eq!(fit.c[(i, i)], 1.0, epsilon = 1e-12);
        for j in 0..3 {
            assert!(
                (fit.c[(i, j)] - fit.naive_c[(i, j)]).abs() < 0.1,
                "correlation ({i}, {j}): {} vs naive {}",
                fit.c[(i, j)],
                fit.naive_c[(i, j)]
            );
        }
    }
}

#[test]
fn test_structured_noise_fit_runs() {
    init_logger();
    let x = design();
    let noise = DenseMatrix::from_fn(10, 5, |i, j| (1.3 * i as f64 + 0.7 * j as f64).cos());
    let y = &x * effects() + noise;

    let mut rng = StdRng::seed_from_u64(5);
    let mut model = Mnrsa::new(
        Box::new(Ar1::new(10, Some(0.1), Some(1.0), Some(&[0, 5]), &mut rng).unwrap()),
        Box::new(Diagonal::new(5, Some(&[1.0; 5]), &mut rng).unwrap()),
        MnrsaConfig::default().n_nureg(1).seed(9),
    );
    let options = LbfgsOptions::new(Some(1e-5), Some(1e-9), 40, 7).unwrap();
    let fit = model.fit(&x, &y, &LbfgsMinimizer::new(options)).unwrap();

    assert!(fit.log_likelihood.is_finite());
    assert!(fit.log_likelihood >= fit.initial_log_likelihood - 1e-9);
    // 10 x_0 + 2 AR1 + 5 Diagonal + 6 l_flat
    assert_eq!(fit.n_params, 23);
    assert!(fit.iterations <= 40);
    assert!(fit.summary().contains("Matrix-Normal RSA"));
}

#[test]
fn test_random_data_drawn_from_model() {
    init_logger();
    let mut rng = StdRng::seed_from_u64(11);
    let x = DenseMatrix::from_fn(10, 3, |_, _| rng.gen_range(-1.0..1.0));
    // U = L L' with strong, correlated effects relative to the unit noise.
    let l_true = DenseMatrix::from_row_slice(3, 3, &[4.0, 0.0, 0.0, 2.0, 3.0, 0.0, -1.0, 1.0, 3.5]);
    let z = DenseMatrix::from_fn(3, 5, |_, _| rng.sample::<f64, _>(StandardNormal));
    let noise = DenseMatrix::from_fn(10, 5, |_, _| rng.sample::<f64, _>(StandardNormal));
    let y = &x * (&l_true * z) + noise;

    let mut model = Mnrsa::new(
        Box::new(Identity::new(10).unwrap()),
        Box::new(Identity::new(5).unwrap()),
        MnrsaConfig::default().n_nureg(2).seed(3),
    );
    let fit = model.fit(&x, &y, &LbfgsMinimizer::default()).unwrap();

    assert!(fit.log_likelihood >= fit.initial_log_likelihood - 1e-9);
    assert_eq!(fit.n_params, 10 * 2 + 6);
    assert_eq!(model.x_0(), &fit.x_0);
    assert!(fit.u.iter().all(|v| v.is_finite()));
    for i in 0..3 {
        assert!(fit.u[(i, i)] >= 0.0);
        assert_relative_eq!(fit.c[(i, i)], 1.0, epsilon = 1e-12);
        for j in 0..3 {
            assert!(fit.c[(i, j)].abs() <= 1.0 + 1e-12);
        }
    }
}
