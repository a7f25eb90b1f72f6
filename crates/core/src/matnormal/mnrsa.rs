//! Matrix-normal representational similarity analysis (MN-RSA).
//!
//! Observations `Y` (n_T x n_V) are modeled as
//!
//! ```text
//! Y = X W + X_0 W_0 + E,   vec(W) ~ N(0, I (x) U),   E ~ MN(0, Sigma_t, Sigma_s)
//! ```
//!
//! with `U = L L'` the effect covariance between the `n_C` design columns and
//! `X_0` a set of learned nuisance regressors. Integrating out `W` and `W_0` gives
//! `Y ~ MN(0, Sigma_t + [X L, X_0][X L, X_0]', Sigma_s)`, which is maximized over
//! `L`, `X_0` and the parameters of both noise covariances.

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::covariance::params::standard_normal;
use crate::covariance::{Covariance, Identity, Parameter, ParameterLayout};
use crate::error::{CovError, Result};
use crate::matrix::dense::{
    cholesky, cholesky_lower, cov2corr, flatten_cholesky_unique, unflatten_cholesky_unique,
};
use crate::optim::{Minimizer, Objective};
use crate::types::DenseMatrix;

use super::likelihood::matnorm_logp_marginal_row;
use super::result::MnrsaFit;

const GROUP_X0: usize = 0;
const GROUP_TIME: usize = 1;
const GROUP_SPACE: usize = 2;
const GROUP_L: usize = 3;

/// Model settings for [`Mnrsa`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MnrsaConfig {
    /// Number of nuisance regressors in `X_0`.
    pub n_nureg: usize,
    /// Seed for the random initialization of `X_0`.
    pub seed: u64,
}

impl Default for MnrsaConfig {
    fn default() -> Self {
        Self { n_nureg: 5, seed: 0 }
    }
}

impl MnrsaConfig {
    pub fn n_nureg(mut self, n_nureg: usize) -> Self {
        self.n_nureg = n_nureg;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// MN-RSA model owning its temporal and spatial noise covariances.
#[derive(Debug)]
pub struct Mnrsa {
    time_cov: Box<dyn Covariance>,
    space_cov: Box<dyn Covariance>,
    x_0: DenseMatrix,
    config: MnrsaConfig,
}

impl Mnrsa {
    /// `X_0` is drawn as standard normal (n_T x n_nureg) from `config.seed`.
    pub fn new(time_cov: Box<dyn Covariance>, space_cov: Box<dyn Covariance>, config: MnrsaConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let x_0 = standard_normal(time_cov.size(), config.n_nureg, &mut rng);
        Self {
            time_cov,
            space_cov,
            x_0,
            config,
        }
    }

    pub fn time_cov(&self) -> &dyn Covariance {
        self.time_cov.as_ref()
    }

    pub fn space_cov(&self) -> &dyn Covariance {
        self.space_cov.as_ref()
    }

    /// Current nuisance regressors.
    pub fn x_0(&self) -> &DenseMatrix {
        &self.x_0
    }

    pub fn config(&self) -> &MnrsaConfig {
        &self.config
    }

    /// Joint log-likelihood (noise priors included) at effect factor `l`,
    /// using the current covariances and `X_0`.
    pub fn log_likelihood(&self, design: &DenseMatrix, observations: &DenseMatrix, l: &DenseMatrix) -> Result<f64> {
        self.check_data(design, observations)?;
        if l.shape() != (design.ncols(), design.ncols()) {
            return Err(CovError::dim(design.ncols(), l.nrows(), "effect Cholesky factor"));
        }
        joint_log_likelihood(
            design,
            observations,
            self.time_cov.as_ref(),
            self.space_cov.as_ref(),
            l,
            &self.x_0,
        )
    }

    /// Fit the model, seeding the effect covariance from ordinary least squares.
    ///
    /// On return the owned covariances and `X_0` hold the optimizer's final
    /// parameters, whether or not it converged.
    pub fn fit(
        &mut self,
        design: &DenseMatrix,
        observations: &DenseMatrix,
        minimizer: &dyn Minimizer,
    ) -> Result<MnrsaFit> {
        self.check_data(design, observations)?;
        let n_c = design.ncols();

        let naive_u = ols_effect_covariance(design, observations)?;
        let naive_c = cov2corr(&naive_u);
        let l0 = cholesky_lower(&naive_u, "naive effect covariance")?;
        debug!(
            "MN-RSA: OLS seed for {n_c} conditions over {} voxels",
            observations.ncols()
        );

        let groups = vec![
            vec![Parameter::new("x_0", self.x_0.clone())],
            self.time_cov.parameters(),
            self.space_cov.parameters(),
            vec![Parameter::vector("l_flat", &flatten_cholesky_unique(&l0))],
        ];
        let layout = ParameterLayout::new()
            .with_group("x_0", &groups[GROUP_X0])
            .with_group(self.time_cov.name(), &groups[GROUP_TIME])
            .with_group(self.space_cov.name(), &groups[GROUP_SPACE])
            .with_group("l_flat", &groups[GROUP_L]);
        let theta0 = layout.pack(&groups)?;
        debug!("MN-RSA: optimizing {} free parameters", layout.len());

        let objective = MnrsaObjective {
            layout: &layout,
            design,
            observations,
            time_cov: self.time_cov.as_ref(),
            space_cov: self.space_cov.as_ref(),
        };
        let initial_log_likelihood = -objective.value(&theta0)?;
        let outcome = minimizer.minimize(&objective, theta0)?;
        debug!("MN-RSA: optimizer returned after {} iterations", outcome.iterations);

        if let Some(bad) = outcome.theta.iter().find(|v| !v.is_finite()) {
            return Err(CovError::InvalidParameter(format!(
                "optimizer returned a non-finite parameter ({bad})"
            )));
        }
        let fitted = layout.unpack(&outcome.theta)?;
        self.x_0 = fitted[GROUP_X0][0].value.clone();
        self.time_cov.set_parameters(&fitted[GROUP_TIME])?;
        self.space_cov.set_parameters(&fitted[GROUP_SPACE])?;
        let l = unflatten_cholesky_unique(fitted[GROUP_L][0].value.as_slice())?;

        let log_likelihood = self.log_likelihood(design, observations, &l)?;
        let u = &l * l.transpose();
        let c = cov2corr(&u);

        info!(
            "MN-RSA fit: log-likelihood {log_likelihood:.4} (initial {initial_log_likelihood:.4}), {} iterations, {}",
            outcome.iterations, outcome.status
        );
        if !outcome.converged {
            warn!("MN-RSA optimizer stopped without converging: {}", outcome.status);
        }

        Ok(MnrsaFit {
            u,
            c,
            l,
            naive_u,
            naive_c,
            x_0: self.x_0.clone(),
            log_likelihood,
            initial_log_likelihood,
            converged: outcome.converged,
            status: outcome.status,
            iterations: outcome.iterations,
            n_params: layout.len(),
        })
    }

    fn check_data(&self, design: &DenseMatrix, observations: &DenseMatrix) -> Result<()> {
        let n_t = self.time_cov.size();
        if design.nrows() != n_t {
            return Err(CovError::dim(n_t, design.nrows(), "design rows"));
        }
        if observations.nrows() != n_t {
            return Err(CovError::dim(n_t, observations.nrows(), "observation rows"));
        }
        if observations.ncols() != self.space_cov.size() {
            return Err(CovError::dim(
                self.space_cov.size(),
                observations.ncols(),
                "observation columns",
            ));
        }
        if design.ncols() == 0 {
            return Err(CovError::Config("design has no columns".to_string()));
        }
        Ok(())
    }
}

/// Unbiased covariance, across voxels, of the least-squares coefficients
/// `B = (X'X)^{-1} X'Y`.
pub fn ols_effect_covariance(design: &DenseMatrix, observations: &DenseMatrix) -> Result<DenseMatrix> {
    let n_v = observations.ncols();
    if n_v < 2 {
        return Err(CovError::Config(
            "need at least two voxels to estimate the effect covariance".to_string(),
        ));
    }
    let gram = design.tr_mul(design);
    let b = cholesky(&gram, "design Gram matrix")?.solve(&design.tr_mul(observations));

    let mut centered = b;
    for mut row in centered.row_iter_mut() {
        let mean = row.mean();
        row.add_scalar_mut(-mean);
    }
    Ok(&centered * centered.transpose() / (n_v - 1) as f64)
}

/// Prior terms of both noise covariances plus the marginal matrix-normal
/// log-density with loading `[X L, X_0]` and identity latent covariance.
fn joint_log_likelihood(
    design: &DenseMatrix,
    observations: &DenseMatrix,
    time_cov: &dyn Covariance,
    space_cov: &dyn Covariance,
    l: &DenseMatrix,
    x_0: &DenseMatrix,
) -> Result<f64> {
    let n_c = design.ncols();
    let n_nureg = x_0.ncols();
    let mut marg = DenseMatrix::zeros(design.nrows(), n_c + n_nureg);
    marg.columns_mut(0, n_c).copy_from(&(design * l));
    marg.columns_mut(n_c, n_nureg).copy_from(x_0);
    let marg_cov = Identity::new(n_c + n_nureg)?;

    Ok(time_cov.regularization_log_density()
        + space_cov.regularization_log_density()
        + matnorm_logp_marginal_row(observations, time_cov, space_cov, &marg, &marg_cov)?)
}

/// Negative joint log-likelihood over the packed parameter vector.
///
/// Every evaluation works on clones of the model covariances, so trial points
/// never touch the model's own state.
struct MnrsaObjective<'a> {
    layout: &'a ParameterLayout,
    design: &'a DenseMatrix,
    observations: &'a DenseMatrix,
    time_cov: &'a dyn Covariance,
    space_cov: &'a dyn Covariance,
}

impl Objective for MnrsaObjective<'_> {
    fn value(&self, theta: &[f64]) -> Result<f64> {
        let groups = self.layout.unpack(theta)?;
        let mut time_cov = self.time_cov.clone_boxed();
        time_cov.set_parameters(&groups[GROUP_TIME])?;
        let mut space_cov = self.space_cov.clone_boxed();
        space_cov.set_parameters(&groups[GROUP_SPACE])?;
        let l = unflatten_cholesky_unique(groups[GROUP_L][0].value.as_slice())?;
        let ll = joint_log_likelihood(
            self.design,
            self.observations,
            time_cov.as_ref(),
            space_cov.as_ref(),
            &l,
            &groups[GROUP_X0][0].value,
        )?;
        Ok(-ll)
    }
}
