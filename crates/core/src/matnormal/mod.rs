//! Matrix-normal likelihoods and the MN-RSA model built on them.

pub mod likelihood;
pub mod mnrsa;
pub mod result;

pub use likelihood::{matnorm_logp, matnorm_logp_marginal_col, matnorm_logp_marginal_row};
pub use mnrsa::{ols_effect_covariance, Mnrsa, MnrsaConfig};
pub use result::MnrsaFit;
