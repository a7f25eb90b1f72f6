//! Structured covariance parameterizations behind one [`Covariance`] contract.

mod identity;
mod isotropic;
mod traits;
pub mod ar1;
pub mod cholesky;
pub mod diagonal;
pub mod inv_cholesky;
pub mod kronecker;
pub mod params;

#[cfg(test)]
pub(crate) mod test_util;

pub use ar1::Ar1;
pub use cholesky::{CholeskyWishartReg, UnconstrainedCholesky};
pub use diagonal::{Diagonal, DiagonalGammaPrior};
pub use identity::Identity;
pub use inv_cholesky::UnconstrainedInvCholesky;
pub use isotropic::Isotropic;
pub use kronecker::KroneckerFactored;
pub use params::{Parameter, ParameterBlock, ParameterLayout};
pub use traits::Covariance;
