//! Injection seam for the numerical optimizer, plus an L-BFGS implementation.

mod traits;
pub mod lbfgs;

pub use lbfgs::{LbfgsMinimizer, LbfgsOptions};
pub use traits::{MinimizeOutcome, Minimizer, Objective};
