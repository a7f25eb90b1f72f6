pub mod covariance;
pub mod error;
pub mod matnormal;
pub mod matrix;
pub mod optim;
pub mod types;

pub use error::{CovError, Result};
