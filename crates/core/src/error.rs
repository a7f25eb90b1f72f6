use thiserror::Error;

#[derive(Error, Debug)]
pub enum CovError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Matrix is not positive definite in {context}")]
    NotPositiveDefinite { context: String },

    #[error("Dimension mismatch: expected {expected}, got {got} in {context}")]
    DimensionMismatch {
        expected: usize,
        got: usize,
        context: String,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Distribution error: {0}")]
    Distribution(String),

    #[error("Optimizer error: {0}")]
    Optimizer(String),

    #[error("Objective does not provide an analytic gradient")]
    GradientNotImplemented,
}

impl CovError {
    pub(crate) fn not_pd(context: impl Into<String>) -> Self {
        CovError::NotPositiveDefinite {
            context: context.into(),
        }
    }

    pub(crate) fn dim(expected: usize, got: usize, context: impl Into<String>) -> Self {
        CovError::DimensionMismatch {
            expected,
            got,
            context: context.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CovError>;
