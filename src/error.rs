use thiserror::Error;

/// Simplified `Result` using [`PenRegError`](crate::PenRegError) as error type
pub type Result<T> = std::result::Result<T, PenRegError>;

#[derive(Error, Debug, Clone)]
pub enum PenRegError {
    #[error("lambda1 should be positive and finite, but is {0}")]
    InvalidLambda1(f32),
    #[error("lambda2 should be non-negative and finite, but is {0}")]
    InvalidLambda2(f32),
    #[error("eps should be positive and finite, but is {0}")]
    InvalidEpsilon(f32),
    #[error("threshold should be non-negative and finite, but is {0}")]
    InvalidThreshold(f32),
    #[error("tolerance should be positive and finite, but is {0}")]
    InvalidTolerance(f32),
    /// A vector or matrix does not have the number of entries the operation expects
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// Logistic targets must be encoded as `0` and `1`
    #[error("logistic targets must only contain 0 and 1")]
    NonBinaryTargets,
    #[error(transparent)]
    BaseCrate(#[from] linfa::Error),
}

impl PenRegError {
    pub(crate) fn check_len(expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(PenRegError::DimensionMismatch { expected, actual })
        }
    }
}
