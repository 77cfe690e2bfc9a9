//! # Penalized regression for high-dimensional data
//!
//! `linfa-penreg` estimates sparse linear and logistic models when the number of covariates
//! `p` is large, possibly much larger than the number of samples `n`. Three models are
//! supported:
//!
//! * the Lasso, minimizing `½‖y - Xβ‖² + λ1‖β‖₁`
//! * the Fused Lasso, adding `λ2 Σ|β_i - β_{i-1}|` to favour equal neighbouring coefficients
//! * the logistic Lasso, minimizing `-ℓ(β) + λ1‖β‖₁` for targets in `{0, 1}`
//!
//! The non-smooth penalties are handled with an EM algorithm. Every iteration replaces the
//! penalty by a quadratic form `βᵗBβ` built from the current estimate and solves
//!
//! ```text
//! (B + XᵗX) β = Xᵗy
//! ```
//!
//! with a preconditioned conjugate gradient. `B` is diagonal for the Lasso and tridiagonal
//! for the Fused Lasso, and the system matrix is only ever applied to vectors, so the
//! `p × p` matrix `XᵗX` is never formed. Coefficients whose magnitude falls under a
//! threshold are set to exactly zero; the Lasso models then drop these covariates, so the
//! systems shrink as the estimate becomes sparse.
//!
//! No intercept is fitted, center the data beforehand if needed.
//!
//! ## Example
//!
//! ```rust
//! use linfa::prelude::*;
//! use linfa_penreg::{PenalizedRegression, PenRegError};
//! use ndarray::array;
//!
//! let dataset = Dataset::new(
//!     array![[1.0, 0.0, 0.5], [0.0, 1.0, 0.5], [1.0, 1.0, 0.0], [2.0, 0.0, 1.0]],
//!     array![2.0, 1.0, 3.0, 4.0],
//! );
//!
//! let model = PenalizedRegression::lasso()
//!     .lambda1(0.1)
//!     .fit(&dataset)?;
//!
//! println!("coefficients: {}", model.hyperplane());
//! println!("status: {:?}", model.status());
//! # Ok::<(), PenRegError>(())
//! ```
//!
//! ## References
//!
//! * ["Adaptive Sparseness for Supervised Learning", Figueiredo](https://doi.org/10.1109/TPAMI.2003.1227989)
//! * ["Sparsity and smoothness via the fused lasso", Tibshirani et al.](https://doi.org/10.1111/j.1467-9868.2005.00490.x)
//! * ["Monotonicity of quadratic-approximation algorithms", Böhning and Lindsay](https://doi.org/10.1007/BF00049423)

use linfa::Float;
use ndarray::Array1;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

pub use cg::{CgOutcome, ConjugateGradient};
pub use error::{PenRegError, Result};
pub use hyperparams::{PenalizedRegressionParams, PenalizedRegressionValidParams, PenaltyKind};
pub use model::{FitOutcome, FitStatus, ModelOptions, PenalizedModel};
pub use multiplicator::{FusedLassoMultiplicator, LassoMultiplicator, LinearOperator};
pub use penalty::{FusedLassoPenalty, LassoPenalty, LogisticLassoPenalty, Penalty};

mod algorithm;
mod cg;
mod error;
mod hyperparams;
mod model;
mod multiplicator;
mod penalty;

/// A fitted penalized regression model
///
/// Obtained by fitting one of the parameter sets returned by
/// [`lasso`](Self::lasso), [`fused_lasso`](Self::fused_lasso) or
/// [`logistic_lasso`](Self::logistic_lasso).
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct PenalizedRegression<F> {
    kind: PenaltyKind,
    hyperplane: Array1<F>,
    objective: F,
    status: FitStatus,
    n_iterations: usize,
    active: Vec<usize>,
}

impl<F: Float> PenalizedRegression<F> {
    /// Create default Lasso hyper parameters
    pub fn lasso() -> PenalizedRegressionParams<F> {
        PenalizedRegressionParams::new(PenaltyKind::Lasso)
    }

    /// Create default Fused Lasso hyper parameters
    ///
    /// The fusion penalty runs over the covariates in column order.
    pub fn fused_lasso() -> PenalizedRegressionParams<F> {
        PenalizedRegressionParams::new(PenaltyKind::FusedLasso)
    }

    /// Create default logistic Lasso hyper parameters
    pub fn logistic_lasso() -> PenalizedRegressionParams<F> {
        PenalizedRegressionParams::new(PenaltyKind::LogisticLasso)
    }

    /// Get the fitted coefficients, one per covariate
    pub fn hyperplane(&self) -> &Array1<F> {
        &self.hyperplane
    }

    /// Penalized objective at the fitted coefficients
    pub fn objective(&self) -> F {
        self.objective
    }

    pub fn status(&self) -> FitStatus {
        self.status
    }

    pub fn is_converged(&self) -> bool {
        self.status.is_converged()
    }

    /// Number of outer iterations run
    pub fn n_iterations(&self) -> usize {
        self.n_iterations
    }

    /// Indices of the covariates still in the model at the end of the fit
    pub fn active(&self) -> &[usize] {
        &self.active
    }

    pub fn kind(&self) -> PenaltyKind {
        self.kind
    }
}
