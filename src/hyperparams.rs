#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use linfa::{Float, ParamGuard};
use ndarray::Array1;

use crate::error::{PenRegError, Result};
use crate::model::ModelOptions;

/// The penalized model to estimate
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PenaltyKind {
    /// `½‖y - Xβ‖² + λ1‖β‖₁`
    Lasso,
    /// `½‖y - Xβ‖² + λ1‖β‖₁ + λ2 Σ|β_i - β_{i-1}|`
    FusedLasso,
    /// `-ℓ(β) + λ1‖β‖₁` with the logistic log-likelihood `ℓ`
    LogisticLasso,
}

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct PenalizedRegressionValidParams<F> {
    kind: PenaltyKind,
    lambda1: F,
    lambda2: F,
    eps: F,
    threshold: F,
    eps_cg: F,
    max_iterations: usize,
    max_cg_iterations: Option<usize>,
    tolerance: F,
    initial_beta: Option<Array1<F>>,
}

impl<F: Float> PenalizedRegressionValidParams<F> {
    pub fn kind(&self) -> PenaltyKind {
        self.kind
    }

    pub fn lambda1(&self) -> F {
        self.lambda1
    }

    pub fn lambda2(&self) -> F {
        self.lambda2
    }

    pub fn eps(&self) -> F {
        self.eps
    }

    pub fn threshold(&self) -> F {
        self.threshold
    }

    pub fn eps_cg(&self) -> F {
        self.eps_cg
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn max_cg_iterations(&self) -> Option<usize> {
        self.max_cg_iterations
    }

    pub fn tolerance(&self) -> F {
        self.tolerance
    }

    pub fn initial_beta(&self) -> Option<&Array1<F>> {
        self.initial_beta.as_ref()
    }

    /// Settings handed to the outer loop
    pub fn model_options(&self) -> ModelOptions<F> {
        ModelOptions {
            threshold: self.threshold,
            eps_cg: self.eps_cg,
            max_cg_iterations: self.max_cg_iterations,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
        }
    }
}

/// A hyper-parameter set for the penalized regression models
///
/// The parameter set can be verified into a
/// [`PenalizedRegressionValidParams`](crate::hyperparams::PenalizedRegressionValidParams) by
/// calling [ParamGuard::check](Self::check). It is also possible to directly fit a model with
/// [Fit::fit](linfa::traits::Fit::fit) which implicitly verifies the parameter set prior to the
/// model estimation and forwards any error.
///
/// # Parameters
/// | Name | Default | Purpose | Range |
/// | :--- | :--- | :---| :--- |
/// | [lambda1](Self::lambda1) | `1.0` | Weight of the `ℓ1` penalty | `(0, inf)` |
/// | [lambda2](Self::lambda2) | `1.0` for the fused lasso, `0` otherwise | Weight of the fusion penalty | `[0, inf)` |
/// | [eps](Self::eps) | `1e-8` | Floor of `|β_i|` and `|β_i - β_{i-1}|` in the penalty weights | `(0, inf)` |
/// | [threshold](Self::threshold) | `1e-5` | Coefficients under this magnitude are set to zero | `[0, inf)` |
/// | [eps_cg](Self::eps_cg) | `1e-8` | Relative residual tolerance of the inner solver | `(0, inf)` |
/// | [max_iterations](Self::max_iterations) | `1000` | Maximum number of outer iterations | `[0, inf)` |
/// | [max_cg_iterations](Self::max_cg_iterations) | `max(10·p, 100)` | Maximum number of inner solver iterations | `[0, inf)` |
/// | [tolerance](Self::tolerance) | `1e-5` | Largest change of a coefficient at convergence | `(0, inf)` |
///
/// # Errors
///
/// Returns [`InvalidLambda1`](PenRegError::InvalidLambda1) if `lambda1` is not positive.
///
/// Returns [`InvalidLambda2`](PenRegError::InvalidLambda2) if `lambda2` is negative.
///
/// Returns [`InvalidEpsilon`](PenRegError::InvalidEpsilon) if `eps` or `eps_cg` is not positive.
///
/// Returns [`InvalidThreshold`](PenRegError::InvalidThreshold) if the threshold is negative.
///
/// Returns [`InvalidTolerance`](PenRegError::InvalidTolerance) if the tolerance is not positive.
///
/// Non-finite values are rejected as well.
///
/// # Example
///
/// ```rust
/// use linfa_penreg::{PenalizedRegression, PenRegError};
/// use linfa::prelude::*;
/// use ndarray::array;
///
/// let ds = Dataset::new(array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]], array![3.0, 2.0, 5.0]);
///
/// let unchecked_params = PenalizedRegression::lasso().lambda1(1e-3);
/// let model = unchecked_params.fit(&ds)?;
///
/// let checked_params = unchecked_params.check()?;
/// let model = checked_params.fit(&ds)?;
/// # Ok::<(), PenRegError>(())
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct PenalizedRegressionParams<F>(PenalizedRegressionValidParams<F>);

impl<F: Float> PenalizedRegressionParams<F> {
    /// Default hyper-parameters of the given model
    pub fn new(kind: PenaltyKind) -> Self {
        let lambda2 = match kind {
            PenaltyKind::FusedLasso => F::one(),
            PenaltyKind::Lasso | PenaltyKind::LogisticLasso => F::zero(),
        };

        Self(PenalizedRegressionValidParams {
            kind,
            lambda1: F::one(),
            lambda2,
            eps: F::cast(1e-8),
            threshold: F::cast(1e-5),
            eps_cg: F::cast(1e-8),
            max_iterations: 1000,
            max_cg_iterations: None,
            tolerance: F::cast(1e-5),
            initial_beta: None,
        })
    }

    /// Set the weight of the `ℓ1` penalty
    pub fn lambda1(mut self, lambda1: F) -> Self {
        self.0.lambda1 = lambda1;
        self
    }

    /// Set the weight of the penalty on differences of neighbouring coefficients
    ///
    /// Only the fused lasso uses it.
    pub fn lambda2(mut self, lambda2: F) -> Self {
        self.0.lambda2 = lambda2;
        self
    }

    pub fn eps(mut self, eps: F) -> Self {
        self.0.eps = eps;
        self
    }

    /// Set the magnitude under which a coefficient is set to exactly zero
    ///
    /// Lasso and logistic lasso drop such covariates for the rest of the fit.
    pub fn threshold(mut self, threshold: F) -> Self {
        self.0.threshold = threshold;
        self
    }

    pub fn eps_cg(mut self, eps_cg: F) -> Self {
        self.0.eps_cg = eps_cg;
        self
    }

    /// Set the maximum number of outer iterations
    ///
    /// Defaults to `1000` if not set
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.0.max_iterations = max_iterations;
        self
    }

    /// Set the maximum number of conjugate gradient iterations per outer
    /// iteration
    ///
    /// Defaults to `max(10·p, 100)`. With `0` the solver never moves and the fit
    /// reports that it did not converge.
    pub fn max_cg_iterations(mut self, max_cg_iterations: usize) -> Self {
        self.0.max_cg_iterations = Some(max_cg_iterations);
        self
    }

    /// Set the tolerance on the largest absolute change of a coefficient
    /// between two outer iterations
    ///
    /// Defaults to `1e-5` if not set
    pub fn tolerance(mut self, tolerance: F) -> Self {
        self.0.tolerance = tolerance;
        self
    }

    /// Start from the given coefficients instead of the univariate
    /// least-squares estimates
    pub fn initial_beta(mut self, initial_beta: Array1<F>) -> Self {
        self.0.initial_beta = Some(initial_beta);
        self
    }
}

fn to_f32<F: Float>(value: F) -> f32 {
    value.to_f32().unwrap_or(f32::NAN)
}

impl<F: Float> ParamGuard for PenalizedRegressionParams<F> {
    type Checked = PenalizedRegressionValidParams<F>;
    type Error = PenRegError;

    /// Validate the hyper parameters
    fn check_ref(&self) -> Result<&Self::Checked> {
        let p = &self.0;
        if !p.lambda1.is_finite() || p.lambda1 <= F::zero() {
            Err(PenRegError::InvalidLambda1(to_f32(p.lambda1)))
        } else if !p.lambda2.is_finite() || p.lambda2.is_negative() {
            Err(PenRegError::InvalidLambda2(to_f32(p.lambda2)))
        } else if !p.eps.is_finite() || p.eps <= F::zero() {
            Err(PenRegError::InvalidEpsilon(to_f32(p.eps)))
        } else if !p.eps_cg.is_finite() || p.eps_cg <= F::zero() {
            Err(PenRegError::InvalidEpsilon(to_f32(p.eps_cg)))
        } else if !p.threshold.is_finite() || p.threshold.is_negative() {
            Err(PenRegError::InvalidThreshold(to_f32(p.threshold)))
        } else if !p.tolerance.is_finite() || p.tolerance <= F::zero() {
            Err(PenRegError::InvalidTolerance(to_f32(p.tolerance)))
        } else {
            Ok(&self.0)
        }
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_depend_on_kind() {
        let lasso = PenalizedRegressionParams::<f64>::new(PenaltyKind::Lasso)
            .check()
            .unwrap();
        assert_eq!(lasso.lambda1(), 1.0);
        assert_eq!(lasso.lambda2(), 0.0);
        assert_eq!(lasso.max_cg_iterations(), None);
        assert_eq!(lasso.max_iterations(), 1000);

        let fused = PenalizedRegressionParams::<f64>::new(PenaltyKind::FusedLasso)
            .check()
            .unwrap();
        assert_eq!(fused.lambda2(), 1.0);
        assert_eq!(fused.model_options().threshold, 1e-5);
    }

    #[test]
    fn rejects_invalid_lambdas() {
        let res = PenalizedRegressionParams::<f64>::new(PenaltyKind::Lasso)
            .lambda1(0.0)
            .check();
        assert!(matches!(res, Err(PenRegError::InvalidLambda1(_))));

        let res = PenalizedRegressionParams::<f64>::new(PenaltyKind::Lasso)
            .lambda1(f64::INFINITY)
            .check();
        assert!(matches!(res, Err(PenRegError::InvalidLambda1(_))));

        let res = PenalizedRegressionParams::<f64>::new(PenaltyKind::FusedLasso)
            .lambda2(-1.0)
            .check();
        assert!(matches!(res, Err(PenRegError::InvalidLambda2(_))));
    }

    #[test]
    fn rejects_invalid_tolerances() {
        let res = PenalizedRegressionParams::<f64>::new(PenaltyKind::Lasso)
            .eps(0.0)
            .check();
        assert!(matches!(res, Err(PenRegError::InvalidEpsilon(_))));

        let res = PenalizedRegressionParams::<f64>::new(PenaltyKind::Lasso)
            .eps_cg(-1e-3)
            .check();
        assert!(matches!(res, Err(PenRegError::InvalidEpsilon(_))));

        let res = PenalizedRegressionParams::<f64>::new(PenaltyKind::Lasso)
            .threshold(-1.0)
            .check();
        assert!(matches!(res, Err(PenRegError::InvalidThreshold(_))));

        let res = PenalizedRegressionParams::<f64>::new(PenaltyKind::Lasso)
            .tolerance(f64::NAN)
            .check();
        assert!(matches!(res, Err(PenRegError::InvalidTolerance(_))));
    }

    #[test]
    fn zero_threshold_and_budget_are_valid() {
        let params = PenalizedRegressionParams::<f32>::new(PenaltyKind::LogisticLasso)
            .threshold(0.0)
            .max_cg_iterations(0)
            .check()
            .unwrap();
        assert_eq!(params.max_cg_iterations(), Some(0));
        assert_eq!(params.kind(), PenaltyKind::LogisticLasso);
    }
}
