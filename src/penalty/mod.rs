//! Penalties of the EM algorithm
//!
//! Each penalty replaces its non-smooth term by a quadratic form `βᵗBβ`
//! whose matrix `B` is recomputed from the current estimate at every outer
//! iteration. `B` is kept in a compact representation (a diagonal or a
//! tridiagonal) which the multiplicators apply without ever forming it.

use linfa::Float;
use ndarray::{Array1, ArrayView1, ArrayView2};

use crate::cg::{CgOutcome, ConjugateGradient};
use crate::error::Result;

mod fused;
mod lasso;
mod logistic;

pub use fused::FusedLassoPenalty;
pub use lasso::LassoPenalty;
pub use logistic::LogisticLassoPenalty;

pub(crate) use logistic::sigmoid;

/// Common interface of the penalties driven by [`PenalizedModel`](crate::PenalizedModel)
pub trait Penalty<F: Float> {
    /// Number of coefficients covered by the current representation
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Recompute the representation from the current estimate
    ///
    /// The representation is resized first if `beta` does not have the same
    /// length, e.g. after covariates left the active set.
    fn update(&mut self, beta: ArrayView1<F>);

    /// The quadratic form `βᵗBβ` of the current penalty matrix
    fn penalty_term(&self, beta: ArrayView1<F>) -> Result<F>;

    /// Product of the current penalty matrix with `v`
    fn multiply(&self, v: ArrayView1<F>) -> Result<Array1<F>>;

    /// Solve `(B + XᵗX)β = Xᵗ·response` with `cg`, starting from `beta`
    fn solve(
        &self,
        cg: &mut ConjugateGradient<F>,
        data: ArrayView2<F>,
        response: ArrayView1<F>,
        beta: ArrayView1<F>,
    ) -> Result<CgOutcome<F>>;

    /// Response of the next least-squares problem
    ///
    /// Linear models solve against the observed response and return `None`.
    fn relinearize(
        &mut self,
        _data: ArrayView2<F>,
        _beta: ArrayView1<F>,
        _y: ArrayView1<F>,
    ) -> Option<Array1<F>> {
        None
    }

    /// Penalized objective at `beta`
    ///
    /// Defaults to `½‖y - Xβ‖² + βᵗBβ`. At a fixed point of the EM iterations
    /// `βᵗBβ` equals the non-smooth penalty, so this is the lasso (or fused
    /// lasso) criterion.
    fn objective(&self, data: ArrayView2<F>, y: ArrayView1<F>, beta: ArrayView1<F>) -> Result<F> {
        let residual = &y - &data.dot(&beta);
        Ok(F::cast(0.5) * residual.dot(&residual) + self.penalty_term(beta)?)
    }

    /// Whether coefficients thresholded to zero may leave the problem
    ///
    /// Penalties coupling neighbouring coefficients need every covariate to
    /// stay in place.
    fn shrinks_active_set(&self) -> bool {
        true
    }

    fn lambda1(&self) -> F;

    fn set_lambda1(&mut self, lambda1: F);

    fn eps(&self) -> F;
}
