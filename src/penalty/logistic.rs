use linfa::Float;
use ndarray::{Array1, ArrayView1, ArrayView2, Zip};

use super::{LassoPenalty, Penalty};
use crate::cg::{CgOutcome, ConjugateGradient};
use crate::error::{PenRegError, Result};

/// Curvature bound of the logistic log-likelihood is `1/4`, its inverse
/// scales the working response and the penalty.
const CURVATURE: f64 = 4.0;

pub(crate) fn sigmoid<F: Float>(eta: F) -> F {
    F::one() / (F::one() + F::exp(-F::max(F::min(eta, F::cast(35.)), F::cast(-35.))))
}

/// `log(1 + exp(eta))` without overflow
fn softplus<F: Float>(eta: F) -> F {
    if eta > F::zero() {
        eta + (-eta).exp().ln_1p()
    } else {
        eta.exp().ln_1p()
    }
}

/// Lasso penalty for the logistic model
///
/// Each outer iteration replaces the logistic log-likelihood by its
/// quadratic majorizer at the current estimate, with curvature bound `1/4`.
/// Minimizing the majorizer plus the lasso surrogate leads to the linear
/// lasso system
///
/// ```text
/// (4D + XᵗX) β = Xᵗz,    z = Xβ + 4 (y - π(Xβ))
/// ```
///
/// so the working response `z` is handed to the solver in place of `y` and
/// the lasso machinery is reused with penalty `4λ`.
#[derive(Debug, Clone, PartialEq)]
pub struct LogisticLassoPenalty<F> {
    lambda: F,
    lasso: LassoPenalty<F>,
    working_response: Array1<F>,
}

impl<F: Float> LogisticLassoPenalty<F> {
    pub fn new(lambda: F, eps: F) -> Self {
        Self {
            lambda,
            lasso: LassoPenalty::new(lambda * F::cast(CURVATURE), eps),
            working_response: Array1::zeros(0),
        }
    }

    /// Working response of the last re-linearization
    pub fn working_response(&self) -> &Array1<F> {
        &self.working_response
    }

    /// The scaled lasso penalty the solver works with
    pub fn lasso(&self) -> &LassoPenalty<F> {
        &self.lasso
    }

    /// Negative log-likelihood `Σ log(1 + exp(η_i)) - y_i η_i` with `η = Xβ`
    pub fn negative_log_likelihood(
        data: ArrayView2<F>,
        y: ArrayView1<F>,
        beta: ArrayView1<F>,
    ) -> F {
        let eta = data.dot(&beta);
        Zip::from(&eta)
            .and(&y)
            .fold(F::zero(), |acc, &eta, &y| acc + softplus(eta) - y * eta)
    }
}

impl<F: Float> Penalty<F> for LogisticLassoPenalty<F> {
    fn len(&self) -> usize {
        self.lasso.len()
    }

    fn update(&mut self, beta: ArrayView1<F>) {
        self.lasso.update(beta);
    }

    fn penalty_term(&self, beta: ArrayView1<F>) -> Result<F> {
        Ok(self.lasso.penalty_term(beta)? / F::cast(CURVATURE))
    }

    fn multiply(&self, v: ArrayView1<F>) -> Result<Array1<F>> {
        Ok(self.lasso.multiply(v)? / F::cast(CURVATURE))
    }

    fn solve(
        &self,
        cg: &mut ConjugateGradient<F>,
        data: ArrayView2<F>,
        response: ArrayView1<F>,
        beta: ArrayView1<F>,
    ) -> Result<CgOutcome<F>> {
        self.lasso.solve(cg, data, response, beta)
    }

    fn relinearize(
        &mut self,
        data: ArrayView2<F>,
        beta: ArrayView1<F>,
        y: ArrayView1<F>,
    ) -> Option<Array1<F>> {
        let eta = data.dot(&beta);
        let curvature = F::cast(CURVATURE);
        self.working_response = Zip::from(&eta)
            .and(&y)
            .map_collect(|&eta, &y| eta + curvature * (y - sigmoid(eta)));

        Some(self.working_response.clone())
    }

    /// Penalized negative log-likelihood `-ℓ(β) + λ‖β‖₁`
    fn objective(&self, data: ArrayView2<F>, y: ArrayView1<F>, beta: ArrayView1<F>) -> Result<F> {
        PenRegError::check_len(data.nrows(), y.len())?;
        Ok(Self::negative_log_likelihood(data, y, beta) + self.penalty_term(beta)?)
    }

    fn lambda1(&self) -> F {
        self.lambda
    }

    fn set_lambda1(&mut self, lambda1: F) {
        self.lambda = lambda1;
        self.lasso.set_lambda(lambda1 * F::cast(CURVATURE));
    }

    fn eps(&self) -> F {
        self.lasso.eps()
    }
}
