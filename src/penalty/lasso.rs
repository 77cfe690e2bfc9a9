use linfa::Float;
use ndarray::{Array1, ArrayView1, ArrayView2, Zip};

use super::Penalty;
use crate::cg::{CgOutcome, ConjugateGradient};
use crate::error::{PenRegError, Result};
use crate::multiplicator::{diagonal_mul, LassoMultiplicator};

/// Lasso penalty `λ Σ|β_i|`
///
/// The penalty matrix is `D = diag(λ / |β_i|)`. It is stored through its
/// inverse square root `sqrt(|β_i| / λ)`, with `|β_i|` floored at `eps` so
/// that every entry stays finite and strictly positive.
#[derive(Debug, Clone, PartialEq)]
pub struct LassoPenalty<F> {
    lambda: F,
    eps: F,
    sigma2: F,
    sqrt_inv_penalty: Array1<F>,
}

impl<F: Float> LassoPenalty<F> {
    /// `eps` must be positive, [`PenalizedModel::new`](crate::PenalizedModel::new)
    /// rejects the penalty otherwise.
    pub fn new(lambda: F, eps: F) -> Self {
        Self {
            lambda,
            eps,
            sigma2: F::one(),
            sqrt_inv_penalty: Array1::zeros(0),
        }
    }

    pub fn lambda(&self) -> F {
        self.lambda
    }

    pub fn set_lambda(&mut self, lambda: F) {
        self.lambda = lambda;
    }

    pub fn set_eps(&mut self, eps: F) {
        self.eps = eps;
    }

    /// Noise variance of the linear model
    ///
    /// Kept at `1`: the variance is not re-estimated from the residuals.
    pub fn sigma2(&self) -> F {
        self.sigma2
    }

    /// Entries `sqrt(max(|β_i|, eps) / λ)` of `D^{-1/2}`
    pub fn sqrt_inv_penalty(&self) -> &Array1<F> {
        &self.sqrt_inv_penalty
    }

    /// Product `D⁻¹·x`
    pub fn mult_inv_penalty(&self, x: ArrayView1<F>) -> Result<Array1<F>> {
        let inv_penalty = self.sqrt_inv_penalty.mapv(|s| s * s);
        diagonal_mul(inv_penalty.view(), x)
    }

    /// Product `D^{-1/2}·x`
    pub fn mult_sqrt_inv_penalty(&self, x: ArrayView1<F>) -> Result<Array1<F>> {
        diagonal_mul(self.sqrt_inv_penalty.view(), x)
    }
}

impl<F: Float> Penalty<F> for LassoPenalty<F> {
    fn len(&self) -> usize {
        self.sqrt_inv_penalty.len()
    }

    fn update(&mut self, beta: ArrayView1<F>) {
        if beta.len() != self.sqrt_inv_penalty.len() {
            self.sqrt_inv_penalty = Array1::zeros(beta.len());
        }

        let (lambda, eps) = (self.lambda, self.eps);
        Zip::from(&mut self.sqrt_inv_penalty)
            .and(&beta)
            .for_each(|s, &b| *s = (b.abs().max(eps) / lambda).sqrt());
    }

    /// `λ Σ β_i² / max(|β_i|, eps)`, which is `λ‖β‖₁` once every non-zero
    /// coefficient is above `eps`
    fn penalty_term(&self, beta: ArrayView1<F>) -> Result<F> {
        PenRegError::check_len(self.len(), beta.len())?;
        Ok(Zip::from(&beta)
            .and(&self.sqrt_inv_penalty)
            .fold(F::zero(), |acc, &b, &s| acc + b * b / (s * s)))
    }

    fn multiply(&self, v: ArrayView1<F>) -> Result<Array1<F>> {
        let penalty = self.sqrt_inv_penalty.mapv(|s| F::one() / (s * s));
        diagonal_mul(penalty.view(), v)
    }

    fn solve(
        &self,
        cg: &mut ConjugateGradient<F>,
        data: ArrayView2<F>,
        response: ArrayView1<F>,
        beta: ArrayView1<F>,
    ) -> Result<CgOutcome<F>> {
        PenRegError::check_len(self.len(), beta.len())?;
        PenRegError::check_len(self.len(), data.ncols())?;

        // solve in u = D^{1/2} β, then map back
        let op = LassoMultiplicator::new(data.reborrow(), self.sqrt_inv_penalty.view(), self.sigma2);
        let rhs = &data.t().dot(&response) * &self.sqrt_inv_penalty;
        let u0 = &beta / &self.sqrt_inv_penalty;

        let mut outcome = cg.solve(&op, rhs.view(), u0.view())?;
        if outcome.n_iterations == 0 && !outcome.converged {
            outcome.solution = beta.to_owned();
        } else {
            outcome.solution *= &self.sqrt_inv_penalty;
        }

        Ok(outcome)
    }

    fn lambda1(&self) -> F {
        self.lambda
    }

    fn set_lambda1(&mut self, lambda1: F) {
        self.lambda = lambda1;
    }

    fn eps(&self) -> F {
        self.eps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};
    use ndarray_rand::rand::{Rng, SeedableRng};
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use rand_xoshiro::Xoshiro256Plus;

    fn random_beta_with_zeros(rng: &mut Xoshiro256Plus, p: usize) -> Array1<f64> {
        let mut beta = Array::random_using(p, Uniform::new(-3.0, 3.0), rng);
        for b in beta.iter_mut() {
            if rng.gen_bool(0.3) {
                *b = 0.0;
            }
        }
        beta
    }

    #[test]
    fn entries_are_square_root_of_inverse() {
        let mut penalty = LassoPenalty::new(2.0, 1e-8);
        penalty.update(array![8.0, -2.0, 0.5].view());
        assert_abs_diff_eq!(
            penalty.sqrt_inv_penalty(),
            &array![2.0, 1.0, 0.5],
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            penalty.multiply(array![1.0, 1.0, 1.0].view()).unwrap(),
            array![0.25, 1.0, 4.0],
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            penalty.mult_inv_penalty(array![1.0, 1.0, 1.0].view()).unwrap(),
            array![4.0, 1.0, 0.25],
            epsilon = 1e-12
        );
    }

    #[test]
    fn entries_stay_positive_with_zero_coefficients() {
        let mut rng = Xoshiro256Plus::seed_from_u64(7);
        let mut penalty = LassoPenalty::new(0.5, 1e-8);
        for _ in 0..50 {
            let beta = random_beta_with_zeros(&mut rng, 20);
            penalty.update(beta.view());
            assert!(penalty
                .sqrt_inv_penalty()
                .iter()
                .all(|s| s.is_finite() && *s > 0.0));
            assert!(penalty.penalty_term(beta.view()).unwrap() >= 0.0);
        }
    }

    #[test]
    fn penalty_term_is_l1_norm() {
        let beta = array![1.5, -2.0, 0.0, 0.25];
        let mut penalty = LassoPenalty::new(3.0, 1e-8);
        penalty.update(beta.view());
        assert_abs_diff_eq!(
            penalty.penalty_term(beta.view()).unwrap(),
            3.0 * 3.75,
            epsilon = 1e-10
        );
    }

    #[test]
    fn update_is_idempotent() {
        let beta = array![0.3, 0.0, -1.2, 4.0];
        let mut penalty = LassoPenalty::new(1.0, 1e-6);
        penalty.update(beta.view());
        let first = penalty.clone();
        penalty.update(beta.view());
        assert_eq!(first, penalty);
    }

    #[test]
    fn resizes_on_length_change() {
        let mut penalty = LassoPenalty::new(1.0, 1e-8);
        penalty.update(array![1.0, 2.0, 3.0].view());
        assert_eq!(penalty.len(), 3);
        penalty.update(array![1.0, 3.0].view());
        assert_eq!(penalty.len(), 2);
        assert!(penalty.penalty_term(array![1.0, 2.0, 3.0].view()).is_err());
    }

    #[test]
    fn solve_matches_normal_equations() {
        let x = array![[1.0, 0.5], [0.0, 1.0], [2.0, -1.0], [1.0, 1.0]];
        let y = array![1.0, 2.0, 0.5, 3.0];
        let beta = array![0.8, 1.5];

        let mut penalty = LassoPenalty::new(0.5, 1e-8);
        penalty.update(beta.view());
        let mut cg = ConjugateGradient::new(None, 1e-12);
        let out = penalty.solve(&mut cg, x.view(), y.view(), beta.view()).unwrap();
        assert!(out.converged);

        // (D + XᵗX) β = Xᵗy
        let lhs = penalty.multiply(out.solution.view()).unwrap() + x.t().dot(&x.dot(&out.solution));
        assert_abs_diff_eq!(lhs, x.t().dot(&y), epsilon = 1e-8);
    }
}
