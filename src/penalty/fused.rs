use std::ops::Range;

use linfa::Float;
use ndarray::{Array1, ArrayView1, ArrayView2};

use super::Penalty;
use crate::cg::{CgOutcome, ConjugateGradient};
use crate::error::{PenRegError, Result};
use crate::multiplicator::{tridiagonal_mul, FusedLassoMultiplicator};

/// Fused lasso penalty `λ1 Σ|β_i| + λ2 Σ|β_i - β_{i-1}|`
///
/// The quadratic surrogate is a symmetric tridiagonal matrix `B` with
///
/// ```text
/// B[i][i]   = λ1 / (|β_i| + eps) + λ2 / (|β_i - β_{i-1}| + eps) + λ2 / (|β_{i+1} - β_i| + eps)
/// B[i][i+1] = -λ2 / (|β_{i+1} - β_i| + eps)
/// ```
///
/// where the difference terms are dropped on the first and last row. The
/// main diagonal is strictly positive and `B` is positive definite whenever
/// `λ1 > 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedLassoPenalty<F> {
    lambda1: F,
    lambda2: F,
    eps: F,
    main_diagonal: Array1<F>,
    off_diagonal: Array1<F>,
}

impl<F: Float> FusedLassoPenalty<F> {
    /// `eps` must be positive, [`PenalizedModel::new`](crate::PenalizedModel::new)
    /// rejects the penalty otherwise.
    pub fn new(lambda1: F, lambda2: F, eps: F) -> Self {
        Self {
            lambda1,
            lambda2,
            eps,
            main_diagonal: Array1::zeros(0),
            off_diagonal: Array1::zeros(0),
        }
    }

    pub fn lambda2(&self) -> F {
        self.lambda2
    }

    pub fn set_lambda2(&mut self, lambda2: F) {
        self.lambda2 = lambda2;
    }

    pub fn set_eps(&mut self, eps: F) {
        self.eps = eps;
    }

    pub fn main_diagonal(&self) -> &Array1<F> {
        &self.main_diagonal
    }

    /// `off_diagonal()[i]` couples the coefficients `i` and `i + 1`
    pub fn off_diagonal(&self) -> &Array1<F> {
        &self.off_diagonal
    }

    fn fusion_weight(&self, beta: ArrayView1<F>, i: usize) -> F {
        self.lambda2 / ((beta[i + 1] - beta[i]).abs() + self.eps)
    }

    fn update_row(&mut self, beta: ArrayView1<F>, i: usize) {
        let p = beta.len();
        let mut diagonal = self.lambda1 / (beta[i].abs() + self.eps);
        if i > 0 {
            diagonal += self.fusion_weight(beta, i - 1);
        }
        if i + 1 < p {
            let weight = self.fusion_weight(beta, i);
            diagonal += weight;
            self.off_diagonal[i] = -weight;
        }
        self.main_diagonal[i] = diagonal;
    }

    /// Recompute the rows of the penalty matrix in `segments` only
    ///
    /// Row `i` holds `B[i][i]` and the coupling `B[i][i+1]` with its right
    /// neighbour. Rows outside the segments keep their previous values, so
    /// the representation must already have the length of `beta`.
    pub fn update_segments(&mut self, beta: ArrayView1<F>, segments: &[Range<usize>]) -> Result<()> {
        PenRegError::check_len(self.main_diagonal.len(), beta.len())?;
        for segment in segments {
            if segment.end > beta.len() {
                return Err(PenRegError::DimensionMismatch {
                    expected: beta.len(),
                    actual: segment.end,
                });
            }
            for i in segment.clone() {
                self.update_row(beta, i);
            }
        }

        Ok(())
    }
}

impl<F: Float> Penalty<F> for FusedLassoPenalty<F> {
    fn len(&self) -> usize {
        self.main_diagonal.len()
    }

    fn update(&mut self, beta: ArrayView1<F>) {
        let p = beta.len();
        if p != self.main_diagonal.len() {
            self.main_diagonal = Array1::zeros(p);
            self.off_diagonal = Array1::zeros(p.saturating_sub(1));
        }

        for i in 0..p {
            self.update_row(beta, i);
        }
    }

    fn penalty_term(&self, beta: ArrayView1<F>) -> Result<F> {
        let b = tridiagonal_mul(self.main_diagonal.view(), self.off_diagonal.view(), beta)?;
        Ok(beta.dot(&b))
    }

    fn multiply(&self, v: ArrayView1<F>) -> Result<Array1<F>> {
        tridiagonal_mul(self.main_diagonal.view(), self.off_diagonal.view(), v)
    }

    fn solve(
        &self,
        cg: &mut ConjugateGradient<F>,
        data: ArrayView2<F>,
        response: ArrayView1<F>,
        beta: ArrayView1<F>,
    ) -> Result<CgOutcome<F>> {
        PenRegError::check_len(self.len(), data.ncols())?;
        let op = FusedLassoMultiplicator::new(
            data.reborrow(),
            self.main_diagonal.view(),
            self.off_diagonal.view(),
        );
        let rhs = data.t().dot(&response);
        cg.solve(&op, rhs.view(), beta)
    }

    fn shrinks_active_set(&self) -> bool {
        false
    }

    fn lambda1(&self) -> F {
        self.lambda1
    }

    fn set_lambda1(&mut self, lambda1: F) {
        self.lambda1 = lambda1;
    }

    fn eps(&self) -> F {
        self.eps
    }
}
