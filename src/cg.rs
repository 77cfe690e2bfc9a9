//! Preconditioned conjugate gradient over an implicit operator
//!
//! The solver keeps its work vectors between calls, so the outer loop can
//! re-seed it with the previous estimate at every iteration without
//! reallocating as long as the problem size is unchanged.

use linfa::Float;
use log::trace;
use ndarray::{Array1, ArrayView1, Zip};

use crate::error::{PenRegError, Result};
use crate::multiplicator::LinearOperator;

fn default_budget(dim: usize) -> usize {
    dim.saturating_mul(10).max(100)
}

/// Result of a single conjugate gradient run
#[derive(Debug, Clone, PartialEq)]
pub struct CgOutcome<F> {
    /// Last iterate, the approximate solution
    pub solution: Array1<F>,
    /// Number of iterations performed
    pub n_iterations: usize,
    /// Euclidean norm of the residual `rhs - A·solution`
    pub residual_norm: F,
    /// Whether the relative residual dropped below the tolerance
    pub converged: bool,
}

/// Re-enterable conjugate gradient solver state
///
/// Solves `A·x = b` for a symmetric positive-definite `A` given as a
/// [`LinearOperator`]. The iteration stops when `‖b - A·x‖ <= eps · ‖b‖` or
/// when the iteration budget is exhausted, in which case the last iterate is
/// returned with `converged == false`. If the operator exposes its diagonal,
/// it is used as a Jacobi preconditioner.
#[derive(Debug, Clone)]
pub struct ConjugateGradient<F> {
    max_iterations: Option<usize>,
    eps: F,
    residual: Array1<F>,
    preconditioned: Array1<F>,
    direction: Array1<F>,
}

impl<F: Float> ConjugateGradient<F> {
    /// Create a solver with tolerance `eps` on the relative residual norm
    ///
    /// If `max_iterations` is `None` the budget is `max(10·dim, 100)`
    /// iterations. Exact arithmetic needs `dim` steps, the fused lasso
    /// systems are conditioned badly enough to need more in floating point.
    pub fn new(max_iterations: Option<usize>, eps: F) -> Self {
        Self {
            max_iterations,
            eps,
            residual: Array1::zeros(0),
            preconditioned: Array1::zeros(0),
            direction: Array1::zeros(0),
        }
    }

    pub fn eps(&self) -> F {
        self.eps
    }

    pub fn set_eps(&mut self, eps: F) {
        self.eps = eps;
    }

    pub fn max_iterations(&self) -> Option<usize> {
        self.max_iterations
    }

    pub fn set_max_iterations(&mut self, max_iterations: Option<usize>) {
        self.max_iterations = max_iterations;
    }

    fn reserve(&mut self, dim: usize) {
        if self.residual.len() != dim {
            self.residual = Array1::zeros(dim);
            self.preconditioned = Array1::zeros(dim);
            self.direction = Array1::zeros(dim);
        }
    }

    fn precondition(&mut self, inv_diagonal: Option<&Array1<F>>) {
        match inv_diagonal {
            Some(inv_diagonal) => Zip::from(&mut self.preconditioned)
                .and(&self.residual)
                .and(inv_diagonal)
                .for_each(|z, &r, &d| *z = r * d),
            None => self.preconditioned.assign(&self.residual),
        }
    }

    /// Solve `op · x = rhs` starting from `x0`
    pub fn solve<O: LinearOperator<F>>(
        &mut self,
        op: &O,
        rhs: ArrayView1<F>,
        x0: ArrayView1<F>,
    ) -> Result<CgOutcome<F>> {
        let dim = op.dim();
        PenRegError::check_len(dim, rhs.len())?;
        PenRegError::check_len(dim, x0.len())?;

        let max_iterations = self.max_iterations.unwrap_or_else(|| default_budget(dim));
        let mut x = x0.to_owned();
        self.reserve(dim);

        self.residual.assign(&rhs);
        self.residual -= &op.apply(x.view())?;
        let mut residual_norm = self.residual.dot(&self.residual).sqrt();

        if max_iterations == 0 {
            return Ok(CgOutcome {
                solution: x,
                n_iterations: 0,
                residual_norm,
                converged: false,
            });
        }

        let rhs_norm = rhs.dot(&rhs).sqrt();
        if rhs_norm == F::zero() {
            return Ok(CgOutcome {
                solution: Array1::zeros(dim),
                n_iterations: 0,
                residual_norm: F::zero(),
                converged: true,
            });
        }
        let target = self.eps * rhs_norm;

        let inv_diagonal = op.diagonal().map(|d| {
            d.mapv(|v| {
                if v > F::zero() && v.is_finite() {
                    F::one() / v
                } else {
                    F::one()
                }
            })
        });

        self.precondition(inv_diagonal.as_ref());
        self.direction.assign(&self.preconditioned);
        let mut rz = self.residual.dot(&self.preconditioned);

        let mut n_iterations = 0;
        while residual_norm > target && n_iterations < max_iterations {
            let q = op.apply(self.direction.view())?;
            let curvature = self.direction.dot(&q);
            if curvature <= F::zero() || !curvature.is_finite() {
                // loss of positive definiteness, keep the current iterate
                break;
            }

            let alpha = rz / curvature;
            x.scaled_add(alpha, &self.direction);
            self.residual.scaled_add(-alpha, &q);
            residual_norm = self.residual.dot(&self.residual).sqrt();
            n_iterations += 1;

            self.precondition(inv_diagonal.as_ref());
            let rz_next = self.residual.dot(&self.preconditioned);
            let beta = rz_next / rz;
            rz = rz_next;
            let preconditioned = &self.preconditioned;
            self.direction
                .zip_mut_with(preconditioned, |p, &z| *p = z + beta * *p);
        }

        let converged = residual_norm <= target;
        trace!(
            "cg stopped after {} iterations, residual {:.3e} (target {:.3e})",
            n_iterations,
            residual_norm.to_f64().unwrap_or(f64::NAN),
            target.to_f64().unwrap_or(f64::NAN)
        );

        Ok(CgOutcome {
            solution: x,
            n_iterations,
            residual_norm,
            converged,
        })
    }
}
