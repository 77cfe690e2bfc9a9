//! Outer EM loop of the penalized models
//!
//! [`PenalizedModel`] alternates between re-weighting the penalty around the
//! current estimate and re-estimating the coefficients with a conjugate
//! gradient solve. Coefficients falling under the threshold are set to zero;
//! for penalties that allow it the corresponding covariates leave the
//! problem, which shrinks every following solve.

use linfa::Float;
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, Zip};

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::cg::ConjugateGradient;
use crate::error::{PenRegError, Result};
use crate::penalty::{FusedLassoPenalty, Penalty};

/// State of the outer loop
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStatus {
    /// A starting point is set, no iteration was run yet
    Initialized,
    /// The loop is running
    Iterating,
    /// The change of the coefficients dropped below the tolerance
    Converged,
    /// The outer iteration budget is exhausted
    MaxIterReached,
    /// The last inner solve exhausted its budget without reaching its tolerance
    SolverNotConverged,
}

impl FitStatus {
    pub fn is_converged(&self) -> bool {
        matches!(self, FitStatus::Converged)
    }
}

/// Settings of the outer loop and of the inner solver
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelOptions<F> {
    /// Coefficients with a smaller magnitude are set to zero
    pub threshold: F,
    /// Relative residual tolerance of the conjugate gradient
    pub eps_cg: F,
    /// Iteration budget of the conjugate gradient, `None` for `max(10·p, 100)`
    pub max_cg_iterations: Option<usize>,
    /// Iteration budget of the outer loop
    pub max_iterations: usize,
    /// The loop stops when no coefficient moves by more than this
    pub tolerance: F,
}

impl<F: Float> Default for ModelOptions<F> {
    fn default() -> Self {
        Self {
            threshold: F::cast(1e-5),
            eps_cg: F::cast(1e-8),
            max_cg_iterations: None,
            max_iterations: 1000,
            tolerance: F::cast(1e-5),
        }
    }
}

/// Final estimate of a run of the outer loop
#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome<F> {
    pub beta: Array1<F>,
    /// Penalized objective at `beta`
    pub objective: F,
    pub status: FitStatus,
    pub n_iterations: usize,
}

/// EM estimation of a penalized regression model
///
/// The model borrows the data matrix and the response for its whole
/// lifetime; the penalty, the estimate and the solver workspace are owned.
/// After a run, the hyper-parameters can be changed with the setters and the
/// loop restarted from the current estimate, e.g. to follow a path of
/// decreasing `λ`.
pub struct PenalizedModel<'a, F, P> {
    data: ArrayView2<'a, F>,
    y: ArrayView1<'a, F>,
    penalty: P,
    cg: ConjugateGradient<F>,
    threshold: F,
    max_iterations: usize,
    tolerance: F,

    beta: Array1<F>,
    active: Vec<usize>,
    // columns of `data` in the active set, `None` while every column is active
    current_data: Option<Array2<F>>,
    response: Array1<F>,

    status: FitStatus,
    n_iterations: usize,
    last_change: F,
    solver_converged: bool,
    objective: F,
}

fn active_columns<'b, F>(data: ArrayView2<'b, F>, current: &'b Option<Array2<F>>) -> ArrayView2<'b, F> {
    match current {
        Some(current) => current.view(),
        None => data,
    }
}

impl<'a, F: Float, P: Penalty<F>> PenalizedModel<'a, F, P> {
    /// Create the model and compute the closed-form starting point
    ///
    /// Fails with [`InvalidLambda1`](PenRegError::InvalidLambda1) or
    /// [`InvalidEpsilon`](PenRegError::InvalidEpsilon) if the penalty carries a
    /// non-positive `λ1` or `eps`, both of which make the EM weights singular.
    pub fn new(
        data: ArrayView2<'a, F>,
        y: ArrayView1<'a, F>,
        penalty: P,
        options: ModelOptions<F>,
    ) -> Result<Self> {
        PenRegError::check_len(data.nrows(), y.len())?;
        let lambda1 = penalty.lambda1();
        if !lambda1.is_finite() || lambda1 <= F::zero() {
            return Err(PenRegError::InvalidLambda1(
                lambda1.to_f32().unwrap_or(f32::NAN),
            ));
        }
        let eps = penalty.eps();
        if !eps.is_finite() || eps <= F::zero() {
            return Err(PenRegError::InvalidEpsilon(eps.to_f32().unwrap_or(f32::NAN)));
        }

        let mut model = Self {
            data,
            y,
            penalty,
            cg: ConjugateGradient::new(options.max_cg_iterations, options.eps_cg),
            threshold: options.threshold,
            max_iterations: options.max_iterations,
            tolerance: options.tolerance,
            beta: Array1::zeros(data.ncols()),
            active: (0..data.ncols()).collect(),
            current_data: None,
            response: y.to_owned(),
            status: FitStatus::Initialized,
            n_iterations: 0,
            last_change: F::infinity(),
            solver_converged: true,
            objective: F::infinity(),
        };
        model.initialize_model()?;

        Ok(model)
    }

    /// Reset the estimate to `β_i = (Xᵗy)_i / ‖X_i‖²`, the least-squares
    /// coefficient of each covariate taken alone
    pub fn initialize_model(&mut self) -> Result<()> {
        let xty = self.data.t().dot(&self.y);
        let norms = self.data.map_axis(Axis(0), |col| col.dot(&col));
        let beta = Zip::from(&xty).and(&norms).map_collect(|&xty, &norm| {
            if norm > F::zero() {
                xty / norm
            } else {
                F::zero()
            }
        });

        self.start_from(beta)
    }

    /// Restart from a user supplied estimate
    pub fn initialize_beta(&mut self, beta: ArrayView1<F>) -> Result<()> {
        PenRegError::check_len(self.data.ncols(), beta.len())?;
        self.start_from(beta.to_owned())
    }

    fn start_from(&mut self, mut beta: Array1<F>) -> Result<()> {
        self.apply_threshold(&mut beta);
        self.beta = beta;
        self.active = (0..self.data.ncols()).collect();
        self.current_data = None;
        self.rebind()?;

        self.response = self.y.to_owned();
        self.status = FitStatus::Initialized;
        self.n_iterations = 0;
        self.last_change = F::infinity();
        self.solver_converged = true;
        self.update_objective()
    }

    fn apply_threshold(&self, beta: &mut Array1<F>) {
        let threshold = self.threshold;
        beta.mapv_inplace(|b| if b.abs() < threshold { F::zero() } else { b });
    }

    /// Drop thresholded covariates from the active set and rebuild the
    /// current data
    fn rebind(&mut self) -> Result<()> {
        PenRegError::check_len(self.data.ncols(), self.beta.len())?;
        if !self.penalty.shrinks_active_set() {
            return Ok(());
        }

        let beta = &self.beta;
        let active: Vec<usize> = self
            .active
            .iter()
            .copied()
            .filter(|&i| beta[i] != F::zero())
            .collect();
        if active.len() == self.active.len() {
            return Ok(());
        }

        debug!(
            "active set shrinks from {} to {} covariates",
            self.active.len(),
            active.len()
        );
        self.current_data = if active.len() == self.data.ncols() {
            None
        } else {
            Some(self.data.select(Axis(1), &active))
        };
        self.active = active;

        Ok(())
    }

    fn active_beta(&self) -> Array1<F> {
        self.beta.select(Axis(0), &self.active)
    }

    fn update_objective(&mut self) -> Result<()> {
        let beta = self.active_beta();
        let data = active_columns(self.data.view(), &self.current_data);
        self.penalty.update(beta.view());
        self.objective = self.penalty.objective(data, self.y, beta.view())?;

        Ok(())
    }

    /// Run a single outer iteration
    pub fn step(&mut self) -> Result<()> {
        if self.active.is_empty() {
            self.last_change = F::zero();
            self.solver_converged = true;
            return Ok(());
        }

        let beta = self.active_beta();
        let data = active_columns(self.data.view(), &self.current_data);

        if let Some(z) = self.penalty.relinearize(data, beta.view(), self.y) {
            self.response = z;
        }
        self.penalty.update(beta.view());
        let outcome = self
            .penalty
            .solve(&mut self.cg, data, self.response.view(), beta.view())?;

        let mut next = outcome.solution;
        self.apply_threshold(&mut next);
        let change = Zip::from(&next)
            .and(&beta)
            .fold(F::zero(), |acc, &a, &b| acc.max((a - b).abs()));
        for (&i, &b) in self.active.iter().zip(next.iter()) {
            self.beta[i] = b;
        }

        self.n_iterations += 1;
        self.last_change = change;
        self.solver_converged = outcome.converged;
        self.rebind()?;
        self.update_objective()?;

        debug!(
            "iteration {:>4} | change {:.3e} | objective {:.6e} | active {} | cg iterations {}",
            self.n_iterations,
            change.to_f64().unwrap_or(f64::NAN),
            self.objective.to_f64().unwrap_or(f64::NAN),
            self.active.len(),
            outcome.n_iterations
        );

        Ok(())
    }

    /// Iterate until convergence or until a budget is exhausted
    pub fn run(&mut self) -> Result<FitOutcome<F>> {
        self.status = FitStatus::Iterating;
        let start = self.n_iterations;

        while self.n_iterations - start < self.max_iterations {
            self.step()?;
            if self.last_change < self.tolerance {
                break;
            }
        }

        self.status = if !self.solver_converged {
            warn!(
                "inner solver did not reach eps_cg = {:.1e} in the last iteration",
                self.cg.eps().to_f64().unwrap_or(f64::NAN)
            );
            FitStatus::SolverNotConverged
        } else if self.last_change < self.tolerance {
            FitStatus::Converged
        } else {
            warn!(
                "no convergence after {} iterations, last change {:.3e}",
                self.n_iterations - start,
                self.last_change.to_f64().unwrap_or(f64::NAN)
            );
            FitStatus::MaxIterReached
        };

        Ok(FitOutcome {
            beta: self.beta.clone(),
            objective: self.objective,
            status: self.status,
            n_iterations: self.n_iterations - start,
        })
    }

    /// Current estimate over all covariates
    pub fn beta(&self) -> &Array1<F> {
        &self.beta
    }

    /// Indices of the covariates still in the problem
    pub fn active(&self) -> &[usize] {
        &self.active
    }

    pub fn status(&self) -> FitStatus {
        self.status
    }

    /// Penalized objective at the current estimate
    pub fn objective(&self) -> F {
        self.objective
    }

    pub fn n_iterations(&self) -> usize {
        self.n_iterations
    }

    pub fn penalty(&self) -> &P {
        &self.penalty
    }

    pub fn set_lambda1(&mut self, lambda1: F) {
        self.penalty.set_lambda1(lambda1);
    }

    pub fn set_threshold(&mut self, threshold: F) {
        self.threshold = threshold;
    }

    pub fn set_eps_cg(&mut self, eps_cg: F) {
        self.cg.set_eps(eps_cg);
    }

    pub fn set_max_cg_iterations(&mut self, max_cg_iterations: Option<usize>) {
        self.cg.set_max_iterations(max_cg_iterations);
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) {
        self.max_iterations = max_iterations;
    }

    pub fn set_tolerance(&mut self, tolerance: F) {
        self.tolerance = tolerance;
    }
}

impl<'a, F: Float> PenalizedModel<'a, F, FusedLassoPenalty<F>> {
    pub fn set_lambda2(&mut self, lambda2: F) {
        self.penalty.set_lambda2(lambda2);
    }
}
