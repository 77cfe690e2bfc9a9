use linfa::dataset::AsSingleTargets;
use linfa::traits::{Fit, PredictInplace};
use linfa::{DatasetBase, Float};
use log::debug;
use ndarray::{Array1, ArrayBase, ArrayView1, ArrayView2, Data, Ix2};

use crate::error::{PenRegError, Result};
use crate::hyperparams::{PenaltyKind, PenalizedRegressionValidParams};
use crate::model::{FitOutcome, ModelOptions, PenalizedModel};
use crate::penalty::{sigmoid, FusedLassoPenalty, LassoPenalty, LogisticLassoPenalty, Penalty};
use crate::PenalizedRegression;

impl<F, D, T> Fit<ArrayBase<D, Ix2>, T, PenRegError> for PenalizedRegressionValidParams<F>
where
    F: Float,
    D: Data<Elem = F>,
    T: AsSingleTargets<Elem = F>,
{
    type Object = PenalizedRegression<F>;

    /// Fit a penalized regression model given a feature matrix `x` and a
    /// target variable `y`.
    ///
    /// The feature matrix `x` must have shape `(n_samples, n_features)`
    ///
    /// The target variable `y` must have shape `(n_samples)`. Targets of the
    /// logistic lasso must be `0` or `1`.
    ///
    /// No intercept is fitted, center the data beforehand if needed.
    fn fit(&self, dataset: &DatasetBase<ArrayBase<D, Ix2>, T>) -> Result<Self::Object> {
        let records = dataset.records().view();
        let targets = dataset.as_single_targets();
        PenRegError::check_len(records.nrows(), targets.len())?;

        let options = self.model_options();
        let initial_beta = self.initial_beta();
        debug!(
            "fitting {:?} on {} samples and {} features",
            self.kind(),
            records.nrows(),
            records.ncols()
        );

        let (outcome, active) = match self.kind() {
            PenaltyKind::Lasso => estimate(
                records,
                targets.view(),
                LassoPenalty::new(self.lambda1(), self.eps()),
                options,
                initial_beta,
            )?,
            PenaltyKind::FusedLasso => estimate(
                records,
                targets.view(),
                FusedLassoPenalty::new(self.lambda1(), self.lambda2(), self.eps()),
                options,
                initial_beta,
            )?,
            PenaltyKind::LogisticLasso => {
                if targets
                    .iter()
                    .any(|&y| y != F::zero() && y != F::one())
                {
                    return Err(PenRegError::NonBinaryTargets);
                }
                estimate(
                    records,
                    targets.view(),
                    LogisticLassoPenalty::new(self.lambda1(), self.eps()),
                    options,
                    initial_beta,
                )?
            }
        };

        Ok(PenalizedRegression {
            kind: self.kind(),
            hyperplane: outcome.beta,
            objective: outcome.objective,
            status: outcome.status,
            n_iterations: outcome.n_iterations,
            active,
        })
    }
}

fn estimate<F: Float, P: Penalty<F>>(
    data: ArrayView2<F>,
    y: ArrayView1<F>,
    penalty: P,
    options: ModelOptions<F>,
    initial_beta: Option<&Array1<F>>,
) -> Result<(FitOutcome<F>, Vec<usize>)> {
    let mut model = PenalizedModel::new(data.reborrow(), y.reborrow(), penalty, options)?;
    if let Some(beta) = initial_beta {
        model.initialize_beta(beta.view())?;
    }
    let outcome = model.run()?;

    Ok((outcome, model.active().to_vec()))
}

impl<F: Float, D: Data<Elem = F>> PredictInplace<ArrayBase<D, Ix2>, Array1<F>>
    for PenalizedRegression<F>
{
    /// Given an input matrix `X`, with shape `(n_samples, n_features)`,
    /// `predict` returns `Xβ` for the linear models and the probability of
    /// the positive class for the logistic lasso.
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<F>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );
        assert_eq!(
            x.ncols(),
            self.hyperplane.len(),
            "Number of data features must match the number of features the model was trained with."
        );

        *y = x.dot(&self.hyperplane);
        if self.kind == PenaltyKind::LogisticLasso {
            y.mapv_inplace(sigmoid);
        }
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros(x.nrows())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FitStatus, PenalizedRegressionParams};
    use approx::assert_abs_diff_eq;
    use linfa::prelude::*;
    use ndarray::{array, concatenate, s, Array, Array2, Axis};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use rand_xoshiro::Xoshiro256Plus;

    #[test]
    fn autotraits() {
        fn has_autotraits<T: Send + Sync + Sized + Unpin>() {}
        has_autotraits::<PenalizedRegression<f64>>();
        has_autotraits::<PenalizedRegressionParams<f64>>();
        has_autotraits::<PenalizedRegressionValidParams<f64>>();
        has_autotraits::<PenRegError>();
    }

    #[test]
    fn lasso_toy_example() {
        let dataset = Dataset::new(array![[1.0, 0.0], [0.0, 1.0]], array![3.0, 2.0]);
        let model = PenalizedRegression::lasso()
            .lambda1(1e-3)
            .fit(&dataset)
            .unwrap();

        // each coefficient is shrunk by λ
        assert_abs_diff_eq!(model.hyperplane(), &array![2.999, 1.999], epsilon = 1e-5);
        assert!(model.is_converged());
        assert_eq!(model.active(), &[0, 1]);

        let pred = model.predict(&dataset);
        assert_abs_diff_eq!(pred, array![2.999, 1.999], epsilon = 1e-5);
    }

    #[test]
    fn lasso_diabetes_satisfies_optimality_conditions() {
        let dataset = linfa_datasets::diabetes();
        let x = dataset.records() - &dataset.records().mean_axis(Axis(0)).unwrap();
        let y = dataset.targets() - dataset.targets().mean().unwrap();
        let dataset = Dataset::new(x.clone(), y.clone());

        let lambda = 100.0;
        let model = PenalizedRegression::lasso()
            .lambda1(lambda)
            .max_iterations(5000)
            .tolerance(1e-9)
            .fit(&dataset)
            .unwrap();

        let beta = model.hyperplane();
        let grad = x.t().dot(&(&y - &x.dot(beta)));
        let mut n_nonzero = 0;
        for (b, g) in beta.iter().zip(grad.iter()) {
            if *b != 0.0 {
                n_nonzero += 1;
                assert_abs_diff_eq!(*g, lambda * b.signum(), epsilon = 2.0);
            } else {
                assert!(g.abs() <= lambda + 2.0);
            }
        }
        assert!(n_nonzero > 0 && n_nonzero < 10);
        assert_eq!(model.active().len(), n_nonzero);

        let rss = (&y - &x.dot(beta)).mapv(|r| r * r).sum();
        let l1 = beta.mapv(f64::abs).sum();
        assert_abs_diff_eq!(model.objective(), 0.5 * rss + lambda * l1, epsilon = 1e-3);
    }

    #[test]
    fn lasso_recovers_sparse_support_in_high_dimension() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let x = Array::random_using((40, 100), Uniform::new(-1.0, 1.0), &mut rng);
        let mut truth = Array1::zeros(100);
        truth[3] = 5.0;
        truth[40] = -4.0;
        truth[77] = 3.0;
        let y = x.dot(&truth);

        let model = PenalizedRegression::lasso()
            .lambda1(0.5)
            .fit(&Dataset::new(x, y))
            .unwrap();
        let beta = model.hyperplane();

        assert!(beta[3] > 2.0);
        assert!(beta[40] < -2.0);
        assert!(beta[77] > 1.0);
        assert!(model.active().len() <= 40);
        assert_eq!(
            beta.iter().filter(|b| **b != 0.0).count(),
            model.active().len()
        );
    }

    #[test]
    fn fused_lasso_recovers_piecewise_constant_signal() {
        let mut rng = Xoshiro256Plus::seed_from_u64(8);
        let signal: Array1<f64> = concatenate![
            Axis(0),
            Array1::zeros(10),
            Array1::from_elem(10, 3.0),
            Array1::zeros(10)
        ];
        let y = &signal + &Array::random_using(30, Uniform::new(-0.1, 0.1), &mut rng);
        let x: Array2<f64> = Array2::eye(30);

        let model = PenalizedRegression::fused_lasso()
            .lambda1(0.01)
            .lambda2(1.0)
            .fit(&Dataset::new(x, y))
            .unwrap();
        let beta = model.hyperplane();

        // fused groups have weights near λ2/eps, the default inner budget still copes
        assert!(model.is_converged());
        assert_eq!(beta.len(), 30);
        assert_eq!(model.active().len(), 30);
        let middle = beta.slice(s![10..20]);
        assert!(middle.iter().all(|b| *b > 2.5 && *b < 3.1));
        assert!(beta.slice(s![..10]).iter().all(|b| b.abs() < 0.5));
        assert!(beta.slice(s![20..]).iter().all(|b| b.abs() < 0.5));
        assert!((beta[12] - beta[15]).abs() < 1e-2);
    }

    #[test]
    fn logistic_lasso_separates_blobs() {
        let mut rng = Xoshiro256Plus::seed_from_u64(13);
        let pos = Array::random_using((25, 2), Uniform::new(0.5, 2.5), &mut rng);
        let neg = Array::random_using((25, 2), Uniform::new(-2.5, -0.5), &mut rng);
        let x = concatenate![Axis(0), pos, neg];
        let y = concatenate![Axis(0), Array1::ones(25), Array1::zeros(25)];
        let dataset = Dataset::new(x, y.clone());

        let model = PenalizedRegression::logistic_lasso()
            .lambda1(5.0)
            .max_iterations(20000)
            .fit(&dataset)
            .unwrap();
        assert_eq!(model.kind(), PenaltyKind::LogisticLasso);
        assert!(model.is_converged());
        assert_eq!(model.status(), FitStatus::Converged);

        let proba = model.predict(&dataset);
        assert!(proba.iter().all(|p| *p > 0.0 && *p < 1.0));
        let correct = proba
            .iter()
            .zip(y.iter())
            .filter(|(p, y)| (**p > 0.5) == (**y == 1.0))
            .count();
        assert!(correct >= 45);
    }

    #[test]
    fn logistic_lasso_rejects_non_binary_targets() {
        let dataset = Dataset::new(array![[1.0], [2.0], [3.0]], array![0.0, 1.0, 2.0]);
        let res = PenalizedRegression::logistic_lasso().fit(&dataset);
        assert!(matches!(res, Err(PenRegError::NonBinaryTargets)));
    }

    #[test]
    fn invalid_params_are_rejected_on_fit() {
        let dataset = Dataset::new(array![[1.0], [2.0]], array![1.0, 2.0]);
        let res = PenalizedRegression::lasso().lambda1(-1.0).fit(&dataset);
        assert!(matches!(res, Err(PenRegError::InvalidLambda1(_))));
    }

    #[test]
    fn initial_beta_must_match_features() {
        let dataset = Dataset::new(array![[1.0, 0.0], [0.0, 1.0]], array![1.0, 2.0]);
        let res = PenalizedRegression::lasso()
            .initial_beta(array![1.0, 2.0, 3.0])
            .fit(&dataset);
        assert!(matches!(
            res,
            Err(PenRegError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn zero_solver_budget_keeps_initial_beta() {
        let dataset = Dataset::new(
            array![[1.0, 2.0], [3.0, 1.0], [0.5, -1.0]],
            array![1.0, 2.0, 3.0],
        );
        let model = PenalizedRegression::fused_lasso()
            .lambda1(0.5)
            .lambda2(0.5)
            .max_cg_iterations(0)
            .initial_beta(array![0.25, -0.5])
            .fit(&dataset)
            .unwrap();
        assert_eq!(model.status(), FitStatus::SolverNotConverged);
        assert!(!model.is_converged());
        assert_eq!(model.hyperplane(), &array![0.25, -0.5]);
    }
}
