//! Implicit operators `(Penalty + XᵗX)` handed to the conjugate gradient
//!
//! Neither the Gram matrix `XᵗX` nor the penalty matrix is ever formed: the
//! data part is applied as `Xᵗ(Xv)` and the penalty part exploits its
//! diagonal or tridiagonal structure, so that one application costs
//! `O(n·p)`.

use linfa::Float;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis, Zip};

use crate::error::{PenRegError, Result};

/// A symmetric positive-definite operator known only through its action on vectors
pub trait LinearOperator<F: Float> {
    /// Number of rows (and columns) of the operator
    fn dim(&self) -> usize;

    /// Compute the product of the operator with `v`
    fn apply(&self, v: ArrayView1<F>) -> Result<Array1<F>>;

    /// Diagonal of the operator, used as Jacobi preconditioner when available
    fn diagonal(&self) -> Option<Array1<F>> {
        None
    }
}

/// Product of the symmetric tridiagonal matrix given by `main_diagonal` and
/// `off_diagonal` with `v`
///
/// `off_diagonal[i]` couples the entries `i` and `i + 1`, it is therefore one
/// element shorter than `main_diagonal` (or empty if there is a single row).
pub fn tridiagonal_mul<F: Float>(
    main_diagonal: ArrayView1<F>,
    off_diagonal: ArrayView1<F>,
    v: ArrayView1<F>,
) -> Result<Array1<F>> {
    let p = main_diagonal.len();
    PenRegError::check_len(p, v.len())?;
    PenRegError::check_len(p.saturating_sub(1), off_diagonal.len())?;

    let mut a = Array1::zeros(p);
    match p {
        0 => {}
        1 => a[0] = main_diagonal[0] * v[0],
        _ => {
            a[0] = main_diagonal[0] * v[0] + off_diagonal[0] * v[1];
            for i in 1..p - 1 {
                a[i] = off_diagonal[i - 1] * v[i - 1]
                    + main_diagonal[i] * v[i]
                    + off_diagonal[i] * v[i + 1];
            }
            a[p - 1] = off_diagonal[p - 2] * v[p - 2] + main_diagonal[p - 1] * v[p - 1];
        }
    }

    Ok(a)
}

/// Elementwise product of the diagonal `diagonal` with `v`
pub fn diagonal_mul<F: Float>(diagonal: ArrayView1<F>, v: ArrayView1<F>) -> Result<Array1<F>> {
    PenRegError::check_len(diagonal.len(), v.len())?;
    Ok(&diagonal * &v)
}

fn squared_column_norms<F: Float>(data: ArrayView2<F>) -> Array1<F> {
    data.map_axis(Axis(0), |col| col.dot(&col))
}

/// Operator `B + XᵗX` with `B` the tridiagonal fused lasso penalty matrix
pub struct FusedLassoMultiplicator<'a, F> {
    data: ArrayView2<'a, F>,
    main_diagonal: ArrayView1<'a, F>,
    off_diagonal: ArrayView1<'a, F>,
}

impl<'a, F: Float> FusedLassoMultiplicator<'a, F> {
    pub fn new(
        data: ArrayView2<'a, F>,
        main_diagonal: ArrayView1<'a, F>,
        off_diagonal: ArrayView1<'a, F>,
    ) -> Self {
        Self {
            data,
            main_diagonal,
            off_diagonal,
        }
    }

    /// Product of the penalty part alone with `v`
    pub fn tridiag_mul(&self, v: ArrayView1<F>) -> Result<Array1<F>> {
        tridiagonal_mul(self.main_diagonal, self.off_diagonal, v)
    }
}

impl<'a, F: Float> LinearOperator<F> for FusedLassoMultiplicator<'a, F> {
    fn dim(&self) -> usize {
        self.main_diagonal.len()
    }

    fn apply(&self, v: ArrayView1<F>) -> Result<Array1<F>> {
        PenRegError::check_len(self.data.ncols(), v.len())?;
        let mut a = self.tridiag_mul(v)?;
        a += &self.data.t().dot(&self.data.dot(&v));
        Ok(a)
    }

    fn diagonal(&self) -> Option<Array1<F>> {
        Some(&self.main_diagonal + &squared_column_norms(self.data))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scaling {
    Symmetric,
    None,
}

/// Operator for the lasso normal equations `(D + XᵗX)β = Xᵗy`, with
/// `D = diag(λ/|β_i|)` known through `S = D^{-1/2}`
///
/// The default form works in the scaled variables `u = S⁻¹β` and applies
/// `σ²I + S XᵗX S`. The system then reads `(σ²I + SXᵗXS)u = SXᵗy` and stays
/// well conditioned when some `|β_i|` are tiny, since `S` only multiplies.
/// [`unscaled`](Self::unscaled) builds the direct `D + XᵗX` form instead.
pub struct LassoMultiplicator<'a, F> {
    data: ArrayView2<'a, F>,
    sqrt_inv_penalty: ArrayView1<'a, F>,
    sigma2: F,
    scaling: Scaling,
}

impl<'a, F: Float> LassoMultiplicator<'a, F> {
    pub fn new(data: ArrayView2<'a, F>, sqrt_inv_penalty: ArrayView1<'a, F>, sigma2: F) -> Self {
        Self {
            data,
            sqrt_inv_penalty,
            sigma2,
            scaling: Scaling::Symmetric,
        }
    }

    pub fn unscaled(data: ArrayView2<'a, F>, sqrt_inv_penalty: ArrayView1<'a, F>) -> Self {
        Self {
            data,
            sqrt_inv_penalty,
            sigma2: F::one(),
            scaling: Scaling::None,
        }
    }

    /// Product of the diagonal penalty `D = S⁻²` with `v`
    pub fn penalty_mul(&self, v: ArrayView1<F>) -> Result<Array1<F>> {
        let penalty = self.sqrt_inv_penalty.mapv(|s| F::one() / (s * s));
        diagonal_mul(penalty.view(), v)
    }
}

impl<'a, F: Float> LinearOperator<F> for LassoMultiplicator<'a, F> {
    fn dim(&self) -> usize {
        self.sqrt_inv_penalty.len()
    }

    fn apply(&self, v: ArrayView1<F>) -> Result<Array1<F>> {
        PenRegError::check_len(self.data.ncols(), v.len())?;
        match self.scaling {
            Scaling::Symmetric => {
                let scaled = diagonal_mul(self.sqrt_inv_penalty, v)?;
                let gram = self.data.t().dot(&self.data.dot(&scaled));
                Ok(&v * self.sigma2 + &(&gram * &self.sqrt_inv_penalty))
            }
            Scaling::None => {
                let mut a = self.penalty_mul(v)?;
                a += &self.data.t().dot(&self.data.dot(&v));
                Ok(a)
            }
        }
    }

    fn diagonal(&self) -> Option<Array1<F>> {
        let norms = squared_column_norms(self.data);
        let diagonal = match self.scaling {
            Scaling::Symmetric => Zip::from(&self.sqrt_inv_penalty)
                .and(&norms)
                .map_collect(|&s, &norm| self.sigma2 + s * s * norm),
            Scaling::None => Zip::from(&self.sqrt_inv_penalty)
                .and(&norms)
                .map_collect(|&s, &norm| F::one() / (s * s) + norm),
        };
        Some(diagonal)
    }
}
