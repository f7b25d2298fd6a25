//! Finite difference Jacobian computation.

use crate::error::SolverResult;
use nalgebra::{DMatrix, DVector};

/// Forward finite-difference Jacobian of `f` at `x`.
///
/// Column `j` holds `(f(x + dx_j e_j) - f(x)) / dx_j` with
/// `dx_j = epsilon * max(|x[j]|, 1)`.
pub fn finite_difference_jacobian<F>(
    x: &DVector<f64>,
    f: F,
    epsilon: f64,
) -> SolverResult<DMatrix<f64>>
where
    F: Fn(&DVector<f64>) -> SolverResult<DVector<f64>>,
{
    let f_x = f(x)?;
    let mut jac = DMatrix::zeros(f_x.len(), x.len());

    // one scratch vector, perturbed and restored per column
    let mut x_shift = x.clone();
    for j in 0..x.len() {
        let dx = epsilon * x[j].abs().max(1.0);
        x_shift[j] = x[j] + dx;
        let df = (f(&x_shift)? - &f_x) / dx;
        jac.column_mut(j).copy_from(&df);
        x_shift[j] = x[j];
    }

    Ok(jac)
}
