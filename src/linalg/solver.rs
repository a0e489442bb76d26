use derive_more::{Display, Error};
use faer::{Col, ColMut, ColRef, MatMut, MatRef};

use crate::E;

#[derive(Debug, Display, Error, PartialEq)]
pub enum LinearSolverError {
    #[display("Matrix is not positive definite")]
    NotPositiveDefinite,

    #[display("Dimension mismatch")]
    DimensionMismatch,

    #[display("Memory allocation error")]
    MemoryAllocation,

    #[display("Uninitialized error")]
    Uninitialized,
}

/// Trait for dense symmetric positive definite solvers used by the stage-wise recursions.
///
/// Implementors must call `factorize` before solving systems. A failed factorization leaves the
/// solver uninitialized.
pub trait Solver {
    fn new() -> Self
    where
        Self: Sized;

    /// Performs the numeric factorization of the symmetric matrix `mat`. Only the lower triangle
    /// is read.
    fn factorize(&mut self, mat: MatRef<'_, E>) -> Result<(), LinearSolverError>;

    /// Solves the linear system in place for the right-hand side vector `b`.
    fn solve_in_place(&self, b: ColMut<'_, E>) -> Result<(), LinearSolverError>;

    /// Solves the linear system in place for every column of `b`.
    fn solve_mat_in_place(&self, b: MatMut<'_, E>) -> Result<(), LinearSolverError>;

    /// Solves the linear system for the given right-hand side and returns the solution.
    fn solve(&self, b: ColRef<'_, E>) -> Result<Col<E>, LinearSolverError> {
        let mut x = b.to_owned();
        self.solve_in_place(x.as_mut())?;
        Ok(x)
    }

    /// Dimension of the factorized matrix.
    fn dim(&self) -> usize;
}

pub trait LinearSolver: Solver {}

/// Solvers whose factorization is a lower triangular `L` with `M = L L'`.
pub trait TriangularFactor: LinearSolver {
    fn factor(&self) -> Result<MatRef<'_, E>, LinearSolverError>;
}

#[cfg(test)]
mod tests {
    use faer::Mat;
    use rstest::rstest;

    use super::*;
    use crate::linalg::cholesky::DenseCholesky;

    fn spd(n: usize) -> Mat<E> {
        // tridiagonal [-1 4 -1] plus a dense rank-one term
        Mat::from_fn(n, n, |i, j| {
            let band = if i == j {
                4.0
            } else if i.abs_diff(j) == 1 {
                -1.0
            } else {
                0.0
            };
            band + 0.1 * ((i + 1) * (j + 1)) as E / n as E
        })
    }

    #[rstest]
    fn test_dense_symsolver(
        #[values(1, 2, 5, 12)] n: usize,
        #[values(DenseCholesky::new())] mut solver: impl LinearSolver,
    ) {
        let mat = spd(n);
        solver.factorize(mat.as_ref()).unwrap();
        assert_eq!(solver.dim(), n);

        let rhs = Col::from_fn(n, |i| (i as E).sin() + 1.0);
        let x = solver.solve(rhs.as_ref()).unwrap();

        let residual = &rhs - &mat * &x;
        assert!(residual.norm_max() < 1e-12);
    }

    #[rstest]
    fn test_dense_symsolver_matrix_rhs(
        #[values(DenseCholesky::new())] mut solver: impl LinearSolver,
    ) {
        let n = 4;
        let mat = spd(n);
        solver.factorize(mat.as_ref()).unwrap();

        let rhs = Mat::from_fn(n, 3, |i, j| (i * 3 + j) as E);
        let mut x = rhs.clone();
        solver.solve_mat_in_place(x.as_mut()).unwrap();

        let residual = &rhs - &mat * &x;
        assert!(residual.norm_max() < 1e-12);
    }

    #[rstest]
    fn test_refactorize_with_new_dimension(
        #[values(DenseCholesky::new())] mut solver: impl LinearSolver,
    ) {
        solver.factorize(spd(5).as_ref()).unwrap();
        let mat = spd(2);
        solver.factorize(mat.as_ref()).unwrap();
        assert_eq!(solver.dim(), 2);

        let rhs = Col::from_fn(2, |i| i as E);
        let x = solver.solve(rhs.as_ref()).unwrap();
        assert!((&rhs - &mat * &x).norm_max() < 1e-12);
    }
}
