//! # Dense Cholesky factorization
//!
//! Small dense `L L'` factorization used for the per-stage blocks of the Riccati recursion, backed
//! by faer's in-place LLT. The factor storage and its scratch memory are kept between calls and
//! only reallocated when the dimension changes, so refactorizing the same block inside the
//! interior-point loop does not allocate.
//!
//! A pivot that is not strictly positive (or not finite) aborts the factorization with
//! [`LinearSolverError::NotPositiveDefinite`]; the caller decides whether to regularize and retry.
//!
//! ## Example Usage
//! ```
//! use faer::{Col, Mat};
//! use ocpqp::linalg::cholesky::DenseCholesky;
//! use ocpqp::linalg::solver::Solver;
//!
//! let mat = Mat::from_fn(2, 2, |i, j| if i == j { 2.0 } else { -1.0 });
//! let mut solver = DenseCholesky::new();
//! solver.factorize(mat.as_ref()).unwrap();
//! let x = solver.solve(Col::from_fn(2, |_| 1.0).as_ref()).unwrap();
//! assert!((x[0] - 1.0).abs() < 1e-14);
//! ```
use faer::dyn_stack::{MemBuffer, MemStack, StackReq};
use faer::linalg::cholesky::llt;
use faer::linalg::cholesky::llt::factor::LltRegularization;
use faer::{ColMut, Mat, MatMut, MatRef, Par};

use crate::E;
use crate::linalg::solver::{LinearSolver, LinearSolverError, Solver, TriangularFactor};

#[allow(non_snake_case)]
pub struct DenseCholesky {
    /// Lower triangular factor; the strict upper triangle stays zero.
    L: Mat<E>,
    mem: MemBuffer,
    factorized: bool,
}

impl Default for DenseCholesky {
    fn default() -> Self {
        Self::new()
    }
}

impl DenseCholesky {
    fn reserve(&mut self, dim: usize) -> Result<(), LinearSolverError> {
        if self.L.nrows() == dim {
            return Ok(());
        }
        self.mem = MemBuffer::try_new(llt::factor::cholesky_in_place_scratch::<E>(
            dim,
            Par::Seq,
            Default::default(),
        ))
        .map_err(|_| LinearSolverError::MemoryAllocation)?;
        self.L = Mat::zeros(dim, dim);
        Ok(())
    }
}

impl Solver for DenseCholesky {
    fn new() -> Self {
        Self {
            L: Mat::zeros(0, 0),
            mem: MemBuffer::new(StackReq::EMPTY),
            factorized: false,
        }
    }

    fn factorize(&mut self, mat: MatRef<'_, E>) -> Result<(), LinearSolverError> {
        let n = mat.nrows();
        if mat.ncols() != n {
            return Err(LinearSolverError::DimensionMismatch);
        }
        self.factorized = false;
        self.reserve(n)?;
        if n == 0 {
            self.factorized = true;
            return Ok(());
        }

        self.L.as_mut().copy_from_triangular_lower(mat);
        llt::factor::cholesky_in_place(
            self.L.as_mut(),
            LltRegularization::default(),
            Par::Seq,
            MemStack::new(&mut self.mem),
            Default::default(),
        )
        .map_err(|_| LinearSolverError::NotPositiveDefinite)?;
        for j in 1..n {
            self.L.as_mut().col_mut(j).subrows_mut(0, j).fill(0.);
        }

        self.factorized = true;
        Ok(())
    }

    fn solve_in_place(&self, b: ColMut<'_, E>) -> Result<(), LinearSolverError> {
        self.solve_mat_in_place(b.as_mat_mut())
    }

    fn solve_mat_in_place(&self, b: MatMut<'_, E>) -> Result<(), LinearSolverError> {
        if !self.factorized {
            return Err(LinearSolverError::Uninitialized);
        }
        if b.nrows() != self.dim() {
            return Err(LinearSolverError::DimensionMismatch);
        }
        // the triangular solves need no scratch
        llt::solve::solve_in_place(self.L.as_ref(), b, Par::Seq, MemStack::new(&mut []));
        Ok(())
    }

    fn dim(&self) -> usize {
        self.L.nrows()
    }
}

impl LinearSolver for DenseCholesky {}

impl TriangularFactor for DenseCholesky {
    fn factor(&self) -> Result<MatRef<'_, E>, LinearSolverError> {
        if self.factorized {
            Ok(self.L.as_ref())
        } else {
            Err(LinearSolverError::Uninitialized)
        }
    }
}

#[cfg(test)]
mod tests {
    use faer::Col;
    use rstest::rstest;

    use super::*;

    fn tridiagonal() -> Mat<E> {
        Mat::from_fn(3, 3, |i, j| match (i, j) {
            (0, 0) => 4.0,
            (1, 1) => 5.0,
            (2, 2) => 6.0,
            (0, 1) | (1, 0) => 2.0,
            (1, 2) | (2, 1) => 1.0,
            _ => 0.0,
        })
    }

    #[test]
    fn test_factor_reconstructs_matrix() {
        let mat = tridiagonal();
        let mut chol = DenseCholesky::new();
        chol.factorize(mat.as_ref()).unwrap();

        let l = chol.factor().unwrap();
        assert_eq!(l[(0, 1)], 0.0);
        assert_eq!(l[(1, 2)], 0.0);
        let product = l * l.transpose();
        assert!((&product - &mat).norm_max() < 1e-13);
    }

    #[test]
    fn test_reads_lower_triangle_only() {
        let mut mat = tridiagonal();
        mat[(0, 2)] = 100.0;
        let mut chol = DenseCholesky::new();
        chol.factorize(mat.as_ref()).unwrap();

        let l = chol.factor().unwrap();
        assert!((&(l * l.transpose()) - &tridiagonal()).norm_max() < 1e-13);
    }

    #[rstest]
    #[case(Mat::from_fn(2, 2, |i, j| if i == j { 1.0 } else { 2.0 }))]
    #[case(Mat::from_fn(2, 2, |i, j| if i == j { -1.0 } else { 0.0 }))]
    #[case(Mat::zeros(3, 3))]
    #[case(Mat::from_fn(2, 2, |i, j| if i == j { E::NAN } else { 0.0 }))]
    fn test_rejects_indefinite(#[case] mat: Mat<E>) {
        let mut chol = DenseCholesky::new();
        assert_eq!(
            chol.factorize(mat.as_ref()),
            Err(LinearSolverError::NotPositiveDefinite)
        );
        assert!(chol.factor().is_err());
    }

    #[test]
    fn test_empty_matrix() {
        let mut chol = DenseCholesky::new();
        chol.factorize(Mat::<E>::zeros(0, 0).as_ref()).unwrap();
        let mut b = Col::<E>::zeros(0);
        chol.solve_in_place(b.as_mut()).unwrap();
        assert_eq!(b.nrows(), 0);
    }

    #[test]
    fn test_solve_before_factorize() {
        let chol = DenseCholesky::new();
        let mut b = Col::<E>::zeros(2);
        assert_eq!(
            chol.solve_in_place(b.as_mut()),
            Err(LinearSolverError::Uninitialized)
        );
    }
}
