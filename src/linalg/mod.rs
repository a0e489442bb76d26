pub mod cholesky;
pub mod solver;
pub(crate) mod vector_ops;
