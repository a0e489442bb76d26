//! # ocpqp
//!
//! Structured interior-point solver for optimal control problem (OCP) quadratic programs:
//!
//! ```text
//!   min  sum_i 0.5 [u_i; x_i]' [R_i S_i; S_i' Q_i] [u_i; x_i] + r_i' u_i + q_i' x_i
//!   s.t. x_{i+1} = A_i x_i + B_i u_i + b_i,            i = 0..N-1
//!        lb_i <= [u_i; x_i][idxb_i] <= ub_i,            i = 0..N
//!        lg_i <= D_i u_i + C_i x_i <= ug_i,             i = 0..N
//! ```
//!
//! with optional soft constraints. The KKT system of every interior-point iteration is
//! factorized by a backward Riccati recursion, and the factorization retained after a solve
//! is reused to propagate forward sensitivities of the solution with respect to perturbations
//! ("seeds") of the problem data.

use derive_more::Display;
use serde::{Deserialize, Serialize};

pub type E = f64;
pub type I = usize;

pub mod callback;
pub mod dim;
pub mod error;
pub mod field;
pub mod ipm;
pub mod linalg;
pub mod options;
pub mod qp;
pub mod res;
pub mod seed;
pub mod sol;

#[cfg(test)]
mod tests;

pub use dim::{OcpQpDim, OcpQpDimBuilder, StageDim};
pub use error::OcpQpError;
pub use field::StageRange;
pub use ipm::OcpQpIpm;
pub use options::{OptionValue, SolverMode, SolverOptions, WarmStart};
pub use qp::OcpQp;
pub use res::OcpQpRes;
pub use seed::OcpQpSeed;
pub use sol::OcpQpSol;

/// Termination status of an interior-point solve.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[display("success")]
    Success,
    #[display("maximum number of iterations reached")]
    MaxIterations,
    #[display("minimum step length reached")]
    MinStep,
    #[display("NaN in the iterate")]
    NanSolution,
    #[display("factorization failure")]
    FactorizationFailure,
}

impl Status {
    /// Numeric status code exposed to the binding layer.
    pub fn code(&self) -> i64 {
        match self {
            Status::Success => 0,
            Status::MaxIterations => 1,
            Status::MinStep => 2,
            Status::NanSolution => 3,
            Status::FactorizationFailure => 4,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == Status::Success
    }
}
