use derive_more::{Display, Error};

/// Which end of a stage range failed validation.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum RangeEnd {
    #[display("start")]
    Start,
    #[display("end")]
    End,
}

/// Validation failures raised by the descriptor, the containers and the engine.
///
/// Every variant is detected before any value is written, so a failed call leaves the target
/// untouched.
#[derive(Debug, Display, Error, PartialEq)]
pub enum OcpQpError {
    #[display("unknown field `{field}` for {container}")]
    UnknownField {
        container: &'static str,
        field: String,
    },

    #[display("field `{field}`: {end} stage index {index} outside the legal range [0, {upper}]")]
    StageOutOfRange {
        field: String,
        end: RangeEnd,
        index: isize,
        upper: isize,
    },

    #[display("dimension `{field}` at stage {stage} must be non-negative, got {value}")]
    NegativeDimension {
        field: String,
        stage: isize,
        value: isize,
    },

    #[display("inconsistent dimensions at stage {stage}: {reason}")]
    InconsistentDimension { stage: usize, reason: String },

    #[display("field `{field}` at stage {stage}: expected {expected} values, got {found}")]
    ShapeMismatch {
        field: String,
        stage: usize,
        expected: usize,
        found: usize,
    },

    #[display("field `{field}` at stage {stage}: invalid index value {value} (must be an integer in [0, {limit}))")]
    InvalidIndex {
        field: String,
        stage: usize,
        value: f64,
        limit: usize,
    },

    #[display("{container} was built for a different dimension descriptor")]
    DescriptorMismatch { container: &'static str },

    #[display("invalid value for option `{name}`: {reason}")]
    InvalidOption { name: String, reason: String },

    #[display("unknown option `{name}`")]
    UnknownOption { name: String },

    #[display("unknown diagnostic `{name}`")]
    UnknownDiagnostic { name: String },

    #[display("no factorization is available, solve a QP first")]
    MissingFactorization,

    #[display("the retained factorization belongs to a different or modified QP")]
    StaleFactorization,
}
