//! # Solution Container
//!
//! Primal-dual iterate of an OCP QP, also used to return forward sensitivities. Per stage it
//! stores the primal vector `[u; x; sl; su]`, the inequality multipliers `lam` and slacks `t`
//! (both in the order `[lb, lg, ub, ug, ls, us]`) and, for transitions `0..N-1` only, the dynamics
//! multiplier `pi`.

use std::sync::Arc;

use faer::Col;

use crate::E;
use crate::dim::OcpQpDim;
use crate::error::OcpQpError;
use crate::field::{self, Block, Segment, StageBlocks, StageRange, VectorField};
use crate::linalg::vector_ops::axpy;

const FIELDS: &[VectorField] = &[
    VectorField::new("u", Block::Primal, Segment::U),
    VectorField::new("x", Block::Primal, Segment::X),
    VectorField::new("sl", Block::Primal, Segment::Sl),
    VectorField::new("su", Block::Primal, Segment::Su),
    VectorField::new("pi", Block::Transition, Segment::Transition),
    VectorField::new("lam_lb", Block::Multiplier, Segment::Lb),
    VectorField::new("lam_lbu", Block::Multiplier, Segment::Lbu),
    VectorField::new("lam_lbx", Block::Multiplier, Segment::Lbx),
    VectorField::new("lam_ub", Block::Multiplier, Segment::Ub),
    VectorField::new("lam_ubu", Block::Multiplier, Segment::Ubu),
    VectorField::new("lam_ubx", Block::Multiplier, Segment::Ubx),
    VectorField::new("lam_lg", Block::Multiplier, Segment::Lg),
    VectorField::new("lam_ug", Block::Multiplier, Segment::Ug),
    VectorField::new("lam_ls", Block::Multiplier, Segment::Ls),
    VectorField::new("lam_us", Block::Multiplier, Segment::Us),
    VectorField::new("t_lb", Block::Slack, Segment::Lb),
    VectorField::new("t_lbu", Block::Slack, Segment::Lbu),
    VectorField::new("t_lbx", Block::Slack, Segment::Lbx),
    VectorField::new("t_ub", Block::Slack, Segment::Ub),
    VectorField::new("t_ubu", Block::Slack, Segment::Ubu),
    VectorField::new("t_ubx", Block::Slack, Segment::Ubx),
    VectorField::new("t_lg", Block::Slack, Segment::Lg),
    VectorField::new("t_ug", Block::Slack, Segment::Ug),
    VectorField::new("t_ls", Block::Slack, Segment::Ls),
    VectorField::new("t_us", Block::Slack, Segment::Us),
];

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SolStage {
    pub v: Col<E>,
    pub pi: Col<E>,
    pub lam: Col<E>,
    pub t: Col<E>,
}

impl SolStage {
    pub fn copy_from(&mut self, other: &SolStage) {
        self.v.as_mut().copy_from(&other.v);
        self.pi.as_mut().copy_from(&other.pi);
        self.lam.as_mut().copy_from(&other.lam);
        self.t.as_mut().copy_from(&other.t);
    }

    /// `self += alpha * step` on the primal part and `self += alpha_dual * step` on the duals.
    pub fn step(&mut self, step: &SolStage, alpha_prim: E, alpha_dual: E) {
        axpy(alpha_prim, step.v.as_ref(), self.v.as_mut());
        axpy(alpha_prim, step.t.as_ref(), self.t.as_mut());
        axpy(alpha_dual, step.pi.as_ref(), self.pi.as_mut());
        axpy(alpha_dual, step.lam.as_ref(), self.lam.as_mut());
    }
}

impl StageBlocks for SolStage {
    fn block(&self, block: Block) -> &Col<E> {
        match block {
            Block::Primal => &self.v,
            Block::Transition => &self.pi,
            Block::Multiplier => &self.lam,
            Block::Slack => &self.t,
        }
    }

    fn block_mut(&mut self, block: Block) -> &mut Col<E> {
        match block {
            Block::Primal => &mut self.v,
            Block::Transition => &mut self.pi,
            Block::Multiplier => &mut self.lam,
            Block::Slack => &mut self.t,
        }
    }
}

/// Solution (or sensitivity) of a multistage QP sized from a shared [`OcpQpDim`].
#[derive(Debug, Clone, PartialEq)]
pub struct OcpQpSol {
    dim: Arc<OcpQpDim>,
    pub(crate) stages: Vec<SolStage>,
}

impl OcpQpSol {
    pub fn new(dim: Arc<OcpQpDim>) -> Self {
        let stages = zero_stages(&dim);
        Self { dim, stages }
    }

    pub fn dim(&self) -> &Arc<OcpQpDim> {
        &self.dim
    }

    pub fn set_zero(&mut self) {
        self.stages = zero_stages(&self.dim);
    }

    pub fn field_shape(&self, field: &str, stage: isize) -> Result<(usize, usize), OcpQpError> {
        let entry = field::lookup(FIELDS, "solution", field)?;
        Ok((field::vector_len(&self.dim, entry, stage)?, 1))
    }

    /// Copies `values` into `field` on every stage of `[start, end]`.
    pub fn set(
        &mut self,
        field: &str,
        start: isize,
        end: Option<isize>,
        values: &[E],
    ) -> Result<(), OcpQpError> {
        let entry = field::lookup(FIELDS, "solution", field)?;
        field::set_vector(
            &mut self.stages,
            &self.dim,
            entry,
            StageRange::new(start, end),
            values,
        )
    }

    pub fn get(&self, field: &str, stage: isize) -> Result<Vec<E>, OcpQpError> {
        let entry = field::lookup(FIELDS, "solution", field)?;
        field::get_vector(&self.stages, &self.dim, entry, stage)
    }

    /// Controls of every stage, `u_0..u_N`.
    pub fn controls(&self) -> Vec<Vec<E>> {
        self.collect("u")
    }

    /// States of every stage, `x_0..x_N`.
    pub fn states(&self) -> Vec<Vec<E>> {
        self.collect("x")
    }

    fn collect(&self, field: &str) -> Vec<Vec<E>> {
        (0..=self.dim.horizon())
            .filter_map(|i| self.get(field, i as isize).ok())
            .collect()
    }

    pub(crate) fn check_dim(&self, dim: &OcpQpDim) -> Result<(), OcpQpError> {
        if *self.dim != *dim {
            return Err(OcpQpError::DescriptorMismatch {
                container: "solution",
            });
        }
        Ok(())
    }
}

pub(crate) fn zero_stages(dim: &OcpQpDim) -> Vec<SolStage> {
    (0..=dim.horizon())
        .map(|i| {
            let d = dim.at(i);
            SolStage {
                v: Col::zeros(d.nv()),
                pi: Col::zeros(dim.nx_next(i)),
                lam: Col::zeros(d.nc()),
                t: Col::zeros(d.nc()),
            }
        })
        .collect()
}
