//! # Seed Container
//!
//! Perturbation direction of the QP data used by forward sensitivity propagation. Every element
//! defaults to zero. Seeds address the linear cost terms, the dynamics offset (transitions only),
//! every bound and the complementarity rows (`seed_m_*`, a perturbation of `lam .* t`). They are
//! stored in the row blocks of the KKT system they perturb.

use std::sync::Arc;

use crate::E;
use crate::dim::OcpQpDim;
use crate::error::OcpQpError;
use crate::field::{self, Block, Segment, StageRange, VectorField};
use crate::res::{self, ResStage};

const FIELDS: &[VectorField] = &[
    VectorField::new("seed_r", Block::Primal, Segment::U),
    VectorField::new("seed_q", Block::Primal, Segment::X),
    VectorField::new("seed_zl", Block::Primal, Segment::Sl),
    VectorField::new("seed_zu", Block::Primal, Segment::Su),
    VectorField::new("seed_b", Block::Transition, Segment::Transition),
    VectorField::new("seed_lb", Block::Multiplier, Segment::Lb),
    VectorField::new("seed_lbu", Block::Multiplier, Segment::Lbu),
    VectorField::new("seed_lbx", Block::Multiplier, Segment::Lbx),
    VectorField::new("seed_ub", Block::Multiplier, Segment::Ub),
    VectorField::new("seed_ubu", Block::Multiplier, Segment::Ubu),
    VectorField::new("seed_ubx", Block::Multiplier, Segment::Ubx),
    VectorField::new("seed_lg", Block::Multiplier, Segment::Lg),
    VectorField::new("seed_ug", Block::Multiplier, Segment::Ug),
    VectorField::new("seed_ls", Block::Multiplier, Segment::Ls),
    VectorField::new("seed_us", Block::Multiplier, Segment::Us),
    VectorField::new("seed_m_lb", Block::Slack, Segment::Lb),
    VectorField::new("seed_m_ub", Block::Slack, Segment::Ub),
    VectorField::new("seed_m_lg", Block::Slack, Segment::Lg),
    VectorField::new("seed_m_ug", Block::Slack, Segment::Ug),
    VectorField::new("seed_m_ls", Block::Slack, Segment::Ls),
    VectorField::new("seed_m_us", Block::Slack, Segment::Us),
];

/// Seed of a multistage QP sized from a shared [`OcpQpDim`].
#[derive(Debug, Clone, PartialEq)]
pub struct OcpQpSeed {
    dim: Arc<OcpQpDim>,
    stages: Vec<ResStage>,
}

impl OcpQpSeed {
    pub fn new(dim: Arc<OcpQpDim>) -> Self {
        let stages = res::zero_stages(&dim);
        Self { dim, stages }
    }

    pub fn dim(&self) -> &Arc<OcpQpDim> {
        &self.dim
    }

    pub fn set_zero(&mut self) {
        self.stages = res::zero_stages(&self.dim);
    }

    pub fn field_shape(&self, field: &str, stage: isize) -> Result<(usize, usize), OcpQpError> {
        let entry = field::lookup(FIELDS, "seed", field)?;
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
        let entry = field::lookup(FIELDS, "seed", field)?;
        field::set_vector(
            &mut self.stages,
            &self.dim,
            entry,
            StageRange::new(start, end),
            values,
        )
    }

    pub fn get(&self, field: &str, stage: isize) -> Result<Vec<E>, OcpQpError> {
        let entry = field::lookup(FIELDS, "seed", field)?;
        field::get_vector(&self.stages, &self.dim, entry, stage)
    }

    pub(crate) fn check_dim(&self, dim: &OcpQpDim) -> Result<(), OcpQpError> {
        if *self.dim != *dim {
            return Err(OcpQpError::DescriptorMismatch { container: "seed" });
        }
        Ok(())
    }

    /// Writes the derivative of the KKT residuals along the seed into `dir`.
    ///
    /// Lower bounds enter the inequality rows as `-lb`, upper bounds as `+ub`. Complementarity
    /// seeds are passed through unchanged.
    pub(crate) fn load_direction(&self, dir: &mut [ResStage]) {
        for (i, (s, out)) in self.stages.iter().zip(dir.iter_mut()).enumerate() {
            let d = self.dim.at(i);
            let upper = Segment::Ub.locate(d, 0).start..Segment::Ls.locate(d, 0).start;
            out.g.as_mut().copy_from(&s.g);
            out.b.as_mut().copy_from(&s.b);
            out.m.as_mut().copy_from(&s.m);
            for k in 0..s.d.nrows() {
                out.d[k] = if upper.contains(&k) { s.d[k] } else { -s.d[k] };
            }
        }
    }
}
