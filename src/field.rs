//! # Field addressing
//!
//! Every container exposes a string-keyed `set`/`get` pair addressed by a field name and a stage
//! index or inclusive stage range. Each field name resolves to an entry of a static dispatch table
//! that records where its values live and which stage bound applies:
//!
//! - [`StageBound::Horizon`]: stages `0..=N`, used by every stage-local field;
//! - [`StageBound::Transition`]: stages `0..=N-1`, used by the fields attached to the dynamics
//!   linking stage `i` to `i + 1` (`A`, `B`, `b`, `pi`, `seed_b`, `res_b`).
//!
//! Ranges broadcast a single value to every stage they cover. Ranges are validated in full,
//! including the per-stage value length, before the first write.

use std::ops::{Range, RangeInclusive};

use faer::Col;

use crate::E;
use crate::dim::{OcpQpDim, StageDim};
use crate::error::{OcpQpError, RangeEnd};

/// Legal stage indices of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageBound {
    Horizon,
    Transition,
}

impl StageBound {
    /// Largest legal index for a horizon of length `n`; `-1` when no index is legal.
    pub fn upper(&self, n: usize) -> isize {
        match self {
            StageBound::Horizon => n as isize,
            StageBound::Transition => n as isize - 1,
        }
    }
}

/// Inclusive stage range as supplied by callers: `end` missing or smaller than `start` selects the
/// single stage `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageRange {
    start: isize,
    end: Option<isize>,
}

impl StageRange {
    pub fn new(start: isize, end: Option<isize>) -> Self {
        Self { start, end }
    }

    pub fn single(stage: isize) -> Self {
        Self::new(stage, None)
    }

    pub fn resolve(
        &self,
        field: &str,
        bound: StageBound,
        horizon: usize,
    ) -> Result<RangeInclusive<usize>, OcpQpError> {
        let upper = bound.upper(horizon);
        let out_of_range = |end, index| OcpQpError::StageOutOfRange {
            field: field.to_string(),
            end,
            index,
            upper,
        };

        if self.start < 0 || self.start > upper {
            return Err(out_of_range(RangeEnd::Start, self.start));
        }
        let end = match self.end {
            Some(end) if end > self.start => {
                if end > upper {
                    return Err(out_of_range(RangeEnd::End, end));
                }
                end
            }
            _ => self.start,
        };
        Ok(self.start as usize..=end as usize)
    }
}

/// The four per-stage vector blocks of the KKT system.
///
/// For solutions these hold the primal vector `[u; x; sl; su]`, the transition duals `pi`, the
/// inequality multipliers `lam` and the inequality slacks `t`. Seeds and residuals index the same
/// blocks by the KKT rows they perturb: stationarity, dynamics, inequality and complementarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Block {
    Primal,
    Transition,
    Multiplier,
    Slack,
}

/// Sub-range of a block.
///
/// Inequality blocks are ordered `[lbu, lbx | lg | ubu, ubx | ug | ls | us]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    U,
    X,
    Sl,
    Su,
    Transition,
    Lb,
    Lbu,
    Lbx,
    Lg,
    Ub,
    Ubu,
    Ubx,
    Ug,
    Ls,
    Us,
}

impl Segment {
    pub(crate) fn locate(&self, dim: &StageDim, nx_next: usize) -> Range<usize> {
        let nb = dim.nb();
        let (offset, len) = match self {
            Segment::U => (0, dim.nu),
            Segment::X => (dim.nu, dim.nx),
            Segment::Sl => (dim.nux(), dim.ns),
            Segment::Su => (dim.nux() + dim.ns, dim.ns),
            Segment::Transition => (0, nx_next),
            Segment::Lb => (0, nb),
            Segment::Lbu => (0, dim.nbu),
            Segment::Lbx => (dim.nbu, dim.nbx),
            Segment::Lg => (nb, dim.ng),
            Segment::Ub => (nb + dim.ng, nb),
            Segment::Ubu => (nb + dim.ng, dim.nbu),
            Segment::Ubx => (nb + dim.ng + dim.nbu, dim.nbx),
            Segment::Ug => (2 * nb + dim.ng, dim.ng),
            Segment::Ls => (2 * nb + 2 * dim.ng, dim.ns),
            Segment::Us => (2 * nb + 2 * dim.ng + dim.ns, dim.ns),
        };
        offset..offset + len
    }
}

/// Dispatch-table entry of a vector-valued field.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VectorField {
    pub name: &'static str,
    pub block: Block,
    pub segment: Segment,
    pub bound: StageBound,
}

impl VectorField {
    pub const fn new(name: &'static str, block: Block, segment: Segment) -> Self {
        let bound = match segment {
            Segment::Transition => StageBound::Transition,
            _ => StageBound::Horizon,
        };
        Self {
            name,
            block,
            segment,
            bound,
        }
    }
}

pub(crate) fn lookup<'t>(
    table: &'t [VectorField],
    container: &'static str,
    name: &str,
) -> Result<&'t VectorField, OcpQpError> {
    table
        .iter()
        .find(|f| f.name == name)
        .ok_or_else(|| OcpQpError::UnknownField {
            container,
            field: name.to_string(),
        })
}

/// Per-stage storage made of the four KKT blocks.
pub(crate) trait StageBlocks {
    fn block(&self, block: Block) -> &Col<E>;
    fn block_mut(&mut self, block: Block) -> &mut Col<E>;
}

pub(crate) fn set_vector<S: StageBlocks>(
    stages: &mut [S],
    dim: &OcpQpDim,
    field: &VectorField,
    range: StageRange,
    values: &[E],
) -> Result<(), OcpQpError> {
    let targets = range.resolve(field.name, field.bound, dim.horizon())?;

    for stage in targets.clone() {
        let slot = field.segment.locate(dim.at(stage), dim.nx_next(stage));
        if slot.len() != values.len() {
            return Err(OcpQpError::ShapeMismatch {
                field: field.name.to_string(),
                stage,
                expected: slot.len(),
                found: values.len(),
            });
        }
    }

    for stage in targets {
        let slot = field.segment.locate(dim.at(stage), dim.nx_next(stage));
        let col = stages[stage].block_mut(field.block);
        for (k, value) in slot.zip(values) {
            col[k] = *value;
        }
    }
    Ok(())
}

pub(crate) fn get_vector<S: StageBlocks>(
    stages: &[S],
    dim: &OcpQpDim,
    field: &VectorField,
    stage: isize,
) -> Result<Vec<E>, OcpQpError> {
    let stage = *StageRange::single(stage)
        .resolve(field.name, field.bound, dim.horizon())?
        .start();
    let slot = field.segment.locate(dim.at(stage), dim.nx_next(stage));
    let col = stages[stage].block(field.block);
    Ok(slot.map(|k| col[k]).collect())
}

pub(crate) fn vector_len(
    dim: &OcpQpDim,
    field: &VectorField,
    stage: isize,
) -> Result<usize, OcpQpError> {
    let stage = *StageRange::single(stage)
        .resolve(field.name, field.bound, dim.horizon())?
        .start();
    Ok(field.segment.locate(dim.at(stage), dim.nx_next(stage)).len())
}
