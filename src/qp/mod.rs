//! # QP Data Container
//!
//! Per-stage data of an OCP QP. Dynamics (`A`, `B`, `b`) exist for the transitions `0..N-1`,
//! cost and constraint data for every stage `0..N`:
//!
//! ```text
//! min  0.5 u'Ru + u'Sx + 0.5 x'Qx + r'u + q'x + 0.5 sl'Zl sl + zl'sl + 0.5 su'Zu su + zu'su
//! s.t. x+ = A x + B u + b
//!      lb - sl <= [u; x][idxb] <= ub + su     (softened entries only carry a slack)
//!      lg - sl <= D u + C x    <= ug + su
//!      sl >= lls, su >= lus
//! ```
//!
//! Matrices cross the string-keyed interface flattened column-major. Every successful write bumps
//! the container's revision, which lets the engine detect that a retained factorization no longer
//! matches the data.

pub(crate) mod kkt;

use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use faer::{Col, Mat};

use crate::dim::{OcpQpDim, StageDim};
use crate::error::OcpQpError;
use crate::field::{StageBound, StageRange};
use crate::{E, I};

static NEXT_QP_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QpField {
    A,
    B,
    BVec,
    Q,
    S,
    R,
    QVec,
    RVec,
    ZlMat,
    ZuMat,
    ZlVec,
    ZuVec,
    Idxbu,
    Idxbx,
    Idxs,
    Lb,
    Lbu,
    Lbx,
    Ub,
    Ubu,
    Ubx,
    C,
    D,
    Lg,
    Ug,
    Lls,
    Lus,
}

impl FromStr for QpField {
    type Err = OcpQpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "A" => QpField::A,
            "B" => QpField::B,
            "b" => QpField::BVec,
            "Q" => QpField::Q,
            "S" => QpField::S,
            "R" => QpField::R,
            "q" => QpField::QVec,
            "r" => QpField::RVec,
            "Zl" => QpField::ZlMat,
            "Zu" => QpField::ZuMat,
            "zl" => QpField::ZlVec,
            "zu" => QpField::ZuVec,
            "idxbu" => QpField::Idxbu,
            "idxbx" => QpField::Idxbx,
            "idxs" => QpField::Idxs,
            "lb" => QpField::Lb,
            "lbu" => QpField::Lbu,
            "lbx" => QpField::Lbx,
            "ub" => QpField::Ub,
            "ubu" => QpField::Ubu,
            "ubx" => QpField::Ubx,
            "C" => QpField::C,
            "D" => QpField::D,
            "lg" => QpField::Lg,
            "ug" => QpField::Ug,
            "lls" => QpField::Lls,
            "lus" => QpField::Lus,
            _ => {
                return Err(OcpQpError::UnknownField {
                    container: "QP data",
                    field: s.to_string(),
                });
            }
        })
    }
}

impl QpField {
    fn bound(&self) -> StageBound {
        match self {
            QpField::A | QpField::B | QpField::BVec => StageBound::Transition,
            _ => StageBound::Horizon,
        }
    }

    /// `(rows, cols)` of the field at a stage.
    fn shape(&self, dim: &StageDim, nx_next: usize) -> (usize, usize) {
        match self {
            QpField::A => (nx_next, dim.nx),
            QpField::B => (nx_next, dim.nu),
            QpField::BVec => (nx_next, 1),
            QpField::Q => (dim.nx, dim.nx),
            QpField::S => (dim.nu, dim.nx),
            QpField::R => (dim.nu, dim.nu),
            QpField::QVec => (dim.nx, 1),
            QpField::RVec => (dim.nu, 1),
            QpField::ZlMat
            | QpField::ZuMat
            | QpField::ZlVec
            | QpField::ZuVec
            | QpField::Idxs
            | QpField::Lls
            | QpField::Lus => (dim.ns, 1),
            QpField::Idxbu | QpField::Lbu | QpField::Ubu => (dim.nbu, 1),
            QpField::Idxbx | QpField::Lbx | QpField::Ubx => (dim.nbx, 1),
            QpField::Lb | QpField::Ub => (dim.nb(), 1),
            QpField::C => (dim.ng, dim.nx),
            QpField::D => (dim.ng, dim.nu),
            QpField::Lg | QpField::Ug => (dim.ng, 1),
        }
    }

    /// Exclusive upper limit of the values of an index field.
    fn index_limit(&self, dim: &StageDim) -> Option<usize> {
        match self {
            QpField::Idxbu => Some(dim.nu),
            QpField::Idxbx => Some(dim.nx),
            QpField::Idxs => Some(dim.nb() + dim.ng),
            _ => None,
        }
    }
}

/// Data of a single stage.
#[allow(non_snake_case)]
#[derive(Debug, Clone)]
pub(crate) struct QpStage {
    pub A: Mat<E>,
    pub B: Mat<E>,
    pub b: Col<E>,
    pub Q: Mat<E>,
    pub S: Mat<E>,
    pub R: Mat<E>,
    pub q: Col<E>,
    pub r: Col<E>,
    pub Zl: Col<E>,
    pub Zu: Col<E>,
    pub zl: Col<E>,
    pub zu: Col<E>,
    /// Positions in `[u; x]` of the box constraints, `idxbu` first.
    pub idxb: Vec<I>,
    pub lb: Col<E>,
    pub ub: Col<E>,
    pub C: Mat<E>,
    pub D: Mat<E>,
    pub lg: Col<E>,
    pub ug: Col<E>,
    /// Constraint (in `0..nb + ng`) softened by each slack pair.
    pub idxs: Vec<I>,
    pub lls: Col<E>,
    pub lus: Col<E>,
}

impl QpStage {
    fn zeros(dim: &StageDim, nx_next: usize) -> Self {
        let idxb = (0..dim.nbu).chain((0..dim.nbx).map(|j| dim.nu + j)).collect();
        Self {
            A: Mat::zeros(nx_next, dim.nx),
            B: Mat::zeros(nx_next, dim.nu),
            b: Col::zeros(nx_next),
            Q: Mat::zeros(dim.nx, dim.nx),
            S: Mat::zeros(dim.nu, dim.nx),
            R: Mat::zeros(dim.nu, dim.nu),
            q: Col::zeros(dim.nx),
            r: Col::zeros(dim.nu),
            Zl: Col::zeros(dim.ns),
            Zu: Col::zeros(dim.ns),
            zl: Col::zeros(dim.ns),
            zu: Col::zeros(dim.ns),
            idxb,
            lb: Col::zeros(dim.nb()),
            ub: Col::zeros(dim.nb()),
            C: Mat::zeros(dim.ng, dim.nx),
            D: Mat::zeros(dim.ng, dim.nu),
            lg: Col::zeros(dim.ng),
            ug: Col::zeros(dim.ng),
            idxs: (0..dim.ns).collect(),
            lls: Col::zeros(dim.ns),
            lus: Col::zeros(dim.ns),
        }
    }
}

/// Identity of a QP container at a given revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QpTag {
    pub id: u64,
    pub revision: u64,
}

/// Multistage QP data sized from a shared [`OcpQpDim`].
#[derive(Debug)]
pub struct OcpQp {
    dim: Arc<OcpQpDim>,
    stages: Vec<QpStage>,
    id: u64,
    revision: u64,
}

impl Clone for OcpQp {
    /// The copy is a distinct QP and gets a fresh identity.
    fn clone(&self) -> Self {
        Self {
            dim: self.dim.clone(),
            stages: self.stages.clone(),
            id: NEXT_QP_ID.fetch_add(1, Ordering::Relaxed),
            revision: 0,
        }
    }
}

impl OcpQp {
    /// Zero-initialized QP; box constraints default to `idxbu = 0..nbu`, `idxbx = 0..nbx`, soft
    /// constraints to `idxs = 0..ns`.
    pub fn new(dim: Arc<OcpQpDim>) -> Self {
        let stages = (0..=dim.horizon())
            .map(|i| QpStage::zeros(dim.at(i), dim.nx_next(i)))
            .collect();
        Self {
            dim,
            stages,
            id: NEXT_QP_ID.fetch_add(1, Ordering::Relaxed),
            revision: 0,
        }
    }

    pub fn dim(&self) -> &Arc<OcpQpDim> {
        &self.dim
    }

    pub fn horizon(&self) -> usize {
        self.dim.horizon()
    }

    pub(crate) fn stage(&self, stage: usize) -> &QpStage {
        &self.stages[stage]
    }

    pub(crate) fn tag(&self) -> QpTag {
        QpTag {
            id: self.id,
            revision: self.revision,
        }
    }

    /// Resets every stage to the data of [`OcpQp::new`].
    pub fn set_zero(&mut self) {
        for (i, stage) in self.stages.iter_mut().enumerate() {
            *stage = QpStage::zeros(self.dim.at(i), self.dim.nx_next(i));
        }
        self.revision += 1;
    }

    /// `(rows, cols)` of `field` at `stage`.
    pub fn field_shape(&self, field: &str, stage: isize) -> Result<(usize, usize), OcpQpError> {
        let key = QpField::from_str(field)?;
        let stage = *StageRange::single(stage)
            .resolve(field, key.bound(), self.horizon())?
            .start();
        Ok(key.shape(self.dim.at(stage), self.dim.nx_next(stage)))
    }

    /// Copies `values` (column-major) into `field` on every stage of `[start, end]`.
    ///
    /// `end` missing or smaller than `start` addresses the single stage `start`. The whole range is
    /// validated before the first stage is written.
    pub fn set(
        &mut self,
        field: &str,
        start: isize,
        end: Option<isize>,
        values: &[E],
    ) -> Result<(), OcpQpError> {
        let key = QpField::from_str(field)?;
        let targets = StageRange::new(start, end).resolve(field, key.bound(), self.horizon())?;

        for stage in targets.clone() {
            let dim = self.dim.at(stage);
            let (rows, cols) = key.shape(dim, self.dim.nx_next(stage));
            if rows * cols != values.len() {
                return Err(OcpQpError::ShapeMismatch {
                    field: field.to_string(),
                    stage,
                    expected: rows * cols,
                    found: values.len(),
                });
            }
            if let Some(limit) = key.index_limit(dim) {
                if let Some(value) = values
                    .iter()
                    .find(|v| v.fract() != 0. || **v < 0. || **v >= limit as E)
                {
                    return Err(OcpQpError::InvalidIndex {
                        field: field.to_string(),
                        stage,
                        value: *value,
                        limit,
                    });
                }
                // two rows on the same entry
                if let Some(value) = values
                    .iter()
                    .enumerate()
                    .find_map(|(k, v)| values[..k].contains(v).then_some(*v))
                {
                    return Err(OcpQpError::InvalidIndex {
                        field: field.to_string(),
                        stage,
                        value,
                        limit,
                    });
                }
            }
        }

        for stage in targets {
            let dim = *self.dim.at(stage);
            let (rows, cols) = key.shape(&dim, self.dim.nx_next(stage));
            let mat = || Mat::from_fn(rows, cols, |i, j| values[i + j * rows]);
            let col = || Col::from_fn(rows, |i| values[i]);
            let st = &mut self.stages[stage];
            match key {
                QpField::A => st.A = mat(),
                QpField::B => st.B = mat(),
                QpField::BVec => st.b = col(),
                QpField::Q => st.Q = mat(),
                QpField::S => st.S = mat(),
                QpField::R => st.R = mat(),
                QpField::QVec => st.q = col(),
                QpField::RVec => st.r = col(),
                QpField::ZlMat => st.Zl = col(),
                QpField::ZuMat => st.Zu = col(),
                QpField::ZlVec => st.zl = col(),
                QpField::ZuVec => st.zu = col(),
                QpField::Idxbu => {
                    for (k, v) in values.iter().enumerate() {
                        st.idxb[k] = *v as I;
                    }
                }
                QpField::Idxbx => {
                    for (k, v) in values.iter().enumerate() {
                        st.idxb[dim.nbu + k] = dim.nu + *v as I;
                    }
                }
                QpField::Idxs => st.idxs = values.iter().map(|v| *v as I).collect(),
                QpField::Lb => st.lb = col(),
                QpField::Ub => st.ub = col(),
                QpField::Lbu => write_segment(&mut st.lb, 0, values),
                QpField::Lbx => write_segment(&mut st.lb, dim.nbu, values),
                QpField::Ubu => write_segment(&mut st.ub, 0, values),
                QpField::Ubx => write_segment(&mut st.ub, dim.nbu, values),
                QpField::C => st.C = mat(),
                QpField::D => st.D = mat(),
                QpField::Lg => st.lg = col(),
                QpField::Ug => st.ug = col(),
                QpField::Lls => st.lls = col(),
                QpField::Lus => st.lus = col(),
            }
        }
        self.revision += 1;
        Ok(())
    }

    /// Values of `field` at `stage`, flattened column-major.
    pub fn get(&self, field: &str, stage: isize) -> Result<Vec<E>, OcpQpError> {
        let key = QpField::from_str(field)?;
        let stage = *StageRange::single(stage)
            .resolve(field, key.bound(), self.horizon())?
            .start();
        let dim = self.dim.at(stage);
        let st = &self.stages[stage];

        let flat = |m: &Mat<E>| -> Vec<E> {
            (0..m.ncols())
                .flat_map(|j| (0..m.nrows()).map(move |i| (i, j)))
                .map(|(i, j)| m[(i, j)])
                .collect()
        };
        let vals = |c: &Col<E>| -> Vec<E> { (0..c.nrows()).map(|i| c[i]).collect() };
        let segment = |c: &Col<E>, offset: usize, len: usize| -> Vec<E> {
            (offset..offset + len).map(|i| c[i]).collect()
        };

        Ok(match key {
            QpField::A => flat(&st.A),
            QpField::B => flat(&st.B),
            QpField::BVec => vals(&st.b),
            QpField::Q => flat(&st.Q),
            QpField::S => flat(&st.S),
            QpField::R => flat(&st.R),
            QpField::QVec => vals(&st.q),
            QpField::RVec => vals(&st.r),
            QpField::ZlMat => vals(&st.Zl),
            QpField::ZuMat => vals(&st.Zu),
            QpField::ZlVec => vals(&st.zl),
            QpField::ZuVec => vals(&st.zu),
            QpField::Idxbu => st.idxb[..dim.nbu].iter().map(|k| *k as E).collect(),
            QpField::Idxbx => st.idxb[dim.nbu..]
                .iter()
                .map(|k| (*k - dim.nu) as E)
                .collect(),
            QpField::Idxs => st.idxs.iter().map(|k| *k as E).collect(),
            QpField::Lb => vals(&st.lb),
            QpField::Ub => vals(&st.ub),
            QpField::Lbu => segment(&st.lb, 0, dim.nbu),
            QpField::Lbx => segment(&st.lb, dim.nbu, dim.nbx),
            QpField::Ubu => segment(&st.ub, 0, dim.nbu),
            QpField::Ubx => segment(&st.ub, dim.nbu, dim.nbx),
            QpField::C => flat(&st.C),
            QpField::D => flat(&st.D),
            QpField::Lg => vals(&st.lg),
            QpField::Ug => vals(&st.ug),
            QpField::Lls => vals(&st.lls),
            QpField::Lus => vals(&st.lus),
        })
    }
}

fn write_segment(col: &mut Col<E>, offset: usize, values: &[E]) {
    for (k, v) in values.iter().enumerate() {
        col[offset + k] = *v;
    }
}
