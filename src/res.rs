//! # KKT residuals
//!
//! For an iterate `(v, pi, lam, t)` the residuals of the optimality conditions are, per stage,
//!
//! ```text
//! res_g = H v + g - G' lam + [B' pi_i; A' pi_i; 0] - [0; pi_{i-1}; 0]   (stationarity)
//! res_b = A x_i + B u_i + b - x_{i+1}                                     (dynamics)
//! res_d = G v + h - t                                                     (inequalities)
//! res_m = lam .* t                                                        (complementarity)
//! ```
//!
//! and the duality measure is `mu = sum(lam' t) / nc` over the whole horizon.

use std::sync::Arc;

use faer::{Accum, Col};

use crate::E;
use crate::dim::OcpQpDim;
use crate::error::OcpQpError;
use crate::field::{self, Block, Segment, StageBlocks, VectorField};
use crate::linalg::vector_ops::{axpy, cwise_multiply, dot, mat_vec, norm_inf};
use crate::qp::OcpQp;
use crate::qp::kkt::StageModel;
use crate::sol::{OcpQpSol, SolStage};

const FIELDS: &[VectorField] = &[
    VectorField::new("res_r", Block::Primal, Segment::U),
    VectorField::new("res_q", Block::Primal, Segment::X),
    VectorField::new("res_ls", Block::Primal, Segment::Sl),
    VectorField::new("res_us", Block::Primal, Segment::Su),
    VectorField::new("res_b", Block::Transition, Segment::Transition),
    VectorField::new("res_d_lb", Block::Multiplier, Segment::Lb),
    VectorField::new("res_d_ub", Block::Multiplier, Segment::Ub),
    VectorField::new("res_d_lg", Block::Multiplier, Segment::Lg),
    VectorField::new("res_d_ug", Block::Multiplier, Segment::Ug),
    VectorField::new("res_d_ls", Block::Multiplier, Segment::Ls),
    VectorField::new("res_d_us", Block::Multiplier, Segment::Us),
    VectorField::new("res_m_lb", Block::Slack, Segment::Lb),
    VectorField::new("res_m_ub", Block::Slack, Segment::Ub),
    VectorField::new("res_m_lg", Block::Slack, Segment::Lg),
    VectorField::new("res_m_ug", Block::Slack, Segment::Ug),
    VectorField::new("res_m_ls", Block::Slack, Segment::Ls),
    VectorField::new("res_m_us", Block::Slack, Segment::Us),
];

/// Per-stage right-hand side of the KKT system, in the row blocks of [`Block`].
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResStage {
    pub g: Col<E>,
    pub b: Col<E>,
    pub d: Col<E>,
    pub m: Col<E>,
}

impl ResStage {
    pub fn copy_from(&mut self, other: &ResStage) {
        self.g.as_mut().copy_from(&other.g);
        self.b.as_mut().copy_from(&other.b);
        self.d.as_mut().copy_from(&other.d);
        self.m.as_mut().copy_from(&other.m);
    }
}

impl StageBlocks for ResStage {
    fn block(&self, block: Block) -> &Col<E> {
        match block {
            Block::Primal => &self.g,
            Block::Transition => &self.b,
            Block::Multiplier => &self.d,
            Block::Slack => &self.m,
        }
    }

    fn block_mut(&mut self, block: Block) -> &mut Col<E> {
        match block {
            Block::Primal => &mut self.g,
            Block::Transition => &mut self.b,
            Block::Multiplier => &mut self.d,
            Block::Slack => &mut self.m,
        }
    }
}

pub(crate) fn zero_stages(dim: &OcpQpDim) -> Vec<ResStage> {
    (0..=dim.horizon())
        .map(|i| {
            let d = dim.at(i);
            ResStage {
                g: Col::zeros(d.nv()),
                b: Col::zeros(dim.nx_next(i)),
                d: Col::zeros(d.nc()),
                m: Col::zeros(d.nc()),
            }
        })
        .collect()
}

/// Infinity norms of the four residual blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResNorms {
    pub stat: E,
    pub eq: E,
    pub ineq: E,
    pub comp: E,
}

impl ResNorms {
    pub(crate) fn of(res: &[ResStage]) -> Self {
        res.iter().fold(Self::default(), |acc, r| Self {
            stat: E::max(acc.stat, norm_inf(r.g.as_ref())),
            eq: E::max(acc.eq, norm_inf(r.b.as_ref())),
            ineq: E::max(acc.ineq, norm_inf(r.d.as_ref())),
            comp: E::max(acc.comp, norm_inf(r.m.as_ref())),
        })
    }

    pub fn is_nan(&self) -> bool {
        self.stat.is_nan() || self.eq.is_nan() || self.ineq.is_nan() || self.comp.is_nan()
    }
}

/// Evaluates the residuals of `sol` into `res` and returns `(mu, obj)`.
pub(crate) fn evaluate(
    dim: &OcpQpDim,
    models: &[StageModel],
    sol: &[SolStage],
    res: &mut [ResStage],
) -> (E, E) {
    let n = dim.horizon();
    let mut obj = 0.;
    let mut comp = 0.;

    for i in 0..=n {
        let d = dim.at(i);
        let (nu, nx) = (d.nu, d.nx);
        let m = &models[i];
        let s = &sol[i];
        let r = &mut res[i];

        r.g.as_mut().copy_from(&m.grad);
        mat_vec(r.g.as_mut(), Accum::Add, m.hess.as_ref(), s.v.as_ref(), 1.);
        // v'(Hv + g) + g'v = v'Hv + 2 g'v
        obj += 0.5 * (dot(s.v.as_ref(), r.g.as_ref()) + dot(m.grad.as_ref(), s.v.as_ref()));
        mat_vec(r.g.as_mut(), Accum::Add, m.jac.transpose(), s.lam.as_ref(), -1.);

        if i < n {
            let pi = s.pi.as_ref();
            mat_vec(r.g.as_mut().subrows_mut(0, nu), Accum::Add, m.b_mat.transpose(), pi, 1.);
            mat_vec(r.g.as_mut().subrows_mut(nu, nx), Accum::Add, m.a.transpose(), pi, 1.);

            let nu_next = dim.at(i + 1).nu;
            r.b.as_mut().copy_from(&m.b);
            axpy(-1., sol[i + 1].v.subrows(nu_next, r.b.nrows()), r.b.as_mut());
            mat_vec(r.b.as_mut(), Accum::Add, m.a.as_ref(), s.v.subrows(nu, nx), 1.);
            mat_vec(r.b.as_mut(), Accum::Add, m.b_mat.as_ref(), s.v.subrows(0, nu), 1.);
        }
        if i > 0 {
            axpy(-1., sol[i - 1].pi.as_ref(), r.g.as_mut().subrows_mut(nu, nx));
        }

        r.d.as_mut().copy_from(&m.offset);
        axpy(-1., s.t.as_ref(), r.d.as_mut());
        mat_vec(r.d.as_mut(), Accum::Add, m.jac.as_ref(), s.v.as_ref(), 1.);

        cwise_multiply(s.lam.as_ref(), s.t.as_ref(), r.m.as_mut());
        comp += r.m.sum();
    }

    let nc = dim.nc_total();
    let mu = if nc > 0 { comp / nc as E } else { 0. };
    (mu, obj)
}

/// Residuals of a (QP, solution) pair.
#[derive(Debug, Clone)]
pub struct OcpQpRes {
    dim: Arc<OcpQpDim>,
    pub(crate) stages: Vec<ResStage>,
    norms: ResNorms,
    mu: E,
    obj: E,
}

impl OcpQpRes {
    pub fn new(dim: Arc<OcpQpDim>) -> Self {
        let stages = zero_stages(&dim);
        Self {
            dim,
            stages,
            norms: ResNorms::default(),
            mu: 0.,
            obj: 0.,
        }
    }

    /// Evaluates the KKT residuals of `sol` for `qp`.
    pub fn compute(&mut self, qp: &OcpQp, sol: &OcpQpSol) -> Result<(), OcpQpError> {
        if **qp.dim() != *self.dim {
            return Err(OcpQpError::DescriptorMismatch { container: "QP data" });
        }
        sol.check_dim(&self.dim)?;

        let models = qp.models();
        let (mu, obj) = evaluate(&self.dim, &models, &sol.stages, &mut self.stages);
        self.mu = mu;
        self.obj = obj;
        self.norms = ResNorms::of(&self.stages);
        Ok(())
    }

    pub fn norms(&self) -> ResNorms {
        self.norms
    }

    pub fn max_res_stat(&self) -> E {
        self.norms.stat
    }

    pub fn max_res_eq(&self) -> E {
        self.norms.eq
    }

    pub fn max_res_ineq(&self) -> E {
        self.norms.ineq
    }

    pub fn max_res_comp(&self) -> E {
        self.norms.comp
    }

    pub fn mu(&self) -> E {
        self.mu
    }

    pub fn obj(&self) -> E {
        self.obj
    }

    pub fn set_zero(&mut self) {
        self.stages = zero_stages(&self.dim);
        self.norms = ResNorms::default();
        self.mu = 0.;
        self.obj = 0.;
    }

    pub fn field_shape(&self, field: &str, stage: isize) -> Result<(usize, usize), OcpQpError> {
        let entry = field::lookup(FIELDS, "residual", field)?;
        Ok((field::vector_len(&self.dim, entry, stage)?, 1))
    }

    pub fn get(&self, field: &str, stage: isize) -> Result<Vec<E>, OcpQpError> {
        let entry = field::lookup(FIELDS, "residual", field)?;
        field::get_vector(&self.stages, &self.dim, entry, stage)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use rstest::{fixture, rstest};

    use super::*;
    use crate::dim::OcpQpDimBuilder;

    /// Scalar system x+ = x + u with |u| <= 1 on a horizon of one step.
    #[fixture]
    fn qp() -> OcpQp {
        let dim = OcpQpDimBuilder::new(1)
            .set_all("nx", &[1, 1])
            .unwrap()
            .set_all("nu", &[1, 0])
            .unwrap()
            .set("nbu", 0, 1)
            .unwrap()
            .build()
            .unwrap();
        let mut qp = OcpQp::new(dim.into_shared());
        qp.set("A", 0, None, &[1.]).unwrap();
        qp.set("B", 0, None, &[1.]).unwrap();
        qp.set("b", 0, None, &[0.5]).unwrap();
        qp.set("R", 0, None, &[2.]).unwrap();
        qp.set("Q", 0, Some(1), &[1.]).unwrap();
        qp.set("lbu", 0, None, &[-1.]).unwrap();
        qp.set("ubu", 0, None, &[1.]).unwrap();
        qp
    }

    #[rstest]
    fn test_residual_blocks(qp: OcpQp) {
        let mut sol = OcpQpSol::new(qp.dim().clone());
        sol.set("u", 0, None, &[0.25]).unwrap();
        sol.set("x", 0, None, &[1.]).unwrap();
        sol.set("x", 1, None, &[2.]).unwrap();
        sol.set("pi", 0, None, &[0.5]).unwrap();
        sol.set("lam_lbu", 0, None, &[0.1]).unwrap();
        sol.set("lam_ubu", 0, None, &[0.2]).unwrap();
        sol.set("t_lbu", 0, None, &[1.0]).unwrap();
        sol.set("t_ubu", 0, None, &[0.5]).unwrap();

        let mut res = OcpQpRes::new(qp.dim().clone());
        res.compute(&qp, &sol).unwrap();

        // R u - (lam_lb - lam_ub) + B' pi
        assert_abs_diff_eq!(res.get("res_r", 0).unwrap()[0], 0.5 - 0.1 + 0.2 + 0.5);
        // Q x + A' pi
        assert_abs_diff_eq!(res.get("res_q", 0).unwrap()[0], 1.5);
        // Q x - pi
        assert_abs_diff_eq!(res.get("res_q", 1).unwrap()[0], 1.5);
        // x0 + u0 + b - x1
        assert_abs_diff_eq!(res.get("res_b", 0).unwrap()[0], 1. + 0.25 + 0.5 - 2.);
        // u - lb - t, ub - u - t
        assert_abs_diff_eq!(res.get("res_d_lb", 0).unwrap()[0], 0.25);
        assert_abs_diff_eq!(res.get("res_d_ub", 0).unwrap()[0], 0.25);
        assert_abs_diff_eq!(res.get("res_m_ub", 0).unwrap()[0], 0.1);

        assert_abs_diff_eq!(res.max_res_stat(), 1.5);
        assert_abs_diff_eq!(res.max_res_eq(), 0.25);
        assert_abs_diff_eq!(res.mu(), (0.1 + 0.1) / 2.);
        assert_abs_diff_eq!(res.obj(), 0.5 * (2. * 0.0625 + 1. + 4.));
    }

    #[rstest]
    fn test_transition_residual_bound(qp: OcpQp) {
        let res = OcpQpRes::new(qp.dim().clone());
        assert!(res.get("res_b", 0).is_ok());
        assert!(res.get("res_b", 1).is_err());
    }

    #[rstest]
    fn test_descriptor_mismatch(qp: OcpQp) {
        let other = OcpQpDimBuilder::new(1)
            .set_all("nx", &[1, 1])
            .unwrap()
            .build()
            .unwrap()
            .into_shared();
        let sol = OcpQpSol::new(other.clone());
        let mut res = OcpQpRes::new(qp.dim().clone());
        assert!(res.compute(&qp, &sol).is_err());

        let mut res = OcpQpRes::new(other);
        assert_eq!(
            res.compute(&qp, &OcpQpSol::new(qp.dim().clone())),
            Err(OcpQpError::DescriptorMismatch { container: "QP data" })
        );
    }
}
