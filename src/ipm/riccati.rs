//! # Riccati recursion
//!
//! Structured factorization of the interior-point Newton system. The inequality rows are
//! condensed into each stage Hessian,
//!
//! ```text
//! H^ = H + G' diag(lam / t) G + reg I
//! g^ = res_g + G' ((res_m + lam .* res_d) / t)
//! ```
//!
//! and the stage variables are split into the state `x` and the locally eliminated
//! `w = [u; sl; su]`. Going backward from the last stage, with `B~ = [B, 0]`,
//!
//! ```text
//! R_ = H^ww + B~' P+ B~      S_ = H^wx + B~' P+ A      Q_ = H^xx + A' P+ A
//! K  = -R_^-1 S_             P  = Q_ + S_' K
//! ```
//!
//! The vector pass and the forward substitution reuse the factors for any right-hand side.

use std::sync::Arc;

use faer::linalg::matmul::matmul;
use faer::{Accum, Col, ColRef, Mat, MatRef, Par, unzip, zip};

use crate::E;
use crate::dim::OcpQpDim;
use crate::linalg::solver::{LinearSolverError, TriangularFactor};
use crate::linalg::vector_ops::{cwise_quotient, mat_vec, negate};
use crate::qp::kkt::StageModel;
use crate::res::ResStage;
use crate::sol::SolStage;

/// Factors and work vectors of one stage, sized once from the dimensions.
#[allow(non_snake_case)]
struct StageFactor<S> {
    /// Factor of `R_`.
    chol: S,
    /// Condensed Hessian `H^` over `v`.
    hess: Mat<E>,
    /// `diag(lam / t) G`
    scaled: Mat<E>,
    bt_p: Mat<E>,
    at_p: Mat<E>,
    rbar: Mat<E>,
    sbar: Mat<E>,
    K: Mat<E>,
    P: Mat<E>,
    lam: Col<E>,
    t: Col<E>,
    weight: Col<E>,
    corr: Col<E>,
    g: Col<E>,
    /// `P+ b + p+`
    a: Col<E>,
    p: Col<E>,
    k: Col<E>,
    dw: Col<E>,
    dx: Col<E>,
    p_rec: Col<E>,
    k_rec: Col<E>,
}

impl<S: TriangularFactor> StageFactor<S> {
    fn new(dim: &OcpQpDim, i: usize) -> Self {
        let d = dim.at(i);
        let (nu, nx, nv, nw, nc) = (d.nu, d.nx, d.nv(), d.nw(), d.nc());
        let nx_next = dim.nx_next(i);
        Self {
            chol: S::new(),
            hess: Mat::zeros(nv, nv),
            scaled: Mat::zeros(nc, nv),
            bt_p: Mat::zeros(nu, nx_next),
            at_p: Mat::zeros(nx, nx_next),
            rbar: Mat::zeros(nw, nw),
            sbar: Mat::zeros(nw, nx),
            K: Mat::zeros(nw, nx),
            P: Mat::zeros(nx, nx),
            lam: Col::zeros(nc),
            t: Col::zeros(nc),
            weight: Col::zeros(nc),
            corr: Col::zeros(nc),
            g: Col::zeros(nv),
            a: Col::zeros(nx_next),
            p: Col::zeros(nx),
            k: Col::zeros(nw),
            dw: Col::zeros(nw),
            dx: Col::zeros(nx),
            p_rec: Col::zeros(nx),
            k_rec: Col::zeros(nw),
        }
    }
}

/// Backward-pass factors of one Newton system. All storage is allocated in [`Self::new`];
/// factorizing and solving only overwrite it.
pub(crate) struct RiccatiSystem<S: TriangularFactor> {
    dim: Arc<OcpQpDim>,
    stages: Vec<StageFactor<S>>,
    chol_x0: S,
    reg: E,
}

impl<S: TriangularFactor> RiccatiSystem<S> {
    pub fn new(dim: &Arc<OcpQpDim>) -> Self {
        Self {
            dim: dim.clone(),
            stages: (0..=dim.horizon()).map(|i| StageFactor::new(dim, i)).collect(),
            chol_x0: S::new(),
            reg: 0.,
        }
    }

    /// Factorizes the Newton system at `iterate`. Fails when a reduced Hessian block is not
    /// positive definite at the given regularization; the factors are then unusable until the
    /// next successful call.
    pub fn factorize(
        &mut self,
        models: &[StageModel],
        iterate: &[SolStage],
        reg: E,
    ) -> Result<(), LinearSolverError> {
        self.reg = reg;
        for i in (0..=self.dim.horizon()).rev() {
            let d = self.dim.at(i);
            let (nu, nx, nux, nv) = (d.nu, d.nx, d.nux(), d.nv());
            let slack = 2 * d.ns;
            let m = &models[i];
            let s = &iterate[i];
            let (head, tail) = self.stages.split_at_mut(i + 1);
            let f = &mut head[i];

            f.lam.as_mut().copy_from(&s.lam);
            f.t.as_mut().copy_from(&s.t);
            cwise_quotient(s.lam.as_ref(), s.t.as_ref(), f.weight.as_mut());
            for c in 0..nv {
                for r in 0..d.nc() {
                    f.scaled[(r, c)] = f.weight[r] * m.jac[(r, c)];
                }
            }
            f.hess.as_mut().copy_from(&m.hess);
            matmul(&mut f.hess, Accum::Add, m.jac.transpose(), &f.scaled, 1., Par::Seq);
            for j in 0..nv {
                f.hess[(j, j)] += reg;
            }

            // w = [u; sl; su] sits at rows 0..nu and nux..nux + 2 ns of v
            let h = f.hess.as_ref();
            f.rbar.submatrix_mut(0, 0, nu, nu).copy_from(h.submatrix(0, 0, nu, nu));
            f.rbar.submatrix_mut(0, nu, nu, slack).copy_from(h.submatrix(0, nux, nu, slack));
            f.rbar.submatrix_mut(nu, 0, slack, nu).copy_from(h.submatrix(nux, 0, slack, nu));
            f.rbar
                .submatrix_mut(nu, nu, slack, slack)
                .copy_from(h.submatrix(nux, nux, slack, slack));
            f.sbar.submatrix_mut(0, 0, nu, nx).copy_from(h.submatrix(0, nu, nu, nx));
            f.sbar.submatrix_mut(nu, 0, slack, nx).copy_from(h.submatrix(nux, nu, slack, nx));
            f.P.as_mut().copy_from(h.submatrix(nu, nu, nx, nx));

            if let Some(next) = tail.first() {
                matmul(&mut f.bt_p, Accum::Replace, m.b_mat.transpose(), &next.P, 1., Par::Seq);
                matmul(&mut f.at_p, Accum::Replace, m.a.transpose(), &next.P, 1., Par::Seq);
                let ruu = f.rbar.submatrix_mut(0, 0, nu, nu);
                matmul(ruu, Accum::Add, &f.bt_p, &m.b_mat, 1., Par::Seq);
                let sux = f.sbar.submatrix_mut(0, 0, nu, nx);
                matmul(sux, Accum::Add, &f.bt_p, &m.a, 1., Par::Seq);
                matmul(&mut f.P, Accum::Add, &f.at_p, &m.a, 1., Par::Seq);
            }

            f.chol.factorize(f.rbar.as_ref())?;
            f.K.as_mut().copy_from(&f.sbar);
            f.chol.solve_mat_in_place(f.K.as_mut())?;
            zip!(f.K.as_mut()).for_each(|unzip!(k)| *k = -*k);

            matmul(&mut f.P, Accum::Add, f.sbar.transpose(), &f.K, 1., Par::Seq);
            for r in 0..nx {
                for c in 0..r {
                    let v = 0.5 * (f.P[(r, c)] + f.P[(c, r)]);
                    f.P[(r, c)] = v;
                    f.P[(c, r)] = v;
                }
            }
        }

        self.chol_x0.factorize(self.stages[0].P.as_ref())
    }

    pub fn reg(&self) -> E {
        self.reg
    }

    /// Solves `K dz = -rhs` with the current factors and writes `dz`. `models` must be the ones
    /// passed to the last successful [`Self::factorize`].
    pub fn solve(
        &mut self,
        models: &[StageModel],
        rhs: &[ResStage],
        dz: &mut [SolStage],
    ) -> Result<(), LinearSolverError> {
        let n = self.dim.horizon();

        for i in (0..=n).rev() {
            let d = self.dim.at(i);
            let (nu, nx, nux) = (d.nu, d.nx, d.nux());
            let slack = 2 * d.ns;
            let m = &models[i];
            let r = &rhs[i];
            let (head, tail) = self.stages.split_at_mut(i + 1);
            let f = &mut head[i];

            // g^ = res_g + G' ((res_m + lam .* res_d) / t)
            for k in 0..d.nc() {
                f.corr[k] = (r.m[k] + f.lam[k] * r.d[k]) / f.t[k];
            }
            f.g.as_mut().copy_from(&r.g);
            mat_vec(f.g.as_mut(), Accum::Add, m.jac.transpose(), f.corr.as_ref(), 1.);

            // r_ is gathered into k, q_ into p
            f.k.subrows_mut(0, nu).copy_from(f.g.subrows(0, nu));
            f.k.subrows_mut(nu, slack).copy_from(f.g.subrows(nux, slack));
            f.p.as_mut().copy_from(f.g.subrows(nu, nx));
            if let Some(next) = tail.first() {
                f.a.as_mut().copy_from(&next.p);
                mat_vec(f.a.as_mut(), Accum::Add, next.P.as_ref(), r.b.as_ref(), 1.);
                mat_vec(f.k.subrows_mut(0, nu), Accum::Add, m.b_mat.transpose(), f.a.as_ref(), 1.);
                mat_vec(f.p.as_mut(), Accum::Add, m.a.transpose(), f.a.as_ref(), 1.);
            }

            mat_vec(f.p.as_mut(), Accum::Add, f.K.transpose(), f.k.as_ref(), 1.);
            f.chol.solve_in_place(f.k.as_mut())?;
            negate(f.k.as_mut());
        }

        let first = &mut self.stages[0];
        first.dx.as_mut().copy_from(&first.p);
        negate(first.dx.as_mut());
        self.chol_x0.solve_in_place(first.dx.as_mut())?;

        for i in 0..=n {
            let d = self.dim.at(i);
            let (nu, nx, nux) = (d.nu, d.nx, d.nux());
            let slack = 2 * d.ns;
            let m = &models[i];
            let r = &rhs[i];
            let out = &mut dz[i];
            let (head, tail) = self.stages.split_at_mut(i + 1);
            let f = &mut head[i];

            f.dw.as_mut().copy_from(&f.k);
            mat_vec(f.dw.as_mut(), Accum::Add, f.K.as_ref(), f.dx.as_ref(), 1.);
            out.v.subrows_mut(0, nu).copy_from(f.dw.subrows(0, nu));
            out.v.subrows_mut(nu, nx).copy_from(&f.dx);
            out.v.subrows_mut(nux, slack).copy_from(f.dw.subrows(nu, slack));

            if let Some(next) = tail.first_mut() {
                next.dx.as_mut().copy_from(&r.b);
                mat_vec(next.dx.as_mut(), Accum::Add, m.a.as_ref(), f.dx.as_ref(), 1.);
                mat_vec(next.dx.as_mut(), Accum::Add, m.b_mat.as_ref(), f.dw.subrows(0, nu), 1.);
                out.pi.as_mut().copy_from(&next.p);
                mat_vec(out.pi.as_mut(), Accum::Add, next.P.as_ref(), next.dx.as_ref(), 1.);
            }

            out.t.as_mut().copy_from(&r.d);
            mat_vec(out.t.as_mut(), Accum::Add, m.jac.as_ref(), out.v.as_ref(), 1.);
            for k in 0..d.nc() {
                out.lam[k] = -(r.m[k] + f.lam[k] * out.t[k]) / f.t[k];
            }
        }

        Ok(())
    }

    /// Keeps the backward-pass vectors of the last [`Self::solve`] for the Riccati queries.
    pub fn record(&mut self) {
        for f in self.stages.iter_mut() {
            f.p_rec.as_mut().copy_from(&f.p);
            f.k_rec.as_mut().copy_from(&f.k);
        }
    }

    #[allow(non_snake_case)]
    pub fn P(&self, stage: usize) -> MatRef<'_, E> {
        self.stages[stage].P.as_ref()
    }

    /// Feedback gain restricted to the controls, `nu x nx`.
    #[allow(non_snake_case)]
    pub fn K(&self, stage: usize) -> MatRef<'_, E> {
        self.stages[stage].K.subrows(0, self.dim.at(stage).nu)
    }

    /// Cholesky factor of the reduced control Hessian, `nu x nu`.
    #[allow(non_snake_case)]
    pub fn Lr(&self, stage: usize) -> Result<MatRef<'_, E>, LinearSolverError> {
        let nu = self.dim.at(stage).nu;
        Ok(self.stages[stage].chol.factor()?.submatrix(0, 0, nu, nu))
    }

    pub fn p(&self, stage: usize) -> ColRef<'_, E> {
        self.stages[stage].p_rec.as_ref()
    }

    /// Feedforward term restricted to the controls.
    pub fn k(&self, stage: usize) -> ColRef<'_, E> {
        self.stages[stage].k_rec.subrows(0, self.dim.at(stage).nu)
    }
}
