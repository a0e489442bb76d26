//! Stage-level pieces of the KKT system assembled from [`QpStage`] data.
//!
//! With `v = [u; x; sl; su]`, every stage contributes the cost `0.5 v'Hv + g'v` and the
//! inequality rows `G v + h >= 0` in the block order `[lb, lg, ub, ug, ls, us]`.

use faer::{Col, ColMut, Mat, MatMut};

use crate::E;
use crate::dim::{OcpQpDim, StageDim};
use crate::qp::{OcpQp, QpStage};

/// Dense KKT blocks of one stage. Sized once from the dimensions and refreshed in place.
#[derive(Debug, Clone)]
pub(crate) struct StageModel {
    pub hess: Mat<E>,
    pub grad: Col<E>,
    pub jac: Mat<E>,
    pub offset: Col<E>,
    pub a: Mat<E>,
    pub b_mat: Mat<E>,
    pub b: Col<E>,
}

impl StageModel {
    pub(crate) fn zeros(dim: &StageDim, nx_next: usize) -> Self {
        Self {
            hess: Mat::zeros(dim.nv(), dim.nv()),
            grad: Col::zeros(dim.nv()),
            jac: Mat::zeros(dim.nc(), dim.nv()),
            offset: Col::zeros(dim.nc()),
            a: Mat::zeros(nx_next, dim.nx),
            b_mat: Mat::zeros(nx_next, dim.nu),
            b: Col::zeros(nx_next),
        }
    }
}

pub(crate) fn zero_models(dim: &OcpQpDim) -> Vec<StageModel> {
    (0..=dim.horizon())
        .map(|i| StageModel::zeros(dim.at(i), dim.nx_next(i)))
        .collect()
}

impl OcpQp {
    pub(crate) fn models(&self) -> Vec<StageModel> {
        let mut models = zero_models(self.dim());
        self.load_models(&mut models);
        models
    }

    /// Overwrites `models` with the current data. The buffers must come from [`zero_models`]
    /// for the same dimensions.
    pub(crate) fn load_models(&self, models: &mut [StageModel]) {
        for (i, model) in models.iter_mut().enumerate() {
            self.stage(i).load_model(self.dim().at(i), model);
        }
    }
}

impl QpStage {
    pub(crate) fn load_model(&self, dim: &StageDim, model: &mut StageModel) {
        self.load_hessian(dim, model.hess.as_mut());
        self.load_gradient(dim, model.grad.as_mut());
        self.load_jacobian(dim, model.jac.as_mut());
        self.load_offset(dim, model.offset.as_mut());
        model.a.as_mut().copy_from(&self.A);
        model.b_mat.as_mut().copy_from(&self.B);
        model.b.as_mut().copy_from(&self.b);
    }

    /// Dense cost Hessian over `[u; x; sl; su]`.
    fn load_hessian(&self, dim: &StageDim, mut h: MatMut<'_, E>) {
        let (nu, nx, nux, ns) = (dim.nu, dim.nx, dim.nux(), dim.ns);
        h.fill(0.);
        h.as_mut().submatrix_mut(0, 0, nu, nu).copy_from(&self.R);
        h.as_mut().submatrix_mut(0, nu, nu, nx).copy_from(&self.S);
        h.as_mut().submatrix_mut(nu, 0, nx, nu).copy_from(self.S.transpose());
        h.as_mut().submatrix_mut(nu, nu, nx, nx).copy_from(&self.Q);
        for k in 0..ns {
            h[(nux + k, nux + k)] = self.Zl[k];
            h[(nux + ns + k, nux + ns + k)] = self.Zu[k];
        }
    }

    /// Linear cost term `[r; q; zl; zu]`.
    fn load_gradient(&self, dim: &StageDim, mut g: ColMut<'_, E>) {
        let (nu, nx, nux, ns) = (dim.nu, dim.nx, dim.nux(), dim.ns);
        g.as_mut().subrows_mut(0, nu).copy_from(&self.r);
        g.as_mut().subrows_mut(nu, nx).copy_from(&self.q);
        g.as_mut().subrows_mut(nux, ns).copy_from(&self.zl);
        g.as_mut().subrows_mut(nux + ns, ns).copy_from(&self.zu);
    }

    /// Inequality Jacobian `G` (`nc x nv`).
    fn load_jacobian(&self, dim: &StageDim, mut g: MatMut<'_, E>) {
        let (nu, nx, nux, ns, nb, ng) = (dim.nu, dim.nx, dim.nux(), dim.ns, dim.nb(), dim.ng);
        let upper = nb + ng;
        let slack_rows = 2 * (nb + ng);

        g.fill(0.);
        for j in 0..nb {
            g[(j, self.idxb[j])] = 1.;
            g[(upper + j, self.idxb[j])] = -1.;
        }
        g.as_mut().submatrix_mut(nb, 0, ng, nu).copy_from(&self.D);
        g.as_mut().submatrix_mut(nb, nu, ng, nx).copy_from(&self.C);
        for j in 0..ng {
            for c in 0..nux {
                g[(upper + nb + j, c)] = -g[(nb + j, c)];
            }
        }
        for (k, &j) in self.idxs.iter().enumerate() {
            g[(j, nux + k)] = 1.;
            g[(upper + j, nux + ns + k)] = 1.;
        }
        for k in 0..ns {
            g[(slack_rows + k, nux + k)] = 1.;
            g[(slack_rows + ns + k, nux + ns + k)] = 1.;
        }
    }

    /// Constant term `h` of the inequality rows: `[-lb; -lg; ub; ug; -lls; -lus]`.
    fn load_offset(&self, dim: &StageDim, mut h: ColMut<'_, E>) {
        let (ns, nb, ng) = (dim.ns, dim.nb(), dim.ng);
        let upper = nb + ng;
        let slack_rows = 2 * (nb + ng);
        for (k, v) in self.lb.iter().enumerate() {
            h[k] = -v;
        }
        for (k, v) in self.lg.iter().enumerate() {
            h[nb + k] = -v;
        }
        h.as_mut().subrows_mut(upper, nb).copy_from(&self.ub);
        h.as_mut().subrows_mut(upper + nb, ng).copy_from(&self.ug);
        for k in 0..ns {
            h[slack_rows + k] = -self.lls[k];
            h[slack_rows + ns + k] = -self.lus[k];
        }
    }
}
