//! # Interior Point Method for OCP QPs
//!
//! Primal-dual interior-point engine with a Mehrotra predictor-corrector, solving the KKT system
//! of every iteration by the Riccati recursion in [`riccati`]. The factorization at the final
//! iterate is retained after [`OcpQpIpm::solve`] so that [`OcpQpIpm::propagate`] can compute
//! forward sensitivities, and [`OcpQpIpm::predict`] a first-order update for new QP data, with
//! one vector pass each.
//!
//! All iteration storage is sized from the dimensions when the engine is created and reused by
//! every solve. An engine holds per-solve state only; distinct engines are independent and may
//! run on different threads.

pub(crate) mod line_search;
pub mod mu_update;
pub(crate) mod riccati;
pub mod stat;

use std::sync::Arc;

use faer::{Accum, Mat};
use problemo::Problem;
use tracing::{debug, debug_span, info, warn};

use crate::callback::{Callback, NoOpCallback};
use crate::dim::OcpQpDim;
use crate::error::OcpQpError;
use crate::field::{StageBound, StageRange};
use crate::ipm::line_search::{compute_max_step_length, max_step_to_boundary};
use crate::ipm::mu_update::{MuUpdate, MuUpdates};
use crate::ipm::riccati::RiccatiSystem;
use crate::ipm::stat::{IterationRecord, STAT_M, StatLog, StatRow};
use crate::linalg::cholesky::DenseCholesky;
use crate::linalg::solver::TriangularFactor;
use crate::linalg::vector_ops::{has_nan, is_col_positive, mat_vec};
use crate::options::{SolverOptions, WarmStart};
use crate::qp::kkt::{self, StageModel};
use crate::qp::{OcpQp, QpTag};
use crate::res::{self, ResNorms, ResStage};
use crate::seed::OcpQpSeed;
use crate::sol::{self, OcpQpSol, SolStage};
use crate::{E, Status};

/// Value returned by the string-keyed diagnostic interface.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    Int(i64),
    Real(E),
    Table(Mat<E>),
}

pub struct OcpQpIpm<S: TriangularFactor = DenseCholesky> {
    dim: Arc<OcpQpDim>,
    options: SolverOptions,
    mu_update: MuUpdates,
    callback: Box<dyn Callback + Send>,

    status: Option<Status>,
    iter: usize,
    stat: StatLog,
    norms: ResNorms,
    mu: E,
    obj: E,

    models: Vec<StageModel>,
    /// Models of the QP handed to `predict`.
    next_models: Vec<StageModel>,
    iterate: Vec<SolStage>,
    residual: Vec<ResStage>,
    rhs: Vec<ResStage>,
    step: Vec<SolStage>,
    riccati: RiccatiSystem<S>,
    /// QP the retained factorization belongs to, `None` when nothing is retained.
    factorized_for: Option<QpTag>,
}

impl OcpQpIpm {
    /// Engine with the dense Cholesky stage solver.
    pub fn new(dim: Arc<OcpQpDim>, options: &SolverOptions) -> Result<Self, OcpQpError> {
        Self::with_linear_solver(dim, options)
    }
}

impl<S: TriangularFactor> OcpQpIpm<S> {
    /// Validates `options` and keeps a private copy of them.
    pub fn with_linear_solver(
        dim: Arc<OcpQpDim>,
        options: &SolverOptions,
    ) -> Result<Self, OcpQpError> {
        options.validate()?;
        Ok(Self {
            models: kkt::zero_models(&dim),
            next_models: kkt::zero_models(&dim),
            iterate: sol::zero_stages(&dim),
            residual: res::zero_stages(&dim),
            rhs: res::zero_stages(&dim),
            step: sol::zero_stages(&dim),
            riccati: RiccatiSystem::new(&dim),
            factorized_for: None,
            dim,
            options: options.clone(),
            mu_update: MuUpdates::from_options(options),
            callback: Box::new(NoOpCallback {}),
            status: None,
            iter: 0,
            stat: StatLog::with_capacity(options.iter_max),
            norms: ResNorms::default(),
            mu: 0.,
            obj: 0.,
        })
    }

    pub fn with_callback(mut self, callback: impl Callback + Send + 'static) -> Self {
        self.callback = Box::new(callback);
        self
    }

    pub fn dim(&self) -> &Arc<OcpQpDim> {
        &self.dim
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    fn check_qp(&self, qp: &OcpQp) -> Result<(), OcpQpError> {
        if **qp.dim() != *self.dim {
            return Err(OcpQpError::DescriptorMismatch { container: "QP data" });
        }
        Ok(())
    }

    /// Solves `qp` and writes the final iterate into `sol`.
    ///
    /// Numerical trouble is reported through the returned [`Status`]; errors are reserved for
    /// containers built from a different descriptor.
    pub fn solve(&mut self, qp: &OcpQp, sol: &mut OcpQpSol) -> Result<Status, Problem> {
        self.check_qp(qp)?;
        sol.check_dim(&self.dim)?;

        let span = debug_span!("ocp_qp_ipm", horizon = self.dim.horizon());
        let _guard = span.enter();

        self.status = None;
        self.factorized_for = None;
        self.stat.clear();

        qp.load_models(&mut self.models);
        self.initial_iterate(sol);
        let mut reg = self.options.reg_prim;
        let mut row = StatRow::default();
        let mut iter = 0;

        let status = loop {
            let (mu, obj) =
                res::evaluate(&self.dim, &self.models, &self.iterate, &mut self.residual);
            let norms = ResNorms::of(&self.residual);
            row.set_residuals(&norms, mu, obj);
            row.reg = reg;
            self.stat.push(row);
            self.iter = iter;
            self.norms = norms;
            self.mu = mu;
            self.obj = obj;
            self.callback.call(&IterationRecord { iter, row });
            debug!(
                iter,
                mu,
                res_stat = norms.stat,
                res_eq = norms.eq,
                res_ineq = norms.ineq,
                res_comp = norms.comp,
                alpha_prim = row.alpha_prim,
                alpha_dual = row.alpha_dual
            );

            if norms.is_nan() || iterate_has_nan(&self.iterate) {
                break Status::NanSolution;
            }
            if self.converged(&norms) {
                break Status::Success;
            }
            if iter == self.options.iter_max {
                break Status::MaxIterations;
            }

            if !self.factorize(&mut reg) {
                break Status::FactorizationFailure;
            }

            let next = self.newton_step(mu)?;
            if E::min(next.alpha_prim, next.alpha_dual) < self.options.alpha_min {
                break Status::MinStep;
            }
            for (s, ds) in self.iterate.iter_mut().zip(&self.step) {
                s.step(ds, next.alpha_prim, next.alpha_dual);
            }
            row = next;
            iter += 1;
        };

        for (out, z) in sol.stages.iter_mut().zip(&self.iterate) {
            out.copy_from(z);
        }
        if status == Status::Success {
            self.retain_factorization(reg, qp.tag())?;
        }
        self.status = Some(status);

        if status.is_success() {
            info!(iter, obj = self.obj, "ocp qp solved");
        } else {
            warn!(
                iter,
                %status,
                res_stat = self.norms.stat,
                res_eq = self.norms.eq,
                res_ineq = self.norms.ineq,
                res_comp = self.norms.comp,
                "ocp qp solve stopped"
            );
        }
        Ok(status)
    }

    fn converged(&self, norms: &ResNorms) -> bool {
        norms.stat <= self.options.tol_stat
            && norms.eq <= self.options.tol_eq
            && norms.ineq <= self.options.tol_ineq
            && norms.comp <= self.options.tol_comp
    }

    /// First iterate: primal part from `sol` (warm start) or zero, slacks pushed to at least
    /// `init_slack` and multipliers chosen so that `lam .* t = mu0`.
    fn initial_iterate(&mut self, sol: &OcpQpSol) {
        let warm = self.options.warm_start;
        let keep = warm == WarmStart::PrimalDual;
        let (init_slack, mu0) = (self.options.init_slack, self.options.mu0);

        for (i, z) in self.iterate.iter_mut().enumerate() {
            let given = &sol.stages[i];
            let m = &self.models[i];
            if warm == WarmStart::Cold {
                z.v.as_mut().fill(0.);
            } else {
                z.v.as_mut().copy_from(&given.v);
            }
            if keep {
                z.pi.as_mut().copy_from(&given.pi);
            } else {
                z.pi.as_mut().fill(0.);
            }

            // rows G v + h, then clipped into slacks
            z.t.as_mut().copy_from(&m.offset);
            mat_vec(z.t.as_mut(), Accum::Add, m.jac.as_ref(), z.v.as_ref(), 1.);
            for k in 0..z.t.nrows() {
                z.t[k] = if keep && given.t[k] > 0. {
                    given.t[k]
                } else {
                    E::max(z.t[k], init_slack)
                };
                z.lam[k] = if keep && given.lam[k] > 0. {
                    given.lam[k]
                } else {
                    mu0 / z.t[k]
                };
            }
        }
    }

    /// Factorizes at the current iterate, raising the regularization until it succeeds or
    /// exceeds `reg_max`.
    fn factorize(&mut self, reg: &mut E) -> bool {
        loop {
            match self.riccati.factorize(&self.models, &self.iterate, *reg) {
                Ok(()) => return true,
                Err(err) => {
                    let next = if *reg > 0. { *reg * 100. } else { E::EPSILON };
                    if next > self.options.reg_max {
                        warn!(
                            %err,
                            reg = *reg,
                            "factorization failed at the largest regularization"
                        );
                        return false;
                    }
                    debug!(%err, reg = next, "raising regularization");
                    *reg = next;
                }
            }
        }
    }

    /// Predictor-corrector direction into `self.step` and the step quantities of the next stat
    /// row.
    fn newton_step(&mut self, mu: E) -> Result<StatRow, Problem> {
        let mut row = StatRow::default();
        for (r, res) in self.rhs.iter_mut().zip(&self.residual) {
            r.copy_from(res);
        }

        if self.mu_update.uses_predictor() {
            self.riccati.solve(&self.models, &self.rhs, &mut self.step)?;
            let (ap, ad) = max_step_to_boundary(&self.iterate, &self.step);
            let alpha = E::min(1., E::min(ap, ad));
            let nc = self.dim.nc_total();
            let mu_aff = complementarity_after(&self.iterate, &self.step, alpha, nc);
            let sigma = self.mu_update.sigma(mu, mu_aff);

            for (r, dz) in self.rhs.iter_mut().zip(&self.step) {
                for k in 0..r.m.nrows() {
                    r.m[k] += dz.lam[k] * dz.t[k] - sigma * mu;
                }
            }
            row.alpha_aff = alpha;
            row.mu_aff = mu_aff;
            row.sigma = sigma;
        } else {
            let sigma = self.mu_update.sigma(mu, 0.);
            for r in self.rhs.iter_mut() {
                for k in 0..r.m.nrows() {
                    r.m[k] -= sigma * mu;
                }
            }
            row.sigma = sigma;
        }

        self.riccati.solve(&self.models, &self.rhs, &mut self.step)?;
        let (alpha_prim, alpha_dual) = compute_max_step_length(
            &self.iterate,
            &self.step,
            self.options.step_safety,
            self.options.split_step,
        );
        row.alpha_prim = alpha_prim;
        row.alpha_dual = alpha_dual;
        Ok(row)
    }

    /// Factorizes at the converged iterate and runs one affine vector pass for the Riccati
    /// queries.
    fn retain_factorization(&mut self, mut reg: E, tag: QpTag) -> Result<(), Problem> {
        if !self.iterate.iter().all(|s| is_col_positive(s.t.as_ref())) {
            warn!("final iterate is not strictly interior, no factorization retained");
            return Ok(());
        }
        if !self.factorize(&mut reg) {
            return Ok(());
        }
        self.riccati.solve(&self.models, &self.residual, &mut self.step)?;
        self.riccati.record();
        debug!(reg = self.riccati.reg(), "factorization retained");
        self.factorized_for = Some(tag);
        Ok(())
    }

    /// Checks that a factorization is retained and that it was built for `qp` in its current
    /// state.
    pub(crate) fn retained_for(&self, qp: &OcpQp) -> Result<(), OcpQpError> {
        self.check_qp(qp)?;
        match self.factorized_for {
            None => Err(OcpQpError::MissingFactorization),
            Some(tag) if tag != qp.tag() => Err(OcpQpError::StaleFactorization),
            Some(_) => Ok(()),
        }
    }

    /// Forward sensitivity of the solution of `qp` along `seed`, written into `sens`.
    ///
    /// Needs the factorization retained by the last successful [`OcpQpIpm::solve`] of this very
    /// QP; the QP must not have been modified in between.
    pub fn propagate(
        &mut self,
        qp: &OcpQp,
        seed: &OcpQpSeed,
        sens: &mut OcpQpSol,
    ) -> Result<(), Problem> {
        self.retained_for(qp)?;
        seed.check_dim(&self.dim)?;
        sens.check_dim(&self.dim)?;

        seed.load_direction(&mut self.rhs);
        self.riccati.solve(&self.models, &self.rhs, &mut sens.stages)?;
        Ok(())
    }

    /// First-order prediction of the solution of `qp` from the retained iterate and
    /// factorization, written into `sol`. The residual norms are updated for the prediction.
    pub fn predict(&mut self, qp: &OcpQp, sol: &mut OcpQpSol) -> Result<(), Problem> {
        self.check_qp(qp)?;
        sol.check_dim(&self.dim)?;
        if self.factorized_for.is_none() {
            return Err(OcpQpError::MissingFactorization.into());
        }

        qp.load_models(&mut self.next_models);
        res::evaluate(&self.dim, &self.next_models, &self.iterate, &mut self.residual);
        self.riccati.solve(&self.models, &self.residual, &mut self.step)?;

        for ((out, z), dz) in sol.stages.iter_mut().zip(&self.iterate).zip(&self.step) {
            out.copy_from(z);
            out.step(dz, 1., 1.);
        }

        let (mu, obj) =
            res::evaluate(&self.dim, &self.next_models, &sol.stages, &mut self.residual);
        self.norms = ResNorms::of(&self.residual);
        self.mu = mu;
        self.obj = obj;
        Ok(())
    }

    /// Status of the last solve, `None` before the first one.
    pub fn status(&self) -> Option<Status> {
        self.status
    }

    pub fn iter(&self) -> usize {
        self.iter
    }

    /// One row per iterate of the last solve.
    pub fn stat(&self) -> &[StatRow] {
        self.stat.rows()
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

    pub fn obj(&self) -> E {
        self.obj
    }

    pub fn mu(&self) -> E {
        self.mu
    }

    /// String-keyed diagnostics: `status` (`-1` before any solve), `iter`, `stat`, `stat_m`,
    /// `max_res_stat`, `max_res_eq`, `max_res_ineq`, `max_res_comp`, `obj`.
    pub fn get(&self, name: &str) -> Result<Diagnostic, OcpQpError> {
        Ok(match name {
            "status" => Diagnostic::Int(self.status.map_or(-1, |s| s.code())),
            "iter" => Diagnostic::Int(self.iter as i64),
            "stat" => Diagnostic::Table(self.stat.to_mat()),
            "stat_m" => Diagnostic::Int(STAT_M as i64),
            "max_res_stat" => Diagnostic::Real(self.norms.stat),
            "max_res_eq" => Diagnostic::Real(self.norms.eq),
            "max_res_ineq" => Diagnostic::Real(self.norms.ineq),
            "max_res_comp" => Diagnostic::Real(self.norms.comp),
            "obj" => Diagnostic::Real(self.obj),
            _ => {
                return Err(OcpQpError::UnknownDiagnostic {
                    name: name.to_string(),
                });
            }
        })
    }

    /// Riccati quantities of the retained factorization at `stage`: `ric_P`, `ric_p`, `ric_K`,
    /// `ric_k` and `ric_Lr`. Vectors are returned as single-column matrices.
    pub fn ric(&self, field: &str, stage: isize) -> Result<Mat<E>, OcpQpError> {
        if self.factorized_for.is_none() {
            return Err(OcpQpError::MissingFactorization);
        }
        let i = *StageRange::single(stage)
            .resolve(field, StageBound::Horizon, self.dim.horizon())?
            .start();

        let ric = &self.riccati;
        match field {
            "ric_P" => Ok(ric.P(i).to_owned()),
            "ric_K" => Ok(ric.K(i).to_owned()),
            "ric_Lr" => ric
                .Lr(i)
                .map(|l| l.to_owned())
                .map_err(|_| OcpQpError::MissingFactorization),
            "ric_p" => Ok(ric.p(i).as_mat().to_owned()),
            "ric_k" => Ok(ric.k(i).as_mat().to_owned()),
            _ => Err(OcpQpError::UnknownDiagnostic {
                name: field.to_string(),
            }),
        }
    }
}

fn iterate_has_nan(iterate: &[SolStage]) -> bool {
    iterate.iter().any(|s| {
        has_nan(s.v.as_ref())
            || has_nan(s.pi.as_ref())
            || has_nan(s.lam.as_ref())
            || has_nan(s.t.as_ref())
    })
}

/// `sum((lam + alpha dlam) .* (t + alpha dt)) / nc`, zero without inequality rows.
fn complementarity_after(iterate: &[SolStage], step: &[SolStage], alpha: E, nc: usize) -> E {
    if nc == 0 {
        return 0.;
    }
    let mut sum = 0.;
    for (s, ds) in iterate.iter().zip(step) {
        for k in 0..s.t.nrows() {
            sum += (s.lam[k] + alpha * ds.lam[k]) * (s.t[k] + alpha * ds.t[k]);
        }
    }
    sum / nc as E
}
