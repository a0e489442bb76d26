//! End-to-end scenarios on a discretized double integrator
//! `p+ = p + dt v + 0.5 dt^2 u`, `v+ = v + dt u`.

mod sensitivity;

use crate::{E, OcpQp, OcpQpDimBuilder, OcpQpSol};

pub(crate) const DT: E = 0.1;

#[derive(Debug, Clone, Copy)]
pub(crate) struct DoubleIntegrator {
    pub horizon: usize,
    /// Initial state fixed through `lbx = ubx`; free when `None`.
    pub x0: Option<[E; 2]>,
    /// Box `|u| <= umax` on every control.
    pub umax: Option<E>,
    /// Soft lower bound on the velocity of the intermediate stages.
    pub vmin_soft: Option<E>,
}

impl DoubleIntegrator {
    pub fn new(horizon: usize) -> Self {
        Self {
            horizon,
            x0: Some([1., 0.]),
            umax: None,
            vmin_soft: None,
        }
    }

    pub fn with_umax(mut self, umax: E) -> Self {
        self.umax = Some(umax);
        self
    }

    pub fn free_initial_state(mut self) -> Self {
        self.x0 = None;
        self
    }

    pub fn with_soft_velocity(mut self, vmin: E) -> Self {
        self.vmin_soft = Some(vmin);
        self
    }

    pub fn qp(&self) -> OcpQp {
        let n = self.horizon;
        let last = n as isize;
        let soft = |i: usize| self.vmin_soft.is_some() && i > 0 && i < n;

        let nu: Vec<isize> = (0..=n).map(|i| (i < n) as isize).collect();
        let nbu: Vec<isize> = (0..=n)
            .map(|i| (self.umax.is_some() && i < n) as isize)
            .collect();
        let nbx: Vec<isize> = (0..=n)
            .map(|i| match i {
                0 if self.x0.is_some() => 2,
                _ if soft(i) => 1,
                _ => 0,
            })
            .collect();
        let ns: Vec<isize> = (0..=n).map(|i| soft(i) as isize).collect();

        let dim = OcpQpDimBuilder::new(n)
            .set_all("nx", &vec![2; n + 1])
            .unwrap()
            .set_all("nu", &nu)
            .unwrap()
            .set_all("nbu", &nbu)
            .unwrap()
            .set_all("nbx", &nbx)
            .unwrap()
            .set_all("ns", &ns)
            .unwrap()
            .build()
            .unwrap();

        let mut qp = OcpQp::new(dim.into_shared());
        qp.set("A", 0, Some(last - 1), &[1., 0., DT, 1.]).unwrap();
        qp.set("B", 0, Some(last - 1), &[0.5 * DT * DT, DT]).unwrap();
        qp.set("Q", 0, Some(last), &[1., 0., 0., 1.]).unwrap();
        qp.set("R", 0, Some(last - 1), &[0.1]).unwrap();

        if let Some(x0) = self.x0 {
            qp.set("lbx", 0, None, &x0).unwrap();
            qp.set("ubx", 0, None, &x0).unwrap();
        }
        if let Some(umax) = self.umax {
            qp.set("lbu", 0, Some(last - 1), &[-umax]).unwrap();
            qp.set("ubu", 0, Some(last - 1), &[umax]).unwrap();
        }
        if let Some(vmin) = self.vmin_soft {
            let nbu = self.umax.is_some() as usize as E;
            for i in 1..last {
                qp.set("idxbx", i, None, &[1.]).unwrap();
                qp.set("lbx", i, None, &[vmin]).unwrap();
                qp.set("ubx", i, None, &[1e3]).unwrap();
                qp.set("idxs", i, None, &[nbu]).unwrap();
            }
            qp.set("Zl", 1, Some(last - 1), &[1e2]).unwrap();
            qp.set("Zu", 1, Some(last - 1), &[1e2]).unwrap();
            qp.set("zl", 1, Some(last - 1), &[1.]).unwrap();
            qp.set("zu", 1, Some(last - 1), &[1.]).unwrap();
        }
        qp
    }
}

/// Largest absolute difference of `field` between two solutions over the stages where it exists.
pub(crate) fn max_diff(a: &OcpQpSol, b: &OcpQpSol, field: &str) -> E {
    let horizon = a.dim().horizon() as isize;
    (0..=horizon)
        .filter_map(|i| Some((a.get(field, i).ok()?, b.get(field, i).ok()?)))
        .flat_map(|(x, y)| x.into_iter().zip(y).map(|(x, y)| (x - y).abs()))
        .fold(0., E::max)
}
