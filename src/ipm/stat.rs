//! Per-iteration statistics of the interior-point solve.

use faer::Mat;
use serde::Serialize;

use crate::E;
use crate::res::ResNorms;

/// Number of columns of the statistics table.
pub const STAT_M: usize = 12;

/// Columns of the statistics table, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatColumn {
    AlphaAff,
    MuAff,
    Sigma,
    AlphaPrim,
    AlphaDual,
    Mu,
    ResStat,
    ResEq,
    ResIneq,
    ResComp,
    Obj,
    Reg,
}

impl StatColumn {
    pub const ALL: [StatColumn; STAT_M] = [
        StatColumn::AlphaAff,
        StatColumn::MuAff,
        StatColumn::Sigma,
        StatColumn::AlphaPrim,
        StatColumn::AlphaDual,
        StatColumn::Mu,
        StatColumn::ResStat,
        StatColumn::ResEq,
        StatColumn::ResIneq,
        StatColumn::ResComp,
        StatColumn::Obj,
        StatColumn::Reg,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// One row of the statistics table.
///
/// Row `k` holds the step quantities that produced iterate `k` (zero for the initial point) and
/// the residuals, duality measure and objective evaluated at iterate `k`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StatRow {
    pub alpha_aff: E,
    pub mu_aff: E,
    pub sigma: E,
    pub alpha_prim: E,
    pub alpha_dual: E,
    pub mu: E,
    pub res_stat: E,
    pub res_eq: E,
    pub res_ineq: E,
    pub res_comp: E,
    pub obj: E,
    pub reg: E,
}

impl StatRow {
    pub(crate) fn set_residuals(&mut self, norms: &ResNorms, mu: E, obj: E) {
        self.mu = mu;
        self.res_stat = norms.stat;
        self.res_eq = norms.eq;
        self.res_ineq = norms.ineq;
        self.res_comp = norms.comp;
        self.obj = obj;
    }

    pub fn get(&self, column: StatColumn) -> E {
        match column {
            StatColumn::AlphaAff => self.alpha_aff,
            StatColumn::MuAff => self.mu_aff,
            StatColumn::Sigma => self.sigma,
            StatColumn::AlphaPrim => self.alpha_prim,
            StatColumn::AlphaDual => self.alpha_dual,
            StatColumn::Mu => self.mu,
            StatColumn::ResStat => self.res_stat,
            StatColumn::ResEq => self.res_eq,
            StatColumn::ResIneq => self.res_ineq,
            StatColumn::ResComp => self.res_comp,
            StatColumn::Obj => self.obj,
            StatColumn::Reg => self.reg,
        }
    }
}

/// State passed to the iteration callback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IterationRecord {
    pub iter: usize,
    pub row: StatRow,
}

/// Rows written by the last solve, one per iterate.
#[derive(Debug, Clone, Default)]
pub(crate) struct StatLog {
    rows: Vec<StatRow>,
}

impl StatLog {
    pub fn with_capacity(iter_max: usize) -> Self {
        Self {
            rows: Vec::with_capacity(iter_max + 1),
        }
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    pub fn push(&mut self, row: StatRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[StatRow] {
        &self.rows
    }

    /// Dense `rows x STAT_M` copy of the table.
    pub fn to_mat(&self) -> Mat<E> {
        Mat::from_fn(self.rows.len(), STAT_M, |i, j| {
            self.rows[i].get(StatColumn::ALL[j])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_order() {
        for (k, column) in StatColumn::ALL.iter().enumerate() {
            assert_eq!(column.index(), k);
        }
    }

    #[test]
    fn test_to_mat() {
        let mut log = StatLog::with_capacity(2);
        log.push(StatRow {
            mu: 1.,
            ..Default::default()
        });
        log.push(StatRow {
            alpha_prim: 0.5,
            reg: 1e-8,
            ..Default::default()
        });

        let mat = log.to_mat();
        assert_eq!((mat.nrows(), mat.ncols()), (2, STAT_M));
        assert_eq!(mat[(0, StatColumn::Mu.index())], 1.);
        assert_eq!(mat[(1, StatColumn::AlphaPrim.index())], 0.5);
        assert_eq!(mat[(1, StatColumn::Reg.index())], 1e-8);
        assert_eq!(log.rows().len(), 2);
    }
}
