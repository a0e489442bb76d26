use tracing::info;

use crate::ipm::stat::IterationRecord;

/// Hook invoked once per interior-point iteration, after the residuals of the current iterate
/// have been recorded.
pub trait Callback {
    fn call(&mut self, record: &IterationRecord);
}

#[derive(Debug, Default)]
pub struct NoOpCallback {}

impl Callback for NoOpCallback {
    fn call(&mut self, _record: &IterationRecord) {
        // Do nothing
    }
}

/// Logs the residual norms of every iteration at `info` level.
#[derive(Debug, Default)]
pub struct ConvergenceOutput {}

impl Callback for ConvergenceOutput {
    fn call(&mut self, record: &IterationRecord) {
        info!(
            iter = record.iter,
            mu = record.row.mu,
            res_stat = record.row.res_stat,
            res_eq = record.row.res_eq,
            res_ineq = record.row.res_ineq,
            res_comp = record.row.res_comp,
            "ipm iteration"
        );
    }
}

impl<F: FnMut(&IterationRecord)> Callback for F {
    fn call(&mut self, record: &IterationRecord) {
        self(record)
    }
}
