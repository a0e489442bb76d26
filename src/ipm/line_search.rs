use faer::{ColRef, unzip, zip};

use crate::E;
use crate::sol::SolStage;

/// Largest `alpha >= 0` keeping `x + alpha * dx >= 0`; infinite when no entry blocks.
fn max_step<'a>(x: ColRef<'a, E>, dx: ColRef<'a, E>) -> E {
    let mut alpha = E::INFINITY;
    zip!(x, dx).for_each(|unzip!(x, dx)| {
        if *dx < 0. {
            alpha = E::min(alpha, -*x / *dx);
        }
    });
    alpha
}

/// Unscaled primal (slack) and dual (multiplier) step lengths to the boundary.
pub(crate) fn max_step_to_boundary(state: &[SolStage], step: &[SolStage]) -> (E, E) {
    let mut alpha_primal = E::INFINITY;
    let mut alpha_dual = E::INFINITY;
    for (s, ds) in state.iter().zip(step) {
        alpha_primal = E::min(alpha_primal, max_step(s.t.as_ref(), ds.t.as_ref()));
        alpha_dual = E::min(alpha_dual, max_step(s.lam.as_ref(), ds.lam.as_ref()));
    }
    (alpha_primal, alpha_dual)
}

/// Fraction-to-the-boundary step lengths, `min(1, safety * alpha_max)`.
///
/// Without `split_step` both lengths are the smaller of the two.
pub(crate) fn compute_max_step_length(
    state: &[SolStage],
    step: &[SolStage],
    safety_factor: E,
    split_step: bool,
) -> (E, E) {
    let (alpha_primal, alpha_dual) = max_step_to_boundary(state, step);

    let alpha_primal = E::min(1., safety_factor * alpha_primal);
    let alpha_dual = E::min(1., safety_factor * alpha_dual);

    if split_step {
        (alpha_primal, alpha_dual)
    } else {
        let alpha = E::min(alpha_primal, alpha_dual);
        (alpha, alpha)
    }
}
