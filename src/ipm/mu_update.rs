//! Centering rules for the barrier target `sigma * mu`.

use enum_dispatch::enum_dispatch;

use crate::E;
use crate::options::SolverOptions;

#[enum_dispatch]
pub trait MuUpdate {
    /// Centering parameter `sigma` in `[0, 1]` given the current duality measure and the one
    /// reached by the affine (predictor) step.
    fn sigma(&self, mu: E, mu_aff: E) -> E;

    /// Whether the rule needs the affine step.
    fn uses_predictor(&self) -> bool;
}

/// Mehrotra's heuristic `sigma = (mu_aff / mu)^3`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MehrotraMuUpdate;

impl MuUpdate for MehrotraMuUpdate {
    fn sigma(&self, mu: E, mu_aff: E) -> E {
        if mu <= 0. {
            return 0.;
        }
        (mu_aff / mu).powi(3).clamp(0., 1.)
    }

    fn uses_predictor(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConstantMuUpdate {
    sigma: E,
}

impl MuUpdate for ConstantMuUpdate {
    fn sigma(&self, _mu: E, _mu_aff: E) -> E {
        self.sigma
    }

    fn uses_predictor(&self) -> bool {
        false
    }
}

#[enum_dispatch(MuUpdate)]
#[derive(Debug, Clone, Copy)]
pub enum MuUpdates {
    MehrotraMuUpdate,
    ConstantMuUpdate,
}

impl MuUpdates {
    pub fn from_options(options: &SolverOptions) -> Self {
        if options.pred_corr {
            MehrotraMuUpdate.into()
        } else {
            ConstantMuUpdate {
                sigma: options.sigma_fixed,
            }
            .into()
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1., 0.5, 0.125)]
    #[case(1., 2., 1.)]
    #[case(0., 0., 0.)]
    #[case(2., 0., 0.)]
    fn test_mehrotra(#[case] mu: E, #[case] mu_aff: E, #[case] expected: E) {
        assert_eq!(MehrotraMuUpdate.sigma(mu, mu_aff), expected);
    }

    #[test]
    fn test_from_options() {
        let mut options = SolverOptions::default();
        let rule = MuUpdates::from_options(&options);
        assert!(rule.uses_predictor());

        options.pred_corr = false;
        options.sigma_fixed = 0.3;
        let rule = MuUpdates::from_options(&options);
        assert!(!rule.uses_predictor());
        assert_eq!(rule.sigma(1., 0.), 0.3);
    }
}
