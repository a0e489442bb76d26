use approx::assert_abs_diff_eq;
use rstest::{fixture, rstest};

use super::{DoubleIntegrator, max_diff};
use crate::{E, OcpQp, OcpQpDimBuilder, OcpQpIpm, OcpQpSeed, OcpQpSol, SolverOptions, Status};

struct Solved {
    qp: OcpQp,
    ipm: OcpQpIpm,
    sol: OcpQpSol,
}

fn solve(qp: OcpQp) -> Solved {
    let mut ipm = OcpQpIpm::new(qp.dim().clone(), &SolverOptions::default()).unwrap();
    let mut sol = OcpQpSol::new(qp.dim().clone());
    assert_eq!(ipm.solve(&qp, &mut sol).unwrap(), Status::Success);
    Solved { qp, ipm, sol }
}

fn solve_free() -> Solved {
    solve(DoubleIntegrator::new(10).qp())
}

fn solve_saturated() -> Solved {
    solve(DoubleIntegrator::new(10).with_umax(0.5).qp())
}

#[fixture]
fn unconstrained() -> Solved {
    solve_free()
}

#[fixture]
fn saturated() -> Solved {
    solve_saturated()
}

/// `(b - a) / delta` for every stage entry of `field`.
fn difference_quotient(a: &OcpQpSol, b: &OcpQpSol, field: &str, delta: E) -> Vec<Vec<E>> {
    let horizon = a.dim().horizon() as isize;
    (0..=horizon)
        .filter_map(|i| Some((a.get(field, i).ok()?, b.get(field, i).ok()?)))
        .map(|(x, y)| x.iter().zip(&y).map(|(x, y)| (y - x) / delta).collect())
        .collect()
}

fn assert_close(sens: &OcpQpSol, expected: &[Vec<E>], field: &str, epsilon: E) {
    for (i, expected) in expected.iter().enumerate() {
        let value = sens.get(field, i as isize).unwrap();
        for (v, e) in value.iter().zip(expected) {
            assert_abs_diff_eq!(*v, *e, epsilon = epsilon);
        }
    }
}

#[rstest]
fn dynamics_offset_seed_matches_resolve(unconstrained: Solved) {
    let Solved { qp, mut ipm, sol } = unconstrained;
    let mut seed = OcpQpSeed::new(qp.dim().clone());
    seed.set("seed_b", 0, None, &[0., 1.]).unwrap();
    let mut sens = OcpQpSol::new(qp.dim().clone());
    ipm.propagate(&qp, &seed, &mut sens).unwrap();

    let delta = 0.5;
    let mut perturbed = qp.clone();
    perturbed.set("b", 0, None, &[0., delta]).unwrap();
    let Solved { sol: moved, .. } = solve(perturbed);

    for field in ["u", "x", "pi"] {
        let expected = difference_quotient(&sol, &moved, field, delta);
        assert_close(&sens, &expected, field, 1e-6);
    }
    // the initial state is fixed
    assert!(sens.get("x", 0).unwrap().iter().all(|v| v.abs() < 1e-6));
}

#[rstest]
#[case::free(solve_free(), 0.1, 1e-6)]
#[case::active_bounds(solve_saturated(), 1e-3, 1e-4)]
fn initial_state_seed_matches_resolve(
    #[case] solved: Solved,
    #[case] delta: E,
    #[case] epsilon: E,
) {
    let Solved { qp, mut ipm, sol } = solved;
    let mut seed = OcpQpSeed::new(qp.dim().clone());
    seed.set("seed_lbx", 0, None, &[1., 0.]).unwrap();
    seed.set("seed_ubx", 0, None, &[1., 0.]).unwrap();
    let mut sens = OcpQpSol::new(qp.dim().clone());
    ipm.propagate(&qp, &seed, &mut sens).unwrap();

    assert_abs_diff_eq!(sens.get("x", 0).unwrap()[0], 1., epsilon = 1e-6);

    let mut perturbed = qp.clone();
    perturbed.set("lbx", 0, None, &[1. + delta, 0.]).unwrap();
    perturbed.set("ubx", 0, None, &[1. + delta, 0.]).unwrap();
    let Solved { sol: moved, .. } = solve(perturbed);

    for field in ["u", "x"] {
        let expected = difference_quotient(&sol, &moved, field, delta);
        assert_close(&sens, &expected, field, epsilon);
    }
}

#[rstest]
fn saturated_control_is_insensitive(saturated: Solved) {
    let Solved { qp, mut ipm, sol } = saturated;
    assert_abs_diff_eq!(sol.get("u", 0).unwrap()[0], -0.5, epsilon = 1e-6);

    let mut seed = OcpQpSeed::new(qp.dim().clone());
    seed.set("seed_q", 0, Some(10), &[1., 1.]).unwrap();
    let mut sens = OcpQpSol::new(qp.dim().clone());
    ipm.propagate(&qp, &seed, &mut sens).unwrap();

    assert!(sens.get("u", 0).unwrap()[0].abs() < 1e-5);
}

#[rstest]
fn zero_seed_gives_zero_sensitivity(unconstrained: Solved) {
    let Solved { qp, mut ipm, .. } = unconstrained;
    let seed = OcpQpSeed::new(qp.dim().clone());
    let mut sens = OcpQpSol::new(qp.dim().clone());
    sens.set("u", 0, Some(9), &[3.]).unwrap();
    ipm.propagate(&qp, &seed, &mut sens).unwrap();

    assert_eq!(max_diff(&sens, &OcpQpSol::new(qp.dim().clone()), "u"), 0.);
    assert_eq!(max_diff(&sens, &OcpQpSol::new(qp.dim().clone()), "x"), 0.);
    assert_eq!(max_diff(&sens, &OcpQpSol::new(qp.dim().clone()), "lam_lbx"), 0.);
}

#[rstest]
fn propagation_is_linear(saturated: Solved) {
    let Solved { qp, mut ipm, .. } = saturated;
    let mut seed = OcpQpSeed::new(qp.dim().clone());
    seed.set("seed_r", 0, Some(9), &[0.3]).unwrap();
    seed.set("seed_ubu", 2, None, &[-1.]).unwrap();
    let mut once = OcpQpSol::new(qp.dim().clone());
    ipm.propagate(&qp, &seed, &mut once).unwrap();

    seed.set("seed_r", 0, Some(9), &[0.6]).unwrap();
    seed.set("seed_ubu", 2, None, &[-2.]).unwrap();
    let mut twice = OcpQpSol::new(qp.dim().clone());
    ipm.propagate(&qp, &seed, &mut twice).unwrap();

    for i in 0..10 {
        let a = once.get("u", i).unwrap()[0];
        let b = twice.get("u", i).unwrap()[0];
        assert_abs_diff_eq!(2. * a, b, epsilon = 1e-12);
    }
}

#[test]
fn propagate_requires_a_solve() {
    let qp = DoubleIntegrator::new(4).qp();
    let mut ipm = OcpQpIpm::new(qp.dim().clone(), &SolverOptions::default()).unwrap();
    let seed = OcpQpSeed::new(qp.dim().clone());
    let mut sens = OcpQpSol::new(qp.dim().clone());
    assert!(ipm.propagate(&qp, &seed, &mut sens).is_err());
}

#[test]
fn unconverged_solve_retains_nothing() {
    let qp = DoubleIntegrator::new(10).with_umax(0.5).qp();
    let options = SolverOptions::default().with_iter_max(1);
    let mut ipm = OcpQpIpm::new(qp.dim().clone(), &options).unwrap();
    let mut sol = OcpQpSol::new(qp.dim().clone());
    assert_eq!(ipm.solve(&qp, &mut sol).unwrap(), Status::MaxIterations);

    let mut seed = OcpQpSeed::new(qp.dim().clone());
    seed.set("seed_lbx", 0, None, &[1., 0.]).unwrap();
    let mut sens = OcpQpSol::new(qp.dim().clone());
    assert!(ipm.propagate(&qp, &seed, &mut sens).is_err());
    assert_eq!(sens.get("u", 0).unwrap(), vec![0.]);
    assert!(ipm.predict(&qp, &mut sol).is_err());
    assert!(ipm.ric("ric_P", 0).is_err());
}

#[rstest]
fn failed_resolve_drops_previous_factorization(unconstrained: Solved) {
    let Solved { qp, mut ipm, mut sol } = unconstrained;
    let mut infeasible = qp.clone();
    infeasible.set("lbx", 0, None, &[1., 1.]).unwrap();
    infeasible.set("ubx", 0, None, &[1., -1.]).unwrap();
    assert_ne!(ipm.solve(&infeasible, &mut sol).unwrap(), Status::Success);

    let seed = OcpQpSeed::new(qp.dim().clone());
    let mut sens = OcpQpSol::new(qp.dim().clone());
    assert!(ipm.propagate(&infeasible, &seed, &mut sens).is_err());
    assert!(ipm.propagate(&qp, &seed, &mut sens).is_err());
}

#[rstest]
fn propagate_rejects_modified_qp(unconstrained: Solved) {
    let Solved { mut qp, mut ipm, .. } = unconstrained;
    let seed = OcpQpSeed::new(qp.dim().clone());
    let mut sens = OcpQpSol::new(qp.dim().clone());

    assert!(ipm.propagate(&qp.clone(), &seed, &mut sens).is_err());
    qp.set("r", 3, None, &[0.5]).unwrap();
    assert!(ipm.propagate(&qp, &seed, &mut sens).is_err());
}

#[rstest]
fn propagate_rejects_foreign_containers(unconstrained: Solved) {
    let Solved { qp, mut ipm, .. } = unconstrained;
    let other = OcpQpDimBuilder::new(10)
        .set_all("nx", &[2; 11])
        .unwrap()
        .build()
        .unwrap()
        .into_shared();

    let mut sens = OcpQpSol::new(qp.dim().clone());
    assert!(ipm.propagate(&qp, &OcpQpSeed::new(other.clone()), &mut sens).is_err());

    let mut foreign = OcpQpSol::new(other);
    let seed = OcpQpSeed::new(qp.dim().clone());
    assert!(ipm.propagate(&qp, &seed, &mut foreign).is_err());
}

#[rstest]
fn predict_tracks_new_initial_state(unconstrained: Solved) {
    let Solved { qp, mut ipm, .. } = unconstrained;
    let mut shifted = qp.clone();
    shifted.set("lbx", 0, None, &[1.01, 0.]).unwrap();
    shifted.set("ubx", 0, None, &[1.01, 0.]).unwrap();

    let mut predicted = OcpQpSol::new(qp.dim().clone());
    ipm.predict(&shifted, &mut predicted).unwrap();
    let Solved { sol: exact, .. } = solve(shifted);

    assert!(max_diff(&predicted, &exact, "u") < 1e-5);
    assert!(max_diff(&predicted, &exact, "x") < 1e-5);
    assert!(ipm.max_res_eq() < 1e-8);
}

#[test]
fn predict_requires_a_solve() {
    let qp = DoubleIntegrator::new(4).qp();
    let mut ipm = OcpQpIpm::new(qp.dim().clone(), &SolverOptions::default()).unwrap();
    let mut sol = OcpQpSol::new(qp.dim().clone());
    assert!(ipm.predict(&qp, &mut sol).is_err());
}
