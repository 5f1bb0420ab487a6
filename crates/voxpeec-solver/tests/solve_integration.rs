//! End-to-end solves of small voxel structures.

use indexmap::IndexMap;
use num_complex::Complex64 as C64;
use voxpeec_core::{ConductorDef, DomainIndexSet, Excitation, SourceDef, VoxelGrid, VoxelModel};
use voxpeec_solver::{run_sweeps, PeecSolver, SolveContext, SweepDef, SweepOutcome};

/// Two columns of three voxels, fed at the bottom and grounded at the top:
///
/// ```text
///   iz=2   [4][5]   V = 0
///   iz=1   [2][3]
///   iz=0   [0][1]   I = 1 A
/// ```
///
/// Every z-face has R = ρ dz / (dx dy) = 2 Ω, so R_total = 2 Ω.
fn column_model() -> VoxelModel {
    let grid = VoxelGrid::with_size([2, 1, 3], [0.5e-2, 1e-2, 1e-2]).unwrap();
    let domains = DomainIndexSet::new()
        .with("cond", (0..6).collect())
        .unwrap()
        .with("src", vec![0, 1])
        .unwrap()
        .with("sink", vec![4, 5])
        .unwrap();
    VoxelModel::new(
        grid,
        &domains,
        &[ConductorDef::new("cond", &["cond"], 1e-2)],
        &[
            SourceDef::current("src", &["src"], Excitation::ideal(1.0)),
            SourceDef::voltage("sink", &["sink"], Excitation::ideal(0.0)),
        ],
    )
    .unwrap()
}

/// Copper bar along x, driven by a voltage difference between its ends.
fn bar_model(rho: f64) -> VoxelModel {
    let grid = VoxelGrid::with_size([6, 1, 1], [1e-3, 1e-3, 1e-3]).unwrap();
    let domains = DomainIndexSet::new()
        .with("bar", (0..6).collect())
        .unwrap()
        .with("in", vec![0])
        .unwrap()
        .with("out", vec![5])
        .unwrap();
    VoxelModel::new(
        grid,
        &domains,
        &[ConductorDef::new("bar", &["bar"], rho)],
        &[
            SourceDef::voltage("in", &["in"], Excitation::ideal(1e-3)),
            SourceDef::voltage("out", &["out"], Excitation::ideal(0.0)),
        ],
    )
    .unwrap()
}

fn assert_close(actual: f64, expected: f64, rel: f64) {
    assert!(
        (actual - expected).abs() <= rel * expected.abs(),
        "expected {expected}, got {actual}"
    );
}

#[test]
fn test_dc_column_power() {
    let solver = PeecSolver::new(column_model(), SolveContext::labeled("columns")).unwrap();
    let result = solver.solve(0.0).unwrap();
    assert!(result.has_converged);
    assert!(result.condition.condition_ok);

    let sol = &result.solution;
    let src = sol.terminal("src").unwrap();
    assert_close(src.current.re, 1.0, 1e-12);
    assert_close(src.voltage.re, 2.0, 1e-5);
    assert_close(src.power.re, 2.0, 1e-5);
    assert_close(sol.resistive_loss, 2.0, 1e-5);
    assert_close(sol.source_power.re, sol.resistive_loss, 1e-5);

    // The columns carry 0.5 A each and nothing crosses between them.
    let grid = solver.tensors().model().grid();
    for iz in 0..3 {
        let idx = grid.linear_index(0, 0, iz);
        let ix_face = grid.face_index(idx, voxpeec_core::Direction::X);
        assert!(sol.face_currents[ix_face].norm() < 1e-6);
    }
    for idx in [0, 1, 2, 3] {
        let f = grid.face_index(idx, voxpeec_core::Direction::Z);
        assert_close(sol.face_currents[f].re, 0.5, 1e-5);
    }

    let sink = sol.terminal("sink").unwrap();
    assert_close(sink.current.re, -1.0, 1e-5);
}

#[test]
fn test_ac_currents_balance() {
    let solver = PeecSolver::new(bar_model(1.7e-8), SolveContext::default()).unwrap();
    let result = solver.solve(1e4).unwrap();
    assert!(result.has_converged);

    let i_in = result.solution.terminal("in").unwrap().current;
    let i_out = result.solution.terminal("out").unwrap().current;
    assert!((i_in + i_out).norm() < 1e-6 * i_in.norm());

    // Every face of the bar carries the same current.
    for &i in &result.solution.vector[..5] {
        assert!((i - i_in).norm() < 1e-5 * i_in.norm());
    }

    // Complex power: resistive part equals the face losses.
    let s = result.solution.terminal("in").unwrap().power;
    assert_close(s.re, result.solution.resistive_loss, 1e-3);
    assert!(s.im > 0.0);
}

#[test]
fn test_floating_island_is_flagged() {
    let grid = VoxelGrid::with_size([3, 1, 1], [1e-3; 3]).unwrap();
    let domains = DomainIndexSet::new()
        .with("cond", vec![0, 2])
        .unwrap()
        .with("a", vec![0])
        .unwrap()
        .with("b", vec![2])
        .unwrap();
    let model = VoxelModel::new(
        grid,
        &domains,
        &[ConductorDef::new("cond", &["cond"], 1.7e-8)],
        &[
            SourceDef::current("a", &["a"], Excitation::ideal(1.0)),
            SourceDef::voltage("b", &["b"], Excitation::ideal(0.0)),
        ],
    )
    .unwrap();
    let solver = PeecSolver::new(model, SolveContext::default()).unwrap();
    let result = solver.solve(1e3).unwrap();

    assert!(!result.condition.condition_ok);
    assert_eq!(result.condition.estimate, Some(f64::INFINITY));
    assert!(result.preconditioner_fallback);
    assert!(!result.has_converged);
}

#[test]
fn test_halving_resistivity_doubles_current() {
    let base = bar_model(1.7e-8);
    let halved = base.scaled_resistivity(0.5).unwrap();

    let s1 = PeecSolver::new(base, SolveContext::default()).unwrap();
    let s2 = PeecSolver::new(halved, SolveContext::default()).unwrap();
    for (r1, r2) in s1.tensors().face_resistance().iter().zip(s2.tensors().face_resistance()) {
        assert_close(*r2, 0.5 * r1, 1e-14);
    }

    let i1 = s1.solve(0.0).unwrap().solution.terminal("in").unwrap().current;
    let i2 = s2.solve(0.0).unwrap().solution.terminal("in").unwrap().current;
    assert_close(i2.re, 2.0 * i1.re, 1e-5);
}

#[test]
fn test_magnetic_field_right_hand_rule() {
    // Three columns carrying current in +z.
    let grid = VoxelGrid::with_size([3, 1, 4], [1e-3; 3]).unwrap();
    let domains = DomainIndexSet::new()
        .with("cond", (0..12).collect())
        .unwrap()
        .with("bottom", vec![0, 1, 2])
        .unwrap()
        .with("top", vec![9, 10, 11])
        .unwrap();
    let model = VoxelModel::new(
        grid,
        &domains,
        &[ConductorDef::new("cond", &["cond"], 1.7e-8)],
        &[
            SourceDef::current("bottom", &["bottom"], Excitation::ideal(1.0)),
            SourceDef::voltage("top", &["top"], Excitation::ideal(0.0)),
        ],
    )
    .unwrap();
    let mut ctx = SolveContext::labeled("field");
    ctx.coupling.magnetic_field = true;
    let solver = PeecSolver::new(model, ctx).unwrap();
    let result = solver.solve(0.0).unwrap();
    assert!(result.has_converged);

    let b = result.solution.magnetic_field.as_ref().unwrap();
    let (left, center, right) = (b[3], b[4], b[5]);
    assert!(left[1].re < 0.0, "By left = {}", left[1]);
    assert!(right[1].re > 0.0, "By right = {}", right[1]);
    assert!((left[1].re + right[1].re).abs() < 1e-6 * left[1].re.abs());
    assert!(center[1].norm() < 1e-6 * left[1].norm());
    // No current along x or y, so no Bz.
    assert!(left[2].norm() < 1e-6 * left[1].norm());
}

#[test]
fn test_sweeps_warm_start_and_failures() {
    let solver = PeecSolver::new(bar_model(1.7e-8), SolveContext::labeled("sweeps")).unwrap();
    let sweeps = vec![
        SweepDef::new("dc", 0.0),
        SweepDef::new("f1", 1e4).with_init("dc"),
        SweepDef::new("f2", 1e4).with_init("f1"),
        SweepDef::new("broken", 1e4).with_override("nope", Excitation::ideal(1.0)),
        SweepDef::new("orphaned", 1e4).with_init("broken"),
        SweepDef::new("doubled", 1e4)
            .with_init("dc")
            .with_override("in", Excitation::new(C64::new(2e-3, 0.0), 0.0)),
    ];
    let outcomes = run_sweeps(&solver, &sweeps).unwrap();

    let names: Vec<&str> = outcomes.keys().map(String::as_str).collect();
    assert_eq!(names, ["dc", "f1", "f2", "broken", "orphaned", "doubled"]);

    assert!(outcomes["dc"].is_converged());
    assert!(outcomes["f1"].is_converged());
    assert!(matches!(outcomes["broken"], SweepOutcome::Failed { .. }));

    // Cold start after the failed producer still solves.
    let orphan = outcomes["orphaned"].result().unwrap();
    assert!(orphan.has_converged);

    // f2 starts from the converged f1 solution at the same frequency.
    let f2 = outcomes["f2"].result().unwrap();
    assert_eq!(f2.diagnostics.iterations, 0);

    let base = outcomes["f1"].result().unwrap().solution.terminal("in").unwrap().current;
    let doubled = outcomes["doubled"].result().unwrap().solution.terminal("in").unwrap().current;
    assert!((doubled - 2.0 * base).norm() < 1e-4 * base.norm());

    let direct = solver
        .solve_with(&IndexMap::new(), 1e4, None)
        .unwrap()
        .solution
        .terminal("in")
        .unwrap()
        .current;
    assert!((direct - base).norm() < 1e-4 * base.norm());
}

#[test]
fn test_sweep_cycle_is_rejected() {
    let solver = PeecSolver::new(bar_model(1.7e-8), SolveContext::default()).unwrap();
    let sweeps = vec![
        SweepDef::new("a", 1e3).with_init("b"),
        SweepDef::new("b", 1e3).with_init("a"),
    ];
    assert!(run_sweeps(&solver, &sweeps).is_err());
}
