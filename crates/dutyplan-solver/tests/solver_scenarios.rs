//! End-to-end solver scenarios covering both backends.
//!
//! Scenarios that depend on same-day adjacent breaks run only against the
//! constraint-programming core: the greedy cascade refuses consecutive
//! breaks by design.

use std::collections::HashSet;

use chrono::NaiveDate;
use dutyplan_core::{BreakSlotSpec, SolverParams, SolverResult, TeacherSpec};
use dutyplan_solver::{solve_duties, GreedySolver, SupervisionProblem};

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 2).unwrap()
}

fn tuesday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 3).unwrap()
}

fn quick_params() -> SolverParams {
    SolverParams {
        time_limit: std::time::Duration::from_secs(5),
        ..SolverParams::default()
    }
}

fn assert_invariants(problem: &SupervisionProblem, result: &SolverResult) {
    // Every assignment respects lesson adjacency
    for assignment in &result.assignments {
        let teacher = problem
            .teachers
            .iter()
            .find(|t| t.id == assignment.teacher_id)
            .expect("assignment references a known teacher");
        let slot = problem
            .slots
            .iter()
            .find(|s| s.slot_id == assignment.slot_id)
            .expect("assignment references a known slot");
        assert!(
            teacher.eligible_for(slot),
            "teacher {} assigned to {} without an adjacent lesson",
            teacher.id,
            slot.slot_id
        );
    }

    // Covered + shortfall matches need per (slot, floor), and no overfill
    for demand in problem.demands() {
        let slot = &problem.slots[demand.slot];
        let covered = result
            .assignments
            .iter()
            .filter(|a| a.slot_id == slot.slot_id && a.floor_id == demand.floor_id)
            .count() as u32;
        let short = result
            .shortfalls
            .get(&(slot.slot_id.clone(), demand.floor_id))
            .copied()
            .unwrap_or(0);
        assert!(covered <= demand.need);
        assert_eq!(covered + short, demand.need);
    }

    // No double-booking per (teacher, slot)
    let mut seen = HashSet::new();
    for assignment in &result.assignments {
        assert!(
            seen.insert((assignment.teacher_id, assignment.slot_id.clone())),
            "teacher {} booked twice for {}",
            assignment.teacher_id,
            assignment.slot_id
        );
    }
}

// S1: adjacency forces selection of the only teacher with a lesson nearby.
#[test]
fn s1_adjacency_forces_selection() {
    let teachers = vec![
        TeacherSpec::new(1, 1),
        TeacherSpec::new(2, 1).with_lessons(0, [2]),
    ];
    let slots = vec![BreakSlotSpec::new(monday(), 2, [(1, 1)])];
    let problem = SupervisionProblem::new(teachers, slots, quick_params());

    let result = solve_duties(&problem, 1);
    assert!(result.status.is_success());
    assert_invariants(&problem, &result);
    let pairs: HashSet<_> = result
        .assignments
        .iter()
        .map(|a| (a.teacher_id, a.floor_id))
        .collect();
    assert_eq!(pairs, [(2, 1)].into_iter().collect());
    assert_eq!(result.loads[&1], 0);
    assert_eq!(result.loads[&2], 1);
    assert_eq!(result.total_shortfall, 0);
    assert_eq!(result.daily_excess, 0);
    assert_eq!(result.band_violation, 0);
}

// S2: with band 0 both teachers land exactly on target.
#[test]
fn s2_fairness_band_enforced() {
    let teachers = vec![
        TeacherSpec::new(1, 1).with_lessons(0, [2]).with_lessons(1, [2]),
        TeacherSpec::new(2, 1).with_lessons(0, [2]).with_lessons(1, [2]),
    ];
    let slots = vec![
        BreakSlotSpec::new(monday(), 2, [(1, 1)]),
        BreakSlotSpec::new(tuesday(), 2, [(1, 1)]),
    ];
    let problem = SupervisionProblem::new(teachers, slots, quick_params());

    let result = solve_duties(&problem, 1);
    assert!(result.status.is_success());
    assert_invariants(&problem, &result);
    assert_eq!(result.loads[&1], 1);
    assert_eq!(result.loads[&2], 1);
    assert_eq!(result.max_dev, 0);
    assert_eq!(result.band_violation, 0);
    assert_eq!(result.total_shortfall, 0);
}

// S3: floor preferences are both satisfiable, so priority cost is zero.
#[test]
fn s3_preference_respected() {
    let teachers = vec![
        TeacherSpec::new(1, 1).with_lessons(0, [2]).with_preferred_floor(1),
        TeacherSpec::new(2, 1).with_lessons(0, [2]).with_preferred_floor(2),
    ];
    let slots = vec![BreakSlotSpec::new(monday(), 2, [(1, 1), (2, 1)])];
    let problem = SupervisionProblem::new(teachers, slots, quick_params());

    let result = solve_duties(&problem, 1);
    assert!(result.status.is_success());
    assert_invariants(&problem, &result);
    let pairs: HashSet<_> = result
        .assignments
        .iter()
        .map(|a| (a.teacher_id, a.floor_id))
        .collect();
    assert_eq!(pairs, [(1, 1), (2, 2)].into_iter().collect());
    assert_eq!(result.priority_cost, 0);
    assert_eq!(result.total_shortfall, 0);
}

// S4: adjacent same-day breaks pile onto the only eligible teacher.
// CP core only: the greedy path refuses consecutive breaks.
#[cfg(feature = "cp-solver")]
#[test]
fn s4_daily_excess_penalized_not_forbidden() {
    let teachers = vec![
        TeacherSpec::new(1, 2).with_lessons(0, [2, 4]),
        TeacherSpec::new(2, 0),
    ];
    let slots = vec![
        BreakSlotSpec::new(monday(), 2, [(1, 1)]),
        BreakSlotSpec::new(monday(), 3, [(1, 1)]),
    ];
    let problem = SupervisionProblem::new(
        teachers,
        slots,
        SolverParams {
            fairness_band: None,
            ..quick_params()
        },
    );

    let result = solve_duties(&problem, 1);
    assert!(result.status.is_success());
    assert_invariants(&problem, &result);
    assert_eq!(result.loads[&1], 2);
    assert_eq!(result.daily_excess, 1);
    assert_eq!(result.total_shortfall, 0);
}

// S5: band 0 plus extra-duty cap 0 forces a perfectly even split.
#[test]
fn s5_extra_duty_cap() {
    let teachers = vec![
        TeacherSpec::new(1, 1).with_lessons(0, [2]).with_lessons(1, [2]).with_preferred_floor(1),
        TeacherSpec::new(2, 1).with_lessons(0, [2]).with_lessons(1, [2]),
    ];
    let slots = vec![
        BreakSlotSpec::new(monday(), 2, [(1, 1)]),
        BreakSlotSpec::new(tuesday(), 2, [(1, 1)]),
    ];
    let problem = SupervisionProblem::new(teachers, slots, quick_params());

    let result = solve_duties(&problem, 1);
    assert!(result.status.is_success());
    assert_invariants(&problem, &result);
    assert_eq!(result.loads[&1], 1);
    assert_eq!(result.loads[&2], 1);
    assert_eq!(result.band_violation, 0);
}

// S6: nobody is eligible; the run succeeds and reports the gap.
#[test]
fn s6_unavoidable_shortfall() {
    let teachers = vec![TeacherSpec::new(1, 0)];
    let slots = vec![BreakSlotSpec::new(monday(), 2, [(1, 2)])];
    let problem = SupervisionProblem::new(
        teachers,
        slots,
        SolverParams {
            fairness_band: None,
            max_one_per_day: true,
            ..quick_params()
        },
    );

    let result = solve_duties(&problem, 1);
    assert!(result.status.is_success());
    assert!(result.assignments.is_empty());
    assert_eq!(result.total_shortfall, 2);
    assert_eq!(
        result.shortfalls[&("2024-09-02#2".to_owned(), 1)],
        2
    );
}

// Reducing a need by one unit cannot raise the shortfall by more than one.
#[test]
fn shortfall_is_lipschitz_in_need() {
    let teachers = vec![TeacherSpec::new(1, 2).with_lessons(0, [2])];
    let tight = SupervisionProblem::new(
        teachers.clone(),
        vec![BreakSlotSpec::new(monday(), 2, [(1, 3)])],
        quick_params(),
    );
    let relaxed = SupervisionProblem::new(
        teachers,
        vec![BreakSlotSpec::new(monday(), 2, [(1, 2)])],
        quick_params(),
    );

    let tight_result = solve_duties(&tight, 1);
    let relaxed_result = solve_duties(&relaxed, 1);
    assert!(tight_result.status.is_success());
    assert!(relaxed_result.status.is_success());
    assert!(relaxed_result.total_shortfall <= tight_result.total_shortfall);
    assert!(tight_result.total_shortfall - relaxed_result.total_shortfall <= 1);
}

// Dropping the one-duty-per-day pressure cannot increase the shortfall.
#[test]
fn relaxing_daily_rule_cannot_increase_shortfall() {
    let teachers = vec![TeacherSpec::new(1, 2).with_lessons(0, [2, 6])];
    let slots = vec![
        BreakSlotSpec::new(monday(), 2, [(1, 1)]),
        BreakSlotSpec::new(monday(), 4, [(1, 1)]),
    ];
    let strict = SupervisionProblem::new(
        teachers.clone(),
        slots.clone(),
        SolverParams {
            max_one_per_day: true,
            ..quick_params()
        },
    );
    let relaxed = SupervisionProblem::new(teachers, slots, quick_params());

    let strict_result = solve_duties(&strict, 1);
    let relaxed_result = solve_duties(&relaxed, 1);
    assert!(relaxed_result.total_shortfall <= strict_result.total_shortfall);
}

// The greedy path satisfies the same scenario expectations where the
// consecutive-break rule does not interfere.
#[test]
fn greedy_path_matches_scenarios() {
    // S1
    let teachers = vec![
        TeacherSpec::new(1, 1),
        TeacherSpec::new(2, 1).with_lessons(0, [2]),
    ];
    let slots = vec![BreakSlotSpec::new(monday(), 2, [(1, 1)])];
    let problem = SupervisionProblem::new(teachers, slots, quick_params());
    let result = GreedySolver::new(&problem, 9).solve();
    assert_invariants(&problem, &result);
    assert_eq!(result.loads[&2], 1);
    assert_eq!(result.total_shortfall, 0);

    // S2/S5 shape
    let teachers = vec![
        TeacherSpec::new(1, 1).with_lessons(0, [2]).with_lessons(1, [2]),
        TeacherSpec::new(2, 1).with_lessons(0, [2]).with_lessons(1, [2]),
    ];
    let slots = vec![
        BreakSlotSpec::new(monday(), 2, [(1, 1)]),
        BreakSlotSpec::new(tuesday(), 2, [(1, 1)]),
    ];
    let problem = SupervisionProblem::new(teachers, slots, quick_params());
    let result = GreedySolver::new(&problem, 9).solve();
    assert_invariants(&problem, &result);
    assert_eq!(result.loads[&1], 1);
    assert_eq!(result.loads[&2], 1);
    assert_eq!(result.band_violation, 0);

    // Greedy-only invariant: no consecutive breaks on the same day
    let teachers = vec![TeacherSpec::new(1, 4).with_lessons(0, [2, 3, 4, 5])];
    let slots = vec![
        BreakSlotSpec::new(monday(), 2, [(1, 1)]),
        BreakSlotSpec::new(monday(), 3, [(1, 1)]),
    ];
    let problem = SupervisionProblem::new(teachers, slots, quick_params());
    let result = GreedySolver::new(&problem, 9).solve();
    for window in result.assignments.windows(2) {
        if window[0].teacher_id == window[1].teacher_id && window[0].date == window[1].date {
            let gap = window[1].break_index.abs_diff(window[0].break_index);
            assert!(gap != 1, "greedy placed consecutive breaks");
        }
    }
}

// An empty teacher pool fails cleanly when demand exists.
#[test]
fn empty_pool_reports_infeasible() {
    let problem = SupervisionProblem::new(
        Vec::new(),
        vec![BreakSlotSpec::new(monday(), 2, [(1, 1)])],
        quick_params(),
    );
    let result = solve_duties(&problem, 1);
    assert!(!result.status.is_success());
    assert_eq!(result.total_shortfall, 1);
    assert!(result.assignments.is_empty());
}
