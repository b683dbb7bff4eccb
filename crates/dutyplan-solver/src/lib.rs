//! # dutyplan-solver
//!
//! Assigns teachers to break-supervision duties.
//!
//! This crate provides:
//! - [`SupervisionProblem`]: flattened solver input with precomputed
//!   eligibility and decision indices
//! - A lexicographic constraint-programming core (coverage, then preference,
//!   then fairness), available with the `cp-solver` feature
//! - A deterministic greedy fallback used when the CP backend is not
//!   compiled in
//! - Target rebalancing and preflight shortage analysis
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use dutyplan_core::{BreakSlotSpec, SolverParams, TeacherSpec};
//! use dutyplan_solver::{solve_duties, SupervisionProblem};
//!
//! let teachers = vec![TeacherSpec::new(1, 1).with_lessons(0, [2])];
//! let monday = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
//! let slots = vec![BreakSlotSpec::new(monday, 2, [(1, 1)])];
//! let problem = SupervisionProblem::new(teachers, slots, SolverParams::default());
//! let result = solve_duties(&problem, 7);
//! assert!(result.status.is_success());
//! ```

use std::ops::Range;

use dutyplan_core::{BreakSlotSpec, FloorId, SolverParams, SolverResult, TeacherSpec};
use tracing::warn;

#[cfg(feature = "cp-solver")]
pub mod cp;
pub mod greedy;
pub mod preflight;
pub mod rebalance;

pub use greedy::GreedySolver;
pub use preflight::{analyze_shortages, DayShortage, PreflightReport, SlotShortage};
pub use rebalance::rebalance_targets;

/// One coverage requirement: `need` heads on `floor_id` during slot `slot`.
#[derive(Clone, Debug)]
pub struct Demand {
    /// Index into [`SupervisionProblem::slots`]
    pub slot: usize,
    pub floor_id: FloorId,
    pub need: u32,
    /// Decisions that can serve this demand, as a range into
    /// [`SupervisionProblem::decisions`]
    pub decisions: Range<usize>,
}

/// One candidate assignment `(teacher, slot, floor)` with its priority cost.
#[derive(Clone, Debug)]
pub struct Decision {
    /// Index into [`SupervisionProblem::teachers`]
    pub teacher: usize,
    /// Index into [`SupervisionProblem::slots`]
    pub slot: usize,
    pub floor_id: FloorId,
    pub cost: i64,
}

/// Flattened, index-based view of one planning invocation.
///
/// Eligibility and the decision set are computed once up front; both solver
/// backends iterate plain arrays instead of re-deriving tuples per
/// constraint. Slots are kept in `(date, break_index)` order.
#[derive(Clone, Debug)]
pub struct SupervisionProblem {
    pub teachers: Vec<TeacherSpec>,
    pub slots: Vec<BreakSlotSpec>,
    pub params: SolverParams,
    demands: Vec<Demand>,
    decisions: Vec<Decision>,
    /// Eligible teacher indices per slot, in teacher order
    eligible: Vec<Vec<usize>>,
    total_need: u32,
    max_target: u32,
    total_target: u32,
}

impl SupervisionProblem {
    pub fn new(
        teachers: Vec<TeacherSpec>,
        mut slots: Vec<BreakSlotSpec>,
        params: SolverParams,
    ) -> Self {
        let params = params.normalized();
        slots.sort_by(|a, b| (a.date, a.break_index).cmp(&(b.date, b.break_index)));

        let eligible: Vec<Vec<usize>> = slots
            .iter()
            .map(|slot| {
                teachers
                    .iter()
                    .enumerate()
                    .filter(|(_, teacher)| teacher.eligible_for(slot))
                    .map(|(index, _)| index)
                    .collect()
            })
            .collect();

        let mut demands = Vec::new();
        let mut decisions = Vec::new();
        for (slot_index, slot) in slots.iter().enumerate() {
            for (&floor_id, &need) in &slot.needs {
                if need == 0 {
                    continue;
                }
                let start = decisions.len();
                for &teacher_index in &eligible[slot_index] {
                    decisions.push(Decision {
                        teacher: teacher_index,
                        slot: slot_index,
                        floor_id,
                        cost: teachers[teacher_index].priority_cost(floor_id),
                    });
                }
                demands.push(Demand {
                    slot: slot_index,
                    floor_id,
                    need,
                    decisions: start..decisions.len(),
                });
            }
        }

        let total_need = demands.iter().map(|demand| demand.need).sum();
        let max_target = teachers.iter().map(|t| t.target).max().unwrap_or(0);
        let total_target = teachers.iter().map(|t| t.target).sum();

        if total_target < total_need {
            warn!(
                total_target,
                total_need,
                "declared targets fall short of demand; the plan may leave shortfall or stretch bands"
            );
        }

        Self {
            teachers,
            slots,
            params,
            demands,
            decisions,
            eligible,
            total_need,
            max_target,
            total_target,
        }
    }

    pub fn demands(&self) -> &[Demand] {
        &self.demands
    }

    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    /// Eligible teacher indices for the slot at `slot_index`
    pub fn eligible_teachers(&self, slot_index: usize) -> &[usize] {
        &self.eligible[slot_index]
    }

    pub fn total_need(&self) -> u32 {
        self.total_need
    }

    pub fn max_target(&self) -> u32 {
        self.max_target
    }

    pub fn total_target(&self) -> u32 {
        self.total_target
    }
}

/// Solve the problem with the best available backend.
///
/// With the `cp-solver` feature this runs the three-phase lexicographic
/// core; without it the deterministic greedy cascade takes over. `seed`
/// feeds the greedy tie-break bias and is ignored by the CP backend.
pub fn solve_duties(problem: &SupervisionProblem, seed: u64) -> SolverResult {
    #[cfg(feature = "cp-solver")]
    {
        let _ = seed;
        cp::solve(problem)
    }
    #[cfg(not(feature = "cp-solver"))]
    {
        warn!("constraint-programming backend not compiled in; using the greedy fallback");
        GreedySolver::new(problem, seed).solve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 2).unwrap()
    }

    fn tuesday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 3).unwrap()
    }

    #[test]
    fn problem_flattens_demands_and_decisions() {
        let teachers = vec![
            TeacherSpec::new(1, 1).with_lessons(0, [2]),
            TeacherSpec::new(2, 1),
        ];
        let slots = vec![BreakSlotSpec::new(monday(), 2, [(1, 2), (2, 1)])];
        let problem = SupervisionProblem::new(teachers, slots, SolverParams::default());

        assert_eq!(problem.total_need(), 3);
        assert_eq!(problem.demands().len(), 2);
        // only teacher 1 is eligible, so one decision per floor demand
        assert_eq!(problem.decisions().len(), 2);
        assert_eq!(problem.eligible_teachers(0), &[0]);
    }

    #[test]
    fn slots_are_visited_in_date_then_break_order() {
        let teachers = vec![TeacherSpec::new(1, 1).with_lessons(0, [2]).with_lessons(1, [2])];
        let slots = vec![
            BreakSlotSpec::new(tuesday(), 2, [(1, 1)]),
            BreakSlotSpec::new(monday(), 3, [(1, 1)]),
            BreakSlotSpec::new(monday(), 2, [(1, 1)]),
        ];
        let problem = SupervisionProblem::new(teachers, slots, SolverParams::default());
        let order: Vec<_> = problem
            .slots
            .iter()
            .map(|slot| slot.slot_id.clone())
            .collect();
        assert_eq!(order, ["2024-09-02#2", "2024-09-02#3", "2024-09-03#2"]);
    }

    #[test]
    fn aggregate_counters() {
        let teachers = vec![
            TeacherSpec::new(1, 3).with_lessons(0, [2]),
            TeacherSpec::new(2, 1).with_lessons(0, [3]),
        ];
        let slots = vec![BreakSlotSpec::new(monday(), 2, [(1, 1)])];
        let problem = SupervisionProblem::new(teachers, slots, SolverParams::default());
        assert_eq!(problem.max_target(), 3);
        assert_eq!(problem.total_target(), 4);
        assert_eq!(problem.eligible_teachers(0).len(), 2);
    }
}
