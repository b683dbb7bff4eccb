//! Lexicographic constraint-programming core.
//!
//! Three phases, each a fresh model with the previous optima pinned as
//! equality constraints:
//!
//! 1. **Coverage** — minimize the total uncovered head count.
//! 2. **Preference** — minimize the priority cost under pinned coverage.
//! 3. **Balance** — minimize a weighted sum of the maximum deviation,
//!    availability-weighted total deviation, daily excess, band violation
//!    and (pinned) shortfall.
//!
//! Assignment decisions are 0/1 bounded integers; every auxiliary quantity
//! that the objective pushes down (deviation split, daily excess, band
//! slack) is linked by linear inequalities only, so no reification is
//! needed.
//!
//! # Feature Flag
//!
//! This module requires the `cp-solver` feature:
//!
//! ```toml
//! dutyplan-solver = { version = "0.4", features = ["cp-solver"] }
//! ```

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use pumpkin_solver::constraints as cp;
use pumpkin_solver::optimisation::linear_sat_unsat::LinearSatUnsat;
use pumpkin_solver::optimisation::OptimisationDirection;
use pumpkin_solver::results::{OptimisationResult, ProblemSolution};
use pumpkin_solver::termination::TimeBudget;
use pumpkin_solver::variables::{DomainId, TransformableVariable};
use pumpkin_solver::Solver;
use tracing::{debug, warn};

use dutyplan_core::{AssignmentDecision, SolverResult, SolverStatus};

use crate::SupervisionProblem;

const WEIGHT_MAX_DEV: i32 = 1_000_000;
const WEIGHT_TOTAL_DEV: i32 = 10_000;
const WEIGHT_SHORTFALL: i32 = 50_000_000;
const WEIGHT_DAILY_STRICT: i32 = 500_000;
const WEIGHT_DAILY_RELAXED: i32 = 100;

/// Optima pinned from earlier phases
#[derive(Clone, Copy, Debug, Default)]
struct Pins {
    shortfall: Option<i32>,
    priority: Option<i32>,
}

enum PhaseObjective {
    Coverage,
    Preference,
    Balance,
}

/// Variable handles for one freshly built model
struct PhaseModel {
    solver: Solver,
    x: Vec<DomainId>,
    short: Vec<DomainId>,
    loads: Vec<DomainId>,
    max_dev: DomainId,
    total_dev: DomainId,
    daily_excess_total: DomainId,
    total_band_violation: DomainId,
    total_shortfall: DomainId,
    priority: DomainId,
    /// False when a constraint was rejected at the root (trivially infeasible)
    consistent: bool,
}

/// Values extracted from a solution for every reported quantity
struct PhaseValues {
    x: Vec<bool>,
    short: Vec<i64>,
    loads: Vec<i64>,
    max_dev: i64,
    total_dev: i64,
    daily_excess: i64,
    band_violation: i64,
    total_shortfall: i64,
    priority: i64,
}

struct PhaseOutcome {
    status: SolverStatus,
    values: Option<PhaseValues>,
}

fn clamp_i32(value: i64) -> i32 {
    value.clamp(0, i64::from(i32::MAX)) as i32
}

/// Solve the full three-phase program.
pub fn solve(problem: &SupervisionProblem) -> SolverResult {
    let started = Instant::now();
    let total_need = problem.total_need();

    if problem.teachers.is_empty() {
        warn!("no teachers available for planning");
        let status = if total_need > 0 {
            SolverStatus::Infeasible
        } else {
            SolverStatus::Optimal
        };
        return SolverResult::empty(status, total_need);
    }

    // Phase 1: best achievable coverage
    let phase1 = run_phase(problem, Pins::default(), &PhaseObjective::Coverage);
    let Some(phase1_values) = phase1.values else {
        let mut result = SolverResult::empty(phase1.status, total_need);
        result.loads = problem
            .teachers
            .iter()
            .map(|teacher| (teacher.id, 0))
            .collect();
        result.wall_time = started.elapsed();
        return result;
    };
    let shortfall_pin = clamp_i32(phase1_values.total_shortfall);

    // Phase 2: cheapest preference cost under pinned coverage
    let pins = Pins {
        shortfall: Some(shortfall_pin),
        priority: None,
    };
    let phase2 = run_phase(problem, pins, &PhaseObjective::Preference);
    let priority_pin = match (&phase2.status, &phase2.values) {
        (status, Some(values)) if status.is_success() => Some(clamp_i32(values.priority)),
        _ => {
            warn!(
                status = %phase2.status,
                "preference phase did not finish; keeping the coverage solution"
            );
            None
        }
    };

    // Phase 3: fairness and balance under both pins
    let pins = Pins {
        shortfall: Some(shortfall_pin),
        priority: priority_pin,
    };
    let phase3 = run_phase(problem, pins, &PhaseObjective::Balance);

    let (status, values) = match (phase3.status, phase3.values) {
        (status, Some(values)) if status.is_success() => (status, values),
        (status, _) => {
            warn!(
                %status,
                "balance phase did not finish; keeping the previous phase's solution"
            );
            match (phase2.status, phase2.values) {
                (status2, Some(values2)) if status2.is_success() => (status2, values2),
                _ => (phase1.status, phase1_values),
            }
        }
    };

    let mut result = materialize(problem, status, &values);
    result.priority_cost = i64::from(priority_pin.unwrap_or(0));
    result.wall_time = started.elapsed();
    debug!(
        status = %result.status,
        assignments = result.assignments.len(),
        max_dev = result.max_dev,
        total_shortfall = result.total_shortfall,
        configured_workers = problem.params.num_workers,
        "cp solve finished"
    );
    result
}

/// Build a fresh model and minimize the phase objective within the time budget.
fn run_phase(problem: &SupervisionProblem, pins: Pins, objective: &PhaseObjective) -> PhaseOutcome {
    let mut model = build_model(problem, pins);
    if !model.consistent {
        return PhaseOutcome {
            status: SolverStatus::Infeasible,
            values: None,
        };
    }

    let objective_var = match objective {
        PhaseObjective::Coverage => model.total_shortfall,
        PhaseObjective::Preference => model.priority,
        PhaseObjective::Balance => {
            let Some(var) = add_balance_objective(problem, &mut model) else {
                return PhaseOutcome {
                    status: SolverStatus::ModelInvalid,
                    values: None,
                };
            };
            var
        }
    };

    let time_limit = problem.params.time_limit.max(Duration::from_secs(1));
    let mut brancher = model.solver.default_brancher();
    let mut termination = TimeBudget::starting_now(time_limit);

    fn noop_callback<B>(_: &Solver, _: pumpkin_solver::results::SolutionReference, _: &B) {}
    let outcome = model.solver.optimise(
        &mut brancher,
        &mut termination,
        LinearSatUnsat::new(OptimisationDirection::Minimise, objective_var, noop_callback),
    );

    match outcome {
        OptimisationResult::Optimal(solution) => PhaseOutcome {
            status: SolverStatus::Optimal,
            values: Some(read_values(&model, &solution)),
        },
        OptimisationResult::Satisfiable(solution) => PhaseOutcome {
            status: SolverStatus::Feasible,
            values: Some(read_values(&model, &solution)),
        },
        OptimisationResult::Unsatisfiable => PhaseOutcome {
            status: SolverStatus::Infeasible,
            values: None,
        },
        OptimisationResult::Unknown => PhaseOutcome {
            status: SolverStatus::Unknown,
            values: None,
        },
    }
}

/// Build decision variables, linkage and hard constraints for one phase.
fn build_model(problem: &SupervisionProblem, pins: Pins) -> PhaseModel {
    let mut solver = Solver::default();
    let tag = solver.new_constraint_tag();
    let mut consistent = true;

    let total_need = clamp_i32(i64::from(problem.total_need()));
    let deviation_cap = clamp_i32(i64::from(problem.total_need()) + i64::from(problem.max_target()));
    let teacher_count = problem.teachers.len() as i64;

    // Decision variables, one per (teacher, slot, floor) candidate
    let x: Vec<DomainId> = problem
        .decisions()
        .iter()
        .map(|_| solver.new_bounded_integer(0, 1))
        .collect();

    // Coverage with slack: sum(x over demand) + short == need
    let mut short = Vec::with_capacity(problem.demands().len());
    for demand in problem.demands() {
        let shortfall = solver.new_bounded_integer(0, clamp_i32(i64::from(demand.need)));
        let mut terms: Vec<_> = demand
            .decisions
            .clone()
            .map(|index| x[index].scaled(1))
            .collect();
        terms.push(shortfall.scaled(1));
        if solver
            .add_constraint(cp::equals(terms, clamp_i32(i64::from(demand.need)), tag))
            .post()
            .is_err()
        {
            consistent = false;
        }
        short.push(shortfall);
    }

    // At most one assignment per (teacher, slot), over all floors
    let mut per_teacher_slot: BTreeMap<(usize, usize), Vec<usize>> = BTreeMap::new();
    let mut per_teacher: Vec<Vec<usize>> = vec![Vec::new(); problem.teachers.len()];
    let mut per_teacher_day: BTreeMap<(usize, NaiveDate), Vec<usize>> = BTreeMap::new();
    for (index, decision) in problem.decisions().iter().enumerate() {
        per_teacher_slot
            .entry((decision.teacher, decision.slot))
            .or_default()
            .push(index);
        per_teacher[decision.teacher].push(index);
        per_teacher_day
            .entry((decision.teacher, problem.slots[decision.slot].date))
            .or_default()
            .push(index);
    }
    for indices in per_teacher_slot.values() {
        if indices.len() < 2 {
            continue;
        }
        let terms: Vec<_> = indices.iter().map(|&index| x[index].scaled(1)).collect();
        if solver
            .add_constraint(cp::less_than_or_equals(terms, 1, tag))
            .post()
            .is_err()
        {
            consistent = false;
        }
    }

    // Load linkage and deviation split per teacher
    let max_dev = solver.new_bounded_integer(0, deviation_cap);
    let mut loads = Vec::with_capacity(problem.teachers.len());
    let mut dev_pos = Vec::with_capacity(problem.teachers.len());
    let mut dev_neg = Vec::with_capacity(problem.teachers.len());
    let mut band_terms: Vec<DomainId> = Vec::new();

    for (teacher_index, teacher) in problem.teachers.iter().enumerate() {
        let load = solver.new_bounded_integer(0, total_need);
        let mut terms: Vec<_> = per_teacher[teacher_index]
            .iter()
            .map(|&index| x[index].scaled(1))
            .collect();
        terms.push(load.scaled(-1));
        if solver.add_constraint(cp::equals(terms, 0, tag)).post().is_err() {
            consistent = false;
        }

        let target = clamp_i32(i64::from(teacher.target));
        let pos = solver.new_bounded_integer(0, deviation_cap);
        let neg = solver.new_bounded_integer(0, deviation_cap);
        // load - target == dev_pos - dev_neg
        if solver
            .add_constraint(cp::equals(
                vec![load.scaled(1), pos.scaled(-1), neg.scaled(1)],
                target,
                tag,
            ))
            .post()
            .is_err()
        {
            consistent = false;
        }
        for dev in [pos, neg] {
            if solver
                .add_constraint(cp::greater_than_or_equals(
                    vec![max_dev.scaled(1), dev.scaled(-1)],
                    0,
                    tag,
                ))
                .post()
                .is_err()
            {
                consistent = false;
            }
        }

        match problem.params.fairness_band {
            Some(band) => {
                let band = clamp_i32(i64::from(band));
                let min_load = (target - band).max(0);
                let max_load = target.saturating_add(band);
                let under = solver.new_bounded_integer(0, deviation_cap);
                let over = solver.new_bounded_integer(0, deviation_cap);
                if solver
                    .add_constraint(cp::greater_than_or_equals(
                        vec![load.scaled(1), under.scaled(1)],
                        min_load,
                        tag,
                    ))
                    .post()
                    .is_err()
                {
                    consistent = false;
                }
                if solver
                    .add_constraint(cp::less_than_or_equals(
                        vec![load.scaled(1), over.scaled(-1)],
                        max_load,
                        tag,
                    ))
                    .post()
                    .is_err()
                {
                    consistent = false;
                }
                if let Some(extra) = problem.params.max_extra_duties {
                    if solver
                        .add_constraint(cp::less_than_or_equals(
                            vec![over.scaled(1)],
                            clamp_i32(i64::from(extra)),
                            tag,
                        ))
                        .post()
                        .is_err()
                    {
                        consistent = false;
                    }
                }
                band_terms.push(under);
                band_terms.push(over);
            }
            None => {
                if let Some(extra) = problem.params.max_extra_duties {
                    let cap = target.saturating_add(clamp_i32(i64::from(extra)));
                    let over = solver.new_bounded_integer(0, deviation_cap);
                    if solver
                        .add_constraint(cp::less_than_or_equals(
                            vec![load.scaled(1), over.scaled(-1)],
                            cap,
                            tag,
                        ))
                        .post()
                        .is_err()
                    {
                        consistent = false;
                    }
                    if solver
                        .add_constraint(cp::less_than_or_equals(
                            vec![over.scaled(1)],
                            clamp_i32(i64::from(extra)),
                            tag,
                        ))
                        .post()
                        .is_err()
                    {
                        consistent = false;
                    }
                    band_terms.push(over);
                }
            }
        }

        // Escape valve: loads beyond target + band + extra stay representable
        // and are charged to the band violation instead of going infeasible.
        if let Some(extra) = problem.params.max_extra_duties {
            let band = problem.params.fairness_band.unwrap_or(0);
            let extra_cap = clamp_i32(i64::from(teacher.target) + i64::from(band) + i64::from(extra));
            let cap_over = solver.new_bounded_integer(0, deviation_cap);
            if solver
                .add_constraint(cp::less_than_or_equals(
                    vec![load.scaled(1), cap_over.scaled(-1)],
                    extra_cap,
                    tag,
                ))
                .post()
                .is_err()
            {
                consistent = false;
            }
            band_terms.push(cap_over);
        }

        loads.push(load);
        dev_pos.push(pos);
        dev_neg.push(neg);
    }

    // Priority cost: P == sum(cost * x)
    let max_cost = problem
        .decisions()
        .iter()
        .map(|decision| decision.cost)
        .max()
        .unwrap_or(0);
    let priority_upper = clamp_i32(max_cost.saturating_mul(i64::from(problem.total_need())));
    let priority = solver.new_bounded_integer(0, priority_upper);
    {
        let mut terms: Vec<_> = problem
            .decisions()
            .iter()
            .enumerate()
            .filter(|(_, decision)| decision.cost != 0)
            .map(|(index, decision)| x[index].scaled(clamp_i32(decision.cost)))
            .collect();
        terms.push(priority.scaled(-1));
        if solver.add_constraint(cp::equals(terms, 0, tag)).post().is_err() {
            consistent = false;
        }
    }

    // Availability-weighted total deviation
    let total_dev_cap = clamp_i32(teacher_count * i64::from(deviation_cap) * 5);
    let total_dev = solver.new_bounded_integer(0, total_dev_cap);
    {
        let mut terms = Vec::with_capacity(problem.teachers.len() * 2 + 1);
        for (teacher_index, teacher) in problem.teachers.iter().enumerate() {
            let under_weight = clamp_i32(i64::from(teacher.availability_days.max(1)));
            terms.push(dev_pos[teacher_index].scaled(1));
            terms.push(dev_neg[teacher_index].scaled(under_weight));
        }
        terms.push(total_dev.scaled(-1));
        if solver.add_constraint(cp::equals(terms, 0, tag)).post().is_err() {
            consistent = false;
        }
    }

    // Aggregate band violation
    let band_cap = clamp_i32(teacher_count * i64::from(deviation_cap) * 3);
    let total_band_violation =
        solver.new_bounded_integer(0, if band_terms.is_empty() { 0 } else { band_cap });
    if !band_terms.is_empty() {
        let mut terms: Vec<_> = band_terms.iter().map(|var| var.scaled(1)).collect();
        terms.push(total_band_violation.scaled(-1));
        if solver.add_constraint(cp::equals(terms, 0, tag)).post().is_err() {
            consistent = false;
        }
    }

    // Aggregate shortfall
    let total_shortfall = solver.new_bounded_integer(0, total_need);
    if !short.is_empty() {
        let mut terms: Vec<_> = short.iter().map(|var| var.scaled(1)).collect();
        terms.push(total_shortfall.scaled(-1));
        if solver.add_constraint(cp::equals(terms, 0, tag)).post().is_err() {
            consistent = false;
        }
    }

    // Daily excess: duties beyond the first on the same (teacher, date)
    let mut day_excess_vars = Vec::new();
    for ((_, _), indices) in &per_teacher_day {
        let max_for_day = indices.len() as i64;
        if max_for_day < 2 {
            continue;
        }
        let day_load = solver.new_bounded_integer(0, clamp_i32(max_for_day));
        let mut terms: Vec<_> = indices.iter().map(|&index| x[index].scaled(1)).collect();
        terms.push(day_load.scaled(-1));
        if solver.add_constraint(cp::equals(terms, 0, tag)).post().is_err() {
            consistent = false;
        }

        let day_excess = solver.new_bounded_integer(0, clamp_i32(max_for_day - 1));
        // day_excess >= day_load - 1; minimization settles it at the excess
        if solver
            .add_constraint(cp::greater_than_or_equals(
                vec![day_excess.scaled(1), day_load.scaled(-1)],
                -1,
                tag,
            ))
            .post()
            .is_err()
        {
            consistent = false;
        }
        day_excess_vars.push(day_excess);
    }
    let daily_excess_total =
        solver.new_bounded_integer(0, if day_excess_vars.is_empty() { 0 } else { total_need });
    if !day_excess_vars.is_empty() {
        let mut terms: Vec<_> = day_excess_vars.iter().map(|var| var.scaled(1)).collect();
        terms.push(daily_excess_total.scaled(-1));
        if solver.add_constraint(cp::equals(terms, 0, tag)).post().is_err() {
            consistent = false;
        }
    }

    // Pins from earlier phases
    if let Some(pinned) = pins.shortfall {
        if solver
            .add_constraint(cp::equals(vec![total_shortfall.scaled(1)], pinned, tag))
            .post()
            .is_err()
        {
            consistent = false;
        }
    }
    if let Some(pinned) = pins.priority {
        if solver
            .add_constraint(cp::equals(vec![priority.scaled(1)], pinned, tag))
            .post()
            .is_err()
        {
            consistent = false;
        }
    }

    PhaseModel {
        solver,
        x,
        short,
        loads,
        max_dev,
        total_dev,
        daily_excess_total,
        total_band_violation,
        total_shortfall,
        priority,
        consistent,
    }
}

/// Add the phase-3 weighted objective and return its variable.
fn add_balance_objective(problem: &SupervisionProblem, model: &mut PhaseModel) -> Option<DomainId> {
    let weight_daily = if problem.params.max_one_per_day {
        WEIGHT_DAILY_STRICT
    } else {
        WEIGHT_DAILY_RELAXED
    };
    let weight_band = if problem.params.band_active() {
        clamp_i32(problem.params.band_penalty)
    } else {
        0
    };

    let tag = model.solver.new_constraint_tag();
    let objective = model.solver.new_bounded_integer(0, i32::MAX);
    let mut terms = vec![
        model.max_dev.scaled(WEIGHT_MAX_DEV),
        model.total_dev.scaled(WEIGHT_TOTAL_DEV),
        model.daily_excess_total.scaled(weight_daily),
        model.total_shortfall.scaled(WEIGHT_SHORTFALL),
        objective.scaled(-1),
    ];
    if weight_band > 0 {
        terms.push(model.total_band_violation.scaled(weight_band));
    }
    if model
        .solver
        .add_constraint(cp::equals(terms, 0, tag))
        .post()
        .is_err()
    {
        return None;
    }
    Some(objective)
}

/// Read every reported quantity out of a solution.
fn read_values<S: ProblemSolution>(model: &PhaseModel, solution: &S) -> PhaseValues {
    PhaseValues {
        x: model
            .x
            .iter()
            .map(|&var| solution.get_integer_value(var) != 0)
            .collect(),
        short: model
            .short
            .iter()
            .map(|&var| i64::from(solution.get_integer_value(var)))
            .collect(),
        loads: model
            .loads
            .iter()
            .map(|&var| i64::from(solution.get_integer_value(var)))
            .collect(),
        max_dev: i64::from(solution.get_integer_value(model.max_dev)),
        total_dev: i64::from(solution.get_integer_value(model.total_dev)),
        daily_excess: i64::from(solution.get_integer_value(model.daily_excess_total)),
        band_violation: i64::from(solution.get_integer_value(model.total_band_violation)),
        total_shortfall: i64::from(solution.get_integer_value(model.total_shortfall)),
        priority: i64::from(solution.get_integer_value(model.priority)),
    }
}

/// Turn extracted values into the public result type.
fn materialize(
    problem: &SupervisionProblem,
    status: SolverStatus,
    values: &PhaseValues,
) -> SolverResult {
    let mut assignments = Vec::new();
    for (index, decision) in problem.decisions().iter().enumerate() {
        if !values.x[index] {
            continue;
        }
        let slot = &problem.slots[decision.slot];
        assignments.push(AssignmentDecision {
            teacher_id: problem.teachers[decision.teacher].id,
            slot_id: slot.slot_id.clone(),
            floor_id: decision.floor_id,
            day_index: slot.day_index,
            date: slot.date,
            break_index: slot.break_index,
        });
    }

    let loads = problem
        .teachers
        .iter()
        .enumerate()
        .map(|(index, teacher)| (teacher.id, values.loads[index].max(0) as u32))
        .collect();

    let shortfalls = problem
        .demands()
        .iter()
        .enumerate()
        .filter(|(index, _)| values.short[*index] > 0)
        .map(|(index, demand)| {
            let slot = &problem.slots[demand.slot];
            (
                (slot.slot_id.clone(), demand.floor_id),
                values.short[index].max(0) as u32,
            )
        })
        .collect();

    SolverResult {
        status,
        assignments,
        loads,
        max_dev: values.max_dev,
        priority_cost: values.priority,
        total_dev: values.total_dev,
        daily_excess: values.daily_excess,
        band_violation: values.band_violation,
        total_shortfall: values.total_shortfall.max(0) as u32,
        shortfalls,
        wall_time: Duration::ZERO,
    }
}
