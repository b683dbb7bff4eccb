//! # dutyplan-scheduler
//!
//! Orchestrates one planning run: materialize duty slots, project store
//! entities into solver specs, rebalance targets, run the preflight
//! analysis, solve, and write assignments back.
//!
//! The critical section (clear assignments, solve, insert) runs inside a
//! single store transaction; a failed solve rolls back and leaves the
//! previous plan untouched.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use dutyplan_core::{
    is_school_day, BreakSlotSpec, FloorId, SchedulerConfig, SolverResult, SolverStatus,
    TeacherId, TeacherSpec,
};
use dutyplan_solver::{analyze_shortages, rebalance_targets, solve_duties, SupervisionProblem};
use dutyplan_store::{
    AssignmentRepository, DbPool, FloorRepository, SlotRepository, Teacher, TeacherRepository,
};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Store(#[from] dutyplan_store::StoreError),
}

/// Uncovered head count on one (slot, floor).
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ShortfallEntry {
    pub slot_id: String,
    pub floor_id: FloorId,
    pub missing: u32,
}

/// Outcome of a completed planning run.
#[derive(Clone, Debug, Serialize)]
pub struct ScheduleSummary {
    pub status: SolverStatus,
    pub assignments_created: u64,
    pub loads: BTreeMap<TeacherId, u32>,
    pub max_dev: i64,
    pub total_dev: i64,
    pub daily_excess: i64,
    pub band_violation: i64,
    pub priority_cost: i64,
    pub total_shortfall: u32,
    pub shortfalls: Vec<ShortfallEntry>,
    pub wall_time_seconds: f64,
}

/// What a planning invocation did.
#[derive(Clone, Debug, Serialize)]
pub enum ScheduleOutcome {
    /// Plan written (possibly with shortfall)
    Planned(ScheduleSummary),
    /// Solver found no usable plan; nothing was written
    SolverFailed { status: SolverStatus },
    /// No floors configured; nothing to plan
    SkippedNoFloors,
    /// No non-exempt teachers; nothing to plan
    SkippedNoTeachers,
    /// No slot in the range carries demand; nothing to plan
    SkippedNoDemand,
}

/// Plan supervision duties for every school day in `[start, end]`.
pub async fn generate_assignments(
    pool: &DbPool,
    start: NaiveDate,
    end: NaiveDate,
    breaks_per_day: u8,
    config: &SchedulerConfig,
) -> Result<ScheduleOutcome, SchedulerError> {
    let floors = FloorRepository::new(pool.clone()).list().await?;
    if floors.is_empty() {
        warn!("no floors defined; skipping the planning run");
        return Ok(ScheduleOutcome::SkippedNoFloors);
    }

    let slot_rows = SlotRepository::new(pool.clone())
        .ensure_slots(start, end, breaks_per_day)
        .await?;

    let teachers = TeacherRepository::new(pool.clone()).list_active().await?;
    if teachers.is_empty() {
        warn!("no non-exempt teachers found; skipping the planning run");
        return Ok(ScheduleOutcome::SkippedNoTeachers);
    }

    let mut specs: Vec<TeacherSpec> = teachers.iter().map(build_teacher_spec).collect();

    let floor_needs: Vec<(FloorId, u32)> = floors
        .iter()
        .filter(|floor| floor.required_per_break > 0)
        .map(|floor| (floor.id, floor.required_per_break.max(0) as u32))
        .collect();
    let break_slots = build_break_slots(start, end, breaks_per_day, &floor_needs);
    if break_slots.is_empty() {
        info!("no break slots with demand in the requested range");
        return Ok(ScheduleOutcome::SkippedNoDemand);
    }

    let total_need: u32 = break_slots.iter().map(BreakSlotSpec::total_need).sum();
    rebalance_targets(&mut specs, total_need);

    let problem = SupervisionProblem::new(specs, break_slots, config.solver_params());
    analyze_shortages(&problem);

    // Critical section: clear, solve, write, all in one transaction
    let assignments = AssignmentRepository::new(pool.clone());
    let mut tx = assignments.clear_range_tx(start, end).await?;

    let seed = invocation_seed(start, end, breaks_per_day);
    let result = solve_duties(&problem, seed);

    if !result.status.is_success() {
        error!(status = %result.status, "planning failed; keeping the previous plan");
        tx.rollback()
            .await
            .map_err(dutyplan_store::StoreError::Query)?;
        return Ok(ScheduleOutcome::SolverFailed {
            status: result.status,
        });
    }

    let slot_ids: HashMap<(NaiveDate, i64, FloorId), i64> = slot_rows
        .iter()
        .map(|slot| ((slot.date, slot.break_index, slot.floor_id), slot.id))
        .collect();
    let mut pairs = Vec::with_capacity(result.assignments.len());
    for decision in &result.assignments {
        let key = (
            decision.date,
            i64::from(decision.break_index),
            decision.floor_id,
        );
        match slot_ids.get(&key) {
            Some(&duty_slot_id) => pairs.push((duty_slot_id, decision.teacher_id)),
            None => warn!(
                date = %decision.date,
                break_index = decision.break_index,
                floor = decision.floor_id,
                "no duty slot for solver decision; dropping it"
            ),
        }
    }

    let created = assignments.insert_all_tx(&mut tx, &pairs).await?;
    tx.commit().await.map_err(dutyplan_store::StoreError::Query)?;

    info!(
        assignments = created,
        max_dev = result.max_dev,
        total_dev = result.total_dev,
        daily_excess = result.daily_excess,
        priority_cost = result.priority_cost,
        status = %result.status,
        wall_time_s = result.wall_time.as_secs_f64(),
        "supervision plan written"
    );
    log_teacher_loads(&teachers, &result);

    Ok(ScheduleOutcome::Planned(summarize(created, &result)))
}

/// Project a loaded teacher into the solver value object.
fn build_teacher_spec(teacher: &Teacher) -> TeacherSpec {
    let mut day_periods: HashMap<u8, std::collections::BTreeSet<u8>> = HashMap::new();
    for lesson in &teacher.lessons {
        if (0..7).contains(&lesson.weekday) && lesson.hour > 0 {
            day_periods
                .entry(lesson.weekday as u8)
                .or_default()
                .insert(lesson.hour.min(i64::from(u8::MAX)) as u8);
        }
    }
    let attendance_mask = teacher.actual_attendance_mask();

    TeacherSpec {
        id: teacher.row.id,
        target: teacher.target_duties,
        prio_rank: 10,
        preferred_floor: teacher.row.preferred_floor_id,
        floor_weights: None,
        day_periods,
        attendance_mask,
        availability_days: attendance_mask.count_ones(),
        nominal_target: teacher.target_duties,
    }
}

/// One `BreakSlotSpec` per weekday date and break index carrying demand.
fn build_break_slots(
    start: NaiveDate,
    end: NaiveDate,
    breaks_per_day: u8,
    floor_needs: &[(FloorId, u32)],
) -> Vec<BreakSlotSpec> {
    let mut slots = Vec::new();
    if floor_needs.is_empty() {
        return slots;
    }
    let mut date = start;
    while date <= end {
        if is_school_day(date) {
            for break_index in 1..=breaks_per_day {
                slots.push(BreakSlotSpec::new(
                    date,
                    break_index,
                    floor_needs.iter().copied(),
                ));
            }
        }
        date = match date.succ_opt() {
            Some(next) => next,
            None => break,
        };
    }
    slots
}

/// Stable seed for the greedy tie-break bias, derived from the invocation.
fn invocation_seed(start: NaiveDate, end: NaiveDate, breaks_per_day: u8) -> u64 {
    let start_days = start.num_days_from_ce() as u64;
    let end_days = end.num_days_from_ce() as u64;
    start_days
        .wrapping_mul(31)
        .wrapping_add(end_days.wrapping_mul(7))
        .wrapping_add(u64::from(breaks_per_day))
}

fn summarize(created: u64, result: &SolverResult) -> ScheduleSummary {
    let shortfalls = result
        .shortfalls
        .iter()
        .map(|((slot_id, floor_id), &missing)| ShortfallEntry {
            slot_id: slot_id.clone(),
            floor_id: *floor_id,
            missing,
        })
        .collect();
    ScheduleSummary {
        status: result.status,
        assignments_created: created,
        loads: result.loads.clone(),
        max_dev: result.max_dev,
        total_dev: result.total_dev,
        daily_excess: result.daily_excess,
        band_violation: result.band_violation,
        priority_cost: result.priority_cost,
        total_shortfall: result.total_shortfall,
        shortfalls,
        wall_time_seconds: result.wall_time.as_secs_f64(),
    }
}

fn log_teacher_loads(teachers: &[Teacher], result: &SolverResult) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }
    let mut ordered: Vec<&Teacher> = teachers.iter().collect();
    ordered.sort_by(|a, b| {
        let key_a = a.row.abbreviation.as_deref().unwrap_or(&a.row.last_name);
        let key_b = b.row.abbreviation.as_deref().unwrap_or(&b.row.last_name);
        key_a.cmp(key_b)
    });
    for teacher in ordered {
        let load = result.loads.get(&teacher.row.id).copied().unwrap_or(0);
        debug!(
            teacher = teacher.row.abbreviation.as_deref().unwrap_or("?"),
            last_name = %teacher.row.last_name,
            first_name = %teacher.row.first_name,
            load,
            target = teacher.target_duties,
            "teacher load"
        );
    }
}
