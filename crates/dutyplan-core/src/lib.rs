//! # dutyplan-core
//!
//! Core domain model for the dutyplan break-supervision planner.
//!
//! This crate provides:
//! - Solver value objects: `TeacherSpec`, `BreakSlotSpec`, `AssignmentDecision`
//! - Result types: `SolverResult`, `SolverStatus`
//! - Solver tuning: `SolverParams`, environment-driven `SchedulerConfig`
//! - The fixed break-to-period adjacency table
//!
//! ## Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use dutyplan_core::{BreakSlotSpec, TeacherSpec};
//!
//! let teacher = TeacherSpec::new(1, 2).with_lessons(0, [2, 3]);
//! let monday = NaiveDate::from_ymd_opt(2024, 9, 2).unwrap();
//! let slot = BreakSlotSpec::new(monday, 2, [(1, 1)]);
//! assert!(teacher.eligible_for(&slot));
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

pub mod config;

pub use config::SchedulerConfig;

// ============================================================================
// Type Aliases
// ============================================================================

/// Unique identifier of a teacher (store primary key)
pub type TeacherId = i64;

/// Unique identifier of a floor (store primary key)
pub type FloorId = i64;

/// Identifier of a break slot within a planning range, `"YYYY-MM-DD#b"`
pub type SlotId = String;

// ============================================================================
// Break / period adjacency
// ============================================================================

/// Lesson periods adjacent to a break: `(before_period, after_period)`.
///
/// Break 1 is the supervision before the first lesson, breaks 2..=4 sit
/// between lesson pairs (2/3, 4/5, 6/7). Unknown break indices have no
/// adjacent periods and therefore no eligible teachers.
pub fn break_periods(break_index: u8) -> (Option<u8>, Option<u8>) {
    match break_index {
        1 => (None, Some(1)),
        2 => (Some(2), Some(3)),
        3 => (Some(4), Some(5)),
        4 => (Some(6), Some(7)),
        _ => (None, None),
    }
}

/// Zero-based weekday index (0 = Monday .. 6 = Sunday)
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

/// Whether the date falls on a school day (Monday..Friday)
pub fn is_school_day(date: NaiveDate) -> bool {
    weekday_index(date) < 5
}

// ============================================================================
// TeacherSpec
// ============================================================================

/// Solver-facing projection of a teacher.
///
/// Pure value object: carries everything the solver needs and nothing the
/// store needs. `target` may be raised by the rebalancer; `nominal_target`
/// keeps the originally declared quota.
#[derive(Clone, Debug, PartialEq)]
pub struct TeacherSpec {
    pub id: TeacherId,
    /// Weekly duty quota after rebalancing
    pub target: u32,
    /// Ranking multiplier input; lower ranks are served first (default 10)
    pub prio_rank: u32,
    pub preferred_floor: Option<FloorId>,
    /// Explicit per-floor costs; overrides `preferred_floor` when present
    pub floor_weights: Option<HashMap<FloorId, i64>>,
    /// Lesson hours per weekday (0 = Monday .. 4 = Friday)
    pub day_periods: HashMap<u8, BTreeSet<u8>>,
    /// Attendance bitmask, bits 0..=4 for Monday..Friday
    pub attendance_mask: u8,
    /// Number of weekdays the teacher is on-site
    pub availability_days: u32,
    /// Declared quota before rebalancing
    pub nominal_target: u32,
}

impl TeacherSpec {
    pub fn new(id: TeacherId, target: u32) -> Self {
        Self {
            id,
            target,
            prio_rank: 10,
            preferred_floor: None,
            floor_weights: None,
            day_periods: HashMap::new(),
            attendance_mask: 0,
            availability_days: 0,
            nominal_target: target,
        }
    }

    /// Add lesson hours on a weekday; updates attendance mask and day count
    pub fn with_lessons(mut self, weekday: u8, hours: impl IntoIterator<Item = u8>) -> Self {
        let periods = self.day_periods.entry(weekday).or_default();
        periods.extend(hours);
        if weekday < 5 {
            self.attendance_mask |= 1 << weekday;
        }
        self.availability_days = self.attendance_mask.count_ones();
        self
    }

    pub fn with_preferred_floor(mut self, floor_id: FloorId) -> Self {
        self.preferred_floor = Some(floor_id);
        self
    }

    pub fn with_prio_rank(mut self, rank: u32) -> Self {
        self.prio_rank = rank;
        self
    }

    pub fn with_floor_weights(mut self, weights: HashMap<FloorId, i64>) -> Self {
        self.floor_weights = Some(weights);
        self
    }

    /// Whether the teacher has a lesson adjacent to the given break
    pub fn has_adjacent_lesson(
        &self,
        day_index: u8,
        before_period: Option<u8>,
        after_period: Option<u8>,
    ) -> bool {
        let Some(periods) = self.day_periods.get(&day_index) else {
            return false;
        };
        if periods.is_empty() {
            return false;
        }
        if let Some(before) = before_period {
            if periods.contains(&before) {
                return true;
            }
        }
        if let Some(after) = after_period {
            if periods.contains(&after) {
                return true;
            }
        }
        false
    }

    /// Eligibility for a concrete slot (lesson adjacency on the slot's day)
    pub fn eligible_for(&self, slot: &BreakSlotSpec) -> bool {
        self.has_adjacent_lesson(slot.day_index, slot.before_period, slot.after_period)
    }

    /// Whether the attendance mask covers the weekday (0 = Monday .. 4 = Friday)
    pub fn available_on_weekday(&self, weekday: u8) -> bool {
        weekday < 5 && self.attendance_mask & (1 << weekday) != 0
    }

    /// Cost of placing this teacher on `floor_id`, before phase weighting.
    ///
    /// Explicit floor weights win; otherwise 0 for the preferred floor, 1
    /// without a preference, 3 against the preference. The base is scaled by
    /// `100 + min(prio_rank, 100)` so rank differences dominate floor taste.
    pub fn priority_cost(&self, floor_id: FloorId) -> i64 {
        let base = if let Some(weights) = &self.floor_weights {
            let default_penalty = weights.values().copied().max().unwrap_or(3) + 1;
            weights.get(&floor_id).copied().unwrap_or(default_penalty)
        } else {
            match self.preferred_floor {
                None => 1,
                Some(preferred) if preferred == floor_id => 0,
                Some(_) => 3,
            }
        };
        let multiplier = 100 + i64::from(self.prio_rank.min(100));
        base * multiplier
    }
}

// ============================================================================
// BreakSlotSpec
// ============================================================================

/// One supervised break on one date, with per-floor head-count demand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BreakSlotSpec {
    pub slot_id: SlotId,
    pub date: NaiveDate,
    /// 0 = Monday .. 4 = Friday
    pub day_index: u8,
    pub break_index: u8,
    pub before_period: Option<u8>,
    pub after_period: Option<u8>,
    /// Required head count per floor; only floors with demand > 0 appear
    pub needs: BTreeMap<FloorId, u32>,
}

impl BreakSlotSpec {
    pub fn new(
        date: NaiveDate,
        break_index: u8,
        needs: impl IntoIterator<Item = (FloorId, u32)>,
    ) -> Self {
        let (before_period, after_period) = break_periods(break_index);
        Self {
            slot_id: Self::slot_id_for(date, break_index),
            date,
            day_index: weekday_index(date),
            break_index,
            before_period,
            after_period,
            needs: needs.into_iter().filter(|&(_, need)| need > 0).collect(),
        }
    }

    pub fn slot_id_for(date: NaiveDate, break_index: u8) -> SlotId {
        format!("{}#{}", date.format("%Y-%m-%d"), break_index)
    }

    /// Total head count demanded over all floors
    pub fn total_need(&self) -> u32 {
        self.needs.values().sum()
    }
}

// ============================================================================
// Solver results
// ============================================================================

/// One solver decision: `teacher_id` covers `floor_id` during `slot_id`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentDecision {
    pub teacher_id: TeacherId,
    pub slot_id: SlotId,
    pub floor_id: FloorId,
    pub day_index: u8,
    pub date: NaiveDate,
    pub break_index: u8,
}

/// Terminal state of a solve, mirroring the usual CP-SAT vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverStatus {
    Optimal,
    Feasible,
    Infeasible,
    ModelInvalid,
    Unknown,
}

impl SolverStatus {
    /// Whether the solve produced a usable plan
    pub fn is_success(self) -> bool {
        matches!(self, Self::Optimal | Self::Feasible)
    }
}

impl std::fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Optimal => "OPTIMAL",
            Self::Feasible => "FEASIBLE",
            Self::Infeasible => "INFEASIBLE",
            Self::ModelInvalid => "MODEL_INVALID",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Full outcome of one solver invocation.
#[derive(Clone, Debug)]
pub struct SolverResult {
    pub status: SolverStatus,
    pub assignments: Vec<AssignmentDecision>,
    /// Duties per teacher, including teachers with zero load
    pub loads: BTreeMap<TeacherId, u32>,
    /// Largest single deviation from any teacher's target
    pub max_dev: i64,
    pub priority_cost: i64,
    /// Availability-weighted sum of per-teacher deviations
    pub total_dev: i64,
    /// Duties beyond the first on the same (teacher, date)
    pub daily_excess: i64,
    /// Summed slack outside the fairness band
    pub band_violation: i64,
    pub total_shortfall: u32,
    /// Uncovered head count per (slot, floor); only positive entries appear
    pub shortfalls: BTreeMap<(SlotId, FloorId), u32>,
    pub wall_time: Duration,
}

impl SolverResult {
    /// Empty result carrying only a status and the unmet demand
    pub fn empty(status: SolverStatus, total_shortfall: u32) -> Self {
        Self {
            status,
            assignments: Vec::new(),
            loads: BTreeMap::new(),
            max_dev: 0,
            priority_cost: 0,
            total_dev: 0,
            daily_excess: 0,
            band_violation: 0,
            total_shortfall,
            shortfalls: BTreeMap::new(),
            wall_time: Duration::ZERO,
        }
    }
}

// ============================================================================
// Solver parameters
// ============================================================================

/// Tuning knobs shared by both solver backends.
#[derive(Clone, Debug, PartialEq)]
pub struct SolverParams {
    /// Allowed ± deviation around each target before band penalties apply;
    /// `None` disables band accounting entirely
    pub fairness_band: Option<u32>,
    /// When set, daily excess is weighted high enough to dominate fairness
    pub max_one_per_day: bool,
    /// Wall-clock budget per lexicographic phase
    pub time_limit: Duration,
    pub num_workers: u32,
    pub band_penalty: i64,
    /// Hard cap on duties above `target + band`; `None` disables the cap
    pub max_extra_duties: Option<u32>,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            fairness_band: Some(0),
            max_one_per_day: false,
            time_limit: Duration::from_secs(30),
            num_workers: 8,
            band_penalty: 5_000_000,
            max_extra_duties: Some(0),
        }
    }
}

impl SolverParams {
    /// Clamp values into their documented ranges
    pub fn normalized(mut self) -> Self {
        if self.time_limit < Duration::from_secs(1) {
            self.time_limit = Duration::from_secs(1);
        }
        self.num_workers = self.num_workers.max(1);
        self.band_penalty = self.band_penalty.max(0);
        self
    }

    /// Whether any band or extra-duty bound participates in the objective
    pub fn band_active(&self) -> bool {
        self.fairness_band.is_some() || self.max_extra_duties.is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================
