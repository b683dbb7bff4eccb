//! Deterministic greedy fallback.
//!
//! Visits slots in `(date, break_index, floor)` order and fills one head at
//! a time through a four-stage cascade. Lesson adjacency, weekday
//! availability and the consecutive-break rule are never relaxed; the load
//! cap and the two-duties-per-day limit are dropped stage by stage when a
//! slot would otherwise stay uncovered.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::time::Instant;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use dutyplan_core::{AssignmentDecision, FloorId, SolverResult, SolverStatus, TeacherSpec};

use crate::SupervisionProblem;

/// Greedy assignment engine over a prepared problem.
pub struct GreedySolver<'a> {
    problem: &'a SupervisionProblem,
    seed: u64,
}

/// Composite ranking key; smaller sorts first.
struct CandidateKey {
    /// 0 = preferred floor matches, 1 = no preference, 2 = conflicting preference
    priority_class: u8,
    has_duty_today: bool,
    /// Remaining slots after this one where the teacher could still serve
    future_options: u32,
    /// Day spread + floor preference bonus + part-time bonus
    bonus: f64,
    /// Load pressure relative to target plus same-day saturation
    pressure: f64,
    load: u32,
    /// Stable per-run tie breaker
    bias: f64,
}

impl CandidateKey {
    fn compare(&self, other: &Self) -> Ordering {
        self.priority_class
            .cmp(&other.priority_class)
            .then(self.has_duty_today.cmp(&other.has_duty_today))
            .then(self.future_options.cmp(&other.future_options))
            .then(self.bonus.total_cmp(&other.bonus))
            .then(self.pressure.total_cmp(&other.pressure))
            .then(self.load.cmp(&other.load))
            .then(self.bias.total_cmp(&other.bias))
    }
}

/// Mutable assignment state while slots are being filled.
struct PlanState {
    loads: Vec<u32>,
    duties_by_day: HashMap<(usize, NaiveDate), u32>,
    duties_by_weekday: HashMap<(usize, u8), u32>,
    taken_slots: HashSet<(usize, usize)>,
    taken_breaks: HashSet<(usize, NaiveDate, u8)>,
}

impl PlanState {
    fn new(teacher_count: usize) -> Self {
        Self {
            loads: vec![0; teacher_count],
            duties_by_day: HashMap::new(),
            duties_by_weekday: HashMap::new(),
            taken_slots: HashSet::new(),
            taken_breaks: HashSet::new(),
        }
    }

    fn duties_today(&self, teacher: usize, date: NaiveDate) -> u32 {
        self.duties_by_day
            .get(&(teacher, date))
            .copied()
            .unwrap_or(0)
    }

    fn record(&mut self, teacher: usize, slot: usize, date: NaiveDate, day_index: u8, break_index: u8) {
        self.loads[teacher] += 1;
        *self.duties_by_day.entry((teacher, date)).or_insert(0) += 1;
        *self.duties_by_weekday.entry((teacher, day_index)).or_insert(0) += 1;
        self.taken_slots.insert((teacher, slot));
        self.taken_breaks.insert((teacher, date, break_index));
    }
}

impl<'a> GreedySolver<'a> {
    pub fn new(problem: &'a SupervisionProblem, seed: u64) -> Self {
        Self { problem, seed }
    }

    pub fn solve(&self) -> SolverResult {
        let started = Instant::now();
        let problem = self.problem;
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

        let mut rng = StdRng::seed_from_u64(self.seed);
        let biases: Vec<f64> = problem.teachers.iter().map(|_| rng.gen::<f64>()).collect();

        // Teachers that are both lesson-adjacent and on-site, per slot
        let candidates_per_slot: Vec<Vec<usize>> = problem
            .slots
            .iter()
            .enumerate()
            .map(|(slot_index, slot)| {
                problem
                    .eligible_teachers(slot_index)
                    .iter()
                    .copied()
                    .filter(|&teacher| {
                        problem.teachers[teacher].available_on_weekday(slot.day_index)
                    })
                    .collect()
            })
            .collect();

        // Options remaining after the slot currently being filled
        let mut future_options: Vec<u32> = vec![0; problem.teachers.len()];
        for candidates in &candidates_per_slot {
            for &teacher in candidates {
                future_options[teacher] += 1;
            }
        }

        let mut state = PlanState::new(problem.teachers.len());
        let mut assignments = Vec::new();
        let mut shortfalls = std::collections::BTreeMap::new();
        let mut priority_cost = 0i64;
        let mut current_slot = usize::MAX;

        for demand in problem.demands() {
            if demand.slot != current_slot {
                for &teacher in &candidates_per_slot[demand.slot] {
                    future_options[teacher] = future_options[teacher].saturating_sub(1);
                }
                current_slot = demand.slot;
            }

            let slot = &problem.slots[demand.slot];
            let mut covered = 0;
            for _ in 0..demand.need {
                let Some(teacher) = self.pick(
                    &candidates_per_slot[demand.slot],
                    demand.slot,
                    demand.floor_id,
                    &state,
                    &future_options,
                    &biases,
                ) else {
                    break;
                };
                state.record(teacher, demand.slot, slot.date, slot.day_index, slot.break_index);
                priority_cost += problem.teachers[teacher].priority_cost(demand.floor_id);
                assignments.push(AssignmentDecision {
                    teacher_id: problem.teachers[teacher].id,
                    slot_id: slot.slot_id.clone(),
                    floor_id: demand.floor_id,
                    day_index: slot.day_index,
                    date: slot.date,
                    break_index: slot.break_index,
                });
                covered += 1;
            }

            if covered < demand.need {
                let missing = demand.need - covered;
                warn!(
                    slot = %slot.slot_id,
                    floor = demand.floor_id,
                    missing,
                    "slot stays partially uncovered"
                );
                shortfalls.insert((slot.slot_id.clone(), demand.floor_id), missing);
            }
        }

        let result = self.finish(state, assignments, shortfalls, priority_cost, started);
        debug!(
            assignments = result.assignments.len(),
            total_shortfall = result.total_shortfall,
            "greedy solve finished"
        );
        result
    }

    /// Four-stage cascade: each stage widens the candidate pool; the first
    /// stage that yields anyone wins.
    fn pick(
        &self,
        candidates: &[usize],
        slot_index: usize,
        floor_id: FloorId,
        state: &PlanState,
        future_options: &[u32],
        biases: &[f64],
    ) -> Option<usize> {
        let problem = self.problem;
        let slot = &problem.slots[slot_index];
        let band_allowance = problem.params.fairness_band.unwrap_or(0)
            + problem.params.max_extra_duties.unwrap_or(0);

        let base: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&teacher| {
                !state.taken_slots.contains(&(teacher, slot_index))
                    && !self.consecutive_conflict(state, teacher, slot.date, slot.break_index)
            })
            .collect();

        for stage in 0..4u8 {
            let picked = self.pick_stage(&base, stage, band_allowance, slot, floor_id, state, future_options, biases);
            if picked.is_some() {
                return picked;
            }
        }
        None
    }

    fn pick_stage(
        &self,
        base: &[usize],
        stage: u8,
        band_allowance: u32,
        slot: &dutyplan_core::BreakSlotSpec,
        floor_id: FloorId,
        state: &PlanState,
        future_options: &[u32],
        biases: &[f64],
    ) -> Option<usize> {
        let problem = self.problem;
        let mut best: Option<(usize, CandidateKey)> = None;

        for &teacher_index in base {
            let teacher = &problem.teachers[teacher_index];
            let load = state.loads[teacher_index];
            let duties_today = state.duties_today(teacher_index, slot.date);

            let load_ok = match stage {
                0 => load < teacher.target,
                1 | 2 => load < teacher.target + band_allowance,
                _ => true,
            };
            let daily_ok = match stage {
                0 | 1 => duties_today < 2,
                _ => true,
            };
            if !load_ok || !daily_ok {
                continue;
            }

            let key = self.candidate_key(
                teacher,
                teacher_index,
                floor_id,
                slot.day_index,
                load,
                duties_today,
                future_options[teacher_index],
                biases[teacher_index],
                state,
            );
            let better = match &best {
                None => true,
                Some((_, current)) => key.compare(current) == Ordering::Less,
            };
            if better {
                best = Some((teacher_index, key));
            }
        }

        best.map(|(teacher_index, _)| teacher_index)
    }

    fn candidate_key(
        &self,
        teacher: &TeacherSpec,
        teacher_index: usize,
        floor_id: FloorId,
        day_index: u8,
        load: u32,
        duties_today: u32,
        future_options: u32,
        bias: f64,
        state: &PlanState,
    ) -> CandidateKey {
        let priority_class = match teacher.preferred_floor {
            Some(preferred) if preferred == floor_id => 0,
            None => 1,
            Some(_) => 2,
        };
        let day_distribution = f64::from(
            state
                .duties_by_weekday
                .get(&(teacher_index, day_index))
                .copied()
                .unwrap_or(0),
        );
        let floor_bonus = if teacher.preferred_floor == Some(floor_id) {
            -0.8
        } else {
            0.0
        };
        let part_time_bonus = match teacher.availability_days {
            0..=2 => -2.0,
            3 => -1.0,
            4 => -0.5,
            _ => 0.0,
        };
        let pressure =
            f64::from(load) / f64::from(teacher.target.max(1)) + f64::from(duties_today) * 5.0;

        CandidateKey {
            priority_class,
            has_duty_today: duties_today > 0,
            future_options,
            bonus: day_distribution + floor_bonus + part_time_bonus,
            pressure,
            load,
            bias,
        }
    }

    fn consecutive_conflict(
        &self,
        state: &PlanState,
        teacher: usize,
        date: NaiveDate,
        break_index: u8,
    ) -> bool {
        let before = break_index
            .checked_sub(1)
            .is_some_and(|b| state.taken_breaks.contains(&(teacher, date, b)));
        before || state.taken_breaks.contains(&(teacher, date, break_index + 1))
    }

    fn finish(
        &self,
        state: PlanState,
        assignments: Vec<AssignmentDecision>,
        shortfalls: std::collections::BTreeMap<(String, FloorId), u32>,
        priority_cost: i64,
        started: Instant,
    ) -> SolverResult {
        let problem = self.problem;
        let params = &problem.params;

        let mut max_dev = 0i64;
        let mut total_dev = 0i64;
        let mut band_violation = 0i64;
        let mut loads = std::collections::BTreeMap::new();

        for (index, teacher) in problem.teachers.iter().enumerate() {
            let load = i64::from(state.loads[index]);
            let target = i64::from(teacher.target);
            let dev_pos = (load - target).max(0);
            let dev_neg = (target - load).max(0);
            max_dev = max_dev.max(dev_pos).max(dev_neg);
            total_dev += dev_pos + dev_neg * i64::from(teacher.availability_days.max(1));

            match params.fairness_band {
                Some(band) => {
                    let band = i64::from(band);
                    band_violation += ((target - band) - load).max(0);
                    band_violation += (load - (target + band)).max(0);
                }
                None => {
                    if let Some(extra) = params.max_extra_duties {
                        band_violation += (load - (target + i64::from(extra))).max(0);
                    }
                }
            }
            if let Some(extra) = params.max_extra_duties {
                let band = i64::from(params.fairness_band.unwrap_or(0));
                band_violation += (load - (target + band + i64::from(extra))).max(0);
            }

            loads.insert(teacher.id, state.loads[index]);
        }

        let daily_excess = state
            .duties_by_day
            .values()
            .map(|&count| i64::from(count.saturating_sub(1)))
            .sum();
        let total_shortfall = shortfalls.values().sum();

        SolverResult {
            status: SolverStatus::Feasible,
            assignments,
            loads,
            max_dev,
            priority_cost,
            total_dev,
            daily_excess,
            band_violation,
            total_shortfall,
            shortfalls,
            wall_time: started.elapsed(),
        }
    }
}
