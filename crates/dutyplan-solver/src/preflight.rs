//! Preflight shortage analysis.
//!
//! Flags structural infeasibilities before solving: slots whose demand
//! exceeds the eligible pool, and days whose total demand exceeds the
//! distinct eligible heads when only one duty per day is allowed. These
//! are warnings; the solver reports the same gaps as shortfall.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::warn;

use dutyplan_core::{FloorId, SlotId};

use crate::SupervisionProblem;

/// A slot/floor whose demand cannot be covered by eligible teachers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlotShortage {
    pub slot_id: SlotId,
    pub date: NaiveDate,
    pub day_index: u8,
    pub break_index: u8,
    pub floor_id: FloorId,
    pub need: u32,
    pub eligible: u32,
}

/// A date whose total demand exceeds the distinct heads available under
/// the one-duty-per-day rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DayShortage {
    pub date: NaiveDate,
    pub need: u32,
    pub eligible_heads: u32,
}

#[derive(Clone, Debug, Default)]
pub struct PreflightReport {
    pub slot_shortages: Vec<SlotShortage>,
    pub day_shortages: Vec<DayShortage>,
}

impl PreflightReport {
    pub fn is_clean(&self) -> bool {
        self.slot_shortages.is_empty() && self.day_shortages.is_empty()
    }
}

/// Inspect the problem for demand the eligible pool can never cover.
pub fn analyze_shortages(problem: &SupervisionProblem) -> PreflightReport {
    let mut report = PreflightReport::default();

    for demand in problem.demands() {
        let slot = &problem.slots[demand.slot];
        let eligible = problem.eligible_teachers(demand.slot).len() as u32;
        if demand.need > eligible {
            warn!(
                slot = %slot.slot_id,
                day_index = slot.day_index,
                break_index = slot.break_index,
                floor = demand.floor_id,
                need = demand.need,
                eligible,
                "demand exceeds the eligible pool for this slot"
            );
            report.slot_shortages.push(SlotShortage {
                slot_id: slot.slot_id.clone(),
                date: slot.date,
                day_index: slot.day_index,
                break_index: slot.break_index,
                floor_id: demand.floor_id,
                need: demand.need,
                eligible,
            });
        }
    }

    if problem.params.max_one_per_day {
        let mut need_per_day: BTreeMap<NaiveDate, u32> = BTreeMap::new();
        let mut heads_per_day: BTreeMap<NaiveDate, BTreeSet<usize>> = BTreeMap::new();
        for demand in problem.demands() {
            let slot = &problem.slots[demand.slot];
            *need_per_day.entry(slot.date).or_insert(0) += demand.need;
            heads_per_day
                .entry(slot.date)
                .or_default()
                .extend(problem.eligible_teachers(demand.slot).iter().copied());
        }
        for (date, need) in need_per_day {
            let eligible_heads = heads_per_day
                .get(&date)
                .map(|heads| heads.len() as u32)
                .unwrap_or(0);
            if need > eligible_heads {
                warn!(
                    %date,
                    need,
                    eligible_heads,
                    "one-duty-per-day demand exceeds the distinct eligible heads"
                );
                report.day_shortages.push(DayShortage {
                    date,
                    need,
                    eligible_heads,
                });
            }
        }
    }

    report
}
