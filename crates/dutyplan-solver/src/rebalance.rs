//! Target rebalancing.
//!
//! When the declared quotas cannot cover the demanded head count, the
//! deficit is spread over the pool in proportion to availability days,
//! using the largest-remainder rule so exactly `need - nominal` extra
//! duties are handed out.

use tracing::info;

use dutyplan_core::TeacherSpec;

/// Raise targets until `sum(target) >= total_need`, or leave them alone
/// when the declared quotas already cover the demand.
///
/// Weights are `max(availability_days, 1)`; remainder units go to the
/// largest fractional parts, ties broken by ascending teacher id.
pub fn rebalance_targets(teachers: &mut [TeacherSpec], total_need: u32) {
    if teachers.is_empty() {
        return;
    }
    let nominal: u64 = teachers.iter().map(|t| u64::from(t.nominal_target)).sum();
    let need = u64::from(total_need);
    if nominal >= need {
        return;
    }
    let extra = need - nominal;

    let weights: Vec<u64> = teachers
        .iter()
        .map(|t| u64::from(t.availability_days.max(1)))
        .collect();
    let weight_sum: u64 = weights.iter().sum();

    // Integer base share plus fractional remainder, all over weight_sum
    let mut remainders: Vec<(usize, u64)> = Vec::with_capacity(teachers.len());
    let mut distributed = 0u64;
    for (index, teacher) in teachers.iter_mut().enumerate() {
        let exact = extra * weights[index];
        let base = exact / weight_sum;
        teacher.target = teacher.nominal_target + base as u32;
        distributed += base;
        remainders.push((index, exact % weight_sum));
    }

    let mut remainder = extra - distributed;
    remainders.sort_by(|a, b| b.1.cmp(&a.1).then(teachers[a.0].id.cmp(&teachers[b.0].id)));
    for (index, _) in remainders {
        if remainder == 0 {
            break;
        }
        teachers[index].target += 1;
        remainder -= 1;
    }

    info!(
        nominal,
        need,
        extra,
        "declared targets fell short of demand; deficit spread by availability"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn teacher(id: i64, target: u32, days: &[u8]) -> TeacherSpec {
        let mut spec = TeacherSpec::new(id, target);
        for &day in days {
            spec = spec.with_lessons(day, [2]);
        }
        spec
    }

    fn targets(teachers: &[TeacherSpec]) -> Vec<u32> {
        teachers.iter().map(|t| t.target).collect()
    }

    #[test]
    fn no_change_when_targets_cover_need() {
        let mut teachers = vec![teacher(1, 3, &[0]), teacher(2, 2, &[1])];
        rebalance_targets(&mut teachers, 5);
        assert_eq!(targets(&teachers), [3, 2]);
    }

    #[test]
    fn deficit_spread_by_availability() {
        // need 10, nominal 4 -> extra 6; weights 2 and 1 -> shares 4 and 2
        let mut teachers = vec![teacher(1, 2, &[0, 1]), teacher(2, 2, &[2])];
        rebalance_targets(&mut teachers, 10);
        assert_eq!(targets(&teachers), [6, 4]);
        assert_eq!(targets(&teachers).iter().sum::<u32>(), 10);
    }

    #[test]
    fn remainder_goes_to_largest_fraction() {
        // extra 4 over weights (2, 1, 1): bases (2, 1, 1), no remainder
        // extra 5 over weights (2, 1, 1): bases (2, 1, 1), remainder 1 to
        // the largest fractional part (teacher 1 with 10/4 = 2.5)
        let mut teachers = vec![
            teacher(1, 0, &[0, 1]),
            teacher(2, 0, &[2]),
            teacher(3, 0, &[3]),
        ];
        rebalance_targets(&mut teachers, 5);
        assert_eq!(targets(&teachers), [3, 1, 1]);
    }

    #[test]
    fn remainder_ties_break_by_teacher_id() {
        // extra 1 over equal weights: every fraction ties, lowest id wins
        let mut teachers = vec![teacher(3, 0, &[0]), teacher(1, 0, &[1]), teacher(2, 0, &[2])];
        rebalance_targets(&mut teachers, 1);
        let raised: Vec<_> = teachers.iter().filter(|t| t.target == 1).collect();
        assert_eq!(raised.len(), 1);
        assert_eq!(raised[0].id, 1);
    }

    #[test]
    fn teachers_without_lessons_still_get_weight_one() {
        let mut teachers = vec![teacher(1, 0, &[]), teacher(2, 0, &[])];
        rebalance_targets(&mut teachers, 3);
        assert_eq!(targets(&teachers).iter().sum::<u32>(), 3);
    }

    #[test]
    fn nominal_target_is_preserved() {
        let mut teachers = vec![teacher(1, 1, &[0])];
        rebalance_targets(&mut teachers, 4);
        assert_eq!(teachers[0].target, 4);
        assert_eq!(teachers[0].nominal_target, 1);
    }
}
