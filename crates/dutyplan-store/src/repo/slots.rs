//! Duty-slot materialization.

use chrono::NaiveDate;
use dutyplan_core::is_school_day;

use crate::model::DutySlotRow;
use crate::{DbPool, StoreError};

#[derive(Clone)]
pub struct SlotRepository {
    pool: DbPool,
}

impl SlotRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Ensure a `DutySlot` exists for every weekday date in the range,
    /// break index `1..=breaks_per_day` and existing floor; idempotent.
    ///
    /// Returns every slot in the range, including pre-existing ones.
    pub async fn ensure_slots(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        breaks_per_day: u8,
    ) -> Result<Vec<DutySlotRow>, StoreError> {
        let floor_ids: Vec<(i64,)> = sqlx::query_as("SELECT id FROM floors ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::Query)?;

        let mut date = start;
        while date <= end {
            if is_school_day(date) {
                for break_index in 1..=breaks_per_day {
                    for (floor_id,) in &floor_ids {
                        sqlx::query(
                            r#"
                            INSERT INTO duty_slots (date, break_index, floor_id) VALUES (?, ?, ?)
                            ON CONFLICT (date, break_index, floor_id) DO NOTHING
                            "#,
                        )
                        .bind(date)
                        .bind(i64::from(break_index))
                        .bind(floor_id)
                        .execute(&self.pool)
                        .await
                        .map_err(StoreError::Query)?;
                    }
                }
            }
            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        self.list_range(start, end).await
    }

    /// All slots in the range, ordered by `(date, break_index, floor_id)`.
    pub async fn list_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DutySlotRow>, StoreError> {
        sqlx::query_as::<_, DutySlotRow>(
            r#"
            SELECT id, date, break_index, floor_id FROM duty_slots
            WHERE date >= ? AND date <= ?
            ORDER BY date, break_index, floor_id
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Query)
    }
}
