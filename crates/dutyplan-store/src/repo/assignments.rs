//! Assignment writing, clearing and export queries.
//!
//! Clearing and rewriting happen inside one transaction so a concurrent
//! reader never observes a half-cleared plan. The clear step retries on
//! transient lock contention with linear backoff, one fresh transaction
//! per attempt.

use std::time::Duration;

use chrono::NaiveDate;
use dutyplan_core::TeacherId;
use sqlx::{Sqlite, Transaction};
use tracing::{debug, warn};

use crate::model::ExportRecord;
use crate::{DbPool, StoreError};

const CLEAR_MAX_ATTEMPTS: u32 = 5;
const CLEAR_BACKOFF_STEP: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct AssignmentRepository {
    pool: DbPool,
}

impl AssignmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Delete every assignment whose duty slot falls in `[start, end]` and
    /// hand back the still-open transaction for the subsequent rewrite.
    pub async fn clear_range_tx(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Transaction<'static, Sqlite>, StoreError> {
        let mut attempt = 1u32;
        loop {
            let mut tx = self.pool.begin().await.map_err(StoreError::Query)?;
            let cleared = sqlx::query(
                r#"
                DELETE FROM assignments WHERE duty_slot_id IN (
                    SELECT id FROM duty_slots WHERE date >= ? AND date <= ?
                )
                "#,
            )
            .bind(start)
            .bind(end)
            .execute(&mut *tx)
            .await;

            match cleared {
                Ok(done) => {
                    debug!(rows = done.rows_affected(), attempt, "assignments cleared");
                    return Ok(tx);
                }
                Err(source) => {
                    drop(tx);
                    if attempt >= CLEAR_MAX_ATTEMPTS || !crate::error::is_busy(&source) {
                        return Err(StoreError::ClearContention {
                            attempts: attempt,
                            source,
                        });
                    }
                    warn!(attempt, "database locked while clearing assignments; retrying");
                    tokio::time::sleep(CLEAR_BACKOFF_STEP * attempt).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Insert assignment pairs inside the caller's transaction.
    pub async fn insert_all_tx(
        &self,
        tx: &mut Transaction<'static, Sqlite>,
        pairs: &[(i64, TeacherId)],
    ) -> Result<u64, StoreError> {
        let mut created = 0u64;
        for &(duty_slot_id, teacher_id) in pairs {
            sqlx::query("INSERT INTO assignments (duty_slot_id, teacher_id) VALUES (?, ?)")
                .bind(duty_slot_id)
                .bind(teacher_id)
                .execute(&mut **tx)
                .await
                .map_err(StoreError::Query)?;
            created += 1;
        }
        Ok(created)
    }

    /// Assignment tuples in the range, ordered deterministically; used by
    /// tests and diagnostics.
    pub async fn list_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<(NaiveDate, i64, i64, TeacherId)>, StoreError> {
        sqlx::query_as(
            r#"
            SELECT s.date, s.break_index, s.floor_id, a.teacher_id
            FROM assignments a
            JOIN duty_slots s ON s.id = a.duty_slot_id
            WHERE s.date >= ? AND s.date <= ?
            ORDER BY s.date, s.break_index, s.floor_id, a.teacher_id
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Query)
    }

    /// Joined rows for the GPU009 export, in roster order.
    pub async fn list_export_records(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ExportRecord>, StoreError> {
        sqlx::query_as::<_, ExportRecord>(
            r#"
            SELECT s.date, s.break_index, f.name AS floor_name, t.abbreviation, t.last_name
            FROM assignments a
            JOIN duty_slots s ON s.id = a.duty_slot_id
            JOIN floors f ON f.id = s.floor_id
            JOIN teachers t ON t.id = a.teacher_id
            WHERE s.date >= ? AND s.date <= ?
            ORDER BY s.date, s.break_index, f.name, t.last_name, t.first_name
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Query)
    }
}
