//! Teacher repository: rows, quotas, lessons and attendance upkeep.

use std::collections::{BTreeSet, HashMap};

use dutyplan_core::{FloorId, TeacherId};
use tracing::debug;

use crate::model::{LessonRow, Teacher, TeacherRow, ATTENDANCE_ALL_WEEK};
use crate::{DbPool, StoreError};

#[derive(Clone)]
pub struct TeacherRepository {
    pool: DbPool,
}

impl TeacherRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Non-exempt teachers with quota and lessons loaded, ordered by name.
    pub async fn list_active(&self) -> Result<Vec<Teacher>, StoreError> {
        let rows = sqlx::query_as::<_, TeacherRow>(
            r#"
            SELECT id, first_name, last_name, abbreviation, exempt, preferred_floor_id, attendance_days
            FROM teachers
            WHERE exempt = 0
            ORDER BY last_name, first_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Query)?;

        let quotas: Vec<(TeacherId, i64)> =
            sqlx::query_as("SELECT teacher_id, target_duties FROM teacher_quotas")
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::Query)?;
        let quota_by_teacher: HashMap<TeacherId, i64> = quotas.into_iter().collect();

        let lessons = sqlx::query_as::<_, LessonRow>(
            "SELECT id, teacher_id, weekday, hour FROM teacher_lessons",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Query)?;
        let mut lessons_by_teacher: HashMap<TeacherId, Vec<LessonRow>> = HashMap::new();
        for lesson in lessons {
            lessons_by_teacher
                .entry(lesson.teacher_id)
                .or_default()
                .push(lesson);
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let target = quota_by_teacher
                    .get(&row.id)
                    .copied()
                    .unwrap_or(0)
                    .max(0) as u32;
                let lessons = lessons_by_teacher.remove(&row.id).unwrap_or_default();
                Teacher {
                    row,
                    target_duties: target,
                    lessons,
                }
            })
            .collect())
    }

    /// Map of abbreviation to teacher id, for lesson ingestion.
    pub async fn abbreviation_index(&self) -> Result<HashMap<String, TeacherId>, StoreError> {
        let rows: Vec<(String, TeacherId)> = sqlx::query_as(
            "SELECT abbreviation, id FROM teachers WHERE abbreviation IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::Query)?;
        Ok(rows.into_iter().collect())
    }

    pub async fn insert(
        &self,
        first_name: &str,
        last_name: &str,
        abbreviation: Option<&str>,
        exempt: bool,
        preferred_floor_id: Option<FloorId>,
        attendance_days: Option<i64>,
    ) -> Result<TeacherId, StoreError> {
        let row: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO teachers (first_name, last_name, abbreviation, exempt, preferred_floor_id, attendance_days)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(first_name)
        .bind(last_name)
        .bind(abbreviation)
        .bind(exempt)
        .bind(preferred_floor_id)
        .bind(attendance_days)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::Query)?;
        Ok(row.0)
    }

    pub async fn set_quota(&self, teacher_id: TeacherId, target_duties: u32) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO teacher_quotas (teacher_id, target_duties) VALUES (?, ?)
            ON CONFLICT (teacher_id) DO UPDATE SET target_duties = excluded.target_duties
            "#,
        )
        .bind(teacher_id)
        .bind(i64::from(target_duties))
        .execute(&self.pool)
        .await
        .map_err(StoreError::Query)?;
        Ok(())
    }

    pub async fn add_lesson(
        &self,
        teacher_id: TeacherId,
        weekday: u8,
        hour: u8,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO teacher_lessons (teacher_id, weekday, hour) VALUES (?, ?, ?)")
            .bind(teacher_id)
            .bind(i64::from(weekday))
            .bind(i64::from(hour))
            .execute(&self.pool)
            .await
            .map_err(StoreError::Query)?;
        Ok(())
    }

    /// Replace the whole lesson table with the given per-teacher sets and
    /// refresh attendance masks that still hold a default value.
    ///
    /// Returns the number of inserted lessons.
    pub async fn replace_lessons(
        &self,
        lessons_by_teacher: &HashMap<TeacherId, BTreeSet<(u8, u8)>>,
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::Query)?;

        sqlx::query("DELETE FROM teacher_lessons")
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Query)?;

        let mut imported = 0u64;
        for (&teacher_id, lessons) in lessons_by_teacher {
            for &(weekday, hour) in lessons {
                sqlx::query(
                    "INSERT INTO teacher_lessons (teacher_id, weekday, hour) VALUES (?, ?, ?)",
                )
                .bind(teacher_id)
                .bind(i64::from(weekday))
                .bind(i64::from(hour))
                .execute(&mut *tx)
                .await
                .map_err(StoreError::Query)?;
                imported += 1;
            }
        }

        // Refresh attendance for teachers still on a default mask
        for (&teacher_id, lessons) in lessons_by_teacher {
            let mut mask = 0i64;
            for &(weekday, _) in lessons {
                if weekday < 5 {
                    mask |= 1 << weekday;
                }
            }
            if mask == 0 {
                continue;
            }
            sqlx::query(
                r#"
                UPDATE teachers SET attendance_days = ?
                WHERE id = ? AND (attendance_days IS NULL OR attendance_days IN (0, ?))
                "#,
            )
            .bind(mask)
            .bind(teacher_id)
            .bind(ATTENDANCE_ALL_WEEK)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::Query)?;
        }

        tx.commit().await.map_err(StoreError::Query)?;
        debug!(imported, "lesson table replaced");
        Ok(imported)
    }
}
