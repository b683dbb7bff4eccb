//! # dutyplan-store
//!
//! SQLite persistence for the dutyplan supervision planner.
//!
//! This crate provides:
//! - Pool setup with WAL journaling and a 5 s busy timeout
//! - Schema bootstrap (idempotent `CREATE TABLE IF NOT EXISTS`)
//! - Repositories for teachers/lessons, floors, duty slots and assignments
//!
//! Teachers, lessons and floors are externally managed; duty slots and
//! assignments are owned by the scheduler.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::debug;

pub mod error;
pub mod model;
pub mod repo;

pub use error::StoreError;
pub use model::{
    AssignmentRow, DutySlotRow, ExportRecord, FloorRow, LessonRow, Teacher, TeacherRow,
};
pub use repo::{AssignmentRepository, FloorRepository, SlotRepository, TeacherRepository};

pub type DbPool = SqlitePool;

/// Open (and create if missing) the planner database at `path`.
pub async fn connect(path: &Path) -> Result<DbPool, StoreError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(StoreError::Connection)?;
    init_schema(&pool).await?;
    debug!(path = %path.display(), "database ready");
    Ok(pool)
}

/// Create all tables and indexes; safe to run repeatedly.
pub async fn init_schema(pool: &DbPool) -> Result<(), StoreError> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS teachers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            abbreviation TEXT UNIQUE,
            exempt INTEGER NOT NULL DEFAULT 0,
            preferred_floor_id INTEGER REFERENCES floors(id) ON DELETE SET NULL,
            attendance_days INTEGER,
            UNIQUE(first_name, last_name, abbreviation)
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS teacher_quotas (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            teacher_id INTEGER NOT NULL UNIQUE REFERENCES teachers(id) ON DELETE CASCADE,
            target_duties INTEGER NOT NULL DEFAULT 0
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS teacher_lessons (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            teacher_id INTEGER NOT NULL REFERENCES teachers(id) ON DELETE CASCADE,
            weekday INTEGER NOT NULL,
            hour INTEGER NOT NULL
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS ix_teacher_lesson_weekday_hour
            ON teacher_lessons(teacher_id, weekday, hour)
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS floors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            required_per_break INTEGER NOT NULL DEFAULT 1,
            order_index INTEGER NOT NULL DEFAULT 0
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS duty_slots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            date TEXT NOT NULL,
            break_index INTEGER NOT NULL,
            floor_id INTEGER NOT NULL REFERENCES floors(id) ON DELETE CASCADE,
            UNIQUE(date, break_index, floor_id)
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS ix_duty_slot_date ON duty_slots(date)
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS assignments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            duty_slot_id INTEGER NOT NULL REFERENCES duty_slots(id) ON DELETE CASCADE,
            teacher_id INTEGER NOT NULL REFERENCES teachers(id) ON DELETE CASCADE,
            UNIQUE(duty_slot_id, teacher_id)
        )
        "#,
        r#"
        CREATE INDEX IF NOT EXISTS ix_assignment_teacher_id ON assignments(teacher_id)
        "#,
    ];
    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(StoreError::Schema)?;
    }
    Ok(())
}
