//! Row types and the loaded teacher aggregate.

use chrono::NaiveDate;
use dutyplan_core::{FloorId, TeacherId};

/// Attendance bitmask covering Monday..Friday (bits 0..=4 all set)
pub const ATTENDANCE_ALL_WEEK: i64 = 0b1_1111;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TeacherRow {
    pub id: TeacherId,
    pub first_name: String,
    pub last_name: String,
    pub abbreviation: Option<String>,
    pub exempt: bool,
    pub preferred_floor_id: Option<FloorId>,
    /// Bitmask for Monday..Friday; NULL, 0 and 31 count as "not manually set"
    pub attendance_days: Option<i64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LessonRow {
    pub id: i64,
    pub teacher_id: TeacherId,
    pub weekday: i64,
    pub hour: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FloorRow {
    pub id: FloorId,
    pub name: String,
    pub required_per_break: i64,
    pub order_index: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DutySlotRow {
    pub id: i64,
    pub date: NaiveDate,
    pub break_index: i64,
    pub floor_id: FloorId,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AssignmentRow {
    pub id: i64,
    pub duty_slot_id: i64,
    pub teacher_id: TeacherId,
}

/// One line of the duty roster, joined for export.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ExportRecord {
    pub date: NaiveDate,
    pub break_index: i64,
    pub floor_name: String,
    pub abbreviation: Option<String>,
    pub last_name: String,
}

/// Teacher with quota and lessons loaded.
#[derive(Debug, Clone)]
pub struct Teacher {
    pub row: TeacherRow,
    pub target_duties: u32,
    pub lessons: Vec<LessonRow>,
}

impl Teacher {
    /// Effective attendance bitmask.
    ///
    /// A stored mask counts as manually set only when it is neither NULL
    /// nor one of the defaults (0, 31); otherwise attendance is derived
    /// from the weekdays that carry lessons.
    pub fn actual_attendance_mask(&self) -> u8 {
        match self.row.attendance_days {
            Some(stored) if stored != 0 && stored != ATTENDANCE_ALL_WEEK => {
                (stored & ATTENDANCE_ALL_WEEK) as u8
            }
            _ => self.lesson_attendance_mask(),
        }
    }

    /// Attendance derived purely from lesson weekdays.
    pub fn lesson_attendance_mask(&self) -> u8 {
        let mut mask = 0u8;
        for lesson in &self.lessons {
            if (0..5).contains(&lesson.weekday) {
                mask |= 1 << lesson.weekday;
            }
        }
        mask
    }

    pub fn is_available_on_weekday(&self, weekday: u8) -> bool {
        weekday < 5 && self.actual_attendance_mask() & (1 << weekday) != 0
    }
}
