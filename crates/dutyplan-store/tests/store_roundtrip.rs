//! Integration tests against a real SQLite file.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use dutyplan_store::{
    connect, AssignmentRepository, DbPool, FloorRepository, SlotRepository, TeacherRepository,
};
use tempfile::TempDir;

async fn open_store() -> (TempDir, DbPool) {
    let dir = TempDir::new().expect("temp dir");
    let pool = connect(&dir.path().join("plan.db")).await.expect("connect");
    (dir, pool)
}

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 2).unwrap()
}

fn sunday_before() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 1).unwrap()
}

fn friday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 9, 6).unwrap()
}

#[tokio::test]
async fn ensure_slots_is_idempotent_and_skips_weekends() {
    let (_dir, pool) = open_store().await;
    let floors = FloorRepository::new(pool.clone());
    floors.insert("EG", 1, 0).await.unwrap();
    floors.insert("OG1", 2, 1).await.unwrap();

    let slots = SlotRepository::new(pool.clone());
    // Sunday..Friday covers one weekend day and five school days
    let first = slots.ensure_slots(sunday_before(), friday(), 2).await.unwrap();
    assert_eq!(first.len(), 5 * 2 * 2);
    assert!(first.iter().all(|slot| slot.date >= monday()));

    let second = slots.ensure_slots(sunday_before(), friday(), 2).await.unwrap();
    assert_eq!(second.len(), first.len());
    let ids_first: Vec<_> = first.iter().map(|s| s.id).collect();
    let ids_second: Vec<_> = second.iter().map(|s| s.id).collect();
    assert_eq!(ids_first, ids_second);
}

#[tokio::test]
async fn active_teachers_come_with_quota_and_lessons() {
    let (_dir, pool) = open_store().await;
    let teachers = TeacherRepository::new(pool.clone());

    let id = teachers
        .insert("Ada", "Lovelace", Some("LOV"), false, None, None)
        .await
        .unwrap();
    teachers.set_quota(id, 3).await.unwrap();
    teachers.add_lesson(id, 0, 2).await.unwrap();
    teachers.add_lesson(id, 2, 4).await.unwrap();

    let exempt = teachers
        .insert("Max", "Muster", Some("MUS"), true, None, None)
        .await
        .unwrap();
    teachers.set_quota(exempt, 5).await.unwrap();

    let active = teachers.list_active().await.unwrap();
    assert_eq!(active.len(), 1);
    let teacher = &active[0];
    assert_eq!(teacher.row.id, id);
    assert_eq!(teacher.target_duties, 3);
    assert_eq!(teacher.lessons.len(), 2);
    assert_eq!(teacher.actual_attendance_mask(), 0b00101);
}

#[tokio::test]
async fn clear_and_rewrite_assignments_in_one_transaction() {
    let (_dir, pool) = open_store().await;
    let floors = FloorRepository::new(pool.clone());
    let floor = floors.insert("EG", 1, 0).await.unwrap();
    let teachers = TeacherRepository::new(pool.clone());
    let teacher = teachers
        .insert("Ada", "Lovelace", Some("LOV"), false, None, None)
        .await
        .unwrap();

    let slots = SlotRepository::new(pool.clone());
    let created = slots.ensure_slots(monday(), monday(), 2).await.unwrap();
    assert_eq!(created.len(), 2);

    let assignments = AssignmentRepository::new(pool.clone());
    let mut tx = assignments.clear_range_tx(monday(), monday()).await.unwrap();
    let written = assignments
        .insert_all_tx(&mut tx, &[(created[0].id, teacher)])
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(written, 1);

    let stored = assignments.list_range(monday(), monday()).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].3, teacher);
    assert_eq!(stored[0].2, floor);

    // A second clear+rewrite replaces the plan instead of stacking on it
    let mut tx = assignments.clear_range_tx(monday(), monday()).await.unwrap();
    let written = assignments
        .insert_all_tx(&mut tx, &[(created[1].id, teacher)])
        .await
        .unwrap();
    tx.commit().await.unwrap();
    assert_eq!(written, 1);

    let stored = assignments.list_range(monday(), monday()).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].1, created[1].break_index);
}

#[tokio::test]
async fn replace_lessons_refreshes_default_attendance_only() {
    let (_dir, pool) = open_store().await;
    let teachers = TeacherRepository::new(pool.clone());
    let derived = teachers
        .insert("Ada", "Lovelace", Some("LOV"), false, None, None)
        .await
        .unwrap();
    // Manually pinned to Monday only; the import must not touch it
    let pinned = teachers
        .insert("Grace", "Hopper", Some("HOP"), false, None, Some(0b00001))
        .await
        .unwrap();

    let mut lessons: HashMap<i64, BTreeSet<(u8, u8)>> = HashMap::new();
    lessons.insert(derived, BTreeSet::from([(1, 2), (3, 4)]));
    lessons.insert(pinned, BTreeSet::from([(1, 2), (2, 3)]));

    let imported = teachers.replace_lessons(&lessons).await.unwrap();
    assert_eq!(imported, 4);

    let active = teachers.list_active().await.unwrap();
    let derived_teacher = active.iter().find(|t| t.row.id == derived).unwrap();
    let pinned_teacher = active.iter().find(|t| t.row.id == pinned).unwrap();
    assert_eq!(derived_teacher.actual_attendance_mask(), 0b01010);
    assert_eq!(pinned_teacher.actual_attendance_mask(), 0b00001);
}

#[tokio::test]
async fn export_records_are_joined_in_roster_order() {
    let (_dir, pool) = open_store().await;
    let floors = FloorRepository::new(pool.clone());
    let ground = floors.insert("EG", 1, 0).await.unwrap();
    let upper = floors.insert("OG1", 1, 1).await.unwrap();
    let teachers = TeacherRepository::new(pool.clone());
    let lovelace = teachers
        .insert("Ada", "Lovelace", Some("LOV"), false, None, None)
        .await
        .unwrap();
    let unabbreviated = teachers
        .insert("Grace", "Hopper", None, false, None, None)
        .await
        .unwrap();

    let slots = SlotRepository::new(pool.clone());
    let created = slots.ensure_slots(monday(), monday(), 1).await.unwrap();
    assert_eq!(created.len(), 2);
    let slot_for = |floor: i64| created.iter().find(|s| s.floor_id == floor).unwrap().id;

    let assignments = AssignmentRepository::new(pool.clone());
    let mut tx = assignments.clear_range_tx(monday(), monday()).await.unwrap();
    assignments
        .insert_all_tx(
            &mut tx,
            &[(slot_for(upper), lovelace), (slot_for(ground), unabbreviated)],
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let records = assignments.list_export_records(monday(), monday()).await.unwrap();
    assert_eq!(records.len(), 2);
    // floors sort by name within the break: EG before OG1
    assert_eq!(records[0].floor_name, "EG");
    assert_eq!(records[0].abbreviation, None);
    assert_eq!(records[0].last_name, "Hopper");
    assert_eq!(records[1].floor_name, "OG1");
    assert_eq!(records[1].abbreviation.as_deref(), Some("LOV"));
}
