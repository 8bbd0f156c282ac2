use time::macros::datetime;

use super::*;

fn task(completed: bool) -> Task {
    let at = datetime!(2024-05-01 10:00 UTC);
    Task {
        id: Uuid::new_v4(),
        title: "t".into(),
        description: String::new(),
        completed,
        user_id: Uuid::new_v4(),
        created_at: at,
        updated_at: at,
    }
}

// =============================================================================
// Task serde
// =============================================================================

#[test]
fn task_deserializes_store_row() {
    let json = r#"{
        "id": "3f2c1b1a-0000-4000-8000-000000000001",
        "title": "Buy milk",
        "description": null,
        "completed": false,
        "user_id": "3f2c1b1a-0000-4000-8000-000000000002",
        "created_at": "2024-05-01T10:00:00.123456+00:00",
        "updated_at": "2024-05-01T10:00:00.123456+00:00"
    }"#;
    let task: Task = serde_json::from_str(json).unwrap();
    assert_eq!(task.title, "Buy milk");
    assert_eq!(task.description, "");
    assert!(!task.completed);
    assert_eq!(task.created_at.date(), time::macros::date!(2024-05-01));
}

#[test]
fn task_missing_optional_fields_take_defaults() {
    let json = r#"{
        "id": "3f2c1b1a-0000-4000-8000-000000000001",
        "title": "x",
        "user_id": "3f2c1b1a-0000-4000-8000-000000000002",
        "created_at": "2024-05-01T10:00:00Z",
        "updated_at": "2024-05-01T10:00:00Z"
    }"#;
    let task: Task = serde_json::from_str(json).unwrap();
    assert_eq!(task.description, "");
    assert!(!task.completed);
}

#[test]
fn patch_serializes_only_set_fields() {
    let json = serde_json::to_value(TaskPatch::completed(true)).unwrap();
    assert_eq!(json, serde_json::json!({ "completed": true }));

    let json = serde_json::to_value(TaskPatch::edit("a", "")).unwrap();
    assert_eq!(json, serde_json::json!({ "title": "a", "description": "" }));
}

#[test]
fn patch_apply_leaves_unset_fields() {
    let mut t = task(false);
    t.description = "keep".into();
    TaskPatch { title: Some("new".into()), ..TaskPatch::default() }.apply_to(&mut t);
    assert_eq!(t.title, "new");
    assert_eq!(t.description, "keep");
    assert!(!t.completed);
}

// =============================================================================
// TaskStats
// =============================================================================

#[test]
fn stats_empty_list() {
    assert_eq!(TaskStats::from_tasks(&[]), TaskStats::default());
}

#[test]
fn stats_round_half_up() {
    let mut tasks: Vec<Task> = (0..8).map(|_| task(false)).collect();
    tasks[0].completed = true;
    let stats = TaskStats::from_tasks(&tasks);
    assert_eq!(stats.total, 8);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.pending, 7);
    assert_eq!(stats.completion_rate, 13);
}

#[test]
fn stats_thirds() {
    let stats = TaskStats::from_tasks(&[task(true), task(false), task(false)]);
    assert_eq!(stats.completion_rate, 33);
    let stats = TaskStats::from_tasks(&[task(true), task(true), task(false)]);
    assert_eq!(stats.completion_rate, 67);
}

// =============================================================================
// time_ago / short_date
// =============================================================================

#[test]
fn time_ago_buckets() {
    let created = datetime!(2024-05-01 10:00 UTC);
    assert_eq!(time_ago(created, datetime!(2024-05-01 10:59 UTC)), "Just now");
    assert_eq!(time_ago(created, datetime!(2024-05-01 15:00 UTC)), "5h ago");
    assert_eq!(time_ago(created, datetime!(2024-05-04 10:00 UTC)), "3d ago");
    assert_eq!(time_ago(created, datetime!(2024-05-16 10:00 UTC)), "2w ago");
}

#[test]
fn time_ago_future_is_just_now() {
    let created = datetime!(2024-05-01 10:00 UTC);
    assert_eq!(time_ago(created, datetime!(2024-05-01 08:00 UTC)), "Just now");
}

#[test]
fn short_date_format() {
    assert_eq!(short_date(datetime!(2024-05-01 10:00 UTC)), "May 1, 2024");
}
