//! Shared constructors for unit tests.

use chrono::{DateTime, TimeZone, Utc};

use crate::task::{Task, TaskStatus};

pub(crate) const OWNER: &str = "owner-1";

pub(crate) fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

/// A root-level task with sort_order 0.
pub(crate) fn task(id: &str, title: &str) -> Task {
    task_at(id, title, 0)
}

/// A root-level task at the given sort_order.
pub(crate) fn task_at(id: &str, title: &str, sort_order: u32) -> Task {
    Task {
        id: id.to_string(),
        owner: OWNER.to_string(),
        parent_id: None,
        blocking_task_id: None,
        title: title.to_string(),
        status: TaskStatus::Todo,
        force_completed: false,
        due_at: None,
        sort_order,
        created_at: base_time(),
        updated_at: base_time(),
    }
}

/// A child of `parent` at the given sort_order.
pub(crate) fn task_child(id: &str, title: &str, parent: &str, sort_order: u32) -> Task {
    Task {
        parent_id: Some(parent.to_string()),
        ..task_at(id, title, sort_order)
    }
}
