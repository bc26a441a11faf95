//! Task records and the wire-facing payload types
//!
//! A task is a node in one owner's forest: nested via `parent_id`, ordered
//! among its siblings by `(sort_order, created_at)`, and optionally gated by
//! a cross-tree blocker reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// The five states a task can be in. Created tasks always start as `Todo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Blocked,
    Delayed,
    Done,
}

impl TaskStatus {
    /// All supported statuses, in display order.
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Todo,
        TaskStatus::InProgress,
        TaskStatus::Blocked,
        TaskStatus::Delayed,
        TaskStatus::Done,
    ];

    /// The wire representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Delayed => "delayed",
            TaskStatus::Done => "done",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                EngineError::Validation(format!(
                    "status must be one of the supported task states, got '{s}'"
                ))
            })
    }
}

/// A single task record, the shape the persistence collaborator stores and
/// streams. The engine holds one owner's records as a flat list and derives
/// the tree from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub owner: String,
    pub parent_id: Option<String>,
    pub blocking_task_id: Option<String>,
    pub title: String,
    pub status: TaskStatus,
    pub force_completed: bool,
    pub due_at: Option<DateTime<Utc>>,
    pub sort_order: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Whether this record still carries an optimistic placeholder id, i.e.
    /// it has not yet been confirmed by the persistence collaborator.
    pub fn is_placeholder(&self) -> bool {
        self.id.starts_with(PLACEHOLDER_PREFIX)
    }
}

/// Prefix for optimistic ids assigned locally while a create is in flight.
pub(crate) const PLACEHOLDER_PREFIX: &str = "temp-";

/// Payload for creating a task. Everything else is defaulted: status `todo`,
/// no blocker, no due date, fresh timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub sort_order: u32,
}

/// The minimal field set sent to the persistence collaborator on update.
///
/// Outer `None` means "leave unchanged"; for the nullable references and the
/// due date, `Some(None)` serializes as an explicit null and clears the field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force_completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocking_task_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_at: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    /// True when no field is set; the persistence collaborator rejects empty
    /// patches, so the engine refuses to produce them.
    pub fn is_empty(&self) -> bool {
        self == &TaskPatch::default()
    }

    /// The positional fields of a task, as persisted after a structural move.
    pub fn position(parent_id: Option<String>, sort_order: u32) -> Self {
        TaskPatch {
            parent_id: Some(parent_id),
            sort_order: Some(sort_order),
            ..TaskPatch::default()
        }
    }
}

/// Trims a caller-supplied title, rejecting empty or whitespace-only input.
pub(crate) fn normalize_title(title: &str) -> Result<String, EngineError> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(
            "Task title is required.".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_round_trips_through_wire_strings() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_is_a_validation_error() {
        let err = "cancelled".parse::<TaskStatus>().unwrap_err();
        assert_eq!(err.code(), "validation_error");
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        let parsed: TaskStatus = serde_json::from_str("\"delayed\"").unwrap();
        assert_eq!(parsed, TaskStatus::Delayed);
    }

    #[test]
    fn patch_distinguishes_absent_from_null() {
        let clear_blocker = TaskPatch {
            blocking_task_id: Some(None),
            ..TaskPatch::default()
        };
        let json = serde_json::to_value(&clear_blocker).unwrap();
        assert_eq!(json, serde_json::json!({ "blocking_task_id": null }));

        let untouched = TaskPatch::default();
        assert_eq!(serde_json::to_value(&untouched).unwrap(), serde_json::json!({}));
        assert!(untouched.is_empty());
    }

    #[test]
    fn title_normalization_trims_and_rejects_blank() {
        assert_eq!(normalize_title("  hello  ").unwrap(), "hello");
        assert!(normalize_title("   ").is_err());
        assert!(normalize_title("").is_err());
    }
}
