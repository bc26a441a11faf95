//! Reconciliation of external change events into local state
//!
//! The persistence collaborator's change feed pushes insert/update/delete
//! events for one owner's records. Each event is merged by a pure function
//! over `(local tasks, event)` with a last-writer-wins rule keyed by
//! `updated_at`; no ordering is assumed between events beyond that clock.

use serde::{Deserialize, Serialize};

use crate::task::Task;

/// The kind of an external change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One change pushed by the persistence collaborator's feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub record: Task,
}

impl ChangeEvent {
    pub fn insert(record: Task) -> Self {
        Self {
            kind: ChangeKind::Insert,
            record,
        }
    }

    pub fn update(record: Task) -> Self {
        Self {
            kind: ChangeKind::Update,
            record,
        }
    }

    pub fn delete(record: Task) -> Self {
        Self {
            kind: ChangeKind::Delete,
            record,
        }
    }
}

/// What a merge did with an event. Only `Applied` changes local state; the
/// other outcomes are distinguishable for observability and testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Local state changed.
    Applied,
    /// Insert for an id we already hold (an optimistic-create echo).
    AlreadyPresent,
    /// Update older than the local record; discarded.
    Stale,
    /// Update or delete for an id we do not hold.
    Absent,
    /// Event did not apply to this tree (e.g. another owner's record).
    Ignored,
}

impl MergeOutcome {
    /// Stable code for logging; `Stale` maps to the `stale_reconciliation`
    /// taxonomy entry.
    pub fn code(&self) -> &'static str {
        match self {
            MergeOutcome::Applied => "applied",
            MergeOutcome::AlreadyPresent => "already_present",
            MergeOutcome::Stale => "stale_reconciliation",
            MergeOutcome::Absent => "absent",
            MergeOutcome::Ignored => "ignored",
        }
    }
}

/// Merges one event into the flat task list.
///
/// Insert is idempotent by id. Update replaces the local record when the
/// incoming `updated_at` is greater than or equal to the local one (ties
/// favor the incoming record, which is presumed canonical). Delete of an
/// absent id is not an error.
pub fn merge(tasks: &mut Vec<Task>, event: ChangeEvent) -> MergeOutcome {
    let ChangeEvent { kind, record } = event;
    let outcome = match kind {
        ChangeKind::Insert => {
            if tasks.iter().any(|t| t.id == record.id) {
                MergeOutcome::AlreadyPresent
            } else {
                tasks.push(record);
                MergeOutcome::Applied
            }
        }
        ChangeKind::Update => match tasks.iter_mut().find(|t| t.id == record.id) {
            Some(local) => {
                if record.updated_at >= local.updated_at {
                    *local = record;
                    MergeOutcome::Applied
                } else {
                    MergeOutcome::Stale
                }
            }
            None => MergeOutcome::Absent,
        },
        ChangeKind::Delete => {
            let before = tasks.len();
            tasks.retain(|t| t.id != record.id);
            if tasks.len() < before {
                MergeOutcome::Applied
            } else {
                MergeOutcome::Absent
            }
        }
    };

    tracing::debug!(outcome = outcome.code(), "merged change event");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use crate::testutil::task;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    #[test]
    fn insert_is_idempotent() {
        let mut tasks = Vec::new();
        let record = task("a", "A");

        assert_eq!(
            merge(&mut tasks, ChangeEvent::insert(record.clone())),
            MergeOutcome::Applied
        );
        let after_first = tasks.clone();

        assert_eq!(
            merge(&mut tasks, ChangeEvent::insert(record)),
            MergeOutcome::AlreadyPresent
        );
        assert_eq!(tasks, after_first);
    }

    #[test]
    fn newer_update_wins() {
        let mut tasks = vec![task("a", "A")];
        let mut incoming = task("a", "A renamed");
        incoming.updated_at += Duration::seconds(5);

        assert_eq!(
            merge(&mut tasks, ChangeEvent::update(incoming)),
            MergeOutcome::Applied
        );
        assert_eq!(tasks[0].title, "A renamed");
    }

    #[test]
    fn stale_update_is_discarded() {
        let mut local = task("z", "Local");
        local.updated_at += Duration::seconds(10);
        let mut tasks = vec![local.clone()];

        let incoming = task("z", "Older");
        assert_eq!(
            merge(&mut tasks, ChangeEvent::update(incoming)),
            MergeOutcome::Stale
        );
        assert_eq!(tasks, vec![local]);
    }

    #[test]
    fn equal_timestamps_favor_the_incoming_record() {
        let mut tasks = vec![task("a", "Local")];
        let mut incoming = task("a", "Canonical");
        incoming.status = TaskStatus::Done;

        assert_eq!(
            merge(&mut tasks, ChangeEvent::update(incoming)),
            MergeOutcome::Applied
        );
        assert_eq!(tasks[0].title, "Canonical");
        assert_eq!(tasks[0].status, TaskStatus::Done);
    }

    #[test]
    fn delete_removes_and_tolerates_absence() {
        let mut tasks = vec![task("a", "A")];
        let record = task("a", "A");

        assert_eq!(
            merge(&mut tasks, ChangeEvent::delete(record.clone())),
            MergeOutcome::Applied
        );
        assert!(tasks.is_empty());
        assert_eq!(
            merge(&mut tasks, ChangeEvent::delete(record)),
            MergeOutcome::Absent
        );
    }

    #[test]
    fn update_for_an_unknown_id_leaves_state_alone() {
        let mut tasks = vec![task("a", "A")];
        let incoming = task("ghost", "Ghost");

        assert_eq!(
            merge(&mut tasks, ChangeEvent::update(incoming)),
            MergeOutcome::Absent
        );
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn change_kind_uses_snake_case_on_the_wire() {
        assert_eq!(
            serde_json::to_string(&ChangeKind::Insert).unwrap(),
            "\"insert\""
        );
        let parsed: ChangeKind = serde_json::from_str("\"delete\"").unwrap();
        assert_eq!(parsed, ChangeKind::Delete);
    }
}
