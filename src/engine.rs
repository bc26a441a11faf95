//! Mutation engine over whole-tree snapshots
//!
//! Each public operation is atomic with respect to the in-memory tree: it
//! either fully applies or is rejected before any state changes. Guard and
//! validation failures are detected synchronously and never produce a dirty
//! record for persistence. Every applied mutation carries the pre-mutation
//! snapshot so the caller can revert if the asynchronous persistence step
//! fails.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

use crate::error::EngineError;
use crate::sync::{merge, ChangeEvent, MergeOutcome};
use crate::task::{normalize_title, Task, TaskStatus, PLACEHOLDER_PREFIX};
use crate::tree::TreeIndex;

/// A value-level copy of the whole tree, taken before an optimistic mutation
/// and restored verbatim if persistence fails.
#[derive(Debug, Clone)]
pub struct Snapshot {
    tasks: Vec<Task>,
}

/// The result of an applied mutation: the records whose persisted fields
/// actually changed (no-op renumbers are skipped), plus the rollback value.
#[derive(Debug)]
pub struct MutationOutcome {
    pub dirty: Vec<Task>,
    pub snapshot: Snapshot,
}

/// The result of an applied create: the optimistic record (placeholder id)
/// and any siblings renumbered to make room for it.
#[derive(Debug)]
pub struct CreateOutcome {
    pub task: Task,
    pub renumbered: Vec<Task>,
    pub snapshot: Snapshot,
}

/// The result of an applied delete: the removed record and the departed
/// sibling group renumbered back to a contiguous sequence.
#[derive(Debug)]
pub struct DeleteOutcome {
    pub removed: Task,
    pub renumbered: Vec<Task>,
    pub snapshot: Snapshot,
}

/// The in-memory task tree for one owner, with the derived index kept in
/// step with the flat record list.
pub struct Engine {
    owner: String,
    tasks: Vec<Task>,
    index: TreeIndex,
    rng: StdRng,
}

impl Engine {
    /// Creates an empty engine scoped to `owner`.
    pub fn new(owner: impl Into<String>) -> Self {
        Self::from_records(owner, Vec::new())
    }

    /// Builds an engine from the owner's fetched records. Records belonging
    /// to another owner are discarded; the engine never operates across
    /// owners.
    pub fn from_records(owner: impl Into<String>, records: Vec<Task>) -> Self {
        let owner = owner.into();
        let tasks: Vec<Task> = records
            .into_iter()
            .filter(|t| {
                if t.owner == owner {
                    true
                } else {
                    tracing::warn!(task_id = %t.id, "discarding record with mismatched owner");
                    false
                }
            })
            .collect();
        let index = TreeIndex::build(&tasks);
        Self {
            owner,
            tasks,
            index,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The flat record list, in no particular order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// The derived tree index, rebuilt after every mutation.
    pub fn index(&self) -> &TreeIndex {
        &self.index
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.index.get(id)
    }

    /// Takes a value-level copy of the current tree.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            tasks: self.tasks.clone(),
        }
    }

    /// Restores a previously taken snapshot, discarding any mutations applied
    /// since.
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.tasks = snapshot.tasks;
        self.rebuild();
    }

    fn rebuild(&mut self) {
        self.index = TreeIndex::build(&self.tasks);
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn placeholder_id(&mut self) -> String {
        format!("{}{:016x}", PLACEHOLDER_PREFIX, self.rng.gen::<u64>())
    }

    fn require(&self, id: &str) -> Result<&Task, EngineError> {
        self.index
            .get(id)
            .ok_or_else(|| EngineError::UnknownTask(id.to_string()))
    }

    fn task_mut(&mut self, id: &str) -> &mut Task {
        // Only called after `require` has proven the id exists.
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .expect("task id validated before lookup")
    }

    /// Creates a task with the given title under `parent_id` (root when
    /// `None`). A missing `sort_order` appends at the end of the destination
    /// group; a supplied one is clamped to the group and the group is
    /// renumbered around the insertion.
    pub fn create(
        &mut self,
        title: &str,
        parent_id: Option<String>,
        sort_order: Option<u32>,
    ) -> Result<CreateOutcome, EngineError> {
        let title = normalize_title(title)?;
        if let Some(parent) = &parent_id {
            self.require(parent)?;
        }

        let snapshot = self.snapshot();
        let now = self.now();
        let siblings: Vec<String> = self
            .index
            .child_ids(parent_id.as_deref())
            .to_vec();
        let position = sort_order
            .map(|n| (n as usize).min(siblings.len()))
            .unwrap_or(siblings.len());

        let task = Task {
            id: self.placeholder_id(),
            owner: self.owner.clone(),
            parent_id: parent_id.clone(),
            blocking_task_id: None,
            title,
            status: TaskStatus::Todo,
            force_completed: false,
            due_at: None,
            sort_order: position as u32,
            created_at: now,
            updated_at: now,
        };
        tracing::debug!(task_id = %task.id, parent = ?parent_id, position, "create task");

        let mut order = siblings;
        order.insert(position, task.id.clone());
        self.tasks.push(task.clone());
        let renumbered = self.renumber(&order, now, &task.id);
        self.rebuild();

        Ok(CreateOutcome {
            task: self.get_cloned(&task.id),
            renumbered,
            snapshot,
        })
    }

    /// Retitles a task. Same emptiness validation as create.
    pub fn rename(&mut self, id: &str, title: &str) -> Result<MutationOutcome, EngineError> {
        let title = normalize_title(title)?;
        self.require(id)?;

        let snapshot = self.snapshot();
        let now = self.now();
        let task = self.task_mut(id);
        task.title = title;
        task.updated_at = now;
        let dirty = vec![task.clone()];
        self.rebuild();
        tracing::debug!(task_id = %id, "rename task");

        Ok(MutationOutcome { dirty, snapshot })
    }

    /// Sets a task's status directly, without running the completion gate.
    /// Any direct status change revokes a previous forced completion.
    pub fn set_status(
        &mut self,
        id: &str,
        status: TaskStatus,
    ) -> Result<MutationOutcome, EngineError> {
        self.require(id)?;

        let snapshot = self.snapshot();
        let now = self.now();
        let task = self.task_mut(id);
        task.status = status;
        task.force_completed = false;
        task.updated_at = now;
        let dirty = vec![task.clone()];
        self.rebuild();
        tracing::debug!(task_id = %id, %status, "set status");

        Ok(MutationOutcome { dirty, snapshot })
    }

    /// Completes a task through the gate. With `force`, the gate is bypassed
    /// and the override is recorded in `force_completed`.
    pub fn complete(&mut self, id: &str, force: bool) -> Result<MutationOutcome, EngineError> {
        let task = self.require(id)?;
        if !force {
            self.index.can_complete(task)?;
        }

        let snapshot = self.snapshot();
        let now = self.now();
        let task = self.task_mut(id);
        task.status = TaskStatus::Done;
        task.force_completed = force;
        task.updated_at = now;
        let dirty = vec![task.clone()];
        self.rebuild();
        tracing::debug!(task_id = %id, force, "complete task");

        Ok(MutationOutcome { dirty, snapshot })
    }

    /// Sets or clears a task's blocker. A blocker may not be the task itself
    /// or any of its descendants.
    pub fn set_blocker(
        &mut self,
        id: &str,
        blocker_id: Option<String>,
    ) -> Result<MutationOutcome, EngineError> {
        self.require(id)?;
        if let Some(blocker) = &blocker_id {
            self.require(blocker)?;
            if blocker == id || self.index.is_descendant(blocker, id) {
                return Err(EngineError::CyclicBlocker);
            }
        }

        let snapshot = self.snapshot();
        let now = self.now();
        let task = self.task_mut(id);
        task.blocking_task_id = blocker_id;
        task.updated_at = now;
        let dirty = vec![task.clone()];
        self.rebuild();
        tracing::debug!(task_id = %id, "set blocker");

        Ok(MutationOutcome { dirty, snapshot })
    }

    /// Sets or clears a task's due date.
    pub fn set_due_date(
        &mut self,
        id: &str,
        due_at: Option<DateTime<Utc>>,
    ) -> Result<MutationOutcome, EngineError> {
        self.require(id)?;

        let snapshot = self.snapshot();
        let now = self.now();
        let task = self.task_mut(id);
        task.due_at = due_at;
        task.updated_at = now;
        let dirty = vec![task.clone()];
        self.rebuild();

        Ok(MutationOutcome { dirty, snapshot })
    }

    /// Moves a task to a new parent (root when `None`) at the requested
    /// position, clamped to the destination group. Both the departed and the
    /// destination sibling groups are renumbered contiguously; the outcome
    /// lists every record whose position actually changed.
    pub fn move_task(
        &mut self,
        id: &str,
        new_parent: Option<String>,
        new_sort_order: u32,
    ) -> Result<MutationOutcome, EngineError> {
        let task = self.require(id)?;
        let old_parent = task.parent_id.clone();
        if let Some(parent) = &new_parent {
            self.require(parent)?;
            if parent == id || self.index.is_descendant(parent, id) {
                return Err(EngineError::CyclicReparent);
            }
        }

        let snapshot = self.snapshot();
        let now = self.now();

        // Desired positions, keyed by id; destination entries overwrite
        // source entries when the move stays within one group.
        let mut desired: HashMap<String, (Option<String>, u32)> = HashMap::new();

        let source: Vec<String> = self
            .index
            .child_ids(old_parent.as_deref())
            .iter()
            .filter(|sibling| sibling.as_str() != id)
            .cloned()
            .collect();
        for (i, sibling) in source.iter().enumerate() {
            desired.insert(sibling.clone(), (old_parent.clone(), i as u32));
        }

        let mut destination: Vec<String> = self
            .index
            .child_ids(new_parent.as_deref())
            .iter()
            .filter(|sibling| sibling.as_str() != id)
            .cloned()
            .collect();
        let position = (new_sort_order as usize).min(destination.len());
        destination.insert(position, id.to_string());
        for (i, sibling) in destination.iter().enumerate() {
            let parent = if sibling == id {
                new_parent.clone()
            } else {
                self.index
                    .get(sibling)
                    .and_then(|t| t.parent_id.clone())
            };
            desired.insert(sibling.clone(), (parent, i as u32));
        }

        let mut dirty = Vec::new();
        for task in &mut self.tasks {
            if let Some((parent, sort_order)) = desired.get(&task.id) {
                if task.parent_id != *parent || task.sort_order != *sort_order {
                    task.parent_id = parent.clone();
                    task.sort_order = *sort_order;
                    task.updated_at = now;
                    dirty.push(task.clone());
                }
            }
        }
        self.rebuild();
        tracing::debug!(task_id = %id, parent = ?new_parent, position, changed = dirty.len(), "move task");

        Ok(MutationOutcome { dirty, snapshot })
    }

    /// Deletes a single task and renumbers its departed sibling group. The
    /// task's descendants are left in place: what happens to them is an
    /// explicit policy decision for the caller, never an implicit cascade.
    pub fn delete(&mut self, id: &str) -> Result<DeleteOutcome, EngineError> {
        let removed = self.require(id)?.clone();

        let snapshot = self.snapshot();
        let now = self.now();
        self.tasks.retain(|t| t.id != id);

        let order: Vec<String> = self
            .index
            .child_ids(removed.parent_id.as_deref())
            .iter()
            .filter(|sibling| sibling.as_str() != id)
            .cloned()
            .collect();
        let renumbered = self.renumber(&order, now, id);
        self.rebuild();
        tracing::debug!(task_id = %id, "delete task");

        Ok(DeleteOutcome {
            removed,
            renumbered,
            snapshot,
        })
    }

    /// Replaces a locally held record with the canonical one returned by the
    /// persistence collaborator. `local_id` may be a placeholder id from an
    /// optimistic create.
    pub fn confirm(&mut self, local_id: &str, canonical: Task) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == local_id) {
            *task = canonical;
        } else {
            // The record was dropped locally while the write was in flight
            // (e.g. reconciled delete); trust the canonical copy.
            self.tasks.push(canonical);
        }
        self.rebuild();
    }

    /// Merges one external change event into local state (last-writer-wins
    /// by `updated_at`) and rebuilds the index when anything changed.
    pub fn apply_event(&mut self, event: ChangeEvent) -> MergeOutcome {
        if event.record.owner != self.owner {
            tracing::warn!(task_id = %event.record.id, "ignoring change event for another owner");
            return MergeOutcome::Ignored;
        }
        let outcome = merge(&mut self.tasks, event);
        if outcome == MergeOutcome::Applied {
            self.rebuild();
        }
        outcome
    }

    /// Renumbers a sibling group to the contiguous sequence implied by
    /// `order`, refreshing `updated_at` only on records that actually moved.
    /// Returns the changed records, excluding `skip` (already reported
    /// separately by the caller).
    fn renumber(&mut self, order: &[String], now: DateTime<Utc>, skip: &str) -> Vec<Task> {
        let positions: HashMap<&str, u32> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i as u32))
            .collect();

        let mut changed = Vec::new();
        for task in &mut self.tasks {
            if let Some(&sort_order) = positions.get(task.id.as_str()) {
                if task.sort_order != sort_order {
                    task.sort_order = sort_order;
                    task.updated_at = now;
                    if task.id != skip {
                        changed.push(task.clone());
                    }
                }
            }
        }
        changed
    }

    fn get_cloned(&self, id: &str) -> Task {
        self.index
            .get(id)
            .cloned()
            .expect("record inserted moments ago")
    }
}
