//! Per-owner optimistic session
//!
//! A session owns one client's in-memory tree exclusively and drives the
//! full mutation cycle: validate and apply through the engine, persist
//! through the store, then install the canonical records the store returns,
//! restoring the pre-mutation snapshot when persistence fails. External
//! change events are fed in through [`Session::apply_event`] and merge under
//! the same invariants at any point between local operations.
//!
//! Observers can watch for state changes through a broadcast channel; each
//! send carries no payload, it just signals "re-read the tree".

use futures::future::join_all;
use tokio::sync::broadcast;

use crate::engine::{Engine, Snapshot};
use crate::error::SessionError;
use crate::store::TaskStore;
use crate::sync::{ChangeEvent, MergeOutcome};
use crate::task::{Task, TaskDraft, TaskPatch, TaskStatus};
use crate::tree::TreeIndex;

/// One client session over one owner's forest.
pub struct Session<S: TaskStore> {
    engine: Engine,
    store: S,
    update_tx: broadcast::Sender<()>,
}

impl<S: TaskStore> Session<S> {
    /// Fetches the owner's records from the store and builds the session.
    pub async fn load(owner: impl Into<String>, store: S) -> Result<Self, SessionError> {
        let owner = owner.into();
        let records = store.fetch().await?;
        tracing::info!(owner = %owner, records = records.len(), "loaded task records");
        let engine = Engine::from_records(owner, records);
        let (update_tx, _rx) = broadcast::channel(100);
        Ok(Self {
            engine,
            store,
            update_tx,
        })
    }

    pub fn owner(&self) -> &str {
        self.engine.owner()
    }

    /// The flat record list, including unconfirmed optimistic records.
    pub fn tasks(&self) -> &[Task] {
        self.engine.tasks()
    }

    /// The derived tree index for reads.
    pub fn index(&self) -> &TreeIndex {
        self.engine.index()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.engine.get(id)
    }

    /// Subscribe to state-change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.update_tx.subscribe()
    }

    fn notify(&self) {
        let _ = self.update_tx.send(());
    }

    /// Creates a task and persists it. Returns the canonical record with the
    /// server-assigned id; the optimistic placeholder is visible through
    /// [`Session::tasks`] while the write is in flight.
    pub async fn create_task(
        &mut self,
        title: &str,
        parent_id: Option<String>,
        sort_order: Option<u32>,
    ) -> Result<Task, SessionError> {
        let outcome = self.engine.create(title, parent_id.clone(), sort_order)?;
        self.notify();

        let draft = TaskDraft {
            title: outcome.task.title.clone(),
            parent_id,
            sort_order: outcome.task.sort_order,
        };
        match self.store.create(draft).await {
            Ok(canonical) => {
                let record = canonical.clone();
                self.engine.confirm(&outcome.task.id, canonical);
                if outcome.renumbered.is_empty() {
                    self.notify();
                } else {
                    self.persist_positions(outcome.renumbered, outcome.snapshot)
                        .await?;
                }
                Ok(record)
            }
            Err(err) => {
                self.engine.restore(outcome.snapshot);
                self.notify();
                Err(err.into())
            }
        }
    }

    /// Retitles a task and persists the change.
    pub async fn rename_task(&mut self, id: &str, title: &str) -> Result<Task, SessionError> {
        let outcome = self.engine.rename(id, title)?;
        // rename touches exactly one record
        let task = single(outcome.dirty);
        let patch = TaskPatch {
            title: Some(task.title),
            ..TaskPatch::default()
        };
        self.persist_one(id, patch, outcome.snapshot).await
    }

    /// Sets a task's status directly (ungated) and persists the change.
    pub async fn set_status(
        &mut self,
        id: &str,
        status: TaskStatus,
    ) -> Result<Task, SessionError> {
        let outcome = self.engine.set_status(id, status)?;
        let task = single(outcome.dirty);
        let patch = TaskPatch {
            status: Some(task.status),
            force_completed: Some(false),
            ..TaskPatch::default()
        };
        self.persist_one(id, patch, outcome.snapshot).await
    }

    /// Completes a task through the gate (or past it, with `force`) and
    /// persists the change.
    pub async fn complete_task(&mut self, id: &str, force: bool) -> Result<Task, SessionError> {
        let outcome = self.engine.complete(id, force)?;
        let task = single(outcome.dirty);
        let patch = TaskPatch {
            status: Some(task.status),
            force_completed: Some(task.force_completed),
            ..TaskPatch::default()
        };
        self.persist_one(id, patch, outcome.snapshot).await
    }

    /// Sets or clears a task's blocker and persists the change.
    pub async fn set_blocker(
        &mut self,
        id: &str,
        blocker_id: Option<String>,
    ) -> Result<Task, SessionError> {
        let outcome = self.engine.set_blocker(id, blocker_id)?;
        let task = single(outcome.dirty);
        let patch = TaskPatch {
            blocking_task_id: Some(task.blocking_task_id),
            ..TaskPatch::default()
        };
        self.persist_one(id, patch, outcome.snapshot).await
    }

    /// Sets or clears a task's due date and persists the change.
    pub async fn set_due_date(
        &mut self,
        id: &str,
        due_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<Task, SessionError> {
        let outcome = self.engine.set_due_date(id, due_at)?;
        let task = single(outcome.dirty);
        let patch = TaskPatch {
            due_at: Some(task.due_at),
            ..TaskPatch::default()
        };
        self.persist_one(id, patch, outcome.snapshot).await
    }

    /// Moves a task and persists the minimal position diff, one patch per
    /// changed record, gathered concurrently. Any persistence failure
    /// restores the pre-move snapshot.
    pub async fn move_task(
        &mut self,
        id: &str,
        new_parent: Option<String>,
        new_sort_order: u32,
    ) -> Result<(), SessionError> {
        let outcome = self.engine.move_task(id, new_parent, new_sort_order)?;
        if outcome.dirty.is_empty() {
            return Ok(());
        }
        self.persist_positions(outcome.dirty, outcome.snapshot).await
    }

    /// Deletes a single task and persists the deletion plus the departed
    /// group's renumbering. Descendants are untouched; cascading is the
    /// authoritative store's policy decision, not the engine's.
    pub async fn delete_task(&mut self, id: &str) -> Result<(), SessionError> {
        let outcome = self.engine.delete(id)?;
        self.notify();

        if let Err(err) = self.store.delete(id).await {
            self.engine.restore(outcome.snapshot);
            self.notify();
            return Err(err.into());
        }

        if outcome.renumbered.is_empty() {
            self.notify();
            return Ok(());
        }
        // If a renumber patch fails, the restore resurrects the deleted
        // record locally; the change feed settles it with a delete event.
        self.persist_positions(outcome.renumbered, outcome.snapshot)
            .await
    }

    /// Feeds one external change event into the reconciliation layer.
    pub fn apply_event(&mut self, event: ChangeEvent) -> MergeOutcome {
        let outcome = self.engine.apply_event(event);
        if outcome == MergeOutcome::Applied {
            self.notify();
        }
        outcome
    }

    async fn persist_one(
        &mut self,
        id: &str,
        patch: TaskPatch,
        snapshot: Snapshot,
    ) -> Result<Task, SessionError> {
        self.notify();
        match self.store.patch(id, patch).await {
            Ok(canonical) => {
                let record = canonical.clone();
                self.engine.confirm(id, canonical);
                self.notify();
                Ok(record)
            }
            Err(err) => {
                self.engine.restore(snapshot);
                self.notify();
                Err(err.into())
            }
        }
    }

    async fn persist_positions(
        &mut self,
        dirty: Vec<Task>,
        snapshot: Snapshot,
    ) -> Result<(), SessionError> {
        self.notify();
        let results = join_all(dirty.iter().map(|task| {
            self.store.patch(
                &task.id,
                TaskPatch::position(task.parent_id.clone(), task.sort_order),
            )
        }))
        .await;

        let mut canonical = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(record) => canonical.push(record),
                Err(err) => {
                    self.engine.restore(snapshot);
                    self.notify();
                    return Err(err.into());
                }
            }
        }
        for record in canonical {
            let id = record.id.clone();
            self.engine.confirm(&id, record);
        }
        self.notify();
        Ok(())
    }
}

/// Extracts the sole record of a single-record mutation outcome.
fn single(dirty: Vec<Task>) -> Task {
    dirty
        .into_iter()
        .next()
        .expect("single-record mutation produced no dirty record")
}
