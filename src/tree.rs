//! Tree index over one owner's flat task list
//!
//! The forest is never stored as nested owning pointers: the source of truth
//! is the flat record list, and this index derives parent→children adjacency
//! and id→task lookup from it. Rebuilding is a pure function of the input
//! list; any consumer that mutates a task goes through the mutation engine
//! and rebuilds.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::EngineError;
use crate::task::{Task, TaskStatus};

/// Totally orders two siblings: `sort_order` ascending, `created_at`
/// ascending as the tie-break.
pub fn sibling_order(a: &Task, b: &Task) -> Ordering {
    a.sort_order
        .cmp(&b.sort_order)
        .then_with(|| a.created_at.cmp(&b.created_at))
}

/// Derived adjacency and lookup over a flat task list.
#[derive(Debug, Clone, Default)]
pub struct TreeIndex {
    by_id: HashMap<String, Task>,
    /// Ordered child ids per parent; `None` keys the root sibling group.
    children: HashMap<Option<String>, Vec<String>>,
}

impl TreeIndex {
    /// Builds the index from a flat, unordered record list.
    ///
    /// Records whose `parent_id` has no matching record locally are indexed
    /// at root level so the forest stays traversable while the authoritative
    /// feed settles them.
    pub fn build(tasks: &[Task]) -> Self {
        let by_id: HashMap<String, Task> =
            tasks.iter().map(|t| (t.id.clone(), t.clone())).collect();

        let mut children: HashMap<Option<String>, Vec<String>> = HashMap::new();
        let mut ordered: Vec<&Task> = tasks.iter().collect();
        ordered.sort_by(|a, b| sibling_order(a, b));

        for task in ordered {
            let key = match &task.parent_id {
                Some(parent) if by_id.contains_key(parent) => Some(parent.clone()),
                _ => None,
            };
            children.entry(key).or_default().push(task.id.clone());
        }

        Self { by_id, children }
    }

    /// Looks up a task by id.
    pub fn get(&self, id: &str) -> Option<&Task> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Direct children of `parent` (or the root group for `None`), in
    /// sibling order.
    pub fn children(&self, parent: Option<&str>) -> Vec<&Task> {
        self.child_ids(parent)
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .collect()
    }

    /// Ordered ids of the direct children of `parent`.
    pub fn child_ids(&self, parent: Option<&str>) -> &[String] {
        self.children
            .get(&parent.map(str::to_string))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The root-level sibling group, in order.
    pub fn roots(&self) -> Vec<&Task> {
        self.children(None)
    }

    /// Returns true iff `candidate` appears anywhere in the subtree rooted at
    /// `of` (strict: a task is not its own descendant). False when `of` does
    /// not exist.
    pub fn is_descendant(&self, candidate: &str, of: &str) -> bool {
        let mut stack: Vec<&str> = self.child_ids(Some(of)).iter().map(String::as_str).collect();
        while let Some(id) = stack.pop() {
            if id == candidate {
                return true;
            }
            stack.extend(self.child_ids(Some(id)).iter().map(String::as_str));
        }
        false
    }

    /// Whether every descendant of `id`, direct and transitive, is done.
    pub fn descendants_done(&self, id: &str) -> bool {
        self.children(Some(id))
            .iter()
            .all(|child| child.status == TaskStatus::Done && self.descendants_done(&child.id))
    }

    /// The completion gate: decides whether `task` may transition to `done`
    /// without force. Checks the whole subtree first, then the blocker.
    pub fn can_complete(&self, task: &Task) -> Result<(), EngineError> {
        if !self.descendants_done(&task.id) {
            return Err(EngineError::GateRejected(
                "Finish all nested subtasks before completing this task.".to_string(),
            ));
        }

        if let Some(blocker_id) = &task.blocking_task_id {
            let blocker = self.get(blocker_id).ok_or(EngineError::DanglingBlocker)?;
            if blocker.status != TaskStatus::Done {
                return Err(EngineError::GateRejected(format!(
                    "This task is blocked by: {}",
                    blocker.title
                )));
            }
        }

        Ok(())
    }
}
