//! Taskforest library crate
//!
//! Taskforest is the task tree engine behind a hierarchical task-planning
//! tool: one forest of tasks per owner, with parent/child nesting, sibling
//! ordering, cross-tree blocking dependencies, and completion gating. Local
//! mutations apply optimistically against an in-memory tree and are
//! reconciled against an authoritative store through a change feed.
//!
//! The crate splits along the mutation path:
//!
//! - [`task`] — the record model and the wire-facing payload types
//! - [`tree`] — the derived index: adjacency, ordering, ancestry, gating
//! - [`engine`] — atomic mutations with snapshot/rollback
//! - [`sync`] — last-writer-wins reconciliation of external change events
//! - [`store`] — the persistence collaborator boundary and its HTTP client
//! - [`session`] — the optimistic per-owner session tying it all together

pub mod engine;
pub mod error;
pub mod session;
pub mod store;
pub mod sync;
pub mod task;
pub mod tree;

#[cfg(test)]
pub(crate) mod testutil;

// Re-export commonly used types
pub use engine::{CreateOutcome, DeleteOutcome, Engine, MutationOutcome, Snapshot};
pub use error::{EngineError, SessionError, StoreError};
pub use session::Session;
pub use store::{HttpStore, StoreConfig, TaskStore};
pub use sync::{merge, ChangeEvent, ChangeKind, MergeOutcome};
pub use task::{Task, TaskDraft, TaskPatch, TaskStatus};
pub use tree::TreeIndex;
