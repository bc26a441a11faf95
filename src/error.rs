//! Error taxonomy for the task tree engine
//!
//! Engine-local rejections are detected synchronously, before any optimistic
//! mutation is applied, and never reach the persistence collaborator. Store
//! failures are a separate enum; the session composes the two.

/// A rejection produced by the engine while validating or applying a mutation.
///
/// Every variant carries a message suitable for direct display and maps to a
/// stable code string via [`EngineError::code`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Input failed validation (empty title, empty patch, bad status value).
    #[error("{0}")]
    Validation(String),

    /// Moving the task under the requested parent would create a cycle.
    #[error("Cannot move a task into one of its nested children.")]
    CyclicReparent,

    /// The requested blocker is the task itself or one of its descendants.
    #[error("A task cannot be blocked by one of its own subtasks.")]
    CyclicBlocker,

    /// The task's blocker reference points at a task that no longer exists.
    #[error("The assigned blocking task no longer exists.")]
    DanglingBlocker,

    /// A non-forced completion was refused by the completion gate.
    #[error("{0}")]
    GateRejected(String),

    /// An operation referenced a task id that is not in the tree.
    #[error("No task with id {0}")]
    UnknownTask(String),
}

impl EngineError {
    /// Stable machine-readable code for this rejection.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_error",
            EngineError::CyclicReparent => "cyclic_reparent",
            EngineError::CyclicBlocker => "cyclic_blocker",
            EngineError::DanglingBlocker => "dangling_blocker",
            EngineError::GateRejected(_) => "gate_rejected",
            EngineError::UnknownTask(_) => "unknown_task",
        }
    }
}

/// Failures at the persistence boundary.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: String, message: String },

    #[error("Missing data in response")]
    MissingData,
}

/// Errors surfaced by the optimistic session.
///
/// A `Store` error means an optimistic mutation was already applied locally
/// and has been rolled back to its pre-mutation snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("persistence failure: {0}")]
    Store(#[from] StoreError),
}

impl SessionError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Engine(e) => e.code(),
            SessionError::Store(_) => "persistence_failure",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_codes_are_stable() {
        assert_eq!(
            EngineError::Validation("x".to_string()).code(),
            "validation_error"
        );
        assert_eq!(EngineError::CyclicReparent.code(), "cyclic_reparent");
        assert_eq!(EngineError::CyclicBlocker.code(), "cyclic_blocker");
        assert_eq!(EngineError::DanglingBlocker.code(), "dangling_blocker");
        assert_eq!(
            EngineError::GateRejected("x".to_string()).code(),
            "gate_rejected"
        );
        assert_eq!(
            EngineError::UnknownTask("t1".to_string()).code(),
            "unknown_task"
        );
    }

    #[test]
    fn session_error_wraps_store_failures() {
        let err = SessionError::Store(StoreError::MissingData);
        assert_eq!(err.code(), "persistence_failure");
        assert!(err.to_string().contains("persistence failure"));
    }
}
