use uuid::Uuid;

/// Failures surfaced to callers of the registry and execution engine.
///
/// Persistence problems are deliberately absent: snapshot/restore failures
/// are downgraded to warning log entries and never abort the in-memory
/// operation that triggered them.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("agent not found: {0}")]
    NotFound(Uuid),

    #[error("agent {0} already has a run in flight")]
    AlreadyRunning(Uuid),

    #[error("action '{action}' failed")]
    ActionFailed {
        action: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("run canceled before completion")]
    Canceled,
}

pub type Result<T> = std::result::Result<T, EngineError>;
