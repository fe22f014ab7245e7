use thiserror::Error;

/// Configuration and infrastructure errors surfaced by the engine.
///
/// Runtime failures of the task itself (non-zero exit, timeout, unmet
/// dependency) are never errors — they are terminal statuses on the
/// persisted result.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No definition exists for the requested task name.
    #[error("Task not found: {name}")]
    TaskNotFound { name: String },

    /// The definition exists but has no command configured.
    #[error("Task '{name}' has no command configured")]
    NoCommand { name: String },

    /// The definition's schedule expression cannot drive the host scheduler.
    #[error(transparent)]
    Schedule(#[from] conductor_schedule::ScheduleError),

    /// The host scheduler rejected an operation (details already logged by
    /// the adapter).
    #[error("Host scheduler operation failed for task '{name}'")]
    SchedulerFailed { name: String },

    #[error(transparent)]
    Store(#[from] conductor_store::StoreError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
