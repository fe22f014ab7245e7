use thiserror::Error;

/// Errors that can occur within the task store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored column could not be decoded (bad JSON, unknown status).
    #[error("Corrupt row for task '{task}': {reason}")]
    CorruptRow { task: String, reason: String },

    /// No task with the given name exists in the store.
    #[error("Task not found: {name}")]
    TaskNotFound { name: String },
}

pub type Result<T> = std::result::Result<T, StoreError>;
