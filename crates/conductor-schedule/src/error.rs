use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The expression cannot be mapped to a native scheduler trigger.
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
