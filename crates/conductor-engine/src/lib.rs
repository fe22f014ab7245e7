//! `conductor-engine` — dependency resolution, command execution, and the
//! orchestration facade.
//!
//! The host scheduler is the timer: each registered entry re-invokes this
//! system's execution entry point, which runs exactly one task end-to-end —
//! dependency check, command with timeout, exponential-backoff retries —
//! and appends every attempt's outcome to the task store. There is no
//! in-process scheduling loop on that path; [`poller::Poller`] exists only
//! as a portable fallback for hosts without the native scheduler.
//!
//! Expected domain outcomes (failed dependency, non-zero exit, timeout) are
//! data on [`conductor_store::TaskResult`]; only configuration errors
//! (unknown task, empty command, malformed schedule) surface as
//! [`EngineError`].

pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod poller;
pub mod resolver;

pub use engine::ExecutionEngine;
pub use error::{EngineError, Result};
pub use orchestrator::Orchestrator;
pub use poller::Poller;
