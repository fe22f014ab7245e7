//! `conductor-schtasks` — wrapper around the host scheduler's `schtasks.exe`
//! command surface.
//!
//! All conductor-owned entries live under the `\Conductor\` folder with a
//! `Cdt_` name prefix so they can always be told apart from unrelated jobs
//! on the host. A registered entry never carries the task's raw command:
//! it re-invokes this system's own binary (`<exe> execute <name>`) so that
//! dependency checks and retry policy apply no matter who fired the job.
//!
//! Expected failures (native tool missing, non-zero exit) are returned as
//! boolean results and logged with full command context — they are part of
//! the domain, not exceptional conditions.

pub mod adapter;
pub mod types;

pub use adapter::SchtasksAdapter;
pub use types::ScheduledEntry;

/// Folder in the host scheduler reserved for conductor entries.
pub const TASK_FOLDER: &str = r"\Conductor";
/// Name prefix applied to every conductor entry inside the folder.
pub const TASK_PREFIX: &str = "Cdt_";
