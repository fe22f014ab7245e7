use serde::{Deserialize, Serialize};

/// One entry as reported by `schtasks /Query /FO JSON`.
///
/// Only the columns the orchestrator cares about are kept; unknown keys in
/// the native JSON are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledEntry {
    #[serde(rename = "TaskName")]
    pub task_name: String,
    #[serde(rename = "Status", default)]
    pub status: Option<String>,
    #[serde(rename = "Next Run Time", default)]
    pub next_run_time: Option<String>,
}

impl ScheduledEntry {
    /// The conductor task name with folder and prefix stripped, when this
    /// entry belongs to the conductor namespace.
    pub fn conductor_name(&self) -> Option<&str> {
        self.task_name
            .trim_start_matches('\\')
            .strip_prefix(crate::TASK_FOLDER.trim_start_matches('\\'))
            .map(|rest| rest.trim_start_matches('\\'))
            .and_then(|rest| rest.strip_prefix(crate::TASK_PREFIX))
    }
}
