use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Task type tag marking a definition as a pure precondition check:
/// no schedule, run on demand when another task lists it as a dependency.
pub const CONDITION_TYPE: &str = "condition";

// ---------------------------------------------------------------------------
// TaskStatus
// ---------------------------------------------------------------------------

/// Outcome of a single execution attempt.
///
/// `Running` is a transient in-memory marker only — a completed attempt is
/// always persisted as one of the three terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Running,
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Running => "RUNNING",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Skipped => "SKIPPED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(TaskStatus::Running),
            "SUCCESS" => Ok(TaskStatus::Success),
            "FAILED" => Ok(TaskStatus::Failed),
            "SKIPPED" => Ok(TaskStatus::Skipped),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// DependencySpec
// ---------------------------------------------------------------------------

/// A precondition that must hold before a task's command may run.
///
/// Stored on disk as a `kind:value` tag inside a JSON array and parsed once
/// at load time. An unrecognised kind is kept as [`DependencySpec::Unknown`]
/// so the resolver can log it loudly instead of silently dropping a typo'd
/// gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DependencySpec {
    /// Another task's most recent result must be SUCCESS (condition-type
    /// tasks are executed on demand instead).
    Task(String),
    /// The given filesystem path must exist.
    File(String),
    /// An HTTP request to the URL must return a non-error status.
    Url(String),
    /// The given shell command must exit 0.
    Cmd(String),
    /// Unparseable tag, preserved verbatim. Never gates; always warned about.
    Unknown(String),
}

impl DependencySpec {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.split_once(':') {
            Some(("task", v)) => DependencySpec::Task(v.to_string()),
            Some(("file", v)) => DependencySpec::File(v.to_string()),
            Some(("url", v)) => DependencySpec::Url(v.to_string()),
            Some(("cmd", v)) => DependencySpec::Cmd(v.to_string()),
            _ => DependencySpec::Unknown(raw.to_string()),
        }
    }
}

impl From<String> for DependencySpec {
    fn from(s: String) -> Self {
        DependencySpec::parse(&s)
    }
}

impl From<DependencySpec> for String {
    fn from(spec: DependencySpec) -> Self {
        spec.to_string()
    }
}

impl std::fmt::Display for DependencySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencySpec::Task(v) => write!(f, "task:{v}"),
            DependencySpec::File(v) => write!(f, "file:{v}"),
            DependencySpec::Url(v) => write!(f, "url:{v}"),
            DependencySpec::Cmd(v) => write!(f, "cmd:{v}"),
            DependencySpec::Unknown(raw) => write!(f, "{raw}"),
        }
    }
}

// ---------------------------------------------------------------------------
// TaskDefinition
// ---------------------------------------------------------------------------

/// The persisted, named specification of a command, its schedule, and its
/// execution policy. `name` is the immutable primary key; saving a
/// definition with an existing name updates the other fields in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub name: String,
    /// Free-form category tag ("backup", "report", "condition", …).
    pub task_type: String,
    /// Shell-interpreted command string.
    pub command: String,
    /// Portable schedule expression; `None` means manual-only.
    pub schedule: Option<String>,
    pub timeout_secs: u64,
    /// Number of retries after the first failed attempt.
    pub retry_count: u32,
    /// Base delay between attempts; doubles after each failure.
    pub retry_delay_secs: u64,
    pub dependencies: Vec<DependencySpec>,
    pub enabled: bool,
    /// RFC3339, set by the store on first insert.
    pub created_at: String,
    /// RFC3339, bumped by the store on every upsert.
    pub updated_at: String,
}

impl TaskDefinition {
    /// A manual-only definition with default timeout/retry policy.
    pub fn new(name: &str, task_type: &str, command: &str) -> Self {
        Self {
            name: name.to_string(),
            task_type: task_type.to_string(),
            command: command.to_string(),
            schedule: None,
            timeout_secs: 3_600,
            retry_count: 0,
            retry_delay_secs: 300,
            dependencies: Vec::new(),
            enabled: true,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    /// True for condition-type tasks, which are only ever run as another
    /// task's dependency check.
    pub fn is_condition(&self) -> bool {
        self.task_type == CONDITION_TYPE
    }
}

// ---------------------------------------------------------------------------
// TaskResult
// ---------------------------------------------------------------------------

/// The immutable record of one execution attempt's outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_name: String,
    pub status: TaskStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub output: String,
    pub error: String,
    /// Which attempt produced this result, 0-based.
    pub retry_count: u32,
}

impl TaskResult {
    /// A fresh in-flight marker for `task_name` starting now.
    pub fn started(task_name: &str) -> Self {
        Self {
            task_name: task_name.to_string(),
            status: TaskStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            exit_code: None,
            output: String::new(),
            error: String::new(),
            retry_count: 0,
        }
    }

    /// A terminal SKIPPED result carrying the diagnostic `reason`.
    pub fn skipped(task_name: &str, reason: &str) -> Self {
        let now = Utc::now();
        Self {
            task_name: task_name.to_string(),
            status: TaskStatus::Skipped,
            start_time: now,
            end_time: Some(now),
            exit_code: None,
            output: String::new(),
            error: reason.to_string(),
            retry_count: 0,
        }
    }

    /// Wall-clock duration when both timestamps are set.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- DependencySpec parsing ---

    #[test]
    fn parse_task_dep() {
        assert_eq!(
            DependencySpec::parse("task:nightly_backup"),
            DependencySpec::Task("nightly_backup".into())
        );
    }

    #[test]
    fn parse_file_dep_keeps_full_path() {
        assert_eq!(
            DependencySpec::parse("file:/var/lock/ready"),
            DependencySpec::File("/var/lock/ready".into())
        );
    }

    #[test]
    fn parse_url_dep_keeps_scheme_colon() {
        // split_once stops at the first colon, so the URL survives intact
        assert_eq!(
            DependencySpec::parse("url:https://example.com/health"),
            DependencySpec::Url("https://example.com/health".into())
        );
    }

    #[test]
    fn parse_unknown_kind_is_preserved() {
        let spec = DependencySpec::parse("tsak:typo");
        assert_eq!(spec, DependencySpec::Unknown("tsak:typo".into()));
        assert_eq!(spec.to_string(), "tsak:typo");
    }

    #[test]
    fn dep_roundtrips_through_display() {
        for raw in ["task:a", "file:/p", "cmd:echo hi", "url:http://x"] {
            assert_eq!(DependencySpec::parse(raw).to_string(), raw);
        }
    }

    // --- TaskStatus ---

    #[test]
    fn status_roundtrips_through_str() {
        for s in [
            TaskStatus::Running,
            TaskStatus::Success,
            TaskStatus::Failed,
            TaskStatus::Skipped,
        ] {
            let parsed: TaskStatus = s.to_string().parse().expect("parse failed");
            assert_eq!(parsed, s);
        }
    }

    #[test]
    fn duration_requires_end_time() {
        let mut r = TaskResult::started("t");
        assert!(r.duration().is_none());
        r.end_time = Some(r.start_time + chrono::Duration::seconds(5));
        assert_eq!(r.duration().unwrap().num_seconds(), 5);
    }
}
