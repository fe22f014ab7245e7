use std::collections::HashMap;
use std::sync::Mutex;

use conductor_core::config::SchedulerConfig;
use conductor_schedule::ScheduleTrigger;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::types::ScheduledEntry;
use crate::{TASK_FOLDER, TASK_PREFIX};

/// Thin wrapper around `schtasks.exe`.
///
/// In simulation mode (CI and hosts without the native scheduler) every
/// operation is a successful no-op against an in-memory registry, so the
/// engine and its callers behave identically in tests.
pub struct SchtasksAdapter {
    simulate: bool,
    run_as_system: bool,
    /// Registry backing exists/list when simulating.
    sim_entries: Mutex<HashMap<String, ScheduledEntry>>,
}

impl SchtasksAdapter {
    pub fn new(config: &SchedulerConfig) -> Self {
        if config.simulate {
            info!("schtasks adapter in simulation mode — no host entries will be touched");
        }
        Self {
            simulate: config.simulate,
            run_as_system: config.run_as_system,
            sim_entries: Mutex::new(HashMap::new()),
        }
    }

    /// A simulation-mode adapter, independent of any config file.
    pub fn simulated() -> Self {
        Self::new(&SchedulerConfig {
            simulate: true,
            run_as_system: false,
        })
    }

    fn full_name(name: &str) -> String {
        format!("{TASK_FOLDER}\\{TASK_PREFIX}{name}")
    }

    /// The command line a registered entry fires: this binary's own
    /// execution entry point with the task name as the only argument.
    fn entry_point_invocation(name: &str) -> String {
        let exe = std::env::current_exe()
            .ok()
            .and_then(|p| p.to_str().map(str::to_string))
            .unwrap_or_else(|| "conductor".to_string());
        format!("\"{exe}\" execute {name}")
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Register (or overwrite — `/F`) a scheduled entry for `name`.
    ///
    /// `command` is the task's own command string; it is never registered
    /// with the host directly, only logged for operator context. The entry
    /// always fires the conductor entry point instead.
    pub async fn create(
        &self,
        name: &str,
        command: &str,
        trigger: &ScheduleTrigger,
        description: &str,
    ) -> bool {
        let invocation = Self::entry_point_invocation(name);
        debug!(task = %name, %command, %description, "registering host entry: {invocation}");

        if self.simulate {
            self.sim_entries.lock().unwrap().insert(
                name.to_string(),
                ScheduledEntry {
                    task_name: Self::full_name(name),
                    status: Some("Ready".to_string()),
                    next_run_time: None,
                },
            );
            return true;
        }

        let mut args: Vec<String> = vec![
            "/Create".into(),
            "/F".into(),
            "/TN".into(),
            Self::full_name(name),
            "/TR".into(),
            invocation,
        ];
        args.extend(trigger.schtasks_args());
        if self.run_as_system {
            args.extend(["/RL".into(), "HIGHEST".into(), "/RU".into(), "SYSTEM".into()]);
        }
        self.run(&args).await.0
    }

    /// Remove the entry. Idempotent: deleting a missing entry is a no-op
    /// success.
    pub async fn delete(&self, name: &str) -> bool {
        if self.simulate {
            self.sim_entries.lock().unwrap().remove(name);
            return true;
        }
        let args: Vec<String> = vec![
            "/Delete".into(),
            "/F".into(),
            "/TN".into(),
            Self::full_name(name),
        ];
        let (ok, _, stderr) = self.run_captured(&args).await;
        if ok {
            return true;
        }
        // "cannot find the file/task specified" — already gone
        if stderr.to_ascii_lowercase().contains("cannot find") {
            debug!(task = %name, "delete of missing entry treated as success");
            return true;
        }
        false
    }

    /// True when the host scheduler knows an entry for `name`.
    pub async fn exists(&self, name: &str) -> bool {
        if self.simulate {
            return self.sim_entries.lock().unwrap().contains_key(name);
        }
        let args: Vec<String> = vec!["/Query".into(), "/TN".into(), Self::full_name(name)];
        self.run_captured(&args).await.0
    }

    /// All entries in the conductor namespace; unrelated host jobs are
    /// filtered out.
    pub async fn list(&self) -> Vec<ScheduledEntry> {
        if self.simulate {
            let mut entries: Vec<ScheduledEntry> =
                self.sim_entries.lock().unwrap().values().cloned().collect();
            entries.sort_by(|a, b| a.task_name.cmp(&b.task_name));
            return entries;
        }
        let args: Vec<String> = vec![
            "/Query".into(),
            "/TN".into(),
            format!("{TASK_FOLDER}\\"),
            "/FO".into(),
            "JSON".into(),
        ];
        let (ok, stdout, _) = self.run_captured(&args).await;
        if !ok || stdout.is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<Vec<ScheduledEntry>>(&stdout) {
            Ok(entries) => entries
                .into_iter()
                .filter(|e| e.conductor_name().is_some())
                .collect(),
            Err(e) => {
                warn!("could not parse schtasks query JSON: {e}");
                Vec::new()
            }
        }
    }

    /// In-place modification. A command change refreshes the registered
    /// `/TR` invocation; a trigger change is not expressible in place, so
    /// it falls back to delete+recreate — host-side run-history metadata is
    /// lost, which is acceptable because the task store is the authoritative
    /// history.
    pub async fn change(
        &self,
        name: &str,
        trigger: Option<&ScheduleTrigger>,
        command: Option<&str>,
    ) -> bool {
        if let Some(trigger) = trigger {
            if !self.delete(name).await {
                return false;
            }
            return self
                .create(name, command.unwrap_or(""), trigger, "trigger change")
                .await;
        }
        if command.is_none() {
            return true; // nothing to do
        }
        if self.simulate {
            return self.sim_entries.lock().unwrap().contains_key(name);
        }
        let args: Vec<String> = vec![
            "/Change".into(),
            "/TN".into(),
            Self::full_name(name),
            "/TR".into(),
            Self::entry_point_invocation(name),
        ];
        self.run(&args).await.0
    }

    /// Enable a registered entry (no-op if already enabled).
    pub async fn enable(&self, name: &str) -> bool {
        self.toggle(name, "/ENABLE").await
    }

    /// Disable a registered entry without deleting it.
    pub async fn disable(&self, name: &str) -> bool {
        self.toggle(name, "/DISABLE").await
    }

    async fn toggle(&self, name: &str, flag: &str) -> bool {
        if self.simulate {
            let mut entries = self.sim_entries.lock().unwrap();
            if let Some(entry) = entries.get_mut(name) {
                entry.status = Some(if flag == "/ENABLE" { "Ready" } else { "Disabled" }.to_string());
                return true;
            }
            return false;
        }
        let args: Vec<String> = vec![
            "/Change".into(),
            "/TN".into(),
            Self::full_name(name),
            flag.into(),
        ];
        self.run(&args).await.0
    }

    // -----------------------------------------------------------------------
    // Native invocation
    // -----------------------------------------------------------------------

    async fn run(&self, args: &[String]) -> (bool, String) {
        let (ok, stdout, _) = self.run_captured(args).await;
        (ok, stdout)
    }

    async fn run_captured(&self, args: &[String]) -> (bool, String, String) {
        match Command::new("schtasks").args(args).output().await {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                if output.status.success() {
                    (true, stdout, stderr)
                } else {
                    error!(
                        code = output.status.code().unwrap_or(-1),
                        "schtasks failed: schtasks {} — {}",
                        args.join(" "),
                        stderr.trim()
                    );
                    (false, stdout, stderr)
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                error!("schtasks not found — host scheduler features unavailable");
                (false, String::new(), String::new())
            }
            Err(e) => {
                error!("unexpected error running schtasks {}: {e}", args.join(" "));
                (false, String::new(), String::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daily() -> ScheduleTrigger {
        ScheduleTrigger::Daily { hour: 6, minute: 0 }
    }

    #[tokio::test]
    async fn simulated_create_is_idempotent() {
        let adapter = SchtasksAdapter::simulated();
        assert!(adapter.create("a", "echo hi", &daily(), "").await);
        assert!(adapter.create("a", "echo hi", &daily(), "").await);
        assert_eq!(adapter.list().await.len(), 1);
        assert!(adapter.exists("a").await);
    }

    #[tokio::test]
    async fn simulated_delete_missing_is_success() {
        let adapter = SchtasksAdapter::simulated();
        assert!(adapter.delete("never_created").await);
    }

    #[tokio::test]
    async fn simulated_delete_removes_entry() {
        let adapter = SchtasksAdapter::simulated();
        adapter.create("a", "", &daily(), "").await;
        assert!(adapter.delete("a").await);
        assert!(!adapter.exists("a").await);
        assert!(adapter.list().await.is_empty());
    }

    #[tokio::test]
    async fn simulated_change_trigger_recreates() {
        let adapter = SchtasksAdapter::simulated();
        adapter.create("a", "", &daily(), "").await;
        let new_trigger = ScheduleTrigger::EveryMinutes { interval: 15 };
        assert!(adapter.change("a", Some(&new_trigger), None).await);
        assert_eq!(adapter.list().await.len(), 1);
    }

    #[tokio::test]
    async fn simulated_change_command_requires_entry() {
        let adapter = SchtasksAdapter::simulated();
        assert!(!adapter.change("ghost", None, Some("echo hi")).await);
        adapter.create("a", "", &daily(), "").await;
        assert!(adapter.change("a", None, Some("echo hi")).await);
    }

    #[tokio::test]
    async fn simulated_disable_then_enable() {
        let adapter = SchtasksAdapter::simulated();
        adapter.create("a", "", &daily(), "").await;
        assert!(adapter.disable("a").await);
        assert_eq!(
            adapter.list().await[0].status.as_deref(),
            Some("Disabled")
        );
        assert!(adapter.enable("a").await);
    }
}
