use std::sync::Arc;

use conductor_schedule::translate;
use conductor_schtasks::{ScheduledEntry, SchtasksAdapter};
use conductor_store::{TaskDefinition, TaskResult, TaskStore};
use tracing::{info, warn};

use crate::engine::ExecutionEngine;
use crate::error::{EngineError, Result};

/// Facade composing the store, translator, adapter and execution engine
/// behind the operations the CLI and HTTP collaborators call.
///
/// Every operation persists to the task store *before* touching the host
/// scheduler, so a stored definition never references a registration that
/// was never attempted.
pub struct Orchestrator {
    store: Arc<TaskStore>,
    adapter: Arc<SchtasksAdapter>,
    engine: ExecutionEngine,
}

impl Orchestrator {
    pub fn new(store: Arc<TaskStore>, adapter: Arc<SchtasksAdapter>) -> Self {
        let engine = ExecutionEngine::new(Arc::clone(&store));
        Self {
            store,
            adapter,
            engine,
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// A missing definition is a configuration error here, same as on the
    /// execution path.
    fn require(&self, name: &str) -> Result<TaskDefinition> {
        self.store
            .get_task(name)?
            .ok_or_else(|| EngineError::TaskNotFound {
                name: name.to_string(),
            })
    }

    /// Register `name` with the host scheduler. Returns `Ok(false)` with a
    /// warning when the task has no schedule or is disabled (a disabled task
    /// must never be active on the host).
    pub async fn schedule(&self, name: &str) -> Result<bool> {
        let def = self.require(name)?;
        let Some(expr) = def.schedule.as_deref() else {
            warn!(task = %name, "task has no schedule — nothing to register");
            return Ok(false);
        };
        if !def.enabled {
            warn!(task = %name, "task is disabled — not registering");
            return Ok(false);
        }

        let trigger = translate(expr)?;
        let description = format!("Conductor task {name}");
        if !self
            .adapter
            .create(name, &def.command, &trigger, &description)
            .await
        {
            return Err(EngineError::SchedulerFailed {
                name: name.to_string(),
            });
        }
        info!(task = %name, schedule = %expr, "task registered with host scheduler");
        Ok(true)
    }

    /// Register every enabled definition that carries a schedule.
    /// Returns one `(name, succeeded)` pair per eligible task.
    pub async fn schedule_all(&self) -> Result<Vec<(String, bool)>> {
        let mut outcomes = Vec::new();
        for def in self.store.list_tasks(true)? {
            if def.schedule.is_none() {
                continue;
            }
            let ok = matches!(self.schedule(&def.name).await, Ok(true));
            outcomes.push((def.name, ok));
        }
        Ok(outcomes)
    }

    /// Remove the host entry. A task that was never registered is a
    /// successful no-op.
    pub async fn unschedule(&self, name: &str) -> Result<()> {
        if self.adapter.delete(name).await {
            Ok(())
        } else {
            Err(EngineError::SchedulerFailed {
                name: name.to_string(),
            })
        }
    }

    /// Update a definition's schedule and/or command, then reconcile the
    /// host entry: schedule changes delete+recreate (host run-history is
    /// expendable — the task store is authoritative), command-only changes
    /// are applied in place.
    pub async fn update(
        &self,
        name: &str,
        new_schedule: Option<&str>,
        new_command: Option<&str>,
    ) -> Result<()> {
        let mut def = self.require(name)?;

        // Validate before persisting so a bad expression changes nothing.
        let new_trigger = match new_schedule {
            Some(expr) if !expr.trim().is_empty() => Some(translate(expr)?),
            _ => None,
        };

        if let Some(expr) = new_schedule {
            def.schedule = if expr.trim().is_empty() {
                None
            } else {
                Some(expr.to_string())
            };
        }
        if let Some(cmd) = new_command {
            def.command = cmd.to_string();
        }
        self.store.add_task(&def)?;

        let ok = if !def.enabled {
            // a disabled task must never be active on the host, whatever
            // changed — drop any entry instead of re-registering it
            self.adapter.delete(name).await
        } else {
            match (new_schedule, new_trigger) {
                // schedule cleared → drop the host entry
                (Some(_), None) => self.adapter.delete(name).await,
                // schedule changed → delete+recreate via the adapter fallback
                (Some(_), Some(trigger)) => {
                    self.adapter
                        .change(name, Some(&trigger), Some(def.command.as_str()))
                        .await
                }
                // command-only change → in place, when the host has an entry
                // to refresh (manual-only and never-registered tasks do not)
                (None, _) if new_command.is_some() => {
                    if def.schedule.is_some() && self.adapter.exists(name).await {
                        self.adapter.change(name, None, new_command).await
                    } else {
                        true
                    }
                }
                _ => true,
            }
        };
        if !ok {
            return Err(EngineError::SchedulerFailed {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Run a task right now, with full dependency/retry semantics.
    pub async fn execute(&self, name: &str) -> Result<TaskResult> {
        self.engine.execute_task(name).await
    }

    /// Entries currently registered in the conductor namespace on the host.
    pub async fn list_scheduled(&self) -> Vec<ScheduledEntry> {
        self.adapter.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_store::TaskDefinition;
    use rusqlite::Connection;

    fn orchestrator() -> Orchestrator {
        let store = TaskStore::new(Connection::open_in_memory().expect("open")).expect("init");
        Orchestrator::new(Arc::new(store), Arc::new(SchtasksAdapter::simulated()))
    }

    fn scheduled_task(name: &str, expr: &str) -> TaskDefinition {
        let mut def = TaskDefinition::new(name, "report", "exit 0");
        def.schedule = Some(expr.to_string());
        def
    }

    #[tokio::test]
    async fn schedule_twice_yields_one_entry() {
        let orc = orchestrator();
        orc.store().add_task(&scheduled_task("a", "0 6 * * *")).unwrap();

        assert!(orc.schedule("a").await.unwrap());
        assert!(orc.schedule("a").await.unwrap());
        assert_eq!(orc.list_scheduled().await.len(), 1);
    }

    #[tokio::test]
    async fn schedule_without_expression_is_a_warned_noop() {
        let orc = orchestrator();
        orc.store()
            .add_task(&TaskDefinition::new("manual", "adhoc", "exit 0"))
            .unwrap();

        assert!(!orc.schedule("manual").await.unwrap());
        assert!(orc.list_scheduled().await.is_empty());
    }

    #[tokio::test]
    async fn disabled_task_is_never_registered() {
        let orc = orchestrator();
        let mut def = scheduled_task("off", "0 6 * * *");
        def.enabled = false;
        orc.store().add_task(&def).unwrap();

        assert!(!orc.schedule("off").await.unwrap());
        assert!(orc.list_scheduled().await.is_empty());
    }

    #[tokio::test]
    async fn schedule_unknown_task_errors() {
        let orc = orchestrator();
        assert!(matches!(
            orc.schedule("ghost").await,
            Err(EngineError::TaskNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn unschedule_unregistered_task_is_ok() {
        let orc = orchestrator();
        assert!(orc.unschedule("never_scheduled").await.is_ok());
    }

    #[tokio::test]
    async fn schedule_all_skips_manual_tasks() {
        let orc = orchestrator();
        orc.store().add_task(&scheduled_task("a", "0 6 * * *")).unwrap();
        orc.store().add_task(&scheduled_task("b", "*/15 * * * *")).unwrap();
        orc.store()
            .add_task(&TaskDefinition::new("manual", "adhoc", "exit 0"))
            .unwrap();

        let outcomes = orc.schedule_all().await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|(_, ok)| *ok));
        assert_eq!(orc.list_scheduled().await.len(), 2);
    }

    #[tokio::test]
    async fn update_rejects_bad_schedule_without_persisting() {
        let orc = orchestrator();
        orc.store().add_task(&scheduled_task("a", "0 6 * * *")).unwrap();

        assert!(orc.update("a", Some("0 0 32 * *"), None).await.is_err());
        let def = orc.store().get_task("a").unwrap().unwrap();
        assert_eq!(def.schedule.as_deref(), Some("0 6 * * *"));
    }

    #[tokio::test]
    async fn update_schedule_recreates_entry() {
        let orc = orchestrator();
        orc.store().add_task(&scheduled_task("a", "0 6 * * *")).unwrap();
        orc.schedule("a").await.unwrap();

        orc.update("a", Some("*/30 * * * *"), None).await.unwrap();
        assert_eq!(orc.list_scheduled().await.len(), 1);
        let def = orc.store().get_task("a").unwrap().unwrap();
        assert_eq!(def.schedule.as_deref(), Some("*/30 * * * *"));
    }

    #[tokio::test]
    async fn update_clearing_schedule_unregisters() {
        let orc = orchestrator();
        orc.store().add_task(&scheduled_task("a", "0 6 * * *")).unwrap();
        orc.schedule("a").await.unwrap();

        orc.update("a", Some(""), None).await.unwrap();
        assert!(orc.list_scheduled().await.is_empty());
        assert!(orc.store().get_task("a").unwrap().unwrap().schedule.is_none());
    }

    #[tokio::test]
    async fn update_on_disabled_task_removes_host_entry() {
        let orc = orchestrator();
        orc.store().add_task(&scheduled_task("night", "0 6 * * *")).unwrap();
        orc.schedule("night").await.unwrap();

        let mut def = orc.store().get_task("night").unwrap().unwrap();
        def.enabled = false;
        orc.store().add_task(&def).unwrap();

        orc.update("night", Some("0 7 * * *"), None).await.unwrap();
        assert!(orc.list_scheduled().await.is_empty());
        let def = orc.store().get_task("night").unwrap().unwrap();
        assert_eq!(def.schedule.as_deref(), Some("0 7 * * *"));
    }

    #[tokio::test]
    async fn update_on_disabled_unregistered_task_stays_unregistered() {
        let orc = orchestrator();
        let mut def = scheduled_task("night", "0 6 * * *");
        def.enabled = false;
        orc.store().add_task(&def).unwrap();

        orc.update("night", Some("0 7 * * *"), None).await.unwrap();
        assert!(orc.list_scheduled().await.is_empty());
    }

    #[tokio::test]
    async fn update_command_of_manual_task_skips_the_adapter() {
        let orc = orchestrator();
        orc.store()
            .add_task(&TaskDefinition::new("manual", "adhoc", "exit 0"))
            .unwrap();

        orc.update("manual", None, Some("exit 2")).await.unwrap();
        assert_eq!(
            orc.store().get_task("manual").unwrap().unwrap().command,
            "exit 2"
        );
        assert!(orc.list_scheduled().await.is_empty());
    }

    #[tokio::test]
    async fn update_unknown_task_errors() {
        let orc = orchestrator();
        assert!(matches!(
            orc.update("ghost", None, Some("exit 0")).await,
            Err(EngineError::TaskNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn update_command_only_changes_in_place() {
        let orc = orchestrator();
        orc.store().add_task(&scheduled_task("a", "0 6 * * *")).unwrap();
        orc.schedule("a").await.unwrap();

        orc.update("a", None, Some("exit 1")).await.unwrap();
        assert_eq!(orc.list_scheduled().await.len(), 1);
        assert_eq!(orc.store().get_task("a").unwrap().unwrap().command, "exit 1");
    }

    #[tokio::test]
    async fn execute_delegates_to_engine() {
        let orc = orchestrator();
        let mut def = TaskDefinition::new("a", "test", "exit 0");
        def.retry_delay_secs = 0;
        orc.store().add_task(&def).unwrap();

        let result = orc.execute("a").await.unwrap();
        assert_eq!(result.exit_code, Some(0));
    }
}
