//! Dependency resolution: decides whether a task's preconditions hold.
//!
//! Every spec in the list must pass; the failing reasons are joined into one
//! human-readable message. Resolution never raises — an unreachable URL or a
//! missing probe binary is a failed gate, not a crash.

use conductor_core::config::DEPENDENCY_PROBE_TIMEOUT_SECS;
use conductor_store::{DependencySpec, TaskDefinition, TaskStatus};
use tracing::warn;

use crate::engine::ExecutionEngine;

/// Budget for `cmd:` probes — more generous than the URL probe because
/// check scripts legitimately do real work.
const CMD_PROBE_TIMEOUT_SECS: u64 = 60;

/// Evaluate all of `def`'s dependency specs. Returns `(ok, reason)`.
pub async fn resolve(engine: &ExecutionEngine, def: &TaskDefinition) -> (bool, String) {
    if def.dependencies.is_empty() {
        return (true, "no dependencies".to_string());
    }

    let mut failures: Vec<String> = Vec::new();
    for spec in &def.dependencies {
        if let Err(reason) = check_one(engine, spec).await {
            failures.push(reason);
        }
    }

    if failures.is_empty() {
        (true, "all dependencies satisfied".to_string())
    } else {
        (false, failures.join(", "))
    }
}

async fn check_one(engine: &ExecutionEngine, spec: &DependencySpec) -> Result<(), String> {
    match spec {
        DependencySpec::Task(name) => check_task(engine, name).await,

        DependencySpec::File(path) => {
            if std::path::Path::new(path).exists() {
                Ok(())
            } else {
                Err(format!("file '{path}' missing"))
            }
        }

        DependencySpec::Url(url) => {
            let probe = engine
                .http()
                .head(url)
                .timeout(std::time::Duration::from_secs(DEPENDENCY_PROBE_TIMEOUT_SECS))
                .send()
                .await;
            match probe {
                Ok(resp) if resp.status().as_u16() < 400 => Ok(()),
                Ok(resp) => Err(format!("url '{url}' returned {}", resp.status().as_u16())),
                Err(e) => Err(format!("url '{url}' unreachable: {e}")),
            }
        }

        DependencySpec::Cmd(command) => check_cmd(command).await,

        DependencySpec::Unknown(raw) => {
            // Almost certainly a typo'd kind. Deliberately non-blocking to
            // match long-standing behaviour, but never silent.
            warn!("unknown dependency kind '{raw}' — treated as satisfied");
            Ok(())
        }
    }
}

/// `task:` gate. Condition-type tasks are executed on demand and must
/// succeed; ordinary tasks must have a most recent recorded result of
/// SUCCESS — never having run is unsatisfied.
async fn check_task(engine: &ExecutionEngine, name: &str) -> Result<(), String> {
    let dep = match engine.store().get_task(name) {
        Ok(Some(dep)) => dep,
        Ok(None) => return Err(format!("dependency task '{name}' not found")),
        Err(e) => return Err(format!("dependency task '{name}' unreadable: {e}")),
    };

    if dep.is_condition() {
        // Recursive call into the execution path; `execute_task` returns a
        // boxed future and the engine's running-set breaks cycles.
        return match engine.execute_task(name).await {
            Ok(result) if result.status == TaskStatus::Success => Ok(()),
            Ok(result) => Err(format!(
                "condition task '{name}' did not succeed ({})",
                result.status
            )),
            Err(e) => Err(format!("condition task '{name}' failed to run: {e}")),
        };
    }

    match engine.store().latest_status(name) {
        Ok(Some(TaskStatus::Success)) => Ok(()),
        Ok(Some(status)) => Err(format!("dependency task '{name}' last run was {status}")),
        Ok(None) => Err(format!("dependency task '{name}' has never run")),
        Err(e) => Err(format!("dependency task '{name}' history unreadable: {e}")),
    }
}

async fn check_cmd(command: &str) -> Result<(), String> {
    let run = async {
        crate::engine::shell_command(command)
            .output()
            .await
            .map_err(|e| format!("command '{command}' could not be launched: {e}"))
    };
    let timeout = std::time::Duration::from_secs(CMD_PROBE_TIMEOUT_SECS);
    match tokio::time::timeout(timeout, run).await {
        Ok(Ok(output)) if output.status.success() => Ok(()),
        Ok(Ok(output)) => Err(format!(
            "command '{command}' failed with exit {}",
            output.status.code().unwrap_or(-1)
        )),
        Ok(Err(reason)) => Err(reason),
        Err(_) => Err(format!(
            "command '{command}' timed out after {CMD_PROBE_TIMEOUT_SECS}s"
        )),
    }
}
