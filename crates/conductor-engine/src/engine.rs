use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use conductor_store::{TaskDefinition, TaskResult, TaskStatus, TaskStore};
use dashmap::DashMap;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::error::{EngineError, Result};
use crate::resolver;

/// Runs one task end-to-end: dependency gate, command with timeout,
/// exponential-backoff retries, result persistence.
pub struct ExecutionEngine {
    store: Arc<TaskStore>,
    /// Names currently executing in this process. A duplicate invocation is
    /// rejected as SKIPPED, never queued.
    running: DashMap<String, ()>,
    http: reqwest::Client,
}

impl ExecutionEngine {
    pub fn new(store: Arc<TaskStore>) -> Self {
        Self {
            store,
            running: DashMap::new(),
            http: reqwest::Client::new(),
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// True when `name` is executing in this process right now.
    pub fn is_running(&self, name: &str) -> bool {
        self.running.contains_key(name)
    }

    /// Execute `name` respecting its dependency list, timeout and retry
    /// policy. Every attempt's outcome is appended to history; the returned
    /// result is the final attempt's.
    ///
    /// Returns a boxed future: condition-type dependencies recurse back into
    /// this method, and the box gives the recursion a nameable `Send` type.
    ///
    /// # Errors
    ///
    /// Only configuration errors are raised: [`EngineError::TaskNotFound`]
    /// and [`EngineError::NoCommand`]. Runtime failures come back as a
    /// result with status `Failed` or `Skipped`.
    pub fn execute_task<'a>(
        &'a self,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<TaskResult>> + Send + 'a>> {
        Box::pin(self.execute_task_inner(name))
    }

    async fn execute_task_inner(&self, name: &str) -> Result<TaskResult> {
        let def = self
            .store
            .get_task(name)?
            .ok_or_else(|| EngineError::TaskNotFound {
                name: name.to_string(),
            })?;
        if def.command.trim().is_empty() {
            return Err(EngineError::NoCommand {
                name: name.to_string(),
            });
        }

        // Duplicate-invocation guard. The marker is removed on every exit
        // path by the drop guard below.
        {
            use dashmap::mapref::entry::Entry;
            match self.running.entry(name.to_string()) {
                Entry::Occupied(_) => {
                    warn!(task = %name, "task is already running — rejecting duplicate invocation");
                    return Ok(TaskResult::skipped(name, "Task already running"));
                }
                Entry::Vacant(slot) => {
                    slot.insert(());
                }
            }
        }
        let _guard = RunningGuard {
            running: &self.running,
            name,
        };

        info!(task = %name, "starting task");

        let (deps_ok, deps_msg) = resolver::resolve(self, &def).await;
        if !deps_ok {
            let result =
                TaskResult::skipped(name, &format!("Dependency check failed: {deps_msg}"));
            warn!(task = %name, "task skipped: {deps_msg}");
            self.persist(&result);
            return Ok(result);
        }

        let mut delay = def.retry_delay_secs;
        let mut attempt: u32 = 0;
        loop {
            let result = self.run_once(&def, attempt).await;
            self.persist(&result);
            if result.status == TaskStatus::Success || attempt >= def.retry_count {
                return Ok(result);
            }
            warn!(
                task = %name,
                attempt = attempt + 1,
                retries = def.retry_count,
                "task failed — retrying in {delay}s"
            );
            tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
            delay *= 2;
            attempt += 1;
        }
    }

    /// One attempt: run the command through the shell, capture output,
    /// enforce the timeout. Never raises — a launch failure or timeout is a
    /// `Failed` result like any non-zero exit.
    async fn run_once(&self, def: &TaskDefinition, attempt: u32) -> TaskResult {
        let mut result = TaskResult::started(&def.name);
        result.retry_count = attempt;

        let child = match shell_command(&def.command)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                error!(task = %def.name, "failed to launch command: {e}");
                result.status = TaskStatus::Failed;
                result.error = format!("Failed to launch command: {e}");
                result.end_time = Some(Utc::now());
                return result;
            }
        };

        // `wait_with_output` takes the child by value, so it runs on a
        // spawned task; the PID is kept for the kill on the timeout path.
        let pid = child.id();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(child.wait_with_output().await);
        });

        let timeout = std::time::Duration::from_secs(def.timeout_secs);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(output))) => {
                result.exit_code = output.status.code();
                result.output = String::from_utf8_lossy(&output.stdout).into_owned();
                result.error = String::from_utf8_lossy(&output.stderr).into_owned();
                if output.status.success() {
                    result.status = TaskStatus::Success;
                    info!(task = %def.name, "task completed successfully");
                } else {
                    result.status = TaskStatus::Failed;
                    error!(task = %def.name, exit_code = ?result.exit_code, "task failed");
                }
            }
            Ok(Ok(Err(e))) => {
                result.status = TaskStatus::Failed;
                result.error = format!("Failed to collect command output: {e}");
            }
            Ok(Err(_recv)) => {
                result.status = TaskStatus::Failed;
                result.error = "Command wait task panicked unexpectedly".to_string();
            }
            Err(_elapsed) => {
                kill_child(pid);
                error!(task = %def.name, "task timed out after {}s", def.timeout_secs);
                result.status = TaskStatus::Failed;
                result.error = format!("Timeout after {}s", def.timeout_secs);
            }
        }
        result.end_time = Some(Utc::now());
        result
    }

    /// Persistence failures must never mask the execution outcome — log and
    /// move on; history will show a gap.
    fn persist(&self, result: &TaskResult) {
        if let Err(e) = self.store.save_result(result) {
            error!(task = %result.task_name, "failed to persist task result: {e}");
        }
    }
}

struct RunningGuard<'a> {
    running: &'a DashMap<String, ()>,
    name: &'a str,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.running.remove(self.name);
    }
}

#[cfg(unix)]
pub(crate) fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
pub(crate) fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

fn kill_child(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    #[cfg(unix)]
    // Safety: pid is our direct child, still running.
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
    #[cfg(not(unix))]
    {
        let _ = std::process::Command::new("taskkill")
            .args(["/F", "/PID", &pid.to_string()])
            .output();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_store::DependencySpec;
    use rusqlite::Connection;

    fn engine() -> ExecutionEngine {
        let store = TaskStore::new(Connection::open_in_memory().expect("open")).expect("init");
        ExecutionEngine::new(Arc::new(store))
    }

    fn quick(name: &str, command: &str) -> TaskDefinition {
        let mut def = TaskDefinition::new(name, "test", command);
        def.timeout_secs = 30;
        def.retry_delay_secs = 0;
        def
    }

    #[tokio::test]
    async fn exit_zero_is_success() {
        let engine = engine();
        engine.store().add_task(&quick("a", "exit 0")).unwrap();

        let result = engine.execute_task("a").await.unwrap();
        assert_eq!(result.status, TaskStatus::Success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.retry_count, 0);
        assert_eq!(engine.store().history("a", 10).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn output_is_captured() {
        let engine = engine();
        engine
            .store()
            .add_task(&quick("a", "echo hello; echo oops >&2"))
            .unwrap();

        let result = engine.execute_task("a").await.unwrap();
        assert_eq!(result.status, TaskStatus::Success);
        assert!(result.output.contains("hello"));
        assert!(result.error.contains("oops"));
    }

    #[tokio::test]
    async fn one_retry_records_two_attempts() {
        let engine = engine();
        let mut def = quick("b", "exit 1");
        def.retry_count = 1;
        engine.store().add_task(&def).unwrap();

        let result = engine.execute_task("b").await.unwrap();
        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.retry_count, 1);

        let hist = engine.store().history("b", 10).unwrap();
        assert_eq!(hist.len(), 2);
        // newest first
        assert_eq!(hist[0].retry_count, 1);
        assert_eq!(hist[1].retry_count, 0);
    }

    #[tokio::test]
    async fn execute_future_can_cross_threads() {
        // the condition-dependency recursion must not cost the future its
        // Send bound — tokio::spawn is the compile-time witness
        let engine = Arc::new(engine());
        engine.store().add_task(&quick("bg", "exit 0")).unwrap();

        let handle = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.execute_task("bg").await })
        };
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.status, TaskStatus::Success);
    }

    #[tokio::test]
    async fn retry_delay_doubles_between_attempts() {
        let engine = engine();
        let mut def = quick("flaky", "exit 1");
        def.retry_count = 2;
        def.retry_delay_secs = 1;
        engine.store().add_task(&def).unwrap();

        let result = engine.execute_task("flaky").await.unwrap();
        assert_eq!(result.status, TaskStatus::Failed);

        // newest first: hist[2] is attempt 0, hist[0] is attempt 2
        let hist = engine.store().history("flaky", 10).unwrap();
        assert_eq!(hist.len(), 3);
        let first_gap = (hist[1].start_time - hist[2].start_time).num_milliseconds();
        let second_gap = (hist[0].start_time - hist[1].start_time).num_milliseconds();
        assert!(first_gap >= 1_000, "first gap was {first_gap}ms");
        assert!(second_gap >= 2_000, "second gap was {second_gap}ms");
        assert!(second_gap > first_gap);
    }

    #[tokio::test]
    async fn retry_budget_of_two_means_three_attempts() {
        let engine = engine();
        let mut def = quick("c", "exit 7");
        def.retry_count = 2;
        engine.store().add_task(&def).unwrap();

        let result = engine.execute_task("c").await.unwrap();
        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.exit_code, Some(7));

        let attempts: Vec<u32> = engine
            .store()
            .history("c", 10)
            .unwrap()
            .iter()
            .rev()
            .map(|r| r.retry_count)
            .collect();
        assert_eq!(attempts, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn failing_dependency_skips_without_running_command() {
        let engine = engine();
        let mut def = quick("gated", "echo should_not_run > /tmp/conductor_gate_test");
        def.retry_count = 3;
        def.dependencies = vec![DependencySpec::File("/does/not/exist".into())];
        engine.store().add_task(&def).unwrap();

        let result = engine.execute_task("gated").await.unwrap();
        assert_eq!(result.status, TaskStatus::Skipped);
        assert!(result.error.contains("/does/not/exist"));
        assert_eq!(result.exit_code, None);

        // exactly one row, the skip — no attempts consumed
        let hist = engine.store().history("gated", 10).unwrap();
        assert_eq!(hist.len(), 1);
        assert_eq!(hist[0].status, TaskStatus::Skipped);
    }

    #[tokio::test]
    async fn unknown_task_is_a_config_error() {
        let engine = engine();
        match engine.execute_task("ghost").await {
            Err(EngineError::TaskNotFound { name }) => assert_eq!(name, "ghost"),
            other => panic!("expected TaskNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_command_is_a_config_error() {
        let engine = engine();
        engine.store().add_task(&quick("blank", "   ")).unwrap();
        assert!(matches!(
            engine.execute_task("blank").await,
            Err(EngineError::NoCommand { .. })
        ));
    }

    #[tokio::test]
    async fn timeout_is_a_failed_attempt_not_a_crash() {
        let engine = engine();
        let mut def = quick("slow", "sleep 30");
        def.timeout_secs = 1;
        engine.store().add_task(&def).unwrap();

        let result = engine.execute_task("slow").await.unwrap();
        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.error, "Timeout after 1s");
        assert_eq!(result.exit_code, None);
    }

    #[tokio::test]
    async fn end_time_never_precedes_start_time() {
        let engine = engine();
        engine.store().add_task(&quick("a", "exit 0")).unwrap();
        engine.execute_task("a").await.unwrap();

        for row in engine.store().history("a", 10).unwrap() {
            let end = row.end_time.expect("terminal result has end_time");
            assert!(end >= row.start_time);
        }
    }

    #[tokio::test]
    async fn duplicate_invocation_is_rejected_as_skipped() {
        let engine = Arc::new(engine());
        engine.store().add_task(&quick("dup", "sleep 1")).unwrap();

        let (first, second) =
            tokio::join!(engine.execute_task("dup"), engine.execute_task("dup"));
        let statuses = [first.unwrap().status, second.unwrap().status];
        assert!(statuses.contains(&TaskStatus::Success));
        assert!(statuses.contains(&TaskStatus::Skipped));
    }

    #[tokio::test]
    async fn launch_failure_is_retried_then_failed() {
        let engine = engine();
        // sh itself launches fine; the missing binary yields a non-zero exit
        let mut def = quick("missing", "/no/such/binary_hopefully");
        def.retry_count = 1;
        engine.store().add_task(&def).unwrap();

        let result = engine.execute_task("missing").await.unwrap();
        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(engine.store().history("missing", 10).unwrap().len(), 2);
    }
}
