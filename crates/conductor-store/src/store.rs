use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, info};

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::types::{DependencySpec, TaskDefinition, TaskResult, TaskStatus};

/// Durable record of task definitions and execution history.
///
/// Thread-safe: wraps the SQLite connection in a Mutex so writes are
/// serialised at the storage layer rather than resolved by last-writer-wins
/// higher up.
pub struct TaskStore {
    db: Mutex<Connection>,
}

impl TaskStore {
    /// Wrap an existing connection, enabling cascades and initialising the
    /// schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Open (or create) the database file at `path` in WAL mode.
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::new(conn)
    }

    // -----------------------------------------------------------------------
    // Task definitions
    // -----------------------------------------------------------------------

    /// Insert or update a definition. The `name` key is immutable; on
    /// conflict every other column is replaced and `updated_at` bumped while
    /// `created_at` keeps its original value.
    pub fn add_task(&self, def: &TaskDefinition) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let deps = serde_json::to_string(&def.dependencies)
            .map_err(|e| StoreError::CorruptRow {
                task: def.name.clone(),
                reason: e.to_string(),
            })?;
        // empty expression means "manual only" — normalise to NULL
        let schedule = def
            .schedule
            .as_deref()
            .filter(|s| !s.trim().is_empty());

        db.execute(
            "INSERT INTO tasks
             (name, type, schedule, command, timeout, retry_count, retry_delay,
              dependencies, enabled, created_at, updated_at)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?10)
             ON CONFLICT(name) DO UPDATE SET
               type=excluded.type, schedule=excluded.schedule,
               command=excluded.command, timeout=excluded.timeout,
               retry_count=excluded.retry_count, retry_delay=excluded.retry_delay,
               dependencies=excluded.dependencies, enabled=excluded.enabled,
               updated_at=excluded.updated_at",
            rusqlite::params![
                def.name,
                def.task_type,
                schedule,
                def.command,
                def.timeout_secs as i64,
                def.retry_count,
                def.retry_delay_secs as i64,
                deps,
                def.enabled,
                now,
            ],
        )?;
        info!(task = %def.name, "task definition saved");
        Ok(())
    }

    /// Fetch one definition by name.
    pub fn get_task(&self, name: &str) -> Result<Option<TaskDefinition>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            &format!("SELECT {TASK_COLS} FROM tasks WHERE name = ?1"),
            [name],
            row_to_task,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Like [`get_task`](Self::get_task) but a missing row is an error.
    pub fn require_task(&self, name: &str) -> Result<TaskDefinition> {
        self.get_task(name)?.ok_or_else(|| StoreError::TaskNotFound {
            name: name.to_string(),
        })
    }

    /// All definitions ordered by name, optionally only enabled ones.
    pub fn list_tasks(&self, enabled_only: bool) -> Result<Vec<TaskDefinition>> {
        let db = self.db.lock().unwrap();
        let sql = if enabled_only {
            format!("SELECT {TASK_COLS} FROM tasks WHERE enabled = 1 ORDER BY name")
        } else {
            format!("SELECT {TASK_COLS} FROM tasks ORDER BY name")
        };
        let mut stmt = db.prepare(&sql)?;
        let tasks = stmt
            .query_map([], row_to_task)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Light pagination for dashboards and APIs.
    pub fn list_tasks_paginated(
        &self,
        limit: u32,
        offset: u32,
        enabled_only: bool,
    ) -> Result<Vec<TaskDefinition>> {
        let db = self.db.lock().unwrap();
        let sql = if enabled_only {
            format!(
                "SELECT {TASK_COLS} FROM tasks WHERE enabled = 1
                 ORDER BY name LIMIT ?1 OFFSET ?2"
            )
        } else {
            format!("SELECT {TASK_COLS} FROM tasks ORDER BY name LIMIT ?1 OFFSET ?2")
        };
        let mut stmt = db.prepare(&sql)?;
        let tasks = stmt
            .query_map([limit, offset], row_to_task)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Delete a definition and (via cascade) its execution history.
    /// Returns false when no such task existed.
    pub fn delete_task(&self, name: &str) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let n = db.execute("DELETE FROM tasks WHERE name = ?1", [name])?;
        if n > 0 {
            info!(task = %name, "task definition deleted");
        }
        Ok(n > 0)
    }

    // -----------------------------------------------------------------------
    // Execution history
    // -----------------------------------------------------------------------

    /// Append one attempt's outcome. Rows are never mutated afterwards.
    pub fn save_result(&self, result: &TaskResult) -> Result<i64> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO task_results
             (task_name, status, start_time, end_time, exit_code, output, error, retry_count)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
            rusqlite::params![
                result.task_name,
                result.status.to_string(),
                result.start_time.to_rfc3339(),
                result.end_time.map(|t| t.to_rfc3339()),
                result.exit_code,
                result.output,
                result.error,
                result.retry_count,
            ],
        )?;
        let id = db.last_insert_rowid();
        debug!(task = %result.task_name, status = %result.status, id, "result persisted");
        Ok(id)
    }

    /// Most recent `limit` results for a task, newest first.
    pub fn history(&self, task_name: &str, limit: u32) -> Result<Vec<TaskResult>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT task_name, status, start_time, end_time, exit_code,
                    output, error, retry_count
             FROM task_results WHERE task_name = ?1
             ORDER BY id DESC LIMIT ?2",
        )?;
        let results = stmt
            .query_map(rusqlite::params![task_name, limit], row_to_result)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(results)
    }

    /// Status of the most recent recorded attempt, if the task ever ran.
    pub fn latest_status(&self, task_name: &str) -> Result<Option<TaskStatus>> {
        let db = self.db.lock().unwrap();
        let status: Option<String> = db
            .query_row(
                "SELECT status FROM task_results WHERE task_name = ?1
                 ORDER BY id DESC LIMIT 1",
                [task_name],
                |row| row.get(0),
            )
            .optional()?;
        match status {
            Some(s) => TaskStatus::from_str(&s)
                .map(Some)
                .map_err(|reason| StoreError::CorruptRow {
                    task: task_name.to_string(),
                    reason,
                }),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Config & credentials (read-mostly collaborator surface)
    // -----------------------------------------------------------------------

    pub fn store_config(&self, section: &str, key: &str, value: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR REPLACE INTO config (section, key, value) VALUES (?1,?2,?3)",
            rusqlite::params![section, key, value],
        )?;
        Ok(())
    }

    pub fn get_config(&self, section: &str, key: &str, default: Option<&str>) -> Result<Option<String>> {
        let db = self.db.lock().unwrap();
        let value: Option<String> = db
            .query_row(
                "SELECT value FROM config WHERE section = ?1 AND key = ?2",
                rusqlite::params![section, key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.or_else(|| default.map(String::from)))
    }

    /// Encryption-at-rest is the credential collaborator's job; this layer
    /// stores whatever bytes it is handed.
    pub fn store_credential(&self, name: &str, value: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR REPLACE INTO credentials (name, value, created_at) VALUES (?1,?2,?3)",
            rusqlite::params![name, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn get_credential(&self, name: &str) -> Result<Option<String>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT value FROM credentials WHERE name = ?1",
            [name],
            |row| row.get(0),
        )
        .optional()
        .map_err(Into::into)
    }
}

const TASK_COLS: &str = "name, type, schedule, command, timeout, retry_count,
                         retry_delay, dependencies, enabled, created_at, updated_at";

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<TaskDefinition> {
    let deps_json: String = row.get(7)?;
    // DependencySpec::parse is total (unknown kinds survive as Unknown), so
    // the only way this fails is a row whose column is not a JSON array.
    let dependencies: Vec<DependencySpec> = serde_json::from_str(&deps_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(TaskDefinition {
        name: row.get(0)?,
        task_type: row.get(1)?,
        schedule: row.get(2)?,
        command: row.get(3)?,
        timeout_secs: row.get::<_, i64>(4)? as u64,
        retry_count: row.get(5)?,
        retry_delay_secs: row.get::<_, i64>(6)? as u64,
        dependencies,
        enabled: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn row_to_result(row: &Row<'_>) -> rusqlite::Result<TaskResult> {
    let status_str: String = row.get(1)?;
    let status = TaskStatus::from_str(&status_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })?;
    let start: String = row.get(2)?;
    let end: Option<String> = row.get(3)?;
    Ok(TaskResult {
        task_name: row.get(0)?,
        status,
        start_time: parse_ts(&start, 2)?,
        end_time: end.as_deref().map(|s| parse_ts(s, 3)).transpose()?,
        exit_code: row.get(4)?,
        output: row.get(5)?,
        error: row.get(6)?,
        retry_count: row.get(7)?,
    })
}

fn parse_ts(s: &str, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                col,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_store() -> TaskStore {
        TaskStore::new(Connection::open_in_memory().expect("open")).expect("init")
    }

    fn def(name: &str) -> TaskDefinition {
        TaskDefinition::new(name, "backup", "echo hi")
    }

    #[test]
    fn get_missing_task_is_none() {
        let store = mem_store();
        assert!(store.get_task("nope").unwrap().is_none());
    }

    #[test]
    fn upsert_preserves_created_at() {
        let store = mem_store();
        store.add_task(&def("a")).unwrap();
        let first = store.get_task("a").unwrap().unwrap();

        let mut changed = def("a");
        changed.command = "echo changed".to_string();
        store.add_task(&changed).unwrap();

        let second = store.get_task("a").unwrap().unwrap();
        assert_eq!(second.command, "echo changed");
        assert_eq!(second.created_at, first.created_at);
    }

    #[test]
    fn empty_schedule_is_normalised_to_none() {
        let store = mem_store();
        let mut d = def("a");
        d.schedule = Some("   ".to_string());
        store.add_task(&d).unwrap();
        assert!(store.get_task("a").unwrap().unwrap().schedule.is_none());
    }

    #[test]
    fn dependencies_roundtrip_including_unknown() {
        let store = mem_store();
        let mut d = def("a");
        d.dependencies = vec![
            DependencySpec::File("/tmp/gate".into()),
            DependencySpec::parse("tsak:typo"),
        ];
        store.add_task(&d).unwrap();
        let got = store.get_task("a").unwrap().unwrap();
        assert_eq!(got.dependencies, d.dependencies);
    }

    #[test]
    fn list_tasks_filters_disabled() {
        let store = mem_store();
        store.add_task(&def("on")).unwrap();
        let mut off = def("off");
        off.enabled = false;
        store.add_task(&off).unwrap();

        assert_eq!(store.list_tasks(true).unwrap().len(), 1);
        assert_eq!(store.list_tasks(false).unwrap().len(), 2);
    }

    #[test]
    fn history_is_newest_first() {
        let store = mem_store();
        store.add_task(&def("a")).unwrap();

        let mut r = TaskResult::started("a");
        r.status = TaskStatus::Failed;
        r.end_time = Some(r.start_time);
        store.save_result(&r).unwrap();
        r.status = TaskStatus::Success;
        store.save_result(&r).unwrap();

        let hist = store.history("a", 10).unwrap();
        assert_eq!(hist.len(), 2);
        assert_eq!(hist[0].status, TaskStatus::Success);
        assert_eq!(store.latest_status("a").unwrap(), Some(TaskStatus::Success));
    }

    #[test]
    fn latest_status_none_when_never_ran() {
        let store = mem_store();
        store.add_task(&def("a")).unwrap();
        assert!(store.latest_status("a").unwrap().is_none());
    }

    #[test]
    fn deleting_task_cascades_results() {
        let store = mem_store();
        store.add_task(&def("a")).unwrap();
        let mut r = TaskResult::started("a");
        r.status = TaskStatus::Success;
        store.save_result(&r).unwrap();

        assert!(store.delete_task("a").unwrap());
        assert!(store.history("a", 10).unwrap().is_empty());
        assert!(!store.delete_task("a").unwrap());
    }

    #[test]
    fn config_and_credentials_roundtrip() {
        let store = mem_store();
        store.store_config("email", "smtp_host", "mail.local").unwrap();
        assert_eq!(
            store.get_config("email", "smtp_host", None).unwrap().as_deref(),
            Some("mail.local")
        );
        assert_eq!(
            store.get_config("email", "missing", Some("fallback")).unwrap().as_deref(),
            Some("fallback")
        );

        store.store_credential("smtp_password", "s3cret").unwrap();
        assert_eq!(
            store.get_credential("smtp_password").unwrap().as_deref(),
            Some("s3cret")
        );
        assert!(store.get_credential("nope").unwrap().is_none());
    }
}
