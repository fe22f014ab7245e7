use rusqlite::Connection;

use crate::error::Result;

/// Initialise the task store schema in `conn`.
///
/// Safe to call on every startup — uses `IF NOT EXISTS` throughout.
/// `task_results` rows are removed with their owning task via the
/// ON DELETE CASCADE clause (requires `PRAGMA foreign_keys=ON` on the
/// connection, which [`crate::store::TaskStore::open`] sets).
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS tasks (
            name         TEXT    NOT NULL PRIMARY KEY,
            type         TEXT    NOT NULL DEFAULT '',
            schedule     TEXT,               -- portable expression, NULL = manual only
            command      TEXT    NOT NULL DEFAULT '',
            timeout      INTEGER NOT NULL DEFAULT 3600,
            retry_count  INTEGER NOT NULL DEFAULT 0,
            retry_delay  INTEGER NOT NULL DEFAULT 300,
            dependencies TEXT    NOT NULL DEFAULT '[]',  -- JSON array of kind:value tags
            enabled      INTEGER NOT NULL DEFAULT 1,
            created_at   TEXT    NOT NULL,
            updated_at   TEXT    NOT NULL
        );

        CREATE TABLE IF NOT EXISTS task_results (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            task_name   TEXT    NOT NULL REFERENCES tasks(name) ON DELETE CASCADE,
            status      TEXT    NOT NULL,
            start_time  TEXT    NOT NULL,
            end_time    TEXT,               -- NULL until the attempt finished
            exit_code   INTEGER,            -- NULL for skips / pre-launch failures
            output      TEXT    NOT NULL DEFAULT '',
            error       TEXT    NOT NULL DEFAULT '',
            retry_count INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS config (
            section TEXT NOT NULL,
            key     TEXT NOT NULL,
            value   TEXT NOT NULL,
            PRIMARY KEY (section, key)
        );

        CREATE TABLE IF NOT EXISTS credentials (
            name       TEXT NOT NULL PRIMARY KEY,
            value      TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        -- history lookups are always 'latest N for one task'
        CREATE INDEX IF NOT EXISTS idx_results_task
            ON task_results (task_name, id DESC);
        ",
    )?;
    Ok(())
}
