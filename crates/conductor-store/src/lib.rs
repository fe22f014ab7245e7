//! `conductor-store` — SQLite persistence for task definitions and
//! execution history.
//!
//! This crate is the source of truth consumed by every other component:
//! the `tasks` table holds one row per task name (upsert semantics), the
//! `task_results` table is an append-only log of execution attempts, and
//! two small key/value tables carry runtime config and credentials for
//! the collaborator layers.

pub mod db;
pub mod error;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use store::TaskStore;
pub use types::{DependencySpec, TaskDefinition, TaskResult, TaskStatus};
