//! `conductor-core` — shared configuration and constants.
//!
//! Every other crate in the workspace depends on this one for the
//! figment-backed [`config::ConductorConfig`] and the handful of
//! workspace-wide constants (scheduler namespace, default budgets).

pub mod config;
pub mod error;

pub use config::ConductorConfig;
pub use error::{CoreError, Result};
