use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Default per-task command timeout when the definition does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 3_600;
/// Default delay between retry attempts (doubles after each failure).
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 300;
/// Budget for `url:` dependency reachability probes.
pub const DEPENDENCY_PROBE_TIMEOUT_SECS: u64 = 10;

/// Top-level config (conductor.toml + CONDUCTOR_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConductorConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub poller: PollerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// External scheduler (schtasks) integration settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SchedulerConfig {
    /// When true every schtasks call is a successful no-op.
    /// Override with env var: CONDUCTOR_SCHEDULER_SIMULATE=true
    #[serde(default)]
    pub simulate: bool,
    /// Register entries to run elevated as SYSTEM (/RL HIGHEST /RU SYSTEM).
    #[serde(default)]
    pub run_as_system: bool,
}

/// Portable polling-loop fallback for hosts without the native scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Seconds between scans of the definition table.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Size of the worker pool draining the due-task queue.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval(),
            workers: default_workers(),
        }
    }
}

fn default_scan_interval() -> u64 {
    30
}
fn default_workers() -> usize {
    4
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.conductor/conductor.db", home)
}

impl ConductorConfig {
    /// Load config from a TOML file with CONDUCTOR_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.conductor/conductor.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: ConductorConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CONDUCTOR_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.conductor/conductor.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = ConductorConfig::default();
        assert!(!cfg.scheduler.simulate);
        assert_eq!(cfg.poller.scan_interval_secs, 30);
        assert_eq!(cfg.poller.workers, 4);
        assert!(cfg.database.path.ends_with("conductor.db"));
    }
}
