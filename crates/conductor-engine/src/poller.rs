//! Portable polling fallback for hosts without the native scheduler.
//!
//! Scans the definition table on a fixed interval, detects tasks whose
//! schedule fired within the last minute, and feeds them to a bounded
//! worker pool over an mpsc channel. A dedupe set keyed by
//! (task, minute-bucket) guarantees at-most-once dispatch per minute, and
//! stale buckets are pruned every scan so the set cannot grow without bound.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use conductor_core::config::PollerConfig;
use conductor_schedule::next_run_after;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{error, info, warn};

use crate::engine::ExecutionEngine;
use crate::error::Result;

/// Queue depth between the scan loop and the workers.
const QUEUE_DEPTH: usize = 64;

pub struct Poller {
    engine: Arc<ExecutionEngine>,
    config: PollerConfig,
}

impl Poller {
    pub fn new(engine: Arc<ExecutionEngine>, config: PollerConfig) -> Self {
        Self { engine, config }
    }

    /// Main loop. Scans until `shutdown` broadcasts `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            workers = self.config.workers,
            interval = self.config.scan_interval_secs,
            "poller started"
        );

        let (tx, rx) = mpsc::channel::<String>(QUEUE_DEPTH);
        let rx = Arc::new(Mutex::new(rx));
        for worker_id in 0..self.config.workers.max(1) {
            tokio::spawn(worker(Arc::clone(&self.engine), Arc::clone(&rx), worker_id));
        }

        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.scan_interval_secs.max(1),
        ));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.scan(&mut seen, &tx, Utc::now()) {
                        error!("poller scan error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("poller shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One pass over the enabled, scheduled definitions: queue every task
    /// that is due in the current minute and has not been dispatched for it.
    fn scan(
        &self,
        seen: &mut HashSet<(String, String)>,
        tx: &mpsc::Sender<String>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let bucket = minute_bucket(now);

        for def in self.engine.store().list_tasks(true)? {
            let Some(expr) = def.schedule.as_deref() else {
                continue;
            };
            let key = (def.name.clone(), bucket.clone());
            if seen.contains(&key) {
                continue;
            }
            if !is_due(expr, now) {
                continue;
            }
            if self.engine.is_running(&def.name) {
                // still busy from a previous fire — never stack a second run
                continue;
            }
            seen.insert(key);
            info!(task = %def.name, "task due — queued for execution");
            if tx.try_send(def.name.clone()).is_err() {
                warn!(task = %def.name, "worker queue full — task dropped this minute");
                seen.remove(&(def.name, bucket.clone()));
            }
        }

        // An occurrence older than the current minute is never due again,
        // so stale buckets can be dropped outright.
        seen.retain(|(_, b)| *b == bucket);
        Ok(())
    }
}

async fn worker(
    engine: Arc<ExecutionEngine>,
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
    worker_id: usize,
) {
    loop {
        let name = rx.lock().await.recv().await;
        let Some(name) = name else {
            break; // scan loop gone
        };
        info!(worker = worker_id, task = %name, "worker picked up task");
        match engine.execute_task(&name).await {
            Ok(result) => info!(worker = worker_id, task = %name, status = %result.status, "task finished"),
            Err(e) => error!(worker = worker_id, task = %name, "task could not run: {e}"),
        }
    }
}

/// Zero-padded `YYYYMMDDHHMM`, so lexicographic order is chronological.
fn minute_bucket(t: DateTime<Utc>) -> String {
    t.format("%Y%m%d%H%M").to_string()
}

/// A schedule is due when an occurrence falls within the last 60 seconds.
fn is_due(expr: &str, now: DateTime<Utc>) -> bool {
    match next_run_after(expr, now - Duration::seconds(60)) {
        Some(t) => t <= now,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use conductor_store::{TaskDefinition, TaskStore};
    use rusqlite::Connection;

    fn poller() -> Poller {
        let store = TaskStore::new(Connection::open_in_memory().expect("open")).expect("init");
        let engine = Arc::new(ExecutionEngine::new(Arc::new(store)));
        Poller::new(engine, PollerConfig::default())
    }

    fn at(h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, h, mi, s).unwrap()
    }

    #[test]
    fn due_within_the_fire_minute_only() {
        assert!(is_due("*/5 * * * *", at(6, 5, 30)));
        assert!(!is_due("*/5 * * * *", at(6, 6, 30)));
        assert!(is_due("0 6 * * *", at(6, 0, 59)));
        assert!(!is_due("0 6 * * *", at(6, 2, 0)));
    }

    #[test]
    fn garbage_schedule_is_never_due() {
        assert!(!is_due("not a schedule", at(6, 0, 0)));
    }

    #[test]
    fn minute_bucket_is_sortable() {
        let early = minute_bucket(at(6, 5, 0));
        let late = minute_bucket(at(6, 6, 0));
        assert!(late > early);
        assert_eq!(early.len(), 12);
    }

    #[tokio::test]
    async fn scan_dispatches_each_task_once_per_minute() {
        let poller = poller();
        let mut def = TaskDefinition::new("tick", "test", "exit 0");
        def.schedule = Some("*/1 * * * *".to_string()); // due every minute
        poller.engine.store().add_task(&def).unwrap();

        let (tx, mut rx) = mpsc::channel::<String>(4);
        let mut seen = HashSet::new();
        let now = at(6, 5, 10);

        poller.scan(&mut seen, &tx, now).unwrap();
        poller.scan(&mut seen, &tx, now).unwrap();

        assert_eq!(rx.try_recv().unwrap(), "tick");
        assert!(rx.try_recv().is_err(), "second scan must not re-dispatch");

        // next minute: dispatched again, and the old bucket is pruned
        poller.scan(&mut seen, &tx, at(6, 6, 10)).unwrap();
        assert_eq!(rx.try_recv().unwrap(), "tick");
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn scan_skips_manual_and_disabled_tasks() {
        let poller = poller();
        poller
            .engine
            .store()
            .add_task(&TaskDefinition::new("manual", "adhoc", "exit 0"))
            .unwrap();
        let mut off = TaskDefinition::new("off", "test", "exit 0");
        off.schedule = Some("*/1 * * * *".to_string());
        off.enabled = false;
        poller.engine.store().add_task(&off).unwrap();

        let (tx, mut rx) = mpsc::channel::<String>(4);
        let mut seen = HashSet::new();
        poller.scan(&mut seen, &tx, at(6, 5, 10)).unwrap();
        assert!(rx.try_recv().is_err());
    }
}
