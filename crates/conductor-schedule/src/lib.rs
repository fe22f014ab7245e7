//! `conductor-schedule` — portable schedule expressions.
//!
//! # Overview
//!
//! Two expression families are accepted by [`translate`]:
//!
//! | Family | Shapes                                                       |
//! |--------|--------------------------------------------------------------|
//! | clock  | `HH:MM` (daily), `MON HH:MM` (weekly), `15 HH:MM` (monthly)  |
//! | cron   | 5-field, restricted to the four shapes the external scheduler's trigger vocabulary can express |
//!
//! Anything the native trigger vocabulary cannot represent is rejected —
//! this is a deliberate subset, not full cron. [`next_run_after`] is the one
//! exception: it parses full 5-field cron (lists, ranges, steps) because it
//! only drives display, never the external scheduler.

pub mod cron;
pub mod error;
pub mod translate;
pub mod trigger;

pub use error::{Result, ScheduleError};
pub use translate::{translate, validate};
pub use trigger::ScheduleTrigger;

use chrono::{DateTime, Utc};

/// Compute the next occurrence of `expr` strictly after `from`, for display.
///
/// Accepts the clock family plus *full* cron semantics (a superset of what
/// [`translate`] allows). Returns `None` when the expression is unparseable
/// or no occurrence exists within the scan horizon.
pub fn next_run_after(expr: &str, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    // Clock-family expressions funnel through their cron equivalent.
    let cron_expr = match translate(expr) {
        Ok(trigger) => trigger.to_cron(),
        Err(_) => expr.trim().to_string(),
    };
    let spec = cron::CronSpec::parse(&cron_expr).ok()?;
    spec.next_after(from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_run_accepts_clock_family() {
        let from = Utc.with_ymd_and_hms(2026, 3, 10, 5, 0, 0).unwrap();
        let next = next_run_after("06:30", from).unwrap();
        assert_eq!(
            next,
            Utc.with_ymd_and_hms(2026, 3, 10, 6, 30, 0).unwrap()
        );
    }

    #[test]
    fn next_run_accepts_cron_superset() {
        // translate() rejects this list, next_run_after does not
        let from = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        assert!(next_run_after("0 9 * * 1,3", from).is_some());
    }

    #[test]
    fn next_run_none_for_garbage() {
        assert!(next_run_after("not a schedule", Utc::now()).is_none());
    }
}
