//! Full 5-field cron parsing for next-occurrence display.
//!
//! Deliberately broader than [`crate::translate`]: lists, ranges and steps
//! are accepted here because the computed time only feeds UIs, never the
//! external scheduler.

use chrono::{DateTime, Datelike, Duration, DurationRound, TimeZone, Timelike, Utc};

use crate::error::{Result, ScheduleError};

/// How far ahead to scan before giving up. Covers every satisfiable
/// dom/month combination (including Feb 29).
const SCAN_DAYS: i64 = 366 * 4 + 1;

/// A parsed 5-field cron expression with each field expanded to its
/// allowed value set.
#[derive(Debug, Clone)]
pub struct CronSpec {
    minutes: Vec<bool>,  // 0-59
    hours: Vec<bool>,    // 0-23
    dom: Vec<bool>,      // 1-31, index 0 unused
    months: Vec<bool>,   // 1-12, index 0 unused
    dow: Vec<bool>,      // 0-6, Sunday = 0
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSpec {
    pub fn parse(expr: &str) -> Result<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(ScheduleError::InvalidSchedule(format!(
                "cron expression must have 5 fields, got {}",
                fields.len()
            )));
        }
        Ok(Self {
            minutes: parse_field(fields[0], 0, 59)?,
            hours: parse_field(fields[1], 0, 23)?,
            dom: parse_field(fields[2], 1, 31)?,
            months: parse_field(fields[3], 1, 12)?,
            dow: parse_dow(fields[4])?,
            dom_restricted: fields[2] != "*",
            dow_restricted: fields[4] != "*",
        })
    }

    /// Next matching instant strictly after `from`, or `None` if nothing
    /// matches within the scan horizon.
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        // Truncation can't fail for a minute granularity.
        let mut t = from.duration_trunc(Duration::minutes(1)).ok()? + Duration::minutes(1);
        let horizon = from + Duration::days(SCAN_DAYS);

        while t < horizon {
            if !self.months[t.month() as usize] {
                // skip to the 1st of the next month
                let (y, m) = if t.month() == 12 {
                    (t.year() + 1, 1)
                } else {
                    (t.year(), t.month() + 1)
                };
                t = Utc.with_ymd_and_hms(y, m, 1, 0, 0, 0).single()?;
                continue;
            }
            if !self.day_matches(&t) {
                t = (t + Duration::days(1))
                    .duration_trunc(Duration::days(1))
                    .ok()?;
                continue;
            }
            if !self.hours[t.hour() as usize] {
                t = (t + Duration::hours(1))
                    .duration_trunc(Duration::hours(1))
                    .ok()?;
                continue;
            }
            if !self.minutes[t.minute() as usize] {
                t += Duration::minutes(1);
                continue;
            }
            return Some(t);
        }
        None
    }

    /// Standard cron day rule: when both dom and dow are restricted, a day
    /// matches if *either* does; otherwise only the restricted one counts.
    fn day_matches(&self, t: &DateTime<Utc>) -> bool {
        let dom_ok = self.dom[t.day() as usize];
        let dow_ok = self.dow[t.weekday().num_days_from_sunday() as usize];
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom_ok || dow_ok,
            (true, false) => dom_ok,
            (false, true) => dow_ok,
            (false, false) => true,
        }
    }
}

/// Expand one field (`*`, `N`, `A-B`, lists, with optional `/step`) into a
/// membership table over `lo..=hi`.
fn parse_field(field: &str, lo: u32, hi: u32) -> Result<Vec<bool>> {
    let mut set = vec![false; (hi + 1) as usize];
    for part in field.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((r, s)) => {
                let step: u32 = s.parse().map_err(|_| bad(field))?;
                if step == 0 {
                    return Err(bad(field));
                }
                (r, step)
            }
            None => (part, 1),
        };
        let (start, end) = if range == "*" {
            (lo, hi)
        } else if let Some((a, b)) = range.split_once('-') {
            (
                a.parse().map_err(|_| bad(field))?,
                b.parse().map_err(|_| bad(field))?,
            )
        } else {
            let v: u32 = range.parse().map_err(|_| bad(field))?;
            // "N/step" means "N-hi/step" in most cron dialects
            if step > 1 {
                (v, hi)
            } else {
                (v, v)
            }
        };
        if start < lo || end > hi || start > end {
            return Err(bad(field));
        }
        let mut v = start;
        while v <= end {
            set[v as usize] = true;
            v += step;
        }
    }
    Ok(set)
}

/// Day-of-week accepts 0-7 where both 0 and 7 mean Sunday.
fn parse_dow(field: &str) -> Result<Vec<bool>> {
    let wide = parse_field(field, 0, 7)?;
    let mut set = wide[..7].to_vec();
    if wide[7] {
        set[0] = true;
    }
    Ok(set)
}

fn bad(field: &str) -> ScheduleError {
    ScheduleError::InvalidSchedule(format!("bad cron field: {field}"))
}
