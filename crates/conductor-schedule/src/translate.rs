use chrono::Weekday;

use crate::error::{Result, ScheduleError};
use crate::trigger::ScheduleTrigger;

/// Map a portable schedule expression to a native scheduler trigger.
///
/// Cron input is restricted to the four shapes the external scheduler can
/// express natively: fixed daily time, fixed weekly weekday+time, fixed
/// monthly day+time, and a `*/N`-minute interval. Everything else fails with
/// [`ScheduleError::InvalidSchedule`].
pub fn translate(expr: &str) -> Result<ScheduleTrigger> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(invalid("empty expression"));
    }
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.len() {
        5 => translate_cron(&fields),
        1 | 2 => translate_clock(&fields),
        n => Err(invalid(&format!(
            "expected HH:MM, 'WEEKDAY HH:MM', 'DAY HH:MM' or a 5-field cron expression, got {n} fields"
        ))),
    }
}

/// Non-raising twin of [`translate`] for UI/CLI pre-flight checks.
pub fn validate(expr: &str) -> (bool, String) {
    match translate(expr) {
        Ok(_) => (true, "OK".to_string()),
        Err(e) => (false, e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// clock family: "HH:MM" | "MON HH:MM" | "15 HH:MM"
// ---------------------------------------------------------------------------

fn translate_clock(fields: &[&str]) -> Result<ScheduleTrigger> {
    match fields {
        [time] => {
            let (hour, minute) = parse_time(time)?;
            Ok(ScheduleTrigger::Daily { hour, minute })
        }
        [day, time] => {
            let (hour, minute) = parse_time(time)?;
            if let Some(weekday) = parse_weekday_name(day) {
                return Ok(ScheduleTrigger::Weekly {
                    weekday,
                    hour,
                    minute,
                });
            }
            let dom = parse_day_of_month(day)?;
            Ok(ScheduleTrigger::Monthly {
                day: dom,
                hour,
                minute,
            })
        }
        _ => unreachable!("caller checked field count"),
    }
}

fn parse_time(s: &str) -> Result<(u8, u8)> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| invalid(&format!("'{s}' is not a HH:MM time")))?;
    let hour: u8 = h
        .parse()
        .map_err(|_| invalid(&format!("bad hour in '{s}'")))?;
    let minute: u8 = m
        .parse()
        .map_err(|_| invalid(&format!("bad minute in '{s}'")))?;
    if hour > 23 || minute > 59 {
        return Err(invalid(&format!("time '{s}' out of range")));
    }
    Ok((hour, minute))
}

fn parse_weekday_name(s: &str) -> Option<Weekday> {
    match s.to_ascii_uppercase().as_str() {
        "MON" | "MONDAY" => Some(Weekday::Mon),
        "TUE" | "TUESDAY" => Some(Weekday::Tue),
        "WED" | "WEDNESDAY" => Some(Weekday::Wed),
        "THU" | "THURSDAY" => Some(Weekday::Thu),
        "FRI" | "FRIDAY" => Some(Weekday::Fri),
        "SAT" | "SATURDAY" => Some(Weekday::Sat),
        "SUN" | "SUNDAY" => Some(Weekday::Sun),
        _ => None,
    }
}

fn parse_day_of_month(s: &str) -> Result<u8> {
    let day: u8 = s
        .parse()
        .map_err(|_| invalid(&format!("'{s}' is neither a weekday nor a day-of-month")))?;
    if !(1..=31).contains(&day) {
        return Err(invalid("day-of-month must be 1-31"));
    }
    Ok(day)
}

// ---------------------------------------------------------------------------
// cron subset: "minute hour dom month dow"
// ---------------------------------------------------------------------------

fn translate_cron(fields: &[&str]) -> Result<ScheduleTrigger> {
    let [minute, hour, dom, month, dow] = fields else {
        unreachable!("caller checked field count");
    };

    // every N minutes
    if let Some(interval) = minute.strip_prefix("*/") {
        if ![hour, dom, month, dow].iter().all(|f| **f == "*") {
            return Err(invalid(
                "minute intervals require every other field to be '*'",
            ));
        }
        let interval: u32 = interval
            .parse()
            .map_err(|_| invalid("invalid minute interval"))?;
        if !(1..=1439).contains(&interval) {
            return Err(invalid("minute interval must be 1-1439"));
        }
        return Ok(ScheduleTrigger::EveryMinutes { interval });
    }

    let minute: u8 = minute
        .parse()
        .map_err(|_| invalid("minute field must be numeric or */N"))?;
    let hour: u8 = hour
        .parse()
        .map_err(|_| invalid("hour field must be numeric"))?;
    if minute > 59 || hour > 23 {
        return Err(invalid("minute/hour out of range"));
    }

    if *month != "*" {
        return Err(invalid(
            "month field is not expressible as a native trigger",
        ));
    }

    match (*dom, *dow) {
        // daily at fixed time
        ("*", "*") => Ok(ScheduleTrigger::Daily { hour, minute }),

        // weekly on a fixed weekday
        ("*", dow) => {
            let n: u8 = dow
                .parse()
                .map_err(|_| invalid("day-of-week must be numeric 0-6"))?;
            let weekday = weekday_from_cron(n)
                .ok_or_else(|| invalid("day-of-week must be 0-6"))?;
            Ok(ScheduleTrigger::Weekly {
                weekday,
                hour,
                minute,
            })
        }

        // monthly on a fixed day
        (dom, "*") => {
            let day: u8 = dom
                .parse()
                .map_err(|_| invalid("day-of-month must be numeric"))?;
            if !(1..=31).contains(&day) {
                return Err(invalid("day-of-month must be 1-31"));
            }
            Ok(ScheduleTrigger::Monthly { day, hour, minute })
        }

        _ => Err(invalid(
            "combined day-of-month and day-of-week triggers are not expressible",
        )),
    }
}

/// Cron numbering: 0 = Sunday … 6 = Saturday (7 also accepted as Sunday).
fn weekday_from_cron(n: u8) -> Option<Weekday> {
    match n {
        0 | 7 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

fn invalid(reason: &str) -> ScheduleError {
    ScheduleError::InvalidSchedule(reason.to_string())
}
