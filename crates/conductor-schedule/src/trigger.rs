use chrono::Weekday;
use serde::{Deserialize, Serialize};

/// The external scheduler's native representation of "when to run".
///
/// Never persisted — produced by [`crate::translate`] and consumed by the
/// schtasks adapter, which renders it with [`ScheduleTrigger::schtasks_args`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleTrigger {
    /// Every day at HH:MM.
    Daily { hour: u8, minute: u8 },
    /// Every week on `weekday` at HH:MM.
    Weekly {
        #[serde(with = "weekday_serde")]
        weekday: Weekday,
        hour: u8,
        minute: u8,
    },
    /// Every month on day-of-month `day` at HH:MM.
    Monthly { day: u8, hour: u8, minute: u8 },
    /// Every `interval` minutes.
    EveryMinutes { interval: u32 },
}

impl ScheduleTrigger {
    /// Render the schtasks.exe flags this trigger maps to
    /// (`/SC`, `/ST`, `/D`, `/MO` as applicable).
    pub fn schtasks_args(&self) -> Vec<String> {
        match *self {
            ScheduleTrigger::Daily { hour, minute } => vec![
                "/SC".into(),
                "DAILY".into(),
                "/ST".into(),
                format!("{hour:02}:{minute:02}"),
            ],
            ScheduleTrigger::Weekly {
                weekday,
                hour,
                minute,
            } => vec![
                "/SC".into(),
                "WEEKLY".into(),
                "/D".into(),
                schtasks_day(weekday).into(),
                "/ST".into(),
                format!("{hour:02}:{minute:02}"),
            ],
            ScheduleTrigger::Monthly { day, hour, minute } => vec![
                "/SC".into(),
                "MONTHLY".into(),
                "/D".into(),
                day.to_string(),
                "/ST".into(),
                format!("{hour:02}:{minute:02}"),
            ],
            ScheduleTrigger::EveryMinutes { interval } => vec![
                "/SC".into(),
                "MINUTE".into(),
                "/MO".into(),
                interval.to_string(),
            ],
        }
    }

    /// The equivalent 5-field cron expression (used by next-run display).
    pub fn to_cron(&self) -> String {
        match *self {
            ScheduleTrigger::Daily { hour, minute } => format!("{minute} {hour} * * *"),
            ScheduleTrigger::Weekly {
                weekday,
                hour,
                minute,
            } => format!("{minute} {hour} * * {}", weekday.num_days_from_sunday()),
            ScheduleTrigger::Monthly { day, hour, minute } => {
                format!("{minute} {hour} {day} * *")
            }
            ScheduleTrigger::EveryMinutes { interval } => format!("*/{interval} * * * *"),
        }
    }
}

fn schtasks_day(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "MON",
        Weekday::Tue => "TUE",
        Weekday::Wed => "WED",
        Weekday::Thu => "THU",
        Weekday::Fri => "FRI",
        Weekday::Sat => "SAT",
        Weekday::Sun => "SUN",
    }
}

// chrono::Weekday has no serde impls without a feature flag; serialise as
// the schtasks day code.
mod weekday_serde {
    use chrono::Weekday;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(day: &Weekday, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(super::schtasks_day(*day))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Weekday, D::Error> {
        let s = String::deserialize(de)?;
        match s.as_str() {
            "MON" => Ok(Weekday::Mon),
            "TUE" => Ok(Weekday::Tue),
            "WED" => Ok(Weekday::Wed),
            "THU" => Ok(Weekday::Thu),
            "FRI" => Ok(Weekday::Fri),
            "SAT" => Ok(Weekday::Sat),
            "SUN" => Ok(Weekday::Sun),
            other => Err(serde::de::Error::custom(format!("unknown weekday: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_renders_st_flag() {
        let args = ScheduleTrigger::Daily { hour: 6, minute: 0 }.schtasks_args();
        assert_eq!(args, ["/SC", "DAILY", "/ST", "06:00"]);
    }

    #[test]
    fn weekly_renders_day_code() {
        let args = ScheduleTrigger::Weekly {
            weekday: Weekday::Mon,
            hour: 8,
            minute: 0,
        }
        .schtasks_args();
        assert_eq!(args, ["/SC", "WEEKLY", "/D", "MON", "/ST", "08:00"]);
    }

    #[test]
    fn interval_renders_modifier() {
        let args = ScheduleTrigger::EveryMinutes { interval: 30 }.schtasks_args();
        assert_eq!(args, ["/SC", "MINUTE", "/MO", "30"]);
    }

    #[test]
    fn to_cron_uses_sunday_zero() {
        let t = ScheduleTrigger::Weekly {
            weekday: Weekday::Sun,
            hour: 9,
            minute: 15,
        };
        assert_eq!(t.to_cron(), "15 9 * * 0");
    }
}
