//! Trigger expressions: five-field cron, macros and fixed intervals.

use chrono::{Datelike, DurationRound, Timelike};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

use crate::errors::TaskflowError;
use crate::utils::Timestamp;

#[allow(clippy::expect_used)]
fn field_item_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?:(\*)|(\d+)(?:-(\d+))?)(?:/(\d+))?$").expect("field pattern is a valid regex")
    })
}

#[allow(clippy::expect_used)]
fn interval_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^@every\s+(\d+)([smh])$").expect("interval pattern is a valid regex")
    })
}

/// When a registered pipeline should run on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Calendar schedule, evaluated at minute resolution in UTC.
    Cron(CronSchedule),
    /// Fixed interval since the previous scheduled run.
    Every(Duration),
}

impl Trigger {
    /// Parses a trigger expression.
    ///
    /// Accepts five-field cron (`min hour day-of-month month day-of-week`),
    /// the macros `@hourly`, `@daily`, `@weekly`, `@monthly`, and
    /// `@every <n><s|m|h>`.
    ///
    /// # Errors
    ///
    /// Returns [`TaskflowError::InvalidTrigger`] for anything else.
    pub fn parse(expression: &str) -> Result<Self, TaskflowError> {
        let expression = expression.trim();
        let invalid = |reason: String| TaskflowError::InvalidTrigger {
            expression: expression.to_string(),
            reason,
        };

        if let Some(caps) = interval_pattern().captures(expression) {
            let n: u64 = caps[1]
                .parse()
                .map_err(|_| invalid(format!("interval '{}' is too large", &caps[1])))?;
            if n == 0 {
                return Err(invalid("interval must be positive".into()));
            }
            let secs = match &caps[2] {
                "s" => Some(n),
                "m" => n.checked_mul(60),
                _ => n.checked_mul(3600),
            }
            .ok_or_else(|| invalid("interval is too large".into()))?;
            return Ok(Self::Every(Duration::from_secs(secs)));
        }

        let cron = match expression {
            "@hourly" => "0 * * * *",
            "@daily" | "@midnight" => "0 0 * * *",
            "@weekly" => "0 0 * * 0",
            "@monthly" => "0 0 1 * *",
            other if other.starts_with('@') => {
                return Err(invalid(format!("unknown macro '{other}'")));
            }
            other => other,
        };

        CronSchedule::parse(cron).map(Self::Cron).map_err(invalid)
    }

    /// Returns true if a scheduled run is due at `now`.
    ///
    /// `last_fired` is the time the trigger last fired, if ever. A cron
    /// trigger fires at most once per matching minute; an interval trigger
    /// fires immediately the first time and then once per interval.
    #[must_use]
    pub fn is_due(&self, now: Timestamp, last_fired: Option<Timestamp>) -> bool {
        match self {
            Self::Cron(schedule) => {
                schedule.matches(now)
                    && last_fired.map_or(true, |fired| minute_of(fired) < minute_of(now))
            }
            Self::Every(interval) => last_fired.map_or(true, |fired| {
                (now - fired).to_std().map_or(false, |elapsed| elapsed >= *interval)
            }),
        }
    }
}

fn minute_of(at: Timestamp) -> Timestamp {
    at.duration_trunc(chrono::Duration::minutes(1)).unwrap_or(at)
}

/// A parsed five-field cron schedule.
///
/// Each field is a bit set of allowed values. As in classic cron, when both
/// day-of-month and day-of-week are restricted a day matches if either does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronSchedule {
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    fn parse(expression: &str) -> Result<Self, String> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields.as_slice() else {
            return Err(format!("expected 5 fields, found {}", fields.len()));
        };

        let mut days_of_week = parse_field(dow, 0, 7, "day-of-week")?;
        // 7 is an alias for Sunday.
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week & !(1 << 7)) | 1;
        }

        Ok(Self {
            minutes: parse_field(minute, 0, 59, "minute")?,
            hours: parse_field(hour, 0, 23, "hour")?,
            days_of_month: parse_field(dom, 1, 31, "day-of-month")?,
            months: parse_field(month, 1, 12, "month")?,
            days_of_week,
            dom_restricted: !dom.starts_with('*'),
            dow_restricted: !dow.starts_with('*'),
        })
    }

    /// Returns true if `at` falls in a minute this schedule selects.
    #[must_use]
    pub fn matches(&self, at: Timestamp) -> bool {
        let bit = |set: u64, value: u32| set & (1u64 << value) != 0;

        let dom = bit(self.days_of_month, at.day());
        let dow = bit(self.days_of_week, at.weekday().num_days_from_sunday());
        let day = match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        };

        day && bit(self.minutes, at.minute())
            && bit(self.hours, at.hour())
            && bit(self.months, at.month())
    }
}

/// Parses one comma-separated cron field into a bit set.
fn parse_field(field: &str, min: u32, max: u32, name: &str) -> Result<u64, String> {
    let mut set = 0u64;
    for item in field.split(',') {
        let caps = field_item_pattern()
            .captures(item)
            .ok_or_else(|| format!("malformed {name} field '{item}'"))?;

        let number = |idx: usize| -> Result<Option<u32>, String> {
            caps.get(idx)
                .map(|m| {
                    m.as_str()
                        .parse::<u32>()
                        .map_err(|_| format!("{name} value '{}' is too large", m.as_str()))
                })
                .transpose()
        };

        let (start, end) = if caps.get(1).is_some() {
            (min, max)
        } else {
            let start = number(2)?.unwrap_or(min);
            (start, number(3)?.unwrap_or(start))
        };
        let step = number(4)?.unwrap_or(1);

        if start < min || end > max {
            return Err(format!("{name} value out of range {min}-{max} in '{item}'"));
        }
        if start > end {
            return Err(format!("{name} range '{item}' is reversed"));
        }
        if step == 0 {
            return Err(format!("{name} step must be positive in '{item}'"));
        }

        for value in (start..=end).step_by(step as usize) {
            set |= 1u64 << value;
        }
    }
    Ok(set)
}
