//! Recurrence rules and lookahead of upcoming execution instants.
//!
//! Supports standard cron expressions, extended 6-field cron (with seconds),
//! shortcuts (@daily, @hourly, etc.), and interval expressions (@every).
//! Every instant produced here has whole-second resolution.

use chrono::{DateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when parsing or using schedules.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// Invalid cron expression.
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid interval expression.
    #[error("invalid interval expression: {0}")]
    InvalidInterval(String),

    /// Invalid timezone.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// No more occurrences.
    #[error("no more occurrences")]
    NoMoreOccurrences,
}

/// Source of upcoming execution instants for a job.
///
/// Implementations must be pure: the same rule and reference instant always
/// yield the same ascending sequence, each instant strictly after `after`
/// and truncated to whole seconds.
pub trait Recurrence: Send + Sync + fmt::Debug {
    /// Get the next `n` occurrences strictly after `after`.
    fn next_n_after(
        &self,
        after: DateTime<Utc>,
        n: usize,
    ) -> Result<Vec<DateTime<Utc>>, ScheduleError>;

    /// Get the next occurrence strictly after `after`.
    fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        self.next_n_after(after, 1)?
            .into_iter()
            .next()
            .ok_or(ScheduleError::NoMoreOccurrences)
    }
}

/// A schedule for job execution.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// The original expression string.
    expression: String,
    /// The timezone for this schedule.
    timezone: Tz,
    /// Parsed schedule type.
    schedule_type: ScheduleType,
}

#[derive(Debug, Clone)]
enum ScheduleType {
    /// Standard cron schedule.
    Cron(Box<CronSchedule>),
    /// Fixed period, aligned to multiples of the period since the Unix epoch.
    Interval(Duration),
}

impl Schedule {
    /// Create a new schedule from a cron expression.
    ///
    /// Supports:
    /// - Standard 5-field cron: `minute hour day month weekday`
    /// - Extended 6-field cron: `second minute hour day month weekday`
    /// - Shortcuts: `@yearly`, `@monthly`, `@weekly`, `@daily`, `@hourly`
    /// - Intervals: `@every 5s`, `@every 1h30m`
    pub fn new(expression: impl Into<String>) -> Result<Self, ScheduleError> {
        Self::with_timezone(expression, "UTC")
    }

    /// Create a new schedule with a specific timezone.
    pub fn with_timezone(
        expression: impl Into<String>,
        timezone: impl AsRef<str>,
    ) -> Result<Self, ScheduleError> {
        let expression = expression.into();
        let timezone = timezone.as_ref();

        let tz = timezone
            .parse::<Tz>()
            .map_err(|_| ScheduleError::InvalidTimezone(timezone.to_string()))?;

        let schedule_type = Self::parse_expression(&expression)?;

        Ok(Self {
            expression,
            timezone: tz,
            schedule_type,
        })
    }

    /// Schedule firing every `period`, which must be at least one whole second.
    pub fn every(period: Duration) -> Result<Self, ScheduleError> {
        let secs = period.as_secs();
        if secs == 0 || period.subsec_nanos() != 0 {
            return Err(ScheduleError::InvalidInterval(format!("{:?}", period)));
        }
        Ok(Self {
            expression: format!("@every {}s", secs),
            timezone: Tz::UTC,
            schedule_type: ScheduleType::Interval(period),
        })
    }

    fn parse_expression(expression: &str) -> Result<ScheduleType, ScheduleError> {
        let trimmed = expression.trim();

        if trimmed.starts_with('@') {
            return Self::parse_shortcut(trimmed);
        }

        Self::parse_cron(trimmed)
    }

    fn parse_shortcut(expression: &str) -> Result<ScheduleType, ScheduleError> {
        let lowered = expression.to_lowercase();
        match lowered.as_str() {
            "@yearly" | "@annually" => Self::parse_cron("0 0 1 1 *"),
            "@monthly" => Self::parse_cron("0 0 1 * *"),
            "@weekly" => Self::parse_cron("0 0 * * SUN"),
            "@daily" | "@midnight" => Self::parse_cron("0 0 * * *"),
            "@hourly" => Self::parse_cron("0 * * * *"),
            s => match s.strip_prefix("@every ") {
                Some(interval) => Self::parse_duration(interval.trim()).map(ScheduleType::Interval),
                None => Err(ScheduleError::InvalidCron(format!(
                    "unknown shortcut: {}",
                    expression
                ))),
            },
        }
    }

    /// Parse a duration string like "5s", "5m", "1h30m", "1d".
    fn parse_duration(s: &str) -> Result<Duration, ScheduleError> {
        let invalid = || ScheduleError::InvalidInterval(s.to_string());
        let mut total_secs: u64 = 0;
        let mut current_num = String::new();

        for c in s.chars() {
            if c.is_ascii_digit() {
                current_num.push(c);
                continue;
            }

            let num: u64 = current_num.parse().map_err(|_| invalid())?;
            current_num.clear();

            let unit = match c {
                's' => 1,
                'm' => 60,
                'h' => 3_600,
                'd' => 86_400,
                _ => return Err(invalid()),
            };
            total_secs = num
                .checked_mul(unit)
                .and_then(|secs| total_secs.checked_add(secs))
                .ok_or_else(invalid)?;
        }

        // Trailing digits without a unit ("@every 5") are rejected.
        if !current_num.is_empty() || total_secs == 0 {
            return Err(invalid());
        }

        Ok(Duration::from_secs(total_secs))
    }

    fn parse_cron(expression: &str) -> Result<ScheduleType, ScheduleError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();

        let cron_expr = match fields.len() {
            5 => format!("0 {}", expression),
            6 => expression.to_string(),
            _ => {
                return Err(ScheduleError::InvalidCron(format!(
                    "expected 5 or 6 fields, got {}",
                    fields.len()
                )));
            }
        };

        let schedule = CronSchedule::from_str(&cron_expr)
            .map_err(|e| ScheduleError::InvalidCron(e.to_string()))?;

        Ok(ScheduleType::Cron(Box::new(schedule)))
    }

    /// Get the next occurrence from now.
    pub fn next(&self) -> Result<DateTime<Utc>, ScheduleError> {
        self.next_after(Utc::now())
    }

    /// Get the next N occurrences from now.
    pub fn next_n(&self, n: usize) -> Result<Vec<DateTime<Utc>>, ScheduleError> {
        self.next_n_after(Utc::now(), n)
    }

    /// Get the original expression string.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Get the timezone name.
    pub fn timezone(&self) -> &str {
        self.timezone.name()
    }

    /// Period of an interval schedule; `None` for cron schedules.
    pub fn period(&self) -> Option<Duration> {
        match &self.schedule_type {
            ScheduleType::Interval(period) => Some(*period),
            ScheduleType::Cron(_) => None,
        }
    }

    fn interval_occurrences(
        period: Duration,
        after: DateTime<Utc>,
        n: usize,
    ) -> Result<Vec<DateTime<Utc>>, ScheduleError> {
        let period_ms = i64::try_from(period.as_millis())
            .map_err(|_| ScheduleError::InvalidInterval(format!("{:?}", period)))?;
        let slot = after.timestamp_millis().div_euclid(period_ms);

        (1..=n)
            .map(|k| {
                let k = i64::try_from(k).map_err(|_| ScheduleError::NoMoreOccurrences)?;
                slot.checked_add(k)
                    .and_then(|s| s.checked_mul(period_ms))
                    .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
                    .ok_or(ScheduleError::NoMoreOccurrences)
            })
            .collect()
    }
}

impl Recurrence for Schedule {
    fn next_n_after(
        &self,
        after: DateTime<Utc>,
        n: usize,
    ) -> Result<Vec<DateTime<Utc>>, ScheduleError> {
        match &self.schedule_type {
            ScheduleType::Cron(schedule) => {
                let local_time = after.with_timezone(&self.timezone);
                let occurrences: Vec<_> = schedule
                    .after(&local_time)
                    .take(n)
                    .map(|dt| truncate_to_second(dt.with_timezone(&Utc)))
                    .collect();
                if occurrences.len() < n {
                    return Err(ScheduleError::NoMoreOccurrences);
                }
                Ok(occurrences)
            }
            ScheduleType::Interval(period) => Self::interval_occurrences(*period, after, n),
        }
    }
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.timezone == Tz::UTC {
            write!(f, "{}", self.expression)
        } else {
            write!(f, "{} ({})", self.expression, self.timezone.name())
        }
    }
}

/// Zero the sub-second component of an instant.
pub fn truncate_to_second(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.with_nanosecond(0).unwrap_or(instant)
}
