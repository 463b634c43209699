//! Cron expression parsing and next occurrence calculation.
//!
//! Expressions use the seconds-first layout
//! `second minute hour day-of-month month day-of-week [year]`.
//! `?` ("no specific value") is accepted in any field. Standard 5-field
//! expressions get a leading `0` seconds field, and the shortcuts
//! `@yearly`, `@monthly`, `@weekly`, `@daily` and `@hourly` are expanded.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur when parsing cron expressions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// Invalid cron expression.
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    /// Invalid timezone.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// A parsed cron expression evaluated in a fixed timezone.
#[derive(Debug, Clone)]
pub struct CronExpression {
    /// The expression as given by the caller.
    expression: String,
    timezone: Tz,
    schedule: Box<CronSchedule>,
}

impl CronExpression {
    /// Parse an expression evaluated in UTC.
    pub fn new(expression: impl Into<String>) -> Result<Self, ScheduleError> {
        Self::with_timezone(expression, Tz::UTC)
    }

    /// Parse an expression evaluated in `timezone`.
    pub fn with_timezone(expression: impl Into<String>, timezone: Tz) -> Result<Self, ScheduleError> {
        let expression = expression.into();
        let normalized = normalize(&expression)?;
        let schedule = CronSchedule::from_str(&normalized).map_err(|e| ScheduleError::InvalidCron {
            expression: expression.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            expression,
            timezone,
            schedule: Box::new(schedule),
        })
    }

    /// Parse with a timezone given by IANA name.
    pub fn with_timezone_name(
        expression: impl Into<String>,
        timezone: &str,
    ) -> Result<Self, ScheduleError> {
        let tz = parse_timezone(timezone)?;
        Self::with_timezone(expression, tz)
    }

    /// First occurrence strictly after `after`, or `None` when the
    /// expression has no further occurrences.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&self.timezone);
        self.schedule
            .after(&local)
            .next()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Get the original expression string.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

impl PartialEq for CronExpression {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression && self.timezone == other.timezone
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz, ScheduleError> {
    name.parse::<Tz>()
        .map_err(|_| ScheduleError::InvalidTimezone(name.to_string()))
}

fn normalize(expression: &str) -> Result<String, ScheduleError> {
    let trimmed = expression.trim();
    if trimmed.is_empty() {
        return Err(invalid(expression, "expression is blank"));
    }

    if trimmed.starts_with('@') {
        return match trimmed.to_lowercase().as_str() {
            "@yearly" | "@annually" => Ok("0 0 0 1 1 *".to_string()),
            "@monthly" => Ok("0 0 0 1 * *".to_string()),
            "@weekly" => Ok("0 0 0 * * SUN".to_string()),
            "@daily" | "@midnight" => Ok("0 0 0 * * *".to_string()),
            "@hourly" => Ok("0 0 * * * *".to_string()),
            _ => Err(invalid(expression, "unknown shortcut")),
        };
    }

    let fields: Vec<&str> = trimmed
        .split_whitespace()
        .map(|f| if f == "?" { "*" } else { f })
        .collect();

    match fields.len() {
        5 => Ok(format!("0 {}", fields.join(" "))),
        6 | 7 => Ok(fields.join(" ")),
        n => Err(invalid(
            expression,
            &format!("expected 5, 6 or 7 fields, got {n}"),
        )),
    }
}

fn invalid(expression: &str, reason: &str) -> ScheduleError {
    ScheduleError::InvalidCron {
        expression: expression.to_string(),
        reason: reason.to_string(),
    }
}
