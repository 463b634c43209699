//! Trigger model: caller-facing specs and the materialized triggers built
//! from them.
//!
//! A [`TriggerSpec`] is what a caller asks for. [`TriggerSpec::build`]
//! validates it, lowers weekly patterns to cron, applies the configured
//! misfire instruction and then the past-fire adjustment, producing a
//! [`Trigger`] whose fire times are computed purely from its own fields.
//!
//! Fire-time rules per shape:
//!
//! - cron: first occurrence at or after the start time; end time inclusive.
//! - simple (interval): `start + n * interval` for `n` in `0..=repeat_count`;
//!   end time exclusive.
//! - calendar interval: `start + n * interval` in whole seconds, unbounded
//!   count; end time inclusive.

use crate::core::misfire::{CronMisfirePolicy, IntervalMisfirePolicy, MisfirePolicy, TriggerFamily};
use crate::core::schedule::{CronExpression, ScheduleError};
use crate::core::types::JobKind;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Repeat count stored for repeating jobs registered without one.
pub const MAX_REPEAT_COUNT: u32 = 999_999;

/// Errors raised while building a trigger.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TriggerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    InvalidExpression(#[from] ScheduleError),

    #[error("fire time {fire_time} is before now ({now})")]
    PastStartTime {
        fire_time: DateTime<Utc>,
        now: DateTime<Utc>,
    },
}

// ---------------------------------------------------------------------------
// Specs
// ---------------------------------------------------------------------------

/// A requested schedule, one variant per job kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerSpec {
    Cron(CronSpec),
    Repeating(RepeatingSpec),
    #[serde(rename = "run_once")]
    OneShot(OneShotSpec),
    #[serde(rename = "weekly")]
    WeeklyPattern(WeeklyPatternSpec),
}

/// Cron recurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CronSpec {
    pub expression: String,
    /// Defaults to the time of scheduling.
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub skip_past_fires_at_start: bool,
}

impl CronSpec {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            start_time: None,
            end_time: None,
            skip_past_fires_at_start: false,
        }
    }

    pub fn with_start_time(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    pub fn with_end_time(mut self, end: DateTime<Utc>) -> Self {
        self.end_time = Some(end);
        self
    }

    pub fn with_skip_past_fires(mut self, skip: bool) -> Self {
        self.skip_past_fires_at_start = skip;
        self
    }
}

/// Fixed interval repetition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatingSpec {
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Repeats after the first fire. `None` repeats (almost) forever.
    #[serde(default)]
    pub repeat_count: Option<u32>,
    pub interval_millis: u64,
    /// Keep the original fire grid after a misfire, in whole seconds.
    #[serde(default)]
    pub use_calendar_interval: bool,
    #[serde(default)]
    pub skip_past_fires_at_start: bool,
}

impl RepeatingSpec {
    pub fn new(start_time: DateTime<Utc>, interval_millis: u64) -> Self {
        Self {
            start_time,
            end_time: None,
            repeat_count: None,
            interval_millis,
            use_calendar_interval: false,
            skip_past_fires_at_start: false,
        }
    }

    pub fn with_end_time(mut self, end: DateTime<Utc>) -> Self {
        self.end_time = Some(end);
        self
    }

    pub fn with_repeat_count(mut self, count: u32) -> Self {
        self.repeat_count = Some(count);
        self
    }

    pub fn with_calendar_interval(mut self, enabled: bool) -> Self {
        self.use_calendar_interval = enabled;
        self
    }

    pub fn with_skip_past_fires(mut self, skip: bool) -> Self {
        self.skip_past_fires_at_start = skip;
        self
    }
}

/// A single future instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OneShotSpec {
    pub fire_time: DateTime<Utc>,
}

impl OneShotSpec {
    pub fn new(fire_time: DateTime<Utc>) -> Self {
        Self { fire_time }
    }
}

/// Wall-clock time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: u32,
    pub minute: u32,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Self {
        Self { hour, minute }
    }
}

/// Fire at a time of day on selected weekdays, between two dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyPatternSpec {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days_of_week: Vec<Weekday>,
    pub time_of_day: TimeOfDay,
    #[serde(default)]
    pub skip_past_fires_at_start: bool,
}

impl WeeklyPatternSpec {
    pub fn new(
        start_date: NaiveDate,
        end_date: NaiveDate,
        days_of_week: impl IntoIterator<Item = Weekday>,
        time_of_day: TimeOfDay,
    ) -> Self {
        Self {
            start_date,
            end_date,
            days_of_week: days_of_week.into_iter().collect(),
            time_of_day,
            skip_past_fires_at_start: false,
        }
    }

    pub fn with_skip_past_fires(mut self, skip: bool) -> Self {
        self.skip_past_fires_at_start = skip;
        self
    }

    /// Equivalent cron expression, days in Monday-first order.
    pub fn cron_expression(&self) -> Result<String, TriggerError> {
        if self.days_of_week.is_empty() {
            return Err(TriggerError::InvalidArgument(
                "weekly pattern needs at least one day".into(),
            ));
        }
        let TimeOfDay { hour, minute } = self.time_of_day;
        if hour > 23 || minute > 59 {
            return Err(TriggerError::InvalidArgument(format!(
                "invalid time of day {hour:02}:{minute:02}"
            )));
        }

        let mut days = self.days_of_week.clone();
        days.sort_by_key(|d| d.num_days_from_monday());
        days.dedup();
        let days: Vec<String> = days
            .iter()
            .map(|d| d.to_string().to_uppercase())
            .collect();

        Ok(format!("0 {minute} {hour} ? * {}", days.join(",")))
    }

    /// Lower to the equivalent cron spec, dates at midnight in `tz`.
    pub fn lower(&self, tz: Tz) -> Result<CronSpec, TriggerError> {
        if self.end_date < self.start_date {
            return Err(TriggerError::InvalidArgument(format!(
                "end date {} is before start date {}",
                self.end_date, self.start_date
            )));
        }
        Ok(CronSpec {
            expression: self.cron_expression()?,
            start_time: Some(midnight(self.start_date, tz)?),
            end_time: Some(midnight(self.end_date, tz)?),
            skip_past_fires_at_start: self.skip_past_fires_at_start,
        })
    }
}

fn midnight(date: NaiveDate, tz: Tz) -> Result<DateTime<Utc>, TriggerError> {
    tz.from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| TriggerError::InvalidArgument(format!("{date} has no midnight in {tz}")))
}

/// Inputs from the environment that a build depends on.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext {
    pub now: DateTime<Utc>,
    pub timezone: Tz,
    pub cron_policy: CronMisfirePolicy,
    pub interval_policy: IntervalMisfirePolicy,
}

impl BuildContext {
    pub fn new(now: DateTime<Utc>, timezone: Tz) -> Self {
        Self {
            now,
            timezone,
            cron_policy: CronMisfirePolicy::default(),
            interval_policy: IntervalMisfirePolicy::default(),
        }
    }

    pub fn with_policies(mut self, cron: CronMisfirePolicy, interval: IntervalMisfirePolicy) -> Self {
        self.cron_policy = cron;
        self.interval_policy = interval;
        self
    }

    /// Set the policy of whichever family `policy` belongs to.
    pub fn with_policy(mut self, policy: MisfirePolicy) -> Self {
        match policy {
            MisfirePolicy::Cron(p) => self.cron_policy = p,
            MisfirePolicy::Interval(p) => self.interval_policy = p,
        }
        self
    }

    fn policy(&self, family: TriggerFamily) -> MisfirePolicy {
        match family {
            TriggerFamily::Cron => MisfirePolicy::Cron(self.cron_policy),
            TriggerFamily::Interval => MisfirePolicy::Interval(self.interval_policy),
        }
    }
}

impl TriggerSpec {
    /// Validate and materialize this spec.
    pub fn build(&self, ctx: &BuildContext) -> Result<Trigger, TriggerError> {
        match self {
            TriggerSpec::Cron(spec) => build_cron(spec, ctx),
            TriggerSpec::WeeklyPattern(spec) => build_cron(&spec.lower(ctx.timezone)?, ctx),
            TriggerSpec::Repeating(spec) => build_repeating(spec, ctx),
            TriggerSpec::OneShot(spec) => build_one_shot(spec, ctx),
        }
    }

    /// Job kind the spec registers under. Weekly patterns are cron jobs.
    pub fn kind(&self) -> JobKind {
        match self {
            TriggerSpec::Cron(_) | TriggerSpec::WeeklyPattern(_) => JobKind::Cron,
            TriggerSpec::Repeating(_) => JobKind::Repeating,
            TriggerSpec::OneShot(_) => JobKind::RunOnce,
        }
    }

    /// Whether the past-fire adjustment is requested.
    pub fn skip_past_fires_at_start(&self) -> bool {
        match self {
            TriggerSpec::Cron(s) => s.skip_past_fires_at_start,
            TriggerSpec::Repeating(s) => s.skip_past_fires_at_start,
            TriggerSpec::OneShot(_) => false,
            TriggerSpec::WeeklyPattern(s) => s.skip_past_fires_at_start,
        }
    }
}

fn check_window(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Result<(), TriggerError> {
    match end {
        Some(end) if end < start => Err(TriggerError::InvalidArgument(format!(
            "end time {end} is before start time {start}"
        ))),
        _ => Ok(()),
    }
}

fn build_cron(spec: &CronSpec, ctx: &BuildContext) -> Result<Trigger, TriggerError> {
    if spec.expression.trim().is_empty() {
        return Err(TriggerError::InvalidArgument(
            "cron expression cannot be blank".into(),
        ));
    }
    let expression = CronExpression::with_timezone(spec.expression.trim(), ctx.timezone)?;
    let start = spec.start_time.unwrap_or(ctx.now);
    check_window(start, spec.end_time)?;

    let builder = TriggerBuilder::new(
        TriggerSchedule::Cron {
            expression,
            misfire: CronMisfirePolicy::default(),
        },
        start,
    )
    .end_at(spec.end_time)
    .with_misfire_policy(ctx.policy(TriggerFamily::Cron));

    finish(builder, spec.skip_past_fires_at_start, ctx.now)
}

fn build_repeating(spec: &RepeatingSpec, ctx: &BuildContext) -> Result<Trigger, TriggerError> {
    if spec.interval_millis == 0 {
        return Err(TriggerError::InvalidArgument(
            "repeat interval cannot be 0".into(),
        ));
    }
    let mut end_time = spec.end_time;

    let builder = if spec.use_calendar_interval {
        let interval_secs = spec.interval_millis / 1000;
        if interval_secs == 0 {
            return Err(TriggerError::InvalidArgument(format!(
                "calendar interval must be at least one second, got {}ms",
                spec.interval_millis
            )));
        }
        if let Some(count) = spec.repeat_count {
            // Half an interval past the last wanted fire bounds the count.
            let span = spec
                .interval_millis
                .saturating_mul(u64::from(count))
                .saturating_add(spec.interval_millis / 2);
            end_time = Some(
                spec.start_time
                    .checked_add_signed(millis(span)?)
                    .ok_or_else(|| TriggerError::InvalidArgument(format!(
                        "repeat window of {span}ms is out of range"
                    )))?,
            );
        }
        TriggerBuilder::new(TriggerSchedule::CalendarInterval { interval_secs }, spec.start_time)
    } else {
        TriggerBuilder::new(
            TriggerSchedule::Simple {
                interval_ms: spec.interval_millis,
                repeat_count: spec.repeat_count.unwrap_or(MAX_REPEAT_COUNT),
                misfire: IntervalMisfirePolicy::default(),
            },
            spec.start_time,
        )
        .with_misfire_policy(ctx.policy(TriggerFamily::Interval))
    };
    check_window(spec.start_time, end_time)?;

    finish(builder.end_at(end_time), spec.skip_past_fires_at_start, ctx.now)
}

fn build_one_shot(spec: &OneShotSpec, ctx: &BuildContext) -> Result<Trigger, TriggerError> {
    if spec.fire_time < ctx.now {
        return Err(TriggerError::PastStartTime {
            fire_time: spec.fire_time,
            now: ctx.now,
        });
    }
    Ok(TriggerBuilder::new(
        TriggerSchedule::Simple {
            interval_ms: 0,
            repeat_count: 0,
            misfire: IntervalMisfirePolicy::FireNow,
        },
        spec.fire_time,
    )
    .build())
}

fn finish(builder: TriggerBuilder, skip: bool, now: DateTime<Utc>) -> Result<Trigger, TriggerError> {
    if skip && builder.start_time < now {
        Ok(skip_past_fires(builder, now))
    } else {
        Ok(builder.build())
    }
}

/// Move the start of `builder` past every fire that already elapsed.
///
/// The new start is the first fire strictly after `now` on the original
/// trigger, or `now` itself when the trigger is exhausted. Simple triggers
/// lose one repeat per elapsed fire so the total stays as requested.
pub fn skip_past_fires(builder: TriggerBuilder, now: DateTime<Utc>) -> Trigger {
    let original = builder.clone().build();
    let new_start = original.fire_time_after(now).unwrap_or(now);

    let mut builder = builder.start_at(new_start);
    if let TriggerSchedule::Simple {
        interval_ms,
        repeat_count,
        ..
    } = &mut builder.schedule
        && *repeat_count != MAX_REPEAT_COUNT
    {
        let until = original.end_time.map_or(now, |end| end.min(now));
        let skipped = simple_fires_before(original.start_time, *interval_ms, *repeat_count, until);
        *repeat_count = repeat_count.saturating_sub(skipped);
    }
    builder.build()
}

/// Fires of a simple grid that land strictly before `until`.
fn simple_fires_before(
    start: DateTime<Utc>,
    interval_ms: u64,
    repeat_count: u32,
    until: DateTime<Utc>,
) -> u32 {
    if until <= start {
        return 0;
    }
    let span = until - start;
    let whole_ms = span.num_milliseconds();
    let interval = i64::try_from(interval_ms).unwrap_or(i64::MAX).max(1);
    // Index of the last grid slot before `until`.
    let last = if Duration::try_milliseconds(whole_ms) == Some(span) {
        (whole_ms - 1) / interval
    } else {
        whole_ms / interval
    };
    u32::try_from(last.saturating_add(1))
        .unwrap_or(u32::MAX)
        .min(repeat_count.saturating_add(1))
}

fn millis(ms: u64) -> Result<Duration, TriggerError> {
    i64::try_from(ms)
        .ok()
        .and_then(Duration::try_milliseconds)
        .ok_or_else(|| TriggerError::InvalidArgument(format!("interval {ms}ms is too large")))
}

// ---------------------------------------------------------------------------
// Materialized triggers
// ---------------------------------------------------------------------------

/// Recurrence rule of a materialized trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerSchedule {
    Cron {
        expression: CronExpression,
        misfire: CronMisfirePolicy,
    },
    Simple {
        interval_ms: u64,
        /// Repeats after the first fire.
        repeat_count: u32,
        misfire: IntervalMisfirePolicy,
    },
    /// Whole-second grid anchored at the start time. Misfires fire once
    /// now and then continue on the original grid.
    CalendarInterval { interval_secs: u64 },
}

/// A fully specified trigger as held by the trigger store.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    schedule: TriggerSchedule,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
}

impl Trigger {
    pub fn schedule(&self) -> &TriggerSchedule {
        &self.schedule
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn family(&self) -> TriggerFamily {
        match self.schedule {
            TriggerSchedule::Cron { .. } => TriggerFamily::Cron,
            TriggerSchedule::Simple { .. } | TriggerSchedule::CalendarInterval { .. } => {
                TriggerFamily::Interval
            }
        }
    }

    pub fn cron_expression(&self) -> Option<&CronExpression> {
        match &self.schedule {
            TriggerSchedule::Cron { expression, .. } => Some(expression),
            _ => None,
        }
    }

    /// Repeat count of a simple trigger.
    pub fn repeat_count(&self) -> Option<u32> {
        match self.schedule {
            TriggerSchedule::Simple { repeat_count, .. } => Some(repeat_count),
            _ => None,
        }
    }

    /// Whether the trigger has a finite number of fires.
    pub fn is_bounded(&self) -> bool {
        self.end_time.is_some() || self.repeat_count().is_some_and(|c| c != MAX_REPEAT_COUNT)
    }

    pub fn to_builder(&self) -> TriggerBuilder {
        TriggerBuilder {
            schedule: self.schedule.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }

    /// The first fire time of the trigger.
    pub fn first_fire_time(&self) -> Option<DateTime<Utc>> {
        self.fire_time_after(self.start_time - Duration::milliseconds(1))
    }

    /// The first fire time strictly after `after`.
    pub fn fire_time_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match &self.schedule {
            TriggerSchedule::Cron { expression, .. } => self.cron_fire_time_after(expression, after),
            TriggerSchedule::Simple {
                interval_ms,
                repeat_count,
                ..
            } => self.simple_fire_time_after(*interval_ms, *repeat_count, after),
            TriggerSchedule::CalendarInterval { interval_secs } => {
                self.calendar_fire_time_after(*interval_secs, after)
            }
        }
    }

    fn cron_fire_time_after(
        &self,
        expression: &CronExpression,
        after: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let after = if self.start_time > after {
            self.start_time - Duration::seconds(1)
        } else {
            after
        };
        if self.end_time.is_some_and(|end| after >= end) {
            return None;
        }
        let next = expression.next_after(after)?;
        if self.end_time.is_some_and(|end| next > end) {
            return None;
        }
        Some(next)
    }

    fn simple_fire_time_after(
        &self,
        interval_ms: u64,
        repeat_count: u32,
        after: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if repeat_count == 0 && after >= self.start_time {
            return None;
        }
        if self.end_time.is_some_and(|end| end <= after) {
            return None;
        }
        if after < self.start_time {
            return Some(self.start_time).filter(|t| self.end_time.is_none_or(|end| *t < end));
        }
        let interval = i64::try_from(interval_ms).ok().filter(|i| *i > 0)?;

        let elapsed = (after - self.start_time).num_milliseconds();
        let n = elapsed / interval + 1;
        if n > i64::from(repeat_count) {
            return None;
        }
        let next = self
            .start_time
            .checked_add_signed(Duration::try_milliseconds(n.checked_mul(interval)?)?)?;
        if self.end_time.is_some_and(|end| end <= next) {
            return None;
        }
        Some(next)
    }

    fn calendar_fire_time_after(&self, interval_secs: u64, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.end_time.is_some_and(|end| end <= after) {
            return None;
        }
        if after < self.start_time {
            return Some(self.start_time);
        }
        let interval = i64::try_from(interval_secs).ok().filter(|i| *i > 0)?;

        let secs_after_start = (after - self.start_time).num_seconds() + 1;
        let jumps = (secs_after_start + interval - 1) / interval;
        let next = self
            .start_time
            .checked_add_signed(Duration::try_seconds(jumps.checked_mul(interval)?)?)?;
        if self.end_time.is_some_and(|end| next > end) {
            return None;
        }
        Some(next)
    }

    /// Iterate fire times starting at `from` (inclusive) when it is a fire
    /// time, otherwise at the first fire time after it.
    pub fn fire_times_from(&self, from: Option<DateTime<Utc>>) -> FireTimes<'_> {
        FireTimes {
            trigger: self,
            next: from,
        }
    }

    /// All fire times in `[from, to]`, starting from the first fire time.
    pub fn fire_times_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        self.fire_times_from(self.first_fire_time())
            .skip_while(|t| *t < from)
            .take_while(|t| *t <= to)
            .collect()
    }

    /// All fire times in `[from, until)`.
    pub fn fire_times_in(&self, from: DateTime<Utc>, until: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        self.fire_times_from(self.first_fire_time())
            .skip_while(|t| *t < from)
            .take_while(|t| *t < until)
            .collect()
    }
}

/// Iterator over successive fire times of a trigger.
pub struct FireTimes<'a> {
    trigger: &'a Trigger,
    next: Option<DateTime<Utc>>,
}

impl Iterator for FireTimes<'_> {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.trigger.fire_time_after(current);
        Some(current)
    }
}

/// Mutable trigger definition.
#[derive(Debug, Clone)]
pub struct TriggerBuilder {
    schedule: TriggerSchedule,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
}

impl TriggerBuilder {
    pub fn new(schedule: TriggerSchedule, start_time: DateTime<Utc>) -> Self {
        Self {
            schedule,
            start_time,
            end_time: None,
        }
    }

    pub fn start_at(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = start;
        self
    }

    pub fn end_at(mut self, end: Option<DateTime<Utc>>) -> Self {
        self.end_time = end;
        self
    }

    /// Replace the schedule's recurrence, keeping the window.
    pub fn with_schedule(mut self, schedule: TriggerSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_repeat_count(mut self, count: u32) -> Self {
        if let TriggerSchedule::Simple { repeat_count, .. } = &mut self.schedule {
            *repeat_count = count;
        }
        self
    }

    /// Set the misfire instruction. Only touches the instruction field, and
    /// only when the policy matches the schedule's family. Calendar interval
    /// schedules keep their fixed instruction.
    pub fn with_misfire_policy(mut self, policy: MisfirePolicy) -> Self {
        match (&mut self.schedule, policy) {
            (TriggerSchedule::Cron { misfire, .. }, MisfirePolicy::Cron(p)) => *misfire = p,
            (TriggerSchedule::Simple { misfire, .. }, MisfirePolicy::Interval(p)) => *misfire = p,
            _ => {}
        }
        self
    }

    pub fn build(self) -> Trigger {
        Trigger {
            schedule: self.schedule,
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}
