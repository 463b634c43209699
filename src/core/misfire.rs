//! Misfire policies and their resolution from configuration.
//!
//! A misfire is a fire time that elapsed without the trigger store
//! processing it in time. Cron-shaped and interval-shaped triggers have
//! distinct vocabularies. Configured names are resolved case-insensitively;
//! anything unrecognized falls back to the family default.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Settings key for the cron-family policy.
pub const CRON_MISFIRE_POLICY_KEY: &str = "scheduler.cron.trigger.misfire.policy";

/// Settings key for the interval-family policy.
pub const REPEATING_MISFIRE_POLICY_KEY: &str = "scheduler.repeating.trigger.misfire.policy";

/// Misfire instructions for cron-shaped triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CronMisfirePolicy {
    /// Skip missed fires and wait for the next occurrence after now.
    DoNothing,
    /// Fire once immediately, then resume the schedule.
    FireOnceNow,
    /// Fire every missed occurrence as soon as possible.
    Ignore,
    /// Store default; behaves as `FireOnceNow`.
    #[default]
    SmartDefault,
}

/// Misfire instructions for interval-shaped triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalMisfirePolicy {
    FireNow,
    Ignore,
    RescheduleNextWithExistingCount,
    RescheduleNextWithRemainingCount,
    #[default]
    RescheduleNowWithExistingCount,
    RescheduleNowWithRemainingCount,
}

/// Error for a name that is not part of a policy vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown misfire policy: {0}")]
pub struct UnknownPolicy(pub String);

impl FromStr for CronMisfirePolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "do_nothing" => Ok(Self::DoNothing),
            "fire_once_now" => Ok(Self::FireOnceNow),
            "ignore" => Ok(Self::Ignore),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

impl FromStr for IntervalMisfirePolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fire_now" => Ok(Self::FireNow),
            "ignore" => Ok(Self::Ignore),
            "reschedule_next_with_existing_count" => Ok(Self::RescheduleNextWithExistingCount),
            "reschedule_next_with_remaining_count" => Ok(Self::RescheduleNextWithRemainingCount),
            "reschedule_now_with_existing_count" => Ok(Self::RescheduleNowWithExistingCount),
            "reschedule_now_with_remaining_count" => Ok(Self::RescheduleNowWithRemainingCount),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for CronMisfirePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DoNothing => "do_nothing",
            Self::FireOnceNow => "fire_once_now",
            Self::Ignore => "ignore",
            Self::SmartDefault => "smart_default",
        };
        f.write_str(s)
    }
}

impl fmt::Display for IntervalMisfirePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FireNow => "fire_now",
            Self::Ignore => "ignore",
            Self::RescheduleNextWithExistingCount => "reschedule_next_with_existing_count",
            Self::RescheduleNextWithRemainingCount => "reschedule_next_with_remaining_count",
            Self::RescheduleNowWithExistingCount => "reschedule_now_with_existing_count",
            Self::RescheduleNowWithRemainingCount => "reschedule_now_with_remaining_count",
        };
        f.write_str(s)
    }
}

/// The trigger family a policy applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerFamily {
    Cron,
    Interval,
}

impl TriggerFamily {
    /// Settings key holding this family's policy name.
    pub fn settings_key(&self) -> &'static str {
        match self {
            TriggerFamily::Cron => CRON_MISFIRE_POLICY_KEY,
            TriggerFamily::Interval => REPEATING_MISFIRE_POLICY_KEY,
        }
    }
}

/// A resolved policy of either family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MisfirePolicy {
    Cron(CronMisfirePolicy),
    Interval(IntervalMisfirePolicy),
}

impl MisfirePolicy {
    /// Resolve a configured name for `family`. Missing or unrecognized
    /// names give the family default.
    pub fn resolve(family: TriggerFamily, configured: Option<&str>) -> Self {
        match family {
            TriggerFamily::Cron => MisfirePolicy::Cron(
                configured
                    .and_then(|name| name.parse().ok())
                    .unwrap_or_default(),
            ),
            TriggerFamily::Interval => MisfirePolicy::Interval(
                configured
                    .and_then(|name| name.parse().ok())
                    .unwrap_or_default(),
            ),
        }
    }

    pub fn family(&self) -> TriggerFamily {
        match self {
            MisfirePolicy::Cron(_) => TriggerFamily::Cron,
            MisfirePolicy::Interval(_) => TriggerFamily::Interval,
        }
    }
}

impl fmt::Display for MisfirePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MisfirePolicy::Cron(p) => p.fmt(f),
            MisfirePolicy::Interval(p) => p.fmt(f),
        }
    }
}
