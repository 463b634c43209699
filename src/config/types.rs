//! Configuration file types.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::schedule::parse_timezone;
use crate::core::trigger::TriggerSpec;
use crate::core::types::{JobIdentity, JobKind};

use super::error::ConfigError;

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_misfire_threshold_secs() -> u64 {
    60
}

/// Scheduler configuration (cadence.yaml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Reference timezone for weekly patterns and date formatting.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Misfire policy names per trigger family.
    #[serde(default)]
    pub misfire: MisfireConfig,
    /// How far a fire time may lag before it counts as misfired.
    #[serde(default = "default_misfire_threshold_secs")]
    pub misfire_threshold_secs: u64,
    /// Jobs to register at startup.
    #[serde(default)]
    pub jobs: Vec<JobDefinition>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            misfire: MisfireConfig::default(),
            misfire_threshold_secs: default_misfire_threshold_secs(),
            jobs: Vec::new(),
        }
    }
}

impl SchedulerConfig {
    /// Parse the configured timezone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        parse_timezone(&self.timezone).map_err(ConfigError::InvalidTimezone)
    }

    pub fn misfire_threshold(&self) -> chrono::Duration {
        i64::try_from(self.misfire_threshold_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::TimeDelta::MAX)
    }
}

/// Misfire policy names, as accepted by the policy resolver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MisfireConfig {
    /// `do_nothing`, `fire_once_now` or `ignore`.
    pub cron: Option<String>,
    /// `fire_now`, `ignore` or one of the `reschedule_*` names.
    pub repeating: Option<String>,
}

/// One job to register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Event subject delivered when the job fires.
    pub subject: String,
    /// Caller-supplied id, unique per subject and kind.
    pub job_id: String,
    #[serde(default)]
    pub parameters: HashMap<String, serde_yaml::Value>,
    pub schedule: TriggerSpec,
}

impl JobDefinition {
    pub fn kind(&self) -> JobKind {
        self.schedule.kind()
    }

    /// Identity the job registers under.
    pub fn identity(&self) -> Result<JobIdentity, ConfigError> {
        Ok(JobIdentity::new(&self.subject, &self.job_id, self.kind())?)
    }
}
