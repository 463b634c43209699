//! Scheduler type definitions.
//!
//! Error type shared by the scheduling and query engines, plus the
//! summaries the query engine derives from trigger state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::payload::EventPayload;
use crate::core::trigger::TriggerError;
use crate::core::types::{IdentityError, JobKind};
use crate::storage::{StorageError, TriggerState};

/// Errors that can occur in the scheduler.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchedulerError {
    /// A required input is blank or out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A cron expression failed to parse.
    #[error("invalid trigger expression: {0}")]
    InvalidTriggerExpression(String),

    /// No trigger is stored under the key.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// The stored trigger is not cron-shaped.
    #[error("job {key} is not a cron job")]
    WrongTriggerType { key: String },

    /// A run-once job was requested for a time already past.
    #[error("fire time {fire_time} is before now ({now})")]
    PastStartTime {
        fire_time: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    /// The trigger store failed.
    #[error("scheduling failure: {0}")]
    SchedulingFailure(#[from] StorageError),
}

impl From<TriggerError> for SchedulerError {
    fn from(e: TriggerError) -> Self {
        match e {
            TriggerError::InvalidArgument(msg) => SchedulerError::InvalidArgument(msg),
            TriggerError::InvalidExpression(e) => SchedulerError::InvalidTriggerExpression(e.to_string()),
            TriggerError::PastStartTime { fire_time, now } => {
                SchedulerError::PastStartTime { fire_time, now }
            }
        }
    }
}

impl From<IdentityError> for SchedulerError {
    fn from(e: IdentityError) -> Self {
        SchedulerError::InvalidArgument(e.to_string())
    }
}

/// Where a job stands relative to its activity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobActivity {
    NotStarted,
    Active,
    Finished,
}

impl fmt::Display for JobActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobActivity::NotStarted => "NOT_STARTED",
            JobActivity::Active => "ACTIVE",
            JobActivity::Finished => "FINISHED",
        };
        f.pad(s)
    }
}

/// Health of a job as reported by the trigger store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Ok,
    Paused,
    Blocked,
    Error,
}

impl From<TriggerState> for JobStatus {
    fn from(state: TriggerState) -> Self {
        match state {
            TriggerState::Error => JobStatus::Error,
            TriggerState::Blocked => JobStatus::Blocked,
            TriggerState::Paused => JobStatus::Paused,
            TriggerState::Normal | TriggerState::Complete => JobStatus::Ok,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Ok => "OK",
            JobStatus::Paused => "PAUSED",
            JobStatus::Blocked => "BLOCKED",
            JobStatus::Error => "ERROR",
        };
        f.pad(s)
    }
}

/// One row of the job listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobBasicInfo {
    pub activity: JobActivity,
    pub status: JobStatus,
    /// The job key.
    pub name: String,
    pub start_date: String,
    pub next_fire_date: String,
    pub end_date: String,
    pub job_type: JobKind,
    /// Repeat progress, cron expression or `-`.
    pub info: String,
}

/// Payloads of the triggers stored under one job name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobDetailedInfo {
    pub event_infos: Vec<EventPayload>,
}
