//! Trigger store abstraction.
//!
//! The store owns materialized triggers keyed by [`JobKey`], tracks their
//! runtime state and decides when they fire. The scheduling and query
//! engines only talk to it through [`TriggerStore`], so durable backends
//! can be plugged in without touching either.

mod memory;

pub use memory::InMemoryTriggerStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::core::payload::EventPayload;
use crate::core::trigger::Trigger;
use crate::core::types::JobKey;

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The requested item was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A duplicate key was detected.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Storage lock was poisoned.
    #[error("storage lock poisoned")]
    LockPoisoned,

    /// Generic storage error.
    #[error("storage error: {0}")]
    Other(String),
}

/// Runtime state of a stored trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TriggerState {
    /// Waiting for its next fire time.
    Normal,
    /// Suspended; does not fire until resumed.
    Paused,
    /// No further fire times. Kept so it stays queryable.
    Complete,
    /// Its job is currently executing and it may not fire concurrently.
    Blocked,
    /// The store failed to process it.
    Error,
}

/// A trigger as held by a store, with its flattened payload.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTrigger {
    pub key: JobKey,
    pub trigger: Trigger,
    /// Payload parameters plus the event type entry.
    pub parameters: HashMap<String, Value>,
    pub state: TriggerState,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub previous_fire_time: Option<DateTime<Utc>>,
    /// Fires since the job was scheduled.
    pub times_triggered: u32,
}

impl StoredTrigger {
    /// Create a stored trigger positioned at its first fire time.
    pub fn new(key: JobKey, trigger: Trigger, payload: &EventPayload) -> Self {
        let next_fire_time = trigger.first_fire_time();
        Self {
            key,
            trigger,
            parameters: payload.to_job_data(),
            state: if next_fire_time.is_some() {
                TriggerState::Normal
            } else {
                TriggerState::Complete
            },
            next_fire_time,
            previous_fire_time: None,
            times_triggered: 0,
        }
    }

    /// Swap in a new definition, keeping payload and fire count.
    pub fn with_definition(mut self, trigger: Trigger) -> Self {
        self.next_fire_time = trigger.first_fire_time();
        self.trigger = trigger;
        if self.next_fire_time.is_none() {
            self.state = TriggerState::Complete;
        } else if self.state == TriggerState::Complete {
            self.state = TriggerState::Normal;
        }
        self
    }

    /// The payload delivered when this trigger fires.
    pub fn payload(&self) -> EventPayload {
        EventPayload::from_job_data(&self.parameters, self.key.subject_hint())
    }

    /// Upcoming fire times in `[from, to]`, starting at the next fire time.
    pub fn fire_times_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        self.trigger
            .fire_times_from(self.next_fire_time)
            .skip_while(|t| *t < from)
            .take_while(|t| *t <= to)
            .collect()
    }

    /// Fires still to come, or `None` when unbounded.
    pub fn remaining_fires(&self) -> Option<usize> {
        if !self.trigger.is_bounded() {
            return None;
        }
        Some(self.trigger.fire_times_from(self.next_fire_time).count())
    }
}

/// A trigger that came due.
#[derive(Debug, Clone, PartialEq)]
pub struct FiredTrigger {
    pub key: JobKey,
    pub fire_time: DateTime<Utc>,
    pub payload: EventPayload,
}

/// Storage trait for trigger definitions and their firing state.
#[async_trait]
pub trait TriggerStore: Send + Sync {
    /// Store a new trigger. Fails with `DuplicateKey` if the key is taken.
    async fn save_trigger(&self, trigger: StoredTrigger) -> Result<(), StorageError>;

    /// Get a trigger by key.
    async fn get_trigger(&self, key: &JobKey) -> Result<StoredTrigger, StorageError>;

    /// Atomically replace the definition of an existing trigger, keeping
    /// its payload.
    async fn replace_trigger(&self, key: &JobKey, trigger: Trigger) -> Result<(), StorageError>;

    /// Delete a trigger by key.
    async fn delete_trigger(&self, key: &JobKey) -> Result<(), StorageError>;

    /// All keys, sorted.
    async fn list_keys(&self) -> Result<Vec<JobKey>, StorageError>;

    async fn pause_trigger(&self, key: &JobKey) -> Result<(), StorageError>;

    async fn resume_trigger(&self, key: &JobKey) -> Result<(), StorageError>;

    /// Fire every trigger due at `now`, applying misfire instructions to
    /// those that fell behind.
    async fn fire_due(&self, now: DateTime<Utc>) -> Result<Vec<FiredTrigger>, StorageError>;

    /// Whether a trigger exists under `key`.
    async fn contains(&self, key: &JobKey) -> Result<bool, StorageError> {
        match self.get_trigger(key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Upcoming fire times of one trigger in `[from, to]`.
    async fn fire_times_between(
        &self,
        key: &JobKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, StorageError> {
        let stored = self.get_trigger(key).await?;
        Ok(stored.fire_times_between(from, to))
    }
}
