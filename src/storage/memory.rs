//! In-memory trigger store.
//!
//! Thread-safe store backed by a `RwLock`. Firing is driven by the caller
//! through [`TriggerStore::fire_due`]; nothing runs in the background and
//! nothing survives a restart.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use super::{FiredTrigger, StorageError, StoredTrigger, TriggerState, TriggerStore};
use crate::core::misfire::{CronMisfirePolicy, IntervalMisfirePolicy};
use crate::core::trigger::{MAX_REPEAT_COUNT, Trigger, TriggerSchedule};
use crate::core::types::JobKey;

/// Default lag, in seconds, after which a due fire time counts as misfired.
pub const DEFAULT_MISFIRE_THRESHOLD_SECS: i64 = 60;

/// Upper bound on fires of one trigger within a single `fire_due` call.
const MAX_FIRES_PER_TICK: usize = 100;

/// In-memory trigger store.
pub struct InMemoryTriggerStore {
    triggers: RwLock<HashMap<JobKey, StoredTrigger>>,
    misfire_threshold: Duration,
}

impl InMemoryTriggerStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            triggers: RwLock::new(HashMap::new()),
            misfire_threshold: Duration::seconds(DEFAULT_MISFIRE_THRESHOLD_SECS),
        }
    }

    /// Set how far a fire time may lag before it is handled as a misfire.
    pub fn with_misfire_threshold(mut self, threshold: Duration) -> Self {
        self.misfire_threshold = threshold;
        self
    }

    /// Force the state of a trigger.
    pub fn set_state(&self, key: &JobKey, state: TriggerState) -> Result<(), StorageError> {
        let mut triggers = self.triggers.write().map_err(|_| StorageError::LockPoisoned)?;
        let stored = triggers
            .get_mut(key)
            .ok_or_else(|| StorageError::NotFound(format!("trigger: {}", key)))?;
        stored.state = state;
        Ok(())
    }

    /// Number of stored triggers.
    pub fn len(&self) -> usize {
        self.triggers.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryTriggerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TriggerStore for InMemoryTriggerStore {
    async fn save_trigger(&self, trigger: StoredTrigger) -> Result<(), StorageError> {
        let mut triggers = self.triggers.write().map_err(|_| StorageError::LockPoisoned)?;
        if triggers.contains_key(&trigger.key) {
            return Err(StorageError::DuplicateKey(format!("trigger: {}", trigger.key)));
        }
        triggers.insert(trigger.key.clone(), trigger);
        Ok(())
    }

    async fn get_trigger(&self, key: &JobKey) -> Result<StoredTrigger, StorageError> {
        let triggers = self.triggers.read().map_err(|_| StorageError::LockPoisoned)?;
        triggers
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("trigger: {}", key)))
    }

    async fn replace_trigger(&self, key: &JobKey, trigger: Trigger) -> Result<(), StorageError> {
        let mut triggers = self.triggers.write().map_err(|_| StorageError::LockPoisoned)?;
        let existing = triggers
            .remove(key)
            .ok_or_else(|| StorageError::NotFound(format!("trigger: {}", key)))?;
        triggers.insert(key.clone(), existing.with_definition(trigger));
        Ok(())
    }

    async fn delete_trigger(&self, key: &JobKey) -> Result<(), StorageError> {
        let mut triggers = self.triggers.write().map_err(|_| StorageError::LockPoisoned)?;
        triggers
            .remove(key)
            .ok_or_else(|| StorageError::NotFound(format!("trigger: {}", key)))?;
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<JobKey>, StorageError> {
        let triggers = self.triggers.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut keys: Vec<_> = triggers.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn pause_trigger(&self, key: &JobKey) -> Result<(), StorageError> {
        let mut triggers = self.triggers.write().map_err(|_| StorageError::LockPoisoned)?;
        let stored = triggers
            .get_mut(key)
            .ok_or_else(|| StorageError::NotFound(format!("trigger: {}", key)))?;
        if stored.state == TriggerState::Normal {
            stored.state = TriggerState::Paused;
        }
        Ok(())
    }

    async fn resume_trigger(&self, key: &JobKey) -> Result<(), StorageError> {
        let mut triggers = self.triggers.write().map_err(|_| StorageError::LockPoisoned)?;
        let stored = triggers
            .get_mut(key)
            .ok_or_else(|| StorageError::NotFound(format!("trigger: {}", key)))?;
        if stored.state == TriggerState::Paused {
            stored.state = TriggerState::Normal;
        }
        Ok(())
    }

    async fn fire_due(&self, now: DateTime<Utc>) -> Result<Vec<FiredTrigger>, StorageError> {
        let mut triggers = self.triggers.write().map_err(|_| StorageError::LockPoisoned)?;
        let mut fired = Vec::new();

        for stored in triggers.values_mut() {
            if stored.state != TriggerState::Normal {
                continue;
            }
            if stored
                .next_fire_time
                .is_some_and(|next| now - next > self.misfire_threshold)
            {
                tracing::debug!(job_key = %stored.key, "trigger misfired");
                apply_misfire(stored, now);
            }
            for _ in 0..MAX_FIRES_PER_TICK {
                match stored.next_fire_time {
                    Some(next) if next <= now => {
                        fired.push(FiredTrigger {
                            key: stored.key.clone(),
                            fire_time: next,
                            payload: stored.payload(),
                        });
                        stored.times_triggered += 1;
                        stored.previous_fire_time = Some(next);
                        stored.next_fire_time = stored.trigger.fire_time_after(next);
                    }
                    _ => break,
                }
            }
            if stored.next_fire_time.is_none() {
                stored.state = TriggerState::Complete;
            }
        }

        fired.sort_by(|a, b| a.fire_time.cmp(&b.fire_time).then_with(|| a.key.cmp(&b.key)));
        Ok(fired)
    }
}

/// Reposition a trigger whose next fire time lags too far behind `now`.
fn apply_misfire(stored: &mut StoredTrigger, now: DateTime<Utc>) {
    let Some(next) = stored.next_fire_time else {
        return;
    };

    match stored.trigger.schedule().clone() {
        TriggerSchedule::Cron { misfire, .. } => match misfire {
            CronMisfirePolicy::Ignore => {}
            CronMisfirePolicy::SmartDefault | CronMisfirePolicy::FireOnceNow => {
                stored.next_fire_time = Some(now);
            }
            CronMisfirePolicy::DoNothing => {
                stored.next_fire_time = stored.trigger.fire_time_after(now);
            }
        },
        TriggerSchedule::CalendarInterval { .. } => {
            stored.next_fire_time = Some(now);
        }
        TriggerSchedule::Simple {
            interval_ms,
            repeat_count,
            misfire,
        } => {
            let interval = i64::try_from(interval_ms).unwrap_or(i64::MAX).max(1);
            let start = stored.trigger.start_time();
            // The unbounded sentinel survives every count adjustment.
            let (existing, remaining) = if repeat_count == MAX_REPEAT_COUNT {
                (MAX_REPEAT_COUNT, MAX_REPEAT_COUNT)
            } else {
                let existing = repeat_count.saturating_sub(grid_index(start, next, interval));
                (existing, existing.saturating_sub(grid_index(next, now, interval)))
            };

            let policy = match misfire {
                IntervalMisfirePolicy::FireNow if repeat_count != 0 => {
                    IntervalMisfirePolicy::RescheduleNowWithRemainingCount
                }
                other => other,
            };

            match policy {
                IntervalMisfirePolicy::Ignore => {}
                IntervalMisfirePolicy::FireNow => {
                    stored.next_fire_time = Some(now);
                }
                IntervalMisfirePolicy::RescheduleNowWithExistingCount => {
                    restart(stored, now, existing);
                }
                IntervalMisfirePolicy::RescheduleNowWithRemainingCount => {
                    restart(stored, now, remaining);
                }
                IntervalMisfirePolicy::RescheduleNextWithRemainingCount => {
                    stored.next_fire_time = stored.trigger.fire_time_after(now);
                }
                IntervalMisfirePolicy::RescheduleNextWithExistingCount => {
                    let slot_index = i64::from(grid_index(start, now, interval)) + 1;
                    let slot = Duration::try_milliseconds(slot_index.saturating_mul(interval))
                        .and_then(|offset| start.checked_add_signed(offset));
                    match slot {
                        Some(slot) => restart(stored, slot, existing),
                        None => stored.next_fire_time = None,
                    }
                }
            }
        }
    }
}

/// Restart a simple trigger's grid at `at` with `repeat_count` repeats.
fn restart(stored: &mut StoredTrigger, at: DateTime<Utc>, repeat_count: u32) {
    if stored.trigger.end_time().is_some_and(|end| end < at) {
        stored.next_fire_time = None;
        return;
    }
    stored.trigger = stored
        .trigger
        .to_builder()
        .start_at(at)
        .with_repeat_count(repeat_count)
        .build();
    stored.next_fire_time = stored.trigger.first_fire_time();
}

/// Whole intervals between `from` and `to`.
fn grid_index(from: DateTime<Utc>, to: DateTime<Utc>, interval_ms: i64) -> u32 {
    let elapsed = (to - from).num_milliseconds().max(0);
    u32::try_from(elapsed / interval_ms).unwrap_or(u32::MAX)
}
