//! Testing utilities for users of the Cadence library.
//!
//! This module provides helpers for testing code built on the scheduler:
//!
//! - [`FailingTriggerStore`]: wraps a store and fails selected operations
//! - [`RecordingHandler`]: an event handler that keeps every event it sees

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::RwLock;
use tokio::sync::Mutex;

use crate::core::trigger::Trigger;
use crate::core::types::JobKey;
use crate::events::{Event, EventHandler};
use crate::storage::{FiredTrigger, StorageError, StoredTrigger, TriggerStore};

/// Which operations of a [`FailingTriggerStore`] fail.
#[derive(Debug, Clone, Default)]
struct FailureInjection {
    /// Keys for which every keyed operation fails.
    failing_keys: HashSet<String>,
    /// Keys for which only deletion fails.
    failing_deletes: HashSet<String>,
    /// Whether listing keys fails.
    listing: bool,
    /// Whether firing fails.
    firing: bool,
}

/// A trigger store that injects failures in front of a real store.
///
/// # Example
///
/// ```
/// use cadence::storage::InMemoryTriggerStore;
/// use cadence::testing::FailingTriggerStore;
///
/// let store = FailingTriggerStore::new(InMemoryTriggerStore::new())
///     .fail_delete("report-1")
///     .fail_listing();
/// store.set_listing_fails(false);
/// ```
pub struct FailingTriggerStore<S: TriggerStore> {
    inner: S,
    failures: RwLock<FailureInjection>,
}

impl<S: TriggerStore> FailingTriggerStore<S> {
    /// Wrap `inner` with no failures configured.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failures: RwLock::new(FailureInjection::default()),
        }
    }

    /// Fail every operation on `key`.
    pub fn fail_key(self, key: impl Into<String>) -> Self {
        self.set_failing_key(key);
        self
    }

    /// Fail only deletion of `key`.
    pub fn fail_delete(self, key: impl Into<String>) -> Self {
        self.write().failing_deletes.insert(key.into());
        self
    }

    /// Fail listing keys.
    pub fn fail_listing(self) -> Self {
        self.set_listing_fails(true);
        self
    }

    /// Fail firing.
    pub fn fail_firing(self) -> Self {
        self.write().firing = true;
        self
    }

    /// Start failing every operation on `key`, on a store already in use.
    pub fn set_failing_key(&self, key: impl Into<String>) {
        self.write().failing_keys.insert(key.into());
    }

    pub fn set_listing_fails(&self, fails: bool) {
        self.write().listing = fails;
    }

    /// The wrapped store, bypassing injected failures.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, FailureInjection> {
        self.failures.write().unwrap_or_else(|e| e.into_inner())
    }

    fn check_key(&self, key: &JobKey, deleting: bool) -> Result<(), StorageError> {
        let failures = self.failures.read().unwrap_or_else(|e| e.into_inner());
        if failures.failing_keys.contains(key.as_str())
            || (deleting && failures.failing_deletes.contains(key.as_str()))
        {
            return Err(StorageError::Other(format!("injected failure for {}", key)));
        }
        Ok(())
    }

    fn check(&self, failing: impl Fn(&FailureInjection) -> bool, what: &str) -> Result<(), StorageError> {
        let failures = self.failures.read().unwrap_or_else(|e| e.into_inner());
        if failing(&failures) {
            return Err(StorageError::Other(format!("injected {} failure", what)));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: TriggerStore> TriggerStore for FailingTriggerStore<S> {
    async fn save_trigger(&self, trigger: StoredTrigger) -> Result<(), StorageError> {
        self.check_key(&trigger.key, false)?;
        self.inner.save_trigger(trigger).await
    }

    async fn get_trigger(&self, key: &JobKey) -> Result<StoredTrigger, StorageError> {
        self.check_key(key, false)?;
        self.inner.get_trigger(key).await
    }

    async fn replace_trigger(&self, key: &JobKey, trigger: Trigger) -> Result<(), StorageError> {
        self.check_key(key, false)?;
        self.inner.replace_trigger(key, trigger).await
    }

    async fn delete_trigger(&self, key: &JobKey) -> Result<(), StorageError> {
        self.check_key(key, true)?;
        self.inner.delete_trigger(key).await
    }

    async fn list_keys(&self) -> Result<Vec<JobKey>, StorageError> {
        self.check(|f| f.listing, "listing")?;
        self.inner.list_keys().await
    }

    async fn pause_trigger(&self, key: &JobKey) -> Result<(), StorageError> {
        self.check_key(key, false)?;
        self.inner.pause_trigger(key).await
    }

    async fn resume_trigger(&self, key: &JobKey) -> Result<(), StorageError> {
        self.check_key(key, false)?;
        self.inner.resume_trigger(key).await
    }

    async fn fire_due(&self, now: DateTime<Utc>) -> Result<Vec<FiredTrigger>, StorageError> {
        self.check(|f| f.firing, "firing")?;
        self.inner.fire_due(now).await
    }
}

/// An event handler that records every event, in order.
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<Event>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Events seen so far.
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    /// Forget recorded events.
    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}
