//! Scheduling engine.
//!
//! The scheduler is responsible for:
//! - Registering jobs in the trigger store, replacing by identity
//! - Rescheduling cron jobs in place
//! - Removing jobs, one at a time or in bulk by key pattern
//! - Event emission
//!
//! Registration is check-then-delete-then-save and bulk removal walks the
//! keys one at a time. Neither is atomic: a concurrent caller can observe
//! a job as absent mid-registration, and a job scheduled during a bulk
//! removal may or may not be removed.

use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::SettingsSource;
use crate::core::clock::{Clock, SystemClock};
use crate::core::misfire::{MisfirePolicy, TriggerFamily};
use crate::core::payload::EventPayload;
use crate::core::schedule::CronExpression;
use crate::core::trigger::{BuildContext, TriggerSchedule, TriggerSpec};
use crate::core::types::{JobIdentity, JobKey};
use crate::events::{Event, EventBus};
use crate::storage::{FiredTrigger, StorageError, StoredTrigger, TriggerStore};

use super::query::JobQuery;
use super::types::SchedulerError;

/// Main scheduler over a trigger store.
pub struct Scheduler<S: TriggerStore> {
    /// Trigger store backend.
    store: Arc<S>,
    /// Where misfire policy names are read from.
    settings: Arc<dyn SettingsSource>,
    /// Source of "now".
    clock: Arc<dyn Clock>,
    /// Reference timezone for cron evaluation and weekly patterns.
    timezone: Tz,
    /// Event bus for emitting events.
    event_bus: Arc<EventBus>,
}

impl<S: TriggerStore + 'static> Scheduler<S> {
    /// Create a new scheduler with the given store.
    pub fn new(store: S) -> Self {
        Self::with_store(Arc::new(store))
    }

    /// Create a new scheduler with a shared store.
    pub fn with_store(store: Arc<S>) -> Self {
        Self {
            store,
            settings: Arc::new(HashMap::<String, String>::new()),
            clock: Arc::new(SystemClock),
            timezone: Tz::UTC,
            event_bus: Arc::new(EventBus::new()),
        }
    }

    /// Set the settings source.
    pub fn with_settings(mut self, settings: Arc<dyn SettingsSource>) -> Self {
        self.settings = settings;
        self
    }

    /// Set the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set the reference timezone.
    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Set the event bus.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Arc::new(event_bus);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Get the event bus.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// The current instant according to the scheduler's clock.
    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Read-only views over the same store.
    pub fn query(&self) -> JobQuery<S> {
        JobQuery::new(Arc::clone(&self.store), Arc::clone(&self.clock), self.timezone)
    }

    /// Build inputs as of now. Policies are re-read from the settings
    /// source on every call.
    pub fn build_context(&self) -> BuildContext {
        [TriggerFamily::Cron, TriggerFamily::Interval].into_iter().fold(
            BuildContext::new(self.clock.now(), self.timezone),
            |ctx, family| {
                let configured = self.settings.property(family.settings_key());
                ctx.with_policy(MisfirePolicy::resolve(family, configured.as_deref()))
            },
        )
    }

    /// Register a job, replacing any job with the same identity.
    ///
    /// The identity is the payload subject, its job id parameter and the
    /// kind of `spec`. The trigger is built before the store is touched, so
    /// an invalid spec leaves an existing registration in place.
    pub async fn schedule(
        &self,
        payload: &EventPayload,
        spec: &TriggerSpec,
    ) -> Result<JobKey, SchedulerError> {
        let identity = identity_of(payload, spec)?;
        let key = identity.key();
        tracing::debug!(job_key = %key, "Scheduling job");

        let trigger = spec.build(&self.build_context())?;

        if self.store.contains(&key).await? {
            tracing::debug!(job_key = %key, "Replacing existing job");
            match self.store.delete_trigger(&key).await {
                Ok(()) | Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let stored = StoredTrigger::new(key.clone(), trigger, payload);
        let first_fire_time = stored.next_fire_time;
        self.store.save_trigger(stored).await?;

        tracing::info!(job_key = %key, first_fire_time = ?first_fire_time, "Scheduled job");
        self.event_bus
            .emit(Event::job_scheduled(key.clone(), first_fire_time, self.clock.now()))
            .await;
        Ok(key)
    }

    /// Unschedule any job with the same identity, ignoring failures, then
    /// register. Errors from the registration itself still surface.
    pub async fn safe_schedule(
        &self,
        payload: &EventPayload,
        spec: &TriggerSpec,
    ) -> Result<JobKey, SchedulerError> {
        let identity = identity_of(payload, spec)?;
        self.safe_unschedule(&identity).await;
        self.schedule(payload, spec).await
    }

    /// Give an existing cron job a new expression, keeping its window and
    /// misfire policy. The definition is swapped in one store call.
    pub async fn reschedule(
        &self,
        subject: &str,
        external_id: &str,
        cron_expression: &str,
    ) -> Result<(), SchedulerError> {
        let identity = JobIdentity::cron(subject, external_id)?;
        let key = identity.key();
        tracing::debug!(job_key = %key, expression = %cron_expression, "Rescheduling job");

        if cron_expression.trim().is_empty() {
            return Err(SchedulerError::InvalidArgument(
                "cron expression cannot be blank".into(),
            ));
        }

        let stored = self.store.get_trigger(&key).await.map_err(not_found_as_job)?;
        let (timezone, misfire) = match stored.trigger.schedule() {
            TriggerSchedule::Cron {
                expression,
                misfire,
            } => (expression.timezone(), *misfire),
            _ => {
                return Err(SchedulerError::WrongTriggerType {
                    key: key.to_string(),
                });
            }
        };

        let expression = CronExpression::with_timezone(cron_expression.trim(), timezone)
            .map_err(|e| SchedulerError::InvalidTriggerExpression(e.to_string()))?;
        let trigger = stored
            .trigger
            .to_builder()
            .with_schedule(TriggerSchedule::Cron {
                expression,
                misfire,
            })
            .build();

        self.store
            .replace_trigger(&key, trigger)
            .await
            .map_err(not_found_as_job)?;

        tracing::info!(job_key = %key, expression = %cron_expression, "Rescheduled job");
        self.event_bus
            .emit(Event::job_rescheduled(key, cron_expression.trim(), self.clock.now()))
            .await;
        Ok(())
    }

    /// Remove the job with exactly this identity.
    pub async fn unschedule(&self, identity: &JobIdentity) -> Result<(), SchedulerError> {
        let key = identity.key();
        tracing::debug!(job_key = %key, "Unscheduling job");

        self.store.delete_trigger(&key).await.map_err(not_found_as_job)?;

        tracing::info!(job_key = %key, "Unscheduled job");
        self.event_bus
            .emit(Event::job_unscheduled(key, self.clock.now()))
            .await;
        Ok(())
    }

    /// Like [`Scheduler::unschedule`], but failures are only logged.
    pub async fn safe_unschedule(&self, identity: &JobIdentity) {
        match self.unschedule(identity).await {
            Ok(()) => {}
            Err(SchedulerError::JobNotFound(key)) => {
                tracing::debug!(job_key = %key, "No job to unschedule");
            }
            Err(e) => {
                tracing::warn!(job_key = %identity.key(), error = %e, "Failed to unschedule job");
            }
        }
    }

    /// Remove every job whose key contains `pattern`.
    ///
    /// The match is a plain substring test, not anchored at the start of
    /// the key. A failure on one key is logged and the rest are still
    /// processed. Returns how many jobs were removed.
    pub async fn unschedule_all_by_prefix(&self, pattern: &str) -> Result<usize, SchedulerError> {
        if pattern.is_empty() {
            return Err(SchedulerError::InvalidArgument(
                "job key pattern cannot be empty".into(),
            ));
        }
        tracing::debug!(pattern = %pattern, "Unscheduling jobs by pattern");

        let keys = self.store.list_keys().await?;
        let mut removed = 0;
        for key in keys.into_iter().filter(|k| k.matches_prefix(pattern)) {
            match self.store.delete_trigger(&key).await {
                Ok(()) => {
                    removed += 1;
                    tracing::info!(job_key = %key, "Unscheduled job");
                    self.event_bus
                        .emit(Event::job_unscheduled(key, self.clock.now()))
                        .await;
                }
                Err(e) => {
                    tracing::error!(job_key = %key, error = %e, "Failed to unschedule job");
                }
            }
        }
        Ok(removed)
    }

    /// Like [`Scheduler::unschedule_all_by_prefix`], but a failed listing
    /// is only logged.
    pub async fn safe_unschedule_all_by_prefix(&self, pattern: &str) -> usize {
        match self.unschedule_all_by_prefix(pattern).await {
            Ok(removed) => removed,
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "Failed to unschedule jobs by pattern");
                0
            }
        }
    }

    /// Fire everything due as of now and emit a [`Event::TriggerFired`]
    /// per occurrence.
    pub async fn fire_due(&self) -> Result<Vec<FiredTrigger>, SchedulerError> {
        let now = self.clock.now();
        let fired = self.store.fire_due(now).await?;
        for f in &fired {
            tracing::debug!(job_key = %f.key, fire_time = %f.fire_time, "Trigger fired");
            self.event_bus
                .emit(Event::trigger_fired(f.key.clone(), f.fire_time, f.payload.clone(), now))
                .await;
        }
        Ok(fired)
    }
}

fn identity_of(payload: &EventPayload, spec: &TriggerSpec) -> Result<JobIdentity, SchedulerError> {
    let job_id = payload.job_id().ok_or_else(|| {
        SchedulerError::InvalidArgument(format!(
            "payload for '{}' has no job id parameter",
            payload.subject
        ))
    })?;
    Ok(JobIdentity::new(&payload.subject, job_id, spec.kind())?)
}

fn not_found_as_job(e: StorageError) -> SchedulerError {
    match e {
        StorageError::NotFound(key) => SchedulerError::JobNotFound(key),
        other => SchedulerError::SchedulingFailure(other),
    }
}
