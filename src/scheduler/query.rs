//! Read-only views over scheduled jobs.
//!
//! These are diagnostic views: store failures are logged and degrade to an
//! empty or partial result instead of surfacing to the caller.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::sync::Arc;

use crate::core::clock::Clock;
use crate::core::payload::EventPayload;
use crate::core::types::{JobIdentity, JobKey, JobKind};
use crate::storage::{StoredTrigger, TriggerStore};

use super::types::{JobActivity, JobBasicInfo, JobDetailedInfo, JobStatus};

/// Format of every human-facing timestamp.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Placeholder for an absent value.
const NONE: &str = "-";

/// Query engine over a trigger store.
pub struct JobQuery<S: TriggerStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
}

impl<S: TriggerStore> JobQuery<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, timezone: Tz) -> Self {
        Self {
            store,
            clock,
            timezone,
        }
    }

    /// Upcoming fire times of one job in `[from, to]`.
    pub async fn fire_times_in_range(
        &self,
        identity: &JobIdentity,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        let key = identity.key();
        match self.store.fire_times_between(&key, from, to).await {
            Ok(times) => times,
            Err(e) => {
                tracing::warn!(job_key = %key, error = %e, "Failed to compute fire times");
                Vec::new()
            }
        }
    }

    /// Upcoming fire times in `[from, to]` of every job whose key contains
    /// `"{subject}-{prefix}"`, merged in time order.
    pub async fn fire_times_in_range_by_prefix(
        &self,
        subject: &str,
        prefix: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<DateTime<Utc>> {
        if prefix.is_empty() {
            tracing::warn!(subject = %subject, "Empty job id prefix, no fire times returned");
            return Vec::new();
        }
        let pattern = format!("{}-{}", subject, prefix);

        let mut times = Vec::new();
        for key in self.matching_keys(|k| k.matches_prefix(&pattern)).await {
            match self.store.fire_times_between(&key, from, to).await {
                Ok(t) => times.extend(t),
                Err(e) => {
                    tracing::warn!(job_key = %key, error = %e, "Failed to compute fire times");
                }
            }
        }
        times.sort();
        times
    }

    /// One summary row per scheduled job, ordered by key.
    pub async fn list_jobs_basic_info(&self) -> Vec<JobBasicInfo> {
        let now = self.clock.now();
        let mut infos = Vec::new();
        for key in self.matching_keys(|_| true).await {
            match self.store.get_trigger(&key).await {
                Ok(stored) => infos.push(self.basic_info(&stored, now)),
                Err(e) => {
                    tracing::warn!(job_key = %key, error = %e, "Failed to read job, skipping");
                }
            }
        }
        infos
    }

    /// Payloads of the jobs named by `info`, without the bookkeeping keys.
    pub async fn job_detailed_info(&self, info: &JobBasicInfo) -> JobDetailedInfo {
        let mut event_infos = Vec::new();
        for key in self.matching_keys(|k| k.as_str() == info.name).await {
            match self.store.get_trigger(&key).await {
                Ok(stored) => event_infos.push(EventPayload::for_display(
                    &stored.parameters,
                    key.subject_hint(),
                )),
                Err(e) => {
                    tracing::warn!(job_key = %key, error = %e, "Failed to read job details");
                }
            }
        }
        JobDetailedInfo { event_infos }
    }

    async fn matching_keys(&self, predicate: impl Fn(&JobKey) -> bool) -> Vec<JobKey> {
        match self.store.list_keys().await {
            Ok(keys) => keys.into_iter().filter(|k| predicate(k)).collect(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to list jobs");
                Vec::new()
            }
        }
    }

    fn basic_info(&self, stored: &StoredTrigger, now: DateTime<Utc>) -> JobBasicInfo {
        let trigger = &stored.trigger;
        let job_type = stored.key.kind();
        let start = trigger.start_time();

        let activity = if start > now {
            JobActivity::NotStarted
        } else if trigger.end_time().is_some_and(|end| end < now) || stored.next_fire_time.is_none() {
            JobActivity::Finished
        } else {
            JobActivity::Active
        };

        let start_date = self.format(start);
        let end_date = match trigger.end_time() {
            Some(end) if end > now => self.format(end),
            _ if job_type == JobKind::RunOnce => start_date.clone(),
            _ => NONE.to_string(),
        };

        let info = match job_type {
            JobKind::Repeating => {
                let total = stored
                    .remaining_fires()
                    .map(|remaining| (stored.times_triggered as usize + remaining).to_string())
                    .unwrap_or_else(|| NONE.to_string());
                format!("{}/{}", stored.times_triggered, total)
            }
            JobKind::Cron => trigger
                .cron_expression()
                .map(|e| e.expression().to_string())
                .unwrap_or_else(|| NONE.to_string()),
            JobKind::RunOnce => NONE.to_string(),
        };

        JobBasicInfo {
            activity,
            status: JobStatus::from(stored.state),
            name: stored.key.to_string(),
            start_date,
            next_fire_date: stored
                .next_fire_time
                .map(|t| self.format(t))
                .unwrap_or_else(|| NONE.to_string()),
            end_date,
            job_type,
            info,
        }
    }

    fn format(&self, instant: DateTime<Utc>) -> String {
        instant
            .with_timezone(&self.timezone)
            .format(DATE_FORMAT)
            .to_string()
    }
}
