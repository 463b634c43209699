//! Common test utilities shared across integration tests.

use cadence::{EventPayload, FakeClock, InMemoryTriggerStore, Scheduler};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;

/// A UTC instant, to the minute.
pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap()
}

/// The instant most scenarios treat as "now": Wednesday 2020-07-15 10:00 UTC.
pub fn now() -> DateTime<Utc> {
    at(2020, 7, 15, 10, 0)
}

/// A payload for `subject` carrying `job_id`.
pub fn payload(subject: &str, job_id: &str) -> EventPayload {
    EventPayload::new(subject).with_job_id(job_id)
}

/// A scheduler over a fresh in-memory store, with a clock frozen at `now`.
pub fn scheduler_at(now: DateTime<Utc>) -> (Scheduler<InMemoryTriggerStore>, FakeClock) {
    let clock = FakeClock::at(now);
    let scheduler = Scheduler::new(InMemoryTriggerStore::new()).with_clock(Arc::new(clock.clone()));
    (scheduler, clock)
}

/// Like [`scheduler_at`], with misfire policy settings.
pub fn scheduler_with_settings(
    now: DateTime<Utc>,
    settings: &[(&str, &str)],
) -> (Scheduler<InMemoryTriggerStore>, FakeClock) {
    let settings: HashMap<String, String> = settings
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let (scheduler, clock) = scheduler_at(now);
    (scheduler.with_settings(Arc::new(settings)), clock)
}
