//! Registering, replacing and removing jobs.

use crate::common::{at, now, payload, scheduler_at};
use cadence::testing::{FailingTriggerStore, RecordingHandler};
use cadence::{
    CronSpec, Event, EventBus, InMemoryTriggerStore, JobIdentity, JobKey, OneShotSpec,
    RepeatingSpec, Scheduler, SchedulerError, TimeOfDay, TriggerSpec, TriggerStore,
    WeeklyPatternSpec,
};
use chrono::{Duration, NaiveDate, Weekday};
use std::sync::Arc;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

#[tokio::test]
async fn test_one_shot_scenario() {
    let (scheduler, _clock) = scheduler_at(now());
    let spec = TriggerSpec::OneShot(OneShotSpec::new(at(2020, 7, 15, 12, 0)));

    let key = scheduler
        .schedule(&payload("test_event", "job_id"), &spec)
        .await
        .unwrap();
    assert_eq!(key.as_str(), "test_event-job_id-runonce");

    let identity = JobIdentity::run_once("test_event", "job_id").unwrap();
    let times = scheduler
        .query()
        .fire_times_in_range(&identity, at(2020, 7, 15, 0, 0), at(2020, 7, 16, 0, 0))
        .await;
    assert_eq!(times, vec![at(2020, 7, 15, 12, 0)]);
}

#[tokio::test]
async fn test_reschedule_scenario() {
    let (scheduler, _clock) = scheduler_at(now());
    scheduler
        .schedule(
            &payload("test_event", "job_id"),
            &TriggerSpec::Cron(CronSpec::new("0 0 10 * * ?")),
        )
        .await
        .unwrap();

    scheduler
        .reschedule("test_event", "job_id", "0 0 14 * * ?")
        .await
        .unwrap();

    let identity = JobIdentity::cron("test_event", "job_id").unwrap();
    let times = scheduler
        .query()
        .fire_times_in_range(&identity, at(2020, 7, 15, 0, 0), at(2020, 7, 17, 23, 59))
        .await;
    assert_eq!(
        times,
        vec![
            at(2020, 7, 15, 14, 0),
            at(2020, 7, 16, 14, 0),
            at(2020, 7, 17, 14, 0),
        ]
    );
}

#[tokio::test]
async fn test_weekly_pattern_scenario() {
    let (scheduler, _clock) = scheduler_at(now());
    let spec = TriggerSpec::WeeklyPattern(WeeklyPatternSpec::new(
        NaiveDate::from_ymd_opt(2020, 7, 10).unwrap(),
        NaiveDate::from_ymd_opt(2020, 7, 22).unwrap(),
        [Weekday::Mon, Weekday::Thu],
        TimeOfDay::new(10, 10),
    ));

    let key = scheduler
        .schedule(&payload("visits", "clinic"), &spec)
        .await
        .unwrap();
    assert_eq!(key.as_str(), "visits-clinic");

    let identity = JobIdentity::cron("visits", "clinic").unwrap();
    let times = scheduler
        .query()
        .fire_times_in_range(&identity, at(2020, 7, 1, 0, 0), at(2020, 7, 31, 0, 0))
        .await;
    assert_eq!(
        times,
        vec![
            at(2020, 7, 13, 10, 10),
            at(2020, 7, 16, 10, 10),
            at(2020, 7, 20, 10, 10),
        ]
    );
}

#[tokio::test]
async fn test_fire_times_are_deterministic() {
    let (scheduler, _clock) = scheduler_at(now());
    scheduler
        .schedule(
            &payload("report", "1"),
            &TriggerSpec::Cron(CronSpec::new("0 30 8 ? * MON,TUE,WED,THU,FRI")),
        )
        .await
        .unwrap();

    let identity = JobIdentity::cron("report", "1").unwrap();
    let query = scheduler.query();
    let first = query
        .fire_times_in_range(&identity, now(), now() + Duration::days(14))
        .await;
    let second = query
        .fire_times_in_range(&identity, now(), now() + Duration::days(14))
        .await;

    assert_eq!(first.len(), 10);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_cron_skip_past_fires_starts_after_now() {
    let (scheduler, _clock) = scheduler_at(now());
    let start = now() - Duration::days(3);

    scheduler
        .schedule(
            &payload("skip", "1"),
            &TriggerSpec::Cron(
                CronSpec::new("0 0 12 * * ?")
                    .with_start_time(start)
                    .with_skip_past_fires(true),
            ),
        )
        .await
        .unwrap();
    scheduler
        .schedule(
            &payload("keep", "1"),
            &TriggerSpec::Cron(CronSpec::new("0 0 12 * * ?").with_start_time(start)),
        )
        .await
        .unwrap();

    let query = scheduler.query();
    let from = at(2020, 7, 1, 0, 0);
    let skipped = query
        .fire_times_in_range(&JobIdentity::cron("skip", "1").unwrap(), from, now() + Duration::days(1))
        .await;
    let kept = query
        .fire_times_in_range(&JobIdentity::cron("keep", "1").unwrap(), from, now() + Duration::days(1))
        .await;

    assert_eq!(skipped, vec![at(2020, 7, 15, 12, 0)]);
    assert_eq!(kept.first(), Some(&at(2020, 7, 12, 12, 0)));
    assert_eq!(kept.len(), 4);
}

#[tokio::test]
async fn test_repeating_skip_past_fires_keeps_remaining_count() {
    let (scheduler, _clock) = scheduler_at(now());
    let spec = TriggerSpec::Repeating(
        RepeatingSpec::new(now() - Duration::days(3), DAY_MS)
            .with_repeat_count(5)
            .with_skip_past_fires(true),
    );

    scheduler
        .schedule(&payload("pill", "morning"), &spec)
        .await
        .unwrap();

    // Three fires elapsed before now; the remaining ones resume after it.
    let identity = JobIdentity::repeating("pill", "morning").unwrap();
    let times = scheduler
        .query()
        .fire_times_in_range(&identity, now(), now() + Duration::days(30))
        .await;
    assert_eq!(
        times,
        vec![
            at(2020, 7, 16, 10, 0),
            at(2020, 7, 17, 10, 0),
            at(2020, 7, 18, 10, 0),
        ]
    );
}

#[tokio::test]
async fn test_exhausted_repeating_skip_fires_once_now() {
    let (scheduler, _clock) = scheduler_at(now());
    let spec = TriggerSpec::Repeating(
        RepeatingSpec::new(now() - Duration::days(3), DAY_MS)
            .with_repeat_count(3)
            .with_skip_past_fires(true),
    );
    scheduler
        .schedule(&payload("pill", "evening"), &spec)
        .await
        .unwrap();

    let identity = JobIdentity::repeating("pill", "evening").unwrap();
    let times = scheduler
        .query()
        .fire_times_in_range(&identity, now(), now() + Duration::days(30))
        .await;
    assert_eq!(times, vec![now()]);
}

#[tokio::test]
async fn test_schedule_replaces_same_identity() {
    let (scheduler, _clock) = scheduler_at(now());
    let event = payload("report", "1");

    scheduler
        .schedule(&event, &TriggerSpec::Cron(CronSpec::new("0 0 9 * * ?")))
        .await
        .unwrap();
    scheduler
        .schedule(&event, &TriggerSpec::Cron(CronSpec::new("0 0 18 * * ?")))
        .await
        .unwrap();

    assert_eq!(scheduler.store().len(), 1);
    let times = scheduler
        .query()
        .fire_times_in_range(
            &JobIdentity::cron("report", "1").unwrap(),
            now(),
            at(2020, 7, 16, 23, 0),
        )
        .await;
    assert_eq!(times, vec![at(2020, 7, 15, 18, 0), at(2020, 7, 16, 18, 0)]);
}

#[tokio::test]
async fn test_same_id_with_different_kinds_coexist() {
    let (scheduler, _clock) = scheduler_at(now());
    let event = payload("report", "1");

    scheduler
        .schedule(&event, &TriggerSpec::Cron(CronSpec::new("0 0 9 * * ?")))
        .await
        .unwrap();
    scheduler
        .schedule(&event, &TriggerSpec::OneShot(OneShotSpec::new(at(2020, 7, 20, 9, 0))))
        .await
        .unwrap();

    let keys = scheduler.store().list_keys().await.unwrap();
    assert_eq!(
        keys,
        vec![JobKey::new("report-1"), JobKey::new("report-1-runonce")]
    );
}

#[tokio::test]
async fn test_safe_schedule_is_idempotent() {
    let (scheduler, _clock) = scheduler_at(now());
    let event = payload("reminder", "42");
    let spec = TriggerSpec::Repeating(
        RepeatingSpec::new(at(2020, 7, 15, 12, 0), 3_600_000).with_repeat_count(3),
    );

    scheduler.safe_schedule(&event, &spec).await.unwrap();
    let once = scheduler.query().list_jobs_basic_info().await;
    scheduler.safe_schedule(&event, &spec).await.unwrap();
    let twice = scheduler.query().list_jobs_basic_info().await;

    assert_eq!(once.len(), 1);
    assert_eq!(once, twice);
}

#[tokio::test]
async fn test_invalid_spec_keeps_existing_job() {
    let (scheduler, _clock) = scheduler_at(now());
    let event = payload("report", "1");
    scheduler
        .schedule(&event, &TriggerSpec::Cron(CronSpec::new("0 0 9 * * ?")))
        .await
        .unwrap();

    let result = scheduler
        .schedule(&event, &TriggerSpec::Cron(CronSpec::new("every day at noon")))
        .await;

    assert!(matches!(
        result,
        Err(SchedulerError::InvalidTriggerExpression(_))
    ));
    let stored = scheduler
        .store()
        .get_trigger(&JobKey::new("report-1"))
        .await
        .unwrap();
    assert_eq!(
        stored.trigger.cron_expression().map(|e| e.expression()),
        Some("0 0 9 * * ?")
    );
}

#[tokio::test]
async fn test_one_shot_in_the_past_is_rejected() {
    let (scheduler, _clock) = scheduler_at(now());
    let result = scheduler
        .schedule(
            &payload("alert", "late"),
            &TriggerSpec::OneShot(OneShotSpec::new(now() - Duration::minutes(1))),
        )
        .await;

    assert!(matches!(result, Err(SchedulerError::PastStartTime { .. })));
    assert!(scheduler.store().is_empty());
}

#[tokio::test]
async fn test_unschedule_all_by_prefix_matches_substrings() {
    let (scheduler, _clock) = scheduler_at(now());
    let cron = TriggerSpec::Cron(CronSpec::new("0 0 9 * * ?"));
    let repeating = TriggerSpec::Repeating(RepeatingSpec::new(now(), 60_000));

    scheduler.schedule(&payload("foo", "1"), &cron).await.unwrap();
    scheduler.schedule(&payload("foo", "2"), &repeating).await.unwrap();
    scheduler.schedule(&payload("barfoo", "1"), &cron).await.unwrap();
    scheduler.schedule(&payload("qux", "1"), &cron).await.unwrap();

    let removed = scheduler.unschedule_all_by_prefix("foo-").await.unwrap();

    assert_eq!(removed, 3);
    assert_eq!(
        scheduler.store().list_keys().await.unwrap(),
        vec![JobKey::new("qux-1")]
    );
}

#[tokio::test]
async fn test_unschedule_all_by_prefix_rejects_empty_pattern() {
    let (scheduler, _clock) = scheduler_at(now());
    assert!(matches!(
        scheduler.unschedule_all_by_prefix("").await,
        Err(SchedulerError::InvalidArgument(_))
    ));
    assert_eq!(scheduler.safe_unschedule_all_by_prefix("").await, 0);
}

#[tokio::test]
async fn test_bulk_unschedule_continues_past_failures() {
    let store = FailingTriggerStore::new(InMemoryTriggerStore::new()).fail_delete("foo-2");
    let scheduler = Scheduler::new(store)
        .with_clock(Arc::new(cadence::FakeClock::at(now())));
    let cron = TriggerSpec::Cron(CronSpec::new("0 0 9 * * ?"));
    for id in ["1", "2", "3"] {
        scheduler.schedule(&payload("foo", id), &cron).await.unwrap();
    }

    let removed = scheduler.unschedule_all_by_prefix("foo").await.unwrap();

    assert_eq!(removed, 2);
    assert_eq!(
        scheduler.store().list_keys().await.unwrap(),
        vec![JobKey::new("foo-2")]
    );
}

#[tokio::test]
async fn test_unschedule_unknown_job() {
    let (scheduler, _clock) = scheduler_at(now());
    let identity = JobIdentity::cron("ghost", "1").unwrap();

    assert!(matches!(
        scheduler.unschedule(&identity).await,
        Err(SchedulerError::JobNotFound(_))
    ));
    scheduler.safe_unschedule(&identity).await;
}

#[tokio::test]
async fn test_reschedule_rejects_non_cron_and_missing_jobs() {
    let (scheduler, _clock) = scheduler_at(now());
    assert!(matches!(
        scheduler.reschedule("ghost", "1", "0 0 9 * * ?").await,
        Err(SchedulerError::JobNotFound(_))
    ));
    assert!(matches!(
        scheduler.reschedule("ghost", "1", "  ").await,
        Err(SchedulerError::InvalidArgument(_))
    ));

    scheduler
        .schedule(
            &payload("report", "1"),
            &TriggerSpec::Cron(CronSpec::new("0 0 9 * * ?")),
        )
        .await
        .unwrap();
    assert!(matches!(
        scheduler.reschedule("report", "1", "whenever").await,
        Err(SchedulerError::InvalidTriggerExpression(_))
    ));
}

#[tokio::test]
async fn test_lifecycle_events_in_order() {
    let handler = Arc::new(RecordingHandler::new());
    let bus = EventBus::new();
    bus.register(handler.clone()).await;
    let (scheduler, _clock) = scheduler_at(now());
    let scheduler = scheduler.with_event_bus(bus);

    scheduler
        .schedule(
            &payload("report", "1"),
            &TriggerSpec::Cron(CronSpec::new("0 0 9 * * ?")),
        )
        .await
        .unwrap();
    scheduler
        .reschedule("report", "1", "0 0 14 * * ?")
        .await
        .unwrap();
    scheduler
        .unschedule(&JobIdentity::cron("report", "1").unwrap())
        .await
        .unwrap();

    let events = handler.events().await;
    assert_eq!(events.len(), 3);
    assert!(matches!(
        &events[0],
        Event::JobScheduled { first_fire_time: Some(t), .. } if *t == at(2020, 7, 16, 9, 0)
    ));
    assert!(matches!(
        &events[1],
        Event::JobRescheduled { expression, .. } if expression == "0 0 14 * * ?"
    ));
    assert!(matches!(&events[2], Event::JobUnscheduled { .. }));
}
